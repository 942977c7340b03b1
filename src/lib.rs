//! # Parlance
//!
//! A voice-agent and retrieval-augmented-generation backend.
//!
//! Parlance wires together two process families: an ingestion API service
//! that chunks, enriches, embeds, and stores user documents into per-user
//! vector collections, and voice agent workers that join a real-time room,
//! assemble a speech-in → language-model → speech-out pipeline, and inject
//! vector-search results into the model context before each turn.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   ┌───────────────┐   ┌────────────┐
//! │   HTTP API    │──▶│ Ingest worker │──▶│  SQLite     │
//! │ pipeline/rooms│   │ chunk+enrich  │   │ per-user    │
//! └──────┬────────┘   │ embed+store   │   │ collections │
//!        │            └───────────────┘   └─────┬──────┘
//!        │ token + dispatch                     │ top-K query
//!        ▼                                      ▼
//! ┌───────────────┐   ┌───────────────────────────────┐
//! │ Room platform │◀──│ Agent worker: STT → LLM → TTS │
//! └───────────────┘   └───────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! parlance init                 # create the vector store
//! parlance serve api            # start the HTTP API
//! parlance agent run retrieval --room demo --user u1
//! parlance ingest --user u1 --project-id p1 --project-name apollo \
//!     --dir ./docs report.pdf notes.md
//! parlance query --user u1 --project-id p1 "quarterly revenue"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`loader`] | Document loading and validation |
//! | [`extract`] | Text extraction for PDF/DOCX/XLSX |
//! | [`chunk`] | Sentence-aware text chunking |
//! | [`enrich`] | LLM-backed node enrichment |
//! | [`pipeline`] | Ingestion transformation pipeline |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Per-user vector collections |
//! | [`ingest`] | Ingestion job lifecycle and worker pool |
//! | [`retrieval`] | Per-turn retrieval augmentation |
//! | [`inference`] | Chat, STT, and TTS clients |
//! | [`rooms`] | Room tokens and room-service client |
//! | [`agent`] | Agent definitions |
//! | [`session`] | Agent session loop |
//! | [`worker`] | Agent worker entrypoint |
//! | [`server`] | HTTP API server |
//! | [`migrate`] | Schema migrations |

pub mod agent;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod enrich;
pub mod extract;
pub mod inference;
pub mod ingest;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod retrieval;
pub mod rooms;
pub mod server;
pub mod session;
pub mod store;
pub mod worker;
