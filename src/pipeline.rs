//! Ingestion pipeline: documents in, enriched nodes out.
//!
//! The pipeline chunks each document's text, tags every resulting node with
//! the submission's project identity, then runs the configured enrichers over
//! the whole batch. Embedding and persistence are the caller's concern; the
//! pipeline is pure transformation and stays easy to test.

use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::chunk;
use crate::config::ChunkingConfig;
use crate::enrich::{NodeEnricher, QuestionsEnricher, SummaryEnricher};
use crate::inference::ChatClient;
use crate::models::{DocumentNode, SourceDocument};

pub struct IngestionPipeline {
    max_tokens: usize,
    overlap_tokens: usize,
    enrichers: Vec<Box<dyn NodeEnricher>>,
}

impl IngestionPipeline {
    /// Assemble the pipeline. Enrichers need a chat client; when enrichment
    /// is requested without one the pipeline runs chunk-only.
    pub fn build(
        chunking: &ChunkingConfig,
        chat: Option<Arc<ChatClient>>,
        enrich: bool,
    ) -> Self {
        let mut enrichers: Vec<Box<dyn NodeEnricher>> = Vec::new();
        if enrich {
            if let Some(chat) = chat {
                enrichers.push(Box::new(SummaryEnricher::new(Arc::clone(&chat))));
                enrichers.push(Box::new(QuestionsEnricher::new(chat)));
            }
        }
        Self {
            max_tokens: chunking.max_tokens,
            overlap_tokens: chunking.overlap_tokens,
            enrichers,
        }
    }

    pub fn enricher_names(&self) -> Vec<&'static str> {
        self.enrichers.iter().map(|e| e.name()).collect()
    }

    /// Transform documents into enriched nodes tagged with the project
    /// identity. Documents whose text chunks to nothing contribute no nodes.
    pub async fn run(
        &self,
        documents: &[SourceDocument],
        project_id: &str,
        project_name: &str,
    ) -> Result<Vec<DocumentNode>> {
        let mut nodes = Vec::new();

        for doc in documents {
            let chunks = chunk::split_text(&doc.text, self.max_tokens, self.overlap_tokens);
            for (index, text) in chunks.into_iter().enumerate() {
                let mut metadata = BTreeMap::new();
                metadata.insert("file_name".to_string(), doc.name.clone());
                nodes.push(DocumentNode {
                    id: Uuid::new_v4().to_string(),
                    doc_name: doc.name.clone(),
                    chunk_index: index as i64,
                    text,
                    project_id: project_id.to_string(),
                    project_name: project_name.to_string(),
                    metadata,
                });
            }
        }

        for enricher in &self.enrichers {
            tracing::debug!(enricher = enricher.name(), nodes = nodes.len(), "running enricher");
            enricher.enrich(&mut nodes).await?;
        }

        Ok(nodes)
    }
}
