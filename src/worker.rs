//! Agent worker entrypoint.
//!
//! One worker process serves one room for one user. It mints a join token for
//! the user, waits for a human participant to show up in the room, then runs
//! the session loop with the configured providers. The media bridge plugs in
//! behind the [`Channel`](crate::session::Channel) seam; the built-in
//! [`ConsoleChannel`] drives a session from the terminal for local runs.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::agent::{AgentDefinition, AgentKind};
use crate::config::Config;
use crate::inference::{ChatClient, SttClient, TtsClient};
use crate::models::ChatContext;
use crate::retrieval::Retriever;
use crate::rooms::{agent_name, RoomServiceClient, TokenIssuer};
use crate::session::{Channel, ChatModel, Reply, SessionLoop, SpeechToText, TextToSpeech, Utterance};
use crate::store::{MetadataFilter, VectorStore};

const PARTICIPANT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const PARTICIPANT_POLL_ATTEMPTS: u32 = 150;

#[async_trait]
impl SpeechToText for SttClient {
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        SttClient::transcribe(self, audio).await
    }
}

#[async_trait]
impl ChatModel for ChatClient {
    async fn complete(&self, context: &ChatContext) -> Result<String> {
        ChatClient::complete(self, context).await
    }
}

#[async_trait]
impl TextToSpeech for TtsClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        TtsClient::synthesize(self, text).await
    }
}

/// Text transport over stdin/stdout for local agent runs. Replies render as
/// text; synthesized audio is summarized rather than dumped to the terminal.
pub struct ConsoleChannel {
    reader: BufReader<tokio::io::Stdin>,
    writer: tokio::io::Stdout,
}

impl ConsoleChannel {
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
            writer: tokio::io::stdout(),
        }
    }
}

impl Default for ConsoleChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for ConsoleChannel {
    async fn recv(&mut self) -> Result<Option<Utterance>> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).await?;
        if read == 0 {
            return Ok(None);
        }
        let line = line.trim();
        if line.is_empty() || line == "/quit" {
            return Ok(None);
        }
        Ok(Some(Utterance::Text(line.to_string())))
    }

    async fn publish(&mut self, reply: Reply) -> Result<()> {
        let rendered = match reply {
            Reply::Text(text) => format!("agent: {}\n", text),
            Reply::Audio(bytes) => format!("agent: [audio reply, {} bytes]\n", bytes.len()),
        };
        self.writer.write_all(rendered.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Run one agent worker for `room`/`user_id` until the session ends.
pub async fn run_agent(config: &Config, kind: AgentKind, room: &str, user_id: &str) -> Result<()> {
    let issuer = TokenIssuer::from_env(&config.rooms)?;
    let token = issuer.mint(room, user_id, None)?;
    tracing::info!(room, user_id, "minted room join token");
    tracing::debug!(%token, "join token");

    let service = RoomServiceClient::from_env(&config.rooms)?;
    wait_for_participant(&service, room).await?;

    let agent = build_agent(config, kind, user_id).await?;
    let stt = SttClient::new(&config.inference)?;
    let chat = ChatClient::new(&config.inference)?;
    let tts = TtsClient::new(&config.inference)?;

    let mut session = SessionLoop::new(agent, user_id.to_string(), stt, chat, tts);
    let mut channel = ConsoleChannel::new();
    session.run(&mut channel).await
}

async fn build_agent(config: &Config, kind: AgentKind, user_id: &str) -> Result<AgentDefinition> {
    let name = agent_name(user_id);
    match kind {
        AgentKind::Voice => Ok(AgentDefinition::voice(name, &config.agent)),
        AgentKind::Retrieval => {
            let pool = crate::store::connect(&config.store).await?;
            crate::migrate::run_migrations(&pool).await?;
            let store = VectorStore::new(pool);
            let embedder = crate::embedding::create_provider(&config.embedding)?;
            let retriever = Arc::new(Retriever::new(store, embedder, config.retrieval.top_k));
            Ok(AgentDefinition::retrieval(
                name,
                &config.agent,
                retriever,
                MetadataFilter::default(),
            ))
        }
    }
}

async fn wait_for_participant(service: &RoomServiceClient, room: &str) -> Result<()> {
    for attempt in 0..PARTICIPANT_POLL_ATTEMPTS {
        if service.room_exists(room).await.unwrap_or(false) {
            match service.has_human_participant(room).await {
                Ok((true, identities)) => {
                    tracing::info!(room, ?identities, "participant present, joining session");
                    return Ok(());
                }
                Ok((false, _)) => {}
                Err(e) => tracing::warn!(room, error = %e, "participant check failed"),
            }
        }
        if attempt == 0 {
            tracing::info!(room, "waiting for a participant");
        }
        tokio::time::sleep(PARTICIPANT_POLL_INTERVAL).await;
    }
    anyhow::bail!("No participant joined room {} in time", room)
}
