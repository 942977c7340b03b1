//! Metadata enrichers run over chunked nodes during ingestion.
//!
//! Each enricher annotates nodes with a metadata key derived from an LLM
//! prompt: [`SummaryEnricher`] writes `"summary"`, [`QuestionsEnricher`]
//! writes `"questions"`. Enrichment failures fail the job; a half-enriched
//! collection would silently degrade retrieval quality.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::inference::ChatClient;
use crate::models::DocumentNode;

/// A pipeline stage that annotates nodes with derived metadata.
#[async_trait]
pub trait NodeEnricher: Send + Sync {
    fn name(&self) -> &'static str;
    async fn enrich(&self, nodes: &mut [DocumentNode]) -> Result<()>;
}

const SUMMARY_SYSTEM: &str =
    "You write one-paragraph summaries of document excerpts. Reply with the summary only.";

const QUESTIONS_SYSTEM: &str = "You read a document excerpt and list 3 questions this excerpt can \
     answer, one per line. Reply with the questions only.";

/// Attaches a short LLM-generated summary to each node under the
/// `"summary"` metadata key.
pub struct SummaryEnricher {
    chat: Arc<ChatClient>,
}

impl SummaryEnricher {
    pub fn new(chat: Arc<ChatClient>) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl NodeEnricher for SummaryEnricher {
    fn name(&self) -> &'static str {
        "summary"
    }

    async fn enrich(&self, nodes: &mut [DocumentNode]) -> Result<()> {
        for node in nodes.iter_mut() {
            let summary = self.chat.prompt(SUMMARY_SYSTEM, &node.text).await?;
            node.metadata.insert("summary".to_string(), summary);
        }
        Ok(())
    }
}

/// Attaches 3 answerable questions to each node under the `"questions"`
/// metadata key.
pub struct QuestionsEnricher {
    chat: Arc<ChatClient>,
}

impl QuestionsEnricher {
    pub fn new(chat: Arc<ChatClient>) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl NodeEnricher for QuestionsEnricher {
    fn name(&self) -> &'static str {
        "questions"
    }

    async fn enrich(&self, nodes: &mut [DocumentNode]) -> Result<()> {
        for node in nodes.iter_mut() {
            let questions = self.chat.prompt(QUESTIONS_SYSTEM, &node.text).await?;
            node.metadata.insert("questions".to_string(), questions);
        }
        Ok(())
    }
}
