//! Core data models shared across the ingestion and agent pipelines.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A source document loaded from disk, before chunking.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// File name as given in the ingestion request.
    pub name: String,
    pub path: PathBuf,
    /// Extracted plain text.
    pub text: String,
}

/// A chunked fragment of a source document, tagged with queryable metadata.
///
/// Nodes are what the pipeline transforms, embeds, and writes into a user's
/// vector collection. `project_id` and `project_name` are first-class fields
/// because retrieval filters on them; everything else lives in `metadata`.
#[derive(Debug, Clone)]
pub struct DocumentNode {
    pub id: String,
    /// Name of the source document this node was cut from.
    pub doc_name: String,
    pub chunk_index: i64,
    pub text: String,
    pub project_id: String,
    pub project_name: String,
    pub metadata: BTreeMap<String, String>,
}

/// A node returned from a similarity search, with its score.
#[derive(Debug, Clone)]
pub struct RetrievedNode {
    pub id: String,
    pub doc_name: String,
    pub chunk_index: i64,
    pub text: String,
    pub project_id: String,
    pub project_name: String,
    pub metadata: BTreeMap<String, String>,
    pub score: f64,
}

/// Message role within a chat context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// In-memory conversation state for one agent session.
#[derive(Debug, Clone, Default)]
pub struct ChatContext {
    pub messages: Vec<ChatMessage>,
}

impl ChatContext {
    pub fn with_instructions(instructions: &str) -> Self {
        Self {
            messages: vec![ChatMessage::system(instructions)],
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// The most recent user utterance, if any.
    pub fn latest_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_user_text_finds_most_recent() {
        let mut ctx = ChatContext::with_instructions("be brief");
        ctx.push(ChatMessage::user("first"));
        ctx.push(ChatMessage::assistant("reply"));
        ctx.push(ChatMessage::user("second"));
        assert_eq!(ctx.latest_user_text(), Some("second"));
    }

    #[test]
    fn latest_user_text_empty_context() {
        let ctx = ChatContext::default();
        assert_eq!(ctx.latest_user_text(), None);
    }
}
