//! Agent definitions: who the agent is and how it behaves in a session.

use std::sync::Arc;

use crate::config::AgentConfig;
use crate::retrieval::Retriever;
use crate::store::MetadataFilter;

/// Which flavor of agent to run in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    /// Plain conversational agent.
    Voice,
    /// Conversational agent that augments each turn with the user's
    /// ingested documents.
    Retrieval,
}

impl std::str::FromStr for AgentKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "voice" => Ok(AgentKind::Voice),
            "retrieval" => Ok(AgentKind::Retrieval),
            other => anyhow::bail!("Unknown agent kind: {} (expected voice or retrieval)", other),
        }
    }
}

/// A configured agent ready to join a session.
pub struct AgentDefinition {
    pub name: String,
    pub instructions: String,
    pub greeting: String,
    /// Present for retrieval agents only.
    pub retriever: Option<Arc<Retriever>>,
    pub filter: MetadataFilter,
}

impl AgentDefinition {
    pub fn voice(name: String, config: &AgentConfig) -> Self {
        Self {
            name,
            instructions: config.instructions.clone(),
            greeting: config.greeting.clone(),
            retriever: None,
            filter: MetadataFilter::default(),
        }
    }

    pub fn retrieval(
        name: String,
        config: &AgentConfig,
        retriever: Arc<Retriever>,
        filter: MetadataFilter,
    ) -> Self {
        Self {
            name,
            instructions: config.instructions.clone(),
            greeting: config.greeting.clone(),
            retriever: Some(retriever),
            filter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_kind_parses() {
        assert_eq!("voice".parse::<AgentKind>().unwrap(), AgentKind::Voice);
        assert_eq!(
            "retrieval".parse::<AgentKind>().unwrap(),
            AgentKind::Retrieval
        );
        assert!("video".parse::<AgentKind>().is_err());
    }

    #[test]
    fn voice_agent_uses_configured_text() {
        let config = AgentConfig {
            instructions: "Speak like a pirate.".to_string(),
            greeting: "Ahoy!".to_string(),
        };
        let agent = AgentDefinition::voice("agent-x".to_string(), &config);
        assert_eq!(agent.instructions, "Speak like a pirate.");
        assert_eq!(agent.greeting, "Ahoy!");
        assert!(agent.retriever.is_none());
    }

    #[test]
    fn defaults_apply_when_unset() {
        let agent = AgentDefinition::voice("a".to_string(), &AgentConfig::default());
        assert!(!agent.instructions.is_empty());
        assert!(!agent.greeting.is_empty());
    }
}
