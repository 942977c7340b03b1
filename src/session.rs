//! The conversational session loop and its collaborator seams.
//!
//! A session wires four collaborators behind traits: a transcriber, a chat
//! model, a synthesizer, and the channel carrying utterances to and from the
//! room. The loop itself is transport-agnostic; production channels bridge to
//! the media server, tests plug in scripted fakes.
//!
//! # Turn shape
//!
//! 1. Receive an utterance from the channel (audio or text).
//! 2. Audio is transcribed to text.
//! 3. The user message joins the context; a retrieval agent augments the
//!    context with relevant documents first.
//! 4. The chat model produces a reply, which joins the context as the
//!    assistant message.
//! 5. The reply goes back out: synthesized audio for audio turns, text
//!    otherwise.
//!
//! A failed retrieval fails the turn: an agent that cannot reach the user's
//! documents surfaces the error instead of quietly answering without them.

use anyhow::Result;
use async_trait::async_trait;

use crate::agent::AgentDefinition;
use crate::models::{ChatContext, ChatMessage};

/// One inbound user turn.
#[derive(Debug, Clone)]
pub enum Utterance {
    Audio(Vec<u8>),
    Text(String),
}

/// One outbound agent turn.
#[derive(Debug, Clone)]
pub enum Reply {
    Audio(Vec<u8>),
    Text(String),
}

#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<String>;
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, context: &ChatContext) -> Result<String>;
}

#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Bidirectional utterance transport for one room session.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Next user utterance, or `None` when the session is over.
    async fn recv(&mut self) -> Result<Option<Utterance>>;
    async fn publish(&mut self, reply: Reply) -> Result<()>;
}

pub struct SessionLoop<S, M, T> {
    agent: AgentDefinition,
    user_id: String,
    stt: S,
    chat: M,
    tts: T,
    context: ChatContext,
}

impl<S, M, T> SessionLoop<S, M, T>
where
    S: SpeechToText,
    M: ChatModel,
    T: TextToSpeech,
{
    pub fn new(agent: AgentDefinition, user_id: String, stt: S, chat: M, tts: T) -> Self {
        let context = ChatContext::with_instructions(&agent.instructions);
        Self {
            agent,
            user_id,
            stt,
            chat,
            tts,
            context,
        }
    }

    /// Drive the session until the channel closes. Greets first, then
    /// alternates user and assistant turns.
    pub async fn run(&mut self, channel: &mut dyn Channel) -> Result<()> {
        let greeting = self.agent.greeting.clone();
        self.context.push(ChatMessage::assistant(&greeting));
        let spoken = self.tts.synthesize(&greeting).await?;
        channel.publish(Reply::Audio(spoken)).await?;
        tracing::info!(agent = %self.agent.name, "session started");

        while let Some(utterance) = channel.recv().await? {
            let reply = self.take_turn(utterance).await?;
            channel.publish(reply).await?;
        }

        tracing::info!(agent = %self.agent.name, "session ended");
        Ok(())
    }

    async fn take_turn(&mut self, utterance: Utterance) -> Result<Reply> {
        let (text, was_audio) = match utterance {
            Utterance::Audio(bytes) => (self.stt.transcribe(&bytes).await?, true),
            Utterance::Text(text) => (text, false),
        };
        self.context.push(ChatMessage::user(&text));

        if let Some(retriever) = &self.agent.retriever {
            retriever
                .augment(&self.user_id, &self.agent.filter, &mut self.context)
                .await?;
        }

        let answer = self.chat.complete(&self.context).await?;
        self.context.push(ChatMessage::assistant(&answer));

        if was_audio {
            Ok(Reply::Audio(self.tts.synthesize(&answer).await?))
        } else {
            Ok(Reply::Text(answer))
        }
    }
}
