//! Clients for the hosted inference API: chat completion, speech-to-text,
//! and text-to-speech.
//!
//! All three share one credential, `INFERENCE_API_KEY`, and an optional
//! `inference.endpoint` override for OpenAI-compatible gateways. Missing
//! credentials surface at construction time rather than mid-conversation.

use anyhow::{Context, Result};
use async_openai::config::OpenAIConfig;
use async_openai::types::audio::{
    AudioInput, AudioResponseFormat, CreateSpeechRequestArgs, CreateTranscriptionRequestArgs,
    SpeechModel, SpeechResponseFormat, Voice,
};
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
};
use async_openai::Client;

use crate::config::InferenceConfig;
use crate::models::{ChatContext, ChatMessage, Role};

fn api_client(config: &InferenceConfig) -> Result<Client<OpenAIConfig>> {
    let api_key = std::env::var("INFERENCE_API_KEY")
        .map_err(|_| anyhow::anyhow!("INFERENCE_API_KEY environment variable not set"))?;
    let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
    if let Some(endpoint) = &config.endpoint {
        openai_config = openai_config.with_api_base(endpoint.clone());
    }
    Ok(Client::with_config(openai_config))
}

/// Chat completion client.
pub struct ChatClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl ChatClient {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        Ok(Self {
            client: api_client(config)?,
            model: config.chat_model.clone(),
        })
    }

    /// Run one completion over the full conversation context.
    pub async fn complete(&self, context: &ChatContext) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> =
            context.messages.iter().map(to_request_message).collect();

        let request = CreateChatCompletionRequest {
            model: self.model.clone(),
            messages,
            ..Default::default()
        };

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .context("Chat completion request failed")?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("Chat completion returned no content"))?;
        Ok(text)
    }

    /// One-shot completion from a system instruction and a user prompt.
    /// Used by the ingestion enrichers.
    pub async fn prompt(&self, system: &str, user: &str) -> Result<String> {
        let mut context = ChatContext::with_instructions(system);
        context.push(ChatMessage::user(user));
        self.complete(&context).await
    }
}

fn to_request_message(message: &ChatMessage) -> ChatCompletionRequestMessage {
    match message.role {
        Role::System => {
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(message.content.clone()),
                name: None,
            })
        }
        Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(message.content.clone()),
            name: None,
        }),
        Role::Assistant => {
            #[allow(deprecated)]
            ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                content: Some(ChatCompletionRequestAssistantMessageContent::Text(
                    message.content.clone(),
                )),
                name: None,
                tool_calls: None,
                function_call: None,
                refusal: None,
                audio: None,
            })
        }
    }
}

/// Speech-to-text client over the transcription API.
pub struct SttClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl SttClient {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        Ok(Self {
            client: api_client(config)?,
            model: config.stt_model.clone(),
        })
    }

    pub async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        let request = CreateTranscriptionRequestArgs::default()
            .file(AudioInput::from_vec_u8(
                "audio.wav".to_string(),
                audio.to_vec(),
            ))
            .model(self.model.clone())
            .response_format(AudioResponseFormat::Json)
            .build()?;

        let response = self
            .client
            .audio()
            .transcription()
            .create(request)
            .await
            .context("Transcription request failed")?;
        Ok(response.text)
    }
}

/// Text-to-speech client over the speech API.
pub struct TtsClient {
    client: Client<OpenAIConfig>,
    model: SpeechModel,
    voice: Voice,
}

impl TtsClient {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        Ok(Self {
            client: api_client(config)?,
            model: speech_model(&config.tts_model),
            voice: speech_voice(&config.tts_voice),
        })
    }

    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let request = CreateSpeechRequestArgs::default()
            .input(text.to_string())
            .model(self.model.clone())
            .voice(self.voice.clone())
            .response_format(SpeechResponseFormat::Wav)
            .build()?;

        let response = self
            .client
            .audio()
            .speech()
            .create(request)
            .await
            .context("Speech synthesis request failed")?;
        Ok(response.bytes.to_vec())
    }
}

fn speech_model(name: &str) -> SpeechModel {
    match name {
        "tts-1" => SpeechModel::Tts1,
        "tts-1-hd" => SpeechModel::Tts1Hd,
        other => SpeechModel::Other(other.to_string()),
    }
}

fn speech_voice(name: &str) -> Voice {
    match name {
        "alloy" => Voice::Alloy,
        "ash" => Voice::Ash,
        "ballad" => Voice::Ballad,
        "coral" => Voice::Coral,
        "echo" => Voice::Echo,
        "fable" => Voice::Fable,
        "nova" => Voice::Nova,
        "onyx" => Voice::Onyx,
        "sage" => Voice::Sage,
        "shimmer" => Voice::Shimmer,
        "verse" => Voice::Verse,
        other => {
            tracing::warn!(voice = other, "unknown tts voice, using ash");
            Voice::Ash
        }
    }
}
