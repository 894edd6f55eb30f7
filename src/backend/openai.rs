//! OpenAI-style HTTP provider: whisper transcription, streamed chat
//! completions and speech synthesis.

use crate::backend::{Backend, TextStream, body_lines, ensure_success};
use crate::error::{MouthpieceError, Result};
use crate::pipeline::types::{Message, Role};
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

const PROVIDER: &str = "openai";
const TRANSCRIPTION_MODEL: &str = "whisper-1";
const SPEECH_MODEL: &str = "tts-1";

/// Settings for [`OpenAiBackend`].
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    /// API root, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub model: String,
    pub voice: String,
    pub system_prompt: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
    speed: f32,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// Provider backed by an OpenAI-compatible API.
pub struct OpenAiBackend {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    pub fn new(client: reqwest::Client, config: OpenAiConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// Text delta carried by one server-sent-event line, if any.
///
/// Non-data lines, the `[DONE]` sentinel, unparsable payloads and empty
/// deltas all yield `None`.
fn parse_sse_delta(line: &str) -> Option<String> {
    let payload = line.strip_prefix("data:")?.trim();
    if payload == "[DONE]" {
        return None;
    }
    let chunk: ChatChunk = serde_json::from_str(payload).ok()?;
    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
}

#[async_trait::async_trait]
impl Backend for OpenAiBackend {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        let endpoint = "/audio/transcriptions";
        let file = Part::bytes(wav.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")?;
        let form = Form::new()
            .text("model", TRANSCRIPTION_MODEL)
            .text("response_format", "text")
            .part("file", file);

        let response = self
            .client
            .post(self.url(endpoint))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| MouthpieceError::Transcription {
                message: format!("request failed: {e}"),
            })?;
        let response = ensure_success(PROVIDER, endpoint, response)?;

        Ok(response.text().await?.trim().to_string())
    }

    async fn chat(&self, text: &str, history: &[Message]) -> Result<TextStream> {
        let endpoint = "/chat/completions";
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage {
            role: "system",
            content: &self.config.system_prompt,
        });
        messages.extend(history.iter().map(|m| ChatMessage {
            role: role_name(m.role),
            content: &m.content,
        }));
        messages.push(ChatMessage {
            role: "user",
            content: text,
        });

        let request = ChatRequest {
            model: &self.config.model,
            messages,
            stream: true,
        };

        let response = self
            .client
            .post(self.url(endpoint))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| MouthpieceError::Chat {
                message: format!("request failed: {e}"),
            })?;
        let response = ensure_success(PROVIDER, endpoint, response)?;

        let deltas = body_lines(response.bytes_stream()).filter_map(|line| async move {
            match line {
                Ok(line) => parse_sse_delta(&line).map(Ok),
                Err(e) => Some(Err(MouthpieceError::Chat {
                    message: format!("stream interrupted: {e}"),
                })),
            }
        });
        Ok(deltas.boxed())
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let endpoint = "/audio/speech";
        let request = SpeechRequest {
            model: SPEECH_MODEL,
            voice: &self.config.voice,
            input: text,
            response_format: "wav",
            speed: 1.0,
        };

        let response = self
            .client
            .post(self.url(endpoint))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| MouthpieceError::Synthesis {
                message: format!("request failed: {e}"),
            })?;
        let response = ensure_success(PROVIDER, endpoint, response)?;

        Ok(response.bytes().await?.to_vec())
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
