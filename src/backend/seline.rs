//! Provider that delegates to a remote Seline agent service.

use crate::backend::{Backend, TextStream, body_lines, ensure_success};
use crate::error::{MouthpieceError, Result};
use crate::pipeline::types::Message;
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

const PROVIDER: &str = "seline";

/// Settings for [`SelineBackend`].
#[derive(Debug, Clone)]
pub struct SelineConfig {
    pub base_url: String,
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest<'a> {
    messages: Vec<&'a Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: String,
}

/// Text delta from one line of the data-stream protocol.
///
/// Text parts are written as `0:` followed by a JSON string; every other
/// part type is ignored.
fn parse_data_stream_line(line: &str) -> Option<String> {
    let payload = line.strip_prefix("0:")?;
    serde_json::from_str::<String>(payload).ok()
}

/// Provider backed by a Seline agent.
pub struct SelineBackend {
    client: reqwest::Client,
    config: SelineConfig,
}

impl SelineBackend {
    pub fn new(client: reqwest::Client, config: SelineConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait::async_trait]
impl Backend for SelineBackend {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        let endpoint = "/api/audio/transcribe";
        let file = Part::bytes(wav.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")?;
        let form = Form::new().part("file", file);

        let response = self
            .client
            .post(self.url(endpoint))
            .multipart(form)
            .send()
            .await
            .map_err(|e| MouthpieceError::Transcription {
                message: format!("request failed: {e}"),
            })?;
        let response = ensure_success(PROVIDER, endpoint, response)?;

        let body: TranscribeResponse = response.json().await?;
        Ok(body.text)
    }

    async fn chat(&self, text: &str, history: &[Message]) -> Result<TextStream> {
        let endpoint = "/api/chat";
        let user = Message::user(text);
        let mut messages: Vec<&Message> = history.iter().collect();
        messages.push(&user);

        let request = ChatRequest {
            messages,
            agent_id: self.config.agent_id.as_deref(),
            session_id: self.config.session_id.as_deref(),
        };

        let response = self
            .client
            .post(self.url(endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| MouthpieceError::Chat {
                message: format!("request failed: {e}"),
            })?;
        let response = ensure_success(PROVIDER, endpoint, response)?;

        let deltas = body_lines(response.bytes_stream()).filter_map(|line| async move {
            match line {
                Ok(line) => parse_data_stream_line(&line).map(Ok),
                Err(e) => Some(Err(MouthpieceError::Chat {
                    message: format!("stream interrupted: {e}"),
                })),
            }
        });
        Ok(deltas.boxed())
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let endpoint = "/api/audio/synthesize";
        let response = self
            .client
            .post(self.url(endpoint))
            .json(&SynthesizeRequest { text })
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
