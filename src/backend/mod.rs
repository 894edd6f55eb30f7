//! Transcription, chat and synthesis providers.
//!
//! The pipeline only sees the [`Backend`] trait. A concrete provider is picked
//! once at startup by [`from_config`].

pub mod mock;
pub mod openai;
pub mod seline;

use crate::config::{BackendConfig, Provider};
use crate::error::{MouthpieceError, Result};
use crate::pipeline::types::Message;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream, Stream};
use std::sync::Arc;

pub use mock::MockBackend;
pub use openai::OpenAiBackend;
pub use seline::SelineBackend;

/// Streamed chat response: text deltas in arrival order.
///
/// Dropping the stream abandons the rest of the response.
pub type TextStream = BoxStream<'static, Result<String>>;

/// The speech capability consumed by the pipeline.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Transcribe canonical WAV audio to text.
    async fn transcribe(&self, wav: &[u8]) -> Result<String>;

    /// Start a streamed reply to `text`, given the prior conversation.
    async fn chat(&self, text: &str, history: &[Message]) -> Result<TextStream>;

    /// Synthesize speech for one sentence.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    /// Short provider name for logs.
    fn name(&self) -> &str;
}

/// Implement Backend for Arc<T> to allow sharing across connections.
#[async_trait::async_trait]
impl<T: Backend + ?Sized> Backend for Arc<T> {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        (**self).transcribe(wav).await
    }

    async fn chat(&self, text: &str, history: &[Message]) -> Result<TextStream> {
        (**self).chat(text, history).await
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        (**self).synthesize(text).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Build the configured provider.
pub fn from_config(config: &BackendConfig) -> Result<Arc<dyn Backend>> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("mouthpiece/", env!("CARGO_PKG_VERSION")))
        .build()?;

    match config.provider {
        Provider::OpenAi => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                MouthpieceError::ConfigInvalidValue {
                    key: "backend.openai_api_key".to_string(),
                    message: "required for the openai provider".to_string(),
                }
            })?;
            Ok(Arc::new(OpenAiBackend::new(
                client,
                openai::OpenAiConfig {
                    api_key,
                    base_url: config.openai_base_url.clone(),
                    model: config.model.clone(),
                    voice: config.voice.clone(),
                    system_prompt: config.system_prompt.clone(),
                },
            )))
        }
        Provider::Seline => Ok(Arc::new(SelineBackend::new(
            client,
            seline::SelineConfig {
                base_url: config.seline_url.clone(),
                agent_id: config.seline_agent_id.clone(),
                session_id: config.seline_session_id.clone(),
            },
        ))),
    }
}

/// Fail with [`MouthpieceError::ProviderStatus`] unless the response is 2xx.
pub(crate) fn ensure_success(
    provider: &str,
    endpoint: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(MouthpieceError::ProviderStatus {
            provider: provider.to_string(),
            endpoint: endpoint.to_string(),
            status: response.status().as_u16(),
        })
    }
}

struct LineReader<S> {
    body: std::pin::Pin<Box<S>>,
    buffer: Vec<u8>,
    finished: bool,
}

/// Split a chunked response body into text lines.
///
/// Lines may straddle chunk boundaries. Trailing `\r` is stripped, and a
/// final line without a newline is still yielded. A transport error ends the
/// stream after being yielded once.
pub(crate) fn body_lines<S, B>(body: S) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let reader = LineReader {
        body: Box::pin(body),
        buffer: Vec::new(),
        finished: false,
    };

    stream::unfold(reader, |mut reader| async move {
        loop {
            if let Some(newline) = reader.buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = reader.buffer.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&raw)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                return Some((Ok(line), reader));
            }

            if reader.finished {
                if reader.buffer.is_empty() {
                    return None;
                }
                let rest = std::mem::take(&mut reader.buffer);
                let line = String::from_utf8_lossy(&rest)
                    .trim_end_matches('\r')
                    .to_string();
                return Some((Ok(line), reader));
            }

            match reader.body.next().await {
                Some(Ok(chunk)) => reader.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    reader.finished = true;
                    reader.buffer.clear();
                    return Some((Err(e.into()), reader));
                }
                None => reader.finished = true,
            }
        }
    })
    .boxed()
}
