//! Scripted provider for tests and offline runs.

use crate::backend::{Backend, TextStream};
use crate::error::{MouthpieceError, Result};
use crate::pipeline::types::Message;
use futures_util::StreamExt;
use futures_util::stream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock backend with a fixed transcript and a scripted reply.
#[derive(Debug, Clone)]
pub struct MockBackend {
    transcript: String,
    deltas: Vec<String>,
    audio: Vec<u8>,
    delta_delay: Duration,
    fail_transcribe: bool,
    fail_chat: bool,
    chat_error_after: Option<usize>,
    fail_synthesis_for: Vec<String>,
    pulled: Arc<AtomicUsize>,
    synthesized: Arc<Mutex<Vec<String>>>,
    histories: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a mock that hears "hello" and replies with one sentence.
    pub fn new() -> Self {
        Self {
            transcript: "hello".to_string(),
            deltas: vec!["Hi there. ".to_string(), "How can I help?".to_string()],
            audio: vec![0u8; 64],
            delta_delay: Duration::ZERO,
            fail_transcribe: false,
            fail_chat: false,
            chat_error_after: None,
            fail_synthesis_for: Vec::new(),
            pulled: Arc::new(AtomicUsize::new(0)),
            synthesized: Arc::new(Mutex::new(Vec::new())),
            histories: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configure the text returned by transcribe
    pub fn with_transcript(mut self, transcript: &str) -> Self {
        self.transcript = transcript.to_string();
        self
    }

    /// Configure the chat deltas, yielded in order
    pub fn with_deltas<I, S>(mut self, deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deltas = deltas.into_iter().map(Into::into).collect();
        self
    }

    /// Configure the bytes returned by synthesize
    pub fn with_audio(mut self, audio: Vec<u8>) -> Self {
        self.audio = audio;
        self
    }

    /// Sleep before yielding each delta
    pub fn with_delta_delay(mut self, delay: Duration) -> Self {
        self.delta_delay = delay;
        self
    }

    /// Configure the mock to fail on transcribe
    pub fn with_transcribe_failure(mut self) -> Self {
        self.fail_transcribe = true;
        self
    }

    /// Configure the mock to fail when opening the chat stream
    pub fn with_chat_failure(mut self) -> Self {
        self.fail_chat = true;
        self
    }

    /// Yield an error after `count` deltas, then end the stream
    pub fn with_chat_error_after(mut self, count: usize) -> Self {
        self.chat_error_after = Some(count);
        self
    }

    /// Fail synthesis for the sentence with exactly this text
    pub fn with_synthesis_failure_for(mut self, sentence: &str) -> Self {
        self.fail_synthesis_for.push(sentence.to_string());
        self
    }

    /// Number of deltas pulled from chat streams so far.
    pub fn pulled_deltas(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }

    /// Sentences passed to synthesize, in call order.
    pub fn synthesized(&self) -> Vec<String> {
        self.synthesized
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// History slices passed to chat, one per call.
    pub fn chat_histories(&self) -> Vec<Vec<Message>> {
        self.histories
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Backend for MockBackend {
    async fn transcribe(&self, _wav: &[u8]) -> Result<String> {
        if self.fail_transcribe {
            return Err(MouthpieceError::Transcription {
                message: "mock transcription failure".to_string(),
            });
        }
        Ok(self.transcript.clone())
    }

    async fn chat(&self, _text: &str, history: &[Message]) -> Result<TextStream> {
        if let Ok(mut histories) = self.histories.lock() {
            histories.push(history.to_vec());
        }
        if self.fail_chat {
            return Err(MouthpieceError::Chat {
                message: "mock chat failure".to_string(),
            });
        }

        let mut items: Vec<Result<String>> = self.deltas.iter().cloned().map(Ok).collect();
        if let Some(count) = self.chat_error_after {
            items.truncate(count);
            items.push(Err(MouthpieceError::Chat {
                message: "mock stream interrupted".to_string(),
            }));
        }

        let delay = self.delta_delay;
        let pulled = Arc::clone(&self.pulled);
        let deltas = stream::unfold(items.into_iter(), move |mut items| {
            let pulled = Arc::clone(&pulled);
            async move {
                let item = items.next()?;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if item.is_ok() {
                    pulled.fetch_add(1, Ordering::SeqCst);
                }
                Some((item, items))
            }
        });
        Ok(deltas.boxed())
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if let Ok(mut synthesized) = self.synthesized.lock() {
            synthesized.push(text.to_string());
        }
        if self.fail_synthesis_for.iter().any(|s| s == text) {
            return Err(MouthpieceError::Synthesis {
                message: format!("mock synthesis failure for {text:?}"),
            });
        }
        Ok(self.audio.clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
