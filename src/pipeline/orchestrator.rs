//! One conversational turn: speech in, ordered animated segments out.
//!
//! A turn runs two futures side by side. The producer pulls chat deltas and
//! pushes finished sentences onto an mpsc queue; the consumer renders
//! sentences (synthesize, normalize, extract visemes) one at a time and
//! reports them in queue order. Dropping the sender marks generation as
//! done; closing the receiver tells the producer to stop pulling.

use crate::audio::{AudioConverter, PhonemeExtractor};
use crate::backend::Backend;
use crate::defaults::MAX_SENTENCES_PER_TURN;
use crate::error::{MouthpieceError, Result};
use crate::pipeline::segmenter::drain_complete;
use crate::pipeline::types::{Message, Segment, TurnOutcome, VisemeCue};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// Lifecycle callbacks for a single turn.
///
/// Callbacks are invoked from the task running the turn and must not block.
pub trait TurnEvents: Send + Sync {
    /// Speech was recognized and generation is starting.
    fn on_start(&self);

    /// A segment is ready. Called in strictly increasing index order.
    fn on_audio(&self, segment: Segment);

    /// The turn finished.
    fn on_done(&self);

    /// The input held no speech.
    fn on_empty(&self);

    /// Something failed. Failures before `on_start` end the turn without
    /// `on_done`.
    fn on_error(&self, error: &MouthpieceError);
}

/// Configuration for the turn pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of sentences dispatched per turn
    pub max_sentences: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_sentences: MAX_SENTENCES_PER_TURN,
        }
    }
}

/// Runs turns against a backend, a converter and a phoneme extractor.
///
/// Shared across connections; every call to [`Orchestrator::process_turn`]
/// is independent.
pub struct Orchestrator {
    backend: Arc<dyn Backend>,
    converter: Arc<dyn AudioConverter>,
    extractor: Arc<dyn PhonemeExtractor>,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn Backend>,
        converter: Arc<dyn AudioConverter>,
        extractor: Arc<dyn PhonemeExtractor>,
    ) -> Self {
        Self {
            backend,
            converter,
            extractor,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Run one turn for `audio`, reporting progress through `events`.
    pub async fn process_turn(
        &self,
        audio: &[u8],
        history: &[Message],
        events: &dyn TurnEvents,
    ) -> TurnOutcome {
        let started = Instant::now();

        let wav = match self.converter.to_canonical_wav(audio).await {
            Ok(wav) => wav,
            Err(e) => {
                tracing::warn!(error = %e, "input conversion failed");
                events.on_error(&e);
                return TurnOutcome::Failed;
            }
        };

        let user_text = match self.backend.transcribe(&wav).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, provider = self.backend.name(), "transcription failed");
                events.on_error(&e);
                return TurnOutcome::Failed;
            }
        };

        if user_text.is_empty() {
            tracing::debug!("no speech detected");
            events.on_empty();
            return TurnOutcome::Empty;
        }

        tracing::info!(
            chars = user_text.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "transcribed user speech"
        );
        events.on_start();

        let (tx, rx) = mpsc::unbounded_channel();
        let (generated, delivered) = tokio::join!(
            self.generate(&user_text, history, tx, events),
            self.render(rx, events),
        );

        events.on_done();
        tracing::info!(
            segments = delivered,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "turn complete"
        );

        match generated {
            Some(assistant_text) => TurnOutcome::Completed {
                user_text,
                assistant_text,
            },
            None => TurnOutcome::Failed,
        }
    }

    /// Producer: stream the reply and queue each finished sentence.
    ///
    /// Returns the full reply text, or `None` when the chat stream could not
    /// be opened. Returning drops `tx`, which ends the consumer's queue.
    async fn generate(
        &self,
        user_text: &str,
        history: &[Message],
        tx: mpsc::UnboundedSender<String>,
        events: &dyn TurnEvents,
    ) -> Option<String> {
        let mut stream = match self.backend.chat(user_text, history).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, provider = self.backend.name(), "chat request failed");
                events.on_error(&e);
                return None;
            }
        };

        let mut full_text = String::new();
        let mut buffer = String::new();

        'stream: loop {
            let delta = tokio::select! {
                biased;
                _ = tx.closed() => {
                    tracing::debug!("sentence cap reached, abandoning generation");
                    return Some(full_text);
                }
                delta = stream.next() => delta,
            };

            match delta {
                Some(Ok(delta)) => {
                    full_text.push_str(&delta);
                    buffer.push_str(&delta);
                    for sentence in drain_complete(&mut buffer) {
                        if tx.send(sentence).is_err() {
                            break 'stream;
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "chat stream interrupted");
                    events.on_error(&e);
                    break;
                }
                None => break,
            }
        }

        let rest = buffer.trim();
        if !rest.is_empty() && tx.send(rest.to_string()).is_err() {
            tracing::debug!("queue closed before the trailing sentence");
        }
        Some(full_text)
    }

    /// Consumer: render queued sentences in order.
    ///
    /// Each segment is reported as soon as it is rendered. It is final when
    /// the cap is reached, or when the queue is empty and the producer has
    /// finished at that moment; a segment rendered while generation is still
    /// running is never final. Returns the number of segments delivered.
    async fn render(&self, mut rx: mpsc::UnboundedReceiver<String>, events: &dyn TurnEvents) -> usize {
        let mut index = 0;
        let mut delivered = 0;
        let mut queued: Option<String> = None;

        loop {
            let text = match queued.take() {
                Some(text) => text,
                None => match rx.recv().await {
                    Some(text) => text,
                    None => break,
                },
            };
            let current = index;
            index += 1;
            let rendered = self.render_sentence(&text).await;

            let capped = index >= self.config.max_sentences;
            let is_final = if capped {
                rx.close();
                true
            } else {
                match rx.try_recv() {
                    Ok(next) => {
                        queued = Some(next);
                        false
                    }
                    Err(TryRecvError::Empty) => false,
                    Err(TryRecvError::Disconnected) => true,
                }
            };

            match rendered {
                Ok((audio, visemes)) => {
                    tracing::debug!(index = current, cues = visemes.len(), is_final, "segment ready");
                    events.on_audio(Segment {
                        index: current,
                        text,
                        audio,
                        visemes,
                        is_final,
                    });
                    delivered += 1;
                }
                Err(e) => {
                    tracing::warn!(index = current, error = %e, "skipping sentence");
                    events.on_error(&e);
                }
            }

            if capped {
                break;
            }
        }

        delivered
    }

    async fn render_sentence(&self, text: &str) -> Result<(Vec<u8>, Vec<VisemeCue>)> {
        let audio = self.backend.synthesize(text).await?;
        let wav = self.converter.to_canonical_wav(&audio).await?;
        let visemes = self.extractor.extract(&wav, text).await?;
        Ok((audio, visemes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{FixedCueExtractor, PassthroughConverter};
    use crate::backend::MockBackend;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Start,
        Audio {
            index: usize,
            text: String,
            is_final: bool,
        },
        Done,
        Empty,
        Error(String),
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(Event, Instant)>>,
    }

    impl Recorder {
        fn push(&self, event: Event) {
            self.events.lock().unwrap().push((event, Instant::now()));
        }

        fn events(&self) -> Vec<Event> {
            self.timeline().into_iter().map(|(event, _)| event).collect()
        }

        fn timeline(&self) -> Vec<(Event, Instant)> {
            self.events.lock().unwrap().clone()
        }

        fn audio(&self) -> Vec<(usize, bool)> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::Audio {
                        index, is_final, ..
                    } => Some((index, is_final)),
                    _ => None,
                })
                .collect()
        }
    }

    impl TurnEvents for Recorder {
        fn on_start(&self) {
            self.push(Event::Start);
        }

        fn on_audio(&self, segment: Segment) {
            self.push(Event::Audio {
                index: segment.index,
                text: segment.text,
                is_final: segment.is_final,
            });
        }

        fn on_done(&self) {
            self.push(Event::Done);
        }

        fn on_empty(&self) {
            self.push(Event::Empty);
        }

        fn on_error(&self, error: &MouthpieceError) {
            self.push(Event::Error(error.to_string()));
        }
    }

    struct FailingConverter;

    #[async_trait::async_trait]
    impl AudioConverter for FailingConverter {
        async fn to_canonical_wav(&self, _input: &[u8]) -> Result<Vec<u8>> {
            Err(MouthpieceError::AudioConversion {
                message: "unsupported container".to_string(),
            })
        }
    }

    /// Extractor that takes a fixed time per clip.
    struct SlowExtractor(Duration);

    #[async_trait::async_trait]
    impl PhonemeExtractor for SlowExtractor {
        async fn extract(&self, _wav: &[u8], _transcript: &str) -> Result<Vec<VisemeCue>> {
            tokio::time::sleep(self.0).await;
            Ok(Vec::new())
        }
    }

    fn orchestrator(backend: &MockBackend) -> Orchestrator {
        Orchestrator::new(
            Arc::new(backend.clone()),
            Arc::new(PassthroughConverter),
            Arc::new(FixedCueExtractor::new(vec![VisemeCue {
                time: 0.0,
                shape: "viseme_aa".to_string(),
                weight: 1.0,
                duration: 0.1,
            }])),
        )
    }

    fn audio(index: usize, text: &str, is_final: bool) -> Event {
        Event::Audio {
            index,
            text: text.to_string(),
            is_final,
        }
    }

    #[tokio::test]
    async fn test_turn_delivers_sentences_in_order() {
        let backend = MockBackend::new();
        let recorder = Recorder::default();

        let outcome = orchestrator(&backend)
            .process_turn(b"speech", &[], &recorder)
            .await;

        assert_eq!(
            recorder.events(),
            vec![
                Event::Start,
                audio(0, "Hi there.", false),
                audio(1, "How can I help?", true),
                Event::Done,
            ]
        );
        assert_eq!(
            outcome,
            TurnOutcome::Completed {
                user_text: "hello".to_string(),
                assistant_text: "Hi there. How can I help?".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_segment_carries_synthesized_audio_and_cues() {
        struct Capture(Mutex<Vec<Segment>>);
        impl TurnEvents for Capture {
            fn on_start(&self) {}
            fn on_audio(&self, segment: Segment) {
                self.0.lock().unwrap().push(segment);
            }
            fn on_done(&self) {}
            fn on_empty(&self) {}
            fn on_error(&self, _error: &MouthpieceError) {}
        }

        let backend = MockBackend::new()
            .with_deltas(["Only one."])
            .with_audio(vec![1, 2, 3]);
        let capture = Capture(Mutex::new(Vec::new()));
        orchestrator(&backend)
            .process_turn(b"speech", &[], &capture)
            .await;

        let segments = capture.0.lock().unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].audio, vec![1, 2, 3]);
        assert_eq!(segments[0].visemes[0].shape, "viseme_aa");
        assert!(segments[0].is_final);
    }

    #[tokio::test]
    async fn test_segment_is_sent_while_generation_continues() {
        // "One." is complete once "Two" arrives; the rest of the reply takes
        // two more deltas.
        let backend = MockBackend::new()
            .with_deltas(["One. ", "Two", " is", " long. Three."])
            .with_delta_delay(Duration::from_millis(100));
        let recorder = Recorder::default();

        orchestrator(&backend)
            .process_turn(b"speech", &[], &recorder)
            .await;

        let timeline = recorder.timeline();
        let first = timeline
            .iter()
            .find(|(event, _)| matches!(event, Event::Audio { index: 0, .. }))
            .map(|(_, at)| *at)
            .unwrap();
        let done = timeline
            .iter()
            .find(|(event, _)| *event == Event::Done)
            .map(|(_, at)| *at)
            .unwrap();
        assert!(
            done.duration_since(first) >= Duration::from_millis(100),
            "first segment held back until {:?} before done",
            done.duration_since(first)
        );
        assert_eq!(recorder.audio(), vec![(0, false), (1, false), (2, true)]);
    }

    #[tokio::test]
    async fn test_final_flag_when_generation_ends_during_render() {
        // Generation is over after ~100ms, while "One." is still rendering.
        let backend = MockBackend::new()
            .with_deltas(["One. ", "Two."])
            .with_delta_delay(Duration::from_millis(50));
        let recorder = Recorder::default();
        let orchestrator = Orchestrator::new(
            Arc::new(backend.clone()),
            Arc::new(PassthroughConverter),
            Arc::new(SlowExtractor(Duration::from_millis(200))),
        );

        orchestrator.process_turn(b"speech", &[], &recorder).await;

        assert_eq!(
            recorder.events(),
            vec![
                Event::Start,
                audio(0, "One.", false),
                audio(1, "Two.", true),
                Event::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_blank_transcript_is_empty_turn() {
        let backend = MockBackend::new().with_transcript("   \n");
        let recorder = Recorder::default();

        let outcome = orchestrator(&backend)
            .process_turn(b"silence", &[], &recorder)
            .await;

        assert_eq!(outcome, TurnOutcome::Empty);
        assert_eq!(recorder.events(), vec![Event::Empty]);
        assert!(backend.chat_histories().is_empty());
    }

    #[tokio::test]
    async fn test_transcription_failure_is_fatal() {
        let backend = MockBackend::new().with_transcribe_failure();
        let recorder = Recorder::default();

        let outcome = orchestrator(&backend)
            .process_turn(b"speech", &[], &recorder)
            .await;

        assert_eq!(outcome, TurnOutcome::Failed);
        assert_eq!(
            recorder.events(),
            vec![Event::Error(
                "Transcription failed: mock transcription failure".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_conversion_failure_is_fatal() {
        let backend = MockBackend::new();
        let recorder = Recorder::default();
        let orchestrator = Orchestrator::new(
            Arc::new(backend.clone()),
            Arc::new(FailingConverter),
            Arc::new(FixedCueExtractor::default()),
        );

        let outcome = orchestrator.process_turn(b"speech", &[], &recorder).await;

        assert_eq!(outcome, TurnOutcome::Failed);
        assert_eq!(recorder.events().len(), 1);
        assert!(matches!(recorder.events()[0], Event::Error(_)));
        assert!(backend.synthesized().is_empty());
    }

    #[tokio::test]
    async fn test_sentence_cap_stops_generation() {
        let deltas: Vec<String> = (0..25).map(|i| format!("Sentence {i}. ")).collect();
        let backend = MockBackend::new()
            .with_deltas(deltas)
            .with_delta_delay(Duration::from_millis(2));
        let recorder = Recorder::default();

        orchestrator(&backend)
            .process_turn(b"speech", &[], &recorder)
            .await;

        let delivered = recorder.audio();
        assert_eq!(delivered.len(), 20);
        for (expected, (index, is_final)) in delivered.iter().enumerate() {
            assert_eq!(*index, expected);
            assert_eq!(*is_final, expected == 19);
        }
        assert!(backend.pulled_deltas() < 25);
        assert_eq!(recorder.events().last(), Some(&Event::Done));
    }

    #[tokio::test]
    async fn test_custom_cap() {
        let backend = MockBackend::new().with_deltas(["A. B. C. D."]);
        let recorder = Recorder::default();

        orchestrator(&backend)
            .with_config(PipelineConfig { max_sentences: 2 })
            .process_turn(b"speech", &[], &recorder)
            .await;

        assert_eq!(recorder.audio(), vec![(0, false), (1, true)]);
    }

    #[tokio::test]
    async fn test_failed_sentence_leaves_index_gap() {
        let backend = MockBackend::new()
            .with_deltas(["One. Two. ", "Three."])
            .with_synthesis_failure_for("Two.");
        let recorder = Recorder::default();

        let outcome = orchestrator(&backend)
            .process_turn(b"speech", &[], &recorder)
            .await;

        let events = recorder.events();
        assert_eq!(events[0], Event::Start);
        assert_eq!(events[1], audio(0, "One.", false));
        assert!(matches!(&events[2], Event::Error(m) if m.contains("Two.")));
        assert_eq!(events[3], audio(2, "Three.", true));
        assert_eq!(events[4], Event::Done);
        assert_eq!(backend.synthesized(), ["One.", "Two.", "Three."]);
        assert!(matches!(outcome, TurnOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn test_chat_stream_error_keeps_received_text() {
        let backend = MockBackend::new()
            .with_deltas(["First one. ", "Second one."])
            .with_chat_error_after(1);
        let recorder = Recorder::default();

        let outcome = orchestrator(&backend)
            .process_turn(b"speech", &[], &recorder)
            .await;

        let events = recorder.events();
        assert!(events.contains(&audio(0, "First one.", true)));
        assert!(events.iter().any(|e| matches!(e, Event::Error(_))));
        assert_eq!(events.last(), Some(&Event::Done));
        assert_eq!(
            outcome,
            TurnOutcome::Completed {
                user_text: "hello".to_string(),
                assistant_text: "First one. ".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_chat_open_failure() {
        let backend = MockBackend::new().with_chat_failure();
        let recorder = Recorder::default();

        let outcome = orchestrator(&backend)
            .process_turn(b"speech", &[], &recorder)
            .await;

        assert_eq!(outcome, TurnOutcome::Failed);
        assert_eq!(
            recorder.events(),
            vec![
                Event::Start,
                Event::Error("Chat generation failed: mock chat failure".to_string()),
                Event::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_reply_finishes_without_segments() {
        let backend = MockBackend::new().with_deltas(Vec::<String>::new());
        let recorder = Recorder::default();

        let outcome = orchestrator(&backend)
            .process_turn(b"speech", &[], &recorder)
            .await;

        assert_eq!(recorder.events(), vec![Event::Start, Event::Done]);
        assert_eq!(
            outcome,
            TurnOutcome::Completed {
                user_text: "hello".to_string(),
                assistant_text: String::new(),
            }
        );
    }

    #[tokio::test]
    async fn test_history_is_forwarded_to_chat() {
        let backend = MockBackend::new();
        let history = vec![Message::user("Hi"), Message::assistant("Hello!")];

        orchestrator(&backend)
            .process_turn(b"speech", &history, &Recorder::default())
            .await;

        assert_eq!(backend.chat_histories(), vec![history]);
    }

    #[tokio::test]
    async fn test_abbreviations_do_not_split_segments() {
        let backend = MockBackend::new().with_deltas(["Mr. Smith ", "is here. ", "Bye."]);
        let recorder = Recorder::default();

        orchestrator(&backend)
            .process_turn(b"speech", &[], &recorder)
            .await;

        assert_eq!(backend.synthesized(), ["Mr. Smith is here.", "Bye."]);
    }
}
