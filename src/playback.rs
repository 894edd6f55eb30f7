//! Client-side reassembly and playback timing.
//!
//! A client receives `assistant.audio` headers and binary audio frames as
//! separate WebSocket messages. [`FramePairer`] joins them back into
//! segments, and [`Playback`] plays segments back to back, sampling mouth
//! shapes for any instant on the playback clock.

use crate::pipeline::types::{ShapeWeights, VisemeCue};
use crate::protocol::ServerMessage;
use crate::viseme::interpolate;
use std::collections::VecDeque;
use std::io::Cursor;

/// A segment as received by a client.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedSegment {
    pub index: usize,
    pub visemes: Vec<VisemeCue>,
    pub is_final: bool,
    pub audio: Vec<u8>,
}

impl ReceivedSegment {
    /// Playback length in seconds.
    ///
    /// Read from the WAV header when the audio is WAV, otherwise the end of
    /// the last cue.
    pub fn duration(&self) -> f64 {
        if let Ok(reader) = hound::WavReader::new(Cursor::new(&self.audio)) {
            let rate = reader.spec().sample_rate;
            if rate > 0 {
                return f64::from(reader.duration()) / f64::from(rate);
            }
        }
        self.visemes.iter().map(VisemeCue::end).fold(0.0, f64::max)
    }
}

/// What a client should react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Start,
    Segment(ReceivedSegment),
    Done,
    Empty,
    Error { message: String, recoverable: bool },
}

#[derive(Debug)]
struct PendingHeader {
    index: usize,
    visemes: Vec<VisemeCue>,
    is_final: bool,
}

/// Pairs each audio header with the next binary frame, first in first out.
#[derive(Debug, Default)]
pub struct FramePairer {
    headers: VecDeque<PendingHeader>,
}

impl FramePairer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a text frame. Unparsable frames are dropped.
    pub fn push_text(&mut self, text: &str) -> Option<ClientEvent> {
        match ServerMessage::from_json(text).ok()? {
            ServerMessage::AssistantStart => Some(ClientEvent::Start),
            ServerMessage::AssistantAudio {
                visemes,
                sentence_index,
                is_final,
            } => {
                self.headers.push_back(PendingHeader {
                    index: sentence_index,
                    visemes,
                    is_final,
                });
                None
            }
            ServerMessage::AssistantDone => Some(ClientEvent::Done),
            ServerMessage::AssistantEmpty => Some(ClientEvent::Empty),
            ServerMessage::Error {
                message,
                recoverable,
            } => Some(ClientEvent::Error {
                message,
                recoverable,
            }),
        }
    }

    /// Feed a binary frame. Audio with no header waiting is dropped.
    pub fn push_binary(&mut self, audio: Vec<u8>) -> Option<ClientEvent> {
        let header = self.headers.pop_front()?;
        Some(ClientEvent::Segment(ReceivedSegment {
            index: header.index,
            visemes: header.visemes,
            is_final: header.is_final,
            audio,
        }))
    }

    /// Headers still waiting for their audio.
    pub fn pending(&self) -> usize {
        self.headers.len()
    }
}

#[derive(Debug)]
struct Active {
    segment: ReceivedSegment,
    started_at: f64,
    duration: f64,
}

impl Active {
    fn ends_at(&self) -> f64 {
        self.started_at + self.duration
    }
}

/// Sequential player for received segments.
///
/// Time is supplied by the caller in seconds on any monotonic clock.
#[derive(Debug, Default)]
pub struct Playback {
    queue: VecDeque<ReceivedSegment>,
    active: Option<Active>,
}

impl Playback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a segment behind anything already playing.
    pub fn enqueue(&mut self, segment: ReceivedSegment) {
        self.queue.push_back(segment);
    }

    /// Move the playhead to `now`, starting or finishing segments.
    ///
    /// A segment queued while another plays starts the moment the previous
    /// one ends. A segment queued while idle starts at `now`.
    pub fn advance(&mut self, now: f64) {
        loop {
            match &self.active {
                Some(active) if now < active.ends_at() => return,
                Some(active) => {
                    let ended_at = active.ends_at();
                    self.active = None;
                    if !self.start_next(ended_at) {
                        return;
                    }
                }
                None => {
                    self.start_next(now);
                    return;
                }
            }
        }
    }

    fn start_next(&mut self, at: f64) -> bool {
        match self.queue.pop_front() {
            Some(segment) => {
                let duration = segment.duration();
                self.active = Some(Active {
                    segment,
                    started_at: at,
                    duration,
                });
                true
            }
            None => false,
        }
    }

    /// Mouth shapes at `now`. Empty when nothing is playing.
    pub fn weights_at(&mut self, now: f64) -> ShapeWeights {
        self.advance(now);
        match &self.active {
            Some(active) => interpolate(&active.segment.visemes, now - active.started_at),
            None => ShapeWeights::new(),
        }
    }

    /// Index of the segment playing after the last [`Playback::advance`].
    pub fn current_index(&self) -> Option<usize> {
        self.active.as_ref().map(|active| active.segment.index)
    }

    pub fn is_speaking(&self) -> bool {
        self.active.is_some()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Stop playback and drop everything queued.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.active = None;
    }
}
