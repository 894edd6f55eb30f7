//! Streaming turn pipeline.
//!
//! Speech is transcribed once, the reply streams in as text deltas, and each
//! completed sentence is rendered into audio plus mouth cues while the rest
//! of the reply is still being generated.

pub mod orchestrator;
pub mod segmenter;
pub mod types;

pub use orchestrator::{Orchestrator, PipelineConfig, TurnEvents};
pub use segmenter::{drain_complete, split_into_sentences};
pub use types::{Message, Role, Segment, ShapeWeights, TurnOutcome, VisemeCue};
