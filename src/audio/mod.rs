//! Audio normalization and phoneme extraction via external tools.

pub mod convert;
pub mod phonemes;

pub use convert::{AudioConverter, FfmpegConverter, PassthroughConverter, is_canonical_wav};
pub use phonemes::{FixedCueExtractor, PhonemeExtractor, RhubarbExtractor};
