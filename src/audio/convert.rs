//! Conversion of arbitrary input audio to canonical WAV.
//!
//! Canonical means 16 kHz, mono, signed 16-bit PCM. Everything downstream
//! (transcription, phoneme extraction) assumes that format.

use crate::defaults::{BITS_PER_SAMPLE, CHANNELS, SAMPLE_RATE};
use crate::error::{MouthpieceError, Result};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Turns encoded audio (webm, mp3, wav, ...) into canonical WAV bytes.
#[async_trait::async_trait]
pub trait AudioConverter: Send + Sync {
    async fn to_canonical_wav(&self, input: &[u8]) -> Result<Vec<u8>>;
}

/// Whether `bytes` already is a canonical WAV file.
pub fn is_canonical_wav(bytes: &[u8]) -> bool {
    match hound::WavReader::new(Cursor::new(bytes)) {
        Ok(reader) => {
            let spec = reader.spec();
            spec.sample_rate == SAMPLE_RATE
                && spec.channels == CHANNELS
                && spec.bits_per_sample == BITS_PER_SAMPLE
                && spec.sample_format == hound::SampleFormat::Int
        }
        Err(_) => false,
    }
}

/// Converter backed by the `ffmpeg` binary.
///
/// Input that is already canonical skips the subprocess.
#[derive(Debug, Clone)]
pub struct FfmpegConverter {
    program: PathBuf,
}

impl FfmpegConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, output: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-i", "pipe:0"])
            .arg("-ar")
            .arg(SAMPLE_RATE.to_string())
            .arg("-ac")
            .arg(CHANNELS.to_string())
            .args(["-acodec", "pcm_s16le", "-f", "wav"])
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait::async_trait]
impl AudioConverter for FfmpegConverter {
    async fn to_canonical_wav(&self, input: &[u8]) -> Result<Vec<u8>> {
        if input.is_empty() {
            return Err(MouthpieceError::AudioConversion {
                message: "no audio data".to_string(),
            });
        }
        if is_canonical_wav(input) {
            return Ok(input.to_vec());
        }

        // ffmpeg cannot seek a pipe to patch the RIFF sizes, so the output
        // goes to a file.
        let dir = tempfile::tempdir()?;
        let output_path = dir.path().join("canonical.wav");

        let mut child =
            self.command(&output_path)
                .spawn()
                .map_err(|e| MouthpieceError::AudioConversion {
                    message: format!("failed to start {}: {e}", self.program.display()),
                })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| MouthpieceError::AudioConversion {
                message: "ffmpeg stdin unavailable".to_string(),
            })?;
        let data = input.to_vec();
        let writer = tokio::spawn(async move {
            stdin.write_all(&data).await?;
            stdin.shutdown().await
        });

        let output = child.wait_with_output().await?;
        let written = writer.await;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MouthpieceError::AudioConversion {
                message: format!("ffmpeg exited with {}: {}", output.status, stderr.trim()),
            });
        }
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(MouthpieceError::AudioConversion {
                    message: format!("failed to feed ffmpeg: {e}"),
                });
            }
            Err(e) => {
                return Err(MouthpieceError::AudioConversion {
                    message: format!("ffmpeg writer task failed: {e}"),
                });
            }
        }

        Ok(tokio::fs::read(&output_path).await?)
    }
}

/// Converter that returns its input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughConverter;

#[async_trait::async_trait]
impl AudioConverter for PassthroughConverter {
    async fn to_canonical_wav(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(input.to_vec())
    }
}
