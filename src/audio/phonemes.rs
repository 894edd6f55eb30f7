//! Mouth-cue extraction with rhubarb-lip-sync.

use crate::defaults::PHONEME_TIMEOUT_SECS;
use crate::error::{MouthpieceError, Result};
use crate::pipeline::types::VisemeCue;
use crate::viseme::{RhubarbOutput, map_rhubarb_cues};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Produces viseme cues for a canonical WAV clip and the text spoken in it.
#[async_trait::async_trait]
pub trait PhonemeExtractor: Send + Sync {
    async fn extract(&self, wav: &[u8], transcript: &str) -> Result<Vec<VisemeCue>>;
}

/// Extractor backed by the `rhubarb` binary.
///
/// Audio and dialog text go to a private temp directory that is removed
/// when extraction finishes, successful or not.
#[derive(Debug, Clone)]
pub struct RhubarbExtractor {
    program: PathBuf,
    timeout: Duration,
}

impl RhubarbExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: Duration::from_secs(PHONEME_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, wav_path: &Path, dialog_path: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg(wav_path)
            .arg("--dialogFile")
            .arg(dialog_path)
            .args(["--exportFormat", "json", "--recognizer", "phonetic", "--quiet"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

/// Parses rhubarb's JSON export into viseme cues.
pub fn parse_rhubarb_json(stdout: &[u8]) -> Result<Vec<VisemeCue>> {
    let output: RhubarbOutput =
        serde_json::from_slice(stdout).map_err(|e| MouthpieceError::PhonemeExtraction {
            message: format!("unreadable rhubarb output: {e}"),
        })?;
    Ok(map_rhubarb_cues(output))
}

#[async_trait::async_trait]
impl PhonemeExtractor for RhubarbExtractor {
    async fn extract(&self, wav: &[u8], transcript: &str) -> Result<Vec<VisemeCue>> {
        let dir = tempfile::tempdir()?;
        let wav_path = dir.path().join("audio.wav");
        let dialog_path = dir.path().join("dialog.txt");
        tokio::fs::write(&wav_path, wav).await?;
        tokio::fs::write(&dialog_path, transcript).await?;

        let mut command = self.command(&wav_path, &dialog_path);
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| MouthpieceError::PhonemeExtraction {
                message: format!("rhubarb timed out after {}s", self.timeout.as_secs()),
            })?
            .map_err(|e| MouthpieceError::PhonemeExtraction {
                message: format!("failed to run {}: {e}", self.program.display()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MouthpieceError::PhonemeExtraction {
                message: format!("rhubarb exited with {}: {}", output.status, stderr.trim()),
            });
        }

        parse_rhubarb_json(&output.stdout)
    }
}

/// Extractor that returns the same cues for every clip.
#[derive(Debug, Clone, Default)]
pub struct FixedCueExtractor {
    cues: Vec<VisemeCue>,
}

impl FixedCueExtractor {
    pub fn new(cues: Vec<VisemeCue>) -> Self {
        Self { cues }
    }
}

#[async_trait::async_trait]
impl PhonemeExtractor for FixedCueExtractor {
    async fn extract(&self, _wav: &[u8], _transcript: &str) -> Result<Vec<VisemeCue>> {
        Ok(self.cues.clone())
    }
}
