//! System diagnostics and dependency checking.
//!
//! Verifies that the external tools the pipeline shells out to are installed
//! and that the configured provider has what it needs.

use crate::config::{Config, Provider};
use owo_colors::OwoColorize;
use std::path::Path;
use std::process::Command;

/// Result of a dependency check.
#[derive(Debug, PartialEq)]
pub enum CheckResult {
    /// Tool is installed and working
    Ok,
    /// Tool is not found
    NotFound,
    /// Tool is found but has issues
    Warning(String),
}

/// Check if a program exists and answers `version_flag`.
fn check_command(program: &Path, version_flag: &str) -> CheckResult {
    match Command::new(program).arg(version_flag).output() {
        Ok(output) if output.status.success() => CheckResult::Ok,
        Ok(_) => CheckResult::Warning(format!(
            "'{}' found but {} failed",
            program.display(),
            version_flag
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckResult::NotFound,
        Err(e) => CheckResult::Warning(format!("Error checking '{}': {}", program.display(), e)),
    }
}

/// ffmpeg spells its version flag with a single dash.
pub fn check_ffmpeg(program: &Path) -> CheckResult {
    check_command(program, "-version")
}

pub fn check_rhubarb(program: &Path) -> CheckResult {
    check_command(program, "--version")
}

/// Whether the selected provider is usable as configured.
pub fn check_provider(config: &Config) -> CheckResult {
    match config.backend.provider {
        Provider::OpenAi => match config.validate() {
            Ok(()) => CheckResult::Ok,
            Err(e) => CheckResult::Warning(e.to_string()),
        },
        Provider::Seline => {
            let url = &config.backend.seline_url;
            if url.starts_with("http://") || url.starts_with("https://") {
                CheckResult::Ok
            } else {
                CheckResult::Warning(format!("seline_url '{url}' is not an http(s) URL"))
            }
        }
    }
}

fn report(label: &str, result: &CheckResult, install_hint: &str) -> bool {
    print!("{label}: ");
    match result {
        CheckResult::Ok => {
            println!("{}", "✓ OK".green());
            true
        }
        CheckResult::NotFound => {
            println!("{}", "✗ NOT FOUND".red());
            println!("  {}", install_hint.dimmed());
            false
        }
        CheckResult::Warning(msg) => {
            println!("{} {}", "⚠ WARNING:".yellow(), msg);
            false
        }
    }
}

/// Run all dependency checks and print results.
///
/// Returns true when everything needed to serve turns is in place.
pub fn check_dependencies(config: &Config) -> bool {
    println!("Checking system dependencies...\n");

    let ffmpeg = report(
        &format!("ffmpeg ({})", config.tools.ffmpeg.display()),
        &check_ffmpeg(&config.tools.ffmpeg),
        "Install: sudo apt install ffmpeg  (Debian/Ubuntu), brew install ffmpeg  (macOS)",
    );
    let rhubarb = report(
        &format!("rhubarb ({})", config.tools.rhubarb.display()),
        &check_rhubarb(&config.tools.rhubarb),
        "Download a release from https://github.com/DanielSWolf/rhubarb-lip-sync/releases \
         and set tools.rhubarb or MOUTHPIECE_RHUBARB",
    );

    let provider_name = match config.backend.provider {
        Provider::OpenAi => "openai",
        Provider::Seline => "seline",
    };
    let provider = report(
        &format!("provider ({provider_name})"),
        &check_provider(config),
        "",
    );

    println!();
    let ready = ffmpeg && rhubarb && provider;
    if ready {
        println!("{}", "✓ Ready to serve.".green());
    } else {
        println!("{}", "⚠ Some checks failed; turns will report errors.".yellow());
    }
    ready
}
