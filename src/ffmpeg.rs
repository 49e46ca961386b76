//! FFmpeg library setup and log verbosity.
//!
//! FFmpeg writes its own diagnostics straight to stderr, independently of the
//! Rust [`log`](https://crates.io/crates/log) facade used by the rest of this
//! crate. [`set_ffmpeg_log_level`] tunes that output; the CLI exposes it as
//! `--log-level`.
//!
//! # Example
//!
//! ```no_run
//! use framepack::FfmpegLogLevel;
//!
//! framepack::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//! ```

use std::sync::OnceLock;

use ffmpeg_next::util::log::Level;

use crate::error::FramepackError;

/// FFmpeg internal log verbosity, quietest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// No output at all.
    Quiet,
    /// Unrecoverable errors only.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Debugging output.
    Debug,
}

impl FfmpegLogLevel {
    /// Parse a CLI-style level name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "quiet" | "off" => Some(FfmpegLogLevel::Quiet),
            "fatal" | "panic" => Some(FfmpegLogLevel::Fatal),
            "error" => Some(FfmpegLogLevel::Error),
            "warning" | "warn" => Some(FfmpegLogLevel::Warning),
            "info" | "verbose" => Some(FfmpegLogLevel::Info),
            "debug" | "trace" => Some(FfmpegLogLevel::Debug),
            _ => None,
        }
    }

    /// The `-loglevel` argument the command-line transcoder understands.
    pub(crate) fn as_cli_arg(self) -> &'static str {
        match self {
            FfmpegLogLevel::Quiet => "quiet",
            FfmpegLogLevel::Fatal => "fatal",
            FfmpegLogLevel::Error => "error",
            FfmpegLogLevel::Warning => "warning",
            FfmpegLogLevel::Info => "info",
            FfmpegLogLevel::Debug => "debug",
        }
    }

    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Debug => Level::Debug,
        }
    }
}

/// Set FFmpeg's internal log verbosity for the linked libraries.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

static INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Initialise the FFmpeg libraries once per process.
pub(crate) fn ensure_initialized() -> Result<(), FramepackError> {
    INIT.get_or_init(|| ffmpeg_next::init().map_err(|error| error.to_string()))
        .clone()
        .map_err(|reason| FramepackError::Ffmpeg(format!("initialisation failed: {reason}")))
}
