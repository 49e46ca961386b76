//! Orchestrator configuration.
//!
//! [`OrchestratorOptions`] carries the deployment-level policy that the user
//! never sees: watchdog timing, worker shutdown grace, channel sizing, which
//! media kinds may fall back to the universal engine, and where the `ffmpeg`
//! binary lives.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use framepack::{FallbackPolicy, MediaKind, OrchestratorOptions};
//!
//! let options = OrchestratorOptions::new()
//!     .with_stall_timeout(Duration::from_secs(5))
//!     .with_fallback_policy(FallbackPolicy::allow_all().disallow(MediaKind::Webp));
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::engine::FallbackPolicy;
use crate::ffmpeg::FfmpegLogLevel;

/// Environment variable naming the `ffmpeg` binary for the universal engine.
pub const FFMPEG_PATH_ENV: &str = "FRAMEPACK_FFMPEG";

/// Default stall watchdog timeout.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(8);

/// Default time allowed for a cancelled worker to wind down.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Kept small to avoid buffering too many encoded frames between the worker
/// and the orchestrator.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 8;

/// Deployment policy for the [`ExtractionOrchestrator`](crate::ExtractionOrchestrator).
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Watchdog timeout for engines that opt in (the image-frame decoder).
    pub(crate) stall_timeout: Duration,
    /// How long to wait for a cancelled worker thread to exit.
    pub(crate) shutdown_grace: Duration,
    /// Bounded worker channel size.
    pub(crate) channel_capacity: usize,
    /// Media kinds allowed to fall back.
    pub(crate) fallback_policy: FallbackPolicy,
    /// `ffmpeg` binary for the universal engine.
    pub(crate) ffmpeg_program: PathBuf,
    /// `-loglevel` passed to the transcoder.
    pub(crate) transcoder_log_level: FfmpegLogLevel,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorOptions {
    /// Defaults, with the `ffmpeg` path taken from `FRAMEPACK_FFMPEG` when set.
    pub fn new() -> Self {
        let ffmpeg_program = std::env::var_os(FFMPEG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("ffmpeg"));

        Self {
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            fallback_policy: FallbackPolicy::default(),
            ffmpeg_program,
            transcoder_log_level: FfmpegLogLevel::Error,
        }
    }

    /// Set the stall watchdog timeout.
    #[must_use]
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Set the worker shutdown grace period.
    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Set the worker channel capacity. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Set the fallback allow-list.
    #[must_use]
    pub fn with_fallback_policy(mut self, policy: FallbackPolicy) -> Self {
        self.fallback_policy = policy;
        self
    }

    /// Set the `ffmpeg` binary used by the universal engine.
    #[must_use]
    pub fn with_ffmpeg_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.ffmpeg_program = program.into();
        self
    }

    /// Set the transcoder's `-loglevel`.
    #[must_use]
    pub fn with_transcoder_log_level(mut self, level: FfmpegLogLevel) -> Self {
        self.transcoder_log_level = level;
        self
    }

    /// The stall watchdog timeout.
    pub fn stall_timeout(&self) -> Duration {
        self.stall_timeout
    }

    /// The fallback allow-list.
    pub fn fallback_policy(&self) -> &FallbackPolicy {
        &self.fallback_policy
    }

    /// The `ffmpeg` binary used by the universal engine.
    pub fn ffmpeg_program(&self) -> &std::path::Path {
        &self.ffmpeg_program
    }
}
