//! Error types for the `framepack` crate.
//!
//! [`FramepackError`] is the single error type returned by every fallible
//! operation. Variants are grouped by where they originate: adapter failures
//! (which may trigger an engine fallback), terminal failures (surfaced to the
//! caller), packaging failures, and cancellation.
//!
//! Messages are written for the person running the extraction: each adapter
//! failure names the engine and, where one exists, a concrete next step.

use std::{io::Error as IoError, time::Duration};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;
use zip::result::ZipError;

use crate::engine::EngineChoice;
use crate::media_kind::MediaKind;

/// The unified error type for all `framepack` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FramepackError {
    /// The input file could not be read.
    #[error("Failed to open {path}: {reason}")]
    FileOpen {
        /// Path that was passed to [`MediaSource::open`](crate::MediaSource::open).
        path: String,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The decoder for the detected codec is not available on this system.
    #[error(
        "The {codec} codec cannot be decoded by the {engine} engine on this system; \
         try the universal engine (--engine universal)"
    )]
    UnsupportedCodec {
        /// Engine that rejected the codec.
        engine: EngineChoice,
        /// Codec name as reported by the container.
        codec: String,
    },

    /// The container could not be split into decodable packets.
    #[error(
        "Could not read the {container} container: {reason}. The file may be truncated \
         or use a layout this engine does not parse; the universal engine usually copes"
    )]
    Demux {
        /// Detected container kind.
        container: MediaKind,
        /// What went wrong while demuxing.
        reason: String,
    },

    /// A frame failed to decode.
    #[error("{engine} failed to decode frame {frame}: {reason}")]
    DecodeFailed {
        /// Engine that was decoding.
        engine: EngineChoice,
        /// Source frame position at which decoding failed.
        frame: u64,
        /// Decoder message.
        reason: String,
    },

    /// The adapter produced no output within the watchdog timeout.
    #[error("{engine} stalled: no frame produced within {timeout:?}")]
    Stalled {
        /// Engine that stalled.
        engine: EngineChoice,
        /// The watchdog timeout that elapsed.
        timeout: Duration,
    },

    /// The adapter thread panicked or disappeared without reporting a result.
    #[error("{engine} stopped unexpectedly: {reason}")]
    AdapterCrashed {
        /// Engine that crashed.
        engine: EngineChoice,
        /// Panic payload or a description of the disconnect.
        reason: String,
    },

    /// Extraction finished without producing a single frame.
    #[error("No frames were extracted by {engine}; {suggestion}")]
    NoFrames {
        /// Engine that produced nothing.
        engine: EngineChoice,
        /// Actionable hint for the user.
        suggestion: String,
    },

    /// The `ffmpeg` transcoder binary could not be started.
    #[error(
        "The ffmpeg transcoder could not be started ({program}): {reason}. \
         Install ffmpeg or point FRAMEPACK_FFMPEG at it"
    )]
    TranscoderUnavailable {
        /// Program that was invoked.
        program: String,
        /// Spawn error.
        reason: String,
    },

    /// The transcoder exited with a failure status.
    #[error("The ffmpeg transcoder failed (exit status {status}): {stderr}")]
    TranscoderFailed {
        /// Exit status, or -1 when killed by a signal.
        status: i32,
        /// Last lines of the transcoder's stderr.
        stderr: String,
    },

    /// Writing an archive part failed. Partial output is discarded.
    #[error("Failed to write archive part: {0}")]
    Archive(#[from] ZipError),

    /// Extraction settings or metadata failed validation.
    #[error("Invalid extraction settings: {0}")]
    InvalidSettings(String),

    /// `start` was called before a file was loaded.
    #[error("No file has been loaded; call load() before start()")]
    NotReady,

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// An error from the `image` crate while decoding or encoding a frame.
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,
}

impl FramepackError {
    /// Returns `true` for failures that belong to the adapter currently
    /// running and may therefore be retried on another engine.
    ///
    /// Cancellation, packaging and settings errors are never retried.
    pub fn is_adapter_failure(&self) -> bool {
        !matches!(
            self,
            FramepackError::Cancelled
                | FramepackError::Archive(_)
                | FramepackError::InvalidSettings(_)
                | FramepackError::NotReady
        )
    }

    /// Build the "no frames" error with the standard suggestion for `engine`.
    pub(crate) fn no_frames(engine: EngineChoice) -> Self {
        FramepackError::NoFrames {
            engine,
            suggestion: "try a lower sampling rate, a shorter time range, or a different engine"
                .to_string(),
        }
    }
}

impl From<FfmpegError> for FramepackError {
    fn from(error: FfmpegError) -> Self {
        FramepackError::Ffmpeg(error.to_string())
    }
}
