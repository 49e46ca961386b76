//! Decode adapters.
//!
//! Three interchangeable engines implement [`DecodeAdapter`]:
//!
//! | Adapter | Engine | Handles |
//! |---------|--------|---------|
//! | [`ImageFrameAdapter`] | [`EngineChoice::ImageFrameDecoder`] | GIF, APNG, WebP, PNG |
//! | [`HardwareVideoAdapter`] | [`EngineChoice::HardwareVideoDecoder`] | MP4, WebM |
//! | [`UniversalAdapter`] | [`EngineChoice::UniversalTranscoder`] | anything `ffmpeg` reads |
//!
//! Adapters are synchronous and run on a worker thread (see
//! [`worker`](crate::worker)). They push frames into a [`FrameSink`], which
//! owns encoding, numbering, the frame cap, and cancellation checks.

use std::sync::Arc;
use std::time::Duration;

use crate::config::OrchestratorOptions;
use crate::engine::EngineChoice;
use crate::error::FramepackError;
use crate::frame::DecodedFrame;
use crate::metadata::FileMetadata;
use crate::settings::ExtractionSettings;
use crate::source::MediaSource;

pub mod hardware_video;
pub mod image_frame;
pub mod universal;

pub use hardware_video::HardwareVideoAdapter;
pub use image_frame::ImageFrameAdapter;
pub use universal::UniversalAdapter;

/// Everything an adapter needs to know about the job it runs.
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    /// Input file.
    pub source: MediaSource,
    /// Header metadata.
    pub metadata: FileMetadata,
    /// Caller settings.
    pub settings: ExtractionSettings,
}

/// Whether an adapter should keep producing frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep going.
    Continue,
    /// The frame cap has been reached; finish cleanly.
    Stop,
}

/// The adapter-facing half of the worker boundary.
pub trait FrameSink {
    /// Whether the job or this worker has been cancelled.
    fn is_cancelled(&self) -> bool;

    /// Report that engine-specific initialisation is complete.
    fn ready(&mut self, detail: &str);

    /// Emit one frame.
    ///
    /// # Errors
    ///
    /// Returns [`FramepackError::Cancelled`] once cancellation has been
    /// observed; adapters must propagate it and stop.
    fn emit_frame(&mut self, frame: DecodedFrame) -> Result<Flow, FramepackError>;

    /// Report the decoded frame size when the container header did not
    /// carry one.
    fn report_frame_size(&mut self, width: u32, height: u32);

    /// Report progress: `done` frames so far out of an estimated total.
    fn emit_progress(&mut self, done: u64, estimated_total: Option<u64>);

    /// Frames accepted so far.
    fn frames_emitted(&self) -> u64;
}

/// A frame-producing engine.
pub trait DecodeAdapter: Send {
    /// The engine this adapter implements.
    fn engine(&self) -> EngineChoice;

    /// Silence after which the orchestrator declares this adapter stalled.
    /// `None` disables the watchdog.
    fn stall_timeout(&self) -> Option<Duration> {
        None
    }

    /// Run the extraction, returning the number of frames emitted.
    ///
    /// Implementations must check [`FrameSink::is_cancelled`] (or rely on
    /// [`FrameSink::emit_frame`] failing) at least once per frame, and must
    /// return [`FramepackError::NoFrames`] rather than `Ok(0)`.
    fn extract(
        &mut self,
        job: &ExtractionJob,
        sink: &mut dyn FrameSink,
    ) -> Result<u64, FramepackError>;
}

/// Builds a fresh adapter for an engine. One adapter instance per engine
/// run; nothing is shared between runs.
pub trait AdapterFactory: Send + Sync {
    /// Create the adapter for `engine`.
    fn create(&self, engine: EngineChoice) -> Box<dyn DecodeAdapter>;
}

/// The production factory: the three real engines.
#[derive(Debug, Clone)]
pub struct DefaultAdapterFactory {
    options: Arc<OrchestratorOptions>,
}

impl DefaultAdapterFactory {
    /// Create a factory configured by `options`.
    pub fn new(options: OrchestratorOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }
}

impl Default for DefaultAdapterFactory {
    fn default() -> Self {
        Self::new(OrchestratorOptions::new())
    }
}

impl AdapterFactory for DefaultAdapterFactory {
    fn create(&self, engine: EngineChoice) -> Box<dyn DecodeAdapter> {
        match engine {
            EngineChoice::ImageFrameDecoder => {
                Box::new(ImageFrameAdapter::new(self.options.stall_timeout))
            }
            EngineChoice::HardwareVideoDecoder => Box::new(HardwareVideoAdapter::new()),
            EngineChoice::UniversalTranscoder => Box::new(UniversalAdapter::new(
                self.options.ffmpeg_program.clone(),
                self.options.transcoder_log_level,
            )),
        }
    }
}

/// Turn a finished run's count into the adapter result, rejecting empty
/// runs with an actionable message.
pub(crate) fn finish_run(engine: EngineChoice, emitted: u64) -> Result<u64, FramepackError> {
    if emitted == 0 {
        Err(FramepackError::no_frames(engine))
    } else {
        Ok(emitted)
    }
}
