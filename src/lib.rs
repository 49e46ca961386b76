//! # framepack
//!
//! Extract frames from animated media (MP4, WebM, GIF, APNG, WebP) and pack
//! them into one or more zip archives.
//!
//! `framepack` picks the cheapest engine that can decode a file, runs it on
//! a worker thread, and falls back to the `ffmpeg` command-line transcoder
//! if that engine fails partway through, without mixing output from the two.
//! Frames are streamed into archive parts of a fixed frame count, each
//! handed to the caller as soon as it fills, so memory stays bounded however
//! long the input is.
//!
//! ## Quick Start
//!
//! ```no_run
//! use framepack::{
//!     ArchivePart, ExtractionEvents, ExtractionOrchestrator, ExtractionSettings,
//!     OrchestratorOptions, SamplingMode,
//! };
//!
//! struct WriteParts;
//!
//! impl ExtractionEvents for WriteParts {
//!     fn on_part_ready(&mut self, part: ArchivePart) {
//!         std::fs::write(&part.filename, &part.archive_bytes).unwrap();
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), framepack::FramepackError> {
//! let settings = ExtractionSettings::new()
//!     .with_sampling(SamplingMode::Fps(5.0))
//!     .with_split(250);
//!
//! let mut orchestrator = ExtractionOrchestrator::new(OrchestratorOptions::new());
//! let selection = orchestrator.open("input.mp4", settings)?;
//! println!("Using the {}", selection.engine);
//!
//! let summary = orchestrator.start(&mut WriteParts).await?;
//! println!("{} frames in {} parts", summary.total_frames, summary.parts);
//! # Ok(())
//! # }
//! ```
//!
//! ## Engines
//!
//! | Engine | Inputs | Backend |
//! |--------|--------|---------|
//! | Image-frame decoder | GIF, APNG, WebP, PNG | `image` crate animation decoders |
//! | Hardware video decoder | MP4, WebM | FFmpeg via `ffmpeg-next` |
//! | Universal transcoder | anything | the `ffmpeg` binary |
//!
//! Selection sniffs the file's leading bytes (declared types are not
//! trusted) and asks a [`CapabilityProbe`] before committing to an engine.
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `hardware` | FFmpeg hardware device contexts (CUDA, VAAPI, DXVA2, D3D11VA, VideoToolbox, QSV) |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed to build, and the `ffmpeg`
//! binary must be on `PATH` (or named by `FRAMEPACK_FFMPEG`) for the
//! universal engine.

pub mod adapter;
pub mod capability;
pub mod config;
mod conversion;
mod encode;
pub mod engine;
pub mod error;
pub mod ffmpeg;
pub mod frame;
#[cfg(feature = "hardware")]
pub mod hardware;
pub mod job;
pub mod media_kind;
pub mod metadata;
pub mod orchestrator;
pub mod packager;
pub mod probe;
pub mod progress;
pub mod sampling;
pub mod selector;
pub mod settings;
pub mod source;
pub mod validation;
pub mod worker;

pub use adapter::{
    AdapterFactory, DecodeAdapter, DefaultAdapterFactory, ExtractionJob, Flow, FrameSink,
    HardwareVideoAdapter, ImageFrameAdapter, UniversalAdapter,
};
pub use capability::{Capability, CapabilityProbe, RuntimeCapabilityProbe};
pub use config::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_SHUTDOWN_GRACE, DEFAULT_STALL_TIMEOUT, FFMPEG_PATH_ENV,
    OrchestratorOptions,
};
pub use engine::{EngineChoice, FallbackPolicy, ProcessingMode};
pub use error::FramepackError;
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use frame::{DecodedFrame, ExtractedFrame};
#[cfg(feature = "hardware")]
pub use hardware::{HardwareDeviceType, available_hardware_devices, hardware_decode_available};
pub use job::{FrameRecord, JobState, PartRecord, Phase};
pub use media_kind::{MediaKind, SNIFF_LEN, sniff_true_type};
pub use metadata::FileMetadata;
pub use orchestrator::{
    ExtractionEvents, ExtractionOrchestrator, JobSummary, NoopEvents, RestartNotice,
};
pub use packager::{ArchivePackager, ArchivePart};
pub use probe::MediaProbe;
pub use progress::{CancellationToken, Progress};
pub use sampling::{FrameSelector, Selection, transcoder_rate};
pub use selector::{EngineSelection, probe_capability, select_engine};
pub use settings::{
    ExtractionSettings, OutputFormat, Rescale, SamplingMode, SplitSettings, render_frame_name,
};
pub use source::MediaSource;
pub use validation::{ValidationReport, validate_job};
pub use worker::WorkerMessage;
