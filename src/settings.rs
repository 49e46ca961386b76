//! Extraction settings.
//!
//! [`ExtractionSettings`] is the immutable value object a caller builds once
//! per job: what to sample, how to encode each frame, how to name it, and how
//! to split the output into archive parts.
//!
//! # Example
//!
//! ```
//! use framepack::{ExtractionSettings, OutputFormat, SamplingMode};
//!
//! let settings = ExtractionSettings::new()
//!     .with_sampling(SamplingMode::Fps(5.0))
//!     .with_output_format(OutputFormat::Jpeg { quality: 85 })
//!     .with_resolution(Some(640), None)
//!     .with_split(250);
//!
//! assert_eq!(settings.split.frames_per_part, 250);
//! ```

use std::time::Duration;

use crate::engine::{EngineChoice, ProcessingMode};

/// Default frame cap. Large enough for any sane job, small enough that a
/// mistaken `Every` on a feature-length video does not fill the disk.
pub const DEFAULT_MAX_FRAMES: u64 = 10_000;

/// Frame rate assumed for formats without a timebase (GIF-style delays of
/// zero, or no delays at all).
pub const DEFAULT_ASSUMED_FPS: f64 = 10.0;

/// Default naming template for frame entries.
pub const DEFAULT_NAMING_TEMPLATE: &str = "{name}_{index:05}.{ext}";

/// Which frames to keep.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SamplingMode {
    /// Every source frame.
    #[default]
    Every,
    /// A target output frame rate.
    Fps(f64),
    /// Every Nth source frame, starting with the first.
    Nth(u32),
    /// Every frame whose timestamp falls in `[start, end]`.
    TimeRange {
        /// Window start.
        start: Duration,
        /// Window end (inclusive).
        end: Duration,
    },
}

/// Encoded image format for extracted frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// PNG with fast compression.
    #[default]
    Png,
    /// PNG with best compression and adaptive filtering. Smaller, slower.
    PngCompressed,
    /// JPEG at the given quality (1-100).
    Jpeg {
        /// Encoder quality, clamped to 1-100 when encoding.
        quality: u8,
    },
}

impl OutputFormat {
    /// File extension for this format.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png | OutputFormat::PngCompressed => "png",
            OutputFormat::Jpeg { .. } => "jpg",
        }
    }
}

/// Output resolution.
///
/// When no dimensions are set the source resolution is used. Setting one
/// dimension together with `maintain_aspect_ratio` computes the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rescale {
    /// Target width. `None` keeps the source width.
    pub width: Option<u32>,
    /// Target height. `None` keeps the source height.
    pub height: Option<u32>,
    /// Derive the missing dimension from the source aspect ratio.
    pub maintain_aspect_ratio: bool,
}

impl Default for Rescale {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            maintain_aspect_ratio: true,
        }
    }
}

impl Rescale {
    /// Whether any resizing is requested.
    pub fn is_identity(&self) -> bool {
        self.width.is_none() && self.height.is_none()
    }

    /// Resolve the final output dimensions given the source size.
    pub fn resolve(&self, source_width: u32, source_height: u32) -> (u32, u32) {
        match (self.width, self.height) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) if self.maintain_aspect_ratio && source_width > 0 => {
                let ratio = w as f64 / source_width as f64;
                let h = (source_height as f64 * ratio).round() as u32;
                (w, h.max(1))
            }
            (Some(w), None) => (w, source_height),
            (None, Some(h)) if self.maintain_aspect_ratio && source_height > 0 => {
                let ratio = h as f64 / source_height as f64;
                let w = (source_width as f64 * ratio).round() as u32;
                (w.max(1), h)
            }
            (None, Some(h)) => (source_width, h),
            (None, None) => (source_width, source_height),
        }
    }
}

/// Split-export parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitSettings {
    /// Emit several archives instead of one.
    pub enabled: bool,
    /// Frames per archive part. Must be at least 1 when enabled.
    pub frames_per_part: u64,
    /// Deliver each part to the user as soon as it is ready. A UI concern
    /// only; archive contents are identical either way.
    pub auto_download: bool,
}

impl Default for SplitSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            frames_per_part: 250,
            auto_download: false,
        }
    }
}

/// Everything the caller decides about one extraction job.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSettings {
    /// Which frames to keep.
    pub sampling: SamplingMode,
    /// Output resolution.
    pub rescale: Rescale,
    /// Encoded image format.
    pub output_format: OutputFormat,
    /// Hard cap on frames produced.
    pub max_frames: u64,
    /// Entry naming template; see [`render_frame_name`].
    pub naming_template: String,
    /// Archive splitting.
    pub split: SplitSettings,
    /// Engine selection mode.
    pub processing_mode: ProcessingMode,
    /// Display rate for timebase-less animations.
    pub assumed_fps: f64,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionSettings {
    /// Defaults: every frame, source size, PNG, 10 000 frame cap, one
    /// archive, automatic engine selection.
    pub fn new() -> Self {
        Self {
            sampling: SamplingMode::Every,
            rescale: Rescale::default(),
            output_format: OutputFormat::Png,
            max_frames: DEFAULT_MAX_FRAMES,
            naming_template: DEFAULT_NAMING_TEMPLATE.to_string(),
            split: SplitSettings::default(),
            processing_mode: ProcessingMode::Auto,
            assumed_fps: DEFAULT_ASSUMED_FPS,
        }
    }

    /// Set the sampling mode.
    #[must_use]
    pub fn with_sampling(mut self, sampling: SamplingMode) -> Self {
        self.sampling = sampling;
        self
    }

    /// Set a target resolution. `None` keeps the source value; with one
    /// dimension given the other follows the aspect ratio.
    #[must_use]
    pub fn with_resolution(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.rescale.width = width;
        self.rescale.height = height;
        self
    }

    /// Control aspect-ratio preservation. Defaults to `true`.
    #[must_use]
    pub fn with_maintain_aspect_ratio(mut self, maintain: bool) -> Self {
        self.rescale.maintain_aspect_ratio = maintain;
        self
    }

    /// Set the output image format.
    #[must_use]
    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Set the frame cap. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_max_frames(mut self, max_frames: u64) -> Self {
        self.max_frames = max_frames.max(1);
        self
    }

    /// Set the entry naming template.
    #[must_use]
    pub fn with_naming_template(mut self, template: impl Into<String>) -> Self {
        self.naming_template = template.into();
        self
    }

    /// Enable split export with `frames_per_part` frames per archive.
    #[must_use]
    pub fn with_split(mut self, frames_per_part: u64) -> Self {
        self.split.enabled = true;
        self.split.frames_per_part = frames_per_part;
        self
    }

    /// Toggle immediate per-part delivery.
    #[must_use]
    pub fn with_auto_download(mut self, auto_download: bool) -> Self {
        self.split.auto_download = auto_download;
        self
    }

    /// Force a specific engine.
    #[must_use]
    pub fn with_engine(mut self, engine: EngineChoice) -> Self {
        self.processing_mode = ProcessingMode::Explicit(engine);
        self
    }

    /// Set the engine selection mode.
    #[must_use]
    pub fn with_processing_mode(mut self, mode: ProcessingMode) -> Self {
        self.processing_mode = mode;
        self
    }

    /// Set the display rate assumed for timebase-less animations.
    #[must_use]
    pub fn with_assumed_fps(mut self, fps: f64) -> Self {
        self.assumed_fps = fps;
        self
    }
}

/// Render a frame entry name from `template`.
///
/// Placeholders: `{name}` (source stem), `{index}` / `{index:0N}` (frame
/// index, optionally zero-padded to N digits), `{ms}` (timestamp in
/// milliseconds), `{ext}` (format extension). Unknown placeholders are kept
/// verbatim. Path separators in the result are replaced with `_` so entries
/// stay at the archive root.
///
/// # Example
///
/// ```
/// use framepack::render_frame_name;
///
/// let name = render_frame_name("{name}_{index:04}.{ext}", "clip", 7, 700, "png");
/// assert_eq!(name, "clip_0007.png");
/// ```
pub fn render_frame_name(
    template: &str,
    stem: &str,
    index: u64,
    timestamp_ms: u64,
    extension: &str,
) -> String {
    let mut output = String::with_capacity(template.len() + 16);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            output.push_str(&rest[open..]);
            rest = "";
            break;
        };
        let placeholder = &after[..close];
        match placeholder {
            "name" => output.push_str(stem),
            "index" => output.push_str(&index.to_string()),
            "ms" => output.push_str(&timestamp_ms.to_string()),
            "ext" => output.push_str(extension),
            other => match other.strip_prefix("index:").and_then(|w| w.parse::<usize>().ok()) {
                Some(width) => output.push_str(&format!("{index:0width$}")),
                None => {
                    output.push('{');
                    output.push_str(other);
                    output.push('}');
                }
            },
        }
        rest = &after[close + 1..];
    }
    output.push_str(rest);

    output.replace(['/', '\\'], "_")
}
