//! File metadata.
//!
//! [`FileMetadata`] is produced once per input by
//! [`MediaProbe::probe`](crate::MediaProbe::probe) from container headers
//! only, before any extraction starts, and is read-only afterwards.

use std::time::Duration;

use crate::media_kind::MediaKind;

/// Header-level description of an input file.
///
/// # Example
///
/// ```no_run
/// use framepack::{MediaProbe, MediaSource};
///
/// let source = MediaSource::open("clip.webm")?;
/// let metadata = MediaProbe::probe(&source)?;
/// println!("{}x{} {:?}", metadata.width, metadata.height, metadata.codec);
/// # Ok::<(), framepack::FramepackError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct FileMetadata {
    /// Duration in seconds. `0.0` for formats without a meaningful timebase
    /// (GIF and friends use an assumed display fps instead).
    pub duration_seconds: f64,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Source frame rate, when the container declares one.
    pub fps: Option<f64>,
    /// Codec name (e.g. `"h264"`, `"vp9"`), video containers only.
    pub codec: Option<String>,
    /// File size in bytes.
    pub size_bytes: u64,
    /// File name.
    pub name: String,
    /// Sniffed content kind.
    pub media_kind: MediaKind,
    /// Frame count reported by the track header, if any. `None` or `Some(0)`
    /// means "unknown" and forces a counting pass in the image adapter.
    pub frame_count: Option<u64>,
}

impl FileMetadata {
    /// Metadata for a file nothing could be learned about.
    pub fn unknown(name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            duration_seconds: 0.0,
            width: 0,
            height: 0,
            fps: None,
            codec: None,
            size_bytes,
            name: name.into(),
            media_kind: MediaKind::Unknown,
            frame_count: None,
        }
    }

    /// Duration as a [`Duration`].
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_seconds.max(0.0))
    }

    /// The frame rate to reason with: the declared one when positive,
    /// otherwise `assumed`.
    pub fn effective_fps(&self, assumed: f64) -> f64 {
        self.fps.filter(|fps| *fps > 0.0).unwrap_or(assumed)
    }

    /// Whether the dimensions have been populated.
    pub fn has_dimensions(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// The track-reported frame count, if it is trustworthy (non-zero).
    pub fn reported_frame_count(&self) -> Option<u64> {
        self.frame_count.filter(|count| *count > 0)
    }
}
