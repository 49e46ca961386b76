//! Processing engines and the fallback policy.

use std::collections::HashSet;
use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::media_kind::MediaKind;

/// One of the three interchangeable frame-producing engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineChoice {
    /// `image`-crate animation decoders for GIF, APNG and WebP.
    ImageFrameDecoder,
    /// FFmpeg demux + decode, hardware accelerated when available.
    HardwareVideoDecoder,
    /// The `ffmpeg` command-line transcoder. Slowest, handles everything,
    /// and is the fallback target for the other two.
    UniversalTranscoder,
}

impl EngineChoice {
    /// Every engine, cheapest first.
    pub const ALL: [EngineChoice; 3] = [
        EngineChoice::ImageFrameDecoder,
        EngineChoice::HardwareVideoDecoder,
        EngineChoice::UniversalTranscoder,
    ];

    /// Short name used by the CLI and in log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            EngineChoice::ImageFrameDecoder => "image",
            EngineChoice::HardwareVideoDecoder => "video",
            EngineChoice::UniversalTranscoder => "universal",
        }
    }

    /// Parse a CLI-style engine name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "image" | "image-frame" | "imageframe" => Some(EngineChoice::ImageFrameDecoder),
            "video" | "hardware" | "hw" | "hardware-video" => {
                Some(EngineChoice::HardwareVideoDecoder)
            }
            "universal" | "ffmpeg" | "transcoder" => Some(EngineChoice::UniversalTranscoder),
            _ => None,
        }
    }

    /// Whether this is the universal fallback engine.
    pub fn is_universal(self) -> bool {
        self == EngineChoice::UniversalTranscoder
    }
}

impl Display for EngineChoice {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let label = match self {
            EngineChoice::ImageFrameDecoder => "image-frame decoder",
            EngineChoice::HardwareVideoDecoder => "hardware video decoder",
            EngineChoice::UniversalTranscoder => "universal transcoder",
        };
        f.write_str(label)
    }
}

/// How the engine for a job is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Sniff the file and probe the runtime.
    #[default]
    Auto,
    /// User override. Honored without probing; only the fallback path may
    /// move the job off this engine.
    Explicit(EngineChoice),
}

/// Which media kinds may fall back to the universal engine after the
/// primary engine fails.
///
/// Some deployments ship a transcoder build that mishandles animated WebP
/// or APNG; removing those kinds here turns a primary-engine failure into a
/// terminal error instead of a doomed retry.
///
/// # Example
///
/// ```
/// use framepack::{FallbackPolicy, MediaKind};
///
/// let policy = FallbackPolicy::allow_all().disallow(MediaKind::Webp);
/// assert!(policy.allows(MediaKind::Gif));
/// assert!(!policy.allows(MediaKind::Webp));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPolicy {
    allowed: HashSet<MediaKind>,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self::allow_all()
    }
}

impl FallbackPolicy {
    /// Every media kind may fall back.
    pub fn allow_all() -> Self {
        Self {
            allowed: MediaKind::ALL.into_iter().collect(),
        }
    }

    /// No media kind may fall back.
    pub fn deny_all() -> Self {
        Self {
            allowed: HashSet::new(),
        }
    }

    /// Remove `kind` from the allow-list.
    #[must_use]
    pub fn disallow(mut self, kind: MediaKind) -> Self {
        self.allowed.remove(&kind);
        self
    }

    /// Add `kind` to the allow-list.
    #[must_use]
    pub fn allow(mut self, kind: MediaKind) -> Self {
        self.allowed.insert(kind);
        self
    }

    /// Whether a failed primary engine may be replaced for this kind.
    pub fn allows(&self, kind: MediaKind) -> bool {
        self.allowed.contains(&kind)
    }
}
