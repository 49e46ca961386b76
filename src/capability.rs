//! Runtime capability probing.
//!
//! The engine selector never assumes an engine works: it asks a
//! [`CapabilityProbe`] first. [`RuntimeCapabilityProbe`] answers from the
//! running process, meaning the decoders compiled into the `image` crate and
//! the decoders and hardware devices of the linked FFmpeg.

use image::ImageFormat;

use crate::engine::EngineChoice;
use crate::error::FramepackError;
use crate::ffmpeg::ensure_initialized;
use crate::media_kind::MediaKind;

/// A probe verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    /// Whether the engine can handle the input.
    pub supported: bool,
    /// Human-readable explanation, shown by `framepack engine`.
    pub reason: String,
}

impl Capability {
    /// A positive verdict.
    pub fn supported(reason: impl Into<String>) -> Self {
        Self {
            supported: true,
            reason: reason.into(),
        }
    }

    /// A negative verdict.
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self {
            supported: false,
            reason: reason.into(),
        }
    }
}

/// Answers "can this engine handle this input here and now?".
///
/// Implementations may fail or even panic; the selector treats both as
/// "unsupported".
pub trait CapabilityProbe: Send + Sync {
    /// Probe `engine` for a file of `kind`, optionally encoded with
    /// `codec_hint` (container codec name such as `"h264"`).
    fn probe(
        &self,
        engine: EngineChoice,
        kind: MediaKind,
        codec_hint: Option<&str>,
    ) -> Result<Capability, FramepackError>;
}

/// Probe backed by real runtime queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeCapabilityProbe;

impl RuntimeCapabilityProbe {
    /// Create the probe.
    pub fn new() -> Self {
        Self
    }
}

impl CapabilityProbe for RuntimeCapabilityProbe {
    fn probe(
        &self,
        engine: EngineChoice,
        kind: MediaKind,
        codec_hint: Option<&str>,
    ) -> Result<Capability, FramepackError> {
        match engine {
            EngineChoice::ImageFrameDecoder => Ok(probe_image_decoder(kind)),
            EngineChoice::HardwareVideoDecoder => probe_video_decoder(kind, codec_hint),
            EngineChoice::UniversalTranscoder => {
                Ok(Capability::supported("the transcoder accepts any input"))
            }
        }
    }
}

fn probe_image_decoder(kind: MediaKind) -> Capability {
    let format = match kind {
        MediaKind::Gif => ImageFormat::Gif,
        MediaKind::Apng | MediaKind::Png => ImageFormat::Png,
        MediaKind::Webp => ImageFormat::WebP,
        other => return Capability::unsupported(format!("{other} is not an image animation")),
    };

    if format.reading_enabled() {
        Capability::supported(format!("{format:?} decoder is compiled in"))
    } else {
        Capability::unsupported(format!("{format:?} decoding is disabled in this build"))
    }
}

fn probe_video_decoder(
    kind: MediaKind,
    codec_hint: Option<&str>,
) -> Result<Capability, FramepackError> {
    if !kind.is_video() {
        return Ok(Capability::unsupported(format!("{kind} is not a video container")));
    }

    let codec_name = match codec_hint {
        Some(name) => name,
        None => match kind {
            MediaKind::Webm => "vp9",
            _ => "h264",
        },
    };

    ensure_initialized()?;
    let Some(codec) = ffmpeg_next::decoder::find_by_name(codec_name) else {
        return Ok(Capability::unsupported(format!(
            "no FFmpeg decoder for {codec_name}"
        )));
    };

    probe_hardware(codec_name, unsafe { codec.as_ptr() })
}

#[cfg(feature = "hardware")]
fn probe_hardware(
    codec_name: &str,
    codec: *const ffmpeg_sys_next::AVCodec,
) -> Result<Capability, FramepackError> {
    if crate::hardware::available_hardware_devices().is_empty() {
        return Ok(Capability::unsupported(
            "FFmpeg was built without hardware device support",
        ));
    }

    Ok(match crate::hardware::usable_device_for_codec(codec) {
        Some(device) => Capability::supported(format!("{codec_name} decodes on {device:?}")),
        None => Capability::unsupported(format!(
            "no hardware device on this host can decode {codec_name}"
        )),
    })
}

#[cfg(not(feature = "hardware"))]
fn probe_hardware(
    _codec_name: &str,
    _codec: *const ffmpeg_sys_next::AVCodec,
) -> Result<Capability, FramepackError> {
    Ok(Capability::unsupported(
        "built without the `hardware` feature",
    ))
}
