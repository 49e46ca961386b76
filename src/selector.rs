//! Engine selection.
//!
//! [`select_engine`] is total: whatever the input and however the capability
//! probe misbehaves, it returns an engine. The universal transcoder is the
//! answer of last resort.

use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::capability::{Capability, CapabilityProbe};
use crate::engine::{EngineChoice, ProcessingMode};
use crate::media_kind::MediaKind;
use crate::metadata::FileMetadata;
use crate::settings::ExtractionSettings;
use crate::source::MediaSource;

/// The outcome of engine selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSelection {
    /// Engine to start with.
    pub engine: EngineChoice,
    /// Sniffed kind (or the metadata's kind under an explicit mode).
    pub media_kind: MediaKind,
    /// Why this engine was chosen.
    pub reason: String,
}

/// Pick the cheapest engine that can handle `source`.
///
/// An explicit processing mode wins without probing. Otherwise the head
/// bytes are sniffed and the natural engine for the kind is probed; any
/// negative, failed or panicking probe sends the job to the universal
/// transcoder.
///
/// # Example
///
/// ```no_run
/// use framepack::{ExtractionSettings, MediaProbe, MediaSource, RuntimeCapabilityProbe, select_engine};
///
/// let source = MediaSource::open("clip.mp4")?;
/// let metadata = MediaProbe::probe(&source)?;
/// let selection = select_engine(&source, &ExtractionSettings::new(), &metadata, &RuntimeCapabilityProbe);
/// println!("{} ({})", selection.engine, selection.reason);
/// # Ok::<(), framepack::FramepackError>(())
/// ```
pub fn select_engine(
    source: &MediaSource,
    settings: &ExtractionSettings,
    metadata: &FileMetadata,
    probe: &dyn CapabilityProbe,
) -> EngineSelection {
    if let ProcessingMode::Explicit(engine) = settings.processing_mode {
        return EngineSelection {
            engine,
            media_kind: metadata.media_kind,
            reason: "explicitly requested".to_string(),
        };
    }

    let kind = source.sniff();

    let candidate = if kind.is_image_animation() {
        Some(EngineChoice::ImageFrameDecoder)
    } else if kind.is_video() {
        Some(EngineChoice::HardwareVideoDecoder)
    } else {
        None
    };

    let Some(candidate) = candidate else {
        return EngineSelection {
            engine: EngineChoice::UniversalTranscoder,
            media_kind: kind,
            reason: format!("{kind} has no dedicated engine"),
        };
    };

    let capability = probe_capability(probe, candidate, kind, metadata.codec.as_deref());
    if capability.supported {
        log::info!("Selected {candidate} for {} ({})", source.name(), capability.reason);
        EngineSelection {
            engine: candidate,
            media_kind: kind,
            reason: capability.reason,
        }
    } else {
        log::info!(
            "{candidate} cannot handle {}: {}; using the universal transcoder",
            source.name(),
            capability.reason
        );
        EngineSelection {
            engine: EngineChoice::UniversalTranscoder,
            media_kind: kind,
            reason: format!("{candidate} unsupported: {}", capability.reason),
        }
    }
}

/// Run a capability probe, folding errors and panics into "unsupported".
pub fn probe_capability(
    probe: &dyn CapabilityProbe,
    engine: EngineChoice,
    kind: MediaKind,
    codec_hint: Option<&str>,
) -> Capability {
    match catch_unwind(AssertUnwindSafe(|| probe.probe(engine, kind, codec_hint))) {
        Ok(Ok(capability)) => capability,
        Ok(Err(error)) => {
            log::warn!("Capability probe for {engine} failed: {error}");
            Capability::unsupported(format!("probe failed: {error}"))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::warn!("Capability probe for {engine} panicked: {message}");
            Capability::unsupported(format!("probe panicked: {message}"))
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
