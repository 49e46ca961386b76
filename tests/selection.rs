//! Engine selection tests with scripted capability probes.

use std::path::PathBuf;
use std::sync::Mutex;

use framepack::{
    Capability, CapabilityProbe, EngineChoice, ExtractionSettings, FileMetadata, FramepackError,
    MediaKind, MediaSource, probe_capability, select_engine,
};
use tempfile::TempDir;

/// A probe with a fixed answer per engine, recording what it was asked.
struct ScriptedProbe {
    image: bool,
    video: bool,
    calls: Mutex<Vec<(EngineChoice, MediaKind)>>,
}

impl ScriptedProbe {
    fn new(image: bool, video: bool) -> Self {
        Self {
            image,
            video,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(EngineChoice, MediaKind)> {
        self.calls.lock().unwrap().clone()
    }
}

impl CapabilityProbe for ScriptedProbe {
    fn probe(
        &self,
        engine: EngineChoice,
        kind: MediaKind,
        _codec_hint: Option<&str>,
    ) -> Result<Capability, FramepackError> {
        self.calls.lock().unwrap().push((engine, kind));
        let supported = match engine {
            EngineChoice::ImageFrameDecoder => self.image,
            EngineChoice::HardwareVideoDecoder => self.video,
            EngineChoice::UniversalTranscoder => true,
        };
        Ok(if supported {
            Capability::supported("scripted yes")
        } else {
            Capability::unsupported("scripted no")
        })
    }
}

struct FailingProbe;

impl CapabilityProbe for FailingProbe {
    fn probe(
        &self,
        _engine: EngineChoice,
        _kind: MediaKind,
        _codec_hint: Option<&str>,
    ) -> Result<Capability, FramepackError> {
        Err(FramepackError::Ffmpeg("probe exploded".to_string()))
    }
}

struct PanickingProbe;

impl CapabilityProbe for PanickingProbe {
    fn probe(
        &self,
        _engine: EngineChoice,
        _kind: MediaKind,
        _codec_hint: Option<&str>,
    ) -> Result<Capability, FramepackError> {
        panic!("probe panicked on purpose");
    }
}

fn write_file(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn gif_bytes() -> Vec<u8> {
    b"GIF89a\x01\x00\x01\x00\x00\x00\x00;".to_vec()
}

fn mp4_bytes() -> Vec<u8> {
    let mut bytes = vec![0, 0, 0, 0x18];
    bytes.extend_from_slice(b"ftypisom\x00\x00\x02\x00isomiso2");
    bytes
}

fn select(path: &PathBuf, settings: &ExtractionSettings, probe: &dyn CapabilityProbe) -> (EngineChoice, MediaKind) {
    let source = MediaSource::open(path).unwrap();
    let metadata = FileMetadata::unknown(source.name(), source.size_bytes());
    let selection = select_engine(&source, settings, &metadata, probe);
    (selection.engine, selection.media_kind)
}

// ── Auto selection ─────────────────────────────────────────────────

#[test]
fn gif_goes_to_image_decoder_when_supported() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "spinner.gif", &gif_bytes());
    let probe = ScriptedProbe::new(true, true);

    let (engine, kind) = select(&path, &ExtractionSettings::new(), &probe);
    assert_eq!(engine, EngineChoice::ImageFrameDecoder);
    assert_eq!(kind, MediaKind::Gif);
    assert_eq!(probe.calls(), vec![(EngineChoice::ImageFrameDecoder, MediaKind::Gif)]);
}

#[test]
fn mp4_goes_to_video_decoder_when_supported() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "clip.mp4", &mp4_bytes());
    let probe = ScriptedProbe::new(true, true);

    let (engine, kind) = select(&path, &ExtractionSettings::new(), &probe);
    assert_eq!(engine, EngineChoice::HardwareVideoDecoder);
    assert_eq!(kind, MediaKind::Mp4);
}

#[test]
fn unsupported_video_falls_to_universal() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "clip.mp4", &mp4_bytes());
    let probe = ScriptedProbe::new(true, false);

    let (engine, _) = select(&path, &ExtractionSettings::new(), &probe);
    assert_eq!(engine, EngineChoice::UniversalTranscoder);
}

#[test]
fn mislabelled_gif_is_sniffed_as_gif() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "not_really.mp4", &gif_bytes());
    let probe = ScriptedProbe::new(true, true);

    let (engine, kind) = select(&path, &ExtractionSettings::new(), &probe);
    assert_eq!(engine, EngineChoice::ImageFrameDecoder);
    assert_eq!(kind, MediaKind::Gif);
}

#[test]
fn unknown_content_goes_to_universal_without_probing() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "mystery.bin", b"definitely not media");
    let probe = ScriptedProbe::new(true, true);

    let (engine, kind) = select(&path, &ExtractionSettings::new(), &probe);
    assert_eq!(engine, EngineChoice::UniversalTranscoder);
    assert_eq!(kind, MediaKind::Unknown);
    assert!(probe.calls().is_empty());
}

#[test]
fn empty_file_goes_to_universal() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "empty.gif", b"");
    let probe = ScriptedProbe::new(true, true);

    let (engine, _) = select(&path, &ExtractionSettings::new(), &probe);
    assert_eq!(engine, EngineChoice::UniversalTranscoder);
}

// ── Misbehaving probes ─────────────────────────────────────────────

#[test]
fn failing_probe_selects_universal() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "spinner.gif", &gif_bytes());

    let (engine, _) = select(&path, &ExtractionSettings::new(), &FailingProbe);
    assert_eq!(engine, EngineChoice::UniversalTranscoder);
}

#[test]
fn panicking_probe_selects_universal() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "clip.mp4", &mp4_bytes());

    let (engine, _) = select(&path, &ExtractionSettings::new(), &PanickingProbe);
    assert_eq!(engine, EngineChoice::UniversalTranscoder);
}

#[test]
fn probe_capability_folds_errors() {
    let capability = probe_capability(
        &FailingProbe,
        EngineChoice::HardwareVideoDecoder,
        MediaKind::Mp4,
        Some("h264"),
    );
    assert!(!capability.supported);
    assert!(capability.reason.contains("probe exploded"));

    let capability = probe_capability(
        &PanickingProbe,
        EngineChoice::HardwareVideoDecoder,
        MediaKind::Mp4,
        None,
    );
    assert!(!capability.supported);
    assert!(capability.reason.contains("panicked"));
}

// ── Explicit mode ──────────────────────────────────────────────────

#[test]
fn explicit_engine_is_honored_without_probing() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "spinner.gif", &gif_bytes());
    let probe = ScriptedProbe::new(false, false);
    let settings = ExtractionSettings::new().with_engine(EngineChoice::HardwareVideoDecoder);

    let (engine, _) = select(&path, &settings, &probe);
    assert_eq!(engine, EngineChoice::HardwareVideoDecoder);
    assert!(probe.calls().is_empty());
}

#[test]
fn explicit_universal_for_supported_gif() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "spinner.gif", &gif_bytes());
    let probe = ScriptedProbe::new(true, true);
    let settings = ExtractionSettings::new().with_engine(EngineChoice::UniversalTranscoder);

    let (engine, _) = select(&path, &settings, &probe);
    assert_eq!(engine, EngineChoice::UniversalTranscoder);
}

// ── Runtime probe ──────────────────────────────────────────────────

#[test]
fn runtime_probe_always_supports_universal() {
    let probe = framepack::RuntimeCapabilityProbe::new();
    let capability = probe
        .probe(EngineChoice::UniversalTranscoder, MediaKind::Unknown, None)
        .unwrap();
    assert!(capability.supported);
}

#[test]
fn runtime_probe_supports_gif_frames() {
    let probe = framepack::RuntimeCapabilityProbe::new();
    let capability = probe
        .probe(EngineChoice::ImageFrameDecoder, MediaKind::Gif, None)
        .unwrap();
    assert!(capability.supported, "{}", capability.reason);
}

#[cfg(feature = "hardware")]
#[test]
fn runtime_probe_needs_a_device_this_host_can_open() {
    let probe = framepack::RuntimeCapabilityProbe::new();
    let capability = probe
        .probe(EngineChoice::HardwareVideoDecoder, MediaKind::Mp4, Some("h264"))
        .unwrap();
    assert_eq!(
        capability.supported,
        framepack::hardware_decode_available("h264"),
        "{}",
        capability.reason
    );
}

#[cfg(not(feature = "hardware"))]
#[test]
fn runtime_probe_without_hardware_support_routes_video_away() {
    let probe = framepack::RuntimeCapabilityProbe::new();
    let capability = probe
        .probe(EngineChoice::HardwareVideoDecoder, MediaKind::Mp4, Some("h264"))
        .unwrap();
    assert!(!capability.supported, "{}", capability.reason);
}
