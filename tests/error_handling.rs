//! Error handling integration tests.
//!
//! These tests verify that failures are classified correctly and that the
//! messages reaching the user are actionable.

use std::time::Duration;

use framepack::{
    EngineChoice, ExtractionOrchestrator, ExtractionSettings, FramepackError, MediaKind,
    NoopEvents, OrchestratorOptions,
};

fn missing_transcoder() -> OrchestratorOptions {
    OrchestratorOptions::new().with_ffmpeg_program("/nonexistent/bin/ffmpeg-framepack-test")
}

#[test]
fn open_nonexistent_file() {
    let mut orchestrator = ExtractionOrchestrator::new(OrchestratorOptions::new());
    let result = orchestrator.open("this_file_does_not_exist.gif", ExtractionSettings::new());

    let error_message = result.unwrap_err().to_string();
    assert!(
        error_message.contains("Failed to open"),
        "Error message should mention the open failure: {error_message}",
    );
}

#[test]
fn adapter_failures_are_retryable() {
    let retryable = [
        FramepackError::UnsupportedCodec {
            engine: EngineChoice::HardwareVideoDecoder,
            codec: "av1".to_string(),
        },
        FramepackError::Demux {
            container: MediaKind::Mp4,
            reason: "moov atom not found".to_string(),
        },
        FramepackError::Stalled {
            engine: EngineChoice::ImageFrameDecoder,
            timeout: Duration::from_secs(8),
        },
        FramepackError::AdapterCrashed {
            engine: EngineChoice::ImageFrameDecoder,
            reason: "panicked".to_string(),
        },
        FramepackError::TranscoderFailed {
            status: 1,
            stderr: "Invalid data found when processing input".to_string(),
        },
    ];
    for error in &retryable {
        assert!(error.is_adapter_failure(), "{error} should be retryable");
    }

    for error in [
        FramepackError::Cancelled,
        FramepackError::NotReady,
        FramepackError::InvalidSettings("fps".to_string()),
    ] {
        assert!(!error.is_adapter_failure(), "{error} should be terminal");
    }
}

#[test]
fn messages_name_the_engine_and_a_next_step() {
    let error = FramepackError::UnsupportedCodec {
        engine: EngineChoice::HardwareVideoDecoder,
        codec: "av1".to_string(),
    };
    let message = error.to_string();
    assert!(message.contains("av1"), "{message}");
    assert!(message.contains("hardware video decoder"), "{message}");
    assert!(message.contains("--engine universal"), "{message}");

    let error = FramepackError::TranscoderUnavailable {
        program: "ffmpeg".to_string(),
        reason: "No such file or directory".to_string(),
    };
    assert!(error.to_string().contains("FRAMEPACK_FFMPEG"));
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_transcoder_is_reported() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = temporary_directory.path().join("mystery.bin");
    std::fs::write(&path, b"this is not a media file").expect("Failed to write file");

    let mut orchestrator = ExtractionOrchestrator::new(missing_transcoder());
    let selection = orchestrator
        .open(&path, ExtractionSettings::new())
        .expect("open should succeed");
    assert_eq!(selection.engine, EngineChoice::UniversalTranscoder);

    let result = orchestrator.start(&mut NoopEvents).await;
    assert!(
        matches!(result, Err(FramepackError::TranscoderUnavailable { .. })),
        "unexpected result: {result:?}"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn corrupt_gif_falls_back_then_reports_both_failures() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = temporary_directory.path().join("broken.gif");
    std::fs::write(&path, b"GIF89a\x10\x00\x10\x00garbage that is not a gif stream")
        .expect("Failed to write file");

    struct Messages(Vec<String>, usize);
    impl framepack::ExtractionEvents for Messages {
        fn on_restart(&mut self, _notice: &framepack::RestartNotice) {
            self.1 += 1;
        }
        fn on_error(&mut self, message: &str) {
            self.0.push(message.to_string());
        }
    }

    let mut orchestrator = ExtractionOrchestrator::new(missing_transcoder());
    let selection = orchestrator
        .open(&path, ExtractionSettings::new())
        .expect("open should succeed");
    assert_eq!(selection.engine, EngineChoice::ImageFrameDecoder);

    let mut messages = Messages(Vec::new(), 0);
    let result = orchestrator.start(&mut messages).await;

    assert!(matches!(result, Err(FramepackError::TranscoderUnavailable { .. })));
    assert_eq!(messages.1, 1, "expected exactly one restart");
    assert_eq!(messages.0.len(), 1);
    assert!(messages.0[0].contains("after image-frame decoder"), "{}", messages.0[0]);
}

#[tokio::test(flavor = "multi_thread")]
async fn explicit_engine_mismatch_fails_cleanly() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = temporary_directory.path().join("mystery.bin");
    std::fs::write(&path, b"this is not a media file").expect("Failed to write file");

    let settings = ExtractionSettings::new().with_engine(EngineChoice::ImageFrameDecoder);
    let options = missing_transcoder()
        .with_fallback_policy(framepack::FallbackPolicy::deny_all());
    let mut orchestrator = ExtractionOrchestrator::new(options);
    orchestrator.open(&path, settings).expect("open should succeed");

    let result = orchestrator.start(&mut NoopEvents).await;
    assert!(result.is_err());
    assert_eq!(orchestrator.phase(), framepack::Phase::Error);
}
