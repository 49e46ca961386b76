//! Orchestrator state machine tests with scripted adapters.
//!
//! The adapters here never touch a decoder: they push tiny generated images
//! through the real worker boundary, so numbering, packaging, fallback and
//! cancellation run exactly as they do in production.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use framepack::{
    AdapterFactory, ArchivePart, Capability, CapabilityProbe, CancellationToken, DecodeAdapter,
    DecodedFrame, EngineChoice, EngineSelection, ExtractedFrame, ExtractionEvents, ExtractionJob,
    ExtractionOrchestrator, ExtractionSettings, FallbackPolicy, FileMetadata, Flow, FrameSink,
    FramepackError, MediaKind, MediaSource, OrchestratorOptions, Phase, Progress, RestartNotice,
    SamplingMode,
};
use image::DynamicImage;
use tempfile::TempDir;

// ── Scripted engines ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Script {
    /// Emit this many frames, then finish.
    Frames(u64),
    /// Emit this many frames, then fail with a decode error.
    FailAfter(u64),
    /// Emit this many frames, then panic.
    PanicAfter(u64),
    /// Emit this many frames, then go silent until cancelled.
    StallAfter(u64, Duration),
}

struct ScriptedAdapter {
    engine: EngineChoice,
    script: Script,
}

impl ScriptedAdapter {
    fn emit(&self, count: u64, sink: &mut dyn FrameSink) -> Result<(), FramepackError> {
        for n in 0..count {
            let frame = DecodedFrame::new(DynamicImage::new_rgb8(2, 2), n * 100);
            let flow = sink.emit_frame(frame)?;
            sink.emit_progress(sink.frames_emitted(), Some(count));
            if flow == Flow::Stop {
                break;
            }
        }
        Ok(())
    }
}

impl DecodeAdapter for ScriptedAdapter {
    fn engine(&self) -> EngineChoice {
        self.engine
    }

    fn stall_timeout(&self) -> Option<Duration> {
        match self.script {
            Script::StallAfter(_, timeout) => Some(timeout),
            _ => None,
        }
    }

    fn extract(
        &mut self,
        _job: &ExtractionJob,
        sink: &mut dyn FrameSink,
    ) -> Result<u64, FramepackError> {
        sink.ready("scripted");
        match self.script {
            Script::Frames(count) => {
                self.emit(count, sink)?;
                Ok(sink.frames_emitted())
            }
            Script::FailAfter(count) => {
                self.emit(count, sink)?;
                Err(FramepackError::DecodeFailed {
                    engine: self.engine,
                    frame: count,
                    reason: "scripted decode failure".to_string(),
                })
            }
            Script::PanicAfter(count) => {
                self.emit(count, sink)?;
                panic!("scripted adapter panic");
            }
            Script::StallAfter(count, _) => {
                self.emit(count, sink)?;
                for _ in 0..1000 {
                    if sink.is_cancelled() {
                        return Err(FramepackError::Cancelled);
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Ok(sink.frames_emitted())
            }
        }
    }
}

#[derive(Clone)]
struct ScriptedFactory {
    image: Script,
    universal: Script,
    created: Arc<Mutex<Vec<EngineChoice>>>,
}

impl ScriptedFactory {
    fn new(image: Script, universal: Script) -> Self {
        Self {
            image,
            universal,
            created: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn created(&self) -> Vec<EngineChoice> {
        self.created.lock().unwrap().clone()
    }
}

impl AdapterFactory for ScriptedFactory {
    fn create(&self, engine: EngineChoice) -> Box<dyn DecodeAdapter> {
        self.created.lock().unwrap().push(engine);
        let script = match engine {
            EngineChoice::UniversalTranscoder => self.universal,
            _ => self.image,
        };
        Box::new(ScriptedAdapter { engine, script })
    }
}

struct AlwaysSupported;

impl CapabilityProbe for AlwaysSupported {
    fn probe(
        &self,
        _engine: EngineChoice,
        _kind: MediaKind,
        _codec_hint: Option<&str>,
    ) -> Result<Capability, FramepackError> {
        Ok(Capability::supported("test probe"))
    }
}

// ── Recorded events ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Selected(EngineChoice),
    Frame(u64),
    Restart(RestartNotice),
    Part(usize, u64, u64),
    Complete(u64),
    Error(String),
    Cancelled,
}

#[derive(Default)]
struct Recorder {
    events: Vec<Event>,
    progress: Vec<Progress>,
    parts: Vec<ArchivePart>,
    cancel_at_frame: Option<(u64, CancellationToken)>,
}

impl Recorder {
    fn frames(&self) -> Vec<u64> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Frame(index) => Some(*index),
                _ => None,
            })
            .collect()
    }

    fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|event| predicate(event)).count()
    }

    fn restarts(&self) -> Vec<RestartNotice> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Restart(notice) => Some(notice.clone()),
                _ => None,
            })
            .collect()
    }

    /// Events after the last restart (or all of them).
    fn final_run(&self) -> &[Event] {
        let start = self
            .events
            .iter()
            .rposition(|event| matches!(event, Event::Restart(_)))
            .map(|position| position + 1)
            .unwrap_or(0);
        &self.events[start..]
    }
}

impl ExtractionEvents for Recorder {
    fn on_engine_selected(&mut self, selection: &EngineSelection) {
        self.events.push(Event::Selected(selection.engine));
    }

    fn on_progress(&mut self, progress: &Progress) {
        self.progress.push(progress.clone());
    }

    fn on_frame(&mut self, frame: ExtractedFrame) {
        self.events.push(Event::Frame(frame.index));
        if let Some((index, token)) = &self.cancel_at_frame {
            if frame.index == *index {
                token.cancel();
            }
        }
    }

    fn on_restart(&mut self, notice: &RestartNotice) {
        self.events.push(Event::Restart(notice.clone()));
    }

    fn on_part_ready(&mut self, part: ArchivePart) {
        self.events.push(Event::Part(
            part.part_index,
            part.start_frame_index,
            part.end_frame_index,
        ));
        self.parts.push(part);
    }

    fn on_complete(&mut self, total_frames: u64) {
        self.events.push(Event::Complete(total_frames));
    }

    fn on_error(&mut self, message: &str) {
        self.events.push(Event::Error(message.to_string()));
    }

    fn on_cancelled(&mut self) {
        self.events.push(Event::Cancelled);
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn gif_input(dir: &TempDir) -> (MediaSource, FileMetadata) {
    let path: PathBuf = dir.path().join("spinner.gif");
    std::fs::write(&path, b"GIF89a\x02\x00\x02\x00\x00\x00\x00;").unwrap();
    let source = MediaSource::open(&path).unwrap();

    let mut metadata = FileMetadata::unknown(source.name(), source.size_bytes());
    metadata.media_kind = MediaKind::Gif;
    metadata.width = 2;
    metadata.height = 2;
    (source, metadata)
}

fn orchestrator(options: OrchestratorOptions, factory: &ScriptedFactory) -> ExtractionOrchestrator {
    ExtractionOrchestrator::new(options.with_shutdown_grace(Duration::from_millis(500)))
        .with_factory(factory.clone())
        .with_probe(AlwaysSupported)
}

fn loaded(
    dir: &TempDir,
    options: OrchestratorOptions,
    factory: &ScriptedFactory,
    settings: ExtractionSettings,
) -> ExtractionOrchestrator {
    let mut orchestrator = orchestrator(options, factory);
    let (source, metadata) = gif_input(dir);
    let selection = orchestrator.load(source, metadata, settings);
    assert_eq!(selection.engine, EngineChoice::ImageFrameDecoder);
    assert_eq!(orchestrator.phase(), Phase::Ready);
    orchestrator
}

// ── Happy path ─────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn frames_arrive_in_contiguous_order() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(Script::Frames(7), Script::Frames(0));
    let mut orchestrator = loaded(&dir, OrchestratorOptions::new(), &factory, ExtractionSettings::new());

    let mut recorder = Recorder::default();
    let summary = orchestrator.start(&mut recorder).await.unwrap();

    assert_eq!(recorder.frames(), (0..7).collect::<Vec<_>>());
    assert_eq!(recorder.events.first(), Some(&Event::Selected(EngineChoice::ImageFrameDecoder)));
    assert_eq!(recorder.events.last(), Some(&Event::Complete(7)));
    assert_eq!(summary.total_frames, 7);
    assert_eq!(summary.engine, EngineChoice::ImageFrameDecoder);
    assert!(!summary.fell_back);
    assert_eq!(orchestrator.phase(), Phase::Complete);
    assert_eq!(orchestrator.state().frames_emitted.len(), 7);
    assert_eq!(factory.created(), vec![EngineChoice::ImageFrameDecoder]);
}

#[tokio::test(flavor = "multi_thread")]
async fn parts_are_delivered_as_they_fill() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(Script::Frames(5), Script::Frames(0));
    let settings = ExtractionSettings::new().with_split(2).with_auto_download(true);
    let mut orchestrator = loaded(&dir, OrchestratorOptions::new(), &factory, settings);

    let mut recorder = Recorder::default();
    let summary = orchestrator.start(&mut recorder).await.unwrap();

    assert_eq!(summary.parts, 3);
    let parts: Vec<_> = recorder
        .parts
        .iter()
        .map(|part| (part.start_frame_index, part.end_frame_index))
        .collect();
    assert_eq!(parts, vec![(0, 1), (2, 3), (4, 4)]);
    assert!(recorder.parts.iter().all(|part| part.auto_download));
    assert_eq!(recorder.parts[0].filename, "spinner_part01of02_frames00000-00001.zip");
    let totals: Vec<usize> = recorder
        .parts
        .iter()
        .map(|part| part.total_parts_known_so_far)
        .collect();
    assert_eq!(totals, vec![2, 3, 3]);

    // The first part is handed over with the third frame, ahead of it.
    let first_part = recorder
        .events
        .iter()
        .position(|event| matches!(event, Event::Part(0, _, _)))
        .unwrap();
    let third_frame = recorder
        .events
        .iter()
        .position(|event| *event == Event::Frame(2))
        .unwrap();
    assert!(first_part < third_frame);
}

#[tokio::test(flavor = "multi_thread")]
async fn progress_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(Script::Frames(4), Script::Frames(0));
    let mut orchestrator = loaded(&dir, OrchestratorOptions::new(), &factory, ExtractionSettings::new());

    let mut recorder = Recorder::default();
    orchestrator.start(&mut recorder).await.unwrap();

    assert_eq!(recorder.progress.len(), 4);
    let last = recorder.progress.last().unwrap();
    assert_eq!(last.frames_done, 4);
    assert_eq!(last.estimated_total, Some(4));
    assert_eq!(last.percent, Some(100.0));
}

#[tokio::test(flavor = "multi_thread")]
async fn frame_cap_stops_the_adapter() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(Script::Frames(50), Script::Frames(0));
    let settings = ExtractionSettings::new().with_max_frames(3);
    let mut orchestrator = loaded(&dir, OrchestratorOptions::new(), &factory, settings);

    let mut recorder = Recorder::default();
    let summary = orchestrator.start(&mut recorder).await.unwrap();

    assert_eq!(summary.total_frames, 3);
    assert_eq!(recorder.frames(), vec![0, 1, 2]);
}

#[tokio::test(flavor = "multi_thread")]
async fn finished_job_can_be_started_again() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(Script::Frames(3), Script::Frames(0));
    let mut orchestrator = loaded(&dir, OrchestratorOptions::new(), &factory, ExtractionSettings::new());

    let mut first = Recorder::default();
    orchestrator.start(&mut first).await.unwrap();
    let mut second = Recorder::default();
    orchestrator.start(&mut second).await.unwrap();

    assert_eq!(first.frames(), second.frames());
    assert_eq!(orchestrator.state().frames_emitted.len(), 3);
}

// ── Fallback ───────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn failure_falls_back_and_renumbers_from_zero() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(Script::FailAfter(3), Script::Frames(5));
    let settings = ExtractionSettings::new().with_split(2);
    let mut orchestrator = loaded(&dir, OrchestratorOptions::new(), &factory, settings);

    let mut recorder = Recorder::default();
    let summary = orchestrator.start(&mut recorder).await.unwrap();

    let restarts = recorder.restarts();
    assert_eq!(restarts.len(), 1);
    assert_eq!(restarts[0].failed_engine, EngineChoice::ImageFrameDecoder);
    assert_eq!(restarts[0].next_engine, EngineChoice::UniversalTranscoder);
    assert_eq!(restarts[0].discarded_frames, 3);
    assert_eq!(restarts[0].discarded_parts, 1);
    assert!(restarts[0].reason.contains("scripted decode failure"));

    let final_frames: Vec<u64> = recorder
        .final_run()
        .iter()
        .filter_map(|event| match event {
            Event::Frame(index) => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(final_frames, vec![0, 1, 2, 3, 4]);

    let final_parts: Vec<_> = recorder
        .final_run()
        .iter()
        .filter(|event| matches!(event, Event::Part(..)))
        .cloned()
        .collect();
    assert_eq!(
        final_parts,
        vec![Event::Part(0, 0, 1), Event::Part(1, 2, 3), Event::Part(2, 4, 4)]
    );

    assert!(summary.fell_back);
    assert_eq!(summary.engine, EngineChoice::UniversalTranscoder);
    assert_eq!(summary.total_frames, 5);
    assert_eq!(summary.parts, 3);
    assert_eq!(orchestrator.state().frames_emitted.len(), 5);
    assert_eq!(orchestrator.state().chosen_engine, Some(EngineChoice::UniversalTranscoder));
    assert_eq!(
        factory.created(),
        vec![EngineChoice::ImageFrameDecoder, EngineChoice::UniversalTranscoder]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn panic_is_treated_as_a_crash_and_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(Script::PanicAfter(1), Script::Frames(2));
    let mut orchestrator = loaded(&dir, OrchestratorOptions::new(), &factory, ExtractionSettings::new());

    let mut recorder = Recorder::default();
    let summary = orchestrator.start(&mut recorder).await.unwrap();

    let restarts = recorder.restarts();
    assert_eq!(restarts.len(), 1);
    assert!(restarts[0].reason.contains("scripted adapter panic"));
    assert!(summary.fell_back);
    assert_eq!(summary.total_frames, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn stalled_engine_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(
        Script::StallAfter(2, Duration::from_millis(150)),
        Script::Frames(4),
    );
    let mut orchestrator = loaded(&dir, OrchestratorOptions::new(), &factory, ExtractionSettings::new());

    let mut recorder = Recorder::default();
    let summary = orchestrator.start(&mut recorder).await.unwrap();

    let restarts = recorder.restarts();
    assert_eq!(restarts.len(), 1);
    assert!(restarts[0].reason.contains("stalled"), "{}", restarts[0].reason);
    assert_eq!(restarts[0].discarded_frames, 2);
    assert!(summary.fell_back);
    assert_eq!(summary.total_frames, 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_run_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(Script::Frames(0), Script::Frames(3));
    let mut orchestrator = loaded(&dir, OrchestratorOptions::new(), &factory, ExtractionSettings::new());

    let mut recorder = Recorder::default();
    let summary = orchestrator.start(&mut recorder).await.unwrap();

    assert!(summary.fell_back);
    assert_eq!(summary.total_frames, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn disallowed_fallback_is_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(Script::FailAfter(2), Script::Frames(5));
    let options = OrchestratorOptions::new()
        .with_fallback_policy(FallbackPolicy::allow_all().disallow(MediaKind::Gif));
    let mut orchestrator = loaded(&dir, options, &factory, ExtractionSettings::new());

    let mut recorder = Recorder::default();
    let result = orchestrator.start(&mut recorder).await;

    assert!(matches!(result, Err(FramepackError::DecodeFailed { .. })));
    assert!(recorder.restarts().is_empty());
    assert_eq!(recorder.count(|event| matches!(event, Event::Error(_))), 1);
    assert_eq!(recorder.count(|event| matches!(event, Event::Complete(_))), 0);
    assert_eq!(orchestrator.phase(), Phase::Error);
    assert_eq!(factory.created(), vec![EngineChoice::ImageFrameDecoder]);
}

#[tokio::test(flavor = "multi_thread")]
async fn universal_failure_does_not_fall_back() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(Script::Frames(5), Script::FailAfter(1));
    let mut orchestrator = orchestrator(OrchestratorOptions::new(), &factory);
    let (source, metadata) = gif_input(&dir);
    let settings = ExtractionSettings::new().with_engine(EngineChoice::UniversalTranscoder);
    orchestrator.load(source, metadata, settings);

    let mut recorder = Recorder::default();
    let result = orchestrator.start(&mut recorder).await;

    assert!(result.is_err());
    assert!(recorder.restarts().is_empty());
    assert_eq!(orchestrator.phase(), Phase::Error);
    assert_eq!(factory.created(), vec![EngineChoice::UniversalTranscoder]);
}

#[tokio::test(flavor = "multi_thread")]
async fn fallback_happens_at_most_once() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(Script::FailAfter(1), Script::FailAfter(1));
    let mut orchestrator = loaded(&dir, OrchestratorOptions::new(), &factory, ExtractionSettings::new());

    let mut recorder = Recorder::default();
    let result = orchestrator.start(&mut recorder).await;

    assert!(result.is_err());
    assert_eq!(recorder.restarts().len(), 1);
    let errors: Vec<_> = recorder
        .events
        .iter()
        .filter_map(|event| match event {
            Event::Error(message) => Some(message.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("after image-frame decoder"), "{}", errors[0]);
    assert_eq!(factory.created().len(), 2);
}

// ── Cancellation ───────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_mid_run_reports_nothing_further() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(Script::Frames(200), Script::Frames(5));
    let mut orchestrator = loaded(&dir, OrchestratorOptions::new(), &factory, ExtractionSettings::new());

    let mut recorder = Recorder {
        cancel_at_frame: Some((3, orchestrator.cancel_token())),
        ..Recorder::default()
    };
    let result = orchestrator.start(&mut recorder).await;

    assert!(matches!(result, Err(FramepackError::Cancelled)));
    assert_eq!(recorder.frames(), vec![0, 1, 2, 3]);
    assert_eq!(recorder.events.last(), Some(&Event::Cancelled));
    assert_eq!(recorder.count(|event| matches!(event, Event::Complete(_))), 0);
    assert_eq!(recorder.count(|event| matches!(event, Event::Error(_))), 0);
    assert!(recorder.restarts().is_empty());
    assert_eq!(orchestrator.phase(), Phase::Cancelled);
    assert_eq!(factory.created(), vec![EngineChoice::ImageFrameDecoder]);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(Script::Frames(5), Script::Frames(5));
    let mut orchestrator = loaded(&dir, OrchestratorOptions::new(), &factory, ExtractionSettings::new());
    orchestrator.cancel_token().cancel();

    let mut recorder = Recorder::default();
    let result = orchestrator.start(&mut recorder).await;

    assert!(matches!(result, Err(FramepackError::Cancelled)));
    assert!(recorder.frames().is_empty());
    assert_eq!(orchestrator.phase(), Phase::Cancelled);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_job_can_be_restarted() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(Script::Frames(4), Script::Frames(0));
    let mut orchestrator = loaded(&dir, OrchestratorOptions::new(), &factory, ExtractionSettings::new());
    orchestrator.cancel_token().cancel();

    let mut cancelled = Recorder::default();
    assert!(orchestrator.start(&mut cancelled).await.is_err());

    let mut recorder = Recorder::default();
    let summary = orchestrator.start(&mut recorder).await.unwrap();
    assert_eq!(summary.total_frames, 4);
    assert_eq!(orchestrator.phase(), Phase::Complete);
}

// ── Preconditions ──────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn start_without_load_is_not_ready() {
    let factory = ScriptedFactory::new(Script::Frames(1), Script::Frames(1));
    let mut orchestrator = orchestrator(OrchestratorOptions::new(), &factory);

    let result = orchestrator.start(&mut Recorder::default()).await;
    assert!(matches!(result, Err(FramepackError::NotReady)));
    assert_eq!(orchestrator.phase(), Phase::Idle);
    assert!(factory.created().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_settings_fail_before_any_engine_runs() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptedFactory::new(Script::Frames(5), Script::Frames(5));
    let settings = ExtractionSettings::new().with_sampling(SamplingMode::Fps(0.0));
    let mut orchestrator = loaded(&dir, OrchestratorOptions::new(), &factory, settings);

    let mut recorder = Recorder::default();
    let result = orchestrator.start(&mut recorder).await;

    assert!(matches!(result, Err(FramepackError::InvalidSettings(_))));
    assert_eq!(recorder.count(|event| matches!(event, Event::Error(_))), 1);
    assert_eq!(orchestrator.phase(), Phase::Error);
    assert!(factory.created().is_empty());
}
