//! The extraction state machine.
//!
//! [`ExtractionOrchestrator`] owns one job at a time. It selects an engine on
//! [`load`](ExtractionOrchestrator::load), runs it on a worker thread on
//! [`start`](ExtractionOrchestrator::start), packages frames as they arrive,
//! and reports everything through [`ExtractionEvents`].
//!
//! When the first engine fails (an error, a crash, or a stall) and the
//! [`FallbackPolicy`](crate::FallbackPolicy) allows it, the orchestrator
//! retires that worker, discards its output, tells the caller through
//! [`ExtractionEvents::on_restart`], and runs the universal transcoder from
//! frame 0. This happens at most once per job.
//!
//! # Example
//!
//! ```no_run
//! use framepack::{
//!     ArchivePart, ExtractionEvents, ExtractionOrchestrator, ExtractionSettings,
//!     OrchestratorOptions,
//! };
//!
//! struct SaveParts;
//!
//! impl ExtractionEvents for SaveParts {
//!     fn on_part_ready(&mut self, part: ArchivePart) {
//!         std::fs::write(&part.filename, &part.archive_bytes).ok();
//!     }
//! }
//!
//! # async fn example() -> Result<(), framepack::FramepackError> {
//! let mut orchestrator = ExtractionOrchestrator::new(OrchestratorOptions::new());
//! orchestrator.open("clip.webm", ExtractionSettings::new().with_split(250))?;
//! let summary = orchestrator.start(&mut SaveParts).await?;
//! println!("{} frames in {} parts", summary.total_frames, summary.parts);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::adapter::{AdapterFactory, DefaultAdapterFactory, ExtractionJob};
use crate::capability::{CapabilityProbe, RuntimeCapabilityProbe};
use crate::config::OrchestratorOptions;
use crate::engine::EngineChoice;
use crate::error::FramepackError;
use crate::frame::ExtractedFrame;
use crate::job::{FrameRecord, JobState, PartRecord, Phase};
use crate::metadata::FileMetadata;
use crate::packager::{ArchivePackager, ArchivePart};
use crate::probe::MediaProbe;
use crate::progress::{CancellationToken, Progress};
use crate::selector::{EngineSelection, select_engine};
use crate::settings::ExtractionSettings;
use crate::source::MediaSource;
use crate::validation::validate_job;
use crate::worker::{Received, WorkerMessage, spawn_worker};

/// Callbacks for a running job. Every method has an empty default.
///
/// After [`on_cancelled`](ExtractionEvents::on_cancelled) nothing else is
/// called for that job; [`on_complete`](ExtractionEvents::on_complete) and
/// [`on_error`](ExtractionEvents::on_error) are mutually exclusive.
pub trait ExtractionEvents {
    /// The engine for the first run has been chosen.
    fn on_engine_selected(&mut self, _selection: &EngineSelection) {}

    /// Progress of the current run.
    fn on_progress(&mut self, _progress: &Progress) {}

    /// A frame, in index order. The bytes are the caller's from here on.
    fn on_frame(&mut self, _frame: ExtractedFrame) {}

    /// The first engine failed and the job restarts on the fallback engine.
    /// Everything delivered so far belongs to the failed run.
    fn on_restart(&mut self, _notice: &RestartNotice) {}

    /// An archive part is finalized.
    fn on_part_ready(&mut self, _part: ArchivePart) {}

    /// The job finished with `total_frames` frames.
    fn on_complete(&mut self, _total_frames: u64) {}

    /// The job failed.
    fn on_error(&mut self, _message: &str) {}

    /// The job was cancelled.
    fn on_cancelled(&mut self) {}
}

/// Events sink that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEvents;

impl ExtractionEvents for NoopEvents {}

/// Sent through [`ExtractionEvents::on_restart`] before the fallback run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartNotice {
    /// Engine that failed.
    pub failed_engine: EngineChoice,
    /// Engine that takes over.
    pub next_engine: EngineChoice,
    /// Why the first engine failed.
    pub reason: String,
    /// Frames already delivered by the failed run; discard them.
    pub discarded_frames: u64,
    /// Parts already delivered by the failed run; discard them.
    pub discarded_parts: usize,
}

/// Result of a completed job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSummary {
    /// Engine that produced the output.
    pub engine: EngineChoice,
    /// Frames delivered.
    pub total_frames: u64,
    /// Archive parts delivered.
    pub parts: usize,
    /// Whether the first engine failed and was replaced.
    pub fell_back: bool,
    /// Wall-clock duration of the job.
    pub elapsed: Duration,
}

/// A loaded input with its selected engine.
struct LoadedJob {
    job: Arc<ExtractionJob>,
    selection: EngineSelection,
}

/// Dispatch verdict for one worker message.
enum Step {
    Continue,
    Finished(u64),
    Failed(FramepackError),
}

/// How one engine run ended.
enum RunOutcome {
    Completed(u64),
    Failed(FramepackError),
    Cancelled,
}

/// Drives extraction jobs.
pub struct ExtractionOrchestrator {
    options: OrchestratorOptions,
    factory: Box<dyn AdapterFactory>,
    probe: Box<dyn CapabilityProbe>,
    state: JobState,
    loaded: Option<LoadedJob>,
    packager: Option<ArchivePackager>,
    token: CancellationToken,
}

impl ExtractionOrchestrator {
    /// Create an orchestrator with the real engines and runtime probing.
    pub fn new(options: OrchestratorOptions) -> Self {
        Self {
            factory: Box::new(DefaultAdapterFactory::new(options.clone())),
            probe: Box::new(RuntimeCapabilityProbe::new()),
            options,
            state: JobState::default(),
            loaded: None,
            packager: None,
            token: CancellationToken::new(),
        }
    }

    /// Replace the adapter factory.
    #[must_use]
    pub fn with_factory(mut self, factory: impl AdapterFactory + 'static) -> Self {
        self.factory = Box::new(factory);
        self
    }

    /// Replace the capability probe.
    #[must_use]
    pub fn with_probe(mut self, probe: impl CapabilityProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Bookkeeping for the current job.
    pub fn state(&self) -> &JobState {
        &self.state
    }

    /// Engine selection for the loaded input.
    pub fn selection(&self) -> Option<&EngineSelection> {
        self.loaded.as_ref().map(|loaded| &loaded.selection)
    }

    /// The options this orchestrator runs with.
    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// Token that cancels the loaded job. Fetch it after `load`: a token
    /// that has already fired is replaced when a new job is loaded.
    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Load an input and select its engine.
    ///
    /// Selection is total, so this always ends in [`Phase::Ready`].
    pub fn load(
        &mut self,
        source: MediaSource,
        metadata: FileMetadata,
        settings: ExtractionSettings,
    ) -> EngineSelection {
        self.state = JobState {
            phase: Phase::Detecting,
            ..JobState::default()
        };
        self.packager = None;
        if self.token.is_cancelled() {
            self.token = CancellationToken::new();
        }

        let selection = select_engine(&source, &settings, &metadata, self.probe.as_ref());
        log::debug!(
            "Loaded {} ({}): {} because {}",
            source.name(),
            selection.media_kind,
            selection.engine,
            selection.reason
        );

        self.state.chosen_engine = Some(selection.engine);
        self.state.phase = Phase::Ready;
        self.loaded = Some(LoadedJob {
            job: Arc::new(ExtractionJob {
                source,
                metadata,
                settings,
            }),
            selection: selection.clone(),
        });
        selection
    }

    /// Open and probe `path`, then [`load`](Self::load) it.
    ///
    /// # Errors
    ///
    /// Returns [`FramepackError::FileOpen`] or [`FramepackError::Io`] if the
    /// file cannot be read.
    pub fn open<P: AsRef<Path>>(
        &mut self,
        path: P,
        settings: ExtractionSettings,
    ) -> Result<EngineSelection, FramepackError> {
        let source = MediaSource::open(path)?;
        let metadata = MediaProbe::probe(&source)?;
        Ok(self.load(source, metadata, settings))
    }

    /// Run the loaded job to a terminal phase.
    ///
    /// # Errors
    ///
    /// * [`FramepackError::NotReady`] if nothing is loaded or a job is
    ///   already running.
    /// * [`FramepackError::InvalidSettings`] if validation fails.
    /// * [`FramepackError::Cancelled`] if the job was cancelled.
    /// * The final engine's error otherwise.
    pub async fn start<E>(&mut self, events: &mut E) -> Result<JobSummary, FramepackError>
    where
        E: ExtractionEvents + ?Sized,
    {
        let phase = self.state.phase;
        if !(phase == Phase::Ready || phase.is_terminal()) {
            return Err(FramepackError::NotReady);
        }
        let Some(loaded) = self.loaded.as_ref() else {
            return Err(FramepackError::NotReady);
        };
        let job = Arc::clone(&loaded.job);
        let selection = loaded.selection.clone();

        if phase == Phase::Cancelled && self.token.is_cancelled() {
            self.token = CancellationToken::new();
        }

        let report = validate_job(&job.settings, &job.metadata);
        for warning in &report.warnings {
            log::warn!("{}: {warning}", job.source.name());
        }
        if !report.is_valid() {
            let error = FramepackError::InvalidSettings(report.errors.join("; "));
            self.state.phase = Phase::Error;
            events.on_error(&error.to_string());
            return Err(error);
        }

        self.state.clear_output();
        self.state.frame_size = job
            .metadata
            .has_dimensions()
            .then_some((job.metadata.width, job.metadata.height));
        self.packager = Some(ArchivePackager::new(&job.settings, job.source.stem()));
        events.on_engine_selected(&selection);

        let started = Instant::now();
        let mut engine = selection.engine;
        let mut after_fallback = false;
        let mut first_failure: Option<String> = None;

        loop {
            if self.token.is_cancelled() {
                return Err(self.finish_cancelled(events));
            }

            match self.run_engine(engine, after_fallback, &job, events).await {
                RunOutcome::Completed(total_frames) => {
                    self.state.phase = Phase::Complete;
                    log::info!(
                        "{}: {total_frames} frames with {engine} in {:.2?}",
                        job.source.name(),
                        started.elapsed()
                    );
                    events.on_complete(total_frames);
                    return Ok(JobSummary {
                        engine,
                        total_frames,
                        parts: self.state.parts_emitted.len(),
                        fell_back: after_fallback,
                        elapsed: started.elapsed(),
                    });
                }
                RunOutcome::Cancelled => return Err(self.finish_cancelled(events)),
                RunOutcome::Failed(error) => {
                    let can_fall_back = !after_fallback
                        && !engine.is_universal()
                        && error.is_adapter_failure()
                        && self.options.fallback_policy.allows(selection.media_kind);

                    if can_fall_back {
                        let notice = RestartNotice {
                            failed_engine: engine,
                            next_engine: EngineChoice::UniversalTranscoder,
                            reason: error.to_string(),
                            discarded_frames: self.state.next_frame_index(),
                            discarded_parts: self.state.parts_emitted.len(),
                        };
                        log::warn!(
                            "{} failed on {}: {error}; restarting with {}",
                            engine,
                            job.source.name(),
                            notice.next_engine
                        );

                        self.state.clear_output();
                        if let Some(packager) = self.packager.as_mut() {
                            packager.reset();
                        }
                        events.on_restart(&notice);

                        first_failure = Some(format!("{engine}: {error}"));
                        engine = notice.next_engine;
                        after_fallback = true;
                        continue;
                    }

                    if !after_fallback && !engine.is_universal() && error.is_adapter_failure() {
                        log::warn!(
                            "Fallback is disabled for {} inputs; not retrying",
                            selection.media_kind
                        );
                    }

                    let message = match &first_failure {
                        Some(first) => format!("{error} (after {first})"),
                        None => error.to_string(),
                    };
                    log::error!("{}: {message}", job.source.name());
                    self.state.phase = Phase::Error;
                    events.on_error(&message);
                    return Err(error);
                }
            }
        }
    }

    /// Run one engine until it completes, fails or the job is cancelled.
    async fn run_engine<E>(
        &mut self,
        engine: EngineChoice,
        after_fallback: bool,
        job: &Arc<ExtractionJob>,
        events: &mut E,
    ) -> RunOutcome
    where
        E: ExtractionEvents + ?Sized,
    {
        self.state.phase = Phase::Processing {
            engine,
            after_fallback,
        };
        self.state.chosen_engine = Some(engine);

        let adapter = self.factory.create(engine);
        let token = self.token.clone();
        let mut worker = spawn_worker(
            adapter,
            Arc::clone(job),
            self.options.channel_capacity,
            token.clone(),
        );
        log::debug!("Started {} worker", worker.engine());

        let outcome = loop {
            let received = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                received = worker.recv() => Some(received),
            };

            let step = match received {
                None => break RunOutcome::Cancelled,
                Some(Received::Message(message)) => self.dispatch(message, events),
                Some(Received::Closed) if token.is_cancelled() => break RunOutcome::Cancelled,
                Some(Received::Closed) => Step::Failed(FramepackError::AdapterCrashed {
                    engine,
                    reason: "the worker exited without reporting a result".to_string(),
                }),
                Some(Received::Stalled(timeout)) => {
                    Step::Failed(FramepackError::Stalled { engine, timeout })
                }
            };

            // Callbacks may cancel; nothing further is reported once they do.
            if token.is_cancelled() {
                break RunOutcome::Cancelled;
            }
            match step {
                Step::Continue => {}
                Step::Finished(total_frames) => break RunOutcome::Completed(total_frames),
                Step::Failed(error) => break RunOutcome::Failed(error),
            }
        };

        worker.shutdown(self.options.shutdown_grace).await;
        outcome
    }

    /// Apply one worker message to the job.
    fn dispatch<E>(&mut self, message: WorkerMessage, events: &mut E) -> Step
    where
        E: ExtractionEvents + ?Sized,
    {
        match (self.state.phase, message) {
            (Phase::Processing { engine, .. }, WorkerMessage::Alive) => {
                log::debug!("{engine} worker alive");
                Step::Continue
            }
            (Phase::Processing { engine, .. }, WorkerMessage::Ready { mode }) => {
                log::info!("{engine} ready: {mode}");
                Step::Continue
            }
            (Phase::Processing { engine, .. }, WorkerMessage::FrameSize { width, height }) => {
                log::debug!("{engine} decodes {width}x{height} frames");
                self.state.frame_size = Some((width, height));
                Step::Continue
            }
            (Phase::Processing { .. }, WorkerMessage::Progress(progress)) => {
                events.on_progress(&progress);
                Step::Continue
            }
            (Phase::Processing { engine, .. }, WorkerMessage::Frame(frame)) => {
                let expected = self.state.next_frame_index();
                if frame.index != expected {
                    return Step::Failed(FramepackError::AdapterCrashed {
                        engine,
                        reason: format!(
                            "frame {} arrived out of order (expected {expected})",
                            frame.index
                        ),
                    });
                }

                let part = match self.packager.as_mut().map(|packager| packager.push(&frame)) {
                    Some(Ok(part)) => part,
                    Some(Err(error)) => return Step::Failed(error),
                    None => None,
                };

                if let Some(part) = part {
                    self.deliver_part(part, events);
                }
                self.state.frames_emitted.push(FrameRecord::from(&frame));
                events.on_frame(frame);
                Step::Continue
            }
            (Phase::Processing { engine, .. }, WorkerMessage::Complete { total_frames }) => {
                let emitted = self.state.next_frame_index();
                if total_frames != emitted {
                    log::warn!("{engine} reported {total_frames} frames but delivered {emitted}");
                }
                if emitted == 0 {
                    return Step::Failed(FramepackError::no_frames(engine));
                }

                match self.packager.as_mut().map(ArchivePackager::finish) {
                    Some(Ok(Some(part))) => self.deliver_part(part, events),
                    Some(Err(error)) => return Step::Failed(error),
                    Some(Ok(None)) | None => {}
                }
                Step::Finished(emitted)
            }
            (Phase::Processing { .. }, WorkerMessage::Error { error }) => Step::Failed(error),
            (phase, message) => {
                log::debug!("Ignoring {message:?} in phase {phase}");
                Step::Continue
            }
        }
    }

    fn deliver_part<E>(&mut self, part: ArchivePart, events: &mut E)
    where
        E: ExtractionEvents + ?Sized,
    {
        log::debug!(
            "Part {} ready: {} ({} frames)",
            part.part_index + 1,
            part.filename,
            part.frame_count()
        );
        self.state.parts_emitted.push(PartRecord::from(&part));
        events.on_part_ready(part);
    }

    fn finish_cancelled<E>(&mut self, events: &mut E) -> FramepackError
    where
        E: ExtractionEvents + ?Sized,
    {
        log::info!("Extraction cancelled");
        self.state.clear_output();
        self.packager = None;
        self.state.phase = Phase::Cancelled;
        events.on_cancelled();
        FramepackError::Cancelled
    }
}
