//! The worker boundary.
//!
//! Each engine run gets its own blocking thread (via
//! `tokio::task::spawn_blocking`), its own bounded channel and its own
//! [`CancellationToken`]. The adapter on that thread talks to a
//! [`ChannelSink`], which encodes and numbers frames and forwards everything
//! to the orchestrator as [`WorkerMessage`]s. Nothing else is shared.
//!
//! Dropping the receiver retires a worker: its next send fails, the sink
//! reports cancellation, and the adapter unwinds at the next frame boundary.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;

use crate::adapter::{DecodeAdapter, ExtractionJob, FrameSink, Flow};
use crate::encode::FrameEncoder;
use crate::engine::EngineChoice;
use crate::error::FramepackError;
use crate::frame::{DecodedFrame, ExtractedFrame};
use crate::progress::{CancellationToken, Progress, ProgressTracker};
use crate::selector::panic_message;
use crate::settings::render_frame_name;

/// Worker-to-orchestrator messages.
#[derive(Debug)]
pub enum WorkerMessage {
    /// The worker thread is running.
    Alive,
    /// Engine initialisation finished; `mode` describes the decode path.
    Ready {
        /// E.g. `"h264 1920x1080 (hardware)"`.
        mode: String,
    },
    /// Size of the decoded frames, learned from the first one.
    FrameSize {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
    },
    /// Progress of the current run.
    Progress(Progress),
    /// One extracted frame.
    Frame(ExtractedFrame),
    /// The run finished.
    Complete {
        /// Frames emitted by this run.
        total_frames: u64,
    },
    /// The run failed.
    Error {
        /// What went wrong.
        error: FramepackError,
    },
}

/// What the orchestrator got when it waited on a worker.
#[derive(Debug)]
pub(crate) enum Received {
    /// A message.
    Message(WorkerMessage),
    /// The channel closed.
    Closed,
    /// Nothing arrived within the adapter's stall timeout.
    Stalled(Duration),
}

/// Orchestrator-side handle to a running worker.
pub(crate) struct WorkerHandle {
    engine: EngineChoice,
    stall_timeout: Option<Duration>,
    receiver: Option<Receiver<WorkerMessage>>,
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub(crate) fn engine(&self) -> EngineChoice {
        self.engine
    }

    /// Wait for the next message, enforcing the stall watchdog when the
    /// adapter asked for one.
    pub(crate) async fn recv(&mut self) -> Received {
        let Some(receiver) = self.receiver.as_mut() else {
            return Received::Closed;
        };

        match self.stall_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, receiver.recv()).await {
                Ok(Some(message)) => Received::Message(message),
                Ok(None) => Received::Closed,
                Err(_) => Received::Stalled(timeout),
            },
            None => match receiver.recv().await {
                Some(message) => Received::Message(message),
                None => Received::Closed,
            },
        }
    }

    /// Cancel the worker, drop its channel and wait up to `grace` for the
    /// thread to finish. A thread stuck inside a decode call is abandoned;
    /// it can no longer reach the orchestrator.
    pub(crate) async fn shutdown(mut self, grace: Duration) {
        self.token.cancel();
        self.receiver.take();

        if let Some(join) = self.join.take() {
            match tokio::time::timeout(grace, join).await {
                Ok(Ok(())) => log::debug!("{} worker exited", self.engine),
                Ok(Err(error)) => log::warn!("{} worker task failed: {error}", self.engine),
                Err(_) => log::warn!(
                    "{} worker did not stop within {grace:?}; abandoning it",
                    self.engine
                ),
            }
        }
    }
}

/// Start `adapter` on a blocking thread.
///
/// The worker observes both its own token and `job_token`.
pub(crate) fn spawn_worker(
    mut adapter: Box<dyn DecodeAdapter>,
    job: Arc<ExtractionJob>,
    channel_capacity: usize,
    job_token: CancellationToken,
) -> WorkerHandle {
    let engine = adapter.engine();
    let stall_timeout = adapter.stall_timeout();
    let token = CancellationToken::new();
    let (sender, receiver) = mpsc::channel(channel_capacity.max(1));

    let worker_token = token.clone();
    let join = tokio::task::spawn_blocking(move || {
        if sender.blocking_send(WorkerMessage::Alive).is_err() {
            return;
        }

        let mut sink = ChannelSink::new(&job, sender.clone(), worker_token, job_token);
        let result = catch_unwind(AssertUnwindSafe(|| adapter.extract(&job, &mut sink)));

        // A cancelled worker stays silent.
        if sink.is_cancelled() {
            log::debug!("{engine} worker cancelled after {} frames", sink.frames_emitted());
            return;
        }

        let message = match result {
            Ok(Ok(total_frames)) => WorkerMessage::Complete { total_frames },
            Ok(Err(error)) => WorkerMessage::Error { error },
            Err(payload) => WorkerMessage::Error {
                error: FramepackError::AdapterCrashed {
                    engine,
                    reason: format!("panicked: {}", panic_message(payload.as_ref())),
                },
            },
        };
        let _ = sender.blocking_send(message);
    });

    WorkerHandle {
        engine,
        stall_timeout,
        receiver: Some(receiver),
        token,
        join: Some(join),
    }
}

/// The worker-side [`FrameSink`].
pub(crate) struct ChannelSink {
    sender: Sender<WorkerMessage>,
    worker_token: CancellationToken,
    job_token: CancellationToken,
    encoder: FrameEncoder,
    tracker: ProgressTracker,
    stem: String,
    naming_template: String,
    extension: &'static str,
    max_frames: u64,
    next_index: u64,
    disconnected: bool,
}

impl ChannelSink {
    pub(crate) fn new(
        job: &ExtractionJob,
        sender: Sender<WorkerMessage>,
        worker_token: CancellationToken,
        job_token: CancellationToken,
    ) -> Self {
        let settings = &job.settings;
        Self {
            sender,
            worker_token,
            job_token,
            encoder: FrameEncoder::new(settings),
            tracker: ProgressTracker::new(),
            stem: job.source.stem().to_string(),
            naming_template: settings.naming_template.clone(),
            extension: settings.output_format.extension(),
            max_frames: settings.max_frames.max(1),
            next_index: 0,
            disconnected: false,
        }
    }

    fn send(&mut self, message: WorkerMessage) -> bool {
        if self.disconnected {
            return false;
        }
        if self.sender.blocking_send(message).is_err() {
            self.disconnected = true;
            return false;
        }
        true
    }
}

impl FrameSink for ChannelSink {
    fn is_cancelled(&self) -> bool {
        self.disconnected || self.worker_token.is_cancelled() || self.job_token.is_cancelled()
    }

    fn ready(&mut self, detail: &str) {
        self.send(WorkerMessage::Ready {
            mode: detail.to_string(),
        });
    }

    fn emit_frame(&mut self, frame: DecodedFrame) -> Result<Flow, FramepackError> {
        if self.is_cancelled() {
            return Err(FramepackError::Cancelled);
        }
        if self.next_index >= self.max_frames {
            return Ok(Flow::Stop);
        }

        let image_bytes = self.encoder.encode(frame.image)?;
        let index = self.next_index;
        let suggested_filename = render_frame_name(
            &self.naming_template,
            &self.stem,
            index,
            frame.timestamp_ms,
            self.extension,
        );

        let sent = self.send(WorkerMessage::Frame(ExtractedFrame {
            index,
            timestamp_ms: frame.timestamp_ms,
            image_bytes,
            suggested_filename,
        }));
        if !sent {
            return Err(FramepackError::Cancelled);
        }

        self.next_index += 1;
        if self.next_index >= self.max_frames {
            Ok(Flow::Stop)
        } else {
            Ok(Flow::Continue)
        }
    }

    fn report_frame_size(&mut self, width: u32, height: u32) {
        self.send(WorkerMessage::FrameSize { width, height });
    }

    fn emit_progress(&mut self, done: u64, estimated_total: Option<u64>) {
        if self.is_cancelled() {
            return;
        }
        let progress = self.tracker.update(done, estimated_total);
        self.send(WorkerMessage::Progress(progress));
    }

    fn frames_emitted(&self) -> u64 {
        self.next_index
    }
}
