//! Per-job bookkeeping owned by the orchestrator.

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::engine::EngineChoice;
use crate::frame::ExtractedFrame;
use crate::packager::ArchivePart;

/// Orchestrator lifecycle.
///
/// `Idle → Detecting → Ready → Processing → Complete | Error | Cancelled`.
/// A terminal phase with a loaded source may be started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Nothing loaded.
    #[default]
    Idle,
    /// Engine selection in progress.
    Detecting,
    /// An engine is selected; waiting for `start`.
    Ready,
    /// An engine run is in flight.
    Processing {
        /// Engine currently running.
        engine: EngineChoice,
        /// Whether this run replaced a failed engine.
        after_fallback: bool,
    },
    /// The job finished and every part was delivered.
    Complete,
    /// The job failed; the error was delivered.
    Error,
    /// The job was cancelled.
    Cancelled,
}

impl Phase {
    /// Whether the job has finished, one way or another.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Complete | Phase::Error | Phase::Cancelled)
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Phase::Idle => f.write_str("idle"),
            Phase::Detecting => f.write_str("detecting"),
            Phase::Ready => f.write_str("ready"),
            Phase::Processing {
                engine,
                after_fallback: false,
            } => write!(f, "processing with {engine}"),
            Phase::Processing {
                engine,
                after_fallback: true,
            } => write!(f, "processing with {engine} (fallback)"),
            Phase::Complete => f.write_str("complete"),
            Phase::Error => f.write_str("error"),
            Phase::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// A delivered frame, without its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    /// Frame index within the run.
    pub index: u64,
    /// Presentation time in milliseconds.
    pub timestamp_ms: u64,
    /// Entry name.
    pub filename: String,
}

impl From<&ExtractedFrame> for FrameRecord {
    fn from(frame: &ExtractedFrame) -> Self {
        Self {
            index: frame.index,
            timestamp_ms: frame.timestamp_ms,
            filename: frame.suggested_filename.clone(),
        }
    }
}

/// A delivered archive part, without its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRecord {
    /// 0-based part number.
    pub part_index: usize,
    /// First frame index.
    pub start_frame_index: u64,
    /// Last frame index (inclusive).
    pub end_frame_index: u64,
    /// Archive filename.
    pub filename: String,
}

impl From<&ArchivePart> for PartRecord {
    fn from(part: &ArchivePart) -> Self {
        Self {
            part_index: part.part_index,
            start_frame_index: part.start_frame_index,
            end_frame_index: part.end_frame_index,
            filename: part.filename.clone(),
        }
    }
}

/// What the orchestrator knows about the current job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobState {
    /// Lifecycle phase.
    pub phase: Phase,
    /// Engine of the current (or last) run.
    pub chosen_engine: Option<EngineChoice>,
    /// Frames delivered by the current run, in index order.
    pub frames_emitted: Vec<FrameRecord>,
    /// Parts delivered by the current run.
    pub parts_emitted: Vec<PartRecord>,
    /// Frame size from the container header, or from the first decoded
    /// frame when the header had none.
    pub frame_size: Option<(u32, u32)>,
}

impl JobState {
    /// Forget the current run's output, keeping the phase.
    pub(crate) fn clear_output(&mut self) {
        self.frames_emitted.clear();
        self.parts_emitted.clear();
    }

    /// Index the next frame must carry.
    pub(crate) fn next_frame_index(&self) -> u64 {
        self.frames_emitted.len() as u64
    }
}
