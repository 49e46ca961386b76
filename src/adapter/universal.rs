//! The universal engine: the `ffmpeg` command-line transcoder.
//!
//! The transcoder rasterizes the input at a computed rate into numbered PNGs
//! in a private temporary directory. Frame N is complete once frame N + 1
//! exists or the process has exited; each frame is read, handed to the sink,
//! and deleted straight away so the directory never holds more than a few
//! files.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::adapter::{DecodeAdapter, ExtractionJob, FrameSink, Flow, finish_run};
use crate::engine::EngineChoice;
use crate::error::FramepackError;
use crate::ffmpeg::FfmpegLogLevel;
use crate::frame::DecodedFrame;
use crate::sampling::{transcoder_rate, transcoder_window};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Lines of transcoder stderr kept for error messages.
const STDERR_TAIL_LINES: usize = 12;

/// Runs the external `ffmpeg` binary. Never falls back further.
#[derive(Debug, Clone)]
pub struct UniversalAdapter {
    program: PathBuf,
    log_level: FfmpegLogLevel,
}

impl UniversalAdapter {
    /// Create the adapter for the given `ffmpeg` binary.
    pub fn new(program: impl Into<PathBuf>, log_level: FfmpegLogLevel) -> Self {
        Self {
            program: program.into(),
            log_level,
        }
    }

    fn command(&self, job: &ExtractionJob, rate: f64, output_pattern: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("-hide_banner")
            .arg("-nostdin")
            .arg("-loglevel")
            .arg(self.log_level.as_cli_arg());

        let window = transcoder_window(job.settings.sampling);
        if let Some((start, _)) = window {
            command.arg("-ss").arg(format_seconds(start));
        }
        command.arg("-i").arg(job.source.path());
        if let Some((start, end)) = window {
            command.arg("-t").arg(format_seconds(end.saturating_sub(start)));
        }

        command
            .arg("-an")
            .arg("-vf")
            .arg(format!("fps={rate:.6}"))
            .arg("-frames:v")
            .arg(job.settings.max_frames.to_string())
            .arg("-f")
            .arg("image2")
            .arg(output_pattern)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        command
    }
}

impl DecodeAdapter for UniversalAdapter {
    fn engine(&self) -> EngineChoice {
        EngineChoice::UniversalTranscoder
    }

    fn extract(
        &mut self,
        job: &ExtractionJob,
        sink: &mut dyn FrameSink,
    ) -> Result<u64, FramepackError> {
        let settings = &job.settings;
        let rate = transcoder_rate(settings.sampling, job.metadata.fps, settings.assumed_fps);
        if rate.is_nan() || rate <= 0.0 {
            return Err(FramepackError::InvalidSettings(format!(
                "transcoder rate must be positive, got {rate}"
            )));
        }

        let work_dir = tempfile::Builder::new().prefix("framepack-").tempdir()?;
        let output_pattern = work_dir.path().join("frame_%06d.png");

        let mut child = self.command(job, rate, &output_pattern).spawn().map_err(|error| {
            FramepackError::TranscoderUnavailable {
                program: self.program.display().to_string(),
                reason: error.to_string(),
            }
        })?;
        let stderr_tail = drain_stderr(&mut child);

        sink.ready(&format!("ffmpeg at {rate:.3} fps"));

        let window_start_ms = transcoder_window(settings.sampling)
            .map(|(start, _)| start.as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        let estimate = estimate_output(job, rate);
        sink.emit_progress(0, estimate);

        let outcome = self.collect_frames(
            &mut child,
            work_dir.path(),
            rate,
            window_start_ms,
            estimate,
            !job.metadata.has_dimensions(),
            sink,
        );

        if outcome.is_err() || child.try_wait().ok().flatten().is_none() {
            let _ = child.kill();
        }
        let status = child.wait();
        let stderr = stderr_tail
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        match outcome? {
            CollectEnd::Stopped => {}
            CollectEnd::Exited => {
                let status = status?;
                if !status.success() {
                    return Err(FramepackError::TranscoderFailed {
                        status: status.code().unwrap_or(-1),
                        stderr,
                    });
                }
            }
        }

        finish_run(self.engine(), sink.frames_emitted())
    }
}

enum CollectEnd {
    /// The transcoder exited on its own and every frame was read.
    Exited,
    /// The frame cap was reached first.
    Stopped,
}

impl UniversalAdapter {
    fn collect_frames(
        &self,
        child: &mut Child,
        directory: &Path,
        rate: f64,
        window_start_ms: f64,
        estimate: Option<u64>,
        report_size: bool,
        sink: &mut dyn FrameSink,
    ) -> Result<CollectEnd, FramepackError> {
        let frame_interval_ms = 1000.0 / rate;
        // image2 numbers from 1.
        let mut number: u64 = 1;

        loop {
            if sink.is_cancelled() {
                return Err(FramepackError::Cancelled);
            }

            // Check for exit before looking at files, so that once the
            // process is known to be gone the directory is final.
            let exited = child.try_wait()?.is_some();
            let current = frame_path(directory, number);
            let complete = frame_path(directory, number + 1).exists()
                || (exited && current.exists());

            if complete {
                let bytes = std::fs::read(&current)?;
                std::fs::remove_file(&current)?;
                let image = image::load_from_memory(&bytes).map_err(|error| {
                    FramepackError::DecodeFailed {
                        engine: self.engine(),
                        frame: number - 1,
                        reason: error.to_string(),
                    }
                })?;
                if number == 1 && report_size {
                    sink.report_frame_size(image.width(), image.height());
                }

                let timestamp_ms = window_start_ms + (number - 1) as f64 * frame_interval_ms;
                let flow = sink.emit_frame(DecodedFrame::new(image, timestamp_ms.round() as u64))?;
                sink.emit_progress(sink.frames_emitted(), estimate);
                number += 1;

                if flow == Flow::Stop {
                    return Ok(CollectEnd::Stopped);
                }
                continue;
            }

            if exited {
                return Ok(CollectEnd::Exited);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

fn frame_path(directory: &Path, number: u64) -> PathBuf {
    directory.join(format!("frame_{number:06}.png"))
}

fn format_seconds(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64())
}

fn estimate_output(job: &ExtractionJob, rate: f64) -> Option<u64> {
    let seconds = match transcoder_window(job.settings.sampling) {
        Some((start, end)) => {
            let end = if job.metadata.duration_seconds > 0.0 {
                end.as_secs_f64().min(job.metadata.duration_seconds)
            } else {
                end.as_secs_f64()
            };
            (end - start.as_secs_f64()).max(0.0)
        }
        None => job.metadata.duration_seconds,
    };
    if seconds <= 0.0 {
        return None;
    }
    Some(((seconds * rate).ceil() as u64).min(job.settings.max_frames))
}

/// Read stderr on a helper thread so the transcoder never blocks on a full
/// pipe. The handle yields the last few lines.
fn drain_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    let stderr = child.stderr.take()?;
    let handle = std::thread::Builder::new()
        .name("framepack-ffmpeg-stderr".to_string())
        .spawn(move || {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail.into_iter().collect::<Vec<_>>().join("\n")
        })
        .ok()?;
    Some(handle)
}
