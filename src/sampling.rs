//! Frame-selection arithmetic shared by every adapter.
//!
//! The image-frame and hardware-video adapters decode every source frame and
//! ask a [`FrameSelector`] which ones to keep. The universal adapter cannot
//! see source frames one by one, so it asks [`transcoder_rate`] for an output
//! rate and lets the transcoder resample instead.

use std::time::Duration;

use crate::settings::SamplingMode;

/// Rate cap for "every frame" on the universal engine, which otherwise
/// rasterizes 60 fps sources into an unbounded pile of images.
pub const EVERY_FRAME_RATE_CAP: f64 = 30.0;

/// Timestamps within this many milliseconds of a sampling target count as
/// hitting it. Absorbs rounding in fractional frame durations.
const TARGET_EPSILON_MS: f64 = 0.5;

/// The selector's verdict on one source frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Emit this frame.
    Keep,
    /// Decode past this frame.
    Skip,
    /// Nothing further can be kept; stop decoding.
    Done,
}

/// Stateful per-run frame selector.
///
/// # Example
///
/// ```
/// use framepack::{FrameSelector, SamplingMode, Selection};
///
/// let mut selector = FrameSelector::new(SamplingMode::Nth(3), 100);
/// assert_eq!(selector.select(0, 0.0), Selection::Keep);
/// assert_eq!(selector.select(1, 40.0), Selection::Skip);
/// assert_eq!(selector.select(3, 120.0), Selection::Keep);
/// ```
#[derive(Debug, Clone)]
pub struct FrameSelector {
    mode: SamplingMode,
    max_frames: u64,
    kept: u64,
    next_target_ms: f64,
}

impl FrameSelector {
    /// Create a selector for one engine run.
    pub fn new(mode: SamplingMode, max_frames: u64) -> Self {
        Self {
            mode,
            max_frames: max_frames.max(1),
            kept: 0,
            next_target_ms: 0.0,
        }
    }

    /// Frames kept so far.
    pub fn kept(&self) -> u64 {
        self.kept
    }

    /// Decide about the source frame at `source_index`, presented at
    /// `timestamp_ms`. Frames must be offered in presentation order.
    pub fn select(&mut self, source_index: u64, timestamp_ms: f64) -> Selection {
        if self.kept >= self.max_frames {
            return Selection::Done;
        }

        let keep = match self.mode {
            SamplingMode::Every => true,
            SamplingMode::Nth(n) => source_index % u64::from(n.max(1)) == 0,
            SamplingMode::Fps(fps) => {
                if fps <= 0.0 {
                    return Selection::Done;
                }
                if timestamp_ms + TARGET_EPSILON_MS >= self.next_target_ms {
                    let interval = 1000.0 / fps;
                    while self.next_target_ms <= timestamp_ms + TARGET_EPSILON_MS {
                        self.next_target_ms += interval;
                    }
                    true
                } else {
                    false
                }
            }
            SamplingMode::TimeRange { start, end } => {
                let start_ms = duration_ms(start);
                let end_ms = duration_ms(end);
                if timestamp_ms > end_ms + TARGET_EPSILON_MS {
                    return Selection::Done;
                }
                timestamp_ms + TARGET_EPSILON_MS >= start_ms
            }
        };

        if keep {
            self.kept += 1;
            Selection::Keep
        } else {
            Selection::Skip
        }
    }

    /// Estimate how many frames this run will keep.
    ///
    /// `source_frames` is the source frame count when known, `duration_s`
    /// the source duration (0 when unknown), `source_fps` the source rate.
    pub fn estimate_total(
        &self,
        source_frames: Option<u64>,
        duration_s: f64,
        source_fps: f64,
    ) -> Option<u64> {
        let duration_s = if duration_s > 0.0 {
            duration_s
        } else {
            match source_frames {
                Some(frames) if source_fps > 0.0 => frames as f64 / source_fps,
                _ => 0.0,
            }
        };

        let estimate = match self.mode {
            SamplingMode::Every => source_frames,
            SamplingMode::Nth(n) => {
                source_frames.map(|frames| frames.div_ceil(u64::from(n.max(1))))
            }
            SamplingMode::Fps(fps) if duration_s > 0.0 && fps > 0.0 => {
                let rate = if source_fps > 0.0 { fps.min(source_fps) } else { fps };
                let output = (duration_s * rate).ceil() as u64;
                Some(match source_frames {
                    Some(frames) => output.min(frames),
                    None => output,
                })
            }
            SamplingMode::Fps(_) => None,
            SamplingMode::TimeRange { start, end } if source_fps > 0.0 => {
                let window_end = if duration_s > 0.0 {
                    end.as_secs_f64().min(duration_s)
                } else {
                    end.as_secs_f64()
                };
                let window = (window_end - start.as_secs_f64()).max(0.0);
                Some((window * source_fps).floor() as u64 + 1)
            }
            SamplingMode::TimeRange { .. } => None,
        };

        estimate.map(|total| total.min(self.max_frames))
    }
}

/// Output rate the universal transcoder should rasterize at.
///
/// * every frame / time range: the source rate, capped at
///   [`EVERY_FRAME_RATE_CAP`],
/// * explicit fps: as given,
/// * every Nth: source rate divided by N.
///
/// `source_fps` falls back to `assumed_fps` when the container declared none.
pub fn transcoder_rate(mode: SamplingMode, source_fps: Option<f64>, assumed_fps: f64) -> f64 {
    let source = source_fps.filter(|fps| *fps > 0.0).unwrap_or(assumed_fps);
    match mode {
        SamplingMode::Every | SamplingMode::TimeRange { .. } => source.min(EVERY_FRAME_RATE_CAP),
        SamplingMode::Fps(fps) => fps,
        SamplingMode::Nth(n) => source / f64::from(n.max(1)),
    }
}

/// The time window the universal transcoder should read, if any.
pub fn transcoder_window(mode: SamplingMode) -> Option<(Duration, Duration)> {
    match mode {
        SamplingMode::TimeRange { start, end } => Some((start, end)),
        _ => None,
    }
}

fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
