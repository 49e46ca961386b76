//! Pre-flight validation of a job.
//!
//! [`validate_job`] inspects the settings and the probed metadata and
//! returns a [`ValidationReport`]. The orchestrator refuses to start a job
//! whose report has errors; warnings are logged and passed over.
//!
//! # Example
//!
//! ```
//! use framepack::{ExtractionSettings, FileMetadata, SamplingMode, validate_job};
//!
//! let settings = ExtractionSettings::new().with_sampling(SamplingMode::Fps(0.0));
//! let metadata = FileMetadata::unknown("clip.mp4", 0);
//! let report = validate_job(&settings, &metadata);
//! assert!(!report.is_valid());
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::metadata::FileMetadata;
use crate::settings::{ExtractionSettings, OutputFormat, SamplingMode};

/// Frame rates above this are almost certainly a mistyped value.
const HIGH_FPS_WARNING: f64 = 240.0;

/// Summary of job validation.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Informational notices (not problems).
    pub info: Vec<String>,
    /// Non-fatal issues that may affect the output.
    pub warnings: Vec<String>,
    /// Fatal issues that prevent the job from starting.
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// Returns `true` if no errors were found. Warnings do not count.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Total number of issues (info + warnings + errors).
    pub fn issue_count(&self) -> usize {
        self.info.len() + self.warnings.len() + self.errors.len()
    }
}

impl Display for ValidationReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        for item in &self.info {
            writeln!(f, "[INFO] {item}")?;
        }
        for item in &self.warnings {
            writeln!(f, "[WARN] {item}")?;
        }
        for item in &self.errors {
            writeln!(f, "[ERROR] {item}")?;
        }
        if self.issue_count() == 0 {
            writeln!(f, "No issues found.")?;
        }
        Ok(())
    }
}

/// Check `settings` against themselves and against `metadata`.
pub fn validate_job(settings: &ExtractionSettings, metadata: &FileMetadata) -> ValidationReport {
    let mut report = ValidationReport::default();

    // ── Sampling ───────────────────────────────────────────────────
    match settings.sampling {
        SamplingMode::Every => {}
        SamplingMode::Fps(fps) => {
            if !fps.is_finite() || fps <= 0.0 {
                report
                    .errors
                    .push(format!("Sampling rate must be positive, got {fps}"));
            } else if fps > HIGH_FPS_WARNING {
                report.warnings.push(format!(
                    "Unusually high sampling rate ({fps:.1} fps); the source rate caps the output"
                ));
            }
        }
        SamplingMode::Nth(n) => {
            if n == 0 {
                report
                    .errors
                    .push("Every-Nth sampling needs N of at least 1".to_string());
            }
        }
        SamplingMode::TimeRange { start, end } => {
            if start >= end {
                report.errors.push(format!(
                    "Time range start ({start:?}) must be before its end ({end:?})"
                ));
            } else if metadata.duration_seconds > 0.0
                && start.as_secs_f64() >= metadata.duration_seconds
            {
                report.errors.push(format!(
                    "Time range starts at {start:?}, after the end of the file ({:.2}s)",
                    metadata.duration_seconds
                ));
            }
        }
    }

    // ── Output ─────────────────────────────────────────────────────
    if let OutputFormat::Jpeg { quality } = settings.output_format {
        if !(1..=100).contains(&quality) {
            report
                .errors
                .push(format!("JPEG quality must be between 1 and 100, got {quality}"));
        }
    }

    if settings.split.enabled && settings.split.frames_per_part == 0 {
        report
            .errors
            .push("Split export needs at least 1 frame per part".to_string());
    }

    if settings.max_frames == 0 {
        report
            .errors
            .push("The frame cap must be at least 1".to_string());
    }

    if !settings.assumed_fps.is_finite() || settings.assumed_fps <= 0.0 {
        report.errors.push(format!(
            "The assumed animation frame rate must be positive, got {}",
            settings.assumed_fps
        ));
    }

    if settings.rescale.width == Some(0) || settings.rescale.height == Some(0) {
        report
            .errors
            .push("Output dimensions must be non-zero".to_string());
    }

    // ── Metadata ───────────────────────────────────────────────────
    if !metadata.has_dimensions() {
        report.warnings.push(
            "Frame dimensions are unknown; they will be taken from the first decoded frame"
                .to_string(),
        );
    }

    if let Some(fps) = metadata.fps {
        if fps > HIGH_FPS_WARNING {
            report.warnings.push(format!(
                "Unusually high source frame rate ({fps:.1} fps); extraction may be slow"
            ));
        }
    }

    report.info.push(format!(
        "{}: {} {}x{}{}",
        metadata.name,
        metadata.media_kind,
        metadata.width,
        metadata.height,
        metadata
            .codec
            .as_deref()
            .map(|codec| format!(" ({codec})"))
            .unwrap_or_default(),
    ));

    report
}
