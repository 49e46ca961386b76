//! Archive packaging.
//!
//! [`ArchivePackager`] streams extracted frames into deflate-compressed zip
//! archives. With splitting enabled, a part is closed the moment it holds
//! `frames_per_part` frames and handed back with the next frame (or by
//! [`ArchivePackager::finish`]), so at most two parts' worth of compressed
//! data are held in memory at a time.
//!
//! Part totals in filenames are lower bounds: a closed part is only labelled
//! once it is known whether another part follows, so the count never goes
//! down and the last part always carries the exact total.
//!
//! # Example
//!
//! ```
//! use framepack::{ArchivePackager, ExtractedFrame, ExtractionSettings};
//!
//! let settings = ExtractionSettings::new().with_split(2);
//! let mut packager = ArchivePackager::new(&settings, "clip");
//!
//! let mut parts = Vec::new();
//! for index in 0..3 {
//!     let frame = ExtractedFrame {
//!         index,
//!         timestamp_ms: index * 100,
//!         image_bytes: vec![0; 16],
//!         suggested_filename: format!("clip_{index:05}.png"),
//!     };
//!     parts.extend(packager.push(&frame)?);
//! }
//! parts.extend(packager.finish()?);
//!
//! assert_eq!(parts.len(), 2);
//! assert_eq!(parts[0].filename, "clip_part01of02_frames00000-00001.zip");
//! assert_eq!(parts[1].filename, "clip_part02of02_frames00002-00002.zip");
//! # Ok::<(), framepack::FramepackError>(())
//! ```

use std::collections::HashSet;
use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::FramepackError;
use crate::frame::ExtractedFrame;
use crate::settings::{ExtractionSettings, SplitSettings};

/// One finalized archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePart {
    /// 0-based part number.
    pub part_index: usize,
    /// Parts known to exist when this part was handed over. Never lower
    /// than an earlier part's value; exact for the last part.
    pub total_parts_known_so_far: usize,
    /// Index of the first frame in this part.
    pub start_frame_index: u64,
    /// Index of the last frame in this part (inclusive).
    pub end_frame_index: u64,
    /// Suggested archive filename.
    pub filename: String,
    /// The zip file.
    pub archive_bytes: Vec<u8>,
    /// Deliver immediately rather than at the end of the job.
    pub auto_download: bool,
}

impl ArchivePart {
    /// Number of frames in the part.
    pub fn frame_count(&self) -> u64 {
        self.end_frame_index - self.start_frame_index + 1
    }
}

/// The part currently being written.
struct OpenPart {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    start_frame_index: u64,
    end_frame_index: u64,
    frames: u64,
    entry_names: HashSet<String>,
}

impl OpenPart {
    fn new(start_frame_index: u64) -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            start_frame_index,
            end_frame_index: start_frame_index,
            frames: 0,
            entry_names: HashSet::new(),
        }
    }

    fn close(self) -> Result<ClosedPart, FramepackError> {
        Ok(ClosedPart {
            start_frame_index: self.start_frame_index,
            end_frame_index: self.end_frame_index,
            archive_bytes: self.writer.finish()?.into_inner(),
        })
    }
}

/// A full part waiting to learn whether it is the last one.
struct ClosedPart {
    start_frame_index: u64,
    end_frame_index: u64,
    archive_bytes: Vec<u8>,
}

/// Incremental zip writer with frame-count splitting.
pub struct ArchivePackager {
    split: SplitSettings,
    stem: String,
    parts_emitted: usize,
    total_parts_known: usize,
    closed: Option<ClosedPart>,
    current: Option<OpenPart>,
}

impl ArchivePackager {
    /// Create a packager for archives named after `archive_stem`.
    pub fn new(settings: &ExtractionSettings, archive_stem: impl Into<String>) -> Self {
        Self {
            split: settings.split,
            stem: archive_stem.into(),
            parts_emitted: 0,
            total_parts_known: 0,
            closed: None,
            current: None,
        }
    }

    /// Parts handed back so far.
    pub fn parts_emitted(&self) -> usize {
        self.parts_emitted
    }

    /// Add a frame. Returns the previous part when this frame is the first
    /// one past it.
    ///
    /// # Errors
    ///
    /// Returns [`FramepackError::Archive`] or [`FramepackError::Io`] if the
    /// zip writer fails.
    pub fn push(&mut self, frame: &ExtractedFrame) -> Result<Option<ArchivePart>, FramepackError> {
        // A frame past a closed part proves that part is not the last.
        let released = self.closed.take().map(|closed| self.label(closed, false));

        let part = self
            .current
            .get_or_insert_with(|| OpenPart::new(frame.index));

        let entry_name = unique_entry_name(&mut part.entry_names, &frame.suggested_filename);
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        part.writer.start_file(entry_name, options)?;
        part.writer.write_all(&frame.image_bytes)?;
        part.end_frame_index = frame.index;
        part.frames += 1;

        if self.split.enabled && part.frames >= self.split.frames_per_part.max(1) {
            self.closed = self.current.take().map(OpenPart::close).transpose()?;
        }
        Ok(released)
    }

    /// Hand back the last part, if any frames are left.
    pub fn finish(&mut self) -> Result<Option<ArchivePart>, FramepackError> {
        let open = self.current.take().filter(|part| part.frames > 0);
        let last = match (self.closed.take(), open) {
            (Some(closed), None) => closed,
            (None, Some(open)) => open.close()?,
            (None, None) => return Ok(None),
            (Some(_), Some(_)) => {
                return Err(FramepackError::InvalidSettings(
                    "archive part left open behind a closed one".to_string(),
                ));
            }
        };
        Ok(Some(self.label(last, true)))
    }

    /// Discard everything, including the open part.
    pub fn reset(&mut self) {
        self.parts_emitted = 0;
        self.total_parts_known = 0;
        self.closed = None;
        self.current = None;
    }

    fn label(&mut self, part: ClosedPart, last: bool) -> ArchivePart {
        let part_index = self.parts_emitted;
        let at_least = if last { part_index + 1 } else { part_index + 2 };
        let total_parts = self.total_parts_known.max(at_least);
        self.total_parts_known = total_parts;
        self.parts_emitted += 1;

        let filename = if self.split.enabled {
            format!(
                "{}_part{:02}of{:02}_frames{:05}-{:05}.zip",
                self.stem,
                part_index + 1,
                total_parts,
                part.start_frame_index,
                part.end_frame_index
            )
        } else {
            format!("{}_frames.zip", self.stem)
        };

        log::debug!(
            "Finalized {filename}: frames {}-{} ({} bytes)",
            part.start_frame_index,
            part.end_frame_index,
            part.archive_bytes.len()
        );

        ArchivePart {
            part_index,
            total_parts_known_so_far: total_parts,
            start_frame_index: part.start_frame_index,
            end_frame_index: part.end_frame_index,
            filename,
            archive_bytes: part.archive_bytes,
            auto_download: self.split.enabled && self.split.auto_download,
        }
    }
}

/// `name`, or `name` with the first free `_N` counter spliced in before the
/// extension when the template produced a duplicate.
fn unique_entry_name(used: &mut HashSet<String>, name: &str) -> String {
    let mut candidate = name.to_string();
    let mut counter = 1u64;
    while used.contains(&candidate) {
        candidate = match name.rsplit_once('.') {
            Some((base, extension)) => format!("{base}_{counter}.{extension}"),
            None => format!("{name}_{counter}"),
        };
        counter += 1;
    }
    used.insert(candidate.clone());
    candidate
}
