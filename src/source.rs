//! Input files.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::FramepackError;
use crate::media_kind::{MediaKind, SNIFF_LEN, sniff_true_type};

/// A media file on disk, identified by path, display name and size.
///
/// Cheap to clone; file contents are read on demand by the probe and the
/// adapters, never cached here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    path: PathBuf,
    name: String,
    size_bytes: u64,
}

impl MediaSource {
    /// Open `path` and record its name and size.
    ///
    /// # Errors
    ///
    /// Returns [`FramepackError::FileOpen`] if the path does not exist or is
    /// not a regular file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FramepackError> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|error| FramepackError::FileOpen {
            path: path.display().to_string(),
            reason: error.to_string(),
        })?;
        if !metadata.is_file() {
            return Err(FramepackError::FileOpen {
                path: path.display().to_string(),
                reason: "not a regular file".to_string(),
            });
        }

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());

        log::debug!("Opened media source {} ({} bytes)", path.display(), metadata.len());

        Ok(Self {
            path: path.to_path_buf(),
            name,
            size_bytes: metadata.len(),
        })
    }

    /// Path on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name, used for archive names and the naming template.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File name without its extension.
    pub fn stem(&self) -> &str {
        match self.name.rfind('.') {
            Some(dot) if dot > 0 => &self.name[..dot],
            _ => &self.name,
        }
    }

    /// File size in bytes at open time.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Read up to `limit` leading bytes.
    pub fn read_head(&self, limit: usize) -> Result<Vec<u8>, FramepackError> {
        let file = File::open(&self.path)?;
        let mut head = Vec::with_capacity(limit);
        file.take(limit as u64).read_to_end(&mut head)?;
        Ok(head)
    }

    /// Read the whole file.
    pub fn read_all(&self) -> Result<Vec<u8>, FramepackError> {
        Ok(std::fs::read(&self.path)?)
    }

    /// Sniff the content type. Unreadable files are [`MediaKind::Unknown`].
    pub fn sniff(&self) -> MediaKind {
        match self.read_head(SNIFF_LEN) {
            Ok(head) => sniff_true_type(&head),
            Err(error) => {
                log::warn!("Could not read {} for sniffing: {error}", self.path.display());
                MediaKind::Unknown
            }
        }
    }
}
