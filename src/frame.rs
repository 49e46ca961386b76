//! Frames as they travel from adapter to caller.

use image::DynamicImage;

/// A decoded, not yet encoded, frame as produced by an adapter.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Decoded pixels.
    pub image: DynamicImage,
    /// Presentation time in milliseconds from the start of the source.
    pub timestamp_ms: u64,
}

impl DecodedFrame {
    /// Wrap a decoded image.
    pub fn new(image: DynamicImage, timestamp_ms: u64) -> Self {
        Self {
            image,
            timestamp_ms,
        }
    }
}

/// One extracted, encoded frame.
///
/// `index` is the 0-based position within the current engine run: strictly
/// increasing and contiguous. Ownership of `image_bytes` passes to the caller
/// on emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFrame {
    /// Position within the engine run.
    pub index: u64,
    /// Presentation time in milliseconds.
    pub timestamp_ms: u64,
    /// Encoded image.
    pub image_bytes: Vec<u8>,
    /// Entry name rendered from the naming template.
    pub suggested_filename: String,
}
