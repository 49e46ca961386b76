//! Content-based media type detection.
//!
//! Declared MIME types and file extensions are routinely wrong for uploads
//! (`application/octet-stream`, `.gif` files that are really MP4, and so on),
//! so engine selection works from [`sniff_true_type`], which looks only at
//! the leading bytes of the file.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Number of leading bytes [`sniff_true_type`] needs to classify every kind.
///
/// APNG detection walks PNG chunks until the first `IDAT`, so this is larger
/// than any fixed signature.
pub const SNIFF_LEN: usize = 4096;

/// Concrete content format determined by byte inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// GIF87a / GIF89a.
    Gif,
    /// Animated PNG (PNG with an `acTL` chunk before image data).
    Apng,
    /// Still PNG.
    Png,
    /// WebP, animated or still.
    Webp,
    /// ISO base media (MP4, MOV, M4V).
    Mp4,
    /// Matroska / WebM.
    Webm,
    /// Anything else.
    Unknown,
}

impl MediaKind {
    /// Every kind, in declaration order.
    pub const ALL: [MediaKind; 7] = [
        MediaKind::Gif,
        MediaKind::Apng,
        MediaKind::Png,
        MediaKind::Webp,
        MediaKind::Mp4,
        MediaKind::Webm,
        MediaKind::Unknown,
    ];

    /// Single-file animation containers handled by the image decoders.
    pub fn is_image_animation(self) -> bool {
        matches!(
            self,
            MediaKind::Gif | MediaKind::Apng | MediaKind::Png | MediaKind::Webp
        )
    }

    /// Video containers.
    pub fn is_video(self) -> bool {
        matches!(self, MediaKind::Mp4 | MediaKind::Webm)
    }

    /// Short lowercase name, also used in log lines and JSON output.
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Gif => "gif",
            MediaKind::Apng => "apng",
            MediaKind::Png => "png",
            MediaKind::Webp => "webp",
            MediaKind::Mp4 => "mp4",
            MediaKind::Webm => "webm",
            MediaKind::Unknown => "unknown",
        }
    }
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const EBML_MAGIC: &[u8] = &[0x1a, 0x45, 0xdf, 0xa3];

/// Classify a file by its leading bytes.
///
/// Pure and deterministic: no I/O, no allocation. Pass at least
/// [`SNIFF_LEN`] bytes when available; shorter inputs still classify every
/// kind except that an APNG whose `acTL` chunk lies beyond the slice is
/// reported as [`MediaKind::Png`].
///
/// # Example
///
/// ```
/// use framepack::{MediaKind, sniff_true_type};
///
/// assert_eq!(sniff_true_type(b"GIF89a\x01\x00\x01\x00"), MediaKind::Gif);
/// assert_eq!(sniff_true_type(b"not media"), MediaKind::Unknown);
/// ```
pub fn sniff_true_type(bytes: &[u8]) -> MediaKind {
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return MediaKind::Gif;
    }

    if bytes.starts_with(PNG_SIGNATURE) {
        return if png_has_animation_control(bytes) {
            MediaKind::Apng
        } else {
            MediaKind::Png
        };
    }

    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return MediaKind::Webp;
    }

    if bytes.len() >= 8 && &bytes[4..8] == b"ftyp" {
        return MediaKind::Mp4;
    }

    if bytes.starts_with(EBML_MAGIC) {
        // Both Matroska and WebM go through the same demuxer.
        return MediaKind::Webm;
    }

    MediaKind::Unknown
}

/// Walk PNG chunks looking for `acTL` ahead of the first `IDAT`.
fn png_has_animation_control(bytes: &[u8]) -> bool {
    let mut offset = PNG_SIGNATURE.len();
    while offset + 8 <= bytes.len() {
        let length = u32::from_be_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]) as usize;
        let chunk_type = &bytes[offset + 4..offset + 8];
        match chunk_type {
            b"acTL" => return true,
            b"IDAT" | b"IEND" => return false,
            _ => {}
        }
        // length + type + data + crc
        offset = match offset.checked_add(12 + length) {
            Some(next) => next,
            None => return false,
        };
    }
    false
}

/// Returns `true` when a WebP file declares animation in its `VP8X` header.
///
/// Still WebP images are decoded as a single frame rather than through the
/// animation decoder.
pub fn is_animated_webp(bytes: &[u8]) -> bool {
    // RIFF header (12 bytes), then the first chunk. Animation is only
    // possible in the extended (VP8X) layout, flag bit 1 of the first byte.
    bytes.len() >= 21 && &bytes[12..16] == b"VP8X" && bytes[20] & 0x02 != 0
}
