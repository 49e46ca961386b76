//! Header-only metadata probing.
//!
//! [`MediaProbe`] fills a [`FileMetadata`] from container headers without
//! decoding content: the `image` crate's header readers for animation
//! formats, an FFmpeg demuxer for video containers. Files neither can read
//! still get a metadata record (kind [`MediaKind::Unknown`]) so the
//! universal engine can have a go at them.

use std::io::BufReader;

use ffmpeg_next::{Rational, media::Type};
use image::ImageReader;

use crate::error::FramepackError;
use crate::ffmpeg::ensure_initialized;
use crate::media_kind::{MediaKind, SNIFF_LEN, sniff_true_type};
use crate::metadata::FileMetadata;
use crate::source::MediaSource;

/// Header-only metadata probe.
///
/// # Example
///
/// ```no_run
/// use framepack::{MediaProbe, MediaSource};
///
/// let source = MediaSource::open("spinner.gif")?;
/// let metadata = MediaProbe::probe(&source)?;
/// assert_eq!(metadata.duration_seconds, 0.0);
/// # Ok::<(), framepack::FramepackError>(())
/// ```
pub struct MediaProbe;

impl MediaProbe {
    /// Probe a source and return its metadata.
    ///
    /// # Errors
    ///
    /// Returns [`FramepackError::Io`] if the file cannot be read at all.
    /// Header parse failures are not errors: they yield a record with zero
    /// dimensions, which validation reports before extraction starts.
    pub fn probe(source: &MediaSource) -> Result<FileMetadata, FramepackError> {
        let head = source.read_head(SNIFF_LEN)?;
        let kind = sniff_true_type(&head);
        log::debug!("Probing {} (sniffed as {kind})", source.name());

        let mut metadata = FileMetadata::unknown(source.name(), source.size_bytes());
        metadata.media_kind = kind;

        if kind.is_image_animation() {
            probe_image_header(source, &head, &mut metadata);
        } else if let Err(error) = probe_container(source, &mut metadata) {
            log::debug!("FFmpeg could not read {}: {error}", source.name());
        }

        Ok(metadata)
    }

    /// Probe several sources; failures are reported per entry.
    pub fn probe_many(sources: &[MediaSource]) -> Vec<Result<FileMetadata, FramepackError>> {
        sources.iter().map(Self::probe).collect()
    }
}

fn probe_image_header(source: &MediaSource, head: &[u8], metadata: &mut FileMetadata) {
    let dimensions = std::fs::File::open(source.path())
        .map_err(FramepackError::from)
        .and_then(|file| {
            let reader = ImageReader::new(BufReader::new(file)).with_guessed_format()?;
            Ok(reader.into_dimensions()?)
        });

    match dimensions {
        Ok((width, height)) => {
            metadata.width = width;
            metadata.height = height;
        }
        Err(error) => log::debug!("No header dimensions for {}: {error}", source.name()),
    }

    metadata.frame_count = match metadata.media_kind {
        MediaKind::Apng => apng_frame_count(head),
        MediaKind::Png => Some(1),
        MediaKind::Webp if !crate::media_kind::is_animated_webp(head) => Some(1),
        _ => None,
    };
}

/// `num_frames` from the APNG `acTL` chunk, if it lies within `head`.
fn apng_frame_count(head: &[u8]) -> Option<u64> {
    let position = head.windows(4).position(|window| window == b"acTL")?;
    let data = head.get(position + 4..position + 8)?;
    let frames = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    Some(u64::from(frames))
}

fn probe_container(source: &MediaSource, metadata: &mut FileMetadata) -> Result<(), FramepackError> {
    ensure_initialized()?;
    let input = ffmpeg_next::format::input(&source.path())?;

    let duration_microseconds = input.duration();
    if duration_microseconds > 0 {
        metadata.duration_seconds = duration_microseconds as f64 / 1_000_000.0;
    }

    let Some(stream) = input.streams().best(Type::Video) else {
        return Ok(());
    };

    let parameters = stream.parameters();
    metadata.codec = Some(parameters.id().name().to_string());

    // Read dimensions straight from the codec parameters so the probe works
    // even when no decoder for the codec is compiled in.
    let (width, height) = unsafe {
        let raw = *parameters.as_ptr();
        (raw.width.max(0) as u32, raw.height.max(0) as u32)
    };
    metadata.width = width;
    metadata.height = height;

    let fps = rational_to_f64(stream.avg_frame_rate())
        .or_else(|| rational_to_f64(stream.rate()));
    metadata.fps = fps;

    let frames = stream.frames();
    metadata.frame_count = if frames > 0 {
        Some(frames as u64)
    } else {
        fps.map(|fps| (metadata.duration_seconds * fps) as u64)
    };

    Ok(())
}

fn rational_to_f64(rate: Rational) -> Option<f64> {
    if rate.denominator() == 0 || rate.numerator() <= 0 {
        None
    } else {
        Some(rate.numerator() as f64 / rate.denominator() as f64)
    }
}
