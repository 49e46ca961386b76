//! The image-frame engine: the `image` crate's animation decoders.

use std::io::Cursor;
use std::time::Duration;

use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, DynamicImage, Frames};

use crate::adapter::{DecodeAdapter, ExtractionJob, FrameSink, Flow, finish_run};
use crate::engine::EngineChoice;
use crate::error::FramepackError;
use crate::frame::DecodedFrame;
use crate::media_kind::MediaKind;
use crate::sampling::{FrameSelector, Selection};

/// Frame delays below this are treated as "unspecified", as browsers do.
const MIN_FRAME_DELAY_MS: f64 = 10.0;

/// Keep the watchdog fed while counting long animations.
const COUNTING_HEARTBEAT: u64 = 25;

/// Decodes GIF, APNG and WebP animations (and still PNG/WebP as a single
/// frame).
///
/// The decoder's frame iterator is the only source of truth for the frame
/// count when the header does not report one: a counting pass walks the
/// animation until the decoder ends or fails, and a fresh decoder then
/// replays from the first frame up to that bound.
#[derive(Debug, Clone)]
pub struct ImageFrameAdapter {
    stall_timeout: Duration,
}

impl ImageFrameAdapter {
    /// Create the adapter with the given watchdog timeout.
    pub fn new(stall_timeout: Duration) -> Self {
        Self { stall_timeout }
    }
}

enum FrameSource<'a> {
    Animated(Frames<'a>),
    Still(DynamicImage),
}

impl DecodeAdapter for ImageFrameAdapter {
    fn engine(&self) -> EngineChoice {
        EngineChoice::ImageFrameDecoder
    }

    fn stall_timeout(&self) -> Option<Duration> {
        Some(self.stall_timeout)
    }

    fn extract(
        &mut self,
        job: &ExtractionJob,
        sink: &mut dyn FrameSink,
    ) -> Result<u64, FramepackError> {
        let bytes = job.source.read_all()?;
        let kind = job.metadata.media_kind;
        let settings = &job.settings;

        let bound = match job.metadata.reported_frame_count() {
            Some(count) => count,
            None => {
                let counted = count_frames(kind, &bytes, sink)?;
                log::debug!("Counted {counted} frames in {}", job.source.name());
                counted
            }
        };
        if bound == 0 {
            return Err(FramepackError::no_frames(self.engine()));
        }

        let mut frames = open_frames(kind, &bytes)?;
        let dimensions = if job.metadata.has_dimensions() {
            format!("{}x{}", job.metadata.width, job.metadata.height)
        } else {
            "size from first frame".to_string()
        };
        sink.ready(&format!("{kind} animation decoder, {bound} frames, {dimensions}"));

        let mut selector = FrameSelector::new(settings.sampling, settings.max_frames);
        let estimate = selector.estimate_total(Some(bound), 0.0, settings.assumed_fps);
        sink.emit_progress(0, estimate);

        let fallback_delay_ms = 1000.0 / settings.assumed_fps.max(f64::EPSILON);
        let mut timestamp_ms = 0.0_f64;

        for source_index in 0..bound {
            if sink.is_cancelled() {
                return Err(FramepackError::Cancelled);
            }

            let (image, delay_ms) = match &mut frames {
                FrameSource::Still(image) if source_index == 0 => (image.clone(), 0.0),
                FrameSource::Still(_) => break,
                FrameSource::Animated(iter) => match iter.next() {
                    Some(Ok(frame)) => {
                        let (numerator, denominator) = frame.delay().numer_denom_ms();
                        let delay = if denominator == 0 {
                            0.0
                        } else {
                            f64::from(numerator) / f64::from(denominator)
                        };
                        (DynamicImage::ImageRgba8(frame.into_buffer()), delay)
                    }
                    Some(Err(error)) => {
                        return Err(FramepackError::DecodeFailed {
                            engine: self.engine(),
                            frame: source_index,
                            reason: error.to_string(),
                        });
                    }
                    // Header promised more frames than the stream holds.
                    None => break,
                },
            };

            if source_index == 0 && !job.metadata.has_dimensions() {
                sink.report_frame_size(image.width(), image.height());
            }

            let delay_ms = if delay_ms < MIN_FRAME_DELAY_MS {
                fallback_delay_ms
            } else {
                delay_ms
            };

            match selector.select(source_index, timestamp_ms) {
                Selection::Keep => {
                    let frame = DecodedFrame::new(image, timestamp_ms.round() as u64);
                    let flow = sink.emit_frame(frame)?;
                    sink.emit_progress(sink.frames_emitted(), estimate);
                    if flow == Flow::Stop {
                        break;
                    }
                }
                Selection::Skip => {}
                Selection::Done => break,
            }

            timestamp_ms += delay_ms;
        }

        finish_run(self.engine(), sink.frames_emitted())
    }
}

/// Open a decoder over `bytes` positioned at the first frame.
fn open_frames(kind: MediaKind, bytes: &[u8]) -> Result<FrameSource<'_>, FramepackError> {
    let frames = match kind {
        MediaKind::Gif => GifDecoder::new(Cursor::new(bytes))?.into_frames(),
        MediaKind::Apng => PngDecoder::new(Cursor::new(bytes))?.apng()?.into_frames(),
        MediaKind::Webp => {
            let decoder = WebPDecoder::new(Cursor::new(bytes))?;
            if !decoder.has_animation() {
                return Ok(FrameSource::Still(image::load_from_memory(bytes)?));
            }
            decoder.into_frames()
        }
        MediaKind::Png => return Ok(FrameSource::Still(image::load_from_memory(bytes)?)),
        other => {
            return Err(FramepackError::DecodeFailed {
                engine: EngineChoice::ImageFrameDecoder,
                frame: 0,
                reason: format!("{other} is not an image animation"),
            });
        }
    };
    Ok(FrameSource::Animated(frames))
}

/// Walk the animation once. The index of the first failure (or the end of
/// the stream) is the exclusive frame bound.
fn count_frames(
    kind: MediaKind,
    bytes: &[u8],
    sink: &mut dyn FrameSink,
) -> Result<u64, FramepackError> {
    let mut frames = match open_frames(kind, bytes)? {
        FrameSource::Still(_) => return Ok(1),
        FrameSource::Animated(frames) => frames,
    };

    let mut count = 0;
    loop {
        if sink.is_cancelled() {
            return Err(FramepackError::Cancelled);
        }
        match frames.next() {
            Some(Ok(_)) => count += 1,
            Some(Err(error)) => {
                log::debug!("Counting pass stopped at frame {count}: {error}");
                break;
            }
            None => break,
        }
        if count % COUNTING_HEARTBEAT == 0 {
            sink.emit_progress(0, None);
        }
    }

    Ok(count)
}
