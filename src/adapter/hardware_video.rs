//! The hardware-video engine: FFmpeg demux and decode in-process.

use ffmpeg_next::{
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::Pixel,
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};

use crate::adapter::{DecodeAdapter, ExtractionJob, FrameSink, Flow, finish_run};
use crate::conversion::{pts_to_milliseconds, rgb_frame_to_image};
use crate::engine::EngineChoice;
use crate::error::FramepackError;
use crate::ffmpeg::ensure_initialized;
use crate::frame::DecodedFrame;
use crate::sampling::{FrameSelector, Selection};

/// Decodes MP4 and WebM through the linked FFmpeg, attaching a hardware
/// device context when the `hardware` feature is enabled and the codec
/// supports one.
#[derive(Debug, Clone, Default)]
pub struct HardwareVideoAdapter;

impl HardwareVideoAdapter {
    /// Create the adapter.
    pub fn new() -> Self {
        Self
    }
}

/// Per-run decode state.
struct DecodeRun<'a> {
    job: &'a ExtractionJob,
    decoder: VideoDecoder,
    scaler: Option<ScalingContext>,
    selector: FrameSelector,
    estimate: Option<u64>,
    time_base: ffmpeg_next::Rational,
    start_pts: i64,
    source_index: u64,
    finished: bool,
}

impl DecodeAdapter for HardwareVideoAdapter {
    fn engine(&self) -> EngineChoice {
        EngineChoice::HardwareVideoDecoder
    }

    fn extract(
        &mut self,
        job: &ExtractionJob,
        sink: &mut dyn FrameSink,
    ) -> Result<u64, FramepackError> {
        ensure_initialized()?;
        let container = job.metadata.media_kind;

        let mut input =
            ffmpeg_next::format::input(&job.source.path()).map_err(|error| {
                FramepackError::Demux {
                    container,
                    reason: error.to_string(),
                }
            })?;

        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or_else(|| FramepackError::Demux {
                container,
                reason: "no video track".to_string(),
            })?;
        let stream_index = stream.index();
        let time_base = stream.time_base();
        let start_pts = stream.start_time().max(0);
        let parameters = stream.parameters();
        let codec_id = parameters.id();

        let Some(codec) = ffmpeg_next::decoder::find(codec_id) else {
            return Err(FramepackError::UnsupportedCodec {
                engine: self.engine(),
                codec: codec_id.name().to_string(),
            });
        };

        #[allow(unused_mut)]
        let mut codec_context = CodecContext::from_parameters(parameters)?;

        #[cfg(feature = "hardware")]
        let hardware_active =
            crate::hardware::attach_hardware_device(&mut codec_context, unsafe { codec.as_ptr() });
        #[cfg(not(feature = "hardware"))]
        let hardware_active = false;

        let decoder = codec_context
            .decoder()
            .open_as(codec)
            .and_then(|opened| opened.video())
            .map_err(|error| FramepackError::UnsupportedCodec {
                engine: self.engine(),
                codec: format!("{} ({error})", codec_id.name()),
            })?;

        sink.ready(&format!(
            "{} {}x{} ({})",
            codec_id.name(),
            decoder.width(),
            decoder.height(),
            if hardware_active { "hardware" } else { "software" }
        ));

        let settings = &job.settings;
        let selector = FrameSelector::new(settings.sampling, settings.max_frames);
        let estimate = selector.estimate_total(
            job.metadata.reported_frame_count(),
            job.metadata.duration_seconds,
            job.metadata.effective_fps(settings.assumed_fps),
        );
        sink.emit_progress(0, estimate);

        let mut run = DecodeRun {
            job,
            decoder,
            scaler: None,
            selector,
            estimate,
            time_base,
            start_pts,
            source_index: 0,
            finished: false,
        };

        for (packet_stream, packet) in input.packets() {
            if sink.is_cancelled() {
                return Err(FramepackError::Cancelled);
            }
            if packet_stream.index() != stream_index {
                continue;
            }

            run.decoder
                .send_packet(&packet)
                .map_err(|error| run.decode_error(error.to_string()))?;
            run.drain(sink)?;
            if run.finished {
                break;
            }
        }

        if !run.finished {
            run.decoder
                .send_eof()
                .map_err(|error| run.decode_error(error.to_string()))?;
            run.drain(sink)?;
        }

        finish_run(self.engine(), sink.frames_emitted())
    }
}

impl DecodeRun<'_> {
    /// Receive every frame the decoder has ready and offer each to the
    /// selector.
    fn drain(&mut self, sink: &mut dyn FrameSink) -> Result<(), FramepackError> {
        let mut decoded = VideoFrame::empty();

        while !self.finished && self.decoder.receive_frame(&mut decoded).is_ok() {
            if sink.is_cancelled() {
                return Err(FramepackError::Cancelled);
            }

            let pts = decoded.timestamp().or(decoded.pts()).unwrap_or(0);
            let timestamp_ms =
                pts_to_milliseconds(pts - self.start_pts, self.time_base).max(0.0);
            let source_index = self.source_index;
            self.source_index += 1;

            match self.selector.select(source_index, timestamp_ms) {
                Selection::Skip => continue,
                Selection::Done => {
                    self.finished = true;
                    break;
                }
                Selection::Keep => {}
            }

            let image = self.to_image(&decoded, source_index)?;
            let flow = sink.emit_frame(DecodedFrame::new(image, timestamp_ms.round() as u64))?;
            sink.emit_progress(sink.frames_emitted(), self.estimate);
            if flow == Flow::Stop {
                self.finished = true;
            }
        }

        Ok(())
    }

    fn to_image(
        &mut self,
        decoded: &VideoFrame,
        source_index: u64,
    ) -> Result<image::DynamicImage, FramepackError> {
        #[cfg(feature = "hardware")]
        let transferred;
        #[cfg(feature = "hardware")]
        let decoded = if crate::hardware::is_hardware_frame(decoded) {
            transferred = crate::hardware::transfer_hardware_frame(decoded, source_index)?;
            &transferred
        } else {
            decoded
        };

        if self.scaler.is_none() {
            let scaler = ScalingContext::get(
                decoded.format(),
                decoded.width(),
                decoded.height(),
                Pixel::RGB24,
                decoded.width(),
                decoded.height(),
                ScalingFlags::BILINEAR,
            )?;
            self.scaler = Some(scaler);
        }

        let mut rgb_frame = VideoFrame::empty();
        let scaled = match self.scaler.as_mut() {
            Some(scaler) => scaler.run(decoded, &mut rgb_frame),
            None => Ok(()),
        };
        if let Err(error) = scaled {
            return Err(self.decode_error_at(source_index, error.to_string()));
        }

        rgb_frame_to_image(&rgb_frame).ok_or_else(|| {
            self.decode_error_at(
                source_index,
                "scaled frame is smaller than its declared size".to_string(),
            )
        })
    }

    fn decode_error(&self, reason: String) -> FramepackError {
        self.decode_error_at(self.source_index, reason)
    }

    fn decode_error_at(&self, frame: u64, reason: String) -> FramepackError {
        log::debug!("Decode failure in {}: {reason}", self.job.source.name());
        FramepackError::DecodeFailed {
            engine: EngineChoice::HardwareVideoDecoder,
            frame,
            reason,
        }
    }
}
