//! Frame rescaling and image encoding.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use crate::error::FramepackError;
use crate::settings::{ExtractionSettings, OutputFormat, Rescale};

/// Turns decoded frames into the bytes that go into an archive entry.
#[derive(Debug, Clone)]
pub(crate) struct FrameEncoder {
    format: OutputFormat,
    rescale: Rescale,
}

impl FrameEncoder {
    pub(crate) fn new(settings: &ExtractionSettings) -> Self {
        Self {
            format: settings.output_format,
            rescale: settings.rescale,
        }
    }

    /// Rescale `image` per the settings and encode it.
    pub(crate) fn encode(&self, image: DynamicImage) -> Result<Vec<u8>, FramepackError> {
        let image = self.resize(image);
        let mut buffer = Vec::new();

        match self.format {
            OutputFormat::Png => {
                let encoder = PngEncoder::new_with_quality(
                    &mut buffer,
                    CompressionType::Fast,
                    PngFilterType::Adaptive,
                );
                image.write_with_encoder(encoder)?;
            }
            OutputFormat::PngCompressed => {
                let encoder = PngEncoder::new_with_quality(
                    &mut buffer,
                    CompressionType::Best,
                    PngFilterType::Adaptive,
                );
                image.write_with_encoder(encoder)?;
            }
            OutputFormat::Jpeg { quality } => {
                // JPEG has no alpha channel.
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
                rgb.write_with_encoder(encoder)?;
            }
        }

        Ok(buffer)
    }

    fn resize(&self, image: DynamicImage) -> DynamicImage {
        if self.rescale.is_identity() {
            return image;
        }
        let (source_width, source_height) = image.dimensions();
        let (width, height) = self.rescale.resolve(source_width, source_height);
        if (width, height) == (source_width, source_height) || width == 0 || height == 0 {
            return image;
        }
        image.resize_exact(width, height, FilterType::Triangle)
    }
}
