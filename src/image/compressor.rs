use super::CompressionService;
use crate::storage::Storage;
use crate::{PipelineError, PipelineResult};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageError, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const MAX_WIDTH: u32 = 800;
pub const JPEG_QUALITY: u8 = 80;

/// Output encoding, chosen from the input file's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DerivedFormat {
    Png,
    Jpeg,
    Gif,
}

impl DerivedFormat {
    fn from_path(path: &Path) -> PipelineResult<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "gif" => Ok(Self::Gif),
            _ => Err(PipelineError::UnsupportedFormat {
                path: path.to_path_buf(),
                extension: if extension.is_empty() {
                    extension
                } else {
                    format!(".{}", extension)
                },
            }),
        }
    }
}

/// Target size for an image capped at `max_width`, keeping the aspect ratio.
pub fn bounded_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width {
        return (width, height);
    }

    let scaled = (f64::from(height) * f64::from(max_width) / f64::from(width)).round() as u32;
    (max_width, scaled.max(1))
}

/// Resizes downloaded originals and re-encodes them next to the derived root.
pub struct ImageCompressor {
    storage: Arc<dyn Storage>,
    max_width: u32,
    jpeg_quality: u8,
}

impl ImageCompressor {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            max_width: MAX_WIDTH,
            jpeg_quality: JPEG_QUALITY,
        }
    }

    fn derive_sync(
        bytes: Vec<u8>,
        input: PathBuf,
        output: PathBuf,
        max_width: u32,
        jpeg_quality: u8,
    ) -> PipelineResult<Vec<u8>> {
        let image = image::load_from_memory(&bytes).map_err(|source| PipelineError::Decode {
            path: input.clone(),
            source,
        })?;

        let format = DerivedFormat::from_path(&input)?;

        let (width, height) = bounded_dimensions(image.width(), image.height(), max_width);
        let resized = if (width, height) == (image.width(), image.height()) {
            image
        } else {
            image.resize_exact(width, height, FilterType::Lanczos3)
        };

        Self::encode(&resized, format, jpeg_quality)
            .map_err(|source| PipelineError::Encode { path: output, source })
    }

    fn encode(
        image: &DynamicImage,
        format: DerivedFormat,
        jpeg_quality: u8,
    ) -> Result<Vec<u8>, ImageError> {
        let mut buf = Vec::new();
        match format {
            DerivedFormat::Png => {
                image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
            }
            DerivedFormat::Jpeg => {
                let rgb = image.to_rgb8();
                let mut encoder = JpegEncoder::new_with_quality(&mut buf, jpeg_quality);
                encoder.encode(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    ExtendedColorType::Rgb8,
                )?;
            }
            DerivedFormat::Gif => {
                DynamicImage::ImageRgba8(image.to_rgba8())
                    .write_to(&mut Cursor::new(&mut buf), ImageFormat::Gif)?;
            }
        }
        Ok(buf)
    }
}

#[async_trait]
impl CompressionService for ImageCompressor {
    async fn compress(&self, input: &Path, output: &Path) -> PipelineResult<()> {
        let bytes = self.storage.read_file(input).await.map_err(|e| {
            tracing::error!("Failed to open image for compression {}: {}", input.display(), e);
            PipelineError::Decode {
                path: input.to_path_buf(),
                source: ImageError::IoError(e),
            }
        })?;

        let encoded = tokio::task::spawn_blocking({
            let input = input.to_path_buf();
            let output = output.to_path_buf();
            let max_width = self.max_width;
            let jpeg_quality = self.jpeg_quality;
            move || Self::derive_sync(bytes, input, output, max_width, jpeg_quality)
        })
        .await
        .map_err(|e| PipelineError::Worker(format!("Image compression task join error: {}", e)))?
        .inspect_err(|e| tracing::error!("Failed to compress {}: {}", input.display(), e))?;

        self.storage
            .write_file(output, &encoded)
            .await
            .map_err(|e| {
                tracing::error!(
                    "Failed to save compressed image {}: {}",
                    output.display(),
                    e
                );
                PipelineError::Encode {
                    path: output.to_path_buf(),
                    source: ImageError::IoError(e),
                }
            })?;

        tracing::info!(
            input_path = %input.display(),
            output_path = %output.display(),
            "Image compressed successfully"
        );
        Ok(())
    }
}
