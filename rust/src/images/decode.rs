use std::io::Cursor;
use std::time::Duration;

use image::{AnimationDecoder, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};

use super::FetchError;

/// Typed metadata attached to a decoded asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum AssetExtra {
    MimeType(String),
    Duration(Duration),
    FrameCount(u32),
    PixelSize { width: u32, height: u32 },
    ByteLength(u64),
}

/// A ready-to-draw emoji image. Animated GIFs keep their first frame as the
/// preview.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub preview: RgbaImage,
    pub extras: Vec<AssetExtra>,
}

impl DecodedImage {
    pub fn mime_type(&self) -> Option<&str> {
        self.extras.iter().find_map(|extra| match extra {
            AssetExtra::MimeType(mime) => Some(mime.as_str()),
            _ => None,
        })
    }

    /// Size of the source image before any downscaling.
    pub fn pixel_size(&self) -> (u32, u32) {
        self.extras
            .iter()
            .find_map(|extra| match extra {
                AssetExtra::PixelSize { width, height } => Some((*width, *height)),
                _ => None,
            })
            .unwrap_or_else(|| self.preview.dimensions())
    }

    pub fn frame_count(&self) -> u32 {
        self.extras
            .iter()
            .find_map(|extra| match extra {
                AssetExtra::FrameCount(count) => Some(*count),
                _ => None,
            })
            .unwrap_or(1)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.extras.iter().find_map(|extra| match extra {
            AssetExtra::Duration(d) => Some(*d),
            _ => None,
        })
    }

    pub fn is_animated(&self) -> bool {
        self.frame_count() > 1
    }
}

/// Decode `bytes`, shrinking the preview so its longest side is at most
/// `max_dimension`.
pub fn decode(bytes: &[u8], max_dimension: u32) -> Result<DecodedImage, FetchError> {
    let format = image::guess_format(bytes).map_err(decode_error)?;
    let mut extras = vec![
        AssetExtra::MimeType(format.to_mime_type().to_string()),
        AssetExtra::ByteLength(bytes.len() as u64),
    ];

    let preview = if format == ImageFormat::Gif {
        let (first, frame_count, duration) = decode_gif(bytes)?;
        extras.push(AssetExtra::FrameCount(frame_count));
        if frame_count > 1 {
            extras.push(AssetExtra::Duration(duration));
        }
        first
    } else {
        image::load_from_memory_with_format(bytes, format)
            .map_err(decode_error)?
            .to_rgba8()
    };

    let (width, height) = preview.dimensions();
    extras.push(AssetExtra::PixelSize { width, height });

    let preview = if width > max_dimension || height > max_dimension {
        image::DynamicImage::ImageRgba8(preview)
            .resize(
                max_dimension,
                max_dimension,
                image::imageops::FilterType::Lanczos3,
            )
            .to_rgba8()
    } else {
        preview
    };

    Ok(DecodedImage { preview, extras })
}

fn decode_gif(bytes: &[u8]) -> Result<(RgbaImage, u32, Duration), FetchError> {
    let decoder =
        image::codecs::gif::GifDecoder::new(Cursor::new(bytes)).map_err(decode_error)?;
    let mut first = None;
    let mut count = 0u32;
    let mut total = Duration::ZERO;
    for frame in decoder.into_frames() {
        let frame = frame.map_err(decode_error)?;
        count += 1;
        total += Duration::from(frame.delay());
        if first.is_none() {
            first = Some(frame.into_buffer());
        }
    }
    let first = first.ok_or_else(|| FetchError::Decode("gif has no frames".to_string()))?;
    Ok((first, count, total))
}

fn decode_error(e: image::ImageError) -> FetchError {
    FetchError::Decode(e.to_string())
}
