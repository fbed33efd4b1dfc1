//! Media decoding capabilities the cover workflow depends on.

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
use serde::Serialize;
use std::{fmt::Debug, io::Cursor, sync::Arc};
use thiserror::Error;
use time::Duration;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum MediaDecodeError {
    #[error("Unsupported media: {0}")]
    Unsupported(String),
    #[error("Media could not be decoded: {0}")]
    Corrupt(String),
    #[error("Media has no visible area ({width}x{height})")]
    ZeroDimensions { width: u32, height: u32 },
    #[error("Offset {offset} lies outside the video ({duration})")]
    OffsetOutOfRange { offset: Duration, duration: Duration },
    #[error("No frame could be decoded at {0}")]
    NoFrame(Duration),
    #[error("Decoder failure: {0}")]
    Backend(String),
}

impl From<image::ImageError> for MediaDecodeError {
    fn from(value: image::ImageError) -> Self {
        match value {
            image::ImageError::Unsupported(err) => Self::Unsupported(err.to_string()),
            image::ImageError::Decoding(err) => Self::Corrupt(err.to_string()),
            other => Self::Backend(other.to_string()),
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StillFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl StillFormat {
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            StillFormat::Png => "image/png",
            StillFormat::Jpeg => "image/jpeg",
            StillFormat::Gif => "image/gif",
            StillFormat::Webp => "image/webp",
        }
    }
}

impl TryFrom<ImageFormat> for StillFormat {
    type Error = MediaDecodeError;

    fn try_from(value: ImageFormat) -> Result<Self, Self::Error> {
        match value {
            ImageFormat::Png => Ok(StillFormat::Png),
            ImageFormat::Jpeg => Ok(StillFormat::Jpeg),
            ImageFormat::Gif => Ok(StillFormat::Gif),
            ImageFormat::WebP => Ok(StillFormat::Webp),
            other => Err(MediaDecodeError::Unsupported(format!(
                "{other:?} is not accepted as a cover image"
            ))),
        }
    }
}

/// A still image in an encoded container format.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct EncodedImage {
    pub format: StillFormat,
    pub width: u32,
    pub height: u32,
    pub bytes: Bytes,
}

impl EncodedImage {
    /// Encodes raw RGB pixels as PNG.
    pub fn png_from_rgb(pixels: &RgbImage) -> Result<Self, MediaDecodeError> {
        let (width, height) = pixels.dimensions();
        if width == 0 || height == 0 {
            return Err(MediaDecodeError::ZeroDimensions { width, height });
        }

        let mut buffer = Cursor::new(Vec::new());
        pixels.write_to(&mut buffer, ImageFormat::Png)?;

        Ok(Self {
            format: StillFormat::Png,
            width,
            height,
            bytes: Bytes::from(buffer.into_inner()),
        })
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct VideoInfo {
    #[serde(rename = "durationSeconds", serialize_with = "serialize_seconds")]
    pub duration: Duration,
    pub width: u32,
    pub height: u32,
}

fn serialize_seconds<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_seconds_f64())
}

/// An opened video. Dropping it releases the underlying decode handle.
#[async_trait]
pub trait DecodedVideo: Send + Sync + Debug {
    fn info(&self) -> VideoInfo;

    /// Seeks to `offset` and rasterizes the frame shown there.
    async fn frame_at(&self, offset: Duration) -> Result<EncodedImage, MediaDecodeError>;
}

#[async_trait]
pub trait MediaDecoder: Send + Sync {
    async fn load_video(&self, bytes: Bytes) -> Result<Arc<dyn DecodedVideo>, MediaDecodeError>;

    fn load_image(&self, bytes: Bytes) -> Result<EncodedImage, MediaDecodeError>;
}

/// Decodes still images with the `image` crate. Videos are not supported.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct StillImageDecoder;

#[async_trait]
impl MediaDecoder for StillImageDecoder {
    async fn load_video(&self, _bytes: Bytes) -> Result<Arc<dyn DecodedVideo>, MediaDecodeError> {
        Err(MediaDecodeError::Unsupported(
            "video decoding is not available in this build".to_owned(),
        ))
    }

    fn load_image(&self, bytes: Bytes) -> Result<EncodedImage, MediaDecodeError> {
        decode_still(bytes)
    }
}

/// Fully decodes `bytes` to validate them and keeps the original encoding.
pub fn decode_still(bytes: Bytes) -> Result<EncodedImage, MediaDecodeError> {
    let image_format = image::guess_format(&bytes)?;
    let format = StillFormat::try_from(image_format)?;
    let decoded: DynamicImage = image::load_from_memory_with_format(&bytes, image_format)?;

    let (width, height) = decoded.dimensions();
    if width == 0 || height == 0 {
        return Err(MediaDecodeError::ZeroDimensions { width, height });
    }

    Ok(EncodedImage {
        format,
        width,
        height,
        bytes,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::cover::decoder::{
        EncodedImage, MediaDecodeError, MediaDecoder, StillFormat, StillImageDecoder,
    };
    use bytes::Bytes;
    use image::{Rgb, RgbImage};

    pub(crate) fn png(width: u32, height: u32) -> Bytes {
        let pixels = RgbImage::from_pixel(width, height, Rgb([200, 40, 90]));
        EncodedImage::png_from_rgb(&pixels).unwrap().bytes
    }

    #[test]
    fn decodes_png_dimensions() {
        let image = StillImageDecoder.load_image(png(4, 3)).unwrap();

        assert_eq!(image.format, StillFormat::Png);
        assert_eq!((image.width, image.height), (4, 3));
        assert_eq!(image.format.mime_type(), "image/png");
    }

    #[test]
    fn rejects_garbage() {
        assert!(
            StillImageDecoder
                .load_image(Bytes::from_static(b"definitely not an image"))
                .is_err()
        );
    }

    #[test]
    fn truncated_png_is_corrupt() {
        let bytes = png(16, 16);
        let truncated = bytes.slice(..bytes.len() / 2);

        assert!(StillImageDecoder.load_image(truncated).is_err());
    }

    #[test]
    fn empty_frame_cannot_be_encoded() {
        assert_eq!(
            EncodedImage::png_from_rgb(&RgbImage::new(0, 10)),
            Err(MediaDecodeError::ZeroDimensions {
                width: 0,
                height: 10
            })
        );
    }

    #[tokio::test]
    async fn videos_are_unsupported_without_a_video_backend() {
        let result = StillImageDecoder.load_video(png(2, 2)).await;
        assert!(matches!(result, Err(MediaDecodeError::Unsupported(_))));
    }
}
