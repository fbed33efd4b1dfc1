//! Video decoding through FFmpeg.
//!
//! The uploaded bytes are spooled to a temporary file because FFmpeg opens
//! inputs by path. Every seek opens its own input, so a frame request never
//! shares decoder state with another one.

use crate::cover::decoder::{
    DecodedVideo, EncodedImage, MediaDecodeError, MediaDecoder, VideoInfo, decode_still,
};
use async_trait::async_trait;
use bytes::Bytes;
use ffmpeg_next as ffmpeg;
use ffmpeg::{
    format::Pixel,
    media::Type,
    software::scaling::{context::Context as Scaler, flag::Flags},
    util::frame::video::Video as Frame,
};
use image::RgbImage;
use std::{fmt::Display, io::Write, path::Path, sync::Arc};
use tempfile::NamedTempFile;
use time::Duration;
use tracing::debug;

fn corrupt(err: ffmpeg::Error) -> MediaDecodeError {
    MediaDecodeError::Corrupt(err.to_string())
}

fn backend(err: impl Display) -> MediaDecodeError {
    MediaDecodeError::Backend(err.to_string())
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct FfmpegDecoder(());

impl FfmpegDecoder {
    /// Initializes FFmpeg. Must succeed before any video is loaded.
    pub fn new() -> Result<Self, MediaDecodeError> {
        ffmpeg::init().map_err(backend)?;
        Ok(Self(()))
    }
}

#[async_trait]
impl MediaDecoder for FfmpegDecoder {
    async fn load_video(&self, bytes: Bytes) -> Result<Arc<dyn DecodedVideo>, MediaDecodeError> {
        let video = tokio::task::spawn_blocking(move || open_video(&bytes))
            .await
            .map_err(backend)??;

        debug!(
            duration = %video.info.duration,
            width = video.info.width,
            height = video.info.height,
            "Opened video"
        );
        Ok(Arc::new(video))
    }

    fn load_image(&self, bytes: Bytes) -> Result<EncodedImage, MediaDecodeError> {
        decode_still(bytes)
    }
}

#[derive(Debug)]
struct FfmpegVideo {
    file: NamedTempFile,
    info: VideoInfo,
}

#[async_trait]
impl DecodedVideo for FfmpegVideo {
    fn info(&self) -> VideoInfo {
        self.info
    }

    async fn frame_at(&self, offset: Duration) -> Result<EncodedImage, MediaDecodeError> {
        let VideoInfo {
            duration,
            width,
            height,
        } = self.info;
        if width == 0 || height == 0 {
            return Err(MediaDecodeError::ZeroDimensions { width, height });
        }
        if offset.is_negative() || offset > duration {
            return Err(MediaDecodeError::OffsetOutOfRange { offset, duration });
        }

        let path = self.file.path().to_path_buf();
        tokio::task::spawn_blocking(move || rasterize(&path, offset))
            .await
            .map_err(backend)?
    }
}

fn open_video(bytes: &[u8]) -> Result<FfmpegVideo, MediaDecodeError> {
    let mut file = NamedTempFile::new().map_err(backend)?;
    file.write_all(bytes).map_err(backend)?;
    file.flush().map_err(backend)?;

    let input = ffmpeg::format::input(file.path()).map_err(corrupt)?;
    let stream = input
        .streams()
        .best(Type::Video)
        .ok_or_else(|| MediaDecodeError::Unsupported("no video stream".to_owned()))?;
    let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
        .map_err(corrupt)?
        .decoder()
        .video()
        .map_err(corrupt)?;

    // Container durations are expressed in AV_TIME_BASE units, i.e. microseconds.
    let duration = Duration::microseconds(input.duration().max(0));

    Ok(FfmpegVideo {
        file,
        info: VideoInfo {
            duration,
            width: decoder.width(),
            height: decoder.height(),
        },
    })
}

fn rasterize(path: &Path, offset: Duration) -> Result<EncodedImage, MediaDecodeError> {
    let mut input = ffmpeg::format::input(path).map_err(corrupt)?;
    let (stream_index, time_base, parameters) = {
        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or_else(|| MediaDecodeError::Unsupported("no video stream".to_owned()))?;
        (stream.index(), stream.time_base(), stream.parameters())
    };

    let mut decoder = ffmpeg::codec::context::Context::from_parameters(parameters)
        .map_err(corrupt)?
        .decoder()
        .video()
        .map_err(corrupt)?;
    let mut scaler = Scaler::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        Pixel::RGB24,
        decoder.width(),
        decoder.height(),
        Flags::BILINEAR,
    )
    .map_err(backend)?;

    let target = i64::try_from(offset.whole_microseconds()).map_err(backend)?;
    input.seek(target, ..=target).map_err(corrupt)?;

    let target_seconds = offset.as_seconds_f64();
    let seconds_of = |frame: &Frame| {
        #[allow(clippy::cast_precision_loss)]
        frame
            .timestamp()
            .or_else(|| frame.pts())
            .map(|pts| pts as f64 * f64::from(time_base))
    };

    // The last frame before the target stands in when the target is the very
    // end of the stream.
    let mut decoded = Frame::empty();
    let mut previous = Frame::empty();
    let mut have_previous = false;

    for (stream, packet) in input.packets() {
        if stream.index() != stream_index || decoder.send_packet(&packet).is_err() {
            continue;
        }
        while decoder.receive_frame(&mut decoded).is_ok() {
            if seconds_of(&decoded).is_none_or(|seconds| seconds >= target_seconds) {
                return to_png(&mut scaler, &decoded);
            }
            std::mem::swap(&mut decoded, &mut previous);
            have_previous = true;
        }
    }

    if decoder.send_eof().is_ok() {
        while decoder.receive_frame(&mut decoded).is_ok() {
            if seconds_of(&decoded).is_none_or(|seconds| seconds >= target_seconds) {
                return to_png(&mut scaler, &decoded);
            }
            std::mem::swap(&mut decoded, &mut previous);
            have_previous = true;
        }
    }

    if have_previous {
        return to_png(&mut scaler, &previous);
    }
    Err(MediaDecodeError::NoFrame(offset))
}

fn to_png(scaler: &mut Scaler, frame: &Frame) -> Result<EncodedImage, MediaDecodeError> {
    let mut rgb = Frame::empty();
    scaler.run(frame, &mut rgb).map_err(backend)?;

    let (width, height) = (rgb.width(), rgb.height());
    let stride = rgb.stride(0);
    let row_bytes = width as usize * 3;
    let data = rgb.data(0);

    // Copy only the visible pixels of each row, not the stride padding.
    let pixels: Vec<u8> = (0..height as usize)
        .flat_map(|row| &data[row * stride..row * stride + row_bytes])
        .copied()
        .collect();

    let image = RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| MediaDecodeError::Backend("frame buffer size mismatch".to_owned()))?;
    EncodedImage::png_from_rgb(&image)
}
