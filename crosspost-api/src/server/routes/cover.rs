use crate::server::{Result, ServerError, ServerRouter, SharedSession, extract::Json};
use axum::{body::Bytes, extract::State};
use axum_extra::routing::{RouterExt, TypedPath};
use base64::{display::Base64Display, prelude::BASE64_STANDARD};
use crosspost_composer::cover::{
    CoverAsset, CoverFrameExtractor, CoverPhase, FrameSet,
    decoder::{EncodedImage, VideoInfo},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_cover)
        .typed_put(upload_video)
        .typed_post(sample_frames)
        .typed_delete(cancel_sampling)
        .typed_put(select_frame)
        .typed_put(set_custom_cover)
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageView {
    mime_type: &'static str,
    width: u32,
    height: u32,
    data_url: String,
}

impl From<&EncodedImage> for ImageView {
    fn from(value: &EncodedImage) -> Self {
        let mime_type = value.format.mime_type();
        Self {
            mime_type,
            width: value.width,
            height: value.height,
            data_url: format!(
                "data:{mime_type};base64,{}",
                Base64Display::new(&value.bytes, &BASE64_STANDARD)
            ),
        }
    }
}

#[derive(Clone, PartialEq, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum CoverAssetView {
    VideoFrame { offset_seconds: f64, image: ImageView },
    Custom { image: ImageView },
}

impl From<&CoverAsset> for CoverAssetView {
    fn from(value: &CoverAsset) -> Self {
        match value {
            CoverAsset::VideoFrame { offset, image } => CoverAssetView::VideoFrame {
                offset_seconds: offset.as_seconds_f64(),
                image: image.into(),
            },
            CoverAsset::Custom { image } => CoverAssetView::Custom {
                image: image.into(),
            },
        }
    }
}

#[derive(Clone, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FrameView {
    index: usize,
    offset_seconds: f64,
    image: ImageView,
}

#[derive(Clone, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FrameFailureView {
    index: usize,
    offset_seconds: f64,
    error: String,
}

#[derive(Clone, PartialEq, Debug, Serialize)]
struct FramesView {
    frames: Vec<FrameView>,
    failures: Vec<FrameFailureView>,
}

impl From<&FrameSet> for FramesView {
    fn from(value: &FrameSet) -> Self {
        Self {
            frames: value
                .frames
                .iter()
                .map(|frame| FrameView {
                    index: frame.index,
                    offset_seconds: frame.offset.as_seconds_f64(),
                    image: (&frame.image).into(),
                })
                .collect(),
            failures: value
                .failures
                .iter()
                .map(|failure| FrameFailureView {
                    index: failure.index,
                    offset_seconds: failure.offset.as_seconds_f64(),
                    error: failure.error.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Clone, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CoverView {
    phase: CoverPhase,
    video: Option<VideoInfo>,
    active: Option<CoverAssetView>,
    frames: Option<FramesView>,
}

impl From<&CoverFrameExtractor> for CoverView {
    fn from(value: &CoverFrameExtractor) -> Self {
        Self {
            phase: value.phase(),
            video: value.video_info(),
            active: value.active_cover().map(CoverAssetView::from),
            frames: value.frames().map(FramesView::from),
        }
    }
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/cover", rejection(ServerError))]
struct GetCoverPath();

async fn get_cover(
    GetCoverPath(): GetCoverPath,
    State(session): State<SharedSession>,
) -> Result<Json<CoverView>> {
    let session = session.lock().await;

    Ok(Json(CoverView::from(session.cover())))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/cover/video", rejection(ServerError))]
struct UploadVideoPath();

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadVideoResponse {
    cover: CoverView,
    default_cover_error: Option<String>,
}

async fn upload_video(
    UploadVideoPath(): UploadVideoPath,
    State(session): State<SharedSession>,
    body: Bytes,
) -> Result<Json<UploadVideoResponse>> {
    debug!(bytes = body.len(), "Received video upload");
    let mut session = session.lock().await;
    let upload = session.cover_mut().upload_video(body).await?;

    Ok(Json(UploadVideoResponse {
        cover: CoverView::from(session.cover()),
        default_cover_error: upload.default_cover_error.map(|err| err.to_string()),
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/cover/frames", rejection(ServerError))]
struct SampleFramesPath();

/// Samples candidate frames without holding the session lock while decoding.
/// The job is committed from its own task, so a client that disconnects
/// halfway does not leave the extractor stuck in the sampling phase.
async fn sample_frames(
    SampleFramesPath(): SampleFramesPath,
    State(session): State<SharedSession>,
) -> Result<Json<FramesView>> {
    let job = session.lock().await.cover_mut().begin_sampling()?;

    let frames = tokio::spawn(async move {
        let sampled = job.run().await;
        session.lock().await.cover_mut().finish_sampling(sampled)
    })
    .await??;

    Ok(Json(FramesView::from(&frames)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/cover/frames", rejection(ServerError))]
struct CancelSamplingPath();

#[derive(Serialize)]
struct CancelSamplingResponse {
    cancelled: bool,
}

async fn cancel_sampling(
    CancelSamplingPath(): CancelSamplingPath,
    State(session): State<SharedSession>,
) -> Result<Json<CancelSamplingResponse>> {
    let cancelled = session.lock().await.cover_mut().cancel_sampling();

    Ok(Json(CancelSamplingResponse { cancelled }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/cover/frames/{index}", rejection(ServerError))]
struct SelectFramePath {
    index: usize,
}

async fn select_frame(
    SelectFramePath { index }: SelectFramePath,
    State(session): State<SharedSession>,
) -> Result<Json<CoverAssetView>> {
    let cover = session.lock().await.cover_mut().select_frame(index)?;

    Ok(Json(CoverAssetView::from(&cover)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/cover/custom", rejection(ServerError))]
struct SetCustomCoverPath();

async fn set_custom_cover(
    SetCustomCoverPath(): SetCustomCoverPath,
    State(session): State<SharedSession>,
    body: Bytes,
) -> Result<Json<CoverAssetView>> {
    let cover = session.lock().await.cover_mut().set_custom_cover(body)?;

    Ok(Json(CoverAssetView::from(&cover)))
}
