//! Cover image selection for video posts.
//!
//! [`CoverFrameExtractor`] is an explicit state machine over one uploaded
//! video. Frame sampling is split into [`CoverFrameExtractor::begin_sampling`],
//! [`SamplingJob::run`] and [`CoverFrameExtractor::finish_sampling`] so the
//! slow part can run without holding on to the extractor. Every request that
//! supersedes a running job bumps a generation counter, and results from an
//! older generation are discarded instead of committed.

pub mod decoder;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

use crate::cover::decoder::{DecodedVideo, EncodedImage, MediaDecodeError, MediaDecoder, VideoInfo};
use bytes::Bytes;
use crosspost_common::util::PositiveDuration;
use serde::Serialize;
use std::{iter, mem, sync::Arc};
use thiserror::Error;
use time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How candidate cover frames are picked from a video.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct SamplingSettings {
    /// Upper bound on the number of sampled frames.
    pub frame_count: usize,
    pub interval: PositiveDuration,
    /// Where the cover is taken from right after upload.
    pub default_offset: Duration,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            frame_count: 10,
            interval: PositiveDuration::new_unchecked(Duration::milliseconds(500)),
            default_offset: Duration::milliseconds(100),
        }
    }
}

impl SamplingSettings {
    /// Offsets `0, interval, 2 * interval, ...`, at most `frame_count` of them
    /// and none past `duration`.
    #[must_use]
    pub fn offsets(&self, duration: Duration) -> Vec<Duration> {
        let interval = self.interval.get();
        iter::successors(Some(Duration::ZERO), |offset| offset.checked_add(interval))
            .take(self.frame_count)
            .take_while(|offset| *offset <= duration)
            .collect()
    }

    #[must_use]
    pub fn default_offset_for(&self, duration: Duration) -> Duration {
        self.default_offset.min(duration).max(Duration::ZERO)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CoverPhase {
    NoVideo,
    VideoLoaded,
    SamplingFrames,
    FramesReady,
    CustomCoverPending,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct VideoFrame {
    /// Position of the frame's offset in the sampling sequence.
    pub index: usize,
    pub offset: Duration,
    pub image: EncodedImage,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct FrameFailure {
    pub index: usize,
    pub offset: Duration,
    pub error: MediaDecodeError,
}

/// The frames sampled from one video, together with the offsets that could
/// not be decoded.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct FrameSet {
    pub frames: Vec<VideoFrame>,
    pub failures: Vec<FrameFailure>,
}

impl FrameSet {
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&VideoFrame> {
        self.frames.iter().find(|frame| frame.index == index)
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum CoverAsset {
    VideoFrame { offset: Duration, image: EncodedImage },
    Custom { image: EncodedImage },
}

impl CoverAsset {
    #[must_use]
    pub fn image(&self) -> &EncodedImage {
        match self {
            CoverAsset::VideoFrame { image, .. } | CoverAsset::Custom { image } => image,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum CoverError {
    #[error("No video has been uploaded")]
    NoVideo,
    #[error("Frames are already being sampled")]
    SamplingInProgress,
    #[error("A custom cover is being chosen")]
    CustomCoverPending,
    #[error("No custom cover is being chosen")]
    NoCustomCoverPending,
    #[error("No frames have been sampled")]
    NoFrames,
    #[error("There is no sampled frame with index {0}")]
    FrameNotFound(usize),
    #[error("Frame sampling was cancelled")]
    SamplingCancelled,
    #[error("The sampled frames belong to a superseded request")]
    StaleSampling,
    #[error(transparent)]
    Decode(#[from] MediaDecodeError),
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct VideoUpload {
    pub info: VideoInfo,
    /// Set when the default cover frame could not be decoded. The video stays
    /// loaded, but there is no active cover.
    pub default_cover_error: Option<MediaDecodeError>,
}

#[derive(Debug)]
enum CoverState {
    NoVideo,
    VideoLoaded(Arc<dyn DecodedVideo>),
    SamplingFrames {
        video: Arc<dyn DecodedVideo>,
        cancel: CancellationToken,
    },
    FramesReady {
        video: Arc<dyn DecodedVideo>,
        frames: FrameSet,
    },
    /// Never wraps `SamplingFrames` or another pending state.
    CustomCoverPending { resume: Box<CoverState> },
}

impl CoverState {
    fn phase(&self) -> CoverPhase {
        match self {
            CoverState::NoVideo => CoverPhase::NoVideo,
            CoverState::VideoLoaded(_) => CoverPhase::VideoLoaded,
            CoverState::SamplingFrames { .. } => CoverPhase::SamplingFrames,
            CoverState::FramesReady { .. } => CoverPhase::FramesReady,
            CoverState::CustomCoverPending { .. } => CoverPhase::CustomCoverPending,
        }
    }

    fn video(&self) -> Option<&Arc<dyn DecodedVideo>> {
        match self {
            CoverState::NoVideo => None,
            CoverState::VideoLoaded(video)
            | CoverState::SamplingFrames { video, .. }
            | CoverState::FramesReady { video, .. } => Some(video),
            CoverState::CustomCoverPending { resume } => resume.video(),
        }
    }
}

/// A detached frame sampling run. Produced by
/// [`CoverFrameExtractor::begin_sampling`], its result must be handed back to
/// [`CoverFrameExtractor::finish_sampling`].
#[derive(Debug)]
#[must_use]
pub struct SamplingJob {
    generation: u64,
    video: Arc<dyn DecodedVideo>,
    offsets: Vec<Duration>,
    cancel: CancellationToken,
}

impl SamplingJob {
    /// Seeks to each offset in turn. Stops as soon as the job is cancelled.
    pub async fn run(self) -> SampledFrames {
        let mut set = FrameSet::default();

        for (index, offset) in self.offsets.iter().copied().enumerate() {
            match self
                .cancel
                .run_until_cancelled(self.video.frame_at(offset))
                .await
            {
                None => {
                    debug!(generation = self.generation, %offset, "Frame sampling cancelled");
                    return SampledFrames {
                        generation: self.generation,
                        frames: None,
                    };
                }
                Some(Ok(image)) => set.frames.push(VideoFrame {
                    index,
                    offset,
                    image,
                }),
                Some(Err(error)) => {
                    warn!(%offset, error = %error, "Sampling a cover frame failed");
                    set.failures.push(FrameFailure {
                        index,
                        offset,
                        error,
                    });
                }
            }
        }

        SampledFrames {
            generation: self.generation,
            frames: Some(set),
        }
    }
}

#[derive(Debug)]
#[must_use]
pub struct SampledFrames {
    generation: u64,
    frames: Option<FrameSet>,
}

/// Owns the cover state of the post being composed.
pub struct CoverFrameExtractor {
    decoder: Arc<dyn MediaDecoder>,
    settings: SamplingSettings,
    state: CoverState,
    active: Option<CoverAsset>,
    generation: u64,
}

impl std::fmt::Debug for CoverFrameExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoverFrameExtractor")
            .field("settings", &self.settings)
            .field("state", &self.state)
            .field("active", &self.active)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl CoverFrameExtractor {
    pub fn new(decoder: Arc<dyn MediaDecoder>, settings: SamplingSettings) -> Self {
        Self {
            decoder,
            settings,
            state: CoverState::NoVideo,
            active: None,
            generation: 0,
        }
    }

    #[must_use]
    pub fn phase(&self) -> CoverPhase {
        self.state.phase()
    }

    #[must_use]
    pub fn active_cover(&self) -> Option<&CoverAsset> {
        self.active.as_ref()
    }

    /// The sampled frames, only while they can be picked from.
    #[must_use]
    pub fn frames(&self) -> Option<&FrameSet> {
        match &self.state {
            CoverState::FramesReady { frames, .. } => Some(frames),
            _ => None,
        }
    }

    #[must_use]
    pub fn video_info(&self) -> Option<VideoInfo> {
        self.state.video().map(|video| video.info())
    }

    #[must_use]
    pub fn settings(&self) -> &SamplingSettings {
        &self.settings
    }

    /// Replaces the current video, whatever the phase. Any running sampling
    /// job is cancelled, sampled frames and the active cover are discarded,
    /// and the default cover is derived from the new video.
    ///
    /// If the bytes cannot be loaded as a video, nothing changes.
    pub async fn upload_video(&mut self, bytes: Bytes) -> Result<VideoUpload, CoverError> {
        let video = self.decoder.load_video(bytes).await?;
        let info = video.info();

        self.supersede();
        self.state = CoverState::VideoLoaded(Arc::clone(&video));
        self.active = None;

        let offset = self.settings.default_offset_for(info.duration);
        let default_cover_error = match video.frame_at(offset).await {
            Ok(image) => {
                self.active = Some(CoverAsset::VideoFrame { offset, image });
                None
            }
            Err(err) => {
                warn!(%offset, error = %err, "Deriving the default cover failed");
                Some(err)
            }
        };

        info!(
            duration = %info.duration,
            width = info.width,
            height = info.height,
            "Loaded video"
        );
        Ok(VideoUpload {
            info,
            default_cover_error,
        })
    }

    /// Starts a fresh sampling run. The previous frame set, if any, is
    /// discarded.
    pub fn begin_sampling(&mut self) -> Result<SamplingJob, CoverError> {
        let video = match &self.state {
            CoverState::NoVideo => return Err(CoverError::NoVideo),
            CoverState::SamplingFrames { .. } => return Err(CoverError::SamplingInProgress),
            CoverState::CustomCoverPending { .. } => return Err(CoverError::CustomCoverPending),
            CoverState::VideoLoaded(video) | CoverState::FramesReady { video, .. } => {
                Arc::clone(video)
            }
        };

        self.generation += 1;
        let cancel = CancellationToken::new();
        let offsets = self.settings.offsets(video.info().duration);
        debug!(generation = self.generation, frames = offsets.len(), "Sampling cover frames");

        self.state = CoverState::SamplingFrames {
            video: Arc::clone(&video),
            cancel: cancel.clone(),
        };
        Ok(SamplingJob {
            generation: self.generation,
            video,
            offsets,
            cancel,
        })
    }

    /// Commits the result of a sampling job started by the current
    /// generation.
    pub fn finish_sampling(&mut self, sampled: SampledFrames) -> Result<FrameSet, CoverError> {
        let Some(frames) = sampled.frames else {
            return Err(CoverError::SamplingCancelled);
        };
        if sampled.generation != self.generation {
            debug!(
                generation = sampled.generation,
                current = self.generation,
                "Discarding superseded frames"
            );
            return Err(CoverError::StaleSampling);
        }
        let CoverState::SamplingFrames { video, .. } = &self.state else {
            return Err(CoverError::StaleSampling);
        };

        info!(
            frames = frames.frames.len(),
            failures = frames.failures.len(),
            "Sampled cover frames"
        );
        self.state = CoverState::FramesReady {
            video: Arc::clone(video),
            frames: frames.clone(),
        };
        Ok(frames)
    }

    /// Samples frames and waits for the result.
    pub async fn sample_frames(&mut self) -> Result<FrameSet, CoverError> {
        let sampled = self.begin_sampling()?.run().await;
        self.finish_sampling(sampled)
    }

    /// Stops a running sampling job and returns to the loaded video. Returns
    /// whether anything was running.
    pub fn cancel_sampling(&mut self) -> bool {
        let CoverState::SamplingFrames { video, cancel } = &self.state else {
            return false;
        };

        cancel.cancel();
        self.state = CoverState::VideoLoaded(Arc::clone(video));
        self.generation += 1;
        debug!(generation = self.generation, "Cancelled frame sampling");
        true
    }

    pub fn select_frame(&mut self, index: usize) -> Result<CoverAsset, CoverError> {
        let frame = match &self.state {
            CoverState::FramesReady { frames, .. } => {
                frames.get(index).ok_or(CoverError::FrameNotFound(index))?
            }
            CoverState::NoVideo => return Err(CoverError::NoVideo),
            CoverState::VideoLoaded(_) => return Err(CoverError::NoFrames),
            CoverState::SamplingFrames { .. } => return Err(CoverError::SamplingInProgress),
            CoverState::CustomCoverPending { .. } => return Err(CoverError::CustomCoverPending),
        };

        let asset = CoverAsset::VideoFrame {
            offset: frame.offset,
            image: frame.image.clone(),
        };
        self.active = Some(asset.clone());
        Ok(asset)
    }

    pub fn begin_custom_cover(&mut self) -> Result<(), CoverError> {
        match self.state {
            CoverState::SamplingFrames { .. } => Err(CoverError::SamplingInProgress),
            CoverState::CustomCoverPending { .. } => Ok(()),
            _ => {
                let resume = mem::replace(&mut self.state, CoverState::NoVideo);
                self.state = CoverState::CustomCoverPending {
                    resume: Box::new(resume),
                };
                Ok(())
            }
        }
    }

    /// Makes the image the active cover and leaves the pending state. Sampled
    /// frames are discarded, so the next sampling request starts over.
    ///
    /// If the image cannot be decoded the custom cover stays pending.
    pub fn supply_custom_cover(&mut self, bytes: Bytes) -> Result<CoverAsset, CoverError> {
        if !matches!(self.state, CoverState::CustomCoverPending { .. }) {
            return Err(CoverError::NoCustomCoverPending);
        }
        let image = self.decoder.load_image(bytes)?;

        let resume = match mem::replace(&mut self.state, CoverState::NoVideo) {
            CoverState::CustomCoverPending { resume } => *resume,
            other => other,
        };
        self.state = match resume {
            CoverState::FramesReady { video, .. } => CoverState::VideoLoaded(video),
            other => other,
        };

        debug!(format = ?image.format, width = image.width, height = image.height, "Set custom cover");
        let asset = CoverAsset::Custom { image };
        self.active = Some(asset.clone());
        Ok(asset)
    }

    /// Abandons a pending custom cover. Returns whether one was pending.
    pub fn cancel_custom_cover(&mut self) -> bool {
        match mem::replace(&mut self.state, CoverState::NoVideo) {
            CoverState::CustomCoverPending { resume } => {
                self.state = *resume;
                true
            }
            other => {
                self.state = other;
                false
            }
        }
    }

    /// [`Self::begin_custom_cover`] followed by [`Self::supply_custom_cover`].
    /// A failed decode leaves the phase as it was.
    pub fn set_custom_cover(&mut self, bytes: Bytes) -> Result<CoverAsset, CoverError> {
        let was_pending = matches!(self.state, CoverState::CustomCoverPending { .. });
        self.begin_custom_cover()?;

        let result = self.supply_custom_cover(bytes);
        if result.is_err() && !was_pending {
            self.cancel_custom_cover();
        }
        result
    }

    /// Drops the video and the active cover.
    pub fn clear(&mut self) {
        self.supersede();
        self.state = CoverState::NoVideo;
        self.active = None;
    }

    /// Cancels running work and invalidates every outstanding job.
    fn supersede(&mut self) {
        if let CoverState::SamplingFrames { cancel, .. } = &self.state {
            cancel.cancel();
        }
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use crate::cover::{
        CoverAsset, CoverError, CoverFrameExtractor, CoverPhase, SamplingSettings,
        decoder::{
            DecodedVideo, EncodedImage, MediaDecodeError, MediaDecoder, StillFormat, VideoInfo,
            decode_still, tests::png,
        },
    };
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };
    use time::Duration;

    #[derive(Debug, Default)]
    struct MockDecoder {
        duration: Duration,
        width: u32,
        failing: Vec<Duration>,
        hang_at: Option<Duration>,
        seeks: Arc<AtomicUsize>,
    }

    impl MockDecoder {
        fn with_duration(millis: i64) -> Self {
            Self {
                duration: Duration::milliseconds(millis),
                width: 16,
                ..Self::default()
            }
        }
    }

    #[derive(Debug)]
    struct MockVideo {
        info: VideoInfo,
        failing: Vec<Duration>,
        hang_at: Option<Duration>,
        seeks: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DecodedVideo for MockVideo {
        fn info(&self) -> VideoInfo {
            self.info
        }

        async fn frame_at(&self, offset: Duration) -> Result<EncodedImage, MediaDecodeError> {
            self.seeks.fetch_add(1, Ordering::SeqCst);
            if self.hang_at == Some(offset) {
                std::future::pending::<()>().await;
            }
            if self.info.width == 0 {
                return Err(MediaDecodeError::ZeroDimensions {
                    width: 0,
                    height: self.info.height,
                });
            }
            if self.failing.contains(&offset) {
                return Err(MediaDecodeError::NoFrame(offset));
            }

            Ok(EncodedImage {
                format: StillFormat::Png,
                width: self.info.width,
                height: self.info.height,
                bytes: Bytes::from(offset.whole_milliseconds().to_string()),
            })
        }
    }

    #[async_trait]
    impl MediaDecoder for MockDecoder {
        async fn load_video(
            &self,
            bytes: Bytes,
        ) -> Result<Arc<dyn DecodedVideo>, MediaDecodeError> {
            if bytes.as_ref() == b"corrupt" {
                return Err(MediaDecodeError::Corrupt("bad header".to_owned()));
            }

            Ok(Arc::new(MockVideo {
                info: VideoInfo {
                    duration: self.duration,
                    width: self.width,
                    height: 9,
                },
                failing: self.failing.clone(),
                hang_at: self.hang_at,
                seeks: Arc::clone(&self.seeks),
            }))
        }

        fn load_image(&self, bytes: Bytes) -> Result<EncodedImage, MediaDecodeError> {
            decode_still(bytes)
        }
    }

    fn extractor(decoder: MockDecoder) -> CoverFrameExtractor {
        CoverFrameExtractor::new(Arc::new(decoder), SamplingSettings::default())
    }

    fn video() -> Bytes {
        Bytes::from_static(b"video")
    }

    fn seconds(millis: i64) -> Duration {
        Duration::milliseconds(millis)
    }

    #[test]
    fn offsets_are_bounded_by_duration() {
        let settings = SamplingSettings::default();

        let offsets = settings.offsets(seconds(3000));
        assert_eq!(offsets.len(), 7);
        assert_eq!(offsets.first(), Some(&Duration::ZERO));
        assert_eq!(offsets.last(), Some(&seconds(3000)));

        assert_eq!(settings.offsets(seconds(60_000)).len(), 10);
        assert_eq!(settings.offsets(Duration::ZERO), [Duration::ZERO]);
    }

    #[test]
    fn default_offset_is_clamped() {
        let settings = SamplingSettings::default();

        assert_eq!(settings.default_offset_for(seconds(3000)), seconds(100));
        assert_eq!(settings.default_offset_for(seconds(40)), seconds(40));
    }

    #[tokio::test]
    async fn upload_derives_default_cover() {
        let mut cover = extractor(MockDecoder::with_duration(3000));
        assert_eq!(cover.phase(), CoverPhase::NoVideo);

        let upload = cover.upload_video(video()).await.unwrap();

        assert_eq!(upload.info.duration, seconds(3000));
        assert_eq!(upload.default_cover_error, None);
        assert_eq!(cover.phase(), CoverPhase::VideoLoaded);
        assert!(matches!(
            cover.active_cover(),
            Some(CoverAsset::VideoFrame { offset, .. }) if *offset == seconds(100)
        ));
    }

    #[tokio::test]
    async fn failed_default_frame_leaves_no_cover() {
        let mut cover = extractor(MockDecoder {
            width: 0,
            ..MockDecoder::with_duration(3000)
        });

        let upload = cover.upload_video(video()).await.unwrap();

        assert!(matches!(
            upload.default_cover_error,
            Some(MediaDecodeError::ZeroDimensions { .. })
        ));
        assert_eq!(cover.phase(), CoverPhase::VideoLoaded);
        assert_eq!(cover.active_cover(), None);
    }

    #[tokio::test]
    async fn corrupt_upload_changes_nothing() {
        let mut cover = extractor(MockDecoder::with_duration(3000));

        assert!(matches!(
            cover.upload_video(Bytes::from_static(b"corrupt")).await,
            Err(CoverError::Decode(MediaDecodeError::Corrupt(_)))
        ));
        assert_eq!(cover.phase(), CoverPhase::NoVideo);
        assert_eq!(cover.video_info(), None);
    }

    #[tokio::test]
    async fn sampling_a_short_video_yields_fewer_frames() {
        let decoder = MockDecoder::with_duration(3000);
        let seeks = Arc::clone(&decoder.seeks);
        let mut cover = extractor(decoder);
        cover.upload_video(video()).await.unwrap();

        let frames = cover.sample_frames().await.unwrap();

        assert_eq!(frames.frames.len(), 7);
        assert!(frames.failures.is_empty());
        assert_eq!(cover.phase(), CoverPhase::FramesReady);
        assert_eq!(cover.frames(), Some(&frames));
        // One seek for the default cover, seven for sampling.
        assert_eq!(seeks.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn failed_offsets_are_reported() {
        let mut cover = extractor(MockDecoder {
            failing: vec![seconds(1000), seconds(2000)],
            ..MockDecoder::with_duration(3000)
        });
        cover.upload_video(video()).await.unwrap();

        let frames = cover.sample_frames().await.unwrap();

        assert_eq!(frames.frames.len(), 5);
        let failed: Vec<_> = frames
            .failures
            .iter()
            .map(|failure| (failure.index, failure.offset))
            .collect();
        assert_eq!(failed, [(2, seconds(1000)), (4, seconds(2000))]);
        assert!(frames.get(2).is_none());
        assert_eq!(frames.get(3).unwrap().offset, seconds(1500));
    }

    #[tokio::test]
    async fn overlapping_sampling_is_rejected() {
        let mut cover = extractor(MockDecoder::with_duration(3000));
        assert_eq!(cover.begin_sampling().unwrap_err(), CoverError::NoVideo);
        cover.upload_video(video()).await.unwrap();

        let job = cover.begin_sampling().unwrap();
        assert_eq!(cover.phase(), CoverPhase::SamplingFrames);
        assert_eq!(
            cover.begin_sampling().unwrap_err(),
            CoverError::SamplingInProgress
        );
        assert_eq!(
            cover.begin_custom_cover(),
            Err(CoverError::SamplingInProgress)
        );

        let sampled = job.run().await;
        assert_eq!(cover.finish_sampling(sampled).unwrap().frames.len(), 7);
        assert_eq!(cover.phase(), CoverPhase::FramesReady);
    }

    #[tokio::test]
    async fn sampling_can_be_cancelled_midway() {
        let mut cover = extractor(MockDecoder {
            hang_at: Some(seconds(1000)),
            ..MockDecoder::with_duration(3000)
        });
        cover.upload_video(video()).await.unwrap();

        let job = cover.begin_sampling().unwrap();
        let running = tokio::spawn(job.run());
        tokio::task::yield_now().await;

        assert!(cover.cancel_sampling());
        assert!(!cover.cancel_sampling());
        assert_eq!(cover.phase(), CoverPhase::VideoLoaded);

        let sampled = running.await.unwrap();
        assert_eq!(
            cover.finish_sampling(sampled),
            Err(CoverError::SamplingCancelled)
        );
        assert_eq!(cover.phase(), CoverPhase::VideoLoaded);
        assert_eq!(cover.frames(), None);
    }

    #[tokio::test]
    async fn superseded_results_are_discarded() {
        let mut cover = extractor(MockDecoder::with_duration(3000));
        cover.upload_video(video()).await.unwrap();

        let sampled = cover.begin_sampling().unwrap().run().await;
        cover.cancel_sampling();
        assert_eq!(cover.finish_sampling(sampled), Err(CoverError::StaleSampling));

        let first = cover.begin_sampling().unwrap().run().await;
        cover.upload_video(video()).await.unwrap();
        assert_eq!(cover.finish_sampling(first), Err(CoverError::StaleSampling));
        assert_eq!(cover.phase(), CoverPhase::VideoLoaded);
    }

    #[tokio::test]
    async fn custom_cover_replaces_selected_frame_and_discards_frames() {
        let decoder = MockDecoder::with_duration(3000);
        let seeks = Arc::clone(&decoder.seeks);
        let mut cover = extractor(decoder);
        cover.upload_video(video()).await.unwrap();
        cover.sample_frames().await.unwrap();

        let selected = cover.select_frame(2).unwrap();
        assert!(matches!(selected, CoverAsset::VideoFrame { offset, .. } if offset == seconds(1000)));
        assert_eq!(cover.active_cover(), Some(&selected));

        let custom = cover.set_custom_cover(png(4, 4)).unwrap();
        assert!(matches!(custom, CoverAsset::Custom { .. }));
        assert_eq!(cover.active_cover(), Some(&custom));
        assert_eq!(cover.frames(), None);
        assert_eq!(cover.phase(), CoverPhase::VideoLoaded);
        assert_eq!(cover.select_frame(2), Err(CoverError::NoFrames));

        let before = seeks.load(Ordering::SeqCst);
        cover.sample_frames().await.unwrap();
        assert_eq!(seeks.load(Ordering::SeqCst), before + 7);
    }

    #[tokio::test]
    async fn pending_custom_cover_can_be_cancelled() {
        let mut cover = extractor(MockDecoder::with_duration(3000));
        cover.upload_video(video()).await.unwrap();
        cover.sample_frames().await.unwrap();

        cover.begin_custom_cover().unwrap();
        assert_eq!(cover.phase(), CoverPhase::CustomCoverPending);
        assert_eq!(cover.begin_sampling().unwrap_err(), CoverError::CustomCoverPending);
        assert_eq!(cover.video_info().unwrap().duration, seconds(3000));

        assert!(matches!(
            cover.supply_custom_cover(Bytes::from_static(b"not an image")),
            Err(CoverError::Decode(_))
        ));
        assert_eq!(cover.phase(), CoverPhase::CustomCoverPending);

        assert!(cover.cancel_custom_cover());
        assert_eq!(cover.phase(), CoverPhase::FramesReady);
        assert!(cover.frames().is_some());
        assert!(!cover.cancel_custom_cover());
    }

    #[tokio::test]
    async fn custom_cover_without_video() {
        let mut cover = extractor(MockDecoder::with_duration(3000));

        assert_eq!(
            cover.supply_custom_cover(png(2, 2)),
            Err(CoverError::NoCustomCoverPending)
        );
        assert!(cover.set_custom_cover(Bytes::from_static(b"garbage")).is_err());
        assert_eq!(cover.phase(), CoverPhase::NoVideo);

        cover.set_custom_cover(png(2, 2)).unwrap();
        assert_eq!(cover.phase(), CoverPhase::NoVideo);
        assert!(matches!(cover.active_cover(), Some(CoverAsset::Custom { .. })));
    }

    #[tokio::test]
    async fn reupload_resets_frames_and_cover() {
        let mut cover = extractor(MockDecoder::with_duration(3000));
        cover.upload_video(video()).await.unwrap();
        cover.sample_frames().await.unwrap();
        cover.select_frame(6).unwrap();
        assert_eq!(cover.select_frame(9), Err(CoverError::FrameNotFound(9)));

        cover.upload_video(video()).await.unwrap();

        assert_eq!(cover.phase(), CoverPhase::VideoLoaded);
        assert_eq!(cover.frames(), None);
        assert!(matches!(
            cover.active_cover(),
            Some(CoverAsset::VideoFrame { offset, .. }) if *offset == seconds(100)
        ));
    }
}
