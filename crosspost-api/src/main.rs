use axum::extract::DefaultBodyLimit;
use crosspost_common::util::PositiveDuration;
use crosspost_composer::{
    cover::{CoverFrameExtractor, SamplingSettings, decoder::MediaDecoder},
    session::ComposerSession,
    submit::StubSubmitter,
};
use crosspost_store::{
    catalog::{AccountCatalog, CatalogError},
    groups::GroupStore,
    kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore},
};
use serde::Deserialize;
use server::ServerState;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};
use thiserror::Error;
use time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod server;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
    #[error("Error loading account catalog: {0}")]
    Catalog(#[from] CatalogError),
    #[error("Error opening store directory: {0}")]
    Store(std::io::Error),
    #[cfg(feature = "ffmpeg")]
    #[error("Error initializing video decoding: {0}")]
    Decoder(#[from] crosspost_composer::cover::decoder::MediaDecodeError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

fn default_frame_count() -> usize {
    10
}

fn default_frame_interval() -> PositiveDuration {
    PositiveDuration::new_unchecked(Duration::milliseconds(500))
}

fn default_cover_offset() -> f64 {
    0.1
}

fn default_submit_delay_ms() -> u64 {
    1000
}

fn default_max_upload_bytes() -> usize {
    256 * 1024 * 1024
}

#[derive(Clone, PartialEq, Debug, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    /// Account groups only live in memory when unset.
    store_dir: Option<PathBuf>,
    /// A JSON array of accounts. The demo accounts are used when unset.
    catalog_path: Option<PathBuf>,
    #[serde(default = "default_frame_count")]
    cover_frame_count: usize,
    #[serde(default = "default_frame_interval")]
    cover_frame_interval_seconds: PositiveDuration,
    #[serde(default = "default_cover_offset")]
    cover_default_offset_seconds: f64,
    #[serde(default = "default_submit_delay_ms")]
    stub_submit_delay_ms: u64,
    #[serde(default = "default_max_upload_bytes")]
    max_upload_bytes: usize,
}

impl Env {
    fn sampling_settings(&self) -> Result<SamplingSettings, InitError> {
        if self.cover_frame_count == 0 {
            return Err(InitError::InvalidSetting {
                name: "COVER_FRAME_COUNT",
                reason: "must be at least 1".to_owned(),
            });
        }
        let default_offset = Duration::checked_seconds_f64(self.cover_default_offset_seconds)
            .filter(|offset| !offset.is_negative())
            .ok_or_else(|| InitError::InvalidSetting {
                name: "COVER_DEFAULT_OFFSET_SECONDS",
                reason: format!(
                    "{} is not a non-negative number of seconds",
                    self.cover_default_offset_seconds
                ),
            })?;

        Ok(SamplingSettings {
            frame_count: self.cover_frame_count,
            interval: self.cover_frame_interval_seconds,
            default_offset,
        })
    }
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "crosspost_api=debug,\
                crosspost_composer=debug,\
                crosspost_store=debug,\
                tower_http=debug,axum::rejection=trace"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

#[cfg(feature = "ffmpeg")]
fn media_decoder() -> Result<Arc<dyn MediaDecoder>, InitError> {
    Ok(Arc::new(crosspost_composer::cover::ffmpeg::FfmpegDecoder::new()?))
}

#[cfg(not(feature = "ffmpeg"))]
#[allow(clippy::unnecessary_wraps)]
fn media_decoder() -> Result<Arc<dyn MediaDecoder>, InitError> {
    warn!("Built without the ffmpeg feature, video uploads will be rejected");
    Ok(Arc::new(crosspost_composer::cover::decoder::StillImageDecoder))
}

fn build_session(env: &Env) -> Result<ComposerSession, InitError> {
    let catalog = match &env.catalog_path {
        Some(path) => AccountCatalog::load(path)?,
        None => {
            info!("No account catalog configured, using demo accounts");
            AccountCatalog::demo()
        }
    };

    let storage: Arc<dyn KeyValueStore> = match &env.store_dir {
        Some(dir) => Arc::new(FileKeyValueStore::open(dir).map_err(InitError::Store)?),
        None => {
            warn!("No store directory configured, account groups will not be persisted");
            Arc::new(MemoryKeyValueStore::new())
        }
    };
    let groups = GroupStore::load(storage);
    let cover = CoverFrameExtractor::new(media_decoder()?, env.sampling_settings()?);

    Ok(ComposerSession::new(catalog, groups, cover))
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let shutdown = CancellationToken::new();

    let token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received ctrl-c, shutting down"),
            Err(err) => warn!(error = %err, "Listening for ctrl-c failed, shutting down"),
        }
        token.cancel();
    });

    shutdown
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let session = build_session(&env)?;
    let submitter = StubSubmitter::new(std::time::Duration::from_millis(env.stub_submit_delay_ms));
    let state = ServerState::new(session, Arc::new(submitter));

    let tracing_layer = TraceLayer::new_for_http();
    let app = server::routes()
        .layer(DefaultBodyLimit::max(env.max_upload_bytes))
        .layer(tracing_layer)
        .with_state(state);

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_on_ctrl_c().cancelled_owned())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}
