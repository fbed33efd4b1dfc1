use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use crosspost_common::model::group::GroupId;
use crosspost_composer::{
    cover::{CoverError, decoder::MediaDecodeError},
    selection::SelectionError,
    session::{ComposerSession, DraftValidationError, SessionError},
    submit::PostSubmitter,
};
use crosspost_store::groups::GroupValidationError;
use extract::Json;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::{sync::Mutex, task::JoinError};
use tracing::error;

mod extract;
mod routes;

pub type ServerRouter = Router<ServerState>;

/// The one composition this server drives. Every request takes the lock.
pub type SharedSession = Arc<Mutex<ComposerSession>>;

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub session: SharedSession,
    pub submitter: Arc<dyn PostSubmitter>,
}

impl ServerState {
    pub fn new(session: ComposerSession, submitter: Arc<dyn PostSubmitter>) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            submitter,
        }
    }
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query string rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    GroupValidation(#[from] GroupValidationError),
    #[error("Account group with id {0} was not found.")]
    GroupByIdNotFound(GroupId),
    #[error(transparent)]
    Cover(#[from] CoverError),
    #[error("Frame sampling task failed: {0}")]
    SamplingTask(#[from] JoinError),
    #[error(transparent)]
    Draft(#[from] DraftValidationError),
}

impl From<SessionError> for ServerError {
    fn from(value: SessionError) -> Self {
        match value {
            SessionError::Selection(err) => ServerError::Selection(err),
            SessionError::UnknownGroup(id) => ServerError::GroupByIdNotFound(id),
        }
    }
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::GroupByIdNotFound(_)
            | ServerError::Selection(SelectionError::UnknownAccount(_))
            | ServerError::Cover(CoverError::FrameNotFound(_)) => StatusCode::NOT_FOUND,
            ServerError::QueryRejection(rejection) => rejection.status(),
            ServerError::JsonRejection(rejection) => rejection.status(),
            ServerError::Cover(
                CoverError::SamplingInProgress
                | CoverError::CustomCoverPending
                | CoverError::SamplingCancelled
                | CoverError::StaleSampling,
            ) => StatusCode::CONFLICT,
            ServerError::Cover(CoverError::Decode(MediaDecodeError::Unsupported(_))) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ServerError::JsonResponse(_)
            | ServerError::SamplingTask(_)
            | ServerError::GroupValidation(GroupValidationError::IdsExhausted(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServerError::Selection(_)
            | ServerError::GroupValidation(_)
            | ServerError::Cover(_)
            | ServerError::Draft(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct ErrorResponse {
    status: u16,
    message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        error!(error = %self, %status, "Replying with error");

        let error_response = ErrorResponse {
            status: status.as_u16(),
            message: self.to_string(),
        };
        (status, Json(error_response)).into_response()
    }
}
