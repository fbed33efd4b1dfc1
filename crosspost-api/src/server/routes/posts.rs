use crate::server::{Result, ServerError, ServerRouter, SharedSession, extract::Json};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use crosspost_common::model::{
    account::{AccountId, Platform},
    post::CreatedPost,
};
use crosspost_composer::{
    session::PostDraft,
    submit::{PostSubmitter, SubmissionReport},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_draft)
        .typed_put(set_draft)
        .typed_post(create_post)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/draft", rejection(ServerError))]
struct DraftPath();

async fn get_draft(
    DraftPath(): DraftPath,
    State(session): State<SharedSession>,
) -> Result<Json<PostDraft>> {
    Ok(Json(session.lock().await.draft().clone()))
}

async fn set_draft(
    DraftPath(): DraftPath,
    State(session): State<SharedSession>,
    Json(draft): Json<PostDraft>,
) -> Result<Json<PostDraft>> {
    let mut session = session.lock().await;
    session.set_draft(draft);

    Ok(Json(session.draft().clone()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FailedTarget {
    account_id: AccountId,
    platform: Platform,
    reason: String,
}

#[derive(Serialize)]
struct SubmissionResponse {
    created: Vec<CreatedPost>,
    failed: Vec<FailedTarget>,
}

impl From<SubmissionReport> for SubmissionResponse {
    fn from(value: SubmissionReport) -> Self {
        let mut created = Vec::new();
        let mut failed = Vec::new();

        for outcome in value.outcomes {
            match outcome.result {
                Ok(post) => created.push(post),
                Err(err) => failed.push(FailedTarget {
                    account_id: outcome.account_id,
                    platform: outcome.platform,
                    reason: err.to_string(),
                }),
            }
        }

        Self { created, failed }
    }
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/create", rejection(ServerError))]
struct CreatePostPath();

async fn create_post(
    CreatePostPath(): CreatePostPath,
    State(session): State<SharedSession>,
    State(submitter): State<Arc<dyn PostSubmitter>>,
) -> Result<Json<SubmissionResponse>> {
    let payload = session.lock().await.assemble_payload()?;
    debug!(post_type = %payload.post_type, targets = payload.targets.len(), "Submitting post");

    // The session stays usable while the platforms answer.
    let report = submitter.submit(&payload).await;
    session.lock().await.finish_submission(&report);

    Ok(Json(report.into()))
}
