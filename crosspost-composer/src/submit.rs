use crate::cover::CoverAsset;
use async_trait::async_trait;
use crosspost_common::model::{
    CrosspostSnowflakeGenerator,
    account::{AccountId, Platform},
    post::{CreatedPost, MediaReference, PostContent, PostStatus, PostType},
};
use serde::Serialize;
use std::{
    collections::HashSet,
    sync::{Mutex, PoisonError},
    time::Duration,
};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

/// One account the post goes to, with the caption it receives.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostTarget {
    pub account_id: AccountId,
    pub platform: Platform,
    pub caption: String,
}

/// Everything needed to create a post on every selected account.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PostPayload {
    pub post_type: PostType,
    pub content: PostContent,
    pub targets: Vec<PostTarget>,
    pub media: Vec<MediaReference>,
    /// Only set for video posts.
    pub cover: Option<CoverAsset>,
    pub schedule: Option<OffsetDateTime>,
}

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum SubmissionError {
    #[error("The platform rejected the post: {0}")]
    Rejected(String),
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct TargetOutcome {
    pub account_id: AccountId,
    pub platform: Platform,
    pub result: Result<CreatedPost, SubmissionError>,
}

/// Per-account results of one submission. Targets succeed or fail
/// independently.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct SubmissionReport {
    pub outcomes: Vec<TargetOutcome>,
}

impl SubmissionReport {
    pub fn created(&self) -> impl Iterator<Item = &CreatedPost> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&AccountId, &SubmissionError)> {
        self.outcomes.iter().filter_map(|outcome| {
            outcome
                .result
                .as_ref()
                .err()
                .map(|err| (&outcome.account_id, err))
        })
    }

    #[must_use]
    pub fn all_created(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.result.is_ok())
    }
}

#[async_trait]
pub trait PostSubmitter: Send + Sync {
    async fn submit(&self, payload: &PostPayload) -> SubmissionReport;
}

/// Pretends to talk to the platforms: waits for `delay`, then creates every
/// target except the ones configured to fail.
#[derive(Debug, Default)]
pub struct StubSubmitter {
    delay: Duration,
    failing: HashSet<AccountId>,
    ids: Mutex<CrosspostSnowflakeGenerator>,
}

impl StubSubmitter {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing_for(mut self, account_id: AccountId) -> Self {
        self.failing.insert(account_id);
        self
    }
}

#[async_trait]
impl PostSubmitter for StubSubmitter {
    async fn submit(&self, payload: &PostPayload) -> SubmissionReport {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let now = OffsetDateTime::now_utc();
        let status = if payload.schedule.is_some() {
            PostStatus::Scheduled
        } else {
            PostStatus::Published
        };

        let outcomes = payload
            .targets
            .iter()
            .map(|target| {
                let result = if self.failing.contains(&target.account_id) {
                    warn!(account_id = %target.account_id, "Stub submission rejected");
                    Err(SubmissionError::Rejected(format!(
                        "{} is configured to fail",
                        target.account_id
                    )))
                } else {
                    self.ids
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .generate()
                        .map(|id| CreatedPost {
                            id: id.into(),
                            account_id: target.account_id.clone(),
                            platform: target.platform,
                            post_type: payload.post_type,
                            status,
                            content: target.caption.clone(),
                            scheduled_at: payload.schedule,
                            created_at: now,
                        })
                        .map_err(|err| SubmissionError::Rejected(err.to_string()))
                };

                TargetOutcome {
                    account_id: target.account_id.clone(),
                    platform: target.platform,
                    result,
                }
            })
            .collect();

        let report = SubmissionReport { outcomes };
        info!(
            created = report.created().count(),
            failed = report.failed().count(),
            "Submitted post"
        );
        report
    }
}
