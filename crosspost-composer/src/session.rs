use crate::{
    cover::CoverFrameExtractor,
    selection::{GroupSelection, SelectionController, SelectionError, ViewMode},
    submit::{PostPayload, PostSubmitter, PostTarget, SubmissionReport},
};
use crosspost_common::model::{
    account::AccountId,
    group::{AccountGroup, GroupId},
    post::{EmptyPostContentError, MediaReference, PostContent, PostType},
};
use crosspost_store::{
    catalog::AccountCatalog,
    groups::{GroupStore, GroupValidationError, Persisted},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info};

/// The text and scheduling half of the post being composed.
#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PostDraft {
    pub content: String,
    pub use_custom_captions: bool,
    /// Per-account captions, used instead of `content` while
    /// `use_custom_captions` is set.
    pub custom_captions: BTreeMap<AccountId, String>,
    pub is_scheduled: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub schedule: Option<OffsetDateTime>,
    pub media: Vec<MediaReference>,
}

impl PostDraft {
    /// The caption `account_id` receives.
    #[must_use]
    pub fn caption_for(&self, account_id: &AccountId) -> &str {
        self.custom_captions
            .get(account_id)
            .filter(|caption| self.use_custom_captions && !caption.trim().is_empty())
            .unwrap_or(&self.content)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum DraftValidationError {
    #[error("No post type has been chosen yet")]
    NoPostType,
    #[error("At least one account must be selected")]
    NoAccounts,
    #[error(transparent)]
    Content(#[from] EmptyPostContentError),
    #[error("A scheduled post needs a date and time")]
    MissingSchedule,
}

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("Account group {0} does not exist")]
    UnknownGroup(GroupId),
}

/// The single owner of everything that makes up one post composition.
#[derive(Debug)]
pub struct ComposerSession {
    catalog: AccountCatalog,
    groups: GroupStore,
    selection: SelectionController,
    cover: CoverFrameExtractor,
    draft: PostDraft,
}

impl ComposerSession {
    pub fn new(catalog: AccountCatalog, groups: GroupStore, cover: CoverFrameExtractor) -> Self {
        Self {
            catalog,
            groups,
            selection: SelectionController::new(),
            cover,
            draft: PostDraft::default(),
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &AccountCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn groups(&self) -> &GroupStore {
        &self.groups
    }

    #[must_use]
    pub fn selection(&self) -> &SelectionController {
        &self.selection
    }

    #[must_use]
    pub fn cover(&self) -> &CoverFrameExtractor {
        &self.cover
    }

    pub fn cover_mut(&mut self) -> &mut CoverFrameExtractor {
        &mut self.cover
    }

    #[must_use]
    pub fn draft(&self) -> &PostDraft {
        &self.draft
    }

    pub fn set_post_type(&mut self, post_type: PostType) {
        self.selection.set_post_type(post_type);
    }

    pub fn set_view(&mut self, view: ViewMode) {
        self.selection.set_view(view);
    }

    pub fn toggle_account(&mut self, account_id: &AccountId) -> Result<bool, SelectionError> {
        self.selection.toggle(&self.catalog, account_id)
    }

    pub fn select_group_by_id(&mut self, group_id: GroupId) -> Result<GroupSelection, SessionError> {
        let group = self
            .groups
            .get(group_id)
            .ok_or(SessionError::UnknownGroup(group_id))?;

        Ok(self.selection.select_group(&self.catalog, group)?)
    }

    /// The saved group equal to the current selection, if any.
    #[must_use]
    pub fn matching_group(&self) -> Option<&AccountGroup> {
        self.selection.matching_group(&self.groups)
    }

    pub fn save_selection_as_group(
        &mut self,
        name: &str,
    ) -> Result<Persisted<AccountGroup>, GroupValidationError> {
        self.groups
            .create(name, self.selection.selected().iter().cloned())
    }

    pub fn create_group(
        &mut self,
        name: &str,
        account_ids: impl IntoIterator<Item = AccountId>,
    ) -> Result<Persisted<AccountGroup>, GroupValidationError> {
        let account_ids: Vec<_> = account_ids.into_iter().collect();
        if let Some(unknown) = account_ids
            .iter()
            .find(|account_id| self.catalog.get(account_id).is_none())
        {
            return Err(GroupValidationError::UnknownAccount(unknown.clone()));
        }
        self.groups.create(name, account_ids)
    }

    pub fn delete_group(&mut self, group_id: GroupId) -> Persisted<bool> {
        self.groups.delete(group_id)
    }

    pub fn set_draft(&mut self, draft: PostDraft) {
        self.draft = draft;
    }

    pub fn set_content(&mut self, content: String) {
        self.draft.content = content;
    }

    pub fn set_use_custom_captions(&mut self, enabled: bool) {
        self.draft.use_custom_captions = enabled;
    }

    pub fn set_custom_caption(&mut self, account_id: AccountId, caption: String) {
        self.draft.custom_captions.insert(account_id, caption);
    }

    /// `None` posts immediately.
    pub fn set_schedule(&mut self, schedule: Option<OffsetDateTime>) {
        self.draft.is_scheduled = schedule.is_some();
        self.draft.schedule = schedule;
    }

    pub fn set_media(&mut self, media: Vec<MediaReference>) {
        self.draft.media = media;
    }

    /// Builds the payload for the current composition. Targets are listed in
    /// catalog order.
    pub fn assemble_payload(&self) -> Result<PostPayload, DraftValidationError> {
        let post_type = self
            .selection
            .post_type()
            .ok_or(DraftValidationError::NoPostType)?;
        let selected = self.selection.selected();
        if selected.is_empty() {
            return Err(DraftValidationError::NoAccounts);
        }
        let content = PostContent::new(self.draft.content.clone())?;

        let schedule = if self.draft.is_scheduled {
            Some(self.draft.schedule.ok_or(DraftValidationError::MissingSchedule)?)
        } else {
            None
        };

        let targets = self
            .catalog
            .list_accounts()
            .iter()
            .filter(|account| selected.contains(&account.id))
            .map(|account| PostTarget {
                account_id: account.id.clone(),
                platform: account.platform,
                caption: self.draft.caption_for(&account.id).to_owned(),
            })
            .collect();

        let cover = match post_type {
            PostType::Video => self.cover.active_cover().cloned(),
            PostType::Text | PostType::Image => None,
        };

        Ok(PostPayload {
            post_type,
            content,
            targets,
            media: self.draft.media.clone(),
            cover,
            schedule,
        })
    }

    /// Submits the current composition. When every target was created the
    /// composition starts over; otherwise it is kept so failed accounts can
    /// be retried.
    pub async fn submit(
        &mut self,
        submitter: &dyn PostSubmitter,
    ) -> Result<SubmissionReport, DraftValidationError> {
        let payload = self.assemble_payload()?;
        debug!(post_type = %payload.post_type, targets = payload.targets.len(), "Submitting post");

        let report = submitter.submit(&payload).await;
        self.finish_submission(&report);
        Ok(report)
    }

    /// Applies the outcome of a submission made from
    /// [`assemble_payload`](Self::assemble_payload). Returns whether the
    /// composition was reset.
    pub fn finish_submission(&mut self, report: &SubmissionReport) -> bool {
        if !report.all_created() {
            return false;
        }

        info!(targets = report.outcomes.len(), "Post created on every account");
        self.selection.clear();
        self.cover.clear();
        self.draft = PostDraft::default();
        true
    }
}
