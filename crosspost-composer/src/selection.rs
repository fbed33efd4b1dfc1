use crosspost_common::model::{account::AccountId, group::AccountGroup, post::PostType};
use crosspost_store::{catalog::AccountCatalog, groups::GroupStore};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// Browsing individual accounts; accounts can be toggled.
    #[default]
    Accounts,
    /// Browsing saved groups; a whole group can be selected.
    Groups,
}

impl Display for ViewMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ViewMode::Accounts => "accounts",
            ViewMode::Groups => "groups",
        })
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum SelectionError {
    #[error("No post type has been chosen yet")]
    NoPostType,
    #[error("This action is not available in the {0:?} view")]
    WrongView(ViewMode),
    #[error("Account {0} is not connected")]
    UnknownAccount(AccountId),
    #[error("Account {account} cannot receive {post_type} posts")]
    IncompatibleAccount {
        account: AccountId,
        post_type: PostType,
    },
    #[error("None of the group's accounts can receive {0} posts")]
    NoCompatibleMembers(PostType),
}

/// Result of selecting a group: members that could not be selected for the
/// current post type are reported back instead of silently vanishing.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct GroupSelection {
    pub selected: usize,
    pub dropped: Vec<AccountId>,
}

/// Which accounts the post being composed goes to.
///
/// The selection is always a subset of the accounts compatible with the
/// current post type.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct SelectionController {
    post_type: Option<PostType>,
    selected: BTreeSet<AccountId>,
    view: ViewMode,
}

impl SelectionController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn post_type(&self) -> Option<PostType> {
        self.post_type
    }

    #[must_use]
    pub fn selected(&self) -> &BTreeSet<AccountId> {
        &self.selected
    }

    #[must_use]
    pub fn view(&self) -> ViewMode {
        self.view
    }

    /// Switches the post type and always clears the selection.
    pub fn set_post_type(&mut self, post_type: PostType) {
        debug!(%post_type, cleared = self.selected.len(), "Post type changed");
        self.post_type = Some(post_type);
        self.selected.clear();
    }

    pub fn set_view(&mut self, view: ViewMode) {
        self.view = view;
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Adds the account if it is not selected, removes it otherwise. Returns
    /// whether the account is selected afterwards.
    pub fn toggle(
        &mut self,
        catalog: &AccountCatalog,
        account_id: &AccountId,
    ) -> Result<bool, SelectionError> {
        let post_type = self.post_type.ok_or(SelectionError::NoPostType)?;
        if self.view != ViewMode::Accounts {
            return Err(SelectionError::WrongView(self.view));
        }

        if self.selected.remove(account_id) {
            return Ok(false);
        }

        let account = catalog
            .get(account_id)
            .ok_or_else(|| SelectionError::UnknownAccount(account_id.clone()))?;
        if !post_type.supports(account.platform) {
            return Err(SelectionError::IncompatibleAccount {
                account: account_id.clone(),
                post_type,
            });
        }

        self.selected.insert(account_id.clone());
        Ok(true)
    }

    /// Replaces the selection with the group's members that can receive the
    /// current post type. Members that are disconnected or incompatible are
    /// left out and returned in [`GroupSelection::dropped`].
    pub fn select_group(
        &mut self,
        catalog: &AccountCatalog,
        group: &AccountGroup,
    ) -> Result<GroupSelection, SelectionError> {
        let post_type = self.post_type.ok_or(SelectionError::NoPostType)?;
        if self.view != ViewMode::Groups {
            return Err(SelectionError::WrongView(self.view));
        }

        let (compatible, dropped): (Vec<_>, Vec<_>) = group
            .account_ids()
            .iter()
            .cloned()
            .partition(|account_id| catalog.is_compatible(account_id, post_type));

        if compatible.is_empty() {
            return Err(SelectionError::NoCompatibleMembers(post_type));
        }
        if !dropped.is_empty() {
            warn!(
                group_id = %group.id(),
                %post_type,
                dropped = dropped.len(),
                "Selected group has members that cannot receive this post type"
            );
        }

        self.selected = compatible.into_iter().collect();
        Ok(GroupSelection {
            selected: self.selected.len(),
            dropped,
        })
    }

    /// The stored group whose members are exactly the current selection.
    /// Single-account selections never match.
    #[must_use]
    pub fn matching_group<'s>(&self, store: &'s GroupStore) -> Option<&'s AccountGroup> {
        if self.selected.len() < 2 {
            return None;
        }
        store.find_exact_match(&self.selected)
    }
}
