use crate::{
    kv::{KeyValueStore, KvError},
    record::GroupRecord,
};
use crosspost_common::{
    id::SnowflakesExhaustedError,
    model::{
        CrosspostSnowflakeGenerator,
        account::AccountId,
        group::{AccountGroup, GroupId, GroupName, InvalidGroupNameError, MIN_GROUP_SIZE},
    },
};
use std::{collections::BTreeSet, sync::Arc};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// Storage key the group list lives under.
pub const GROUPS_KEY: &str = "accountGroups";

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum GroupValidationError {
    #[error(transparent)]
    Name(#[from] InvalidGroupNameError),
    #[error("A group needs at least {MIN_GROUP_SIZE} distinct accounts, got {0}")]
    TooFewAccounts(usize),
    #[error("Account {0} is not connected")]
    UnknownAccount(AccountId),
    #[error(transparent)]
    IdsExhausted(#[from] SnowflakesExhaustedError),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Encoding account groups failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] KvError),
}

/// The outcome of a mutation whose in-memory effect always sticks, paired with
/// the result of writing it through to storage.
#[derive(Debug)]
#[must_use]
pub struct Persisted<T> {
    pub value: T,
    pub write_error: Option<PersistenceError>,
}

impl<T> Persisted<T> {
    pub fn into_value(self) -> T {
        self.value
    }
}

/// Named account groups, kept in insertion order and written through to a
/// [`KeyValueStore`] after every change.
pub struct GroupStore {
    groups: Vec<AccountGroup>,
    id_generator: CrosspostSnowflakeGenerator,
    storage: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for GroupStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupStore")
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}

impl GroupStore {
    /// Reads the persisted group list. A missing or unreadable list yields an
    /// empty store; individual invalid groups are dropped.
    pub fn load(storage: Arc<dyn KeyValueStore>) -> Self {
        let groups = match storage.read(GROUPS_KEY) {
            Ok(Some(json)) => parse_groups(&json),
            Ok(None) => {
                debug!("No stored account groups");
                Vec::new()
            }
            Err(err) => {
                warn!(error = %err, "Reading account groups failed, starting empty");
                Vec::new()
            }
        };

        let id_generator = groups
            .iter()
            .map(|group| group.id().snowflake())
            .max()
            .map_or_else(
                CrosspostSnowflakeGenerator::new,
                CrosspostSnowflakeGenerator::resume_after,
            );

        info!(groups = groups.len(), "Loaded account groups");
        Self {
            groups,
            id_generator,
            storage,
        }
    }

    pub fn create(
        &mut self,
        name: &str,
        account_ids: impl IntoIterator<Item = AccountId>,
    ) -> Result<Persisted<AccountGroup>, GroupValidationError> {
        self.create_at(name, account_ids, OffsetDateTime::now_utc())
    }

    pub fn create_at(
        &mut self,
        name: &str,
        account_ids: impl IntoIterator<Item = AccountId>,
        now: OffsetDateTime,
    ) -> Result<Persisted<AccountGroup>, GroupValidationError> {
        let name = GroupName::new(name)?;
        let account_ids: BTreeSet<_> = account_ids.into_iter().collect();
        if account_ids.len() < MIN_GROUP_SIZE {
            return Err(GroupValidationError::TooFewAccounts(account_ids.len()));
        }

        let id = self.id_generator.generate_at(now)?.into();
        let group = AccountGroup::new(id, name, account_ids, now)
            .map_err(|_| GroupValidationError::TooFewAccounts(0))?;
        self.groups.push(group.clone());

        info!(group_id = %id, name = group.name().get(), members = group.member_count(), "Created account group");
        Ok(Persisted {
            value: group,
            write_error: self.persist(),
        })
    }

    /// Removes the group if it exists. Returns whether anything was removed;
    /// removing an unknown id is not an error and does not touch storage.
    pub fn delete(&mut self, group_id: GroupId) -> Persisted<bool> {
        let before = self.groups.len();
        self.groups.retain(|group| group.id() != group_id);

        if self.groups.len() == before {
            debug!(%group_id, "Delete of unknown account group ignored");
            return Persisted {
                value: false,
                write_error: None,
            };
        }

        info!(%group_id, "Deleted account group");
        Persisted {
            value: true,
            write_error: self.persist(),
        }
    }

    #[must_use]
    pub fn list(&self) -> &[AccountGroup] {
        &self.groups
    }

    #[must_use]
    pub fn get(&self, group_id: GroupId) -> Option<&AccountGroup> {
        self.groups.iter().find(|group| group.id() == group_id)
    }

    /// The first group, in [`list`](Self::list) order, whose members equal
    /// `selection` exactly.
    #[must_use]
    pub fn find_exact_match(&self, selection: &BTreeSet<AccountId>) -> Option<&AccountGroup> {
        self.groups.iter().find(|group| group.has_exactly(selection))
    }

    fn persist(&self) -> Option<PersistenceError> {
        let result = self.write_all();
        if let Err(err) = &result {
            warn!(error = %err, "Persisting account groups failed, keeping in-memory state");
        }
        result.err()
    }

    fn write_all(&self) -> Result<(), PersistenceError> {
        let records: Vec<GroupRecord> = self.groups.iter().map(GroupRecord::from).collect();
        let json = serde_json::to_string(&records)?;
        self.storage.write(GROUPS_KEY, &json)?;
        Ok(())
    }
}

fn parse_groups(json: &str) -> Vec<AccountGroup> {
    let records: Vec<GroupRecord> = match serde_json::from_str(json) {
        Ok(records) => records,
        Err(err) => {
            warn!(error = %err, "Stored account groups are corrupt, starting empty");
            return Vec::new();
        }
    };

    let mut seen = BTreeSet::new();
    records
        .into_iter()
        .filter_map(|record| {
            let stored_id = record.id.clone();
            let group = match AccountGroup::try_from(record) {
                Ok(group) => group,
                Err(err) => {
                    warn!(group_id = ?stored_id, error = %err, "Skipping invalid stored account group");
                    return None;
                }
            };

            let id = group.id();
            if !seen.insert(id) {
                warn!(group_id = %id, "Skipping stored account group with duplicate id");
                None
            } else {
                Some(group)
            }
        })
        .collect()
}
