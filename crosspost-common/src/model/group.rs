use crate::model::{Id, ModelValidationError, account::AccountId};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::collections::BTreeSet;
use thiserror::Error;
use time::OffsetDateTime;

pub const GROUP_NAME_MAX_LEN: usize = 100;

/// Fewest distinct accounts a newly created group may hold.
pub const MIN_GROUP_SIZE: usize = 2;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct GroupMarker;

pub type GroupId = Id<GroupMarker>;

/// Display name of a group. Surrounding whitespace is trimmed; the rest must
/// not be empty.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct GroupName(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The group name is invalid: {0:?}")]
pub struct InvalidGroupNameError(String);

impl GroupName {
    pub fn new(name: &str) -> Result<Self, InvalidGroupNameError> {
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed.chars().count() > GROUP_NAME_MAX_LEN {
            Err(InvalidGroupNameError(name.to_owned()))
        } else {
            Ok(GroupName(trimmed.to_owned()))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for GroupName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        GroupName::new(&inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"GroupName"))
    }
}

/// A named, reusable set of accounts. Membership is never empty.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AccountGroup {
    id: GroupId,
    name: GroupName,
    account_ids: BTreeSet<AccountId>,
    created_at: OffsetDateTime,
}

impl AccountGroup {
    pub fn new(
        id: GroupId,
        name: GroupName,
        account_ids: BTreeSet<AccountId>,
        created_at: OffsetDateTime,
    ) -> Result<Self, ModelValidationError> {
        if account_ids.is_empty() {
            return Err(ModelValidationError::EmptyGroup);
        }

        Ok(Self {
            id,
            name,
            account_ids,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> GroupId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &GroupName {
        &self.name
    }

    #[must_use]
    pub fn account_ids(&self) -> &BTreeSet<AccountId> {
        &self.account_ids
    }

    #[must_use]
    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    #[must_use]
    pub fn member_count(&self) -> usize {
        self.account_ids.len()
    }

    #[must_use]
    pub fn contains(&self, account_id: &AccountId) -> bool {
        self.account_ids.contains(account_id)
    }

    /// Set equality with `selection`: same members, no subset or superset.
    #[must_use]
    pub fn has_exactly(&self, selection: &BTreeSet<AccountId>) -> bool {
        self.account_ids == *selection
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{
        ModelValidationError,
        account::AccountId,
        group::{AccountGroup, GROUP_NAME_MAX_LEN, GroupName},
    };
    use std::collections::BTreeSet;
    use time::macros::datetime;

    fn ids(raw: &[&str]) -> BTreeSet<AccountId> {
        raw.iter().map(|id| AccountId::new(*id).unwrap()).collect()
    }

    #[test]
    fn group_name_is_trimmed() {
        assert_eq!(GroupName::new("  Core Team ").unwrap().get(), "Core Team");
        assert!(GroupName::new("").is_err());
        assert!(GroupName::new(" \t ").is_err());
    }

    #[test]
    fn group_name_length_is_capped_after_trimming() {
        let longest = "é".repeat(GROUP_NAME_MAX_LEN);
        assert_eq!(GroupName::new(&format!("  {longest}  ")).unwrap().get(), longest);
        assert!(GroupName::new(&"x".repeat(GROUP_NAME_MAX_LEN + 1)).is_err());
    }

    #[test]
    fn empty_membership_is_rejected() {
        let result = AccountGroup::new(
            1.into(),
            GroupName::new("Nobody").unwrap(),
            BTreeSet::new(),
            datetime!(2025-06-01 12:00 UTC),
        );
        assert_eq!(result, Err(ModelValidationError::EmptyGroup));
    }

    #[test]
    fn exact_membership_ignores_order() {
        let group = AccountGroup::new(
            1.into(),
            GroupName::new("Core Team").unwrap(),
            ids(&["A", "B"]),
            datetime!(2025-06-01 12:00 UTC),
        )
        .unwrap();

        assert!(group.has_exactly(&ids(&["B", "A"])));
        assert!(!group.has_exactly(&ids(&["A"])));
        assert!(!group.has_exactly(&ids(&["A", "B", "C"])));
    }
}
