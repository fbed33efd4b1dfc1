use crosspost_common::model::{
    ModelValidationError,
    account::AccountId,
    group::{AccountGroup, GroupId, GroupName},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A group id as stored. The web front end wrote ids as strings, this crate
/// writes them as numbers; both are read back.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub(crate) enum StoredGroupId {
    Number(GroupId),
    Text(String),
}

impl TryFrom<StoredGroupId> for GroupId {
    type Error = ModelValidationError;

    fn try_from(value: StoredGroupId) -> Result<Self, Self::Error> {
        match value {
            StoredGroupId::Number(id) => Ok(id),
            StoredGroupId::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| ModelValidationError::GroupId(text)),
        }
    }
}

/// Stored shape of an [`AccountGroup`], kept compatible with the JSON the web
/// front end wrote into local storage.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GroupRecord {
    pub id: StoredGroupId,
    pub name: String,
    pub account_ids: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&AccountGroup> for GroupRecord {
    fn from(value: &AccountGroup) -> Self {
        Self {
            id: StoredGroupId::Number(value.id()),
            name: value.name().get().to_owned(),
            account_ids: value
                .account_ids()
                .iter()
                .map(|id| id.get().to_owned())
                .collect(),
            created_at: value.created_at(),
        }
    }
}

impl TryFrom<GroupRecord> for AccountGroup {
    type Error = ModelValidationError;

    fn try_from(value: GroupRecord) -> Result<Self, Self::Error> {
        let account_ids = value
            .account_ids
            .into_iter()
            .map(AccountId::new)
            .collect::<Result<_, _>>()?;

        AccountGroup::new(
            GroupId::try_from(value.id)?,
            GroupName::new(&value.name)?,
            account_ids,
            value.created_at,
        )
    }
}
