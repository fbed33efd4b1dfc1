use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};
use thiserror::Error;

pub const ACCOUNT_ID_MAX_LEN: usize = 128;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Facebook,
    Linkedin,
    Threads,
    Twitter,
    Tiktok,
    Youtube,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Facebook,
        Platform::Linkedin,
        Platform::Threads,
        Platform::Twitter,
        Platform::Tiktok,
        Platform::Youtube,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::Linkedin => "linkedin",
            Platform::Threads => "threads",
            Platform::Twitter => "twitter",
            Platform::Tiktok => "tiktok",
            Platform::Youtube => "youtube",
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Unknown platform: {0}")]
pub struct UnknownPlatformError(String);

impl FromStr for Platform {
    type Err = UnknownPlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|platform| platform.as_str() == s)
            .ok_or_else(|| UnknownPlatformError(s.to_owned()))
    }
}

/// Identifier of a connected account, as handed out by the account provider.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct AccountId(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The account id is invalid: {0:?}")]
pub struct InvalidAccountIdError(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidAccountIdError> {
        let id = id.into();
        if id.is_empty() || id.len() > ACCOUNT_ID_MAX_LEN || id.chars().any(char::is_whitespace) {
            Err(InvalidAccountIdError(id))
        } else {
            Ok(AccountId(id))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for AccountId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountId {
    type Err = InvalidAccountIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccountId::new(s)
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        AccountId::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"AccountId"))
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub platform: Platform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}
