use crate::model::{
    Id,
    account::{AccountId, Platform},
};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error as _, Unexpected},
};
use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
    str::FromStr,
};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Text,
    Image,
    Video,
}

impl PostType {
    pub const ALL: [PostType; 3] = [PostType::Text, PostType::Image, PostType::Video];

    /// Platforms that accept posts of this type.
    #[must_use]
    pub fn compatible_platforms(self) -> &'static [Platform] {
        match self {
            PostType::Text => &[
                Platform::Facebook,
                Platform::Linkedin,
                Platform::Threads,
                Platform::Twitter,
            ],
            PostType::Image => &[
                Platform::Facebook,
                Platform::Linkedin,
                Platform::Threads,
                Platform::Twitter,
                Platform::Tiktok,
            ],
            PostType::Video => &[
                Platform::Facebook,
                Platform::Linkedin,
                Platform::Threads,
                Platform::Twitter,
                Platform::Tiktok,
                Platform::Youtube,
            ],
        }
    }

    #[must_use]
    pub fn platform_set(self) -> BTreeSet<Platform> {
        self.compatible_platforms().iter().copied().collect()
    }

    #[must_use]
    pub fn supports(self, platform: Platform) -> bool {
        self.compatible_platforms().contains(&platform)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PostType::Text => "text",
            PostType::Image => "image",
            PostType::Video => "video",
        }
    }
}

impl Display for PostType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Unknown post type: {0}")]
pub struct UnknownPostTypeError(String);

impl FromStr for PostType {
    type Err = UnknownPostTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PostType::ALL
            .into_iter()
            .find(|post_type| post_type.as_str() == s)
            .ok_or_else(|| UnknownPostTypeError(s.to_owned()))
    }
}

/// Post text that contains at least one non-whitespace character.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct PostContent(String);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Post content must not be empty")]
pub struct EmptyPostContentError;

impl PostContent {
    pub fn new(content: String) -> Result<Self, EmptyPostContentError> {
        if content.trim().is_empty() {
            Err(EmptyPostContentError)
        } else {
            Ok(PostContent(content))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for PostContent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        PostContent::new(inner)
            .map_err(|_| D::Error::invalid_value(Unexpected::Str(""), &"non-empty PostContent"))
    }
}

/// Opaque reference to media the front end already uploaded.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct MediaReference(pub String);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Scheduled,
    Published,
}

/// A post as created for one target account.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPost {
    pub id: Id<PostMarker>,
    pub account_id: AccountId,
    pub platform: Platform,
    pub post_type: PostType,
    pub status: PostStatus,
    /// The caption the account received.
    pub content: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub scheduled_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
