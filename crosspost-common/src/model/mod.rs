pub mod account;
pub mod group;
pub mod post;

use crate::{
    id::{Epoch, Snowflake, SnowflakeGenerator},
    model::{account::InvalidAccountIdError, group::InvalidGroupNameError},
};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, marker::PhantomData, str::FromStr};
use thiserror::Error;
use time::{OffsetDateTime, macros::datetime};

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    AccountId(#[from] InvalidAccountIdError),
    #[error(transparent)]
    GroupName(#[from] InvalidGroupNameError),
    #[error("An account group must contain at least one account")]
    EmptyGroup,
    #[error("The group id is not a number: {0:?}")]
    GroupId(String),
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CrosspostEpoch;
impl Epoch for CrosspostEpoch {
    const EPOCH_TIME: OffsetDateTime = datetime!(2025-01-01 00:00 UTC);
}

pub type CrosspostSnowflake = Snowflake<CrosspostEpoch>;
pub type CrosspostSnowflakeGenerator = SnowflakeGenerator<CrosspostEpoch>;

#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Id<Marker>(CrosspostSnowflake, #[serde(skip)] PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(snowflake: CrosspostSnowflake) -> Self {
        Self(snowflake, PhantomData)
    }

    #[must_use]
    pub fn snowflake(self) -> CrosspostSnowflake {
        self.0
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> FromStr for Id<Marker> {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str(s).map(Id::from)
    }
}

impl<Marker> From<CrosspostSnowflake> for Id<Marker> {
    fn from(value: CrosspostSnowflake) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(CrosspostSnowflake::new(value))
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.snowflake().get()
    }
}
