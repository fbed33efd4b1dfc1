//! Snowflake-style identifiers.
//!
//! A snowflake packs the milliseconds since an [`Epoch`] into the upper bits
//! and a per-millisecond sequence into the lower [`SEQUENCE_LENGTH`] bits, so
//! ids sort by creation time. A [`SnowflakeGenerator`] never hands out the
//! same value twice, even when the clock stalls or goes backwards.

use derive_where::derive_where;
use std::{
    fmt::{Debug, Display, Formatter},
    marker::PhantomData,
};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

#[allow(clippy::unusual_byte_groupings)]
pub const TIMESTAMP_BITMASK: u64 =
    0b1111111111111111111111111111111111111111111111111111_000000000000;
pub const TIMESTAMP_OFFSET: u64 = 12;
pub const TIMESTAMP_LENGTH: u64 = 52;

#[allow(clippy::unusual_byte_groupings)]
pub const SEQUENCE_BITMASK: u64 =
    0b0000000000000000000000000000000000000000000000000000_111111111111;
pub const SEQUENCE_LENGTH: u64 = 12;

pub trait Epoch {
    const EPOCH_TIME: OffsetDateTime;
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum SnowflakeTimestampError {
    #[error("Specified time was before the snowflake epoch.")]
    TimeBeforeEpoch,
    #[error("Resulting timestamp uses too many bits.")]
    TimestampTooLarge,
}

#[derive_where(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct SnowflakeTimestamp<SnowflakeEpoch>(u64, PhantomData<SnowflakeEpoch>);

impl<SnowflakeEpoch> SnowflakeTimestamp<SnowflakeEpoch> {
    #[must_use]
    pub fn new(millis: u64) -> Option<Self> {
        (millis < 1 << TIMESTAMP_LENGTH).then_some(Self(millis, PhantomData))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    /// Like [`TryFrom<OffsetDateTime>`], but times before the epoch are pinned
    /// to the epoch itself.
    #[must_use]
    pub fn saturating_from_time(value: OffsetDateTime) -> Self
    where
        SnowflakeEpoch: Epoch,
    {
        match Self::try_from(value) {
            Ok(timestamp) => timestamp,
            Err(SnowflakeTimestampError::TimeBeforeEpoch) => Self(0, PhantomData),
            Err(SnowflakeTimestampError::TimestampTooLarge) => {
                Self((1 << TIMESTAMP_LENGTH) - 1, PhantomData)
            }
        }
    }
}

impl<SnowflakeEpoch: Epoch> TryFrom<OffsetDateTime> for SnowflakeTimestamp<SnowflakeEpoch> {
    type Error = SnowflakeTimestampError;

    fn try_from(value: OffsetDateTime) -> Result<Self, Self::Error> {
        let millis = (value - SnowflakeEpoch::EPOCH_TIME).whole_milliseconds();
        if millis < 0 {
            return Err(Self::Error::TimeBeforeEpoch);
        }
        let millis = u64::try_from(millis).map_err(|_| Self::Error::TimestampTooLarge)?;
        Self::new(millis).ok_or(Self::Error::TimestampTooLarge)
    }
}

impl<SnowflakeEpoch: Epoch> From<SnowflakeTimestamp<SnowflakeEpoch>> for OffsetDateTime {
    fn from(value: SnowflakeTimestamp<SnowflakeEpoch>) -> Self {
        // 52 bits of milliseconds always fit into an i64.
        #[allow(clippy::cast_possible_wrap)]
        let millis = value.0 as i64;
        SnowflakeEpoch::EPOCH_TIME + Duration::milliseconds(millis)
    }
}

#[derive_where(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Debug,
    Default,
    Hash,
    Serialize,
    Deserialize
)]
#[serde(transparent)]
pub struct Snowflake<SnowflakeEpoch>(u64, #[serde(skip)] PhantomData<SnowflakeEpoch>);

impl<SnowflakeEpoch> Snowflake<SnowflakeEpoch> {
    #[must_use]
    pub fn new(inner: u64) -> Self {
        Self(inner, PhantomData)
    }

    #[must_use]
    pub fn from_parts(timestamp: SnowflakeTimestamp<SnowflakeEpoch>, sequence: u16) -> Self {
        let sequence = u64::from(sequence) & SEQUENCE_BITMASK;
        Self::new(timestamp.get() << TIMESTAMP_OFFSET | sequence)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn timestamp(self) -> SnowflakeTimestamp<SnowflakeEpoch> {
        SnowflakeTimestamp((self.0 & TIMESTAMP_BITMASK) >> TIMESTAMP_OFFSET, PhantomData)
    }

    #[must_use]
    pub fn sequence(self) -> u16 {
        #[allow(clippy::cast_possible_truncation)]
        let sequence = (self.0 & SEQUENCE_BITMASK) as u16;
        sequence
    }

    #[must_use]
    pub fn created_at(self) -> OffsetDateTime
    where
        SnowflakeEpoch: Epoch,
    {
        self.timestamp().into()
    }
}

impl<SnowflakeEpoch> Display for Snowflake<SnowflakeEpoch> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<SnowflakeEpoch> From<u64> for Snowflake<SnowflakeEpoch> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<SnowflakeEpoch> From<Snowflake<SnowflakeEpoch>> for u64 {
    fn from(value: Snowflake<SnowflakeEpoch>) -> Self {
        value.get()
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
#[error("No snowflake is left after {0}")]
pub struct SnowflakesExhaustedError(u64);

#[derive_where(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct SnowflakeGenerator<SnowflakeEpoch> {
    last: Option<Snowflake<SnowflakeEpoch>>,
}

impl<SnowflakeEpoch> SnowflakeGenerator<SnowflakeEpoch> {
    #[must_use]
    pub fn new() -> Self {
        Self { last: None }
    }

    /// A generator whose ids are all strictly greater than `last`.
    #[must_use]
    pub fn resume_after(last: Snowflake<SnowflakeEpoch>) -> Self {
        Self { last: Some(last) }
    }

    /// Fails once `u64::MAX` has been handed out, which only happens when
    /// resuming after an id that was not produced by a generator.
    pub fn generate_at(
        &mut self,
        time: OffsetDateTime,
    ) -> Result<Snowflake<SnowflakeEpoch>, SnowflakesExhaustedError>
    where
        SnowflakeEpoch: Epoch,
    {
        let candidate = Snowflake::from_parts(SnowflakeTimestamp::saturating_from_time(time), 0);

        let snowflake = match self.last {
            Some(last) if candidate <= last => last
                .get()
                .checked_add(1)
                .map(Snowflake::new)
                .ok_or(SnowflakesExhaustedError(last.get()))?,
            _ => candidate,
        };
        self.last = Some(snowflake);

        Ok(snowflake)
    }

    pub fn generate(&mut self) -> Result<Snowflake<SnowflakeEpoch>, SnowflakesExhaustedError>
    where
        SnowflakeEpoch: Epoch,
    {
        self.generate_at(OffsetDateTime::now_utc())
    }
}
