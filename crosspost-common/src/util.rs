use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{Error as _, Unexpected},
};
use thiserror::Error;
use time::Duration;

/// A strictly positive span of media or wall-clock time.
///
/// Serialized as fractional seconds, which is how media offsets are usually
/// written by hand in configuration.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct PositiveDuration(Duration);

impl PositiveDuration {
    #[must_use]
    pub fn new(duration: Duration) -> Option<Self> {
        duration.is_positive().then_some(Self(duration))
    }

    #[must_use]
    pub fn new_unchecked(duration: Duration) -> Self {
        Self::new(duration).expect("Duration was not positive.")
    }

    #[must_use]
    pub fn from_seconds_f64(seconds: f64) -> Option<Self> {
        Duration::checked_seconds_f64(seconds).and_then(Self::new)
    }

    #[must_use]
    pub fn get(&self) -> Duration {
        self.0
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The duration is not positive: {0}")]
pub struct NonPositiveDurationError(Duration);

impl TryFrom<Duration> for PositiveDuration {
    type Error = NonPositiveDurationError;

    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(NonPositiveDurationError(value))
    }
}

impl Serialize for PositiveDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(self.0.as_seconds_f64())
    }
}

impl<'de> Deserialize<'de> for PositiveDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = f64::deserialize(deserializer)?;
        PositiveDuration::from_seconds_f64(seconds).ok_or_else(|| {
            D::Error::invalid_value(Unexpected::Float(seconds), &"a positive number of seconds")
        })
    }
}
