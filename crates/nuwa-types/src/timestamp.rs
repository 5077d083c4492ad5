use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::ops::{Add, Sub};
use std::time::{SystemTime, SystemTimeError};

/// A Unix timestamp in milliseconds, used for proposal lifecycles and
/// service transaction references.
///
/// Serialized as a stringified integer to avoid loss of precision in JSON.
/// For example, `1699999999123` becomes `"1699999999123"` in the wire format.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct UnixMillis(pub u64);

impl Serialize for UnixMillis {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixMillis {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let ms = s
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom("timestamp must be a non-negative integer"))?;
        Ok(UnixMillis(ms))
    }
}

impl Display for UnixMillis {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u64> for UnixMillis {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        UnixMillis(self.0 + rhs)
    }
}

impl Sub<UnixMillis> for UnixMillis {
    type Output = u64;

    fn sub(self, rhs: UnixMillis) -> Self::Output {
        self.0.saturating_sub(rhs.0)
    }
}

impl UnixMillis {
    pub fn try_now() -> Result<Self, SystemTimeError> {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)?
            .as_millis() as u64;
        Ok(Self(now))
    }

    /// Current time, falling back to the epoch if the system clock is unset.
    pub fn now_or_epoch() -> Self {
        Self::try_now().unwrap_or(UnixMillis(0))
    }

    pub fn millis_since_epoch(&self) -> u64 {
        self.0
    }
}
