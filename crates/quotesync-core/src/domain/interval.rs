use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Refresh interval in whole minutes, bounded to one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct IntervalMinutes(u32);

impl IntervalMinutes {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 1440;

    pub fn new(minutes: u32) -> Result<Self, ValidationError> {
        if !(Self::MIN..=Self::MAX).contains(&minutes) {
            return Err(ValidationError::IntervalOutOfRange {
                value: minutes,
                min: Self::MIN,
                max: Self::MAX,
            });
        }
        Ok(Self(minutes))
    }

    pub const fn minutes(self) -> u32 {
        self.0
    }

    pub const fn as_duration(self) -> Duration {
        Duration::from_secs(self.0 as u64 * 60)
    }
}

impl Display for IntervalMinutes {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}m", self.0)
    }
}

impl TryFrom<u32> for IntervalMinutes {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<IntervalMinutes> for u32 {
    fn from(value: IntervalMinutes) -> Self {
        value.0
    }
}
