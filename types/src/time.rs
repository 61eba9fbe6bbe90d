//! Wall-clock instants, in whole Unix seconds.
//!
//! Proposal windows and vote timestamps all use this type; both chains report
//! block and log times at second resolution.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn new(secs: u64) -> Self {
        Self(secs)
    }

    /// Current system time. A clock set before 1970 reads as zero.
    pub fn now() -> Self {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(Self(0), |d| Self(d.as_secs()))
    }

    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// `self` moved forward by `secs`, pinned at `u64::MAX`.
    pub fn plus_secs(self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    /// Seconds left until `deadline`; zero once it has passed.
    pub fn secs_until(self, deadline: Timestamp) -> u64 {
        deadline.0.saturating_sub(self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_saturates() {
        assert_eq!(Timestamp::new(u64::MAX - 1).plus_secs(10).as_secs(), u64::MAX);
        assert_eq!(Timestamp::new(50).secs_until(Timestamp::new(20)), 0);
        assert_eq!(Timestamp::new(20).secs_until(Timestamp::new(50)), 30);
    }
}
