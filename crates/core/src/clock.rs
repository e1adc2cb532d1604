use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Returns the current wall-clock time as milliseconds since Unix epoch.
pub fn physical_now() -> Result<i64, CoreError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .map_err(|_| CoreError::InvalidData("system clock before epoch".into()))
}

/// Milliseconds since Unix epoch. Stored as a SQLite INTEGER.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// A clock that hands out strictly increasing timestamps, so contacts created
/// by one engine within the same millisecond still order by creation.
pub struct ContactClock {
    last_ms: i64,
}

impl ContactClock {
    pub fn new() -> Self {
        Self { last_ms: 0 }
    }

    /// Generate the next monotonically increasing timestamp.
    pub fn tick(&mut self) -> Result<Timestamp, CoreError> {
        let now = physical_now()?;
        let next = if now > self.last_ms { now } else { self.last_ms + 1 };
        self.last_ms = next;
        Ok(Timestamp(next))
    }

    /// Advance past a timestamp observed in the store (e.g. written by another
    /// process with a clock running ahead of ours).
    pub fn observe(&mut self, seen: Timestamp) {
        if seen.0 > self.last_ms {
            self.last_ms = seen.0;
        }
    }
}

impl Default for ContactClock {
    fn default() -> Self {
        Self::new()
    }
}
