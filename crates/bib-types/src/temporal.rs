use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Current wall-clock time in milliseconds since the UNIX epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Inclusive `[from, to]` range of epoch-ms timestamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: i64,
    pub to: i64,
}

impl TimeWindow {
    /// Build a window, rejecting `from > to`.
    pub fn new(from: i64, to: i64) -> Result<Self, TypeError> {
        if from > to {
            return Err(TypeError::InvertedWindow { from, to });
        }
        Ok(Self { from, to })
    }

    /// Everything from `from` until now.
    pub fn since(from: i64) -> Self {
        Self { from, to: now_ms().max(from) }
    }

    /// Returns `true` if `at` lies within the window, bounds included.
    pub fn contains(&self, at: i64) -> bool {
        at >= self.from && at <= self.to
    }
}
