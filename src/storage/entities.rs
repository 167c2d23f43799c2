use std::{sync::Arc, time::Duration};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::time::local_date;

/// One contiguous start-stop interval of a task, as it is stored on disk.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct SessionEntry {
    pub task_name: Arc<str>,
    pub duration_seconds: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Local day of `start_time`.
    pub date: NaiveDate,
}

impl SessionEntry {
    /// Builds an entry for a finished interval. Intervals shorter than a second are not worth
    /// keeping and yield `None`.
    pub fn from_interval(
        task_name: Arc<str>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        duration: Duration,
    ) -> Option<Self> {
        let duration_seconds = duration.as_secs();
        if duration_seconds == 0 {
            return None;
        }
        Some(Self {
            task_name,
            duration_seconds,
            start_time,
            end_time,
            date: local_date(start_time),
        })
    }

    /// Entries read back from disk that could never have been written by a stop.
    pub fn is_well_formed(&self) -> bool {
        self.duration_seconds > 0 && self.end_time >= self.start_time
    }
}
