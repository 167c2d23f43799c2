//! Statistics derived from the session log. Nothing here is persisted, everything is recomputed
//! from the full log whenever it is asked for.

pub mod report;

use std::{collections::BTreeMap, sync::Arc};

use chrono::NaiveDate;

use crate::storage::entities::SessionEntry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskUsage {
    pub task_name: Arc<str>,
    pub seconds: u64,
}

/// Totals for a single local day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub total_seconds: u64,
    pub breakdown: BTreeMap<Arc<str>, u64>,
    pub sessions: usize,
}

impl DailyStats {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            total_seconds: 0,
            breakdown: BTreeMap::new(),
            sessions: 0,
        }
    }

    fn add(&mut self, entry: &SessionEntry) {
        self.total_seconds += entry.duration_seconds;
        *self.breakdown.entry(entry.task_name.clone()).or_default() += entry.duration_seconds;
        self.sessions += 1;
    }

    /// Tasks of the day, longest first. Equal durations keep alphabetical order.
    pub fn tasks_by_duration(&self) -> Vec<TaskUsage> {
        let mut usages = self
            .breakdown
            .iter()
            .map(|(task_name, seconds)| TaskUsage {
                task_name: task_name.clone(),
                seconds: *seconds,
            })
            .collect::<Vec<_>>();
        usages.sort_by(|a, b| b.seconds.cmp(&a.seconds));
        usages
    }
}

/// Groups sessions by their date.
pub fn aggregate<'a>(
    entries: impl IntoIterator<Item = &'a SessionEntry>,
) -> BTreeMap<NaiveDate, DailyStats> {
    let mut days = BTreeMap::<NaiveDate, DailyStats>::new();
    for entry in entries {
        days.entry(entry.date)
            .or_insert_with(|| DailyStats::new(entry.date))
            .add(entry);
    }
    days
}
