use std::fmt::Display;

use crate::{storage::entities::SessionEntry, utils::time::format_hms};

use super::{aggregate, DailyStats};

/// How many days the stats view shows unless asked otherwise.
pub const DEFAULT_REPORT_DAYS: usize = 7;

/// What the stats view renders: the most recent days first, capped to a number of days.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsReport {
    /// Sessions in the whole log, not only the reported days.
    pub total_sessions: usize,
    pub days: Vec<DailyStats>,
}

impl StatsReport {
    pub fn from_sessions(sessions: &[SessionEntry], limit_days: usize) -> Self {
        let days = aggregate(sessions)
            .into_values()
            .rev()
            .take(limit_days)
            .collect();
        Self {
            total_sessions: sessions.len(),
            days,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_sessions == 0
    }
}

impl Display for StatsReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No data yet\n\nStart tracking to see stats\n");
        }

        writeln!(f, "Total Sessions: {}", self.total_sessions)?;
        for day in &self.days {
            writeln!(f)?;
            writeln!(f, "{}", day.date.format("%Y-%m-%d"))?;
            writeln!(
                f,
                "Total: {} ({} sessions)",
                format_hms(day.total_seconds),
                day.sessions
            )?;
            for task in day.tasks_by_duration() {
                writeln!(f, "  {}: {}", task.task_name, format_hms(task.seconds))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::analysis::tests::entry;

    use super::StatsReport;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn test_most_recent_days_only() {
        let entries = (1..=9)
            .map(|d| entry("Writing", day(d), 9, d as u64))
            .collect::<Vec<_>>();

        let report = StatsReport::from_sessions(&entries, 7);

        assert_eq!(report.total_sessions, 9);
        let dates = report.days.iter().map(|v| v.date).collect::<Vec<_>>();
        assert_eq!(dates, (3..=9).rev().map(day).collect::<Vec<_>>());
    }

    #[test]
    fn test_rendering() {
        let entries = [
            entry("Writing", day(15), 9, 65),
            entry("Reading", day(15), 10, 3700),
            entry("Writing", day(14), 9, 30),
        ];

        let report = StatsReport::from_sessions(&entries, 7);

        assert_eq!(
            report.to_string(),
            "Total Sessions: 3\n\
             \n\
             2025-03-15\n\
             Total: 01:02:45 (2 sessions)\n  \
             Reading: 01:01:40\n  \
             Writing: 00:01:05\n\
             \n\
             2025-03-14\n\
             Total: 00:00:30 (1 sessions)\n  \
             Writing: 00:00:30\n"
        );
    }

    #[test]
    fn test_empty_rendering() {
        let report = StatsReport::from_sessions(&[], 7);

        assert!(report.is_empty());
        assert!(report.to_string().starts_with("No data yet"));
    }
}
