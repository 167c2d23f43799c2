//! The stopwatch side of the overlay. [TaskBoard] owns a fixed number of [timer::TaskTimer]
//! slots and the session log, and is the API front ends drive.

pub mod timer;

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use futures::future::join_all;
use tokio::sync::{watch, Mutex};
use tracing::{error, info};

use crate::{
    analysis::report::StatsReport,
    storage::{entities::SessionEntry, session_log::SessionLog},
    utils::{clock::Clock, time::format_hms},
};

use timer::{FinishedInterval, TaskTimer, Toggled};

pub const TASK_SLOTS: usize = 3;
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Name and elapsed time of a slot, as shown by front ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSnapshot {
    pub name: Arc<str>,
    pub elapsed: String,
    pub running: bool,
}

pub struct TaskBoard<L> {
    timers: Vec<Mutex<TaskTimer>>,
    displays: Vec<watch::Receiver<String>>,
    log: L,
}

impl<L: SessionLog + Send + Sync> TaskBoard<L> {
    pub fn new(log: L, clock: Arc<dyn Clock>, tick_period: Duration) -> Self {
        let timers = (0..TASK_SLOTS)
            .map(|_| TaskTimer::new(clock.clone(), tick_period))
            .collect::<Vec<_>>();
        let displays = timers.iter().map(|v| v.subscribe()).collect();
        Self {
            timers: timers.into_iter().map(Mutex::new).collect(),
            displays,
            log,
        }
    }

    fn slot(&self, index: usize) -> Result<&Mutex<TaskTimer>> {
        self.timers
            .get(index)
            .ok_or_else(|| anyhow!("There is no task {index}, only {TASK_SLOTS} are available"))
    }

    /// Logs the interval if it lasted at least a second. The timer is already final at this
    /// point, so a failing write only loses the record.
    async fn record(&self, interval: Option<FinishedInterval>) -> Result<Option<SessionEntry>> {
        let Some(entry) = interval.and_then(|v| {
            SessionEntry::from_interval(v.task_name, v.start_time, v.end_time, v.duration)
        }) else {
            return Ok(None);
        };

        self.log
            .append(&entry)
            .await
            .inspect_err(|e| error!("Failed to log session {:?}: {e:?}", entry))?;
        info!("Logged session {:?}", entry);
        Ok(Some(entry))
    }

    pub async fn start(&self, index: usize) -> Result<()> {
        self.slot(index)?.lock().await.start().await;
        Ok(())
    }

    /// Stops the task and returns the logged session, if the run was long enough to log.
    pub async fn stop(&self, index: usize) -> Result<Option<SessionEntry>> {
        let interval = self.slot(index)?.lock().await.stop().await;
        self.record(interval).await
    }

    pub async fn toggle(&self, index: usize) -> Result<Option<SessionEntry>> {
        let toggled = self.slot(index)?.lock().await.toggle().await;
        match toggled {
            Toggled::Started => Ok(None),
            Toggled::Stopped(interval) => self.record(Some(interval)).await,
        }
    }

    pub async fn reset(&self, index: usize) -> Result<Option<SessionEntry>> {
        let interval = self.slot(index)?.lock().await.reset().await;
        self.record(interval).await
    }

    pub async fn rename(&self, index: usize, name: &str) -> Result<()> {
        self.slot(index)?.lock().await.rename(name).await;
        Ok(())
    }

    pub async fn elapsed_display(&self, index: usize) -> Result<String> {
        let elapsed = self.slot(index)?.lock().await.elapsed().await;
        Ok(format_hms(elapsed.as_secs()))
    }

    pub async fn snapshot(&self, index: usize) -> Result<SlotSnapshot> {
        let timer = self.slot(index)?.lock().await;
        Ok(SlotSnapshot {
            name: timer.name().await,
            elapsed: format_hms(timer.elapsed().await.as_secs()),
            running: timer.is_running().await,
        })
    }

    /// Receiver of the display the slot's ticker publishes to.
    pub fn subscribe(&self, index: usize) -> Result<watch::Receiver<String>> {
        self.displays
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow!("There is no task {index}, only {TASK_SLOTS} are available"))
    }

    /// Stops every running task. Used on shutdown so open sessions end up in the log.
    pub async fn stop_all(&self) -> Result<Vec<SessionEntry>> {
        let results = join_all((0..TASK_SLOTS).map(|index| self.stop(index))).await;
        let mut entries = vec![];
        for result in results {
            if let Some(entry) = result? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    pub async fn stats_summary(&self, limit_days: usize) -> Result<StatsReport> {
        let sessions = self.log.load_all().await?;
        Ok(StatsReport::from_sessions(&sessions, limit_days))
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.log
            .clear()
            .await
            .inspect_err(|e| error!("Failed to clear history {e:?}"))
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use anyhow::{anyhow, Result};
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use crate::{
        storage::{
            entities::SessionEntry,
            session_log::{SessionLog, SessionLogImpl},
        },
        utils::{clock::TestClock, logging::TEST_LOGGING, time::local_date},
    };

    use super::{TaskBoard, TICK_PERIOD};

    fn clock() -> Arc<TestClock> {
        Arc::new(TestClock::starting_at(
            Utc.with_ymd_and_hms(2025, 3, 15, 9, 0, 0).unwrap(),
        ))
    }

    struct FailingLog;

    impl SessionLog for FailingLog {
        async fn append(&self, _entry: &SessionEntry) -> Result<()> {
            Err(anyhow!("disk full"))
        }

        async fn load_all(&self) -> Result<Vec<SessionEntry>> {
            Ok(vec![])
        }

        async fn clear(&self) -> Result<()> {
            Err(anyhow!("read only"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_writing_for_65_seconds() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let board = TaskBoard::new(SessionLogImpl::in_dir(dir.path())?, clock(), TICK_PERIOD);
        board.rename(0, "Writing").await?;

        board.toggle(0).await?;
        tokio::time::sleep(Duration::from_secs(65)).await;
        let entry = board.toggle(0).await?.expect("Session should be logged");

        assert_eq!(board.elapsed_display(0).await?, "00:01:05");
        assert_eq!(*board.subscribe(0)?.borrow(), "00:01:05");
        assert_eq!(entry.duration_seconds, 65);
        assert_eq!(entry.task_name.as_ref(), "Writing");
        assert_eq!(entry.date, local_date(entry.start_time));

        let report = board.stats_summary(7).await?;
        assert_eq!(report.total_sessions, 1);
        assert_eq!(report.days[0].breakdown.get("Writing"), Some(&65));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_run_not_logged() -> Result<()> {
        let dir = tempdir()?;
        let log = Arc::new(SessionLogImpl::in_dir(dir.path())?);
        let board = TaskBoard::new(log.clone(), clock(), TICK_PERIOD);

        board.start(1).await?;
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(board.stop(1).await?, None);
        assert_eq!(board.reset(1).await?, None);

        assert!(log.load_all().await?.is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_logs_running_session() -> Result<()> {
        let dir = tempdir()?;
        let log = Arc::new(SessionLogImpl::in_dir(dir.path())?);
        let board = TaskBoard::new(log.clone(), clock(), TICK_PERIOD);

        board.start(2).await?;
        tokio::time::sleep(Duration::from_secs(12)).await;
        let entry = board.reset(2).await?.expect("Reset should log the run");

        assert_eq!(entry.task_name.as_ref(), "Unnamed");
        assert_eq!(entry.duration_seconds, 12);
        assert_eq!(board.elapsed_display(2).await?, "00:00:00");
        assert_eq!(log.load_all().await?, vec![entry]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_slots_are_independent() -> Result<()> {
        let dir = tempdir()?;
        let board = TaskBoard::new(SessionLogImpl::in_dir(dir.path())?, clock(), TICK_PERIOD);
        board.rename(0, "A").await?;
        board.rename(1, "B").await?;

        board.start(0).await?;
        board.start(1).await?;
        tokio::time::sleep(Duration::from_secs(30)).await;
        board.stop(0).await?;
        tokio::time::sleep(Duration::from_secs(15)).await;

        let snapshot = board.snapshot(1).await?;
        assert_eq!(snapshot.elapsed, "00:00:45");
        assert!(snapshot.running);
        assert_eq!(board.elapsed_display(0).await?, "00:00:30");

        let stopped = board.stop_all().await?;
        assert_eq!(stopped.len(), 1);

        let report = board.stats_summary(7).await?;
        let day = &report.days[0];
        assert_eq!(day.total_seconds, 75);
        assert_eq!(day.sessions, 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_failure_leaves_timer_stopped() -> Result<()> {
        let board = TaskBoard::new(FailingLog, clock(), TICK_PERIOD);

        board.start(0).await?;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(board.stop(0).await.is_err());
        assert!(!board.snapshot(0).await?.running);
        assert_eq!(board.elapsed_display(0).await?, "00:00:05");
        assert!(board.clear_history().await.is_err());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_history() -> Result<()> {
        let dir = tempdir()?;
        let board = TaskBoard::new(SessionLogImpl::in_dir(dir.path())?, clock(), TICK_PERIOD);
        board.start(0).await?;
        tokio::time::sleep(Duration::from_secs(5)).await;
        board.stop(0).await?;

        board.clear_history().await?;
        board.clear_history().await?;

        assert!(board.stats_summary(7).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_slot() -> Result<()> {
        let dir = tempdir()?;
        let board = TaskBoard::new(SessionLogImpl::in_dir(dir.path())?, clock(), TICK_PERIOD);

        assert!(board.start(3).await.is_err());
        assert!(board.subscribe(7).is_err());
        Ok(())
    }
}
