use std::{sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Local};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    storage::session_log::SessionLog,
    tracker::TaskBoard,
    utils::clock::Clock,
    window_api::{BatteryProbe, BatteryStatus},
};

pub const BATTERY_UNKNOWN: &str = "BAT:??";

/// The two text lines the overlay shows besides the tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusLine {
    /// Battery and clock, shown in normal mode.
    pub status: String,
    /// Everything the mini bar shows.
    pub mini: String,
}

pub fn battery_text(status: &BatteryStatus) -> String {
    if status.charging {
        format!("{}%⚡", status.percent)
    } else {
        format!("{}%", status.percent)
    }
}

pub fn status_text(battery: Option<&str>, now: DateTime<Local>) -> String {
    let time = now.format("%d %b %H:%M");
    match battery {
        Some(battery) => format!("{battery} | {time}"),
        None => time.to_string(),
    }
}

pub fn mini_text(task_name: &str, elapsed: &str, now: DateTime<Local>) -> String {
    format!(
        "[ {task_name} {elapsed} | {} ]",
        now.format("%a, %d %b %Y %H:%M")
    )
}

/// Refreshes the [StatusLine] every period.
pub struct StatusReadout<L> {
    board: Arc<TaskBoard<L>>,
    battery: Option<Box<dyn BatteryProbe>>,
    clock: Arc<dyn Clock>,
    period: Duration,
    shutdown: CancellationToken,
    line: watch::Sender<StatusLine>,
}

impl<L: SessionLog + Send + Sync> StatusReadout<L> {
    pub fn new(
        board: Arc<TaskBoard<L>>,
        battery: Option<Box<dyn BatteryProbe>>,
        clock: Arc<dyn Clock>,
        period: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        let (line, _) = watch::channel(StatusLine::default());
        Self {
            board,
            battery,
            clock,
            period,
            shutdown,
            line,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusLine> {
        self.line.subscribe()
    }

    fn read_battery(&mut self) -> Option<String> {
        let probe = self.battery.as_mut()?;
        match probe.battery() {
            Ok(status) => status.as_ref().map(battery_text),
            Err(e) => {
                warn!("Failed to read the battery {e:?}");
                Some(BATTERY_UNKNOWN.to_string())
            }
        }
    }

    pub async fn refresh(&mut self) -> Result<()> {
        let now = self.clock.local_time();
        let battery = self.read_battery();
        let first = self.board.snapshot(0).await?;

        let line = StatusLine {
            status: status_text(battery.as_deref(), now),
            mini: mini_text(&first.name, &first.elapsed, now),
        };
        debug!("Status {:?}", line);
        self.line.send_replace(line);
        Ok(())
    }

    pub async fn run(mut self) -> Result<()> {
        let mut refresh_point = self.clock.instant();
        loop {
            refresh_point += self.period;
            self.refresh().await?;

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.clock.sleep_until(refresh_point) => ()
            }
        }
    }
}
