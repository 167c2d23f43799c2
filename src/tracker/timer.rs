use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::utils::{clock::Clock, time::format_hms};

pub const UNNAMED_TASK: &str = "Unnamed";
pub const ZERO_DISPLAY: &str = "00:00:00";

/// Moment a running interval began, both as a monotonic point for measuring and as wall time
/// for the session record.
#[derive(Debug, Clone, Copy)]
struct RunningSince {
    instant: Instant,
    time: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct TimerState {
    name: String,
    running_since: Option<RunningSince>,
    accumulated: Duration,
}

impl TimerState {
    fn elapsed(&self, now: Instant) -> Duration {
        match self.running_since {
            Some(since) => self.accumulated + now.saturating_duration_since(since.instant),
            None => self.accumulated,
        }
    }

    fn display_name(&self) -> Arc<str> {
        let name = self.name.trim();
        if name.is_empty() {
            UNNAMED_TASK.into()
        } else {
            name.into()
        }
    }
}

/// Interval finished by a stop. Whether it is worth logging is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedInterval {
    pub task_name: Arc<str>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toggled {
    Started,
    Stopped(FinishedInterval),
}

/// Background task republishing the elapsed time while the timer runs.
struct Ticker {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl Ticker {
    fn spawn(
        state: Arc<Mutex<TimerState>>,
        display: watch::Sender<String>,
        clock: Arc<dyn Clock>,
        period: Duration,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let cancelled = shutdown.clone();
        let handle = tokio::spawn(async move {
            let mut tick_point = clock.instant();
            loop {
                tick_point += period;
                tokio::select! {
                    _ = cancelled.cancelled() => return,
                    _ = clock.sleep_until(tick_point) => ()
                }

                let state = state.lock().await;
                if state.running_since.is_none() {
                    return;
                }
                display.send_replace(format_hms(state.elapsed(clock.instant()).as_secs()));
            }
        });
        Self { shutdown, handle }
    }

    /// Returns once the task is gone, so nothing can be published after this.
    async fn halt(self) {
        self.shutdown.cancel();
        if let Err(e) = self.handle.await {
            if !e.is_cancelled() {
                error!("Ticker ended abnormally {e:?}");
            }
        }
    }
}

/// Stopwatch for a single task. Either idle, or running with exactly one ticker publishing
/// its elapsed time every `tick_period`.
pub struct TaskTimer {
    state: Arc<Mutex<TimerState>>,
    ticker: Option<Ticker>,
    display: watch::Sender<String>,
    clock: Arc<dyn Clock>,
    tick_period: Duration,
}

impl TaskTimer {
    pub fn new(clock: Arc<dyn Clock>, tick_period: Duration) -> Self {
        let (display, _) = watch::channel(ZERO_DISPLAY.to_string());
        Self {
            state: Arc::new(Mutex::new(TimerState::default())),
            ticker: None,
            display,
            clock,
            tick_period,
        }
    }

    /// Receiver of the formatted elapsed time.
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.display.subscribe()
    }

    pub async fn rename(&self, name: &str) {
        self.state.lock().await.name = name.to_string();
    }

    pub async fn name(&self) -> Arc<str> {
        self.state.lock().await.display_name()
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running_since.is_some()
    }

    pub async fn elapsed(&self) -> Duration {
        self.state.lock().await.elapsed(self.clock.instant())
    }

    pub async fn toggle(&mut self) -> Toggled {
        match self.stop().await {
            Some(interval) => Toggled::Stopped(interval),
            None => {
                self.start().await;
                Toggled::Started
            }
        }
    }

    /// Starts measuring. Returns `false` if the timer was already running.
    pub async fn start(&mut self) -> bool {
        {
            let mut state = self.state.lock().await;
            if state.running_since.is_some() {
                return false;
            }
            state.running_since = Some(RunningSince {
                instant: self.clock.instant(),
                time: self.clock.time(),
            });
            debug!("Started {:?}", state.display_name());
        }

        self.ticker = Some(Ticker::spawn(
            self.state.clone(),
            self.display.clone(),
            self.clock.clone(),
            self.tick_period,
        ));
        true
    }

    /// Stops measuring and folds the running interval into the accumulated time. The ticker is
    /// gone by the time this returns. `None` if the timer was idle.
    pub async fn stop(&mut self) -> Option<FinishedInterval> {
        if let Some(ticker) = self.ticker.take() {
            ticker.halt().await;
        }

        let now = self.clock.instant();
        let end_time = self.clock.time();
        let mut state = self.state.lock().await;
        let since = state.running_since.take()?;
        let duration = now.saturating_duration_since(since.instant);
        state.accumulated += duration;
        self.display.send_replace(format_hms(state.accumulated.as_secs()));

        let interval = FinishedInterval {
            task_name: state.display_name(),
            start_time: since.time,
            end_time,
            duration,
        };
        debug!("Stopped {:?}", interval);
        Some(interval)
    }

    /// Stops the timer if needed and zeroes it. Returns the interval the implicit stop
    /// finished, if any.
    pub async fn reset(&mut self) -> Option<FinishedInterval> {
        let interval = self.stop().await;
        let mut state = self.state.lock().await;
        state.accumulated = Duration::ZERO;
        self.display.send_replace(ZERO_DISPLAY.to_string());
        interval
    }
}

impl Drop for TaskTimer {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.shutdown.cancel();
        }
    }
}
