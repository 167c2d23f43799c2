//! Wires the overlay together: an [input::InputWatcher] polls the chords and feeds the
//! [controller::OverlayController], a [status::StatusReadout] keeps the status line fresh and a
//! front end drives the [TaskBoard].

use std::{future::Future, path::PathBuf, sync::Arc};

use anyhow::Result;
use config::OverlayConfig;
use console::Console;
use controller::{OverlayController, OverlayView};
use input::{InputSample, InputWatcher};
use status::{StatusLine, StatusReadout};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    storage::{
        entities::SessionEntry,
        session_log::{SessionLog, SessionLogImpl},
    },
    tracker::{TaskBoard, TICK_PERIOD},
    utils::clock::{Clock, DefaultClock},
    window_api::{self, PlatformHandles},
};

pub mod config;
pub mod console;
pub mod controller;
pub mod input;
pub mod shutdown;
pub mod status;

const INPUT_CHANNEL_SIZE: usize = 10;

pub struct Overlay<L> {
    board: Arc<TaskBoard<L>>,
    watcher: InputWatcher,
    controller: OverlayController,
    samples: mpsc::Receiver<InputSample>,
    status: StatusReadout<L>,
    shutdown: CancellationToken,
}

/// Cancels the shutdown token once `work` is over, so one worker ending ends the others.
async fn until_done(
    shutdown: &CancellationToken,
    work: impl Future<Output = Result<()>>,
) -> Result<()> {
    let result = work.await;
    shutdown.cancel();
    result
}

impl<L: SessionLog + Send + Sync> Overlay<L> {
    pub fn new(
        log: L,
        config: &OverlayConfig,
        platform: PlatformHandles,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let board = Arc::new(TaskBoard::new(log, clock.clone(), TICK_PERIOD));
        let (sender, samples) = mpsc::channel(INPUT_CHANNEL_SIZE);

        let watcher = InputWatcher::new(
            sender,
            platform.input,
            shutdown.clone(),
            config.lock_chord.clone(),
            config.mini_chord.clone(),
            config.release_polls,
            config.poll_interval,
            clock.clone(),
        );
        let controller =
            OverlayController::new(platform.surface, config.layout, &config.lock_chord);
        let status = StatusReadout::new(
            board.clone(),
            platform.battery,
            clock,
            config.status_period,
            shutdown.clone(),
        );

        Self {
            board,
            watcher,
            controller,
            samples,
            status,
            shutdown,
        }
    }

    pub fn board(&self) -> Arc<TaskBoard<L>> {
        self.board.clone()
    }

    pub fn view(&self) -> watch::Receiver<OverlayView> {
        self.controller.subscribe()
    }

    pub fn status(&self) -> watch::Receiver<StatusLine> {
        self.status.subscribe()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn console(&self) -> Console<L> {
        Console::new(self.board(), self.view(), self.status())
    }

    /// Runs every worker next to `front_end` until one of them finishes or Ctrl+C arrives,
    /// then stops all running tasks. Returns the sessions that stop logged.
    pub async fn run(self, front_end: impl Future<Output = Result<()>>) -> Result<Vec<SessionEntry>> {
        let Self {
            board,
            watcher,
            controller,
            samples,
            status,
            shutdown,
        } = self;

        let (_, watcher_result, controller_result, status_result, front_end_result) = tokio::join!(
            shutdown::detect_shutdown(shutdown.clone()),
            until_done(&shutdown, watcher.run()),
            until_done(&shutdown, controller.run(samples)),
            until_done(&shutdown, status.run()),
            until_done(&shutdown, front_end),
        );

        if let Err(e) = watcher_result {
            error!("Input watcher got an error {:?}", e);
        }
        if let Err(e) = controller_result {
            error!("Overlay controller got an error {:?}", e);
        }
        if let Err(e) = status_result {
            error!("Status readout got an error {:?}", e);
        }

        let finished = board
            .stop_all()
            .await
            .inspect_err(|e| error!("Failed to finalize running tasks {e:?}"))?;
        info!("Finalized {} running sessions", finished.len());

        front_end_result?;
        Ok(finished)
    }
}

/// Represents the starting point for the overlay
pub async fn start_overlay(dir: PathBuf, config: OverlayConfig) -> Result<()> {
    let platform = window_api::connect(&config.window_title).unwrap_or_else(|e| {
        warn!("Failed to connect to the window system, running headless {e:?}");
        PlatformHandles::headless()
    });
    let log = SessionLogImpl::in_dir(&dir)?;
    info!("Logging sessions to {:?}", log.path());

    let overlay = Overlay::new(log, &config, platform, Arc::new(DefaultClock));
    let console = overlay.console();
    let shutdown = overlay.shutdown_token();
    overlay.run(console.run(shutdown)).await?;
    Ok(())
}
