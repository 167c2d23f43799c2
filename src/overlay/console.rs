//! Line based front end reading commands from standard input.

use std::{fmt::Write, str::FromStr, sync::Arc};

use anyhow::{anyhow, Result};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::watch,
};
use tokio_stream::{wrappers::LinesStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    analysis::report::DEFAULT_REPORT_DAYS,
    storage::session_log::SessionLog,
    tracker::{TaskBoard, TASK_SLOTS},
};

use super::{
    controller::{OverlayView, Visibility},
    status::StatusLine,
};

pub const HELP: &str = "Commands:
  start N | stop N | toggle N | reset N   control task N
  name N TEXT                            rename task N
  show                                   print the overlay
  stats [DAYS]                           print the stats of the last days
  clear [yes]                            delete all logged sessions
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start(usize),
    Stop(usize),
    Toggle(usize),
    Reset(usize),
    Name(usize, String),
    Show,
    Stats(usize),
    Clear { confirmed: bool },
    Help,
    Quit,
}

/// Slots are 1-based for the user.
fn parse_slot(word: Option<&str>) -> Result<usize> {
    let word = word.ok_or_else(|| anyhow!("Missing task number"))?;
    match word.parse::<usize>() {
        Ok(slot @ 1..=TASK_SLOTS) => Ok(slot - 1),
        _ => Err(anyhow!("Task number must be between 1 and {TASK_SLOTS}, got {word:?}")),
    }
}

impl FromStr for ConsoleCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        let mut words = rest.split_whitespace();

        let parsed = match command.to_ascii_lowercase().as_str() {
            "start" => Self::Start(parse_slot(words.next())?),
            "stop" => Self::Stop(parse_slot(words.next())?),
            "toggle" => Self::Toggle(parse_slot(words.next())?),
            "reset" => Self::Reset(parse_slot(words.next())?),
            "name" => {
                let slot = parse_slot(words.next())?;
                let name = rest
                    .split_once(char::is_whitespace)
                    .map(|(_, name)| name.trim())
                    .unwrap_or_default();
                Self::Name(slot, name.to_string())
            }
            "show" | "" => Self::Show,
            "stats" => match words.next() {
                Some(days) => Self::Stats(
                    days.parse()
                        .map_err(|_| anyhow!("Expected a number of days, got {days:?}"))?,
                ),
                None => Self::Stats(DEFAULT_REPORT_DAYS),
            },
            "clear" => Self::Clear {
                confirmed: words.next() == Some("yes"),
            },
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(anyhow!("Unknown command {other:?}, try help")),
        };
        Ok(parsed)
    }
}

pub struct Reply {
    pub text: String,
    pub quit: bool,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quit: false,
        }
    }
}

pub struct Console<L> {
    board: Arc<TaskBoard<L>>,
    view: watch::Receiver<OverlayView>,
    status: watch::Receiver<StatusLine>,
}

impl<L: SessionLog + Send + Sync> Console<L> {
    pub fn new(
        board: Arc<TaskBoard<L>>,
        view: watch::Receiver<OverlayView>,
        status: watch::Receiver<StatusLine>,
    ) -> Self {
        Self {
            board,
            view,
            status,
        }
    }

    /// Renders what the overlay window currently shows.
    pub async fn render(&self) -> Result<String> {
        let view = self.view.borrow().clone();
        let status = self.status.borrow().clone();

        if view.state.visibility == Visibility::Mini {
            return Ok(status.mini);
        }

        let mut text = String::new();
        if let Some(label) = &view.lock_label {
            writeln!(text, "{label}")?;
        }
        for index in 0..TASK_SLOTS {
            let slot = self.board.snapshot(index).await?;
            let marker = if slot.running { '>' } else { ' ' };
            writeln!(text, "{marker} {}. {} {}", index + 1, slot.name, slot.elapsed)?;
        }
        write!(text, "{}", status.status)?;
        Ok(text)
    }

    pub async fn execute(&self, command: ConsoleCommand) -> Result<Reply> {
        let reply = match command {
            ConsoleCommand::Start(index) => {
                self.board.start(index).await?;
                Reply::text(self.render().await?)
            }
            ConsoleCommand::Stop(index) => {
                let logged = self.board.stop(index).await?;
                let mut text = self.render().await?;
                if let Some(entry) = logged {
                    write!(text, "\nLogged {} for {}s", entry.task_name, entry.duration_seconds)?;
                }
                Reply::text(text)
            }
            ConsoleCommand::Toggle(index) => {
                self.board.toggle(index).await?;
                Reply::text(self.render().await?)
            }
            ConsoleCommand::Reset(index) => {
                self.board.reset(index).await?;
                Reply::text(self.render().await?)
            }
            ConsoleCommand::Name(index, name) => {
                self.board.rename(index, &name).await?;
                Reply::text(self.render().await?)
            }
            ConsoleCommand::Show => Reply::text(self.render().await?),
            ConsoleCommand::Stats(days) => {
                Reply::text(self.board.stats_summary(days).await?.to_string())
            }
            ConsoleCommand::Clear { confirmed: false } => Reply::text(
                "This will permanently delete all logged data, type \"clear yes\" to confirm",
            ),
            ConsoleCommand::Clear { confirmed: true } => {
                self.board.clear_history().await?;
                Reply::text("All stats cleared")
            }
            ConsoleCommand::Help => Reply::text(HELP),
            ConsoleCommand::Quit => Reply {
                text: "Bye".to_string(),
                quit: true,
            },
        };
        Ok(reply)
    }

    /// Reads commands from standard input until `quit` or shutdown.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
        println!("{}\n\n{HELP}", self.render().await?);

        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                line = lines.next() => line,
            };
            let Some(line) = line else {
                info!("Standard input closed");
                return Ok(());
            };

            let reply = match line?.parse::<ConsoleCommand>() {
                Ok(command) => self.execute(command).await,
                Err(e) => Err(e),
            };
            match reply {
                Ok(reply) => {
                    println!("{}", reply.text);
                    if reply.quit {
                        return Ok(());
                    }
                }
                Err(e) => {
                    error!("Command failed {e:?}");
                    println!("Error: {e}");
                }
            }
        }
    }
}
