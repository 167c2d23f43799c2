pub mod stats;

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::{Parser, Subcommand};
use stats::{process_clear_command, process_stats_command, ClearCommand, StatsCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    overlay::{
        config::{OverlayConfig, DEFAULT_RELEASE_POLLS, DEFAULT_WINDOW_TITLE},
        start_overlay,
    },
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX, OVERLAY_PREFIX},
        runtime::multi_thread_runtime,
    },
};

const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(name = "Stintbar", version, long_about = None)]
#[command(about = "Always on top task timers with a local session log", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Enable trace logging")]
    log: bool,
    #[arg(long, global = true, help = "Also print logs to the console")]
    log_console: bool,
    #[arg(
        long,
        global = true,
        help = "Log level used instead of RUST_LOG, for example debug or warn"
    )]
    log_filter: Option<LevelFilter>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts the overlay with a console to control the timers")]
    Run {
        #[arg(long, default_value_t = DEFAULT_WINDOW_TITLE.to_string(), help = "Title of the overlay window to attach to")]
        title: String,
        #[arg(long, default_value_t = 50, help = "Interval between keyboard polls in milliseconds")]
        poll_ms: u64,
        #[arg(
            long,
            default_value_t = DEFAULT_RELEASE_POLLS,
            help = "Polls a chord has to be released for before it can fire again"
        )]
        release_polls: u32,
    },
    #[command(about = "Prints the time spent per task for the most recent days")]
    Stats {
        #[command(flatten)]
        command: StatsCommand,
    },
    #[command(about = "Deletes every logged session")]
    Clear {
        #[command(flatten)]
        command: ClearCommand,
    },
}

/// Parses the arguments, sets up logging and runs the requested command to completion.
pub fn run_cli() -> Result<()> {
    let args = Args::parse();

    let dir = match args.dir {
        Some(dir) => dir,
        None => create_application_default_path()?,
    };

    let prefix = match args.commands {
        Commands::Run { .. } => OVERLAY_PREFIX,
        _ => CLI_PREFIX,
    };
    let log_level = args
        .log_filter
        .or_else(|| args.log.then_some(LevelFilter::TRACE));
    enable_logging(prefix, &dir, log_level, args.log_console)?;

    let runtime = multi_thread_runtime()?;
    let result = match args.commands {
        Commands::Run {
            title,
            poll_ms,
            release_polls,
        } => {
            let config = OverlayConfig {
                window_title: title,
                poll_interval: Duration::from_millis(poll_ms.max(1)),
                release_polls,
                ..Default::default()
            };
            runtime.block_on(start_overlay(dir, config))
        }
        Commands::Stats { command } => runtime.block_on(process_stats_command(&dir, command)),
        Commands::Clear { command } => runtime.block_on(process_clear_command(&dir, command)),
    };
    // A pending stdin read would otherwise keep the runtime alive after the console quits.
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Args, Commands};

    #[test]
    fn test_parse_run_defaults() {
        let args = Args::try_parse_from(["stintbar", "run"]).unwrap();
        let Commands::Run {
            title,
            poll_ms,
            release_polls,
        } = args.commands
        else {
            panic!("Expected the run command");
        };
        assert_eq!(title, "Stintbar");
        assert_eq!(poll_ms, 50);
        assert_eq!(release_polls, 2);
        assert!(args.dir.is_none());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args =
            Args::try_parse_from(["stintbar", "stats", "--days", "30", "--dir", "/tmp/stints", "--log"])
                .unwrap();
        assert!(matches!(args.commands, Commands::Stats { .. }));
        assert_eq!(args.dir.as_deref(), Some(std::path::Path::new("/tmp/stints")));
        assert!(args.log);
    }

    #[test]
    fn test_rejects_unknown_command() {
        assert!(Args::try_parse_from(["stintbar", "serve"]).is_err());
    }
}
