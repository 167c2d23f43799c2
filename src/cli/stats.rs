use std::{
    fmt::Write as _,
    io::{self, BufRead, Write},
    path::Path,
};

use ansi_term::{Colour, Style};
use anyhow::Result;
use clap::Parser;
use tracing::info;

use crate::{
    analysis::report::{StatsReport, DEFAULT_REPORT_DAYS},
    storage::session_log::{SessionLog, SessionLogImpl},
    utils::time::format_hms,
};

#[derive(Debug, Parser)]
pub struct StatsCommand {
    #[arg(long, short, default_value_t = DEFAULT_REPORT_DAYS, help = "Number of most recent days to show")]
    days: usize,
    #[arg(long, help = "Print without colors")]
    plain: bool,
}

#[derive(Debug, Parser)]
pub struct ClearCommand {
    #[arg(long, short, help = "Don't ask for confirmation")]
    yes: bool,
}

/// Renders the report with dates and totals highlighted. Same layout as [StatsReport]'s
/// `Display`.
pub fn render_colored(report: &StatsReport) -> Result<String> {
    if report.is_empty() {
        return Ok(Style::new().dimmed().paint(report.to_string()).to_string());
    }

    let mut text = String::new();
    writeln!(
        text,
        "{}",
        Style::new()
            .bold()
            .paint(format!("Total Sessions: {}", report.total_sessions))
    )?;
    for day in &report.days {
        writeln!(text)?;
        writeln!(
            text,
            "{}",
            Colour::Yellow.bold().paint(day.date.format("%Y-%m-%d").to_string())
        )?;
        writeln!(
            text,
            "Total: {} ({} sessions)",
            Colour::Green.paint(format_hms(day.total_seconds)),
            day.sessions
        )?;
        for task in day.tasks_by_duration() {
            writeln!(
                text,
                "  {}: {}",
                Colour::Cyan.paint(task.task_name.as_ref()),
                format_hms(task.seconds)
            )?;
        }
    }
    Ok(text)
}

/// Prints the stats of the log in `dir`.
pub async fn process_stats_command(dir: &Path, StatsCommand { days, plain }: StatsCommand) -> Result<()> {
    let log = SessionLogImpl::in_dir(dir)?;
    let sessions = log.load_all().await?;
    let report = StatsReport::from_sessions(&sessions, days);

    if plain {
        print!("{report}");
    } else {
        print!("{}", render_colored(&report)?);
    }
    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Deletes every logged session of the log in `dir`.
pub async fn process_clear_command(dir: &Path, ClearCommand { yes }: ClearCommand) -> Result<()> {
    let log = SessionLogImpl::in_dir(dir)?;
    if !yes && !confirm("This will permanently delete all logged data. Continue?")? {
        println!("Nothing was deleted");
        return Ok(());
    }

    log.clear().await?;
    info!("Cleared {:?}", log.path());
    println!("All stats cleared");
    Ok(())
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use crate::{
        analysis::{report::StatsReport, tests::entry},
        storage::session_log::{SessionLog, SessionLogImpl},
    };

    use super::{process_clear_command, render_colored, ClearCommand};

    fn strip_ansi(text: &str) -> String {
        let mut plain = String::new();
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            if c == '\u{1b}' {
                for c in chars.by_ref() {
                    if c == 'm' {
                        break;
                    }
                }
            } else {
                plain.push(c);
            }
        }
        plain
    }

    #[test]
    fn test_colored_matches_plain_layout() -> Result<()> {
        let date = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        let sessions = vec![entry("A", date, 9, 30), entry("B", date, 10, 45)];
        let report = StatsReport::from_sessions(&sessions, 7);

        let colored = render_colored(&report)?;
        assert_ne!(colored, report.to_string());
        assert_eq!(strip_ansi(&colored), report.to_string());

        let empty = StatsReport::from_sessions(&[], 7);
        assert_eq!(strip_ansi(&render_colored(&empty)?), empty.to_string());
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_with_yes() -> Result<()> {
        let dir = tempdir()?;
        let log = SessionLogImpl::in_dir(dir.path())?;
        let date = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        log.append(&entry("A", date, 9, 30)).await?;

        process_clear_command(dir.path(), ClearCommand { yes: true }).await?;

        assert!(log.load_all().await?.is_empty());
        Ok(())
    }
}
