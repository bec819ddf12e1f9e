//! tagreport - per-tag engagement report for Stack Overflow for Teams
//!
//! Harvests questions, answers, articles, users and tags from the platform
//! API (optionally webhook and watcher counts from admin pages), saves them
//! as a snapshot, aggregates per-tag metrics and writes a dated CSV report.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Snapshot: $XDG_DATA_HOME/tagreport/snapshot.json (~/.local/share/tagreport/snapshot.json)
//! - Config: $XDG_CONFIG_HOME/tagreport/config.toml (~/.config/tagreport/config.toml)
//! - Logs: $XDG_STATE_HOME/tagreport/tagreport.log (~/.local/state/tagreport/tagreport.log)

mod run_lock;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tagreport_core::analytics::{aggregate, Aggregation, TagMetrics, TimeWindow};
use tagreport_core::api::{CancelToken, Edition, HarvestStats, SyncHarvester};
use tagreport_core::format::{format_date, format_relative_time};
use tagreport_core::scrape::{SupplementarySource, WebScraper};
use tagreport_core::{report, Config, LoadedSnapshot, Snapshot};

use crate::run_lock::acquire_harvest_guard;

/// Notices printed without --verbose
const NOTICE_PREVIEW: usize = 10;

#[derive(Parser)]
#[command(name = "tagreport")]
#[command(about = "Per-tag engagement report for Stack Overflow for Teams")]
#[command(version)]
struct Args {
    /// Instance URL, e.g. https://stackoverflowteams.com/c/TEAM-NAME or https://SUBDOMAIN.stackenterprise.co
    #[arg(long, conflicts_with = "no_api")]
    url: Option<String>,

    /// API access token
    #[arg(long, conflicts_with = "no_api")]
    token: Option<String>,

    /// API key (Enterprise only)
    #[arg(long, conflicts_with = "no_api")]
    key: Option<String>,

    /// Build the report from the saved snapshot instead of calling the API
    #[arg(long)]
    no_api: bool,

    /// Snapshot file to write (or read with --no-api)
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Only count posts created within the past N days (default: all history)
    #[arg(long, allow_negative_numbers = true)]
    days: Option<i64>,

    /// Also scrape webhook and watcher counts using a logged-in browser session
    #[arg(long, conflicts_with = "no_api")]
    scraper: bool,

    /// Cookie header value from a logged-in browser session (for --scraper)
    #[arg(long)]
    session_cookie: Option<String>,

    /// Directory for the CSV report (default: current directory)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Reject a bad window before touching the network or the disk
    let now = Utc::now();
    let window = match args.days {
        Some(days) => TimeWindow::past_days(days, now).context("invalid --days value")?,
        None => TimeWindow::all_time(),
    };

    Config::ensure_xdg_env();
    let mut config = Config::load().context("failed to load configuration")?;

    let _log_guard =
        tagreport_core::logging::init(&config.logging).context("failed to initialize logging")?;
    tracing::info!(window = %window.display_name(), no_api = args.no_api, "tagreport starting");
    if args.verbose {
        println!("Log file: {}", tagreport_core::logging::log_file_path().display());
    }

    let cancel = CancelToken::new();
    let handle = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nCancelling...");
        handle.cancel();
    })
    .context("failed to set Ctrl+C handler")?;

    let snapshot_path = args.snapshot.clone().unwrap_or_else(Config::snapshot_path);

    let loaded = if args.no_api {
        let loaded = Snapshot::load(&snapshot_path).context("failed to load snapshot")?;
        let age = loaded
            .snapshot
            .harvested_at
            .map(|ts| format!(" (harvested {})", format_relative_time(ts, now)))
            .unwrap_or_default();
        println!("Using snapshot {}{}", snapshot_path.display(), age);
        loaded
    } else {
        apply_overrides(&mut config, &args);
        harvest(&config, &snapshot_path, cancel.clone(), args.verbose)?
    };

    let aggregation = aggregate(&loaded.snapshot, &window);

    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| config.output.report_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let path = write_report_unless_cancelled(
        &cancel,
        &output_dir,
        &aggregation.rows,
        window.days(),
        now.date_naive(),
    )?;

    print_summary(&loaded, &aggregation, &window, &path, args.verbose);

    tracing::info!(
        path = %path.display(),
        tags = aggregation.rows.len(),
        "tagreport complete"
    );
    Ok(())
}

/// Command-line values win over the config file.
fn apply_overrides(config: &mut Config, args: &Args) {
    if args.url.is_some() {
        config.api.base_url = args.url.clone();
    }
    if args.token.is_some() {
        config.api.token = args.token.clone();
    }
    if args.key.is_some() {
        config.api.key = args.key.clone();
    }
    if args.scraper {
        config.scraper.enabled = true;
    }
    if args.session_cookie.is_some() {
        config.scraper.session_cookie = args.session_cookie.clone();
    }
}

/// Harvest a fresh snapshot, showing progress on a spinner.
fn harvest(
    config: &Config,
    snapshot_path: &Path,
    cancel: CancelToken,
    verbose: bool,
) -> Result<LoadedSnapshot> {
    let supplementary = if config.scraper.enabled {
        let url = config
            .api
            .base_url
            .as_deref()
            .context("--scraper requires --url")?;
        let cookie = config
            .scraper
            .session_cookie
            .as_deref()
            .context("--scraper requires --session-cookie")?;
        let scraper = WebScraper::new(url, cookie, config.api.timeout_secs, cancel.clone())
            .context("failed to set up scraper")?;
        SupplementarySource::Scraper(scraper)
    } else {
        SupplementarySource::None
    };

    let scraping = supplementary.is_enabled();
    let harvester = SyncHarvester::new(&config.api, supplementary, cancel)
        .context("failed to set up API harvester")?;
    let edition = match harvester.edition() {
        Edition::Business { team_slug } => {
            format!("Stack Overflow for Teams Business ({})", team_slug)
        }
        Edition::Enterprise => "Stack Overflow Enterprise".to_string(),
    };
    println!(
        "Harvesting from {}{}",
        edition,
        if scraping { " with web scraping" } else { "" }
    );
    let _guard = acquire_harvest_guard(snapshot_path).context("failed to acquire harvest lock")?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("Connecting...");

    let result = harvester.run(snapshot_path, &mut |resource, fetched| {
        pb.set_message(format!("{}: {} fetched", resource, fetched));
    });
    pb.finish_and_clear();
    let outcome = result.context("harvest failed")?;

    print_harvest_stats(&outcome.stats, verbose);
    println!("Snapshot saved to {}", snapshot_path.display());

    Ok(LoadedSnapshot {
        snapshot: outcome.snapshot,
        skipped_records: outcome.stats.skipped_records,
    })
}

/// A Ctrl+C after the harvest still stops the run before anything lands on disk.
fn write_report_unless_cancelled(
    cancel: &CancelToken,
    output_dir: &Path,
    rows: &[TagMetrics],
    days: Option<i64>,
    today: NaiveDate,
) -> Result<PathBuf> {
    cancel
        .check()
        .context("run cancelled before the report was written")?;
    report::write_report(output_dir, rows, days, today).context("failed to write report")
}

fn print_harvest_stats(stats: &HarvestStats, verbose: bool) {
    println!(
        "Harvested {} questions, {} answers, {} articles, {} tags",
        stats.questions, stats.answers, stats.articles, stats.tags
    );
    if verbose {
        println!("  Users:              {}", stats.users);
        println!("  SME lookups:        {}", stats.sme_lookups);
        println!("  Malformed items:    {}", stats.skipped_records);
    }
}

fn print_summary(
    loaded: &LoadedSnapshot,
    aggregation: &Aggregation,
    window: &TimeWindow,
    path: &Path,
    verbose: bool,
) {
    let skipped = loaded.skipped_records + aggregation.skipped_records;

    println!();
    println!("Tag report ({})", window.display_name());
    println!("==================");
    if let Some(cutoff) = window.cutoff() {
        println!("Since:              {}", format_date(cutoff));
    }
    println!("Tags:               {}", aggregation.rows.len());
    println!("Records processed:  {}", aggregation.records_processed);
    println!("Records skipped:    {}", skipped);

    if !aggregation.notices.is_empty() {
        println!();
        println!("Warnings:");
        let shown = if verbose {
            aggregation.notices.len()
        } else {
            NOTICE_PREVIEW
        };
        for notice in aggregation.notices.iter().take(shown) {
            println!("  - {}", notice);
        }
        if aggregation.notices.len() > shown {
            println!(
                "  ... and {} more (use --verbose to see all)",
                aggregation.notices.len() - shown
            );
        }
    }

    println!();
    println!("Report written to {}", path.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn report_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()
    }

    #[test]
    fn test_cancelled_run_writes_no_report() {
        let dir = TempDir::new().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let rows = vec![TagMetrics {
            tag_name: "python".to_string(),
            ..Default::default()
        }];
        let err = write_report_unless_cancelled(&cancel, dir.path(), &rows, None, report_day())
            .unwrap_err();

        assert!(err.to_string().contains("cancelled"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_uncancelled_run_writes_report() {
        let dir = TempDir::new().unwrap();
        let rows = vec![TagMetrics {
            tag_name: "python".to_string(),
            ..Default::default()
        }];

        let path =
            write_report_unless_cancelled(&CancelToken::new(), dir.path(), &rows, Some(7), report_day())
                .unwrap();

        assert!(path.exists());
        assert!(path.ends_with("2024-03-02_tag_metrics_past_7_days.csv"));
    }
}
