//! actlock: Pin GitHub Actions workflow references to immutable commit SHAs.
//!
//! This tool scans `.github/workflows` for `uses:` references, resolves each
//! tag or branch to the commit it currently denotes, and rewrites the line to
//! `owner/repo@<sha> #<ref>`. The `update` command moves references to the
//! newest release instead.

mod cli;

use actlock::cache::{self, ClearOutcome, ResponseCache};
use actlock::github::{ClientConfig, HttpClient, RateLimit};
use actlock::scanner::{self, DEFAULT_WORKFLOW_DIR};
use actlock::walker::{CommentStyle, Mode};
use actlock::workflow::{self, FileReport, Options, SiteReport};
use anyhow::{Context, Result};
use clap::Parser;
use cli::{Args, ClientArgs, Commands, RunArgs};
use colored::Colorize;
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable that turns on debug logging without `-v`.
const DEBUG_ENV: &str = "ACTLOCK_DEBUG";

/// A workflow file that could not be processed.
#[derive(Debug, Serialize)]
struct FileFailure {
    path: PathBuf,
    error: String,
}

/// Result of a `pin` or `update` run.
#[derive(Debug, Serialize)]
struct RunSummary {
    mode: Mode,
    dry_run: bool,
    files: Vec<FileReport>,
    failed: Vec<FileFailure>,
    rate_limit: Option<RateLimit>,
}

impl RunSummary {
    fn total_edits(&self) -> usize {
        self.files.iter().map(|f| f.edits).sum()
    }
}

/// `uses:` sites found in one file by `scan`.
#[derive(Debug, Serialize)]
struct ScanEntry {
    path: PathBuf,
    sites: Vec<SiteReport>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Commands::Pin(run) => cmd_run(Mode::Pin, run),
        Commands::Update(run) => cmd_run(Mode::Update, run),
        Commands::Scan {
            paths,
            exclude,
            json,
        } => cmd_scan(paths, &exclude, json),
        Commands::Clear { force } => cmd_clear(force),
        Commands::RateLimit { client } => cmd_rate_limit(&client),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 if debug_from_env() => "debug",
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("actlock={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .init();

    debug!("actlock started with verbosity level: {}", verbose);
}

fn debug_from_env() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|v| !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false"))
        .unwrap_or(false)
}

fn cmd_run(mode: Mode, run: RunArgs) -> Result<()> {
    let files = collect(run.paths, &run.exclude)?;
    if files.is_empty() {
        println!("{} No workflow files found", "info:".blue().bold());
        return Ok(());
    }

    let client = build_client(&run.client)?;
    log_rate_limit(&client);

    let options = Options {
        mode,
        dry_run: run.dry_run,
        style: CommentStyle {
            spaces: run.comment_spaces,
        },
    };

    let mut reports = Vec::new();
    let mut failed = Vec::new();

    for file in &files {
        let result = scanner::validate_workflow_path(file)
            .and_then(|()| workflow::process_file(&client, file, &options));
        match result {
            Ok(report) => {
                if !run.json {
                    print_file_report(&report, &options);
                }
                reports.push(report);
            }
            Err(err) => {
                if !run.json {
                    eprintln!("{} {:#}", "error:".red().bold(), err);
                }
                failed.push(FileFailure {
                    path: file.clone(),
                    error: format!("{err:#}"),
                });
            }
        }
    }

    let summary = RunSummary {
        mode,
        dry_run: run.dry_run,
        files: reports,
        failed,
        rate_limit: client.last_rate_limit(),
    };

    if run.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_run_summary(&summary);
    }

    if let Some(rate) = summary.rate_limit {
        info!(
            remaining = rate.remaining,
            limit = rate.limit,
            reset = %rate.reset_local(),
            "rate limit after run"
        );
        if rate.remaining == 0 {
            warn!(reset = %rate.reset_local(), "GitHub API rate limit exhausted");
        }
    }

    if !summary.failed.is_empty() {
        anyhow::bail!(
            "{} of {} workflow file(s) failed",
            summary.failed.len(),
            files.len()
        );
    }
    Ok(())
}

fn cmd_scan(paths: Vec<PathBuf>, exclude: &[String], json_output: bool) -> Result<()> {
    let files = collect(paths, exclude)?;

    let mut entries = Vec::new();
    for file in files {
        scanner::validate_workflow_path(&file)?;
        let sites = workflow::audit_file(&file)?;
        entries.push(ScanEntry { path: file, sites });
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        print_scan(&entries);
    }
    Ok(())
}

fn cmd_clear(force: bool) -> Result<()> {
    let dir = ResponseCache::default_dir().context("Could not determine the user cache directory")?;

    if !dir.exists() {
        println!("{} No cache at {}", "info:".blue().bold(), dir.display());
        return Ok(());
    }

    if !force {
        if !std::io::stdin().is_terminal() {
            anyhow::bail!(
                "Refusing to delete {} without --force in a non-interactive session",
                dir.display()
            );
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!("Delete response cache at {}?", dir.display()))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("{} Cache left in place", "info:".blue().bold());
            return Ok(());
        }
    }

    match cache::clear(&dir)? {
        ClearOutcome::Removed => println!("{} Cleared {}", "ok:".green().bold(), dir.display()),
        ClearOutcome::Missing => println!("{} No cache at {}", "info:".blue().bold(), dir.display()),
    }
    Ok(())
}

fn cmd_rate_limit(args: &ClientArgs) -> Result<()> {
    let client = build_client(args)?;
    let rate = client
        .rate_limit()
        .context("Failed to query the GitHub rate limit")?;

    let remaining = format!("{}/{}", rate.remaining, rate.limit);
    let remaining = if rate.remaining == 0 {
        remaining.red().bold()
    } else {
        remaining.green()
    };
    println!("{} {} requests remaining", "Core:".bold(), remaining);
    println!("      resets at {}", rate.reset_local());
    if let Some(tier) = rate.tier() {
        println!("      {}", format!("({tier})").dimmed());
    }
    Ok(())
}

fn collect(paths: Vec<PathBuf>, exclude: &[String]) -> Result<Vec<PathBuf>> {
    let paths = if paths.is_empty() {
        vec![PathBuf::from(DEFAULT_WORKFLOW_DIR)]
    } else {
        paths
    };
    let exclude = exclude
        .iter()
        .map(|p| glob::Pattern::new(p).with_context(|| format!("Invalid exclude pattern '{p}'")))
        .collect::<Result<Vec<_>>>()?;

    let files = scanner::collect_workflow_files(&paths, &exclude)?;
    debug!("found {} workflow files", files.len());
    Ok(files)
}

fn build_client(args: &ClientArgs) -> Result<HttpClient> {
    let config = ClientConfig {
        base_url: args.api_url.clone(),
        token: args.token.clone(),
        timeout: Duration::from_secs(args.timeout),
        cache_dir: if args.no_cache {
            None
        } else {
            ResponseCache::default_dir()
        },
    };
    let client = HttpClient::new(config).context("Failed to create GitHub client")?;

    if !client.is_authenticated() {
        warn!("GITHUB_TOKEN is not set, using unauthenticated API access (60 requests per hour)");
    }
    Ok(client)
}

fn log_rate_limit(client: &HttpClient) {
    match client.rate_limit() {
        Ok(rate) => {
            info!(
                remaining = rate.remaining,
                limit = rate.limit,
                reset = %rate.reset_local(),
                tier = rate.tier().unwrap_or("custom"),
                "GitHub API rate limit"
            );
            if rate.remaining == 0 {
                warn!(reset = %rate.reset_local(), "GitHub API rate limit exhausted, lookups will fail");
            }
        }
        Err(err) => debug!(error = %err, "could not query rate limit"),
    }
}

fn print_file_report(report: &FileReport, options: &Options) {
    let path = report.path.display();

    if report.empty {
        println!("{} {} {}", "info:".blue().bold(), path, "(empty, skipped)".dimmed());
    } else if report.edits == 0 {
        let state = match options.mode {
            Mode::Pin => "all references pinned",
            Mode::Update => "all references current",
        };
        println!("{} {} {}", "ok:".green().bold(), path, state.dimmed());
    } else if options.dry_run {
        println!(
            "{} {} ({} reference(s))",
            "Would update:".yellow().bold(),
            path,
            report.edits
        );
    } else if report.written {
        println!(
            "{} {} ({} reference(s))",
            "Updated:".green().bold(),
            path,
            report.edits
        );
    } else {
        println!(
            "{} {}: {} edit(s) did not match the file text and were not applied",
            "warn:".yellow().bold(),
            path,
            report.edits
        );
    }
}

fn print_run_summary(summary: &RunSummary) {
    let verb = match (summary.mode, summary.dry_run) {
        (Mode::Pin, false) => "Pinned",
        (Mode::Pin, true) => "Would pin",
        (Mode::Update, false) => "Updated",
        (Mode::Update, true) => "Would update",
    };
    let total = summary.total_edits();
    let prefix = if summary.failed.is_empty() {
        "ok:".green().bold()
    } else {
        "warn:".yellow().bold()
    };

    println!();
    println!(
        "{} {} {} reference(s) across {} file(s)",
        prefix,
        verb,
        total,
        summary.files.len()
    );
    if !summary.failed.is_empty() {
        println!("      {} file(s) failed", summary.failed.len());
    }
    if let Some(rate) = summary.rate_limit {
        println!(
            "      {}",
            format!(
                "API rate limit: {}/{} remaining, resets at {}",
                rate.remaining,
                rate.limit,
                rate.reset_local()
            )
            .dimmed()
        );
    }
    if summary.dry_run && total > 0 {
        println!("\n{} Run without --dry-run to write changes", "hint:".cyan().bold());
    }
}

fn print_scan(entries: &[ScanEntry]) {
    let mut pinned = 0;
    let mut unpinned = 0;

    for entry in entries {
        println!("{}", entry.path.display().to_string().bold());
        if entry.sites.is_empty() {
            println!("  {}", "no uses: references".dimmed());
        }
        for site in &entry.sites {
            let status = site_status(site);
            match site.kind {
                kind if is_remote(kind) && site.pinned => pinned += 1,
                kind if is_remote(kind) => unpinned += 1,
                _ => {}
            }
            println!("  {:>4}  {}  {}", site.line.to_string().dimmed(), site.uses, status);
        }
    }

    println!();
    let prefix = if unpinned == 0 {
        "ok:".green().bold()
    } else {
        "warn:".yellow().bold()
    };
    println!(
        "{} {} pinned, {} unpinned across {} file(s)",
        prefix,
        pinned,
        unpinned,
        entries.len()
    );
}

fn is_remote(kind: actlock::ReferenceKind) -> bool {
    matches!(
        kind,
        actlock::ReferenceKind::GitHubAction | actlock::ReferenceKind::ReusableWorkflow
    )
}

fn site_status(site: &SiteReport) -> colored::ColoredString {
    match site.kind {
        actlock::ReferenceKind::Malformed => "(unparsable)".red(),
        kind if !is_remote(kind) => format!("({})", kind.as_str()).dimmed(),
        _ if site.pinned => "pinned".green(),
        _ => format!("unpinned ({})", site.shape).yellow(),
    }
}
