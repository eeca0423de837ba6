mod catalog;
mod config;
mod error;
mod logging;
mod probe;
mod rank;
mod rewrite;
mod select;
mod sources;
mod traits;
mod types;
mod utils;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use probe::TcpProber;
use rank::Filter;
use select::{Outcome, Selection};
use sources::{
    launchpad::{LaunchpadFeed, MirrorPageLookup},
    mirrorlist::MirrorListFeed,
};
use std::path::PathBuf;
use traits::ReleaseStatus;
use tokio::io::{AsyncBufReadExt, BufReader};
use types::{Mirror, MirrorReport, Status};

#[derive(Parser)]
#[command(name = "mirrorpick")]
#[command(about = "Pick the fastest up-to-date Ubuntu archive mirror and rewrite sources.list", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct SelectArgs {
    /// Number of top mirrors to keep
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    top: u16,

    /// Least current status a mirror may have
    #[arg(short, long, value_enum, default_value_t = Status::UpToDate, conflicts_with = "ping_only")]
    min_status: Status,

    /// Rank by latency only, ignoring status
    #[arg(short, long)]
    ping_only: bool,

    /// Use the mirror list of a country (ISO code, e.g. DE) instead of the geo-located one
    #[arg(short = 'C', long)]
    country: Option<String>,

    /// Judge status by this release's row on each mirror page (e.g. noble)
    #[arg(short, long, conflicts_with = "ping_only")]
    release: Option<String>,

    /// Architecture used with --release
    #[arg(short, long, default_value = "amd64")]
    arch: String,
}

impl SelectArgs {
    fn filter(&self) -> Filter {
        if self.ping_only {
            Filter::PingOnly
        } else {
            Filter::MinStatus(self.min_status)
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Benchmark mirrors and print the ranking (e.g., mirrorpick test -t 5)
    Test {
        #[command(flatten)]
        select: SelectArgs,

        /// Print the ranking as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rewrite sources.list to use the best mirror (e.g., mirrorpick use --choose -t 3)
    Use {
        #[command(flatten)]
        select: SelectArgs,

        /// Choose interactively among the top mirrors
        #[arg(short, long)]
        choose: bool,

        /// sources.list to read (default: /etc/apt/sources.list)
        #[arg(long)]
        sources: Option<PathBuf>,

        /// Where to write the new file (default: ./sources.list)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Restore the output file from its latest backup
    Restore {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Commands::Test { select, json } => handle_test(&select, json).await?,
        Commands::Use {
            select,
            choose,
            sources,
            output,
        } => handle_use(&select, choose, sources, output).await?,
        Commands::Restore { output } => handle_restore(output).await?,
    }

    Ok(())
}

// --- Handlers ---

async fn run_selection(args: &SelectArgs) -> Result<Outcome> {
    let settings = config::settings();
    let client = sources::http_client()?;

    let list_url = match args.country {
        Some(ref cc) => settings.country_list_url(cc),
        None => settings.mirror_list_url.clone(),
    };
    let urls = MirrorListFeed::new(client.clone(), list_url);
    let lookup = args
        .release
        .as_deref()
        .map(|release| MirrorPageLookup::new(client.clone(), release, &args.arch));
    let metadata = LaunchpadFeed::new(client, settings.launchpad_url.clone());
    let prober = TcpProber::new(settings.probe_timeout());

    let selection = Selection {
        filter: args.filter(),
        top: args.top as usize,
        concurrency: settings.concurrency,
    };

    let release = lookup.as_ref().map(|l| l as &dyn ReleaseStatus);
    let outcome = select::run(&urls, &metadata, &prober, release, selection).await?;
    println!(); // Newline after progress bar

    if outcome.filter != selection.filter {
        eprintln!("Note: mirror status unavailable, ranking by latency only.");
    }
    if outcome.ranked.is_empty() {
        match outcome.filter {
            Filter::PingOnly => bail!(
                "None of the {} mirrors responded. Please check your network connection.",
                outcome.tested
            ),
            Filter::MinStatus(min) => bail!(
                "No mirrors matched status '{}' ({} of {} reachable). Try --min-status or --ping-only.",
                min,
                outcome.reachable,
                outcome.tested
            ),
        }
    }
    Ok(outcome)
}

fn print_table(ranked: &[Mirror]) {
    println!(
        "{:<4} {:<9} {:<16} {:<10} {:<24} URL",
        "RANK", "LATENCY", "STATUS", "SPEED", "ORGANIZATION"
    );
    println!("{}", "-".repeat(100));

    for (i, mirror) in ranked.iter().enumerate() {
        let latency = mirror
            .latency_ms()
            .map(|ms| format!("{}ms", ms))
            .unwrap_or_else(|| "Timeout".to_string());

        // Truncate organization if too long
        let mut org = mirror.organization.clone();
        if org.chars().count() > 23 {
            org = format!("{}...", org.chars().take(20).collect::<String>());
        }

        println!(
            "{:<4} {:<9} {:<16} {:<10} {:<24} {}",
            i + 1,
            latency,
            mirror.status.to_string(),
            mirror.bandwidth,
            org,
            mirror.url
        );
    }
}

async fn handle_test(args: &SelectArgs, json: bool) -> Result<()> {
    let outcome = run_selection(args).await?;

    if json {
        let report: Vec<_> = outcome
            .ranked
            .iter()
            .enumerate()
            .map(|(i, m)| MirrorReport::new(i + 1, m))
            .collect();
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Tested {} mirror(s), {} reachable.\n",
        outcome.tested, outcome.reachable
    );
    print_table(&outcome.ranked);

    if let Some(best) = outcome.ranked.first() {
        println!("{}", "-".repeat(100));
        println!("Recommendation: {} is the fastest.", best.url);
        if let Some(ref page) = best.launchpad {
            println!("Details: {}", page);
        }
        println!("Run 'mirrorpick use' to apply.");
    }
    Ok(())
}

/// 从前 N 个中交互选择 (1-based)
async fn choose_mirror(ranked: &[Mirror]) -> Result<Mirror> {
    print_table(ranked);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        println!("\nChoose a mirror [1-{}] (q to quit):", ranked.len());
        let Some(input) = lines.next_line().await? else {
            bail!("No mirror chosen.");
        };
        let input = input.trim();
        if input.eq_ignore_ascii_case("q") {
            bail!("No mirror chosen.");
        }
        match input.parse::<usize>() {
            Ok(n) if (1..=ranked.len()).contains(&n) => return Ok(ranked[n - 1].clone()),
            _ => eprintln!("Invalid choice: '{}'", input),
        }
    }
}

async fn handle_use(
    args: &SelectArgs,
    choose: bool,
    sources_path: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<()> {
    let settings = config::settings();
    let sources_path = sources_path.unwrap_or_else(|| settings.sources_path.clone());
    let output = output.unwrap_or_else(|| settings.output_path.clone());

    // 先读取配置, 避免测速后才发现文件不可用
    let original = utils::read_text(&sources_path)
        .await
        .with_context(|| format!("Failed to read {:?}", sources_path))?;

    let outcome = run_selection(args).await?;

    let target = if choose && outcome.ranked.len() > 1 {
        choose_mirror(&outcome.ranked).await?
    } else {
        // run_selection guarantees at least one entry
        outcome.ranked[0].clone()
    };
    println!(
        "Selected {} ({}ms, {})",
        target.url,
        target.latency_ms().unwrap_or_default(),
        target.status
    );

    let result = rewrite::rewrite(&original, &target);
    if result.is_noop() {
        bail!(
            "No main or security entries found in {:?}; nothing to rewrite.",
            sources_path
        );
    }
    if let Some(ref url) = result.ambiguous {
        eprintln!(
            "Warning: {} is used for both main and security entries; both were rewritten.",
            url
        );
    }

    if let Some(backup) = utils::backup_file(&output).await? {
        println!("Backup created at: {:?}", backup);
    }
    tokio::fs::write(&output, &result.text)
        .await
        .with_context(|| format!("Failed to write {:?}", output))?;

    println!(
        "Success! Wrote {:?} ({} URL(s) replaced).",
        output, result.replacements
    );
    if output != sources_path {
        println!("Copy it into place with: sudo cp {:?} {:?}", output, sources_path);
    }
    Ok(())
}

async fn handle_restore(output: Option<PathBuf>) -> Result<()> {
    let output = output.unwrap_or_else(|| config::settings().output_path.clone());

    println!("Restoring {:?}...", output);
    let backup = utils::restore_latest_backup(&output).await?;
    println!("Success! Restored from {:?}.", backup);

    Ok(())
}
