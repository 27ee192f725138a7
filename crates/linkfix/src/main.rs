use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use linkfix_core::api::{MediaWikiClient, MediaWikiClientConfig};
use linkfix_core::config::{LinkfixConfig, load_config};
use linkfix_core::fixer::{FixOptions, run_sweep};
use linkfix_core::ledger::FixLedger;
use linkfix_core::probe::{HttpProbe, ProbeConfig, UrlProbe, is_dead_status};
use linkfix_core::store::{LinkSource, SaveOptions};

#[derive(Debug, Parser)]
#[command(
    name = "linkfix",
    version,
    about = "Replace archive.org links that are alive again with the live URL"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Path to linkfix.toml")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Sweep the stored external links and fix revived archive links")]
    Run(RunArgs),
    #[command(about = "Probe a single URL and report its status code")]
    Probe(ProbeArgs),
    #[command(about = "Summarize the sweep ledger")]
    Report,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, default_value_t = 0, help = "Skip this many leading link rows")]
    offset: usize,
    #[arg(long, help = "Only fix archive.org links from this year")]
    year: Option<String>,
    #[arg(long, help = "Print diffs instead of saving edits")]
    dry_run: bool,
    #[arg(long, help = "Resume from the ledger checkpoint when no --offset is given")]
    resume: bool,
    #[arg(long, help = "Do not record processed rows in the ledger")]
    no_ledger: bool,
}

#[derive(Debug, Args)]
struct ProbeArgs {
    url: String,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = load_config(
        cli.config
            .as_deref()
            .unwrap_or_else(|| std::path::Path::new("linkfix.toml")),
    )?;

    match cli.command {
        Some(Commands::Run(args)) => run_fix(&config, args),
        Some(Commands::Probe(args)) => run_probe(&config, &args.url),
        Some(Commands::Report) => run_report(&config),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_fix(config: &LinkfixConfig, args: RunArgs) -> Result<()> {
    if config.api_url().is_none() {
        bail!("no wiki API URL configured; set WIKI_API_URL or [wiki].api_url in linkfix.toml");
    }

    let mut ledger = if args.no_ledger {
        None
    } else {
        Some(FixLedger::open(&config.ledger_path())?)
    };

    let offset = if args.resume && args.offset == 0 {
        let checkpoint = match ledger.as_ref() {
            Some(ledger) => ledger.checkpoint()?,
            None => None,
        };
        match checkpoint {
            Some(checkpoint) => {
                println!("resuming from ledger checkpoint: row {checkpoint}");
                checkpoint
            }
            None => {
                println!("no ledger checkpoint found; starting from row 0");
                0
            }
        }
    } else {
        args.offset
    };

    let options = FixOptions {
        offset,
        year: args.year.unwrap_or_else(|| config.year()),
        dry_run: args.dry_run,
        save: SaveOptions {
            summary: config.edit_summary(),
            author: config.author(),
            suppress_recent_changes: true,
        },
    };

    let mut client = MediaWikiClient::new(MediaWikiClientConfig::from_config(config))?;
    let mut probe = HttpProbe::new(&ProbeConfig {
        timeout_ms: config.probe_timeout_ms(),
        user_agent: config.user_agent(),
    })?;

    let records = client.external_links()?;
    println!("link rows: {}", records.len());
    if options.offset > 0 {
        println!("offset: {}", options.offset);
    }
    if !options.year.is_empty() {
        println!("year: {}", options.year);
    }
    if options.dry_run {
        println!("mode: dry-run (no edits will be saved)");
    }

    let report = run_sweep(
        &records,
        &mut client,
        &mut probe,
        ledger.as_mut(),
        &options,
    )?;

    println!("sweep complete");
    println!("rows_scanned: {}", report.scanned);
    println!("archive_links: {}", report.matched);
    println!("fixed: {}", report.fixed);
    println!("api_requests: {}", client.request_count());
    Ok(())
}

fn run_probe(config: &LinkfixConfig, url: &str) -> Result<()> {
    let mut probe = HttpProbe::new(&ProbeConfig {
        timeout_ms: config.probe_timeout_ms(),
        user_agent: config.user_agent(),
    })?;
    let status = probe.probe(url);
    println!(
        "{url} {status}{}",
        if is_dead_status(status) { " .. dead" } else { " .. alive" }
    );
    Ok(())
}

fn run_report(config: &LinkfixConfig) -> Result<()> {
    let ledger_path = config.ledger_path();
    if !ledger_path.exists() {
        println!("ledger: <none> ({})", ledger_path.display());
        return Ok(());
    }
    let ledger = FixLedger::open(&ledger_path)?;
    let summary = ledger.summary()?;

    println!("ledger: {}", ledger_path.display());
    println!("records: {}", summary.total_records);
    println!("fixed: {}", summary.fixed);
    for (outcome, count) in &summary.by_outcome {
        println!("outcome.{outcome}: {count}");
    }
    match summary.checkpoint {
        Some(checkpoint) => println!("checkpoint: row {checkpoint}"),
        None => println!("checkpoint: <none>"),
    }
    Ok(())
}
