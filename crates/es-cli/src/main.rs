//! Embed shield CLI
//!
//! CLI tool for compiling rule lists, inspecting snapshots and checking how
//! the mediator treats requests.

mod config;
mod replay;
mod snapshot;

use std::fs;
use std::path::Path;
use std::time::Instant;

use clap::{Parser, Subcommand};
use ts_rs::TS;

use es_core::mediator::Mediator;
use es_core::messages::Message;
use es_core::navigation::interstitial_html;
use es_core::rules::RuleTables;
use es_core::telemetry::{Telemetry, TelemetryEvent};
use es_core::types::BlockCategory;
use es_core::url::{extract_host, normalize_host};

#[derive(Parser)]
#[command(name = "es-cli")]
#[command(about = "Embed shield rule compiler and tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile rule lists into a snapshot
    Compile {
        /// Input rule list files
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Output snapshot file
        #[arg(short, long, default_value = "snapshot.json")]
        output: String,

        /// Start from the builtin tables instead of empty ones
        #[arg(long)]
        with_builtin: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a snapshot
    Validate {
        /// Snapshot file to validate
        #[arg(short, long)]
        input: String,
    },

    /// Dump snapshot info
    Info {
        /// Snapshot file to inspect
        #[arg(short, long)]
        input: String,
    },

    /// Decide a single request
    Check {
        /// Request URL
        url: String,

        /// Fetch destination (document, iframe, script, image, ...)
        #[arg(short, long, default_value = "")]
        destination: String,

        /// Fetch mode (navigate, no-cors, cors, same-origin)
        #[arg(short, long, default_value = "no-cors")]
        mode: String,

        /// Referer reported with the request
        #[arg(long)]
        referrer: Option<String>,

        /// Snapshot to use instead of the builtin tables
        #[arg(short, long)]
        snapshot: Option<String>,

        /// TOML engine config
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Replay an NDJSON request trace and summarize the decisions
    Replay {
        /// Trace file, one `{url, mode, destination, referrer}` per line
        #[arg(short, long)]
        trace: String,

        /// Maximum requests to replay
        #[arg(short, long, default_value_t = 100_000)]
        limit: usize,

        /// Snapshot to use instead of the builtin tables
        #[arg(short, long)]
        snapshot: Option<String>,

        /// TOML engine config
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Print the interstitial shown for a blocked navigation
    Interstitial {
        /// Blocked URL or hostname
        url: String,
    },

    /// Export TypeScript definitions for the message protocol
    ExportTypes {
        /// Output directory
        #[arg(short, long, default_value = "bindings")]
        output: String,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compile {
            input,
            output,
            with_builtin,
            verbose,
        } => cmd_compile(&input, &output, with_builtin, verbose),
        Commands::Validate { input } => cmd_validate(&input),
        Commands::Info { input } => cmd_info(&input),
        Commands::Check {
            url,
            destination,
            mode,
            referrer,
            snapshot,
            config,
        } => cmd_check(&url, &destination, &mode, referrer.as_deref(), snapshot.as_deref(), config.as_deref()),
        Commands::Replay {
            trace,
            limit,
            snapshot,
            config,
        } => cmd_replay(&trace, limit, snapshot.as_deref(), config.as_deref()),
        Commands::Interstitial { url } => cmd_interstitial(&url),
        Commands::ExportTypes { output } => cmd_export_types(&output),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn build_mediator(snapshot: Option<&str>, config: Option<&str>) -> Result<Mediator, String> {
    let config = config::load_config(config)?;
    let tables = snapshot::load_tables(snapshot)?;
    Mediator::new(&tables, &config, Telemetry::null()).map_err(|e| format!("Invalid config: {e}"))
}

fn cmd_compile(inputs: &[String], output: &str, with_builtin: bool, verbose: bool) -> Result<(), String> {
    let base = if with_builtin {
        RuleTables::builtin()
    } else {
        RuleTables::default()
    };
    let (compiled, stats, compile_ms) = snapshot::compile_snapshot(inputs, base, verbose)?;

    let write_start = Instant::now();
    let size = snapshot::write_snapshot(Path::new(output), &compiled)?;
    let write_ms = write_start.elapsed().as_secs_f64() * 1000.0;

    println!("Compiled {} rule lists to '{}'", inputs.len(), output);
    println!("  Version:  {}", stats.list_version);
    println!("  Lines:    {} ({} comments, {} invalid)", stats.lines, stats.comments, stats.invalid);
    println!(
        "  Rules:    {} -> {} (dedupe removed {}, {} allow conflicts)",
        stats.rules_before, stats.rules_after, stats.deduped, stats.conflicts
    );
    println!("  Size:     {} bytes ({:.1} KB)", size, size as f64 / 1024.0);
    println!("  Time:     {:.1}ms (compile: {:.1}ms, write: {:.1}ms)", compile_ms + write_ms, compile_ms, write_ms);

    Ok(())
}

fn cmd_validate(input: &str) -> Result<(), String> {
    let (loaded, size) = snapshot::read_snapshot(Path::new(input))?;
    let checksum = loaded.checksum;
    let list_version = loaded.list_version.clone();
    loaded.into_tables().map_err(|e| format!("Invalid snapshot: {e}"))?;

    println!("Snapshot '{input}' is valid");
    println!("  List version: {list_version}");
    println!("  Checksum:     {checksum:08x}");
    println!("  Size:         {size} bytes");

    Ok(())
}

fn cmd_info(input: &str) -> Result<(), String> {
    let (loaded, size) = snapshot::read_snapshot(Path::new(input))?;
    let stats = loaded.stats();

    println!("Snapshot: {input}");
    println!("  Magic:        {}", loaded.magic);
    println!("  Format:       {}", loaded.version);
    println!("  List version: {}", loaded.list_version);
    println!("  Checksum:     {:08x}", loaded.checksum);
    println!("  Total size:   {} bytes ({:.1} KB)", size, size as f64 / 1024.0);
    println!();

    println!("Domain Sets:");
    println!("  Blocklist:    {} entries", stats.blocked_domains);
    println!("  Embed hosts:  {} entries", stats.embed_hosts);
    println!("  Suspicious TLDs: {}", stats.suspicious_tlds);
    println!();

    println!("Patterns:       {}", stats.patterns);
    for pattern in &loaded.body.patterns {
        println!("  {:<24} {:<16} {}", pattern.id, pattern.kind.as_str(), pattern.source);
    }
    println!();

    println!("Keywords:");
    println!("  Code:         {}", stats.code_keywords);
    println!("  Message:      {}", stats.message_keywords);

    Ok(())
}

fn cmd_check(
    url: &str,
    destination: &str,
    mode: &str,
    referrer: Option<&str>,
    snapshot: Option<&str>,
    config: Option<&str>,
) -> Result<(), String> {
    let mediator = build_mediator(snapshot, config)?;
    let request = replay::TraceRequest {
        url: url.to_string(),
        mode: mode.to_string(),
        destination: destination.to_string(),
        referrer: referrer.map(str::to_string),
    };

    let start = Instant::now();
    let verdict = replay::decide(&mediator, &request);
    let elapsed_us = start.elapsed().as_secs_f64() * 1_000_000.0;
    let host = extract_host(url).map(normalize_host).unwrap_or_default();

    println!("URL:            {url}");
    println!("Host:           {}", if host.is_empty() { "(none)" } else { host.as_str() });
    println!("Classification: {:?}", mediator.classifier().classify_normalized(&host));
    println!("Decision:       {}", replay::decision_label(verdict.decision));
    if let Some(category) = verdict.category {
        println!("Category:       {}", category.as_str());
    }
    if let Some(rule_id) = &verdict.rule_id {
        println!("Rule:           {rule_id}");
    }
    println!("Self origin:    {}", mediator.self_origin());
    println!("List version:   {}", mediator.list_version());
    println!("Time:           {elapsed_us:.2}us");

    Ok(())
}

fn cmd_replay(trace: &str, limit: usize, snapshot: Option<&str>, config: Option<&str>) -> Result<(), String> {
    let mediator = build_mediator(snapshot, config)?;
    println!("Loading trace: {trace} (limit {limit})");
    let requests = replay::load_trace(trace, limit)?;

    // Warm the classifier before timing
    for request in requests.iter().take(1000) {
        let _ = replay::decide(&mediator, request);
    }

    let summary = replay::replay(&mediator, &requests);
    println!("{}", replay::format_summary(&summary));
    Ok(())
}

fn cmd_interstitial(url: &str) -> Result<(), String> {
    let host = extract_host(url).map(normalize_host).unwrap_or_else(|| url.to_string());
    println!("{}", interstitial_html(&host));
    Ok(())
}

fn cmd_export_types(output: &str) -> Result<(), String> {
    fs::create_dir_all(output).map_err(|e| format!("Failed to create '{output}': {e}"))?;

    Message::export_all_to(output).map_err(|e| format!("Failed to export Message: {e}"))?;
    TelemetryEvent::export_all_to(output).map_err(|e| format!("Failed to export TelemetryEvent: {e}"))?;
    BlockCategory::export_all_to(output).map_err(|e| format!("Failed to export BlockCategory: {e}"))?;

    println!("Exported TypeScript definitions to '{output}'");
    Ok(())
}
