//! CLI tool for running DRC on a board exported as JSON
//!
//! Usage:
//!   cargo run --release --bin drc_runner -- <job.json> [options]
//!
//! The job file holds `{ "board": {...}, "rules": [...], "netlist": [...], "config": {...} }`;
//! only `board` is required.
//!
//! Options:
//!   --config <file>     Load the run configuration from a separate file
//!   --rules <file>      Load the rule list from a separate file
//!   --disable <name>    Skip a provider (repeatable)
//!   --summary           Print per-kind counts instead of the full result
//!   --quiet             Only log warnings

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use board_drc::board::{Board, Netlist};
use board_drc::drc::{DrcConfig, DrcEngine, LogProgress, ProviderRegistry, Rule};

#[derive(Deserialize)]
struct Job {
    board: Board,
    #[serde(default)]
    rules: Vec<Rule>,
    #[serde(default)]
    netlist: Option<Netlist>,
    #[serde(default)]
    config: Option<DrcConfig>,
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} <job.json> [options]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <file>     Run configuration (overrides the job's \"config\")");
    eprintln!("  --rules <file>      Rule list (overrides the job's \"rules\")");
    eprintln!("  --disable <name>    Skip a provider: keepout, disallow, text_dimensions, lvs");
    eprintln!("  --summary           Print per-kind counts only");
    eprintln!("  --quiet             Only log warnings");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  DRC_ERROR_LIMIT     Default per-kind violation cap");
    eprintln!("  DRC_THREADS         Worker threads for the area cache");
    eprintln!("  RUST_LOG            Log filter (default: info)");
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args[1] == "--help" {
        print_usage(&args[0]);
        return Ok(());
    }
    let job_path = &args[1];

    let mut config_path: Option<String> = None;
    let mut rules_path: Option<String> = None;
    let mut disabled: Vec<String> = Vec::new();
    let mut summary_only = false;
    let mut quiet = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                match args.get(i) {
                    Some(path) => config_path = Some(path.clone()),
                    None => bail!("--config needs a file"),
                }
            }
            "--rules" => {
                i += 1;
                match args.get(i) {
                    Some(path) => rules_path = Some(path.clone()),
                    None => bail!("--rules needs a file"),
                }
            }
            "--disable" => {
                i += 1;
                match args.get(i) {
                    Some(name) => disabled.push(name.clone()),
                    None => bail!("--disable needs a provider name"),
                }
            }
            "--summary" => summary_only = true,
            "--quiet" => quiet = true,
            other => bail!("unknown option '{}'", other),
        }
        i += 1;
    }

    let default_filter = if quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let start = Instant::now();
    let text = std::fs::read_to_string(job_path).with_context(|| format!("reading {}", job_path))?;
    let job: Job = serde_json::from_str(&text).with_context(|| format!("parsing {}", job_path))?;
    tracing::info!(
        "[DRC] Loaded {}: {} items, {} rules in {:?}",
        job_path,
        job.board.len(),
        job.rules.len(),
        start.elapsed()
    );

    let mut config = match config_path {
        Some(path) => DrcConfig::from_json_file(&path)?,
        None => job.config.unwrap_or_default(),
    }
    .with_env_overrides();
    config.disabled_providers.extend(disabled);

    let rules = match rules_path {
        Some(path) => Rule::load_all(&path)?,
        None => job.rules,
    };

    let registry = ProviderRegistry::standard();
    let mut engine = DrcEngine::new(&job.board, rules, config, &registry);
    if let Some(netlist) = job.netlist {
        engine = engine.with_netlist(netlist);
    }
    tracing::info!("[DRC] Providers: {}", engine.provider_names().join(", "));

    let result = engine.run(&mut LogProgress::default());

    let output = if summary_only {
        serde_json::to_string_pretty(&serde_json::json!({
            "completed": result.completed,
            "total": result.violations.len(),
            "per_kind_counts": result.per_kind_counts,
        }))?
    } else {
        serde_json::to_string_pretty(&result)?
    };
    println!("{}", output);
    Ok(())
}
