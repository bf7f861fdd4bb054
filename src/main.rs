use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ilc_core::diag::{render_diagnostics, Severity};
use ilc_core::exec::{InterpreterOptions, RunOptions};

#[derive(Debug, Parser)]
#[command(
    name = "ilc",
    version,
    about = "Soft PLC engine for IEC 61131-3 Instruction List programs",
    after_help = "Examples:\n  ilc check conveyor.il\n  ilc run conveyor.il --max-scans 1000 --scan-time 10\n  ilc ladder conveyor.il --pretty"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log filter, e.g. `info` or `ilc_core=debug`. Falls back to RUST_LOG.
    #[arg(long, global = true, value_name = "FILTER")]
    log: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Parse a program and report its diagnostics.
    Check(CheckArgs),
    /// Load a program and run the scan loop.
    Run(RunArgs),
    /// Emit the ladder-diagram JSON document.
    Ladder(LadderArgs),
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Input IL source file.
    #[arg(value_name = "INPUT")]
    input: PathBuf,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Input IL source file.
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Stop after this many scans. Without it the program runs until an
    /// END instruction fires.
    #[arg(long = "max-scans", value_name = "N")]
    max_scans: Option<u64>,

    /// Target scan period in milliseconds; fast scans sleep the remainder.
    #[arg(long = "scan-time", value_name = "MS")]
    scan_time_ms: Option<f64>,

    /// Fixed timer time base in milliseconds, for deterministic replays.
    #[arg(long = "time-base", value_name = "MS")]
    time_base_ms: Option<f64>,
}

#[derive(Debug, Args)]
struct LadderArgs {
    /// Input IL source file.
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log.as_deref());
    match cli.command {
        Commands::Check(args) => check(args),
        Commands::Run(args) => run(args),
        Commands::Ladder(args) => ladder(args),
    }
}

fn init_logging(filter: Option<&str>) {
    let filter = match filter {
        Some(filter) => EnvFilter::new(filter),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_source(input: &PathBuf) -> anyhow::Result<(String, String)> {
    let text = fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string());
    Ok((name, text))
}

fn check(args: CheckArgs) -> anyhow::Result<()> {
    let (name, text) = read_source(&args.input)?;
    let parsed = ilc_core::parse(&text);

    if !parsed.warnings.is_empty() {
        eprint!("{}", render_diagnostics(&name, &text, &parsed.warnings));
    }
    if !parsed.errors.is_empty() {
        eprint!("{}", render_diagnostics(&name, &text, &parsed.errors));
        bail!(
            "{}: {} error(s), {} warning(s)",
            name,
            parsed.errors.len(),
            parsed.warnings.len()
        );
    }

    let compiled = ilc_core::compile(&parsed)
        .map_err(|err| anyhow::anyhow!("{}", render_diagnostics(&name, &text, &err.diagnostics)))?;
    let compile_errors = compiled
        .diagnostics
        .iter()
        .filter(|diag| diag.severity == Severity::Error)
        .count();
    if !compiled.diagnostics.is_empty() {
        eprint!("{}", render_diagnostics(&name, &text, &compiled.diagnostics));
    }

    let networks = compiled.main.len();
    let subroutines = compiled.subroutines.len();
    println!(
        "{name}: ok ({networks} network(s), {subroutines} subroutine(s), {} warning(s), {compile_errors} dropped instruction(s))",
        parsed.warnings.len()
    );
    Ok(())
}

fn run(args: RunArgs) -> anyhow::Result<()> {
    let (name, text) = read_source(&args.input)?;
    let options = InterpreterOptions {
        fixed_scan_time_ms: args.time_base_ms,
        ..Default::default()
    };
    let mut interp = ilc_core::load_source_with(&name, &text, options)
        .map_err(|err| anyhow::anyhow!("{}", err.rendered))?;

    let code = interp.run_continuous(RunOptions {
        max_scans: args.max_scans,
        target_scan_time_ms: args.scan_time_ms,
    });

    let stats = interp.stats();
    println!("exit: {}", serde_json::to_string(&code)?.trim_matches('"'));
    println!("scans: {}", stats.scans);
    println!(
        "scan time ms: last {:.3} avg {:.3} min {:.3} max {:.3}",
        stats.last_ms,
        stats.average_ms(),
        stats.min_ms,
        stats.max_ms
    );
    if stats.errors > 0 {
        println!("runtime errors: {}", stats.errors);
    }
    Ok(())
}

fn ladder(args: LadderArgs) -> anyhow::Result<()> {
    let (name, text) = read_source(&args.input)?;
    let parsed = ilc_core::parse(&text);
    if !parsed.errors.is_empty() {
        eprint!("{}", render_diagnostics(&name, &text, &parsed.errors));
        bail!("{}: {} error(s)", name, parsed.errors.len());
    }

    let doc = ilc_ladder::build(&parsed);
    for warning in &doc.warnings {
        eprintln!("warning: {warning}");
    }

    let json = if args.pretty {
        serde_json::to_string_pretty(&doc.programs)?
    } else {
        serde_json::to_string(&doc.programs)?
    };
    println!("{json}");
    Ok(())
}
