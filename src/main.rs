// Command-line entry point for calltrace.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::error;

use calltrace::application::{TraceTarget, TraceUsecase};
use calltrace::config::TraceConfig;
use calltrace::domain::builder::{DepthPolicy, TraceBuilder};
use calltrace::domain::language::Language;
use calltrace::domain::render::ReportStyle;
use calltrace::infrastructure::concurrency::trace_pool;
use calltrace::infrastructure::{Codebase, OpenOptions};
use calltrace::ports::SymbolResolver;

#[derive(Parser, Debug)]
#[command(author, version, about = "Trace every call path that reaches a function", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the call paths from every entry point to the target
    Trace(TraceArgs),
    /// Print the symbol at a file position
    Find(FindArgs),
}

#[derive(Args, Debug)]
struct TraceArgs {
    /// Cargo.toml, project directory or prebuilt index.scip
    codebase: PathBuf,

    /// `Type::member`, or `<unit> <file> <offset>`
    #[arg(required = true, num_args = 1..=3, value_name = "TARGET")]
    target: Vec<String>,

    #[command(flatten)]
    open: OpenFlags,

    #[command(flatten)]
    trace: TraceFlags,
}

#[derive(Args, Debug)]
struct FindArgs {
    codebase: PathBuf,
    unit: String,
    file: String,
    /// Byte offset into the file
    offset: usize,

    #[command(flatten)]
    open: OpenFlags,
}

#[derive(Args, Debug)]
struct OpenFlags {
    /// Language of the codebase (rust, python); detected when omitted
    #[arg(long = "lang")]
    language: Option<String>,

    /// Keep the caller index in this directory and reuse it across runs
    #[arg(long)]
    store: Option<PathBuf>,

    /// Configuration file (default: calltrace.toml in the codebase root)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Regenerate the index even if a cached one is valid
    #[arg(long)]
    reindex: bool,
}

#[derive(Args, Debug)]
struct TraceFlags {
    /// Drop callers whose name or namespace contains this pattern (repeatable)
    #[arg(long)]
    exclude: Vec<String>,

    /// Keep callers from test code in qualified-name traces
    #[arg(long)]
    no_default_exclude: bool,

    /// Maximum trace depth (default 20)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Mark paths cut at the maximum depth instead of failing
    #[arg(long)]
    truncate: bool,

    /// Stop at callers already on the path instead of recursing into them
    #[arg(long)]
    cycle_guard: bool,

    /// Recurse into callers already on the path, even if the config enables the guard
    #[arg(long, conflicts_with = "cycle_guard")]
    no_cycle_guard: bool,

    /// Expand sibling callers in parallel
    #[arg(long)]
    parallel: bool,

    /// Expand sibling callers one at a time, even if the config enables parallel
    #[arg(long, conflicts_with = "parallel")]
    no_parallel: bool,

    /// Worker threads for --parallel (default: half the cores)
    #[arg(long)]
    threads: Option<usize>,

    /// Print the whole caller tree instead of one path per entry point
    #[arg(long)]
    tree: bool,

    /// Print only the first path of each entry point
    #[arg(long)]
    dedupe: bool,

    /// Print every path, even if the config enables deduplication
    #[arg(long, conflicts_with = "dedupe")]
    no_dedupe: bool,
}

impl TraceArgs {
    fn target(&self) -> Result<TraceTarget> {
        match self.target.as_slice() {
            [name] => Ok(TraceTarget::QualifiedName(name.clone())),
            [unit, file, offset] => Ok(TraceTarget::Position {
                unit: unit.clone(),
                file: file.clone(),
                offset: offset
                    .parse()
                    .with_context(|| format!("Invalid offset '{}'", offset))?,
            }),
            _ => bail!("expected either Type::member or <unit> <file> <offset>"),
        }
    }
}

fn setup_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Warn,
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_env("RUST_LOG")
        .format_timestamp(None)
        .init();
}

/// Configuration file merged with the flags that were given.
fn load_config(codebase: &Path, open: &OpenFlags) -> Result<TraceConfig> {
    let mut config = match &open.config {
        Some(path) => TraceConfig::load(path)?,
        None => {
            let root = if codebase.is_file() {
                codebase.parent().unwrap_or(Path::new("."))
            } else {
                codebase
            };
            TraceConfig::discover(root)?
        }
    };
    if open.language.is_some() {
        config.language = open.language.clone();
    }
    if open.store.is_some() {
        config.store = open.store.clone();
    }
    Ok(config)
}

fn apply_trace_flags(config: &mut TraceConfig, flags: &TraceFlags) {
    if let Some(depth) = flags.max_depth {
        config.max_depth = depth;
    }
    config.exclude.extend(flags.exclude.iter().cloned());
    if flags.no_default_exclude {
        config.default_exclusions = false;
    }
    if flags.truncate {
        config.depth_policy = DepthPolicy::Truncate;
    }
    switch(&mut config.cycle_guard, flags.cycle_guard, flags.no_cycle_guard);
    switch(&mut config.parallel, flags.parallel, flags.no_parallel);
    config.threads = flags.threads.or(config.threads);
    switch(&mut config.dedupe_entry_points, flags.dedupe, flags.no_dedupe);
}

/// A `--x` / `--no-x` pair overrides the configured value; neither keeps it.
fn switch(value: &mut bool, on: bool, off: bool) {
    if on {
        *value = true;
    } else if off {
        *value = false;
    }
}

fn open_codebase(codebase: &Path, config: &TraceConfig, reindex: bool) -> Result<Codebase> {
    let language = config
        .language
        .as_deref()
        .map(str::parse::<Language>)
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let options = OpenOptions {
        language,
        store_dir: config.store.clone(),
        reindex,
    };
    Codebase::open(codebase, &options).with_context(|| format!("Failed to load {}", codebase.display()))
}

fn run_trace(args: &TraceArgs) -> Result<()> {
    let target = args.target()?;
    let mut config = load_config(&args.codebase, &args.open)?;
    apply_trace_flags(&mut config, &args.trace);

    let codebase = open_codebase(&args.codebase, &config, args.open.reindex)?;
    let usecase = TraceUsecase {
        resolver: &codebase,
        lookup: &codebase,
        builder: TraceBuilder::new(config.to_trace_options()),
        default_test_exclusion: config.default_exclusions,
        style: if args.trace.tree {
            ReportStyle::Tree
        } else {
            ReportStyle::Paths
        },
        dedupe_entry_points: config.dedupe_entry_points,
    };

    let report = if config.parallel {
        trace_pool(config.threads)?.install(|| usecase.run(&target))?
    } else {
        usecase.run(&target)?
    };
    print!("{}", report);
    Ok(())
}

fn run_find(args: &FindArgs) -> Result<()> {
    let config = load_config(&args.codebase, &args.open)?;
    let codebase = open_codebase(&args.codebase, &config, args.open.reindex)?;
    let symbol = codebase.resolve_at_position(&args.unit, &args.file, args.offset)?;
    println!("{}", symbol);
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    let result = match &cli.command {
        Command::Trace(args) => run_trace(args),
        Command::Find(args) => run_find(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace_flags(args: &[&str]) -> TraceFlags {
        let argv = ["calltrace", "trace", "Cargo.toml", "Service::target"]
            .iter()
            .chain(args)
            .copied();
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Trace(args) => args.trace,
            other => panic!("expected trace, got {:?}", other),
        }
    }

    fn config_with_switches_on() -> TraceConfig {
        TraceConfig {
            cycle_guard: true,
            parallel: true,
            dedupe_entry_points: true,
            ..TraceConfig::default()
        }
    }

    #[test]
    fn test_no_flags_turn_off_configured_switches() {
        let mut config = config_with_switches_on();
        apply_trace_flags(
            &mut config,
            &trace_flags(&["--no-cycle-guard", "--no-parallel", "--no-dedupe"]),
        );
        assert!(!config.cycle_guard);
        assert!(!config.parallel);
        assert!(!config.dedupe_entry_points);
    }

    #[test]
    fn test_configured_switches_survive_without_flags() {
        let mut config = config_with_switches_on();
        apply_trace_flags(&mut config, &trace_flags(&[]));
        assert!(config.cycle_guard);
        assert!(config.parallel);
        assert!(config.dedupe_entry_points);

        let mut config = TraceConfig::default();
        apply_trace_flags(&mut config, &trace_flags(&["--cycle-guard", "--parallel", "--dedupe"]));
        assert!(config.cycle_guard);
        assert!(config.parallel);
        assert!(config.dedupe_entry_points);
    }

    #[test]
    fn test_on_and_off_flags_conflict() {
        let argv = ["calltrace", "trace", "Cargo.toml", "Service::target", "--parallel", "--no-parallel"];
        assert!(Cli::try_parse_from(argv).is_err());
    }
}
