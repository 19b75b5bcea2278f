//! # Hearth REPL
//!
//! Reads one program per line from stdin and evaluates it against an
//! in-memory device tree.

use clap::Parser;
use hearth_devices::{DeviceTree, MemoryStore, SystemClock};
use hearth_dsl::config::runtime::{parse_log_level, RuntimeConfig};
use hearth_dsl::evaluation::DeviceStore;
use hearth_dsl::{log_error, log_info, logging};
use hearth_repl::Session;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Interactive shell for the hearth device-command language
#[derive(Parser, Debug)]
#[command(name = "hearth", version)]
struct Cli {
    /// TOML file with a [devices] table
    #[arg(short, long, value_name = "FILE")]
    devices: Option<PathBuf>,

    /// Scan on a separate thread feeding the parser through a bounded queue
    #[arg(long)]
    concurrent: bool,

    /// Token queue capacity for concurrent scanning
    #[arg(long, value_name = "N")]
    queue_capacity: Option<usize>,

    /// Print each parsed program as JSON before evaluating it
    #[arg(long)]
    dump_ast: bool,

    /// error, warning, info or debug
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Emit log events as JSON lines
    #[arg(long)]
    structured_logs: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("hearth: {}", message);
            ExitCode::FAILURE
        }
    }
}

/// Environment defaults first, then command-line overrides
fn runtime_config(cli: &Cli) -> Result<RuntimeConfig, String> {
    let mut config = RuntimeConfig::default();
    if let Some(level) = cli.log_level.as_deref() {
        config.logging.min_log_level =
            parse_log_level(level).ok_or_else(|| format!("unknown log level '{}'", level))?;
    }
    config.logging.use_structured_logging |= cli.structured_logs;
    config.pipeline.concurrent_scanning |= cli.concurrent;
    if let Some(capacity) = cli.queue_capacity {
        config.pipeline.queue_capacity = capacity.max(1);
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<(), String> {
    let config = runtime_config(&cli)?;
    logging::init_with_preferences(config.logging.clone())?;

    let tree = match cli.devices.as_deref() {
        Some(path) => DeviceTree::load(path).map_err(|error| {
            log_error!(error.error_code(), "Device file rejected", "error" => &error);
            error.to_string()
        })?,
        None => DeviceTree::new(),
    };

    let store = MemoryStore::with_clock(tree, Arc::new(SystemClock), config.dispatch.clone())
        .map_err(|error| format!("could not start device store: {}", error))?;
    log_info!("Device store ready", "devices" => store.device_count());

    let store: Arc<dyn DeviceStore> = Arc::new(store);
    let mut session = Session::from_config(store, &config).with_ast_dump(cli.dump_ast);
    let stdin = io::stdin();
    let interactive = stdin.is_terminal();
    session
        .run(stdin.lock(), &mut io::stdout().lock(), interactive)
        .map_err(|error| format!("i/o error: {}", error))
}
