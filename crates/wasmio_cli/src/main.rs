//! wasmio CLI
//!
//! Runs the query engine, the parse and panic demos, and compiled
//! WebAssembly modules from the command line.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use color_eyre::eyre::eyre;
use console::style;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use wasmio_core::Raised;
use wasmio_engine::exports::{DemoErrors, DemoPanic};
use wasmio_engine::{DemoDriver, Driver, QueryEngine};
use wasmio_wasm::{
    FailureClassifier, SandboxConfig, TrapDiagnosticsReader, WasmSandbox, init_logs, registry,
};

#[derive(Parser)]
#[command(name = "wasmio")]
#[command(about = "wasmio - WebAssembly module boundary demos", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert a row, then list rows, against a simulated database
    Query {
        /// Simulated database latency in milliseconds
        #[arg(long, default_value_t = 200)]
        latency_ms: u64,
        /// Table name
        #[arg(long, default_value = "users")]
        table: String,
        /// Document column
        #[arg(long, default_value = "name")]
        field: String,
    },
    /// Parse an event and print it, or the classified failure
    Parse {
        /// Event as JSON, e.g. '{ "name": "EuroRust", "year": 2023 }'
        input: String,
        /// How the parser reports failure
        #[arg(short, long, value_enum, default_value_t = ParseMode::Error)]
        mode: ParseMode,
    },
    /// Trigger a panic and print the trap report
    Panic {
        /// Panic message
        #[arg(default_value = "panic cause")]
        message: String,
        /// Leave the panic hook uninstalled
        #[arg(long)]
        no_hook: bool,
    },
    /// Call an export of a compiled WebAssembly module
    Run {
        /// Path to a `.wasm` file
        file: PathBuf,
        /// Export to call
        #[arg(short, long)]
        export: String,
        /// Single i32 argument; without it the export takes none.
        /// Either way it returns an i32
        #[arg(long)]
        arg: Option<i32>,
        /// Fuel granted to the call
        #[arg(long)]
        fuel: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ParseMode {
    /// Bare string
    String,
    /// `Error`
    Error,
    /// `Error` with a `[CustomError]` prefix
    Custom,
    /// Panic
    Panic,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_logs();
    let cli = Cli::parse();

    match cli.command {
        Commands::Query {
            latency_ms,
            table,
            field,
        } => {
            let driver = DemoDriver::new().with_latency(Duration::from_millis(latency_ms));
            let (inserted, selected) = run_query(Arc::new(driver), &table, &field).await?;
            println!("{} {}", style("insert:").bold(), inserted);
            println!("{} {}", style("select:").bold(), selected);
            Ok(())
        }
        Commands::Parse { input, mode } => {
            println!("{}", parse(&input, mode));
            Ok(())
        }
        Commands::Panic { message, no_hook } => {
            println!("{}", panic_report(&message, !no_hook));
            Ok(())
        }
        Commands::Run {
            file,
            export,
            arg,
            fuel,
        } => {
            println!("{}", run_module(&file, &export, arg, fuel)?);
            Ok(())
        }
    }
}

/// Insert one row and list the table; both results as pretty JSON
async fn run_query(driver: Arc<dyn Driver>, table: &str, field: &str) -> Result<(String, String)> {
    let engine = QueryEngine::new(driver);
    let raised = |raised: Raised| eyre!("{}", raised);

    let inserted = engine
        .query(json!({
            "_tag": "insert",
            "value": { "data": { "id": 1, "name": "John" }, "table": table, "field": field },
        }))
        .await
        .map_err(raised)?;
    let selected = engine
        .query(json!({ "_tag": "select", "value": { "table": table, "field": field } }))
        .await
        .map_err(raised)?;

    Ok((
        serde_json::to_string_pretty(&inserted)?,
        serde_json::to_string_pretty(&selected)?,
    ))
}

/// Parse `input` and describe the outcome
fn parse(input: &str, mode: ParseMode) -> String {
    let _scenario = registry::isolate();
    let demo = DemoErrors::new();
    let result = match mode {
        ParseMode::String => demo.parse_with_string_error(input),
        ParseMode::Error => demo.parse_with_error(input),
        ParseMode::Custom => demo.parse_with_custom_error(input),
        ParseMode::Panic => demo.parse_with_panic(input),
    };

    match result {
        Ok(event) => json!({ "ok": event }).to_string(),
        Err(raised) => {
            let failure = FailureClassifier::new().classify(&raised);
            serde_json::to_string_pretty(&json!({
                "name": failure.name(),
                "message": failure.message(),
                "recoverable": failure.is_recoverable(),
                "location": failure.source_location().map(|l| l.to_string()),
            }))
            .unwrap_or_else(|_| failure.to_string())
        }
    }
}

/// Trigger a panic and render the trap report
fn panic_report(message: &str, hook: bool) -> String {
    let demo = DemoPanic::new();
    if hook {
        demo.set_panic_hook();
    }
    let guard = registry::install();

    let report = match demo.trigger_panic(message) {
        Ok(()) => return "no panic".to_string(),
        Err(raised) => match raised.as_error_object() {
            Some(error) => TrapDiagnosticsReader::new()
                .with_registry(guard.registry())
                .read(error),
            None => return raised.to_string(),
        },
    };

    format!(
        "{} {}\n{}",
        style("panic:").red().bold(),
        if report.captured { "captured" } else { "not captured" },
        report.stack
    )
}

/// Call an export of the module at `path`
fn run_module(path: &Path, export: &str, arg: Option<i32>, fuel: Option<u64>) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("guest")
        .to_string();

    let mut config = SandboxConfig::new(name);
    if let Some(fuel) = fuel {
        config = config.with_max_fuel(fuel);
    }
    let mut sandbox = WasmSandbox::new(config, &bytes)?;

    let guard = registry::install();
    let result = match arg {
        Some(arg) => sandbox.call::<i32, i32>(export, arg).map(Value::from),
        None => sandbox.call::<(), i32>(export, ()).map(Value::from),
    };

    match result {
        Ok(value) => Ok(value.to_string()),
        Err(raised) => {
            let failure = FailureClassifier::new()
                .with_registry(guard.registry())
                .classify(&raised);
            match raised.as_error_object() {
                Some(error) if failure.is_trap() => {
                    let report = TrapDiagnosticsReader::new()
                        .with_registry(guard.registry())
                        .read(error);
                    Err(eyre!("module trapped\n{}", report.stack))
                }
                _ => Err(eyre!("{}", failure)),
            }
        }
    }
}
