//! Tessera Node - PVM program runner.
//!
//! Loads a program, runs it through a pool of interpreters with the node's
//! host calls and reports how each execution ended.

pub mod config;
pub mod host;
pub mod runner;
pub mod telemetry;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tessera_pvm::{ExecutionOutcome, ExecutionResult};
use tracing::{error, info};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "tessera-node")]
#[command(about = "Tessera Node - PVM program runner")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Config file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level or filter directives
    #[arg(short, long, global = true, env = "TESSERA_LOG")]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a program
    Run {
        /// Raw program code
        #[arg(short, long, value_name = "FILE")]
        program: PathBuf,

        /// Hex encoded input mapped read-only into the program's memory
        #[arg(short, long)]
        input: Option<String>,

        /// Gas per execution (defaults to pvm.default_gas)
        #[arg(short, long)]
        gas: Option<u64>,

        /// Number of executions
        #[arg(short, long, default_value = "1")]
        runs: usize,

        /// Pooled interpreters
        #[arg(long)]
        pool_capacity: Option<usize>,
    },
    /// Print the effective configuration
    Config {
        /// Write it to this file instead
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => config::NodeConfig::from_file(path)?,
        None => config::NodeConfig::default(),
    };

    // Override with CLI args
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.format = "json".to_string();
    }
    if let Command::Run {
        pool_capacity: Some(capacity),
        ..
    } = &args.command
    {
        config.pvm.pool_capacity = *capacity;
    }

    config.validate()?;

    match &config.logging.log_file {
        Some(path) => telemetry::init_telemetry_with_file(
            &config.logging.level,
            config.logging.is_json(),
            path,
        )?,
        None => telemetry::init_telemetry(&config.logging.level, config.logging.is_json())?,
    }

    match args.command {
        Command::Run {
            program,
            input,
            gas,
            runs,
            ..
        } => {
            info!("Node: {}", config.name);
            let code = std::fs::read(&program).map_err(|e| {
                anyhow::anyhow!("Failed to read program '{}': {}", program.display(), e)
            })?;
            let input = match input {
                Some(input) => hex::decode(input.trim_start_matches("0x"))
                    .map_err(|e| anyhow::anyhow!("Invalid input hex: {}", e))?,
                None => Vec::new(),
            };

            let runner = runner::Runner::new(config.pvm.clone())?;
            let results = runner.run_many(code.into(), &input, gas, runs).await;
            let results = match results {
                Ok(results) => results,
                Err(e) => {
                    error!("Execution failed: {}", e);
                    return Err(e);
                }
            };

            for (run, result) in results.iter().enumerate() {
                println!("{}", summarize(run, result));
            }
            info!(
                runs = results.len(),
                pool_capacity = runner.config().pool_capacity,
                idle = runner.pool().idle_count(),
                "All executions finished"
            );
        }
        Command::Config { output } => match output {
            Some(path) => {
                config.to_file(&path)?;
                info!("Configuration written to {:?}", path);
            }
            None => print!("{}", config.to_toml()?),
        },
    }

    Ok(())
}

/// One line per execution, e.g. `run 0: halt 0x0102 (gas used 17)`.
fn summarize(run: usize, result: &ExecutionResult) -> String {
    let outcome = match &result.outcome {
        ExecutionOutcome::Halt(output) => format!("halt 0x{}", hex::encode(output)),
        ExecutionOutcome::OutOfGas => "out of gas".to_string(),
        ExecutionOutcome::Panic => "panic".to_string(),
    };
    format!("run {}: {} (gas used {})", run, outcome, result.gas_used)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_cli_args() {
        let args = Args::parse_from([
            "tessera-node",
            "run",
            "--program", "code.bin",
            "--gas", "500",
            "--runs", "4",
        ]);

        match args.command {
            Command::Run { program, gas, runs, input, .. } => {
                assert_eq!(program, PathBuf::from("code.bin"));
                assert_eq!(gas, Some(500));
                assert_eq!(runs, 4);
                assert!(input.is_none());
            }
            Command::Config { .. } => panic!("expected run"),
        }
        assert!(!args.json_logs);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::parse_from(["tessera-node", "config", "--json-logs", "-l", "debug"]);
        assert!(matches!(args.command, Command::Config { output: None }));
        assert!(args.json_logs);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_run_requires_program() {
        assert!(Args::try_parse_from(["tessera-node", "run"]).is_err());
    }

    #[test]
    fn test_summarize() {
        let result = ExecutionResult {
            outcome: ExecutionOutcome::Halt(Bytes::from_static(&[1, 2])),
            gas_used: 17,
        };
        assert_eq!(summarize(0, &result), "run 0: halt 0x0102 (gas used 17)");

        let result = ExecutionResult {
            outcome: ExecutionOutcome::OutOfGas,
            gas_used: 9,
        };
        assert_eq!(summarize(3, &result), "run 3: out of gas (gas used 9)");
    }
}
