mod logging;
mod selftest;
mod serve;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use crate::logging::LogFormat;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Conformance sandboxes for DCSA-style APIs.
#[derive(Parser)]
#[command(name = "quayside", version, about = "Conformance sandboxes for DCSA-style APIs")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Log format (pretty or json)
    #[arg(long, global = true, default_value = "pretty", value_enum)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the sandbox HTTP API server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,
        /// Path to TLS certificate PEM file (requires --tls-key)
        #[arg(long)]
        tls_cert: Option<PathBuf>,
        /// Path to TLS private key PEM file (requires --tls-cert)
        #[arg(long)]
        tls_key: Option<PathBuf>,
    },

    /// Run every scenario with all parties simulated and print the report
    Run {
        /// Scenarios run side by side
        #[arg(long, default_value = "1")]
        parallel: usize,
        /// Roles to report on (default: all roles)
        #[arg(long = "role")]
        roles: Vec<String>,
        /// Print every check instead of one line per scenario
        #[arg(long)]
        detailed: bool,
    },

    /// List the scenarios of the standard
    Scenarios,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            tls_cert,
            tls_key,
        } => {
            // Validate TLS flags: both must be provided or neither
            if tls_cert.is_some() != tls_key.is_some() {
                eprintln!("error: --tls-cert and --tls-key must be provided together");
                process::exit(1);
            }
            logging::init(cli.log_format, "info");
            let rt = runtime();
            if let Err(e) = rt.block_on(serve::start_server(port, tls_cert, tls_key)) {
                eprintln!("Server error: {}", e);
                process::exit(1);
            }
        }
        Commands::Run {
            parallel,
            roles,
            detailed,
        } => {
            if parallel == 0 {
                eprintln!("error: --parallel must be at least 1");
                process::exit(1);
            }
            logging::init(cli.log_format, "warn");
            let rt = runtime();
            if let Err(e) = rt.block_on(selftest::run(parallel, roles, detailed, cli.output)) {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        }
        Commands::Scenarios => {
            if let Err(e) = selftest::list_scenarios(cli.output) {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        }
    }
}

fn runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {}", e);
            process::exit(1);
        }
    }
}
