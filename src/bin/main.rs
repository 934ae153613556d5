//! Tally CLI - serve the report API or compile a report request to SQL
//!
//! Usage:
//!   tally serve [--config <tally.toml>] [--port <port>] [--db <path>]
//!   tally compile <request.json> [--output <format>]
//!
//! Examples:
//!   tally serve --port 3200 --db ./reports.db
//!   tally compile request.json
//!   tally compile request.json --output verbose

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use tally::compiler::assemble;
use tally::config::Settings;
use tally::RawReportQuery;

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Tally - compile declarative report definitions to parameterized SQL")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the report API server
    Serve {
        /// Path to the config file (defaults to the standard search order)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the configured database path
        #[arg(short, long)]
        db: Option<PathBuf>,
    },

    /// Compile a JSON report request to SQL without executing it
    Compile {
        /// Path to a JSON file holding the report request
        file: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "sql")]
        output: OutputFormat,

        /// Path to the config file providing the catalog
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Output SQL only
    Sql,
    /// Output SQL with parameters and diagnostics
    Verbose,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tally=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port, db } => cmd_serve(config, port, db).await,
        Commands::Compile {
            file,
            output,
            config,
        } => cmd_compile(file, output, config),
    }
}

fn load_settings(config: Option<PathBuf>) -> Result<Settings, ExitCode> {
    let result = match &config {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    };
    result.map_err(|e| {
        eprintln!("Error loading settings: {}", e);
        ExitCode::FAILURE
    })
}

async fn cmd_serve(config: Option<PathBuf>, port: Option<u16>, db: Option<PathBuf>) -> ExitCode {
    let mut settings = match load_settings(config) {
        Ok(s) => s,
        Err(code) => return code,
    };
    if let Some(port) = port {
        settings.server.port = port;
    }
    if let Some(db) = db {
        settings.store.path = db.display().to_string();
    }

    match tally::web::serve(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_compile(file: PathBuf, output: OutputFormat, config: Option<PathBuf>) -> ExitCode {
    let source = match fs::read_to_string(&file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let raw: RawReportQuery = match serde_json::from_str(&source) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error parsing request '{}': {}", file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let settings = match load_settings(config) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let registry = settings.catalog.registry();

    let (query, diagnostics) = raw.normalize(&raw.source);
    match assemble(&registry, &query) {
        Ok(compiled) => {
            match output {
                OutputFormat::Sql => {
                    println!("{}", compiled.sql);
                }
                OutputFormat::Verbose => {
                    println!("-- Source: {}", query.source);
                    for d in diagnostics.iter().chain(&compiled.diagnostics) {
                        println!("-- {}", d);
                    }
                    println!("{}", compiled.sql);
                    println!();
                    match serde_json::to_string(&compiled.params) {
                        Ok(params) => println!("-- Params: {}", params),
                        Err(e) => eprintln!("Error rendering params: {}", e),
                    }
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Compile error: {}", e);
            ExitCode::FAILURE
        }
    }
}
