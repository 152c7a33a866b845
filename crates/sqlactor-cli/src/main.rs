// SPDX-FileCopyrightText: 2026 Sqlactor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! sqlactor - run SQL against a database through an async connection.
//!
//! This is the binary entry point.

mod backup;
mod query;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sqlactor::{ConnectOptions, SqlActorError};
use sqlactor_config::SqlActorConfig;
use thiserror::Error;

/// sqlactor - run SQL against a database through an async connection.
#[derive(Parser, Debug)]
#[command(name = "sqlactor", version, about, long_about = None)]
struct Cli {
    /// Configuration file to load instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database to open. Overrides `connection.database`.
    #[arg(long, short = 'd', global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute one statement and print the rows it returns.
    Query {
        sql: String,
        /// Positional parameter; repeat for each `?`.
        #[arg(short = 'p', long = "param")]
        params: Vec<String>,
        /// Print each row as a JSON object.
        #[arg(long)]
        json: bool,
    },
    /// Run a multi-statement SQL script from a file.
    Script { file: PathBuf },
    /// Print the database as SQL statements.
    Dump,
    /// Copy the database to a file.
    Backup { dest: PathBuf },
}

/// Failures surfaced by the binary.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    #[error(transparent)]
    Database(#[from] SqlActorError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

impl CliError {
    pub(crate) fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| Self::Io { context, source }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => sqlactor_config::load_and_validate_path(path),
        None => sqlactor_config::load_and_validate(),
    };
    let mut config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            sqlactor_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    if let Some(database) = cli.database {
        config.connection.database = database;
    }

    init_tracing(&config.log.level);

    if let Err(err) = run(cli.command, &config).await {
        eprintln!("sqlactor: {err}");
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: &SqlActorConfig) -> Result<(), CliError> {
    let conn = ConnectOptions::from_config(&config.connection)
        .connect()
        .await?;
    tracing::debug!(database = %conn.database().display(), "connected");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let outcome = match command {
        Commands::Query { sql, params, json } => {
            query::run_query(&conn, &sql, &params, json, &mut out).await
        }
        Commands::Script { file } => query::run_script(&conn, &file, &mut out).await,
        Commands::Dump => query::run_dump(&conn, &mut out).await,
        Commands::Backup { dest } => backup::run_backup(&conn, &dest).await,
    };

    let closed = conn.close().await;
    outcome?;
    closed?;
    Ok(())
}

/// Initialize the tracing subscriber with an env-filter.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sqlactor={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .init();
}
