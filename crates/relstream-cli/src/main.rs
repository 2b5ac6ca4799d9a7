mod commands;
mod config;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "relstream",
    version,
    about = "Compile and run multi-table join queries"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace). Defaults to `warn` for
    /// `explain` and `info` for `run`.
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the SQL and bound values a query compiles to
    Explain {
        /// Path to query YAML file
        query: PathBuf,
    },
    /// Run a query against its SQLite database and print rows as JSON lines
    Run {
        /// Path to query YAML file
        query: PathBuf,
        /// Maximum rows to return (overrides the file's limit)
        #[arg(long)]
        limit: Option<u64>,
    },
}

impl Commands {
    fn default_log_level(&self) -> &'static str {
        match self {
            Self::Explain { .. } => "warn",
            Self::Run { .. } => "info",
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = cli
        .log_level
        .as_deref()
        .unwrap_or_else(|| cli.command.default_log_level());
    logging::init(level);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match cli.command {
        Commands::Explain { query } => commands::explain::execute(&query, &mut out),
        Commands::Run { query, limit } => commands::run::execute(&query, limit, &mut out),
    }
}
