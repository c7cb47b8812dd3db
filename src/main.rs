mod asana;
mod cache;
mod commands;
mod config;
mod db;
mod ingest;
mod logging;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "scrumsana")]
#[command(about = "Mirror Asana tasks, projects, tags and workspaces into a local SQLite store")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/scrumsana/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Path to the task database, overriding the config file
  #[arg(short, long)]
  database: Option<PathBuf>,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override database path if specified on command line
  let config = if let Some(path) = args.database {
    config::Config {
      database: config::DatabaseConfig { path: Some(path) },
      ..config
    }
  } else {
    config
  };

  let _log_guard = logging::init(&config.logging)?;

  commands::run(args.command, &config).await
}
