//! docdex CLI — the reference host-shell client for the indexer daemon.
//!
//! Talks to `docdex daemon` over its Unix socket; every subcommand here
//! is a thin wrapper around one RPC method.

mod client;
mod commands;
mod logging;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use commands::{
  ConfigSetArgs, cmd_config_set, cmd_config_show, cmd_daemon, cmd_enqueue, cmd_files, cmd_folders, cmd_logs, cmd_pause,
  cmd_reindex, cmd_resume, cmd_search, cmd_stats, cmd_status, cmd_stop, cmd_watch,
};
use logging::init_cli_logging;
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docdex")]
#[command(about = "Local, offline semantic search over a watched document collection")]
#[command(after_help = "\
QUICK START:
  docdex daemon                         # start the indexing daemon
  docdex watch ~/Documents ~/Notes      # watch folders for indexing
  docdex search \"project kickoff notes\" # semantic search over indexed chunks")]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum ConfigCommand {
  /// Show the daemon's effective settings
  Show,
  /// Update one or more settings
  Set {
    #[arg(long)]
    embedding_batch_size: Option<usize>,
    #[arg(long)]
    max_tokens_per_batch: Option<usize>,
    #[arg(long)]
    max_queue_size: Option<usize>,
    #[arg(long)]
    backpressure_threshold: Option<usize>,
    /// low, medium, or high
    #[arg(long, value_parser = ["low", "medium", "high"])]
    cpu_throttle: Option<String>,
    #[arg(long)]
    max_retries: Option<u32>,
  },
}

#[derive(Subcommand)]
enum Commands {
  /// Start the daemon
  Daemon {
    /// Run in foreground and log to the console instead of forking
    #[arg(long)]
    foreground: bool,
  },
  /// Stop a running daemon
  Stop,
  /// Show daemon state and queue depth
  Status,
  /// Start watching one or more folders for changes
  Watch {
    /// Root folders to watch (absolute or relative)
    roots: Vec<PathBuf>,
    /// Additional glob patterns to exclude
    #[arg(long)]
    exclude: Vec<String>,
  },
  /// List the currently watched folders
  Folders,
  /// Force one or more paths into the indexing queue
  Enqueue {
    paths: Vec<PathBuf>,
  },
  /// Re-scan every watched folder and re-enqueue everything
  Reindex,
  /// Pause the indexing consumer
  Pause,
  /// Resume the indexing consumer
  Resume,
  /// Semantic search over indexed chunks
  Search {
    query: String,
    #[arg(short, long)]
    k: Option<usize>,
    #[arg(long)]
    json: bool,
  },
  /// List indexed file paths matching a substring
  Files {
    query: String,
  },
  /// Show chunk/file counts
  Stats,
  /// View or update daemon settings
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
  /// Tail the daemon's log file
  Logs {
    #[arg(short, long)]
    follow: bool,
    #[arg(short = 'n', long, default_value = "50")]
    lines: usize,
  },
  /// Generate shell completions
  Completions {
    #[arg(value_enum)]
    shell: Shell,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  init_cli_logging();

  match cli.command {
    Commands::Daemon { foreground } => cmd_daemon(foreground).await,
    Commands::Stop => cmd_stop().await,
    Commands::Status => cmd_status().await,
    Commands::Watch { roots, exclude } => cmd_watch(roots, exclude).await,
    Commands::Folders => cmd_folders().await,
    Commands::Enqueue { paths } => cmd_enqueue(paths).await,
    Commands::Reindex => cmd_reindex().await,
    Commands::Pause => cmd_pause().await,
    Commands::Resume => cmd_resume().await,
    Commands::Search { query, k, json } => cmd_search(query, k, json).await,
    Commands::Files { query } => cmd_files(query).await,
    Commands::Stats => cmd_stats().await,
    Commands::Config { command } => match command {
      ConfigCommand::Show => cmd_config_show().await,
      ConfigCommand::Set {
        embedding_batch_size,
        max_tokens_per_batch,
        max_queue_size,
        backpressure_threshold,
        cpu_throttle,
        max_retries,
      } => {
        cmd_config_set(ConfigSetArgs {
          embedding_batch_size,
          max_tokens_per_batch,
          max_queue_size,
          backpressure_threshold,
          cpu_throttle,
          max_retries,
        })
        .await
      }
    },
    Commands::Logs { follow, lines } => cmd_logs(follow, lines).await,
    Commands::Completions { shell } => {
      print_completions(shell);
      Ok(())
    }
  }
}

fn print_completions(shell: Shell) {
  clap_complete::generate(shell, &mut Cli::command(), "docdex", &mut io::stdout());
}
