use std::path::PathBuf;

use clap::{Parser, Subcommand};
use recall_cli::commands::{
    AppendCommand, ArchiveCommand, ContextCommand, SpeakCommand, StatsCommand,
};
use recall_cli::error::CliResult;
use recall_cli::output::OutputFormat;
use recall_cli::workspace::Workspace;
use recall_engine::config::Config;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "recall")]
#[command(about = "Recall CLI - Inspect and drive hierarchical entity memories")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'd', global = true, help = "Path to data directory")]
    pub data_dir: Option<PathBuf>,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Append a message to an entity and run compression")]
    Append(AppendCommand),

    #[clap(about = "Show store statistics")]
    Stats(StatsCommand),

    #[clap(about = "Assemble bounded context for an entity")]
    Context(ContextCommand),

    #[clap(about = "Show the items a summary replaced")]
    Archive(ArchiveCommand),

    #[clap(about = "Send a message from one entity to another")]
    Speak(SpeakCommand),
}

#[tokio::main]
async fn main() {
    init_logging();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,recall_engine=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let config = Config::load(cli.config.as_deref())?;
    let workspace = Workspace::open(config, cli.data_dir.as_deref())?;

    match &cli.command {
        Command::Append(cmd) => cmd.execute(&workspace, format).await,
        Command::Stats(cmd) => cmd.execute(&workspace, format).await,
        Command::Context(cmd) => cmd.execute(&workspace, format).await,
        Command::Archive(cmd) => cmd.execute(&workspace, format).await,
        Command::Speak(cmd) => cmd.execute(&workspace, format).await,
    }
}
