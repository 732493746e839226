mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{jobs::JobsSubcommand, plant::PlantSubcommand, schedule::ScheduleArgs, tokens::TokensSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "plants",
    about = "Text From Your Plants: claim stickers, watering schedules and WhatsApp reminders",
    version,
    propagate_version = true
)]
struct Cli {
    /// Data root (default: auto-detect from .plants/)
    #[arg(long, global = true, env = "PLANTS_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .plants/ with config, database and job queue
    Init {
        /// Public origin printed into claim URLs
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Run the HTTP API and the reminder worker
    Serve {
        /// Port to listen on (default: server.port from config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// List the species catalogue
    Species,

    /// Inspect plants
    Plant {
        #[command(subcommand)]
        subcommand: PlantSubcommand,
    },

    /// Mint claim tokens and sticker artwork
    Tokens {
        #[command(subcommand)]
        subcommand: TokensSubcommand,
    },

    /// Preview a watering schedule without touching the database
    Schedule(ScheduleArgs),

    /// Inspect the background job queue
    Jobs {
        #[command(subcommand)]
        subcommand: JobsSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init { base_url } => cmd::init::run(&root, base_url.as_deref()),
        Commands::Serve { port } => cmd::serve::run(&root, port),
        Commands::Species => cmd::species::run(cli.json),
        Commands::Plant { subcommand } => cmd::plant::run(&root, subcommand, cli.json),
        Commands::Tokens { subcommand } => cmd::tokens::run(&root, subcommand, cli.json),
        Commands::Schedule(args) => cmd::schedule::run(args, cli.json),
        Commands::Jobs { subcommand } => cmd::jobs::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
