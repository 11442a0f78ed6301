//! # Wiz CLI (`wiz`)
//!
//! Ingests installation docs, repositories and knowledge-base entries into
//! a vector index and answers support conversations from it.
//!
//! ## Usage
//!
//! ```bash
//! wiz --config ./config/wiz.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `wiz init` | Create the SQLite database and schema |
//! | `wiz sources` | List connectors in dispatch order |
//! | `wiz kb sync` | Reindex knowledge-base entries |
//! | `wiz ingest <link>` | Fetch a link with the matching connector and index it |
//! | `wiz search "<query>"` | Nearest chunks for a query |
//! | `wiz chat` | Talk to the assistant on stdin |
//! | `wiz serve` | Start the HTTP chat bridge |
//!
//! Logs go to stderr; set `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use wiz_harness::assistant::manager::InboundMessage;
use wiz_harness::{config, ingest, server, sources};

#[derive(Parser)]
#[command(
    name = "wiz",
    about = "Retrieval-augmented installation support assistant",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/wiz.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// List connectors and knowledge-base status.
    Sources,

    /// Knowledge-base commands.
    Kb {
        #[command(subcommand)]
        action: KbAction,
    },

    /// Fetch a link and index it.
    ///
    /// GitHub links are cloned, `file://` links and local paths are read
    /// from disk, anything else is fetched as a web article.
    Ingest {
        link: String,

        /// Author full name recorded on the document.
        #[arg(long)]
        author: Option<String>,

        /// Refetch even if the link is already stored.
        #[arg(long)]
        force: bool,
    },

    /// Search indexed chunks by similarity.
    Search {
        query: String,

        #[arg(long, default_value = "5")]
        limit: usize,
    },

    /// Interactive conversation on stdin.
    Chat {
        #[arg(long, default_value = "cli")]
        channel: String,

        #[arg(long, default_value = "local")]
        user: String,
    },

    /// Start the HTTP chat bridge on `[server] bind`.
    Serve,
}

#[derive(Subcommand)]
enum KbAction {
    /// Reindex entries matching the category filter.
    Sync {
        /// Category to include (repeatable). Defaults to `[knowledge_base] categories`.
        #[arg(long = "category")]
        categories: Vec<String>,

        /// Include deprecated entries.
        #[arg(long)]
        include_deprecated: bool,

        /// Count entries and chunks without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run_chat(cfg: &config::Config, channel: String, user: String) -> anyhow::Result<()> {
    let manager = server::open_manager(cfg).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Type a message, or /reset to start over. Ctrl-D exits.");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/reset" {
            manager.reset(&channel, &user).await;
            println!("(conversation reset)");
            continue;
        }

        let reply = manager
            .handle_message(InboundMessage {
                channel_id: channel.clone(),
                user_id: user.clone(),
                message: line.to_string(),
                attachments: Vec::new(),
            })
            .await;
        println!("\n{}\n", reply.response);
        println!(
            "[status: {} | turn: {}]",
            reply.state.status, reply.state.iteration_count
        );
        if reply.state.status.is_terminal() {
            println!("(conversation closed; the next message starts a new one)");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            ingest::run_init(&cfg).await?;
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Kb { action } => match action {
            KbAction::Sync {
                categories,
                include_deprecated,
                dry_run,
            } => {
                ingest::run_kb_sync(&cfg, categories, include_deprecated, dry_run).await?;
            }
        },
        Commands::Ingest {
            link,
            author,
            force,
        } => {
            ingest::run_ingest(&cfg, &link, author, force).await?;
        }
        Commands::Search { query, limit } => {
            ingest::run_search(&cfg, &query, limit).await?;
        }
        Commands::Chat { channel, user } => {
            run_chat(&cfg, channel, user).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
