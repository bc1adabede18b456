// src/main.rs — Engram entry point

use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::io::Write;
use std::sync::Arc;

use engram::api::{self, ApiState};
use engram::engine::{DocumentInput, Engine};
use engram::infra::config::Config;
use engram::infra::{logger, paths};
use engram::memory::{spawn_store_server, MemoryManager, StoreHandle};
use engram::provider::registry::ProviderRegistry;
use engram::provider::robust::friendly_error_message;
use engram::provider::{GenOptions, ProviderConfig, ProviderKind};

#[derive(Parser)]
#[command(name = "engram", version, about = "Memory-augmented assistant engine")]
struct Cli {
    /// Path to an alternate config.toml
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message and print the reply
    Chat {
        /// The message text
        message: Vec<String>,

        /// Print tokens as they arrive instead of waiting for the full reply
        #[arg(long)]
        stream: bool,

        /// Provider to try first: openai or ondevice
        #[arg(long)]
        provider: Option<String>,

        /// Skip memory retrieval and persistence for this message
        #[arg(long)]
        no_memory: bool,
    },

    /// Run the HTTP API server
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },

    /// Inspect and manage the memory store
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Probe provider availability
    Providers,
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Show record count and age range
    Stats,
    /// Ranked search over stored records
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Store a text fragment directly
    Add { text: String },
    /// Delete every stored record
    Clear {
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    // Initialize logging (respects RUST_LOG)
    logger::init_logging("warn");

    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if let Some(ref path) = cli.config {
        Config::load_from(path)?
    } else {
        Config::load()?
    };

    paths::ensure_dirs().await?;
    let memory = init_memory(&config)?;
    let registry = ProviderRegistry::new(
        memory.clone(),
        ProviderConfig::from_generation(&config.generation),
    );
    let engine = Engine::new(registry, memory, &config);

    match cli.command {
        Commands::Chat {
            message,
            stream,
            provider,
            no_memory,
        } => {
            let text = message.join(" ");
            if text.trim().is_empty() {
                anyhow::bail!("No message provided. Usage: engram chat <message>");
            }

            let preferred = match provider {
                Some(ref name) => ProviderKind::parse(name)
                    .ok_or_else(|| anyhow::anyhow!("Unknown provider '{name}'"))?,
                None => engine.preferred_provider(),
            };
            let options = GenOptions {
                memory_enabled: if no_memory { Some(false) } else { None },
                ..Default::default()
            };

            if stream {
                let mut chunks = engine
                    .send_streaming_message_with(&text, preferred, &options)
                    .await;
                while let Some(chunk) = chunks.next().await {
                    match chunk {
                        Ok(delta) => {
                            print!("{delta}");
                            std::io::stdout().flush()?;
                        }
                        Err(e) => {
                            eprintln!("\n{}", friendly_error_message(&e));
                            break;
                        }
                    }
                }
                println!();
            } else {
                match engine.send_message_with(&text, preferred, &options).await {
                    Ok(response) => println!("{response}"),
                    Err(e) => {
                        tracing::warn!("chat failed: {e}");
                        eprintln!("{}", friendly_error_message(&e));
                    }
                }
            }
            Ok(())
        }

        Commands::Serve { port } => {
            let mut api_config = config.api.clone();
            if let Some(port) = port {
                api_config.port = port;
            }
            let state = ApiState {
                engine: Arc::new(engine),
                token: api_config.token.clone(),
            };
            api::start_server(&api_config, state).await
        }

        Commands::Memory { action } => run_memory_action(&engine, action).await,

        Commands::Providers => {
            for (kind, available) in engine.registry().check_all_providers().await {
                println!(
                    "{:<10} {}",
                    kind.to_string(),
                    if available { "available" } else { "unavailable" }
                );
            }
            Ok(())
        }
    }
}

async fn run_memory_action(engine: &Engine, action: MemoryAction) -> anyhow::Result<()> {
    match action {
        MemoryAction::Stats => {
            let stats = engine.memory_stats().await?;
            println!("records: {}", stats.total_memories);
            println!("oldest:  {}", stats.oldest_memory.as_deref().unwrap_or("-"));
            println!("newest:  {}", stats.newest_memory.as_deref().unwrap_or("-"));
        }
        MemoryAction::Search { query, limit } => {
            let results = engine.search_memories(&query).await;
            for result in results.into_iter().take(limit as usize) {
                println!(
                    "[{:>5}] {:.3}  {}",
                    result.record.id, result.relevance_score, result.record.content
                );
            }
        }
        MemoryAction::Add { text } => {
            let records = engine
                .add_documents(vec![DocumentInput {
                    id: uuid::Uuid::new_v4().to_string(),
                    text,
                    metadata: None,
                }])
                .await?;
            for record in records {
                println!("stored memory {}", record.id);
            }
        }
        MemoryAction::Clear { yes } => {
            if !yes {
                anyhow::bail!("Refusing to clear memories without --yes");
            }
            engine.clear_memories().await?;
            println!("all memories cleared");
        }
    }
    Ok(())
}

/// Open the memory database, run migrations, and spawn the store server.
fn init_memory(config: &Config) -> anyhow::Result<StoreHandle> {
    let db_path = config
        .memory
        .db_path
        .as_ref()
        .map(std::path::PathBuf::from)
        .unwrap_or_else(paths::db_path);

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = MemoryManager::open(&db_path, config.memory.vector_dimensions)?;
    let (handle, _join) = spawn_store_server(manager.store);
    Ok(handle)
}
