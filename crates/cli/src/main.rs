//! Anvil CLI - main entry point

mod cli;
mod init;

use clap::{Parser, Subcommand};
use anvil_foundation::{provider_store, JsonStore, ProviderConfig, ProviderType};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Anvil - AI-powered coding assistant for the terminal
#[derive(Parser, Debug)]
#[command(name = "anvil")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Run a single prompt non-interactively and exit
    #[arg(short, long)]
    prompt: Option<String>,

    /// Resume a specific session by id
    #[arg(short, long)]
    session: Option<String>,

    /// Provider to use (anthropic, openai, gemini, groq, ollama)
    #[arg(long)]
    provider: Option<String>,

    /// Model to use
    #[arg(long)]
    model: Option<String>,

    /// API key for the provider (overrides env and config)
    #[arg(long)]
    api_key: Option<String>,

    /// Base URL for the provider (for ollama or custom endpoints)
    #[arg(long)]
    base_url: Option<String>,

    /// Cap on tool-execution rounds per turn
    #[arg(long, default_value_t = 50)]
    max_tool_rounds: u32,

    /// Hard cost ceiling for the session, in dollars
    #[arg(long)]
    session_cost_limit: Option<f64>,

    /// Disable automatic sandboxing of shell/file tools
    #[arg(long)]
    no_auto_sandbox: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Skip auto-initialization check
    #[arg(long)]
    no_init: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize anvil in the current directory
    Init {
        /// Force reinitialization even if already initialized
        #[arg(short, long)]
        force: bool,
    },
    /// List recent sessions
    Sessions {
        /// Number of sessions to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

fn session_store() -> JsonStore {
    JsonStore::global().unwrap_or_else(|_| JsonStore::new(std::path::PathBuf::from(".anvil")))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Some(command) = args.command {
        return match command {
            Command::Init { force } => match init::init_project(force) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("anvil init failed: {}", e);
                    ExitCode::from(2)
                }
            },
            Command::Sessions { limit } => match list_sessions_cmd(limit).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("{}", e);
                    ExitCode::from(2)
                }
            },
        };
    }

    if !args.no_init {
        init::check_and_auto_init();
    }

    let mut config = ProviderConfig::load().unwrap_or_else(|e| {
        eprintln!("Warning: failed to load config: {}", e);
        ProviderConfig::default()
    });

    if let Some(provider_name) = &args.provider {
        let provider_type = match provider_name.as_str() {
            "anthropic" => ProviderType::Anthropic,
            "openai" => ProviderType::Openai,
            "gemini" => ProviderType::Gemini,
            "groq" => ProviderType::Groq,
            "ollama" => ProviderType::Ollama,
            _ => {
                eprintln!("Warning: unknown provider '{}', using anthropic", provider_name);
                ProviderType::Anthropic
            }
        };

        if !config.contains(provider_name) {
            let mut provider = provider_store::Provider::new(provider_type);
            if let Some(model) = &args.model {
                provider = provider.model(model.clone());
            }
            if let Some(base_url) = &args.base_url {
                provider = provider.base_url(base_url.clone());
            }
            if let Some(api_key) = &args.api_key {
                provider = provider.api_key(api_key.clone());
            }
            config.add(provider_name, provider);
        } else if let Some(provider) = config.get_mut(provider_name) {
            if let Some(model) = &args.model {
                provider.model = Some(model.clone());
            }
            if let Some(base_url) = &args.base_url {
                provider.base_url = Some(base_url.clone());
            }
            if let Some(api_key) = &args.api_key {
                provider.api_key = Some(api_key.clone());
            }
        }

        config.set_default(provider_name);
        tracing::info!("Using provider: {}", provider_name);
    } else if let Some(api_key) = &args.api_key {
        config.set_api_key("anthropic", api_key);
        tracing::info!("Using API key from command line for provider: anthropic");
    }

    let Some(prompt) = args.prompt else {
        eprintln!("anvil: no prompt given. Pass --prompt \"...\" to run a task, or a subcommand (init, sessions).");
        return ExitCode::from(2);
    };

    let session_mgr = anvil_agent::SessionManager::with_store(session_store());
    let session = match &args.session {
        Some(id) => session_mgr.get(id).await.unwrap_or_else(|| {
            let s = anvil_agent::Session::with_id(id.clone());
            s
        }),
        None => session_mgr.get_or_create().await,
    };
    session_mgr.add_session(session.clone()).await;

    let opts = cli::RunOptions {
        max_tool_rounds: args.max_tool_rounds,
        session_cost_limit: args.session_cost_limit,
        session_id: session.id.clone(),
    };

    match cli::run_once(&config, &prompt, opts).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(anvil_foundation::Error::Cancelled(msg)) => {
            eprintln!("anvil: cancelled ({})", msg);
            ExitCode::from(130)
        }
        Err(e) => {
            eprintln!("anvil: {}", e);
            ExitCode::from(2)
        }
    }
}

async fn list_sessions_cmd(limit: usize) -> anyhow::Result<()> {
    let session_mgr = anvil_agent::SessionManager::with_store(session_store());
    let sessions = session_mgr.list().await;

    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!("\nRecent sessions\n");
    println!("{:<10} {:<30} {:<20}", "ID", "Title", "Updated");
    println!("{}", "-".repeat(64));

    for session in sessions.into_iter().take(limit) {
        let id_short = if session.id.len() >= 8 { &session.id[..8] } else { &session.id };
        let title = session.title.clone().unwrap_or_else(|| "(untitled)".to_string());
        println!("{:<10} {:<30} {:<20}", id_short, title, session.updated_at.to_rfc3339());
    }

    println!("\nUse 'anvil --session <ID> --prompt \"...\"' to resume a specific session.\n");
    Ok(())
}
