//! Command-line interface parsing and handling

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::core::app::App;
use crate::core::chat_stream::{GeminiBackend, DEFAULT_GEMINI_BASE_URL};
use crate::core::config::data::{path_display, Config};
use crate::core::models::ModelCatalog;
use crate::core::storage::{FileStore, KeyValueStore, MemoryStore};
use crate::ui::capabilities::FsImageReader;
use crate::ui::chat_loop::{run_chat, Capabilities};
use crate::utils::logging::init_tracing;

#[derive(Parser)]
#[command(name = "omnichat", version)]
#[command(about = "Terminal chat client for Gemini models")]
#[command(
    long_about = "OmniChat keeps any number of independent chats, each with its own model, \
and streams replies from the Gemini API as they are generated. Chats and the theme \
choice are saved between runs.\n\n\
Environment Variables:\n\
  GEMINI_API_KEY    Your Gemini API key (API_KEY is read as a fallback)\n\
  RUST_LOG          Log filter, defaults to warn\n\n\
Type /help inside a chat for the list of commands."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model for new chats (see `omnichat models`)
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Directory holding saved chats
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Write diagnostic logs to this file instead of stderr
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Keep chats in memory only; nothing is saved
    #[arg(long, global = true)]
    pub ephemeral: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat interface (default)
    Chat,
    /// List the available models
    Models,
    /// Set a configuration value (default-model, api-base-url, data-dir)
    Set {
        key: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset a configuration value
    Unset { key: String },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.log.as_deref())?;

    tokio::runtime::Runtime::new()?.block_on(handle_args(args))
}

async fn handle_args(mut args: Args) -> Result<(), Box<dyn Error>> {
    match args.command.take() {
        Some(Commands::Models) => {
            print!("{}", list_models(ModelCatalog::builtin()));
            Ok(())
        }
        Some(Commands::Set { key, value }) => {
            let mut config = Config::load()?;
            let message = apply_set(&mut config, &key, &value.join(" "))?;
            config.save()?;
            println!("{message}");
            Ok(())
        }
        Some(Commands::Unset { key }) => {
            let mut config = Config::load()?;
            let message = apply_unset(&mut config, &key)?;
            config.save()?;
            println!("{message}");
            Ok(())
        }
        Some(Commands::Chat) | None => start_chat(args).await,
    }
}

async fn start_chat(args: Args) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let default_model = args
        .model
        .clone()
        .or_else(|| config.default_model.clone())
        .unwrap_or_else(|| ModelCatalog::builtin().default_id().to_string());

    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| config.resolve_data_dir());
    let (sessions, settings): (Box<dyn KeyValueStore>, Box<dyn KeyValueStore>) = if args.ephemeral
    {
        (Box::new(MemoryStore::new()), Box::new(MemoryStore::new()))
    } else {
        debug!(dir = %path_display(&data_dir), "using data directory");
        (
            Box::new(FileStore::new(&data_dir)),
            Box::new(FileStore::new(&data_dir)),
        )
    };
    let app = App::new(sessions, settings, &default_model);

    let base_url = config
        .api_base_url
        .clone()
        .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string());
    let api_key = GeminiBackend::api_key_from_env();
    if api_key.is_none() {
        eprintln!("GEMINI_API_KEY is not set; replies will fail until it is.");
    }
    let backend = Arc::new(GeminiBackend::new(reqwest::Client::new(), base_url, api_key));

    let capabilities = Capabilities {
        images: Arc::new(FsImageReader),
        speech: None,
    };
    let export_dir = std::env::current_dir()?;
    run_chat(app, backend, capabilities, export_dir).await
}

pub fn list_models(catalog: &ModelCatalog) -> String {
    let mut out = String::new();
    for (provider, models) in catalog.by_provider() {
        out.push_str(&format!("{provider}\n"));
        for model in models {
            let marker = if model.id == catalog.default_id() { '*' } else { ' ' };
            let vision = if model.vision { "vision" } else { "text" };
            out.push_str(&format!(
                "{marker} {:<36} {:<40} {:<7} {}\n",
                model.id, model.name, model.speed, vision
            ));
        }
    }
    out
}

pub fn apply_set(config: &mut Config, key: &str, value: &str) -> Result<String, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(format!("A value is required for {key}"));
    }
    match key {
        "default-model" => {
            if ModelCatalog::builtin().find(value).is_none() {
                return Err(format!(
                    "Unknown model '{value}'. Run `omnichat models` for the list."
                ));
            }
            config.default_model = Some(value.to_string());
        }
        "api-base-url" => config.api_base_url = Some(value.to_string()),
        "data-dir" => config.data_dir = Some(PathBuf::from(value)),
        _ => return Err(format!("Unknown config key: {key}")),
    }
    Ok(format!("Set {key} to: {value}"))
}

pub fn apply_unset(config: &mut Config, key: &str) -> Result<String, String> {
    match key {
        "default-model" => config.default_model = None,
        "api-base-url" => config.api_base_url = None,
        "data-dir" => config.data_dir = None,
        _ => return Err(format!("Unknown config key: {key}")),
    }
    Ok(format!("Unset {key}"))
}
