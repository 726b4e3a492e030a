mod chat_client_tui;
mod shared;

use std::fs::File;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use relay_core::config::{MalformedPolicy, load_config};
use tracing_subscriber::{EnvFilter, fmt};

use crate::chat_client_tui::run_chat_tui;

#[derive(Parser)]
#[command(version, about = "Terminal UI for the direct-message relay")]
struct Cli {
    /// JSON config file; missing files fall back to defaults
    #[arg(long, default_value = "relay.json")]
    config: String,

    /// Page-style location to connect to, e.g. http://host:8000/chat
    #[arg(short, long)]
    location: Option<String>,

    /// Prefill for the username field
    #[arg(short, long)]
    username: Option<String>,

    /// Prefill for the recipient field
    #[arg(short, long)]
    to: Option<String>,

    /// Refuse to send blank messages
    #[arg(long)]
    reject_empty: bool,

    /// Render incomplete inbound messages with `undefined` instead of dropping them
    #[arg(long)]
    render_malformed: bool,

    /// Where logs go; the terminal belongs to the UI
    #[arg(long, default_value = "relay-tui.log")]
    log_file: String,
}

fn init_tracing(path: &str) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create log file {path}"))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_file)?;

    let mut config = load_config(&cli.config);
    if let Some(location) = cli.location {
        config.location = location;
    }
    if cli.username.is_some() {
        config.username = cli.username;
    }
    if cli.to.is_some() {
        config.recipient = cli.to;
    }
    if cli.reject_empty {
        config.reject_empty_messages = true;
    }
    if cli.render_malformed {
        config.malformed = MalformedPolicy::RenderLiteral;
    }

    run_chat_tui(config)
}
