mod client;
mod server;
mod shared;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use crate::shared::config::{CliOverrides, resolve};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[arg(short, long, default_value = "client")] // defaults to client
    mode: String,

    /// JSON config file; missing files fall back to defaults
    #[arg(long, default_value = "relay.json")]
    config: String,

    /// Page-style location the client connects to, e.g. http://host:8000/chat
    #[arg(short, long)]
    location: Option<String>,

    /// Name the server stamps on your messages
    #[arg(short, long)]
    username: Option<String>,

    /// Initial recipient
    #[arg(short, long)]
    to: Option<String>,

    /// Server bind address
    #[arg(long)]
    listen: Option<String>,

    /// Refuse to send blank messages
    #[arg(long)]
    reject_empty: bool,

    /// Render incomplete inbound messages with `undefined` instead of dropping them
    #[arg(long)]
    render_malformed: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = resolve(
        &cli.config,
        CliOverrides {
            location: cli.location,
            username: cli.username,
            recipient: cli.to,
            listen: cli.listen,
            reject_empty: cli.reject_empty,
            render_malformed: cli.render_malformed,
        },
    );

    match cli.mode.as_str() {
        "server" => server::run(config)?,
        "client" => client::run(config)?,
        _ => anyhow::bail!("Invalid mode. Use 'server' or 'client'"),
    }

    Ok(())
}
