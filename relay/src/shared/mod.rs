// adding all the imports here

pub mod config;

// Re-export external crates
pub use anyhow::{Context, Result};
pub use chrono::Local;
pub use tokio::io::{self, AsyncBufReadExt, BufReader};
pub use tracing::{info, warn};

// Re-export internal types
pub use relay_core::types::{ERROR_EVENT, ServerError};
pub use relay_core::{
    Channel, ComposeForm, MessageList, MessageRelayClient, RelayConfig, RelayError,
    RenderedLine, TcpChannel,
};
