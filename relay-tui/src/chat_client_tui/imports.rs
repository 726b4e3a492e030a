pub use std::sync::{Arc, Mutex};
pub use std::thread;

pub use anyhow::{Context, Result};
pub use chrono::Local;
pub use cursive::CbSink;
pub use cursive::Cursive;
pub use cursive::align::HAlign;
pub use cursive::theme::{BaseColor, Color, Palette, PaletteColor, Theme};
pub use cursive::traits::*;
pub use cursive::utils::markup::StyledString;
pub use cursive::views::{
    Button, Dialog, EditView, LinearLayout, ScrollView, TextContent, TextView,
};
pub use serde_json::Value;
pub use tokio::runtime::{Handle, Runtime};
pub use tracing::{info, warn};

pub use relay_core::types::{ERROR_EVENT, ServerError};
pub use relay_core::{
    Channel, ClientOptions, ComposeForm, ConnectionTarget, MessageList, MessageRelayClient,
    RelayConfig, RenderedLine, Subscription, TcpChannel,
};

pub use crate::shared::colours::*;
pub use crate::shared::{SharedClient, TextLine, global_quit};
