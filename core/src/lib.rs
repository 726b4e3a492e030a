//! Direct-message relay.
//!
//! - [`client`] holds [`MessageRelayClient`], the two handlers that render
//!   inbound messages and forward composed ones.
//! - [`channel`] defines the channel capability the client depends on;
//!   [`client_backend::TcpChannel`] and [`memory::MemoryChannel`] implement it.
//! - [`codec`] is the JSON-line envelope framing shared by both ends.
//! - [`server_backend`] is the relay server that stamps sender identity and
//!   routes messages between conversation participants.

pub mod channel;
pub mod client;
pub mod client_backend;
pub mod codec;
pub mod config;
pub mod error;
pub mod format;
pub mod memory;
pub mod server_backend;
pub mod types;

pub use channel::{Channel, Subscription};
pub use client::{ComposeForm, MessageList, MessageRelayClient};
pub use client_backend::TcpChannel;
pub use config::{ClientOptions, ConnectionTarget, MalformedPolicy, RelayConfig, Scheme};
pub use error::RelayError;
pub use memory::MemoryChannel;
pub use server_backend::{RelayServer, ServerOptions};
pub use types::{Envelope, InboundMessage, MessageFormat, OutboundMessage, RenderedLine};
