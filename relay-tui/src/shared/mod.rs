pub mod colours;

use std::sync::{Arc, Mutex};

use cursive::Cursive;
use relay_core::{MessageRelayClient, TcpChannel};

use colours::LineColor;

/// The relay client as shared between UI callbacks. Every callback runs on
/// the cursive thread; the mutex only makes the handle `Send + Sync`.
pub type SharedClient = Arc<Mutex<MessageRelayClient<TcpChannel>>>;

/// A system line (status, errors) shown between chat messages.
#[derive(Debug, Clone)]
pub struct TextLine {
    pub text: String,
    pub color: Option<LineColor>,
}

impl TextLine {
    pub fn new(text: impl Into<String>, color: &LineColor) -> Self {
        Self {
            text: text.into(),
            color: Some(*color),
        }
    }
}

/// Closes the channel, which ends the forwarding threads, then quits the UI.
pub fn global_quit(siv: &mut Cursive, client: Option<&SharedClient>) {
    if let Some(client) = client {
        if let Ok(client) = client.lock() {
            client.channel().close();
        }
    }
    siv.quit();
}
