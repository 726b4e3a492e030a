use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::channel::{Channel, Subscribers, Subscription};
use crate::codec::{read_envelope, write_envelope};
use crate::config::ConnectionTarget;
use crate::error::{RelayError, Result};
use crate::types::{ERROR_EVENT, Envelope, IDENTIFY_EVENT, Identify, MESSAGE_EVENT};

/// Subscribed before the reader starts so nothing the server sends right
/// after the handshake is lost.
const EARLY_EVENTS: &[&str] = &[MESSAGE_EVENT, ERROR_EVENT];

/// [`Channel`] over a TCP connection carrying JSON-line envelopes.
///
/// Emits are queued to a writer task, so they never block the caller.
/// A reader task routes inbound envelopes to subscribers by event name.
/// The first subscription to `message` or `error` also sees everything
/// received since connecting.
pub struct TcpChannel {
    outgoing: mpsc::UnboundedSender<Envelope>,
    subscribers: Subscribers,
    early: HashMap<String, Subscription>,
    connected: Arc<AtomicBool>,
    local_addr: SocketAddr,
    reader: AbortHandle,
}

impl TcpChannel {
    /// Connects to `target` and identifies as `username`. Must be called
    /// inside a tokio runtime.
    pub async fn connect(target: &ConnectionTarget, username: &str) -> Result<Self> {
        if target.scheme.is_secure() {
            warn!(%target, "TLS is not supported; connecting in plaintext");
        }

        let stream = TcpStream::connect(target.authority()).await?;
        let local_addr = stream.local_addr()?;
        info!(%target, %local_addr, "connected to relay");

        let (reader, writer) = stream.into_split();
        let mut writer = BufWriter::new(writer);

        let hello = Envelope::new(
            IDENTIFY_EVENT,
            &Identify {
                username: username.to_string(),
            },
        )?;
        write_envelope(&mut writer, &hello).await?;

        let connected = Arc::new(AtomicBool::new(true));
        let subscribers = Subscribers::default();
        let early = EARLY_EVENTS
            .iter()
            .map(|event| (event.to_string(), subscribers.subscribe(event)))
            .collect();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_writer(writer, outgoing_rx, Arc::clone(&connected)));
        let reader = tokio::spawn(run_reader(
            BufReader::new(reader),
            subscribers.clone(),
            Arc::clone(&connected),
        ))
        .abort_handle();

        Ok(Self {
            outgoing,
            subscribers,
            early,
            connected,
            local_addr,
            reader,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops reading; pending subscriptions end.
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.reader.abort();
        self.subscribers.close();
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl Channel for TcpChannel {
    fn emit(&mut self, event: &str, data: Value) -> Result<()> {
        if !self.is_connected() {
            return Err(RelayError::ChannelUnavailable);
        }
        self.outgoing
            .send(Envelope {
                event: event.to_string(),
                data,
            })
            .map_err(|_| RelayError::ChannelUnavailable)
    }

    fn subscribe(&mut self, event: &str) -> Subscription {
        self.early
            .remove(event)
            .unwrap_or_else(|| self.subscribers.subscribe(event))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

async fn run_writer(
    mut writer: BufWriter<OwnedWriteHalf>,
    mut outgoing: mpsc::UnboundedReceiver<Envelope>,
    connected: Arc<AtomicBool>,
) {
    while let Some(envelope) = outgoing.recv().await {
        if let Err(e) = write_envelope(&mut writer, &envelope).await {
            warn!("error writing to server: {e}");
            connected.store(false, Ordering::SeqCst);
            break;
        }
    }
    debug!("writer finished");
}

async fn run_reader(
    mut reader: BufReader<OwnedReadHalf>,
    subscribers: Subscribers,
    connected: Arc<AtomicBool>,
) {
    loop {
        match read_envelope(&mut reader).await {
            Ok(Some(envelope)) => {
                if subscribers.dispatch(&envelope.event, envelope.data) == 0 {
                    debug!(event = %envelope.event, "no subscriber; dropped");
                }
            }
            Ok(None) => {
                info!("server closed the connection");
                break;
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                warn!("skipping unreadable line from server: {e}");
            }
            Err(e) => {
                warn!("error reading from server: {e}");
                break;
            }
        }
    }
    connected.store(false, Ordering::SeqCst);
    subscribers.close();
}
