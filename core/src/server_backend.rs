use anyhow::{Context, Result, bail};
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::codec::{is_line_too_long, read_envelope_limited, write_envelope};
use crate::config::RelayConfig;
use crate::format::classify;
use crate::types::{
    ERROR_EVENT, Envelope, IDENTIFY_EVENT, Identify, InboundMessage, MESSAGE_EVENT,
    OutboundMessage,
};

type SessionId = u64;

#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    pub max_connections: usize,
    pub message_buffer_size: usize,
    pub max_line_bytes: usize,
    pub identify_timeout: Duration,
}

impl From<&RelayConfig> for ServerOptions {
    fn from(config: &RelayConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            message_buffer_size: config.message_buffer_size.max(1),
            max_line_bytes: config.max_line_bytes,
            identify_timeout: Duration::from_secs(config.identify_timeout_secs),
        }
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

/// `"a <-> b"` with the two usernames in sorted order, so both
/// directions of a conversation share one key.
pub fn conversation_key(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("{first} <-> {second}")
}

/// Accepts clients, stamps sender identity from the session, and delivers
/// each message to every connection of both conversation participants.
pub struct RelayServer {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl RelayServer {
    pub fn new(listener: TcpListener, options: ServerOptions) -> Self {
        Self {
            listener,
            state: Arc::new(ServerState::new(options)),
        }
    }

    pub async fn bind(addr: &str, options: ServerOptions) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind to {addr}"))?;
        Ok(Self::new(listener, options))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let RelayServer { listener, state } = self;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("relay shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((socket, addr)) => {
                        debug!(%addr, "new connection");
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(socket, addr, state).await {
                                warn!(%addr, "connection closed with error: {e:#}");
                            }
                        });
                    }
                    Err(e) => warn!("failed to accept connection: {e}"),
                },
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to install ctrl-c handler: {e}");
            }
        })
        .await
    }
}

/// Binds `config.listen` and serves until ctrl-c.
pub async fn run_server_backend(config: &RelayConfig) -> Result<()> {
    let server = RelayServer::bind(&config.listen, ServerOptions::from(config)).await?;
    info!("relay listening on {}", server.local_addr()?);
    server.run_until_ctrl_c().await
}

struct ServerState {
    options: ServerOptions,
    sessions: Mutex<HashMap<String, HashMap<SessionId, mpsc::Sender<Envelope>>>>,
    active: AtomicUsize,
    next_id: AtomicU64,
}

impl ServerState {
    fn new(options: ServerOptions) -> Self {
        Self {
            options,
            sessions: Mutex::new(HashMap::new()),
            active: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    async fn register(&self, username: &str) -> (SessionId, mpsc::Receiver<Envelope>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.options.message_buffer_size.max(1));
        self.sessions
            .lock()
            .await
            .entry(username.to_string())
            .or_default()
            .insert(id, tx);
        (id, rx)
    }

    async fn unregister(&self, username: &str, id: SessionId) {
        let mut sessions = self.sessions.lock().await;
        if let Some(user_sessions) = sessions.get_mut(username) {
            user_sessions.remove(&id);
            if user_sessions.is_empty() {
                sessions.remove(username);
            }
        }
    }

    /// Stamps and delivers one message. Returns how many connections it
    /// was queued on.
    async fn route(&self, sender: &str, outbound: OutboundMessage) -> usize {
        let key = conversation_key(sender, &outbound.recipient);
        let format = classify(&outbound.message);
        let delivered = InboundMessage {
            sender: sender.to_string(),
            message: outbound.message,
            recipient: Some(outbound.recipient.clone()),
            format: Some(format),
            timestamp: Some(Utc::now()),
        };
        let envelope = match Envelope::new(MESSAGE_EVENT, &delivered) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("failed to encode message: {e}");
                return 0;
            }
        };

        let mut participants = vec![sender];
        if outbound.recipient != sender {
            participants.push(outbound.recipient.as_str());
        }

        let sessions = self.sessions.lock().await;
        let mut queued = 0;
        for name in participants {
            let Some(user_sessions) = sessions.get(name) else {
                debug!(conversation = %key, user = name, "participant offline");
                continue;
            };
            for tx in user_sessions.values() {
                match tx.try_send(envelope.clone()) {
                    Ok(()) => queued += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(user = name, "outbound queue full; dropping message");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {}
                }
            }
        }

        info!(conversation = %key, %format, queued, "message routed");
        queued
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn handle_connection(socket: TcpStream, addr: SocketAddr, state: Arc<ServerState>) -> Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);

    let active = state.active.fetch_add(1, Ordering::SeqCst) + 1;
    let _guard = ActiveGuard(&state.active);
    if active > state.options.max_connections {
        write_envelope(&mut writer, &Envelope::error("server is full")).await?;
        bail!("connection limit reached");
    }

    let username = match timeout(
        state.options.identify_timeout,
        identify(&mut reader, &mut writer, state.options.max_line_bytes),
    )
    .await
    {
        Ok(identified) => identified?,
        Err(_) => {
            write_envelope(&mut writer, &Envelope::error("identify timed out")).await?;
            bail!("client did not identify in time");
        }
    };
    let (id, mut inbox) = state.register(&username).await;
    info!(%addr, username, "client identified");

    let (frames_tx, mut frames) = mpsc::channel(1);
    let reader_task = tokio::spawn(read_frames(reader, state.options.max_line_bytes, frames_tx));

    let result = run_session(&state, &username, &mut frames, &mut writer, &mut inbox).await;

    reader_task.abort();
    state.unregister(&username, id).await;
    info!(%addr, username, "client disconnected");
    result
}

async fn identify<R, W>(reader: &mut R, writer: &mut W, max_line_bytes: usize) -> Result<String>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let first = match read_envelope_limited(reader, max_line_bytes).await {
        Ok(Some(first)) => Some(first),
        Ok(None) => bail!("connection closed before identify"),
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => None,
        Err(e) => return Err(e.into()),
    };

    let username = match first {
        Some(first) if first.event == IDENTIFY_EVENT => {
            serde_json::from_value::<Identify>(first.data)
                .map(|hello| hello.username.trim().to_string())
                .unwrap_or_default()
        }
        _ => String::new(),
    };

    if username.is_empty() {
        write_envelope(writer, &Envelope::error("first event must be identify with a username")).await?;
        bail!("client did not identify");
    }

    Ok(username)
}

/// One decoded line from a client.
#[derive(Debug)]
enum Frame {
    Envelope(Envelope),
    Unreadable(String),
    TooLong(usize),
}

/// Owns the read half for the whole session so a partially received line
/// is never lost to a competing `select!` branch. Ends at EOF, on an I/O
/// error, after an oversize line, or when the session stops listening.
async fn read_frames<R>(mut reader: R, max_line_bytes: usize, frames: mpsc::Sender<Frame>)
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let frame = match read_envelope_limited(&mut reader, max_line_bytes).await {
            Ok(Some(envelope)) => Frame::Envelope(envelope),
            Ok(None) => break,
            Err(e) if is_line_too_long(&e) => Frame::TooLong(max_line_bytes),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => Frame::Unreadable(e.to_string()),
            Err(e) => {
                debug!("error reading from client: {e}");
                break;
            }
        };
        let last = matches!(frame, Frame::TooLong(_));
        if frames.send(frame).await.is_err() || last {
            break;
        }
    }
}

async fn run_session<W>(
    state: &ServerState,
    username: &str,
    frames: &mut mpsc::Receiver<Frame>,
    writer: &mut W,
    inbox: &mut mpsc::Receiver<Envelope>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            frame = frames.recv() => {
                let reply = match frame {
                    Some(Frame::Envelope(envelope)) => handle_envelope(state, username, envelope).await,
                    Some(Frame::Unreadable(e)) => Some(Envelope::error(format!("unreadable envelope: {e}"))),
                    Some(Frame::TooLong(max)) => {
                        let reason = format!("line exceeds {max} bytes");
                        write_envelope(writer, &Envelope::error(reason)).await?;
                        bail!("client sent an oversize line");
                    }
                    None => break,
                };
                if let Some(reply) = reply {
                    write_envelope(writer, &reply).await?;
                }
            }
            Some(outgoing) = inbox.recv() => {
                write_envelope(writer, &outgoing).await?;
            }
        }
    }
    Ok(())
}

/// Returns an error envelope for the sender when the event is rejected.
async fn handle_envelope(state: &ServerState, username: &str, envelope: Envelope) -> Option<Envelope> {
    match envelope.event.as_str() {
        MESSAGE_EVENT => match serde_json::from_value::<OutboundMessage>(envelope.data) {
            Ok(outbound) => {
                state.route(username, outbound).await;
                None
            }
            Err(e) => Some(Envelope::error(format!("malformed message: {e}"))),
        },
        IDENTIFY_EVENT => Some(Envelope::error("already identified")),
        ERROR_EVENT => {
            debug!(username, data = %envelope.data, "client reported an error");
            None
        }
        other => Some(Envelope::error(format!("unknown event '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn outbound(message: &str, recipient: &str) -> OutboundMessage {
        OutboundMessage {
            message: message.into(),
            recipient: recipient.into(),
        }
    }

    #[test]
    fn conversation_key_is_order_independent() {
        assert_eq!(conversation_key("bob", "alice"), "alice <-> bob");
        assert_eq!(conversation_key("alice", "bob"), "alice <-> bob");
        assert_eq!(conversation_key("zed", "zed"), "zed <-> zed");
    }

    #[tokio::test]
    async fn route_reaches_both_participants_only() {
        let state = ServerState::new(ServerOptions::default());
        let (_, mut alice) = state.register("alice").await;
        let (_, mut bob) = state.register("bob").await;
        let (_, mut carol) = state.register("carol").await;

        assert_eq!(state.route("alice", outbound("hi bob", "bob")).await, 2);

        for inbox in [&mut alice, &mut bob] {
            let envelope = inbox.try_recv().unwrap();
            let delivered = InboundMessage::from_value(&envelope.data).unwrap();
            assert_eq!(delivered.sender, "alice");
            assert_eq!(delivered.message, "hi bob");
            assert_eq!(delivered.recipient.as_deref(), Some("bob"));
            assert!(delivered.timestamp.is_some());
        }
        assert!(carol.try_recv().is_err());
    }

    #[tokio::test]
    async fn self_message_is_delivered_once_per_connection() {
        let state = ServerState::new(ServerOptions::default());
        let (_, mut first) = state.register("alice").await;
        let (_, mut second) = state.register("alice").await;

        assert_eq!(state.route("alice", outbound("note to self", "alice")).await, 2);
        assert!(first.try_recv().is_ok());
        assert!(first.try_recv().is_err());
        assert!(second.try_recv().is_ok());
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let options = ServerOptions {
            message_buffer_size: 1,
            ..ServerOptions::default()
        };
        let state = ServerState::new(options);
        let (_, _alice) = state.register("alice").await;

        assert_eq!(state.route("alice", outbound("one", "nobody")).await, 1);
        assert_eq!(state.route("alice", outbound("two", "nobody")).await, 0);
    }

    #[tokio::test]
    async fn unregister_removes_empty_users() {
        let state = ServerState::new(ServerOptions::default());
        let (id, _rx) = state.register("alice").await;
        state.unregister("alice", id).await;
        assert!(state.sessions.lock().await.is_empty());
    }

    #[tokio::test]
    async fn frames_survive_a_line_split_across_writes() {
        let (mut client, server) = tokio::io::duplex(256);
        let (tx, mut frames) = mpsc::channel(1);
        tokio::spawn(read_frames(BufReader::new(server), 1024, tx));

        client.write_all(br#"{"event":"message","data":{"message":"hel"#).await.unwrap();
        tokio::task::yield_now().await;
        client.write_all(b"lo\",\"recipient\":\"alice\"}}\n").await.unwrap();

        let Some(Frame::Envelope(envelope)) = frames.recv().await else {
            panic!("expected an envelope");
        };
        assert_eq!(envelope.data["message"], "hello");
    }

    #[tokio::test]
    async fn oversize_line_is_the_last_frame() {
        let (mut client, server) = tokio::io::duplex(256);
        let (tx, mut frames) = mpsc::channel(1);
        tokio::spawn(read_frames(BufReader::new(server), 8, tx));

        client.write_all(b"0123456789abcdef\n{\"event\":\"x\"}\n").await.unwrap();

        assert!(matches!(frames.recv().await, Some(Frame::TooLong(8))));
        assert!(frames.recv().await.is_none());
    }

    #[tokio::test]
    async fn rejected_events_produce_error_replies() {
        let state = ServerState::new(ServerOptions::default());

        let malformed = Envelope {
            event: MESSAGE_EVENT.into(),
            data: serde_json::json!({ "message": "no recipient" }),
        };
        let reply = handle_envelope(&state, "alice", malformed).await.unwrap();
        assert_eq!(reply.event, ERROR_EVENT);

        let unknown = Envelope {
            event: "typing".into(),
            data: serde_json::Value::Null,
        };
        assert!(handle_envelope(&state, "alice", unknown).await.is_some());
    }
}
