//! Inbound ESL connection: authenticated socket, reader task, command writer.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, trace, warn};

use crate::{
    command::{EslCommand, EslResponse},
    constants::{
        DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_TIMEOUT_MS, HEADER_CONTENT_TYPE,
        MAX_EVENT_QUEUE_SIZE, SOCKET_BUF_SIZE,
    },
    error::{EslError, EslResult},
    event::{EslEvent, EslEventType, EventFormat},
    protocol::{EslMessage, EslParser, MessageType},
};

/// Connection status for ESL client
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionStatus {
    Connected,
    Disconnected(DisconnectReason),
}

/// Why the reader task stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Server sent `text/disconnect-notice`
    ServerNotice,
    /// Liveness timeout exceeded without any inbound traffic
    HeartbeatExpired,
    /// I/O or framing error (message only, io::Error is not Clone)
    IoError(String),
    /// Clean EOF
    ConnectionClosed,
    /// A command reply did not arrive in time; later replies can no longer
    /// be matched to their commands
    ReplyTimeout,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::ServerNotice => write!(f, "server sent disconnect notice"),
            DisconnectReason::HeartbeatExpired => write!(f, "liveness timeout expired"),
            DisconnectReason::IoError(msg) => write!(f, "I/O error: {}", msg),
            DisconnectReason::ConnectionClosed => write!(f, "connection closed"),
            DisconnectReason::ReplyTimeout => write!(f, "command reply timed out"),
        }
    }
}

/// Connection settings.
///
/// Deserializable so it can sit inside an application's own config file;
/// missing fields take the defaults below.
///
/// ```
/// # use freeswitch_esl_control::EslConnectOptions;
/// let opts: EslConnectOptions = serde_json::from_str(r#"{"command_timeout_ms": 10000}"#).unwrap();
/// assert_eq!(opts.command_timeout_ms, 10000);
/// assert_eq!(opts.event_queue_size, 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EslConnectOptions {
    /// Capacity of the event channel. Default: 1000.
    pub event_queue_size: usize,
    /// TCP connect and auth handshake timeout. Default: 2000.
    pub connect_timeout_ms: u64,
    /// How long `api`/`bgapi` wait for a reply. Default: 5000.
    pub command_timeout_ms: u64,
    /// Disconnect after this long without inbound traffic; 0 disables. Default: 0.
    pub liveness_timeout_ms: u64,
}

impl Default for EslConnectOptions {
    fn default() -> Self {
        Self {
            event_queue_size: MAX_EVENT_QUEUE_SIZE,
            connect_timeout_ms: DEFAULT_TIMEOUT_MS,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            liveness_timeout_ms: 0,
        }
    }
}

struct SharedState {
    pending_reply: Mutex<Option<oneshot::Sender<EslMessage>>>,
    liveness_timeout_ms: AtomicU64,
    command_timeout_ms: AtomicU64,
    event_overflow: AtomicBool,
    dropped_event_count: AtomicU64,
}

/// Command handle for one inbound connection (Clone + Send).
///
/// The writer lock is held from write until the reply arrives, so at most
/// one command is outstanding per connection.
#[derive(Clone)]
pub struct EslClient {
    addr: Arc<str>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    shared: Arc<SharedState>,
    status_rx: watch::Receiver<ConnectionStatus>,
}

impl std::fmt::Debug for EslClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EslClient")
            .field("addr", &self.addr)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Events read by the background task, in arrival order (!Clone).
///
/// `Err(EslError::QueueFull)` marks a gap where events were dropped.
pub struct EslEventStream {
    rx: mpsc::Receiver<Result<EslEvent, EslError>>,
    status_rx: watch::Receiver<ConnectionStatus>,
}

impl std::fmt::Debug for EslEventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EslEventStream")
            .field("connected", &self.is_connected())
            .finish()
    }
}

async fn recv_message(
    stream: &mut TcpStream,
    parser: &mut EslParser,
    read_buffer: &mut [u8],
    timeout_ms: u64,
) -> EslResult<EslMessage> {
    loop {
        if let Some(message) = parser.parse_message()? {
            trace!("[RECV] Parsed message: {:?}", message.message_type);
            return Ok(message);
        }

        let bytes_read = match timeout(Duration::from_millis(timeout_ms), stream.read(read_buffer))
            .await
        {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(EslError::Io(e)),
            Err(_) => return Err(EslError::Timeout { timeout_ms }),
        };
        trace!("[RECV] Read {} bytes from socket", bytes_read);
        if bytes_read == 0 {
            return Err(EslError::ConnectionClosed);
        }
        parser.add_data(&read_buffer[..bytes_read])?;
    }
}

async fn authenticate(
    stream: &mut TcpStream,
    parser: &mut EslParser,
    read_buffer: &mut [u8],
    password: &str,
    timeout_ms: u64,
) -> EslResult<()> {
    debug!("[AUTH] Waiting for auth request");
    let message = recv_message(stream, parser, read_buffer, timeout_ms).await?;
    if message.message_type != MessageType::AuthRequest {
        return Err(EslError::protocol_error("Expected auth request"));
    }

    let command_str = EslCommand::Auth {
        password: password.to_string(),
    }
    .to_wire_format()?;
    debug!("Sending command: auth [REDACTED]");
    stream
        .write_all(command_str.as_bytes())
        .await?;

    let response = recv_message(stream, parser, read_buffer, timeout_ms)
        .await?
        .into_response();
    if !response.is_success() {
        return Err(EslError::auth_failed(
            response
                .reply_text()
                .unwrap_or("Authentication failed"),
        ));
    }
    debug!("Authentication successful");
    Ok(())
}

/// Hand an event to the consumer without blocking the reader.
///
/// On a full queue the event is dropped and counted; the next successful
/// send is preceded by a single `QueueFull` marker.
fn forward_event(
    event_tx: &mpsc::Sender<Result<EslEvent, EslError>>,
    shared: &SharedState,
    item: Result<EslEvent, EslError>,
) -> bool {
    if shared
        .event_overflow
        .load(Ordering::Relaxed)
    {
        match event_tx.try_send(Err(EslError::QueueFull)) {
            Ok(()) => shared
                .event_overflow
                .store(false, Ordering::Relaxed),
            Err(mpsc::error::TrySendError::Closed(_)) => return false,
            Err(mpsc::error::TrySendError::Full(_)) => {}
        }
    }

    match event_tx.try_send(item) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Closed(_)) => false,
        Err(mpsc::error::TrySendError::Full(_)) => {
            shared
                .event_overflow
                .store(true, Ordering::Relaxed);
            shared
                .dropped_event_count
                .fetch_add(1, Ordering::Relaxed);
            warn!("Event queue full, dropping event");
            true
        }
    }
}

/// Record why the connection went down. The first reason sticks.
fn mark_disconnected(status_tx: &watch::Sender<ConnectionStatus>, reason: DisconnectReason) {
    status_tx.send_if_modified(|status| {
        if *status != ConnectionStatus::Connected {
            return false;
        }
        *status = ConnectionStatus::Disconnected(reason);
        true
    });
}

async fn reader_loop(
    addr: Arc<str>,
    reader: OwnedReadHalf,
    parser: EslParser,
    shared: Arc<SharedState>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    event_tx: mpsc::Sender<Result<EslEvent, EslError>>,
) {
    let result = std::panic::AssertUnwindSafe(reader_loop_inner(
        &addr,
        reader,
        parser,
        shared,
        status_tx.clone(),
        event_tx,
    ));
    if futures_util::FutureExt::catch_unwind(result)
        .await
        .is_err()
    {
        tracing::error!("[{}] reader task panicked", addr);
        mark_disconnected(
            &status_tx,
            DisconnectReason::IoError("reader task panicked".to_string()),
        );
    }
}

async fn reader_loop_inner(
    addr: &str,
    mut reader: OwnedReadHalf,
    mut parser: EslParser,
    shared: Arc<SharedState>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    event_tx: mpsc::Sender<Result<EslEvent, EslError>>,
) {
    let mut read_buffer = vec![0u8; SOCKET_BUF_SIZE];
    let mut last_recv = Instant::now();

    loop {
        match parser.parse_message() {
            Ok(Some(message)) => {
                match message.message_type {
                    MessageType::Event => {
                        let format = message
                            .headers
                            .get(HEADER_CONTENT_TYPE)
                            .map(|ct| EventFormat::from_content_type(ct))
                            .unwrap_or(EventFormat::Plain);
                        let event = parser.parse_event(message, format);
                        if !forward_event(&event_tx, &shared, event) {
                            debug!("[{}] Event channel closed, reader exiting", addr);
                            return;
                        }
                    }
                    MessageType::CommandReply | MessageType::ApiResponse => {
                        let mut pending = shared
                            .pending_reply
                            .lock()
                            .await;
                        match pending.take() {
                            Some(tx) => {
                                let _ = tx.send(message);
                            }
                            None => warn!(
                                "[{}] Received {:?} but no command is pending",
                                addr, message.message_type
                            ),
                        }
                    }
                    MessageType::Disconnect => {
                        info!("[{}] Server sent disconnect notice", addr);
                        mark_disconnected(&status_tx, DisconnectReason::ServerNotice);
                        return;
                    }
                    MessageType::AuthRequest | MessageType::Unknown(_) => {
                        debug!("[{}] Ignoring {:?} frame", addr, message.message_type);
                    }
                }
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("[{}] Frame decode failed: {}", addr, e);
                mark_disconnected(&status_tx, DisconnectReason::IoError(e.to_string()));
                return;
            }
        }

        // Short read timeout so the liveness threshold is checked regularly.
        match timeout(Duration::from_secs(2), reader.read(&mut read_buffer)).await {
            Ok(Ok(0)) => {
                info!("[{}] Switch closed the connection", addr);
                mark_disconnected(&status_tx, DisconnectReason::ConnectionClosed);
                return;
            }
            Ok(Ok(n)) => {
                last_recv = Instant::now();
                if let Err(e) = parser.add_data(&read_buffer[..n]) {
                    warn!("[{}] Receive buffer rejected data: {}", addr, e);
                    mark_disconnected(&status_tx, DisconnectReason::IoError(e.to_string()));
                    return;
                }
            }
            Ok(Err(e)) => {
                warn!("[{}] Socket read failed: {}", addr, e);
                mark_disconnected(&status_tx, DisconnectReason::IoError(e.to_string()));
                return;
            }
            Err(_) => {
                let threshold_ms = shared
                    .liveness_timeout_ms
                    .load(Ordering::Relaxed);
                if threshold_ms > 0 && last_recv.elapsed() > Duration::from_millis(threshold_ms) {
                    warn!(
                        "[{}] No traffic for {}ms (liveness threshold {}ms)",
                        addr,
                        last_recv
                            .elapsed()
                            .as_millis(),
                        threshold_ms
                    );
                    mark_disconnected(&status_tx, DisconnectReason::HeartbeatExpired);
                    return;
                }
            }
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl EslClient {
    /// Connect and authenticate with default options.
    pub async fn connect(
        host: &str,
        port: u16,
        password: &str,
    ) -> EslResult<(Self, EslEventStream)> {
        Self::connect_with_options(host, port, password, EslConnectOptions::default()).await
    }

    pub async fn connect_with_options(
        host: &str,
        port: u16,
        password: &str,
        options: EslConnectOptions,
    ) -> EslResult<(Self, EslEventStream)> {
        let addr = format!("{}:{}", host, port);
        info!("[{}] Connecting", addr);

        let connect_ms = options.connect_timeout_ms;
        let mut stream = match timeout(
            Duration::from_millis(connect_ms),
            TcpStream::connect((host, port)),
        )
        .await
        {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => {
                warn!("[{}] TCP connect failed: {}", addr, e);
                return Err(EslError::Io(e));
            }
            Err(_) => {
                warn!("[{}] TCP connect timed out after {}ms", addr, connect_ms);
                return Err(EslError::Timeout {
                    timeout_ms: connect_ms,
                });
            }
        };

        let mut parser = EslParser::new();
        let mut read_buffer = vec![0u8; SOCKET_BUF_SIZE];
        authenticate(
            &mut stream,
            &mut parser,
            &mut read_buffer,
            password,
            connect_ms,
        )
        .await?;

        info!("[{}] Connected and authenticated", addr);
        Ok(Self::split_and_spawn(addr.into(), stream, parser, options))
    }

    fn split_and_spawn(
        addr: Arc<str>,
        stream: TcpStream,
        parser: EslParser,
        options: EslConnectOptions,
    ) -> (Self, EslEventStream) {
        let (read_half, write_half) = stream.into_split();

        let shared = Arc::new(SharedState {
            pending_reply: Mutex::new(None),
            liveness_timeout_ms: AtomicU64::new(options.liveness_timeout_ms),
            command_timeout_ms: AtomicU64::new(options.command_timeout_ms),
            event_overflow: AtomicBool::new(false),
            dropped_event_count: AtomicU64::new(0),
        });

        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connected);
        let status_tx = Arc::new(status_tx);
        let stream_status_rx = status_tx.subscribe();
        let (event_tx, event_rx) = mpsc::channel(
            options
                .event_queue_size
                .max(1),
        );

        tokio::spawn(reader_loop(
            addr.clone(),
            read_half,
            parser,
            shared.clone(),
            status_tx.clone(),
            event_tx,
        ));

        let client = EslClient {
            addr,
            writer: Arc::new(Mutex::new(write_half)),
            status_tx,
            shared,
            status_rx,
        };
        let events = EslEventStream {
            rx: event_rx,
            status_rx: stream_status_rx,
        };
        (client, events)
    }

    /// Write a command and wait for its reply.
    pub async fn send_command(&self, command: EslCommand) -> EslResult<EslResponse> {
        if !self.is_connected() {
            return Err(EslError::NotConnected);
        }

        let command_str = command.to_wire_format()?;
        match &command {
            EslCommand::Auth { .. } => debug!("[{}] > auth [REDACTED]", self.addr),
            _ => debug!("[{}] > {}", self.addr, command_str.trim_end()),
        }

        let mut writer = self
            .writer
            .lock()
            .await;

        let (tx, rx) = oneshot::channel();
        *self
            .shared
            .pending_reply
            .lock()
            .await = Some(tx);

        writer
            .write_all(command_str.as_bytes())
            .await?;

        let timeout_ms = self
            .shared
            .command_timeout_ms
            .load(Ordering::Relaxed);
        let message = match timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(message)) => message,
            Ok(Err(_)) => return Err(EslError::ConnectionClosed),
            Err(_) => {
                // The late reply would be handed to the next command, so the
                // connection cannot be used again.
                self.shared
                    .pending_reply
                    .lock()
                    .await
                    .take();
                warn!(
                    "[{}] No reply within {}ms, taking connection out of service",
                    self.addr, timeout_ms
                );
                mark_disconnected(&self.status_tx, DisconnectReason::ReplyTimeout);
                let _ = writer
                    .shutdown()
                    .await;
                return Err(EslError::Timeout { timeout_ms });
            }
        };
        drop(writer);

        let response = message.into_response();
        debug!(
            "[{}] < {}",
            self.addr,
            response
                .reply_text()
                .unwrap_or("api/response")
        );
        Ok(response)
    }

    async fn send_command_ok(&self, command: EslCommand) -> EslResult<()> {
        self.send_command(command)
            .await?
            .into_result()
            .map(|_| ())
    }

    /// `api <command>`: blocks until the switch finishes the command.
    ///
    /// The switch holds back events on this socket while an `api` call runs.
    pub async fn api(&self, command: &str) -> EslResult<EslResponse> {
        self.send_command(EslCommand::Api {
            command: command.to_string(),
        })
        .await
    }

    /// `bgapi <command>`: returns at once with a Job-UUID.
    ///
    /// The command's output arrives later as a `BACKGROUND_JOB` event with the
    /// same `Job-UUID` header.
    pub async fn bgapi(&self, command: &str) -> EslResult<EslResponse> {
        self.send_command(EslCommand::BgApi {
            command: command.to_string(),
        })
        .await
    }

    /// Subscribe to typed events. `All` subscribes to everything.
    pub async fn subscribe_events(
        &self,
        format: EventFormat,
        events: &[EslEventType],
    ) -> EslResult<()> {
        let names = if events.contains(&EslEventType::All) {
            "ALL".to_string()
        } else {
            events
                .iter()
                .map(|e| e.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        };
        self.subscribe_events_raw(format, &names)
            .await
    }

    /// Subscribe by raw event names, e.g. `"CUSTOM sofia::register"`.
    pub async fn subscribe_events_raw(&self, format: EventFormat, events: &str) -> EslResult<()> {
        self.send_command_ok(EslCommand::Events {
            format: format.to_string(),
            events: events.to_string(),
        })
        .await?;
        info!("[{}] Subscribed to '{}' ({})", self.addr, events, format);
        Ok(())
    }

    pub async fn filter_events(&self, header: &str, value: &str) -> EslResult<()> {
        self.send_command_ok(EslCommand::Filter {
            header: header.to_string(),
            value: value.to_string(),
        })
        .await?;
        debug!("[{}] Filtering events on {} = {}", self.addr, header, value);
        Ok(())
    }

    /// Drop every event subscription.
    pub async fn noevents(&self) -> EslResult<()> {
        self.send_command_ok(EslCommand::NoEvents)
            .await
    }

    /// Ask the server to end the session.
    pub async fn exit(&self) -> EslResult<EslResponse> {
        self.send_command(EslCommand::Exit)
            .await
    }

    /// Number of events dropped due to a full event queue.
    pub fn dropped_event_count(&self) -> u64 {
        self.shared
            .dropped_event_count
            .load(Ordering::Relaxed)
    }

    /// Set to zero to disable.
    pub fn set_liveness_timeout(&self, duration: Duration) {
        self.shared
            .liveness_timeout_ms
            .store(duration_ms(duration), Ordering::Relaxed);
    }

    pub fn set_command_timeout(&self, duration: Duration) {
        self.shared
            .command_timeout_ms
            .store(duration_ms(duration), Ordering::Relaxed);
    }

    /// `host:port` this client was connected to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            *self
                .status_rx
                .borrow(),
            ConnectionStatus::Connected
        )
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status_rx
            .borrow()
            .clone()
    }

    /// Shut down the write half; the reader sees EOF once the server closes.
    pub async fn disconnect(&self) -> EslResult<()> {
        info!("[{}] Closing write side", self.addr);
        self.writer
            .lock()
            .await
            .shutdown()
            .await?;
        Ok(())
    }
}

impl EslEventStream {
    /// Next event, or `None` once the reader task has exited.
    pub async fn recv(&mut self) -> Option<Result<EslEvent, EslError>> {
        self.rx
            .recv()
            .await
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            *self
                .status_rx
                .borrow(),
            ConnectionStatus::Connected
        )
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status_rx
            .borrow()
            .clone()
    }
}

impl futures_util::Stream for EslEventStream {
    type Item = Result<EslEvent, EslError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx
            .poll_recv(cx)
    }
}
