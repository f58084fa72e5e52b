//! Client builder, command handle and driver task.
//!
//! The [`ClientBuilder`] provides a fluent API over [`ClientConfig`]. Spawning
//! it starts a driver task that owns the session and the connection, and
//! returns:
//! 1. a [`Client`] handle for the `connect`/`login`/`search`/`disconnect`
//!    commands, whose state-guard failures come back to the caller
//! 2. an [`EventReceiver`] yielding a [`ClientEvent`] per session change
//!
//! The driver handles commands, socket reads, writer shutdown and the search
//! deadline in one loop, so the session is only ever replaced from one place.
//!
//! # Example
//!
//! ```no_run
//! use ed2k_client::{Client, ClientEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (client, mut events) = Client::builder().nick_name("tester").spawn()?;
//!
//!     client.connect("176.103.48.36", 4184).await?;
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             ClientEvent::Connected(_) => client.login().await?,
//!             ClientEvent::IdChange(_) => client.search("ubuntu").await?,
//!             ClientEvent::SearchResult(session) => {
//!                 println!("{:?}", session.last_results());
//!                 client.disconnect().await?;
//!             }
//!             ClientEvent::Disconnected(_) => break,
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use crate::config::ClientConfig;
use crate::error::{Ed2kError, Result};
use crate::message::{InboundMessage, LoginRequest, SearchRequest, UserHash};
use crate::protocol::{IncomingMessage, MessageBuffer, OutgoingMessage};
use crate::session::{ClientSession, SessionState};
use crate::transport::{self, ServerStream};
use crate::writer::{spawn_writer_task, OutboundFrame, WriterHandle};

/// Read buffer reserved before each socket read.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// How long a disconnect waits for queued frames to be flushed.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Receiver side of the event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<ClientEvent>;

/// Session change notification. Each carries the session as it was right
/// after the change.
#[derive(Debug)]
pub enum ClientEvent {
    Connected(ClientSession),
    IdChange(ClientSession),
    ServerStatus(ClientSession),
    ServerMessage(ClientSession),
    SearchResult(ClientSession),
    Disconnected(ClientSession),
    /// Transport failure or a message that could not be read. Never a
    /// state-guard failure; those are returned by the command.
    Error(Ed2kError),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Connected(_) => "connected",
            ClientEvent::IdChange(_) => "idchange",
            ClientEvent::ServerStatus(_) => "serverstatus",
            ClientEvent::ServerMessage(_) => "servermessage",
            ClientEvent::SearchResult(_) => "searchresult",
            ClientEvent::Disconnected(_) => "disconnected",
            ClientEvent::Error(_) => "error",
        }
    }

    /// Snapshot carried by the event, `None` for errors.
    pub fn session(&self) -> Option<&ClientSession> {
        match self {
            ClientEvent::Connected(s)
            | ClientEvent::IdChange(s)
            | ClientEvent::ServerStatus(s)
            | ClientEvent::ServerMessage(s)
            | ClientEvent::SearchResult(s)
            | ClientEvent::Disconnected(s) => Some(s),
            ClientEvent::Error(_) => None,
        }
    }
}

/// Builder for configuring and spawning a client.
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the nick name sent at login.
    ///
    /// Default: `https://www.emule-project.org`
    pub fn nick_name(mut self, nick_name: impl Into<String>) -> Self {
        self.config.nick_name = nick_name.into();
        self
    }

    /// Set the TCP port advertised at login.
    ///
    /// Default: 15490
    pub fn client_port(mut self, port: u16) -> Self {
        self.config.client_port = port;
        self
    }

    /// Use a fixed user hash instead of a random one.
    pub fn user_hash(mut self, hash: UserHash) -> Self {
        self.config.user_hash = Some(hash.to_string());
        self
    }

    /// Set how long a search may run before reverting to idle.
    ///
    /// Default: 30 seconds
    pub fn search_timeout(mut self, timeout: Duration) -> Self {
        self.config.search_timeout_ms = millis(timeout);
        self
    }

    /// Default: 10 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = millis(timeout);
        self
    }

    /// Set how many lines the session log keeps.
    ///
    /// Default: 100
    pub fn log_capacity(mut self, capacity: usize) -> Self {
        self.config.log_capacity = capacity;
        self
    }

    /// Default: 16 MB
    pub fn max_message_size(mut self, size: u32) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Default: 64
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Start the driver task. Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails when the configured user hash is not 32 hex characters.
    pub fn spawn(self) -> Result<(Client, EventReceiver)> {
        let user_hash = self.config.resolve_user_hash()?;
        let capacity = self.config.channel_capacity.max(1);

        let (command_tx, command_rx) = mpsc::channel(capacity);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (session_tx, session_rx) = watch::channel(ClientSession::default());

        let driver = Driver {
            buffer: MessageBuffer::with_max_message_size(self.config.max_message_size),
            config: self.config,
            user_hash,
            session: ClientSession::default(),
            session_tx,
            events: event_tx,
            link: Link::Down,
            search_deadline: None,
        };
        tokio::spawn(driver.run(command_rx));

        let client = Client {
            commands: command_tx,
            session: session_rx,
        };
        Ok((client, event_rx))
    }
}

enum Command {
    Connect {
        host: String,
        port: u16,
        reply: oneshot::Sender<Result<()>>,
    },
    Login {
        reply: oneshot::Sender<Result<()>>,
    },
    Search {
        query: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Handle to a running client.
///
/// Cheap to clone. When the last handle is dropped the driver closes the
/// connection and exits.
#[derive(Debug, Clone)]
pub struct Client {
    commands: mpsc::Sender<Command>,
    session: watch::Receiver<ClientSession>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Start connecting to a server.
    ///
    /// Returns once the attempt has started; [`ClientEvent::Connected`]
    /// follows when the socket is up, or an error and
    /// [`ClientEvent::Disconnected`] when it fails.
    pub async fn connect(&self, host: impl Into<String>, port: u16) -> Result<()> {
        let host = host.into();
        self.request(|reply| Command::Connect { host, port, reply })
            .await
    }

    /// Send the login request. [`ClientEvent::IdChange`] follows when the
    /// server accepts it.
    pub async fn login(&self) -> Result<()> {
        self.request(|reply| Command::Login { reply }).await
    }

    /// Send a search request. [`ClientEvent::SearchResult`] follows, or the
    /// search silently reverts to idle after the search timeout.
    pub async fn search(&self, query: impl Into<String>) -> Result<()> {
        let query = query.into();
        self.request(|reply| Command::Search { query, reply }).await
    }

    /// Close the connection. Returns after [`ClientEvent::Disconnected`]
    /// has been emitted.
    pub async fn disconnect(&self) -> Result<()> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    /// Current session snapshot.
    pub fn session(&self) -> ClientSession {
        self.session.borrow().clone()
    }

    /// Receiver that observes every session replacement.
    pub fn subscribe(&self) -> watch::Receiver<ClientSession> {
        self.session.clone()
    }

    async fn request<F>(&self, command: F) -> Result<()>
    where
        F: FnOnce(oneshot::Sender<Result<()>>) -> Command,
    {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| Ed2kError::ConnectionClosed)?;
        response.await.map_err(|_| Ed2kError::ConnectionClosed)?
    }
}

type ConnectFuture = Pin<Box<dyn Future<Output = Result<ServerStream>> + Send>>;

struct Connection {
    reader: OwnedReadHalf,
    read_buf: BytesMut,
    writer: WriterHandle,
    writer_task: JoinHandle<Result<()>>,
}

enum Link {
    Down,
    Connecting(ConnectFuture),
    Up(Connection),
}

enum LinkEvent {
    Established(Result<ServerStream>),
    /// Bytes from one read; empty on end of stream.
    Data(std::io::Result<Bytes>),
    WriterExited(std::result::Result<Result<()>, JoinError>),
}

impl Link {
    /// Wait for the next thing that happens on the connection. Pending
    /// forever while down.
    async fn next_event(&mut self) -> LinkEvent {
        match self {
            Link::Down => std::future::pending().await,
            Link::Connecting(connecting) => LinkEvent::Established(connecting.as_mut().await),
            Link::Up(conn) => {
                conn.read_buf.reserve(READ_BUFFER_SIZE);
                tokio::select! {
                    read = conn.reader.read_buf(&mut conn.read_buf) => {
                        LinkEvent::Data(read.map(|_| conn.read_buf.split().freeze()))
                    }
                    exited = &mut conn.writer_task => LinkEvent::WriterExited(exited),
                }
            }
        }
    }
}

struct Driver {
    config: ClientConfig,
    user_hash: UserHash,
    session: ClientSession,
    session_tx: watch::Sender<ClientSession>,
    events: mpsc::UnboundedSender<ClientEvent>,
    link: Link,
    buffer: MessageBuffer,
    search_deadline: Option<Instant>,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            let deadline = self.search_deadline;
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                event = self.link.next_event() => self.handle_link_event(event).await,
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_search_timeout();
                }
            }
        }

        if self.session.state >= SessionState::Connected {
            self.on_closed().await;
        } else {
            self.close_link().await;
        }
        tracing::debug!("Client driver finished");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { host, port, reply } => {
                let _ = reply.send(self.connect(host, port));
            }
            Command::Login { reply } => {
                let _ = reply.send(self.login().await);
            }
            Command::Search { query, reply } => {
                let _ = reply.send(self.search(&query).await);
            }
            Command::Disconnect { reply } => {
                let _ = reply.send(self.disconnect().await);
            }
        }
    }

    fn connect(&mut self, host: String, port: u16) -> Result<()> {
        self.session.state.check_connect()?;

        tracing::info!("Connecting to {}:{}", host, port);
        let timeout = self.config.connect_timeout();
        let target = host.clone();
        self.link = Link::Connecting(Box::pin(async move {
            transport::connect(&target, port, timeout).await
        }));

        let line = format!("Connecting to {host}:{port}");
        self.commit(self.session.connecting(host, port), line);
        Ok(())
    }

    async fn login(&mut self) -> Result<()> {
        self.session.state.check_login()?;

        let request = LoginRequest {
            user_hash: self.user_hash,
            client_id: 0,
            port: self.config.client_port,
            nick_name: self.config.nick_name.clone(),
        };
        self.send(&request).await?;

        tracing::info!("Logging in as {}", request.nick_name);
        self.commit(
            self.session.with_state(SessionState::LoggingIn),
            format!("Logging in as {} ({})", request.nick_name, request.user_hash),
        );
        Ok(())
    }

    async fn search(&mut self, query: &str) -> Result<()> {
        self.session.state.check_search()?;

        self.send(&SearchRequest::new(query)).await?;

        tracing::info!("Searching for {:?}", query);
        // A timeout too large to represent never fires.
        self.search_deadline = Instant::now().checked_add(self.config.search_timeout());
        self.commit(self.session.searching(query), format!("Searching for {query:?}"));
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.session.state.check_disconnect()?;

        tracing::info!("Disconnecting");
        self.commit(
            self.session.with_state(SessionState::Disconnecting),
            "Disconnecting",
        );
        self.on_closed().await;
        Ok(())
    }

    async fn send<M: OutgoingMessage + Sync>(&mut self, message: &M) -> Result<()> {
        let Link::Up(conn) = &self.link else {
            return Err(Ed2kError::NotConnected);
        };
        let frame = OutboundFrame::from_message(message)?;
        conn.writer.send(frame).await
    }

    async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Established(Ok(stream)) => self.on_connected(stream),
            LinkEvent::Established(Err(e)) => {
                tracing::warn!("Connect failed: {}", e);
                self.link = Link::Down;
                self.fail(e);
                self.on_closed().await;
            }
            LinkEvent::Data(Ok(chunk)) if chunk.is_empty() => {
                tracing::info!("Server closed the connection");
                self.on_closed().await;
            }
            LinkEvent::Data(Ok(chunk)) => self.on_data(&chunk).await,
            LinkEvent::Data(Err(e)) => {
                tracing::error!("Read error: {}", e);
                self.fail(e.into());
                self.on_closed().await;
            }
            LinkEvent::WriterExited(exited) => {
                // Writer half gone while the link is up: the socket is unusable.
                self.link = Link::Down;
                match exited {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => self.fail(e),
                    Err(e) => self.fail(Ed2kError::Io(std::io::Error::other(e))),
                }
                self.on_closed().await;
            }
        }
    }

    fn on_connected(&mut self, stream: ServerStream) {
        let (reader, write_half) = stream.into_split();
        let (writer, writer_task) = spawn_writer_task(write_half, self.config.channel_capacity);
        self.link = Link::Up(Connection {
            reader,
            read_buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            writer,
            writer_task,
        });
        self.buffer.clear();

        tracing::info!("Connected");
        self.commit(self.session.with_state(SessionState::Connected), "Connected");
        self.emit(ClientEvent::Connected(self.session.clone()));
    }

    async fn on_data(&mut self, chunk: &[u8]) {
        for routed in self.buffer.push(chunk) {
            match routed {
                Ok(message) => self.dispatch(message).await,
                Err(e) => {
                    tracing::warn!("Dropping unreadable data: {}", e);
                    self.fail(e);
                }
            }
        }
    }

    /// Finalize and decode one complete message, then apply it. A message
    /// that fails either step leaves the session untouched.
    async fn dispatch(&mut self, message: IncomingMessage) {
        let command = message.command();
        let body = match message.finalize().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Command {:#04x} discarded: {}", command, e);
                self.fail(e);
                return;
            }
        };

        let decoded = match InboundMessage::decode(command, &body) {
            Ok(Some(decoded)) => decoded,
            Ok(None) => {
                tracing::debug!("Ignoring command {:#04x} ({} bytes)", command, body.len());
                self.log(format!("Ignored command {command:#04x}"));
                return;
            }
            Err(e) => {
                tracing::warn!("Command {:#04x} could not be decoded: {}", command, e);
                self.fail(e);
                return;
            }
        };

        let event: fn(ClientSession) -> ClientEvent = match &decoded {
            InboundMessage::ServerMessage { .. } => ClientEvent::ServerMessage,
            InboundMessage::IdChange { .. } => ClientEvent::IdChange,
            InboundMessage::ServerStatus { .. } => ClientEvent::ServerStatus,
            InboundMessage::SearchResult { .. } => {
                // The finished result has already left the assembler. A partial
                // frame still in the buffer started after it in the same read
                // and belongs to the next message, so it is kept.
                self.search_deadline = None;
                ClientEvent::SearchResult
            }
        };

        let line = describe(&decoded);
        tracing::debug!("{}", line);
        self.commit(self.session.apply(&decoded), line);
        self.emit(event(self.session.clone()));
    }

    fn on_search_timeout(&mut self) {
        self.search_deadline = None;
        if self.session.state != SessionState::Searching {
            return;
        }
        tracing::info!("Search timed out");
        self.buffer.clear();
        self.commit(self.session.with_state(SessionState::Idle), "Search timed out");
    }

    /// Tear down the transport and reset to `Disconnected`.
    async fn on_closed(&mut self) {
        self.close_link().await;
        self.buffer.clear();
        self.search_deadline = None;

        tracing::info!("Disconnected");
        self.commit(self.session.disconnected(), "Disconnected");
        self.emit(ClientEvent::Disconnected(self.session.clone()));
    }

    async fn close_link(&mut self) {
        let Link::Up(conn) = std::mem::replace(&mut self.link, Link::Down) else {
            return;
        };
        let Connection {
            reader,
            writer,
            writer_task,
            ..
        } = conn;

        // Dropping the handle lets the writer flush and shut down its half.
        drop(writer);
        let abort = writer_task.abort_handle();
        match tokio::time::timeout(CLOSE_TIMEOUT, writer_task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => tracing::debug!("Writer ended with error: {}", e),
            Ok(Err(e)) => tracing::debug!("Writer task failed: {}", e),
            Err(_) => {
                tracing::warn!("Writer did not finish within {:?}", CLOSE_TIMEOUT);
                abort.abort();
            }
        }
        drop(reader);
    }

    fn commit(&mut self, next: ClientSession, line: impl Into<String>) {
        self.session = next.with_log(line, self.config.log_capacity);
        self.session_tx.send_replace(self.session.clone());
    }

    fn log(&mut self, line: impl Into<String>) {
        self.commit(self.session.clone(), line);
    }

    fn fail(&mut self, error: Ed2kError) {
        self.log(format!("Error: {error}"));
        self.emit(ClientEvent::Error(error));
    }

    fn emit(&self, event: ClientEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn describe(message: &InboundMessage) -> String {
    match message {
        InboundMessage::ServerMessage { message } => format!("Server message: {message}"),
        InboundMessage::IdChange { client_id, flags } => {
            format!("Client id {client_id} (flags {flags:#x})")
        }
        InboundMessage::ServerStatus { users, files } => {
            format!("Server status: {users} users, {files} files")
        }
        InboundMessage::SearchResult { entries } => format!("Search result: {} entries", entries.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_configuration() {
        let builder = Client::builder()
            .nick_name("tester")
            .client_port(4662)
            .search_timeout(Duration::from_millis(1500))
            .connect_timeout(Duration::from_secs(3))
            .log_capacity(10)
            .max_message_size(1024)
            .channel_capacity(4);

        assert_eq!(builder.config.nick_name, "tester");
        assert_eq!(builder.config.client_port, 4662);
        assert_eq!(builder.config.search_timeout_ms, 1500);
        assert_eq!(builder.config.connect_timeout_ms, 3000);
        assert_eq!(builder.config.log_capacity, 10);
        assert_eq!(builder.config.max_message_size, 1024);
        assert_eq!(builder.config.channel_capacity, 4);
    }

    #[test]
    fn test_builder_saturates_huge_timeouts() {
        let builder = Client::builder()
            .search_timeout(Duration::MAX)
            .connect_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(builder.config.search_timeout_ms, u64::MAX);
        assert_eq!(builder.config.connect_timeout_ms, u64::MAX);
    }

    #[test]
    fn test_builder_user_hash() {
        let hash: UserHash = "00112233445566778899aabbccddeeff".parse().unwrap();
        let builder = ClientBuilder::new().user_hash(hash);
        assert_eq!(builder.config.resolve_user_hash().unwrap(), hash);
    }

    #[tokio::test]
    async fn test_spawn_rejects_bad_user_hash() {
        let config = ClientConfig {
            user_hash: Some("xyz".to_string()),
            ..ClientConfig::default()
        };
        let err = ClientBuilder::new().config(config).spawn().unwrap_err();
        assert!(matches!(err, Ed2kError::InvalidUserHash(_)));
    }

    #[tokio::test]
    async fn test_guards_before_connect() {
        let (client, _events) = Client::builder().spawn().unwrap();

        assert!(matches!(client.login().await, Err(Ed2kError::NotConnected)));
        assert!(matches!(client.search("x").await, Err(Ed2kError::NotLoggedIn)));
        assert!(matches!(client.disconnect().await, Err(Ed2kError::NotConnected)));
        assert_eq!(client.session().state, SessionState::Disconnected);
    }

    #[test]
    fn test_event_accessors() {
        let event = ClientEvent::Connected(ClientSession::default());
        assert_eq!(event.name(), "connected");
        assert!(event.session().is_some());

        let event = ClientEvent::Error(Ed2kError::Incomplete);
        assert_eq!(event.name(), "error");
        assert!(event.session().is_none());
    }

    #[test]
    fn test_describe() {
        let line = describe(&InboundMessage::ServerStatus { users: 3, files: 9 });
        assert_eq!(line, "Server status: 3 users, 9 files");
    }
}
