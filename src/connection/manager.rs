//! Control channel supervisor
//!
//! Owns the socket, the identification handshake and the reconnect loop.
//! All link state lives behind a single mutex; the Disconnected ->
//! Reconnecting transition is taken under that mutex, so there can never be
//! two reconnect loops at once.

use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::events::MessageHandlers;
use super::receiver::MessageReceiver;
use super::state::{ConnectionState, LinkState};
use crate::config::ServerConfig;
use crate::error::{ClientError, Result};
use crate::protocol::ClientIdentity;
use crate::report::ReportTransport;

/// Granularity of interruptible sleeps
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// A freshly installed connection, ready to be read by a receiver
#[derive(Debug)]
pub(crate) struct ActiveConnection {
    /// Read handle (a clone of the socket the manager keeps for writing)
    pub stream: TcpStream,
    /// Generation the receiver must quote when reporting a disconnect
    pub generation: u64,
}

struct Shared {
    config: ServerConfig,
    identity: ClientIdentity,
    link: Mutex<LinkState>,
    running: AtomicBool,
    handlers: Mutex<MessageHandlers>,
}

/// Handle to the connection supervisor. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Create a manager for the given server. Nothing connects until
    /// [`start`](Self::start).
    pub fn new(config: ServerConfig) -> Self {
        let identity = ClientIdentity::new(config.client_id.clone());
        Self {
            shared: Arc::new(Shared {
                config,
                identity,
                link: Mutex::new(LinkState::default()),
                running: AtomicBool::new(true),
                handlers: Mutex::new(MessageHandlers::new()),
            }),
        }
    }

    /// Set the callback run on the receive thread for each trigger
    pub fn set_trigger_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.handlers.lock().set_trigger(Arc::new(callback));
    }

    /// Set the callback for non-trigger text
    pub fn set_message_callback<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.shared.handlers.lock().set_message(Arc::new(callback));
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.shared.identity
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.shared.config.host, self.shared.config.port)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.link.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Attempts made by the current (or last) reconnect loop
    pub fn attempts(&self) -> u32 {
        self.shared.link.lock().attempts
    }

    /// Generation of the most recently installed connection
    pub fn generation(&self) -> u64 {
        self.shared.link.lock().generation
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Whether a reconnect loop owns the link. Only the loop that moved the
    /// link to Reconnecting may move it out again.
    pub fn is_reconnecting(&self) -> bool {
        self.state() == ConnectionState::Reconnecting
    }

    /// Initial connection. Falls back to the reconnect loop on failure.
    /// Returns whether the client is connected afterwards.
    pub fn start(&self) -> bool {
        {
            let mut link = self.shared.link.lock();
            if link.state != ConnectionState::Disconnected {
                log::debug!("start() while {}, ignoring", link.state);
                return link.state == ConnectionState::Connected;
            }
            link.state = ConnectionState::Connecting;
        }

        log::info!(
            "Connecting to {} as {}",
            self.address(),
            self.shared.identity
        );

        match self.connect() {
            Ok(connection) => {
                self.spawn_receiver(connection);
                true
            }
            Err(e) => {
                log::warn!("Connection to {} failed: {}", self.address(), e);
                {
                    let mut link = self.shared.link.lock();
                    if link.state == ConnectionState::Connecting {
                        link.state = ConnectionState::Disconnected;
                    }
                }
                self.start_reconnect_loop();
                false
            }
        }
    }

    /// Open a socket, identify, and make it the active connection.
    ///
    /// No answer to the identification packet within the configured interval
    /// counts as acceptance; a rejection arriving later is not seen here.
    pub(crate) fn connect(&self) -> Result<ActiveConnection> {
        let stream = self.open_and_identify()?;
        self.install(stream)
    }

    /// Start the reconnect loop unless one is already running or the link is
    /// not disconnected. Returns whether a new loop was started.
    pub fn start_reconnect_loop(&self) -> bool {
        {
            let mut link = self.shared.link.lock();
            if !self.is_running() {
                return false;
            }
            if link.state != ConnectionState::Disconnected {
                log::debug!("Reconnect requested while {}, ignoring", link.state);
                return false;
            }
            link.state = ConnectionState::Reconnecting;
            link.attempts = 0;
        }

        let manager = self.clone();
        let spawned = thread::Builder::new()
            .name("safestep-reconnect".to_string())
            .spawn(move || manager.run_reconnect_loop());

        match spawned {
            Ok(_) => true,
            Err(e) => {
                log::error!("Failed to spawn reconnect thread: {}", e);
                let mut link = self.shared.link.lock();
                if link.state == ConnectionState::Reconnecting {
                    link.state = ConnectionState::Disconnected;
                }
                false
            }
        }
    }

    /// Report an I/O failure on connection `generation`.
    ///
    /// Reports for a connection that has already been retired are ignored.
    pub fn on_disconnect(&self, generation: u64) {
        {
            let mut link = self.shared.link.lock();
            if !link.is_current(generation) {
                log::debug!("Ignoring disconnect of retired connection #{}", generation);
                return;
            }
            link.close_stream();
            link.state = ConnectionState::Disconnected;
        }

        if self.is_running() {
            log::warn!("Connection #{} to {} lost", generation, self.address());
        }
        self.start_reconnect_loop();
    }

    /// Stop reconnecting and close the active socket.
    ///
    /// Blocked reads return immediately; a capture cycle already in flight
    /// runs to completion and its report is dropped.
    pub fn shutdown(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }

        {
            let mut link = self.shared.link.lock();
            link.close_stream();
            link.state = ConnectionState::Disconnected;
        }
        *self.shared.handlers.lock() = MessageHandlers::new();

        log::info!("Connection manager stopped");
    }

    fn run_reconnect_loop(&self) {
        let max_attempts = self.shared.config.max_reconnect_attempts;
        let delay = self.shared.config.reconnect_delay();

        while self.is_running() {
            let attempt = {
                let mut link = self.shared.link.lock();
                link.attempts += 1;
                link.attempts
            };
            log::info!("Reconnect attempt {} to {}", attempt, self.address());

            let outcome = self
                .open_and_identify()
                .and_then(|stream| self.install(stream));

            match outcome {
                Ok(connection) => {
                    self.spawn_receiver(connection);
                    return;
                }
                Err(e) => log::warn!("Reconnect attempt {} failed: {}", attempt, e),
            }

            if max_attempts > 0 && attempt >= max_attempts {
                log::error!(
                    "Giving up on {} after {} attempts",
                    self.address(),
                    attempt
                );
                break;
            }

            self.sleep_while_running(delay);
        }

        let mut link = self.shared.link.lock();
        if link.state == ConnectionState::Reconnecting {
            link.state = ConnectionState::Disconnected;
        }
    }

    fn open_and_identify(&self) -> Result<TcpStream> {
        let config = &self.shared.config;
        let stream = open_stream(&config.host, config.port, config.connect_timeout())?;
        identify(&stream, &self.shared.identity, config)?;
        Ok(stream)
    }

    /// Make `stream` the active socket. Ends any reconnect loop, since the
    /// state leaves Reconnecting in the same critical section.
    fn install(&self, stream: TcpStream) -> Result<ActiveConnection> {
        let reader = stream.try_clone()?;

        let mut link = self.shared.link.lock();
        if !self.is_running() {
            let _ = stream.shutdown(Shutdown::Both);
            return Err(ClientError::Connection(io::Error::new(
                io::ErrorKind::Interrupted,
                "client is shutting down",
            )));
        }

        let generation = link.install(stream);
        drop(link);

        log::info!(
            "Connected to {} as {} (connection #{})",
            self.address(),
            self.shared.identity,
            generation
        );

        Ok(ActiveConnection {
            stream: reader,
            generation,
        })
    }

    fn spawn_receiver(&self, connection: ActiveConnection) {
        let generation = connection.generation;
        let handlers = self.shared.handlers.lock().clone();
        let receiver = MessageReceiver::new(
            self.clone(),
            connection,
            handlers,
            self.shared.config.read_buffer_size,
        );

        if let Err(e) = receiver.spawn() {
            log::error!("Failed to spawn receiver for connection #{}: {}", generation, e);
            self.on_disconnect(generation);
        }
    }

    fn sleep_while_running(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

impl ReportTransport for ConnectionManager {
    /// Write one line on the active socket. The link mutex is held for the
    /// whole write so a reconnect cannot swap the socket underneath it.
    fn send_line(&self, line: &str) -> Result<()> {
        let link = self.shared.link.lock();
        if link.state != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let generation = link.generation;

        let written = match link.stream.as_ref() {
            Some(mut stream) => stream
                .write_all(line.as_bytes())
                .and_then(|()| stream.flush()),
            None => return Err(ClientError::NotConnected),
        };
        drop(link);

        written.map_err(|e| {
            log::warn!("Write on connection #{} failed: {}", generation, e);
            self.on_disconnect(generation);
            ClientError::Send(e.to_string())
        })
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("address", &self.address())
            .field("identity", &self.shared.identity)
            .field("state", &self.state())
            .finish()
    }
}

fn open_stream(host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_error = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no address resolved for {}:{}", host, port),
        )
    }))
}

/// Send the identification packet and wait briefly for a rejection
fn identify(stream: &TcpStream, identity: &ClientIdentity, config: &ServerConfig) -> Result<()> {
    let mut writer = stream;
    writer.write_all(identity.packet().as_bytes())?;

    stream.set_read_timeout(Some(config.identify_timeout()))?;
    let mut buf = vec![0u8; config.read_buffer_size.max(1)];
    let mut reader = stream;

    match reader.read(&mut buf) {
        Ok(0) => {
            return Err(ClientError::Connection(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "server closed the connection during identification",
            )));
        }
        Ok(n) => {
            let response = String::from_utf8_lossy(&buf[..n]);
            if config.is_rejection(&response) {
                let _ = stream.shutdown(Shutdown::Both);
                return Err(ClientError::IdentityRejected {
                    id: identity.to_string(),
                    response: response.trim().to_string(),
                });
            }
            log::info!("Server: {}", response.trim());
        }
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
            log::warn!(
                "No response to identification within {:?}, keeping connection",
                config.identify_timeout()
            );
        }
        Err(e) => return Err(e.into()),
    }

    stream.set_read_timeout(None)?;
    Ok(())
}
