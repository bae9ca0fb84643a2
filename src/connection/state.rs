//! Connection state types

use std::fmt;
use std::net::{Shutdown, TcpStream};

/// Lifecycle of the control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket and no supervisor running
    #[default]
    Disconnected,
    /// First connection attempt in progress
    Connecting,
    /// Socket identified and receiver running
    Connected,
    /// Supervisor is retrying
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Mutable link state, guarded by the manager's mutex
#[derive(Debug, Default)]
pub(crate) struct LinkState {
    pub state: ConnectionState,
    /// Active socket; `Some` only while connected
    pub stream: Option<TcpStream>,
    /// Bumped every time a socket is installed
    pub generation: u64,
    /// Attempts made by the current reconnect loop
    pub attempts: u32,
}

impl LinkState {
    /// Install a freshly identified socket, retiring any previous one.
    /// Returns the new generation.
    pub fn install(&mut self, stream: TcpStream) -> u64 {
        self.close_stream();
        self.stream = Some(stream);
        self.generation += 1;
        self.attempts = 0;
        self.state = ConnectionState::Connected;
        self.generation
    }

    /// Drop the active socket, unblocking any reader on it
    pub fn close_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Whether a disconnect report for `generation` refers to the live socket
    pub fn is_current(&self, generation: u64) -> bool {
        self.state == ConnectionState::Connected && self.generation == generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn test_default_is_disconnected() {
        let link = LinkState::default();
        assert_eq!(link.state, ConnectionState::Disconnected);
        assert!(link.stream.is_none());
        assert_eq!(link.generation, 0);
    }

    #[test]
    fn test_install_resets_attempts_and_bumps_generation() {
        let mut link = LinkState {
            attempts: 4,
            state: ConnectionState::Reconnecting,
            ..Default::default()
        };
        let (client, _server) = socket_pair();

        let generation = link.install(client);
        assert_eq!(generation, 1);
        assert_eq!(link.attempts, 0);
        assert_eq!(link.state, ConnectionState::Connected);
        assert!(link.is_current(1));
        assert!(!link.is_current(0));
    }

    #[test]
    fn test_install_closes_previous_socket() {
        use std::io::Read;

        let mut link = LinkState::default();
        let (first, mut first_server) = socket_pair();
        let (second, _second_server) = socket_pair();

        link.install(first);
        link.install(second);
        assert_eq!(link.generation, 2);

        let mut buf = [0u8; 8];
        assert_eq!(first_server.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }
}
