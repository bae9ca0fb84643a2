//! Per-connection receive loop

use std::io::{self, Read};
use std::net::TcpStream;
use std::thread::{self, JoinHandle};

use super::events::MessageHandlers;
use super::manager::{ActiveConnection, ConnectionManager};
use crate::protocol::InboundMessage;

/// Reads one connection until it fails, then hands control back to the
/// manager. Never restarts itself; the manager spawns a fresh receiver after
/// reconnecting.
pub(crate) struct MessageReceiver {
    manager: ConnectionManager,
    stream: TcpStream,
    generation: u64,
    handlers: MessageHandlers,
    buffer_size: usize,
}

impl MessageReceiver {
    pub fn new(
        manager: ConnectionManager,
        connection: ActiveConnection,
        handlers: MessageHandlers,
        buffer_size: usize,
    ) -> Self {
        Self {
            manager,
            stream: connection.stream,
            generation: connection.generation,
            handlers,
            buffer_size: buffer_size.max(1),
        }
    }

    /// Run on a dedicated thread
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("safestep-recv-{}", self.generation))
            .spawn(move || self.run())
    }

    /// Blocking receive loop. Triggers run the capture pipeline right here,
    /// so nothing else is read until the cycle finishes.
    pub fn run(mut self) {
        let mut buf = vec![0u8; self.buffer_size];
        log::debug!("Receiver for connection #{} started", self.generation);

        while self.manager.is_running() {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    log::warn!("Server closed connection #{}", self.generation);
                    break;
                }
                Ok(n) => {
                    let message = InboundMessage::decode(&buf[..n]);
                    if message.is_trigger() {
                        log::info!("Capture trigger received");
                    }
                    self.handlers.dispatch(message);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    if self.manager.is_running() {
                        log::warn!("Read failed on connection #{}: {}", self.generation, e);
                    }
                    break;
                }
            }
        }

        self.manager.on_disconnect(self.generation);
        log::debug!("Receiver for connection #{} stopped", self.generation);
    }
}
