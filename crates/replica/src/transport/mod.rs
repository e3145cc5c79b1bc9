mod memory;
mod stats;
mod udp;

use std::fmt;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

pub use memory::MemoryTransport;
pub use stats::TransportStats;
pub(crate) use stats::StatsCounters;
pub use udp::{
    Datagram, HANDSHAKE, LENGTH_PREFIX_SIZE, MAX_DATAGRAM_SIZE, UdpTransport, frame_payload,
    parse_datagram,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Server,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Duplex byte channel. The role is fixed at construction.
///
/// Sends are fire-and-forget: failures are logged, never returned.
pub trait Transport: Send + Sync {
    /// Binds and starts receiving. A client transport ignores this.
    fn start_server(&self, port: u16) -> Result<(), TransportError>;
    /// Connects to a server. A server transport ignores this.
    fn connect(&self, host: &str, port: u16) -> Result<(), TransportError>;
    fn disconnect(&self);
    fn send_to_client(&self, client_id: usize, payload: &[u8]);
    fn send_to_server(&self, payload: &[u8]);
    fn broadcast(&self, payload: &[u8]);
    fn role(&self) -> Role;
    /// Installs where received payloads are delivered, replacing any previous sink.
    fn set_receiver(&self, sink: PacketSink);
    fn stats(&self) -> TransportStats;

    fn is_server(&self) -> bool {
        self.role() == Role::Server
    }

    fn is_client(&self) -> bool {
        self.role() == Role::Client
    }
}

/// Sending half of a receive queue, handed to a transport.
#[derive(Debug, Clone)]
pub struct PacketSink(Sender<Vec<u8>>);

impl PacketSink {
    /// Returns false once the inbox has been dropped.
    pub fn deliver(&self, payload: Vec<u8>) -> bool {
        self.0.send(payload).is_ok()
    }
}

/// Receiving half of a receive queue, drained by the game thread.
#[derive(Debug)]
pub struct Inbox(Receiver<Vec<u8>>);

impl Inbox {
    pub fn try_recv(&self) -> Option<Vec<u8>> {
        self.0.try_recv().ok()
    }

    /// Blocks up to `timeout` for the next payload.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Vec<u8>> {
        match self.0.recv_timeout(timeout) {
            Ok(payload) => Some(payload),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.0.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub fn inbox() -> (PacketSink, Inbox) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (PacketSink(tx), Inbox(rx))
}
