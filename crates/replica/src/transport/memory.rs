use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::{PacketSink, Role, StatsCounters, Transport, TransportStats};
use crate::error::TransportError;

/// In-process transport: a send hands the bytes straight to the peer's
/// receive path in the same call stack. Deterministic, no sockets.
#[derive(Debug)]
pub struct MemoryTransport {
    role: Role,
    peer: Mutex<Weak<MemoryTransport>>,
    receiver: Mutex<Option<PacketSink>>,
    stats: StatsCounters,
}

impl MemoryTransport {
    pub fn new(role: Role) -> Arc<Self> {
        Arc::new(Self {
            role,
            peer: Mutex::new(Weak::new()),
            receiver: Mutex::new(None),
            stats: StatsCounters::default(),
        })
    }

    /// Wires two endpoints to each other, replacing earlier links.
    pub fn connect_pair(a: &Arc<Self>, b: &Arc<Self>) {
        *a.peer.lock() = Arc::downgrade(b);
        *b.peer.lock() = Arc::downgrade(a);
    }

    pub fn is_connected(&self) -> bool {
        self.peer.lock().strong_count() > 0
    }

    fn send_to_peer(&self, payload: &[u8]) {
        let Some(peer) = self.peer.lock().upgrade() else {
            log::trace!("memory transport ({}): no peer, dropping {} bytes", self.role, payload.len());
            return;
        };
        self.stats.record_sent(payload.len());
        peer.receive_data(payload);
    }

    fn receive_data(&self, payload: &[u8]) {
        self.stats.record_received(payload.len());
        let delivered = self
            .receiver
            .lock()
            .as_ref()
            .is_some_and(|sink| sink.deliver(payload.to_vec()));
        if !delivered {
            self.stats.record_dropped();
        }
    }
}

impl Transport for MemoryTransport {
    fn start_server(&self, _port: u16) -> Result<(), TransportError> {
        Ok(())
    }

    fn connect(&self, _host: &str, _port: u16) -> Result<(), TransportError> {
        Ok(())
    }

    fn disconnect(&self) {
        let peer = std::mem::take(&mut *self.peer.lock());
        if let Some(peer) = peer.upgrade() {
            *peer.peer.lock() = Weak::new();
        }
    }

    fn send_to_client(&self, _client_id: usize, payload: &[u8]) {
        if self.role == Role::Server {
            self.send_to_peer(payload);
        }
    }

    fn send_to_server(&self, payload: &[u8]) {
        if self.role == Role::Client {
            self.send_to_peer(payload);
        }
    }

    fn broadcast(&self, payload: &[u8]) {
        if self.role == Role::Server {
            self.send_to_peer(payload);
        }
    }

    fn role(&self) -> Role {
        self.role
    }

    fn set_receiver(&self, sink: PacketSink) {
        *self.receiver.lock() = Some(sink);
    }

    fn stats(&self) -> TransportStats {
        self.stats.snapshot()
    }
}
