use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use bytes::{BufMut, BytesMut};
use parking_lot::{Mutex, RwLock};

use super::{PacketSink, Role, StatsCounters, Transport, TransportStats};
use crate::config::UdpConfig;
use crate::error::TransportError;

pub const MAX_DATAGRAM_SIZE: usize = 4096;
pub const LENGTH_PREFIX_SIZE: usize = 4;
/// Sent bare (no length prefix) by a connecting client.
pub const HANDSHAKE: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datagram<'a> {
    Handshake,
    Payload(&'a [u8]),
    /// `declared` is `None` when the datagram is too short to hold a prefix.
    Malformed {
        declared: Option<i32>,
        actual: usize,
    },
}

pub fn parse_datagram(data: &[u8]) -> Datagram<'_> {
    if data == HANDSHAKE.as_slice() {
        return Datagram::Handshake;
    }
    let Some((prefix, body)) = data.split_first_chunk::<LENGTH_PREFIX_SIZE>() else {
        return Datagram::Malformed {
            declared: None,
            actual: data.len(),
        };
    };
    let declared = i32::from_be_bytes(*prefix);
    match usize::try_from(declared) {
        Ok(len) if len > 0 && len <= body.len() => Datagram::Payload(&body[..len]),
        _ => Datagram::Malformed {
            declared: Some(declared),
            actual: body.len(),
        },
    }
}

pub fn frame_payload(payload: &[u8]) -> Vec<u8> {
    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.put_i32(payload.len() as i32);
    frame.put_slice(payload);
    frame.to_vec()
}

struct Session {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    receive_thread: Option<JoinHandle<()>>,
}

/// Datagram transport over a real socket.
///
/// The server binds a port and learns client addresses from handshakes; the
/// client binds an ephemeral port and handshakes on `connect`. Each running
/// transport owns one receive thread that only parses frames and queues
/// payloads into the installed `PacketSink`.
pub struct UdpTransport {
    role: Role,
    config: UdpConfig,
    session: Mutex<Option<Session>>,
    running: Arc<AtomicBool>,
    clients: Arc<RwLock<Vec<SocketAddr>>>,
    server_addr: Mutex<Option<SocketAddr>>,
    receiver: Arc<Mutex<Option<PacketSink>>>,
    stats: Arc<StatsCounters>,
}

impl UdpTransport {
    pub fn new(role: Role) -> Arc<Self> {
        Self::with_config(role, UdpConfig::default())
    }

    pub fn with_config(role: Role, config: UdpConfig) -> Arc<Self> {
        Arc::new(Self {
            role,
            config,
            session: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            clients: Arc::new(RwLock::new(Vec::new())),
            server_addr: Mutex::new(None),
            receiver: Arc::new(Mutex::new(None)),
            stats: Arc::new(StatsCounters::default()),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.session.lock().as_ref().map(|s| s.local_addr)
    }

    pub fn server_addr(&self) -> Option<SocketAddr> {
        *self.server_addr.lock()
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    pub fn client_addrs(&self) -> Vec<SocketAddr> {
        self.clients.read().clone()
    }

    fn open<A: ToSocketAddrs>(&self, bind_addr: A) -> Result<SocketAddr, TransportError> {
        let mut session = self.session.lock();
        if session.is_some() {
            return Err(TransportError::AlreadyRunning);
        }

        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_read_timeout(Some(self.config.read_timeout))?;
        let local_addr = socket.local_addr()?;
        let socket = Arc::new(socket);

        self.running.store(true, Ordering::SeqCst);
        let receive_loop = ReceiveLoop {
            role: self.role,
            socket: Arc::clone(&socket),
            running: Arc::clone(&self.running),
            clients: Arc::clone(&self.clients),
            receiver: Arc::clone(&self.receiver),
            stats: Arc::clone(&self.stats),
            max_datagram_size: self.config.max_datagram_size,
        };
        let spawned = thread::Builder::new()
            .name(format!("udp-recv-{}", self.role))
            .spawn(move || receive_loop.run());
        let receive_thread = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        *session = Some(Session {
            socket,
            local_addr,
            receive_thread: Some(receive_thread),
        });
        Ok(local_addr)
    }

    fn socket(&self) -> Option<Arc<UdpSocket>> {
        self.session.lock().as_ref().map(|s| Arc::clone(&s.socket))
    }

    fn send_raw(&self, data: &[u8], target: SocketAddr) {
        let Some(socket) = self.socket() else {
            log::trace!("udp {}: not running, dropping {} bytes", self.role, data.len());
            return;
        };
        match socket.send_to(data, target) {
            Ok(sent) => self.stats.record_sent(sent),
            Err(e) => log::warn!("udp {}: send to {} failed: {}", self.role, target, e),
        }
    }

    fn frame_checked(&self, payload: &[u8]) -> Option<Vec<u8>> {
        if payload.is_empty() {
            log::warn!("udp {}: refusing to send an empty payload", self.role);
            return None;
        }
        if payload.len() + LENGTH_PREFIX_SIZE > self.config.max_datagram_size {
            log::warn!(
                "udp {}: payload of {} bytes exceeds datagram limit {}",
                self.role,
                payload.len(),
                self.config.max_datagram_size
            );
            return None;
        }
        Some(frame_payload(payload))
    }
}

impl Transport for UdpTransport {
    fn start_server(&self, port: u16) -> Result<(), TransportError> {
        if self.role != Role::Server {
            return Ok(());
        }
        let local_addr = self.open((Ipv4Addr::UNSPECIFIED, port))?;
        log::info!("udp server listening on {}", local_addr);
        Ok(())
    }

    fn connect(&self, host: &str, port: u16) -> Result<(), TransportError> {
        if self.role != Role::Client {
            return Ok(());
        }
        let server_addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| TransportError::AddressResolution(format!("{}:{}", host, port)))?;
        let bind_addr = if server_addr.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };

        let local_addr = self.open(bind_addr)?;
        *self.server_addr.lock() = Some(server_addr);
        self.send_raw(&HANDSHAKE, server_addr);
        log::info!("udp client {} connected to {}", local_addr, server_addr);
        Ok(())
    }

    fn disconnect(&self) {
        self.running.store(false, Ordering::SeqCst);
        let session = self.session.lock().take();
        self.clients.write().clear();
        *self.server_addr.lock() = None;

        let Some(mut session) = session else {
            return;
        };
        if let Some(handle) = session.receive_thread.take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                log::error!("udp {}: receive thread panicked", self.role);
            }
        }
        log::info!("udp {} on {} disconnected", self.role, session.local_addr);
    }

    fn send_to_client(&self, client_id: usize, payload: &[u8]) {
        if self.role != Role::Server {
            return;
        }
        let Some(target) = self.clients.read().get(client_id).copied() else {
            log::debug!("udp server: no client with id {}", client_id);
            return;
        };
        if let Some(frame) = self.frame_checked(payload) {
            self.send_raw(&frame, target);
        }
    }

    fn send_to_server(&self, payload: &[u8]) {
        if self.role != Role::Client {
            return;
        }
        let Some(target) = self.server_addr() else {
            return;
        };
        if let Some(frame) = self.frame_checked(payload) {
            self.send_raw(&frame, target);
        }
    }

    fn broadcast(&self, payload: &[u8]) {
        if self.role != Role::Server {
            return;
        }
        // Snapshot so handshakes arriving mid-broadcast never block or shift the iteration.
        let targets = self.client_addrs();
        if targets.is_empty() {
            return;
        }
        if let Some(frame) = self.frame_checked(payload) {
            for target in targets {
                self.send_raw(&frame, target);
            }
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

impl Drop for UdpTransport {
    fn drop(&mut self) {
        if self.session.get_mut().is_some() {
            self.disconnect();
        }
    }
}

struct ReceiveLoop {
    role: Role,
    socket: Arc<UdpSocket>,
    running: Arc<AtomicBool>,
    clients: Arc<RwLock<Vec<SocketAddr>>>,
    receiver: Arc<Mutex<Option<PacketSink>>>,
    stats: Arc<StatsCounters>,
    max_datagram_size: usize,
}

impl ReceiveLoop {
    fn run(self) {
        let mut buffer = vec![0u8; self.max_datagram_size];
        while self.running.load(Ordering::SeqCst) {
            match self.socket.recv_from(&mut buffer) {
                Ok((size, from)) => self.handle_datagram(&buffer[..size], from),
                Err(ref e)
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
                Err(e) => {
                    if self.running.load(Ordering::SeqCst) {
                        log::warn!("udp {}: receive failed: {}", self.role, e);
                    }
                }
            }
        }
        log::debug!("udp {}: receive loop stopped", self.role);
    }

    fn handle_datagram(&self, data: &[u8], from: SocketAddr) {
        match parse_datagram(data) {
            Datagram::Handshake => {
                if self.role == Role::Server {
                    let mut clients = self.clients.write();
                    if !clients.contains(&from) {
                        clients.push(from);
                        log::info!("udp server: client {} joined from {}", clients.len() - 1, from);
                    }
                }
            }
            Datagram::Payload(payload) => {
                self.stats.record_received(data.len());
                let delivered = self
                    .receiver
                    .lock()
                    .as_ref()
                    .is_some_and(|sink| sink.deliver(payload.to_vec()));
                if !delivered {
                    self.stats.record_dropped();
                    log::trace!("udp {}: no receiver for {} bytes", self.role, payload.len());
                }
            }
            Datagram::Malformed { declared, actual } => {
                self.stats.record_dropped();
                log::warn!(
                    "udp {}: dropping datagram from {} with bad length prefix (declared={:?}, actual={})",
                    self.role,
                    from,
                    declared,
                    actual
                );
            }
        }
    }
}
