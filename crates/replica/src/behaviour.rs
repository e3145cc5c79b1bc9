use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::buffer::NetBuffer;
use crate::error::{NetError, RpcError};
use crate::object::NetworkId;
use crate::protocol::{self, RpcTarget};
use crate::rpc::{RpcArgs, RpcKind, RpcValue};
use crate::transport::{Role, Transport};
use crate::variable::SharedVariable;

/// Downcasting support for `dyn NetworkBehaviour`.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Clone)]
struct Binding {
    network_id: NetworkId,
    role: Role,
    transport: Arc<dyn Transport>,
    buffer_capacity: usize,
}

/// Attachment state of a behaviour. Unattached until its object is bound.
#[derive(Clone, Default)]
pub struct BehaviourLink {
    index: usize,
    local_player: bool,
    binding: Option<Binding>,
}

impl fmt::Debug for BehaviourLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviourLink")
            .field("index", &self.index)
            .field("local_player", &self.local_player)
            .field("network_id", &self.network_id())
            .field("role", &self.role())
            .finish()
    }
}

impl BehaviourLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.binding.is_some()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn network_id(&self) -> Option<NetworkId> {
        self.binding.as_ref().map(|b| b.network_id)
    }

    pub fn role(&self) -> Option<Role> {
        self.binding.as_ref().map(|b| b.role)
    }

    pub fn is_local_player(&self) -> bool {
        self.local_player
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    pub(crate) fn set_local_player(&mut self, local_player: bool) {
        self.local_player = local_player;
    }

    pub(crate) fn attach(
        &mut self,
        network_id: NetworkId,
        role: Role,
        transport: Arc<dyn Transport>,
        buffer_capacity: usize,
    ) {
        self.binding = Some(Binding {
            network_id,
            role,
            transport,
            buffer_capacity,
        });
    }

    /// Encodes an RPC addressed at this behaviour and hands it to `send`.
    fn send_rpc(
        &self,
        kind: RpcKind,
        operation: &'static str,
        method: &str,
        args: &[RpcValue],
    ) -> Result<(), NetError> {
        let binding = self.binding.as_ref().ok_or(NetError::NotAttached)?;
        // The sender is always the side the RPC does not run on.
        if binding.role == kind.runs_on() {
            return Err(NetError::RoleViolation {
                operation,
                role: binding.role,
            });
        }
        let target = RpcTarget {
            network_id: binding.network_id,
            behaviour_index: self.index as i32,
            method: method.to_owned(),
        };
        let mut buf = NetBuffer::with_capacity(binding.buffer_capacity);
        let packet = kind.packet_kind();
        protocol::encode_rpc(&mut buf, packet, &target, args)?;
        let payload = buf.into_vec();
        log::trace!(
            "{} {} -> object {} behaviour {} ({} bytes)",
            packet.name(),
            method,
            target.network_id,
            target.behaviour_index,
            payload.len()
        );
        match kind {
            RpcKind::Server => binding.transport.send_to_server(&payload),
            RpcKind::Client => binding.transport.broadcast(&payload),
        }
        Ok(())
    }
}

/// A component of a network object.
///
/// Implementors embed a `BehaviourLink` and return it from `link`/`link_mut`.
/// Variables returned by `network_variables` are registered on the owning
/// object in order when the behaviour is added; their position is the wire
/// index, so the order must be identical on every participant.
pub trait NetworkBehaviour: AsAny + Send {
    fn link(&self) -> &BehaviourLink;
    fn link_mut(&mut self) -> &mut BehaviourLink;

    fn network_variables(&self) -> Vec<SharedVariable> {
        Vec::new()
    }

    /// Executes an inbound RPC. `received_on` is the role of the receiving process.
    fn handle_rpc(
        &mut self,
        method: &str,
        _args: &mut RpcArgs,
        _received_on: Role,
    ) -> Result<(), RpcError> {
        Err(RpcError::UnknownMethod(method.to_owned()))
    }

    fn is_server(&self) -> bool {
        self.link().role() == Some(Role::Server)
    }

    fn is_client(&self) -> bool {
        self.link().role() == Some(Role::Client)
    }

    fn is_local_player(&self) -> bool {
        self.link().is_local_player()
    }

    fn network_id(&self) -> Option<NetworkId> {
        self.link().network_id()
    }

    fn behaviour_index(&self) -> usize {
        self.link().index()
    }

    /// Asks the server to run `method`. Only valid on a client.
    fn send_server_rpc(&self, method: &str, args: &[RpcValue]) -> Result<(), NetError> {
        self.link()
            .send_rpc(RpcKind::Server, "send_server_rpc", method, args)
    }

    /// Asks every client to run `method`. Only valid on the server.
    fn send_client_rpc(&self, method: &str, args: &[RpcValue]) -> Result<(), NetError> {
        self.link()
            .send_rpc(RpcKind::Client, "send_client_rpc", method, args)
    }
}
