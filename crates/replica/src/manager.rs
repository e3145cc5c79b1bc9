use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::buffer::{NetBuffer, NetReader};
use crate::config::ManagerConfig;
use crate::error::{BufferError, DecodeError, NetError};
use crate::object::{NetworkId, NetworkObject, PrefabId};
use crate::protocol::{self, PacketKind};
use crate::rpc::RpcArgs;
use crate::transport::{Inbox, Role, Transport, inbox};

/// Builds a fresh, unbound object for a prefab id.
pub type PrefabFactory = Box<dyn Fn() -> NetworkObject + Send + Sync>;

pub struct NetworkManager {
    role: Role,
    transport: Arc<dyn Transport>,
    inbox: Inbox,
    prefabs: HashMap<PrefabId, PrefabFactory>,
    objects: BTreeMap<NetworkId, NetworkObject>,
    next_network_id: NetworkId,
    config: ManagerConfig,
}

impl NetworkManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, ManagerConfig::default())
    }

    /// Takes over the transport's receive path. The role is fixed from the transport.
    pub fn with_config(transport: Arc<dyn Transport>, config: ManagerConfig) -> Self {
        let (sink, inbox) = inbox();
        transport.set_receiver(sink);
        Self {
            role: transport.role(),
            transport,
            inbox,
            prefabs: HashMap::new(),
            objects: BTreeMap::new(),
            next_network_id: 1,
            config,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_server(&self) -> bool {
        self.role == Role::Server
    }

    pub fn is_client(&self) -> bool {
        self.role == Role::Client
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Registers (or replaces) the factory for `prefab_id`. Every participant
    /// must register the same ids with factories producing the same layout.
    pub fn register_prefab<F>(&mut self, prefab_id: PrefabId, factory: F)
    where
        F: Fn() -> NetworkObject + Send + Sync + 'static,
    {
        if self.prefabs.insert(prefab_id, Box::new(factory)).is_some() {
            log::debug!("prefab {} re-registered", prefab_id);
        }
    }

    pub fn has_prefab(&self, prefab_id: PrefabId) -> bool {
        self.prefabs.contains_key(&prefab_id)
    }

    fn require_server(&self, operation: &'static str) -> Result<(), NetError> {
        if self.role != Role::Server {
            return Err(NetError::RoleViolation {
                operation,
                role: self.role,
            });
        }
        Ok(())
    }

    fn new_buffer(&self) -> NetBuffer {
        NetBuffer::with_capacity(self.config.buffer_capacity)
    }

    /// Builds an object from a prefab, assigns it the next network id and
    /// announces it to every client.
    pub fn spawn_with_prefab(&mut self, prefab_id: PrefabId) -> Result<NetworkId, NetError> {
        self.require_server("spawn_with_prefab")?;
        let factory = self
            .prefabs
            .get(&prefab_id)
            .ok_or(NetError::UnknownPrefab(prefab_id))?;
        let mut object = factory();

        let network_id = self.next_network_id;
        let mut buf = self.new_buffer();
        protocol::encode_spawn(&mut buf, network_id, prefab_id)?;
        self.next_network_id += 1;

        object.bind(
            network_id,
            prefab_id,
            self.role,
            Arc::clone(&self.transport),
            self.config.buffer_capacity,
        );
        self.objects.insert(network_id, object);
        self.transport.broadcast(&buf.into_vec());
        log::debug!("spawned object {} from prefab {}", network_id, prefab_id);
        Ok(network_id)
    }

    /// Removes an object here and on every client. Returns whether it existed.
    pub fn despawn(&mut self, network_id: NetworkId) -> Result<bool, NetError> {
        self.require_server("despawn")?;
        if self.objects.remove(&network_id).is_none() {
            return Ok(false);
        }
        let mut buf = self.new_buffer();
        protocol::encode_despawn(&mut buf, network_id)?;
        self.transport.broadcast(&buf.into_vec());
        log::debug!("despawned object {}", network_id);
        Ok(true)
    }

    /// Broadcasts one state-delta packet per object with dirty variables, in
    /// ascending id order. Returns the number of packets sent.
    pub fn tick(&mut self) -> Result<usize, NetError> {
        self.require_server("tick")?;
        let mut sent = 0;
        for (&network_id, object) in &self.objects {
            let dirty = object.take_dirty_indices();
            if dirty.is_empty() {
                continue;
            }
            let mut buf = self.new_buffer();
            if let Err(e) = encode_state_delta(&mut buf, network_id, object, &dirty) {
                object.mark_dirty(&dirty);
                log::warn!(
                    "state delta for object {} did not fit ({}), keeping it dirty",
                    network_id,
                    e
                );
                continue;
            }
            self.transport.broadcast(&buf.into_vec());
            sent += 1;
        }
        if sent > 0 {
            log::trace!("tick sent {} state deltas", sent);
        }
        Ok(sent)
    }

    /// Decodes queued packets from the transport. Returns how many were processed.
    pub fn poll(&mut self) -> usize {
        let packets = self.inbox.drain();
        for payload in &packets {
            self.on_receive_data(payload);
        }
        packets.len()
    }

    /// Decodes one packet. Failures are logged and the packet is dropped.
    pub fn on_receive_data(&mut self, data: &[u8]) {
        if let Err(e) = self.try_receive_data(data) {
            log::warn!("{}: dropped packet ({} bytes): {}", self.role, data.len(), e);
        }
    }

    /// Like `on_receive_data`, but hands the failure back to the caller.
    pub fn try_receive_data(&mut self, data: &[u8]) -> Result<(), DecodeError> {
        let mut reader = NetReader::new(data);
        let kind = PacketKind::try_from(reader.read_i32()?)?;
        match kind {
            PacketKind::Spawn => {
                self.accept_on(kind, Role::Client)?;
                self.receive_spawn(&mut reader)
            }
            PacketKind::StateDelta => {
                self.accept_on(kind, Role::Client)?;
                self.receive_state_delta(&mut reader)
            }
            PacketKind::Despawn => {
                self.accept_on(kind, Role::Client)?;
                self.receive_despawn(&mut reader)
            }
            PacketKind::ServerRpc => {
                self.accept_on(kind, Role::Server)?;
                self.receive_rpc(&mut reader)
            }
            PacketKind::ClientRpc => {
                self.accept_on(kind, Role::Client)?;
                self.receive_rpc(&mut reader)
            }
        }
    }

    fn accept_on(&self, kind: PacketKind, role: Role) -> Result<(), DecodeError> {
        if self.role != role {
            return Err(DecodeError::WrongRole {
                packet: kind.name(),
                role: self.role,
            });
        }
        Ok(())
    }

    fn receive_spawn(&mut self, reader: &mut NetReader<'_>) -> Result<(), DecodeError> {
        let network_id = reader.read_i32()?;
        let prefab_id = reader.read_i32()?;
        if self.objects.contains_key(&network_id) {
            log::debug!("object {} already mirrored, ignoring spawn", network_id);
            return Ok(());
        }
        let factory = self
            .prefabs
            .get(&prefab_id)
            .ok_or(DecodeError::UnknownPrefab(prefab_id))?;
        let mut object = factory();
        // Mirrors only receive state; nothing here is pending to send.
        object.clear_all_dirty_variables();
        object.bind(
            network_id,
            prefab_id,
            self.role,
            Arc::clone(&self.transport),
            self.config.buffer_capacity,
        );
        self.objects.insert(network_id, object);
        log::debug!("mirrored object {} from prefab {}", network_id, prefab_id);
        Ok(())
    }

    fn receive_state_delta(&mut self, reader: &mut NetReader<'_>) -> Result<(), DecodeError> {
        let network_id = reader.read_i32()?;
        let object = self
            .objects
            .get(&network_id)
            .ok_or(DecodeError::UnknownObject(network_id))?;
        let dirty = reader.read_i32()?;
        if dirty < 0 {
            return Err(BufferError::NegativeLength(dirty).into());
        }
        for _ in 0..dirty {
            let index = reader.read_i32()?;
            // No per-field framing: a bad index leaves the rest of the packet unreadable.
            let variable = usize::try_from(index)
                .ok()
                .and_then(|i| object.variable(i))
                .ok_or(DecodeError::VariableIndexOutOfRange {
                    network_id,
                    index,
                    count: object.variable_count(),
                })?;
            variable.deserialize(reader)?;
        }
        Ok(())
    }

    fn receive_despawn(&mut self, reader: &mut NetReader<'_>) -> Result<(), DecodeError> {
        let network_id = reader.read_i32()?;
        if self.objects.remove(&network_id).is_none() {
            log::debug!("despawn for unknown object {}", network_id);
        }
        Ok(())
    }

    fn receive_rpc(&mut self, reader: &mut NetReader<'_>) -> Result<(), DecodeError> {
        let (target, args) = protocol::decode_rpc(reader)?;
        let object = self
            .objects
            .get_mut(&target.network_id)
            .ok_or(DecodeError::UnknownObject(target.network_id))?;
        let behaviour = usize::try_from(target.behaviour_index)
            .ok()
            .and_then(|i| object.behaviour_dyn_mut(i))
            .ok_or(DecodeError::UnknownBehaviour {
                network_id: target.network_id,
                index: target.behaviour_index,
            })?;
        log::trace!(
            "rpc {} on object {} behaviour {}",
            target.method,
            target.network_id,
            target.behaviour_index
        );
        behaviour.handle_rpc(&target.method, &mut RpcArgs::new(args), self.role)?;
        Ok(())
    }

    pub fn get_network_object(&self, network_id: NetworkId) -> Option<&NetworkObject> {
        self.objects.get(&network_id)
    }

    pub fn get_network_object_mut(&mut self, network_id: NetworkId) -> Option<&mut NetworkObject> {
        self.objects.get_mut(&network_id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &NetworkObject> {
        self.objects.values()
    }

    pub fn objects_mut(&mut self) -> impl Iterator<Item = &mut NetworkObject> {
        self.objects.values_mut()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn network_ids(&self) -> Vec<NetworkId> {
        self.objects.keys().copied().collect()
    }

    /// Flags the object this participant controls. Returns false if it does not exist.
    pub fn set_local_player(&mut self, network_id: NetworkId, local_player: bool) -> bool {
        match self.objects.get_mut(&network_id) {
            Some(object) => {
                object.set_local_player(local_player);
                true
            }
            None => false,
        }
    }

    /// Disconnects the transport. A client also forgets its mirrored objects.
    pub fn disconnect(&mut self) {
        self.transport.disconnect();
        if self.role == Role::Client {
            self.objects.clear();
        }
        self.inbox.drain();
    }
}

fn encode_state_delta(
    buf: &mut NetBuffer,
    network_id: NetworkId,
    object: &NetworkObject,
    dirty: &[usize],
) -> Result<(), BufferError> {
    buf.write_i32(PacketKind::StateDelta.tag())?;
    buf.write_i32(network_id)?;
    buf.write_i32(dirty.len() as i32)?;
    for &index in dirty {
        if let Some(variable) = object.variable(index) {
            buf.write_i32(index as i32)?;
            variable.serialize(buf)?;
        }
    }
    Ok(())
}
