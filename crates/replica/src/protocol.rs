use crate::buffer::{NetBuffer, NetReader};
use crate::error::{BufferError, DecodeError};
use crate::object::{NetworkId, PrefabId};
use crate::rpc::RpcValue;

// StateDelta : 0x10 | networkId | dirtyCount | (variableIndex | value)*
// Spawn      : 0x11 | networkId | prefabId
// Despawn    : 0x12 | networkId
// ServerRpc  : 0x20 | networkId | behaviourIndex | method | argCount | (u8 tag | value)*
// ClientRpc  : 0x21 | same as ServerRpc
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum PacketKind {
    StateDelta = 0x10,
    Spawn = 0x11,
    Despawn = 0x12,
    ServerRpc = 0x20,
    ClientRpc = 0x21,
}

impl PacketKind {
    pub fn tag(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            PacketKind::StateDelta => "state-delta",
            PacketKind::Spawn => "spawn",
            PacketKind::Despawn => "despawn",
            PacketKind::ServerRpc => "server-rpc",
            PacketKind::ClientRpc => "client-rpc",
        }
    }
}

impl TryFrom<i32> for PacketKind {
    type Error = DecodeError;

    fn try_from(tag: i32) -> Result<Self, Self::Error> {
        match tag {
            0x10 => Ok(Self::StateDelta),
            0x11 => Ok(Self::Spawn),
            0x12 => Ok(Self::Despawn),
            0x20 => Ok(Self::ServerRpc),
            0x21 => Ok(Self::ClientRpc),
            other => Err(DecodeError::UnknownPacketType(other)),
        }
    }
}

pub fn encode_spawn(
    buf: &mut NetBuffer,
    network_id: NetworkId,
    prefab_id: PrefabId,
) -> Result<(), BufferError> {
    buf.write_i32(PacketKind::Spawn.tag())?;
    buf.write_i32(network_id)?;
    buf.write_i32(prefab_id)
}

pub fn encode_despawn(buf: &mut NetBuffer, network_id: NetworkId) -> Result<(), BufferError> {
    buf.write_i32(PacketKind::Despawn.tag())?;
    buf.write_i32(network_id)
}

/// Addressing part of an RPC packet, read after the type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcTarget {
    pub network_id: NetworkId,
    pub behaviour_index: i32,
    pub method: String,
}

pub fn encode_rpc(
    buf: &mut NetBuffer,
    kind: PacketKind,
    target: &RpcTarget,
    args: &[RpcValue],
) -> Result<(), BufferError> {
    debug_assert!(matches!(kind, PacketKind::ServerRpc | PacketKind::ClientRpc));
    buf.write_i32(kind.tag())?;
    buf.write_i32(target.network_id)?;
    buf.write_i32(target.behaviour_index)?;
    buf.write_string(&target.method)?;
    buf.write_i32(args.len() as i32)?;
    for arg in args {
        arg.write(buf)?;
    }
    Ok(())
}

pub fn decode_rpc(reader: &mut NetReader<'_>) -> Result<(RpcTarget, Vec<RpcValue>), BufferError> {
    let target = RpcTarget {
        network_id: reader.read_i32()?,
        behaviour_index: reader.read_i32()?,
        method: reader.read_string()?,
    };
    let count = reader.read_i32()?;
    let count = usize::try_from(count).map_err(|_| BufferError::NegativeLength(count))?;
    // Each argument needs at least its tag byte; reject counts the payload cannot hold.
    if count > reader.remaining() {
        return Err(BufferError::Underflow {
            needed: count,
            remaining: reader.remaining(),
        });
    }
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        args.push(RpcValue::read(reader)?);
    }
    Ok((target, args))
}
