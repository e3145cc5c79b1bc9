use std::io;

use crate::object::NetworkId;
use crate::transport::Role;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("write of {needed} bytes exceeds capacity ({written}/{capacity} used)")]
    Overflow {
        needed: usize,
        written: usize,
        capacity: usize,
    },
    #[error("read of {needed} bytes past end of buffer ({remaining} remaining)")]
    Underflow { needed: usize, remaining: usize },
    #[error("negative length prefix: {0}")]
    NegativeLength(i32),
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("unknown value tag: {0:#04x}")]
    UnknownTag(u8),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RpcError {
    #[error("no rpc named `{0}` is registered")]
    UnknownMethod(String),
    #[error("rpc `{method}` cannot run on the {role} side")]
    WrongSide { method: String, role: Role },
    #[error("rpc argument {index}: expected {expected}, got {found}")]
    ArgumentMismatch {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
    #[error("rpc argument {index} is missing (expected {expected})")]
    MissingArgument { index: usize, expected: &'static str },
}

/// Reasons an incoming packet was dropped. Never propagated across the network.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown packet type: {0:#x}")]
    UnknownPacketType(i32),
    #[error("no prefab registered for id {0}")]
    UnknownPrefab(i32),
    #[error("no network object with id {0}")]
    UnknownObject(NetworkId),
    #[error("object {network_id} has no behaviour at index {index}")]
    UnknownBehaviour { network_id: NetworkId, index: i32 },
    #[error("variable index {index} out of range for object {network_id} ({count} variables)")]
    VariableIndexOutOfRange {
        network_id: NetworkId,
        index: i32,
        count: usize,
    },
    #[error("{packet} packets are not accepted by a {role}")]
    WrongRole { packet: &'static str, role: Role },
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("could not resolve {0}")]
    AddressResolution(String),
    #[error("transport is already running")]
    AlreadyRunning,
}

/// Errors returned synchronously to callers of the public API.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("`{operation}` is not allowed on the {role} side")]
    RoleViolation {
        operation: &'static str,
        role: Role,
    },
    #[error("behaviour is not attached to a spawned network object")]
    NotAttached,
    #[error("no prefab registered for id {0}")]
    UnknownPrefab(i32),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
