pub mod behaviour;
pub mod buffer;
pub mod config;
pub mod error;
pub mod manager;
pub mod object;
pub mod protocol;
pub mod rpc;
pub mod transport;
pub mod value;
pub mod variable;

pub use behaviour::{BehaviourLink, NetworkBehaviour};
pub use buffer::{DEFAULT_CAPACITY, NetBuffer, NetReader};
pub use config::{ManagerConfig, UdpConfig};
pub use error::{BufferError, DecodeError, NetError, RpcError, TransportError};
pub use manager::{NetworkManager, PrefabFactory};
pub use object::{NetworkId, NetworkObject, PrefabId};
pub use protocol::PacketKind;
pub use rpc::{RpcArgs, RpcHandler, RpcKind, RpcRegistry, RpcValue};
pub use transport::{
    Inbox, MemoryTransport, PacketSink, Role, Transport, TransportStats, UdpTransport, inbox,
};
pub use value::{Color, NetValue};
pub use variable::{NetworkVariable, ReplicatedVariable, SharedVariable};
