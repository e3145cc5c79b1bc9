use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffer::DEFAULT_CAPACITY;
use crate::transport::MAX_DATAGRAM_SIZE;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Capacity of the buffer each outgoing packet is built in.
    pub buffer_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpConfig {
    pub max_datagram_size: usize,
    /// Upper bound on how long `disconnect` waits for the receive thread.
    pub read_timeout: Duration,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            max_datagram_size: MAX_DATAGRAM_SIZE,
            read_timeout: Duration::from_millis(100),
        }
    }
}
