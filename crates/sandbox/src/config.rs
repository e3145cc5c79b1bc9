use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub host: String,
    pub port: u16,
    pub tick_rate: u32,
    /// Stop after this long. Runs until killed when `None`.
    pub duration: Option<Duration>,
    /// Seconds between shots for the server-driven tank and client fire requests.
    pub fire_interval: f32,
    /// Seconds between state reports in the log.
    pub report_interval: f32,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 7777,
            tick_rate: 60,
            duration: None,
            fire_interval: 1.5,
            report_interval: 1.0,
        }
    }
}
