mod client;
mod config;
mod server;
mod simulation;
mod tank;

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};

use client::TankClient;
use config::SandboxConfig;
use server::TankServer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Server,
    Client,
}

#[derive(Parser)]
#[command(name = "replica-sandbox")]
#[command(about = "Headless tank sandbox replicating over UDP")]
struct Args {
    #[arg(value_enum)]
    mode: Mode,

    #[arg(long, default_value = "127.0.0.1", help = "Server host (client mode)")]
    host: String,

    #[arg(short, long, default_value_t = 7777)]
    port: u16,

    #[arg(short, long, default_value_t = 60)]
    tick_rate: u32,

    #[arg(short, long, help = "Stop after this many seconds")]
    duration: Option<u64>,

    #[arg(long, default_value_t = 1.5, help = "Seconds between shots")]
    fire_interval: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = SandboxConfig {
        host: args.host,
        port: args.port,
        tick_rate: args.tick_rate,
        duration: args.duration.map(Duration::from_secs),
        fire_interval: args.fire_interval,
        ..Default::default()
    };

    match args.mode {
        Mode::Server => TankServer::new(config)?.run(),
        Mode::Client => TankClient::new(config)?.run(),
    }
}
