use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use replica::{NetworkBehaviour, NetworkId, NetworkManager, Role, Transport, UdpTransport};

use crate::config::SandboxConfig;
use crate::simulation::{FixedTimestep, advance_bullets};
use crate::tank::{TANK_PREFAB_ID, TankBehaviour, tank_prefab};

/// Mirroring side of the sandbox.
///
/// Adopts the guest tank (the second one the server spawns), asks the
/// server to fire it at a fixed interval and simulates announced bullets
/// locally.
pub struct TankClient {
    manager: NetworkManager,
    transport: Arc<UdpTransport>,
    config: SandboxConfig,
    timestep: FixedTimestep,
    local: Option<NetworkId>,
    fire_cooldown: f32,
    report_cooldown: f32,
}

impl TankClient {
    pub fn new(config: SandboxConfig) -> Result<Self> {
        let transport = UdpTransport::new(Role::Client);
        let mut manager = NetworkManager::new(transport.clone());
        manager.register_prefab(TANK_PREFAB_ID, tank_prefab);
        transport
            .connect(&config.host, config.port)
            .with_context(|| format!("failed to connect to {}:{}", config.host, config.port))?;

        Ok(Self {
            manager,
            transport,
            timestep: FixedTimestep::new(config.tick_rate),
            local: None,
            fire_cooldown: config.fire_interval,
            report_cooldown: config.report_interval,
            config,
        })
    }

    pub fn run(&mut self) -> Result<()> {
        let started = Instant::now();
        while self.config.duration.is_none_or(|limit| started.elapsed() < limit) {
            self.tick_once()?;
            std::thread::sleep(Duration::from_millis(1));
        }
        self.manager.disconnect();
        log::info!("client stopped after {:.1}s", started.elapsed().as_secs_f32());
        Ok(())
    }

    fn tick_once(&mut self) -> Result<()> {
        self.manager.poll();
        if self.local.is_none() && self.manager.object_count() >= 2 {
            self.adopt_guest();
        }

        let dt = self.timestep.dt();
        for _ in 0..self.timestep.due_steps() {
            self.step(dt)?;
        }
        Ok(())
    }

    fn adopt_guest(&mut self) {
        let Some(guest) = self.manager.network_ids().into_iter().nth(1) else {
            return;
        };
        self.manager.set_local_player(guest, true);
        self.local = Some(guest);
        log::info!("controlling tank {}", guest);
    }

    fn step(&mut self, dt: f32) -> Result<()> {
        for object in self.manager.objects_mut() {
            if let Some(tank) = object.behaviour_mut::<TankBehaviour>(0) {
                advance_bullets(&mut tank.local_bullets, dt);
            }
        }

        let Some(local) = self.local else {
            return Ok(());
        };
        self.fire_cooldown -= dt;
        if self.fire_cooldown <= 0.0 {
            self.fire_cooldown = self.config.fire_interval;
            if let Some(tank) = self.tank(local) {
                if !tank.is_dead.get() {
                    tank.send_server_rpc("request_fire", &[])?;
                }
            }
        }

        self.report_cooldown -= dt;
        if self.report_cooldown <= 0.0 {
            self.report_cooldown = self.config.report_interval;
            self.report();
        }
        Ok(())
    }

    fn tank(&self, id: NetworkId) -> Option<&TankBehaviour> {
        self.manager
            .get_network_object(id)
            .and_then(|o| o.behaviour::<TankBehaviour>(0))
    }

    fn report(&self) {
        for object in self.manager.objects() {
            let Some(tank) = object.behaviour::<TankBehaviour>(0) else {
                continue;
            };
            log::info!(
                "tank {}{}: pos=({:.0}, {:.0}) rot={:.0} hp={} dead={} respawn={:.1} bullets={}",
                object.network_id(),
                if tank.is_local_player() { " (you)" } else { "" },
                tank.x.get(),
                tank.y.get(),
                tank.rot.get(),
                tank.hp.get(),
                tank.is_dead.get(),
                tank.respawn_timer.get(),
                tank.local_bullets.len()
            );
        }
        let stats = self.transport.stats();
        log::debug!(
            "received={} ({} bytes) dropped={}",
            stats.packets_received,
            stats.bytes_received,
            stats.packets_dropped
        );
    }
}
