use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use replica::{Color, NetworkId, NetworkManager, Role, Transport, UdpTransport};

use crate::config::SandboxConfig;
use crate::simulation::{
    ARENA_HEIGHT, ARENA_WIDTH, FixedTimestep, advance_bullets, patrol, resolve_hits,
};
use crate::tank::{Bullet, TANK_PREFAB_ID, TankBehaviour, tank_prefab};

const HOST_COLOR: Color = Color::RED;
const GUEST_COLOR: Color = Color::BLUE;

/// Authoritative side of the sandbox.
///
/// Waits for the first client handshake, then spawns two tanks: the host
/// tank patrols and fires on its own, the guest tank fires whenever the
/// client asks through `request_fire`.
pub struct TankServer {
    manager: NetworkManager,
    transport: Arc<UdpTransport>,
    config: SandboxConfig,
    timestep: FixedTimestep,
    host: Option<NetworkId>,
    guest: Option<NetworkId>,
    bullets: Vec<Bullet>,
    elapsed: f32,
    fire_cooldown: f32,
    report_cooldown: f32,
}

impl TankServer {
    pub fn new(config: SandboxConfig) -> Result<Self> {
        let transport = UdpTransport::new(Role::Server);
        transport
            .start_server(config.port)
            .with_context(|| format!("failed to bind port {}", config.port))?;

        let mut manager = NetworkManager::new(transport.clone());
        manager.register_prefab(TANK_PREFAB_ID, tank_prefab);

        Ok(Self {
            manager,
            transport,
            timestep: FixedTimestep::new(config.tick_rate),
            host: None,
            guest: None,
            bullets: Vec::new(),
            elapsed: 0.0,
            fire_cooldown: config.fire_interval,
            report_cooldown: config.report_interval,
            config,
        })
    }

    pub fn run(&mut self) -> Result<()> {
        let started = Instant::now();
        log::info!("waiting for a client on port {}", self.config.port);
        while self.config.duration.is_none_or(|limit| started.elapsed() < limit) {
            self.tick_once()?;
            std::thread::sleep(Duration::from_millis(1));
        }
        self.manager.disconnect();
        log::info!("server stopped after {:.1}s", started.elapsed().as_secs_f32());
        Ok(())
    }

    fn tick_once(&mut self) -> Result<()> {
        self.manager.poll();
        if self.host.is_none() && self.transport.client_count() > 0 {
            self.spawn_tanks()?;
        }

        let dt = self.timestep.dt();
        for _ in 0..self.timestep.due_steps() {
            self.step(dt)?;
        }
        self.manager.tick()?;
        Ok(())
    }

    fn spawn_tanks(&mut self) -> Result<()> {
        let host = self.manager.spawn_with_prefab(TANK_PREFAB_ID)?;
        let guest = self.manager.spawn_with_prefab(TANK_PREFAB_ID)?;
        self.manager.set_local_player(host, true);

        if let Some(tank) = self.tank(guest) {
            tank.x.set(ARENA_WIDTH / 2.0);
            tank.y.set(ARENA_HEIGHT / 2.0);
            tank.color.set(GUEST_COLOR);
        }
        if let Some(tank) = self.tank(host) {
            tank.color.set(HOST_COLOR);
        }
        log::info!("spawned host tank {} and guest tank {}", host, guest);
        self.host = Some(host);
        self.guest = Some(guest);
        Ok(())
    }

    fn tank(&self, id: NetworkId) -> Option<&TankBehaviour> {
        self.manager
            .get_network_object(id)
            .and_then(|o| o.behaviour::<TankBehaviour>(0))
    }

    fn step(&mut self, dt: f32) -> Result<()> {
        let (Some(host), Some(guest)) = (self.host, self.guest) else {
            return Ok(());
        };
        self.elapsed += dt;
        self.fire_cooldown -= dt;

        let requests = self
            .manager
            .get_network_object_mut(guest)
            .and_then(|o| o.behaviour_mut::<TankBehaviour>(0))
            .map_or(0, TankBehaviour::take_fire_requests);

        let mut bullets = std::mem::take(&mut self.bullets);
        if let Some(tank) = self.tank(host) {
            if !tank.is_dead.get() {
                patrol(tank, self.elapsed);
                if self.fire_cooldown <= 0.0 {
                    tank.fire(&mut bullets)?;
                }
            }
            tank.tick_respawn(dt, HOST_COLOR);
        }
        if self.fire_cooldown <= 0.0 {
            self.fire_cooldown = self.config.fire_interval;
        }
        if let Some(tank) = self.tank(guest) {
            if !tank.is_dead.get() {
                for _ in 0..requests {
                    tank.fire(&mut bullets)?;
                }
            }
            tank.tick_respawn(dt, GUEST_COLOR);
        }

        advance_bullets(&mut bullets, dt);
        for id in [host, guest] {
            if let Some(tank) = self.tank(id) {
                if resolve_hits(&mut bullets, id, tank) > 0 && tank.is_dead.get() {
                    log::info!("tank {} destroyed", id);
                }
            }
        }
        self.bullets = bullets;

        self.report_cooldown -= dt;
        if self.report_cooldown <= 0.0 {
            self.report_cooldown = self.config.report_interval;
            self.report(host, guest);
        }
        Ok(())
    }

    fn report(&self, host: NetworkId, guest: NetworkId) {
        for (label, id) in [("host", host), ("guest", guest)] {
            if let Some(tank) = self.tank(id) {
                log::info!(
                    "{} tank {}: pos=({:.0}, {:.0}) hp={} dead={}",
                    label,
                    id,
                    tank.x.get(),
                    tank.y.get(),
                    tank.hp.get(),
                    tank.is_dead.get()
                );
            }
        }
        let stats = self.transport.stats();
        log::debug!(
            "bullets={} clients={} sent={} ({} bytes) received={}",
            self.bullets.len(),
            self.transport.client_count(),
            stats.packets_sent,
            stats.bytes_sent,
            stats.packets_received
        );
    }
}
