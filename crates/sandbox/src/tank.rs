use std::sync::OnceLock;

use replica::{
    BehaviourLink, Color, NetError, NetworkBehaviour, NetworkId, NetworkObject, NetworkVariable,
    PrefabId, Role, RpcArgs, RpcError, RpcRegistry, RpcValue, SharedVariable,
};

/// Must match on server and client.
pub const TANK_PREFAB_ID: PrefabId = 1;
pub const MAX_HP: i32 = 4;
pub const RESPAWN_SECONDS: f32 = 3.0;
pub const HIT_RADIUS: f32 = 15.0;
const MUZZLE_OFFSET: f32 = 20.0;
const BULLET_SPEED: f32 = 400.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bullet {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub owner: NetworkId,
    pub color: Color,
}

pub struct TankBehaviour {
    link: BehaviourLink,
    pub x: NetworkVariable<f32>,
    pub y: NetworkVariable<f32>,
    /// Degrees, counter-clockwise from +x.
    pub rot: NetworkVariable<f32>,
    pub color: NetworkVariable<Color>,
    pub hp: NetworkVariable<i32>,
    pub is_dead: NetworkVariable<bool>,
    pub respawn_timer: NetworkVariable<f32>,
    /// Client side: bullets announced by the server, simulated locally.
    pub local_bullets: Vec<Bullet>,
    /// Server side: fire requests received since the last step.
    pub fire_requests: u32,
}

impl Default for TankBehaviour {
    fn default() -> Self {
        Self {
            link: BehaviourLink::new(),
            x: NetworkVariable::new(0.0),
            y: NetworkVariable::new(0.0),
            rot: NetworkVariable::new(90.0),
            color: NetworkVariable::new(Color::RED),
            hp: NetworkVariable::new(MAX_HP),
            is_dead: NetworkVariable::new(false),
            respawn_timer: NetworkVariable::new(0.0),
            local_bullets: Vec::new(),
            fire_requests: 0,
        }
    }
}

impl TankBehaviour {
    fn rpcs() -> &'static RpcRegistry<TankBehaviour> {
        static RPCS: OnceLock<RpcRegistry<TankBehaviour>> = OnceLock::new();
        RPCS.get_or_init(|| {
            RpcRegistry::new()
                .server_rpc("request_fire", TankBehaviour::rpc_request_fire)
                .client_rpc("spawn_bullet", TankBehaviour::rpc_spawn_bullet)
        })
    }

    fn rpc_request_fire(&mut self, _args: &mut RpcArgs) -> Result<(), RpcError> {
        self.fire_requests += 1;
        Ok(())
    }

    fn rpc_spawn_bullet(&mut self, args: &mut RpcArgs) -> Result<(), RpcError> {
        let bullet = Bullet {
            x: args.float()?,
            y: args.float()?,
            vx: args.float()?,
            vy: args.float()?,
            owner: args.int()?,
            color: self.color.get(),
        };
        self.local_bullets.push(bullet);
        Ok(())
    }

    pub fn take_fire_requests(&mut self) -> u32 {
        std::mem::take(&mut self.fire_requests)
    }

    pub fn muzzle_bullet(&self, owner: NetworkId) -> Bullet {
        let rad = self.rot.get().to_radians();
        let (sin, cos) = rad.sin_cos();
        Bullet {
            x: self.x.get() + cos * MUZZLE_OFFSET,
            y: self.y.get() + sin * MUZZLE_OFFSET,
            vx: cos * BULLET_SPEED,
            vy: sin * BULLET_SPEED,
            owner,
            color: self.color.get(),
        }
    }

    /// Server side: adds a bullet to `bullets` and tells every client about it.
    pub fn fire(&self, bullets: &mut Vec<Bullet>) -> Result<(), NetError> {
        let owner = self.network_id().ok_or(NetError::NotAttached)?;
        let bullet = self.muzzle_bullet(owner);
        self.send_client_rpc(
            "spawn_bullet",
            &[
                RpcValue::Float(bullet.x),
                RpcValue::Float(bullet.y),
                RpcValue::Float(bullet.vx),
                RpcValue::Float(bullet.vy),
                RpcValue::Int(owner),
            ],
        )?;
        bullets.push(bullet);
        Ok(())
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        let dx = x - self.x.get();
        let dy = y - self.y.get();
        dx * dx + dy * dy <= HIT_RADIUS * HIT_RADIUS
    }

    /// Server side: one point of damage. Returns true if this killed the tank.
    pub fn hit(&self) -> bool {
        if self.is_dead.get() {
            return false;
        }
        let hp = self.hp.get() - 1;
        self.hp.set(hp);
        if hp > 0 {
            return false;
        }
        self.is_dead.set(true);
        self.respawn_timer.set(RESPAWN_SECONDS);
        self.color.set(Color::GRAY);
        true
    }

    /// Server side: counts down while dead. Returns true once respawned.
    pub fn tick_respawn(&self, dt: f32, color: Color) -> bool {
        if !self.is_dead.get() {
            return false;
        }
        let remaining = self.respawn_timer.get() - dt;
        if remaining > 0.0 {
            self.respawn_timer.set(remaining);
            return false;
        }
        self.respawn_timer.set(0.0);
        self.hp.set(MAX_HP);
        self.is_dead.set(false);
        self.color.set(color);
        true
    }
}

impl NetworkBehaviour for TankBehaviour {
    fn link(&self) -> &BehaviourLink {
        &self.link
    }

    fn link_mut(&mut self) -> &mut BehaviourLink {
        &mut self.link
    }

    fn network_variables(&self) -> Vec<SharedVariable> {
        vec![
            self.x.shared(),
            self.y.shared(),
            self.rot.shared(),
            self.color.shared(),
            self.hp.shared(),
            self.is_dead.shared(),
            self.respawn_timer.shared(),
        ]
    }

    fn handle_rpc(
        &mut self,
        method: &str,
        args: &mut RpcArgs,
        received_on: Role,
    ) -> Result<(), RpcError> {
        Self::rpcs().dispatch(self, method, args, received_on)
    }
}

pub fn tank_prefab() -> NetworkObject {
    NetworkObject::new().with_behaviour(TankBehaviour::default())
}
