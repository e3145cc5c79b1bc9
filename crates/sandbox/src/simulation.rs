use std::time::{Duration, Instant};

use replica::NetworkId;

use crate::tank::{Bullet, TankBehaviour};

pub const ARENA_WIDTH: f32 = 800.0;
pub const ARENA_HEIGHT: f32 = 600.0;

/// Longest frame the accumulator will absorb after a stall.
const MAX_FRAME: Duration = Duration::from_millis(250);

/// Accumulates wall-clock time and hands it out in fixed steps.
pub struct FixedTimestep {
    step: Duration,
    last: Instant,
    accumulator: Duration,
}

impl FixedTimestep {
    pub fn new(tick_rate: u32) -> Self {
        Self {
            step: Duration::from_secs_f64(1.0 / f64::from(tick_rate.max(1))),
            last: Instant::now(),
            accumulator: Duration::ZERO,
        }
    }

    pub fn dt(&self) -> f32 {
        self.step.as_secs_f32()
    }

    /// Number of whole steps elapsed since the previous call.
    pub fn due_steps(&mut self) -> u32 {
        let now = Instant::now();
        self.accumulator += (now - self.last).min(MAX_FRAME);
        self.last = now;

        let mut steps = 0;
        while self.accumulator >= self.step {
            self.accumulator -= self.step;
            steps += 1;
        }
        steps
    }
}

pub fn in_arena(x: f32, y: f32) -> bool {
    (0.0..=ARENA_WIDTH).contains(&x) && (0.0..=ARENA_HEIGHT).contains(&y)
}

/// Moves bullets and drops the ones that left the arena.
pub fn advance_bullets(bullets: &mut Vec<Bullet>, dt: f32) {
    for bullet in bullets.iter_mut() {
        bullet.x += bullet.vx * dt;
        bullet.y += bullet.vy * dt;
    }
    bullets.retain(|b| in_arena(b.x, b.y));
}

/// Removes bullets that hit `tank` (never its own) and applies the damage.
/// Returns the number of hits.
pub fn resolve_hits(bullets: &mut Vec<Bullet>, tank_id: NetworkId, tank: &TankBehaviour) -> usize {
    if tank.is_dead.get() {
        return 0;
    }
    let before = bullets.len();
    bullets.retain(|b| b.owner == tank_id || !tank.contains(b.x, b.y));
    let hits = before - bullets.len();
    for _ in 0..hits {
        tank.hit();
    }
    hits
}

/// Server-driven patrol: a slow circle around the arena center.
pub fn patrol(tank: &TankBehaviour, elapsed: f32) {
    let angle = elapsed * 0.5;
    let (sin, cos) = angle.sin_cos();
    tank.x.set(ARENA_WIDTH / 2.0 + cos * 200.0);
    tank.y.set(ARENA_HEIGHT / 2.0 + sin * 150.0);
    tank.rot.set((angle.to_degrees() + 90.0).rem_euclid(360.0));
}
