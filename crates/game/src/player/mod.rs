use bitflags::bitflags;
use glam::{Quat, Vec3};

pub const SPRINT_COOLDOWN: f32 = 4.0;
pub const FIRE_COOLDOWN: f32 = 2.0;

pub const MOVE_SPEED: f32 = 10.0;
/// Instant forward displacement granted when a sprint edge fires.
pub const SPRINT_DASH: f32 = 6.0;

pub const PROJECTILE_SPEED: f32 = 40.0;
pub const PROJECTILE_LIFETIME: f32 = 3.0;
pub const PROJECTILE_HIT_RADIUS: f32 = 1.5;
/// Muzzle offset so a fresh projectile does not overlap its shooter.
pub const PROJECTILE_SPAWN_DISTANCE: f32 = 2.0;

pub const SCORE_PER_HIT: i32 = 5;

/// Fixed per-slot round spawn points, one arena corner each.
pub const SPAWN_POINTS: [Vec3; 4] = [
    Vec3::new(-30.0, 1.0, -30.0),
    Vec3::new(30.0, 1.0, -30.0),
    Vec3::new(-30.0, 1.0, 30.0),
    Vec3::new(30.0, 1.0, 30.0),
];

bitflags! {
    /// The six button flags carried by every input packet. UP..LEFT are
    /// level-triggered movement holds; SPRINT and FIRE are edges.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Buttons: u8 {
        const UP = 1 << 0;
        const DOWN = 1 << 1;
        const RIGHT = 1 << 2;
        const LEFT = 1 << 3;
        const SPRINT = 1 << 4;
        const FIRE = 1 << 5;
    }
}

/// Per-player simulation fields replicated inside player snapshots.
#[derive(Debug, Clone)]
pub struct Player {
    pub slot: u8,
    pub buttons: Buttons,
    pub score: i32,
    sprint_timer: f32,
    fire_timer: f32,
}

impl Player {
    pub fn new(slot: u8) -> Self {
        // Abilities start on cooldown so a round cannot open with a volley.
        Self {
            slot,
            buttons: Buttons::empty(),
            score: 0,
            sprint_timer: SPRINT_COOLDOWN,
            fire_timer: FIRE_COOLDOWN,
        }
    }

    pub fn tick(&mut self, dt: f32) {
        self.sprint_timer = (self.sprint_timer - dt).max(0.0);
        self.fire_timer = (self.fire_timer - dt).max(0.0);
    }

    pub fn sprint_cooldown(&self) -> f32 {
        self.sprint_timer
    }

    pub fn fire_cooldown(&self) -> f32 {
        self.fire_timer
    }

    pub fn set_cooldowns(&mut self, sprint: f32, fire: f32) {
        self.sprint_timer = sprint.max(0.0);
        self.fire_timer = fire.max(0.0);
    }

    /// Consumes the sprint ability if its cooldown has fully elapsed.
    pub fn try_sprint(&mut self) -> bool {
        if self.sprint_timer > 0.0 {
            return false;
        }
        self.sprint_timer = SPRINT_COOLDOWN;
        true
    }

    /// Consumes the fire ability if its cooldown has fully elapsed.
    pub fn try_fire(&mut self) -> bool {
        if self.fire_timer > 0.0 {
            return false;
        }
        self.fire_timer = FIRE_COOLDOWN;
        true
    }

    pub fn add_score(&mut self, amount: i32) {
        self.score += amount;
    }
}

/// Normalized world-space move direction from the held movement buttons.
pub fn move_direction(buttons: Buttons) -> Vec3 {
    let mut dir = Vec3::ZERO;
    if buttons.contains(Buttons::UP) {
        dir += Vec3::new(0.0, 0.0, -1.0);
    }
    if buttons.contains(Buttons::DOWN) {
        dir += Vec3::new(0.0, 0.0, 1.0);
    }
    if buttons.contains(Buttons::RIGHT) {
        dir += Vec3::new(1.0, 0.0, 0.0);
    }
    if buttons.contains(Buttons::LEFT) {
        dir += Vec3::new(-1.0, 0.0, 0.0);
    }
    dir.normalize_or_zero()
}

/// The movement function both the server (authoritatively) and a client
/// (cosmetically) run: constant-speed kinematic motion along the held
/// direction. The server's result always wins via the next snapshot.
pub fn step_movement(position: &mut Vec3, buttons: Buttons, dt: f32) {
    *position += move_direction(buttons) * MOVE_SPEED * dt;
}

/// Yaw-only orientation facing from `position` toward the pointer's world
/// position, ignoring height difference.
pub fn face_pointer(position: Vec3, pointer: Vec3) -> Quat {
    let mut target = pointer - position;
    target.y = 0.0;
    if target.length_squared() < 1e-6 {
        return Quat::IDENTITY;
    }
    let target = target.normalize();
    // Model forward is -Z.
    let yaw = (-target.x).atan2(-target.z);
    Quat::from_rotation_y(yaw)
}

/// Facing direction of an oriented entity (model forward is -Z).
pub fn forward(orientation: Quat) -> Vec3 {
    (orientation * Vec3::new(0.0, 0.0, -1.0)).normalize_or_zero()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fire_blocked_while_cooling_down() {
        let mut player = Player::new(1);
        player.set_cooldowns(0.0, 0.3);

        // Cooldown has 0.3s remaining: the edge is swallowed and the
        // timer is left untouched.
        assert!(!player.try_fire());
        assert!((player.fire_cooldown() - 0.3).abs() < f32::EPSILON);

        player.tick(0.3);
        assert!(player.try_fire());
        assert!((player.fire_cooldown() - FIRE_COOLDOWN).abs() < f32::EPSILON);
    }

    #[test]
    fn sprint_consumes_and_rearms() {
        let mut player = Player::new(0);
        assert!(!player.try_sprint());

        player.tick(SPRINT_COOLDOWN);
        assert!(player.try_sprint());
        assert!(!player.try_sprint());
    }

    #[test]
    fn diagonal_movement_is_normalized() {
        let dir = move_direction(Buttons::UP | Buttons::RIGHT);
        assert!((dir.length() - 1.0).abs() < 1e-5);
        assert!(dir.x > 0.0 && dir.z < 0.0);

        assert_eq!(move_direction(Buttons::empty()), Vec3::ZERO);
        assert_eq!(move_direction(Buttons::UP | Buttons::DOWN), Vec3::ZERO);
    }

    #[test]
    fn face_pointer_turns_toward_target() {
        let orientation = face_pointer(Vec3::ZERO, Vec3::new(10.0, 5.0, 0.0));
        let facing = forward(orientation);

        assert!((facing.x - 1.0).abs() < 1e-4);
        assert!(facing.y.abs() < 1e-4);
        assert!(facing.z.abs() < 1e-4);
    }

    #[test]
    fn movement_covers_expected_distance() {
        let mut position = Vec3::ZERO;
        for _ in 0..60 {
            step_movement(&mut position, Buttons::RIGHT, 1.0 / 60.0);
        }
        assert!((position.x - MOVE_SPEED).abs() < 1e-3);
    }
}
