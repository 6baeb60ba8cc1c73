use std::sync::Arc;

use glam::Vec3;
use scenelink::{
    ClassRegistry, ObjectId, Synchronizable, Synchronizer, SynchronizerExt,
};

/// Scene root replicated by the harness: a tick counter and the player
/// roster.
pub struct Arena {
    pub id: Option<ObjectId>,
    pub tick: u32,
    pub players: Vec<Box<dyn Synchronizable>>,
}

impl Arena {
    pub fn new() -> Self {
        Self {
            id: None,
            tick: 0,
            players: Vec::new(),
        }
    }

    pub fn boxed() -> Box<dyn Synchronizable> {
        Box::new(Self::new())
    }

    pub fn player_mut(&mut self, index: usize) -> &mut Player {
        self.players[index]
            .as_any_mut()
            .downcast_mut::<Player>()
            .expect("arena roster holds players")
    }
}

impl Synchronizable for Arena {
    fn class_name(&self) -> &'static str {
        "Arena"
    }

    fn object_id(&self) -> Option<ObjectId> {
        self.id
    }

    fn set_object_id(&mut self, id: Option<ObjectId>) {
        self.id = id;
    }

    fn synchronize(&mut self, sync: &mut dyn Synchronizer) {
        self.tick = sync.sync_u32(self.tick);
        self.players = sync.sync_object_array(std::mem::take(&mut self.players));
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

pub struct Player {
    pub id: Option<ObjectId>,
    pub name: String,
    pub position: Vec3,
    pub aim: Vec3,
    pub health: u8,
    pub weapon: Option<Box<dyn Synchronizable>>,
}

impl Player {
    pub fn new(name: &str, position: Vec3) -> Self {
        Self {
            id: None,
            name: name.to_owned(),
            position,
            aim: Vec3::Z,
            health: 100,
            weapon: Some(Box::new(Weapon::new(1, 50))),
        }
    }

    pub fn boxed_empty() -> Box<dyn Synchronizable> {
        Box::new(Self {
            id: None,
            name: String::new(),
            position: Vec3::ZERO,
            aim: Vec3::Z,
            health: 0,
            weapon: None,
        })
    }
}

impl Synchronizable for Player {
    fn class_name(&self) -> &'static str {
        "Player"
    }

    fn object_id(&self) -> Option<ObjectId> {
        self.id
    }

    fn set_object_id(&mut self, id: Option<ObjectId>) {
        self.id = id;
    }

    fn synchronize(&mut self, sync: &mut dyn Synchronizer) {
        self.name = sync.sync_str8(std::mem::take(&mut self.name));
        self.position = sync.sync_vec3(self.position);
        self.aim = sync.sync_normal(self.aim);
        self.health = sync.sync_u8(self.health);
        self.weapon = sync.sync_object(self.weapon.take());
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

pub struct Weapon {
    pub id: Option<ObjectId>,
    pub kind: u8,
    pub ammo: u16,
}

impl Weapon {
    pub fn new(kind: u8, ammo: u16) -> Self {
        Self {
            id: None,
            kind,
            ammo,
        }
    }

    pub fn boxed_empty() -> Box<dyn Synchronizable> {
        Box::new(Self::new(0, 0))
    }
}

impl Synchronizable for Weapon {
    fn class_name(&self) -> &'static str {
        "Weapon"
    }

    fn object_id(&self) -> Option<ObjectId> {
        self.id
    }

    fn set_object_id(&mut self, id: Option<ObjectId>) {
        self.id = id;
    }

    fn synchronize(&mut self, sync: &mut dyn Synchronizer) {
        self.kind = sync.sync_u8(self.kind);
        self.ammo = sync.sync_u16(self.ammo);
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Registration order is the wire contract: the server and client contexts
/// must both build their registry through this function.
pub fn build_registry() -> Arc<ClassRegistry> {
    let mut registry = ClassRegistry::new();
    registry.register(Arena::boxed);
    registry.register_with_destroy(Player::boxed_empty, |player| {
        log::debug!("player object {:?} left the scene", player.object_id());
    });
    registry.register(Weapon::boxed_empty);
    Arc::new(registry)
}

/// Deterministic per-tick mutation: players orbit the arena center, burn
/// ammo, and one of them drops in and out of the match to exercise object
/// add/remove.
pub fn advance(arena: &mut Arena, tick: u32) {
    arena.tick = tick;

    match tick {
        0 => {
            arena
                .players
                .push(Box::new(Player::new("alice", Vec3::new(5.0, 0.0, 0.0))));
            arena
                .players
                .push(Box::new(Player::new("bob", Vec3::new(-5.0, 0.0, 0.0))));
        }
        t if t % 97 == 50 => {
            arena
                .players
                .push(Box::new(Player::new("carol", Vec3::new(0.0, 0.0, 7.0))));
        }
        t if t % 97 == 90 && arena.players.len() > 2 => {
            arena.players.pop();
        }
        _ => {}
    }

    for index in 0..arena.players.len() {
        let phase = index as f32 * 2.1;
        let angle = tick as f32 * 0.05 + phase;
        let player = arena.player_mut(index);
        player.position = Vec3::new(angle.cos() * 5.0, 0.0, angle.sin() * 5.0);
        player.aim = Vec3::new(-angle.sin(), 0.0, angle.cos()).normalize();
        if tick % 4 == 0 {
            if let Some(weapon) = player.weapon.as_mut() {
                let weapon = weapon
                    .as_any_mut()
                    .downcast_mut::<Weapon>()
                    .expect("players carry weapons");
                weapon.ammo = weapon.ammo.saturating_sub(1);
            }
        }
    }
}
