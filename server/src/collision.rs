//! Turns raw per-substep contact points into damage events
//!
//! A car-versus-car crash shows up as several contact points in every
//! substep it lasts. Each player carries a frame counter that is reset when
//! it takes part in a damaging collision; while both partners are still
//! inside the cooldown window further contacts between them are ignored, so
//! a sustained crush produces one damage event per player instead of one per
//! contact.
//!
//! Pairs that collided during a frame are clustered transitively into
//! [`CollisionGroup`]s when the frame is drained.

use glam::Vec3;
use log::debug;
use shared::{ContactPoint, PlayerId};
use std::collections::HashMap;

/// Frames a player stays "recently collided" after a damaging hit
pub const COOLDOWN_FRAMES: u32 = 20;
/// At least one car must be faster than this for a contact to hurt
pub const MIN_DAMAGE_SPEED: f32 = 15.0;
/// Damage per unit of speed difference between the two cars
pub const DAMAGE_PER_SPEED: f32 = 5.0;

const READY: u32 = u32::MAX;

pub const ZONE_COUNT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DamageZone {
    FrontLeft,
    FrontRight,
    MidLeft,
    MidRight,
    RearLeft,
    RearRight,
}

impl DamageZone {
    pub const ALL: [DamageZone; ZONE_COUNT] = [
        DamageZone::FrontLeft,
        DamageZone::FrontRight,
        DamageZone::MidLeft,
        DamageZone::MidRight,
        DamageZone::RearLeft,
        DamageZone::RearRight,
    ];

    /// Classifies a chassis-local point: length split in thirds, `+X` is left
    pub fn from_local_point(local: Vec3, half_extents: Vec3) -> Self {
        let third = half_extents.z / 3.0;
        let left = local.x >= 0.0;
        match (local.z > third, local.z < -third, left) {
            (true, _, true) => DamageZone::FrontLeft,
            (true, _, false) => DamageZone::FrontRight,
            (_, true, true) => DamageZone::RearLeft,
            (_, true, false) => DamageZone::RearRight,
            (_, _, true) => DamageZone::MidLeft,
            (_, _, false) => DamageZone::MidRight,
        }
    }

    /// How much of the accumulated zone damage counts against HP
    pub fn weight(self) -> f32 {
        match self {
            DamageZone::FrontLeft | DamageZone::FrontRight => 0.1,
            DamageZone::MidLeft | DamageZone::MidRight => 0.2,
            DamageZone::RearLeft | DamageZone::RearRight => 0.1,
        }
    }

    pub fn index(self) -> usize {
        match self {
            DamageZone::FrontLeft => 0,
            DamageZone::FrontRight => 1,
            DamageZone::MidLeft => 2,
            DamageZone::MidRight => 3,
            DamageZone::RearLeft => 4,
            DamageZone::RearRight => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageEvent {
    pub victim: PlayerId,
    pub attacker: PlayerId,
    pub amount: f32,
    pub zone: DamageZone,
}

/// Players connected through collisions during one frame
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CollisionGroup {
    pub players: Vec<PlayerId>,
    pub events: Vec<DamageEvent>,
}

#[derive(Debug)]
struct PendingPair {
    a: PlayerId,
    b: PlayerId,
    amount: f32,
    local_sum_a: Vec3,
    local_sum_b: Vec3,
    half_extents_a: Vec3,
    half_extents_b: Vec3,
    points: u32,
}

impl PendingPair {
    fn involves(&self, x: PlayerId, y: PlayerId) -> bool {
        (self.a == x && self.b == y) || (self.a == y && self.b == x)
    }

    fn add_point(&mut self, contact: &ContactPoint, user_a: PlayerId) {
        if user_a == self.a {
            self.local_sum_a += contact.local_point_a;
            self.local_sum_b += contact.local_point_b;
        } else {
            self.local_sum_a += contact.local_point_b;
            self.local_sum_b += contact.local_point_a;
        }
        self.points += 1;
    }

    fn events(&self) -> [DamageEvent; 2] {
        let points = self.points.max(1) as f32;
        [
            DamageEvent {
                victim: self.a,
                attacker: self.b,
                amount: self.amount,
                zone: DamageZone::from_local_point(self.local_sum_a / points, self.half_extents_a),
            },
            DamageEvent {
                victim: self.b,
                attacker: self.a,
                amount: self.amount,
                zone: DamageZone::from_local_point(self.local_sum_b / points, self.half_extents_b),
            },
        ]
    }
}

#[derive(Debug)]
pub struct CollisionAggregator {
    counters: HashMap<PlayerId, u32>,
    pending: Vec<PendingPair>,
    cooldown_frames: u32,
    min_damage_speed: f32,
    damage_per_speed: f32,
}

impl Default for CollisionAggregator {
    fn default() -> Self {
        Self::new(COOLDOWN_FRAMES, MIN_DAMAGE_SPEED, DAMAGE_PER_SPEED)
    }
}

impl CollisionAggregator {
    pub fn new(cooldown_frames: u32, min_damage_speed: f32, damage_per_speed: f32) -> Self {
        Self {
            counters: HashMap::new(),
            pending: Vec::new(),
            cooldown_frames,
            min_damage_speed,
            damage_per_speed,
        }
    }

    /// Feeds one contact point reported during a substep
    pub fn on_contact(&mut self, contact: &ContactPoint) {
        let (Some(a), Some(b)) = (contact.user_a, contact.user_b) else {
            return;
        };
        if a == b || contact.distance >= 0.0 {
            return;
        }

        let speed_a = contact.velocity_a.length();
        let speed_b = contact.velocity_b.length();
        if speed_a.max(speed_b) <= self.min_damage_speed {
            return;
        }

        let counter_a = *self.counters.entry(a).or_insert(READY);
        let counter_b = *self.counters.entry(b).or_insert(READY);

        if let Some(pair) = self.pending.iter_mut().find(|p| p.involves(a, b)) {
            pair.add_point(contact, a);
            return;
        }

        if counter_a < self.cooldown_frames && counter_b < self.cooldown_frames {
            return;
        }

        self.counters.insert(a, 0);
        self.counters.insert(b, 0);
        let amount = (speed_a - speed_b).abs() * self.damage_per_speed;
        debug!(
            "Collision between {} and {} at {:.1}/{:.1}, damage {:.1}",
            a, b, speed_a, speed_b, amount
        );

        let mut pair = PendingPair {
            a,
            b,
            amount,
            local_sum_a: Vec3::ZERO,
            local_sum_b: Vec3::ZERO,
            half_extents_a: contact.half_extents_a,
            half_extents_b: contact.half_extents_b,
            points: 0,
        };
        pair.add_point(contact, a);
        self.pending.push(pair);
    }

    /// Ages every cooldown counter by one frame
    pub fn end_frame(&mut self) {
        for counter in self.counters.values_mut() {
            *counter = counter.saturating_add(1);
        }
    }

    /// Clusters this frame's collisions and clears the scratch state
    pub fn drain_groups(&mut self) -> Vec<CollisionGroup> {
        let mut groups: Vec<CollisionGroup> = Vec::new();

        for pair in self.pending.drain(..) {
            let touching: Vec<usize> = groups
                .iter()
                .enumerate()
                .filter(|(_, g)| g.players.contains(&pair.a) || g.players.contains(&pair.b))
                .map(|(i, _)| i)
                .collect();

            let mut merged = CollisionGroup::default();
            for index in touching.into_iter().rev() {
                let group = groups.swap_remove(index);
                merged.players.extend(group.players);
                merged.events.extend(group.events);
            }
            for player in [pair.a, pair.b] {
                if !merged.players.contains(&player) {
                    merged.players.push(player);
                }
            }
            merged.events.extend(pair.events());
            groups.push(merged);
        }

        for group in &mut groups {
            group.players.sort_unstable();
        }
        groups.sort_by_key(|g| g.players.first().copied());
        groups
    }

    /// Drops the cooldown state of a player that left
    pub fn forget(&mut self, player: PlayerId) {
        self.counters.remove(&player);
    }

    pub fn is_cooling_down(&self, player: PlayerId) -> bool {
        self.counters
            .get(&player)
            .is_some_and(|c| *c < self.cooldown_frames)
    }
}
