//! Fixed pool of pickups placed around the arena

use crate::game::GameError;
use glam::Vec3;
use log::debug;
use shared::PlayerId;

/// Distance from the chassis centre within which a pickup is collected
pub const PICKUP_RADIUS: f32 = 2.5;
pub const POWERUP_RESPAWN_DELAY: f32 = 15.0;
/// Share of accumulated damage a repair kit removes
pub const REPAIR_FRACTION: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerupKind {
    Repair,
}

impl PowerupKind {
    /// Value carried in the `extra_data` field of `PowerupCollect`
    pub fn code(self) -> u32 {
        match self {
            PowerupKind::Repair => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SlotState {
    Available,
    Respawning { remaining: f32 },
}

#[derive(Debug, Clone)]
struct PowerupSlot {
    position: Vec3,
    kind: PowerupKind,
    state: SlotState,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pickup {
    pub index: usize,
    pub player_id: PlayerId,
    pub kind: PowerupKind,
}

#[derive(Debug)]
pub struct PowerupPool {
    slots: Vec<Option<PowerupSlot>>,
    pickup_radius: f32,
    respawn_delay: f32,
}

impl PowerupPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            pickup_radius: PICKUP_RADIUS,
            respawn_delay: POWERUP_RESPAWN_DELAY,
        }
    }

    /// Places a pickup in the first free slot and returns its index
    pub fn spawn(&mut self, position: Vec3, kind: PowerupKind) -> Result<usize, GameError> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(GameError::NoSlotAvailable)?;
        self.slots[index] = Some(PowerupSlot {
            position,
            kind,
            state: SlotState::Available,
        });
        Ok(index)
    }

    pub fn is_available(&self, index: usize) -> bool {
        matches!(
            self.slots.get(index),
            Some(Some(PowerupSlot {
                state: SlotState::Available,
                ..
            }))
        )
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hands every available pickup to the first vehicle in range. Vehicles
    /// are checked in the order given.
    pub fn collect(&mut self, vehicles: &[(PlayerId, Vec3)]) -> Vec<Pickup> {
        let radius_squared = self.pickup_radius * self.pickup_radius;
        let mut pickups = Vec::new();

        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(slot) = slot else {
                continue;
            };
            if slot.state != SlotState::Available {
                continue;
            }
            let collector = vehicles
                .iter()
                .find(|(_, position)| position.distance_squared(slot.position) <= radius_squared);
            if let Some((player_id, _)) = collector {
                debug!("Player {} collected powerup {}", player_id, index);
                slot.state = SlotState::Respawning {
                    remaining: self.respawn_delay,
                };
                pickups.push(Pickup {
                    index,
                    player_id: *player_id,
                    kind: slot.kind,
                });
            }
        }

        pickups
    }

    pub fn tick(&mut self, dt: f32) {
        for slot in self.slots.iter_mut().flatten() {
            if let SlotState::Respawning { remaining } = slot.state {
                let remaining = remaining - dt;
                slot.state = if remaining <= 0.0 {
                    SlotState::Available
                } else {
                    SlotState::Respawning { remaining }
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_reports_exhaustion() {
        let mut pool = PowerupPool::new(2);

        assert_eq!(pool.spawn(Vec3::ZERO, PowerupKind::Repair), Ok(0));
        assert_eq!(pool.spawn(Vec3::X, PowerupKind::Repair), Ok(1));
        assert_eq!(
            pool.spawn(Vec3::Y, PowerupKind::Repair),
            Err(GameError::NoSlotAvailable)
        );
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_pickup_within_radius() {
        let mut pool = PowerupPool::new(4);
        let index = pool
            .spawn(Vec3::new(10.0, 0.5, 0.0), PowerupKind::Repair)
            .unwrap();

        let far = [(1, Vec3::new(30.0, 1.0, 0.0))];
        assert!(pool.collect(&far).is_empty());

        let near = [(1, Vec3::new(30.0, 1.0, 0.0)), (2, Vec3::new(11.0, 1.0, 0.0))];
        let pickups = pool.collect(&near);
        assert_eq!(
            pickups,
            vec![Pickup {
                index,
                player_id: 2,
                kind: PowerupKind::Repair
            }]
        );
        assert!(!pool.is_available(index));
        assert!(pool.collect(&near).is_empty());
    }

    #[test]
    fn test_collected_slot_respawns_after_delay() {
        let mut pool = PowerupPool::new(1);
        pool.spawn(Vec3::ZERO, PowerupKind::Repair).unwrap();
        pool.collect(&[(3, Vec3::ZERO)]);

        pool.tick(POWERUP_RESPAWN_DELAY - 1.0);
        assert!(!pool.is_available(0));
        pool.tick(1.0);
        assert!(pool.is_available(0));
    }
}
