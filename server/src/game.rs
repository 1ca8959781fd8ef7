//! Authoritative simulation tick
//!
//! One call to [`GameState::tick`] runs, strictly in this order:
//! 1. drain each player's pending input into its current controls
//! 2. apply controls to the vehicles
//! 3. advance the [`SimulationClock`]; the collision aggregator sees every
//!    substep contact and ages its counters once at frame end
//! 4. remove vehicles despawned since the last tick
//! 5. resolve the frame's damage into the player sessions
//! 6. advance respawn timers and powerups
//!
//! Snapshot broadcasting happens after `tick` returns.

use crate::collision::{CollisionAggregator, CollisionGroup};
use crate::config::ServerConfig;
use crate::powerup::{Pickup, PowerupKind, PowerupPool, REPAIR_FRACTION};
use crate::session::{
    balance_team, Death, PlayerSession, SessionError, SessionState, TEAM_COUNT,
};
use glam::{Quat, Vec3};
use log::{debug, info, warn};
use shared::{
    arena_world, CarType, ContactPoint, InputState, PhysicsWorld, PlayerId, Rpc,
    SimulationClock, StateSnapshot, SubstepHooks, VehicleModel, VehicleTuning,
};
use std::collections::BTreeMap;
use std::f32::consts::PI;
use thiserror::Error;

const POWERUP_SLOTS: usize = 8;
const SPAWN_CLEARANCE: f32 = 6.0;
const SPAWN_HEIGHT: f32 = 2.0;

#[derive(Debug, Error, PartialEq)]
pub enum GameError {
    #[error("no free slot available")]
    NoSlotAvailable,
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug)]
pub struct Player {
    pub session: PlayerSession,
    pub vehicle: Option<VehicleModel>,
    /// Controls currently held, applied every tick
    pub input: InputState,
    pending_input: Option<InputState>,
}

impl Player {
    fn new(id: PlayerId, respawn_delay: f32) -> Self {
        Self {
            session: PlayerSession::new(id, respawn_delay),
            vehicle: None,
            input: InputState::default(),
            pending_input: None,
        }
    }

    pub fn has_pending_input(&self) -> bool {
        self.pending_input.is_some()
    }
}

/// Everything that happened during one tick, for the network layer
#[derive(Debug, Default)]
pub struct TickEvents {
    pub substeps: u32,
    pub groups: Vec<CollisionGroup>,
    pub deaths: Vec<Death>,
    pub pickups: Vec<Pickup>,
    pub respawned: Vec<PlayerId>,
}

struct ServerHooks<'a> {
    players: &'a mut BTreeMap<PlayerId, Player>,
    aggregator: &'a mut CollisionAggregator,
}

impl SubstepHooks for ServerHooks<'_> {
    fn pre_substep(&mut self, world: &mut PhysicsWorld, dt: f32) {
        for player in self.players.values_mut() {
            if let Some(vehicle) = player.vehicle.as_mut() {
                vehicle.step(world, dt);
            }
        }
    }

    fn on_contact(&mut self, contact: &ContactPoint) {
        self.aggregator.on_contact(contact);
    }

    fn on_frame_end(&mut self) {
        self.aggregator.end_frame();
    }
}

pub struct GameState {
    pub tick: u32,
    world: PhysicsWorld,
    clock: SimulationClock,
    players: BTreeMap<PlayerId, Player>,
    aggregator: CollisionAggregator,
    powerups: PowerupPool,
    pending_removals: Vec<VehicleModel>,
    max_vehicles: usize,
    respawn_delay: f32,
}

impl GameState {
    pub fn new(config: &ServerConfig) -> Self {
        let mut powerups = PowerupPool::new(POWERUP_SLOTS);
        let layout = [
            Vec3::new(0.0, 0.5, 0.0),
            Vec3::new(-30.0, 0.5, 0.0),
            Vec3::new(30.0, 0.5, 0.0),
            Vec3::new(0.0, 0.5, -60.0),
            Vec3::new(0.0, 0.5, 60.0),
        ];
        for position in layout {
            if let Err(e) = powerups.spawn(position, PowerupKind::Repair) {
                warn!("Could not place powerup at {}: {}", position, e);
            }
        }

        Self {
            tick: 0,
            world: arena_world(),
            clock: SimulationClock::new(config.fixed_timestep(), config.max_substeps),
            players: BTreeMap::new(),
            aggregator: CollisionAggregator::default(),
            powerups,
            pending_removals: Vec::new(),
            max_vehicles: config.max_vehicles,
            respawn_delay: config.respawn_delay,
        }
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.world
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.keys().copied().collect()
    }

    pub fn vehicle_count(&self) -> usize {
        self.players.values().filter(|p| p.vehicle.is_some()).count()
    }

    fn player_mut(&mut self, id: PlayerId) -> Result<&mut Player, GameError> {
        self.players.get_mut(&id).ok_or(GameError::UnknownPlayer(id))
    }

    pub fn add_player(&mut self, id: PlayerId) {
        info!("Added player {}", id);
        self.players.insert(id, Player::new(id, self.respawn_delay));
    }

    /// Drops the player and its pending input. The vehicle stops being
    /// attributed to anyone right away but leaves the world only after the
    /// next physics step.
    pub fn remove_player(&mut self, id: PlayerId) {
        let Some(mut player) = self.players.remove(&id) else {
            return;
        };
        if let Some(vehicle) = player.vehicle.take() {
            if let Some(body) = self.world.body_mut(vehicle.chassis()) {
                body.user_index = None;
            }
            self.pending_removals.push(vehicle);
        }
        self.aggregator.forget(id);
        info!("Removed player {}", id);
    }

    pub fn join(&mut self, id: PlayerId, nickname: &str) -> Result<(), GameError> {
        self.player_mut(id)?.session.complete_join(nickname)?;
        info!("Player {} joined as '{}'", id, nickname);
        Ok(())
    }

    /// Assigns a team, redirecting the request when it would unbalance the
    /// teams. Returns the team actually joined.
    pub fn select_team(&mut self, id: PlayerId, requested: u8) -> Result<u8, GameError> {
        let mut counts = [0usize; TEAM_COUNT as usize];
        for (other, player) in &self.players {
            if *other == id {
                continue;
            }
            if let Some(team) = player.session.team() {
                counts[team as usize] += 1;
            }
        }

        let team = balance_team(requested, &counts);
        self.player_mut(id)?.session.select_team(team)?;
        if team != requested {
            debug!("Player {} asked for team {}, placed on {}", id, requested, team);
        }
        Ok(team)
    }

    /// Creates the player's vehicle, replacing any wreck it still owns
    pub fn spawn(&mut self, id: PlayerId, car_type: CarType) -> Result<(), GameError> {
        let others = self
            .players
            .iter()
            .filter(|(other, p)| **other != id && p.vehicle.is_some())
            .count();
        if others >= self.max_vehicles {
            return Err(GameError::NoSlotAvailable);
        }

        let team = self.player_mut(id)?.session.team().unwrap_or(0);
        let (position, rotation) = self.spawn_point(team);

        let player = self.player_mut(id)?;
        player.session.spawn(car_type)?;
        let old = player.vehicle.take();
        player.input = InputState::default();
        player.pending_input = None;

        if let Some(old) = old {
            old.despawn(&mut self.world);
        }
        let vehicle = VehicleModel::spawn(
            &mut self.world,
            VehicleTuning::for_car(car_type),
            position,
            rotation,
            id,
        );
        if let Some(player) = self.players.get_mut(&id) {
            player.vehicle = Some(vehicle);
        }
        info!("Player {} spawned a {:?} at {}", id, car_type, position);
        Ok(())
    }

    fn spawn_point(&self, team: u8) -> (Vec3, Quat) {
        let (z, rotation) = if team == 0 {
            (-40.0, Quat::IDENTITY)
        } else {
            (40.0, Quat::from_rotation_y(PI))
        };
        let occupied: Vec<Vec3> = self
            .players
            .values()
            .filter_map(|p| p.vehicle.as_ref())
            .filter_map(|v| self.world.body(v.chassis()))
            .map(|b| b.position)
            .collect();

        let candidates = (0..8).map(|slot| Vec3::new(-35.0 + slot as f32 * 10.0, SPAWN_HEIGHT, z));
        let mut first = None;
        for candidate in candidates {
            first.get_or_insert(candidate);
            let clear = occupied
                .iter()
                .all(|p| p.distance(candidate) > SPAWN_CLEARANCE);
            if clear {
                return (candidate, rotation);
            }
        }
        let fallback = first.unwrap_or(Vec3::new(0.0, SPAWN_HEIGHT, z));
        (fallback + Vec3::Y * 3.0, rotation)
    }

    /// Operator respawn: skips the timer of a dead player or brings a
    /// spectator back. A player who already drove gets the same car again;
    /// the returned car type is None when the player still has to pick one.
    pub fn force_respawn(&mut self, id: PlayerId) -> Result<Option<CarType>, GameError> {
        let session = &mut self.player_mut(id)?.session;
        session.force_respawn()?;
        let Some(car_type) = session.car_type() else {
            return Ok(None);
        };
        self.spawn(id, car_type)?;
        Ok(Some(car_type))
    }

    /// Moves a dead or undecided player to spectating and clears the wreck
    pub fn spectate(&mut self, id: PlayerId) -> Result<(), GameError> {
        let player = self.player_mut(id)?;
        player.session.spectate()?;
        player.input = InputState::default();
        player.pending_input = None;
        let wreck = player.vehicle.take();

        if let Some(wreck) = wreck {
            wreck.despawn(&mut self.world);
        }
        info!("Player {} is spectating", id);
        Ok(())
    }

    /// Stores the newest input for the player; an unapplied older one is
    /// discarded
    pub fn set_pending_input(&mut self, id: PlayerId, input: InputState) -> bool {
        match self.players.get_mut(&id) {
            Some(player) => {
                player.pending_input = Some(input);
                true
            }
            None => false,
        }
    }

    pub fn tick(&mut self, elapsed: f32) -> TickEvents {
        self.tick = self.tick.wrapping_add(1);
        let mut events = TickEvents::default();

        for player in self.players.values_mut() {
            if let Some(input) = player.pending_input.take() {
                player.input = input;
            }
        }

        for player in self.players.values_mut() {
            let input = if player.session.is_alive() {
                player.input
            } else {
                InputState::default()
            };
            if let Some(vehicle) = player.vehicle.as_mut() {
                vehicle.apply_steer_input(input.left, input.right, elapsed);
                vehicle.apply_accel_input(input.forward, input.back, input.handbrake, elapsed);
            }
        }

        let mut hooks = ServerHooks {
            players: &mut self.players,
            aggregator: &mut self.aggregator,
        };
        events.substeps = self
            .clock
            .step_simulation(&mut self.world, elapsed, &mut hooks);

        for vehicle in self.pending_removals.drain(..) {
            vehicle.despawn(&mut self.world);
        }

        events.groups = self.aggregator.drain_groups();
        for event in events.groups.iter().flat_map(|g| g.events.iter()) {
            let Some(victim) = self.players.get_mut(&event.victim) else {
                continue;
            };
            if let Some(death) =
                victim
                    .session
                    .apply_damage(event.zone, event.amount, Some(event.attacker))
            {
                events.deaths.push(death);
            }
        }

        for (id, player) in self.players.iter_mut() {
            if player.session.tick_respawn(elapsed) {
                events.respawned.push(*id);
            }
        }

        self.powerups.tick(elapsed);
        let collectors: Vec<(PlayerId, Vec3)> = self
            .players
            .iter()
            .filter(|(_, p)| p.session.is_alive())
            .filter_map(|(id, p)| {
                let vehicle = p.vehicle.as_ref()?;
                let body = self.world.body(vehicle.chassis())?;
                Some((*id, body.position))
            })
            .collect();
        events.pickups = self.powerups.collect(&collectors);
        for pickup in &events.pickups {
            if let Some(player) = self.players.get_mut(&pickup.player_id) {
                match pickup.kind {
                    PowerupKind::Repair => player.session.heal(REPAIR_FRACTION),
                }
            }
        }

        events
    }

    /// Snapshots of every live vehicle, in player id order
    pub fn snapshots(&self, timestamp: u64) -> Vec<StateSnapshot> {
        self.players
            .values()
            .filter_map(|p| p.vehicle.as_ref())
            .filter_map(|v| v.get_snapshot(&self.world, timestamp))
            .collect()
    }

    /// RPCs that bring a newcomer up to date with everyone already here
    pub fn roster(&self, exclude: PlayerId) -> Vec<Rpc> {
        let mut rpcs = Vec::new();
        for (id, player) in &self.players {
            if *id == exclude || player.session.nickname().is_empty() {
                continue;
            }
            rpcs.push(Rpc::PlayerJoin {
                player_id: *id,
                nickname: player.session.nickname().to_string(),
            });
            if let Some(team_id) = player.session.team() {
                rpcs.push(Rpc::PlayerTeamSelect {
                    player_id: *id,
                    team_id,
                });
            }
            if let (Some(car_type), Some(_)) = (player.session.car_type(), &player.vehicle) {
                rpcs.push(Rpc::PlayerSpawn {
                    player_id: *id,
                    car_type,
                });
            }
            if player.session.state() == SessionState::Spectating {
                rpcs.push(Rpc::PlayerSpectate { player_id: *id });
            }
        }
        rpcs
    }
}
