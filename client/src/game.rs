use glam::{Quat, Vec3};
use log::debug;
use shared::{
    arena_world, CarType, InputState, PhysicsWorld, PlayerId, SimulationClock, StateSnapshot,
    SubstepHooks, VehicleModel, VehicleTuning, BLEND_DISTANCE, BLEND_FACTOR, MAX_SUBSTEPS,
    PHYSICS_HZ, SNAP_DISTANCE,
};
use std::collections::{BTreeMap, HashMap};

/// What a consumed snapshot did to the local copy of a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    /// Divergence too large to hide, vehicle teleported
    Snapped,
    /// Pose moved most of the way towards the snapshot
    Blended,
    /// Close enough already
    Ignored,
}

/// Lifecycle facts learnt from reliable RPCs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RosterEntry {
    pub nickname: String,
    pub team: Option<u8>,
    pub car_type: Option<CarType>,
    pub alive: bool,
}

struct ClientHooks<'a> {
    vehicles: &'a mut BTreeMap<PlayerId, VehicleModel>,
}

impl SubstepHooks for ClientHooks<'_> {
    fn pre_substep(&mut self, world: &mut PhysicsWorld, dt: f32) {
        for vehicle in self.vehicles.values_mut() {
            vehicle.step(world, dt);
        }
    }
}

/// Client copy of the arena. Every car runs the same vehicle model as the
/// server; snapshots pull them back when they drift.
pub struct ClientGameState {
    world: PhysicsWorld,
    clock: SimulationClock,
    vehicles: BTreeMap<PlayerId, VehicleModel>,
    pending: HashMap<PlayerId, StateSnapshot>,
    last_sequence: HashMap<PlayerId, u32>,
    pub roster: BTreeMap<PlayerId, RosterEntry>,
    pub local_id: Option<PlayerId>,
    local_input: InputState,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self {
            world: arena_world(),
            clock: SimulationClock::new(1.0 / PHYSICS_HZ, MAX_SUBSTEPS),
            vehicles: BTreeMap::new(),
            pending: HashMap::new(),
            last_sequence: HashMap::new(),
            roster: BTreeMap::new(),
            local_id: None,
            local_input: InputState::default(),
        }
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn vehicle(&self, player_id: PlayerId) -> Option<&VehicleModel> {
        self.vehicles.get(&player_id)
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn local_vehicle(&self) -> Option<&VehicleModel> {
        self.local_id.and_then(|id| self.vehicles.get(&id))
    }

    /// Creates a car for `player_id`, replacing any previous one. The car
    /// starts parked in a lane of its own until the first snapshot snaps it
    /// into place.
    pub fn spawn_vehicle(&mut self, player_id: PlayerId, car_type: CarType) {
        self.remove_vehicle(player_id);
        let lane = (player_id % 16) as f32;
        let position = Vec3::new(-45.0 + lane * 6.0, 2.0, 0.0);
        let vehicle = VehicleModel::spawn(
            &mut self.world,
            VehicleTuning::for_car(car_type),
            position,
            Quat::IDENTITY,
            player_id,
        );
        self.vehicles.insert(player_id, vehicle);

        let entry = self.roster.entry(player_id).or_default();
        entry.car_type = Some(car_type);
        entry.alive = true;
    }

    pub fn remove_vehicle(&mut self, player_id: PlayerId) {
        if let Some(vehicle) = self.vehicles.remove(&player_id) {
            vehicle.despawn(&mut self.world);
        }
        self.pending.remove(&player_id);
    }

    /// Forgets a player that left the server
    pub fn remove_player(&mut self, player_id: PlayerId) {
        self.remove_vehicle(player_id);
        self.last_sequence.remove(&player_id);
        self.roster.remove(&player_id);
    }

    /// Keeps the snapshot as the player's pending correction unless a newer
    /// broadcast was already accepted. Returns false for stale snapshots.
    pub fn buffer_snapshot(&mut self, sequence: u32, snapshot: StateSnapshot) -> bool {
        let player_id = snapshot.player_id;
        if let Some(last) = self.last_sequence.get(&player_id) {
            if sequence <= *last {
                return false;
            }
        }
        self.last_sequence.insert(player_id, sequence);
        self.pending.insert(player_id, snapshot);
        true
    }

    pub fn pending_snapshots(&self) -> usize {
        self.pending.len()
    }

    /// Tiered correction of one vehicle towards a snapshot. Returns None
    /// when the player has no live vehicle here.
    pub fn apply_correction(&mut self, snapshot: &StateSnapshot) -> Option<Correction> {
        let vehicle = self.vehicles.get_mut(&snapshot.player_id)?;
        let body = self.world.body(vehicle.chassis())?;
        let distance = body.position.distance(snapshot.position);

        if distance > SNAP_DISTANCE {
            debug!(
                "Snapping player {} by {:.2}",
                snapshot.player_id, distance
            );
            vehicle.restore_snapshot(&mut self.world, snapshot);
            Some(Correction::Snapped)
        } else if distance > BLEND_DISTANCE {
            let blended = StateSnapshot {
                position: body.position.lerp(snapshot.position, BLEND_FACTOR),
                rotation: body.rotation.slerp(snapshot.rotation, BLEND_FACTOR),
                ..*snapshot
            };
            vehicle.restore_snapshot(&mut self.world, &blended);
            Some(Correction::Blended)
        } else {
            Some(Correction::Ignored)
        }
    }

    pub fn set_local_input(&mut self, input: InputState) {
        self.local_input = input;
    }

    /// Consumes every pending snapshot once, applies the local controls and
    /// advances the simulation
    pub fn step(&mut self, elapsed: f32) -> Vec<(PlayerId, Correction)> {
        let mut corrections = Vec::new();
        let pending: Vec<StateSnapshot> = self.pending.drain().map(|(_, s)| s).collect();
        for snapshot in pending {
            if let Some(correction) = self.apply_correction(&snapshot) {
                corrections.push((snapshot.player_id, correction));
            }
        }

        let input = self.local_input;
        if let Some(vehicle) = self.local_id.and_then(|id| self.vehicles.get_mut(&id)) {
            vehicle.apply_steer_input(input.left, input.right, elapsed);
            vehicle.apply_accel_input(input.forward, input.back, input.handbrake, elapsed);
        }

        let mut hooks = ClientHooks {
            vehicles: &mut self.vehicles,
        };
        self.clock
            .step_simulation(&mut self.world, elapsed, &mut hooks);

        corrections
    }
}

impl Default for ClientGameState {
    fn default() -> Self {
        Self::new()
    }
}
