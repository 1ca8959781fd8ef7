pub mod clock;
pub mod physics;
pub mod protocol;
pub mod reliable;
pub mod vehicle;

pub use clock::{SimulationClock, SubstepHooks};
pub use physics::{BodyHandle, ContactPoint, PhysicsWorld, RigidBody, StaticBox};
pub use protocol::{
    CarType, InputState, Packet, PlayerId, ProtocolError, Rpc, StateSnapshot, MAX_PACKET_SIZE,
    PROTOCOL_VERSION,
};
pub use reliable::{ReliableChannel, RELIABLE_WINDOW};
pub use vehicle::{DriveType, VehicleModel, VehicleTuning};

use std::time::{SystemTime, UNIX_EPOCH};

pub const PHYSICS_HZ: f32 = 60.0;
pub const MAX_SUBSTEPS: u32 = 4;

/// Divergence above which a vehicle is teleported onto its snapshot
pub const SNAP_DISTANCE: f32 = 3.0;
/// Divergence above which a vehicle is blended towards its snapshot
pub const BLEND_DISTANCE: f32 = 0.2;
pub const BLEND_FACTOR: f32 = 0.9;

/// Half size of the square arena enclosed by static walls
pub const ARENA_HALF_SIZE: f32 = 100.0;
const WALL_HEIGHT: f32 = 4.0;
const WALL_THICKNESS: f32 = 2.0;

/// Builds the shared arena: ground plane plus four enclosing walls
pub fn arena_world() -> PhysicsWorld {
    let mut world = PhysicsWorld::new();
    let (h, t) = (ARENA_HALF_SIZE, WALL_THICKNESS);
    let walls = [
        (glam::Vec3::new(-h - t, 0.0, -h - t), glam::Vec3::new(h + t, WALL_HEIGHT, -h)),
        (glam::Vec3::new(-h - t, 0.0, h), glam::Vec3::new(h + t, WALL_HEIGHT, h + t)),
        (glam::Vec3::new(-h - t, 0.0, -h), glam::Vec3::new(-h, WALL_HEIGHT, h)),
        (glam::Vec3::new(h, 0.0, -h), glam::Vec3::new(h + t, WALL_HEIGHT, h)),
    ];
    for (min, max) in walls {
        world.add_static_box(StaticBox { min, max });
    }
    world
}

/// Milliseconds since the Unix epoch
pub fn timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
