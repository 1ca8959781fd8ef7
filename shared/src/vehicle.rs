//! Raycast vehicle: suspension, tyre friction and drivetrain
//!
//! One `VehicleModel` serves every car type; the differences live in the
//! data-only [`VehicleTuning`] presets. Inputs are applied once per frame and
//! only move the drivetrain scalars, the forces themselves are produced every
//! physics substep by [`VehicleModel::step`].
//!
//! Chassis space: `+Y` up, `+Z` forward, `+X` left. Positive steer turns left.

use crate::physics::{BodyHandle, PhysicsWorld, RigidBody};
use crate::protocol::{CarType, PlayerId, StateSnapshot};
use glam::{Quat, Vec3};

pub const NUM_WHEELS: usize = 4;

/// Weights of the forward and side impulses inside the friction circle
pub const FORWARD_FRICTION_FACTOR: f32 = 0.5;
pub const SIDE_FRICTION_FACTOR: f32 = 1.0;

const BILATERAL_DAMPING: f32 = 0.2;
const AIRBORNE_SPIN_DAMPING: f32 = 0.99;
const MIN_CONTACT_DOT: f32 = 0.1;
const MAX_CLIPPED_INV_CONTACT_DOT: f32 = 10.0;
const DIRECTION_CHANGE_SPEED: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveType {
    Front,
    Rear,
    All,
}

impl DriveType {
    fn drives(self, is_front: bool) -> bool {
        match self {
            DriveType::Front => is_front,
            DriveType::Rear => !is_front,
            DriveType::All => true,
        }
    }

    fn driven_wheels(self) -> usize {
        match self {
            DriveType::All => 4,
            DriveType::Front | DriveType::Rear => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleTuning {
    pub mass: f32,
    pub half_extents: Vec3,

    pub suspension_stiffness: f32,
    pub suspension_compression: f32,
    pub suspension_damping: f32,
    pub suspension_rest_length: f32,
    pub max_suspension_travel: f32,
    pub max_suspension_force: f32,

    pub wheel_radius: f32,
    pub wheel_width: f32,
    pub friction_slip: f32,
    pub roll_influence: f32,

    pub engine_force: f32,
    pub reverse_force: f32,
    /// Engine force gained per second while the throttle is held
    pub engine_ramp: f32,
    pub brake_force: f32,
    pub handbrake_force: f32,
    pub rolling_resistance: f32,
    pub gear_ratios: Vec<f32>,
    /// Forward speed covered by each gear before shifting up
    pub shift_speed: f32,
    pub max_speed: f32,
    pub drive_type: DriveType,

    pub steer_clamp: f32,
    pub steer_rate: f32,
    pub steer_return_rate: f32,
}

impl VehicleTuning {
    pub fn for_car(car_type: CarType) -> Self {
        match car_type {
            CarType::Coupe => Self {
                mass: 800.0,
                half_extents: Vec3::new(0.9, 0.35, 2.0),
                suspension_stiffness: 20.0,
                suspension_compression: 4.4,
                suspension_damping: 2.3,
                suspension_rest_length: 0.6,
                max_suspension_travel: 0.5,
                max_suspension_force: 6000.0,
                wheel_radius: 0.4,
                wheel_width: 0.3,
                friction_slip: 10.5,
                roll_influence: 0.1,
                engine_force: 4000.0,
                reverse_force: 1500.0,
                engine_ramp: 8000.0,
                brake_force: 1500.0,
                handbrake_force: 2500.0,
                rolling_resistance: 150.0,
                gear_ratios: vec![3.2, 2.1, 1.5, 1.1, 0.9],
                shift_speed: 9.0,
                max_speed: 45.0,
                drive_type: DriveType::Rear,
                steer_clamp: 0.5,
                steer_rate: 1.5,
                steer_return_rate: 2.5,
            },
            CarType::Truck => Self {
                mass: 1500.0,
                half_extents: Vec3::new(1.1, 0.6, 2.6),
                suspension_stiffness: 25.0,
                suspension_compression: 4.4,
                suspension_damping: 2.8,
                suspension_rest_length: 0.7,
                max_suspension_travel: 0.6,
                max_suspension_force: 12000.0,
                wheel_radius: 0.55,
                wheel_width: 0.4,
                friction_slip: 8.0,
                roll_influence: 0.05,
                engine_force: 7000.0,
                reverse_force: 2500.0,
                engine_ramp: 10000.0,
                brake_force: 2500.0,
                handbrake_force: 3500.0,
                rolling_resistance: 300.0,
                gear_ratios: vec![4.0, 2.8, 2.0, 1.4, 1.0],
                shift_speed: 7.0,
                max_speed: 35.0,
                drive_type: DriveType::All,
                steer_clamp: 0.4,
                steer_rate: 1.0,
                steer_return_rate: 2.0,
            },
            CarType::Small => Self {
                mass: 500.0,
                half_extents: Vec3::new(0.75, 0.3, 1.5),
                suspension_stiffness: 18.0,
                suspension_compression: 4.0,
                suspension_damping: 2.0,
                suspension_rest_length: 0.5,
                max_suspension_travel: 0.4,
                max_suspension_force: 4000.0,
                wheel_radius: 0.33,
                wheel_width: 0.25,
                friction_slip: 12.0,
                roll_influence: 0.15,
                engine_force: 2600.0,
                reverse_force: 1000.0,
                engine_ramp: 6000.0,
                brake_force: 1000.0,
                handbrake_force: 1800.0,
                rolling_resistance: 100.0,
                gear_ratios: vec![3.0, 2.0, 1.4, 1.0],
                shift_speed: 10.0,
                max_speed: 40.0,
                drive_type: DriveType::Front,
                steer_clamp: 0.6,
                steer_rate: 2.0,
                steer_return_rate: 3.0,
            },
        }
    }

    /// Longest ray a wheel casts: full droop plus the tyre
    pub fn ray_length(&self) -> f32 {
        self.suspension_rest_length + self.max_suspension_travel + self.wheel_radius
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelContact {
    pub point: Vec3,
    pub normal: Vec3,
    /// Dynamic body under the tyre, `None` for the static environment
    pub body: Option<BodyHandle>,
}

#[derive(Debug, Clone)]
pub struct WheelInfo {
    connection_point: Vec3,
    is_front: bool,

    pub suspension_length: f32,
    pub rotation: f32,
    pub delta_rotation: f32,
    pub contact: Option<WheelContact>,
    pub suspension_force: f32,
    pub engine_force: f32,
    pub brake: f32,
    pub skid: f32,

    suspension_relative_velocity: f32,
    clipped_inv_contact_dot_suspension: f32,
}

impl WheelInfo {
    fn new(connection_point: Vec3, is_front: bool, rest_length: f32) -> Self {
        Self {
            connection_point,
            is_front,
            suspension_length: rest_length,
            rotation: 0.0,
            delta_rotation: 0.0,
            contact: None,
            suspension_force: 0.0,
            engine_force: 0.0,
            brake: 0.0,
            skid: 1.0,
            suspension_relative_velocity: 0.0,
            clipped_inv_contact_dot_suspension: 1.0,
        }
    }

    pub fn connection_point(&self) -> Vec3 {
        self.connection_point
    }

    pub fn is_front(&self) -> bool {
        self.is_front
    }

    pub fn is_grounded(&self) -> bool {
        self.contact.is_some()
    }
}

/// Spring and damper force for one wheel; never negative
pub fn suspension_force(
    tuning: &VehicleTuning,
    compression: f32,
    relative_velocity: f32,
    clipped_inv_contact_dot: f32,
) -> f32 {
    let spring = tuning.suspension_stiffness * compression * clipped_inv_contact_dot;
    let damping = if relative_velocity < 0.0 {
        tuning.suspension_compression
    } else {
        tuning.suspension_damping
    };
    let force = (spring - damping * relative_velocity) * tuning.mass;
    force.clamp(0.0, tuning.max_suspension_force)
}

/// Scales both impulses down together so the weighted combination stays
/// inside `max_impulse`. Returns `(forward, side, skid)`.
pub fn clamp_friction_circle(forward: f32, side: f32, max_impulse: f32) -> (f32, f32, f32) {
    let max_impulse = max_impulse.max(0.0);
    let x = forward * FORWARD_FRICTION_FACTOR;
    let y = side * SIDE_FRICTION_FACTOR;
    let impulse_squared = x * x + y * y;

    if impulse_squared > max_impulse * max_impulse {
        let skid = max_impulse / impulse_squared.sqrt();
        (forward * skid, side * skid, skid)
    } else {
        (forward, side, 1.0)
    }
}

fn bilateral_impulse(
    chassis: &RigidBody,
    ground: Option<&RigidBody>,
    point: Vec3,
    direction: Vec3,
) -> f32 {
    let ground_velocity = ground.map_or(Vec3::ZERO, |g| g.velocity_at(point - g.position));
    let relative = chassis.velocity_at(point - chassis.position) - ground_velocity;
    let denominator = chassis.impulse_denominator(point, direction)
        + ground.map_or(0.0, |g| g.impulse_denominator(point, direction));
    if denominator <= f32::EPSILON {
        return 0.0;
    }
    -BILATERAL_DAMPING * direction.dot(relative) / denominator
}

fn rolling_friction(
    chassis: &RigidBody,
    ground: Option<&RigidBody>,
    point: Vec3,
    direction: Vec3,
    max_impulse: f32,
) -> f32 {
    let ground_velocity = ground.map_or(Vec3::ZERO, |g| g.velocity_at(point - g.position));
    let relative = chassis.velocity_at(point - chassis.position) - ground_velocity;
    let denominator = chassis.impulse_denominator(point, direction)
        + ground.map_or(0.0, |g| g.impulse_denominator(point, direction));
    if denominator <= f32::EPSILON {
        return 0.0;
    }
    (-direction.dot(relative) / denominator).clamp(-max_impulse, max_impulse)
}

#[derive(Debug)]
pub struct VehicleModel {
    chassis: BodyHandle,
    player_id: PlayerId,
    tuning: VehicleTuning,
    wheels: [WheelInfo; NUM_WHEELS],

    steer_angle: f32,
    engine_force: f32,
    brake_force: f32,
    handbrake: bool,
    gear: usize,
    forward_speed: f32,
}

impl VehicleModel {
    /// Creates the chassis body and wheel set. The body carries the player id
    /// so contacts can be attributed back to the driver.
    pub fn spawn(
        world: &mut PhysicsWorld,
        tuning: VehicleTuning,
        position: Vec3,
        rotation: Quat,
        player_id: PlayerId,
    ) -> Self {
        let mut body = RigidBody::new_box(tuning.mass, tuning.half_extents, position, rotation);
        body.user_index = Some(player_id);
        let chassis = world.insert(body);

        let h = tuning.half_extents;
        let x = h.x - tuning.wheel_width * 0.5;
        let y = -h.y + 0.15;
        let z = h.z - tuning.wheel_radius - 0.1;
        let rest = tuning.suspension_rest_length;
        let wheels = [
            WheelInfo::new(Vec3::new(x, y, z), true, rest),
            WheelInfo::new(Vec3::new(-x, y, z), true, rest),
            WheelInfo::new(Vec3::new(x, y, -z), false, rest),
            WheelInfo::new(Vec3::new(-x, y, -z), false, rest),
        ];

        Self {
            chassis,
            player_id,
            tuning,
            wheels,
            steer_angle: 0.0,
            engine_force: 0.0,
            brake_force: 0.0,
            handbrake: false,
            gear: 0,
            forward_speed: 0.0,
        }
    }

    /// Removes the chassis from the world, consuming the model
    pub fn despawn(self, world: &mut PhysicsWorld) -> Option<RigidBody> {
        world.remove(self.chassis)
    }

    pub fn chassis(&self) -> BodyHandle {
        self.chassis
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn tuning(&self) -> &VehicleTuning {
        &self.tuning
    }

    pub fn wheels(&self) -> &[WheelInfo; NUM_WHEELS] {
        &self.wheels
    }

    pub fn steer_angle(&self) -> f32 {
        self.steer_angle
    }

    pub fn engine_force(&self) -> f32 {
        self.engine_force
    }

    pub fn brake_force(&self) -> f32 {
        self.brake_force
    }

    pub fn gear(&self) -> usize {
        self.gear
    }

    /// Signed chassis speed along its forward axis, refreshed every substep
    pub fn forward_speed(&self) -> f32 {
        self.forward_speed
    }

    pub fn grounded_wheels(&self) -> usize {
        self.wheels.iter().filter(|w| w.is_grounded()).count()
    }

    pub fn apply_steer_input(&mut self, left: bool, right: bool, dt: f32) {
        let direction = match (left, right) {
            (true, false) => 1.0,
            (false, true) => -1.0,
            _ => 0.0,
        };

        if direction != 0.0 {
            let clamp = self.tuning.steer_clamp;
            self.steer_angle =
                (self.steer_angle + direction * self.tuning.steer_rate * dt).clamp(-clamp, clamp);
        } else {
            let step = self.tuning.steer_return_rate * dt;
            if self.steer_angle.abs() <= step {
                self.steer_angle = 0.0;
            } else {
                self.steer_angle -= step * self.steer_angle.signum();
            }
        }
    }

    pub fn apply_accel_input(&mut self, forward: bool, back: bool, handbrake: bool, dt: f32) {
        let speed = self.forward_speed;
        self.brake_force = 0.0;

        let target = match (forward, back) {
            (true, false) if speed < -DIRECTION_CHANGE_SPEED => {
                self.brake_force = self.tuning.brake_force;
                0.0
            }
            (true, false) if speed >= self.tuning.max_speed => 0.0,
            (true, false) => self.tuning.engine_force * self.gear_scale(),
            (false, true) if speed > DIRECTION_CHANGE_SPEED => {
                self.brake_force = self.tuning.brake_force;
                0.0
            }
            (false, true) => -self.tuning.reverse_force,
            _ => 0.0,
        };

        // releasing the throttle or braking cuts drive immediately
        if target == 0.0 || target.signum() != self.engine_force.signum() {
            self.engine_force = 0.0;
        }
        let ramp = self.tuning.engine_ramp * dt;
        self.engine_force = if target > self.engine_force {
            (self.engine_force + ramp).min(target)
        } else {
            (self.engine_force - ramp).max(target)
        };
        self.handbrake = handbrake;

        let drive = self.tuning.drive_type;
        let per_wheel = self.engine_force / drive.driven_wheels() as f32;
        for wheel in &mut self.wheels {
            wheel.engine_force = if drive.drives(wheel.is_front) && !(handbrake && !wheel.is_front) {
                per_wheel
            } else {
                0.0
            };
            wheel.brake = self.brake_force;
            if handbrake && !wheel.is_front {
                wheel.brake += self.tuning.handbrake_force;
            }
        }
    }

    fn gear_scale(&self) -> f32 {
        let ratios = &self.tuning.gear_ratios;
        match (ratios.first(), ratios.get(self.gear)) {
            (Some(first), Some(current)) if *first > 0.0 => current / first,
            _ => 1.0,
        }
    }

    fn update_gear(&mut self) {
        let top = self.tuning.gear_ratios.len().saturating_sub(1);
        let gear = if self.tuning.shift_speed > 0.0 {
            (self.forward_speed.max(0.0) / self.tuning.shift_speed) as usize
        } else {
            0
        };
        self.gear = gear.min(top);
    }

    fn steer_for(&self, wheel: &WheelInfo) -> f32 {
        if wheel.is_front {
            self.steer_angle
        } else {
            0.0
        }
    }

    /// Full substep update: suspension then friction. All suspension forces
    /// must be known before any friction impulse is computed.
    pub fn step(&mut self, world: &mut PhysicsWorld, dt: f32) {
        self.step_suspension(world, dt);
        self.step_friction(world, dt);
    }

    /// Casts each wheel ray and pushes the chassis up with the spring and
    /// damper force of every grounded wheel
    pub fn step_suspension(&mut self, world: &mut PhysicsWorld, dt: f32) {
        let Some(chassis) = world.body(self.chassis) else {
            return;
        };
        let chassis = chassis.clone();
        let up = chassis.up();
        let down = -up;
        let ray_length = self.tuning.ray_length();
        let min_length = self.tuning.suspension_rest_length - self.tuning.max_suspension_travel;
        let max_length = self.tuning.suspension_rest_length + self.tuning.max_suspension_travel;

        let mut impulses = Vec::with_capacity(NUM_WHEELS);
        for wheel in &mut self.wheels {
            let hard_point = chassis.to_world(wheel.connection_point);
            let Some(hit) = world.raycast(hard_point, down, ray_length, Some(self.chassis)) else {
                wheel.contact = None;
                wheel.suspension_length = max_length;
                wheel.suspension_relative_velocity = 0.0;
                wheel.clipped_inv_contact_dot_suspension = 1.0;
                wheel.suspension_force = 0.0;
                continue;
            };

            wheel.contact = Some(WheelContact {
                point: hit.point,
                normal: hit.normal,
                body: hit.body,
            });
            wheel.suspension_length =
                (hit.distance - self.tuning.wheel_radius).clamp(min_length, max_length);

            let velocity = chassis.velocity_at(hit.point - chassis.position);
            let projected = hit.normal.dot(velocity);
            let contact_dot = hit.normal.dot(up);
            if contact_dot > MIN_CONTACT_DOT {
                let inverse = 1.0 / contact_dot;
                wheel.suspension_relative_velocity = projected * inverse;
                wheel.clipped_inv_contact_dot_suspension = inverse;
            } else {
                wheel.suspension_relative_velocity = 0.0;
                wheel.clipped_inv_contact_dot_suspension = MAX_CLIPPED_INV_CONTACT_DOT;
            }

            wheel.suspension_force = suspension_force(
                &self.tuning,
                self.tuning.suspension_rest_length - wheel.suspension_length,
                wheel.suspension_relative_velocity,
                wheel.clipped_inv_contact_dot_suspension,
            );
            if wheel.suspension_force > 0.0 {
                impulses.push((hit.normal * wheel.suspension_force * dt, hit.point));
            }
        }

        if let Some(body) = world.body_mut(self.chassis) {
            for (impulse, point) in impulses {
                let rel_pos = point - body.position;
                body.apply_impulse(impulse, rel_pos);
            }
        }
    }

    /// Tyre forces for every grounded wheel: rolling/engine/brake along the
    /// wheel, a bilateral constraint across it, both bounded by the friction
    /// circle. Also spins the wheels and refreshes speed and gear.
    pub fn step_friction(&mut self, world: &mut PhysicsWorld, dt: f32) {
        let Some(chassis) = world.body(self.chassis) else {
            return;
        };
        let chassis = chassis.clone();
        let up = chassis.up();
        self.forward_speed = chassis.linear_velocity.dot(chassis.forward());
        self.update_gear();

        struct WheelImpulse {
            point: Vec3,
            forward: Vec3,
            axle: Vec3,
            forward_impulse: f32,
            side_impulse: f32,
            ground: Option<BodyHandle>,
        }
        let mut impulses = Vec::with_capacity(NUM_WHEELS);

        for index in 0..NUM_WHEELS {
            let steer = Quat::from_axis_angle(up, self.steer_for(&self.wheels[index]));
            let wheel_forward = steer * chassis.forward();
            let wheel = &mut self.wheels[index];

            let Some(contact) = wheel.contact else {
                wheel.rotation += wheel.delta_rotation;
                wheel.delta_rotation *= AIRBORNE_SPIN_DAMPING;
                wheel.skid = 1.0;
                continue;
            };

            let axle = steer * (chassis.rotation * Vec3::NEG_X);
            let axle = (axle - contact.normal * axle.dot(contact.normal)).normalize_or_zero();
            let forward = contact.normal.cross(axle).normalize_or_zero();
            let ground = contact.body.and_then(|handle| world.body(handle));

            let side = bilateral_impulse(&chassis, ground, contact.point, axle);
            let rolling = if wheel.engine_force != 0.0 {
                wheel.engine_force * dt
            } else {
                let limit = if wheel.brake != 0.0 {
                    wheel.brake
                } else {
                    self.tuning.rolling_resistance
                };
                rolling_friction(&chassis, ground, contact.point, forward, limit * dt)
            };

            let max_impulse = wheel.suspension_force * dt * self.tuning.friction_slip;
            let (forward_impulse, side_impulse, skid) =
                clamp_friction_circle(rolling, side, max_impulse);
            wheel.skid = skid;

            let contact_velocity = chassis.velocity_at(contact.point - chassis.position);
            let rolling_direction =
                (wheel_forward - contact.normal * wheel_forward.dot(contact.normal)).normalize_or_zero();
            wheel.delta_rotation = rolling_direction.dot(contact_velocity) * dt / self.tuning.wheel_radius;
            wheel.rotation += wheel.delta_rotation;

            impulses.push(WheelImpulse {
                point: contact.point,
                forward,
                axle,
                forward_impulse,
                side_impulse,
                ground: contact.body,
            });
        }

        let roll_influence = self.tuning.roll_influence;
        for impulse in impulses {
            let forward = impulse.forward * impulse.forward_impulse;
            let side = impulse.axle * impulse.side_impulse;

            if let Some(body) = world.body_mut(self.chassis) {
                let rel_pos = impulse.point - body.position;
                let body_up = body.up();
                let side_pos = rel_pos - body_up * (body_up.dot(rel_pos) * (1.0 - roll_influence));
                body.apply_impulse(forward, rel_pos);
                body.apply_impulse(side, side_pos);
            }

            if let Some(ground) = impulse.ground.and_then(|h| world.body_mut(h)) {
                let rel_pos = impulse.point - ground.position;
                ground.apply_impulse(-(forward + side), rel_pos);
            }
        }
    }

    pub fn get_snapshot(&self, world: &PhysicsWorld, timestamp: u64) -> Option<StateSnapshot> {
        let body = world.body(self.chassis)?;
        Some(StateSnapshot {
            player_id: self.player_id,
            timestamp,
            position: body.position,
            wheel_rotation: self.wheels[0].rotation,
            rotation: body.rotation,
            angular_velocity: body.angular_velocity,
            linear_velocity: body.linear_velocity,
        })
    }

    /// Overwrites chassis pose and velocities outside normal integration.
    /// Returns false when the chassis no longer exists.
    pub fn restore_snapshot(&mut self, world: &mut PhysicsWorld, snapshot: &StateSnapshot) -> bool {
        let Some(body) = world.body_mut(self.chassis) else {
            return false;
        };
        body.position = snapshot.position;
        body.rotation = snapshot.rotation.normalize();
        body.linear_velocity = snapshot.linear_velocity;
        body.angular_velocity = snapshot.angular_velocity;
        self.forward_speed = body.linear_velocity.dot(body.forward());

        for wheel in &mut self.wheels {
            wheel.rotation = snapshot.wheel_rotation;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    const DT: f32 = 1.0 / 60.0;

    fn run(world: &mut PhysicsWorld, vehicle: &mut VehicleModel, seconds: f32) {
        let steps = (seconds / DT).round() as usize;
        for _ in 0..steps {
            vehicle.step(world, DT);
            world.step(DT, &mut |_| {});
        }
    }

    fn coupe_on_ground(world: &mut PhysicsWorld) -> VehicleModel {
        let mut vehicle = VehicleModel::spawn(
            world,
            VehicleTuning::for_car(CarType::Coupe),
            Vec3::new(0.0, 1.2, 0.0),
            Quat::IDENTITY,
            7,
        );
        run(world, &mut vehicle, 2.0);
        vehicle
    }

    #[test]
    fn test_steer_is_rate_limited_and_clamped() {
        let mut world = PhysicsWorld::new();
        let mut vehicle = VehicleModel::spawn(
            &mut world,
            VehicleTuning::for_car(CarType::Coupe),
            Vec3::new(0.0, 1.2, 0.0),
            Quat::IDENTITY,
            1,
        );
        let tuning = vehicle.tuning().clone();

        vehicle.apply_steer_input(true, false, DT);
        assert_approx_eq!(vehicle.steer_angle(), tuning.steer_rate * DT, 1e-6);

        for _ in 0..600 {
            let before = vehicle.steer_angle();
            vehicle.apply_steer_input(true, false, DT);
            assert!(vehicle.steer_angle() - before <= tuning.steer_rate * DT + 1e-6);
        }
        assert_approx_eq!(vehicle.steer_angle(), tuning.steer_clamp, 1e-6);

        for _ in 0..600 {
            vehicle.apply_steer_input(false, false, DT);
            assert!(vehicle.steer_angle() >= 0.0);
        }
        assert_eq!(vehicle.steer_angle(), 0.0);

        vehicle.apply_steer_input(false, true, DT);
        assert!(vehicle.steer_angle() < 0.0);
    }

    #[test]
    fn test_suspension_force_is_non_negative_and_monotonic() {
        let tuning = VehicleTuning::for_car(CarType::Coupe);
        let mut previous = 0.0;
        for step in 0..=20 {
            let compression = -0.5 + step as f32 * 0.05;
            let force = suspension_force(&tuning, compression, 0.0, 1.0);
            assert!(force >= 0.0);
            assert!(force >= previous);
            assert!(force <= tuning.max_suspension_force);
            previous = force;
        }
        assert_eq!(suspension_force(&tuning, -0.3, 0.0, 1.0), 0.0);
    }

    #[test]
    fn test_friction_circle_bounds_combined_impulse() {
        let max_impulse = 12.5;
        for forward in [-400.0_f32, -30.0, 0.0, 3.0, 25.0, 900.0] {
            for side in [-250.0_f32, -4.0, 0.0, 6.0, 80.0] {
                let (f, s, skid) = clamp_friction_circle(forward, side, max_impulse);
                let combined = ((f * FORWARD_FRICTION_FACTOR).powi(2)
                    + (s * SIDE_FRICTION_FACTOR).powi(2))
                .sqrt();
                assert!(combined <= max_impulse * 1.0001);
                assert!(skid > 0.0 && skid <= 1.0);
                // proportional scaling keeps direction
                if forward != 0.0 {
                    assert_approx_eq!(f / forward, skid, 1e-5);
                }
            }
        }
    }

    #[test]
    fn test_small_impulses_are_not_skidding() {
        let (f, s, skid) = clamp_friction_circle(2.0, 1.0, 10.0);
        assert_eq!((f, s, skid), (2.0, 1.0, 1.0));
    }

    #[test]
    fn test_vehicle_settles_on_suspension() {
        let mut world = PhysicsWorld::new();
        let vehicle = coupe_on_ground(&mut world);

        let body = world.body(vehicle.chassis()).unwrap();
        assert_eq!(vehicle.grounded_wheels(), NUM_WHEELS);
        assert!(body.position.y > vehicle.tuning().half_extents.y);
        assert!(body.linear_velocity.length() < 0.5);
        assert!(body.up().dot(Vec3::Y) > 0.99);
        for wheel in vehicle.wheels() {
            assert!(wheel.suspension_force > 0.0);
        }
    }

    #[test]
    fn test_throttle_drives_vehicle_forward() {
        let mut world = PhysicsWorld::new();
        let mut vehicle = coupe_on_ground(&mut world);

        for _ in 0..120 {
            vehicle.apply_accel_input(true, false, false, DT);
            vehicle.step(&mut world, DT);
            world.step(DT, &mut |_| {});
        }

        assert!(vehicle.forward_speed() > 3.0);
        assert!(vehicle.engine_force() > 0.0);
        let body = world.body(vehicle.chassis()).unwrap();
        assert!(body.position.z > 2.0);
    }

    #[test]
    fn test_engine_force_only_reaches_driven_wheels() {
        let mut world = PhysicsWorld::new();
        let mut vehicle = VehicleModel::spawn(
            &mut world,
            VehicleTuning::for_car(CarType::Small),
            Vec3::new(0.0, 1.0, 0.0),
            Quat::IDENTITY,
            3,
        );

        vehicle.apply_accel_input(true, false, false, 1.0);
        for wheel in vehicle.wheels() {
            if wheel.is_front() {
                assert!(wheel.engine_force > 0.0);
            } else {
                assert_eq!(wheel.engine_force, 0.0);
            }
        }
    }

    #[test]
    fn test_opposing_input_brakes() {
        let mut world = PhysicsWorld::new();
        let mut vehicle = coupe_on_ground(&mut world);
        let mut snapshot = vehicle.get_snapshot(&world, 0).unwrap();
        snapshot.linear_velocity = Vec3::new(0.0, 0.0, 10.0);
        vehicle.restore_snapshot(&mut world, &snapshot);

        vehicle.apply_accel_input(false, true, false, DT);
        assert_eq!(vehicle.engine_force(), 0.0);
        assert_eq!(vehicle.brake_force(), vehicle.tuning().brake_force);
    }

    #[test]
    fn test_airborne_vehicle_gets_no_wheel_forces() {
        let mut world = PhysicsWorld::new();
        let mut vehicle = VehicleModel::spawn(
            &mut world,
            VehicleTuning::for_car(CarType::Truck),
            Vec3::new(0.0, 50.0, 0.0),
            Quat::IDENTITY,
            2,
        );

        run(&mut world, &mut vehicle, 0.5);

        assert_eq!(vehicle.grounded_wheels(), 0);
        for wheel in vehicle.wheels() {
            assert_eq!(wheel.suspension_force, 0.0);
        }
        let body = world.body(vehicle.chassis()).unwrap();
        assert!(body.linear_velocity.y < -4.0);
    }

    #[test]
    fn test_restore_snapshot_overrides_state() {
        let mut world = PhysicsWorld::new();
        let mut vehicle = coupe_on_ground(&mut world);

        let target = StateSnapshot {
            player_id: 7,
            timestamp: 55,
            position: Vec3::new(4.0, 1.5, -3.0),
            wheel_rotation: 2.5,
            rotation: Quat::from_rotation_y(1.0),
            angular_velocity: Vec3::new(0.0, 0.5, 0.0),
            linear_velocity: Vec3::new(1.0, 0.0, 2.0),
        };
        assert!(vehicle.restore_snapshot(&mut world, &target));

        let snapshot = vehicle.get_snapshot(&world, 55).unwrap();
        assert_eq!(snapshot.position, target.position);
        assert_eq!(snapshot.linear_velocity, target.linear_velocity);
        assert_eq!(snapshot.angular_velocity, target.angular_velocity);
        assert_approx_eq!(snapshot.wheel_rotation, 2.5);
        assert!(snapshot.rotation.angle_between(target.rotation) < 1e-4);
    }

    #[test]
    fn test_despawn_removes_chassis() {
        let mut world = PhysicsWorld::new();
        let vehicle = VehicleModel::spawn(
            &mut world,
            VehicleTuning::for_car(CarType::Coupe),
            Vec3::new(0.0, 1.2, 0.0),
            Quat::IDENTITY,
            1,
        );
        let handle = vehicle.chassis();

        assert!(vehicle.despawn(&mut world).is_some());
        assert!(!world.contains(handle));
        assert!(world.is_empty());
    }
}
