//! Rigid-body world stepped by the simulation clock
//!
//! Bodies live in a generational slot table and are only reachable through a
//! [`BodyHandle`]. Removing a body bumps the slot generation, so a handle kept
//! by a despawned vehicle can never alias the body that reuses the slot.
//!
//! Chassis are oriented boxes. Against the ground plane and static boxes the
//! eight corners are tested; car-versus-car contacts use a row of spheres
//! along the chassis length, which yields several contact points per pair
//! and substep much like a contact manifold would.

use glam::{Mat3, Quat, Vec3};

pub const GRAVITY: Vec3 = Vec3::new(0.0, -9.81, 0.0);

/// Distance below which separated chassis spheres are still reported
pub const CONTACT_MARGIN: f32 = 0.04;

const SOLVER_ITERATIONS: usize = 4;
const PENETRATION_SLOP: f32 = 0.01;
const BAUMGARTE: f32 = 0.6;
const RESTITUTION_THRESHOLD: f32 = 1.0;
const LINEAR_DAMPING: f32 = 0.01;
const ANGULAR_DAMPING: f32 = 0.1;
const MAX_ANGULAR_SPEED: f32 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle {
    index: u32,
    generation: u32,
}

/// Axis-aligned static obstacle (arena walls, ramps' bounding blocks)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticBox {
    pub min: Vec3,
    pub max: Vec3,
}

#[derive(Debug, Clone)]
pub struct RigidBody {
    pub position: Vec3,
    pub rotation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    /// Non-owning back-reference to whoever drives this body
    pub user_index: Option<u32>,
    pub restitution: f32,
    pub friction: f32,
    half_extents: Vec3,
    inverse_mass: f32,
    inv_inertia_local: Vec3,
}

impl RigidBody {
    /// Creates a solid box; a mass of zero makes it immovable
    pub fn new_box(mass: f32, half_extents: Vec3, position: Vec3, rotation: Quat) -> Self {
        let (inverse_mass, inv_inertia_local) = if mass > 0.0 {
            let size = half_extents * 2.0;
            let inertia = Vec3::new(
                mass / 12.0 * (size.y * size.y + size.z * size.z),
                mass / 12.0 * (size.x * size.x + size.z * size.z),
                mass / 12.0 * (size.x * size.x + size.y * size.y),
            );
            (1.0 / mass, inertia.recip())
        } else {
            (0.0, Vec3::ZERO)
        };

        Self {
            position,
            rotation: rotation.normalize(),
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            user_index: None,
            restitution: 0.2,
            friction: 0.6,
            half_extents,
            inverse_mass,
            inv_inertia_local,
        }
    }

    pub fn half_extents(&self) -> Vec3 {
        self.half_extents
    }

    pub fn inverse_mass(&self) -> f32 {
        self.inverse_mass
    }

    pub fn mass(&self) -> f32 {
        if self.inverse_mass > 0.0 {
            1.0 / self.inverse_mass
        } else {
            0.0
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.inverse_mass > 0.0
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    pub fn to_world(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * local
    }

    pub fn to_local(&self, world: Vec3) -> Vec3 {
        self.rotation.inverse() * (world - self.position)
    }

    pub fn inv_inertia_world(&self) -> Mat3 {
        let basis = Mat3::from_quat(self.rotation);
        basis * Mat3::from_diagonal(self.inv_inertia_local) * basis.transpose()
    }

    /// Velocity of a point given relative to the centre of mass
    pub fn velocity_at(&self, rel_pos: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(rel_pos)
    }

    pub fn apply_central_impulse(&mut self, impulse: Vec3) {
        self.linear_velocity += impulse * self.inverse_mass;
    }

    pub fn apply_torque_impulse(&mut self, torque: Vec3) {
        self.angular_velocity += self.inv_inertia_world() * torque;
    }

    pub fn apply_impulse(&mut self, impulse: Vec3, rel_pos: Vec3) {
        if !self.is_dynamic() {
            return;
        }
        self.apply_central_impulse(impulse);
        self.apply_torque_impulse(rel_pos.cross(impulse));
    }

    /// Effective inverse mass seen by an impulse along `normal` at world `point`
    pub fn impulse_denominator(&self, point: Vec3, normal: Vec3) -> f32 {
        if !self.is_dynamic() {
            return 0.0;
        }
        let rel_pos = point - self.position;
        let angular = (self.inv_inertia_world() * rel_pos.cross(normal)).cross(rel_pos);
        self.inverse_mass + normal.dot(angular)
    }

    fn corners(&self) -> [Vec3; 8] {
        let h = self.half_extents;
        let mut corners = [Vec3::ZERO; 8];
        for (i, corner) in corners.iter_mut().enumerate() {
            let local = Vec3::new(
                if i & 1 == 0 { -h.x } else { h.x },
                if i & 2 == 0 { -h.y } else { h.y },
                if i & 4 == 0 { -h.z } else { h.z },
            );
            *corner = self.to_world(local);
        }
        corners
    }

    fn sphere_radius(&self) -> f32 {
        self.half_extents.x.min(self.half_extents.z)
    }

    /// World-space sphere centres covering the chassis from rear to front
    fn sphere_centres(&self) -> ([Vec3; 3], usize) {
        let radius = self.sphere_radius();
        let reach = self.half_extents.z - radius;
        if reach <= f32::EPSILON {
            return ([self.position; 3], 1);
        }
        (
            [
                self.to_world(Vec3::new(0.0, 0.0, -reach)),
                self.position,
                self.to_world(Vec3::new(0.0, 0.0, reach)),
            ],
            3,
        )
    }

    fn bounding_radius(&self) -> f32 {
        self.half_extents.length()
    }

    fn integrate(&mut self, dt: f32) {
        self.linear_velocity *= (1.0 - LINEAR_DAMPING * dt).max(0.0);
        self.angular_velocity *= (1.0 - ANGULAR_DAMPING * dt).max(0.0);
        self.angular_velocity = self.angular_velocity.clamp_length_max(MAX_ANGULAR_SPEED);

        self.position += self.linear_velocity * dt;
        let spin = Quat::from_scaled_axis(self.angular_velocity * dt);
        self.rotation = (spin * self.rotation).normalize();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
    /// `None` when the ray hit the static environment
    pub body: Option<BodyHandle>,
}

/// One contact point reported to the substep listener
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    pub body_a: BodyHandle,
    pub body_b: Option<BodyHandle>,
    pub user_a: Option<u32>,
    pub user_b: Option<u32>,
    pub point: Vec3,
    /// Points from B towards A
    pub normal: Vec3,
    /// Negative when the shapes penetrate
    pub distance: f32,
    pub local_point_a: Vec3,
    pub local_point_b: Vec3,
    pub half_extents_a: Vec3,
    pub half_extents_b: Vec3,
    pub velocity_a: Vec3,
    pub velocity_b: Vec3,
}

#[derive(Debug, Clone, Copy)]
struct Contact {
    a: usize,
    b: Option<usize>,
    point: Vec3,
    normal: Vec3,
    distance: f32,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    body: Option<RigidBody>,
}

#[derive(Debug, Default)]
pub struct PhysicsWorld {
    slots: Vec<Slot>,
    free: Vec<u32>,
    statics: Vec<StaticBox>,
    live: usize,
}

impl PhysicsWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, body: RigidBody) -> BodyHandle {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.body = Some(body);
            return BodyHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            body: Some(body),
        });
        BodyHandle {
            index,
            generation: 0,
        }
    }

    /// Takes the body out of the world; the handle is dead afterwards
    pub fn remove(&mut self, handle: BodyHandle) -> Option<RigidBody> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let body = slot.body.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        Some(body)
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.body.as_ref())
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.body.as_mut())
    }

    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.body(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn add_static_box(&mut self, obstacle: StaticBox) {
        self.statics.push(obstacle);
    }

    fn handle_of(&self, index: usize) -> BodyHandle {
        BodyHandle {
            index: index as u32,
            generation: self.slots[index].generation,
        }
    }

    /// Closest hit along `direction` (unit length) within `max_distance`
    pub fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        ignore: Option<BodyHandle>,
    ) -> Option<RayHit> {
        let mut best: Option<RayHit> = None;
        let mut consider = |hit: RayHit| {
            if best.map_or(true, |b| hit.distance < b.distance) {
                best = Some(hit);
            }
        };

        if direction.y < -1e-6 {
            let t = -origin.y / direction.y;
            if (0.0..=max_distance).contains(&t) {
                consider(RayHit {
                    point: origin + direction * t,
                    normal: Vec3::Y,
                    distance: t,
                    body: None,
                });
            }
        }

        for obstacle in &self.statics {
            if let Some((t, normal)) = ray_box(origin, direction, max_distance, obstacle) {
                consider(RayHit {
                    point: origin + direction * t,
                    normal,
                    distance: t,
                    body: None,
                });
            }
        }

        for (index, slot) in self.slots.iter().enumerate() {
            let Some(body) = slot.body.as_ref() else {
                continue;
            };
            let handle = self.handle_of(index);
            if Some(handle) == ignore {
                continue;
            }
            let radius = body.sphere_radius();
            let (centres, count) = body.sphere_centres();
            for centre in &centres[..count] {
                if let Some(t) = ray_sphere(origin, direction, *centre, radius) {
                    if t <= max_distance {
                        let point = origin + direction * t;
                        consider(RayHit {
                            point,
                            normal: (point - *centre).normalize_or_zero(),
                            distance: t,
                            body: Some(handle),
                        });
                    }
                }
            }
        }

        best
    }

    /// Advances every dynamic body by one fixed substep. `on_contact` sees
    /// each contact point before it is resolved; it cannot reach the world.
    pub fn step<F>(&mut self, dt: f32, on_contact: &mut F)
    where
        F: FnMut(&ContactPoint),
    {
        for body in self.slots.iter_mut().filter_map(|s| s.body.as_mut()) {
            if body.is_dynamic() {
                body.linear_velocity += GRAVITY * dt;
            }
        }

        let contacts = self.find_contacts();
        for contact in &contacts {
            if let Some(point) = self.describe(contact) {
                on_contact(&point);
            }
        }

        for iteration in 0..SOLVER_ITERATIONS {
            for contact in contacts.iter().filter(|c| c.distance < 0.0) {
                if let Some((a, b)) = self.contact_bodies_mut(contact) {
                    resolve_velocity(a, b, contact, iteration == 0);
                }
            }
        }

        for contact in contacts.iter().filter(|c| c.distance < 0.0) {
            if let Some((a, b)) = self.contact_bodies_mut(contact) {
                correct_position(a, b, contact);
            }
        }

        for body in self.slots.iter_mut().filter_map(|s| s.body.as_mut()) {
            if body.is_dynamic() {
                body.integrate(dt);
            }
        }
    }

    fn find_contacts(&self) -> Vec<Contact> {
        let mut contacts = Vec::new();
        let bodies: Vec<(usize, &RigidBody)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.body.as_ref().map(|b| (i, b)))
            .collect();

        for &(index, body) in &bodies {
            for corner in body.corners() {
                if corner.y < 0.0 {
                    contacts.push(Contact {
                        a: index,
                        b: None,
                        point: corner,
                        normal: Vec3::Y,
                        distance: corner.y,
                    });
                }
                for obstacle in &self.statics {
                    if let Some((depth, normal)) = point_in_box(corner, obstacle) {
                        contacts.push(Contact {
                            a: index,
                            b: None,
                            point: corner,
                            normal,
                            distance: -depth,
                        });
                    }
                }
            }
        }

        for (i, &(index_a, a)) in bodies.iter().enumerate() {
            for &(index_b, b) in &bodies[i + 1..] {
                let reach = a.bounding_radius() + b.bounding_radius() + CONTACT_MARGIN;
                if a.position.distance_squared(b.position) > reach * reach {
                    continue;
                }

                let (radius_a, radius_b) = (a.sphere_radius(), b.sphere_radius());
                let (centres_a, count_a) = a.sphere_centres();
                let (centres_b, count_b) = b.sphere_centres();
                for centre_a in &centres_a[..count_a] {
                    for centre_b in &centres_b[..count_b] {
                        let delta = *centre_a - *centre_b;
                        let length = delta.length();
                        let distance = length - (radius_a + radius_b);
                        if distance >= CONTACT_MARGIN {
                            continue;
                        }
                        let normal = if length > 1e-6 { delta / length } else { Vec3::Y };
                        let on_a = *centre_a - normal * radius_a;
                        let on_b = *centre_b + normal * radius_b;
                        contacts.push(Contact {
                            a: index_a,
                            b: Some(index_b),
                            point: (on_a + on_b) * 0.5,
                            normal,
                            distance,
                        });
                    }
                }
            }
        }

        contacts
    }

    fn describe(&self, contact: &Contact) -> Option<ContactPoint> {
        let a = self.slots[contact.a].body.as_ref()?;
        let b = contact.b.and_then(|index| self.slots[index].body.as_ref());

        Some(ContactPoint {
            body_a: self.handle_of(contact.a),
            body_b: contact.b.map(|index| self.handle_of(index)),
            user_a: a.user_index,
            user_b: b.and_then(|b| b.user_index),
            point: contact.point,
            normal: contact.normal,
            distance: contact.distance,
            local_point_a: a.to_local(contact.point),
            local_point_b: b.map_or(contact.point, |b| b.to_local(contact.point)),
            half_extents_a: a.half_extents,
            half_extents_b: b.map_or(Vec3::ZERO, |b| b.half_extents),
            velocity_a: a.linear_velocity,
            velocity_b: b.map_or(Vec3::ZERO, |b| b.linear_velocity),
        })
    }

    fn contact_bodies_mut(
        &mut self,
        contact: &Contact,
    ) -> Option<(&mut RigidBody, Option<&mut RigidBody>)> {
        match contact.b {
            None => Some((self.slots[contact.a].body.as_mut()?, None)),
            Some(b) => {
                let (low, high) = (contact.a.min(b), contact.a.max(b));
                let (left, right) = self.slots.split_at_mut(high);
                let low_body = left[low].body.as_mut()?;
                let high_body = right[0].body.as_mut()?;
                if contact.a == low {
                    Some((low_body, Some(high_body)))
                } else {
                    Some((high_body, Some(low_body)))
                }
            }
        }
    }
}

fn resolve_velocity(
    a: &mut RigidBody,
    mut b: Option<&mut RigidBody>,
    contact: &Contact,
    first_iteration: bool,
) {
    let normal = contact.normal;
    let rel_a = contact.point - a.position;
    let relative_velocity = |a: &RigidBody, b: Option<&RigidBody>| {
        let vb = b.map_or(Vec3::ZERO, |b| b.velocity_at(contact.point - b.position));
        a.velocity_at(rel_a) - vb
    };

    let vn = relative_velocity(&*a, b.as_deref()).dot(normal);
    if vn >= 0.0 {
        return;
    }

    let restitution = if first_iteration && vn < -RESTITUTION_THRESHOLD {
        b.as_deref()
            .map_or(a.restitution, |b| a.restitution.max(b.restitution))
    } else {
        0.0
    };
    let denominator = a.impulse_denominator(contact.point, normal)
        + b.as_deref()
            .map_or(0.0, |b| b.impulse_denominator(contact.point, normal));
    if denominator <= f32::EPSILON {
        return;
    }

    let normal_impulse = -(1.0 + restitution) * vn / denominator;
    a.apply_impulse(normal * normal_impulse, rel_a);
    if let Some(b) = b.as_deref_mut() {
        let rel_b = contact.point - b.position;
        b.apply_impulse(-normal * normal_impulse, rel_b);
    }

    let velocity = relative_velocity(&*a, b.as_deref());
    let tangential = velocity - normal * velocity.dot(normal);
    let slide = tangential.length();
    if slide < 1e-4 {
        return;
    }
    let tangent = tangential / slide;
    let friction = b.as_deref().map_or(a.friction, |b| (a.friction * b.friction).sqrt());
    let denominator = a.impulse_denominator(contact.point, tangent)
        + b.as_deref()
            .map_or(0.0, |b| b.impulse_denominator(contact.point, tangent));
    if denominator <= f32::EPSILON {
        return;
    }

    let friction_impulse = (slide / denominator).min(friction * normal_impulse);
    a.apply_impulse(-tangent * friction_impulse, rel_a);
    if let Some(b) = b {
        let rel_b = contact.point - b.position;
        b.apply_impulse(tangent * friction_impulse, rel_b);
    }
}

fn correct_position(a: &mut RigidBody, b: Option<&mut RigidBody>, contact: &Contact) {
    let penetration = -contact.distance - PENETRATION_SLOP;
    if penetration <= 0.0 {
        return;
    }
    let inverse_b = b.as_deref().map_or(0.0, RigidBody::inverse_mass);
    let total = a.inverse_mass + inverse_b;
    if total <= 0.0 {
        return;
    }

    let correction = contact.normal * (penetration * BAUMGARTE / total);
    a.position += correction * a.inverse_mass;
    if let Some(b) = b {
        b.position -= correction * inverse_b;
    }
}

fn ray_sphere(origin: Vec3, direction: Vec3, centre: Vec3, radius: f32) -> Option<f32> {
    let m = origin - centre;
    let b = m.dot(direction);
    let c = m.length_squared() - radius * radius;
    if c > 0.0 && b > 0.0 {
        return None;
    }
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let t = -b - discriminant.sqrt();
    // rays starting inside a chassis never report it
    (t >= 0.0).then_some(t)
}

fn ray_box(
    origin: Vec3,
    direction: Vec3,
    max_distance: f32,
    obstacle: &StaticBox,
) -> Option<(f32, Vec3)> {
    let mut t_min = 0.0_f32;
    let mut t_max = max_distance;
    let mut normal = Vec3::ZERO;

    for axis in 0..3 {
        let o = origin[axis];
        let d = direction[axis];
        if d.abs() < 1e-8 {
            if o < obstacle.min[axis] || o > obstacle.max[axis] {
                return None;
            }
            continue;
        }

        let inverse = 1.0 / d;
        let mut t_near = (obstacle.min[axis] - o) * inverse;
        let mut t_far = (obstacle.max[axis] - o) * inverse;
        let mut face = Vec3::ZERO;
        face[axis] = -1.0;
        if t_near > t_far {
            std::mem::swap(&mut t_near, &mut t_far);
            face[axis] = 1.0;
        }
        if t_near > t_min {
            t_min = t_near;
            normal = face;
        }
        t_max = t_max.min(t_far);
        if t_min > t_max {
            return None;
        }
    }

    (normal != Vec3::ZERO).then_some((t_min, normal))
}

/// Penetration depth and push-out normal of a point inside a static box
fn point_in_box(point: Vec3, obstacle: &StaticBox) -> Option<(f32, Vec3)> {
    let inside = (0..3).all(|axis| point[axis] > obstacle.min[axis] && point[axis] < obstacle.max[axis]);
    if !inside {
        return None;
    }

    let mut best = (f32::MAX, Vec3::ZERO);
    for axis in 0..3 {
        let to_min = point[axis] - obstacle.min[axis];
        let to_max = obstacle.max[axis] - point[axis];
        let mut normal = Vec3::ZERO;
        if to_min < best.0 {
            normal[axis] = -1.0;
            best = (to_min, normal);
        }
        if to_max < best.0 {
            let mut normal = Vec3::ZERO;
            normal[axis] = 1.0;
            best = (to_max, normal);
        }
    }
    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    const DT: f32 = 1.0 / 60.0;

    fn crate_box(position: Vec3) -> RigidBody {
        RigidBody::new_box(10.0, Vec3::new(0.5, 0.5, 0.5), position, Quat::IDENTITY)
    }

    #[test]
    fn test_stale_handle_does_not_alias_new_body() {
        let mut world = PhysicsWorld::new();
        let first = world.insert(crate_box(Vec3::ZERO));
        assert!(world.remove(first).is_some());

        let second = world.insert(crate_box(Vec3::ONE));
        assert!(world.body(first).is_none());
        assert!(world.remove(first).is_none());
        assert_eq!(world.body(second).unwrap().position, Vec3::ONE);
        assert_eq!(world.len(), 1);
    }

    #[test]
    fn test_free_fall_follows_gravity() {
        let mut world = PhysicsWorld::new();
        let handle = world.insert(crate_box(Vec3::new(0.0, 100.0, 0.0)));

        for _ in 0..60 {
            world.step(DT, &mut |_| {});
        }

        let body = world.body(handle).unwrap();
        assert_approx_eq!(body.linear_velocity.y, -9.81, 0.1);
        assert!(body.position.y < 96.0);
    }

    #[test]
    fn test_box_comes_to_rest_on_ground() {
        let mut world = PhysicsWorld::new();
        let handle = world.insert(crate_box(Vec3::new(0.0, 2.0, 0.0)));
        let mut ground_contacts = 0;

        for _ in 0..300 {
            world.step(DT, &mut |contact| {
                if contact.body_b.is_none() {
                    ground_contacts += 1;
                }
            });
        }

        let body = world.body(handle).unwrap();
        assert!(ground_contacts > 0);
        assert_approx_eq!(body.position.y, 0.5, 0.05);
        assert!(body.linear_velocity.length() < 0.2);
    }

    #[test]
    fn test_raycast_hits_ground_and_ignores_own_body() {
        let mut world = PhysicsWorld::new();
        let handle = world.insert(crate_box(Vec3::new(0.0, 3.0, 0.0)));

        let hit = world
            .raycast(Vec3::new(0.0, 3.0, 0.0), Vec3::NEG_Y, 10.0, Some(handle))
            .unwrap();
        assert!(hit.body.is_none());
        assert_approx_eq!(hit.distance, 3.0, 1e-4);
        assert_eq!(hit.normal, Vec3::Y);

        let blocked = world
            .raycast(Vec3::new(0.0, 6.0, 0.0), Vec3::NEG_Y, 10.0, None)
            .unwrap();
        assert_eq!(blocked.body, Some(handle));

        assert!(world
            .raycast(Vec3::new(0.0, 3.0, 0.0), Vec3::NEG_Y, 1.0, Some(handle))
            .is_none());
    }

    #[test]
    fn test_raycast_reports_static_box_face() {
        let mut world = PhysicsWorld::new();
        world.add_static_box(StaticBox {
            min: Vec3::new(-1.0, 0.0, 4.0),
            max: Vec3::new(1.0, 2.0, 5.0),
        });

        let hit = world
            .raycast(Vec3::new(0.0, 1.0, 0.0), Vec3::Z, 10.0, None)
            .unwrap();
        assert_approx_eq!(hit.distance, 4.0, 1e-4);
        assert_eq!(hit.normal, Vec3::NEG_Z);
    }

    #[test]
    fn test_colliding_bodies_report_penetration_and_separate() {
        let mut world = PhysicsWorld::new();
        let mut left = crate_box(Vec3::new(-0.4, 5.0, 0.0));
        left.user_index = Some(1);
        left.linear_velocity = Vec3::new(5.0, 0.0, 0.0);
        let mut right = crate_box(Vec3::new(0.4, 5.0, 0.0));
        right.user_index = Some(2);
        right.linear_velocity = Vec3::new(-5.0, 0.0, 0.0);
        let left = world.insert(left);
        let right = world.insert(right);

        let mut reported = Vec::new();
        world.step(DT, &mut |contact| reported.push(*contact));

        assert!(!reported.is_empty());
        let contact = reported[0];
        assert!(contact.distance < 0.0);
        assert_eq!(contact.user_a, Some(1));
        assert_eq!(contact.user_b, Some(2));
        assert_approx_eq!(contact.velocity_a.x, 5.0, 0.01);

        let closing =
            world.body(left).unwrap().linear_velocity.x - world.body(right).unwrap().linear_velocity.x;
        assert!(closing <= 0.0);
    }
}
