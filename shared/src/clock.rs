//! Fixed-timestep driver for the physics world
//!
//! Wall time is accumulated and consumed in whole fixed substeps. When a call
//! would need more than `max_substeps`, the extra time is dropped and the
//! simulation falls behind real time instead of spiralling.

use crate::physics::{ContactPoint, PhysicsWorld};

/// Callbacks the clock invokes while stepping
pub trait SubstepHooks {
    /// Runs before each substep; vehicles apply their wheel forces here
    fn pre_substep(&mut self, world: &mut PhysicsWorld, dt: f32);

    /// Runs for every contact point during a substep. No access to the world,
    /// so bodies cannot be added or removed mid-step.
    fn on_contact(&mut self, _contact: &ContactPoint) {}

    /// Runs exactly once per `step_simulation` call, after the last substep
    fn on_frame_end(&mut self) {}
}

#[derive(Debug, Clone)]
pub struct SimulationClock {
    fixed_timestep: f32,
    max_substeps: u32,
    accumulator: f32,
}

impl SimulationClock {
    pub fn new(fixed_timestep: f32, max_substeps: u32) -> Self {
        Self {
            fixed_timestep,
            max_substeps,
            accumulator: 0.0,
        }
    }

    pub fn fixed_timestep(&self) -> f32 {
        self.fixed_timestep
    }

    pub fn max_substeps(&self) -> u32 {
        self.max_substeps
    }

    /// Leftover time not yet consumed by a substep
    pub fn accumulated(&self) -> f32 {
        self.accumulator
    }

    /// Advances `world` by `elapsed` seconds and returns how many substeps ran
    pub fn step_simulation<H: SubstepHooks>(
        &mut self,
        world: &mut PhysicsWorld,
        elapsed: f32,
        hooks: &mut H,
    ) -> u32 {
        self.accumulator += elapsed.max(0.0);
        let wanted = (self.accumulator / self.fixed_timestep).floor() as u32;
        let substeps = wanted.min(self.max_substeps);

        if wanted > substeps {
            log::debug!(
                "Dropping {} substeps, simulation is behind real time",
                wanted - substeps
            );
            self.accumulator = 0.0;
        } else {
            self.accumulator -= substeps as f32 * self.fixed_timestep;
        }

        for _ in 0..substeps {
            hooks.pre_substep(world, self.fixed_timestep);
            world.step(self.fixed_timestep, &mut |contact| hooks.on_contact(contact));
        }

        hooks.on_frame_end();
        substeps
    }
}
