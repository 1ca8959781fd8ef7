//! Scripted driver standing in for a keyboard on headless clients

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::InputState;

const MIN_HOLD: f32 = 0.3;
const MAX_HOLD: f32 = 2.5;

/// Holds a random set of controls for a random time, then picks new ones.
/// Throttle is favoured so cars actually meet each other.
pub struct ScriptedDriver {
    rng: StdRng,
    current: InputState,
    hold_remaining: f32,
}

impl ScriptedDriver {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            current: InputState::default(),
            hold_remaining: 0.0,
        }
    }

    pub fn next_input(&mut self, dt: f32) -> InputState {
        self.hold_remaining -= dt;
        if self.hold_remaining <= 0.0 {
            self.current = self.pick();
            self.hold_remaining = self.rng.gen_range(MIN_HOLD..MAX_HOLD);
        }
        self.current
    }

    fn pick(&mut self) -> InputState {
        let forward = self.rng.gen_bool(0.75);
        let steer = self.rng.gen_range(0..3);
        InputState {
            forward,
            back: !forward && self.rng.gen_bool(0.5),
            left: steer == 1,
            right: steer == 2,
            handbrake: self.rng.gen_bool(0.05),
        }
    }
}
