//! Client input management with sequencing and change detection

use shared::InputState;
use std::time::{Duration, Instant};

/// Inputs are resent at this interval even when nothing changed, so a lost
/// datagram never leaves the server with stale controls for long
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_millis(16);

/// Turns sampled controls into sequenced network inputs
pub struct InputManager {
    next_sequence: u32,
    current_input: InputState,
    last_input_sent: Option<Instant>,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            next_sequence: 1,
            current_input: InputState::default(),
            last_input_sent: None,
        }
    }

    /// Records the sampled controls and returns the sequenced input to send,
    /// if the controls changed or the keep-alive interval elapsed
    pub fn update(&mut self, sampled: InputState, now: Instant) -> Option<(u32, InputState)> {
        let input_changed = sampled != self.current_input;
        let time_to_send = match self.last_input_sent {
            Some(sent) => now.duration_since(sent) >= KEEP_ALIVE_INTERVAL,
            None => true,
        };
        self.current_input = sampled;

        if !(input_changed || time_to_send) {
            return None;
        }

        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.last_input_sent = Some(now);
        Some((sequence, sampled))
    }

    /// Returns the current input state
    pub fn current_input(&self) -> InputState {
        self.current_input
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
