//! Per-player lifecycle: whether a player may act in the simulation
//!
//! `Connecting → TeamSelect → SpawnSelect → Alive → Dead → SpawnSelect`,
//! with `Spectating` reachable from `Dead` and `SpawnSelect`.
//!
//! HP is never stored. Damage accumulates per [`DamageZone`] and HP is
//! recomputed as `INITIAL_HP − Σ zone × weight`, so hits on the same zone add
//! up instead of each subtracting from a counter.

use crate::collision::{DamageZone, ZONE_COUNT};
use log::info;
use shared::{CarType, PlayerId};
use thiserror::Error;

pub const INITIAL_HP: f32 = 100.0;
pub const TEAM_COUNT: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionState {
    Connecting,
    TeamSelect,
    SpawnSelect,
    Alive,
    Dead {
        killer: Option<PlayerId>,
        respawn_in: f32,
    },
    Spectating,
}

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("cannot {action} while {state:?}")]
    InvalidTransition {
        state: SessionState,
        action: &'static str,
    },
    #[error("team {0} does not exist")]
    UnknownTeam(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Death {
    pub victim: PlayerId,
    pub killer: Option<PlayerId>,
}

#[derive(Debug, Clone)]
pub struct PlayerSession {
    id: PlayerId,
    nickname: String,
    team: Option<u8>,
    car_type: Option<CarType>,
    state: SessionState,
    zone_damage: [f32; ZONE_COUNT],
    respawn_delay: f32,
}

impl PlayerSession {
    pub fn new(id: PlayerId, respawn_delay: f32) -> Self {
        Self {
            id,
            nickname: String::new(),
            team: None,
            car_type: None,
            state: SessionState::Connecting,
            zone_damage: [0.0; ZONE_COUNT],
            respawn_delay,
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn team(&self) -> Option<u8> {
        self.team
    }

    pub fn car_type(&self) -> Option<CarType> {
        self.car_type
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_alive(&self) -> bool {
        self.state == SessionState::Alive
    }

    pub fn zone_damage(&self, zone: DamageZone) -> f32 {
        self.zone_damage[zone.index()]
    }

    pub fn hp(&self) -> f32 {
        let weighted: f32 = DamageZone::ALL
            .iter()
            .map(|zone| self.zone_damage[zone.index()] * zone.weight())
            .sum();
        (INITIAL_HP - weighted).max(0.0)
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            state: self.state,
            action,
        }
    }

    pub fn complete_join(&mut self, nickname: &str) -> Result<(), SessionError> {
        if self.state != SessionState::Connecting {
            return Err(self.invalid("join"));
        }
        self.nickname = nickname.to_string();
        self.state = SessionState::TeamSelect;
        Ok(())
    }

    /// Team changes are allowed until the player drives
    pub fn select_team(&mut self, team: u8) -> Result<(), SessionError> {
        if team >= TEAM_COUNT {
            return Err(SessionError::UnknownTeam(team));
        }
        match self.state {
            SessionState::TeamSelect | SessionState::SpawnSelect => {
                self.team = Some(team);
                self.state = SessionState::SpawnSelect;
                Ok(())
            }
            _ => Err(self.invalid("select a team")),
        }
    }

    pub fn spawn(&mut self, car_type: CarType) -> Result<(), SessionError> {
        if self.state != SessionState::SpawnSelect {
            return Err(self.invalid("spawn"));
        }
        self.car_type = Some(car_type);
        self.zone_damage = [0.0; ZONE_COUNT];
        self.state = SessionState::Alive;
        Ok(())
    }

    /// Accumulates damage into a zone. Returns the death when this hit
    /// brings HP to zero.
    pub fn apply_damage(
        &mut self,
        zone: DamageZone,
        amount: f32,
        attacker: Option<PlayerId>,
    ) -> Option<Death> {
        if !self.is_alive() || amount <= 0.0 {
            return None;
        }

        self.zone_damage[zone.index()] += amount;
        if self.hp() > 0.0 {
            return None;
        }

        info!("Player {} destroyed by {:?}", self.id, attacker);
        self.state = SessionState::Dead {
            killer: attacker,
            respawn_in: self.respawn_delay,
        };
        Some(Death {
            victim: self.id,
            killer: attacker,
        })
    }

    /// Counts down the respawn timer. Returns true on the tick the player
    /// becomes able to spawn again.
    pub fn tick_respawn(&mut self, dt: f32) -> bool {
        let SessionState::Dead { killer, respawn_in } = self.state else {
            return false;
        };

        let remaining = respawn_in - dt;
        if remaining <= 0.0 {
            self.state = SessionState::SpawnSelect;
            true
        } else {
            self.state = SessionState::Dead {
                killer,
                respawn_in: remaining,
            };
            false
        }
    }

    /// Operator command skipping the respawn timer or leaving spectator mode
    pub fn force_respawn(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Dead { .. } | SessionState::Spectating => {
                self.state = SessionState::SpawnSelect;
                Ok(())
            }
            _ => Err(self.invalid("respawn")),
        }
    }

    pub fn spectate(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Dead { .. } | SessionState::SpawnSelect => {
                self.state = SessionState::Spectating;
                Ok(())
            }
            _ => Err(self.invalid("spectate")),
        }
    }

    /// Scales every zone accumulator down by `fraction`
    pub fn heal(&mut self, fraction: f32) {
        if !self.is_alive() {
            return;
        }
        let keep = 1.0 - fraction.clamp(0.0, 1.0);
        for damage in &mut self.zone_damage {
            *damage *= keep;
        }
    }
}

/// Picks the team a player actually joins. `counts` holds the current team
/// sizes without the requesting player.
pub fn balance_team(requested: u8, counts: &[usize; TEAM_COUNT as usize]) -> u8 {
    let smallest = (0..TEAM_COUNT)
        .min_by_key(|team| counts[*team as usize])
        .unwrap_or(0);
    let Some(current) = counts.get(requested as usize) else {
        return smallest;
    };

    if *current > counts[smallest as usize] {
        smallest
    } else {
        requested
    }
}
