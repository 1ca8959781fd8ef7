//! Wire protocol shared by client and server
//!
//! Two traffic classes travel over the same UDP socket:
//! - high-frequency, loss-tolerant packets (`Input`, `Snapshots`) where only
//!   the newest value matters and stale arrivals are discarded by sequence
//! - low-frequency lifecycle RPCs wrapped in `Reliable` and acknowledged with
//!   `Ack`, delivered in order by [`crate::reliable::ReliableChannel`]

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Connection-scoped player identifier assigned by the server at connect time
pub type PlayerId = u32;

/// Protocol version the server accepts in `Connect`
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest datagram either side expects to receive
pub const MAX_PACKET_SIZE: usize = 2048;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to decode packet: {0}")]
    Decode(bincode::Error),
    #[error("failed to encode packet: {0}")]
    Encode(bincode::Error),
    #[error("packet of {0} bytes exceeds the datagram limit")]
    TooLarge(usize),
}

/// One sampled set of driver controls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputState {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub handbrake: bool,
}

/// Point-in-time capture of one vehicle's chassis and wheel state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub player_id: PlayerId,
    /// Server wall clock in milliseconds when the snapshot was taken
    pub timestamp: u64,
    pub position: Vec3,
    pub wheel_rotation: f32,
    pub rotation: Quat,
    pub angular_velocity: Vec3,
    pub linear_velocity: Vec3,
}

/// Chassis and tuning preset requested on spawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CarType {
    Coupe,
    Truck,
    Small,
}

/// Lifecycle remote calls carried on the reliable channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Rpc {
    PlayerJoin {
        player_id: PlayerId,
        nickname: String,
    },
    PlayerQuit {
        player_id: PlayerId,
    },
    PlayerChat {
        player_id: PlayerId,
        message: String,
    },
    PlayerSpawn {
        player_id: PlayerId,
        car_type: CarType,
    },
    PlayerTeamSelect {
        player_id: PlayerId,
        team_id: u8,
    },
    PlayerDeath {
        victim_id: PlayerId,
        killer_id: Option<PlayerId>,
    },
    PowerupCollect {
        powerup_index: usize,
        player_id: PlayerId,
        extra_data: u32,
    },
    /// Player left the round to watch; any wreck is gone
    PlayerSpectate {
        player_id: PlayerId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Input {
        sequence: u32,
        input: InputState,
    },
    Disconnect,

    Connected {
        client_id: PlayerId,
    },
    Snapshots {
        sequence: u32,
        timestamp: u64,
        states: Vec<StateSnapshot>,
    },
    Disconnected {
        reason: String,
    },

    Reliable {
        sequence: u32,
        rpc: Rpc,
    },
    Ack {
        next_expected: u32,
    },
}

impl Packet {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let data = bincode::serialize(self).map_err(ProtocolError::Encode)?;
        if data.len() > MAX_PACKET_SIZE {
            return Err(ProtocolError::TooLarge(data.len()));
        }
        Ok(data)
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        bincode::deserialize(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot(player_id: PlayerId) -> StateSnapshot {
        StateSnapshot {
            player_id,
            timestamp: 123_456,
            position: Vec3::new(1.0, 2.0, 3.0),
            wheel_rotation: 0.75,
            rotation: Quat::from_rotation_y(0.5),
            angular_velocity: Vec3::new(0.0, 0.3, 0.0),
            linear_velocity: Vec3::new(0.0, 0.0, 12.0),
        }
    }

    #[test]
    fn test_input_packet_encoding() {
        let packet = Packet::Input {
            sequence: 42,
            input: InputState {
                forward: true,
                handbrake: true,
                ..Default::default()
            },
        };

        let decoded = Packet::decode(&packet.encode().unwrap()).unwrap();
        match decoded {
            Packet::Input { sequence, input } => {
                assert_eq!(sequence, 42);
                assert!(input.forward);
                assert!(!input.back);
                assert!(!input.left);
                assert!(!input.right);
                assert!(input.handbrake);
            }
            _ => panic!("Wrong packet type after decoding"),
        }
    }

    #[test]
    fn test_snapshot_packet_keeps_vehicle_state() {
        let packet = Packet::Snapshots {
            sequence: 7,
            timestamp: 99,
            states: vec![sample_snapshot(1), sample_snapshot(2)],
        };

        let decoded = Packet::decode(&packet.encode().unwrap()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_reliable_rpc_encoding() {
        let packet = Packet::Reliable {
            sequence: 3,
            rpc: Rpc::PlayerDeath {
                victim_id: 4,
                killer_id: Some(9),
            },
        };

        let decoded = Packet::decode(&packet.encode().unwrap()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_malformed_packets_are_errors() {
        let valid = Packet::Connect { client_version: 1 }.encode().unwrap();

        assert!(Packet::decode(&[]).is_err());
        assert!(Packet::decode(&valid[..valid.len() / 2]).is_err());

        let mut corrupted = valid.clone();
        corrupted[0] = 0xFF;
        assert!(matches!(
            Packet::decode(&corrupted),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn test_oversized_packet_is_rejected() {
        let packet = Packet::Reliable {
            sequence: 1,
            rpc: Rpc::PlayerChat {
                player_id: 1,
                message: "x".repeat(MAX_PACKET_SIZE),
            },
        };

        assert!(matches!(packet.encode(), Err(ProtocolError::TooLarge(_))));
    }
}
