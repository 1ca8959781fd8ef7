//! Integration tests for the arena workspace
//!
//! These tests exercise behaviour that spans crates: the wire protocol over
//! real sockets, the authoritative tick producing damage, and client
//! correction against server snapshots.

use assert_approx_eq::assert_approx_eq;
use client::game::{ClientGameState, Correction};
use glam::{Quat, Vec3};
use server::collision::DamageZone;
use server::config::ServerConfig;
use server::game::GameState;
use server::session::INITIAL_HP;
use shared::{
    CarType, InputState, Packet, PlayerId, ReliableChannel, Rpc, StateSnapshot, PROTOCOL_VERSION,
};
use std::net::UdpSocket;
use std::thread;
use std::time::{Duration, Instant};
use tokio::time::sleep;

const DT: f32 = 1.0 / 60.0;

fn ready_player(game: &mut GameState, id: PlayerId, team: u8, car_type: CarType) {
    game.add_player(id);
    game.join(id, &format!("driver{}", id)).unwrap();
    game.select_team(id, team).unwrap();
    game.spawn(id, car_type).unwrap();
}

fn snapshot_of(game: &GameState, id: PlayerId) -> StateSnapshot {
    let vehicle = game.player(id).unwrap().vehicle.as_ref().unwrap();
    vehicle.get_snapshot(game.world(), 0).unwrap()
}

fn place(game: &mut GameState, id: PlayerId, position: Vec3, rotation: Quat, velocity: Vec3) {
    let chassis = game.player(id).unwrap().vehicle.as_ref().unwrap().chassis();
    let body = game.world_mut().body_mut(chassis).unwrap();
    body.position = position;
    body.rotation = rotation;
    body.linear_velocity = velocity;
    body.angular_velocity = Vec3::ZERO;
}

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Tests real UDP socket communication with the arena packet format
    #[tokio::test]
    async fn udp_socket_communication() {
        let server_socket = UdpSocket::bind("127.0.0.1:0").expect("Failed to bind server socket");
        let server_addr = server_socket.local_addr().unwrap();

        // Echo server
        let server_socket_clone = server_socket.try_clone().unwrap();
        thread::spawn(move || {
            let mut buf = [0; 2048];
            if let Ok((size, client_addr)) = server_socket_clone.recv_from(&mut buf) {
                let _ = server_socket_clone.send_to(&buf[..size], client_addr);
            }
        });

        sleep(Duration::from_millis(10)).await;

        let client_socket = UdpSocket::bind("127.0.0.1:0").expect("Failed to bind client socket");
        client_socket
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();

        let packet = Packet::Reliable {
            sequence: 3,
            rpc: Rpc::PlayerSpawn {
                player_id: 7,
                car_type: CarType::Small,
            },
        };
        client_socket
            .send_to(&packet.encode().unwrap(), server_addr)
            .unwrap();

        let mut buf = [0; 2048];
        let (size, _) = client_socket.recv_from(&mut buf).unwrap();
        assert_eq!(Packet::decode(&buf[..size]).unwrap(), packet);
    }

    /// Tests that garbage never decodes into a packet
    #[test]
    fn malformed_packet_handling() {
        let valid = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        }
        .encode()
        .unwrap();

        let malformed: Vec<Vec<u8>> = vec![
            vec![],
            vec![0xff, 0xff, 0xff, 0xff, 0xff],
            valid[..valid.len() - 1].to_vec(),
            vec![0x07, 0x00, 0x00, 0x00, 0x01],
        ];

        for data in malformed {
            assert!(Packet::decode(&data).is_err(), "decoded {:?}", data);
        }
    }

    /// Reliable RPCs survive a link that drops every other datagram
    #[test]
    fn reliable_delivery_over_lossy_link() {
        let mut sender = ReliableChannel::new(Duration::from_millis(10));
        let mut receiver = ReliableChannel::default();
        let messages: Vec<Rpc> = (0..10)
            .map(|i| Rpc::PlayerChat {
                player_id: 1,
                message: format!("message {}", i),
            })
            .collect();
        for rpc in &messages {
            sender.push(rpc.clone());
        }

        let mut delivered = Vec::new();
        let mut now = Instant::now();
        let mut datagram = 0;
        for _ in 0..50 {
            for (sequence, rpc) in sender.due_for_send(now) {
                datagram += 1;
                if datagram % 2 == 0 {
                    continue;
                }
                delivered.extend(receiver.receive(sequence, rpc));
                sender.acknowledge(receiver.next_expected());
            }
            if sender.unacked_len() == 0 {
                break;
            }
            now += Duration::from_millis(20);
        }

        assert_eq!(delivered, messages);
        assert_eq!(sender.unacked_len(), 0);
    }
}

/// AUTHORITATIVE SIMULATION TESTS
mod game_logic_tests {
    use super::*;

    /// Cars dropped at spawn settle on their suspension
    #[test]
    fn vehicles_settle_on_suspension() {
        let mut game = GameState::new(&ServerConfig::default());
        ready_player(&mut game, 1, 0, CarType::Coupe);
        ready_player(&mut game, 2, 1, CarType::Truck);

        for _ in 0..180 {
            game.tick(DT);
        }

        for id in [1, 2] {
            let vehicle = game.player(id).unwrap().vehicle.as_ref().unwrap();
            let body = game.world().body(vehicle.chassis()).unwrap();
            assert_eq!(vehicle.grounded_wheels(), 4);
            assert!(body.linear_velocity.length() < 0.5);
            assert!(body.position.y > vehicle.tuning().half_extents.y);
        }
    }

    /// Head-on crash: one damage event per car, equal amounts, front zones
    #[test]
    fn head_on_crash_damages_both_fronts_once() {
        let mut game = GameState::new(&ServerConfig::default());
        ready_player(&mut game, 1, 0, CarType::Coupe);
        ready_player(&mut game, 2, 1, CarType::Coupe);

        for _ in 0..90 {
            game.tick(DT);
        }
        let ride_height = snapshot_of(&game, 1).position.y;

        place(
            &mut game,
            1,
            Vec3::new(10.0, ride_height, -10.0),
            Quat::IDENTITY,
            Vec3::new(0.0, 0.0, 40.0),
        );
        place(
            &mut game,
            2,
            Vec3::new(10.0, ride_height, 10.0),
            Quat::from_rotation_y(std::f32::consts::PI),
            Vec3::new(0.0, 0.0, -10.0),
        );

        let mut events = Vec::new();
        for _ in 0..60 {
            let tick = game.tick(DT);
            events.extend(tick.groups.into_iter().flat_map(|g| g.events));
        }

        assert_eq!(events.len(), 2);
        assert_approx_eq!(events[0].amount, events[1].amount, 1e-3);
        assert!(events[0].amount > 130.0 && events[0].amount < 160.0);

        for event in &events {
            assert!(matches!(
                event.zone,
                DamageZone::FrontLeft | DamageZone::FrontRight
            ));
            let session = &game.player(event.victim).unwrap().session;
            assert_approx_eq!(session.hp(), INITIAL_HP - event.amount * 0.1, 1e-3);
            assert!(session.is_alive());
        }
    }

    /// Slow parking-lot bumps never hurt
    #[test]
    fn slow_contact_causes_no_damage() {
        let mut game = GameState::new(&ServerConfig::default());
        ready_player(&mut game, 1, 0, CarType::Small);
        ready_player(&mut game, 2, 1, CarType::Small);
        for _ in 0..90 {
            game.tick(DT);
        }
        let y = snapshot_of(&game, 1).position.y;

        place(&mut game, 1, Vec3::new(0.0, y, 20.0), Quat::IDENTITY, Vec3::new(0.0, 0.0, 5.0));
        place(&mut game, 2, Vec3::new(0.0, y, 25.0), Quat::IDENTITY, Vec3::ZERO);

        for _ in 0..120 {
            let tick = game.tick(DT);
            assert!(tick.groups.is_empty());
        }
        assert_eq!(game.player(2).unwrap().session.hp(), INITIAL_HP);
    }

    /// Repeated head-on crashes wreck both cars, dead cars ignore their
    /// controls and the respawn timer hands them back
    #[test]
    fn crashes_until_death_then_respawn() {
        let config = ServerConfig {
            respawn_delay: 3.0,
            ..ServerConfig::default()
        };
        let mut game = GameState::new(&config);
        ready_player(&mut game, 1, 0, CarType::Coupe);
        ready_player(&mut game, 2, 1, CarType::Coupe);
        for _ in 0..90 {
            game.tick(DT);
        }
        let ride_height = snapshot_of(&game, 1).position.y;

        let mut deaths = Vec::new();
        let mut rounds = 0;
        while deaths.len() < 2 && rounds < 12 {
            rounds += 1;
            place(
                &mut game,
                1,
                Vec3::new(10.0, ride_height, -10.0),
                Quat::IDENTITY,
                Vec3::new(0.0, 0.0, 40.0),
            );
            place(
                &mut game,
                2,
                Vec3::new(10.0, ride_height, 10.0),
                Quat::from_rotation_y(std::f32::consts::PI),
                Vec3::new(0.0, 0.0, -10.0),
            );
            for _ in 0..60 {
                deaths.extend(game.tick(DT).deaths);
            }
        }

        // each hit takes roughly 15 HP off a front zone
        assert!((7..12).contains(&rounds), "took {} rounds", rounds);
        deaths.sort_by_key(|d| d.victim);
        assert_eq!(deaths.len(), 2);
        assert_eq!((deaths[0].victim, deaths[0].killer), (1, Some(2)));
        assert_eq!((deaths[1].victim, deaths[1].killer), (2, Some(1)));

        let wrecks: Vec<_> = [1, 2]
            .iter()
            .map(|id| game.player(*id).unwrap().vehicle.as_ref().unwrap().chassis())
            .collect();
        for id in [1, 2] {
            let session = &game.player(id).unwrap().session;
            assert!(!session.is_alive());
            assert_eq!(session.hp(), 0.0);
        }

        game.set_pending_input(
            1,
            InputState {
                forward: true,
                left: true,
                ..Default::default()
            },
        );
        game.tick(DT);
        let wreck = game.player(1).unwrap().vehicle.as_ref().unwrap();
        assert_eq!(wreck.engine_force(), 0.0);
        assert_eq!(wreck.steer_angle(), 0.0);

        let mut respawned = Vec::new();
        for _ in 0..200 {
            respawned.extend(game.tick(DT).respawned);
        }
        respawned.sort_unstable();
        assert_eq!(respawned, vec![1, 2]);

        for (id, wreck) in [1, 2].into_iter().zip(wrecks) {
            game.spawn(id, CarType::Coupe).unwrap();
            let player = game.player(id).unwrap();
            assert!(player.session.is_alive());
            assert_eq!(player.session.hp(), INITIAL_HP);
            assert_ne!(player.vehicle.as_ref().unwrap().chassis(), wreck);
            assert!(!game.world().contains(wreck));
        }
        assert_eq!(game.vehicle_count(), 2);
    }

    /// A player leaving keeps the tick order intact and frees the vehicle
    #[test]
    fn disconnect_between_ticks() {
        let mut game = GameState::new(&ServerConfig::default());
        ready_player(&mut game, 1, 0, CarType::Coupe);
        ready_player(&mut game, 2, 1, CarType::Coupe);

        game.set_pending_input(
            1,
            InputState {
                forward: true,
                ..Default::default()
            },
        );
        game.remove_player(1);
        let events = game.tick(DT);

        assert_eq!(events.substeps, 1);
        assert_eq!(game.vehicle_count(), 1);
        assert_eq!(game.snapshots(0).len(), 1);
        assert_eq!(game.snapshots(0)[0].player_id, 2);
    }
}

/// CLIENT-SERVER INTEGRATION TESTS
mod client_server_tests {
    use super::*;

    /// Client copies converge on server snapshots through the tiered policy
    #[test]
    fn client_follows_server_snapshots() {
        let mut server = GameState::new(&ServerConfig::default());
        ready_player(&mut server, 1, 0, CarType::Coupe);
        ready_player(&mut server, 2, 1, CarType::Truck);

        let mut client = ClientGameState::new();
        client.local_id = Some(1);
        client.spawn_vehicle(1, CarType::Coupe);
        client.spawn_vehicle(2, CarType::Truck);

        let mut sequence = 0;
        let mut first_corrections = Vec::new();
        for tick in 0..120 {
            server.set_pending_input(
                1,
                InputState {
                    forward: true,
                    ..Default::default()
                },
            );
            client.set_local_input(InputState {
                forward: true,
                ..Default::default()
            });
            server.tick(DT);

            if tick % 3 == 0 {
                sequence += 1;
                for snapshot in server.snapshots(0) {
                    assert!(client.buffer_snapshot(sequence, snapshot));
                }
            }
            let corrections = client.step(DT);
            if tick == 0 {
                first_corrections = corrections;
            }
        }

        first_corrections.sort_by_key(|(id, _)| *id);
        assert_eq!(
            first_corrections,
            vec![(1, Correction::Snapped), (2, Correction::Snapped)]
        );

        for id in [1, 2] {
            let server_position = snapshot_of(&server, id).position;
            let vehicle = client.vehicle(id).unwrap();
            let client_position = client.world().body(vehicle.chassis()).unwrap().position;
            assert!(
                server_position.distance(client_position) < shared::SNAP_DISTANCE,
                "player {} diverged: {} vs {}",
                id,
                server_position,
                client_position
            );
        }
    }

    /// Roster replay gives a newcomer every existing car
    #[test]
    fn roster_replay_spawns_existing_cars() {
        let mut server = GameState::new(&ServerConfig::default());
        ready_player(&mut server, 1, 0, CarType::Coupe);
        ready_player(&mut server, 2, 1, CarType::Small);
        server.add_player(3);

        let mut client = ClientGameState::new();
        client.local_id = Some(3);
        for rpc in server.roster(3) {
            match rpc {
                Rpc::PlayerSpawn {
                    player_id,
                    car_type,
                } => client.spawn_vehicle(player_id, car_type),
                Rpc::PlayerJoin {
                    player_id,
                    nickname,
                } => client.roster.entry(player_id).or_default().nickname = nickname,
                _ => {}
            }
        }

        assert_eq!(client.vehicle_count(), 2);
        assert_eq!(client.roster[&2].nickname, "driver2");
        assert_eq!(client.roster[&2].car_type, Some(CarType::Small));
    }
}
