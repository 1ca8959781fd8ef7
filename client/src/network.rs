use crate::driver::ScriptedDriver;
use crate::game::{ClientGameState, Correction};
use crate::input::InputManager;
use log::{debug, error, info, warn};
use shared::{
    timestamp_millis, CarType, Packet, PlayerId, ReliableChannel, Rpc, MAX_PACKET_SIZE,
    PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep};

/// How often `Connect` is repeated while the server has not answered
pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Who this client plays as once connected
#[derive(Debug, Clone)]
pub struct PlayerProfile {
    pub nickname: String,
    pub team: u8,
    pub car_type: CarType,
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    client_id: Option<PlayerId>,
    connected: bool,
    closed: bool,
    profile: PlayerProfile,

    game_state: ClientGameState,
    input_manager: InputManager,
    driver: ScriptedDriver,
    reliable: ReliableChannel,

    /// Local clock minus the server timestamp of the newest snapshot. One
    /// way and only meaningful when both clocks agree.
    snapshot_age_ms: u64,
    fake_ping_ms: u64,
    snaps: u32,
    blends: u32,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        fake_ping_ms: u64,
        profile: PlayerProfile,
        seed: Option<u64>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            client_id: None,
            connected: false,
            closed: false,
            profile,
            game_state: ClientGameState::new(),
            input_manager: InputManager::new(),
            driver: ScriptedDriver::new(seed),
            reliable: ReliableChannel::default(),
            snapshot_age_ms: 0,
            fake_ping_ms,
            snaps: 0,
            blends: 0,
        })
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server...");

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        self.send_packet(&packet).await?;

        Ok(())
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = packet.encode()?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Queues the join sequence; the reliable channel keeps it in order
    fn request_spawn_flow(&mut self, client_id: PlayerId) {
        // a fresh connection on the server starts a fresh reliable stream
        self.reliable = ReliableChannel::default();
        self.input_manager = InputManager::new();
        self.game_state = ClientGameState::new();
        self.game_state.local_id = Some(client_id);

        self.reliable.push(Rpc::PlayerJoin {
            player_id: client_id,
            nickname: self.profile.nickname.clone(),
        });
        self.reliable.push(Rpc::PlayerTeamSelect {
            player_id: client_id,
            team_id: self.profile.team,
        });
        self.reliable.push(Rpc::PlayerSpawn {
            player_id: client_id,
            car_type: self.profile.car_type,
        });
    }

    async fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Connected { client_id } => {
                info!("Connected! Client ID: {}", client_id);
                if self.client_id == Some(client_id) {
                    return;
                }
                self.client_id = Some(client_id);
                self.connected = true;
                self.request_spawn_flow(client_id);
            }

            Packet::Snapshots {
                sequence,
                timestamp,
                states,
            } => {
                if timestamp > 0 {
                    self.snapshot_age_ms = timestamp_millis().saturating_sub(timestamp);
                }
                for state in states {
                    if !self.game_state.buffer_snapshot(sequence, state) {
                        debug!("Discarded stale snapshot {} for {}", sequence, state.player_id);
                    }
                }
            }

            Packet::Reliable { sequence, rpc } => {
                let delivered = self.reliable.receive(sequence, rpc);
                let ack = Packet::Ack {
                    next_expected: self.reliable.next_expected(),
                };
                if let Err(e) = self.send_packet(&ack).await {
                    error!("Error sending ack: {}", e);
                }
                for rpc in delivered {
                    self.handle_rpc(rpc);
                }
            }

            Packet::Ack { next_expected } => {
                self.reliable.acknowledge(next_expected);
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.closed = true;
                self.client_id = None;
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    fn handle_rpc(&mut self, rpc: Rpc) {
        match rpc {
            Rpc::PlayerJoin {
                player_id,
                nickname,
            } => {
                info!("{} joined (player {})", nickname, player_id);
                self.game_state.roster.entry(player_id).or_default().nickname = nickname;
            }
            Rpc::PlayerQuit { player_id } => {
                info!("Player {} left", player_id);
                self.game_state.remove_player(player_id);
            }
            Rpc::PlayerChat { player_id, message } => {
                let name = self
                    .game_state
                    .roster
                    .get(&player_id)
                    .map(|e| e.nickname.clone())
                    .unwrap_or_else(|| player_id.to_string());
                info!("[{}] {}", name, message);
            }
            Rpc::PlayerSpawn {
                player_id,
                car_type,
            } => {
                debug!("Player {} spawned a {:?}", player_id, car_type);
                self.game_state.spawn_vehicle(player_id, car_type);
            }
            Rpc::PlayerTeamSelect { player_id, team_id } => {
                if Some(player_id) == self.client_id && team_id != self.profile.team {
                    info!("Team {} was full, playing for team {}", self.profile.team, team_id);
                }
                self.game_state.roster.entry(player_id).or_default().team = Some(team_id);
            }
            Rpc::PlayerDeath {
                victim_id,
                killer_id,
            } => {
                if let Some(entry) = self.game_state.roster.get_mut(&victim_id) {
                    entry.alive = false;
                }
                match killer_id {
                    Some(killer) => info!("Player {} was wrecked by {}", victim_id, killer),
                    None => info!("Player {} was wrecked", victim_id),
                }
            }
            Rpc::PowerupCollect {
                powerup_index,
                player_id,
                extra_data,
            } => {
                debug!(
                    "Player {} collected powerup {} (kind {})",
                    player_id, powerup_index, extra_data
                );
            }
            Rpc::PlayerSpectate { player_id } => {
                info!("Player {} is spectating", player_id);
                self.game_state.remove_vehicle(player_id);
                if let Some(entry) = self.game_state.roster.get_mut(&player_id) {
                    entry.alive = false;
                }
            }
        }
    }

    async fn send_input(&mut self, dt: f32) -> Result<(), Box<dyn std::error::Error>> {
        if !self.connected {
            return Ok(());
        }

        let sampled = self.driver.next_input(dt);
        self.game_state.set_local_input(sampled);

        if let Some((sequence, input)) = self.input_manager.update(sampled, Instant::now()) {
            self.send_packet(&Packet::Input { sequence, input }).await?;
        }
        Ok(())
    }

    async fn resend_reliables(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        for (sequence, rpc) in self.reliable.due_for_send(Instant::now()) {
            self.send_packet(&Packet::Reliable { sequence, rpc }).await?;
        }
        Ok(())
    }

    fn step_physics(&mut self, dt: f32) {
        for (_, correction) in self.game_state.step(dt) {
            match correction {
                Correction::Snapped => self.snaps += 1,
                Correction::Blended => self.blends += 1,
                Correction::Ignored => {}
            }
        }
    }

    fn log_status(&mut self) {
        let speed = self
            .game_state
            .local_vehicle()
            .map(|v| v.forward_speed())
            .unwrap_or(0.0);
        info!(
            "{} cars, snapshot age {}ms, speed {:.1} m/s, corrections {} snapped / {} blended",
            self.game_state.vehicle_count(),
            self.snapshot_age_ms,
            speed,
            self.snaps,
            self.blends
        );
        self.snaps = 0;
        self.blends = 0;
    }

    /// Runs until `run_for` elapses, ctrl-c is pressed or the server drops us
    pub async fn run(&mut self, run_for: Option<Duration>) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut input_interval = interval(Duration::from_millis(16));
        let mut physics_interval = interval(Duration::from_millis(16));
        let mut reliable_interval = interval(Duration::from_millis(50));
        let mut connect_interval = interval(CONNECT_RETRY_INTERVAL);
        connect_interval.tick().await;
        let mut status_interval = interval(Duration::from_secs(5));
        let deadline = sleep(run_for.unwrap_or(Duration::from_secs(365 * 24 * 3600)));
        tokio::pin!(deadline);

        let mut last_input = Instant::now();
        let mut last_physics = Instant::now();
        let mut buffer = [0u8; MAX_PACKET_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }

                            match Packet::decode(&buffer[0..len]) {
                                Ok(packet) => self.handle_packet(packet).await,
                                Err(e) => warn!("Dropping malformed packet: {}", e),
                            }
                            if self.closed {
                                break;
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = input_interval.tick() => {
                    let dt = last_input.elapsed().as_secs_f32();
                    last_input = Instant::now();
                    if let Err(e) = self.send_input(dt).await {
                        error!("Error sending input: {}", e);
                    }
                },

                _ = physics_interval.tick() => {
                    let dt = last_physics.elapsed().as_secs_f32();
                    last_physics = Instant::now();
                    self.step_physics(dt);
                },

                _ = reliable_interval.tick() => {
                    if let Err(e) = self.resend_reliables().await {
                        error!("Error sending reliable rpc: {}", e);
                    }
                },

                _ = connect_interval.tick() => {
                    if !self.connected {
                        info!("No answer from server, retrying connect");
                        if let Err(e) = self.connect().await {
                            error!("Error sending connect: {}", e);
                        }
                    }
                },

                _ = status_interval.tick() => {
                    if self.connected {
                        self.log_status();
                    }
                },

                _ = &mut deadline => {
                    info!("Run time elapsed");
                    break;
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                },
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}
