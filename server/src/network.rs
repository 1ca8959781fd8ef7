//! Server network layer handling UDP communications and game loop coordination

use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::console::OperatorCommand;
use crate::game::{GameState, TickEvents};
use log::{debug, error, info, warn};
use shared::{timestamp_millis, Packet, PlayerId, Rpc, StateSnapshot, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

pub type ServerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Longest chat line relayed to other players
pub const MAX_CHAT_LENGTH: usize = 256;
/// Vehicle states per snapshot datagram
pub const SNAPSHOTS_PER_PACKET: usize = 16;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        client_id: PlayerId,
    },
    Operator {
        command: OperatorCommand,
    },
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<PlayerId>,
    },
}

/// Main server coordinating networking and game simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game_state: GameState,
    config: ServerConfig,
    broadcast_sequence: u32,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    /// Binds the socket. Failing to bind is the only fatal network error.
    pub async fn new(config: ServerConfig) -> ServerResult<Self> {
        let socket = Arc::new(UdpSocket::bind(config.bind_address()).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(
                config.max_clients,
                config.client_timeout(),
            ))),
            game_state: GameState::new(&config),
            config,
            broadcast_sequence: 0,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sender into the main loop, for issuing operator commands from outside
    pub fn control_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match Packet::decode(&buffer[0..len]) {
                        Ok(packet) => {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to decode packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    /// Spawns task that turns stdin lines into operator commands
    fn spawn_console_reader(&self) {
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => return,
                    Err(e) => {
                        error!("Console read failed: {}", e);
                        return;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }

                let message = match line.parse::<OperatorCommand>() {
                    Ok(command) => ServerMessage::Operator { command },
                    Err(e) => {
                        warn!("{}", e);
                        continue;
                    }
                };
                if server_tx.send(message).is_err() {
                    return;
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> ServerResult<()> {
        let data = packet.encode()?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<PlayerId>) {
        if let Err(e) = self
            .game_tx
            .send(GameMessage::BroadcastPacket { packet, exclude })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    async fn broadcast_rpc(&self, rpc: Rpc) {
        let mut clients = self.clients.write().await;
        clients.queue_reliable_all(&rpc, None);
    }

    async fn drop_client(&mut self, client_id: PlayerId) {
        {
            let mut clients = self.clients.write().await;
            clients.remove_client(&client_id);
        }
        self.game_state.remove_player(client_id);
        self.broadcast_rpc(Rpc::PlayerQuit {
            player_id: client_id,
        })
        .await;
    }

    /// Processes incoming packets and updates game state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        let client_id = {
            let mut clients = self.clients.write().await;
            let id = clients.find_client_by_addr(addr);
            if let Some(id) = id {
                clients.touch(id);
            }
            id
        };

        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    warn!(
                        "Rejecting {}: protocol {} but server speaks {}",
                        addr, client_version, PROTOCOL_VERSION
                    );
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Protocol version mismatch".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                if let Some(existing_id) = client_id {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    self.drop_client(existing_id).await;
                }

                let new_id = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr)
                };

                match new_id {
                    Some(new_id) => {
                        self.game_state.add_player(new_id);
                        self.send_packet(Packet::Connected { client_id: new_id }, addr);

                        let roster = self.game_state.roster(new_id);
                        let mut clients = self.clients.write().await;
                        for rpc in roster {
                            clients.queue_reliable(new_id, rpc);
                        }
                    }
                    None => {
                        self.send_packet(
                            Packet::Disconnected {
                                reason: "Server full".to_string(),
                            },
                            addr,
                        );
                    }
                }
            }

            Packet::Input { sequence, input } => {
                let Some(client_id) = client_id else {
                    return;
                };
                let accepted = {
                    let mut clients = self.clients.write().await;
                    clients.accept_input(client_id, sequence)
                };
                if accepted {
                    self.game_state.set_pending_input(client_id, input);
                } else {
                    debug!("Dropped stale input {} from client {}", sequence, client_id);
                }
            }

            Packet::Reliable { sequence, rpc } => {
                let Some(client_id) = client_id else {
                    return;
                };
                let received = {
                    let mut clients = self.clients.write().await;
                    clients.receive_reliable(client_id, sequence, rpc)
                };
                if let Some((delivered, ack)) = received {
                    self.send_packet(ack, addr);
                    for rpc in delivered {
                        self.handle_rpc(client_id, rpc).await;
                    }
                }
            }

            Packet::Ack { next_expected } => {
                if let Some(client_id) = client_id {
                    let mut clients = self.clients.write().await;
                    clients.acknowledge(client_id, next_expected);
                }
            }

            Packet::Disconnect => {
                if let Some(client_id) = client_id {
                    self.drop_client(client_id).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Applies a lifecycle request. Player ids inside client RPCs are
    /// ignored; the sender's id is authoritative.
    async fn handle_rpc(&mut self, client_id: PlayerId, rpc: Rpc) {
        let outcome = match rpc {
            Rpc::PlayerJoin { nickname, .. } => self
                .game_state
                .join(client_id, &nickname)
                .map(|_| Rpc::PlayerJoin {
                    player_id: client_id,
                    nickname,
                }),
            Rpc::PlayerTeamSelect { team_id, .. } => self
                .game_state
                .select_team(client_id, team_id)
                .map(|team_id| Rpc::PlayerTeamSelect {
                    player_id: client_id,
                    team_id,
                }),
            Rpc::PlayerSpawn { car_type, .. } => self
                .game_state
                .spawn(client_id, car_type)
                .map(|_| Rpc::PlayerSpawn {
                    player_id: client_id,
                    car_type,
                }),
            Rpc::PlayerChat { message, .. } => Ok(Rpc::PlayerChat {
                player_id: client_id,
                message: message.chars().take(MAX_CHAT_LENGTH).collect(),
            }),
            Rpc::PlayerSpectate { .. } => self
                .game_state
                .spectate(client_id)
                .map(|_| Rpc::PlayerSpectate {
                    player_id: client_id,
                }),
            other => {
                warn!("Client {} sent server-only rpc {:?}", client_id, other);
                return;
            }
        };

        match outcome {
            Ok(rpc) => self.broadcast_rpc(rpc).await,
            Err(e) => warn!("Rejected request from client {}: {}", client_id, e),
        }
    }

    async fn handle_operator(&mut self, command: OperatorCommand) {
        match command {
            OperatorCommand::Respawn(player_id) => match self.game_state.force_respawn(player_id) {
                Ok(Some(car_type)) => {
                    info!("Operator respawned player {}", player_id);
                    self.broadcast_rpc(Rpc::PlayerSpawn {
                        player_id,
                        car_type,
                    })
                    .await;
                }
                Ok(None) => info!("Player {} may now pick a car", player_id),
                Err(e) => warn!("Cannot respawn player {}: {}", player_id, e),
            },
            OperatorCommand::Spectate(player_id) => match self.game_state.spectate(player_id) {
                Ok(()) => self.broadcast_rpc(Rpc::PlayerSpectate { player_id }).await,
                Err(e) => warn!("Cannot move player {} to spectators: {}", player_id, e),
            },
            OperatorCommand::Shutdown => warn!("Shutdown is handled by the main loop"),
        }
    }

    /// Turns tick results into reliable notifications. Players whose respawn
    /// timer ran out get their previous car back.
    async fn publish_tick_events(&mut self, events: TickEvents) {
        for death in events.deaths {
            self.broadcast_rpc(Rpc::PlayerDeath {
                victim_id: death.victim,
                killer_id: death.killer,
            })
            .await;
        }

        for pickup in events.pickups {
            self.broadcast_rpc(Rpc::PowerupCollect {
                powerup_index: pickup.index,
                player_id: pickup.player_id,
                extra_data: pickup.kind.code(),
            })
            .await;
        }

        for player_id in events.respawned {
            let car_type = self
                .game_state
                .player(player_id)
                .and_then(|p| p.session.car_type());
            let Some(car_type) = car_type else {
                continue;
            };
            match self.game_state.spawn(player_id, car_type) {
                Ok(()) => {
                    self.broadcast_rpc(Rpc::PlayerSpawn {
                        player_id,
                        car_type,
                    })
                    .await
                }
                Err(e) => warn!("Could not respawn player {}: {}", player_id, e),
            }
        }
    }

    /// Broadcasts vehicle snapshots, split so every datagram stays small
    fn broadcast_snapshots(&mut self) {
        let timestamp = timestamp_millis();
        let states: Vec<StateSnapshot> = self.game_state.snapshots(timestamp);
        if states.is_empty() {
            return;
        }

        let sequence = self.broadcast_sequence;
        self.broadcast_sequence = self.broadcast_sequence.wrapping_add(1);
        for chunk in states.chunks(SNAPSHOTS_PER_PACKET) {
            self.broadcast_packet(
                Packet::Snapshots {
                    sequence,
                    timestamp,
                    states: chunk.to_vec(),
                },
                None,
            );
        }
    }

    async fn flush_reliables(&self) {
        let due = {
            let mut clients = self.clients.write().await;
            clients.due_reliables(Instant::now())
        };
        for (addr, packet) in due {
            self.send_packet(packet, addr);
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> ServerResult<()> {
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;
        if self.config.console {
            self.spawn_console_reader();
        }

        let mut tick_interval = interval(self.config.tick_duration());
        let mut last_tick = Instant::now();
        let ticks_per_broadcast = self.config.ticks_per_broadcast();

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.game_state.remove_player(client_id);
                            self.broadcast_rpc(Rpc::PlayerQuit { player_id: client_id }).await;
                        },
                        Some(ServerMessage::Operator { command: OperatorCommand::Shutdown })
                        | Some(ServerMessage::Shutdown)
                        | None => {
                            info!("Server shutting down");
                            break;
                        }
                        Some(ServerMessage::Operator { command }) => {
                            self.handle_operator(command).await;
                        },
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    let events = self.game_state.tick(dt);
                    let substeps = events.substeps;
                    self.publish_tick_events(events).await;

                    if self.game_state.tick % ticks_per_broadcast == 0 {
                        self.broadcast_snapshots();
                    }
                    self.flush_reliables().await;

                    if self.game_state.tick % 60 == 0 {
                        let client_count = {
                            let clients = self.clients.read().await;
                            clients.len()
                        };

                        if client_count > 0 {
                            debug!("Tick {}: {} clients, {:.1}Hz, {} physics substeps, {} vehicles",
                                   self.game_state.tick, client_count, 1.0 / dt, substeps,
                                   self.game_state.vehicle_count());
                        }
                    }
                },
            }
        }

        Ok(())
    }
}
