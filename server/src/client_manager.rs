//! Client connection management for the arena server
//!
//! This module tracks every UDP peer that completed the connect handshake:
//! - Client connection lifecycle (connect, disconnect, timeout)
//! - Stale input rejection using per-client sequence numbers
//! - One reliable RPC channel per client for lifecycle events
//! - Client capacity management and address tracking
//!
//! Player state lives in the game module; the manager only knows about
//! addresses, sequence numbers and reliable delivery.

use log::info;
use shared::{Packet, PlayerId, ReliableChannel, Rpc};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Represents a connected client and its transport state
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server, also the player id
    pub id: PlayerId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Highest input sequence accepted so far
    pub last_input_sequence: Option<u32>,
    /// Lifecycle RPCs in both directions
    pub reliable: ReliableChannel,
}

impl Client {
    pub fn new(id: PlayerId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            last_input_sequence: None,
            reliable: ReliableChannel::default(),
        }
    }

    /// Accepts an input sequence only if it is newer than every sequence
    /// seen before. Reordered or duplicated datagrams are rejected.
    pub fn accept_input(&mut self, sequence: u32) -> bool {
        match self.last_input_sequence {
            Some(last) if sequence <= last => false,
            _ => {
                self.last_input_sequence = Some(sequence);
                true
            }
        }
    }

    /// Checks if the client has exceeded the connection timeout
    ///
    /// Returns true if no packets have been received from this client
    /// within the specified timeout duration, indicating a likely disconnect.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients
///
/// Enforces the server capacity limit and hands out ids that are never
/// reused while the server runs.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<PlayerId, Client>,
    /// Next available client ID for new connections
    next_client_id: PlayerId,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
    timeout: Duration,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity limit
    ///
    /// Client IDs start from 1 and increment for each new connection.
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(client_id) if successful, None if server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<PlayerId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a client from the server
    ///
    /// Returns true if the client was found and removed, false if it was
    /// already gone. Covers both explicit disconnects and timeouts.
    pub fn remove_client(&mut self, client_id: &PlayerId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    /// Finds a client ID by its network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn get(&self, client_id: PlayerId) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    pub fn get_mut(&mut self, client_id: PlayerId) -> Option<&mut Client> {
        self.clients.get_mut(&client_id)
    }

    /// Refreshes the client's activity timestamp
    pub fn touch(&mut self, client_id: PlayerId) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_seen = Instant::now();
        }
    }

    /// Returns true when the input should be applied
    pub fn accept_input(&mut self, client_id: PlayerId, sequence: u32) -> bool {
        self.clients
            .get_mut(&client_id)
            .map(|client| client.accept_input(sequence))
            .unwrap_or(false)
    }

    /// Feeds an incoming reliable RPC through the client's channel. Returns
    /// the RPCs now deliverable in order, plus the ack to send back.
    pub fn receive_reliable(
        &mut self,
        client_id: PlayerId,
        sequence: u32,
        rpc: Rpc,
    ) -> Option<(Vec<Rpc>, Packet)> {
        let client = self.clients.get_mut(&client_id)?;
        let delivered = client.reliable.receive(sequence, rpc);
        let ack = Packet::Ack {
            next_expected: client.reliable.next_expected(),
        };
        Some((delivered, ack))
    }

    pub fn acknowledge(&mut self, client_id: PlayerId, next_expected: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.reliable.acknowledge(next_expected);
        }
    }

    pub fn queue_reliable(&mut self, client_id: PlayerId, rpc: Rpc) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.reliable.push(rpc);
        }
    }

    /// Queues the RPC for every client except `exclude`
    pub fn queue_reliable_all(&mut self, rpc: &Rpc, exclude: Option<PlayerId>) {
        for (id, client) in self.clients.iter_mut() {
            if Some(*id) != exclude {
                client.reliable.push(rpc.clone());
            }
        }
    }

    /// Collects every reliable packet that should go on the wire now
    pub fn due_reliables(&mut self, now: Instant) -> Vec<(SocketAddr, Packet)> {
        let mut packets = Vec::new();
        for client in self.clients.values_mut() {
            for (sequence, rpc) in client.reliable.due_for_send(now) {
                packets.push((client.addr, Packet::Reliable { sequence, rpc }));
            }
        }
        packets
    }

    /// Checks for and removes timed-out clients
    ///
    /// Returns the removed client IDs so the game can drop their players.
    pub fn check_timeouts(&mut self) -> Vec<PlayerId> {
        let timed_out: Vec<PlayerId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(self.timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    /// Gets all client IDs and their network addresses
    pub fn get_client_addrs(&self) -> Vec<(PlayerId, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
