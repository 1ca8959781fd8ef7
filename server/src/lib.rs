//! # Arena Server Library
//!
//! Authoritative server for the vehicle combat arena. It owns the only
//! simulation that decides positions, collisions, damage and deaths; clients
//! run the same physics locally and are corrected from the snapshots this
//! server broadcasts.
//!
//! ## Architecture
//!
//! ### Single-Threaded Event Loop
//! Packet handling and simulation ticks run on one task inside a
//! `tokio::select!` loop, so game state never needs a lock. Helper tasks
//! only move bytes:
//! - **Network Receiver**: decodes datagrams and forwards them to the loop
//! - **Network Sender**: drains the outgoing queue and performs broadcasts
//! - **Timeout Checker**: drops clients that went quiet
//!
//! ### Two Delivery Classes
//! Vehicle snapshots and inputs are unreliable and may be lost or
//! reordered; only the newest matters. Lifecycle events (join, team,
//! spawn, death, pickups, chat) travel as RPCs on a per-client reliable
//! channel with sequence numbers and cumulative acks.
//!
//! ## Module Organization
//!
//! - `client_manager`: connections, stale input rejection, reliable channels
//! - `collision`: turns raw contact points into per-frame damage events
//! - `config`: command line configuration
//! - `console`: operator commands read from stdin
//! - `game`: the authoritative tick and player bookkeeping
//! - `network`: UDP transport and the main loop
//! - `powerup`: repair pickups placed around the arena
//! - `session`: per-player lifecycle and zone damage
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let config = ServerConfig {
//!         port: 9000,
//!         ..ServerConfig::default()
//!     };
//!     let mut server = Server::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod collision;
pub mod config;
pub mod console;
pub mod game;
pub mod network;
pub mod powerup;
pub mod session;
