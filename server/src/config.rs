//! Command-line configuration for the server binary

use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ServerConfig {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value = "60")]
    pub tick_rate: u32,

    /// Snapshot broadcasts per second
    #[arg(short, long, default_value = "20")]
    pub broadcast_rate: u32,

    /// Fixed physics substep rate
    #[arg(long, default_value = "60")]
    pub physics_hz: f32,

    /// Substep cap per tick before the simulation falls behind
    #[arg(long, default_value = "4")]
    pub max_substeps: u32,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "16")]
    pub max_clients: usize,

    /// Maximum vehicles alive at once
    #[arg(long, default_value = "16")]
    pub max_vehicles: usize,

    /// Seconds a destroyed player waits before spawning again
    #[arg(long, default_value = "5")]
    pub respawn_delay: f32,

    /// Seconds of silence before a client is dropped
    #[arg(long, default_value = "5")]
    pub client_timeout_secs: u64,

    /// Read operator commands (respawn, spectate, shutdown) from stdin
    #[arg(long)]
    pub console: bool,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    pub fn fixed_timestep(&self) -> f32 {
        1.0 / self.physics_hz.max(1.0)
    }

    /// Simulation ticks between two snapshot broadcasts
    pub fn ticks_per_broadcast(&self) -> u32 {
        (self.tick_rate / self.broadcast_rate.max(1)).max(1)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::parse_from(["server"])
    }
}
