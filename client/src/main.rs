use clap::{Parser, ValueEnum};
use client::network::{Client, PlayerProfile};
use log::info;
use shared::CarType;
use std::time::Duration;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Car {
    Coupe,
    Truck,
    Small,
}

impl From<Car> for CarType {
    fn from(car: Car) -> Self {
        match car {
            Car::Coupe => CarType::Coupe,
            Car::Truck => CarType::Truck,
            Car::Small => CarType::Small,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Name shown to other players
    #[arg(short = 'n', long, default_value = "driver")]
    nickname: String,

    /// Car to spawn with
    #[arg(short = 'c', long, value_enum, default_value = "coupe")]
    car: Car,

    /// Preferred team (0 or 1); the server may rebalance
    #[arg(short = 't', long, default_value = "0")]
    team: u8,

    /// Seed for the scripted driver
    #[arg(long)]
    seed: Option<u64>,

    /// Disconnect after this many seconds
    #[arg(short = 'd', long)]
    duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }

    let profile = PlayerProfile {
        nickname: args.nickname,
        team: args.team,
        car_type: args.car.into(),
    };
    let mut client = Client::new(&args.server, args.fake_ping, profile, args.seed).await?;

    client.run(args.duration.map(Duration::from_secs)).await?;

    Ok(())
}
