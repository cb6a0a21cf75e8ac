use clap::Parser;
use server::network::Server;
use server::validation::LagCompensationConfig;
use std::time::Duration;

/// Authoritative game server with server-side lag compensation.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Tick rate (simulation updates per second)
    #[clap(short, long, default_value = "60")]
    tick_rate: u32,
    /// Maximum number of concurrent clients
    #[clap(short, long, default_value = "32")]
    max_clients: usize,
    /// Snapshots of pose history retained per entity
    #[clap(long, default_value_t = shared::SNAPSHOT_CAPACITY)]
    history_capacity: usize,
    /// Accept radius around the reconstructed target position, world units
    #[clap(long, default_value_t = shared::HITBOX_RADIUS + shared::HIT_TOLERANCE_SLACK)]
    tolerance_radius: f32,
    /// Start with lag compensation switched off (claims validate against
    /// live positions only)
    #[clap(long)]
    no_lag_compensation: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    if args.tick_rate == 0 {
        return Err("tick rate must be nonzero".into());
    }

    let config = LagCompensationConfig {
        history_capacity: args.history_capacity,
        tolerance_radius: args.tolerance_radius,
        enabled: !args.no_lag_compensation,
        ..LagCompensationConfig::default()
    };

    let address = format!("{}:{}", args.host, args.port);
    let tick_duration = Duration::from_secs_f64(1.0 / args.tick_rate as f64);

    let mut server = Server::new(&address, tick_duration, args.max_clients, config).await?;
    server.run().await?;

    Ok(())
}
