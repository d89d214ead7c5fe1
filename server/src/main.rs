use clap::{Parser, ValueEnum};
use log::{error, info};
use server::config::ServerConfig;
use server::game::EdgePolicy;
use server::network::Server;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Edge {
    Wrap,
    Kill,
}

impl From<Edge> for EdgePolicy {
    fn from(edge: Edge) -> Self {
        match edge {
            Edge::Wrap => EdgePolicy::Wrap,
            Edge::Kill => EdgePolicy::Kill,
        }
    }
}

/// Command line arguments; anything given here overrides the config file
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server IP address to bind to
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Server port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Tick rate (updates per second)
    #[arg(short, long)]
    tick_rate: Option<u8>,

    #[arg(long)]
    board_width: Option<u8>,

    #[arg(long)]
    board_height: Option<u8>,

    /// Seed for food, wall and spawn placement
    #[arg(long)]
    seed: Option<u64>,

    /// What happens to snakes leaving the board
    #[arg(long, value_enum)]
    edge: Option<Edge>,
}

impl Args {
    fn into_config(self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(tick_rate) = self.tick_rate {
            config.tick_rate = tick_rate;
        }
        if let Some(width) = self.board_width {
            config.rules.width = width;
        }
        if let Some(height) = self.board_height {
            config.rules.height = height;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(edge) = self.edge {
            config = config.with_edge_policy(edge.into());
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config()?;
    info!(
        "Starting snake server on {} ({}x{} board, {} ticks per second)",
        config.bind_address(),
        config.rules.width,
        config.rules.height,
        config.tick_rate
    );

    let mut server = Server::bind(config).await?;
    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        return Err(e);
    }

    Ok(())
}
