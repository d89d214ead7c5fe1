use clap::Parser;
use client::input::Wanderer;
use client::network::{ClientConfig, SnakeClient};
use client::rendering::{RenderConfig, Renderer};
use log::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Player name shown to others
    #[arg(short = 'n', long, default_value = "snake")]
    name: String,

    /// Print the board every n ticks (0 disables rendering)
    #[arg(short = 'r', long, default_value = "0")]
    render: u32,

    /// Seed for the autopilot
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let seed = args.seed.unwrap_or_else(rand::random);

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    info!("Autopilot seed: {}", seed);

    let config = ClientConfig {
        server: args.server,
        name: args.name,
        ..ClientConfig::default()
    };
    let mut client = SnakeClient::connect(config, Wanderer::new(seed)).await?;

    let mut renderer = (args.render > 0).then(|| {
        Renderer::new(RenderConfig {
            every: args.render,
            ..RenderConfig::default()
        })
    });

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let reason = client
        .run_until(shutdown, |game| {
            if let Some(frame) = renderer.as_mut().and_then(|r| r.frame(game)) {
                println!("{}", frame);
            }
        })
        .await;

    info!("Disconnected: {}", reason);
    Ok(())
}
