//! # Snake Arena Server Library
//!
//! Authoritative server for the multiplayer snake arena. It owns the only
//! real copy of the game, runs it at a fixed tick rate and streams what
//! changed to every connected client over TCP.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Every change to the board is recorded as a tick-stamped event in the
//! [`simulation::Simulation`] history. Clients never simulate; they mirror
//! the events the server sends them.
//!
//! ### Session Management
//! Each connection moves through lobby query, handshake, full snapshot and
//! then incremental deltas. A session that falls further behind than the
//! retained history (or queues too much) is resynced from a fresh snapshot.
//!
//! ### Batching
//! Outbound messages are grouped per message kind into packets of at most
//! 1024 body bytes, one packet per session per tick when there is anything
//! to send.
//!
//! ## Module Organization
//!
//! - `config`: server settings, JSON file loading and validation
//! - `game`: arena rules (movement, food, walls, collisions, respawn)
//! - `simulation`: event-sourced game state with bounded history
//! - `session`: per-connection sync state and outbound packet queues
//! - `host`: transport-independent glue between packets, sessions and game
//! - `transport`: TCP listener with per-connection reader and writer tasks
//! - `network`: the tick loop that drives everything
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         port: 8080,
//!         tick_rate: 20,
//!         ..ServerConfig::default()
//!     };
//!
//!     // Accepts clients and ticks the arena until Ctrl+C
//!     let mut server = Server::bind(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod game;
pub mod host;
pub mod network;
pub mod session;
pub mod simulation;
pub mod transport;
