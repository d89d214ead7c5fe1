//! # Snake Arena Client Library
//!
//! Headless client for the snake arena server. It connects over TCP,
//! performs the handshake, mirrors the board from the server's deltas and
//! steers its snake with a pluggable [`input::InputSource`].
//!
//! ## Architecture Overview
//!
//! The client is a pure mirror: the server is authoritative and sends
//! every board change as a message, so there is no prediction or
//! reconciliation. Each client tick reads everything the transport has
//! received, applies it to the [`game::ClientGame`], asks the input source
//! for a heading and sends one batched packet back.
//!
//! ## Module Organization
//!
//! - `game`: board mirror, player roster and chat history
//! - `input`: input source trait, scripted input and a seeded wandering bot
//! - `network`: session handshake, pacing and message dispatch
//! - `rendering`: ASCII board dump
//! - `transport`: TCP connector with reader and writer tasks
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::input::Wanderer;
//! use client::network::{ClientConfig, SnakeClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig {
//!         server: "127.0.0.1:8080".to_string(),
//!         name: "bot".to_string(),
//!         ..ClientConfig::default()
//!     };
//!
//!     let mut client = SnakeClient::connect(config, Wanderer::new(42)).await?;
//!     let shutdown = async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     };
//!     let reason = client.run_until(shutdown, |_| {}).await;
//!     println!("Disconnected: {}", reason);
//!
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
pub mod transport;
