//! Server loop tying the TCP transport to the game host

use crate::config::ServerConfig;
use crate::game::ArenaMode;
use crate::host::GameHost;
use crate::transport::{TcpTransport, TransportEvent};
use log::{debug, info, warn};
use shared::DisconnectReason;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

/// Main server coordinating networking and game simulation
pub struct Server {
    transport: TcpTransport,
    host: GameHost<ArenaMode>,
    tick_duration: Duration,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;
        let tick_duration = config.tick_duration();
        let transport = TcpTransport::listen(&config.bind_address()).await?;
        let host = GameHost::from_config(config)?;

        Ok(Server {
            transport,
            host,
            tick_duration,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn host(&self) -> &GameHost<ArenaMode> {
        &self.host
    }

    /// Runs until Ctrl+C
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Runs the tick loop until `shutdown` completes
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), Box<dyn std::error::Error>>
    where
        F: Future<Output = ()>,
    {
        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            "Server started on {} at {} ticks per second",
            self.local_addr(),
            (1.0 / self.tick_duration.as_secs_f64()).round()
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Server shutting down");
                    break;
                }
                _ = tick_interval.tick() => {
                    self.step();
                }
            }
        }

        for id in self.host.sessions().peer_ids() {
            self.transport.disconnect(id, DisconnectReason::Graceful);
        }
        self.transport.update();
        Ok(())
    }

    /// One server tick: drain the network, advance the game, send the results
    pub fn step(&mut self) {
        for event in self.transport.update() {
            match event {
                TransportEvent::Connected(connection) => self.host.on_connect(connection.id),
                TransportEvent::Received(connection, bytes) => {
                    if let Err(e) = self.host.handle_packet(connection.id, &bytes) {
                        warn!("Dropping connection {}: {}", connection.id, e);
                        self.transport
                            .disconnect(connection.id, DisconnectReason::ProtocolViolation);
                        self.host.on_disconnect(connection.id);
                    }
                }
                TransportEvent::Disconnected(connection, reason) => {
                    debug!("Connection {} gone: {}", connection.id, reason);
                    self.host.on_disconnect(connection.id);
                }
            }
        }

        for id in self.host.take_closing() {
            self.transport.disconnect(id, DisconnectReason::Graceful);
        }

        for (id, packet) in self.host.tick() {
            self.transport.send(id, packet);
        }
        self.transport.flush();

        let tick = self.host.simulation().current_tick();
        if tick % 600 == 0 {
            debug!(
                "Tick {}: {} connections, {} events retained",
                tick,
                self.transport.connection_count(),
                self.host.simulation().retained_events()
            );
        }
    }
}
