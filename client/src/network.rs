//! Client session: handshake, pacing and message dispatch

use crate::game::ClientGame;
use crate::input::InputSource;
use crate::transport::{ClientEvent, TcpClientTransport};
use log::{debug, error, info, warn};
use shared::messages::{
    ChangeName, Connecting, Disconnecting, FullUpdate, PlayerInput, RequestLobbyInfo,
    RequestRespawn, SendChatMessage,
};
use shared::{
    read_packet, ClientToServer, DisconnectReason, HostInfo, NetMessage,
    PacketSerializer, ProtocolError, ServerMessage, ServerToClient,
};
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

const AGENT: &str = concat!("snake-client/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: String,
    pub name: String,
    /// Ask for a respawn as soon as the server allows it
    pub auto_respawn: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: format!("127.0.0.1:{}", shared::DEFAULT_PORT),
            name: "snake".to_string(),
            auto_respawn: true,
        }
    }
}

pub struct SnakeClient<I: InputSource> {
    config: ClientConfig,
    transport: TcpClientTransport,
    serializer: PacketSerializer<ClientToServer>,
    game: ClientGame,
    input: I,
    stamp: u8,
    was_alive: bool,
    disconnect_reason: Option<DisconnectReason>,
}

impl<I: InputSource> SnakeClient<I> {
    /// Connects and queues the lobby query, handshake and snapshot request
    pub async fn connect(config: ClientConfig, input: I) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Connecting to {} as {}", config.server, config.name);
        let transport = TcpClientTransport::connect(&config.server).await?;

        let mut serializer = PacketSerializer::new();
        serializer.queue(&RequestLobbyInfo)?;
        serializer.queue(&Connecting {
            name: config.name.clone(),
            host_info: HostInfo::current(AGENT),
        })?;
        serializer.queue(&FullUpdate)?;

        Ok(Self {
            config,
            transport,
            serializer,
            game: ClientGame::new(),
            input,
            stamp: 0,
            was_alive: false,
            disconnect_reason: None,
        })
    }

    pub fn game(&self) -> &ClientGame {
        &self.game
    }

    pub fn input_mut(&mut self) -> &mut I {
        &mut self.input
    }

    pub fn is_connected(&self) -> bool {
        self.disconnect_reason.is_none()
    }

    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.disconnect_reason
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.game.tick_frequency().max(1) as f64)
    }

    pub fn send_chat(&mut self, message: impl Into<String>) -> Result<(), ProtocolError> {
        self.serializer.queue(&SendChatMessage {
            message: message.into(),
        })
    }

    pub fn change_name(&mut self, name: impl Into<String>) -> Result<(), ProtocolError> {
        let name = name.into();
        self.serializer.queue(&ChangeName { name: name.clone() })?;
        self.config.name = name;
        Ok(())
    }

    pub fn request_full_update(&mut self) -> Result<(), ProtocolError> {
        self.serializer.queue(&FullUpdate)
    }

    fn queue<M: NetMessage<Kind = ClientToServer>>(&mut self, message: &M) {
        if let Err(e) = self.serializer.queue(message) {
            error!("Failed to queue {:?}: {}", M::KIND, e);
        }
    }

    /// One client tick: read, react, send. Returns false once disconnected.
    pub fn step(&mut self) -> bool {
        if !self.is_connected() {
            return false;
        }

        for event in self.transport.update() {
            match event {
                ClientEvent::Received(bytes) => self.handle_packet(&bytes),
                ClientEvent::Disconnected(reason) => {
                    warn!("Disconnected: {}", reason);
                    self.disconnect_reason = Some(reason);
                    return false;
                }
            }
        }

        let alive = self.game.is_alive();
        if alive && !self.was_alive {
            self.input.on_spawn();
        }
        self.was_alive = alive;

        if self.game.respawn_allowed() && !alive && self.config.auto_respawn {
            debug!("Requesting respawn");
            self.queue(&RequestRespawn);
            self.game.clear_respawn_allowed();
        }

        if let Some(direction) = self.input.next_direction(&self.game) {
            self.queue(&PlayerInput { direction });
        }

        self.flush();
        true
    }

    fn handle_packet(&mut self, bytes: &[u8]) {
        let mut messages = Vec::new();
        let report = read_packet::<ServerToClient, _>(bytes, |kind, reader| {
            messages.push(ServerMessage::decode(kind, reader)?);
            Ok(())
        });

        match report {
            Ok(report) => {
                if !report.is_clean() {
                    warn!("Server packet had {} malformed groups", report.errors.len());
                }
                self.serializer.acknowledge(report.header.stamp);
                for message in &messages {
                    self.game.apply(message);
                }
            }
            Err(e) => warn!("Dropping unreadable packet: {}", e),
        }
    }

    fn flush(&mut self) {
        if self.serializer.is_empty() {
            return;
        }
        self.stamp = self.stamp.wrapping_add(1);
        self.serializer.set_stamp(self.stamp);
        if let Some(packet) = self.serializer.build() {
            if let Err(e) = self.transport.send(packet) {
                warn!("Send failed: {}", e);
            }
        }
    }

    /// Sends `Disconnecting` and closes the connection
    pub fn leave(&mut self) {
        if !self.is_connected() {
            return;
        }
        self.serializer.clear();
        self.queue(&Disconnecting);
        self.flush();
        self.transport.disconnect(DisconnectReason::Graceful);
        self.disconnect_reason = Some(DisconnectReason::Graceful);
    }

    /// Steps at the server's tick rate until disconnected or `shutdown` completes.
    ///
    /// `on_tick` sees the game after every step (used for rendering).
    pub async fn run_until<F, R>(&mut self, shutdown: F, mut on_tick: R) -> DisconnectReason
    where
        F: Future<Output = ()>,
        R: FnMut(&ClientGame),
    {
        tokio::pin!(shutdown);
        let mut period = self.tick_duration();
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Leaving server");
                    self.leave();
                    break;
                }
                _ = ticker.tick() => {
                    if !self.step() {
                        break;
                    }
                    on_tick(&self.game);

                    if self.tick_duration() != period {
                        period = self.tick_duration();
                        debug!("Pacing at {} ticks per second", self.game.tick_frequency());
                        ticker = interval(period);
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    }
                }
            }
        }

        self.disconnect_reason.unwrap_or(DisconnectReason::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ScriptedInput;
    use assert_approx_eq::assert_approx_eq;
    use shared::framing::{read_frame, write_frame};
    use shared::messages::{AssignPlayerId, GameConfig, RespawnAllowed};
    use shared::{ClientMessage, MessageKind};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::{sleep, timeout};

    async fn read_client_packet(stream: &mut TcpStream) -> (u8, u8, Vec<ClientMessage>) {
        let bytes = timeout(Duration::from_secs(5), read_frame(stream))
            .await
            .unwrap()
            .unwrap();
        let mut messages = Vec::new();
        let report = read_packet::<ClientToServer, _>(&bytes, |kind, reader| {
            messages.push(ClientMessage::decode(kind, reader)?);
            Ok(())
        })
        .unwrap();
        (report.header.stamp, report.header.ack, messages)
    }

    async fn setup() -> (SnakeClient<ScriptedInput>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ClientConfig {
            server: listener.local_addr().unwrap().to_string(),
            name: "tester".to_string(),
            auto_respawn: true,
        };
        let client = SnakeClient::connect(config, ScriptedInput::default())
            .await
            .unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_first_packet_is_handshake() {
        let (mut client, mut server) = setup().await;
        assert!(client.step());

        let (stamp, _, messages) = read_client_packet(&mut server).await;
        assert_eq!(stamp, 1);
        let kinds: Vec<_> = messages.iter().map(|m| m.kind().tag()).collect();
        assert_eq!(
            kinds,
            vec![
                ClientToServer::RequestLobbyInfo.tag(),
                ClientToServer::Connecting.tag(),
                ClientToServer::FullUpdate.tag(),
            ]
        );
        match &messages[1] {
            ClientMessage::Connecting(connecting) => {
                assert_eq!(connecting.name, "tester");
                assert_eq!(connecting.host_info.agent, AGENT);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_respawn_allowed_is_answered_and_acked() {
        let (mut client, mut server) = setup().await;
        client.step();
        read_client_packet(&mut server).await;

        let mut serializer = PacketSerializer::<ServerToClient>::new();
        serializer.set_stamp(77);
        serializer
            .queue(&AssignPlayerId { player_id: 4 })
            .unwrap();
        serializer.queue(&GameConfig { tick_frequency: 50 }).unwrap();
        serializer.queue(&RespawnAllowed).unwrap();
        write_frame(&mut server, &serializer.build().unwrap())
            .await
            .unwrap();

        for _ in 0..100 {
            client.step();
            if client.game().own_id().is_some() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(client.game().own_id(), Some(4));
        assert_approx_eq!(client.tick_duration().as_secs_f64(), 0.02);

        let (_, ack, messages) = read_client_packet(&mut server).await;
        assert_eq!(ack, 77);
        assert!(matches!(messages[..], [ClientMessage::RequestRespawn(_)]));
    }

    #[tokio::test]
    async fn test_leave_sends_disconnecting() {
        let (mut client, mut server) = setup().await;
        client.step();
        read_client_packet(&mut server).await;

        client.leave();
        assert!(!client.is_connected());
        assert!(!client.step());
        assert_eq!(client.disconnect_reason(), Some(DisconnectReason::Graceful));

        let (_, _, messages) = read_client_packet(&mut server).await;
        assert!(matches!(messages[..], [ClientMessage::Disconnecting(_)]));
    }

    #[tokio::test]
    async fn test_server_close_stops_client() {
        let (mut client, server) = setup().await;
        drop(server);

        let mut running = true;
        for _ in 0..200 {
            running = client.step();
            if !running {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert!(!running);
        assert_eq!(client.disconnect_reason(), Some(DisconnectReason::Unknown));
    }
}
