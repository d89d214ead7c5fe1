//! Integration tests for the snake server and client
//!
//! These tests run the real server loop over TCP and talk to it either
//! with a raw protocol client or with the client crate's `SnakeClient`.

use client::input::{ScriptedInput, Wanderer};
use client::network::{ClientConfig, SnakeClient};
use server::config::ServerConfig;
use server::game::ArenaRules;
use server::network::Server;
use shared::framing::{read_frame, write_frame};
use shared::messages::*;
use shared::{
    read_packet, ClientToServer, Direction, NetMessage, PacketSerializer, ServerMessage,
    ServerToClient,
};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        tick_rate: 20,
        seed: Some(2024),
        rules: ArenaRules {
            wall_interval: 0,
            ..ArenaRules::default()
        },
        ..ServerConfig::default()
    }
}

struct RunningServer {
    addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl RunningServer {
    async fn start(config: ServerConfig) -> Self {
        init_logging();
        let mut server = Server::bind(config).await.unwrap();
        let addr = server.local_addr();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let shutdown = async move {
                let _ = stopped.await;
            };
            if let Err(e) = server.run_until(shutdown).await {
                panic!("server failed: {}", e);
            }
        });
        Self {
            addr,
            stop: Some(stop),
            handle,
        }
    }

    async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        timeout(WAIT, &mut self.handle).await.unwrap().unwrap();
    }
}

/// Speaks the wire protocol directly, without the client crate
struct RawClient {
    writer: OwnedWriteHalf,
    frames: mpsc::UnboundedReceiver<Vec<u8>>,
    serializer: PacketSerializer<ClientToServer>,
    inbox: VecDeque<ServerMessage>,
    stamp: u8,
}

impl RawClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut reader, writer) = stream.into_split();
        let (tx, frames) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok(frame) = read_frame(&mut reader).await {
                if tx.send(frame).is_err() {
                    break;
                }
            }
        });
        Self {
            writer,
            frames,
            serializer: PacketSerializer::new(),
            inbox: VecDeque::new(),
            stamp: 0,
        }
    }

    async fn send<M: NetMessage<Kind = ClientToServer>>(&mut self, message: &M) {
        self.serializer.queue(message).unwrap();
        self.stamp = self.stamp.wrapping_add(1);
        self.serializer.set_stamp(self.stamp);
        let packet = self.serializer.build().unwrap();
        write_frame(&mut self.writer, &packet).await.unwrap();
    }

    async fn send_raw(&mut self, packet: &[u8]) {
        write_frame(&mut self.writer, packet).await.unwrap();
    }

    /// Bytes straight onto the socket, bypassing framing
    async fn write_bytes(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    fn unpack(&mut self, frame: &[u8]) {
        let mut messages = Vec::new();
        let report = read_packet::<ServerToClient, _>(frame, |kind, reader| {
            messages.push(ServerMessage::decode(kind, reader)?);
            Ok(())
        })
        .unwrap();
        assert!(report.is_clean(), "server sent malformed groups");
        self.serializer.acknowledge(report.header.stamp);
        self.inbox.extend(messages);
    }

    /// Next message, or `None` if nothing arrives within `wait`
    async fn next_within(&mut self, wait: Duration) -> Option<ServerMessage> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(message) = self.inbox.pop_front() {
                return Some(message);
            }
            let left = deadline.saturating_duration_since(Instant::now());
            match timeout(left, self.frames.recv()).await {
                Ok(Some(frame)) => self.unpack(&frame),
                _ => return None,
            }
        }
    }

    async fn next(&mut self) -> ServerMessage {
        self.next_within(WAIT)
            .await
            .expect("timed out waiting for the server")
    }

    /// Skips messages until one matches, returning the match
    async fn expect<T>(&mut self, mut pick: impl FnMut(&ServerMessage) -> Option<T>) -> T {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            let message = self.next().await;
            if let Some(found) = pick(&message) {
                return found;
            }
        }
        panic!("expected message never arrived");
    }

    /// Everything that arrives during `window`
    async fn collect_for(&mut self, window: Duration) -> Vec<ServerMessage> {
        let deadline = Instant::now() + window;
        let mut messages = Vec::new();
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return messages;
            }
            match self.next_within(left).await {
                Some(message) => messages.push(message),
                None => return messages,
            }
        }
    }

    async fn handshake(&mut self, name: &str) -> u8 {
        self.send(&Connecting {
            name: name.to_string(),
            host_info: HostInfo::current("raw-test"),
        })
        .await;
        self.expect(|m| match m {
            ServerMessage::AssignPlayerId(assign) => Some(assign.player_id),
            _ => None,
        })
        .await
    }
}

/// SERVER END-TO-END TESTS
mod end_to_end {
    use super::*;

    /// Walks one client through handshake, snapshot, spawn and movement
    #[tokio::test]
    async fn full_session_walkthrough() {
        let server = RunningServer::start(test_config()).await;

        // the first two connections take ids 1 and 2
        let _first = TcpStream::connect(server.addr).await.unwrap();
        let _second = TcpStream::connect(server.addr).await.unwrap();
        let mut client = RawClient::connect(server.addr).await;

        client
            .send(&Connecting {
                name: "A".to_string(),
                host_info: HostInfo::current("raw-test"),
            })
            .await;
        assert_eq!(
            client.next().await,
            ServerMessage::AssignPlayerId(AssignPlayerId { player_id: 3 })
        );
        assert_eq!(
            client.next().await,
            ServerMessage::GameConfig(GameConfig { tick_frequency: 20 })
        );

        client.send(&FullUpdate).await;
        assert_eq!(
            client.next().await,
            ServerMessage::BoardReset(BoardReset {
                width: 64,
                height: 64
            })
        );
        loop {
            match client.next().await {
                ServerMessage::BoardSet(_) => {}
                ServerMessage::PlayerConnected(connected) => {
                    assert_eq!(connected.player_id, 3);
                    assert_eq!(connected.name, "A");
                }
                ServerMessage::RespawnAllowed(_) => break,
                other => panic!("unexpected message in snapshot: {:?}", other),
            }
        }

        // steering without a snake does nothing
        client.send(&PlayerInput { direction: Direction::Up }).await;
        for message in client.collect_for(Duration::from_millis(300)).await {
            assert!(
                !matches!(
                    message,
                    ServerMessage::PlayerMoved(_) | ServerMessage::PlayerSpawned(_)
                ),
                "unexpected {:?}",
                message
            );
        }

        client.send(&RequestRespawn).await;
        let spawned = client
            .expect(|m| match m {
                ServerMessage::PlayerSpawned(spawned) if spawned.player_id == 3 => {
                    Some(spawned.clone())
                }
                _ => None,
            })
            .await;
        client
            .send(&PlayerInput {
                direction: Direction::Right,
            })
            .await;

        let mut heads = vec![(spawned.x, spawned.y)];
        while heads.len() < 8 {
            let moved = client
                .expect(|m| match m {
                    ServerMessage::PlayerMoved(moved) if moved.player_id == 3 => {
                        Some((moved.x, moved.y))
                    }
                    ServerMessage::PlayerDied(died) if died.player_id == 3 => {
                        panic!("snake died")
                    }
                    _ => None,
                })
                .await;
            heads.push(moved);
            // repeating the same heading is harmless
            client
                .send(&PlayerInput {
                    direction: Direction::Right,
                })
                .await;
        }

        // moves made before the turn went up; every move after it goes right
        let turn = heads
            .windows(2)
            .position(|pair| pair[0].1 == pair[1].1)
            .expect("snake never turned right");
        let horizontal = &heads[turn..];
        assert!(horizontal.len() >= 3);
        for pair in horizontal.windows(2) {
            assert_eq!(pair[1].0, (pair[0].0 + 1) % 64);
            assert_eq!(pair[1].1, pair[0].1);
        }

        server.stop().await;
    }

    #[tokio::test]
    async fn lobby_info_before_handshake() {
        let server = RunningServer::start(test_config()).await;
        let mut client = RawClient::connect(server.addr).await;

        client.send(&RequestLobbyInfo).await;
        match client.next().await {
            ServerMessage::LobbyInformation(lobby) => {
                assert_eq!(lobby.player_count, 0);
                assert_eq!(lobby.title, ServerConfig::default().title);
                assert!(lobby.host_info.agent.starts_with("snake-server/"));
            }
            other => panic!("unexpected {:?}", other),
        }

        // gameplay messages before the handshake are ignored
        client.send(&RequestRespawn).await;
        assert!(client
            .collect_for(Duration::from_millis(200))
            .await
            .is_empty());

        server.stop().await;
    }

    #[tokio::test]
    async fn player_ids_are_reused() {
        let server = RunningServer::start(test_config()).await;

        let mut a = RawClient::connect(server.addr).await;
        assert_eq!(a.handshake("a").await, 1);
        let mut b = RawClient::connect(server.addr).await;
        assert_eq!(b.handshake("b").await, 2);
        let mut c = RawClient::connect(server.addr).await;
        assert_eq!(c.handshake("c").await, 3);

        b.send(&Disconnecting).await;
        drop(b);
        sleep(Duration::from_millis(200)).await;

        let mut d = RawClient::connect(server.addr).await;
        assert_eq!(d.handshake("d").await, 2);

        server.stop().await;
    }

    #[tokio::test]
    async fn roster_updates_reach_synced_players() {
        let server = RunningServer::start(test_config()).await;

        let mut watcher = RawClient::connect(server.addr).await;
        watcher.handshake("watcher").await;
        watcher.send(&FullUpdate).await;
        watcher
            .expect(|m| matches!(m, ServerMessage::RespawnAllowed(_)).then_some(()))
            .await;

        let mut joiner = RawClient::connect(server.addr).await;
        let joiner_id = joiner.handshake("joiner").await;
        let connected = watcher
            .expect(|m| match m {
                ServerMessage::PlayerConnected(p) => Some(p.clone()),
                _ => None,
            })
            .await;
        assert_eq!(connected.player_id, joiner_id);
        assert_eq!(connected.name, "joiner");

        joiner
            .send(&ChangeName {
                name: "renamed".to_string(),
            })
            .await;
        let renamed = watcher
            .expect(|m| match m {
                ServerMessage::PlayerRenamed(p) => Some(p.clone()),
                _ => None,
            })
            .await;
        assert_eq!(renamed.name, "renamed");

        drop(joiner);
        let gone = watcher
            .expect(|m| match m {
                ServerMessage::PlayerDisconnected(p) => Some(p.player_id),
                _ => None,
            })
            .await;
        assert_eq!(gone, joiner_id);

        server.stop().await;
    }
}

/// WIRE ROBUSTNESS TESTS
mod robustness {
    use super::*;

    /// A broken group is skipped and the next group in the packet still counts
    #[tokio::test]
    async fn malformed_group_is_skipped() {
        let server = RunningServer::start(test_config()).await;
        let mut client = RawClient::connect(server.addr).await;

        let body: Vec<u8> = vec![
            7, 0, // stamp 7, ack 0
            3, // three groups
            1, 0, 3, 0, 10, b'A', b'B', // Connecting whose text runs past its group
            200, 0, 2, 0, 1, 2, // unknown kind
            0, 0, 0, 0, // RequestLobbyInfo
        ];
        let mut packet = (body.len() as u16 - 2).to_le_bytes().to_vec();
        packet.extend_from_slice(&body);
        client.send_raw(&packet).await;

        match client.next().await {
            ServerMessage::LobbyInformation(_) => {}
            other => panic!("unexpected {:?}", other),
        }
        // the broken handshake never happened
        client.send(&FullUpdate).await;
        assert!(client
            .collect_for(Duration::from_millis(200))
            .await
            .is_empty());

        server.stop().await;
    }

    #[tokio::test]
    async fn oversized_frame_drops_connection() {
        let server = RunningServer::start(test_config()).await;
        let mut client = RawClient::connect(server.addr).await;
        assert_eq!(client.handshake("x").await, 1);

        // length prefix far above the frame limit
        client.write_bytes(&[0xFF, 0xFF]).await;
        sleep(Duration::from_millis(200)).await;

        let mut next = RawClient::connect(server.addr).await;
        assert_eq!(next.handshake("y").await, 1);

        server.stop().await;
    }
}

/// CLIENT CRATE AGAINST THE REAL SERVER
mod client_tests {
    use super::*;

    fn client_config(addr: SocketAddr, name: &str) -> ClientConfig {
        ClientConfig {
            server: addr.to_string(),
            name: name.to_string(),
            auto_respawn: true,
        }
    }

    async fn step_until<I, F>(client: &mut SnakeClient<I>, mut done: F)
    where
        I: client::input::InputSource,
        F: FnMut(&SnakeClient<I>) -> bool,
    {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            assert!(client.step(), "client disconnected");
            if done(client) {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn bot_joins_and_spawns() {
        let server = RunningServer::start(test_config()).await;
        let mut bot = SnakeClient::connect(client_config(server.addr, "bot"), Wanderer::new(3))
            .await
            .unwrap();

        step_until(&mut bot, |c| c.game().is_alive()).await;
        let game = bot.game();
        assert_eq!(game.own_id(), Some(1));
        assert_eq!(game.tick_frequency(), 20);
        assert_eq!(game.lobby().unwrap().title, "Snake Arena");
        let board = game.board().unwrap();
        assert_eq!((board.width(), board.height()), (64, 64));
        assert_eq!(game.player(1).unwrap().name, "bot");

        bot.leave();
        assert!(!bot.step());
        server.stop().await;
    }

    /// More chat than fits in one packet arrives complete and in order
    #[tokio::test]
    async fn chat_batches_across_packets() {
        let server = RunningServer::start(test_config()).await;
        let mut talker = SnakeClient::connect(
            client_config(server.addr, "talker"),
            ScriptedInput::default(),
        )
        .await
        .unwrap();
        let mut listener = SnakeClient::connect(
            client_config(server.addr, "listener"),
            ScriptedInput::default(),
        )
        .await
        .unwrap();

        step_until(&mut talker, |c| c.game().board().is_some()).await;
        step_until(&mut listener, |c| c.game().board().is_some()).await;

        let sent: Vec<String> = (0..12).map(|i| format!("{:02}{}", i, "x".repeat(200))).collect();
        for line in &sent {
            talker.send_chat(line.clone()).unwrap();
        }

        let deadline = Instant::now() + WAIT;
        let mut received = Vec::new();
        while Instant::now() < deadline && received.len() < sent.len() {
            talker.step();
            listener.step();
            received = listener
                .game()
                .chat()
                .map(|line| line.message.clone())
                .collect();
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(received, sent);

        server.stop().await;
    }

    /// A snapshot resent after a departure leaves only connected players
    #[test]
    fn resync_drops_departed_players() {
        use client::game::ClientGame;
        use server::session::{SessionManager, SyncSettings};
        use server::simulation::{EventKind, Simulation};

        let mut sim = Simulation::new(100);
        sim.start(|ctx| {
            ctx.push(EventKind::BoardReset {
                width: 8,
                height: 8,
            })
        })
        .unwrap();
        let mut manager = SessionManager::new(SyncSettings {
            tick_frequency: 20,
            respawn_delay: 5,
            max_backlog_bytes: 64 * 1024,
        });
        let mut game = ClientGame::new();
        let deliver = |manager: &mut SessionManager, game: &mut ClientGame| {
            while let Some(packet) = manager.build_packet(1, 0) {
                read_packet::<ServerToClient, _>(&packet, |kind, reader| {
                    game.apply(&ServerMessage::decode(kind, reader)?);
                    Ok(())
                })
                .unwrap();
            }
        };

        for (id, name) in [(1, "ada"), (2, "bob")] {
            manager.connect(id);
            manager.handshake(id, name, HostInfo::current("test"), 0);
            manager.full_update(id, &sim);
        }
        deliver(&mut manager, &mut game);
        assert_eq!(game.players().keys().copied().collect::<Vec<_>>(), vec![1, 2]);

        manager.disconnect(2);
        manager.full_update(1, &sim);
        deliver(&mut manager, &mut game);
        assert_eq!(game.players().keys().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(game.player(1).unwrap().name, "ada");
    }
}
