//! Per-connection sync state
//!
//! Every transport connection gets a [`Peer`] with its own outbound
//! [`PacketSerializer`]. Once the client completes the `Connecting`
//! handshake the peer also carries a [`Session`]. A session stays unsynced
//! until the client asks for a `FullUpdate`; from then on it receives the
//! simulation's events as deltas every tick. A session that cannot be caught
//! up with deltas is sent a fresh snapshot instead.

use crate::simulation::{EventKind, HistoryGap, Simulation, TickEvent};
use log::{debug, info, warn};
use shared::messages::{
    AssignPlayerId, BoardReset, BoardSet, ChatMessageSent, GameConfig, PlayerConnected,
    PlayerDied, PlayerDisconnected, PlayerMoved, PlayerRenamed, PlayerSpawned, RespawnAllowed,
};
use shared::{
    HostInfo, NetMessage, PacketSerializer, ProtocolError, ServerMessage, ServerToClient, Tile,
    TileType,
};
use std::collections::BTreeMap;

/// Kinds describing game state, replaced wholesale by a snapshot
const SNAPSHOT_KINDS: [ServerToClient; 8] = [
    ServerToClient::BoardReset,
    ServerToClient::BoardSet,
    ServerToClient::PlayerConnected,
    ServerToClient::PlayerDisconnected,
    ServerToClient::PlayerSpawned,
    ServerToClient::PlayerDied,
    ServerToClient::PlayerMoved,
    ServerToClient::PlayerRenamed,
];

#[derive(Debug, Clone)]
pub struct Session {
    pub name: String,
    pub host_info: HostInfo,
    /// Last tick whose events were queued for this client
    pub last_tick: u32,
    pub is_synced: bool,
    /// Tick from which the player may respawn, `None` while alive
    pub respawn_at: Option<u32>,
    pub respawn_offered: bool,
    /// `GameConfig` goes out in the packet after `AssignPlayerId`
    config_pending: bool,
}

#[derive(Debug)]
pub struct Peer {
    pub id: u8,
    pub serializer: PacketSerializer<ServerToClient>,
    pub session: Option<Session>,
    /// Bytes of the last snapshot not yet handed to the transport
    snapshot_remaining: usize,
}

impl Peer {
    fn new(id: u8) -> Self {
        Self {
            id,
            serializer: PacketSerializer::new(),
            session: None,
            snapshot_remaining: 0,
        }
    }

    fn queue<M: NetMessage<Kind = ServerToClient>>(&mut self, message: &M) {
        if let Err(e) = self.serializer.queue(message) {
            warn!("Dropping message for connection {}: {}", self.id, e);
        }
    }

    fn is_synced(&self) -> bool {
        self.session.as_ref().map_or(false, |s| s.is_synced)
    }

    fn build(&mut self, tick: u32, tick_frequency: u8) -> Option<Vec<u8>> {
        self.serializer.set_stamp(tick as u8);
        let before = self.serializer.pending_bytes();
        let packet = self.serializer.build();
        let sent = before - self.serializer.pending_bytes();
        self.snapshot_remaining = self.snapshot_remaining.saturating_sub(sent);
        let config_due = self
            .session
            .as_mut()
            .map_or(false, |s| std::mem::take(&mut s.config_pending));
        if config_due {
            self.queue(&GameConfig { tick_frequency });
        }
        if !self.serializer.is_empty() {
            debug!(
                "Connection {} backlog: {} messages, {} bytes",
                self.id,
                self.serializer.pending_messages(),
                self.serializer.pending_bytes()
            );
        }
        packet
    }
}

/// Settings the session manager needs from the server config
#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    pub tick_frequency: u8,
    pub respawn_delay: u16,
    pub max_backlog_bytes: usize,
}

pub struct SessionManager {
    peers: BTreeMap<u8, Peer>,
    settings: SyncSettings,
}

impl SessionManager {
    pub fn new(settings: SyncSettings) -> Self {
        Self {
            peers: BTreeMap::new(),
            settings,
        }
    }

    pub fn connect(&mut self, id: u8) {
        if self.peers.insert(id, Peer::new(id)).is_some() {
            warn!("Connection {} replaced an existing peer", id);
        }
    }

    /// Forgets a connection; returns its session if it had completed the handshake
    pub fn disconnect(&mut self, id: u8) -> Option<Session> {
        let session = self.peers.remove(&id)?.session?;
        info!("Player {} ({}) left", id, session.name);
        self.broadcast_synced(&PlayerDisconnected { player_id: id });
        Some(session)
    }

    pub fn peer(&self, id: u8) -> Option<&Peer> {
        self.peers.get(&id)
    }

    pub fn session(&self, id: u8) -> Option<&Session> {
        self.peers.get(&id)?.session.as_ref()
    }

    pub fn session_count(&self) -> usize {
        self.peers.values().filter(|p| p.session.is_some()).count()
    }

    pub fn peer_ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.peers.keys().copied()
    }

    pub fn acknowledge(&mut self, id: u8, stamp: u8) {
        if let Some(peer) = self.peers.get_mut(&id) {
            peer.serializer.acknowledge(stamp);
        }
    }

    pub fn send<M: NetMessage<Kind = ServerToClient>>(&mut self, id: u8, message: &M) {
        if let Some(peer) = self.peers.get_mut(&id) {
            peer.queue(message);
        }
    }

    pub fn send_message(&mut self, id: u8, message: &ServerMessage) -> Result<(), ProtocolError> {
        match self.peers.get_mut(&id) {
            Some(peer) => message.queue_on(&mut peer.serializer),
            None => Ok(()),
        }
    }

    /// Queues a message for every connection that completed the handshake
    pub fn broadcast<M: NetMessage<Kind = ServerToClient>>(&mut self, message: &M) {
        for peer in self.peers.values_mut().filter(|p| p.session.is_some()) {
            peer.queue(message);
        }
    }

    fn broadcast_synced<M: NetMessage<Kind = ServerToClient>>(&mut self, message: &M) {
        for peer in self.peers.values_mut().filter(|p| p.is_synced()) {
            peer.queue(message);
        }
    }

    /// Completes the `Connecting` handshake.
    ///
    /// Returns false for unknown connections and repeated handshakes, which
    /// are ignored.
    pub fn handshake(&mut self, id: u8, name: &str, host_info: HostInfo, current_tick: u32) -> bool {
        let Some(peer) = self.peers.get_mut(&id) else {
            return false;
        };
        if peer.session.is_some() {
            debug!("Duplicate handshake from connection {} ignored", id);
            return false;
        }

        let name = if name.trim().is_empty() {
            format!("Player {}", id)
        } else {
            name.to_string()
        };
        info!(
            "Player {} joined as {} ({} {}.{})",
            id, name, host_info.agent, host_info.version_major, host_info.version_minor
        );

        peer.queue(&AssignPlayerId { player_id: id });
        peer.session = Some(Session {
            name: name.clone(),
            host_info,
            last_tick: current_tick,
            is_synced: false,
            respawn_at: Some(current_tick),
            respawn_offered: false,
            config_pending: true,
        });

        self.broadcast_synced(&PlayerConnected {
            player_id: id,
            name,
        });
        true
    }

    pub fn rename(&mut self, id: u8, name: String) {
        let Some(session) = self.peers.get_mut(&id).and_then(|p| p.session.as_mut()) else {
            return;
        };
        info!("Player {} renamed {} -> {}", id, session.name, name);
        session.name = name.clone();
        self.broadcast_synced(&PlayerRenamed {
            player_id: id,
            name,
        });
    }

    pub fn chat(&mut self, id: u8, message: String) {
        if self.session(id).is_none() {
            return;
        }
        self.broadcast(&ChatMessageSent {
            player_id: id,
            message,
        });
    }

    /// Queues a complete snapshot for `id` and marks it synced.
    ///
    /// Stale state messages still queued for the connection are dropped
    /// first so they cannot land on top of the fresh board.
    pub fn full_update(&mut self, id: u8, simulation: &Simulation) {
        let roster: Vec<PlayerConnected> = self
            .peers
            .values()
            .filter_map(|p| {
                p.session.as_ref().map(|s| PlayerConnected {
                    player_id: p.id,
                    name: s.name.clone(),
                })
            })
            .collect();

        let Some(peer) = self.peers.get_mut(&id) else {
            return;
        };
        if peer.session.is_none() {
            debug!("FullUpdate before handshake from connection {} ignored", id);
            return;
        }

        for kind in SNAPSHOT_KINDS {
            peer.serializer.clear_kind(kind);
        }

        let state = simulation.state();
        peer.queue(&BoardReset {
            width: state.board.width(),
            height: state.board.height(),
        });
        for (x, y, tile) in state.board.non_empty_cells() {
            peer.queue(&BoardSet { x, y, tile });
        }
        for player in &roster {
            peer.queue(player);
        }
        for snake in state.snakes.values() {
            let (x, y) = snake.head();
            peer.queue(&PlayerSpawned {
                player_id: snake.player_id,
                x,
                y,
            });
        }

        if let Some(session) = peer.session.as_mut() {
            session.is_synced = true;
            session.last_tick = simulation.current_tick();
        }
        peer.snapshot_remaining = peer.serializer.pending_bytes();
        debug!(
            "Queued snapshot for {}: {} messages, {} bytes",
            id,
            peer.serializer.pending_messages(),
            peer.serializer.pending_bytes()
        );
    }

    /// Brings every synced session up to the simulation's current tick.
    pub fn sync(&mut self, simulation: &Simulation) {
        let current_tick = simulation.current_tick();
        self.track_respawns(simulation);

        let mut resync = Vec::new();
        for peer in self.peers.values_mut() {
            let Some(session) = peer.session.as_mut().filter(|s| s.is_synced) else {
                continue;
            };

            match simulation.events_since(session.last_tick) {
                Ok(events) => {
                    for event in events {
                        queue_event(&mut peer.serializer, event, self.settings.respawn_delay);
                    }
                    session.last_tick = current_tick;
                }
                Err(HistoryGap {
                    requested,
                    oldest_retained,
                }) => {
                    warn!(
                        "Player {} is at tick {} but history starts at {}, resending snapshot",
                        peer.id, requested, oldest_retained
                    );
                    resync.push(peer.id);
                    continue;
                }
            }

            // a snapshot still being sent is not a backlog
            if peer.snapshot_remaining == 0
                && peer.serializer.pending_bytes() > self.settings.max_backlog_bytes
            {
                warn!(
                    "Player {} has {} bytes queued, resending snapshot",
                    peer.id,
                    peer.serializer.pending_bytes()
                );
                resync.push(peer.id);
            }
        }

        for id in resync {
            self.full_update(id, simulation);
        }

        self.offer_respawns(simulation);
    }

    fn track_respawns(&mut self, simulation: &Simulation) {
        let current_tick = simulation.current_tick();
        let Ok(events) = simulation.events_since(current_tick.saturating_sub(1)) else {
            return;
        };
        for event in events {
            let (player_id, respawn_at) = match event.kind {
                EventKind::SnakeSpawn { player_id, .. } => (player_id, None),
                EventKind::SnakeKill { player_id } => (
                    player_id,
                    Some(event.tick + self.settings.respawn_delay as u32),
                ),
                _ => continue,
            };
            if let Some(session) = self.peers.get_mut(&player_id).and_then(|p| p.session.as_mut())
            {
                session.respawn_at = respawn_at;
                session.respawn_offered = false;
            }
        }
    }

    fn offer_respawns(&mut self, simulation: &Simulation) {
        let current_tick = simulation.current_tick();
        for peer in self.peers.values_mut() {
            let id = peer.id;
            let Some(session) = peer.session.as_mut() else {
                continue;
            };
            let ready = session.is_synced
                && !session.respawn_offered
                && session.respawn_at.map_or(false, |at| at <= current_tick)
                && simulation.state().snake(id).is_none();
            if ready {
                session.respawn_offered = true;
                peer.queue(&RespawnAllowed);
            }
        }
    }

    /// Whether `id` has been offered a respawn it has not used yet
    pub fn may_respawn(&self, id: u8) -> bool {
        self.session(id).map_or(false, |s| s.respawn_offered)
    }

    /// Re-offers a respawn that could not be placed
    pub fn respawn_failed(&mut self, id: u8) {
        if let Some(session) = self.peers.get_mut(&id).and_then(|p| p.session.as_mut()) {
            session.respawn_offered = false;
        }
    }

    /// Builds at most one packet per connection, stamped with `tick`
    pub fn build_packets(&mut self, tick: u32) -> Vec<(u8, Vec<u8>)> {
        let tick_frequency = self.settings.tick_frequency;
        self.peers
            .values_mut()
            .filter_map(|peer| peer.build(tick, tick_frequency).map(|p| (peer.id, p)))
            .collect()
    }

    pub fn build_packet(&mut self, id: u8, tick: u32) -> Option<Vec<u8>> {
        let tick_frequency = self.settings.tick_frequency;
        self.peers.get_mut(&id)?.build(tick, tick_frequency)
    }
}

/// Translates one simulation event into the messages a client needs
fn queue_event(serializer: &mut PacketSerializer<ServerToClient>, event: &TickEvent, respawn_delay: u16) {
    let result = match &event.kind {
        EventKind::BoardReset { width, height } => serializer.queue(&BoardReset {
            width: *width,
            height: *height,
        }),
        EventKind::BoardSet { x, y, tile } => serializer.queue(&BoardSet {
            x: *x,
            y: *y,
            tile: *tile,
        }),
        EventKind::SnakeSpawn {
            player_id,
            head,
            tail,
            ..
        } => serializer
            .queue(&PlayerSpawned {
                player_id: *player_id,
                x: head.0,
                y: head.1,
            })
            .and_then(|_| {
                serializer.queue(&BoardSet {
                    x: head.0,
                    y: head.1,
                    tile: Tile::new(TileType::SnakeHead, *player_id),
                })
            })
            .and_then(|_| {
                serializer.queue(&BoardSet {
                    x: tail.0,
                    y: tail.1,
                    tile: Tile::new(TileType::SnakeBody, *player_id),
                })
            }),
        EventKind::SnakeMove {
            player_id,
            head,
            grew,
            ..
        } => serializer.queue(&PlayerMoved {
            player_id: *player_id,
            x: head.0,
            y: head.1,
            grew: *grew,
        }),
        EventKind::SnakeKill { player_id } => serializer.queue(&PlayerDied {
            player_id: *player_id,
            respawn_delay,
        }),
        EventKind::SnakeInput { .. } => Ok(()),
    };
    if let Err(e) = result {
        warn!("Failed to queue event from tick {}: {}", event.tick, e);
    }
}
