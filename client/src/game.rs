//! Client-side mirror of the server's board
//!
//! The client never simulates. It applies the messages the server sends
//! in the order they arrive and keeps just enough bookkeeping (player
//! roster, snake heads, own id) for input decisions and rendering.
//! Messages that don't fit the current view are logged and skipped.

use log::{debug, info, warn};
use shared::messages::{HostInfo, LobbyInformation};
use shared::{Board, ServerMessage, DEFAULT_TICK_RATE};
use std::collections::{BTreeMap, VecDeque};

/// Chat lines kept for display
pub const CHAT_HISTORY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerView {
    pub name: String,
    /// Head cell while the snake is alive
    pub head: Option<(u8, u8)>,
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub player_id: u8,
    pub message: String,
}

#[derive(Debug)]
pub struct ClientGame {
    own_id: Option<u8>,
    tick_frequency: u8,
    board: Option<Board>,
    players: BTreeMap<u8, PlayerView>,
    lobby: Option<LobbyInformation>,
    chat: VecDeque<ChatLine>,
    respawn_allowed: bool,
}

impl Default for ClientGame {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientGame {
    pub fn new() -> Self {
        Self {
            own_id: None,
            tick_frequency: DEFAULT_TICK_RATE,
            board: None,
            players: BTreeMap::new(),
            lobby: None,
            chat: VecDeque::new(),
            respawn_allowed: false,
        }
    }

    pub fn own_id(&self) -> Option<u8> {
        self.own_id
    }

    pub fn tick_frequency(&self) -> u8 {
        self.tick_frequency
    }

    pub fn board(&self) -> Option<&Board> {
        self.board.as_ref()
    }

    pub fn players(&self) -> &BTreeMap<u8, PlayerView> {
        &self.players
    }

    pub fn player(&self, id: u8) -> Option<&PlayerView> {
        self.players.get(&id)
    }

    pub fn lobby(&self) -> Option<&LobbyInformation> {
        self.lobby.as_ref()
    }

    pub fn server_info(&self) -> Option<&HostInfo> {
        self.lobby.as_ref().map(|lobby| &lobby.host_info)
    }

    pub fn chat(&self) -> impl Iterator<Item = &ChatLine> {
        self.chat.iter()
    }

    /// Head of our own snake, if it is alive
    pub fn own_head(&self) -> Option<(u8, u8)> {
        self.own_id
            .and_then(|id| self.players.get(&id))
            .and_then(|player| player.head)
    }

    pub fn is_alive(&self) -> bool {
        self.own_head().is_some()
    }

    pub fn respawn_allowed(&self) -> bool {
        self.respawn_allowed
    }

    /// Called once a respawn request has been queued
    pub fn clear_respawn_allowed(&mut self) {
        self.respawn_allowed = false;
    }

    pub fn apply(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::LobbyInformation(lobby) => {
                info!(
                    "Server \"{}\" ({} players, {} v{}.{})",
                    lobby.title,
                    lobby.player_count,
                    lobby.host_info.agent,
                    lobby.host_info.version_major,
                    lobby.host_info.version_minor
                );
                self.lobby = Some(lobby.clone());
            }
            ServerMessage::GameConfig(config) => {
                if config.tick_frequency == 0 {
                    warn!("Ignoring game config with zero tick frequency");
                } else {
                    self.tick_frequency = config.tick_frequency;
                }
            }
            ServerMessage::AssignPlayerId(assign) => {
                info!("Assigned player id {}", assign.player_id);
                self.own_id = Some(assign.player_id);
            }
            ServerMessage::BoardReset(reset) => {
                debug!("Board reset to {}x{}", reset.width, reset.height);
                self.board = Some(Board::new(reset.width, reset.height));
                // the roster follows every reset
                self.players.clear();
            }
            ServerMessage::BoardSet(set) => match self.board.as_mut() {
                Some(board) => {
                    if !board.set(set.x, set.y, set.tile) {
                        warn!("Board update outside the board at ({}, {})", set.x, set.y);
                    }
                }
                None => warn!("Board update before board reset"),
            },
            ServerMessage::PlayerConnected(connected) => {
                let player = self.players.entry(connected.player_id).or_insert(PlayerView {
                    name: String::new(),
                    head: None,
                    length: 0,
                });
                player.name = connected.name.clone();
            }
            ServerMessage::PlayerDisconnected(disconnected) => {
                if let Some(player) = self.players.remove(&disconnected.player_id) {
                    info!("{} left", player.name);
                }
            }
            ServerMessage::PlayerSpawned(spawned) => match self.players.get_mut(&spawned.player_id) {
                Some(player) => {
                    player.head = Some((spawned.x, spawned.y));
                    player.length = 2;
                }
                None => debug!("Spawn for unknown player {}", spawned.player_id),
            },
            ServerMessage::PlayerMoved(moved) => match self.players.get_mut(&moved.player_id) {
                Some(player) => {
                    player.head = Some((moved.x, moved.y));
                    if moved.grew {
                        player.length += 1;
                    }
                }
                None => debug!("Move for unknown player {}", moved.player_id),
            },
            ServerMessage::PlayerDied(died) => {
                if let Some(player) = self.players.get_mut(&died.player_id) {
                    player.head = None;
                    player.length = 0;
                }
                if Some(died.player_id) == self.own_id {
                    info!("You died, respawn in {} ticks", died.respawn_delay);
                }
            }
            ServerMessage::RespawnAllowed(_) => {
                self.respawn_allowed = true;
            }
            ServerMessage::ChatMessageSent(chat) => {
                info!("<{}> {}", self.display_name(chat.player_id), chat.message);
                if self.chat.len() == CHAT_HISTORY {
                    self.chat.pop_front();
                }
                self.chat.push_back(ChatLine {
                    player_id: chat.player_id,
                    message: chat.message.clone(),
                });
            }
            ServerMessage::PlayerRenamed(renamed) => match self.players.get_mut(&renamed.player_id) {
                Some(player) => player.name = renamed.name.clone(),
                None => debug!("Rename for unknown player {}", renamed.player_id),
            },
        }
    }

    pub fn display_name(&self, id: u8) -> String {
        match self.players.get(&id) {
            Some(player) if !player.name.is_empty() => player.name.clone(),
            _ => format!("player {}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::messages::*;
    use shared::{Tile, TileType};

    fn connected(id: u8, name: &str) -> ServerMessage {
        ServerMessage::PlayerConnected(PlayerConnected {
            player_id: id,
            name: name.to_string(),
        })
    }

    #[test]
    fn test_handshake_messages() {
        let mut game = ClientGame::new();
        assert_eq!(game.tick_frequency(), DEFAULT_TICK_RATE);

        game.apply(&ServerMessage::AssignPlayerId(AssignPlayerId { player_id: 3 }));
        game.apply(&ServerMessage::GameConfig(GameConfig { tick_frequency: 30 }));
        assert_eq!(game.own_id(), Some(3));
        assert_eq!(game.tick_frequency(), 30);

        game.apply(&ServerMessage::GameConfig(GameConfig { tick_frequency: 0 }));
        assert_eq!(game.tick_frequency(), 30);
    }

    #[test]
    fn test_board_mirror() {
        let mut game = ClientGame::new();
        game.apply(&ServerMessage::BoardSet(BoardSet {
            x: 0,
            y: 0,
            tile: Tile::unowned(TileType::Food),
        }));
        assert!(game.board().is_none());

        game.apply(&ServerMessage::BoardReset(BoardReset { width: 8, height: 4 }));
        game.apply(&ServerMessage::BoardSet(BoardSet {
            x: 2,
            y: 3,
            tile: Tile::unowned(TileType::Wall),
        }));
        game.apply(&ServerMessage::BoardSet(BoardSet {
            x: 9,
            y: 0,
            tile: Tile::unowned(TileType::Wall),
        }));

        let board = game.board().unwrap();
        assert_eq!((board.width(), board.height()), (8, 4));
        assert_eq!(board.get(2, 3).unwrap().tile_type, TileType::Wall);
        assert_eq!(board.count(TileType::Wall), 1);
    }

    #[test]
    fn test_player_lifecycle() {
        let mut game = ClientGame::new();
        game.apply(&ServerMessage::AssignPlayerId(AssignPlayerId { player_id: 1 }));
        game.apply(&connected(1, "ada"));
        game.apply(&connected(2, "bob"));
        assert!(!game.is_alive());

        game.apply(&ServerMessage::PlayerSpawned(PlayerSpawned {
            player_id: 1,
            x: 4,
            y: 4,
        }));
        game.apply(&ServerMessage::PlayerMoved(PlayerMoved {
            player_id: 1,
            x: 5,
            y: 4,
            grew: true,
        }));
        assert_eq!(game.own_head(), Some((5, 4)));
        assert_eq!(game.player(1).unwrap().length, 3);

        game.apply(&ServerMessage::PlayerRenamed(PlayerRenamed {
            player_id: 2,
            name: "bobby".to_string(),
        }));
        assert_eq!(game.display_name(2), "bobby");

        game.apply(&ServerMessage::PlayerDied(PlayerDied {
            player_id: 1,
            respawn_delay: 40,
        }));
        assert!(!game.is_alive());

        game.apply(&ServerMessage::PlayerDisconnected(PlayerDisconnected { player_id: 2 }));
        assert!(game.player(2).is_none());
        assert_eq!(game.display_name(2), "player 2");
    }

    #[test]
    fn test_unknown_player_updates_ignored() {
        let mut game = ClientGame::new();
        game.apply(&ServerMessage::PlayerMoved(PlayerMoved {
            player_id: 9,
            x: 1,
            y: 1,
            grew: false,
        }));
        game.apply(&ServerMessage::PlayerSpawned(PlayerSpawned {
            player_id: 9,
            x: 1,
            y: 1,
        }));
        assert!(game.players().is_empty());
    }

    #[test]
    fn test_board_reset_replaces_roster() {
        let mut game = ClientGame::new();
        game.apply(&connected(1, "ada"));
        game.apply(&connected(2, "bob"));
        game.apply(&ServerMessage::PlayerSpawned(PlayerSpawned {
            player_id: 1,
            x: 0,
            y: 0,
        }));

        // bob left while the snapshot was being rebuilt
        game.apply(&ServerMessage::BoardReset(BoardReset { width: 4, height: 4 }));
        game.apply(&connected(1, "ada"));
        assert!(game.player(2).is_none());
        assert_eq!(game.player(1).unwrap().head, None);
        assert_eq!(game.players().len(), 1);
    }

    #[test]
    fn test_respawn_flag_and_chat_history() {
        let mut game = ClientGame::new();
        game.apply(&ServerMessage::RespawnAllowed(RespawnAllowed));
        assert!(game.respawn_allowed());
        game.clear_respawn_allowed();
        assert!(!game.respawn_allowed());

        for i in 0..(CHAT_HISTORY + 4) {
            game.apply(&ServerMessage::ChatMessageSent(ChatMessageSent {
                player_id: 1,
                message: format!("line {}", i),
            }));
        }
        let lines: Vec<_> = game.chat().collect();
        assert_eq!(lines.len(), CHAT_HISTORY);
        assert_eq!(lines[0].message, "line 4");
    }
}
