//! Transport-independent game host
//!
//! The host is the single writer of all game and session state. The server
//! loop feeds it connection events and raw packets, calls [`GameHost::tick`]
//! at the configured rate and writes the returned packets to the transport.
//! Player actions received between ticks are buffered and applied inside the
//! next simulation step so every resulting event carries that step's tick.

use crate::config::{ConfigError, ServerConfig};
use crate::game::{ArenaMode, GameMode};
use crate::session::{SessionManager, SyncSettings};
use crate::simulation::{Simulation, SimulationError};
use log::{debug, error, info, warn};
use shared::messages::LobbyInformation;
use shared::{
    read_packet, ClientMessage, ClientToServer, Direction, HostInfo, PacketReport, ProtocolError,
};
use thiserror::Error;

const AGENT: &str = concat!("snake-server/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayerAction {
    Input(u8, Direction),
    Respawn(u8),
    Remove(u8),
}

pub struct GameHost<M: GameMode> {
    config: ServerConfig,
    mode: M,
    simulation: Simulation,
    sessions: SessionManager,
    pending: Vec<PlayerAction>,
    closing: Vec<u8>,
}

impl GameHost<ArenaMode> {
    /// Arena host seeded from the config, or from entropy when no seed is set
    pub fn from_config(config: ServerConfig) -> Result<Self, HostError> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(rand::random);
        info!("Arena seed {}", seed);
        let mode = ArenaMode::new(config.rules.clone(), seed);
        Self::new(config, mode)
    }
}

impl<M: GameMode> GameHost<M> {
    pub fn new(config: ServerConfig, mut mode: M) -> Result<Self, HostError> {
        config.validate()?;
        let mut simulation = Simulation::new(config.sim_past_size);
        simulation.start(|ctx| mode.start(ctx))?;
        let sessions = SessionManager::new(SyncSettings {
            tick_frequency: config.tick_rate,
            respawn_delay: mode.respawn_delay(),
            max_backlog_bytes: config.max_backlog_bytes,
        });

        Ok(Self {
            config,
            mode,
            simulation,
            sessions,
            pending: Vec::new(),
            closing: Vec::new(),
        })
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn on_connect(&mut self, id: u8) {
        debug!("Connection {} opened", id);
        self.sessions.connect(id);
    }

    /// Tears down the session and schedules removal of the player's snake
    pub fn on_disconnect(&mut self, id: u8) {
        if self.sessions.disconnect(id).is_some() {
            self.pending.push(PlayerAction::Remove(id));
        }
    }

    /// Connections the host wants the transport to close
    pub fn take_closing(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.closing)
    }

    /// Parses one inbound packet and handles every message in it
    pub fn handle_packet(&mut self, id: u8, bytes: &[u8]) -> Result<PacketReport, ProtocolError> {
        let mut messages = Vec::new();
        let report = read_packet::<ClientToServer, _>(bytes, |kind, reader| {
            messages.push(ClientMessage::decode(kind, reader)?);
            Ok(())
        })?;

        if !report.is_clean() {
            warn!(
                "Packet from connection {} had {} malformed groups",
                id,
                report.errors.len()
            );
        }
        self.sessions.acknowledge(id, report.header.stamp);

        for message in messages {
            self.handle_message(id, message);
        }
        Ok(report)
    }

    fn handle_message(&mut self, id: u8, message: ClientMessage) {
        match message {
            ClientMessage::RequestLobbyInfo(_) => {
                let lobby = LobbyInformation {
                    player_count: self.sessions.session_count().min(u8::MAX as usize) as u8,
                    title: self.config.title.clone(),
                    description: self.config.description.clone(),
                    host_info: HostInfo::current(AGENT),
                };
                self.sessions.send(id, &lobby);
            }
            ClientMessage::Connecting(connecting) => {
                self.sessions.handshake(
                    id,
                    &connecting.name,
                    connecting.host_info,
                    self.simulation.current_tick(),
                );
            }
            other => {
                if self.sessions.session(id).is_none() {
                    debug!(
                        "{:?} from connection {} before handshake ignored",
                        other.kind(),
                        id
                    );
                    return;
                }
                self.handle_session_message(id, other);
            }
        }
    }

    fn handle_session_message(&mut self, id: u8, message: ClientMessage) {
        match message {
            ClientMessage::Disconnecting(_) => {
                info!("Player {} is leaving", id);
                self.on_disconnect(id);
                self.closing.push(id);
            }
            ClientMessage::FullUpdate(_) => {
                self.sessions.full_update(id, &self.simulation);
            }
            ClientMessage::PlayerInput(input) => {
                self.pending.push(PlayerAction::Input(id, input.direction));
            }
            ClientMessage::RequestRespawn(_) => {
                if self.sessions.may_respawn(id) {
                    self.pending.push(PlayerAction::Respawn(id));
                } else {
                    debug!("Player {} asked to respawn too early", id);
                }
            }
            ClientMessage::SendChatMessage(chat) => {
                self.sessions.chat(id, chat.message);
            }
            ClientMessage::ChangeName(change) => {
                self.sessions.rename(id, change.name);
            }
            ClientMessage::RequestLobbyInfo(_) | ClientMessage::Connecting(_) => {}
        }
    }

    /// Advances the game one tick and returns the packets to send
    pub fn tick(&mut self) -> Vec<(u8, Vec<u8>)> {
        let actions = std::mem::take(&mut self.pending);
        let mode = &mut self.mode;
        let mut failed_respawns = Vec::new();

        let result = self.simulation.simulate(|ctx| {
            for action in actions {
                match action {
                    PlayerAction::Input(id, direction) => mode.receive_input(ctx, id, direction),
                    PlayerAction::Respawn(id) => {
                        if !mode.spawn_player(ctx, id) {
                            failed_respawns.push(id);
                        }
                    }
                    PlayerAction::Remove(id) => mode.remove_player(ctx, id),
                }
            }
            mode.update(ctx);
        });
        if let Err(e) = result {
            error!("Simulation step failed: {}", e);
            return Vec::new();
        }

        for id in failed_respawns {
            self.sessions.respawn_failed(id);
        }
        self.sessions.sync(&self.simulation);
        self.sessions.build_packets(self.simulation.current_tick())
    }
}
