//! Message catalog
//!
//! Every message is a plain record with a byte-exact `serialize` /
//! `deserialize` pair. The one-byte tag of a message is its [`MessageKind`],
//! which is also the batching key used by [`crate::protocol`].

use crate::board::Tile;
use crate::codec::{CodecError, ReadMessage, WriteMessage};
use crate::protocol::{PacketSerializer, ProtocolError};
use std::fmt::Debug;

pub const PROTOCOL_VERSION_MAJOR: u8 = 1;
pub const PROTOCOL_VERSION_MINOR: u8 = 0;

/// A closed set of message tags for one direction of traffic
///
/// `ALL` lists the kinds in declaration order; that order is also the
/// order in which groups are written into a packet.
pub trait MessageKind: Copy + Eq + Debug + 'static {
    const ALL: &'static [Self];

    fn tag(self) -> u8;

    fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.tag() == tag)
    }

    /// Position in `ALL`, used to index per-kind queues
    fn ordinal(self) -> usize {
        Self::ALL
            .iter()
            .position(|kind| *kind == self)
            .unwrap_or_default()
    }
}

/// Tags of messages sent by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServerToClient {
    LobbyInformation = 0,
    GameConfig = 1,
    AssignPlayerId = 2,
    BoardReset = 3,
    BoardSet = 4,
    PlayerConnected = 5,
    PlayerDisconnected = 6,
    PlayerSpawned = 7,
    PlayerDied = 8,
    PlayerMoved = 9,
    RespawnAllowed = 10,
    ChatMessageSent = 11,
    PlayerRenamed = 12,
}

impl MessageKind for ServerToClient {
    const ALL: &'static [Self] = &[
        ServerToClient::LobbyInformation,
        ServerToClient::GameConfig,
        ServerToClient::AssignPlayerId,
        ServerToClient::BoardReset,
        ServerToClient::BoardSet,
        ServerToClient::PlayerConnected,
        ServerToClient::PlayerDisconnected,
        ServerToClient::PlayerSpawned,
        ServerToClient::PlayerDied,
        ServerToClient::PlayerMoved,
        ServerToClient::RespawnAllowed,
        ServerToClient::ChatMessageSent,
        ServerToClient::PlayerRenamed,
    ];

    fn tag(self) -> u8 {
        self as u8
    }

    fn ordinal(self) -> usize {
        self as usize
    }
}

/// Tags of messages sent by clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClientToServer {
    RequestLobbyInfo = 0,
    Connecting = 1,
    Disconnecting = 2,
    FullUpdate = 3,
    PlayerInput = 4,
    RequestRespawn = 5,
    SendChatMessage = 6,
    ChangeName = 7,
}

impl MessageKind for ClientToServer {
    const ALL: &'static [Self] = &[
        ClientToServer::RequestLobbyInfo,
        ClientToServer::Connecting,
        ClientToServer::Disconnecting,
        ClientToServer::FullUpdate,
        ClientToServer::PlayerInput,
        ClientToServer::RequestRespawn,
        ClientToServer::SendChatMessage,
        ClientToServer::ChangeName,
    ];

    fn tag(self) -> u8 {
        self as u8
    }

    fn ordinal(self) -> usize {
        self as usize
    }
}

/// A typed message with a fixed wire contract
pub trait NetMessage: Sized {
    type Kind: MessageKind;
    const KIND: Self::Kind;

    fn serialize(&self, writer: &mut WriteMessage) -> Result<(), CodecError>;
    fn deserialize(reader: &mut ReadMessage) -> Result<Self, CodecError>;

    fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut writer = WriteMessage::new();
        self.serialize(&mut writer)?;
        Ok(writer.into_bytes())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    Up = 0,
    Right = 1,
    Down = 2,
    Left = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Right,
        Direction::Down,
        Direction::Left,
    ];

    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or(CodecError::InvalidValue {
                what: "direction",
                value,
            })
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Right => Direction::Left,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
        }
    }

    /// Unit step; y grows downwards
    pub fn delta(self) -> (i16, i16) {
        match self {
            Direction::Up => (0, -1),
            Direction::Right => (1, 0),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
        }
    }
}

/// Version and agent string a peer reports about itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub version_major: u8,
    pub version_minor: u8,
    pub agent: String,
}

impl HostInfo {
    pub fn current(agent: impl Into<String>) -> Self {
        Self {
            version_major: PROTOCOL_VERSION_MAJOR,
            version_minor: PROTOCOL_VERSION_MINOR,
            agent: agent.into(),
        }
    }

    pub fn write(&self, writer: &mut WriteMessage) -> Result<(), CodecError> {
        writer.write_u8(self.version_major);
        writer.write_u8(self.version_minor);
        writer.write_text(&self.agent)
    }

    pub fn read(reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(Self {
            version_major: reader.read_u8()?,
            version_minor: reader.read_u8()?,
            agent: reader.read_text()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyInformation {
    pub player_count: u8,
    pub title: String,
    pub description: String,
    pub host_info: HostInfo,
}

impl NetMessage for LobbyInformation {
    type Kind = ServerToClient;
    const KIND: ServerToClient = ServerToClient::LobbyInformation;

    fn serialize(&self, writer: &mut WriteMessage) -> Result<(), CodecError> {
        writer.write_u8(self.player_count);
        writer.write_text(&self.title)?;
        writer.write_text(&self.description)?;
        self.host_info.write(writer)
    }

    fn deserialize(reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(Self {
            player_count: reader.read_u8()?,
            title: reader.read_text()?,
            description: reader.read_text()?,
            host_info: HostInfo::read(reader)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameConfig {
    /// Server ticks per second
    pub tick_frequency: u8,
}

impl NetMessage for GameConfig {
    type Kind = ServerToClient;
    const KIND: ServerToClient = ServerToClient::GameConfig;

    fn serialize(&self, writer: &mut WriteMessage) -> Result<(), CodecError> {
        writer.write_u8(self.tick_frequency);
        Ok(())
    }

    fn deserialize(reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(Self {
            tick_frequency: reader.read_u8()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignPlayerId {
    pub player_id: u8,
}

impl NetMessage for AssignPlayerId {
    type Kind = ServerToClient;
    const KIND: ServerToClient = ServerToClient::AssignPlayerId;

    fn serialize(&self, writer: &mut WriteMessage) -> Result<(), CodecError> {
        writer.write_u8(self.player_id);
        Ok(())
    }

    fn deserialize(reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(Self {
            player_id: reader.read_u8()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardReset {
    pub width: u8,
    pub height: u8,
}

impl NetMessage for BoardReset {
    type Kind = ServerToClient;
    const KIND: ServerToClient = ServerToClient::BoardReset;

    fn serialize(&self, writer: &mut WriteMessage) -> Result<(), CodecError> {
        writer.write_u8(self.width);
        writer.write_u8(self.height);
        Ok(())
    }

    fn deserialize(reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(Self {
            width: reader.read_u8()?,
            height: reader.read_u8()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardSet {
    pub x: u8,
    pub y: u8,
    pub tile: Tile,
}

impl NetMessage for BoardSet {
    type Kind = ServerToClient;
    const KIND: ServerToClient = ServerToClient::BoardSet;

    fn serialize(&self, writer: &mut WriteMessage) -> Result<(), CodecError> {
        writer.write_u8(self.x);
        writer.write_u8(self.y);
        self.tile.write(writer);
        Ok(())
    }

    fn deserialize(reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(Self {
            x: reader.read_u8()?,
            y: reader.read_u8()?,
            tile: Tile::read(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerConnected {
    pub player_id: u8,
    pub name: String,
}

impl NetMessage for PlayerConnected {
    type Kind = ServerToClient;
    const KIND: ServerToClient = ServerToClient::PlayerConnected;

    fn serialize(&self, writer: &mut WriteMessage) -> Result<(), CodecError> {
        writer.write_u8(self.player_id);
        writer.write_text(&self.name)
    }

    fn deserialize(reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(Self {
            player_id: reader.read_u8()?,
            name: reader.read_text()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerDisconnected {
    pub player_id: u8,
}

impl NetMessage for PlayerDisconnected {
    type Kind = ServerToClient;
    const KIND: ServerToClient = ServerToClient::PlayerDisconnected;

    fn serialize(&self, writer: &mut WriteMessage) -> Result<(), CodecError> {
        writer.write_u8(self.player_id);
        Ok(())
    }

    fn deserialize(reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(Self {
            player_id: reader.read_u8()?,
        })
    }
}

/// A snake appeared; `(x, y)` is its head
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerSpawned {
    pub player_id: u8,
    pub x: u8,
    pub y: u8,
}

impl NetMessage for PlayerSpawned {
    type Kind = ServerToClient;
    const KIND: ServerToClient = ServerToClient::PlayerSpawned;

    fn serialize(&self, writer: &mut WriteMessage) -> Result<(), CodecError> {
        writer.write_u8(self.player_id);
        writer.write_u8(self.x);
        writer.write_u8(self.y);
        Ok(())
    }

    fn deserialize(reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(Self {
            player_id: reader.read_u8()?,
            x: reader.read_u8()?,
            y: reader.read_u8()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerDied {
    pub player_id: u8,
    /// Ticks until the player may respawn
    pub respawn_delay: u16,
}

impl NetMessage for PlayerDied {
    type Kind = ServerToClient;
    const KIND: ServerToClient = ServerToClient::PlayerDied;

    fn serialize(&self, writer: &mut WriteMessage) -> Result<(), CodecError> {
        writer.write_u8(self.player_id);
        writer.write_u16(self.respawn_delay);
        Ok(())
    }

    fn deserialize(reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(Self {
            player_id: reader.read_u8()?,
            respawn_delay: reader.read_u16()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerMoved {
    pub player_id: u8,
    pub x: u8,
    pub y: u8,
    pub grew: bool,
}

impl NetMessage for PlayerMoved {
    type Kind = ServerToClient;
    const KIND: ServerToClient = ServerToClient::PlayerMoved;

    fn serialize(&self, writer: &mut WriteMessage) -> Result<(), CodecError> {
        writer.write_u8(self.player_id);
        writer.write_u8(self.x);
        writer.write_u8(self.y);
        writer.write_bool(self.grew);
        Ok(())
    }

    fn deserialize(reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(Self {
            player_id: reader.read_u8()?,
            x: reader.read_u8()?,
            y: reader.read_u8()?,
            grew: reader.read_bool()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RespawnAllowed;

impl NetMessage for RespawnAllowed {
    type Kind = ServerToClient;
    const KIND: ServerToClient = ServerToClient::RespawnAllowed;

    fn serialize(&self, _writer: &mut WriteMessage) -> Result<(), CodecError> {
        Ok(())
    }

    fn deserialize(_reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessageSent {
    pub player_id: u8,
    pub message: String,
}

impl NetMessage for ChatMessageSent {
    type Kind = ServerToClient;
    const KIND: ServerToClient = ServerToClient::ChatMessageSent;

    fn serialize(&self, writer: &mut WriteMessage) -> Result<(), CodecError> {
        writer.write_u8(self.player_id);
        writer.write_text(&self.message)
    }

    fn deserialize(reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(Self {
            player_id: reader.read_u8()?,
            message: reader.read_text()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRenamed {
    pub player_id: u8,
    pub name: String,
}

impl NetMessage for PlayerRenamed {
    type Kind = ServerToClient;
    const KIND: ServerToClient = ServerToClient::PlayerRenamed;

    fn serialize(&self, writer: &mut WriteMessage) -> Result<(), CodecError> {
        writer.write_u8(self.player_id);
        writer.write_text(&self.name)
    }

    fn deserialize(reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(Self {
            player_id: reader.read_u8()?,
            name: reader.read_text()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestLobbyInfo;

impl NetMessage for RequestLobbyInfo {
    type Kind = ClientToServer;
    const KIND: ClientToServer = ClientToServer::RequestLobbyInfo;

    fn serialize(&self, _writer: &mut WriteMessage) -> Result<(), CodecError> {
        Ok(())
    }

    fn deserialize(_reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(Self)
    }
}

/// Handshake: the client's display name and host info
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connecting {
    pub name: String,
    pub host_info: HostInfo,
}

impl NetMessage for Connecting {
    type Kind = ClientToServer;
    const KIND: ClientToServer = ClientToServer::Connecting;

    fn serialize(&self, writer: &mut WriteMessage) -> Result<(), CodecError> {
        writer.write_text(&self.name)?;
        self.host_info.write(writer)
    }

    fn deserialize(reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(Self {
            name: reader.read_text()?,
            host_info: HostInfo::read(reader)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Disconnecting;

impl NetMessage for Disconnecting {
    type Kind = ClientToServer;
    const KIND: ClientToServer = ClientToServer::Disconnecting;

    fn serialize(&self, _writer: &mut WriteMessage) -> Result<(), CodecError> {
        Ok(())
    }

    fn deserialize(_reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(Self)
    }
}

/// Request for a complete snapshot of the game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FullUpdate;

impl NetMessage for FullUpdate {
    type Kind = ClientToServer;
    const KIND: ClientToServer = ClientToServer::FullUpdate;

    fn serialize(&self, _writer: &mut WriteMessage) -> Result<(), CodecError> {
        Ok(())
    }

    fn deserialize(_reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerInput {
    pub direction: Direction,
}

impl NetMessage for PlayerInput {
    type Kind = ClientToServer;
    const KIND: ClientToServer = ClientToServer::PlayerInput;

    fn serialize(&self, writer: &mut WriteMessage) -> Result<(), CodecError> {
        writer.write_u8(self.direction as u8);
        Ok(())
    }

    fn deserialize(reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(Self {
            direction: Direction::from_u8(reader.read_u8()?)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestRespawn;

impl NetMessage for RequestRespawn {
    type Kind = ClientToServer;
    const KIND: ClientToServer = ClientToServer::RequestRespawn;

    fn serialize(&self, _writer: &mut WriteMessage) -> Result<(), CodecError> {
        Ok(())
    }

    fn deserialize(_reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendChatMessage {
    pub message: String,
}

impl NetMessage for SendChatMessage {
    type Kind = ClientToServer;
    const KIND: ClientToServer = ClientToServer::SendChatMessage;

    fn serialize(&self, writer: &mut WriteMessage) -> Result<(), CodecError> {
        writer.write_text(&self.message)
    }

    fn deserialize(reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(Self {
            message: reader.read_text()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeName {
    pub name: String,
}

impl NetMessage for ChangeName {
    type Kind = ClientToServer;
    const KIND: ClientToServer = ClientToServer::ChangeName;

    fn serialize(&self, writer: &mut WriteMessage) -> Result<(), CodecError> {
        writer.write_text(&self.name)
    }

    fn deserialize(reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(Self {
            name: reader.read_text()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Decoded forms
// ---------------------------------------------------------------------------

/// Any message a client can receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    LobbyInformation(LobbyInformation),
    GameConfig(GameConfig),
    AssignPlayerId(AssignPlayerId),
    BoardReset(BoardReset),
    BoardSet(BoardSet),
    PlayerConnected(PlayerConnected),
    PlayerDisconnected(PlayerDisconnected),
    PlayerSpawned(PlayerSpawned),
    PlayerDied(PlayerDied),
    PlayerMoved(PlayerMoved),
    RespawnAllowed(RespawnAllowed),
    ChatMessageSent(ChatMessageSent),
    PlayerRenamed(PlayerRenamed),
}

impl ServerMessage {
    pub fn kind(&self) -> ServerToClient {
        match self {
            ServerMessage::LobbyInformation(_) => ServerToClient::LobbyInformation,
            ServerMessage::GameConfig(_) => ServerToClient::GameConfig,
            ServerMessage::AssignPlayerId(_) => ServerToClient::AssignPlayerId,
            ServerMessage::BoardReset(_) => ServerToClient::BoardReset,
            ServerMessage::BoardSet(_) => ServerToClient::BoardSet,
            ServerMessage::PlayerConnected(_) => ServerToClient::PlayerConnected,
            ServerMessage::PlayerDisconnected(_) => ServerToClient::PlayerDisconnected,
            ServerMessage::PlayerSpawned(_) => ServerToClient::PlayerSpawned,
            ServerMessage::PlayerDied(_) => ServerToClient::PlayerDied,
            ServerMessage::PlayerMoved(_) => ServerToClient::PlayerMoved,
            ServerMessage::RespawnAllowed(_) => ServerToClient::RespawnAllowed,
            ServerMessage::ChatMessageSent(_) => ServerToClient::ChatMessageSent,
            ServerMessage::PlayerRenamed(_) => ServerToClient::PlayerRenamed,
        }
    }

    pub fn decode(kind: ServerToClient, reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(match kind {
            ServerToClient::LobbyInformation => {
                ServerMessage::LobbyInformation(LobbyInformation::deserialize(reader)?)
            }
            ServerToClient::GameConfig => ServerMessage::GameConfig(GameConfig::deserialize(reader)?),
            ServerToClient::AssignPlayerId => {
                ServerMessage::AssignPlayerId(AssignPlayerId::deserialize(reader)?)
            }
            ServerToClient::BoardReset => ServerMessage::BoardReset(BoardReset::deserialize(reader)?),
            ServerToClient::BoardSet => ServerMessage::BoardSet(BoardSet::deserialize(reader)?),
            ServerToClient::PlayerConnected => {
                ServerMessage::PlayerConnected(PlayerConnected::deserialize(reader)?)
            }
            ServerToClient::PlayerDisconnected => {
                ServerMessage::PlayerDisconnected(PlayerDisconnected::deserialize(reader)?)
            }
            ServerToClient::PlayerSpawned => {
                ServerMessage::PlayerSpawned(PlayerSpawned::deserialize(reader)?)
            }
            ServerToClient::PlayerDied => ServerMessage::PlayerDied(PlayerDied::deserialize(reader)?),
            ServerToClient::PlayerMoved => {
                ServerMessage::PlayerMoved(PlayerMoved::deserialize(reader)?)
            }
            ServerToClient::RespawnAllowed => {
                ServerMessage::RespawnAllowed(RespawnAllowed::deserialize(reader)?)
            }
            ServerToClient::ChatMessageSent => {
                ServerMessage::ChatMessageSent(ChatMessageSent::deserialize(reader)?)
            }
            ServerToClient::PlayerRenamed => {
                ServerMessage::PlayerRenamed(PlayerRenamed::deserialize(reader)?)
            }
        })
    }

    pub fn queue_on(
        &self,
        serializer: &mut PacketSerializer<ServerToClient>,
    ) -> Result<(), ProtocolError> {
        match self {
            ServerMessage::LobbyInformation(m) => serializer.queue(m),
            ServerMessage::GameConfig(m) => serializer.queue(m),
            ServerMessage::AssignPlayerId(m) => serializer.queue(m),
            ServerMessage::BoardReset(m) => serializer.queue(m),
            ServerMessage::BoardSet(m) => serializer.queue(m),
            ServerMessage::PlayerConnected(m) => serializer.queue(m),
            ServerMessage::PlayerDisconnected(m) => serializer.queue(m),
            ServerMessage::PlayerSpawned(m) => serializer.queue(m),
            ServerMessage::PlayerDied(m) => serializer.queue(m),
            ServerMessage::PlayerMoved(m) => serializer.queue(m),
            ServerMessage::RespawnAllowed(m) => serializer.queue(m),
            ServerMessage::ChatMessageSent(m) => serializer.queue(m),
            ServerMessage::PlayerRenamed(m) => serializer.queue(m),
        }
    }
}

/// Any message the server can receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    RequestLobbyInfo(RequestLobbyInfo),
    Connecting(Connecting),
    Disconnecting(Disconnecting),
    FullUpdate(FullUpdate),
    PlayerInput(PlayerInput),
    RequestRespawn(RequestRespawn),
    SendChatMessage(SendChatMessage),
    ChangeName(ChangeName),
}

impl ClientMessage {
    pub fn kind(&self) -> ClientToServer {
        match self {
            ClientMessage::RequestLobbyInfo(_) => ClientToServer::RequestLobbyInfo,
            ClientMessage::Connecting(_) => ClientToServer::Connecting,
            ClientMessage::Disconnecting(_) => ClientToServer::Disconnecting,
            ClientMessage::FullUpdate(_) => ClientToServer::FullUpdate,
            ClientMessage::PlayerInput(_) => ClientToServer::PlayerInput,
            ClientMessage::RequestRespawn(_) => ClientToServer::RequestRespawn,
            ClientMessage::SendChatMessage(_) => ClientToServer::SendChatMessage,
            ClientMessage::ChangeName(_) => ClientToServer::ChangeName,
        }
    }

    pub fn decode(kind: ClientToServer, reader: &mut ReadMessage) -> Result<Self, CodecError> {
        Ok(match kind {
            ClientToServer::RequestLobbyInfo => {
                ClientMessage::RequestLobbyInfo(RequestLobbyInfo::deserialize(reader)?)
            }
            ClientToServer::Connecting => ClientMessage::Connecting(Connecting::deserialize(reader)?),
            ClientToServer::Disconnecting => {
                ClientMessage::Disconnecting(Disconnecting::deserialize(reader)?)
            }
            ClientToServer::FullUpdate => ClientMessage::FullUpdate(FullUpdate::deserialize(reader)?),
            ClientToServer::PlayerInput => {
                ClientMessage::PlayerInput(PlayerInput::deserialize(reader)?)
            }
            ClientToServer::RequestRespawn => {
                ClientMessage::RequestRespawn(RequestRespawn::deserialize(reader)?)
            }
            ClientToServer::SendChatMessage => {
                ClientMessage::SendChatMessage(SendChatMessage::deserialize(reader)?)
            }
            ClientToServer::ChangeName => ClientMessage::ChangeName(ChangeName::deserialize(reader)?),
        })
    }

    pub fn queue_on(
        &self,
        serializer: &mut PacketSerializer<ClientToServer>,
    ) -> Result<(), ProtocolError> {
        match self {
            ClientMessage::RequestLobbyInfo(m) => serializer.queue(m),
            ClientMessage::Connecting(m) => serializer.queue(m),
            ClientMessage::Disconnecting(m) => serializer.queue(m),
            ClientMessage::FullUpdate(m) => serializer.queue(m),
            ClientMessage::PlayerInput(m) => serializer.queue(m),
            ClientMessage::RequestRespawn(m) => serializer.queue(m),
            ClientMessage::SendChatMessage(m) => serializer.queue(m),
            ClientMessage::ChangeName(m) => serializer.queue(m),
        }
    }
}
