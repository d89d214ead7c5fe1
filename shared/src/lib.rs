//! # Shared Protocol Library
//!
//! Everything both ends of a connection must agree on: the primitive byte
//! codec, the message catalog, the packet batcher/parser, stream framing and
//! the board model that the server simulates and clients mirror.
//!
//! ## Layers
//!
//! - [`codec`]: little-endian integers and length-prefixed text
//! - [`messages`]: typed messages with stable one-byte tags
//! - [`protocol`]: per-kind queues packed into size-bounded packets, and the
//!   matching parser that survives malformed groups
//! - [`framing`]: `[len:u16][body]` frames on a byte stream
//! - [`board`]: the tile grid

pub mod board;
pub mod codec;
pub mod framing;
pub mod messages;
pub mod protocol;

pub use board::{Board, Tile, TileType};
pub use codec::{CodecError, ReadMessage, WriteMessage};
pub use framing::{DisconnectReason, FrameError, TransportError, MAX_FRAME_SIZE};
pub use messages::{
    ClientMessage, ClientToServer, Direction, HostInfo, MessageKind, NetMessage, ServerMessage,
    ServerToClient,
};
pub use protocol::{
    read_packet, PacketHeader, PacketReport, PacketSerializer, ProtocolError, MAX_PAYLOAD_SIZE,
};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TICK_RATE: u8 = 20;
