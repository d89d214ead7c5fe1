//! Packet batching and parsing
//!
//! A packet carries any number of typed messages, grouped by kind:
//!
//! ```text
//! Header: [body_len:u16][stamp:u8][ack:u8]
//! Body:   [group_count:u8]
//!         group_count x [kind:u8][count_minus_one:u8][group_len:u16][payloads...]
//! ```
//!
//! `body_len` counts every byte after the header. Every group declares its
//! own byte length, so the parser can skip a group whose messages did not
//! decode cleanly and carry on with the next one.

use crate::codec::{CodecError, ReadMessage, WriteMessage};
use crate::messages::{MessageKind, NetMessage};
use log::{error, warn};
use std::collections::VecDeque;
use std::marker::PhantomData;
use thiserror::Error;

/// Budget for the body of a packet (group count byte plus all groups)
pub const MAX_PAYLOAD_SIZE: usize = 1024;
pub const PACKET_HEADER_SIZE: usize = 4;
pub const GROUP_HEADER_SIZE: usize = 4;
pub const MAX_GROUP_MESSAGES: usize = u8::MAX as usize;
/// Largest single payload that fits an otherwise empty packet
pub const MAX_MESSAGE_SIZE: usize = MAX_PAYLOAD_SIZE - 1 - GROUP_HEADER_SIZE;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message of kind {kind} is {size} bytes, limit is {MAX_MESSAGE_SIZE}")]
    MessageTooLarge { kind: u8, size: usize },
    #[error("packet of {0} bytes is too short for a header")]
    TruncatedHeader(usize),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Fixed header fields of a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketHeader {
    pub body_len: u16,
    /// Low byte of the sender's tick when the packet was built
    pub stamp: u8,
    /// Last stamp the sender received from its peer
    pub ack: u8,
    pub group_count: u8,
}

/// Diagnostics for a group that did not parse cleanly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupError {
    pub kind: u8,
    pub declared_count: usize,
    pub declared_len: u16,
    pub expected_end: usize,
    pub actual_end: usize,
    pub cause: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PacketReport {
    pub header: PacketHeader,
    pub groups_read: usize,
    pub messages_read: usize,
    pub errors: Vec<GroupError>,
}

impl PacketReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Per-connection outbound queues, one FIFO per message kind
#[derive(Debug, Clone)]
pub struct PacketSerializer<K: MessageKind> {
    queues: Vec<VecDeque<Vec<u8>>>,
    stamp: u8,
    ack: u8,
    pending_bytes: usize,
    _kind: PhantomData<K>,
}

impl<K: MessageKind> Default for PacketSerializer<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: MessageKind> PacketSerializer<K> {
    pub fn new() -> Self {
        Self {
            queues: K::ALL.iter().map(|_| VecDeque::new()).collect(),
            stamp: 0,
            ack: 0,
            pending_bytes: 0,
            _kind: PhantomData,
        }
    }

    pub fn queue<M: NetMessage<Kind = K>>(&mut self, message: &M) -> Result<(), ProtocolError> {
        self.queue_raw(M::KIND, message.to_bytes()?)
    }

    /// Queues an already serialized payload
    pub fn queue_raw(&mut self, kind: K, payload: Vec<u8>) -> Result<(), ProtocolError> {
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                kind: kind.tag(),
                size: payload.len(),
            });
        }
        self.pending_bytes += payload.len();
        self.queues[kind.ordinal()].push_back(payload);
        Ok(())
    }

    /// Stamp written into the next built packet
    pub fn set_stamp(&mut self, stamp: u8) {
        self.stamp = stamp;
    }

    pub fn stamp(&self) -> u8 {
        self.stamp
    }

    /// Records the stamp of the latest packet received from the peer
    pub fn acknowledge(&mut self, stamp: u8) {
        self.ack = stamp;
    }

    pub fn ack(&self) -> u8 {
        self.ack
    }

    pub fn pending_messages(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(VecDeque::is_empty)
    }

    pub fn queued_payloads(&self, kind: K) -> impl Iterator<Item = &[u8]> {
        self.queues[kind.ordinal()].iter().map(Vec::as_slice)
    }

    /// Drops everything still queued
    pub fn clear(&mut self) {
        self.queues.iter_mut().for_each(VecDeque::clear);
        self.pending_bytes = 0;
    }

    /// Drops the queued messages of one kind
    pub fn clear_kind(&mut self, kind: K) {
        let queue = &mut self.queues[kind.ordinal()];
        self.pending_bytes -= queue.iter().map(Vec::len).sum::<usize>();
        queue.clear();
    }

    /// Packs as many queued messages as fit into one packet.
    ///
    /// Kinds are visited in declaration order. Whatever does not fit stays
    /// queued for the next call. Returns `None` when nothing was packed.
    pub fn build(&mut self) -> Option<Vec<u8>> {
        let mut writer = WriteMessage::with_capacity(PACKET_HEADER_SIZE + MAX_PAYLOAD_SIZE);
        writer.write_u16(0);
        writer.write_u8(self.stamp);
        writer.write_u8(self.ack);
        let group_count_at = writer.byte_position();
        writer.write_u8(0);

        let mut body_len = 1;
        let mut group_count: u8 = 0;

        for kind in K::ALL {
            if group_count == u8::MAX {
                break;
            }
            let queue = &mut self.queues[kind.ordinal()];

            let mut count = 0;
            let mut group_len = 0;
            for payload in queue.iter() {
                if count == MAX_GROUP_MESSAGES
                    || body_len + GROUP_HEADER_SIZE + group_len + payload.len() > MAX_PAYLOAD_SIZE
                {
                    break;
                }
                count += 1;
                group_len += payload.len();
            }
            if count == 0 {
                continue;
            }

            writer.write_u8(kind.tag());
            writer.write_u8((count - 1) as u8);
            writer.write_u16(group_len as u16);
            for payload in queue.drain(..count) {
                writer.write_bytes(&payload);
            }

            self.pending_bytes -= group_len;
            body_len += GROUP_HEADER_SIZE + group_len;
            group_count += 1;
        }

        if group_count == 0 {
            return None;
        }

        let mut bytes = writer.into_bytes();
        bytes[group_count_at] = group_count;
        bytes[..2].copy_from_slice(&(body_len as u16).to_le_bytes());
        Some(bytes)
    }
}

/// Parses one packet, calling `on_message` once per declared message.
///
/// The callback sees a reader bounded to the current group and must consume
/// exactly one message per call. Groups that do not add up are logged and
/// skipped using their declared length; only a missing header is fatal.
pub fn read_packet<K, F>(bytes: &[u8], mut on_message: F) -> Result<PacketReport, ProtocolError>
where
    K: MessageKind,
    F: FnMut(K, &mut ReadMessage) -> Result<(), CodecError>,
{
    if bytes.len() < PACKET_HEADER_SIZE + 1 {
        return Err(ProtocolError::TruncatedHeader(bytes.len()));
    }

    let mut reader = ReadMessage::new(bytes);
    let header = PacketHeader {
        body_len: reader.read_u16()?,
        stamp: reader.read_u8()?,
        ack: reader.read_u8()?,
        group_count: reader.read_u8()?,
    };
    let actual_body = bytes.len() - PACKET_HEADER_SIZE;
    if header.body_len as usize != actual_body {
        warn!(
            "Packet declares {} body bytes but carries {}",
            header.body_len, actual_body
        );
    }

    let mut report = PacketReport {
        header,
        ..PacketReport::default()
    };

    for _ in 0..header.group_count {
        let group_start = reader.byte_position();
        let (tag, count_minus_one, declared_len) =
            match (reader.read_u8(), reader.read_u8(), reader.read_u16()) {
                (Ok(tag), Ok(count), Ok(len)) => (tag, count, len),
                _ => {
                    error!(
                        "Truncated group header at offset {} of {} byte packet",
                        group_start,
                        bytes.len()
                    );
                    report.errors.push(GroupError {
                        kind: 0,
                        declared_count: 0,
                        declared_len: 0,
                        expected_end: group_start + GROUP_HEADER_SIZE,
                        actual_end: bytes.len(),
                        cause: Some("truncated group header".to_string()),
                    });
                    break;
                }
            };

        let declared_count = count_minus_one as usize + 1;
        let payload_start = reader.byte_position();
        let expected_end = payload_start + declared_len as usize;
        let mut group_error = GroupError {
            kind: tag,
            declared_count,
            declared_len,
            expected_end,
            actual_end: payload_start,
            cause: None,
        };

        if expected_end > bytes.len() {
            group_error.actual_end = bytes.len();
            group_error.cause = Some("group runs past end of packet".to_string());
            log_group_error(&group_error);
            report.errors.push(group_error);
            break;
        }

        let Some(kind) = K::from_tag(tag) else {
            group_error.cause = Some("unknown message kind".to_string());
            log_group_error(&group_error);
            report.errors.push(group_error);
            reader.seek(expected_end)?;
            continue;
        };

        let mut group_reader = ReadMessage::new(&bytes[payload_start..expected_end]);
        for index in 0..declared_count {
            if let Err(e) = on_message(kind, &mut group_reader) {
                group_error.cause = Some(format!("message {} of {}: {}", index + 1, declared_count, e));
                break;
            }
            report.messages_read += 1;
        }

        group_error.actual_end = payload_start + group_reader.byte_position();
        if group_error.cause.is_some() || group_error.actual_end != expected_end {
            log_group_error(&group_error);
            report.errors.push(group_error);
        }

        reader.seek(expected_end)?;
        report.groups_read += 1;
    }

    Ok(report)
}

fn log_group_error(e: &GroupError) {
    error!(
        "Malformed group: kind {} count {} declared {} bytes, expected end {} actual {} ({})",
        e.kind,
        e.declared_count,
        e.declared_len,
        e.expected_end,
        e.actual_end,
        e.cause.as_deref().unwrap_or("length mismatch")
    );
}
