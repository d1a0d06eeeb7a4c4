//! Fixed 1024-byte node record layout and the dual-mode (text/binary)
//! payload codec.

use std::convert::TryFrom;

use crate::{err_at, Result};

pub const RECORD_SIZE: usize = 1024;
pub const NAME_LEN: usize = 64;
pub const DATA_LEN: usize = 510;
pub const MAX_CHILDREN: usize = 4;
pub const PAYLOAD_LEN: usize = 119;
pub const EXPANSION_LEN: usize = 128;

const OFF_ID: usize = 0;
const OFF_KIND: usize = 8;
const OFF_FLAGS: usize = 9;
const OFF_NAME: usize = 16;
const OFF_DATA_LEN: usize = 80;
const OFF_DATA: usize = 82;
const OFF_PARENT_ID: usize = 592;
const OFF_CHILD_COUNT: usize = 600;
const OFF_CHILDREN: usize = 601;
const OFF_CONFIDENCE: usize = 633;
const OFF_TIMESTAMP: usize = 641;
const OFF_PAYLOAD: usize = 649;
const OFF_EXPANSION: usize = 768;

const FLAG_BINARY: u8 = 0x01;
const COMPRESS_FLAG_BIT: u16 = 0x8000;

/// Closed set of node kinds, `repr(u8)` so it fits the record's one-byte
/// `kind` field directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeType {
    Primitive = 0,
    Kernel = 1,
    Pattern = 2,
    Performance = 3,
    Learning = 4,
    AntiPattern = 5,
    SidecarMapping = 6,
    SidecarEvent = 7,
    SidecarSuggestion = 8,
    SidecarState = 9,
    Metadata = 10,
    ChunkHeader = 11,
    ChunkData = 12,
}

impl NodeType {
    pub fn from_u8(v: u8) -> Result<NodeType> {
        use NodeType::*;
        Ok(match v {
            0 => Primitive,
            1 => Kernel,
            2 => Pattern,
            3 => Performance,
            4 => Learning,
            5 => AntiPattern,
            6 => SidecarMapping,
            7 => SidecarEvent,
            8 => SidecarSuggestion,
            9 => SidecarState,
            10 => Metadata,
            11 => ChunkHeader,
            12 => ChunkData,
            v => return err_at!(InvalidNode, msg: "unknown node kind {}", v),
        })
    }
}

/// Dual-mode payload, decoded from the record's `data` field per
/// spec.md 4.4.3: text is null-terminated, binary is a 2-byte
/// little-endian length header (bit 15 = compressed) followed by bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(Vec<u8>),
    Binary { bytes: Vec<u8>, compression_tag: Option<u8> },
}

impl Payload {
    /// Encode into exactly [DATA_LEN] bytes, zero-padded.
    pub fn encode(&self) -> Result<[u8; DATA_LEN]> {
        let mut buf = [0u8; DATA_LEN];
        match self {
            Payload::Text(text) => {
                if text.len() >= DATA_LEN {
                    return err_at!(InvalidNode, msg: "text payload too long: {} bytes", text.len());
                }
                if text.contains(&0) {
                    return err_at!(InvalidNode, msg: "text payload contains embedded nul");
                }
                buf[..text.len()].copy_from_slice(text);
                // buf[text.len()] stays 0 as the terminator.
            }
            Payload::Binary { bytes, compression_tag } => {
                let body_len = bytes.len() + if compression_tag.is_some() { 1 } else { 0 };
                if body_len > DATA_LEN - 2 {
                    return err_at!(InvalidNode, msg: "binary payload too long: {} bytes", bytes.len());
                }
                let length_word = match compression_tag {
                    Some(_) => COMPRESS_FLAG_BIT | u16::try_from(1 + bytes.len()).unwrap(),
                    None => u16::try_from(bytes.len()).unwrap(),
                };
                buf[0..2].copy_from_slice(&length_word.to_le_bytes());
                let mut offset = 2;
                if let Some(tag) = compression_tag {
                    buf[offset] = *tag;
                    offset += 1;
                }
                buf[offset..offset + bytes.len()].copy_from_slice(bytes);
            }
        }
        Ok(buf)
    }

    /// Decode binary-mode unconditionally: a well-formed binary header is
    /// required regardless of whether the slot actually holds text.
    pub fn decode_binary(buf: &[u8; DATA_LEN]) -> Result<Payload> {
        let length_word = u16::from_le_bytes([buf[0], buf[1]]);
        let compressed = length_word & COMPRESS_FLAG_BIT != 0;
        let len = (length_word & !COMPRESS_FLAG_BIT) as usize;

        if compressed {
            if len == 0 || len - 1 > DATA_LEN - 3 {
                return err_at!(InvalidNode, msg: "invalid compressed binary length {}", len);
            }
            let tag = buf[2];
            let bytes = buf[3..3 + (len - 1)].to_vec();
            Ok(Payload::Binary { bytes, compression_tag: Some(tag) })
        } else {
            if len > DATA_LEN - 2 {
                return err_at!(InvalidNode, msg: "invalid binary length {}", len);
            }
            let bytes = buf[2..2 + len].to_vec();
            Ok(Payload::Binary { bytes, compression_tag: None })
        }
    }

    /// Decode text-mode unconditionally: stop at the first nul byte (or
    /// end of slot, for a full-length name/value with no terminator).
    pub fn decode_text(buf: &[u8; DATA_LEN]) -> Payload {
        let end = buf.iter().position(|&b| b == 0).unwrap_or(DATA_LEN);
        Payload::Text(buf[..end].to_vec())
    }

}

/// In-memory view of one 1024-byte record. `encode`/`decode` are the only
/// paths in or out of the mapped file.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub id: u64,
    pub kind: NodeType,
    pub is_binary: bool,
    pub name: [u8; NAME_LEN],
    pub data: [u8; DATA_LEN],
    pub parent_id: u64,
    pub children: [u64; MAX_CHILDREN],
    pub child_count: u8,
    pub confidence: f64,
    pub timestamp: u64,
    pub payload: [u8; PAYLOAD_LEN],
    pub expansion: [u8; EXPANSION_LEN],
}

impl NodeRecord {
    pub fn tombstone() -> NodeRecord {
        NodeRecord {
            id: 0,
            kind: NodeType::Primitive,
            is_binary: false,
            name: [0u8; NAME_LEN],
            data: [0u8; DATA_LEN],
            parent_id: 0,
            children: [0u64; MAX_CHILDREN],
            child_count: 0,
            confidence: 0.0,
            timestamp: 0,
            payload: [0u8; PAYLOAD_LEN],
            expansion: [0u8; EXPANSION_LEN],
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.name[0] == 0
    }

    /// Set `name`, rejecting anything that does not fit in [NAME_LEN]
    /// bytes with no terminator required.
    pub fn set_name(&mut self, name: &[u8]) -> Result<()> {
        if name.is_empty() || name[0] == 0 {
            return err_at!(InvalidNode, msg: "node name must be non-empty");
        }
        if name.len() > NAME_LEN {
            return err_at!(InvalidNode, msg: "node name exceeds {} bytes: {}", NAME_LEN, name.len());
        }
        self.name = [0u8; NAME_LEN];
        self.name[..name.len()].copy_from_slice(name);
        Ok(())
    }

    pub fn name_bytes(&self) -> &[u8] {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        &self.name[..end]
    }

    pub fn name_str(&self) -> Result<&str> {
        err_at!(InvalidNode, std::str::from_utf8(self.name_bytes()))
    }

    pub fn set_payload(&mut self, payload: &Payload) -> Result<()> {
        self.data = payload.encode()?;
        self.is_binary = matches!(payload, Payload::Binary { .. });
        Ok(())
    }

    pub fn payload(&self) -> Payload {
        if self.is_binary {
            Payload::decode_binary(&self.data).unwrap_or_else(|_| Payload::Text(vec![]))
        } else {
            Payload::decode_text(&self.data)
        }
    }

    pub fn add_child(&mut self, child_id: u64) -> bool {
        if (self.child_count as usize) >= MAX_CHILDREN {
            return false;
        }
        self.children[self.child_count as usize] = child_id;
        self.child_count += 1;
        true
    }

    pub fn encode(&self, buf: &mut [u8; RECORD_SIZE]) {
        buf.fill(0);
        buf[OFF_ID..OFF_ID + 8].copy_from_slice(&self.id.to_le_bytes());
        buf[OFF_KIND] = self.kind as u8;
        buf[OFF_FLAGS] = if self.is_binary { FLAG_BINARY } else { 0 };
        buf[OFF_NAME..OFF_NAME + NAME_LEN].copy_from_slice(&self.name);
        buf[OFF_DATA..OFF_DATA + DATA_LEN].copy_from_slice(&self.data);
        buf[OFF_PARENT_ID..OFF_PARENT_ID + 8].copy_from_slice(&self.parent_id.to_le_bytes());
        buf[OFF_CHILD_COUNT] = self.child_count;
        for (i, child) in self.children.iter().enumerate() {
            let off = OFF_CHILDREN + i * 8;
            buf[off..off + 8].copy_from_slice(&child.to_le_bytes());
        }
        buf[OFF_CONFIDENCE..OFF_CONFIDENCE + 8].copy_from_slice(&self.confidence.to_le_bytes());
        buf[OFF_TIMESTAMP..OFF_TIMESTAMP + 8].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[OFF_PAYLOAD..OFF_PAYLOAD + PAYLOAD_LEN].copy_from_slice(&self.payload);
        buf[OFF_EXPANSION..OFF_EXPANSION + EXPANSION_LEN].copy_from_slice(&self.expansion);
    }

    pub fn decode(buf: &[u8; RECORD_SIZE]) -> Result<NodeRecord> {
        let id = u64::from_le_bytes(buf[OFF_ID..OFF_ID + 8].try_into().unwrap());
        let kind = NodeType::from_u8(buf[OFF_KIND])?;
        let is_binary = buf[OFF_FLAGS] & FLAG_BINARY != 0;

        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&buf[OFF_NAME..OFF_NAME + NAME_LEN]);

        let mut data = [0u8; DATA_LEN];
        data.copy_from_slice(&buf[OFF_DATA..OFF_DATA + DATA_LEN]);

        let parent_id = u64::from_le_bytes(buf[OFF_PARENT_ID..OFF_PARENT_ID + 8].try_into().unwrap());
        let child_count = buf[OFF_CHILD_COUNT];

        let mut children = [0u64; MAX_CHILDREN];
        for (i, child) in children.iter_mut().enumerate() {
            let off = OFF_CHILDREN + i * 8;
            *child = u64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        }

        let confidence = f64::from_le_bytes(buf[OFF_CONFIDENCE..OFF_CONFIDENCE + 8].try_into().unwrap());
        let timestamp = u64::from_le_bytes(buf[OFF_TIMESTAMP..OFF_TIMESTAMP + 8].try_into().unwrap());

        let mut payload = [0u8; PAYLOAD_LEN];
        payload.copy_from_slice(&buf[OFF_PAYLOAD..OFF_PAYLOAD + PAYLOAD_LEN]);

        let mut expansion = [0u8; EXPANSION_LEN];
        expansion.copy_from_slice(&buf[OFF_EXPANSION..OFF_EXPANSION + EXPANSION_LEN]);

        Ok(NodeRecord {
            id,
            kind,
            is_binary,
            name,
            data,
            parent_id,
            children,
            child_count,
            confidence,
            timestamp,
            payload,
            expansion,
        })
    }
}

#[cfg(test)]
#[path = "node_test.rs"]
mod node_test;
