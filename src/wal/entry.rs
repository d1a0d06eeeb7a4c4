//! Wire format for a single WAL entry: `{seq:u64, op:u32, node_id:u64,
//! payload_len:u32, payload:[u8]}`, little-endian throughout.

use std::convert::TryFrom;

use crate::{err_at, Result};

/// Fixed portion of an entry, before the variable-length payload.
pub const ENTRY_HEADER_LEN: usize = 8 + 4 + 8 + 4;

/// Mutation kind recorded in a WAL entry. Matches spec.md's closed set of
/// ops one-for-one with `store::Store`'s mutation methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum OpCode {
    AddNode = 1,
    UpdateNode = 2,
    DeleteNode = 3,
    AddChild = 4,
    CheckpointMarker = 5,
}

impl OpCode {
    fn from_u32(v: u32) -> Result<OpCode> {
        match v {
            1 => Ok(OpCode::AddNode),
            2 => Ok(OpCode::UpdateNode),
            3 => Ok(OpCode::DeleteNode),
            4 => Ok(OpCode::AddChild),
            5 => Ok(OpCode::CheckpointMarker),
            v => err_at!(DecodeFail, msg: "unknown wal op code {}", v),
        }
    }
}

/// One logged mutation.
#[derive(Debug, Clone)]
pub struct Entry {
    pub sequence: u64,
    pub op: OpCode,
    pub node_id: u64,
    pub payload: Vec<u8>,
}

impl Entry {
    pub fn new(sequence: u64, op: OpCode, node_id: u64, payload: Vec<u8>) -> Entry {
        Entry { sequence, op, node_id, payload }
    }

    pub fn encoded_len(&self) -> usize {
        ENTRY_HEADER_LEN + self.payload.len()
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        let payload_len = err_at!(
            FailConvert,
            u32::try_from(self.payload.len()),
            "wal payload too large"
        )?;
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&(self.op as u32).to_le_bytes());
        buf.extend_from_slice(&self.node_id.to_le_bytes());
        buf.extend_from_slice(&payload_len.to_le_bytes());
        buf.extend_from_slice(&self.payload);
        Ok(())
    }

    /// Decode one entry from the head of `buf`, returning the entry and
    /// the number of bytes consumed. Returns `Ok(None)` if `buf` does not
    /// yet hold a complete entry (the caller's torn-write boundary).
    pub fn decode(buf: &[u8]) -> Result<Option<(Entry, usize)>> {
        if buf.len() < ENTRY_HEADER_LEN {
            return Ok(None);
        }
        let sequence = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let op_raw = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let node_id = u64::from_le_bytes(buf[12..20].try_into().unwrap());
        let payload_len = u32::from_le_bytes(buf[20..24].try_into().unwrap()) as usize;

        let total = ENTRY_HEADER_LEN + payload_len;
        if buf.len() < total {
            return Ok(None);
        }
        let op = OpCode::from_u32(op_raw)?;
        let payload = buf[ENTRY_HEADER_LEN..total].to_vec();
        Ok(Some((Entry::new(sequence, op, node_id, payload), total)))
    }
}

#[cfg(test)]
#[path = "entry_test.rs"]
mod entry_test;
