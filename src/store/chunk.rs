//! Chunked large-payload chains: a `CHUNKED:<name>` header node carrying
//! the total length and chunk count (plus a best-effort side list of
//! chunk ids as a hint), followed by a `CHUNK:<parent>:<index>:<total>`
//! chain of data nodes.
//!
//! Name-based discovery is authoritative (spec.md section 9's open
//! question resolved this way): reassembly always re-derives the chunk
//! names from the header's own name and walks them in order. The header's
//! side list is read, but a mismatch with what name-based discovery finds
//! is never treated as an error.

use crate::store::node::{Payload, DATA_LEN};
use crate::{err_at, Result};

/// Bytes of raw chunk payload that fit in one node's data slot, given the
/// binary mode's 2-byte length-header overhead.
pub const CHUNK_CAPACITY: usize = DATA_LEN - 2;

/// Header-slot hint capacity: an 8-byte total length plus a 4-byte chunk
/// count, followed by as many 4-byte local-id hints as fit.
const HINT_FIXED_LEN: usize = 8 + 4;
const MAX_HINT_IDS: usize = (DATA_LEN - 2 - HINT_FIXED_LEN) / 4;

pub fn header_name(original_name: &str) -> String {
    format!("CHUNKED:{}", original_name)
}

pub fn chunk_name(parent_local_id: u32, index: u32, total: u32) -> String {
    format!("CHUNK:{}:{}:{}", parent_local_id, index, total)
}

/// Decoded contents of a chunk header node's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderInfo {
    pub total_len: u64,
    pub chunk_count: u32,
    pub hint_ids: Vec<u32>,
}

impl HeaderInfo {
    pub fn encode_payload(&self) -> Payload {
        let mut bytes = Vec::with_capacity(HINT_FIXED_LEN + self.hint_ids.len() * 4);
        bytes.extend_from_slice(&self.total_len.to_le_bytes());
        bytes.extend_from_slice(&self.chunk_count.to_le_bytes());
        for id in self.hint_ids.iter().take(MAX_HINT_IDS) {
            bytes.extend_from_slice(&id.to_le_bytes());
        }
        Payload::Binary { bytes, compression_tag: None }
    }

    pub fn decode_payload(payload: &Payload) -> Result<HeaderInfo> {
        let bytes = match payload {
            Payload::Binary { bytes, .. } => bytes,
            Payload::Text(_) => return err_at!(InvalidNode, msg: "chunk header payload is not binary"),
        };
        if bytes.len() < HINT_FIXED_LEN {
            return err_at!(InvalidNode, msg: "chunk header payload too short: {} bytes", bytes.len());
        }
        let total_len = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let chunk_count = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let mut hint_ids = vec![];
        let mut offset = HINT_FIXED_LEN;
        while offset + 4 <= bytes.len() {
            hint_ids.push(u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()));
            offset += 4;
        }
        Ok(HeaderInfo { total_len, chunk_count, hint_ids })
    }
}

/// A fully planned chunk chain ready for the store to materialize as
/// nodes: one header `(name, payload)` and an ordered list of chunk
/// `(name, payload)` pairs.
pub struct ChunkPlan {
    pub header_name: String,
    pub header_payload: Payload,
    pub chunks: Vec<(String, Payload)>,
}

/// Split `data` into a chunk chain for a node named `original_name`,
/// whose header will reference `parent_local_id` once the header itself
/// has been assigned that id by the caller (the caller allocates the
/// header's id first, then calls this to plan the dependent chunks).
pub fn plan(original_name: &str, parent_local_id: u32, data: &[u8]) -> ChunkPlan {
    let chunk_count = if data.is_empty() { 0 } else { (data.len() + CHUNK_CAPACITY - 1) / CHUNK_CAPACITY };
    let chunk_count_u32 = chunk_count as u32;

    let mut chunks = Vec::with_capacity(chunk_count);
    for (index, piece) in data.chunks(CHUNK_CAPACITY).enumerate() {
        let name = chunk_name(parent_local_id, index as u32, chunk_count_u32);
        let payload = Payload::Binary { bytes: piece.to_vec(), compression_tag: None };
        chunks.push((name, payload));
    }

    let hint_ids = vec![]; // filled in by the caller once chunk ids are known, if desired
    let header_info = HeaderInfo { total_len: data.len() as u64, chunk_count: chunk_count_u32, hint_ids };

    ChunkPlan {
        header_name: header_name(original_name),
        header_payload: header_info.encode_payload(),
        chunks,
    }
}

/// Reassemble a chunk chain given the header's parsed info and an ordered
/// lookup function `fetch(index) -> Option<payload bytes>` driven by
/// name-based discovery (`chunk_name(parent_local_id, index, total)`).
pub fn reassemble<F>(header: &HeaderInfo, parent_local_id: u32, mut fetch: F) -> Result<Vec<u8>>
where
    F: FnMut(&str) -> Option<Vec<u8>>,
{
    let mut out = Vec::with_capacity(header.total_len as usize);
    for index in 0..header.chunk_count {
        let name = chunk_name(parent_local_id, index, header.chunk_count);
        match fetch(&name) {
            Some(bytes) => out.extend_from_slice(&bytes),
            None => return err_at!(NotFound, msg: "missing chunk {}", name),
        }
    }
    if out.len() as u64 != header.total_len {
        return err_at!(InvalidNode, msg: "reassembled length {} != header total_len {}", out.len(), header.total_len);
    }
    Ok(out)
}

#[cfg(test)]
#[path = "chunk_test.rs"]
mod chunk_test;
