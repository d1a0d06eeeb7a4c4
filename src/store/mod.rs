//! Module `store` owns the memory-mapped array of fixed-size node
//! records: the file header, the id allocator, the id-to-slot reverse
//! map, optional LRU access bookkeeping, and the mutation operations that
//! pair an in-memory write with a WAL entry.

pub mod allocator;
pub mod cache;
pub mod chunk;
pub mod node;
pub mod reverse_map;

use log::warn;

use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering::SeqCst},
};

use crate::{err_at, platform, wal::{OpCode, Wal}, Result};

use self::{
    allocator::IdAllocator,
    node::{NodeRecord, NodeType, Payload, RECORD_SIZE},
    reverse_map::ReverseMap,
};

pub const MAGIC: &[u8; 4] = b"LAT0";
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;
pub const HEADER_LEN: usize = 48;
const INITIAL_SLOTS: usize = 64;
const GROWTH_FACTOR: usize = 2;

#[derive(Debug, Clone, Copy)]
struct Header {
    device_id: u64,
    next_local_id: u64,
    total_nodes: u64,
    slot_size: u64,
}

impl Header {
    fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4..6].copy_from_slice(&VERSION_MAJOR.to_le_bytes());
        buf[6..8].copy_from_slice(&VERSION_MINOR.to_le_bytes());
        buf[8..16].copy_from_slice(&self.device_id.to_le_bytes());
        buf[16..24].copy_from_slice(&self.next_local_id.to_le_bytes());
        buf[24..32].copy_from_slice(&self.total_nodes.to_le_bytes());
        buf[32..40].copy_from_slice(&self.slot_size.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8]) -> Result<Header> {
        if buf.len() < HEADER_LEN {
            return err_at!(Fatal, msg: "store header truncated: {} bytes", buf.len());
        }
        if &buf[0..4] != MAGIC {
            return err_at!(Fatal, msg: "store magic mismatch: {:?}", &buf[0..4]);
        }
        let slot_size = u64::from_le_bytes(buf[32..40].try_into().unwrap());
        if slot_size != RECORD_SIZE as u64 {
            return err_at!(Fatal, msg: "store slot-size mismatch: {} != {}", slot_size, RECORD_SIZE);
        }
        Ok(Header {
            device_id: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            next_local_id: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            total_nodes: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
            slot_size,
        })
    }
}

/// The memory-mapped node array plus everything needed to mutate it.
pub struct Store {
    path: PathBuf,
    file: fs::File,
    mapping: Option<memmap2::MmapMut>,
    device_id: u64,
    capacity: usize,
    allocator: IdAllocator,
    reverse_map: ReverseMap,
    access_table: Option<cache::AccessTable>,
    free_slots: Vec<usize>,
    node_count: AtomicU64,
    node_cap: usize,
}

fn compose_id(device_id: u64, local_id: u32) -> u64 {
    ((device_id & 0xFFFF_FFFF) << 32) | local_id as u64
}

fn local_id_of(id: u64) -> u32 {
    id as u32
}

impl Store {
    pub fn create(path: impl AsRef<Path>, device_id: u64, node_cap: usize, cache_mode: bool) -> Result<Store> {
        let path = path.as_ref().to_path_buf();
        let file_len = HEADER_LEN as u64 + (INITIAL_SLOTS * RECORD_SIZE) as u64;
        let file = platform::file_open_rw_create(&path, file_len)?;

        let header = Header { device_id, next_local_id: 0, total_nodes: 0, slot_size: RECORD_SIZE as u64 };
        {
            use std::io::Write;
            let mut f = &file;
            err_at!(IoError, f.write_all(&header.encode()))?;
            err_at!(IoError, f.sync_all())?;
        }

        let mapping = platform::map_region(&file, file_len as usize, true)?;
        let access_table = cache_mode.then(|| cache::AccessTable::with_capacity(INITIAL_SLOTS));

        Ok(Store {
            path,
            file,
            mapping: Some(mapping),
            device_id,
            capacity: INITIAL_SLOTS,
            allocator: IdAllocator::new(0),
            reverse_map: ReverseMap::new(),
            access_table,
            free_slots: Vec::new(),
            node_count: AtomicU64::new(0),
            node_cap,
        })
    }

    pub fn open(path: impl AsRef<Path>, node_cap: usize, cache_mode: bool) -> Result<Store> {
        let path = path.as_ref().to_path_buf();
        let file = err_at!(
            IoError,
            fs::OpenOptions::new().read(true).write(true).open(&path)
        )?;
        let file_len = err_at!(IoError, file.metadata())?.len();
        if file_len < HEADER_LEN as u64 {
            return err_at!(Fatal, msg: "store file shorter than its header: {} bytes", file_len);
        }

        let mapping = platform::map_region(&file, file_len as usize, true)?;
        let header = Header::decode(&mapping[..HEADER_LEN])?;
        let capacity = ((file_len as usize) - HEADER_LEN) / RECORD_SIZE;

        let mut reverse_map = ReverseMap::new();
        let mut free_slots = Vec::new();
        let mut observed_max: Option<u32> = None;
        let mut live = 0u64;

        for slot in 0..capacity {
            let offset = HEADER_LEN + slot * RECORD_SIZE;
            let buf: &[u8; RECORD_SIZE] = mapping[offset..offset + RECORD_SIZE].try_into().unwrap();
            let record = NodeRecord::decode(buf)?;
            if record.is_tombstone() {
                free_slots.push(slot);
            } else {
                let local_id = local_id_of(record.id);
                reverse_map.set(local_id, slot as u32);
                observed_max = Some(observed_max.map_or(local_id, |m| m.max(local_id)));
                live += 1;
            }
        }

        let allocator = IdAllocator::new(header.next_local_id as u32);
        allocator.reconcile(observed_max);

        let access_table = cache_mode.then(|| cache::AccessTable::with_capacity(capacity));

        Ok(Store {
            path,
            file,
            mapping: Some(mapping),
            device_id: header.device_id,
            capacity,
            allocator,
            reverse_map,
            access_table,
            free_slots,
            node_count: AtomicU64::new(live),
            node_cap,
        })
    }

    pub fn node_count(&self) -> u64 {
        self.node_count.load(SeqCst)
    }

    /// Reserve a contiguous block of local ids without writing any
    /// node. No durability is required: on recovery the allocator's
    /// watermark is reconstructed from the highest id actually observed
    /// in the store, not from how many ids were ever reserved.
    pub fn reserve_ids(&self, n: u32) -> std::ops::Range<u32> {
        self.allocator.reserve(n)
    }

    fn slot_offset(&self, slot: usize) -> usize {
        HEADER_LEN + slot * RECORD_SIZE
    }

    fn mapping(&self) -> &memmap2::MmapMut {
        self.mapping.as_ref().expect("mapping absent outside of grow()")
    }

    fn mapping_mut(&mut self) -> &mut memmap2::MmapMut {
        self.mapping.as_mut().expect("mapping absent outside of grow()")
    }

    fn read_slot(&self, slot: usize) -> Result<NodeRecord> {
        let offset = self.slot_offset(slot);
        let buf: &[u8; RECORD_SIZE] = self.mapping()[offset..offset + RECORD_SIZE].try_into().unwrap();
        NodeRecord::decode(buf)
    }

    fn write_slot(&mut self, slot: usize, record: &NodeRecord) -> Result<()> {
        let offset = self.slot_offset(slot);
        let mut buf = [0u8; RECORD_SIZE];
        record.encode(&mut buf);
        self.mapping_mut()[offset..offset + RECORD_SIZE].copy_from_slice(&buf);
        Ok(())
    }

    fn alloc_slot(&mut self) -> Result<usize> {
        if let Some(slot) = self.free_slots.pop() {
            return Ok(slot);
        }
        if self.reverse_map_len() >= self.capacity {
            self.grow(self.capacity * GROWTH_FACTOR)?;
        }
        let slot = self.first_never_used_slot();
        Ok(slot)
    }

    fn reverse_map_len(&self) -> usize {
        (self.node_count.load(SeqCst) as usize) + self.free_slots.len()
    }

    fn first_never_used_slot(&self) -> usize {
        self.reverse_map_len()
    }

    fn grow(&mut self, new_capacity: usize) -> Result<()> {
        let new_len = HEADER_LEN as u64 + (new_capacity * RECORD_SIZE) as u64;
        // Unmap before extending: growing the file under a live mapping
        // is disallowed (spec.md 4.1), so the old mapping is dropped here
        // and a fresh one takes its place at the larger size.
        self.mapping.take();
        platform::file_extend(&self.file, new_len)?;
        self.mapping = Some(platform::map_region(&self.file, new_len as usize, true)?);
        self.capacity = new_capacity;
        if let Some(table) = self.access_table.as_mut() {
            table.grow_to(new_capacity);
        }
        Ok(())
    }

    fn check_quota(&self) -> Result<()> {
        if self.node_count.load(SeqCst) as usize >= self.node_cap {
            return err_at!(QuotaExceeded, msg: "node cap {} reached", self.node_cap);
        }
        Ok(())
    }

    /// Add a node durably: allocates an id, finds a slot, writes the
    /// record, appends the WAL entry, and updates the reverse map.
    /// Returns `(full_id, wal_sequence)`; the caller drives
    /// `wal.wait_flushed` and prefix-index maintenance.
    pub fn add(
        &mut self,
        wal: &Wal,
        kind: NodeType,
        name: &[u8],
        payload: &Payload,
        parent_id: u64,
        timestamp: u64,
        confidence: f64,
    ) -> Result<(u64, u64)> {
        self.check_quota()?;

        let local_id = self.allocator.alloc();
        let id = compose_id(self.device_id, local_id);

        let mut record = NodeRecord::tombstone();
        record.id = id;
        record.kind = kind;
        record.set_name(name)?;
        record.set_payload(payload)?;
        record.parent_id = parent_id;
        record.timestamp = timestamp;
        record.confidence = confidence;

        let mut encoded = [0u8; RECORD_SIZE];
        record.encode(&mut encoded);
        let sequence = wal.append(OpCode::AddNode, id, encoded.to_vec())?;

        let slot = self.alloc_slot()?;
        self.write_slot(slot, &record)?;
        self.reverse_map.set(local_id, slot as u32);
        self.node_count.fetch_add(1, SeqCst);

        Ok((id, sequence))
    }

    /// Apply an AddNode entry during recovery: the record arrives
    /// pre-encoded (it is exactly what was written to the WAL), so this
    /// skips re-deriving it from parts.
    ///
    /// Recovery must be idempotent: the mapped store file may already
    /// reflect this mutation (writes through the mapping can reach disk
    /// before a crash even without an explicit fsync), so replaying an
    /// already-applied add must be a no-op rather than allocating a
    /// second slot for the same id.
    pub fn apply_add(&mut self, encoded: &[u8]) -> Result<()> {
        if encoded.len() != RECORD_SIZE {
            return err_at!(Fatal, msg: "recovered add-node payload has wrong size {}", encoded.len());
        }
        let buf: &[u8; RECORD_SIZE] = encoded.try_into().unwrap();
        let record = NodeRecord::decode(buf)?;
        let local_id = local_id_of(record.id);

        if self.reverse_map.get(local_id).is_some() {
            return Ok(());
        }

        let slot = self.alloc_slot()?;
        self.write_slot(slot, &record)?;
        self.reverse_map.set(local_id, slot as u32);
        self.allocator.reconcile(Some(local_id));
        self.node_count.fetch_add(1, SeqCst);
        Ok(())
    }

    pub fn update(&mut self, wal: &Wal, id: u64, payload: &Payload, timestamp: u64) -> Result<u64> {
        let slot = self.slot_for(id)?;
        let mut record = self.read_slot(slot)?;
        record.set_payload(payload)?;
        record.timestamp = timestamp;

        let mut wal_payload = vec![record.is_binary as u8];
        wal_payload.extend_from_slice(&record.data);
        let sequence = wal.append(OpCode::UpdateNode, id, wal_payload)?;

        self.write_slot(slot, &record)?;
        Ok(sequence)
    }

    /// Recovery-only application of an UpdateNode entry. A `NotFound` slot
    /// means a later, already-applied delete superseded this update before
    /// the crash; skipping it keeps recovery idempotent instead of
    /// aborting the whole replay.
    pub fn apply_update(&mut self, id: u64, wal_payload: &[u8]) -> Result<()> {
        let slot = match self.slot_for(id) {
            Ok(slot) => slot,
            Err(crate::Error::NotFound(_)) => return Ok(()),
            Err(err) => return Err(err),
        };
        let mut record = self.read_slot(slot)?;
        if wal_payload.is_empty() {
            return err_at!(Fatal, msg: "recovered update-node payload empty");
        }
        record.is_binary = wal_payload[0] != 0;
        record.data.copy_from_slice(&wal_payload[1..1 + node::DATA_LEN]);
        self.write_slot(slot, &record)
    }

    pub fn delete(&mut self, wal: &Wal, id: u64) -> Result<u64> {
        let slot = self.slot_for(id)?;
        let sequence = wal.append(OpCode::DeleteNode, id, vec![])?;
        self.tombstone_slot(slot, local_id_of(id))?;
        Ok(sequence)
    }

    /// Recovery-only application of a DeleteNode entry; already-deleted
    /// (and thus absent) ids are treated as already-applied, not an error.
    pub fn apply_delete(&mut self, id: u64) -> Result<()> {
        let slot = match self.slot_for(id) {
            Ok(slot) => slot,
            Err(crate::Error::NotFound(_)) => return Ok(()),
            Err(err) => return Err(err),
        };
        self.tombstone_slot(slot, local_id_of(id))
    }

    fn tombstone_slot(&mut self, slot: usize, local_id: u32) -> Result<()> {
        self.write_slot(slot, &NodeRecord::tombstone())?;
        self.reverse_map.remove(local_id);
        self.free_slots.push(slot);
        self.node_count.fetch_sub(1, SeqCst);
        Ok(())
    }

    pub fn add_child(&mut self, wal: &Wal, parent_id: u64, child_id: u64) -> Result<u64> {
        let slot = self.slot_for(parent_id)?;
        let sequence = wal.append(OpCode::AddChild, parent_id, child_id.to_le_bytes().to_vec())?;
        self.apply_add_child_at_slot(slot, child_id);
        Ok(sequence)
    }

    /// Recovery-only application of an AddChild entry; a `NotFound` parent
    /// means a later, already-applied delete of the parent superseded
    /// this hint before the crash.
    pub fn apply_add_child(&mut self, parent_id: u64, wal_payload: &[u8]) -> Result<()> {
        if wal_payload.len() < 8 {
            return err_at!(Fatal, msg: "recovered add-child payload too short");
        }
        let child_id = u64::from_le_bytes(wal_payload[0..8].try_into().unwrap());
        let slot = match self.slot_for(parent_id) {
            Ok(slot) => slot,
            Err(crate::Error::NotFound(_)) => return Ok(()),
            Err(err) => return Err(err),
        };
        self.apply_add_child_at_slot(slot, child_id);
        Ok(())
    }

    /// Link `child_id` under the record at `slot`, unless it is already
    /// linked: idempotent so a recovery replay of an already-applied
    /// AddChild does not produce a duplicate entry.
    fn apply_add_child_at_slot(&mut self, slot: usize, child_id: u64) {
        let mut record = self.read_slot(slot).expect("slot just resolved");
        if record.children[..record.child_count as usize].contains(&child_id) {
            return;
        }
        if !record.add_child(child_id) {
            warn!(target: "store", "children slice full for slot {}, dropping hint {}", slot, child_id);
        }
        self.write_slot(slot, &record).expect("slot just resolved");
    }

    fn slot_for(&self, id: u64) -> Result<usize> {
        let local_id = local_id_of(id);
        match self.reverse_map.get(local_id) {
            Some(slot) => Ok(slot as usize),
            None => err_at!(NotFound, msg: "no live node with id {}", id),
        }
    }

    /// Snapshot-read a node by id. Returns a copy; never a borrow into
    /// the mapped file.
    pub fn get(&self, id: u64) -> Result<NodeRecord> {
        let slot = self.slot_for(id)?;
        if let Some(table) = self.access_table.as_ref() {
            table.touch(slot);
        }
        self.read_slot(slot)
    }

    /// Read a node's payload as text, regardless of its stored mode. A
    /// binary-mode record is read by scanning its raw data slot for the
    /// first nul byte, ignoring the binary length header entirely — this
    /// is the ambiguity the warning flags, not an error.
    pub fn get_text(&self, id: u64) -> Result<Vec<u8>> {
        let slot = self.slot_for(id)?;
        if let Some(table) = self.access_table.as_ref() {
            table.touch(slot);
        }
        let record = self.read_slot(slot)?;
        if record.is_binary {
            warn!(target: "store", "reading binary node {} via text API", id);
        }
        match Payload::decode_text(&record.data) {
            Payload::Text(bytes) => Ok(bytes),
            Payload::Binary { .. } => unreachable!("decode_text always returns Text"),
        }
    }

    pub fn get_binary(&self, id: u64) -> Result<(usize, bool, Vec<u8>)> {
        let record = self.get(id)?;
        match record.payload() {
            Payload::Binary { bytes, compression_tag } => {
                Ok((bytes.len(), compression_tag.is_some(), bytes))
            }
            Payload::Text(bytes) => Ok((bytes.len(), false, bytes)),
        }
    }

    /// Iterate over every live `(id, name, confidence, timestamp)` tuple,
    /// used by `prefix_index::PrefixIndex::rebuild`.
    pub fn iter_live(&self) -> impl Iterator<Item = (u64, Vec<u8>, f64, u64)> + '_ {
        (0..self.capacity).filter_map(move |slot| {
            let record = self.read_slot(slot).ok()?;
            if record.is_tombstone() {
                None
            } else {
                Some((record.id, record.name_bytes().to_vec(), record.confidence, record.timestamp))
            }
        })
    }

    pub fn durable_sync(&self) -> Result<()> {
        platform::durable_sync(self.mapping(), &self.file)
    }

    /// Persist the allocator watermark and live-node count into the
    /// header, as part of checkpoint.
    pub fn sync_header(&mut self) -> Result<()> {
        let header = Header {
            device_id: self.device_id,
            next_local_id: self.allocator.peek_next() as u64,
            total_nodes: self.node_count.load(SeqCst),
            slot_size: RECORD_SIZE as u64,
        };
        let encoded = header.encode();
        self.mapping_mut()[..HEADER_LEN].copy_from_slice(&encoded);
        self.durable_sync()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
