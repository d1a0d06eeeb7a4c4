use log::{debug, warn};

use std::{
    fs,
    sync::{
        atomic::{AtomicU64, Ordering::SeqCst},
        mpsc, Arc, Condvar, Mutex,
    },
    time::Instant,
};

use crate::{
    err_at,
    util::thread::{self, Thread},
    wal::{Config, Entry, Header, OpCode, HEADER_LEN},
    Result,
};

enum Req {
    Append(u64, Vec<u8>),
    FlushNow,
    Checkpoint(u64, u64),
}

enum Res {
    Flushed(u64),
    Checkpointed,
}

/// Write-ahead log. Owns the on-disk file through a single background
/// flusher thread; the handle returned to callers is cheap to clone and
/// share between the writer and any code that wants to await durability.
pub struct Wal {
    config: Config,
    next_sequence: Arc<AtomicU64>,
    watermark: Arc<(Mutex<u64>, Condvar)>,
    tx: Option<thread::Tx<Req, Res>>,
    th: Option<Thread<Req, Res, Result<()>>>,
}

impl Wal {
    /// Create a fresh WAL file at `config.path`, overwriting anything
    /// already there.
    pub fn create(config: Config) -> Result<Wal> {
        let mut file = err_at!(
            IoError,
            fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&config.path)
        )?;
        let header = Header::fresh();
        crate::util::sync_write(&mut file, &header.encode())?;
        Self::start(config, file, header)
    }

    /// Load an existing WAL file, leaving its header as-is; the caller is
    /// expected to call [Wal::recover] before issuing new appends.
    pub fn load(config: Config) -> Result<Wal> {
        let mut file = err_at!(
            IoError,
            fs::OpenOptions::new().read(true).write(true).open(&config.path)
        )?;
        let header = {
            use std::io::Read;
            let mut buf = [0u8; HEADER_LEN];
            err_at!(IoError, file.read_exact(&mut buf))?;
            Header::decode(&buf)?
        };
        // Un-checkpointed entries may already sit past the header (that is
        // the whole point of recovery); resume appending at the true end
        // of the file, not right after the header.
        {
            use std::io::{Seek, SeekFrom};
            err_at!(IoError, file.seek(SeekFrom::End(0)))?;
        }
        Self::start(config, file, header)
    }

    fn start(config: Config, file: fs::File, header: Header) -> Result<Wal> {
        let next_sequence = Arc::new(AtomicU64::new(header.next_sequence));
        let watermark = Arc::new((Mutex::new(header.checkpointed_sequence), Condvar::new()));

        let loop_config = config.clone();
        let loop_watermark = Arc::clone(&watermark);
        let th = Thread::new("wal-flusher", move |rx: thread::Rx<Req, Res>| {
            move || Self::run(loop_config, file, rx, loop_watermark)
        });
        let tx = th.to_tx();

        Ok(Wal { config, next_sequence, watermark, tx: Some(tx), th: Some(th) })
    }

    /// The live sender clone to the flusher thread. Panics if called after
    /// [Wal::close], which is a programming error (the handle is consumed
    /// by `close`).
    fn tx(&self) -> &thread::Tx<Req, Res> {
        self.tx.as_ref().expect("wal already closed")
    }

    /// Format and enqueue an entry, returning its sequence number. The
    /// entry is not guaranteed durable until [Wal::wait_flushed] for this
    /// sequence returns.
    pub fn append(&self, op: OpCode, node_id: u64, payload: Vec<u8>) -> Result<u64> {
        let sequence = self.next_sequence.fetch_add(1, SeqCst);
        let entry = Entry::new(sequence, op, node_id, payload);
        let mut encoded = vec![];
        entry.encode(&mut encoded)?;
        self.tx().post(Req::Append(sequence, encoded))?;
        Ok(sequence)
    }

    /// Force the flusher to fsync whatever is pending right now, and
    /// return the highest sequence now known durable.
    pub fn flush(&self) -> Result<u64> {
        match self.tx().request(Req::FlushNow)? {
            Res::Flushed(seq) => Ok(seq),
            Res::Checkpointed => unreachable!(),
        }
    }

    /// Block until the flusher has durably written at least `sequence`.
    pub fn wait_flushed(&self, sequence: u64) -> Result<()> {
        if sequence == 0 || self.durable_sequence() >= sequence {
            return Ok(());
        }
        self.flush()?;
        let (mutex, cond) = &*self.watermark;
        let guard = err_at!(Fatal, mutex.lock())?;
        err_at!(Fatal, cond.wait_while(guard, |watermark| *watermark < sequence))?;
        Ok(())
    }

    /// Highest sequence known to be durably persisted.
    pub fn durable_sequence(&self) -> u64 {
        *self.watermark.0.lock().unwrap()
    }

    /// Next sequence that will be handed out by `append`.
    pub fn peek_next_sequence(&self) -> u64 {
        self.next_sequence.load(SeqCst)
    }

    /// Record `checkpointed_sequence` in the header, fsync, and truncate
    /// the log back to just the header. `store_sync` runs first so the
    /// store file is durable before the WAL is allowed to forget the
    /// entries it covers.
    pub fn checkpoint<F>(&self, store_sync: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        let flushed = self.flush()?;
        store_sync()?;

        let next = self.next_sequence.load(SeqCst);
        match self.tx().request(Req::Checkpoint(flushed, next))? {
            Res::Checkpointed => {
                debug!(target: "wal", "checkpoint at sequence {}", flushed);
                Ok(())
            }
            Res::Flushed(_) => unreachable!(),
        }
    }

    /// Scan the WAL from `checkpointed_sequence + 1` and invoke `apply`
    /// once per entry in ascending sequence order. A malformed or short
    /// trailing entry stops the scan and truncates the file to the last
    /// intact boundary; the number of bytes discarded is returned.
    pub fn recover<F>(config: &Config, mut apply: F) -> Result<(Header, usize)>
    where
        F: FnMut(&Entry) -> Result<()>,
    {
        use std::io::Read;

        let mut file = err_at!(
            IoError,
            fs::OpenOptions::new().read(true).write(true).open(&config.path)
        )?;
        let mut buf = vec![];
        err_at!(IoError, file.read_to_end(&mut buf))?;

        if buf.len() < HEADER_LEN {
            return err_at!(Fatal, msg: "wal file shorter than its header: {} bytes", buf.len());
        }
        let header = Header::decode(&buf[..HEADER_LEN])?;

        let mut offset = HEADER_LEN;
        let mut discarded = 0usize;
        loop {
            match Entry::decode(&buf[offset..]) {
                Ok(Some((entry, consumed))) => {
                    if entry.sequence > header.checkpointed_sequence {
                        apply(&entry)?;
                    }
                    offset += consumed;
                }
                Ok(None) => {
                    discarded = buf.len() - offset;
                    break;
                }
                Err(err) => {
                    warn!(target: "wal", "truncating wal at offset {}: {}", offset, err);
                    discarded = buf.len() - offset;
                    break;
                }
            }
        }

        if discarded > 0 {
            err_at!(IoError, file.set_len(offset as u64))?;
            err_at!(IoError, file.sync_all())?;
        }

        Ok((header, discarded))
    }

    pub fn close(mut self) -> Result<()> {
        // Drop our own sender clone first: the flusher loop only exits on
        // channel disconnect, which cannot happen while this handle is
        // still alive, so joining before dropping it would hang forever.
        self.tx.take();
        if let Some(th) = self.th.take() {
            th.join()??;
        }
        Ok(())
    }

    fn run(
        config: Config,
        mut file: fs::File,
        rx: thread::Rx<Req, Res>,
        watermark: Arc<(Mutex<u64>, Condvar)>,
    ) -> Result<()> {
        let mut pending = Vec::new();
        let mut pending_high = *watermark.0.lock().unwrap();
        let mut last_flush = Instant::now();

        loop {
            let mut batch = vec![];
            let mut disconnected = false;

            match rx.recv_timeout(config.batch_window) {
                Ok(item) => batch.push(item),
                Err(mpsc::RecvTimeoutError::Timeout) => (),
                Err(mpsc::RecvTimeoutError::Disconnected) => disconnected = true,
            }
            if !disconnected {
                loop {
                    match rx.try_recv() {
                        Ok(item) => batch.push(item),
                        Err(mpsc::TryRecvError::Empty) => break,
                        Err(mpsc::TryRecvError::Disconnected) => {
                            disconnected = true;
                            break;
                        }
                    }
                }
            }

            let mut checkpoint: Option<(u64, u64, mpsc::Sender<Res>)> = None;
            let mut flush_replies = vec![];
            let mut want_flush = false;

            for (req, reply) in batch {
                match req {
                    Req::Append(seq, bytes) => {
                        pending.extend_from_slice(&bytes);
                        pending_high = pending_high.max(seq);
                        if let Some(reply) = reply {
                            flush_replies.push(reply);
                        }
                    }
                    Req::FlushNow => {
                        want_flush = true;
                        if let Some(reply) = reply {
                            flush_replies.push(reply);
                        }
                    }
                    Req::Checkpoint(flushed_seq, next_seq) => {
                        want_flush = true;
                        if let Some(reply) = reply {
                            checkpoint = Some((flushed_seq, next_seq, reply));
                        }
                    }
                }
            }

            let approx_entries = pending.len() / super::entry::ENTRY_HEADER_LEN.max(1);
            let over_batch_max = approx_entries >= config.batch_max;
            let window_elapsed =
                last_flush.elapsed() >= config.batch_window && approx_entries >= config.batch_min;

            if want_flush || over_batch_max || window_elapsed || disconnected || checkpoint.is_some() {
                if !pending.is_empty() {
                    use std::io::Write;
                    let n = err_at!(IoError, file.write(&pending))?;
                    if n != pending.len() {
                        err_at!(IoError, msg: "partial write to wal: {} of {} bytes", n, pending.len())?;
                    }
                    if config.fsync {
                        err_at!(IoError, file.sync_all())?;
                    }
                    pending.clear();
                }
                last_flush = Instant::now();

                let published = {
                    let (mutex, cond) = &*watermark;
                    let mut guard = mutex.lock().unwrap();
                    *guard = pending_high.max(*guard);
                    cond.notify_all();
                    *guard
                };
                for reply in flush_replies {
                    reply.send(Res::Flushed(published)).ok();
                }

                if let Some((flushed_seq, next_seq, reply)) = checkpoint {
                    let header = Header {
                        version: super::header::VERSION,
                        checkpointed_sequence: flushed_seq,
                        next_sequence: next_seq,
                    };
                    Self::rewrite_header(&mut file, &header)?;
                    reply.send(Res::Checkpointed).ok();
                }
            }

            if disconnected {
                break;
            }
        }

        Ok(())
    }

    fn rewrite_header(file: &mut fs::File, header: &Header) -> Result<()> {
        use std::io::{Seek, SeekFrom, Write};

        err_at!(IoError, file.seek(SeekFrom::Start(0)))?;
        err_at!(IoError, file.write_all(&header.encode()))?;
        err_at!(IoError, file.sync_all())?;

        let cur_len = err_at!(IoError, file.metadata())?.len();
        if cur_len > HEADER_LEN as u64 {
            err_at!(IoError, file.set_len(HEADER_LEN as u64))?;
            err_at!(IoError, file.sync_all())?;
        }
        // Position at the end of the (now-truncated) header so the next
        // append writes immediately after it, not at the old pre-truncate
        // end-of-file offset.
        err_at!(IoError, file.seek(SeekFrom::Start(HEADER_LEN as u64)))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "wal_test.rs"]
mod wal_test;
