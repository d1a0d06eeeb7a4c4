//! Module `platform` hides the POSIX/Windows differences behind five
//! primitives: open-and-create, extend, map, durable-sync, and
//! truncate-and-finalize. Every other module talks to the filesystem only
//! through these functions.

use fs2::FileExt;
use memmap2::{MmapMut, MmapOptions};

use std::fs;

use crate::{err_at, Result};

/// Allocation granularity callers must respect when choosing mmap offsets
/// and growth increments: 4 KiB on POSIX, 64 KiB on Windows.
#[cfg(not(windows))]
pub const ALLOCATION_GRANULARITY: u64 = 4 * 1024;
#[cfg(windows)]
pub const ALLOCATION_GRANULARITY: u64 = 64 * 1024;

/// Open `path` for read-write access, creating it if absent, and ensure it
/// is at least `initial_size` bytes long.
pub fn file_open_rw_create(path: &std::path::Path, initial_size: u64) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        err_at!(IoError, fs::create_dir_all(parent))?;
    }
    let file = err_at!(
        IoError,
        fs::OpenOptions::new().read(true).write(true).create(true).open(path)
    )?;
    let len = err_at!(IoError, file.metadata())?.len();
    if len < initial_size {
        err_at!(IoError, file.set_len(initial_size))?;
    }
    Ok(file)
}

/// Grow `file` to `new_size`. Caller must ensure no mapping is active over
/// this file while it grows.
pub fn file_extend(file: &fs::File, new_size: u64) -> Result<()> {
    err_at!(IoError, file.set_len(new_size))
}

/// Map the first `len` bytes of `file`. Mappings are always read-write;
/// read-only views are obtained by the caller simply not mutating through
/// the returned handle.
pub fn map_region(file: &fs::File, len: usize, writable: bool) -> Result<MmapMut> {
    if !writable {
        return err_at!(InvalidPath, msg: "read-only mapping not supported, len {}", len);
    }
    err_at!(IoError, unsafe { MmapOptions::new().len(len).map_mut(file) })
}

/// Flush the mapped view's dirty pages and the underlying file's buffers.
/// On platforms with a unified fsync this is one syscall; on platforms
/// with a split view-flush/file-flush both are required, in this order.
pub fn durable_sync(mapping: &MmapMut, file: &fs::File) -> Result<()> {
    err_at!(IoError, mapping.flush())?;
    err_at!(IoError, file.sync_all())
}

/// Shrink `file` to `new_size` and durably commit that length.
pub fn truncate_and_finalize(file: &fs::File, new_size: u64) -> Result<()> {
    err_at!(IoError, file.set_len(new_size))?;
    err_at!(IoError, file.sync_all())
}

/// Take an advisory exclusive lock on `file`, failing fast instead of
/// blocking if another handle (in this or another process) already holds
/// it. Backs the single-writer enforcement in `Lattice::open`.
pub fn try_lock_exclusive(file: &fs::File) -> Result<()> {
    use std::io;

    match file.try_lock_exclusive() {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
            err_at!(AlreadyOpen, msg: "store file already locked by another handle")
        }
        Err(err) => err_at!(IoError, Err::<(), _>(err)),
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
