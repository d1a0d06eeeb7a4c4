//! Module implement common utility functions and types shared by the
//! `wal`, `store`, and `prefix_index` modules.

use std::fs;

use crate::{err_at, Result};

pub mod spinlock;
pub mod thread;

pub use spinlock::Spinlock;
pub use thread::Thread;

/// Write `data` in full and fsync the file, erroring on a short write.
pub fn sync_write(file: &mut fs::File, data: &[u8]) -> Result<usize> {
    use std::io::Write;

    let n = err_at!(IoError, file.write(data))?;
    if n != data.len() {
        err_at!(IoError, msg: "partial write to file {} {}", n, data.len())?;
    }
    err_at!(IoError, file.sync_all())?;
    Ok(n)
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
