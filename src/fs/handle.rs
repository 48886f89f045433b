//! Open file handle management

use crate::error::{Error, Result};
use crate::fs::Plaintext;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// An open file: a read-only view over decrypted contents
pub struct OpenFile {
    /// Inode number
    pub ino: u64,
    /// Plaintext served by this handle
    pub data: Plaintext,
    /// `fuse_open_out` flags replied to the kernel
    pub open_flags: u32,
}

impl OpenFile {
    pub fn new(ino: u64, data: Plaintext, open_flags: u32) -> Self {
        Self {
            ino,
            data,
            open_flags,
        }
    }

    /// Bytes in `[offset, offset + size)`, clipped to the end of the file
    pub fn read(&self, offset: u64, size: u32) -> &[u8] {
        let len = self.data.len();
        let start = usize::try_from(offset).map_or(len, |offset| offset.min(len));
        let end = start.saturating_add(size as usize).min(len);
        &self.data[start..end]
    }

}

impl std::fmt::Debug for OpenFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print plaintext
        f.debug_struct("OpenFile")
            .field("ino", &self.ino)
            .field("len", &self.data.len())
            .field("open_flags", &self.open_flags)
            .finish()
    }
}

/// Manages open file handles
pub struct HandleManager {
    /// Next handle ID
    next_fh: AtomicU64,
    /// Open handles
    handles: RwLock<HashMap<u64, Arc<OpenFile>>>,
}

impl HandleManager {
    pub fn new() -> Self {
        Self {
            next_fh: AtomicU64::new(1),
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Register an open file and return its handle ID
    pub fn open(&self, file: OpenFile) -> u64 {
        let fh = self.next_fh.fetch_add(1, Ordering::SeqCst);
        self.handles.write().insert(fh, Arc::new(file));
        fh
    }

    /// Get a handle by ID
    pub fn get(&self, fh: u64) -> Result<Arc<OpenFile>> {
        self.handles
            .read()
            .get(&fh)
            .cloned()
            .ok_or(Error::InvalidHandle(fh))
    }

    /// Close a handle, dropping its reference to the plaintext
    pub fn close(&self, fh: u64) -> Option<Arc<OpenFile>> {
        self.handles.write().remove(&fh)
    }
}

impl Default for HandleManager {
    fn default() -> Self {
        Self::new()
    }
}
