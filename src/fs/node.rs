//! Decrypt-on-open file nodes
//!
//! A node moves `Unread -> CiphertextLoaded -> Decrypted` the first time it
//! is opened. Under [`CachePolicy::KeepCached`] the transitions run inside a
//! per-node lock so concurrent openers wait for a single decrypt and then
//! share its plaintext. Under [`CachePolicy::DirectIo`] nothing is kept on
//! the node and every open reads and decrypts into its own buffer.
//!
//! Failed reads or decrypts leave the node where it was, so the next open
//! retries.

use crate::crypto::{self, Identity};
use crate::error::{Error, Result};
use crate::fs::CachePolicy;
use crate::manifest::ManifestEntry;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};
use zeroize::Zeroizing;

/// Decrypted file contents, wiped when the last reference drops
pub type Plaintext = Arc<Zeroizing<Vec<u8>>>;

/// Observable lifecycle phase of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePhase {
    Unread,
    CiphertextLoaded,
    Decrypted,
}

enum NodeState {
    Unread,
    CiphertextLoaded { ciphertext: Vec<u8>, armored: bool },
    Decrypted { plaintext: Plaintext },
}

/// Counters of the expensive work a node has done
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Backing file reads attempted
    pub backing_reads: u64,
    /// Decrypt calls attempted
    pub decrypts: u64,
}

/// Check whether open flags request write access
pub fn wants_write(flags: i32) -> bool {
    let accmode = flags & libc::O_ACCMODE;
    accmode == libc::O_WRONLY || accmode == libc::O_RDWR
}

/// A manifest-backed file
pub struct FileNode {
    entry: ManifestEntry,
    state: Mutex<NodeState>,
    backing_reads: AtomicU64,
    decrypts: AtomicU64,
}

impl FileNode {
    pub fn new(entry: ManifestEntry) -> Self {
        Self {
            entry,
            state: Mutex::new(NodeState::Unread),
            backing_reads: AtomicU64::new(0),
            decrypts: AtomicU64::new(0),
        }
    }

    pub fn entry(&self) -> &ManifestEntry {
        &self.entry
    }

    pub fn phase(&self) -> NodePhase {
        match &*self.state.lock() {
            NodeState::Unread => NodePhase::Unread,
            NodeState::CiphertextLoaded { .. } => NodePhase::CiphertextLoaded,
            NodeState::Decrypted { .. } => NodePhase::Decrypted,
        }
    }

    pub fn stats(&self) -> NodeStats {
        NodeStats {
            backing_reads: self.backing_reads.load(Ordering::SeqCst),
            decrypts: self.decrypts.load(Ordering::SeqCst),
        }
    }

    /// Length of the retained plaintext, if any
    ///
    /// Does not wait on an open that is currently decrypting.
    pub fn cached_len(&self) -> Option<u64> {
        match &*self.state.try_lock()? {
            NodeState::Decrypted { plaintext } => Some(plaintext.len() as u64),
            _ => None,
        }
    }

    /// Open the node and return its plaintext
    ///
    /// Write access is refused before any I/O happens.
    pub fn open(
        &self,
        flags: i32,
        identities: &[Identity],
        policy: CachePolicy,
    ) -> Result<Plaintext> {
        if wants_write(flags) {
            return Err(Error::ReadOnly);
        }

        let result = if policy.retains_plaintext() {
            let mut state = self.state.lock();
            self.advance(&mut state, identities)
        } else {
            self.read_backing()
                .and_then(|ciphertext| {
                    let armored = crypto::is_armored(&ciphertext);
                    self.decrypt(&ciphertext, armored, identities)
                })
                .map(Arc::new)
        };

        if let Err(e) = &result {
            error!("Failed to open {}: {}", self.entry.name, e);
        }
        result
    }

    fn advance(&self, state: &mut NodeState, identities: &[Identity]) -> Result<Plaintext> {
        loop {
            match state {
                NodeState::Decrypted { plaintext } => return Ok(Arc::clone(plaintext)),
                NodeState::Unread => {
                    let ciphertext = self.read_backing()?;
                    let armored = crypto::is_armored(&ciphertext);
                    *state = NodeState::CiphertextLoaded { ciphertext, armored };
                }
                NodeState::CiphertextLoaded { ciphertext, armored } => {
                    let plaintext = Arc::new(self.decrypt(ciphertext, *armored, identities)?);
                    *state = NodeState::Decrypted { plaintext };
                }
            }
        }
    }

    fn read_backing(&self) -> Result<Vec<u8>> {
        self.backing_reads.fetch_add(1, Ordering::SeqCst);
        debug!("Reading {:?}", self.entry.file);

        std::fs::read(&self.entry.file).map_err(|source| Error::BackingRead {
            path: self.entry.file.clone(),
            source,
        })
    }

    fn decrypt(
        &self,
        ciphertext: &[u8],
        armored: bool,
        identities: &[Identity],
    ) -> Result<Zeroizing<Vec<u8>>> {
        self.decrypts.fetch_add(1, Ordering::SeqCst);
        info!("Decrypting {:?}", self.entry.file);
        crypto::decrypt(ciphertext, armored, identities)
    }
}
