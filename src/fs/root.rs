//! The filesystem root: identities, defaults, cache policy and the tree
//!
//! Everything here is fixed at construction. The only mutable state is
//! inside each [`FileNode`](crate::fs::FileNode).

use crate::crypto::Identity;
use crate::error::{Error, Result};
use crate::fs::tree::{NodeKind, Tree, TreeNode};
use crate::fs::{node, CachePolicy, OpenFile, Plaintext};
use crate::manifest::ManifestEntry;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Block size reported in attributes
pub const BLOCK_SIZE: u32 = 512;

/// Permissions of generated directories
pub const DIR_PERM: u16 = 0o555;

/// Permissions of the ready marker
pub const MARKER_PERM: u16 = 0o444;

/// Defaults applied to every node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootSettings {
    /// Owner for nodes without an override
    pub uid: u32,
    /// Group for nodes without an override
    pub gid: u32,
    /// Plaintext caching policy
    pub policy: CachePolicy,
}

impl RootSettings {
    /// Settings owned by the mounting process
    pub fn current_user(policy: CachePolicy) -> Self {
        Self {
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
            policy,
        }
    }
}

/// Directory entry as returned by [`Root::read_dir`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: u64,
    pub kind: fuser::FileType,
    pub name: String,
}

pub struct Root {
    identities: Vec<Identity>,
    settings: RootSettings,
    tree: Tree,
    created: SystemTime,
}

impl Root {
    /// Build the root and its tree
    ///
    /// Refuses to start without identities.
    pub fn new(
        identities: Vec<Identity>,
        settings: RootSettings,
        entries: &[ManifestEntry],
    ) -> Result<Self> {
        if identities.is_empty() {
            return Err(Error::NoIdentities);
        }

        let tree = Tree::build(entries)?;
        info!(
            "Built tree with {} files ({} nodes), policy {:?}",
            entries.len(),
            tree.node_count(),
            settings.policy
        );

        Ok(Self {
            identities,
            settings,
            tree,
            created: SystemTime::now(),
        })
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    fn node(&self, ino: u64) -> Result<&TreeNode> {
        self.tree.get(ino).ok_or(Error::NotFound(ino))
    }

    /// Attributes of `name` inside `parent`
    pub fn lookup(&self, parent: u64, name: &str) -> Result<fuser::FileAttr> {
        let node = self.tree.lookup(parent, name)?;
        Ok(self.attr_of(node))
    }

    /// Attributes of an inode, computed on every call
    pub fn attr(&self, ino: u64) -> Result<fuser::FileAttr> {
        self.node(ino).map(|node| self.attr_of(node))
    }

    fn attr_of(&self, node: &TreeNode) -> fuser::FileAttr {
        let (perm, nlink, size, uid, gid) = match &node.kind {
            NodeKind::Directory { .. } => (DIR_PERM, 2, 0, self.settings.uid, self.settings.gid),
            NodeKind::Marker => (MARKER_PERM, 1, 0, self.settings.uid, self.settings.gid),
            NodeKind::File(file) => {
                let entry = file.entry();
                (
                    entry.perm(),
                    1,
                    file.cached_len().unwrap_or(0),
                    entry.owner.unwrap_or(self.settings.uid),
                    entry.group.unwrap_or(self.settings.gid),
                )
            }
        };

        fuser::FileAttr {
            ino: node.ino,
            size,
            blocks: size.div_ceil(BLOCK_SIZE as u64),
            atime: self.created,
            mtime: self.created,
            ctime: self.created,
            crtime: self.created,
            kind: node.to_fuser_type(),
            perm,
            nlink,
            uid,
            gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    /// Open an inode for reading
    pub fn open(&self, ino: u64, flags: i32) -> Result<OpenFile> {
        let node = self.node(ino)?;
        let open_flags = self.settings.policy.open_flags();

        match &node.kind {
            NodeKind::Directory { .. } => Err(Error::IsADirectory(ino)),
            NodeKind::Marker => {
                if node::wants_write(flags) {
                    return Err(Error::ReadOnly);
                }
                let empty: Plaintext = Arc::new(Zeroizing::new(Vec::new()));
                Ok(OpenFile::new(ino, empty, open_flags))
            }
            NodeKind::File(file) => {
                let data = file.open(flags, &self.identities, self.settings.policy)?;
                Ok(OpenFile::new(ino, data, open_flags))
            }
        }
    }

    /// Directory listing including `.` and `..`
    pub fn read_dir(&self, ino: u64) -> Result<Vec<DirEntry>> {
        let dir = self.node(ino)?;
        let children = self.tree.children(ino)?;

        let mut entries = Vec::with_capacity(children.len() + 2);
        entries.push(DirEntry {
            ino,
            kind: fuser::FileType::Directory,
            name: ".".to_string(),
        });
        entries.push(DirEntry {
            ino: dir.parent,
            kind: fuser::FileType::Directory,
            name: "..".to_string(),
        });
        entries.extend(children.into_iter().map(|child| DirEntry {
            ino: child.ino,
            kind: child.to_fuser_type(),
            name: child.name.clone(),
        }));
        Ok(entries)
    }

    /// Check an `access(2)` mask; write access is never granted
    pub fn check_access(&self, ino: u64, mask: i32) -> Result<()> {
        self.node(ino)?;
        if mask & libc::W_OK != 0 {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }

    /// Answer a request that would modify the tree
    ///
    /// The tree is fixed at construction, so every mutation is refused
    /// whether or not `ino` exists.
    pub fn reject_mutation(&self, op: &str, ino: u64) -> Error {
        debug!("{}(ino={}) refused on read-only filesystem", op, ino);
        Error::ReadOnly
    }
}
