//! FUSE filesystem implementation
//!
//! Builds a read-only tree from the manifest and serves decrypted file
//! contents through the FUSE interface.

mod filesystem;
mod handle;
mod node;
mod policy;
mod root;
mod tree;

pub use filesystem::AgeFs;
pub use handle::{HandleManager, OpenFile};
pub use node::{wants_write, FileNode, NodePhase, NodeStats, Plaintext};
pub use policy::CachePolicy;
pub use root::{DirEntry, Root, RootSettings};
pub use tree::{NodeKind, Tree, TreeNode, MARKER_INO, MARKER_NAME, ROOT_INO};
