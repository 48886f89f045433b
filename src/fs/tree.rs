//! Virtual directory tree
//!
//! Nodes live in an arena indexed by inode number. The tree is built once,
//! single-threaded, from the manifest and is never mutated afterwards.

use crate::error::{Error, Result};
use crate::fs::FileNode;
use crate::manifest::ManifestEntry;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Inode of the mount root
pub const ROOT_INO: u64 = 1;

/// Inode of the ready marker
pub const MARKER_INO: u64 = 2;

/// Name of the empty file whose presence signals that the mount is ready
pub const MARKER_NAME: &str = ".agefs";

/// What a tree node is
pub enum NodeKind {
    /// Directory created while walking manifest paths
    Directory { children: BTreeMap<String, u64> },
    /// Manifest-backed file
    File(Arc<FileNode>),
    /// Ready marker
    Marker,
}

/// A node in the tree
pub struct TreeNode {
    pub ino: u64,
    pub parent: u64,
    pub name: String,
    pub kind: NodeKind,
}

impl TreeNode {
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }

    pub fn file(&self) -> Option<&Arc<FileNode>> {
        match &self.kind {
            NodeKind::File(file) => Some(file),
            _ => None,
        }
    }

    pub fn to_fuser_type(&self) -> fuser::FileType {
        if self.is_dir() {
            fuser::FileType::Directory
        } else {
            fuser::FileType::RegularFile
        }
    }
}

/// Arena-backed directory tree
pub struct Tree {
    nodes: Vec<TreeNode>,
}

impl Tree {
    /// Create a tree holding only the root and the marker
    pub fn new() -> Self {
        let mut tree = Self {
            nodes: vec![TreeNode {
                ino: ROOT_INO,
                parent: ROOT_INO,
                name: String::new(),
                kind: NodeKind::Directory {
                    children: BTreeMap::new(),
                },
            }],
        };
        tree.attach(ROOT_INO, MARKER_NAME, NodeKind::Marker);
        tree
    }

    /// Build a tree from manifest entries
    pub fn build(entries: &[ManifestEntry]) -> Result<Self> {
        let mut tree = Self::new();
        for entry in entries {
            tree.insert(entry.clone())?;
        }
        Ok(tree)
    }

    /// Insert one entry, creating missing parent directories
    ///
    /// Two entries on the same path, or a path that runs through an existing
    /// file, are rejected.
    pub fn insert(&mut self, entry: ManifestEntry) -> Result<u64> {
        entry.file_mode()?;
        let mut components = entry.components()?;
        let leaf = components.pop().ok_or_else(|| {
            Error::Manifest(format!("entry {:?} has an empty virtual path", entry.name))
        })?;

        let mut parent = ROOT_INO;
        for component in &components {
            parent = self.ensure_dir(parent, component, &entry.name)?;
        }

        if let Some(existing) = self.child(parent, &leaf) {
            let what = if existing.is_dir() { "a directory" } else { "a file" };
            return Err(Error::Manifest(format!(
                "entry {:?} collides with {} at the same path",
                entry.name, what
            )));
        }

        Ok(self.attach(parent, &leaf, NodeKind::File(Arc::new(FileNode::new(entry)))))
    }

    fn ensure_dir(&mut self, parent: u64, name: &str, entry_name: &str) -> Result<u64> {
        match self.child(parent, name) {
            Some(node) if node.is_dir() => Ok(node.ino),
            Some(_) => Err(Error::Manifest(format!(
                "entry {:?} uses file {:?} as a directory",
                entry_name, name
            ))),
            None => Ok(self.attach(
                parent,
                name,
                NodeKind::Directory {
                    children: BTreeMap::new(),
                },
            )),
        }
    }

    fn attach(&mut self, parent: u64, name: &str, kind: NodeKind) -> u64 {
        let ino = self.nodes.len() as u64 + 1;
        self.nodes.push(TreeNode {
            ino,
            parent,
            name: name.to_string(),
            kind,
        });

        if let Some(NodeKind::Directory { children }) =
            self.nodes.get_mut((parent - 1) as usize).map(|node| &mut node.kind)
        {
            children.insert(name.to_string(), ino);
        }
        ino
    }

    /// Get a node by inode
    pub fn get(&self, ino: u64) -> Option<&TreeNode> {
        let index = usize::try_from(ino.checked_sub(1)?).ok()?;
        self.nodes.get(index)
    }

    fn child(&self, parent: u64, name: &str) -> Option<&TreeNode> {
        match &self.get(parent)?.kind {
            NodeKind::Directory { children } => self.get(*children.get(name)?),
            _ => None,
        }
    }

    /// Look up `name` inside directory `parent`
    pub fn lookup(&self, parent: u64, name: &str) -> Result<&TreeNode> {
        let node = self.get(parent).ok_or(Error::NotFound(parent))?;
        if !node.is_dir() {
            return Err(Error::NotADirectory(parent));
        }
        self.child(parent, name).ok_or(Error::NotFound(parent))
    }

    /// Children of a directory, in name order
    pub fn children(&self, ino: u64) -> Result<Vec<&TreeNode>> {
        match &self.get(ino).ok_or(Error::NotFound(ino))?.kind {
            NodeKind::Directory { children } => Ok(children
                .values()
                .filter_map(|child| self.get(*child))
                .collect()),
            _ => Err(Error::NotADirectory(ino)),
        }
    }

    /// Resolve a slash-separated virtual path from the root
    pub fn resolve(&self, path: &str) -> Option<&TreeNode> {
        path.split('/')
            .filter(|part| !part.is_empty())
            .try_fold(self.get(ROOT_INO)?, |node, part| self.child(node.ino, part))
    }

    /// Iterate over every file node
    pub fn files(&self) -> impl Iterator<Item = &Arc<FileNode>> {
        self.nodes.iter().filter_map(TreeNode::file)
    }

    /// Total number of nodes, root and marker included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}
