//! FUSE adapter
//!
//! Translates kernel requests into [`Root`] operations. Every request that
//! would modify the tree is answered with `EROFS`.
//!
//! Opens run on their own thread and reply from there. A decrypt may wait
//! indefinitely on a backing file or a plugin prompt, and must not hold up
//! the session thread that serves every other request.

use fuser::{
    Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use libc::EINVAL;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, warn};

use super::{root::BLOCK_SIZE, HandleManager, Root};
use crate::error::Result;

/// Attribute TTL for directories and the marker
const DIR_TTL: Duration = Duration::from_secs(1);

/// File sizes are only known after decryption, so file attributes are not
/// cached by the kernel
const FILE_TTL: Duration = Duration::ZERO;

/// Read-only FUSE filesystem over a [`Root`]
pub struct AgeFs {
    root: Arc<Root>,
    handles: Arc<HandleManager>,
}

impl AgeFs {
    pub fn new(root: Root) -> Self {
        Self {
            root: Arc::new(root),
            handles: Arc::new(HandleManager::new()),
        }
    }

    /// Open `ino` on a new thread and pass `(fh, open_flags)` to `done`
    pub fn spawn_open<F>(&self, ino: u64, flags: i32, done: F) -> std::io::Result<()>
    where
        F: FnOnce(Result<(u64, u32)>) + Send + 'static,
    {
        let root = Arc::clone(&self.root);
        let handles = Arc::clone(&self.handles);

        std::thread::Builder::new()
            .name(format!("agefs-open-{}", ino))
            .spawn(move || {
                let result = root.open(ino, flags).map(|file| {
                    let open_flags = file.open_flags;
                    (handles.open(file), open_flags)
                });
                done(result);
            })
            .map(drop)
    }

    fn ttl(attr: &fuser::FileAttr) -> Duration {
        if attr.kind == fuser::FileType::RegularFile {
            FILE_TTL
        } else {
            DIR_TTL
        }
    }
}

impl Filesystem for AgeFs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!("lookup(parent={}, name={:?})", parent, name);

        match self.root.lookup(parent, &name.to_string_lossy()) {
            Ok(attr) => reply.entry(&Self::ttl(&attr), &attr, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        debug!("getattr(ino={})", ino);

        match self.root.attr(ino) {
            Ok(attr) => reply.attr(&Self::ttl(&attr), &attr),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("readdir(ino={}, offset={})", ino, offset);

        let entries = match self.root.read_dir(ino) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(e.to_errno());
                return;
            }
        };

        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, entry) in entries.iter().enumerate().skip(skip) {
            let buffer_full = reply.add(entry.ino, (i + 1) as i64, entry.kind, &entry.name);
            if buffer_full {
                break;
            }
        }

        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!("open(ino={}, flags={:#x})", ino, flags);

        let spawned = self.spawn_open(ino, flags, move |result| match result {
            Ok((fh, open_flags)) => reply.opened(fh, open_flags),
            Err(e) => reply.error(e.to_errno()),
        });

        // A reply dropped unsent answers EIO
        if let Err(e) = spawned {
            error!("Failed to spawn open thread for inode {}: {}", ino, e);
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!("read(ino={}, fh={}, offset={}, size={})", ino, fh, offset, size);

        let Ok(offset) = u64::try_from(offset) else {
            reply.error(EINVAL);
            return;
        };

        match self.handles.get(fh) {
            Ok(file) => reply.data(file.read(offset, size)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        debug!("release(ino={}, fh={})", ino, fh);

        if self.handles.close(fh).is_none() {
            warn!("release of unknown handle {}", fh);
        }
        reply.ok();
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        debug!("access(ino={}, mask={})", ino, mask);

        match self.root.check_access(ino, mask) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        reply.statfs(
            0,                                 // blocks
            0,                                 // bfree
            0,                                 // bavail
            self.root.tree().node_count() as u64, // files
            0,                                 // ffree
            BLOCK_SIZE,                        // bsize
            255,                               // namelen
            BLOCK_SIZE,                        // frsize
        );
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(self.root.reject_mutation("unlink", parent).to_errno());
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(self.root.reject_mutation("rmdir", parent).to_errno());
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        reply.error(self.root.reject_mutation("mkdir", parent).to_errno());
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        reply.error(self.root.reject_mutation("mknod", parent).to_errno());
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        reply.error(self.root.reject_mutation("create", parent).to_errno());
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        _link_name: &OsStr,
        _target: &Path,
        reply: ReplyEntry,
    ) {
        reply.error(self.root.reject_mutation("symlink", parent).to_errno());
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _newparent: u64,
        _newname: &OsStr,
        reply: ReplyEntry,
    ) {
        reply.error(self.root.reject_mutation("link", ino).to_errno());
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        _name: &OsStr,
        _newparent: u64,
        _newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        reply.error(self.root.reject_mutation("rename", parent).to_errno());
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _offset: i64,
        _data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        reply.error(self.root.reject_mutation("write", ino).to_errno());
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        _size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        reply.error(self.root.reject_mutation("setattr", ino).to_errno());
    }
}
