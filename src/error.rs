//! Error types for agefs
//!
//! Startup errors (manifest, identities, configuration) abort the process.
//! Per-operation errors are converted to an errno with [`Error::to_errno`]
//! and returned to the single caller that triggered them.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed manifest document or invalid entry
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// One key-source file could not be read or parsed
    #[error("Failed to load identities from {path:?}: {reason}")]
    IdentityParse { path: PathBuf, reason: String },

    /// No usable identity across all key sources
    #[error("No identities loaded; at least one usable identity is required")]
    NoIdentities,

    /// Any attempt to modify the filesystem
    #[error("Read-only filesystem")]
    ReadOnly,

    /// Backing ciphertext file could not be read
    #[error("Failed to read backing file {path:?}: {source}")]
    BackingRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Decryption failed. The reason is kept for logs only; callers see EIO
    /// regardless of whether the key or the ciphertext was at fault.
    #[error("Decryption failed: {0}")]
    Decrypt(String),

    #[error("No such inode: {0}")]
    NotFound(u64),

    #[error("Not a directory: {0}")]
    NotADirectory(u64),

    #[error("Is a directory: {0}")]
    IsADirectory(u64),

    #[error("Invalid file handle: {0}")]
    InvalidHandle(u64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Forking into the background failed
    #[error("Daemon error: {0}")]
    Daemon(String),
}

impl Error {
    /// Convert to the errno reported to the kernel
    pub fn to_errno(&self) -> i32 {
        match self {
            Error::ReadOnly => libc::EROFS,
            Error::BackingRead { .. } | Error::Decrypt(_) => libc::EIO,
            Error::NotFound(_) => libc::ENOENT,
            Error::NotADirectory(_) => libc::ENOTDIR,
            Error::IsADirectory(_) => libc::EISDIR,
            Error::InvalidHandle(_) => libc::EBADF,
            Error::Manifest(_)
            | Error::IdentityParse { .. }
            | Error::NoIdentities
            | Error::Config(_)
            | Error::InvalidConfig(_)
            | Error::Daemon(_) => libc::EINVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(Error::ReadOnly.to_errno(), libc::EROFS);
        assert_eq!(Error::Decrypt("no identity matched".into()).to_errno(), libc::EIO);
        assert_eq!(Error::NotFound(7).to_errno(), libc::ENOENT);
        assert_eq!(Error::NotADirectory(2).to_errno(), libc::ENOTDIR);
        assert_eq!(Error::IsADirectory(1).to_errno(), libc::EISDIR);
        assert_eq!(Error::InvalidHandle(9).to_errno(), libc::EBADF);
    }

    #[test]
    fn test_backing_read_is_io_error() {
        let err = Error::BackingRead {
            path: PathBuf::from("/data/missing.age"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(err.to_errno(), libc::EIO);
        assert!(err.to_string().contains("missing.age"));
    }

    #[test]
    fn test_decrypt_errors_are_indistinguishable_to_callers() {
        let wrong_key = Error::Decrypt("no matching keys".into());
        let corrupt = Error::Decrypt("header MAC mismatch".into());
        assert_eq!(wrong_key.to_errno(), corrupt.to_errno());
    }
}
