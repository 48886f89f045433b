//! agefs - Read-only FUSE filesystem over age-encrypted files
//!
//! A manifest maps virtual paths to encrypted backing files. Files are
//! decrypted on open with the identities loaded at startup and served
//! as plain read-only files.

pub mod config;
pub mod crypto;
pub mod daemon;
pub mod error;
pub mod fs;
pub mod manifest;

pub use config::Config;
pub use error::{Error, Result};

