//! Identity loading
//!
//! A key-source file is either a single SSH private key block or a
//! line-oriented file of native secret keys and plugin identities, with
//! `#` comments and blank lines allowed.

use crate::crypto::TerminalCallbacks;
use crate::error::{Error, Result};
use age::plugin::IdentityPluginV1;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Prefix of a PEM-style SSH private key file
pub const SSH_KEY_PREFIX: &str = "-----BEGIN";

/// Prefix of a plugin identity line
pub const PLUGIN_PREFIX: &str = "AGE-PLUGIN-";

/// Prefix of a native X25519 secret key line
pub const NATIVE_KEY_PREFIX: &str = "AGE-SECRET-KEY-1";

/// A decryption credential
pub enum Identity {
    /// Native X25519 secret key
    Native(age::x25519::Identity),
    /// Unencrypted SSH private key
    Ssh(age::ssh::Identity),
    /// Identity backed by an external `age-plugin-*` binary
    ///
    /// Only the identity line is parsed at load time. The plugin binary is
    /// located when a decrypt needs it.
    Plugin {
        identity: age::plugin::Identity,
        callbacks: TerminalCallbacks,
    },
}

/// An identity ready to take part in one decrypt
pub enum Unwrapper<'a> {
    Key(&'a dyn age::Identity),
    Plugin(IdentityPluginV1<TerminalCallbacks>),
}

impl Unwrapper<'_> {
    pub fn as_age(&self) -> &dyn age::Identity {
        match self {
            Unwrapper::Key(identity) => *identity,
            Unwrapper::Plugin(identity) => identity,
        }
    }
}

impl Identity {
    /// Prepare this identity for a decrypt attempt
    ///
    /// Fails for a plugin identity whose binary cannot be found.
    pub fn unwrapper(&self) -> Result<Unwrapper<'_>> {
        match self {
            Identity::Native(identity) => Ok(Unwrapper::Key(identity)),
            Identity::Ssh(identity) => Ok(Unwrapper::Key(identity)),
            Identity::Plugin {
                identity,
                callbacks,
            } => IdentityPluginV1::new(identity.plugin(), std::slice::from_ref(identity), *callbacks)
                .map(Unwrapper::Plugin)
                .map_err(|e| Error::Decrypt(e.to_string())),
        }
    }

    /// Short label for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Identity::Native(_) => "native",
            Identity::Ssh(_) => "ssh",
            Identity::Plugin { .. } => "plugin",
        }
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.debug_tuple("Identity").field(&self.kind()).finish()
    }
}

/// Load identities from every key source, in order
///
/// A source that cannot be read or parsed is logged and skipped. Ending up
/// with no identities at all is an error, since nothing could ever be
/// decrypted.
pub fn load_identities<P: AsRef<Path>>(
    paths: &[P],
    callbacks: &TerminalCallbacks,
) -> Result<Vec<Identity>> {
    let mut identities = Vec::new();

    for path in paths {
        let path = path.as_ref();
        info!("Loading identities from {:?}", path);

        match load_identity_file(path, callbacks) {
            Ok(loaded) => {
                debug!("Loaded {} identities from {:?}", loaded.len(), path);
                identities.extend(loaded);
            }
            Err(e) => warn!("Skipping identity source: {}", e),
        }
    }

    info!("Loaded {} identities", identities.len());

    if identities.is_empty() {
        return Err(Error::NoIdentities);
    }
    Ok(identities)
}

/// Load every identity in one key-source file
pub fn load_identity_file(path: &Path, callbacks: &TerminalCallbacks) -> Result<Vec<Identity>> {
    let content = std::fs::read(path).map_err(|e| Error::IdentityParse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_identities(&content, path, callbacks)
}

/// Parse the contents of a key-source file
///
/// `path` is used for error messages and SSH key diagnostics only.
pub fn parse_identities(
    content: &[u8],
    path: &Path,
    callbacks: &TerminalCallbacks,
) -> Result<Vec<Identity>> {
    let fail = |reason: String| Error::IdentityParse {
        path: path.to_path_buf(),
        reason,
    };

    if content.starts_with(SSH_KEY_PREFIX.as_bytes()) {
        return parse_ssh_identity(content, path).map(|identity| vec![identity]).map_err(fail);
    }

    let text = std::str::from_utf8(content)
        .map_err(|_| fail("file is neither an SSH key nor UTF-8 text".to_string()))?;

    let mut identities = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parsed = if line.starts_with(PLUGIN_PREFIX) {
            parse_plugin_identity(line, callbacks)
        } else if line.starts_with(NATIVE_KEY_PREFIX) {
            line.parse::<age::x25519::Identity>()
                .map(Identity::Native)
                .map_err(str::to_string)
        } else {
            Err("unrecognised identity".to_string())
        };

        let identity = parsed
            .map_err(|reason| fail(format!("line {}: {}", index + 1, reason)))?;
        identities.push(identity);
    }

    Ok(identities)
}

fn parse_ssh_identity(content: &[u8], path: &Path) -> std::result::Result<Identity, String> {
    let filename = Some(path.to_string_lossy().into_owned());
    let identity = age::ssh::Identity::from_buffer(content, filename)
        .map_err(|e| format!("failed to parse SSH identity: {}", e))?;

    match identity {
        age::ssh::Identity::Unencrypted(_) => Ok(Identity::Ssh(identity)),
        age::ssh::Identity::Encrypted(_) => {
            Err("passphrase-protected SSH keys are not supported".to_string())
        }
        age::ssh::Identity::Unsupported(_) => Err("unsupported SSH key type".to_string()),
    }
}

fn parse_plugin_identity(
    line: &str,
    callbacks: &TerminalCallbacks,
) -> std::result::Result<Identity, String> {
    let identity: age::plugin::Identity = line.parse().map_err(str::to_string)?;
    Ok(Identity::Plugin {
        identity,
        callbacks: *callbacks,
    })
}

/// Expand a leading `~` to the home directory
pub(crate) fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
