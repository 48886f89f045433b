//! Cryptography: identity loading and age decryption
//!
//! Identities are loaded once at startup from one or more key-source files
//! and tried in load order for every decrypt.

mod callbacks;
mod decrypt;
mod identity;

pub use callbacks::TerminalCallbacks;
pub use decrypt::{decrypt, is_armored, ARMOR_HEADER};
pub(crate) use identity::expand_tilde;
pub use identity::{
    load_identities, load_identity_file, parse_identities, Identity, NATIVE_KEY_PREFIX,
    PLUGIN_PREFIX, SSH_KEY_PREFIX, Unwrapper,
};
