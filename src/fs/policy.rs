//! Page-cache policy for opened files

use fuser::consts::{FOPEN_DIRECT_IO, FOPEN_KEEP_CACHE};

/// Whether decrypted plaintext outlives the handle that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Keep plaintext on the node and let the kernel page cache hold it
    KeepCached,
    /// Decrypt on every open and bypass the page cache
    #[default]
    DirectIo,
}

impl CachePolicy {
    pub fn from_keep_cached(keep_cached: bool) -> Self {
        if keep_cached {
            CachePolicy::KeepCached
        } else {
            CachePolicy::DirectIo
        }
    }

    /// Whether the node retains plaintext across opens
    pub fn retains_plaintext(self) -> bool {
        self == CachePolicy::KeepCached
    }

    /// `fuse_open_out` flags for an open under this policy
    pub fn open_flags(self) -> u32 {
        match self {
            CachePolicy::KeepCached => FOPEN_KEEP_CACHE,
            CachePolicy::DirectIo => FOPEN_DIRECT_IO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_flags() {
        let cached = CachePolicy::from_keep_cached(true);
        assert!(cached.retains_plaintext());
        assert_eq!(cached.open_flags(), FOPEN_KEEP_CACHE);

        let direct = CachePolicy::from_keep_cached(false);
        assert!(!direct.retains_plaintext());
        assert_eq!(direct.open_flags(), FOPEN_DIRECT_IO);
        assert_eq!(CachePolicy::default(), direct);
    }
}
