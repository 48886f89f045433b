//! Configuration management for agefs
//!
//! The configuration is assembled once at startup from command-line
//! arguments, `-o` mount options and the environment, then passed by
//! reference to whatever needs it.

use crate::error::{Error, Result};
use crate::fs::CachePolicy;
use fuser::MountOption;
use std::path::PathBuf;

/// Filesystem name reported to the kernel
pub const FS_NAME: &str = "agefs";

/// Environment variable with extra colon-separated identity paths
pub const IDENTITIES_ENV: &str = "AGEFS_IDENTITIES";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Manifest listing the exposed files
    pub manifest: PathBuf,

    /// Mount point
    pub mount_point: PathBuf,

    /// Stay in the foreground instead of forking
    pub foreground: bool,

    /// Options parsed from `-o`
    pub mount: MountConfig,
}

/// Options given with `-o`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountConfig {
    /// Key-source files, in the order given
    pub identities: Vec<PathBuf>,

    /// Trace FUSE traffic
    pub debug: bool,

    /// Let other users access the mount
    pub allow_other: bool,

    /// Retain decrypted plaintext across opens
    pub keep_cached: bool,

    /// Unrecognised options passed through to FUSE verbatim
    pub passthrough: Vec<String>,
}

impl MountConfig {
    /// Parse `-o` arguments; each argument may hold comma-separated options
    pub fn parse<S: AsRef<str>>(options: &[S]) -> Self {
        let mut config = MountConfig::default();

        for option in options
            .iter()
            .flat_map(|arg| arg.as_ref().split(','))
            .map(str::trim)
            .filter(|option| !option.is_empty())
        {
            if let Some(path) = option.strip_prefix("identity=") {
                config.identities.push(PathBuf::from(path));
                continue;
            }

            match option {
                "debug" => config.debug = true,
                "allow_other" => config.allow_other = true,
                "keep_cached" => config.keep_cached = true,
                other => config.passthrough.push(other.to_string()),
            }
        }

        config
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy::from_keep_cached(self.keep_cached)
    }

    /// Options handed to `fuser::mount2`
    pub fn fuser_options(&self) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::FSName(FS_NAME.to_string()),
            MountOption::Subtype(FS_NAME.to_string()),
            MountOption::RO,
        ];

        if self.allow_other {
            options.push(MountOption::AllowOther);
        }

        options.extend(
            self.passthrough
                .iter()
                .map(|option| MountOption::CUSTOM(option.clone())),
        );
        options
    }
}

impl Config {
    /// Assemble the configuration from parsed command-line arguments
    pub fn new<S: AsRef<str>>(
        manifest: PathBuf,
        mount_point: PathBuf,
        foreground: bool,
        options: &[S],
    ) -> Result<Self> {
        let mut config = Config {
            manifest,
            mount_point,
            foreground,
            mount: MountConfig::parse(options),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var(IDENTITIES_ENV) {
            self.mount
                .identities
                .extend(std::env::split_paths(&value).filter(|p| !p.as_os_str().is_empty()));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.mount.identities.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "At least one identity file must be specified using -o identity=... or {}",
                IDENTITIES_ENV
            )));
        }

        if self.manifest.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("Manifest path is required".to_string()));
        }

        if !self.mount_point.is_dir() {
            return Err(Error::Config(format!(
                "Mount point {:?} is not a directory",
                self.mount_point
            )));
        }

        Ok(())
    }

    /// Identity paths with `~` expanded
    pub fn identity_paths(&self) -> Vec<PathBuf> {
        self.mount
            .identities
            .iter()
            .map(|path| crate::crypto::expand_tilde(path))
            .collect()
    }

    /// Path of the ready marker inside the mount
    pub fn marker_path(&self) -> PathBuf {
        self.mount_point.join(crate::fs::MARKER_NAME)
    }
}

/// `tracing` filter directives
///
/// `env` (the value of `RUST_LOG`) replaces the verbosity default when set.
/// The `debug` mount option adds FUSE tracing on top of either.
pub fn log_filter(env: Option<&str>, verbose: bool, fuse_debug: bool) -> String {
    let mut filter = match env.map(str::trim).filter(|env| !env.is_empty()) {
        Some(env) => env.to_string(),
        None if verbose => "agefs=debug".to_string(),
        None => "agefs=info".to_string(),
    };
    if fuse_debug {
        filter.push_str(",fuser=debug");
    }
    filter
}
