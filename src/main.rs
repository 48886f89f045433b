//! agefs - Mount age-encrypted files as a read-only filesystem
//!
//! Usage:
//!   agefs [-f] [-v] -o identity=<path>[,keep_cached,...] <manifest> <mount_point>

use agefs::{
    config::{log_filter, Config},
    crypto::{load_identities, TerminalCallbacks},
    daemon::{self, Readiness, Role},
    fs::{AgeFs, Root, RootSettings},
    manifest::Manifest,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "agefs")]
#[command(version)]
#[command(about = "Mount age-encrypted files as a read-only filesystem")]
struct Cli {
    /// Manifest (JSON or YAML) listing the files to expose
    manifest: PathBuf,

    /// Mount point directory
    mount_point: PathBuf,

    /// Mount options, comma separated: identity=<path>, debug, allow_other,
    /// keep_cached; anything else is passed to FUSE.
    ///
    /// Without keep_cached every open decrypts afresh and files report a size
    /// of 0; tools that trust st_size (tar, some backup agents) then copy
    /// empty files. With keep_cached the size is exact once a file has been
    /// opened, at the cost of keeping plaintext in memory.
    #[arg(short = 'o', long = "options")]
    options: Vec<String>,

    /// Run in foreground (don't daemonize)
    #[arg(short, long)]
    foreground: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    let verbose = cli.verbose;
    let config = Config::new(cli.manifest, cli.mount_point, cli.foreground, &cli.options);

    // Setup logging
    let fuse_debug = config.as_ref().is_ok_and(|config| config.mount.debug);
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_filter(rust_log.as_deref(), verbose, fuse_debug)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = config.map_err(anyhow::Error::from).and_then(run) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(config: Config) -> Result<()> {
    let manifest = Manifest::load(&config.manifest)
        .with_context(|| format!("Failed to load manifest {:?}", config.manifest))?;
    if manifest.is_empty() {
        warn!("Manifest {:?} lists no files", config.manifest);
    }
    info!("Loaded {} manifest entries", manifest.len());

    let identities = load_identities(&config.identity_paths(), &TerminalCallbacks)?;

    let settings = RootSettings::current_user(config.mount.cache_policy());
    let root = Root::new(identities, settings, &manifest.entries)?;

    info!("Mounting filesystem at {:?}", config.mount_point);

    if !config.foreground {
        if let Role::Parent(child) = daemon::daemonize()? {
            let readiness = daemon::wait_until_ready(&config.marker_path(), daemon::POLL_INTERVAL, || {
                daemon::child_status(child)
            })?;
            return match readiness {
                Readiness::Ready => {
                    info!("Done");
                    Ok(())
                }
                Readiness::ChildExited(code) => {
                    bail!("Mount process exited with status {} before the filesystem was ready", code)
                }
            };
        }
    }

    fuser::mount2(AgeFs::new(root), &config.mount_point, &config.mount.fuser_options())
        .with_context(|| format!("Failed to mount at {:?}", config.mount_point))?;

    Ok(())
}
