//! Non-interactive front end for the `modtune-core` engine: `list`, `show`
//! and `set` over the merged module-parameter view. Every invocation runs
//! one refresh against the configured roots and acts on that snapshot.

mod list_cmd;
mod set_cmd;
mod show_cmd;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use modtune_core::CoreConfig;
use modtune_core::NullMetadataSource;
use modtune_core::StateStore;

#[derive(Debug, Parser)]
#[command(name = "modtune", about = "Inspect and edit kernel module parameters")]
pub struct Cli {
    /// TOML config file; the flags below override its values.
    #[arg(long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Module registry root (default /sys/module).
    #[arg(long = "sys-root", value_name = "DIR", global = true)]
    sys_root: Option<PathBuf>,

    /// Persistent configuration directory (default /etc/modprobe.d).
    #[arg(long = "modprobe-dir", value_name = "DIR", global = true)]
    modprobe_dir: Option<PathBuf>,

    /// Metadata tool binary (default modinfo, resolved on PATH).
    #[arg(long = "modinfo-bin", value_name = "BIN", global = true)]
    modinfo_bin: Option<PathBuf>,

    /// Budget for one metadata tool invocation.
    #[arg(long = "metadata-timeout-ms", value_name = "MS", global = true)]
    metadata_timeout_ms: Option<u64>,

    /// Upper bound on modules scanned in parallel.
    #[arg(long = "scan-concurrency", value_name = "N", global = true)]
    scan_concurrency: Option<usize>,

    /// Skip the metadata tool; parameters stay untyped and undescribed.
    #[arg(long = "no-metadata", global = true)]
    no_metadata: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the merged view of every known parameter.
    List(list_cmd::ListArgs),
    /// Show one parameter in full, including persistent provenance.
    Show(show_cmd::ShowArgs),
    /// Write a new runtime value and confirm the observed effect.
    Set(set_cmd::SetArgs),
}

impl Cli {
    fn core_config(&self) -> Result<CoreConfig> {
        let mut config = match &self.config {
            Some(path) => CoreConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => CoreConfig::default(),
        };
        if let Some(sys_root) = &self.sys_root {
            config.sys_module_root = sys_root.clone();
        }
        if let Some(modprobe_dir) = &self.modprobe_dir {
            config.modprobe_dir = modprobe_dir.clone();
        }
        if let Some(modinfo_bin) = &self.modinfo_bin {
            config.modinfo_bin = modinfo_bin.clone();
        }
        if let Some(timeout_ms) = self.metadata_timeout_ms {
            config.metadata_timeout_ms = timeout_ms;
        }
        if let Some(concurrency) = self.scan_concurrency {
            config.scan_concurrency = concurrency;
        }
        Ok(config)
    }

    fn store(&self) -> Result<StateStore> {
        let config = self.core_config()?;
        let store = if self.no_metadata {
            StateStore::with_metadata_source(config, Arc::new(NullMetadataSource))
        } else {
            StateStore::new(config)
        };
        Ok(store)
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let store = cli.store()?;
    match &cli.command {
        Command::List(args) => list_cmd::run(&store, args).await,
        Command::Show(args) => show_cmd::run(&store, args).await,
        Command::Set(args) => set_cmd::run(&store, args).await,
    }
}
