//! Command handler layer.
//!
//! This module owns CLI-oriented orchestration and output wiring.
//!
//! ## Files
//! - `fetch.rs`: fetch/fix/init, everything that walks the dependency graph.
//! - `manage.rs`: list/delete/update/restore over an existing manifest.
//!
//! ## Principles
//! - Parse/match CLI inputs here.
//! - Delegate vendoring logic to `services/*`.
//! - Take the project lock before touching `vendor/`.

pub mod fetch;
pub mod manage;

use crate::cli::{Cli, Commands, FetchFlags};
use crate::domain::models::{ConfigFile, FetchOptions, Pin};
use crate::services::manifest::{Manifest, ManifestError};
use crate::services::mirror::MirrorTable;
use crate::services::storage::{self, ProjectLayout};

/// Everything a handler needs to know about the project it runs in.
pub struct Context {
    pub config: ConfigFile,
    pub layout: ProjectLayout,
    pub json: bool,
    pub force: bool,
}

impl Context {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let config = storage::load_config()?;
        let layout = ProjectLayout::discover(&config)?;
        Ok(Context {
            config,
            layout,
            json: cli.json,
            force: cli.force,
        })
    }

    pub fn manifest(&self) -> anyhow::Result<Manifest> {
        match Manifest::load(&self.layout.manifest_path) {
            Ok(m) => Ok(m),
            Err(e @ ManifestError::Malformed { .. }) if self.force => {
                tracing::warn!("{}; continuing with an empty manifest", e);
                Ok(Manifest::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn mirrors(&self) -> anyhow::Result<MirrorTable> {
        match storage::mirror_file(&self.config, &self.layout) {
            Some(path) => {
                let table = MirrorTable::load(&path)?;
                if !table.is_empty() {
                    tracing::debug!("loaded {} mirror rules from {}", table.len(), path.display());
                }
                Ok(table)
            }
            None => Ok(MirrorTable::default()),
        }
    }

    pub fn options(&self, flags: &FetchFlags, pin: Pin) -> FetchOptions {
        FetchOptions {
            pin,
            no_recurse: flags.no_recurse,
            insecure: flags.insecure || self.config.general.allow_insecure,
            tests: flags.tests,
            all: flags.all,
            verbose: flags.verbose,
        }
    }
}

pub fn dispatch(cli: &Cli) -> anyhow::Result<()> {
    let ctx = Context::load(cli)?;
    match &cli.command {
        Commands::Fetch {
            import_path,
            branch,
            tag,
            revision,
            flags,
        } => {
            let pin = Pin {
                branch: branch.clone(),
                tag: tag.clone(),
                revision: revision.clone(),
            };
            fetch::handle_fetch(&ctx, import_path, pin, flags)
        }
        Commands::Fix { flags } => fetch::handle_fix(&ctx, flags),
        Commands::Init { flags } => fetch::handle_init(&ctx, flags),
        Commands::List => manage::handle_list(&ctx),
        Commands::Delete { import_path, all } => {
            manage::handle_delete(&ctx, import_path.as_deref(), *all)
        }
        Commands::Update {
            import_path,
            all,
            verbose,
        } => manage::handle_update(&ctx, import_path.as_deref(), *all, *verbose),
        Commands::Restore { verbose } => manage::handle_restore(&ctx, *verbose),
    }
}
