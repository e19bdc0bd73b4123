use super::Context;
use crate::domain::models::{Dependency, RestoreReport};
use crate::remote::RemoteDownloader;
use crate::services::importpath::strip_scheme;
use crate::services::manifest::{Manifest, ManifestError};
use crate::services::materialize::{remove_vendor_tree, FsMaterializer};
use crate::services::orchestrator::{restore_dependency, update_dependency};
use crate::services::output::print_out;
use crate::services::storage::ProjectLock;
use tracing::{info, warn};

pub fn handle_list(ctx: &Context) -> anyhow::Result<()> {
    let manifest = ctx.manifest()?;
    let mut deps = manifest.dependencies;
    deps.sort_by(|a, b| a.importpath.cmp(&b.importpath));
    print_out(ctx.json, &deps, |d| {
        format!(
            "{}\t{}\t{}\t{}",
            d.importpath, d.repository, d.revision, d.branch
        )
    })
}

/// The exact entry named on the command line, or every entry with `--all`.
fn targets(
    manifest: &Manifest,
    import_path: Option<&str>,
    all: bool,
) -> anyhow::Result<Vec<Dependency>> {
    if all {
        return Ok(manifest.dependencies.clone());
    }
    let path = strip_scheme(import_path.unwrap_or_default());
    let dep = manifest
        .find_exact(&path)
        .cloned()
        .ok_or(ManifestError::NotFound(path))?;
    Ok(vec![dep])
}

pub fn handle_delete(ctx: &Context, import_path: Option<&str>, all: bool) -> anyhow::Result<()> {
    let _lock = ProjectLock::acquire(&ctx.layout)?;
    let mut manifest = ctx.manifest()?;
    let targets = targets(&manifest, import_path, all)?;

    for dep in &targets {
        manifest.remove(dep)?;
        remove_vendor_tree(&ctx.layout.vendor_dir, &dep.importpath)?;
        info!("Deleted: {}", dep.importpath);
    }
    manifest.save(&ctx.layout.manifest_path)?;
    print_out(ctx.json, &targets, |d| format!("deleted\t{}", d.importpath))
}

pub fn handle_update(
    ctx: &Context,
    import_path: Option<&str>,
    all: bool,
    verbose: bool,
) -> anyhow::Result<()> {
    let _lock = ProjectLock::acquire(&ctx.layout)?;
    let mut manifest = ctx.manifest()?;
    let targets = targets(&manifest, import_path, all)?;
    let mut downloader = RemoteDownloader::new(ctx.config.general.probe_timeout_ms);

    let mut reports = Vec::new();
    let mut outcome: anyhow::Result<()> = Ok(());
    for dep in &targets {
        info!("Updating: {}", dep.importpath);
        let updated = match update_dependency(
            &mut downloader,
            &FsMaterializer,
            &ctx.layout.vendor_dir,
            dep,
            verbose,
        ) {
            Ok(updated) => updated,
            Err(e) => {
                outcome = Err(e.context(format!("could not update {}", dep.importpath)));
                break;
            }
        };
        manifest.remove(dep)?;
        manifest.add(updated.clone())?;
        manifest.save(&ctx.layout.manifest_path)?;
        let status = if updated.revision == dep.revision {
            "unchanged"
        } else {
            "updated"
        };
        reports.push(RestoreReport {
            importpath: updated.importpath.clone(),
            status: status.to_string(),
            detail: format!("{} -> {}", dep.revision, updated.revision),
        });
    }
    if let Err(e) = downloader.flush() {
        warn!("could not remove temporary checkouts: {:#}", e);
    }
    outcome?;
    print_out(ctx.json, &reports, |r| {
        format!("{}\t{}\t{}", r.status, r.importpath, r.detail)
    })
}

pub fn handle_restore(ctx: &Context, verbose: bool) -> anyhow::Result<()> {
    let _lock = ProjectLock::acquire(&ctx.layout)?;
    let manifest = ctx.manifest()?;
    let mut downloader = RemoteDownloader::new(ctx.config.general.probe_timeout_ms);

    let mut reports = Vec::new();
    let mut failed = Vec::new();
    for dep in &manifest.dependencies {
        info!("Restoring: {}", dep.importpath);
        match restore_dependency(
            &mut downloader,
            &FsMaterializer,
            &ctx.layout.vendor_dir,
            dep,
            verbose,
        ) {
            Ok(()) => reports.push(RestoreReport {
                importpath: dep.importpath.clone(),
                status: "restored".to_string(),
                detail: dep.revision.clone(),
            }),
            Err(e) => {
                warn!("could not restore {}: {:#}", dep.importpath, e);
                failed.push(dep.importpath.clone());
            }
        }
    }
    if let Err(e) = downloader.flush() {
        warn!("could not remove temporary checkouts: {:#}", e);
    }

    if !failed.is_empty() {
        anyhow::bail!(
            "{} of {} dependencies failed to restore: {}",
            failed.len(),
            manifest.dependencies.len(),
            failed.join(", ")
        );
    }
    print_out(ctx.json, &reports, |r| {
        format!("{}\t{}\t{}", r.status, r.importpath, r.detail)
    })
}
