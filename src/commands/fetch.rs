use super::Context;
use crate::cli::FetchFlags;
use crate::domain::models::{FetchEvent, FetchReport, FetchStatus, Pin};
use crate::remote::RemoteDownloader;
use crate::services::importpath::is_standard;
use crate::services::materialize::{vendor_path, FsMaterializer};
use crate::services::orchestrator::{Orchestrator, Resolution};
use crate::services::output::print_one;
use crate::services::scanner::{GoImportScanner, ImportScanner};
use crate::services::storage::{gopath_src_dirs, ProjectLock};
use tracing::{debug, warn};

const FIX_ALIAS: &str = "fix";

fn summary(report: &FetchReport) -> String {
    let count = |s: FetchStatus| report.events.iter().filter(|e| e.status == s).count();
    let mut lines: Vec<String> = report
        .events
        .iter()
        .filter(|e| e.status != FetchStatus::Skipped)
        .map(|e| format!("{}\t{}\t{}", status_label(e), e.importpath, e.detail))
        .collect();
    lines.push(format!(
        "fetched {}, skipped {}, failed {}",
        count(FetchStatus::Fetched),
        count(FetchStatus::Skipped),
        count(FetchStatus::Failed)
    ));
    lines.join("\n")
}

fn status_label(e: &FetchEvent) -> &'static str {
    match e.status {
        FetchStatus::Fetched => "fetched",
        FetchStatus::Skipped => "skipped",
        FetchStatus::Failed => "failed",
    }
}

fn flush(downloader: &mut RemoteDownloader) {
    if let Err(e) = downloader.flush() {
        warn!("could not remove temporary checkouts: {:#}", e);
    }
}

pub fn handle_fetch(
    ctx: &Context,
    import_path: &str,
    pin: Pin,
    flags: &FetchFlags,
) -> anyhow::Result<()> {
    if import_path == FIX_ALIAS {
        return handle_fix(ctx, flags);
    }
    let _lock = ProjectLock::acquire(&ctx.layout)?;
    let mut manifest = ctx.manifest()?;
    let options = ctx.options(flags, pin);
    let mut downloader = RemoteDownloader::new(ctx.config.general.probe_timeout_ms);

    let mut orch = Orchestrator::new(
        &ctx.layout,
        &options,
        ctx.mirrors()?,
        &mut downloader,
        &GoImportScanner,
        &FsMaterializer,
    );
    let res = orch.fetch_root(&mut manifest, import_path);
    let events = orch.into_events();
    flush(&mut downloader);

    match res {
        Resolution::Failed(e) => return Err(e.into()),
        Resolution::Fetched(dep) => debug!("{} vendored at {}", dep.importpath, dep.revision),
        Resolution::Skipped(reason) => debug!("{} skipped ({})", import_path, reason),
    }
    let report = FetchReport {
        requested: vec![import_path.to_string()],
        events,
    };
    print_one(ctx.json, report, summary)
}

pub fn handle_fix(ctx: &Context, flags: &FetchFlags) -> anyhow::Result<()> {
    let _lock = ProjectLock::acquire(&ctx.layout)?;
    let mut manifest = ctx.manifest()?;
    let options = ctx.options(flags, Pin::default());
    let mut downloader = RemoteDownloader::new(ctx.config.general.probe_timeout_ms);

    let mut orch = Orchestrator::new(
        &ctx.layout,
        &options,
        ctx.mirrors()?,
        &mut downloader,
        &GoImportScanner,
        &FsMaterializer,
    );
    let retried = orch.reprocess(&mut manifest);
    let events = orch.into_events();
    flush(&mut downloader);

    let report = FetchReport {
        requested: retried?,
        events,
    };
    print_one(ctx.json, report, summary)
}

pub fn handle_init(ctx: &Context, flags: &FetchFlags) -> anyhow::Result<()> {
    let _lock = ProjectLock::acquire(&ctx.layout)?;
    let mut manifest = ctx.manifest()?;
    let options = ctx.options(flags, Pin::default());
    let root = ctx.layout.root.clone();
    let own = ctx.layout.import_path.clone().unwrap_or_default();
    let imports = GoImportScanner.scan_imports(&root, &root, &own, flags.tests, flags.all)?;
    let src_dirs = gopath_src_dirs();

    let mut downloader = RemoteDownloader::new(ctx.config.general.probe_timeout_ms);
    let mut orch = Orchestrator::new(
        &ctx.layout,
        &options,
        ctx.mirrors()?,
        &mut downloader,
        &GoImportScanner,
        &FsMaterializer,
    );
    let mut requested = Vec::new();
    for import in imports.iter().filter(|i| !is_standard(i)) {
        let present = vendor_path(&ctx.layout.vendor_dir, import).exists()
            || src_dirs.iter().any(|d| vendor_path(d, import).exists());
        if present {
            debug!("{} is already available, skipping", import);
            continue;
        }
        requested.push(import.clone());
        if let Resolution::Failed(e) = orch.resolve(&mut manifest, import, 1) {
            warn!("Error fetching {}: {}", import, e);
        }
    }
    let events = orch.into_events();
    flush(&mut downloader);

    let report = FetchReport { requested, events };
    print_one(ctx.json, report, summary)
}
