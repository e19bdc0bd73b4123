use crate::domain::models::{Dependency, FetchEvent, FetchOptions, FetchStatus, Pin};
use crate::remote::{Downloader, RemoteRepo};
use crate::services::importpath::{contains, indent, is_standard, repo_root, strip_scheme};
use crate::services::manifest::{Manifest, ManifestError};
use crate::services::materialize::{remove_vendor_tree, vendor_path, Materializer};
use crate::services::mirror::MirrorTable;
use crate::services::retry::RetryLedger;
use crate::services::scanner::ImportScanner;
use crate::services::storage::ProjectLayout;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// State shared by every resolution reached from one top-level request.
#[derive(Debug, Default)]
pub struct FetchSession {
    pub root_import_path: String,
    pub root_repo_url: Option<String>,
    pub fetched: Vec<String>,
    /// Paths already written to the retry ledger during this command.
    pub deferred: Vec<String>,
    pub mirrors: MirrorTable,
}

impl FetchSession {
    fn already_fetched(&self, path: &str) -> bool {
        self.fetched.iter().any(|f| contains(f, path))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyFetchedThisSession,
    Existing,
    SelfVendor,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::AlreadyFetchedThisSession => "already fetched",
            SkipReason::Existing => "existing",
            SkipReason::SelfVendor => "subpackage of the project",
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FetchFailure {
    #[error("{0} or a parent of it is already vendored")]
    AlreadyVendored(String),
    #[error("refusing to vendor {0}: it is a subpackage of the project")]
    RefusingSelfVendor(String),
    #[error("could not resolve {path}: {message}")]
    Resolution { path: String, message: String },
    #[error("could not check out {path}: {message}")]
    Checkout { path: String, message: String },
    #[error("could not record {path}: {source}")]
    Record {
        path: String,
        #[source]
        source: ManifestError,
    },
    #[error("could not copy {path} into the vendor directory: {message}")]
    Materialize { path: String, message: String },
    #[error("could not scan {path} for imports: {message}")]
    Scan { path: String, message: String },
}

impl FetchFailure {
    pub fn code(&self) -> &'static str {
        match self {
            FetchFailure::AlreadyVendored(_) => "ALREADY_VENDORED",
            FetchFailure::RefusingSelfVendor(_) => "SELF_VENDOR",
            FetchFailure::Record {
                source: ManifestError::AlreadyVendored(_) | ManifestError::SubpackagesPresent(_),
                ..
            } => "MANIFEST_CONFLICT",
            _ => "FETCH_FAILED",
        }
    }
}

#[derive(Debug)]
pub enum Resolution {
    Fetched(Dependency),
    Skipped(SkipReason),
    Failed(FetchFailure),
}

/// Walks the dependency graph depth first, keeping the manifest prefix-free and persisted
/// after every change.
pub struct Orchestrator<'a> {
    layout: &'a ProjectLayout,
    options: &'a FetchOptions,
    downloader: &'a mut dyn Downloader,
    scanner: &'a dyn ImportScanner,
    materializer: &'a dyn Materializer,
    ledger: RetryLedger,
    session: FetchSession,
    events: Vec<FetchEvent>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        layout: &'a ProjectLayout,
        options: &'a FetchOptions,
        mirrors: MirrorTable,
        downloader: &'a mut dyn Downloader,
        scanner: &'a dyn ImportScanner,
        materializer: &'a dyn Materializer,
    ) -> Self {
        Orchestrator {
            ledger: RetryLedger::new(layout.ledger_path.clone()),
            layout,
            options,
            downloader,
            scanner,
            materializer,
            session: FetchSession {
                mirrors,
                ..FetchSession::default()
            },
            events: Vec::new(),
        }
    }

    pub fn into_events(self) -> Vec<FetchEvent> {
        self.events
    }

    /// Fetches an explicitly requested path with strict level-0 semantics.
    pub fn fetch_root(&mut self, manifest: &mut Manifest, raw: &str) -> Resolution {
        self.session.root_import_path = strip_scheme(raw);
        self.session.root_repo_url = None;
        self.resolve(manifest, raw, 0)
    }

    /// Re-attempts every path in the retry ledger. The ledger is deleted first; paths that
    /// fail again are recorded anew.
    pub fn reprocess(&mut self, manifest: &mut Manifest) -> anyhow::Result<Vec<String>> {
        let entries = self.ledger.take()?;
        if entries.is_empty() {
            info!("nothing to retry");
        }
        for raw in &entries {
            if let Resolution::Failed(e) = self.fetch_root(manifest, raw) {
                warn!("retry of {} failed: {}", raw, e);
            }
        }
        Ok(entries)
    }

    pub fn resolve(&mut self, manifest: &mut Manifest, raw: &str, level: usize) -> Resolution {
        let path = strip_scheme(raw);
        let res = self.try_resolve(manifest, raw, &path, level);
        match &res {
            Resolution::Fetched(_) => {}
            Resolution::Skipped(reason) => {
                info!("{}Skipping ({}): {}", indent(level), reason, path);
                self.push_event(&path, level, FetchStatus::Skipped, reason.to_string());
            }
            Resolution::Failed(e) => {
                self.push_event(&path, level, FetchStatus::Failed, e.to_string());
            }
        }
        res
    }

    fn try_resolve(
        &mut self,
        manifest: &mut Manifest,
        raw: &str,
        path: &str,
        level: usize,
    ) -> Resolution {
        if self.session.already_fetched(path) {
            return Resolution::Skipped(SkipReason::AlreadyFetchedThisSession);
        }
        if manifest.covers(path) {
            return if level == 0 {
                Resolution::Failed(FetchFailure::AlreadyVendored(path.to_string()))
            } else {
                Resolution::Skipped(SkipReason::Existing)
            };
        }
        if let Some(own) = self.layout.import_path.as_deref() {
            if contains(own, path) {
                return if level == 0 {
                    Resolution::Failed(FetchFailure::RefusingSelfVendor(path.to_string()))
                } else {
                    Resolution::Skipped(SkipReason::SelfVendor)
                };
            }
        }

        if level == 0 {
            info!("Fetching: {}", path);
        } else {
            info!("{}Fetching recursive dependency: {}", indent(level), path);
        }

        if let Err(e) = self.evict_subpackages(manifest, path) {
            return Resolution::Failed(e);
        }

        let target = self.session.mirrors.rewrite(raw);
        if target != raw {
            debug!("{}using mirror {} for {}", indent(level), target, raw);
        }

        let (repo, sub) = match self
            .downloader
            .deduce_repository(&target, self.options.insecure)
        {
            Ok(found) => found,
            Err(e) => {
                self.defer(raw);
                return Resolution::Failed(FetchFailure::Resolution {
                    path: path.to_string(),
                    message: format!("{:#}", e),
                });
            }
        };
        if level == 0 {
            self.session.root_repo_url = Some(repo.url.clone());
        }

        let (dep, wc_dir) = match self.checkout(&repo, &sub, path) {
            Ok(found) => found,
            Err(e) => {
                self.defer(raw);
                return Resolution::Failed(FetchFailure::Checkout {
                    path: path.to_string(),
                    message: format!("{:#}", e),
                });
            }
        };
        if let Err(source) = manifest.add(dep.clone()) {
            return Resolution::Failed(FetchFailure::Record {
                path: path.to_string(),
                source,
            });
        }

        let src = join_segments(&wc_dir, &sub);
        if let Err(e) = self.materialize(manifest, &dep, &src, &wc_dir) {
            if let Err(undo) = manifest.remove(&dep) {
                warn!("could not drop {} from the manifest: {}", path, undo);
            }
            if let Err(undo) = remove_vendor_tree(&self.layout.vendor_dir, path) {
                warn!("could not remove partial copy of {}: {:#}", path, undo);
            }
            return Resolution::Failed(FetchFailure::Materialize {
                path: path.to_string(),
                message: format!("{:#}", e),
            });
        }
        self.push_event(
            path,
            level,
            FetchStatus::Fetched,
            format!("{} {}", dep.repository, dep.revision),
        );
        self.session.fetched.push(path.to_string());

        if self.options.no_recurse {
            return Resolution::Fetched(dep);
        }

        // Without a root prefix the scanner keeps explicit vendor/ imports.
        let root = repo_root(path, &sub).unwrap_or_default();
        let imports = match self.scanner.scan_imports(
            &src,
            &wc_dir,
            root,
            self.options.tests,
            self.options.all,
        ) {
            Ok(found) => found,
            Err(e) => {
                // The dependency itself is recorded; only its imports are unknown.
                let failure = FetchFailure::Scan {
                    path: path.to_string(),
                    message: format!("{:#}", e),
                };
                warn!("{}{}", indent(level), failure);
                self.push_event(path, level, FetchStatus::Failed, failure.to_string());
                return Resolution::Fetched(dep);
            }
        };

        for import in imports.iter().filter(|i| !is_standard(i)) {
            if let Resolution::Failed(e) = self.resolve(manifest, import, level + 1) {
                warn!("{}Error fetching {}: {}", indent(level + 1), import, e);
            }
        }
        Resolution::Fetched(dep)
    }

    /// Removes manifest entries nested under `path` along with the vendored tree at `path`.
    fn evict_subpackages(&self, manifest: &mut Manifest, path: &str) -> Result<(), FetchFailure> {
        let subs = manifest.subpackages_of(path);
        for sub in &subs {
            let expected = contains(&sub.importpath, &self.session.root_import_path)
                || self.session.already_fetched(&sub.importpath);
            if !expected {
                warn!(
                    "Deleting existing subpackage to prevent overlap: {}",
                    sub.importpath
                );
            }
            manifest
                .remove(sub)
                .map_err(|source| FetchFailure::Record {
                    path: path.to_string(),
                    source,
                })?;
        }
        remove_vendor_tree(&self.layout.vendor_dir, path).map_err(|e| {
            FetchFailure::Materialize {
                path: path.to_string(),
                message: format!("{:#}", e),
            }
        })?;
        if !subs.is_empty() {
            manifest
                .save(&self.layout.manifest_path)
                .map_err(|source| FetchFailure::Record {
                    path: path.to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    fn checkout(
        &mut self,
        repo: &RemoteRepo,
        sub: &str,
        path: &str,
    ) -> anyhow::Result<(Dependency, PathBuf)> {
        let pin = if self.session.root_repo_url.as_deref() == Some(repo.url.as_str()) {
            self.options.pin.clone()
        } else {
            Pin::default()
        };
        let wc = self
            .downloader
            .checkout(repo, &pin, self.options.verbose)?;
        let dep = Dependency {
            importpath: path.to_string(),
            repository: repo.url.clone(),
            vcs: repo.vcs,
            revision: wc.revision()?,
            branch: wc.branch()?,
            path: sub.to_string(),
            notests: !self.options.tests,
            allfiles: self.options.all,
        };
        Ok((dep, wc.dir().to_path_buf()))
    }

    fn materialize(
        &self,
        manifest: &Manifest,
        dep: &Dependency,
        src: &Path,
        wc_dir: &Path,
    ) -> anyhow::Result<()> {
        let dst = vendor_path(&self.layout.vendor_dir, &dep.importpath);
        self.materializer
            .copy_tree(&dst, src, self.options.tests, self.options.all)?;
        self.materializer.copy_license(
            &self.layout.vendor_dir,
            &dep.importpath,
            wc_dir,
            &dep.path,
        )?;
        manifest.save(&self.layout.manifest_path)?;
        Ok(())
    }

    fn defer(&mut self, raw: &str) {
        if self.session.deferred.iter().any(|d| d == raw) {
            return;
        }
        self.session.deferred.push(raw.to_string());
        if let Err(e) = self.ledger.record(raw) {
            warn!(
                "could not record {} in {}: {:#}",
                raw,
                self.ledger.path().display(),
                e
            );
        }
    }

    fn push_event(&mut self, path: &str, level: usize, status: FetchStatus, detail: String) {
        self.events.push(FetchEvent {
            importpath: path.to_string(),
            level,
            status,
            detail,
        });
    }
}

fn join_segments(base: &Path, sub: &str) -> PathBuf {
    sub.split('/')
        .filter(|s| !s.is_empty())
        .fold(base.to_path_buf(), |p, s| p.join(s))
}

/// Copies a manifest entry back into the vendor directory at its recorded revision.
pub fn restore_dependency(
    downloader: &mut dyn Downloader,
    materializer: &dyn Materializer,
    vendor_dir: &Path,
    dep: &Dependency,
    verbose: bool,
) -> anyhow::Result<()> {
    let repo = RemoteRepo {
        url: dep.repository.clone(),
        vcs: dep.vcs,
    };
    let wc = downloader.checkout(&repo, &Pin::revision(&dep.revision), verbose)?;
    remove_vendor_tree(vendor_dir, &dep.importpath)?;
    let dst = vendor_path(vendor_dir, &dep.importpath);
    materializer.copy_tree(
        &dst,
        &join_segments(wc.dir(), &dep.path),
        !dep.notests,
        dep.allfiles,
    )?;
    materializer.copy_license(vendor_dir, &dep.importpath, wc.dir(), &dep.path)?;
    Ok(())
}

/// Checks out the tip of the branch recorded for `dep`, re-copies it into the vendor
/// directory and returns the record to store in its place.
pub fn update_dependency(
    downloader: &mut dyn Downloader,
    materializer: &dyn Materializer,
    vendor_dir: &Path,
    dep: &Dependency,
    verbose: bool,
) -> anyhow::Result<Dependency> {
    let repo = RemoteRepo {
        url: dep.repository.clone(),
        vcs: dep.vcs,
    };
    let pin = Pin {
        branch: (!dep.branch.is_empty()).then(|| dep.branch.clone()),
        ..Pin::default()
    };
    let wc = downloader.checkout(&repo, &pin, verbose)?;
    let updated = Dependency {
        revision: wc.revision()?,
        branch: wc.branch()?,
        ..dep.clone()
    };
    remove_vendor_tree(vendor_dir, &dep.importpath)?;
    let dst = vendor_path(vendor_dir, &dep.importpath);
    materializer.copy_tree(
        &dst,
        &join_segments(wc.dir(), &dep.path),
        !dep.notests,
        dep.allfiles,
    )?;
    materializer.copy_license(vendor_dir, &dep.importpath, wc.dir(), &dep.path)?;
    Ok(updated)
}
