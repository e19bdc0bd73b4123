//! Service layer containing vendoring logic and side-effect helpers.
//!
//! ## Service map
//! - `orchestrator.rs`: recursive fetch, eviction, retry reprocessing, restore.
//! - `manifest.rs`: the prefix-free dependency record and its on-disk form.
//! - `mirror.rs`: prefix rewrite table applied before repository resolution.
//! - `retry.rs`: ledger of paths whose fetch failed.
//! - `materialize.rs`: filtered tree copy, license copy, vendor tree removal.
//! - `scanner.rs`: Go import discovery in fetched sources.
//! - `importpath.rs`: scheme stripping and segment-boundary containment.
//! - `storage.rs`: project layout, config, mirror lookup, project lock.
//! - `output.rs`: JSON/text output helpers.
//!
//! ## Conventions
//! - Prefer pure helpers where possible.
//! - Side effects should be explicit and localized.
//! - Keep command handlers thin; delegate to services.

pub mod importpath;
pub mod manifest;
pub mod materialize;
pub mod mirror;
pub mod orchestrator;
pub mod output;
pub mod retry;
pub mod scanner;
pub mod storage;
