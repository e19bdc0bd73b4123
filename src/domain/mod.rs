//! Shared data model layer (structs/constants only).
//!
//! ## Purpose
//! - Keep manifest records, fetch reports and config structs in one place.
//! - Avoid cyclic imports and duplicated type definitions.
//! - Make JSON output schema changes explicit and reviewable.
//!
//! ## Rule of thumb
//! Domain types should be data-only: no filesystem/network side effects.
//!
//! ## Compatibility note
//! `Dependency` is the on-disk manifest record and changes to it alter `vendor/manifest`.
//! Keep schema-impacting changes synchronized with `docs/contracts/*`.

pub mod models;
