//! Completion tracking and archive assembly
//!
//! A request becomes archivable once its discovered total is final and every
//! discovered item has a recorded outcome. The assembler then bundles all
//! artifacts into one zip, stores it and hands back a signed reference.

mod assembler;
mod signing;
mod tracker;

pub use assembler::{
    archive_key, build_bundle, ArchiveAssembler, ArchiveReference, FAILURE_MANIFEST,
};
pub use signing::{unix_now, UrlSigner};
pub use tracker::{CompletionTracker, Readiness};
