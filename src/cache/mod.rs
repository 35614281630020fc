//! Module artifact cache
//!
//! Stores the compiled output directory of each module per board so later
//! builds can start from it instead of recompiling.
//!
//! # Entry States
//!
//! | State | Marker | Description |
//! |-------|--------|-------------|
//! | Miss | - | Nothing stored for the key |
//! | Building | absent | Directory without marker, never read, safe to discard |
//! | Complete | present | Finalized, immutable |
//!
//! Entries are assembled in a private staging directory and renamed into
//! place with the marker already inside, so readers never observe a ready
//! entry whose content is incomplete. The cache has no eviction.

pub mod entry;
pub mod store;

pub use entry::{CacheEntryInfo, CacheKey, CacheState, PublishOutcome};
pub use store::{ArtifactCache, READY_MARKER};
