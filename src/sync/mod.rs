//! Field synchronization generation
//!
//! The orchestrator in [`transformer`] rewrites one class at a time,
//! leaning on [`syncer`] for per-type payload fragments, [`wire`] for the
//! index token convention, [`registry`] for super-chain accounting and
//! [`define`] for handing generated classes to the host.

pub mod define;
pub mod registry;
pub mod syncer;
pub mod transformer;
pub mod wire;

pub use define::{define_transformed, ClassDefiner, GenerationContext};
pub use registry::{SuperSyncs, SyncRegistry};
pub use syncer::Syncer;
pub use transformer::{SyncCategory, SyncTransformer};
pub use wire::{TokenWidth, WireToken};
