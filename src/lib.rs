//! Bytecode-level field synchronization for Minecraft mods.
//!
//! The engine rewrites classes at load time so that annotated members stay
//! consistent between server and client. For each class carrying `@Sync`
//! members it generates companion fields for dirty tracking, compact wire
//! read/write routines, and a trigger spliced into the class's tick
//! method; `@ToNbt` members additionally get persistence methods writing
//! into the host's tag tree.
//!
//! Layering, bottom up:
//!
//! - [`classfile`]: the mutable class tree, JVM type descriptors, and the
//!   writer that serializes a transformed class back to `.class` bytes.
//! - [`asm`]: the symbolic instruction model. All generated code is
//!   composed from immutable [`asm::code::CodePiece`] fragments; raw
//!   instruction lists are only materialized once, at emit time.
//! - [`info`]: hierarchy-aware class metadata with memoized ancestor sets,
//!   answering assignability without loading classes.
//! - [`sync`]: the transformation pipeline itself, plus the wire token
//!   protocol and the instrumented-class registry.
//! - [`nbt`]: the persistence-side transformer.
//!
//! The typical host wiring:
//!
//! ```
//! use std::sync::Arc;
//! use syncweave::info::{ClassInfoCache, MapResolver};
//! use syncweave::sync::{SyncRegistry, SyncTransformer};
//!
//! let resolver = Arc::new(MapResolver::new());
//! resolver.register_host_types();
//! let cache = Arc::new(ClassInfoCache::new(resolver));
//! let transformer = SyncTransformer::new(cache, Arc::new(SyncRegistry::new()));
//! // for each loaded class: transformer.transform(&mut class_node)?
//! ```

pub mod asm;
pub mod classfile;
pub mod consts;
pub mod error;
pub mod info;
pub mod nbt;
pub mod sync;

pub use error::{Error, Result};
pub use nbt::NbtTransformer;
pub use sync::{SyncRegistry, SyncTransformer};
