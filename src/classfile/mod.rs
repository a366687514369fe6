//! Class file model and serialization
//!
//! An in-memory tree of classes, fields and methods ([`tree`]), the JVM
//! type descriptors they speak ([`ty`]), and a writer that lowers the tree
//! plus its symbolic instructions to `.class` bytes ([`emit`] over
//! [`constpool`]).

pub mod constpool;
pub mod emit;
pub mod flags;
pub mod tree;
pub mod ty;
