//! Symbolic bytecode construction
//!
//! Instructions are built as immutable, freely composable fragments
//! ([`code::CodePiece`]) over the raw instruction model in [`insn`].
//! [`pieces`] holds the factory functions, [`cond`] and [`switches`] the
//! control-flow shapes, and [`variable`] the uniform member accessors the
//! generators target.

pub mod code;
pub mod cond;
pub mod insn;
pub mod pieces;
pub mod switches;
pub mod variable;
