//! Composable code fragments
//!
//! A `CodePiece` is an immutable sequence of symbolic instructions. Pieces
//! compose functionally: `append`, `prepend` and `concat` build new pieces
//! without touching their operands, so a fragment can be handed out, reused
//! as a building block and assembled in any grouping without aliasing bugs.
//!
//! A piece that contains labels must be spliced into exactly one method
//! body; label identities are fresh per fragment construction, not per
//! materialization.

use std::sync::Arc;

use crate::asm::insn::{Insn, InsnList};

#[derive(Debug, Clone)]
enum PieceKind {
    Empty,
    Single(Arc<Insn>),
    List(Arc<Vec<Insn>>),
    Combined(Arc<Vec<CodePiece>>),
}

/// An immutable fragment of bytecode.
#[derive(Debug, Clone)]
pub struct CodePiece {
    kind: PieceKind,
}

impl CodePiece {
    /// The empty fragment.
    pub fn empty() -> CodePiece {
        CodePiece { kind: PieceKind::Empty }
    }

    /// A fragment of a single instruction.
    pub fn of(insn: Insn) -> CodePiece {
        CodePiece { kind: PieceKind::Single(Arc::new(insn)) }
    }

    /// A fragment of a bare opcode.
    pub fn of_op(opcode: u8) -> CodePiece {
        CodePiece::of(Insn::simple(opcode))
    }

    /// Consume an instruction list into a fragment. The list must not be
    /// used elsewhere; passing it here is its one ownership transfer.
    pub fn of_list(insns: InsnList) -> CodePiece {
        let mut v = insns.into_vec();
        match v.len() {
            0 => CodePiece::empty(),
            1 => CodePiece::of(v.pop().unwrap()),
            _ => CodePiece { kind: PieceKind::List(Arc::new(v)) },
        }
    }

    /// Concatenate fragments in order. Nested composites are flattened so
    /// repeated concatenation stays linear in the total instruction count.
    pub fn concat<I>(pieces: I) -> CodePiece
    where
        I: IntoIterator<Item = CodePiece>,
    {
        let mut flat: Vec<CodePiece> = Vec::new();
        for piece in pieces {
            piece.unwrap_into(&mut flat);
        }
        match flat.len() {
            0 => CodePiece::empty(),
            1 => flat.pop().unwrap(),
            _ => CodePiece { kind: PieceKind::Combined(Arc::new(flat)) },
        }
    }

    fn unwrap_into(self, out: &mut Vec<CodePiece>) {
        match self.kind {
            PieceKind::Empty => {}
            PieceKind::Combined(parts) => {
                for part in parts.iter() {
                    part.clone().unwrap_into(out);
                }
            }
            _ => out.push(self),
        }
    }

    /// A new fragment consisting of `self` followed by `other`.
    pub fn append(self, other: CodePiece) -> CodePiece {
        if matches!(self.kind, PieceKind::Empty) {
            return other;
        }
        if matches!(other.kind, PieceKind::Empty) {
            return self;
        }
        CodePiece::concat([self, other])
    }

    /// A new fragment consisting of `self` followed by a single instruction.
    pub fn append_insn(self, insn: Insn) -> CodePiece {
        self.append(CodePiece::of(insn))
    }

    /// A new fragment consisting of `other` followed by `self`.
    pub fn prepend(self, other: CodePiece) -> CodePiece {
        other.append(self)
    }

    /// Number of instructions in this fragment.
    pub fn size(&self) -> usize {
        match &self.kind {
            PieceKind::Empty => 0,
            PieceKind::Single(_) => 1,
            PieceKind::List(insns) => insns.len(),
            PieceKind::Combined(parts) => parts.iter().map(CodePiece::size).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Materialize into a fresh instruction list.
    pub fn build(&self) -> InsnList {
        let mut list = InsnList::new();
        self.append_to(&mut list);
        list
    }

    /// Append this fragment's instructions to the final method body.
    pub fn append_to(&self, to: &mut InsnList) {
        match &self.kind {
            PieceKind::Empty => {}
            PieceKind::Single(insn) => to.push((**insn).clone()),
            PieceKind::List(insns) => {
                for insn in insns.iter() {
                    to.push(insn.clone());
                }
            }
            PieceKind::Combined(parts) => {
                for part in parts.iter() {
                    part.append_to(to);
                }
            }
        }
    }

    /// Prepend this fragment's instructions to the final method body.
    pub fn prepend_to(&self, to: &mut InsnList) {
        to.prepend(self.build());
    }

    /// Iterate this fragment's instructions without materializing a list.
    pub fn for_each_insn(&self, f: &mut impl FnMut(&Insn)) {
        match &self.kind {
            PieceKind::Empty => {}
            PieceKind::Single(insn) => f(insn),
            PieceKind::List(insns) => insns.iter().for_each(&mut *f),
            PieceKind::Combined(parts) => {
                for part in parts.iter() {
                    part.for_each_insn(f);
                }
            }
        }
    }
}

impl From<Insn> for CodePiece {
    fn from(insn: Insn) -> CodePiece {
        CodePiece::of(insn)
    }
}

impl From<InsnList> for CodePiece {
    fn from(list: InsnList) -> CodePiece {
        CodePiece::of_list(list)
    }
}

/// Growing accumulator over fragments, for call sites that build a body
/// step by step instead of nesting `append` chains.
#[derive(Debug, Default)]
pub struct CodeBuilder {
    pieces: Vec<CodePiece>,
}

impl CodeBuilder {
    pub fn new() -> CodeBuilder {
        CodeBuilder::default()
    }

    pub fn add(&mut self, piece: impl Into<CodePiece>) -> &mut Self {
        self.pieces.push(piece.into());
        self
    }

    pub fn build(self) -> CodePiece {
        CodePiece::concat(self.pieces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::insn::opcodes::*;

    fn op(o: u8) -> CodePiece {
        CodePiece::of_op(o)
    }

    #[test]
    fn empty_absorbs_appends() {
        let piece = CodePiece::empty().append(op(NOP));
        assert_eq!(piece.size(), 1);
        let piece = op(NOP).append(CodePiece::empty());
        assert_eq!(piece.size(), 1);
    }

    #[test]
    fn concat_is_associative() {
        // grouping must not affect order or count
        let grouped_left =
            CodePiece::concat([op(NOP).append(op(POP)), op(DUP)]);
        let grouped_right =
            CodePiece::concat([op(NOP), op(POP).append(op(DUP))]);
        assert_eq!(grouped_left.build(), grouped_right.build());
        assert_eq!(grouped_left.size(), 3);
    }

    #[test]
    fn concat_preserves_count_and_order() {
        let n = 10;
        let pieces: Vec<CodePiece> = (0..n).map(|_| op(NOP)).collect();
        let combined = CodePiece::concat(pieces);
        assert_eq!(combined.size(), n);
        assert_eq!(combined.build().len(), n);
    }

    #[test]
    fn flattening_keeps_combined_shallow() {
        // repeatedly appending should not nest composites ever deeper
        let mut piece = CodePiece::empty();
        for _ in 0..100 {
            piece = piece.append(op(NOP));
        }
        assert_eq!(piece.size(), 100);
        assert_eq!(piece.build().len(), 100);
    }

    #[test]
    fn composition_does_not_mutate_operands() {
        let a = op(NOP);
        let b = op(POP);
        let _combined = a.clone().append(b.clone());
        assert_eq!(a.size(), 1);
        assert_eq!(b.size(), 1);
    }

    #[test]
    fn builder_collects_in_order() {
        let mut builder = CodeBuilder::new();
        builder.add(op(NOP)).add(Insn::simple(POP)).add(op(DUP));
        let piece = builder.build();
        let ops: Vec<Insn> = piece.build().into_vec();
        assert_eq!(
            ops,
            vec![Insn::simple(NOP), Insn::simple(POP), Insn::simple(DUP)]
        );
    }
}
