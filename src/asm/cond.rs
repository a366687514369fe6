//! Branch-free condition building
//!
//! A `Condition` pairs an operand fragment with the two conditional jump
//! opcodes that branch when it holds and when it does not. Control flow
//! shapes (`then`, `otherwise`, do-while loops) are assembled from that
//! pair without the caller ever allocating labels.

use crate::asm::code::{CodeBuilder, CodePiece};
use crate::asm::insn::{opcodes::*, Insn, Label};
use crate::asm::pieces;
use crate::classfile::ty::JType;

/// A boolean condition over one or two stack operands.
#[derive(Debug, Clone)]
pub struct Condition {
    /// Pushes the operands the jump opcodes consume.
    operands: CodePiece,
    /// Branches when the condition holds.
    jump_true: u8,
    /// Branches when the condition does not hold.
    jump_false: u8,
}

impl Condition {
    pub fn of(operands: CodePiece, jump_true: u8, jump_false: u8) -> Condition {
        Condition { operands, jump_true, jump_false }
    }

    /// `a == b` for values of the given type. Primitive comparison uses the
    /// type's compare instruction; references compare by identity unless
    /// `use_equals` asks for `Objects.equals`, which also tolerates null on
    /// either side.
    pub fn if_equal(a: CodePiece, b: CodePiece, ty: &JType, use_equals: bool) -> Condition {
        match ty {
            JType::Boolean | JType::Byte | JType::Char | JType::Short | JType::Int => {
                Condition::of(a.append(b), IF_ICMPEQ, IF_ICMPNE)
            }
            JType::Long => Condition::of(
                a.append(b).append_insn(Insn::simple(LCMP)),
                IFEQ,
                IFNE,
            ),
            JType::Float => Condition::of(
                a.append(b).append_insn(Insn::simple(FCMPL)),
                IFEQ,
                IFNE,
            ),
            JType::Double => Condition::of(
                a.append(b).append_insn(Insn::simple(DCMPL)),
                IFEQ,
                IFNE,
            ),
            JType::Void => panic!("cannot compare void values"),
            JType::Object(_) | JType::Array(_) => {
                if use_equals {
                    let call = pieces::invoke_static(
                        "java/util/Objects",
                        "equals",
                        "(Ljava/lang/Object;Ljava/lang/Object;)Z",
                        vec![a, b],
                    );
                    Condition::of(call, IFNE, IFEQ)
                } else {
                    Condition::of(a.append(b), IF_ACMPEQ, IF_ACMPNE)
                }
            }
        }
    }

    /// Holds when the reference on the stack is null.
    pub fn if_null(value: CodePiece) -> Condition {
        Condition::of(value, IFNULL, IFNONNULL)
    }

    pub fn if_non_null(value: CodePiece) -> Condition {
        Condition::of(value, IFNONNULL, IFNULL)
    }

    /// Holds when the boolean on the stack is true.
    pub fn if_true(value: CodePiece) -> Condition {
        Condition::of(value, IFNE, IFEQ)
    }

    pub fn negate(self) -> Condition {
        Condition {
            operands: self.operands,
            jump_true: self.jump_false,
            jump_false: self.jump_true,
        }
    }

    /// `if (cond) { body }`
    pub fn then(&self, body: CodePiece) -> CodePiece {
        let end = Label::fresh();
        let mut builder = CodeBuilder::new();
        builder
            .add(self.operands.clone())
            .add(Insn::Jump { opcode: self.jump_false, target: end })
            .add(body)
            .add(Insn::Mark(end));
        builder.build()
    }

    /// `if (!cond) { body }`
    pub fn otherwise(&self, body: CodePiece) -> CodePiece {
        let end = Label::fresh();
        let mut builder = CodeBuilder::new();
        builder
            .add(self.operands.clone())
            .add(Insn::Jump { opcode: self.jump_true, target: end })
            .add(body)
            .add(Insn::Mark(end));
        builder.build()
    }

    /// `if (cond) { then_body } else { else_body }`
    pub fn then_else(&self, then_body: CodePiece, else_body: CodePiece) -> CodePiece {
        let else_start = Label::fresh();
        let end = Label::fresh();
        let mut builder = CodeBuilder::new();
        builder
            .add(self.operands.clone())
            .add(Insn::Jump { opcode: self.jump_false, target: else_start })
            .add(then_body)
            .add(Insn::Jump { opcode: GOTO, target: end })
            .add(Insn::Mark(else_start))
            .add(else_body)
            .add(Insn::Mark(end));
        builder.build()
    }

    /// `do { body } while (cond)`: the body always runs at least once.
    pub fn make_do_while(&self, body: CodePiece) -> CodePiece {
        let start = Label::fresh();
        let mut builder = CodeBuilder::new();
        builder
            .add(Insn::Mark(start))
            .add(body)
            .add(self.operands.clone())
            .add(Insn::Jump { opcode: self.jump_true, target: start });
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::pieces;

    fn jump_opcodes(piece: &CodePiece) -> Vec<u8> {
        let mut out = Vec::new();
        piece.for_each_insn(&mut |insn| {
            if let Insn::Jump { opcode, .. } = insn {
                out.push(*opcode);
            }
        });
        out
    }

    #[test]
    fn int_equality_uses_icmp() {
        let cond = Condition::if_equal(
            pieces::const_int(1),
            pieces::const_int(2),
            &JType::Int,
            false,
        );
        let piece = cond.then(pieces::const_int(0));
        assert_eq!(jump_opcodes(&piece), vec![IF_ICMPNE]);
    }

    #[test]
    fn long_equality_compares_then_branches() {
        let cond = Condition::if_equal(
            pieces::const_long(1),
            pieces::const_long(2),
            &JType::Long,
            false,
        );
        let piece = cond.then(CodePiece::empty());
        let ops: Vec<Insn> = piece.build().into_vec();
        let lcmp_at = ops.iter().position(|i| *i == Insn::simple(LCMP)).unwrap();
        assert!(matches!(ops[lcmp_at + 1], Insn::Jump { opcode: IFNE, .. }));
    }

    #[test]
    fn reference_equals_goes_through_objects() {
        let cond = Condition::if_equal(
            pieces::const_null(),
            pieces::const_null(),
            &JType::object("java/lang/String"),
            true,
        );
        let mut saw_call = false;
        cond.then(CodePiece::empty()).for_each_insn(&mut |insn| {
            if let Insn::Method { owner, name, .. } = insn {
                saw_call = owner == "java/util/Objects" && name == "equals";
            }
        });
        assert!(saw_call);
    }

    #[test]
    fn negate_swaps_branches() {
        let cond = Condition::if_true(pieces::const_bool(true)).negate();
        let piece = cond.then(CodePiece::empty());
        // negated "if true" falls through on IFNE
        assert_eq!(jump_opcodes(&piece), vec![IFNE]);
    }

    #[test]
    fn then_else_marks_both_arms() {
        let cond = Condition::if_null(pieces::const_null());
        let piece = cond.then_else(pieces::const_int(1), pieces::const_int(2));
        let ops = piece.build().into_vec();
        let marks = ops.iter().filter(|i| matches!(i, Insn::Mark(_))).count();
        assert_eq!(marks, 2);
        assert!(ops.iter().any(|i| matches!(i, Insn::Jump { opcode: GOTO, .. })));
    }

    #[test]
    fn do_while_jumps_back_to_start() {
        let cond = Condition::if_true(pieces::const_bool(true));
        let ops = cond.make_do_while(pieces::const_int(7)).build().into_vec();
        let Insn::Mark(start) = ops[0] else { panic!("loop must start with its mark") };
        assert!(matches!(ops.last(), Some(Insn::Jump { opcode: IFNE, target }) if *target == start));
    }
}
