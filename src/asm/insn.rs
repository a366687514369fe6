//! Symbolic JVM instructions
//!
//! The engine never splices raw byte sequences around; every generated
//! operation is an `Insn` value. Materialization into classfile bytes
//! happens once, in `classfile::emit`.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::classfile::ty::JType;

/// Opcode constants, JVMS chapter 6. Only the opcodes this engine emits.
pub mod opcodes {
    pub const NOP: u8 = 0x00;
    pub const ACONST_NULL: u8 = 0x01;
    pub const ICONST_M1: u8 = 0x02;
    pub const ICONST_0: u8 = 0x03;
    pub const ICONST_1: u8 = 0x04;
    pub const ICONST_2: u8 = 0x05;
    pub const ICONST_3: u8 = 0x06;
    pub const ICONST_4: u8 = 0x07;
    pub const ICONST_5: u8 = 0x08;
    pub const LCONST_0: u8 = 0x09;
    pub const LCONST_1: u8 = 0x0a;
    pub const FCONST_0: u8 = 0x0b;
    pub const FCONST_1: u8 = 0x0c;
    pub const FCONST_2: u8 = 0x0d;
    pub const DCONST_0: u8 = 0x0e;
    pub const DCONST_1: u8 = 0x0f;
    pub const BIPUSH: u8 = 0x10;
    pub const SIPUSH: u8 = 0x11;
    pub const LDC: u8 = 0x12;
    pub const LDC_W: u8 = 0x13;
    pub const LDC2_W: u8 = 0x14;

    pub const ILOAD: u8 = 0x15;
    pub const LLOAD: u8 = 0x16;
    pub const FLOAD: u8 = 0x17;
    pub const DLOAD: u8 = 0x18;
    pub const ALOAD: u8 = 0x19;
    pub const ISTORE: u8 = 0x36;
    pub const LSTORE: u8 = 0x37;
    pub const FSTORE: u8 = 0x38;
    pub const DSTORE: u8 = 0x39;
    pub const ASTORE: u8 = 0x3a;

    pub const IASTORE: u8 = 0x4f;
    pub const LASTORE: u8 = 0x50;
    pub const FASTORE: u8 = 0x51;
    pub const DASTORE: u8 = 0x52;
    pub const AASTORE: u8 = 0x53;
    pub const BASTORE: u8 = 0x54;
    pub const CASTORE: u8 = 0x55;
    pub const SASTORE: u8 = 0x56;

    pub const POP: u8 = 0x57;
    pub const POP2: u8 = 0x58;
    pub const DUP: u8 = 0x59;
    pub const DUP_X1: u8 = 0x5a;
    pub const DUP2: u8 = 0x5c;
    pub const DUP2_X1: u8 = 0x5d;

    pub const IINC: u8 = 0x84;
    pub const I2L: u8 = 0x85;
    pub const I2F: u8 = 0x86;
    pub const I2D: u8 = 0x87;
    pub const L2I: u8 = 0x88;
    pub const L2F: u8 = 0x89;
    pub const L2D: u8 = 0x8a;
    pub const F2I: u8 = 0x8b;
    pub const F2L: u8 = 0x8c;
    pub const F2D: u8 = 0x8d;
    pub const D2I: u8 = 0x8e;
    pub const D2L: u8 = 0x8f;
    pub const D2F: u8 = 0x90;
    pub const I2B: u8 = 0x91;
    pub const I2C: u8 = 0x92;
    pub const I2S: u8 = 0x93;

    pub const LCMP: u8 = 0x94;
    pub const FCMPL: u8 = 0x95;
    pub const DCMPL: u8 = 0x97;

    pub const IFEQ: u8 = 0x99;
    pub const IFNE: u8 = 0x9a;
    pub const IFLT: u8 = 0x9b;
    pub const IFGE: u8 = 0x9c;
    pub const IFGT: u8 = 0x9d;
    pub const IFLE: u8 = 0x9e;
    pub const IF_ICMPEQ: u8 = 0x9f;
    pub const IF_ICMPNE: u8 = 0xa0;
    pub const IF_ICMPLT: u8 = 0xa1;
    pub const IF_ICMPGE: u8 = 0xa2;
    pub const IF_ICMPGT: u8 = 0xa3;
    pub const IF_ICMPLE: u8 = 0xa4;
    pub const IF_ACMPEQ: u8 = 0xa5;
    pub const IF_ACMPNE: u8 = 0xa6;
    pub const GOTO: u8 = 0xa7;
    pub const TABLESWITCH: u8 = 0xaa;

    pub const IRETURN: u8 = 0xac;
    pub const LRETURN: u8 = 0xad;
    pub const FRETURN: u8 = 0xae;
    pub const DRETURN: u8 = 0xaf;
    pub const ARETURN: u8 = 0xb0;
    pub const RETURN: u8 = 0xb1;

    pub const GETSTATIC: u8 = 0xb2;
    pub const PUTSTATIC: u8 = 0xb3;
    pub const GETFIELD: u8 = 0xb4;
    pub const PUTFIELD: u8 = 0xb5;
    pub const INVOKEVIRTUAL: u8 = 0xb6;
    pub const INVOKESPECIAL: u8 = 0xb7;
    pub const INVOKESTATIC: u8 = 0xb8;
    pub const INVOKEINTERFACE: u8 = 0xb9;

    pub const NEW: u8 = 0xbb;
    pub const NEWARRAY: u8 = 0xbc;
    pub const ANEWARRAY: u8 = 0xbd;
    pub const ATHROW: u8 = 0xbf;
    pub const CHECKCAST: u8 = 0xc0;
    pub const INSTANCEOF: u8 = 0xc1;
    pub const WIDE: u8 = 0xc4;
    pub const IFNULL: u8 = 0xc6;
    pub const IFNONNULL: u8 = 0xc7;

    // newarray atype operands, JVMS 6.5
    pub const T_BOOLEAN: u8 = 4;
    pub const T_CHAR: u8 = 5;
    pub const T_FLOAT: u8 = 6;
    pub const T_DOUBLE: u8 = 7;
    pub const T_BYTE: u8 = 8;
    pub const T_SHORT: u8 = 9;
    pub const T_INT: u8 = 10;
    pub const T_LONG: u8 = 11;
}

use opcodes::*;

static NEXT_LABEL: AtomicU32 = AtomicU32::new(0);

/// A branch target. Labels are process-unique; a label must appear as an
/// `Insn::Mark` exactly once in the method it is jumped to in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

impl Label {
    pub fn fresh() -> Label {
        Label(NEXT_LABEL.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(self) -> u32 {
        self.0
    }
}

/// A loadable constant, resolved through the constant pool at emit time.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    /// A class constant by internal name.
    Class(String),
}

/// One symbolic instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    /// An opcode with no operands.
    Simple(u8),
    /// `bipush` / `sipush` immediate.
    IntPush { opcode: u8, value: i32 },
    /// Load-constant; the concrete ldc variant is chosen at emit time.
    Ldc(Const),
    /// Local variable load or store.
    Var { opcode: u8, index: u16 },
    Iinc { index: u16, delta: i16 },
    Field { opcode: u8, owner: String, name: String, desc: String },
    Method { opcode: u8, owner: String, name: String, desc: String },
    /// `new` / `checkcast` / `anewarray` / `instanceof`.
    Type { opcode: u8, ty: String },
    /// Primitive array allocation with a `T_*` type code.
    NewArray(u8),
    Jump { opcode: u8, target: Label },
    /// Marks the position of a label.
    Mark(Label),
    /// Dense switch dispatch over `lo..=hi`.
    TableSwitch { lo: i32, hi: i32, default: Label, targets: Vec<Label> },
}

impl Insn {
    pub fn simple(opcode: u8) -> Insn {
        Insn::Simple(opcode)
    }

    /// Jump targets of this instruction, if any.
    pub fn targets(&self) -> Vec<Label> {
        match self {
            Insn::Jump { target, .. } => vec![*target],
            Insn::TableSwitch { default, targets, .. } => {
                let mut all = targets.clone();
                all.push(*default);
                all
            }
            _ => Vec::new(),
        }
    }
}

/// A list of instructions on its way into a method body.
///
/// Ownership transfers exactly once: a list consumed into a `CodePiece` or
/// appended to a method is moved, never reused.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InsnList {
    insns: Vec<Insn>,
}

impl InsnList {
    pub fn new() -> InsnList {
        InsnList { insns: Vec::new() }
    }

    pub fn push(&mut self, insn: Insn) {
        self.insns.push(insn);
    }

    pub fn extend(&mut self, other: InsnList) {
        self.insns.extend(other.insns);
    }

    /// Insert the given list in front of the existing instructions.
    pub fn prepend(&mut self, mut other: InsnList) {
        std::mem::swap(&mut self.insns, &mut other.insns);
        self.insns.extend(other.insns);
    }

    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Insn> {
        self.insns.iter()
    }

    pub fn as_slice(&self) -> &[Insn] {
        &self.insns
    }

    pub fn into_vec(self) -> Vec<Insn> {
        self.insns
    }
}

impl FromIterator<Insn> for InsnList {
    fn from_iter<T: IntoIterator<Item = Insn>>(iter: T) -> Self {
        InsnList { insns: iter.into_iter().collect() }
    }
}

impl IntoIterator for InsnList {
    type Item = Insn;
    type IntoIter = std::vec::IntoIter<Insn>;

    fn into_iter(self) -> Self::IntoIter {
        self.insns.into_iter()
    }
}

/// The load opcode family member for a value of the given type.
pub fn load_opcode(ty: &JType) -> u8 {
    match ty {
        JType::Long => LLOAD,
        JType::Float => FLOAD,
        JType::Double => DLOAD,
        JType::Object(_) | JType::Array(_) => ALOAD,
        JType::Void => panic!("cannot load void"),
        _ => ILOAD,
    }
}

/// The store opcode family member for a value of the given type.
pub fn store_opcode(ty: &JType) -> u8 {
    match ty {
        JType::Long => LSTORE,
        JType::Float => FSTORE,
        JType::Double => DSTORE,
        JType::Object(_) | JType::Array(_) => ASTORE,
        JType::Void => panic!("cannot store void"),
        _ => ISTORE,
    }
}

/// The return opcode for the given type.
pub fn return_opcode(ty: &JType) -> u8 {
    match ty {
        JType::Long => LRETURN,
        JType::Float => FRETURN,
        JType::Double => DRETURN,
        JType::Object(_) | JType::Array(_) => ARETURN,
        JType::Void => RETURN,
        _ => IRETURN,
    }
}

/// The array-store opcode for an element of the given type.
pub fn array_store_opcode(ty: &JType) -> u8 {
    match ty {
        JType::Boolean | JType::Byte => BASTORE,
        JType::Char => CASTORE,
        JType::Short => SASTORE,
        JType::Int => IASTORE,
        JType::Long => LASTORE,
        JType::Float => FASTORE,
        JType::Double => DASTORE,
        JType::Object(_) | JType::Array(_) => AASTORE,
        JType::Void => panic!("cannot store void in array"),
    }
}

/// The `newarray` type code for a primitive element type.
pub fn newarray_code(ty: &JType) -> u8 {
    match ty {
        JType::Boolean => T_BOOLEAN,
        JType::Byte => T_BYTE,
        JType::Short => T_SHORT,
        JType::Char => T_CHAR,
        JType::Int => T_INT,
        JType::Long => T_LONG,
        JType::Float => T_FLOAT,
        JType::Double => T_DOUBLE,
        _ => panic!("newarray_code on non-primitive {:?}", ty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_unique() {
        let a = Label::fresh();
        let b = Label::fresh();
        assert_ne!(a, b);
    }

    #[test]
    fn prepend_keeps_order() {
        let mut list = InsnList::new();
        list.push(Insn::simple(RETURN));
        let mut head = InsnList::new();
        head.push(Insn::simple(NOP));
        head.push(Insn::simple(POP));
        list.prepend(head);
        let ops: Vec<_> = list.into_vec();
        assert_eq!(
            ops,
            vec![Insn::simple(NOP), Insn::simple(POP), Insn::simple(RETURN)]
        );
    }

    #[test]
    fn opcode_families() {
        assert_eq!(load_opcode(&JType::Boolean), ILOAD);
        assert_eq!(load_opcode(&JType::object("a/B")), ALOAD);
        assert_eq!(store_opcode(&JType::Double), DSTORE);
        assert_eq!(return_opcode(&JType::Void), RETURN);
    }
}
