//! Class file serialization
//!
//! Lowers a [`ClassNode`] and its symbolic instructions to `.class` bytes.
//! Labels are resolved in two passes over each method body: the first pass
//! assigns bytecode offsets (interning constants so `ldc` widths are
//! known), the second encodes against the resolved offsets. Stack and
//! local limits are computed by a linear scan over the instructions.

use std::collections::HashMap;

use crate::asm::insn::{opcodes::*, Const, Insn, InsnList, Label};
use crate::classfile::constpool::ConstantPool;
use crate::classfile::tree::{Annotation, AnnotationValue, ClassNode};
use crate::classfile::ty::{parse_method_descriptor, JType};
use crate::error::{Error, Result};

const MAGIC: u32 = 0xCAFE_BABE;

/// Serialize a class to `.class` bytes.
pub fn emit_class(clazz: &ClassNode) -> Result<Vec<u8>> {
    let mut pool = ConstantPool::new();

    let this_index = pool.add_class(&clazz.name);
    let super_index = match &clazz.super_name {
        Some(name) => pool.add_class(name),
        None => 0,
    };
    let interface_indices: Vec<u16> =
        clazz.interfaces.iter().map(|i| pool.add_class(i)).collect();

    // Member bodies intern into the pool, so they are built before the
    // pool itself is written.
    let mut field_bytes = Vec::new();
    for field in &clazz.fields {
        field_bytes.extend_from_slice(&field.access.bits().to_be_bytes());
        field_bytes.extend_from_slice(&pool.add_utf8(&field.name).to_be_bytes());
        field_bytes.extend_from_slice(&pool.add_utf8(&field.desc).to_be_bytes());
        let attrs = annotation_attributes(&mut pool, &field.annotations)?;
        field_bytes.extend_from_slice(&attrs);
    }

    let mut method_bytes = Vec::new();
    for method in &clazz.methods {
        method_bytes.extend_from_slice(&method.access.bits().to_be_bytes());
        method_bytes.extend_from_slice(&pool.add_utf8(&method.name).to_be_bytes());
        method_bytes.extend_from_slice(&pool.add_utf8(&method.desc).to_be_bytes());

        let mut attrs: Vec<Vec<u8>> = Vec::new();
        if !method.insns.is_empty() {
            let is_static = method.access.is_static();
            attrs.push(code_attribute(&mut pool, &method.desc, is_static, &method.insns)?);
        }
        attrs.extend(annotation_attribute(&mut pool, &method.annotations)?);
        method_bytes.extend_from_slice(&(attrs.len() as u16).to_be_bytes());
        for attr in attrs {
            method_bytes.extend_from_slice(&attr);
        }
    }

    let class_attrs = annotation_attributes(&mut pool, &clazz.annotations)?;

    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes()); // minor
    out.extend_from_slice(&clazz.version.to_be_bytes());
    out.extend_from_slice(&pool.to_bytes());
    out.extend_from_slice(&clazz.access.bits().to_be_bytes());
    out.extend_from_slice(&this_index.to_be_bytes());
    out.extend_from_slice(&super_index.to_be_bytes());
    out.extend_from_slice(&(interface_indices.len() as u16).to_be_bytes());
    for idx in interface_indices {
        out.extend_from_slice(&idx.to_be_bytes());
    }
    out.extend_from_slice(&(clazz.fields.len() as u16).to_be_bytes());
    out.extend_from_slice(&field_bytes);
    out.extend_from_slice(&(clazz.methods.len() as u16).to_be_bytes());
    out.extend_from_slice(&method_bytes);
    out.extend_from_slice(&class_attrs);
    Ok(out)
}

/// Attribute count followed by the annotation attribute, if any.
fn annotation_attributes(pool: &mut ConstantPool, annotations: &[Annotation]) -> Result<Vec<u8>> {
    let attrs = annotation_attribute(pool, annotations)?;
    let mut out = Vec::new();
    out.extend_from_slice(&(attrs.len() as u16).to_be_bytes());
    for attr in attrs {
        out.extend_from_slice(&attr);
    }
    Ok(out)
}

fn annotation_attribute(
    pool: &mut ConstantPool,
    annotations: &[Annotation],
) -> Result<Vec<Vec<u8>>> {
    if annotations.is_empty() {
        return Ok(Vec::new());
    }
    let name_index = pool.add_utf8("RuntimeVisibleAnnotations");
    let mut body = Vec::new();
    body.extend_from_slice(&(annotations.len() as u16).to_be_bytes());
    for ann in annotations {
        body.extend_from_slice(&pool.add_utf8(&ann.desc).to_be_bytes());
        body.extend_from_slice(&(ann.values.len() as u16).to_be_bytes());
        // deterministic output regardless of map order
        let mut pairs: Vec<_> = ann.values.iter().collect();
        pairs.sort_by_key(|(name, _)| name.as_str());
        for (name, value) in pairs {
            body.extend_from_slice(&pool.add_utf8(name).to_be_bytes());
            element_value(pool, value, &mut body)?;
        }
    }
    let mut attr = Vec::new();
    attr.extend_from_slice(&name_index.to_be_bytes());
    attr.extend_from_slice(&(body.len() as u32).to_be_bytes());
    attr.extend_from_slice(&body);
    Ok(vec![attr])
}

fn element_value(pool: &mut ConstantPool, value: &AnnotationValue, out: &mut Vec<u8>) -> Result<()> {
    match value {
        AnnotationValue::Str(s) => {
            out.push(b's');
            out.extend_from_slice(&pool.add_utf8(s).to_be_bytes());
        }
        AnnotationValue::Int(i) => {
            if let Ok(narrow) = i32::try_from(*i) {
                out.push(b'I');
                out.extend_from_slice(&pool.add_integer(narrow).to_be_bytes());
            } else {
                out.push(b'J');
                out.extend_from_slice(&pool.add_long(*i).to_be_bytes());
            }
        }
        AnnotationValue::Bool(b) => {
            out.push(b'Z');
            out.extend_from_slice(&pool.add_integer(*b as i32).to_be_bytes());
        }
        AnnotationValue::Class(desc) => {
            out.push(b'c');
            out.extend_from_slice(&pool.add_utf8(desc).to_be_bytes());
        }
        AnnotationValue::EnumConst { desc, value } => {
            out.push(b'e');
            out.extend_from_slice(&pool.add_utf8(desc).to_be_bytes());
            out.extend_from_slice(&pool.add_utf8(value).to_be_bytes());
        }
    }
    Ok(())
}

fn code_attribute(
    pool: &mut ConstantPool,
    desc: &str,
    is_static: bool,
    insns: &InsnList,
) -> Result<Vec<u8>> {
    let name_index = pool.add_utf8("Code");
    let code = assemble(pool, insns)?;
    let max_stack = max_stack(insns, desc)?;
    let max_locals = max_locals(insns, desc, is_static)?;

    let mut body = Vec::new();
    body.extend_from_slice(&max_stack.to_be_bytes());
    body.extend_from_slice(&max_locals.to_be_bytes());
    body.extend_from_slice(&(code.len() as u32).to_be_bytes());
    body.extend_from_slice(&code);
    body.extend_from_slice(&0u16.to_be_bytes()); // exception table
    body.extend_from_slice(&0u16.to_be_bytes()); // code attributes

    let mut attr = Vec::new();
    attr.extend_from_slice(&name_index.to_be_bytes());
    attr.extend_from_slice(&(body.len() as u32).to_be_bytes());
    attr.extend_from_slice(&body);
    Ok(attr)
}

/// Two-pass instruction encoding with label resolution.
fn assemble(pool: &mut ConstantPool, insns: &InsnList) -> Result<Vec<u8>> {
    let mut offsets = Vec::with_capacity(insns.len());
    let mut labels: HashMap<Label, u32> = HashMap::new();
    let mut pc: u32 = 0;
    for insn in insns.iter() {
        offsets.push(pc);
        if let Insn::Mark(label) = insn {
            let prev = labels.insert(*label, pc);
            if prev.is_some() {
                return Err(Error::codegen(format!("label {label:?} marked twice")));
            }
        }
        pc += insn_size(pool, insn, pc)?;
    }

    let mut code = Vec::with_capacity(pc as usize);
    for (insn, &at) in insns.iter().zip(&offsets) {
        encode(pool, insn, at, &labels, &mut code)?;
    }
    debug_assert_eq!(code.len() as u32, pc);
    Ok(code)
}

fn resolve(labels: &HashMap<Label, u32>, label: Label) -> Result<u32> {
    labels
        .get(&label)
        .copied()
        .ok_or_else(|| Error::codegen(format!("jump to unmarked label {label:?}")))
}

fn branch_offset(from: u32, to: u32) -> Result<i16> {
    let delta = to as i64 - from as i64;
    i16::try_from(delta).map_err(|_| Error::codegen(format!("branch offset {delta} overflows i16")))
}

fn insn_size(pool: &mut ConstantPool, insn: &Insn, pc: u32) -> Result<u32> {
    Ok(match insn {
        Insn::Simple(_) => 1,
        Insn::IntPush { opcode, .. } => {
            if *opcode == BIPUSH {
                2
            } else {
                3
            }
        }
        Insn::Ldc(constant) => match ldc_index(pool, constant) {
            (idx, false) if idx <= u8::MAX as u16 => 2,
            _ => 3,
        },
        Insn::Var { opcode, index } => var_size(*opcode, *index),
        Insn::Iinc { index, delta } => {
            if *index <= u8::MAX as u16 && i8::try_from(*delta).is_ok() {
                3
            } else {
                6
            }
        }
        Insn::Field { .. } => 3,
        Insn::Method { opcode, .. } => {
            if *opcode == INVOKEINTERFACE {
                5
            } else {
                3
            }
        }
        Insn::Type { .. } => 3,
        Insn::NewArray(_) => 2,
        Insn::Jump { .. } => 3,
        Insn::Mark(_) => 0,
        Insn::TableSwitch { targets, .. } => {
            let pad = (4 - ((pc + 1) % 4)) % 4;
            1 + pad + 12 + 4 * targets.len() as u32
        }
    })
}

fn var_size(opcode: u8, index: u16) -> u32 {
    if index <= 3 && compact_var(opcode, index).is_some() {
        1
    } else if index <= u8::MAX as u16 {
        2
    } else {
        4 // wide form
    }
}

/// The one-byte `<op>_<n>` form, when one exists.
fn compact_var(opcode: u8, index: u16) -> Option<u8> {
    if index > 3 {
        return None;
    }
    let base = match opcode {
        ILOAD => 0x1a,
        LLOAD => 0x1e,
        FLOAD => 0x22,
        DLOAD => 0x26,
        ALOAD => 0x2a,
        ISTORE => 0x3b,
        LSTORE => 0x3f,
        FSTORE => 0x43,
        DSTORE => 0x47,
        ASTORE => 0x4b,
        _ => return None,
    };
    Some(base + index as u8)
}

/// Intern the constant; returns the pool index and whether it is wide
/// (`ldc2_w` territory).
fn ldc_index(pool: &mut ConstantPool, constant: &Const) -> (u16, bool) {
    match constant {
        Const::Int(i) => (pool.add_integer(*i), false),
        Const::Float(f) => (pool.add_float(*f), false),
        Const::Str(s) => (pool.add_string(s), false),
        Const::Class(name) => (pool.add_class(name), false),
        Const::Long(l) => (pool.add_long(*l), true),
        Const::Double(d) => (pool.add_double(*d), true),
    }
}

fn encode(
    pool: &mut ConstantPool,
    insn: &Insn,
    at: u32,
    labels: &HashMap<Label, u32>,
    out: &mut Vec<u8>,
) -> Result<()> {
    match insn {
        Insn::Simple(opcode) => out.push(*opcode),
        Insn::IntPush { opcode, value } => {
            out.push(*opcode);
            if *opcode == BIPUSH {
                out.push(*value as i8 as u8);
            } else {
                out.extend_from_slice(&(*value as i16).to_be_bytes());
            }
        }
        Insn::Ldc(constant) => match ldc_index(pool, constant) {
            (idx, true) => {
                out.push(LDC2_W);
                out.extend_from_slice(&idx.to_be_bytes());
            }
            (idx, false) if idx <= u8::MAX as u16 => {
                out.push(LDC);
                out.push(idx as u8);
            }
            (idx, false) => {
                out.push(LDC_W);
                out.extend_from_slice(&idx.to_be_bytes());
            }
        },
        Insn::Var { opcode, index } => {
            if let Some(compact) = compact_var(*opcode, *index) {
                out.push(compact);
            } else if *index <= u8::MAX as u16 {
                out.push(*opcode);
                out.push(*index as u8);
            } else {
                out.push(WIDE);
                out.push(*opcode);
                out.extend_from_slice(&index.to_be_bytes());
            }
        }
        Insn::Iinc { index, delta } => {
            if *index <= u8::MAX as u16 && i8::try_from(*delta).is_ok() {
                out.push(IINC);
                out.push(*index as u8);
                out.push(*delta as i8 as u8);
            } else {
                out.push(WIDE);
                out.push(IINC);
                out.extend_from_slice(&index.to_be_bytes());
                out.extend_from_slice(&delta.to_be_bytes());
            }
        }
        Insn::Field { opcode, owner, name, desc } => {
            let idx = pool.add_field_ref(owner, name, desc);
            out.push(*opcode);
            out.extend_from_slice(&idx.to_be_bytes());
        }
        Insn::Method { opcode, owner, name, desc } => {
            if *opcode == INVOKEINTERFACE {
                let idx = pool.add_interface_method_ref(owner, name, desc);
                let (params, _) = parse_method_descriptor(desc)?;
                let count: u8 = 1 + params.iter().map(|p| p.width() as u8).sum::<u8>();
                out.push(*opcode);
                out.extend_from_slice(&idx.to_be_bytes());
                out.push(count);
                out.push(0);
            } else {
                let idx = pool.add_method_ref(owner, name, desc);
                out.push(*opcode);
                out.extend_from_slice(&idx.to_be_bytes());
            }
        }
        Insn::Type { opcode, ty } => {
            let idx = pool.add_class(ty);
            out.push(*opcode);
            out.extend_from_slice(&idx.to_be_bytes());
        }
        Insn::NewArray(atype) => {
            out.push(NEWARRAY);
            out.push(*atype);
        }
        Insn::Jump { opcode, target } => {
            let to = resolve(labels, *target)?;
            out.push(*opcode);
            out.extend_from_slice(&branch_offset(at, to)?.to_be_bytes());
        }
        Insn::Mark(_) => {}
        Insn::TableSwitch { lo, hi, default, targets } => {
            out.push(TABLESWITCH);
            let pad = (4 - ((at + 1) % 4)) % 4;
            out.extend(std::iter::repeat(0u8).take(pad as usize));
            let default_at = resolve(labels, *default)?;
            out.extend_from_slice(&(default_at as i64 - at as i64).to_be_bytes()[4..]);
            out.extend_from_slice(&lo.to_be_bytes());
            out.extend_from_slice(&hi.to_be_bytes());
            for target in targets {
                let to = resolve(labels, *target)?;
                out.extend_from_slice(&(to as i64 - at as i64).to_be_bytes()[4..]);
            }
        }
    }
    Ok(())
}

/// Operand stack depth change of one instruction.
fn stack_delta(insn: &Insn) -> Result<i32> {
    Ok(match insn {
        Insn::Simple(op) => simple_delta(*op)?,
        Insn::IntPush { .. } => 1,
        Insn::Ldc(Const::Long(_)) | Insn::Ldc(Const::Double(_)) => 2,
        Insn::Ldc(_) => 1,
        Insn::Var { opcode, .. } => match *opcode {
            ILOAD | FLOAD | ALOAD => 1,
            LLOAD | DLOAD => 2,
            ISTORE | FSTORE | ASTORE => -1,
            LSTORE | DSTORE => -2,
            other => return Err(Error::codegen(format!("unknown var opcode {other:#x}"))),
        },
        Insn::Iinc { .. } => 0,
        Insn::Field { opcode, desc, .. } => {
            let width = JType::from_descriptor(desc)?.width() as i32;
            match *opcode {
                GETSTATIC => width,
                PUTSTATIC => -width,
                GETFIELD => width - 1,
                PUTFIELD => -width - 1,
                other => return Err(Error::codegen(format!("unknown field opcode {other:#x}"))),
            }
        }
        Insn::Method { opcode, desc, .. } => {
            let (params, ret) = parse_method_descriptor(desc)?;
            let args: i32 = params.iter().map(|p| p.width() as i32).sum();
            let receiver = if *opcode == INVOKESTATIC { 0 } else { 1 };
            ret.width() as i32 - args - receiver
        }
        Insn::Type { opcode, .. } => match *opcode {
            NEW => 1,
            CHECKCAST | INSTANCEOF | ANEWARRAY => 0,
            other => return Err(Error::codegen(format!("unknown type opcode {other:#x}"))),
        },
        Insn::NewArray(_) => 0,
        Insn::Jump { opcode, .. } => match *opcode {
            GOTO => 0,
            IFEQ | IFNE | IFLT | IFGE | IFGT | IFLE | IFNULL | IFNONNULL => -1,
            IF_ICMPEQ | IF_ICMPNE | IF_ICMPLT | IF_ICMPGE | IF_ICMPGT | IF_ICMPLE
            | IF_ACMPEQ | IF_ACMPNE => -2,
            other => return Err(Error::codegen(format!("unknown jump opcode {other:#x}"))),
        },
        Insn::Mark(_) => 0,
        Insn::TableSwitch { .. } => -1,
    })
}

fn simple_delta(op: u8) -> Result<i32> {
    Ok(match op {
        NOP => 0,
        ACONST_NULL | ICONST_M1 | ICONST_0 | ICONST_1 | ICONST_2 | ICONST_3 | ICONST_4
        | ICONST_5 | FCONST_0 | FCONST_1 | FCONST_2 => 1,
        LCONST_0 | LCONST_1 | DCONST_0 | DCONST_1 => 2,
        IASTORE | FASTORE | AASTORE | BASTORE | CASTORE | SASTORE => -3,
        LASTORE | DASTORE => -4,
        POP => -1,
        POP2 => -2,
        DUP | DUP_X1 => 1,
        DUP2 | DUP2_X1 => 2,
        I2F | F2I | I2B | I2C | I2S | L2D | D2L => 0,
        I2L | I2D | F2L | F2D => 1,
        L2I | L2F | D2I | D2F => -1,
        LCMP | DCMPL => -3,
        FCMPL => -1,
        IRETURN | FRETURN | ARETURN | ATHROW => -1,
        LRETURN | DRETURN => -2,
        RETURN => 0,
        other => return Err(Error::codegen(format!("unknown opcode {other:#x}"))),
    })
}

fn is_terminal(insn: &Insn) -> bool {
    matches!(
        insn,
        Insn::Simple(IRETURN | LRETURN | FRETURN | DRETURN | ARETURN | RETURN | ATHROW)
            | Insn::Jump { opcode: GOTO, .. }
            | Insn::TableSwitch { .. }
    )
}

/// Maximum operand stack depth, by linear scan. Depth at each label is
/// recorded when a branch to it is seen; a label reached only backwards
/// keeps the fall-through depth.
fn max_stack(insns: &InsnList, desc: &str) -> Result<u16> {
    let _ = parse_method_descriptor(desc)?;
    let mut at_label: HashMap<Label, i32> = HashMap::new();
    let mut depth: i32 = 0;
    let mut max: i32 = 0;
    let mut reachable = true;

    for insn in insns.iter() {
        if let Insn::Mark(label) = insn {
            if let Some(&recorded) = at_label.get(label) {
                depth = if reachable { depth.max(recorded) } else { recorded };
            } else if !reachable {
                depth = 0;
            }
            reachable = true;
            continue;
        }
        if !reachable {
            continue;
        }
        depth += stack_delta(insn)?;
        if depth < 0 {
            return Err(Error::codegen("operand stack underflow".to_string()));
        }
        max = max.max(depth);
        match insn {
            Insn::Jump { target, .. } => {
                let entry = at_label.entry(*target).or_insert(depth);
                *entry = (*entry).max(depth);
            }
            Insn::TableSwitch { default, targets, .. } => {
                for label in targets.iter().chain(std::iter::once(default)) {
                    let entry = at_label.entry(*label).or_insert(depth);
                    *entry = (*entry).max(depth);
                }
            }
            _ => {}
        }
        if is_terminal(insn) {
            reachable = false;
        }
    }
    u16::try_from(max).map_err(|_| Error::codegen("operand stack too deep".to_string()))
}

fn max_locals(insns: &InsnList, desc: &str, is_static: bool) -> Result<u16> {
    let (params, _) = parse_method_descriptor(desc)?;
    let mut max: u32 = if is_static { 0 } else { 1 };
    max += params.iter().map(|p| p.width() as u32).sum::<u32>();
    for insn in insns.iter() {
        let slot = match insn {
            Insn::Var { opcode, index } => {
                let width = match *opcode {
                    LLOAD | DLOAD | LSTORE | DSTORE => 2,
                    _ => 1,
                };
                Some(*index as u32 + width)
            }
            Insn::Iinc { index, .. } => Some(*index as u32 + 1),
            _ => None,
        };
        if let Some(slot) = slot {
            max = max.max(slot);
        }
    }
    u16::try_from(max).map_err(|_| Error::codegen("too many locals".to_string()))
}
