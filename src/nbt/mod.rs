//! NBT persistence generation
//!
//! The ToNbt side of the engine: for each annotated member, generate
//! `_sw$writeNbt`/`_sw$readNbt` methods that store the member into the
//! host's compound tag under a key taken from the annotation (defaulting
//! to the member name). Primitives and strings use the compound's typed
//! accessors directly; other reference types go through the static tag
//! hook class. Instrumented superclasses are chained, so a subclass call
//! persists the whole hierarchy.

use std::sync::Arc;

use dashmap::DashSet;
use tracing::debug;

use crate::asm::code::{CodeBuilder, CodePiece};
use crate::asm::insn::{opcodes::*, Insn};
use crate::asm::pieces;
use crate::asm::variable::{self, Variable};
use crate::classfile::flags::AccessFlags;
use crate::classfile::tree::{ClassNode, MethodNode};
use crate::classfile::ty::JType;
use crate::consts::{
    ANN_TO_NBT, JAVA_LANG_OBJECT, M_READ_NBT, M_WRITE_NBT, NBT_COMPOUND, NBT_HOOKS,
};
use crate::error::Result;
use crate::info::ClassInfoCache;

pub struct NbtTransformer {
    cache: Arc<ClassInfoCache>,
    /// Classes that already carry generated NBT methods.
    instrumented: DashSet<String>,
}

impl NbtTransformer {
    pub fn new(cache: Arc<ClassInfoCache>) -> NbtTransformer {
        NbtTransformer { cache, instrumented: DashSet::new() }
    }

    pub fn is_instrumented(&self, class: &str) -> bool {
        self.instrumented.contains(class)
    }

    /// Add persistence methods for every annotated member. Returns false
    /// when the class has none.
    pub fn transform(&self, clazz: &mut ClassNode) -> Result<bool> {
        let vars = variable::all_with(clazz, ANN_TO_NBT, pieces::get_this())?;
        if vars.is_empty() {
            return Ok(false);
        }
        debug!(class = %clazz.name, members = vars.len(), "adding nbt persistence");

        let chain_super = self.super_instrumented(clazz)?;
        gen_write_nbt(clazz, &vars, chain_super);
        gen_read_nbt(clazz, &vars, chain_super);
        self.instrumented.insert(clazz.name.clone());
        Ok(true)
    }

    fn super_instrumented(&self, clazz: &ClassNode) -> Result<bool> {
        let mut current = clazz.super_name.clone();
        while let Some(name) = current {
            if name == JAVA_LANG_OBJECT {
                return Ok(false);
            }
            if self.instrumented.contains(&name) {
                return Ok(true);
            }
            current = self.cache.get(&name)?.super_name().map(str::to_string);
        }
        Ok(false)
    }
}

/// Tag key for a member: explicit annotation value, else the member name.
fn nbt_key(var: &Variable) -> String {
    var.annotation(ANN_TO_NBT)
        .and_then(|ann| ann.string("value"))
        .unwrap_or(var.name())
        .to_string()
}

fn add_method(clazz: &mut ClassNode, name: &str, body: CodePiece) {
    let mut method =
        MethodNode::new(AccessFlags::PUBLIC, name, format!("(L{NBT_COMPOUND};)V"));
    method.insns = body.build();
    clazz.methods.push(method);
}

/// The compound's typed accessor pair for types it speaks natively.
fn compound_accessors(ty: &JType) -> Option<(&'static str, &'static str, &'static str)> {
    Some(match ty {
        JType::Boolean => ("setBoolean", "getBoolean", "Z"),
        JType::Byte => ("setByte", "getByte", "B"),
        JType::Short | JType::Char => ("setShort", "getShort", "S"),
        JType::Int => ("setInteger", "getInteger", "I"),
        JType::Long => ("setLong", "getLong", "J"),
        JType::Float => ("setFloat", "getFloat", "F"),
        JType::Double => ("setDouble", "getDouble", "D"),
        JType::Object(name) if name == "java/lang/String" => {
            ("setString", "getString", "Ljava/lang/String;")
        }
        _ => return None,
    })
}

fn gen_write_nbt(clazz: &mut ClassNode, vars: &[Variable], chain_super: bool) {
    let nbt_ty = JType::object(NBT_COMPOUND);
    let nbt = pieces::get_local(1, &nbt_ty);
    let desc = format!("(L{NBT_COMPOUND};)V");

    let mut builder = CodeBuilder::new();
    if chain_super {
        let super_name = clazz.super_name.clone().expect("chained class has a superclass");
        builder.add(pieces::invoke_special(
            &super_name,
            M_WRITE_NBT,
            &desc,
            vec![pieces::get_this(), nbt.clone()],
        ));
    }
    for var in vars {
        let key = nbt_key(var);
        let piece = match compound_accessors(var.ty()) {
            Some((setter, _, value_desc)) => {
                let value = if *var.ty() == JType::Char {
                    pieces::cast_primitive(var.get(), &JType::Char, &JType::Short)
                } else {
                    var.get()
                };
                pieces::invoke_virtual(
                    NBT_COMPOUND,
                    setter,
                    &format!("(Ljava/lang/String;{value_desc})V"),
                    vec![nbt.clone(), pieces::const_str(key), value],
                )
            }
            None => pieces::invoke_static(
                NBT_HOOKS,
                "write",
                &format!("(L{NBT_COMPOUND};Ljava/lang/String;Ljava/lang/Object;)V"),
                vec![nbt.clone(), pieces::const_str(key), var.get()],
            ),
        };
        builder.add(piece);
    }
    builder.add(Insn::Simple(RETURN));
    add_method(clazz, M_WRITE_NBT, builder.build());
}

fn gen_read_nbt(clazz: &mut ClassNode, vars: &[Variable], chain_super: bool) {
    let nbt_ty = JType::object(NBT_COMPOUND);
    let nbt = pieces::get_local(1, &nbt_ty);
    let desc = format!("(L{NBT_COMPOUND};)V");

    let mut builder = CodeBuilder::new();
    if chain_super {
        let super_name = clazz.super_name.clone().expect("chained class has a superclass");
        builder.add(pieces::invoke_special(
            &super_name,
            M_READ_NBT,
            &desc,
            vec![pieces::get_this(), nbt.clone()],
        ));
    }
    for var in vars {
        let key = nbt_key(var);
        let value = match compound_accessors(var.ty()) {
            Some((_, getter, value_desc)) => {
                let raw = pieces::invoke_virtual(
                    NBT_COMPOUND,
                    getter,
                    &format!("(Ljava/lang/String;){value_desc}"),
                    vec![nbt.clone(), pieces::const_str(key)],
                );
                if *var.ty() == JType::Char {
                    pieces::cast_primitive(raw, &JType::Short, &JType::Char)
                } else {
                    raw
                }
            }
            None => pieces::cast_to(
                var.ty().internal_name(),
                pieces::invoke_static(
                    NBT_HOOKS,
                    "read",
                    &format!("(L{NBT_COMPOUND};Ljava/lang/String;)Ljava/lang/Object;"),
                    vec![nbt.clone(), pieces::const_str(key)],
                ),
            ),
        };
        builder.add(var.set(value));
    }
    builder.add(Insn::Simple(RETURN));
    add_method(clazz, M_READ_NBT, builder.build());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::tree::{Annotation, AnnotationValue, FieldNode};
    use crate::info::{ClassInfoCache, MapResolver};
    use std::sync::Arc;

    fn annotated_field(name: &str, desc: &str, key: Option<&str>) -> FieldNode {
        let mut field = FieldNode::new(AccessFlags::PRIVATE, name, desc);
        let mut ann = Annotation::new(ANN_TO_NBT);
        if let Some(key) = key {
            ann = ann.with("value", AnnotationValue::Str(key.to_string()));
        }
        field.annotations.push(ann);
        field
    }

    fn transformer() -> NbtTransformer {
        NbtTransformer::new(Arc::new(ClassInfoCache::new(Arc::new(MapResolver::new()))))
    }

    #[test]
    fn untouched_without_annotations() {
        let mut clazz = ClassNode::new(AccessFlags::PUBLIC, "a/Plain", JAVA_LANG_OBJECT);
        clazz.fields.push(FieldNode::new(AccessFlags::PRIVATE, "x", "I"));
        assert!(!transformer().transform(&mut clazz).unwrap());
        assert!(clazz.find_method(M_WRITE_NBT).is_none());
    }

    #[test]
    fn generates_both_methods_with_keys() {
        let mut clazz = ClassNode::new(AccessFlags::PUBLIC, "a/Saved", JAVA_LANG_OBJECT);
        clazz.fields.push(annotated_field("health", "I", None));
        clazz.fields.push(annotated_field("display", "Ljava/lang/String;", Some("label")));
        assert!(transformer().transform(&mut clazz).unwrap());

        let write = clazz.find_method(M_WRITE_NBT).unwrap();
        let mut keys = Vec::new();
        let mut setters = Vec::new();
        for insn in write.insns.iter() {
            match insn {
                Insn::Ldc(crate::asm::insn::Const::Str(s)) => keys.push(s.clone()),
                Insn::Method { name, .. } => setters.push(name.clone()),
                _ => {}
            }
        }
        assert_eq!(keys, vec!["health", "label"]);
        assert_eq!(setters, vec!["setInteger", "setString"]);
        assert!(clazz.find_method(M_READ_NBT).is_some());
    }

    #[test]
    fn subclass_chains_to_instrumented_super() {
        let resolver = MapResolver::new();
        let cache = Arc::new(ClassInfoCache::new(Arc::new(resolver)));
        let transformer = NbtTransformer::new(Arc::clone(&cache));

        let mut base = ClassNode::new(AccessFlags::PUBLIC, "a/Base", JAVA_LANG_OBJECT);
        base.fields.push(annotated_field("x", "I", None));
        cache.put_node(&base);
        transformer.transform(&mut base).unwrap();

        let mut sub = ClassNode::new(AccessFlags::PUBLIC, "a/Sub", "a/Base");
        sub.fields.push(annotated_field("y", "I", None));
        cache.put_node(&sub);
        transformer.transform(&mut sub).unwrap();

        let write = sub.find_method(M_WRITE_NBT).unwrap();
        let first_call = write.insns.iter().find_map(|insn| match insn {
            Insn::Method { opcode, owner, name, .. } => Some((*opcode, owner.clone(), name.clone())),
            _ => None,
        });
        assert_eq!(
            first_call,
            Some((INVOKESPECIAL, "a/Base".to_string(), M_WRITE_NBT.to_string()))
        );
    }
}
