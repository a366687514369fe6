use std::sync::Arc;

use syncweave::classfile::emit::emit_class;
use syncweave::classfile::flags::AccessFlags;
use syncweave::classfile::tree::{Annotation, AnnotationValue, ClassNode, FieldNode};
use syncweave::consts::*;
use syncweave::info::{ClassInfoCache, MapResolver};
use syncweave::nbt::NbtTransformer;
use syncweave::asm::insn::Insn;

fn setup() -> NbtTransformer {
    let resolver = Arc::new(MapResolver::new());
    resolver.register_host_types();
    NbtTransformer::new(Arc::new(ClassInfoCache::new(resolver)))
}

fn nbt_field(name: &str, desc: &str) -> FieldNode {
    let mut field = FieldNode::new(AccessFlags::PRIVATE, name, desc);
    field.annotations.push(Annotation::new(ANN_TO_NBT));
    field
}

#[test]
fn untouched_without_annotations() {
    let transformer = setup();
    let mut clazz = ClassNode::new(AccessFlags::PUBLIC, "a/Plain", JAVA_LANG_OBJECT);
    clazz.fields.push(FieldNode::new(AccessFlags::PRIVATE, "x", "I"));
    assert!(!transformer.transform(&mut clazz).unwrap());
    assert!(clazz.find_method(M_WRITE_NBT).is_none());
}

#[test]
fn write_and_read_routines_are_generated() {
    let transformer = setup();
    let mut clazz = ClassNode::new(AccessFlags::PUBLIC, "a/Stats", JAVA_LANG_OBJECT);
    clazz.fields.push(nbt_field("health", "I"));
    clazz.fields.push(nbt_field("label", "Ljava/lang/String;"));
    assert!(transformer.transform(&mut clazz).unwrap());
    assert!(transformer.is_instrumented("a/Stats"));

    let write = clazz.find_method(M_WRITE_NBT).unwrap();
    let keys: Vec<String> = write
        .insns
        .iter()
        .filter_map(|insn| match insn {
            Insn::Ldc(syncweave::asm::insn::Const::Str(s)) => Some(s.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(keys, vec!["health", "label"]);
    assert!(clazz.find_method(M_READ_NBT).is_some());
}

#[test]
fn explicit_key_overrides_member_name() {
    let transformer = setup();
    let mut clazz = ClassNode::new(AccessFlags::PUBLIC, "a/Stats", JAVA_LANG_OBJECT);
    let mut field = FieldNode::new(AccessFlags::PRIVATE, "health", "I");
    field.annotations.push(
        Annotation::new(ANN_TO_NBT).with("value", AnnotationValue::Str("hp".into())),
    );
    clazz.fields.push(field);
    transformer.transform(&mut clazz).unwrap();

    let write = clazz.find_method(M_WRITE_NBT).unwrap();
    let has_key = write
        .insns
        .iter()
        .any(|insn| matches!(insn, Insn::Ldc(syncweave::asm::insn::Const::Str(s)) if s == "hp"));
    assert!(has_key);
}

#[test]
fn instrumented_class_emits() {
    let transformer = setup();
    let mut clazz = ClassNode::new(AccessFlags::PUBLIC, "a/Stats", JAVA_LANG_OBJECT);
    clazz.fields.push(nbt_field("health", "I"));
    clazz.fields.push(nbt_field("label", "Ljava/lang/String;"));
    transformer.transform(&mut clazz).unwrap();
    let bytes = emit_class(&clazz).unwrap();
    assert_eq!(&bytes[..4], &[0xca, 0xfe, 0xba, 0xbe]);
}
