use std::sync::Arc;

use syncweave::asm::insn::{opcodes, Const, Insn};
use syncweave::classfile::flags::AccessFlags;
use syncweave::classfile::tree::{Annotation, ClassNode, FieldNode, MethodNode};
use syncweave::consts::*;
use syncweave::info::{ClassInfoCache, MapResolver};
use syncweave::sync::{SyncRegistry, SyncTransformer};
use syncweave::Error;

fn setup() -> SyncTransformer {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let resolver = Arc::new(MapResolver::new());
    resolver.register_host_types();
    let cache = Arc::new(ClassInfoCache::new(resolver));
    SyncTransformer::new(cache, Arc::new(SyncRegistry::new()))
}

fn synced_field(name: &str, desc: &str) -> FieldNode {
    let mut field = FieldNode::new(AccessFlags::PRIVATE, name, desc);
    field.annotations.push(Annotation::new(ANN_SYNC));
    field
}

fn entity_class(name: &str) -> ClassNode {
    ClassNode::new(AccessFlags::PUBLIC, name, CLASS_ENTITY)
}

#[test]
fn plain_class_is_left_alone() {
    let transformer = setup();
    let mut clazz = entity_class("game/Boring");
    clazz.fields.push(FieldNode::new(AccessFlags::PRIVATE, "x", "I"));
    assert!(!transformer.transform(&mut clazz).unwrap());
    assert!(clazz.find_method(M_DO_SYNC).is_none());
    assert!(clazz.interfaces.is_empty());
}

#[test]
fn class_level_marker_without_members_is_skipped() {
    let transformer = setup();
    let mut clazz = entity_class("game/Marked");
    clazz.annotations.push(Annotation::new(ANN_SYNC));
    assert!(!transformer.transform(&mut clazz).unwrap());
}

#[test]
fn instrumented_class_gains_full_surface() {
    let transformer = setup();
    let mut clazz = entity_class("game/Critter");
    clazz.fields.push(synced_field("health", "I"));
    clazz.fields.push(synced_field("label", "Ljava/lang/String;"));
    assert!(transformer.transform(&mut clazz).unwrap());

    // companions for both members
    assert!(clazz.find_field(&format!("health{COMPANION_SUFFIX}")).is_some());
    assert!(clazz.find_field(&format!("label{COMPANION_SUFFIX}")).is_some());
    let companion = clazz.find_field(&format!("health{COMPANION_SUFFIX}")).unwrap();
    assert!(companion.access.is_private());
    assert_eq!(companion.desc, "I");

    for name in [M_SYNC_CLASS, M_WRITE_IDX, M_READ_IDX, M_IS_DIRTY, M_WRITE, M_READ_MEMBER, M_READ, M_DO_SYNC]
    {
        assert!(clazz.find_method(name).is_some(), "missing generated method {name}");
    }
    assert!(clazz.interfaces.contains(&SYNCED_OBJECT.to_string()));
    assert_eq!(transformer.registry().member_count("game/Critter"), Some(2));
}

#[test]
fn two_members_use_byte_wide_tokens() {
    let transformer = setup();
    let mut clazz = entity_class("game/Critter");
    clazz.fields.push(synced_field("health", "I"));
    clazz.fields.push(synced_field("label", "Ljava/lang/String;"));
    transformer.transform(&mut clazz).unwrap();

    let write_idx = clazz.find_method(M_WRITE_IDX).unwrap();
    let buffer_call = write_idx.insns.iter().find_map(|insn| match insn {
        Insn::Method { name, .. } => Some(name.clone()),
        _ => None,
    });
    assert_eq!(buffer_call.as_deref(), Some("writeByte"));
}

#[test]
fn tick_method_is_created_with_most_derived_guard() {
    let transformer = setup();
    let mut clazz = entity_class("game/Critter");
    clazz.fields.push(synced_field("health", "I"));
    transformer.transform(&mut clazz).unwrap();

    let tick = clazz.find_method(TICK_ENTITY).expect("tick method created");
    let calls: Vec<(String, String)> = tick
        .insns
        .iter()
        .filter_map(|insn| match insn {
            Insn::Method { owner, name, .. } => Some((owner.clone(), name.clone())),
            _ => None,
        })
        .collect();
    // guard asks for the declaring class, conditionally fires the sync,
    // then keeps the host base behavior
    assert_eq!(calls[0].1, M_SYNC_CLASS);
    assert_eq!(calls[1].1, M_DO_SYNC);
    assert_eq!(calls[2], (CLASS_ENTITY.to_string(), TICK_ENTITY.to_string()));
    // guard compares against this class's constant
    assert!(tick
        .insns
        .iter()
        .any(|insn| matches!(insn, Insn::Ldc(Const::Class(name)) if name == "game/Critter")));
}

#[test]
fn existing_tick_method_is_prepended_not_replaced() {
    let transformer = setup();
    let mut clazz = entity_class("game/Critter");
    clazz.fields.push(synced_field("health", "I"));
    let mut tick = MethodNode::new(AccessFlags::PUBLIC, TICK_ENTITY, "()V");
    tick.insns.push(Insn::Simple(opcodes::NOP));
    tick.insns.push(Insn::Simple(opcodes::RETURN));
    clazz.methods.push(tick);
    transformer.transform(&mut clazz).unwrap();

    let tick = clazz.find_method(TICK_ENTITY).unwrap();
    let ops: Vec<&Insn> = tick.insns.iter().collect();
    // original body still at the end
    assert!(matches!(ops[ops.len() - 2], Insn::Simple(opcodes::NOP)));
    // guard call spliced in front
    assert!(matches!(
        ops.iter().find(|i| matches!(i, Insn::Method { .. })),
        Some(Insn::Method { name, .. }) if name == M_SYNC_CLASS
    ));
}

#[test]
fn nullable_member_writes_negative_token_branch() {
    let transformer = setup();
    let mut clazz = entity_class("game/Critter");
    clazz.fields.push(synced_field("health", "I"));
    clazz.fields.push(synced_field("label", "Ljava/lang/String;"));
    transformer.transform(&mut clazz).unwrap();

    let write = clazz.find_method(M_WRITE).unwrap();
    let pushed: Vec<i32> = write
        .insns
        .iter()
        .filter_map(|insn| match insn {
            Insn::Simple(opcodes::ICONST_M1) => Some(-1),
            Insn::Simple(opcodes::ICONST_0) => Some(0),
            Insn::Simple(opcodes::ICONST_1) => Some(1),
            Insn::IntPush { value, .. } => Some(*value),
            _ => None,
        })
        .collect();
    // member 1 is nullable: its null branch writes -(1) - 1 = -2
    assert!(pushed.contains(&0));
    assert!(pushed.contains(&1));
    assert!(pushed.contains(&-2));
}

#[test]
fn container_and_tile_entity_get_their_tick_names() {
    let transformer = setup();
    let mut tile = ClassNode::new(AccessFlags::PUBLIC, "game/Machine", CLASS_TILE_ENTITY);
    tile.fields.push(synced_field("progress", "I"));
    transformer.transform(&mut tile).unwrap();
    assert!(tile.find_method(TICK_TILE_ENTITY).is_some());

    let mut container = ClassNode::new(AccessFlags::PUBLIC, "game/Crate", CLASS_CONTAINER);
    container.fields.push(synced_field("slots", "I"));
    transformer.transform(&mut container).unwrap();
    assert!(container.find_method(TICK_CONTAINER).is_some());
}

#[test]
fn extended_properties_get_owner_plumbing() {
    let transformer = setup();
    let mut props = ClassNode::new(AccessFlags::PUBLIC, "game/Mana", JAVA_LANG_OBJECT);
    props.interfaces.push(IFACE_EXT_PROPS.to_string());
    props.fields.push(synced_field("mana", "F"));
    transformer.transform(&mut props).unwrap();

    assert!(props.interfaces.contains(&SYNCED_PROPS.to_string()));
    assert!(props.find_field(F_PROPS_OWNER).is_some());
    assert!(props.find_field(F_PROPS_IDENT).is_some());
    assert!(props.find_method(PROPS_INJECT).is_some());
    assert!(props.find_method(PROPS_GET_ENTITY).is_some());
    assert!(props.find_method(TICK_EXT_PROPS).is_some());
}

#[test]
fn conflicting_roles_fail_fast() {
    let transformer = setup();
    let mut clazz = ClassNode::new(AccessFlags::PUBLIC, "game/Confused", CLASS_TILE_ENTITY);
    clazz.interfaces.push(IFACE_EXT_PROPS.to_string());
    clazz.fields.push(synced_field("x", "I"));
    let result = transformer.transform(&mut clazz);
    assert!(matches!(result, Err(Error::Config { .. })));
}

#[test]
fn unclassifiable_class_fails_fast() {
    let transformer = setup();
    let mut clazz = ClassNode::new(AccessFlags::PUBLIC, "game/Floating", JAVA_LANG_OBJECT);
    clazz.fields.push(synced_field("x", "I"));
    assert!(matches!(transformer.transform(&mut clazz), Err(Error::Config { .. })));
}

#[test]
fn getter_setter_pair_is_discovered() {
    let transformer = setup();
    let mut clazz = entity_class("game/Critter");
    let mut getter = MethodNode::new(AccessFlags::PUBLIC, "getSpeed", "()I");
    getter.annotations.push(Annotation::new(ANN_SYNC));
    clazz.methods.push(getter);
    clazz.methods.push(MethodNode::new(AccessFlags::PUBLIC, "setSpeed", "(I)V"));
    transformer.transform(&mut clazz).unwrap();

    assert!(clazz.find_field(&format!("speed{COMPANION_SUFFIX}")).is_some());
}

#[test]
fn getter_without_setter_is_a_configuration_error() {
    let transformer = setup();
    let mut clazz = entity_class("game/Critter");
    let mut getter = MethodNode::new(AccessFlags::PUBLIC, "getSpeed", "()I");
    getter.annotations.push(Annotation::new(ANN_SYNC));
    clazz.methods.push(getter);
    assert!(matches!(transformer.transform(&mut clazz), Err(Error::Config { .. })));
}
