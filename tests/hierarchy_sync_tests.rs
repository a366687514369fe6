use std::sync::Arc;

use syncweave::asm::insn::{opcodes, Insn};
use syncweave::classfile::flags::AccessFlags;
use syncweave::classfile::tree::{Annotation, ClassNode, FieldNode};
use syncweave::consts::*;
use syncweave::info::{ClassInfoCache, MapResolver};
use syncweave::sync::{SyncRegistry, SyncTransformer};

fn setup() -> SyncTransformer {
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

fn base_with_three_members() -> ClassNode {
    let mut base = ClassNode::new(AccessFlags::PUBLIC, "game/Base", CLASS_ENTITY);
    base.fields.push(synced_field("a", "I"));
    base.fields.push(synced_field("b", "J"));
    base.fields.push(synced_field("c", "F"));
    base
}

fn subclass() -> ClassNode {
    let mut sub = ClassNode::new(AccessFlags::PUBLIC, "game/Sub", "game/Base");
    sub.fields.push(synced_field("d", "I"));
    sub.fields.push(synced_field("label", "Ljava/lang/String;"));
    sub
}

#[test]
fn subclass_indices_continue_past_ancestors() {
    let transformer = setup();
    let mut base = base_with_three_members();
    let mut sub = subclass();
    transformer.transform(&mut base).unwrap();
    transformer.transform(&mut sub).unwrap();

    assert_eq!(transformer.registry().member_count("game/Base"), Some(3));
    assert_eq!(transformer.registry().member_count("game/Sub"), Some(2));

    // the subclass dispatcher only handles its own indices; 3 and 4,
    // plus the null token for the nullable member at 4
    let dispatch = sub.find_method(M_READ_MEMBER).unwrap();
    let switch = dispatch
        .insns
        .iter()
        .find_map(|insn| match insn {
            Insn::TableSwitch { lo, hi, .. } => Some((*lo, *hi)),
            _ => None,
        })
        .expect("dispatcher has a tableswitch");
    assert_eq!(switch, (-5, 4));
}

#[test]
fn subclass_read_loop_uses_hierarchy_sentinel() {
    let transformer = setup();
    let mut base = base_with_three_members();
    let mut sub = subclass();
    transformer.transform(&mut base).unwrap();
    transformer.transform(&mut sub).unwrap();

    // end-of-segment for 3 + 2 members is index 5
    let read = sub.find_method(M_READ).unwrap();
    assert!(read
        .insns
        .iter()
        .any(|insn| matches!(insn, Insn::Simple(opcodes::ICONST_5))));
}

#[test]
fn subclass_routines_delegate_to_super() {
    let transformer = setup();
    let mut base = base_with_three_members();
    let mut sub = subclass();
    transformer.transform(&mut base).unwrap();
    transformer.transform(&mut sub).unwrap();

    for method in [M_IS_DIRTY, M_WRITE, M_READ_MEMBER] {
        let generated = sub.find_method(method).unwrap();
        let delegates = generated.insns.iter().any(|insn| {
            matches!(
                insn,
                Insn::Method { opcode, owner, name, .. }
                    if *opcode == opcodes::INVOKESPECIAL && owner == "game/Base" && name == method
            )
        });
        assert!(delegates, "{method} should delegate to the superclass");
    }
}

#[test]
fn base_dispatcher_rejects_unknown_indices() {
    let transformer = setup();
    let mut base = base_with_three_members();
    transformer.transform(&mut base).unwrap();

    let dispatch = base.find_method(M_READ_MEMBER).unwrap();
    let throws = dispatch.insns.iter().any(|insn| {
        matches!(insn, Insn::Type { ty, .. } if ty == "java/lang/IllegalStateException")
    });
    assert!(throws, "unknown index must be a hard protocol error");
}

#[test]
fn uninstrumented_middle_class_is_skipped_in_counting() {
    let transformer = setup();
    let mut base = base_with_three_members();
    transformer.transform(&mut base).unwrap();

    // Middle extends Base but syncs nothing of its own
    let mut middle = ClassNode::new(AccessFlags::PUBLIC, "game/Middle", "game/Base");
    assert!(!transformer.transform(&mut middle).unwrap());

    let mut leaf = ClassNode::new(AccessFlags::PUBLIC, "game/Leaf", "game/Middle");
    leaf.fields.push(synced_field("x", "I"));
    transformer.transform(&mut leaf).unwrap();

    // leaf's single member still lands after Base's three
    let dispatch = leaf.find_method(M_READ_MEMBER).unwrap();
    let switch = dispatch
        .insns
        .iter()
        .find_map(|insn| match insn {
            Insn::TableSwitch { lo, hi, .. } => Some((*lo, *hi)),
            _ => None,
        })
        .unwrap();
    assert_eq!(switch, (3, 3));

    // the middle's delegation target is still Base's instrumented level,
    // one hop up from the leaf
    assert_eq!(transformer.registry().member_count("game/Middle"), None);
    let write = leaf.find_method(M_WRITE).unwrap();
    let delegates_to_middle = write.insns.iter().any(|insn| {
        matches!(insn, Insn::Method { owner, name, .. } if owner == "game/Middle" && name == M_WRITE)
    });
    assert!(delegates_to_middle, "delegation goes through the direct superclass");
}

#[test]
fn index_io_is_virtual_for_most_derived_width() {
    let transformer = setup();
    let mut base = base_with_three_members();
    let mut sub = subclass();
    transformer.transform(&mut base).unwrap();
    transformer.transform(&mut sub).unwrap();

    // both levels override the index routines, and the write routine
    // dispatches virtually so a Sub instance always uses Sub's width
    assert!(base.find_method(M_WRITE_IDX).is_some());
    assert!(sub.find_method(M_WRITE_IDX).is_some());
    let write = sub.find_method(M_WRITE).unwrap();
    let virtual_idx = write.insns.iter().any(|insn| {
        matches!(
            insn,
            Insn::Method { opcode, name, .. }
                if *opcode == opcodes::INVOKEVIRTUAL && name == M_WRITE_IDX
        )
    });
    assert!(virtual_idx);
}
