//! Sync transformation orchestrator
//!
//! Drives the whole per-class pipeline: discover annotated members,
//! classify the owning type, continue wire indices past instrumented
//! ancestors, generate companions and the dirty-check/write/read routines,
//! splice the sync trigger into the tick method, and mark the class with
//! the runtime interface.
//!
//! A class either transforms completely or not at all; any structural
//! violation aborts with an error before the class is touched further.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::asm::code::{CodeBuilder, CodePiece};
use crate::asm::cond::Condition;
use crate::asm::insn::{opcodes::*, Insn};
use crate::asm::pieces;
use crate::asm::switches::SwitchBuilder;
use crate::asm::variable::{self, Variable};
use crate::classfile::flags::AccessFlags;
use crate::classfile::tree::{ClassNode, FieldNode, MethodNode};
use crate::classfile::ty::JType;
use crate::consts::*;
use crate::error::{Error, Result};
use crate::info::ClassInfoCache;
use crate::sync::registry::{SuperSyncs, SyncRegistry};
use crate::sync::syncer::Syncer;
use crate::sync::wire::TokenWidth;

/// Structural role of a synced class, deciding which lifecycle method
/// receives the spliced trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCategory {
    Entity,
    TileEntity,
    Container,
    ExtendedProperties,
}

impl SyncCategory {
    pub fn tick_method(self) -> &'static str {
        match self {
            SyncCategory::Entity => TICK_ENTITY,
            SyncCategory::TileEntity => TICK_TILE_ENTITY,
            SyncCategory::Container => TICK_CONTAINER,
            SyncCategory::ExtendedProperties => TICK_EXT_PROPS,
        }
    }
}

/// One discovered member with everything generation needs.
struct SyncedElement {
    var: Variable,
    companion: Variable,
    syncer: Syncer,
    /// Absolute wire index, offset past instrumented ancestors.
    index: u16,
}

pub struct SyncTransformer {
    cache: Arc<ClassInfoCache>,
    registry: Arc<SyncRegistry>,
}

impl SyncTransformer {
    pub fn new(cache: Arc<ClassInfoCache>, registry: Arc<SyncRegistry>) -> SyncTransformer {
        SyncTransformer { cache, registry }
    }

    pub fn registry(&self) -> &SyncRegistry {
        &self.registry
    }

    /// Transform one class in place. Returns false when the class carries
    /// nothing to sync and was left untouched.
    pub fn transform(&self, clazz: &mut ClassNode) -> Result<bool> {
        // register metadata unconditionally; later hierarchy walks must be
        // able to resolve uninstrumented classes too
        self.cache.put_node(clazz);
        let vars = variable::all_with(clazz, ANN_SYNC, pieces::get_this())?;
        if vars.is_empty() {
            if clazz.has_annotation(ANN_SYNC) {
                warn!(class = %clazz.name, "class-level sync marker but no annotated members");
            }
            return Ok(false);
        }
        debug!(class = %clazz.name, members = vars.len(), "instrumenting");

        let category = self.classify(clazz)?;
        let supers = self.registry.super_member_count(&self.cache, &clazz.name)?;

        let total = supers.first_index as usize + vars.len();
        let width = TokenWidth::for_member_count(&clazz.name, total)?;
        let total = total as u16;

        let elements = self.build_elements(clazz, vars, supers.first_index as u16)?;

        gen_sync_class(clazz);
        gen_index_io(clazz, width);
        gen_is_dirty(clazz, &elements, supers);
        gen_write(clazz, &elements, supers);
        gen_read_member(clazz, &elements, supers);
        gen_read_loop(clazz, total);
        gen_do_sync(clazz, total);
        splice_tick(clazz, category);

        clazz.add_interface(SYNCED_OBJECT);
        if category == SyncCategory::ExtendedProperties {
            add_props_plumbing(clazz);
        }

        self.registry.record(&clazz.name, elements.len() as u16);
        // interfaces changed, refresh the cached metadata
        self.cache.put_node(clazz);
        debug!(class = %clazz.name, total, "instrumented");
        Ok(true)
    }

    /// Fixed priority: entity, tile entity, container. Extended properties
    /// is mutually exclusive with all three.
    fn classify(&self, clazz: &ClassNode) -> Result<SyncCategory> {
        let info = self.cache.get(&clazz.name)?;
        let is_props = self.cache.is_assignable(IFACE_EXT_PROPS, &info)?;
        let structural = if self.cache.is_assignable(CLASS_ENTITY, &info)? {
            Some(SyncCategory::Entity)
        } else if self.cache.is_assignable(CLASS_TILE_ENTITY, &info)? {
            Some(SyncCategory::TileEntity)
        } else if self.cache.is_assignable(CLASS_CONTAINER, &info)? {
            Some(SyncCategory::Container)
        } else {
            None
        };
        match (structural, is_props) {
            (Some(category), false) => Ok(category),
            (None, true) => Ok(SyncCategory::ExtendedProperties),
            (Some(category), true) => Err(Error::config(
                &clazz.name,
                format!("class is both {category:?} and extended properties, roles conflict"),
            )),
            (None, false) => Err(Error::config(
                &clazz.name,
                "synced class extends none of the known host base types",
            )),
        }
    }

    fn build_elements(
        &self,
        clazz: &mut ClassNode,
        vars: Vec<Variable>,
        first_index: u16,
    ) -> Result<Vec<SyncedElement>> {
        let mut elements = Vec::with_capacity(vars.len());
        for (offset, var) in vars.into_iter().enumerate() {
            let syncer = self.select_syncer(clazz, &var)?;
            let companion = variable::make_companion(clazz, &var, pieces::get_this());
            elements.push(SyncedElement {
                var,
                companion,
                syncer,
                index: first_index + offset as u16,
            });
        }
        Ok(elements)
    }

    fn select_syncer(&self, clazz: &mut ClassNode, var: &Variable) -> Result<Syncer> {
        let custom = var
            .annotation(ANN_SYNC)
            .and_then(|ann| ann.class_value("syncer"));
        match custom {
            Some(JType::Object(syncer_class)) => {
                let holder = make_syncer_holder(clazz, var.name());
                Ok(Syncer::custom(syncer_class, holder, var.ty().clone()))
            }
            Some(other) => Err(Error::config(
                &clazz.name,
                format!("member {}: syncer must be a class, got {}", var.name(), other.descriptor()),
            )),
            None => Syncer::for_type(&clazz.name, var.name(), var.ty(), &self.cache),
        }
    }
}

/// Static field caching a custom syncer instance for one member.
fn make_syncer_holder(clazz: &mut ClassNode, member: &str) -> Variable {
    let name = format!("{SYNCER_FIELD_PREFIX}{member}");
    let access = AccessFlags::PRIVATE | AccessFlags::STATIC | AccessFlags::SYNTHETIC;
    clazz
        .fields
        .push(FieldNode::new(access, name, format!("L{VALUE_SYNCER};")));
    let field = clazz.fields.last().unwrap();
    Variable::of_field(clazz, field, CodePiece::empty())
}

fn add_method(clazz: &mut ClassNode, name: &str, desc: &str, body: CodePiece) {
    let mut method = MethodNode::new(AccessFlags::PUBLIC, name, desc);
    method.insns = body.build();
    clazz.methods.push(method);
}

fn this_call(clazz: &ClassNode, name: &str, desc: &str, mut args: Vec<CodePiece>) -> CodePiece {
    let mut all = vec![pieces::get_this()];
    all.append(&mut args);
    pieces::invoke_virtual(&clazz.name, name, desc, all)
}

fn super_call(clazz: &ClassNode, name: &str, desc: &str, mut args: Vec<CodePiece>) -> CodePiece {
    let super_name = clazz.super_name.as_deref().expect("synced class has a superclass");
    let mut all = vec![pieces::get_this()];
    all.append(&mut args);
    pieces::invoke_special(super_name, name, desc, all)
}

/// `_sw$syncClass()` returns the declaring class constant. Every level
/// overrides it, so comparing the result against a class constant answers
/// "is this the most-derived synced class".
fn gen_sync_class(clazz: &mut ClassNode) {
    let body = pieces::const_class(clazz.name.clone()).append_insn(Insn::Simple(ARETURN));
    add_method(clazz, M_SYNC_CLASS, "()Ljava/lang/Class;", body);
}

/// Token read/write helpers at the width chosen for this class's hierarchy
/// total. Virtual, so delegating super routines still use the most-derived
/// width.
fn gen_index_io(clazz: &mut ClassNode, width: TokenWidth) {
    let buf_ty = JType::object(WRITABLE_BUF);
    let (write_name, write_desc, read_name, read_desc) = match width {
        TokenWidth::U8 => ("writeByte", "(B)V", "readByte", "()B"),
        TokenWidth::U16 => ("writeShort", "(S)V", "readShort", "()S"),
    };

    let write_body = pieces::invoke_virtual(
        WRITABLE_BUF,
        write_name,
        write_desc,
        vec![pieces::get_local(1, &buf_ty), pieces::get_local(2, &JType::Int)],
    )
    .append_insn(Insn::Simple(RETURN));
    add_method(clazz, M_WRITE_IDX, &format!("(L{WRITABLE_BUF};I)V"), write_body);

    let read_body = pieces::invoke_virtual(
        READABLE_BUF,
        read_name,
        read_desc,
        vec![pieces::get_local(1, &JType::object(READABLE_BUF))],
    )
    .append_insn(Insn::Simple(IRETURN));
    add_method(clazz, M_READ_IDX, &format!("(L{READABLE_BUF};)I"), read_body);
}

/// `_sw$isDirty()`: first changed member short-circuits to true,
/// declaration order, instrumented ancestors checked first.
fn gen_is_dirty(clazz: &mut ClassNode, elements: &[SyncedElement], supers: SuperSyncs) {
    let mut builder = CodeBuilder::new();
    let return_true = pieces::const_int(1).append_insn(Insn::Simple(IRETURN));
    if supers.any_instrumented {
        builder.add(
            Condition::if_true(super_call(clazz, M_IS_DIRTY, "()Z", Vec::new()))
                .then(return_true.clone()),
        );
    }
    for element in elements {
        builder.add(
            element
                .syncer
                .equals(element.var.get(), element.companion.get())
                .otherwise(return_true.clone()),
        );
    }
    builder.add(pieces::const_int(0)).add(Insn::Simple(IRETURN));
    add_method(clazz, M_IS_DIRTY, "()Z", builder.build());
}

/// `_sw$write(buf)`: delegate to instrumented ancestors, then for each
/// changed member emit its index token (negated for a null value) plus
/// payload and refresh the companion. The sentinel is not written here;
/// `_sw$doSync` appends it once for the whole hierarchy.
fn gen_write(clazz: &mut ClassNode, elements: &[SyncedElement], supers: SuperSyncs) {
    let desc = format!("(L{WRITABLE_BUF};)V");
    let buf_ty = JType::object(WRITABLE_BUF);
    let buf = pieces::get_local(1, &buf_ty);
    let idx_desc = format!("(L{WRITABLE_BUF};I)V");

    let mut builder = CodeBuilder::new();
    if supers.any_instrumented {
        builder.add(super_call(clazz, M_WRITE, &desc, vec![buf.clone()]));
    }
    for element in elements {
        let raw = element.index as i32;
        let write_token = |value: i32| {
            this_call(clazz, M_WRITE_IDX, &idx_desc, vec![buf.clone(), pieces::const_int(value)])
        };
        let payload = write_token(raw)
            .append(element.syncer.write(element.var.get(), buf.clone()));
        let changed = if element.syncer.is_nullable() {
            Condition::if_null(element.var.get()).then_else(write_token(-raw - 1), payload)
        } else {
            payload
        };
        let changed = changed.append(element.companion.set(element.var.get()));
        builder.add(
            element
                .syncer
                .equals(element.var.get(), element.companion.get())
                .otherwise(changed),
        );
    }
    builder.add(Insn::Simple(RETURN));
    add_method(clazz, M_WRITE, &desc, builder.build());
}

/// `_sw$readMember(idx, buf)`: dense switch over this class's own indices
/// plus their negative null mirrors. Anything else falls to the default:
/// an instrumented ancestor's dispatcher, or a hard protocol error.
fn gen_read_member(clazz: &mut ClassNode, elements: &[SyncedElement], supers: SuperSyncs) {
    let desc = format!("(IL{READABLE_BUF};)V");
    let buf_ty = JType::object(READABLE_BUF);
    let buf = pieces::get_local(2, &buf_ty);
    let idx = pieces::get_local(1, &JType::Int);

    let mut switch = SwitchBuilder::new();
    for element in elements {
        let raw = element.index as i32;
        switch.add(raw, element.var.set(element.syncer.read(buf.clone())));
        if element.syncer.is_nullable() {
            switch.add(-raw - 1, element.var.set(pieces::const_null()));
        }
    }
    let default = if supers.any_instrumented {
        super_call(clazz, M_READ_MEMBER, &desc, vec![idx.clone(), buf])
    } else {
        pieces::do_throw(
            "java/lang/IllegalStateException",
            &format!("unexpected sync index token for {}", clazz.name),
        )
    };
    switch.add_default(default);

    let body = switch.build(idx).append_insn(Insn::Simple(RETURN));
    add_method(clazz, M_READ_MEMBER, &desc, body);
}

/// `_sw$read(buf)`: read tokens until the hierarchy sentinel is seen or
/// the buffer runs dry.
fn gen_read_loop(clazz: &mut ClassNode, total: u16) {
    let desc = format!("(L{READABLE_BUF};)V");
    let buf_ty = JType::object(READABLE_BUF);
    let buf = pieces::get_local(1, &buf_ty);

    let mut body = CodeBuilder::new();
    body.add(this_call(clazz, M_READ_IDX, &format!("(L{READABLE_BUF};)I"), vec![buf.clone()]))
        .add(Insn::Var { opcode: ISTORE, index: 2 })
        .add(
            Condition::if_equal(
                pieces::get_local(2, &JType::Int),
                pieces::const_int(total as i32),
                &JType::Int,
                false,
            )
            .then(CodePiece::of_op(RETURN)),
        )
        .add(this_call(
            clazz,
            M_READ_MEMBER,
            &format!("(IL{READABLE_BUF};)V"),
            vec![pieces::get_local(2, &JType::Int), buf.clone()],
        ));

    let more = Condition::of(
        pieces::invoke_virtual(READABLE_BUF, "available", "()I", vec![buf]),
        IFGT,
        IFLE,
    );
    let body = more.make_do_while(body.build()).append_insn(Insn::Simple(RETURN));
    add_method(clazz, M_READ, &desc, body);
}

/// `_sw$doSync()`: bail if clean, otherwise build a buffer, write every
/// level's changed members, append the sentinel and hand off for sending.
fn gen_do_sync(clazz: &mut ClassNode, total: u16) {
    let buf_ty = JType::object(WRITABLE_BUF);
    let buf = pieces::get_local(1, &buf_ty);

    let mut builder = CodeBuilder::new();
    builder
        .add(
            Condition::if_true(this_call(clazz, M_IS_DIRTY, "()Z", Vec::new()))
                .otherwise(CodePiece::of_op(RETURN)),
        )
        .add(pieces::invoke_static(
            SYNC_HOOKS,
            SYNC_HOOKS_CREATE,
            &format!("(Ljava/lang/Object;)L{WRITABLE_BUF};"),
            vec![pieces::get_this()],
        ))
        .add(Insn::Var { opcode: ASTORE, index: 1 })
        .add(this_call(clazz, M_WRITE, &format!("(L{WRITABLE_BUF};)V"), vec![buf.clone()]))
        .add(this_call(
            clazz,
            M_WRITE_IDX,
            &format!("(L{WRITABLE_BUF};I)V"),
            vec![buf.clone(), pieces::const_int(total as i32)],
        ))
        .add(pieces::invoke_static(
            SYNC_HOOKS,
            SYNC_HOOKS_SEND,
            &format!("(Ljava/lang/Object;L{WRITABLE_BUF};)V"),
            vec![pieces::get_this(), buf],
        ))
        .add(Insn::Simple(RETURN));
    add_method(clazz, M_DO_SYNC, "()V", builder.build());
}

/// Prepend the guarded sync trigger to the category's tick method,
/// creating the method when the class does not override it yet. The guard
/// makes only the most-derived synced class fire the actual send; ancestor
/// levels still contribute through the write delegation chain.
fn splice_tick(clazz: &mut ClassNode, category: SyncCategory) {
    let tick_name = category.tick_method();
    let guard = Condition::if_equal(
        this_call(clazz, M_SYNC_CLASS, "()Ljava/lang/Class;", Vec::new()),
        pieces::const_class(clazz.name.clone()),
        &JType::object("java/lang/Class"),
        false,
    )
    .then(this_call(clazz, M_DO_SYNC, "()V", Vec::new()));

    if let Some(method) = clazz.methods.iter().position(|m| m.name == tick_name) {
        guard.prepend_to(&mut clazz.methods[method].insns);
        return;
    }

    let mut body = CodeBuilder::new();
    body.add(guard);
    if category != SyncCategory::ExtendedProperties {
        // the host base declares the tick method, keep its behavior
        body.add(super_call(clazz, tick_name, "()V", Vec::new()));
    }
    body.add(Insn::Simple(RETURN));
    add_method(clazz, tick_name, "()V", body.build());
}

/// Owner/identifier plumbing for extended-properties classes: injected by
/// the property-registration hook, read back by packet dispatch.
fn add_props_plumbing(clazz: &mut ClassNode) {
    clazz.add_interface(SYNCED_PROPS);
    let entity_desc = format!("L{CLASS_ENTITY};");
    let access = AccessFlags::PRIVATE | AccessFlags::SYNTHETIC;
    clazz.fields.push(FieldNode::new(access, F_PROPS_OWNER, entity_desc.clone()));
    clazz.fields.push(FieldNode::new(access, F_PROPS_IDENT, "Ljava/lang/String;"));

    let entity_ty = JType::object(CLASS_ENTITY);
    let string_ty = JType::object("java/lang/String");

    let inject = pieces::set_field_raw(
        &clazz.name,
        F_PROPS_OWNER,
        &entity_desc,
        pieces::get_this(),
        pieces::get_local(1, &entity_ty),
    )
    .append(pieces::set_field_raw(
        &clazz.name,
        F_PROPS_IDENT,
        "Ljava/lang/String;",
        pieces::get_this(),
        pieces::get_local(2, &string_ty),
    ))
    .append_insn(Insn::Simple(RETURN));
    add_method(
        clazz,
        PROPS_INJECT,
        &format!("(L{CLASS_ENTITY};Ljava/lang/String;)V"),
        inject,
    );

    let get_entity =
        pieces::get_field_raw(&clazz.name, F_PROPS_OWNER, &entity_desc, pieces::get_this())
            .append_insn(Insn::Simple(ARETURN));
    add_method(clazz, PROPS_GET_ENTITY, &format!("()L{CLASS_ENTITY};"), get_entity);

    let get_ident =
        pieces::get_field_raw(&clazz.name, F_PROPS_IDENT, "Ljava/lang/String;", pieces::get_this())
            .append_insn(Insn::Simple(ARETURN));
    add_method(clazz, PROPS_GET_IDENT, "()Ljava/lang/String;", get_ident);
}
