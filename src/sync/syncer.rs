//! Per-type sync strategies
//!
//! A `Syncer` knows how to emit the three fragments the orchestrator needs
//! for one member: an equality check against the companion, a payload
//! write, and a payload read. Selection is by the member's declared type;
//! a custom strategy can be supplied through the annotation instead.

use crate::asm::code::CodePiece;
use crate::asm::cond::Condition;
use crate::asm::pieces;
use crate::asm::variable::Variable;
use crate::classfile::ty::JType;
use crate::consts::{
    READABLE_BUF, SYNC_HOOKS, SYNC_HOOKS_READ_PREFIX, SYNC_HOOKS_WRITE, VALUE_SYNCER, WRITABLE_BUF,
};
use crate::error::{Error, Result};
use crate::info::ClassInfoCache;

const STRING: &str = "java/lang/String";
const UUID: &str = "java/util/UUID";
const ITEM_STACK: &str = "net/minecraft/item/ItemStack";
const FLUID_STACK: &str = "net/minecraftforge/fluids/FluidStack";
const JAVA_LANG_ENUM: &str = "java/lang/Enum";

/// Code-generation strategy for one synced member.
#[derive(Debug, Clone)]
pub enum Syncer {
    /// A primitive the buffer reads and writes natively. Never null.
    Primitive(JType),
    /// A boxed wrapper; the payload is the unboxed primitive.
    Boxed(JType),
    /// A reference type the buffer speaks natively (String, UUID).
    Integrated(JType),
    /// A host value type serialized through the static hook class.
    Hooked(JType),
    /// An enum constant, written by ordinal through the buffer.
    Enum(String),
    /// A user-supplied strategy, delegated to through a lazily created
    /// singleton held in a generated static field.
    Custom { syncer_class: String, holder: Variable, value_ty: JType },
}

impl Syncer {
    /// Select the strategy for a member's declared type.
    pub fn for_type(
        class: &str,
        member: &str,
        ty: &JType,
        cache: &ClassInfoCache,
    ) -> Result<Syncer> {
        if ty.is_primitive() {
            return Ok(Syncer::Primitive(ty.clone()));
        }
        if let Some(primitive) = ty.unboxed() {
            return Ok(Syncer::Boxed(primitive));
        }
        let JType::Object(name) = ty else {
            return Err(Error::config(
                class,
                format!("member {member}: no sync strategy for type {}", ty.descriptor()),
            ));
        };
        match name.as_str() {
            STRING | UUID => return Ok(Syncer::Integrated(ty.clone())),
            ITEM_STACK | FLUID_STACK => return Ok(Syncer::Hooked(ty.clone())),
            _ => {}
        }
        let info = cache.get(name)?;
        if info.is_enum() || info.super_name() == Some(JAVA_LANG_ENUM) {
            return Ok(Syncer::Enum(name.clone()));
        }
        Err(Error::config(
            class,
            format!("member {member}: no sync strategy for type {}", ty.descriptor()),
        ))
    }

    /// Strategy delegating to a user syncer class. `holder` is the
    /// generated static field caching the syncer instance.
    pub fn custom(syncer_class: String, holder: Variable, value_ty: JType) -> Syncer {
        Syncer::Custom { syncer_class, holder, value_ty }
    }

    /// Whether this member can carry null, and therefore participates in
    /// the negative-token convention.
    pub fn is_nullable(&self) -> bool {
        !matches!(self, Syncer::Primitive(_))
    }

    pub fn value_type(&self) -> JType {
        match self {
            Syncer::Primitive(ty) => ty.clone(),
            Syncer::Boxed(primitive) => {
                JType::object(primitive.boxed().expect("boxed syncer wraps a primitive"))
            }
            Syncer::Integrated(ty) | Syncer::Hooked(ty) => ty.clone(),
            Syncer::Enum(name) => JType::object(name.clone()),
            Syncer::Custom { value_ty, .. } => value_ty.clone(),
        }
    }

    /// Condition that holds when `current` equals `companion`.
    pub fn equals(&self, current: CodePiece, companion: CodePiece) -> Condition {
        match self {
            Syncer::Primitive(ty) => Condition::if_equal(current, companion, ty, false),
            // enum constants are singletons, identity is enough
            Syncer::Enum(_) => {
                Condition::if_equal(current, companion, &self.value_type(), false)
            }
            Syncer::Boxed(_) | Syncer::Integrated(_) | Syncer::Hooked(_) => {
                Condition::if_equal(current, companion, &self.value_type(), true)
            }
            Syncer::Custom { holder, .. } => {
                let instance = lazy_instance(holder, self);
                Condition::if_true(pieces::invoke_interface(
                    VALUE_SYNCER,
                    "equal",
                    "(Ljava/lang/Object;Ljava/lang/Object;)Z",
                    vec![instance, current, companion],
                ))
            }
        }
    }

    /// Fragment writing the member's payload into the buffer on the stack
    /// position convention `args[0] = buffer receiver`.
    pub fn write(&self, value: CodePiece, buf: CodePiece) -> CodePiece {
        match self {
            Syncer::Primitive(ty) => buffer_write(ty, value, buf),
            Syncer::Boxed(primitive) => {
                buffer_write(primitive, pieces::unbox_value(value, primitive), buf)
            }
            Syncer::Integrated(ty) => buffer_write(ty, value, buf),
            Syncer::Hooked(ty) => pieces::invoke_static(
                SYNC_HOOKS,
                SYNC_HOOKS_WRITE,
                &format!("({}L{};)V", ty.descriptor(), WRITABLE_BUF),
                vec![value, buf],
            ),
            Syncer::Enum(_) => pieces::invoke_virtual(
                WRITABLE_BUF,
                "writeEnum",
                "(Ljava/lang/Enum;)V",
                vec![buf, value],
            ),
            Syncer::Custom { .. } => {
                let instance = lazy_instance(self.holder(), self);
                pieces::invoke_interface(
                    VALUE_SYNCER,
                    "write",
                    &format!("(Ljava/lang/Object;L{};)V", WRITABLE_BUF),
                    vec![instance, value, buf],
                )
            }
        }
    }

    /// Fragment reading the member's payload, leaving the value on the
    /// stack.
    pub fn read(&self, buf: CodePiece) -> CodePiece {
        match self {
            Syncer::Primitive(ty) => buffer_read(ty, buf),
            Syncer::Boxed(primitive) => pieces::box_value(buffer_read(primitive, buf), primitive),
            Syncer::Integrated(ty) => buffer_read(ty, buf),
            Syncer::Hooked(ty) => pieces::invoke_static(
                SYNC_HOOKS,
                &format!("{}{}", SYNC_HOOKS_READ_PREFIX, ty.simple_name()),
                &format!("(L{};){}", READABLE_BUF, ty.descriptor()),
                vec![buf],
            ),
            Syncer::Enum(name) => pieces::cast_to(
                name,
                pieces::invoke_virtual(
                    READABLE_BUF,
                    "readEnum",
                    "(Ljava/lang/Class;)Ljava/lang/Enum;",
                    vec![buf, pieces::const_class(name.clone())],
                ),
            ),
            Syncer::Custom { syncer_class: _, holder, value_ty } => pieces::cast_to(
                value_ty.internal_name(),
                pieces::invoke_interface(
                    VALUE_SYNCER,
                    "read",
                    &format!("(L{};)Ljava/lang/Object;", READABLE_BUF),
                    vec![lazy_instance(holder, self), buf],
                ),
            ),
        }
    }

    fn holder(&self) -> &Variable {
        match self {
            Syncer::Custom { holder, .. } => holder,
            _ => unreachable!("holder on non-custom syncer"),
        }
    }
}

/// Lazily created singleton instance of a custom syncer, cached in its
/// generated static field.
fn lazy_instance(holder: &Variable, syncer: &Syncer) -> CodePiece {
    let Syncer::Custom { syncer_class, .. } = syncer else {
        unreachable!("lazy_instance on non-custom syncer");
    };
    pieces::make_lazy(holder, pieces::instantiate(syncer_class, &[], Vec::new()))
}

/// `buf.write<Type>(value)` for types the buffer speaks natively.
fn buffer_write(ty: &JType, value: CodePiece, buf: CodePiece) -> CodePiece {
    pieces::invoke_virtual(
        WRITABLE_BUF,
        &format!("write{}", capitalize(&ty.simple_name())),
        &format!("({})V", ty.descriptor()),
        vec![buf, value],
    )
}

/// `buf.read<Type>()`.
fn buffer_read(ty: &JType, buf: CodePiece) -> CodePiece {
    pieces::invoke_virtual(
        READABLE_BUF,
        &format!("read{}", capitalize(&ty.simple_name())),
        &format!("(){}", ty.descriptor()),
        vec![buf],
    )
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
