//! Uniform access to "a value on an object"
//!
//! A `Variable` abstracts over the three places a synced value can live:
//! a field, a getter/setter pair, or a local slot. All producers hand out
//! code fragments, so the rest of the generator never cares which kind it
//! is working with.

use crate::asm::code::{CodeBuilder, CodePiece};
use crate::asm::insn::{load_opcode, opcodes::*, store_opcode, Insn};
use crate::classfile::flags::AccessFlags;
use crate::classfile::tree::{Annotation, ClassNode, FieldNode, MethodNode};
use crate::classfile::ty::{method_descriptor, parse_method_descriptor, JType};
use crate::consts::COMPANION_SUFFIX;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
enum Backing {
    Field {
        owner: String,
        name: String,
        desc: String,
        is_static: bool,
    },
    Accessor {
        owner: String,
        owner_is_interface: bool,
        getter_name: String,
        getter_desc: String,
        setter_name: String,
        setter_desc: String,
        is_static: bool,
        is_private: bool,
        /// The original member name (getter name stripped of its prefix).
        name: String,
    },
    Local {
        index: u16,
    },
}

/// An accessor over a field, a getter/setter pair, or a local variable.
#[derive(Debug, Clone)]
pub struct Variable {
    backing: Backing,
    ty: JType,
    /// Fragment that loads the instance; unused for static/local backing.
    instance: CodePiece,
    annotations: Vec<Annotation>,
}

impl Variable {
    /// A field-backed variable.
    pub fn of_field(clazz: &ClassNode, field: &FieldNode, instance: CodePiece) -> Variable {
        Variable {
            backing: Backing::Field {
                owner: clazz.name.clone(),
                name: field.name.clone(),
                desc: field.desc.clone(),
                is_static: field.access.is_static(),
            },
            ty: field.ty(),
            instance,
            annotations: field.annotations.clone(),
        }
    }

    /// A getter/setter-backed variable. The pair must agree on value type,
    /// the setter must be single-argument and void, and both must have the
    /// same static-ness.
    pub fn of_accessors(
        clazz: &ClassNode,
        getter: &MethodNode,
        setter: &MethodNode,
        instance: CodePiece,
    ) -> Result<Variable> {
        if getter.access.is_static() != setter.access.is_static() {
            return Err(Error::config(
                &clazz.name,
                format!("getter {} and setter {} differ in static-ness", getter.name, setter.name),
            ));
        }
        let (getter_params, value_ty) = parse_method_descriptor(&getter.desc)?;
        if !getter_params.is_empty() || value_ty == JType::Void {
            return Err(Error::config(
                &clazz.name,
                format!("getter {} must take no arguments and return a value", getter.name),
            ));
        }
        let (setter_params, setter_ret) = parse_method_descriptor(&setter.desc)?;
        if setter_params.len() != 1 || setter_ret != JType::Void {
            return Err(Error::config(
                &clazz.name,
                format!("setter {} must take one argument and return void", setter.name),
            ));
        }
        if setter_params[0] != value_ty {
            return Err(Error::config(
                &clazz.name,
                format!(
                    "getter {} and setter {} disagree on value type",
                    getter.name, setter.name
                ),
            ));
        }

        Ok(Variable {
            backing: Backing::Accessor {
                owner: clazz.name.clone(),
                owner_is_interface: clazz.access.is_interface(),
                getter_name: getter.name.clone(),
                getter_desc: getter.desc.clone(),
                setter_name: setter.name.clone(),
                setter_desc: setter.desc.clone(),
                is_static: getter.access.is_static(),
                is_private: getter.access.is_private() || setter.access.is_private(),
                name: strip_accessor_prefix(&getter.name),
            },
            ty: value_ty,
            instance,
            annotations: getter.annotations.clone(),
        })
    }

    /// A local-slot-backed variable.
    pub fn of_local(index: u16, ty: JType) -> Variable {
        Variable {
            backing: Backing::Local { index },
            ty,
            instance: CodePiece::empty(),
            annotations: Vec::new(),
        }
    }

    /// The member name this variable represents.
    pub fn name(&self) -> &str {
        match &self.backing {
            Backing::Field { name, .. } => name,
            Backing::Accessor { name, .. } => name,
            Backing::Local { .. } => "<local>",
        }
    }

    pub fn ty(&self) -> &JType {
        &self.ty
    }

    pub fn is_field(&self) -> bool {
        matches!(self.backing, Backing::Field { .. })
    }

    pub fn is_accessor(&self) -> bool {
        matches!(self.backing, Backing::Accessor { .. })
    }

    pub fn is_local(&self) -> bool {
        matches!(self.backing, Backing::Local { .. })
    }

    pub fn is_static(&self) -> bool {
        match &self.backing {
            Backing::Field { is_static, .. } => *is_static,
            Backing::Accessor { is_static, .. } => *is_static,
            Backing::Local { .. } => false,
        }
    }

    pub fn annotation(&self, desc: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.desc == desc)
    }

    /// Fragment that loads the current value.
    pub fn get(&self) -> CodePiece {
        match &self.backing {
            Backing::Field { owner, name, desc, is_static } => {
                if *is_static {
                    CodePiece::of(Insn::Field {
                        opcode: GETSTATIC,
                        owner: owner.clone(),
                        name: name.clone(),
                        desc: desc.clone(),
                    })
                } else {
                    self.instance.clone().append_insn(Insn::Field {
                        opcode: GETFIELD,
                        owner: owner.clone(),
                        name: name.clone(),
                        desc: desc.clone(),
                    })
                }
            }
            Backing::Accessor { owner, getter_name, getter_desc, is_static, .. } => {
                let opcode = self.invoke_opcode();
                let receiver = if *is_static { CodePiece::empty() } else { self.instance.clone() };
                receiver.append_insn(Insn::Method {
                    opcode,
                    owner: owner.clone(),
                    name: getter_name.clone(),
                    desc: getter_desc.clone(),
                })
            }
            Backing::Local { index } => CodePiece::of(Insn::Var {
                opcode: load_opcode(&self.ty),
                index: *index,
            }),
        }
    }

    /// Fragment that stores the given value.
    pub fn set(&self, value: CodePiece) -> CodePiece {
        match &self.backing {
            Backing::Field { owner, name, desc, is_static } => {
                let field = Insn::Field {
                    opcode: if *is_static { PUTSTATIC } else { PUTFIELD },
                    owner: owner.clone(),
                    name: name.clone(),
                    desc: desc.clone(),
                };
                if *is_static {
                    value.append_insn(field)
                } else {
                    self.instance.clone().append(value).append_insn(field)
                }
            }
            Backing::Accessor { owner, setter_name, setter_desc, is_static, .. } => {
                let call = Insn::Method {
                    opcode: self.invoke_opcode(),
                    owner: owner.clone(),
                    name: setter_name.clone(),
                    desc: setter_desc.clone(),
                };
                if *is_static {
                    value.append_insn(call)
                } else {
                    self.instance.clone().append(value).append_insn(call)
                }
            }
            Backing::Local { index } => value.append_insn(Insn::Var {
                opcode: store_opcode(&self.ty),
                index: *index,
            }),
        }
    }

    /// Fragment that stores the given value and leaves a copy of it on the
    /// stack, evaluating `value` exactly once.
    pub fn set_and_get(&self, value: CodePiece) -> CodePiece {
        let dup = if self.ty.width() == 2 { DUP2 } else { DUP };
        let dup_under = if self.ty.width() == 2 { DUP2_X1 } else { DUP_X1 };
        match &self.backing {
            Backing::Field { is_static, .. } | Backing::Accessor { is_static, .. }
                if !is_static =>
            {
                // instance, value, dup under instance, consume, copy remains
                let mut builder = CodeBuilder::new();
                builder
                    .add(self.instance.clone())
                    .add(value)
                    .add(Insn::simple(dup_under))
                    .add(self.store_insn());
                builder.build()
            }
            Backing::Local { index } => value.append_insn(Insn::simple(dup)).append_insn(Insn::Var {
                opcode: store_opcode(&self.ty),
                index: *index,
            }),
            _ => {
                // static backing: value, dup, store
                value
                    .append_insn(Insn::simple(dup))
                    .append_insn(self.store_insn())
            }
        }
    }

    fn store_insn(&self) -> Insn {
        match &self.backing {
            Backing::Field { owner, name, desc, is_static } => Insn::Field {
                opcode: if *is_static { PUTSTATIC } else { PUTFIELD },
                owner: owner.clone(),
                name: name.clone(),
                desc: desc.clone(),
            },
            Backing::Accessor { owner, setter_name, setter_desc, .. } => Insn::Method {
                opcode: self.invoke_opcode(),
                owner: owner.clone(),
                name: setter_name.clone(),
                desc: setter_desc.clone(),
            },
            Backing::Local { index } => Insn::Var {
                opcode: store_opcode(&self.ty),
                index: *index,
            },
        }
    }

    fn invoke_opcode(&self) -> u8 {
        match &self.backing {
            Backing::Accessor { is_static, is_private, owner_is_interface, .. } => {
                if *is_static {
                    INVOKESTATIC
                } else if *is_private {
                    INVOKESPECIAL
                } else if *owner_is_interface {
                    INVOKEINTERFACE
                } else {
                    INVOKEVIRTUAL
                }
            }
            _ => unreachable!("invoke_opcode on non-accessor backing"),
        }
    }
}

/// Derive the member name from a getter name: `getHealth` → `health`,
/// `isAlive` → `alive`, anything else unchanged.
fn strip_accessor_prefix(getter: &str) -> String {
    for prefix in ["get", "is"] {
        if let Some(rest) = getter.strip_prefix(prefix) {
            if !rest.is_empty() {
                let mut chars = rest.chars();
                let first = chars.next().unwrap();
                if first.is_ascii_uppercase() {
                    return first.to_ascii_lowercase().to_string() + chars.as_str();
                }
            }
        }
    }
    getter.to_string()
}

/// Synthesize the companion field for a variable: same value type, private,
/// default-initialized, named by suffixing the member name. Returns an
/// accessor for the new field.
pub fn make_companion(clazz: &mut ClassNode, var: &Variable, instance: CodePiece) -> Variable {
    let name = format!("{}{}", var.name(), COMPANION_SUFFIX);
    let mut access = AccessFlags::PRIVATE | AccessFlags::SYNTHETIC;
    if var.is_static() {
        access |= AccessFlags::STATIC;
    }
    let field = FieldNode::new(access, name, var.ty().descriptor());
    clazz.fields.push(field);
    let field_ref = clazz.fields.last().unwrap();
    Variable::of_field(clazz, field_ref, instance)
}

/// Discover all variables on the class carrying the given annotation:
/// annotated fields, and annotated getters paired with `set`-prefixed
/// setters.
pub fn all_with(clazz: &ClassNode, annotation_desc: &str, instance: CodePiece) -> Result<Vec<Variable>> {
    let mut vars = Vec::new();
    for field in &clazz.fields {
        if field.has_annotation(annotation_desc) {
            vars.push(Variable::of_field(clazz, field, instance.clone()));
        }
    }
    for method in &clazz.methods {
        if !method.has_annotation(annotation_desc) {
            continue;
        }
        let member = strip_accessor_prefix(&method.name);
        let setter_name = format!(
            "set{}{}",
            member.chars().next().map(|c| c.to_ascii_uppercase()).unwrap_or_default(),
            member.chars().skip(1).collect::<String>()
        );
        let setter = clazz.find_method(&setter_name).ok_or_else(|| {
            Error::config(
                &clazz.name,
                format!("annotated getter {} has no setter {}", method.name, setter_name),
            )
        })?;
        vars.push(Variable::of_accessors(clazz, method, setter, instance.clone())?);
    }
    Ok(vars)
}
