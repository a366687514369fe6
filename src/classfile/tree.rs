//! Mutable in-progress class representation
//!
//! This is the tree the transformer works on: the host hands a parsed
//! `ClassNode` in, the engine adds fields, methods and interfaces, and the
//! result is emitted back to bytes. One transformation pass exclusively
//! owns the node it rewrites.

use std::collections::HashMap;

use crate::asm::insn::InsnList;
use crate::classfile::flags::AccessFlags;
use crate::classfile::ty::JType;

/// One value inside an annotation.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    Str(String),
    Int(i64),
    Bool(bool),
    /// A class value, by field descriptor.
    Class(String),
    EnumConst { desc: String, value: String },
}

/// A declared annotation, keyed by its field descriptor.
#[derive(Debug, Clone, Default)]
pub struct Annotation {
    pub desc: String,
    pub values: HashMap<String, AnnotationValue>,
}

impl Annotation {
    pub fn new(desc: impl Into<String>) -> Annotation {
        Annotation { desc: desc.into(), values: HashMap::new() }
    }

    pub fn with(mut self, name: impl Into<String>, value: AnnotationValue) -> Annotation {
        self.values.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&AnnotationValue> {
        self.values.get(name)
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(AnnotationValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// A class-valued property as a `JType`.
    pub fn class_value(&self, name: &str) -> Option<JType> {
        match self.values.get(name) {
            Some(AnnotationValue::Class(desc)) => JType::from_descriptor(desc).ok(),
            _ => None,
        }
    }
}

fn find_annotation<'a>(annotations: &'a [Annotation], desc: &str) -> Option<&'a Annotation> {
    annotations.iter().find(|a| a.desc == desc)
}

/// A declared field.
#[derive(Debug, Clone)]
pub struct FieldNode {
    pub access: AccessFlags,
    pub name: String,
    pub desc: String,
    pub annotations: Vec<Annotation>,
}

impl FieldNode {
    pub fn new(access: AccessFlags, name: impl Into<String>, desc: impl Into<String>) -> FieldNode {
        FieldNode { access, name: name.into(), desc: desc.into(), annotations: Vec::new() }
    }

    pub fn ty(&self) -> JType {
        JType::from_descriptor(&self.desc).expect("field has valid descriptor")
    }

    pub fn annotation(&self, desc: &str) -> Option<&Annotation> {
        find_annotation(&self.annotations, desc)
    }

    pub fn has_annotation(&self, desc: &str) -> bool {
        self.annotation(desc).is_some()
    }
}

/// A declared method with its body.
#[derive(Debug, Clone)]
pub struct MethodNode {
    pub access: AccessFlags,
    pub name: String,
    pub desc: String,
    pub insns: InsnList,
    pub annotations: Vec<Annotation>,
}

impl MethodNode {
    pub fn new(access: AccessFlags, name: impl Into<String>, desc: impl Into<String>) -> MethodNode {
        MethodNode {
            access,
            name: name.into(),
            desc: desc.into(),
            insns: InsnList::new(),
            annotations: Vec::new(),
        }
    }

    pub fn annotation(&self, desc: &str) -> Option<&Annotation> {
        find_annotation(&self.annotations, desc)
    }

    pub fn has_annotation(&self, desc: &str) -> bool {
        self.annotation(desc).is_some()
    }
}

/// A class under transformation.
#[derive(Debug, Clone)]
pub struct ClassNode {
    /// Classfile major version.
    pub version: u16,
    pub access: AccessFlags,
    /// Internal name, e.g. `com/example/MyTileEntity`.
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldNode>,
    pub methods: Vec<MethodNode>,
    pub annotations: Vec<Annotation>,
}

impl ClassNode {
    pub fn new(access: AccessFlags, name: impl Into<String>, super_name: impl Into<String>) -> ClassNode {
        ClassNode {
            version: 50,
            access,
            name: name.into(),
            super_name: Some(super_name.into()),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn find_method(&self, name: &str) -> Option<&MethodNode> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn find_method_mut(&mut self, name: &str) -> Option<&mut MethodNode> {
        self.methods.iter_mut().find(|m| m.name == name)
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldNode> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn annotation(&self, desc: &str) -> Option<&Annotation> {
        find_annotation(&self.annotations, desc)
    }

    pub fn has_annotation(&self, desc: &str) -> bool {
        self.annotation(desc).is_some()
    }

    /// True if self, any field or any method carries the given annotation.
    pub fn has_annotation_anywhere(&self, desc: &str) -> bool {
        self.has_annotation(desc)
            || self.fields.iter().any(|f| f.has_annotation(desc))
            || self.methods.iter().any(|m| m.has_annotation(desc))
    }

    pub fn add_interface(&mut self, internal_name: impl Into<String>) {
        let name = internal_name.into();
        if !self.interfaces.contains(&name) {
            self.interfaces.push(name);
        }
    }
}
