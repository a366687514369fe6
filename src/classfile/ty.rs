//! JVM type model and descriptor handling
//!
//! `JType` is the engine's view of a JVM field or value type. Descriptors
//! follow JVMS 4.3; method descriptors are parsed into parameter and return
//! types on demand.

use crate::error::{Error, Result};

/// A JVM value type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JType {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    Void,
    /// Reference type by internal name, e.g. `java/lang/String`.
    Object(String),
    Array(Box<JType>),
}

impl JType {
    pub fn object(internal_name: impl Into<String>) -> JType {
        JType::Object(internal_name.into())
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, JType::Object(_) | JType::Array(_) | JType::Void)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, JType::Object(_) | JType::Array(_))
    }

    /// Stack slots occupied by a value of this type.
    pub fn width(&self) -> u16 {
        match self {
            JType::Long | JType::Double => 2,
            JType::Void => 0,
            _ => 1,
        }
    }

    /// Internal name for reference types; panics on primitives, which have
    /// no internal name.
    pub fn internal_name(&self) -> &str {
        match self {
            JType::Object(name) => name,
            _ => panic!("internal_name on non-object type {:?}", self),
        }
    }

    /// Field descriptor for this type.
    pub fn descriptor(&self) -> String {
        match self {
            JType::Boolean => "Z".into(),
            JType::Byte => "B".into(),
            JType::Short => "S".into(),
            JType::Char => "C".into(),
            JType::Int => "I".into(),
            JType::Long => "J".into(),
            JType::Float => "F".into(),
            JType::Double => "D".into(),
            JType::Void => "V".into(),
            JType::Object(name) => format!("L{};", name),
            JType::Array(inner) => format!("[{}", inner.descriptor()),
        }
    }

    /// Parse a single field descriptor.
    pub fn from_descriptor(desc: &str) -> Result<JType> {
        let (ty, rest) = parse_one(desc)?;
        if !rest.is_empty() {
            return Err(Error::codegen(format!("trailing characters in descriptor {:?}", desc)));
        }
        Ok(ty)
    }

    /// The wrapper class internal name for a primitive type, if any.
    pub fn boxed(&self) -> Option<&'static str> {
        Some(match self {
            JType::Boolean => "java/lang/Boolean",
            JType::Byte => "java/lang/Byte",
            JType::Short => "java/lang/Short",
            JType::Char => "java/lang/Character",
            JType::Int => "java/lang/Integer",
            JType::Long => "java/lang/Long",
            JType::Float => "java/lang/Float",
            JType::Double => "java/lang/Double",
            _ => return None,
        })
    }

    /// The primitive type a wrapper class boxes, if this is a wrapper.
    pub fn unboxed(&self) -> Option<JType> {
        let JType::Object(name) = self else { return None };
        Some(match name.as_str() {
            "java/lang/Boolean" => JType::Boolean,
            "java/lang/Byte" => JType::Byte,
            "java/lang/Short" => JType::Short,
            "java/lang/Character" => JType::Char,
            "java/lang/Integer" => JType::Int,
            "java/lang/Long" => JType::Long,
            "java/lang/Float" => JType::Float,
            "java/lang/Double" => JType::Double,
            _ => return None,
        })
    }

    /// Simple name used in host helper method names, e.g. `int`, `String`.
    pub fn simple_name(&self) -> String {
        match self {
            JType::Boolean => "boolean".into(),
            JType::Byte => "byte".into(),
            JType::Short => "short".into(),
            JType::Char => "char".into(),
            JType::Int => "int".into(),
            JType::Long => "long".into(),
            JType::Float => "float".into(),
            JType::Double => "double".into(),
            JType::Void => "void".into(),
            JType::Object(name) => name.rsplit('/').next().unwrap_or(name).to_string(),
            JType::Array(inner) => format!("{}Array", inner.simple_name()),
        }
    }
}

fn parse_one(desc: &str) -> Result<(JType, &str)> {
    let mut chars = desc.chars();
    let c = chars
        .next()
        .ok_or_else(|| Error::codegen("empty type descriptor"))?;
    let rest = chars.as_str();
    let ty = match c {
        'Z' => JType::Boolean,
        'B' => JType::Byte,
        'S' => JType::Short,
        'C' => JType::Char,
        'I' => JType::Int,
        'J' => JType::Long,
        'F' => JType::Float,
        'D' => JType::Double,
        'V' => JType::Void,
        'L' => {
            let end = rest
                .find(';')
                .ok_or_else(|| Error::codegen(format!("unterminated object descriptor {:?}", desc)))?;
            return Ok((JType::Object(rest[..end].to_string()), &rest[end + 1..]));
        }
        '[' => {
            let (inner, rest) = parse_one(rest)?;
            return Ok((JType::Array(Box::new(inner)), rest));
        }
        other => return Err(Error::codegen(format!("invalid descriptor character {:?}", other))),
    };
    Ok((ty, rest))
}

/// Build a method descriptor from parameter and return types.
pub fn method_descriptor(params: &[JType], ret: &JType) -> String {
    let mut d = String::from("(");
    for p in params {
        d.push_str(&p.descriptor());
    }
    d.push(')');
    d.push_str(&ret.descriptor());
    d
}

/// Parse a method descriptor into parameter types and return type.
pub fn parse_method_descriptor(desc: &str) -> Result<(Vec<JType>, JType)> {
    let inner = desc
        .strip_prefix('(')
        .ok_or_else(|| Error::codegen(format!("invalid method descriptor {:?}", desc)))?;
    let close = inner
        .find(')')
        .ok_or_else(|| Error::codegen(format!("invalid method descriptor {:?}", desc)))?;
    let (mut params_str, ret_str) = (&inner[..close], &inner[close + 1..]);

    let mut params = Vec::new();
    while !params_str.is_empty() {
        let (ty, rest) = parse_one(params_str)?;
        params.push(ty);
        params_str = rest;
    }
    Ok((params, JType::from_descriptor(ret_str)?))
}

/// Argument count of a method descriptor.
pub fn argument_count(desc: &str) -> Result<usize> {
    Ok(parse_method_descriptor(desc)?.0.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_round_trip() {
        for desc in ["I", "J", "Z", "Ljava/lang/String;", "[I", "[[Ljava/lang/Object;"] {
            assert_eq!(JType::from_descriptor(desc).unwrap().descriptor(), desc);
        }
    }

    #[test]
    fn method_descriptor_parse() {
        let (params, ret) =
            parse_method_descriptor("(ILjava/lang/String;[J)V").unwrap();
        assert_eq!(params.len(), 3);
        assert_eq!(params[0], JType::Int);
        assert_eq!(params[1], JType::object("java/lang/String"));
        assert_eq!(params[2], JType::Array(Box::new(JType::Long)));
        assert_eq!(ret, JType::Void);
    }

    #[test]
    fn boxing_pairs() {
        assert_eq!(JType::Int.boxed(), Some("java/lang/Integer"));
        assert_eq!(JType::object("java/lang/Integer").unboxed(), Some(JType::Int));
        assert_eq!(JType::object("java/lang/String").unboxed(), None);
        assert!(JType::object("x/Y").boxed().is_none());
    }

    #[test]
    fn widths() {
        assert_eq!(JType::Long.width(), 2);
        assert_eq!(JType::Double.width(), 2);
        assert_eq!(JType::Int.width(), 1);
        assert_eq!(JType::object("a/B").width(), 1);
    }
}
