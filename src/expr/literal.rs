//! Literal values

use std::fmt;

use serde::Serialize;

use crate::types::{Type, TypeKind};
use crate::utils::Location;

/// A compile-time value.
///
/// Integers are kept wide enough to hold every `uint64_t` and `sint64_t`
/// value, so folding can detect results that fit neither.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(String),
}

impl Literal {
    /// The const type a literal has before any context is applied
    pub fn natural_type(&self, loc: Location) -> Type {
        let ty = match self {
            Literal::Bool(_) => Type::primitive(TypeKind::Bool, loc),
            Literal::Int(v) => Type::primitive(integer_kind(*v), loc),
            Literal::Float(_) => Type::primitive(TypeKind::Float64, loc),
            Literal::Str(_) => Type::primitive(TypeKind::String, loc),
        };
        ty.constant()
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Literal::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Literal::Float(v) => Some(*v),
            Literal::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

/// Smallest integer kind holding `v`.
///
/// Non-negative values take the narrowest unsigned kind, negative values
/// the narrowest signed kind by signed range.
pub fn integer_kind(v: i128) -> TypeKind {
    if v >= 0 {
        if v <= u8::MAX as i128 {
            TypeKind::UInt8
        } else if v <= u16::MAX as i128 {
            TypeKind::UInt16
        } else if v <= u32::MAX as i128 {
            TypeKind::UInt32
        } else {
            TypeKind::UInt64
        }
    } else if v >= i8::MIN as i128 {
        TypeKind::SInt8
    } else if v >= i16::MIN as i128 {
        TypeKind::SInt16
    } else if v >= i32::MIN as i128 {
        TypeKind::SInt32
    } else if v >= i64::MIN as i128 {
        TypeKind::SInt64
    } else {
        TypeKind::UInt64
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(v) => write!(f, "{v}"),
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Float(v) => write!(f, "{v:?}"),
            Literal::Str(v) => write!(f, "\"{}\"", v.escape_debug()),
        }
    }
}
