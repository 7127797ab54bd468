//! Constants, globals and objects owned by a module

use serde::Serialize;

use super::ScopeId;
use crate::expr::Literal;
use crate::types::Type;
use crate::utils::Location;

/// One row of a struct's attribute table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttrNode {
    /// Member name as written
    pub member: String,
    /// Name of the string constant holding the member name
    pub name: String,
    /// Name of the type-info global describing the member type
    pub type_info: String,
    /// Encoded type flags
    pub flags: u32,
}

/// How a constant or global starts out
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Initializer {
    None,
    /// Folded constant expression
    Value(Literal),
    /// Folded aggregate, one literal per supplied member
    Aggregate(Vec<Literal>),
    /// Index into the owning module's string table
    StringIndex(usize),
    /// Runtime type information record
    TypeInfo { name: String, type_id: u32 },
    /// Struct reflection metadata, in member order
    AttrTable(Vec<AttrNode>),
}

/// A named compile-time constant. Its type is always const.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDef {
    /// Empty until the module names it
    pub name: String,
    pub ty: Type,
    pub initializer: Initializer,
    pub docstring: String,
    pub parent_scope: Option<ScopeId>,
}

impl ConstantDef {
    pub fn new(name: &str, mut ty: Type, initializer: Initializer) -> Self {
        ty.make_const();
        Self {
            name: name.to_string(),
            ty,
            initializer,
            docstring: String::new(),
            parent_scope: None,
        }
    }

    /// A constant the module will name `__CO<n>` when it is added
    pub fn anonymous(ty: Type, initializer: Initializer) -> Self {
        Self::new("", ty, initializer)
    }

    pub fn with_docstring(mut self, docstring: &str) -> Self {
        self.docstring = docstring.to_string();
        self
    }

    /// The literal value, if the initializer is one
    pub fn literal(&self) -> Option<&Literal> {
        match &self.initializer {
            Initializer::Value(lit) => Some(lit),
            _ => None,
        }
    }
}

/// A global the compiler emits (type info, attribute tables)
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVar {
    pub name: String,
    pub ty: Type,
    pub initializer: Initializer,
    pub docstring: String,
    pub parent_scope: Option<ScopeId>,
}

impl GlobalVar {
    pub fn new(name: &str, ty: Type, initializer: Initializer) -> Self {
        Self {
            name: name.to_string(),
            ty,
            initializer,
            docstring: String::new(),
            parent_scope: None,
        }
    }
}

/// A protocol definition; only its name takes part in type resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDef {
    pub name: String,
    pub loc: Location,
    pub docstring: String,
    pub parent_scope: Option<ScopeId>,
}

impl ObjectDef {
    pub fn new(name: &str, loc: Location) -> Self {
        Self {
            name: name.to_string(),
            loc,
            docstring: String::new(),
            parent_scope: None,
        }
    }
}
