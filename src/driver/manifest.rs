//! Declaration manifest
//!
//! The batch driver reads its declarations from JSON: modules with their
//! imports, structs, functions and constants. Expressions use a small
//! externally tagged form, e.g. `{"chain": {"first": {"int": 8}, "rest":
//! [["+", {"int": 3}]]}}`.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::config::SessionConfig;
use crate::expr::{Ast, BinOp, ExprId, UnaryOp};
use crate::types::Type;
use crate::utils::Location;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub config: SessionConfig,
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleSpec {
    pub name: String,
    #[serde(default)]
    pub docstring: String,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub objects: Vec<String>,
    #[serde(default)]
    pub structs: Vec<StructSpec>,
    #[serde(default)]
    pub functions: Vec<FuncSpec>,
    #[serde(default)]
    pub constants: Vec<ConstantSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StructSpec {
    pub name: String,
    #[serde(default)]
    pub packed: bool,
    #[serde(default)]
    pub docstring: String,
    #[serde(default)]
    pub members: Vec<MemberSpec>,
}

/// A named slot: struct member, parameter or block variable
#[derive(Debug, Clone, Deserialize)]
pub struct MemberSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FuncSpec {
    pub name: String,
    #[serde(default)]
    pub inbound: Vec<MemberSpec>,
    #[serde(default)]
    pub outbound: Vec<MemberSpec>,
    /// Variables of the mainline block
    #[serde(default)]
    pub locals: Vec<LocalSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub init: Option<ExprSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConstantSpec {
    /// Empty for unnamed constants
    #[serde(default)]
    pub name: String,
    /// Declared type; the folded value's type is used when absent
    #[serde(rename = "type", default)]
    pub ty: Option<String>,
    #[serde(default)]
    pub docstring: String,
    pub value: ExprSpec,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprSpec {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Name(String),
    Group(Box<ExprSpec>),
    Ref(Box<ExprSpec>),
    List(Vec<ExprSpec>),
    /// Operators applied strictly left to right
    Chain {
        first: Box<ExprSpec>,
        rest: Vec<(String, ExprSpec)>,
    },
    Construct {
        #[serde(rename = "type")]
        ty: String,
        values: Vec<ExprSpec>,
    },
    Index {
        source: Box<ExprSpec>,
        subscript: Box<ExprSpec>,
    },
}

impl Manifest {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid manifest")
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("in {}", path.display()))
    }
}

impl ExprSpec {
    /// Lower into the expression arena. Unknown operator symbols are
    /// reported by name.
    pub fn build(&self, ast: &mut Ast, loc: &Location) -> std::result::Result<ExprId, String> {
        let id = match self {
            ExprSpec::Int(v) => ast.int(i128::from(*v), loc.clone()),
            ExprSpec::Float(v) => ast.float(*v, loc.clone()),
            ExprSpec::Str(v) => ast.string(v, loc.clone()),
            ExprSpec::Bool(v) => ast.boolean(*v, loc.clone()),
            ExprSpec::Name(name) => ast.name(name, loc.clone()),
            ExprSpec::Group(inner) => {
                let child = inner.build(ast, loc)?;
                ast.group(child, loc.clone())
            }
            ExprSpec::Ref(inner) => {
                let child = inner.build(ast, loc)?;
                ast.unary(UnaryOp::Ref, child, loc.clone())
            }
            ExprSpec::List(values) => {
                let elements = values
                    .iter()
                    .map(|v| v.build(ast, loc))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                ast.initializer_list(elements, loc.clone())
            }
            ExprSpec::Chain { first, rest } => {
                let first = first.build(ast, loc)?;
                let mut ops = Vec::with_capacity(rest.len());
                for (symbol, operand) in rest {
                    let op = BinOp::from_symbol(symbol).ok_or_else(|| symbol.clone())?;
                    ops.push((op, operand.build(ast, loc)?));
                }
                ast.fold_chain(first, ops)
            }
            ExprSpec::Construct { ty, values } => {
                let elements = values
                    .iter()
                    .map(|v| v.build(ast, loc))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                let list = ast.initializer_list(elements, loc.clone());
                ast.struct_constructor(Type::new(ty, loc.clone()), list, loc.clone())
            }
            ExprSpec::Index { source, subscript } => {
                let source = source.build(ast, loc)?;
                let subscript = subscript.build(ast, loc)?;
                ast.index(source, subscript, loc.clone())
            }
        };
        Ok(id)
    }
}
