//! Expression trees
//!
//! Expressions live in an [`Ast`] arena and refer to each other by
//! [`ExprId`]. Binary chains are built left to right with no operator
//! precedence: `8 + 3 - 2 * 10` is `((8 + 3) - 2) * 10`.
//!
//! Each node caches its type. The cache starts as the null sentinel and is
//! filled on first request, or set directly when a name is resolved.

mod literal;
mod resolve;
mod solver;

pub use literal::{integer_kind, Literal};
pub use solver::{ConstantSolver, FoldError};

use std::fmt;

use crate::types::Type;
use crate::utils::Location;

/// Handle of an expression node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub(crate) usize);

impl ExprId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Parenthesised sub-expression
    Group,
    /// Take a reference (`@x`)
    Ref,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Xor,
    And,
    Or,
    /// Member access
    Dot,
}

impl BinOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol {
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "%" => Self::Mod,
            "^" => Self::Xor,
            "&" => Self::And,
            "|" => Self::Or,
            "." => Self::Dot,
            _ => return None,
        };
        Some(op)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Xor => "^",
            Self::And => "&",
            Self::Or => "|",
            Self::Dot => ".",
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostfixOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Name(String),
    InitializerList(Vec<ExprId>),
    Unary { op: UnaryOp, child: ExprId },
    StructConstructor { target: Type, child: ExprId },
    Binary { op: BinOp, left: ExprId, right: ExprId },
    PostFix { op: PostfixOp, child: ExprId },
    Index { source: ExprId, subscript: ExprId },
}

/// Operator tag of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Literal,
    Name,
    InitializerList,
    Unary(UnaryOp),
    StructConstructor,
    Binary(BinOp),
    PostFix(PostfixOp),
    Index,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Op::Literal => "lit",
            Op::Name => "name",
            Op::InitializerList => "{}",
            Op::Unary(UnaryOp::Group) => "()",
            Op::Unary(UnaryOp::Ref) => "@",
            Op::StructConstructor => "construct",
            Op::Binary(op) => op.symbol(),
            Op::PostFix(PostfixOp::Increment) => "++",
            Op::PostFix(PostfixOp::Decrement) => "--",
            Op::Index => "[]",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub loc: Location,
    /// Cached type, null until known
    pub(crate) ty: Type,
    pub kind: ExprKind,
}

/// Where a node's type comes from
enum TypeSource {
    Known(Type),
    Child(ExprId),
    RefTo(ExprId),
    ElementOf(ExprId),
}

#[derive(Debug, Clone, Default)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, kind: ExprKind, ty: Type, loc: Location) -> ExprId {
        let id = ExprId(self.nodes.len());
        self.nodes.push(Node { loc, ty, kind });
        id
    }

    // ==================== Construction ====================

    pub fn literal(&mut self, value: Literal, loc: Location) -> ExprId {
        let ty = value.natural_type(loc.clone());
        self.push(ExprKind::Literal(value), ty, loc)
    }

    pub fn int(&mut self, value: i128, loc: Location) -> ExprId {
        self.literal(Literal::Int(value), loc)
    }

    pub fn float(&mut self, value: f64, loc: Location) -> ExprId {
        self.literal(Literal::Float(value), loc)
    }

    pub fn string(&mut self, value: &str, loc: Location) -> ExprId {
        self.literal(Literal::Str(value.to_string()), loc)
    }

    pub fn boolean(&mut self, value: bool, loc: Location) -> ExprId {
        self.literal(Literal::Bool(value), loc)
    }

    pub fn name(&mut self, name: &str, loc: Location) -> ExprId {
        self.push(ExprKind::Name(name.to_string()), Type::null(), loc)
    }

    pub fn initializer_list(&mut self, elements: Vec<ExprId>, loc: Location) -> ExprId {
        self.push(ExprKind::InitializerList(elements), Type::null(), loc)
    }

    pub fn unary(&mut self, op: UnaryOp, child: ExprId, loc: Location) -> ExprId {
        self.push(ExprKind::Unary { op, child }, Type::null(), loc)
    }

    pub fn group(&mut self, child: ExprId, loc: Location) -> ExprId {
        self.unary(UnaryOp::Group, child, loc)
    }

    pub fn binary(&mut self, op: BinOp, left: ExprId, right: ExprId, loc: Location) -> ExprId {
        self.push(ExprKind::Binary { op, left, right }, Type::null(), loc)
    }

    pub fn postfix(&mut self, op: PostfixOp, child: ExprId, loc: Location) -> ExprId {
        self.push(ExprKind::PostFix { op, child }, Type::null(), loc)
    }

    pub fn index(&mut self, source: ExprId, subscript: ExprId, loc: Location) -> ExprId {
        self.push(ExprKind::Index { source, subscript }, Type::null(), loc)
    }

    pub fn struct_constructor(&mut self, target: Type, child: ExprId, loc: Location) -> ExprId {
        self.push(ExprKind::StructConstructor { target, child }, Type::null(), loc)
    }

    /// Build `first op1 e1 op2 e2 ...` strictly left to right
    pub fn fold_chain(&mut self, first: ExprId, rest: impl IntoIterator<Item = (BinOp, ExprId)>) -> ExprId {
        rest.into_iter().fold(first, |left, (op, right)| {
            let loc = self.nodes[left.0].loc.clone();
            self.binary(op, left, right, loc)
        })
    }

    // ==================== Inspection ====================

    pub fn node(&self, id: ExprId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn kind(&self, id: ExprId) -> &ExprKind {
        &self.nodes[id.0].kind
    }

    pub fn loc(&self, id: ExprId) -> &Location {
        &self.nodes[id.0].loc
    }

    pub fn op(&self, id: ExprId) -> Op {
        match self.kind(id) {
            ExprKind::Literal(_) => Op::Literal,
            ExprKind::Name(_) => Op::Name,
            ExprKind::InitializerList(_) => Op::InitializerList,
            ExprKind::Unary { op, .. } => Op::Unary(*op),
            ExprKind::StructConstructor { .. } => Op::StructConstructor,
            ExprKind::Binary { op, .. } => Op::Binary(*op),
            ExprKind::PostFix { op, .. } => Op::PostFix(*op),
            ExprKind::Index { .. } => Op::Index,
        }
    }

    pub fn literal_value(&self, id: ExprId) -> Option<&Literal> {
        match self.kind(id) {
            ExprKind::Literal(value) => Some(value),
            _ => None,
        }
    }

    pub fn children(&self, id: ExprId) -> Vec<ExprId> {
        match self.kind(id) {
            ExprKind::Literal(_) | ExprKind::Name(_) => Vec::new(),
            ExprKind::InitializerList(elements) => elements.clone(),
            ExprKind::Unary { child, .. }
            | ExprKind::PostFix { child, .. }
            | ExprKind::StructConstructor { child, .. } => vec![*child],
            ExprKind::Binary { left, right, .. } => vec![*left, *right],
            ExprKind::Index { source, subscript } => vec![*source, *subscript],
        }
    }

    pub fn num_inputs(&self, id: ExprId) -> usize {
        match self.kind(id) {
            ExprKind::Literal(_) | ExprKind::Name(_) | ExprKind::InitializerList(_) => 0,
            ExprKind::Unary { .. } | ExprKind::PostFix { .. } | ExprKind::StructConstructor { .. } => 1,
            ExprKind::Binary { .. } | ExprKind::Index { .. } => 2,
        }
    }

    /// An initializer list yields one value per element
    pub fn num_outputs(&self, id: ExprId) -> usize {
        match self.kind(id) {
            ExprKind::InitializerList(elements) => elements.len(),
            _ => 1,
        }
    }

    /// Expression producing output `idx`
    pub fn output_expr(&self, id: ExprId, idx: usize) -> Option<ExprId> {
        match self.kind(id) {
            ExprKind::InitializerList(elements) => elements.get(idx).copied(),
            _ if idx == 0 => Some(id),
            _ => None,
        }
    }

    pub fn output_type(&self, id: ExprId, idx: usize) -> Option<Type> {
        self.output_expr(id, idx).map(|expr| self.type_of(expr))
    }

    // ==================== Types ====================

    /// The node's type, computed from its children when not cached
    pub fn type_of(&self, id: ExprId) -> Type {
        let node = &self.nodes[id.0];
        if !node.ty.is_null() {
            return node.ty.clone();
        }
        let source = match &node.kind {
            ExprKind::Literal(_) | ExprKind::Name(_) => TypeSource::Known(node.ty.clone()),
            ExprKind::InitializerList(elements) => match elements.first() {
                Some(&first) => TypeSource::Child(first),
                None => TypeSource::Known(Type::null()),
            },
            ExprKind::Unary { op: UnaryOp::Group, child } | ExprKind::PostFix { child, .. } => {
                TypeSource::Child(*child)
            }
            ExprKind::Unary { op: UnaryOp::Ref, child } => TypeSource::RefTo(*child),
            ExprKind::StructConstructor { target, .. } => TypeSource::Known(target.clone()),
            ExprKind::Binary { left, .. } => TypeSource::Child(*left),
            ExprKind::Index { source, .. } => TypeSource::ElementOf(*source),
        };
        match source {
            TypeSource::Known(ty) => ty,
            TypeSource::Child(child) => self.type_of(child),
            TypeSource::RefTo(child) => {
                let mut ty = self.type_of(child);
                ty.make_ref();
                ty
            }
            TypeSource::ElementOf(source) => self.type_of(source).indexed_type(),
        }
    }

    /// Like [`Ast::type_of`], but keeps the result in the node cache
    pub fn get_type(&mut self, id: ExprId) -> Type {
        let ty = self.type_of(id);
        if !ty.is_null() {
            self.nodes[id.0].ty = ty.clone();
        }
        ty
    }

    pub(crate) fn set_type(&mut self, id: ExprId, ty: Type) {
        self.nodes[id.0].ty = ty;
    }

    /// Forget a cached type that was derived from the children
    pub fn invalidate_type(&mut self, id: ExprId) {
        let node = &mut self.nodes[id.0];
        match node.kind {
            ExprKind::Literal(_) | ExprKind::Name(_) | ExprKind::StructConstructor { .. } => {}
            _ => node.ty = Type::null(),
        }
    }

    /// Structural constness: literals, const names and operators over them
    pub fn is_const(&self, id: ExprId) -> bool {
        match self.kind(id) {
            ExprKind::Literal(_) => true,
            ExprKind::Name(_) => self.type_of(id).is_const(),
            ExprKind::InitializerList(elements) => elements.iter().all(|&e| self.is_const(e)),
            ExprKind::Unary { child, .. } | ExprKind::PostFix { child, .. } => self.is_const(*child),
            ExprKind::Binary { left, right, .. } => self.is_const(*left) && self.is_const(*right),
            ExprKind::StructConstructor { child, .. } => (0..self.num_outputs(*child))
                .all(|idx| self.output_type(*child, idx).is_some_and(|ty| ty.is_const())),
            ExprKind::Index { .. } => false,
        }
    }

    /// Swap one direct child for another. False if `old` is not a child.
    pub fn replace_child(&mut self, parent: ExprId, old: ExprId, new: ExprId) -> bool {
        let swap = |slot: &mut ExprId| {
            if *slot == old {
                *slot = new;
                true
            } else {
                false
            }
        };
        match &mut self.nodes[parent.0].kind {
            ExprKind::Literal(_) | ExprKind::Name(_) => false,
            ExprKind::InitializerList(elements) => elements.iter_mut().any(swap),
            ExprKind::Unary { child, .. }
            | ExprKind::PostFix { child, .. }
            | ExprKind::StructConstructor { child, .. } => swap(child),
            ExprKind::Binary { left, right, .. } => swap(left) || swap(right),
            ExprKind::Index { source, subscript } => swap(source) || swap(subscript),
        }
    }

    /// Render an expression back to source-like text
    pub fn render(&self, id: ExprId) -> String {
        match self.kind(id) {
            ExprKind::Literal(value) => value.to_string(),
            ExprKind::Name(name) => name.clone(),
            ExprKind::InitializerList(elements) => {
                let parts: Vec<_> = elements.iter().map(|&e| self.render(e)).collect();
                format!("{{{}}}", parts.join(", "))
            }
            ExprKind::Unary { op: UnaryOp::Group, child } => format!("({})", self.render(*child)),
            ExprKind::Unary { op: UnaryOp::Ref, child } => format!("@{}", self.render(*child)),
            ExprKind::StructConstructor { target, child } => format!("{}{}", target.name, self.render(*child)),
            ExprKind::Binary { op, left, right } => {
                format!("{} {} {}", self.render(*left), op, self.render(*right))
            }
            ExprKind::PostFix { op, child } => {
                let suffix = match op {
                    PostfixOp::Increment => "++",
                    PostfixOp::Decrement => "--",
                };
                format!("{}{}", self.render(*child), suffix)
            }
            ExprKind::Index { source, subscript } => {
                format!("{}[{}]", self.render(*source), self.render(*subscript))
            }
        }
    }
}
