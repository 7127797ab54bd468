//! Constant folding over expression trees
//!
//! The solver repeatedly picks the deepest constant branch, folds it down
//! to a literal and splices the literal back into the tree until nothing
//! foldable is left.

use thiserror::Error;

use super::{Ast, BinOp, ExprId, ExprKind, Literal};
use crate::scope::{ScopeId, Session};

/// Largest and smallest values an integer constant may take
const INT_MAX: i128 = u64::MAX as i128;
const INT_MIN: i128 = i64::MIN as i128;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FoldError {
    #[error("The operator '{op}' cannot be applied to the constants {left} and {right}.")]
    Unsupported { op: BinOp, left: String, right: String },

    #[error("Division by zero in a constant expression.")]
    DivisionByZero,

    #[error("The constant expression does not fit in 64 bits.")]
    Overflow,

    #[error("An operand of '{op}' did not fold to a literal value.")]
    NotLiteral { op: BinOp },
}

pub struct ConstantSolver<'a> {
    ast: &'a mut Ast,
    root: ExprId,
}

impl<'a> ConstantSolver<'a> {
    pub fn new(ast: &'a mut Ast, root: ExprId) -> Self {
        Self { ast, root }
    }

    pub fn root(&self) -> ExprId {
        self.root
    }

    pub fn ast(&self) -> &Ast {
        &*self.ast
    }

    /// Fold `id` and return the node standing for its value
    pub fn solve(&mut self, id: ExprId) -> Result<ExprId, FoldError> {
        match self.ast.kind(id).clone() {
            ExprKind::Unary { child, .. } | ExprKind::PostFix { child, .. } => self.solve(child),
            ExprKind::Binary { op, left, right } => {
                let left = self.solve(left)?;
                let right = self.solve(right)?;
                let (Some(lhs), Some(rhs)) = (self.ast.literal_value(left), self.ast.literal_value(right)) else {
                    return Err(FoldError::NotLiteral { op });
                };
                let value = fold_binop(op, lhs, rhs)?;
                let loc = self.ast.loc(id).clone();
                Ok(self.ast.literal(value, loc))
            }
            _ => Ok(id),
        }
    }

    /// The deepest constant operator node not contained in a larger one.
    /// On equal depth the later branch wins.
    pub fn find_const_branch(&self) -> Option<ExprId> {
        self.deepest_branch(self.root, 0).map(|(_, id)| id)
    }

    fn deepest_branch(&self, id: ExprId, depth: usize) -> Option<(usize, ExprId)> {
        let foldable = matches!(
            self.ast.kind(id),
            ExprKind::Unary { .. } | ExprKind::PostFix { .. } | ExprKind::Binary { .. }
        );
        if foldable && self.ast.is_const(id) {
            return Some((depth, id));
        }
        let mut best: Option<(usize, ExprId)> = None;
        for child in self.ast.children(id) {
            if let Some(found) = self.deepest_branch(child, depth + 1) {
                if best.map_or(true, |(d, _)| found.0 >= d) {
                    best = Some(found);
                }
            }
        }
        best
    }

    /// Splice `new` in place of `old`. The root itself is never replaced.
    pub fn replace_branch(&mut self, old: ExprId, new: ExprId) -> bool {
        if old == self.root {
            return false;
        }
        let mut path = Vec::new();
        if !self.path_to(self.root, old, &mut path) {
            return false;
        }
        let Some(&parent) = path.last() else {
            return false;
        };
        if !self.ast.replace_child(parent, old, new) {
            return false;
        }
        for &ancestor in path.iter().rev() {
            self.ast.invalidate_type(ancestor);
        }
        true
    }

    fn path_to(&self, from: ExprId, target: ExprId, path: &mut Vec<ExprId>) -> bool {
        path.push(from);
        for child in self.ast.children(from) {
            if child == target || self.path_to(child, target, path) {
                return true;
            }
        }
        path.pop();
        false
    }

    /// Fold until no constant branch is left and return the (possibly new)
    /// root. A fully constant tree collapses to a single literal.
    pub fn simplify(&mut self) -> Result<ExprId, FoldError> {
        while let Some(branch) = self.find_const_branch() {
            let folded = self.solve(branch)?;
            if branch == self.root {
                self.root = folded;
                break;
            }
            if folded == branch || !self.replace_branch(branch, folded) {
                break;
            }
        }
        Ok(self.root)
    }

    /// Substitute names bound to literal constants with their values.
    /// Returns how many names were replaced.
    pub fn graft(&mut self, scope: ScopeId, session: &Session) -> usize {
        let mut names = Vec::new();
        self.collect_names(self.root, &mut names);

        let lookup = session.scope(scope);
        let mut grafted = 0;
        for (id, name) in names {
            let Some(found) = lookup.lookup_value(session, &name) else {
                continue;
            };
            let Some(value) = found.value else {
                continue;
            };
            let loc = self.ast.loc(id).clone();
            let literal = self.ast.literal(value, loc);
            self.ast.set_type(literal, found.ty);
            if id == self.root {
                self.root = literal;
                grafted += 1;
            } else if self.replace_branch(id, literal) {
                grafted += 1;
            }
        }
        grafted
    }

    fn collect_names(&self, id: ExprId, names: &mut Vec<(ExprId, String)>) {
        if let ExprKind::Name(name) = self.ast.kind(id) {
            names.push((id, name.clone()));
        }
        for child in self.ast.children(id) {
            self.collect_names(child, names);
        }
    }
}

/// Apply a binary operator to two literals
pub fn fold_binop(op: BinOp, left: &Literal, right: &Literal) -> Result<Literal, FoldError> {
    let unsupported = || FoldError::Unsupported {
        op,
        left: left.to_string(),
        right: right.to_string(),
    };
    match (left, right) {
        (Literal::Int(l), Literal::Int(r)) => {
            let (l, r) = (*l, *r);
            let result = match op {
                BinOp::Add => l.checked_add(r).ok_or(FoldError::Overflow)?,
                BinOp::Sub => l.checked_sub(r).ok_or(FoldError::Overflow)?,
                BinOp::Mul => l.checked_mul(r).ok_or(FoldError::Overflow)?,
                BinOp::Div => floor_div(l, r)?,
                BinOp::Mod => floor_mod(l, r)?,
                BinOp::Xor => l ^ r,
                BinOp::And => l & r,
                BinOp::Or => l | r,
                BinOp::Dot => return Err(unsupported()),
            };
            if !(INT_MIN..=INT_MAX).contains(&result) {
                return Err(FoldError::Overflow);
            }
            Ok(Literal::Int(result))
        }
        (Literal::Int(_) | Literal::Float(_), Literal::Int(_) | Literal::Float(_)) => {
            let (Some(l), Some(r)) = (left.as_float(), right.as_float()) else {
                return Err(unsupported());
            };
            let result = match op {
                BinOp::Add => l + r,
                BinOp::Sub => l - r,
                BinOp::Mul => l * r,
                BinOp::Div => {
                    if r == 0.0 {
                        return Err(FoldError::DivisionByZero);
                    }
                    l / r
                }
                BinOp::Mod => {
                    if r == 0.0 {
                        return Err(FoldError::DivisionByZero);
                    }
                    let m = l % r;
                    if m != 0.0 && (m < 0.0) != (r < 0.0) {
                        m + r
                    } else {
                        m
                    }
                }
                _ => return Err(unsupported()),
            };
            Ok(Literal::Float(result))
        }
        (Literal::Str(l), Literal::Str(r)) => match op {
            BinOp::Add => Ok(Literal::Str(format!("{l}{r}"))),
            _ => Err(unsupported()),
        },
        (Literal::Bool(l), Literal::Bool(r)) => {
            let result = match op {
                BinOp::And => *l && *r,
                BinOp::Or => *l || *r,
                BinOp::Xor => *l != *r,
                _ => return Err(unsupported()),
            };
            Ok(Literal::Bool(result))
        }
        _ => Err(unsupported()),
    }
}

/// Integer division rounding toward negative infinity
fn floor_div(l: i128, r: i128) -> Result<i128, FoldError> {
    if r == 0 {
        return Err(FoldError::DivisionByZero);
    }
    let q = l.checked_div(r).ok_or(FoldError::Overflow)?;
    if l % r != 0 && (l < 0) != (r < 0) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

/// Remainder taking the sign of the divisor
fn floor_mod(l: i128, r: i128) -> Result<i128, FoldError> {
    if r == 0 {
        return Err(FoldError::DivisionByZero);
    }
    let m = l % r;
    if m != 0 && (m < 0) != (r < 0) {
        Ok(m + r)
    } else {
        Ok(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Op, UnaryOp};
    use crate::scope::{ConstantDef, Initializer};
    use crate::types::{Type, TypeKind};
    use crate::utils::Location;
    use pretty_assertions::assert_eq;

    fn loc() -> Location {
        Location::dummy()
    }

    fn solved(ast: &mut Ast, root: ExprId) -> Option<Literal> {
        let mut solver = ConstantSolver::new(ast, root);
        let folded = solver.solve(root).ok()?;
        ast.literal_value(folded).cloned()
    }

    #[test]
    fn test_integer_chain_folds_left_to_right() {
        let mut ast = Ast::new();
        let first = ast.int(8, loc());
        let rest: Vec<_> = [(BinOp::Add, 3), (BinOp::Sub, 2), (BinOp::Mul, 10)]
            .into_iter()
            .map(|(op, v)| (op, ast.int(v, loc())))
            .collect();
        let root = ast.fold_chain(first, rest);
        assert_eq!(ast.op(root), Op::Binary(BinOp::Mul));
        assert_eq!(solved(&mut ast, root), Some(Literal::Int(90)));
    }

    #[test]
    fn test_float_chain_folds_left_to_right() {
        let mut ast = Ast::new();
        let first = ast.float(2.5, loc());
        let ten = ast.int(10, loc());
        let half = ast.float(0.5, loc());
        let two = ast.int(2, loc());
        let root = ast.fold_chain(first, [(BinOp::Add, ten), (BinOp::Sub, half), (BinOp::Div, two)]);
        assert_eq!(ast.op(root), Op::Binary(BinOp::Div));
        assert_eq!(solved(&mut ast, root), Some(Literal::Float(6.0)));
    }

    #[test]
    fn test_string_concatenation() {
        let mut ast = Ast::new();
        let the = ast.string("the", loc());
        let space = ast.string(" ", loc());
        let dog = ast.string("dog", loc());
        let root = ast.fold_chain(the, [(BinOp::Add, space), (BinOp::Add, dog)]);
        assert_eq!(solved(&mut ast, root), Some(Literal::Str("the dog".into())));
    }

    #[test]
    fn test_group_folds_to_its_child() {
        let mut ast = Ast::new();
        let a = ast.int(6, loc());
        let b = ast.int(7, loc());
        let product = ast.binary(BinOp::Mul, a, b, loc());
        let group = ast.group(product, loc());
        assert_eq!(solved(&mut ast, group), Some(Literal::Int(42)));
    }

    #[test]
    fn test_fold_errors() {
        let int = |v| Literal::Int(v);
        assert_eq!(fold_binop(BinOp::Div, &int(1), &int(0)), Err(FoldError::DivisionByZero));
        assert_eq!(fold_binop(BinOp::Mod, &Literal::Float(1.0), &int(0)), Err(FoldError::DivisionByZero));
        assert_eq!(fold_binop(BinOp::Add, &int(INT_MAX), &int(1)), Err(FoldError::Overflow));
        assert!(matches!(
            fold_binop(BinOp::Sub, &Literal::Str("a".into()), &Literal::Str("b".into())),
            Err(FoldError::Unsupported { .. })
        ));
        assert!(matches!(
            fold_binop(BinOp::Dot, &int(1), &int(2)),
            Err(FoldError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_integer_division_rounds_down() {
        let int = |v| Literal::Int(v);
        assert_eq!(fold_binop(BinOp::Div, &int(7), &int(2)), Ok(int(3)));
        assert_eq!(fold_binop(BinOp::Div, &int(-7), &int(2)), Ok(int(-4)));
        assert_eq!(fold_binop(BinOp::Mod, &int(-7), &int(2)), Ok(int(1)));
        assert_eq!(fold_binop(BinOp::Xor, &int(6), &int(3)), Ok(int(5)));
        assert_eq!(
            fold_binop(BinOp::Or, &Literal::Bool(false), &Literal::Bool(true)),
            Ok(Literal::Bool(true))
        );
    }

    /// `x + (1 + 2) * (3 + 4)` with `x` a function parameter
    fn mixed_tree(session: &mut Session) -> (Ast, ExprId, ScopeId) {
        let m = session.new_module("m");
        let f = session.new_func("f", loc());
        session.add_inbound_var(f, "x", Type::new("uint32_t", loc())).unwrap();
        session.add_func(m, f).unwrap();
        let scope = ScopeId::Func(f);

        let mut ast = Ast::new();
        let x = ast.name("x", loc());
        let one = ast.int(1, loc());
        let two = ast.int(2, loc());
        let three = ast.int(3, loc());
        let four = ast.int(4, loc());
        let left_sum = ast.binary(BinOp::Add, one, two, loc());
        let left = ast.group(left_sum, loc());
        let right_sum = ast.binary(BinOp::Add, three, four, loc());
        let right = ast.group(right_sum, loc());
        let product = ast.binary(BinOp::Mul, left, right, loc());
        let root = ast.binary(BinOp::Add, x, product, loc());

        let mut log = crate::diagnostics::Diagnostics::new();
        assert!(ast.resolve(root, scope, session, &mut log));
        (ast, root, scope)
    }

    #[test]
    fn test_find_const_branch_skips_leaves_and_root() {
        let mut session = Session::default();
        let (mut ast, root, _) = mixed_tree(&mut session);
        let solver = ConstantSolver::new(&mut ast, root);
        let branch = solver.find_const_branch().unwrap();
        assert_eq!(solver.ast().op(branch), Op::Binary(BinOp::Mul));
        assert_ne!(branch, root);
    }

    #[test]
    fn test_find_const_branch_prefers_deeper_then_later() {
        let mut ast = Ast::new();
        let a = ast.name("a", loc());
        let one = ast.int(1, loc());
        let two = ast.int(2, loc());
        let inner_left = ast.binary(BinOp::Add, one, two, loc());
        let left = ast.binary(BinOp::Add, a, inner_left, loc());
        let three = ast.int(3, loc());
        let four = ast.int(4, loc());
        let right = ast.binary(BinOp::Add, three, four, loc());
        let b = ast.name("b", loc());
        let right_outer = ast.binary(BinOp::Add, b, right, loc());
        let root = ast.binary(BinOp::Add, left, right_outer, loc());

        let solver = ConstantSolver::new(&mut ast, root);
        assert_eq!(solver.find_const_branch(), Some(right));
    }

    #[test]
    fn test_simplify_partially_constant_tree() {
        let mut session = Session::default();
        let (mut ast, root, _) = mixed_tree(&mut session);
        let mut solver = ConstantSolver::new(&mut ast, root);
        let new_root = solver.simplify().unwrap();
        assert_eq!(new_root, root);
        assert_eq!(ast.render(new_root), "x + 21");
        assert_eq!(ast.get_type(new_root).kind, TypeKind::UInt32);
    }

    #[test]
    fn test_simplify_constant_root_returns_new_node() {
        let mut ast = Ast::new();
        let a = ast.int(2, loc());
        let b = ast.int(3, loc());
        let root = ast.binary(BinOp::Mul, a, b, loc());
        let mut solver = ConstantSolver::new(&mut ast, root);
        let folded = solver.simplify().unwrap();
        assert_ne!(folded, root);
        assert_eq!(ast.literal_value(folded), Some(&Literal::Int(6)));
    }

    #[test]
    fn test_replace_branch_never_replaces_root() {
        let mut ast = Ast::new();
        let a = ast.int(2, loc());
        let b = ast.int(3, loc());
        let root = ast.binary(BinOp::Mul, a, b, loc());
        let c = ast.int(9, loc());
        let mut solver = ConstantSolver::new(&mut ast, root);
        assert!(!solver.replace_branch(root, c));
        assert!(solver.replace_branch(a, c));
        assert_eq!(ast.render(root), "9 * 3");
    }

    #[test]
    fn test_graft_substitutes_literal_constants() {
        let mut session = Session::default();
        let m = session.new_module("m");
        session
            .add_constant(m, ConstantDef::new("WIDTH", Type::new("uint16_t", loc()), Initializer::Value(Literal::Int(640))))
            .unwrap();
        session
            .add_constant(m, ConstantDef::new("TITLE", Type::new("string_t", loc()), Initializer::Value(Literal::Str("win".into()))))
            .unwrap();

        let mut ast = Ast::new();
        let width = ast.name("WIDTH", loc());
        let two = ast.int(2, loc());
        let root = ast.binary(BinOp::Div, width, two, loc());
        let title = ast.name("TITLE", loc());
        let wrapped = ast.unary(UnaryOp::Group, title, loc());

        let mut solver = ConstantSolver::new(&mut ast, root);
        assert_eq!(solver.graft(ScopeId::Module(m), &session), 1);
        assert_eq!(solver.simplify().map(|id| solver.ast().literal_value(id).cloned()), Ok(Some(Literal::Int(320))));

        let mut solver = ConstantSolver::new(&mut ast, wrapped);
        assert_eq!(solver.graft(ScopeId::Module(m), &session), 1);
        let folded = solver.simplify().unwrap();
        assert_eq!(ast.literal_value(folded), Some(&Literal::Str("win".into())));
    }
}
