//! Name resolution and semantic checks over expression trees
//!
//! `resolve` binds names and constructor targets through the scope chain.
//! `check` runs afterwards and validates what resolution cannot: index
//! sources and constructor arguments.

use super::{Ast, ExprId, ExprKind};
use crate::diagnostics::Diagnostics;
use crate::scope::{ScopeId, Session};
use crate::types::Type;
use crate::utils::Error;

impl Ast {
    /// Resolve every name below `id`. Keeps going after a failure so all
    /// undefined names get reported.
    pub fn resolve(&mut self, id: ExprId, scope: ScopeId, session: &Session, log: &mut Diagnostics) -> bool {
        match self.kind(id).clone() {
            ExprKind::Literal(_) => true,
            ExprKind::Name(name) => match session.scope(scope).lookup_value(session, &name) {
                Some(value) => {
                    self.set_type(id, value.ty);
                    true
                }
                None => {
                    log.error(self.loc(id), Error::UndefinedName { name });
                    false
                }
            },
            ExprKind::StructConstructor { target, child } => {
                if !self.resolve(child, scope, session, log) {
                    return false;
                }
                let mut target = target;
                let lookup = session.scope(scope);
                if target.is_unresolved() {
                    if !lookup.has_definition(session, &mut target, log) {
                        log.error(
                            self.loc(id),
                            Error::UndefinedConstructorType { name: target.name.clone() },
                        );
                        return false;
                    }
                    if !lookup.update_type(session, &mut target, log) {
                        return false;
                    }
                }
                if !target.is_struct() {
                    log.error(self.loc(id), Error::NotAStruct { name: target.to_string() });
                    return false;
                }
                if let ExprKind::StructConstructor { target: slot, .. } = &mut self.nodes[id.0].kind {
                    *slot = target.clone();
                }
                self.set_type(id, target);
                true
            }
            _ => {
                let mut ok = true;
                for child in self.children(id) {
                    ok &= self.resolve(child, scope, session, log);
                }
                if ok {
                    self.get_type(id);
                }
                ok
            }
        }
    }

    /// Validate a resolved tree. Siblings are still checked after a
    /// failure, one diagnostic per violation.
    pub fn check(&mut self, id: ExprId, scope: ScopeId, session: &Session, log: &mut Diagnostics) -> bool {
        let mut ok = true;
        for child in self.children(id) {
            ok &= self.check(child, scope, session, log);
        }
        let node_ok = match self.kind(id).clone() {
            ExprKind::Index { source, .. } => {
                let ty = self.type_of(source);
                let indexable = ty.is_indexable();
                if !indexable {
                    log.error(self.loc(id), Error::NotIndexable { ty: ty.to_string() });
                }
                indexable
            }
            ExprKind::StructConstructor { target, child } => {
                self.check_constructor(id, &target, child, session, log)
            }
            _ => true,
        };
        ok && node_ok
    }

    fn check_constructor(
        &self,
        id: ExprId,
        target: &Type,
        child: ExprId,
        session: &Session,
        log: &mut Diagnostics,
    ) -> bool {
        let Some(strukt) = target.struct_id() else {
            log.error(self.loc(id), Error::NotAStruct { name: target.to_string() });
            return false;
        };
        let def = session.strukt(strukt);
        let given = self.num_outputs(child);
        let members = def.declared_member_count();
        if given > members {
            log.error(self.loc(id), Error::TooManyInitializers { given, members });
            return false;
        }
        let mut ok = true;
        for idx in 0..given {
            let (Some(value), Some(member)) = (self.output_type(child, idx), def.member_type_by_index(idx)) else {
                continue;
            };
            if !member.accepts(&value) {
                log.error(
                    self.loc(id),
                    Error::ArgumentTypeMismatch {
                        index: idx,
                        expected: member.to_string(),
                        got: value.to_string(),
                    },
                );
                ok = false;
            }
        }
        ok
    }

    /// Require a compile-time value. Constructors and initializer lists
    /// need every output type const; the first offending argument is
    /// reported.
    pub fn check_const(&self, id: ExprId, log: &mut Diagnostics) -> bool {
        let args = match self.kind(id) {
            ExprKind::StructConstructor { child, .. } => *child,
            ExprKind::InitializerList(_) => id,
            _ => {
                if self.is_const(id) {
                    return true;
                }
                log.error(self.loc(id), Error::NotConstant { op: self.op(id).to_string() });
                return false;
            }
        };

        for idx in 0..self.num_outputs(args) {
            let Some(ty) = self.output_type(args, idx) else {
                continue;
            };
            if !ty.is_const() {
                let loc = self.output_expr(args, idx).map_or(self.loc(id), |expr| self.loc(expr));
                log.error(loc, Error::NonConstInitializer { index: idx, ty: ty.to_string() });
                return false;
            }
        }
        true
    }
}
