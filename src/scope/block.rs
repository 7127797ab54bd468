//! Block scope
//!
//! A block's variables are stored as an anonymous struct so the block frame
//! can be laid out like any other aggregate.

use std::collections::HashMap;

use super::{BlockId, Scope, ScopeId, Session, StructId, ValueRef};
use crate::diagnostics::Diagnostics;
use crate::expr::{Ast, ConstantSolver, ExprId};
use crate::types::Type;
use crate::utils::{Error, Location, Result};

#[derive(Debug, Clone)]
pub struct BlockDef {
    pub id: BlockId,
    pub name: String,
    pub loc: Location,
    pub docstring: String,
    /// Struct holding the block variables
    pub vars: StructId,
    /// Variable name -> initializer expression
    pub init: HashMap<String, ExprId>,
    pub parent_scope: Option<ScopeId>,
}

impl BlockDef {
    pub fn new(id: BlockId, name: &str, loc: Location, vars: StructId) -> Self {
        Self {
            id,
            name: name.to_string(),
            loc,
            docstring: String::new(),
            vars,
            init: HashMap::new(),
            parent_scope: None,
        }
    }

    fn variable(&self, session: &Session, name: &str) -> Option<Type> {
        let vars = session.strukt(self.vars);
        vars.member_index(name)
            .filter(|&idx| idx < vars.declared_member_count())
            .and_then(|idx| vars.member_type_by_index(idx).cloned())
    }
}

impl Scope for BlockDef {
    fn id(&self) -> ScopeId {
        ScopeId::Block(self.id)
    }

    fn parent(&self) -> Option<ScopeId> {
        self.parent_scope
    }

    fn has_local(&self, session: &Session, name: &str) -> bool {
        self.variable(session, name).is_some()
    }

    fn local_value(&self, session: &Session, name: &str) -> Option<ValueRef> {
        self.variable(session, name).map(|ty| ValueRef { ty, value: None })
    }
}

impl Session {
    /// Declare a block variable and return its slot
    pub fn add_local(&mut self, block: BlockId, name: &str, ty: Type) -> Result<usize> {
        let vars = self.blocks[block.0].vars;
        self.structs[vars.0].add_member(name, ty)
    }

    pub fn set_initializer(&mut self, block: BlockId, name: &str, expr: ExprId) -> Result<()> {
        let def = &self.blocks[block.0];
        if !self.structs[def.vars.0].has_member(name) {
            return Err(Error::UndefinedName { name: name.to_string() });
        }
        self.blocks[block.0].init.insert(name.to_string(), expr);
        Ok(())
    }

    /// Fold every constant initializer of a block in place.
    ///
    /// Names bound to literal constants are grafted in first so they can
    /// take part in folding. Returns false if any initializer failed.
    pub fn simplify_block(&mut self, block: BlockId, ast: &mut Ast, log: &mut Diagnostics) -> bool {
        let vars = self.blocks[block.0].vars;
        let mut inits: Vec<(String, ExprId)> = self.blocks[block.0]
            .init
            .iter()
            .map(|(name, &expr)| (name.clone(), expr))
            .collect();
        // Slot order keeps diagnostics stable
        inits.sort_by_key(|(name, _)| self.structs[vars.0].member_index(name));

        let mut ok = true;
        for (name, init) in inits {
            let mut solver = ConstantSolver::new(ast, init);
            let grafted = solver.graft(ScopeId::Block(block), self);
            let root = solver.root();
            if !solver.ast().is_const(root) {
                continue;
            }
            match solver.simplify() {
                Ok(folded) => {
                    log::debug!("folded initializer of {} ({} names grafted)", name, grafted);
                    self.blocks[block.0].init.insert(name, folded);
                }
                Err(err) => {
                    let loc = ast.loc(root).clone();
                    log.error(&loc, err);
                    ok = false;
                }
            }
        }
        ok
    }
}
