//! Function scope
//!
//! Parameters live in two structs, one for the inbound and one for the
//! outbound direction, so a call frame has the same layout as an aggregate.

use super::{BlockId, FuncId, Scope, ScopeId, Session, StructId, ValueRef};
use crate::types::Type;
use crate::utils::{Error, Location, Result};

#[derive(Debug, Clone)]
pub struct FuncDef {
    pub id: FuncId,
    pub name: String,
    pub loc: Location,
    pub docstring: String,
    pub require: Option<BlockId>,
    pub mainline: Option<BlockId>,
    pub ensure: Option<BlockId>,
    pub inbound: StructId,
    pub outbound: StructId,
    pub parent_scope: Option<ScopeId>,
}

impl FuncDef {
    pub fn new(id: FuncId, name: &str, loc: Location, inbound: StructId, outbound: StructId) -> Self {
        Self {
            id,
            name: name.to_string(),
            loc,
            docstring: String::new(),
            require: None,
            mainline: None,
            ensure: None,
            inbound,
            outbound,
            parent_scope: None,
        }
    }

    pub fn inbound_signature(name: &str) -> String {
        format!("__{name}_inbound")
    }

    pub fn outbound_signature(name: &str) -> String {
        format!("__{name}_outbound")
    }

    /// Attached blocks: require, mainline, ensure
    pub fn blocks(&self) -> Vec<BlockId> {
        [self.require, self.mainline, self.ensure].into_iter().flatten().collect()
    }

    fn parameter(&self, session: &Session, name: &str) -> Option<Type> {
        [self.inbound, self.outbound].into_iter().find_map(|id| {
            let params = session.strukt(id);
            params
                .member_index(name)
                .filter(|&idx| idx < params.declared_member_count())
                .and_then(|idx| params.member_type_by_index(idx).cloned())
        })
    }
}

impl Scope for FuncDef {
    fn id(&self) -> ScopeId {
        ScopeId::Func(self.id)
    }

    fn parent(&self) -> Option<ScopeId> {
        self.parent_scope
    }

    fn has_local(&self, session: &Session, name: &str) -> bool {
        self.parameter(session, name).is_some()
    }

    fn local_value(&self, session: &Session, name: &str) -> Option<ValueRef> {
        self.parameter(session, name).map(|ty| ValueRef { ty, value: None })
    }
}

impl Session {
    pub fn add_inbound_var(&mut self, func: FuncId, name: &str, ty: Type) -> Result<usize> {
        let params = self.funcs[func.0].inbound;
        self.add_parameter(func, params, name, ty)
    }

    pub fn add_outbound_var(&mut self, func: FuncId, name: &str, ty: Type) -> Result<usize> {
        let params = self.funcs[func.0].outbound;
        self.add_parameter(func, params, name, ty)
    }

    fn add_parameter(&mut self, func: FuncId, params: StructId, name: &str, ty: Type) -> Result<usize> {
        if self.has_parm(func, name) {
            return Err(Error::DuplicateParameter {
                func: self.funcs[func.0].name.clone(),
                name: name.to_string(),
            });
        }
        self.structs[params.0].add_member(name, ty)
    }

    /// Is `name` an inbound or outbound parameter?
    pub fn has_parm(&self, func: FuncId, name: &str) -> bool {
        let def = &self.funcs[func.0];
        self.structs[def.inbound.0].has_member(name) || self.structs[def.outbound.0].has_member(name)
    }

    pub fn set_require_block(&mut self, func: FuncId, block: BlockId) {
        self.attach_block(func, block);
        self.funcs[func.0].require = Some(block);
    }

    pub fn set_mainline_block(&mut self, func: FuncId, block: BlockId) {
        self.attach_block(func, block);
        self.funcs[func.0].mainline = Some(block);
    }

    pub fn set_ensure_block(&mut self, func: FuncId, block: BlockId) {
        self.attach_block(func, block);
        self.funcs[func.0].ensure = Some(block);
    }

    fn attach_block(&mut self, func: FuncId, block: BlockId) {
        self.blocks[block.0].parent_scope = Some(ScopeId::Func(func));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeKind;

    fn loc() -> Location {
        Location::dummy()
    }

    #[test]
    fn test_parameter_structs_are_named_after_function() {
        let mut session = Session::default();
        let f = session.new_func("area", loc());
        let def = session.func(f);
        assert_eq!(session.strukt(def.inbound).name, "__area_inbound");
        assert_eq!(session.strukt(def.outbound).name, "__area_outbound");
    }

    #[test]
    fn test_parameter_name_is_unique_across_directions() {
        let mut session = Session::default();
        let f = session.new_func("area", loc());
        session.add_inbound_var(f, "w", Type::new("float32_t", loc())).unwrap();
        assert!(matches!(
            session.add_outbound_var(f, "w", Type::new("float32_t", loc())),
            Err(Error::DuplicateParameter { .. })
        ));
        assert_eq!(session.add_outbound_var(f, "result", Type::new("float32_t", loc())).unwrap(), 0);
        assert!(session.has_parm(f, "result"));
    }

    #[test]
    fn test_bookkeeping_members_are_not_parameters() {
        let mut session = Session::default();
        let m = session.new_module("m");
        let f = session.new_func("area", loc());
        session.add_inbound_var(f, "w", Type::new("float32_t", loc())).unwrap();
        session.add_func(m, f).unwrap();

        let scope = session.scope(ScopeId::Func(f));
        assert!(scope.has_local(&session, "w"));
        assert!(!scope.has_local(&session, "reference_count"));
        assert_eq!(scope.local_value(&session, "w").unwrap().ty.kind, TypeKind::Float32);
    }

    #[test]
    fn test_blocks_listed_in_execution_order() {
        let mut session = Session::default();
        let f = session.new_func("f", loc());
        let main = session.new_block(loc(), Some("main"));
        let pre = session.new_block(loc(), Some("pre"));
        session.set_mainline_block(f, main);
        session.set_require_block(f, pre);
        assert_eq!(session.func(f).blocks(), vec![pre, main]);
        assert_eq!(session.block(main).parent_scope, Some(ScopeId::Func(f)));
    }
}
