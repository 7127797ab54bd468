//! Aggregate (struct) definitions
//!
//! A struct is an ordered list of named members. The insertion order is the
//! layout order and a member's index never changes once assigned.

use std::collections::HashMap;

use super::{AttrNode, GlobalVar, Initializer, ScopeId, Session, StructId};
use crate::diagnostics::Diagnostics;
use crate::types::Type;
use crate::utils::{Error, Location, Result};

/// Name of the reference count member appended on registration
pub const REFERENCE_COUNT: &str = "reference_count";
/// Name of the self reference member appended on registration
pub const PREVIOUS_COPY: &str = "previous_copy";

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub loc: Location,
    pub docstring: String,
    pub is_packed: bool,
    /// Scope members are resolved in
    pub parent_scope: Option<ScopeId>,
    members: Vec<Member>,
    member_index: HashMap<String, usize>,
    /// Bookkeeping members have been appended; no more members may follow
    sealed: bool,
    /// All members resolved and the attribute table emitted
    bound: bool,
}

impl StructDef {
    pub fn new(name: &str, loc: Location) -> Self {
        Self {
            name: name.to_string(),
            loc,
            docstring: String::new(),
            is_packed: false,
            parent_scope: None,
            members: Vec::new(),
            member_index: HashMap::new(),
            sealed: false,
            bound: false,
        }
    }

    /// Append a member and return its index
    pub fn add_member(&mut self, name: &str, ty: Type) -> Result<usize> {
        if self.sealed {
            return Err(Error::SealedStruct {
                strukt: self.name.clone(),
                member: name.to_string(),
            });
        }
        if name == REFERENCE_COUNT || name == PREVIOUS_COPY {
            return Err(Error::ReservedMember {
                strukt: self.name.clone(),
                member: name.to_string(),
            });
        }
        self.push_member(name, ty)
    }

    fn push_member(&mut self, name: &str, ty: Type) -> Result<usize> {
        if self.member_index.contains_key(name) {
            return Err(Error::DuplicateDefinition {
                name: format!("{}.{}", self.name, name),
            });
        }
        let idx = self.members.len();
        self.members.push(Member {
            name: name.to_string(),
            ty,
        });
        self.member_index.insert(name.to_string(), idx);
        Ok(idx)
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.member_index.contains_key(name)
    }

    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.member_index.get(name).copied()
    }

    pub fn member_type(&self, name: &str) -> Option<&Type> {
        self.member_index(name).map(|idx| &self.members[idx].ty)
    }

    pub fn member_type_by_index(&self, idx: usize) -> Option<&Type> {
        self.members.get(idx).map(|m| &m.ty)
    }

    /// All members, bookkeeping included
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Members written by the user, bookkeeping excluded
    pub fn declared_member_count(&self) -> usize {
        if self.sealed {
            self.members.len() - 2
        } else {
            self.members.len()
        }
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn is_packed(&self) -> bool {
        self.is_packed
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Names of other structs this struct refers to
    pub fn struct_dependencies(&self, self_id: StructId) -> Vec<String> {
        self.members
            .iter()
            .filter(|m| m.ty.struct_id().is_some_and(|id| id != self_id))
            .map(|m| m.ty.name.clone())
            .collect()
    }

    /// Append the runtime bookkeeping members. Happens once per struct.
    pub(crate) fn seal(&mut self, self_id: StructId, word: Type) -> Result<bool> {
        if self.sealed {
            return Ok(false);
        }
        let loc = self.loc.clone();
        let name = self.name.clone();
        self.push_member(REFERENCE_COUNT, word)?;
        self.push_member(PREVIOUS_COPY, Type::new_struct_ref(self_id, &name, loc))?;
        self.sealed = true;
        Ok(true)
    }
}

impl Session {
    /// Resolve every unresolved member of one struct, then emit its
    /// attribute table. Stops at the first member that cannot be bound.
    pub fn bind_struct(&mut self, id: StructId, log: &mut Diagnostics) -> bool {
        let def = &self.structs[id.0];
        log.trace(&def.loc, format!("binding members for struct {}", def.name));
        if def.bound {
            return true;
        }
        let Some(scope) = def.parent_scope else {
            log.internal(
                Some(&def.loc),
                Error::NoDefinitionScope { name: def.name.clone() },
            );
            return false;
        };

        for idx in 0..def.members.len() {
            let member = &self.structs[id.0].members[idx];
            if !member.ty.is_unresolved() {
                continue;
            }
            let mut ty = member.ty.clone();
            let member_name = member.name.clone();

            let scope_def = self.scope(scope);
            if !scope_def.has_definition(self, &mut ty, log) {
                let def = &self.structs[id.0];
                let written = &def.members[idx].ty.name;
                let err = if written.contains("::") {
                    Error::UnresolvedScopedMember {
                        strukt: def.name.clone(),
                        member: member_name,
                        ty: written.clone(),
                    }
                } else {
                    Error::UnboundMember {
                        strukt: def.name.clone(),
                        member: member_name,
                        ty: written.clone(),
                    }
                };
                log.error(&def.loc, err);
                return false;
            }
            if !scope_def.update_type(self, &mut ty, log) {
                // update_type has already said why
                return false;
            }
            self.structs[id.0].members[idx].ty = ty;
        }

        if !self.emit_attr_table(id, scope, log) {
            return false;
        }
        self.structs[id.0].bound = true;
        log::debug!("bound struct {}", self.structs[id.0].name);
        true
    }

    /// Register the `<name>_attr_table` global in the owning module
    fn emit_attr_table(&mut self, id: StructId, scope: ScopeId, log: &mut Diagnostics) -> bool {
        let Some(module) = self.owning_module(scope) else {
            let def = &self.structs[id.0];
            log.internal(
                Some(&def.loc),
                Error::NoDefinitionScope { name: def.name.clone() },
            );
            return false;
        };

        let members = self.structs[id.0].members.clone();
        let mut rows = Vec::with_capacity(members.len());
        for member in &members {
            let name = self.find_string_constant(module, &member.name, member.ty.loc.clone());
            rows.push(AttrNode {
                member: member.name.clone(),
                name,
                type_info: member.ty.type_info_name(),
                flags: member.ty.encode_flags(),
            });
        }

        let def = &self.structs[id.0];
        let mut table_ty = Type::new_struct(self.builtins().type_node, "type_node_t", def.loc.clone());
        table_ty.make_bounded_array(rows.len() as i64);
        let global = GlobalVar::new(&format!("{}_attr_table", def.name), table_ty, Initializer::AttrTable(rows));
        let loc = def.loc.clone();
        if let Err(err) = self.add_global(module, global) {
            log.error(&loc, err);
            return false;
        }
        true
    }

    /// The attribute table emitted for a bound struct
    pub fn attr_table(&self, id: StructId) -> Option<&[AttrNode]> {
        let def = &self.structs[id.0];
        let module = self.owning_module(def.parent_scope?)?;
        let global = self.module(module).global(&format!("{}_attr_table", def.name))?;
        match &global.initializer {
            Initializer::AttrTable(rows) => Some(rows),
            _ => None,
        }
    }
}
