//! Scope chain and definition arenas
//!
//! Every definition (module, struct, function, block, object) lives in a
//! [`Session`] arena and is addressed by a small copyable id. Back references
//! such as a block's parent are plain ids, never owning pointers.
//!
//! Lookup goes through the [`Scope`] trait, implemented by the three scope
//! kinds: [`ModuleDef`], [`FuncDef`] and [`BlockDef`].

mod aggregate;
mod block;
mod func;
mod module;
mod symbols;

pub use aggregate::{Member, StructDef};
pub use block::BlockDef;
pub use func::FuncDef;
pub use module::ModuleDef;
pub use symbols::{AttrNode, ConstantDef, GlobalVar, Initializer, ObjectDef};

use crate::config::TargetConfig;
use crate::diagnostics::Diagnostics;
use crate::expr::Literal;
use crate::stdlib::builtins::Builtins;
use crate::types::Type;
use crate::utils::{Error, Location};

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) usize);

        impl $name {
            pub fn index(self) -> usize {
                self.0
            }
        }
    };
}

arena_id!(
    /// Handle of a module in the session
    ModuleId
);
arena_id!(
    /// Handle of a struct definition in the session
    StructId
);
arena_id!(
    /// Handle of a function definition in the session
    FuncId
);
arena_id!(
    /// Handle of a block in the session
    BlockId
);
arena_id!(
    /// Handle of an object definition in the session
    ObjectId
);

/// Any scope that names can be resolved in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeId {
    Module(ModuleId),
    Func(FuncId),
    Block(BlockId),
}

/// What a value name resolves to
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRef {
    pub ty: Type,
    /// Known compile-time value, for literal constants
    pub value: Option<Literal>,
}

/// Symbol lookup capability shared by modules, functions and blocks.
///
/// Only modules own type definitions, so the default `has_definition` and
/// `update_type` simply delegate to the parent scope.
pub trait Scope {
    fn id(&self) -> ScopeId;

    fn parent(&self) -> Option<ScopeId>;

    /// Is `name` a value declared directly in this scope?
    fn has_local(&self, session: &Session, name: &str) -> bool;

    fn local_value(&self, session: &Session, name: &str) -> Option<ValueRef>;

    /// Is `name` visible from this scope? The nearest enclosing scope wins.
    fn has_member(&self, session: &Session, name: &str) -> bool {
        if self.has_local(session, name) {
            return true;
        }
        match self.parent() {
            Some(parent) => session.scope(parent).has_member(session, name),
            None => false,
        }
    }

    fn lookup_value(&self, session: &Session, name: &str) -> Option<ValueRef> {
        if let Some(value) = self.local_value(session, name) {
            return Some(value);
        }
        self.parent()
            .and_then(|parent| session.scope(parent).lookup_value(session, name))
    }

    /// Does a definition for the (possibly qualified) type name exist?
    fn has_definition(&self, session: &Session, ty: &mut Type, log: &mut Diagnostics) -> bool {
        if !ty.is_unresolved() {
            return true;
        }
        match self.parent() {
            Some(parent) => session.scope(parent).has_definition(session, ty, log),
            None => false,
        }
    }

    /// Bind an unresolved type to its definition, in place
    fn update_type(&self, session: &Session, ty: &mut Type, log: &mut Diagnostics) -> bool {
        if !ty.is_unresolved() {
            return true;
        }
        match self.parent() {
            Some(parent) => session.scope(parent).update_type(session, ty, log),
            None => {
                log.error(&ty.loc, Error::NoDefinitionScope { name: ty.name.clone() });
                false
            }
        }
    }
}

/// All definitions of one compilation session
#[derive(Debug)]
pub struct Session {
    target: TargetConfig,
    builtins: Builtins,
    pub(crate) modules: Vec<ModuleDef>,
    pub(crate) structs: Vec<StructDef>,
    pub(crate) funcs: Vec<FuncDef>,
    pub(crate) blocks: Vec<BlockDef>,
    pub(crate) objects: Vec<ObjectDef>,
}

impl Session {
    pub fn new(target: TargetConfig) -> Self {
        let mut structs = Vec::new();
        let builtins = Builtins::create(&mut structs, &target);
        Self {
            target,
            builtins,
            modules: Vec::new(),
            structs,
            funcs: Vec::new(),
            blocks: Vec::new(),
            objects: Vec::new(),
        }
    }

    pub fn target(&self) -> &TargetConfig {
        &self.target
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    // ==================== Arena Allocation ====================

    pub fn new_module(&mut self, name: &str) -> ModuleId {
        let id = ModuleId(self.modules.len());
        self.modules.push(ModuleDef::new(id, name));
        id
    }

    pub fn new_struct(&mut self, name: &str, loc: Location) -> StructId {
        let id = StructId(self.structs.len());
        self.structs.push(StructDef::new(name, loc));
        id
    }

    /// Create a function together with its inbound and outbound structs
    pub fn new_func(&mut self, name: &str, loc: Location) -> FuncId {
        let inbound = self.new_struct(&FuncDef::inbound_signature(name), loc.clone());
        let outbound = self.new_struct(&FuncDef::outbound_signature(name), loc.clone());
        let id = FuncId(self.funcs.len());
        self.funcs.push(FuncDef::new(id, name, loc, inbound, outbound));
        id
    }

    /// Create a block; unnamed blocks are named after their location
    pub fn new_block(&mut self, loc: Location, name: Option<&str>) -> BlockId {
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("__block_{}_{}", loc.line, loc.column));
        let vars = self.new_struct(&name, loc.clone());
        let id = BlockId(self.blocks.len());
        self.blocks.push(BlockDef::new(id, &name, loc, vars));
        self.structs[vars.0].parent_scope = Some(ScopeId::Block(id));
        id
    }

    pub fn new_object(&mut self, name: &str, loc: Location) -> ObjectId {
        let id = ObjectId(self.objects.len());
        self.objects.push(ObjectDef::new(name, loc));
        id
    }

    // ==================== Accessors ====================

    pub fn module(&self, id: ModuleId) -> &ModuleDef {
        &self.modules[id.0]
    }

    pub fn module_mut(&mut self, id: ModuleId) -> &mut ModuleDef {
        &mut self.modules[id.0]
    }

    pub fn strukt(&self, id: StructId) -> &StructDef {
        &self.structs[id.0]
    }

    pub fn struct_mut(&mut self, id: StructId) -> &mut StructDef {
        &mut self.structs[id.0]
    }

    pub fn func(&self, id: FuncId) -> &FuncDef {
        &self.funcs[id.0]
    }

    pub fn func_mut(&mut self, id: FuncId) -> &mut FuncDef {
        &mut self.funcs[id.0]
    }

    pub fn block(&self, id: BlockId) -> &BlockDef {
        &self.blocks[id.0]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BlockDef {
        &mut self.blocks[id.0]
    }

    pub fn object(&self, id: ObjectId) -> &ObjectDef {
        &self.objects[id.0]
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleDef> {
        self.modules.iter()
    }

    /// Dispatch a scope id to its definition
    pub fn scope(&self, id: ScopeId) -> &dyn Scope {
        match id {
            ScopeId::Module(m) => &self.modules[m.0],
            ScopeId::Func(f) => &self.funcs[f.0],
            ScopeId::Block(b) => &self.blocks[b.0],
        }
    }

    /// Walk parents until a module is reached
    pub fn owning_module(&self, scope: ScopeId) -> Option<ModuleId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let ScopeId::Module(m) = id {
                return Some(m);
            }
            current = self.scope(id).parent();
        }
        None
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(TargetConfig::default())
    }
}
