//! Module scope
//!
//! A module is the only scope that owns type definitions. It also owns the
//! string table shared by every string constant defined in it.

use std::collections::HashMap;

use super::{
    ConstantDef, FuncId, GlobalVar, Initializer, ModuleId, ObjectId, Scope, ScopeId, Session, StructId,
    ValueRef,
};
use crate::diagnostics::{Diagnostics, Severity};
use crate::expr::Literal;
use crate::types::{Type, TypeKind};
use crate::utils::{Error, Location, Result};

/// Separator between module names in a qualified type name
pub const SCOPE_SEPARATOR: &str = "::";

#[derive(Debug, Clone)]
pub struct ModuleDef {
    pub id: ModuleId,
    pub name: String,
    pub docstring: String,
    pub loc: Location,
    imports: HashMap<String, ModuleId>,
    structs: HashMap<String, StructId>,
    struct_order: Vec<StructId>,
    objects: HashMap<String, ObjectId>,
    funcs: HashMap<String, FuncId>,
    func_order: Vec<FuncId>,
    constants: HashMap<String, ConstantDef>,
    constant_order: Vec<String>,
    globals: HashMap<String, GlobalVar>,
    global_order: Vec<String>,
    string_table: Vec<String>,
    string_index: HashMap<String, usize>,
    /// String text -> name of the constant holding it
    string_constants: HashMap<String, String>,
    unnamed_constants: usize,
}

impl ModuleDef {
    pub fn new(id: ModuleId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            docstring: String::new(),
            loc: Location::builtin(),
            imports: HashMap::new(),
            structs: HashMap::new(),
            struct_order: Vec::new(),
            objects: HashMap::new(),
            funcs: HashMap::new(),
            func_order: Vec::new(),
            constants: HashMap::new(),
            constant_order: Vec::new(),
            globals: HashMap::new(),
            global_order: Vec::new(),
            string_table: Vec::new(),
            string_index: HashMap::new(),
            string_constants: HashMap::new(),
            unnamed_constants: 0,
        }
    }

    pub fn import(&self, name: &str) -> Option<ModuleId> {
        self.imports.get(name).copied()
    }

    pub fn struct_id(&self, name: &str) -> Option<StructId> {
        self.structs.get(name).copied()
    }

    /// Registered structs in registration order
    pub fn struct_order(&self) -> &[StructId] {
        &self.struct_order
    }

    pub fn object_id(&self, name: &str) -> Option<ObjectId> {
        self.objects.get(name).copied()
    }

    pub fn func_id(&self, name: &str) -> Option<FuncId> {
        self.funcs.get(name).copied()
    }

    pub fn func_order(&self) -> &[FuncId] {
        &self.func_order
    }

    pub fn has_constant(&self, name: &str) -> bool {
        self.constants.contains_key(name)
    }

    pub fn constant(&self, name: &str) -> Option<&ConstantDef> {
        self.constants.get(name)
    }

    /// Constants in the order they were added
    pub fn constants(&self) -> impl Iterator<Item = &ConstantDef> {
        self.constant_order.iter().filter_map(|name| self.constants.get(name))
    }

    pub fn has_global(&self, name: &str) -> bool {
        self.globals.contains_key(name)
    }

    pub fn global(&self, name: &str) -> Option<&GlobalVar> {
        self.globals.get(name)
    }

    pub fn globals(&self) -> impl Iterator<Item = &GlobalVar> {
        self.global_order.iter().filter_map(|name| self.globals.get(name))
    }

    /// Intern a string and return its index in the string table
    pub fn add_raw_string_constant(&mut self, text: &str) -> usize {
        if let Some(&idx) = self.string_index.get(text) {
            return idx;
        }
        let idx = self.string_table.len();
        self.string_table.push(text.to_string());
        self.string_index.insert(text.to_string(), idx);
        idx
    }

    pub fn get_string(&self, idx: usize) -> Option<&str> {
        self.string_table.get(idx).map(String::as_str)
    }

    pub fn string_table(&self) -> &[String] {
        &self.string_table
    }

    /// Name of the constant already holding `text`, if any
    pub fn string_constant(&self, text: &str) -> Option<&str> {
        self.string_constants.get(text).map(String::as_str)
    }

    fn defines(&self, name: &str) -> bool {
        self.structs.contains_key(name)
            || self.objects.contains_key(name)
            || self.funcs.contains_key(name)
            || self.constants.contains_key(name)
            || self.globals.contains_key(name)
    }

    fn next_unnamed(&mut self) -> String {
        loop {
            let name = format!("__CO{}", self.unnamed_constants);
            self.unnamed_constants += 1;
            if !self.constants.contains_key(&name) {
                return name;
            }
        }
    }
}

impl Scope for ModuleDef {
    fn id(&self) -> ScopeId {
        ScopeId::Module(self.id)
    }

    fn parent(&self) -> Option<ScopeId> {
        None
    }

    fn has_local(&self, _session: &Session, name: &str) -> bool {
        self.has_global(name) || self.has_constant(name)
    }

    fn local_value(&self, _session: &Session, name: &str) -> Option<ValueRef> {
        if let Some(constant) = self.constants.get(name) {
            let value = match &constant.initializer {
                Initializer::Value(lit) => Some(lit.clone()),
                Initializer::StringIndex(idx) => self.get_string(*idx).map(|s| Literal::Str(s.to_string())),
                _ => None,
            };
            return Some(ValueRef {
                ty: constant.ty.clone(),
                value,
            });
        }
        self.globals.get(name).map(|global| ValueRef {
            ty: global.ty.clone(),
            value: None,
        })
    }

    /// Qualified names (`a::b::T`) are walked through the import maps, one
    /// module per segment. On success the type is stamped with the module
    /// that owns the definition and renamed to the bare definition name.
    fn has_definition(&self, session: &Session, ty: &mut Type, log: &mut Diagnostics) -> bool {
        if !ty.is_unresolved() {
            return true;
        }
        let mut segments: Vec<&str> = ty.name.split(SCOPE_SEPARATOR).collect();
        let Some(last) = segments.pop() else {
            return false;
        };

        let mut module = self;
        for segment in segments {
            match module.import(segment) {
                Some(next) => module = session.module(next),
                None => {
                    log.error(
                        &ty.loc,
                        Error::MissingImport {
                            type_name: ty.name.clone(),
                            module: segment.to_string(),
                        },
                    );
                    return false;
                }
            }
        }

        if !module.defines(last) {
            return false;
        }
        ty.definition_scope = Some(module.id);
        ty.name = last.to_string();
        true
    }

    fn update_type(&self, session: &Session, ty: &mut Type, log: &mut Diagnostics) -> bool {
        if !ty.is_unresolved() {
            return true;
        }
        let Some(scope) = ty.definition_scope else {
            log.error(&ty.loc, Error::NoDefinitionScope { name: ty.name.clone() });
            return false;
        };
        if scope != self.id {
            return session.module(scope).update_type(session, ty, log);
        }

        if let Some(id) = self.struct_id(&ty.name) {
            ty.make_struct(id);
        } else if let Some(id) = self.object_id(&ty.name) {
            ty.make_object(id);
        } else if let Some(id) = self.func_id(&ty.name) {
            ty.make_func_ref(id);
        } else if let Some(constant) = self.constants.get(&ty.name) {
            if !adopt_declared(ty, &constant.ty, log) {
                return false;
            }
            ty.make_const();
        } else if let Some(global) = self.globals.get(&ty.name) {
            if !adopt_declared(ty, &global.ty, log) {
                return false;
            }
        } else {
            log.error(&ty.loc, Error::DefinitionNotFound { name: ty.name.clone() });
            return false;
        }
        true
    }
}

/// Take over the shape of a named symbol's declared type
fn adopt_declared(ty: &mut Type, declared: &Type, log: &mut Diagnostics) -> bool {
    if declared.is_unresolved() {
        log.internal(
            Some(&ty.loc),
            Error::UnclassifiableDefinition { name: ty.name.clone() },
        );
        return false;
    }
    ty.kind = declared.kind;
    ty.elem_count = declared.elem_count;
    ty.is_read_only = declared.is_read_only;
    true
}

impl Session {
    pub fn add_import(&mut self, module: ModuleId, imported: ModuleId) -> Result<()> {
        let name = self.modules[imported.0].name.clone();
        let def = &mut self.modules[module.0];
        if def.imports.contains_key(&name) {
            return Err(Error::DuplicateDefinition { name });
        }
        def.imports.insert(name, imported);
        Ok(())
    }

    pub fn add_struct(&mut self, module: ModuleId, id: StructId) -> Result<()> {
        let name = self.structs[id.0].name.clone();
        let def = &mut self.modules[module.0];
        if def.structs.contains_key(&name) {
            return Err(Error::DuplicateDefinition { name });
        }
        def.structs.insert(name, id);
        def.struct_order.push(id);
        // A struct shared by several modules stays owned by the first one,
        // which also receives its attribute table
        let owner = &mut self.structs[id.0].parent_scope;
        if owner.is_none() {
            *owner = Some(ScopeId::Module(module));
        }
        self.on_struct_added(module, id)
    }

    /// Append the bookkeeping members once, then emit the type-info
    /// constant and global into `module` unless it already has them.
    pub(crate) fn on_struct_added(&mut self, module: ModuleId, id: StructId) -> Result<()> {
        let loc = self.structs[id.0].loc.clone();
        let word = self.target().word_type(loc.clone());
        self.structs[id.0].seal(id, word)?;

        let name = self.structs[id.0].name.clone();
        let info_name = format!("{name}_type");
        if self.modules[module.0].has_global(&info_name) {
            return Ok(());
        }
        let type_name = format!("{name}_type_name");
        let string_ty = Type::new_struct(self.builtins().string, "string_t", loc.clone());
        self.add_constant(
            module,
            ConstantDef::new(&type_name, string_ty, Initializer::Value(Literal::Str(name))),
        )?;

        let info_ty = Type::new_struct(self.builtins().type_info, "type_t", loc);
        let info = Initializer::TypeInfo {
            name: type_name,
            type_id: TypeKind::Struct(id).type_id(),
        };
        self.add_global(module, GlobalVar::new(&info_name, info_ty, info))
    }

    pub fn add_object(&mut self, module: ModuleId, id: ObjectId) -> Result<()> {
        let name = self.objects[id.0].name.clone();
        let def = &mut self.modules[module.0];
        if def.objects.contains_key(&name) {
            return Err(Error::DuplicateDefinition { name });
        }
        def.objects.insert(name, id);
        self.objects[id.0].parent_scope = Some(ScopeId::Module(module));
        Ok(())
    }

    /// Register a function, its parameter structs and its block variables
    pub fn add_func(&mut self, module: ModuleId, id: FuncId) -> Result<()> {
        let name = self.funcs[id.0].name.clone();
        let def = &mut self.modules[module.0];
        if def.funcs.contains_key(&name) {
            return Err(Error::DuplicateDefinition { name });
        }
        def.funcs.insert(name, id);
        def.func_order.push(id);
        self.funcs[id.0].parent_scope = Some(ScopeId::Module(module));

        let (inbound, outbound) = (self.funcs[id.0].inbound, self.funcs[id.0].outbound);
        self.add_struct(module, inbound)?;
        self.add_struct(module, outbound)?;
        for block in self.funcs[id.0].blocks() {
            let vars = self.blocks[block.0].vars;
            self.on_struct_added(module, vars)?;
        }
        Ok(())
    }

    /// Add a constant and return the name it is known by.
    ///
    /// Unnamed constants are named `__CO<n>`. String values move into the
    /// module string table and the constant keeps only the index.
    pub fn add_constant(&mut self, module: ModuleId, constant: ConstantDef) -> Result<String> {
        if !constant.name.is_empty() && self.modules[module.0].has_constant(&constant.name) {
            return Err(Error::DuplicateDefinition { name: constant.name });
        }
        Ok(self.install_constant(module, constant))
    }

    fn install_constant(&mut self, module: ModuleId, mut constant: ConstantDef) -> String {
        if constant.ty.is_string() && !constant.ty.is_struct() {
            let loc = constant.ty.loc.clone();
            constant.ty = Type::new_struct(self.builtins().string, "string_t", loc).constant();
        }

        let def = &mut self.modules[module.0];
        if constant.name.is_empty() {
            constant.name = def.next_unnamed();
        }
        if constant.ty.is_string() {
            if let Initializer::Value(Literal::Str(text)) = &constant.initializer {
                let text = text.clone();
                let idx = def.add_raw_string_constant(&text);
                def.string_constants.entry(text).or_insert_with(|| constant.name.clone());
                constant.initializer = Initializer::StringIndex(idx);
            }
        }

        let name = constant.name.clone();
        constant.parent_scope = Some(ScopeId::Module(module));
        def.constant_order.push(name.clone());
        def.constants.insert(name.clone(), constant);
        name
    }

    pub fn add_global(&mut self, module: ModuleId, mut global: GlobalVar) -> Result<()> {
        let def = &mut self.modules[module.0];
        if def.globals.contains_key(&global.name) {
            return Err(Error::DuplicateDefinition { name: global.name });
        }
        global.parent_scope = Some(ScopeId::Module(module));
        def.global_order.push(global.name.clone());
        def.globals.insert(global.name.clone(), global);
        Ok(())
    }

    /// Name of the string constant holding `text`, creating it if needed
    pub fn find_string_constant(&mut self, module: ModuleId, text: &str, loc: Location) -> String {
        if let Some(name) = self.modules[module.0].string_constant(text) {
            return name.to_string();
        }
        let ty = Type::new_struct(self.builtins().string, "string_t", loc);
        self.install_constant(
            module,
            ConstantDef::anonymous(ty, Initializer::Value(Literal::Str(text.to_string()))),
        )
    }

    /// Bind every struct of a module, then the variables of every function
    /// block. A struct that fails to bind does not stop the others, but any
    /// internal error ends the pass.
    pub fn bind_members(&mut self, module: ModuleId, log: &mut Diagnostics) -> bool {
        let mut pending: Vec<StructId> = self.modules[module.0].struct_order.clone();
        for &func in &self.modules[module.0].func_order {
            for block in self.funcs[func.0].blocks() {
                pending.push(self.blocks[block.0].vars);
            }
        }

        let internal_before = log.count(Severity::Internal);
        let mut ok = true;
        for id in pending {
            if !self.bind_struct(id, log) {
                ok = false;
            }
            if log.count(Severity::Internal) > internal_before {
                return false;
            }
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn loc() -> Location {
        Location::dummy()
    }

    fn quiet_log() -> Diagnostics {
        Diagnostics::new().with_ignore_level(Some(Severity::Trace))
    }

    fn resolve(session: &Session, module: ModuleId, ty: &mut Type, log: &mut Diagnostics) -> bool {
        let scope = session.module(module);
        scope.has_definition(session, ty, log) && scope.update_type(session, ty, log)
    }

    #[test]
    fn test_qualified_name_through_import() {
        let mut session = Session::default();
        let m1 = session.new_module("test_module_1");
        let m2 = session.new_module("test_module_2");
        let st = session.new_struct("test_struct_type_1", loc());
        session.add_struct(m2, st).unwrap();
        session.add_import(m1, m2).unwrap();

        let mut log = quiet_log();
        let mut ty = Type::new("test_module_2::test_struct_type_1", loc());
        assert!(resolve(&session, m1, &mut ty, &mut log));
        assert_eq!(ty.struct_id(), Some(st));
        assert_eq!(ty.definition_scope, Some(m2));
        assert_eq!(ty.name, "test_struct_type_1");
    }

    #[test]
    fn test_qualified_name_without_import() {
        let mut session = Session::default();
        let m1 = session.new_module("test_module_1");
        let m2 = session.new_module("test_module_2");
        let st = session.new_struct("test_struct_type_1", loc());
        session.add_struct(m2, st).unwrap();

        let mut log = quiet_log();
        let mut ty = Type::new("test_module_2::test_struct_type_1", loc());
        assert!(!session.module(m1).has_definition(&session, &mut ty, &mut log));
        assert!(ty.is_unresolved());
        assert_eq!(log.errors(), 1);
        assert!(log.messages()[0].message.contains("not imported"));
    }

    #[test]
    fn test_update_without_lookup_reports_missing_scope() {
        let mut session = Session::default();
        let m = session.new_module("m");
        let st = session.new_struct("S", loc());
        session.add_struct(m, st).unwrap();

        let mut log = quiet_log();
        let mut ty = Type::new("S", loc());
        assert!(!session.module(m).update_type(&session, &mut ty, &mut log));
        assert_eq!(log.errors(), 1);
    }

    #[test]
    fn test_update_type_is_idempotent() {
        let mut session = Session::default();
        let m = session.new_module("m");
        let st = session.new_struct("S", loc());
        session.add_struct(m, st).unwrap();

        let mut log = quiet_log();
        let mut ty = Type::new("S", loc());
        assert!(resolve(&session, m, &mut ty, &mut log));
        let first = ty.clone();
        assert!(session.module(m).update_type(&session, &mut ty, &mut log));
        assert_eq!(ty, first);
        assert_eq!(log.errors(), 0);
    }

    #[test]
    fn test_struct_wins_over_same_named_constant() {
        let mut session = Session::default();
        let m = session.new_module("m");
        let st = session.new_struct("Thing", loc());
        session.add_struct(m, st).unwrap();
        session
            .add_constant(m, ConstantDef::new("Thing", Type::new("uint8_t", loc()), Initializer::Value(Literal::Int(1))))
            .unwrap();

        let mut log = quiet_log();
        let mut ty = Type::new("Thing", loc());
        assert!(resolve(&session, m, &mut ty, &mut log));
        assert_eq!(ty.kind, TypeKind::Struct(st));
    }

    #[test]
    fn test_constant_name_takes_declared_type() {
        let mut session = Session::default();
        let m = session.new_module("m");
        let mut declared = Type::new("uint16_t", loc());
        declared.make_bounded_array(3);
        session
            .add_constant(m, ConstantDef::new("TABLE", declared, Initializer::None))
            .unwrap();

        let mut log = quiet_log();
        let mut ty = Type::new("TABLE", loc());
        assert!(resolve(&session, m, &mut ty, &mut log));
        assert_eq!(ty.kind, TypeKind::UInt16);
        assert_eq!(ty.elem_count, 3);
        assert!(ty.is_const());
    }

    #[test]
    fn test_unknown_name_is_not_defined() {
        let mut session = Session::default();
        let m = session.new_module("m");
        let mut log = quiet_log();
        let mut ty = Type::new("Nowhere", loc());
        assert!(!session.module(m).has_definition(&session, &mut ty, &mut log));
        assert_eq!(log.errors(), 0);
    }

    #[test]
    fn test_function_name_becomes_function_reference() {
        let mut session = Session::default();
        let m = session.new_module("m");
        let f = session.new_func("callback", loc());
        session.add_func(m, f).unwrap();

        let mut log = quiet_log();
        let mut ty = Type::new("callback", loc());
        assert!(resolve(&session, m, &mut ty, &mut log));
        assert!(ty.is_func());
        assert!(ty.is_ref());
    }

    #[test]
    fn test_string_constants_share_the_table() {
        let mut session = Session::default();
        let m = session.new_module("m");
        let first = session
            .add_constant(m, ConstantDef::anonymous(Type::new("string_t", loc()), Initializer::Value(Literal::Str("hi".into()))))
            .unwrap();
        let second = session
            .add_constant(m, ConstantDef::new("GREETING", Type::new("string_t", loc()), Initializer::Value(Literal::Str("hi".into()))))
            .unwrap();

        assert_eq!(first, "__CO0");
        assert_eq!(second, "GREETING");
        let module = session.module(m);
        assert_eq!(module.string_table(), &["hi".to_string()]);
        assert_eq!(module.constant("GREETING").unwrap().initializer, Initializer::StringIndex(0));
        assert_eq!(session.find_string_constant(m, "hi", loc()), "__CO0");

        let value = session.module(m).local_value(&session, "GREETING").unwrap();
        assert_eq!(value.value, Some(Literal::Str("hi".into())));
        assert!(value.ty.is_const());
    }

    #[test]
    fn test_unnamed_constants_skip_taken_names() {
        let mut session = Session::default();
        let m = session.new_module("m");
        session
            .add_constant(m, ConstantDef::new("__CO0", Type::new("uint8_t", loc()), Initializer::Value(Literal::Int(0))))
            .unwrap();
        let name = session
            .add_constant(m, ConstantDef::anonymous(Type::new("uint8_t", loc()), Initializer::Value(Literal::Int(1))))
            .unwrap();
        assert_eq!(name, "__CO1");
    }

    #[test]
    fn test_struct_registration_emits_type_info() {
        let mut session = Session::default();
        let m = session.new_module("m");
        let st = session.new_struct("Point", loc());
        session.add_struct(m, st).unwrap();

        let module = session.module(m);
        let global = module.global("Point_type").unwrap();
        assert_eq!(
            global.initializer,
            Initializer::TypeInfo {
                name: "Point_type_name".to_string(),
                type_id: 16
            }
        );
        let name_const = module.constant("Point_type_name").unwrap();
        assert!(name_const.ty.is_string());
        assert!(matches!(name_const.initializer, Initializer::StringIndex(_)));

        assert!(matches!(session.add_struct(m, st), Err(Error::DuplicateDefinition { .. })));
    }

    #[test]
    fn test_internal_error_halts_binding() {
        let mut session = Session::default();
        let m = session.new_module("m");
        session
            .add_constant(m, ConstantDef::new("LIMIT", Type::new("Mystery", loc()), Initializer::None))
            .unwrap();
        let a = session.new_struct("A", loc());
        session.struct_mut(a).add_member("cap", Type::new("LIMIT", loc())).unwrap();
        session.add_struct(m, a).unwrap();
        let b = session.new_struct("B", loc());
        session.struct_mut(b).add_member("n", Type::new("uint8_t", loc())).unwrap();
        session.add_struct(m, b).unwrap();

        let mut log = quiet_log();
        assert!(!session.bind_members(m, &mut log));
        assert!(log.has_internal());
        assert!(log.messages()[0].message.contains("cannot be classified"));
        assert!(!session.strukt(a).is_bound());
        assert!(!session.strukt(b).is_bound());
    }

    #[test]
    fn test_shared_struct_keeps_first_owner() {
        let mut session = Session::default();
        let m1 = session.new_module("m1");
        let m2 = session.new_module("m2");
        session.install_builtins(m1).unwrap();
        session.install_builtins(m2).unwrap();
        let string = session.builtins().string;
        assert_eq!(session.strukt(string).parent_scope, Some(ScopeId::Module(m1)));

        let mut log = quiet_log();
        assert!(session.bind_members(m2, &mut log));
        assert!(session.bind_members(m1, &mut log));
        assert!(session.module(m1).has_global("string_t_attr_table"));
        assert!(!session.module(m2).has_global("string_t_attr_table"));
        assert_eq!(session.attr_table(string).map(|rows| rows.len()), Some(5));
    }
}
