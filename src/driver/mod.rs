//! Batch driver
//!
//! Runs the semantic passes over a declaration manifest in a fixed order:
//! declare modules, wire imports, register structs and functions, bind
//! members, then resolve, check and fold constants and block initializers.
//! The outcome is a serializable hand-off report for code generation.

pub mod manifest;

pub use manifest::Manifest;

use std::collections::HashMap;
use std::rc::Rc;

use serde::Serialize;

use crate::diagnostics::{DiagnosticReport, Diagnostics};
use crate::expr::{Ast, ConstantSolver, ExprId, ExprKind};
use crate::scope::{AttrNode, BlockId, ConstantDef, Initializer, ModuleId, ScopeId, Session};
use crate::types::Type;
use crate::utils::{Error, Location, Result};
use manifest::{ConstantSpec, LocalSpec, ModuleSpec};

// ==================== Hand-off Report ====================

#[derive(Debug, Clone, Serialize)]
pub struct HandoffReport {
    pub modules: Vec<ModuleReport>,
    pub diagnostics: DiagnosticReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleReport {
    pub name: String,
    pub structs: Vec<StructReport>,
    pub constants: Vec<ConstantReport>,
    pub globals: Vec<GlobalReport>,
    pub string_table: Vec<String>,
    pub locals: Vec<LocalReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructReport {
    pub name: String,
    pub packed: bool,
    pub bound: bool,
    pub members: Vec<MemberReport>,
    pub dependencies: Vec<String>,
    pub attr_table: Vec<AttrNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberReport {
    pub index: usize,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConstantReport {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub initializer: Initializer,
}

#[derive(Debug, Clone, Serialize)]
pub struct GlobalReport {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub initializer: Initializer,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocalReport {
    pub func: String,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    /// Initializer after folding, rendered as source text
    pub init: Option<String>,
}

impl HandoffReport {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.errors > 0
    }

    pub fn module(&self, name: &str) -> Option<&ModuleReport> {
        self.modules.iter().find(|m| m.name == name)
    }
}

impl ModuleReport {
    pub fn constant(&self, name: &str) -> Option<&ConstantReport> {
        self.constants.iter().find(|c| c.name == name)
    }

    pub fn strukt(&self, name: &str) -> Option<&StructReport> {
        self.structs.iter().find(|s| s.name == name)
    }
}

// ==================== Driver ====================

/// Mainline block of a function declared with local variables
struct LocalBlock {
    module: ModuleId,
    func: String,
    block: BlockId,
    locals: Vec<LocalSpec>,
}

struct Driver<'m> {
    manifest: &'m Manifest,
    file: Rc<str>,
    session: Session,
    ast: Ast,
    log: Diagnostics,
    modules: Vec<ModuleId>,
    by_name: HashMap<String, ModuleId>,
    blocks: Vec<LocalBlock>,
}

/// Run every pass over `manifest`. `file` names the manifest in locations.
pub fn check(manifest: &Manifest, file: &str) -> Result<HandoffReport> {
    manifest.config.target.validate()?;
    let mut driver = Driver {
        manifest,
        file: Rc::from(file),
        session: Session::new(manifest.config.target.clone()),
        ast: Ast::new(),
        log: manifest.config.diagnostics(),
        modules: Vec::new(),
        by_name: HashMap::new(),
        blocks: Vec::new(),
    };
    driver.run();
    Ok(driver.report())
}

impl<'m> Driver<'m> {
    /// Manifest entries carry no source positions, so locations name the
    /// entry by path instead, e.g. `geo/structs/Point`
    fn loc(&self, path: &str) -> Location {
        Location::item(&self.file, path)
    }

    fn specs(&self) -> impl Iterator<Item = (ModuleId, &'m ModuleSpec)> + '_ {
        self.modules.iter().copied().zip(self.manifest.modules.iter())
    }

    fn run(&mut self) {
        self.declare_modules();
        self.wire_imports();
        self.register_definitions();

        let specs: Vec<_> = self.specs().collect();
        for (module, spec) in specs {
            log::debug!("binding module {}", spec.name);
            self.session.bind_members(module, &mut self.log);
            if self.log.has_internal() {
                return;
            }
        }

        self.fold_constants();
        self.fold_locals();
    }

    fn declare_modules(&mut self) {
        for spec in &self.manifest.modules {
            let loc = self.loc(&spec.name);
            if self.by_name.contains_key(&spec.name) {
                self.log.error(&loc, Error::DuplicateDefinition { name: spec.name.clone() });
            }
            let module = self.session.new_module(&spec.name);
            let def = self.session.module_mut(module);
            def.docstring = spec.docstring.clone();
            def.loc = loc.clone();
            if let Err(err) = self.session.install_builtins(module) {
                self.log.internal(Some(&loc), err);
            }
            self.by_name.entry(spec.name.clone()).or_insert(module);
            self.modules.push(module);
        }
    }

    fn wire_imports(&mut self) {
        let specs: Vec<_> = self.specs().collect();
        for (module, spec) in specs {
            for name in &spec.imports {
                let loc = self.loc(&format!("{}/imports/{}", spec.name, name));
                let result = match self.by_name.get(name) {
                    Some(&imported) => self.session.add_import(module, imported),
                    None => Err(Error::UnknownModule { name: name.clone() }),
                };
                if let Err(err) = result {
                    self.log.error(&loc, err);
                }
            }
        }
    }

    fn register_definitions(&mut self) {
        let specs: Vec<_> = self.specs().collect();
        for (module, spec) in specs {
            for name in &spec.objects {
                let loc = self.loc(&format!("{}/objects/{}", spec.name, name));
                let object = self.session.new_object(name, loc.clone());
                if let Err(err) = self.session.add_object(module, object) {
                    self.log.error(&loc, err);
                }
            }

            for st in &spec.structs {
                let loc = self.loc(&format!("{}/structs/{}", spec.name, st.name));
                let id = self.session.new_struct(&st.name, loc.clone());
                let def = self.session.struct_mut(id);
                def.is_packed = st.packed;
                def.docstring = st.docstring.clone();
                for member in &st.members {
                    let ty = Type::new(&member.ty, loc.clone());
                    if let Err(err) = self.session.struct_mut(id).add_member(&member.name, ty) {
                        self.log.error(&loc, err);
                    }
                }
                if let Err(err) = self.session.add_struct(module, id) {
                    self.log.error(&loc, err);
                }
            }

            for fs in &spec.functions {
                let loc = self.loc(&format!("{}/functions/{}", spec.name, fs.name));
                let func = self.session.new_func(&fs.name, loc.clone());
                let params = fs
                    .inbound
                    .iter()
                    .map(|p| (true, p))
                    .chain(fs.outbound.iter().map(|p| (false, p)));
                for (inbound, parm) in params {
                    let ty = Type::new(&parm.ty, loc.clone());
                    let added = if inbound {
                        self.session.add_inbound_var(func, &parm.name, ty)
                    } else {
                        self.session.add_outbound_var(func, &parm.name, ty)
                    };
                    if let Err(err) = added {
                        self.log.error(&loc, err);
                    }
                }

                if !fs.locals.is_empty() {
                    let block = self.session.new_block(loc.clone(), Some(&format!("{}_mainline", fs.name)));
                    for local in &fs.locals {
                        let ty = Type::new(&local.ty, loc.clone());
                        if let Err(err) = self.session.add_local(block, &local.name, ty) {
                            self.log.error(&loc, err);
                        }
                    }
                    self.session.set_mainline_block(func, block);
                    self.blocks.push(LocalBlock {
                        module,
                        func: fs.name.clone(),
                        block,
                        locals: fs.locals.clone(),
                    });
                }

                if let Err(err) = self.session.add_func(module, func) {
                    self.log.error(&loc, err);
                }
            }
        }
    }

    fn fold_constants(&mut self) {
        let specs: Vec<_> = self.specs().collect();
        for (module, spec) in specs {
            for (idx, constant) in spec.constants.iter().enumerate() {
                let loc = self.loc(&constant_path(&spec.name, idx, constant));
                self.fold_constant(module, constant, &loc);
            }
        }
    }

    fn fold_constant(&mut self, module: ModuleId, spec: &ConstantSpec, loc: &Location) {
        let scope = ScopeId::Module(module);
        let root = match spec.value.build(&mut self.ast, loc) {
            Ok(root) => root,
            Err(symbol) => {
                self.log.error(loc, Error::UnknownOperator { symbol });
                return;
            }
        };
        if !self.ast.resolve(root, scope, &self.session, &mut self.log)
            || !self.ast.check(root, scope, &self.session, &mut self.log)
            || !self.ast.check_const(root, &mut self.log)
        {
            return;
        }

        let mut solver = ConstantSolver::new(&mut self.ast, root);
        solver.graft(scope, &self.session);
        let folded = match solver.simplify() {
            Ok(folded) => folded,
            Err(err) => {
                self.log.error(loc, err);
                return;
            }
        };
        let Some((value_ty, initializer)) = self.initializer_of(folded) else {
            self.log.error(loc, Error::NotConstant { op: self.ast.op(folded).to_string() });
            return;
        };

        let ty = match &spec.ty {
            None => value_ty,
            Some(name) => {
                let mut declared = Type::new(name, loc.clone());
                let lookup = self.session.scope(scope);
                if !lookup.has_definition(&self.session, &mut declared, &mut self.log) {
                    self.log.error(loc, Error::DefinitionNotFound { name: name.clone() });
                    return;
                }
                if !lookup.update_type(&self.session, &mut declared, &mut self.log) {
                    return;
                }
                if !declared.accepts(&value_ty) {
                    self.log.error(
                        loc,
                        Error::ConstantTypeMismatch {
                            name: spec.name.clone(),
                            expected: declared.to_string(),
                            got: value_ty.to_string(),
                        },
                    );
                    return;
                }
                declared
            }
        };

        let def = ConstantDef::new(&spec.name, ty, initializer).with_docstring(&spec.docstring);
        match self.session.add_constant(module, def) {
            Ok(name) => log::debug!("folded constant {} to {}", name, self.ast.render(folded)),
            Err(err) => self.log.error(loc, err),
        }
    }

    /// Type and initializer of a folded constant expression
    fn initializer_of(&self, id: ExprId) -> Option<(Type, Initializer)> {
        match self.ast.kind(id) {
            ExprKind::Literal(value) => Some((self.ast.type_of(id), Initializer::Value(value.clone()))),
            ExprKind::StructConstructor { target, child } => {
                let values = self.literal_outputs(*child)?;
                Some((target.clone(), Initializer::Aggregate(values)))
            }
            ExprKind::InitializerList(_) => {
                let values = self.literal_outputs(id)?;
                let mut ty = self.ast.output_type(id, 0)?;
                ty.make_bounded_array(values.len() as i64);
                Some((ty, Initializer::Aggregate(values)))
            }
            _ => None,
        }
    }

    fn literal_outputs(&self, id: ExprId) -> Option<Vec<crate::expr::Literal>> {
        (0..self.ast.num_outputs(id))
            .map(|idx| {
                self.ast
                    .output_expr(id, idx)
                    .and_then(|expr| self.ast.literal_value(expr).cloned())
            })
            .collect()
    }

    fn fold_locals(&mut self) {
        let blocks = std::mem::take(&mut self.blocks);
        for entry in &blocks {
            let scope = ScopeId::Block(entry.block);
            for local in &entry.locals {
                let Some(init) = &local.init else {
                    continue;
                };
                let module = &self.session.module(entry.module).name;
                let loc = self.loc(&format!("{}/functions/{}/locals/{}", module, entry.func, local.name));
                let root = match init.build(&mut self.ast, &loc) {
                    Ok(root) => root,
                    Err(symbol) => {
                        self.log.error(&loc, Error::UnknownOperator { symbol });
                        continue;
                    }
                };
                if !self.ast.resolve(root, scope, &self.session, &mut self.log)
                    || !self.ast.check(root, scope, &self.session, &mut self.log)
                {
                    continue;
                }
                if let Err(err) = self.session.set_initializer(entry.block, &local.name, root) {
                    self.log.error(&loc, err);
                }
            }
            self.session.simplify_block(entry.block, &mut self.ast, &mut self.log);
        }
        self.blocks = blocks;
    }

    // ==================== Report ====================

    fn report(&self) -> HandoffReport {
        let modules = self
            .specs()
            .map(|(module, _)| self.module_report(module))
            .collect();
        HandoffReport {
            modules,
            diagnostics: self.log.report(),
        }
    }

    fn module_report(&self, module: ModuleId) -> ModuleReport {
        let def = self.session.module(module);
        let builtins = *self.session.builtins();
        let builtin_ids = [builtins.string, builtins.type_info, builtins.type_node];

        let structs = def
            .struct_order()
            .iter()
            .filter(|&&id| !builtin_ids.contains(&id))
            .map(|&id| {
                let st = self.session.strukt(id);
                StructReport {
                    name: st.name.clone(),
                    packed: st.is_packed(),
                    bound: st.is_bound(),
                    members: st
                        .members()
                        .iter()
                        .enumerate()
                        .map(|(index, m)| MemberReport {
                            index,
                            name: m.name.clone(),
                            ty: m.ty.to_string(),
                        })
                        .collect(),
                    dependencies: st.struct_dependencies(id),
                    attr_table: self.session.attr_table(id).map(<[AttrNode]>::to_vec).unwrap_or_default(),
                }
            })
            .collect();

        let constants = def
            .constants()
            .map(|c| ConstantReport {
                name: c.name.clone(),
                ty: c.ty.to_string(),
                initializer: c.initializer.clone(),
            })
            .collect();

        // Attribute tables are reported with their struct
        let globals = def
            .globals()
            .filter(|g| !matches!(g.initializer, Initializer::AttrTable(_)))
            .map(|g| GlobalReport {
                name: g.name.clone(),
                ty: g.ty.to_string(),
                initializer: g.initializer.clone(),
            })
            .collect();

        let locals = self
            .blocks
            .iter()
            .filter(|entry| entry.module == module)
            .flat_map(|entry| {
                let block = self.session.block(entry.block);
                let vars = self.session.strukt(block.vars);
                entry.locals.iter().map(move |local| LocalReport {
                    func: entry.func.clone(),
                    name: local.name.clone(),
                    ty: vars.member_type(&local.name).map(Type::to_string).unwrap_or_default(),
                    init: block.init.get(&local.name).map(|&expr| self.ast.render(expr)),
                })
            })
            .collect();

        ModuleReport {
            name: def.name.clone(),
            structs,
            constants,
            globals,
            string_table: def.string_table().to_vec(),
            locals,
        }
    }
}

fn constant_path(module: &str, idx: usize, constant: &ConstantSpec) -> String {
    if constant.name.is_empty() {
        format!("{module}/constants/{idx}")
    } else {
        format!("{module}/constants/{}", constant.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use crate::expr::Literal;
    use pretty_assertions::assert_eq;

    fn run(json: &str) -> HandoffReport {
        let manifest = Manifest::from_json(json).unwrap();
        check(&manifest, "test.json").unwrap()
    }

    /// Error-or-worse messages; the default config also keeps trace lines
    fn error_messages(report: &HandoffReport) -> Vec<&str> {
        report
            .diagnostics
            .diagnostics
            .iter()
            .filter(|d| d.severity >= Severity::Error)
            .map(|d| d.message.as_str())
            .collect()
    }

    #[test]
    fn test_constants_fold_left_to_right() {
        let report = run(
            r#"{ "modules": [{ "name": "main", "constants": [
                { "name": "SUM", "value": { "chain": { "first": {"int": 8},
                    "rest": [ ["+", {"int": 3}], ["-", {"int": 2}], ["*", {"int": 10}] ] } } },
                { "name": "RATIO", "value": { "chain": { "first": {"float": 2.5},
                    "rest": [ ["+", {"int": 10}], ["-", {"float": 0.5}], ["/", {"int": 2}] ] } } },
                { "name": "PHRASE", "value": { "chain": { "first": {"str": "the"},
                    "rest": [ ["+", {"str": " "}], ["+", {"str": "dog"}] ] } } }
            ] }] }"#,
        );
        assert!(!report.has_errors(), "{:?}", report.diagnostics);
        let module = report.module("main").unwrap();

        let sum = module.constant("SUM").unwrap();
        assert_eq!(sum.initializer, Initializer::Value(Literal::Int(90)));
        assert_eq!(sum.ty, "const uint8_t");
        assert_eq!(module.constant("RATIO").unwrap().initializer, Initializer::Value(Literal::Float(6.0)));

        let phrase = module.constant("PHRASE").unwrap();
        let Initializer::StringIndex(idx) = phrase.initializer else {
            panic!("expected an interned string, got {:?}", phrase.initializer);
        };
        assert_eq!(module.string_table[idx], "the dog");
    }

    #[test]
    fn test_constructor_constant_and_attribute_table() {
        let report = run(
            r#"{ "modules": [{ "name": "geo",
                "structs": [
                    { "name": "Box", "members": [ { "name": "v", "type": "uint16_t" } ] },
                    { "name": "Pair", "members": [
                        { "name": "a", "type": "Box" }, { "name": "b", "type": "@Pair" } ] }
                ],
                "constants": [
                    { "name": "BIG", "value": { "construct": { "type": "Box", "values": [ {"int": 500} ] } } },
                    { "name": "LIMIT", "type": "uint32_t", "value": { "int": 500 } }
                ]
            }] }"#,
        );
        assert!(!report.has_errors(), "{:?}", report.diagnostics);
        let module = report.module("geo").unwrap();

        let big = module.constant("BIG").unwrap();
        assert_eq!(big.initializer, Initializer::Aggregate(vec![Literal::Int(500)]));
        assert_eq!(big.ty, "const Box");
        assert_eq!(module.constant("LIMIT").unwrap().ty, "const uint32_t");

        let pair = module.strukt("Pair").unwrap();
        assert!(pair.bound);
        assert_eq!(pair.dependencies, vec!["Box"]);
        let members: Vec<_> = pair.attr_table.iter().map(|row| row.member.as_str()).collect();
        assert_eq!(members, vec!["a", "b", "reference_count", "previous_copy"]);
        assert_eq!(pair.attr_table[0].type_info, "Box_type");
        assert!(module.globals.iter().any(|g| g.name == "Pair_type"));
    }

    #[test]
    fn test_constructor_arity_is_reported() {
        let report = run(
            r#"{ "modules": [{ "name": "m",
                "structs": [ { "name": "One", "members": [ { "name": "x", "type": "uint8_t" } ] } ],
                "constants": [
                    { "name": "BAD", "value": { "construct": { "type": "One", "values": [ {"int": 1}, {"int": 2} ] } } },
                    { "name": "EMPTY", "value": { "construct": { "type": "One", "values": [] } } }
                ]
            }] }"#,
        );
        assert_eq!(report.diagnostics.errors, 1);
        assert!(error_messages(&report)[0].contains("specified 2"));
        let module = report.module("m").unwrap();
        assert!(module.constant("BAD").is_none());
        assert_eq!(module.constant("EMPTY").unwrap().initializer, Initializer::Aggregate(vec![]));
    }

    #[test]
    fn test_qualified_member_needs_import() {
        let manifest = r#"{ "modules": [
            { "name": "shapes", "structs": [ { "name": "Circle", "members": [ { "name": "r", "type": "float32_t" } ] } ] },
            { "name": "scene", IMPORTS "structs": [ { "name": "Item", "members": [ { "name": "shape", "type": "shapes::Circle" } ] } ] }
        ] }"#;

        let report = run(&manifest.replace("IMPORTS", r#""imports": ["shapes"],"#));
        assert!(!report.has_errors(), "{:?}", report.diagnostics);
        let item = report.module("scene").unwrap().strukt("Item").unwrap();
        assert!(item.bound);
        assert_eq!(item.members[0].ty, "Circle");

        let report = run(&manifest.replace("IMPORTS", ""));
        assert!(report.has_errors());
        let messages: Vec<_> = report.diagnostics.diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("not imported")), "{messages:?}");
        assert!(messages.iter().any(|m| m.contains("scope modifier")), "{messages:?}");
        assert!(!report.module("scene").unwrap().strukt("Item").unwrap().bound);
    }

    #[test]
    fn test_block_initializers_fold() {
        let report = run(
            r#"{ "modules": [{ "name": "m",
                "constants": [ { "name": "SIDE", "value": { "int": 4 } } ],
                "functions": [ { "name": "area",
                    "inbound": [ { "name": "w", "type": "uint32_t" } ],
                    "outbound": [ { "name": "result", "type": "uint32_t" } ],
                    "locals": [
                        { "name": "square", "type": "uint32_t",
                          "init": { "chain": { "first": {"name": "SIDE"}, "rest": [ ["*", {"name": "SIDE"}] ] } } },
                        { "name": "scaled", "type": "uint32_t",
                          "init": { "chain": { "first": {"name": "w"}, "rest": [ ["*", {"group": { "chain": { "first": {"int": 2}, "rest": [["+", {"int": 1}]] } } }] ] } } }
                    ] } ]
            }] }"#,
        );
        assert!(!report.has_errors(), "{:?}", report.diagnostics);
        let locals = &report.module("m").unwrap().locals;
        assert_eq!(locals[0].func, "area");
        assert_eq!(locals[0].init.as_deref(), Some("16"));
        assert_eq!(locals[1].init.as_deref(), Some("w * (2 + 1)"));
    }

    #[test]
    fn test_unknown_import_and_operator() {
        let report = run(
            r#"{ "modules": [{ "name": "m", "imports": ["ghost"],
                "constants": [ { "name": "X", "value": { "chain": { "first": {"int": 1}, "rest": [ ["<<", {"int": 2}] ] } } } ]
            }] }"#,
        );
        assert_eq!(report.diagnostics.errors, 2);
        let messages = error_messages(&report);
        assert!(messages[0].contains("ghost"));
        assert!(messages[1].contains("<<"));

        let import_error = report
            .diagnostics
            .diagnostics
            .iter()
            .find(|d| d.severity == Severity::Error)
            .and_then(|d| d.location.as_ref())
            .map(ToString::to_string);
        assert_eq!(import_error.as_deref(), Some("test.json#m/imports/ghost"));
    }

    #[test]
    fn test_invalid_target_is_rejected() {
        let manifest = Manifest::from_json(r#"{ "config": { "target": { "word": "float32_t" } } }"#).unwrap();
        assert!(matches!(check(&manifest, "t.json"), Err(Error::InvalidTargetType { .. })));
    }

    #[test]
    fn test_report_serializes() {
        let report = run(r#"{ "modules": [{ "name": "m", "constants": [ { "name": "N", "value": {"int": 7} } ] }] }"#);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["modules"][0]["constants"].as_array().map(|c| c.is_empty()), Some(false));
        let n = json["modules"][0]["constants"]
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["name"] == "N")
            .unwrap();
        assert_eq!(n["initializer"]["value"], 7);
        assert_eq!(n["type"], "const uint8_t");
    }
}
