//! Built-in Types Registry
//!
//! Defines the runtime structs every module knows about: `string_t`,
//! `type_t` and `type_node_t`, plus one type-info global per primitive.

use crate::config::TargetConfig;
use crate::scope::{GlobalVar, Initializer, ModuleId, Session, StructDef, StructId};
use crate::types::{Type, TypeKind};
use crate::utils::{Location, Result};

/// Handles of the built-in structs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Builtins {
    pub string: StructId,
    pub type_info: StructId,
    pub type_node: StructId,
}

impl Builtins {
    /// Allocate the built-in structs at the end of `structs`
    pub fn create(structs: &mut Vec<StructDef>, target: &TargetConfig) -> Self {
        let loc = Location::builtin();
        let next = structs.len();
        let builtins = Self {
            string: StructId(next),
            type_info: StructId(next + 1),
            type_node: StructId(next + 2),
        };
        let word = || target.word_type(loc.clone());
        let string_ref = || Type::new_struct_ref(builtins.string, "string_t", loc.clone());
        let type_ref = || Type::new_struct_ref(builtins.type_info, "type_t", loc.clone());

        let mut chars = target.character_type(loc.clone());
        chars.make_unbounded_array();

        let string = with_members(
            "string_t",
            vec![("flags", word()), ("length", word()), ("data", chars)],
        );
        let type_info = with_members(
            "type_t",
            vec![
                ("name", string_ref()),
                ("type_id", Type::primitive(TypeKind::UInt8, loc.clone())),
                ("attr_count", word()),
                (
                    "attrs",
                    Type::new_struct_ref(builtins.type_node, "type_node_t", loc.clone()),
                ),
                ("msg_table_size", word()),
                ("msgs", type_ref()),
            ],
        );
        let type_node = with_members(
            "type_node_t",
            vec![("name", string_ref()), ("type_info", type_ref()), ("flags", word())],
        );

        structs.extend([string, type_info, type_node]);
        builtins
    }

    /// Register the built-in structs and primitive type-info globals in a module
    pub fn install(self, session: &mut Session, module: ModuleId) -> Result<()> {
        for id in [self.string, self.type_info, self.type_node] {
            session.add_struct(module, id)?;
        }

        let kinds = TypeKind::INTEGERS
            .into_iter()
            .chain(TypeKind::FLOATS)
            .chain([TypeKind::Null]);
        for kind in kinds {
            let name = kind.builtin_name();
            let global_name = format!("{name}_type");
            if session.module(module).has_global(&global_name) {
                continue;
            }
            let const_name = session.find_string_constant(module, name, Location::builtin());
            let ty = Type::new_struct(self.type_info, "type_t", Location::builtin());
            let info = Initializer::TypeInfo {
                name: const_name,
                type_id: kind.type_id(),
            };
            session.add_global(module, GlobalVar::new(&global_name, ty, info))?;
        }
        log::debug!("installed builtins into module {}", session.module(module).name);
        Ok(())
    }
}

fn with_members(name: &str, members: Vec<(&str, Type)>) -> StructDef {
    let mut def = StructDef::new(name, Location::builtin());
    for (member, ty) in members {
        // Fresh struct, distinct names: nothing to reject
        let _ = def.add_member(member, ty);
    }
    def
}

impl Session {
    pub fn install_builtins(&mut self, module: ModuleId) -> Result<()> {
        let builtins = *self.builtins();
        builtins.install(self, module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtin_struct_layouts() {
        let session = Session::default();
        let builtins = *session.builtins();

        let string = session.strukt(builtins.string);
        let names: Vec<_> = string.members().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["flags", "length", "data"]);
        let data = string.member_type("data").unwrap();
        assert_eq!(data.kind, TypeKind::UInt8);
        assert_eq!(data.elem_count, -1);
        assert!(data.is_array());

        let type_info = session.strukt(builtins.type_info);
        assert_eq!(type_info.member_count(), 6);
        assert_eq!(type_info.member_type("msgs").unwrap().struct_id(), Some(builtins.type_info));
        assert!(type_info.member_type("name").unwrap().is_string());

        let node = session.strukt(builtins.type_node);
        assert_eq!(node.member_type("flags").unwrap().kind, TypeKind::UInt32);
    }

    #[test]
    fn test_word_size_follows_target() {
        let target = TargetConfig {
            word: "uint64_t".to_string(),
            character: "uint16_t".to_string(),
        };
        let session = Session::new(target);
        let string = session.strukt(session.builtins().string);
        assert_eq!(string.member_type("length").unwrap().kind, TypeKind::UInt64);
        assert_eq!(string.member_type("data").unwrap().kind, TypeKind::UInt16);
    }

    #[test]
    fn test_install_emits_primitive_type_info() {
        let mut session = Session::default();
        let m = session.new_module("m");
        session.install_builtins(m).unwrap();

        let module = session.module(m);
        let info = module.global("sint16_t_type").unwrap();
        let Initializer::TypeInfo { name, type_id } = &info.initializer else {
            panic!("expected type info, got {:?}", info.initializer);
        };
        assert_eq!(*type_id, 4);
        assert_eq!(module.constant(name).map(|c| c.ty.is_string()), Some(true));
        assert!(module.has_global("null_t_type"));
        assert!(module.has_global("float64_t_type"));
        assert!(module.has_global("string_t_type"));
        assert!(module.struct_id("type_node_t").is_some());
    }

    #[test]
    fn test_builtins_bind_in_every_module() {
        let mut session = Session::default();
        let m1 = session.new_module("m1");
        let m2 = session.new_module("m2");
        session.install_builtins(m1).unwrap();
        session.install_builtins(m2).unwrap();

        let mut log = crate::diagnostics::Diagnostics::new();
        assert!(session.bind_members(m1, &mut log));
        assert!(session.bind_members(m2, &mut log));
        assert_eq!(log.errors(), 0);
        assert!(session.module(m2).has_global("uint8_t_type"));
    }
}
