//! Compilation session configuration

use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostics, Severity};
use crate::types::{Type, TypeKind};
use crate::utils::{Error, Location, Result};

/// Machine sizes of the code generation target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Builtin name of the machine word type
    pub word: String,
    /// Builtin name of the character type strings are made of
    pub character: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            word: "uint32_t".to_string(),
            character: "uint8_t".to_string(),
        }
    }
}

impl TargetConfig {
    /// Both sizes must name unsigned or signed integer builtins
    pub fn validate(&self) -> Result<()> {
        for (role, name) in [("word", &self.word), ("character", &self.character)] {
            let is_integer = TypeKind::from_builtin_name(name).is_some_and(|kind| kind.is_integer());
            if !is_integer {
                return Err(Error::InvalidTargetType {
                    role: role.to_string(),
                    name: name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn word_type(&self, loc: Location) -> Type {
        Type::new(&self.word, loc)
    }

    pub fn character_type(&self, loc: Location) -> Type {
        Type::new(&self.character, loc)
    }
}

/// Per-session settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub target: TargetConfig,
    /// Diagnostics at or below this severity are not kept
    pub ignore_level: Option<Severity>,
    /// Record the compiler call site for error, fatal and internal messages
    pub debug: bool,
}

impl SessionConfig {
    /// A diagnostics log configured from these settings
    pub fn diagnostics(&self) -> Diagnostics {
        let mut log = Diagnostics::new().with_ignore_level(self.ignore_level);
        log.set_debug(self.debug);
        log
    }
}
