//! Source location tracking

use std::fmt;
use std::rc::Rc;

use serde::Serialize;

/// A `file:line:column` position in some input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Location {
    /// Name of the input the location points into
    pub file: Rc<str>,
    /// 1-based line number
    pub line: u32,
    /// 1-based column number
    pub column: u32,
}

impl Location {
    /// Create a new location
    pub fn new(file: impl Into<Rc<str>>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// A declaration known only by its path inside `file`. Line and
    /// column are 0, meaning no position.
    pub fn item(file: &str, path: &str) -> Self {
        Self::new(format!("{file}#{path}"), 0, 0)
    }

    pub fn has_position(&self) -> bool {
        self.line > 0
    }

    /// Location used for definitions the compiler synthesizes itself
    pub fn builtin() -> Self {
        Self::new("-builtin-", 1, 1)
    }

    /// Create a dummy location (for testing)
    pub fn dummy() -> Self {
        Self::new("-test-", 1, 1)
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::dummy()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_position() {
            return f.write_str(&self.file);
        }
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_file_line_column() {
        let loc = Location::new("list.mtl", 12, 4);
        assert_eq!(loc.to_string(), "list.mtl:12:4");
    }

    #[test]
    fn test_item_location_has_no_position() {
        let loc = Location::item("decls.json", "geo/structs/Point");
        assert!(!loc.has_position());
        assert_eq!(loc.to_string(), "decls.json#geo/structs/Point");
    }
}
