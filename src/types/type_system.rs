//! Type System for metal
//!
//! A [`Type`] starts life either as a builtin primitive or as an unresolved
//! name. Resolution through the scope chain (see [`crate::scope`]) turns the
//! latter into a struct, function, object or the declared type of a named
//! symbol, exactly once.

use std::fmt;

use crate::scope::{FuncId, ModuleId, ObjectId, StructId};
use crate::utils::Location;

/// The kind of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Null,
    UInt8,
    SInt8,
    UInt16,
    SInt16,
    UInt32,
    SInt32,
    UInt64,
    SInt64,
    Float32,
    Float64,
    Object(ObjectId),
    Function(FuncId),
    Bool,
    String,
    TypeOfType,
    Struct(StructId),
    Opaque,
    Unresolved,
}

const SINT8_CAST: &[TypeKind] = &[
    TypeKind::SInt16,
    TypeKind::SInt32,
    TypeKind::SInt64,
    TypeKind::Float32,
    TypeKind::Float64,
];
const UINT8_CAST: &[TypeKind] = &[
    TypeKind::UInt16,
    TypeKind::SInt16,
    TypeKind::UInt32,
    TypeKind::SInt32,
    TypeKind::UInt64,
    TypeKind::SInt64,
    TypeKind::Float32,
    TypeKind::Float64,
];
const SINT16_CAST: &[TypeKind] = &[
    TypeKind::SInt32,
    TypeKind::SInt64,
    TypeKind::Float32,
    TypeKind::Float64,
];
const UINT16_CAST: &[TypeKind] = &[
    TypeKind::UInt32,
    TypeKind::SInt32,
    TypeKind::UInt64,
    TypeKind::SInt64,
    TypeKind::Float32,
    TypeKind::Float64,
];
const SINT32_CAST: &[TypeKind] = &[TypeKind::SInt64, TypeKind::Float32, TypeKind::Float64];
const UINT32_CAST: &[TypeKind] = &[
    TypeKind::UInt64,
    TypeKind::SInt64,
    TypeKind::Float32,
    TypeKind::Float64,
];
const WIDE_CAST: &[TypeKind] = &[TypeKind::Float64];

impl TypeKind {
    /// All fixed-width integer kinds
    pub const INTEGERS: [TypeKind; 8] = [
        TypeKind::SInt8,
        TypeKind::UInt8,
        TypeKind::SInt16,
        TypeKind::UInt16,
        TypeKind::SInt32,
        TypeKind::UInt32,
        TypeKind::SInt64,
        TypeKind::UInt64,
    ];

    pub const FLOATS: [TypeKind; 2] = [TypeKind::Float32, TypeKind::Float64];

    /// Map a builtin type name to its kind
    pub fn from_builtin_name(name: &str) -> Option<Self> {
        let kind = match name {
            "null_t" => Self::Null,
            "bool_t" => Self::Bool,
            "uint8_t" => Self::UInt8,
            "sint8_t" => Self::SInt8,
            "uint16_t" => Self::UInt16,
            "sint16_t" => Self::SInt16,
            "uint32_t" => Self::UInt32,
            "sint32_t" => Self::SInt32,
            "uint64_t" => Self::UInt64,
            "sint64_t" => Self::SInt64,
            "float32_t" => Self::Float32,
            "float64_t" => Self::Float64,
            "string_t" => Self::String,
            "type_t" => Self::TypeOfType,
            "opaque_t" => Self::Opaque,
            _ => return None,
        };
        Some(kind)
    }

    /// Builtin spelling of this kind
    pub fn builtin_name(&self) -> &'static str {
        match self {
            Self::Null => "null_t",
            Self::UInt8 => "uint8_t",
            Self::SInt8 => "sint8_t",
            Self::UInt16 => "uint16_t",
            Self::SInt16 => "sint16_t",
            Self::UInt32 => "uint32_t",
            Self::SInt32 => "sint32_t",
            Self::UInt64 => "uint64_t",
            Self::SInt64 => "sint64_t",
            Self::Float32 => "float32_t",
            Self::Float64 => "float64_t",
            Self::Object(_) => "object_t",
            Self::Function(_) => "function_t",
            Self::Bool => "bool_t",
            Self::String => "string_t",
            Self::TypeOfType => "type_t",
            Self::Struct(_) => "struct_t",
            Self::Opaque => "opaque_t",
            Self::Unresolved => "unresolved_t",
        }
    }

    /// Numeric id used by the runtime type information tables
    pub fn type_id(&self) -> u32 {
        match self {
            Self::Null => 0,
            Self::UInt8 => 1,
            Self::SInt8 => 2,
            Self::UInt16 => 3,
            Self::SInt16 => 4,
            Self::UInt32 => 5,
            Self::SInt32 => 6,
            Self::UInt64 => 7,
            Self::SInt64 => 8,
            Self::Float32 => 9,
            Self::Float64 => 10,
            Self::Object(_) => 11,
            Self::Function(_) => 12,
            Self::Bool => 13,
            Self::String => 14,
            Self::TypeOfType => 15,
            Self::Struct(_) => 16,
            Self::Opaque => 17,
            Self::Unresolved => 0xffff_ffff,
        }
    }

    /// Size in bytes for kinds with a fixed machine size
    pub fn size_of(&self) -> Option<usize> {
        match self {
            Self::Null => Some(0),
            Self::UInt8 | Self::SInt8 | Self::Bool => Some(1),
            Self::UInt16 | Self::SInt16 => Some(2),
            Self::UInt32 | Self::SInt32 | Self::Float32 => Some(4),
            Self::UInt64 | Self::SInt64 | Self::Float64 => Some(8),
            _ => None,
        }
    }

    /// Kinds this kind widens to implicitly
    pub fn promotions(&self) -> &'static [TypeKind] {
        match self {
            Self::SInt8 => SINT8_CAST,
            Self::UInt8 => UINT8_CAST,
            Self::SInt16 => SINT16_CAST,
            Self::UInt16 => UINT16_CAST,
            Self::SInt32 => SINT32_CAST,
            Self::UInt32 => UINT32_CAST,
            Self::SInt64 | Self::UInt64 | Self::Float32 => WIDE_CAST,
            _ => &[],
        }
    }

    pub fn is_integer(&self) -> bool {
        Self::INTEGERS.contains(self)
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Self::SInt8 | Self::SInt16 | Self::SInt32 | Self::SInt64)
    }

    pub fn is_float(&self) -> bool {
        Self::FLOATS.contains(self)
    }
}

/// A type as seen by the semantic passes
#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    pub kind: TypeKind,
    /// Lookup key while unresolved, canonical name afterwards
    pub name: String,
    pub is_ref: bool,
    pub is_const: bool,
    pub is_read_only: bool,
    /// 0 for scalars, >0 for sized arrays and vectors, -1 for unbounded arrays
    pub elem_count: i64,
    /// Module that owns the definition, stamped by a successful lookup
    pub definition_scope: Option<ModuleId>,
    pub loc: Location,
}

impl Type {
    /// Create a type from a written type name.
    ///
    /// A leading `@` makes the type a reference. Builtin names resolve
    /// immediately, everything else starts out unresolved.
    pub fn new(name: &str, loc: Location) -> Self {
        let (is_ref, name) = match name.strip_prefix('@') {
            Some(rest) => (true, rest),
            None => (false, name),
        };
        Self {
            kind: TypeKind::from_builtin_name(name).unwrap_or(TypeKind::Unresolved),
            name: name.to_string(),
            is_ref,
            is_const: false,
            is_read_only: true,
            elem_count: 0,
            definition_scope: None,
            loc,
        }
    }

    /// The null-type sentinel. Never const, so an uncomputed or unbound
    /// type cannot make a node look constant.
    pub fn null() -> Self {
        Self::primitive(TypeKind::Null, Location::builtin())
    }

    pub fn primitive(kind: TypeKind, loc: Location) -> Self {
        Self::new(kind.builtin_name(), loc)
    }

    pub fn new_struct(id: StructId, name: &str, loc: Location) -> Self {
        let mut ty = Self::new(name, loc);
        ty.make_struct(id);
        ty
    }

    pub fn new_struct_ref(id: StructId, name: &str, loc: Location) -> Self {
        let mut ty = Self::new_struct(id, name, loc);
        ty.make_ref();
        ty
    }

    /// Builder form of [`Type::make_const`]
    pub fn constant(mut self) -> Self {
        self.make_const();
        self
    }

    pub fn is_null(&self) -> bool {
        self.kind == TypeKind::Null
    }

    /// True for auto types and not yet bound names
    pub fn is_unresolved(&self) -> bool {
        self.kind == TypeKind::Unresolved
    }

    pub fn is_const(&self) -> bool {
        self.is_const
    }

    pub fn is_ref(&self) -> bool {
        self.is_ref
    }

    pub fn is_array(&self) -> bool {
        self.elem_count != 0 && !self.is_read_only
    }

    pub fn is_vector(&self) -> bool {
        self.elem_count > 0 && self.is_read_only
    }

    pub fn is_object(&self) -> bool {
        matches!(self.kind, TypeKind::Object(_))
    }

    pub fn is_func(&self) -> bool {
        matches!(self.kind, TypeKind::Function(_))
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.kind, TypeKind::Struct(_))
    }

    pub fn struct_id(&self) -> Option<StructId> {
        match self.kind {
            TypeKind::Struct(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_string(&self) -> bool {
        self.kind == TypeKind::String || (self.is_struct() && self.name == "string_t")
    }

    pub fn is_type(&self) -> bool {
        self.kind == TypeKind::TypeOfType
    }

    pub fn is_indexable(&self) -> bool {
        self.is_array() || self.is_string() || self.is_vector()
    }

    pub fn is_integer(&self) -> bool {
        self.kind.is_integer()
    }

    pub fn is_float(&self) -> bool {
        self.kind.is_float()
    }

    pub fn has_definition_scope(&self) -> bool {
        self.definition_scope.is_some()
    }

    /// Same kind, same definition, same qualifiers. Any two strings match.
    pub fn is_same(&self, other: &Type) -> bool {
        if self.is_string() && other.is_string() {
            return true;
        }
        // The kind carries the definition id for structs, functions and objects
        self.kind == other.kind
            && self.is_ref() == other.is_ref()
            && self.is_array() == other.is_array()
            && self.is_vector() == other.is_vector()
            && self.is_const() == other.is_const()
    }

    /// True if a value of this type widens implicitly to `target`
    pub fn is_promotable(&self, target: &Type) -> bool {
        self.kind.promotions().contains(&target.kind)
    }

    /// Can a slot of this type take a value of type `value`? The value's
    /// constness is ignored.
    pub fn accepts(&self, value: &Type) -> bool {
        let mut value_ty = value.clone();
        value_ty.is_const = self.is_const;
        self.is_same(&value_ty) || value.is_promotable(self)
    }

    /// Name of the runtime type-info global describing this type
    pub fn type_info_name(&self) -> String {
        match self.kind {
            TypeKind::Struct(_) | TypeKind::Object(_) | TypeKind::Function(_) => {
                format!("{}_type", self.name)
            }
            kind => format!("{}_type", kind.builtin_name()),
        }
    }

    /// Element type produced by indexing into this type
    pub fn indexed_type(&self) -> Type {
        let mut ty = self.clone();
        ty.elem_count = 0;
        ty
    }

    pub fn make_bounded_array(&mut self, size: i64) {
        self.elem_count = size;
        self.is_read_only = false;
    }

    pub fn make_unbounded_array(&mut self) {
        self.elem_count = -1;
        self.is_read_only = false;
    }

    pub fn make_ref(&mut self) {
        self.is_ref = true;
    }

    pub fn make_const(&mut self) {
        self.is_const = true;
        self.is_read_only = true;
    }

    /// Make this a reference to the given function
    pub fn make_func_ref(&mut self, func: FuncId) {
        self.kind = TypeKind::Function(func);
        self.is_ref = true;
    }

    pub fn make_struct(&mut self, id: StructId) {
        self.kind = TypeKind::Struct(id);
    }

    pub fn make_object(&mut self, id: ObjectId) {
        self.kind = TypeKind::Object(id);
    }

    /// Binary flags for the runtime type information tables
    pub fn encode_flags(&self) -> u32 {
        let mut flags = 0;
        if self.is_ref {
            flags |= 1;
        }
        if self.is_read_only {
            flags |= 2;
        }
        if self.is_const {
            flags |= 4;
        }
        flags
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_const {
            f.write_str("const ")?;
        }
        if self.is_ref {
            f.write_str("@")?;
        }
        match self.kind {
            TypeKind::Struct(_) | TypeKind::Function(_) | TypeKind::Object(_) | TypeKind::Unresolved => {
                f.write_str(&self.name)?
            }
            kind => f.write_str(kind.builtin_name())?,
        }
        if self.is_array() {
            write!(f, "[{}]", self.elem_count)?;
        }
        if self.is_vector() {
            write!(f, "<{}>", self.elem_count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(name: &str) -> Type {
        Type::new(name, Location::dummy())
    }

    #[test]
    fn test_builtin_names_resolve_immediately() {
        assert_eq!(ty("uint32_t").kind, TypeKind::UInt32);
        assert_eq!(ty("string_t").kind, TypeKind::String);
        assert!(ty("List").is_unresolved());
    }

    #[test]
    fn test_at_prefix_makes_reference() {
        let t = ty("@Node");
        assert!(t.is_ref());
        assert_eq!(t.name, "Node");
    }

    #[test]
    fn test_promotion_is_one_directional() {
        let narrow = ty("uint8_t");
        let wide = ty("sint32_t");
        assert!(narrow.is_promotable(&wide));
        assert!(!wide.is_promotable(&narrow));
        assert!(!ty("float64_t").is_promotable(&ty("sint64_t")));
        assert!(!ty("uint32_t").is_promotable(&ty("uint32_t")));
    }

    #[test]
    fn test_signedness_tables() {
        assert!(!ty("sint8_t").is_promotable(&ty("uint16_t")));
        assert!(ty("uint16_t").is_promotable(&ty("sint32_t")));
        assert!(ty("float32_t").is_promotable(&ty("float64_t")));
    }

    #[test]
    fn test_array_and_vector_shapes() {
        let mut arr = ty("uint8_t");
        arr.make_bounded_array(4);
        assert!(arr.is_array());
        assert!(!arr.is_vector());
        assert!(arr.is_indexable());
        assert_eq!(arr.to_string(), "uint8_t[4]");

        let mut vec = ty("float32_t");
        vec.elem_count = 4;
        assert!(vec.is_vector());
        assert_eq!(vec.to_string(), "float32_t<4>");

        let elem = arr.indexed_type();
        assert_eq!(elem.elem_count, 0);
        assert!(!elem.is_indexable());
    }

    #[test]
    fn test_is_same_checks_qualifiers() {
        assert!(ty("uint16_t").is_same(&ty("uint16_t")));
        assert!(!ty("uint16_t").is_same(&ty("uint16_t").constant()));
        assert!(!ty("uint16_t").is_same(&ty("@uint16_t")));
        assert!(ty("string_t").is_same(&ty("string_t").constant()));
    }

    #[test]
    fn test_accepts_ignores_value_constness() {
        let slot = ty("uint16_t");
        assert!(slot.accepts(&ty("uint16_t").constant()));
        assert!(slot.accepts(&ty("uint8_t").constant()));
        assert!(!slot.accepts(&ty("sint16_t")));
        assert!(!slot.accepts(&ty("@uint16_t")));
    }

    #[test]
    fn test_flags_and_display() {
        let t = ty("@sint64_t").constant();
        assert_eq!(t.encode_flags(), 1 | 2 | 4);
        assert_eq!(t.to_string(), "const @sint64_t");
        assert_eq!(t.type_info_name(), "sint64_t_type");
    }

    #[test]
    fn test_null_sentinel_is_not_const() {
        let null = Type::null();
        assert!(null.is_null());
        assert!(!null.is_const());
        assert_eq!(null.to_string(), "null_t");
    }
}
