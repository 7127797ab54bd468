//! Error handling for the metal semantic core

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Semantic error.
///
/// The `Display` text of each variant is the message recorded in the
/// diagnostics log, so the wording is written for the person compiling.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // ==================== Registration Errors ====================

    #[error("Duplicate definition: {name}")]
    DuplicateDefinition { name: String },

    #[error("struct '{strukt}' already carries its runtime members; '{member}' cannot be added after them")]
    SealedStruct { strukt: String, member: String },

    #[error("'{member}' is reserved for the runtime bookkeeping of struct '{strukt}'")]
    ReservedMember { strukt: String, member: String },

    #[error("Function '{func}' already has a parameter named '{name}'")]
    DuplicateParameter { func: String, name: String },

    #[error("The target {role} type must be an integer builtin, got '{name}'")]
    InvalidTargetType { role: String, name: String },

    #[error("No module named '{name}' is declared.")]
    UnknownModule { name: String },

    // ==================== Name Resolution Errors ====================

    #[error("The scoped type name '{type_name}' refers to a module '{module}' that was not imported.")]
    MissingImport { type_name: String, module: String },

    #[error("The type named '{name}' has no definition scope.")]
    NoDefinitionScope { name: String },

    #[error("The type named '{name}' could not be found during type resolution.")]
    DefinitionNotFound { name: String },

    #[error("The definition named '{name}' was found, but its own type is unresolved and cannot be classified.")]
    UnclassifiableDefinition { name: String },

    #[error(
        "struct '{strukt}' has a member named '{member}' which is supposedly of a type called '{ty}'. \
         However that type is not a primitive, nor has it been found defined in the current module."
    )]
    UnboundMember { strukt: String, member: String, ty: String },

    #[error(
        "struct '{strukt}' has a member named '{member}' whose type name includes a scope modifier. \
         One or more scope modifiers in type name '{ty}' cannot be found."
    )]
    UnresolvedScopedMember { strukt: String, member: String, ty: String },

    #[error("Undefined name: {name}")]
    UndefinedName { name: String },

    // ==================== Expression Errors ====================

    #[error("Cannot construct an instance of type '{name}', no definition for the type was found.")]
    UndefinedConstructorType { name: String },

    #[error("Cannot construct an instance of '{name}', it is not a struct.")]
    NotAStruct { name: String },

    #[error("Too many arguments in the constructor. The type has {members} members, the constructor specified {given}.")]
    TooManyInitializers { given: usize, members: usize },

    #[error(
        "The types of argument {index} are not the same between the struct constructor and the struct definition. \
         The definition claims type '{expected}', while the constructor uses type '{got}'"
    )]
    ArgumentTypeMismatch {
        index: usize,
        expected: String,
        got: String,
    },

    #[error(
        "This construct requires that all initializer expressions be constant types. \
         Argument {index} of type '{ty}' does not fit this constraint."
    )]
    NonConstInitializer { index: usize, ty: String },

    #[error("Unknown operator '{symbol}'.")]
    UnknownOperator { symbol: String },

    #[error("The constant '{name}' is declared as '{expected}', but its value has type '{got}'.")]
    ConstantTypeMismatch {
        name: String,
        expected: String,
        got: String,
    },

    #[error("A constant value is required, but the '{op}' expression is not constant.")]
    NotConstant { op: String },

    #[error("The type of the source for the index operation is '{ty}', which is not an indexable type.")]
    NotIndexable { ty: String },
}
