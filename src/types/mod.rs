//! Type representation and resolution state

pub mod type_system;

pub use type_system::{Type, TypeKind};
