//! Built-in definitions shared by every module

pub mod builtins;

pub use builtins::Builtins;
