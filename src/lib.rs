//! metalc
//!
//! Semantic core of the metal ahead-of-time compiler: the type system,
//! lexical scopes, struct registration with attribute tables, expression
//! resolution and checking, and the constant solver.

pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod expr;
pub mod scope;
pub mod stdlib;
pub mod types;
pub mod utils;
