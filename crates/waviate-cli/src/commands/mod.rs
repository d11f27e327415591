//! CLI command implementations.

pub mod check;
pub mod common;
pub mod operators;
pub mod run;
