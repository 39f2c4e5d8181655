//! Embed Shield Rule List Compiler
//!
//! This crate compiles human-maintained rule lists into the ESRT snapshot format.

pub mod parser;
pub mod optimizer;
pub mod builder;

pub use builder::{build_snapshot, build_tables, compile_lists, CompileError, CompileStats};
pub use optimizer::{optimize_rules, OptimizeStats};
pub use parser::{parse_rule_list, parse_rule_list_from, CompiledRule, ParseStats, ParsedList};
