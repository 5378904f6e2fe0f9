#![doc = include_str!("../../../README.md")]

//! The embeddable scripting runtime (spec.md §1-2).
//!
//! One module per component named in spec.md §2:
//!
//! - [`lexer`]/[`parser`]/[`ast`] -- component B, source text to AST.
//! - [`scope`]/[`function`]/[`eval`] -- component C, lexical scoping and the
//!   tree-walking evaluator.
//! - [`value`] -- component A, the polymorphic `Value` model.
//! - [`builtins`] -- component D, the built-in function registry.
//! - [`tree`] -- component E, tree nodes, CSV backing, and serialization.
//! - [`debugger`] -- component F, breakpoints/stepping/event pub-sub.
//! - `builtins::etl` -- component G, the CSV-to-target ETL pipeline.
//! - [`session`] -- component H, per-user session lifecycle and the reaper.
//! - [`secure`] -- component I, signed/encrypted tree snapshots.
//! - [`adapters`] -- component J, the SQL/document-store adapter traits.

pub mod adapters;
pub mod ast;
pub mod builtins;
pub mod config;
pub mod debugger;
pub mod error;
pub mod eval;
pub mod function;
pub mod lexer;
pub mod log;
pub mod object_table;
pub mod parser;
pub mod paths;
pub mod pos;
pub mod scope;
pub mod secure;
pub mod session;
pub mod tree;
pub mod value;

pub use crate::{
    config::{EngineConfig, TreeFormat},
    debugger::{DebugEvent, DebugEventKind, Debugger},
    error::{EngineError, ErrorKind, EvalResult, Flow, Sentinel, StructuredError},
    eval::Evaluator,
    log::{EngineLog, Level, NoopLog, StderrLog},
    parser::parse_program,
    scope::Scope,
    session::{Session, SessionManager, SessionToken},
    value::Value,
};
