//! User-defined functions (spec.md §3 "Function").
//!
//! A function captures its parameter names, its body, and the lexical
//! scope active at the point it was defined -- the closure. Calling it
//! later builds a fresh scope parented at that captured scope, never at
//! the caller's scope (spec.md §4.3 "Function call semantics").

use crate::{ast::Node, scope::Scope};

#[derive(Debug)]
pub struct FunctionDef {
    pub params: Vec<String>,
    pub body: Vec<Node>,
    pub closure: Scope,
}

impl FunctionDef {
    pub fn new(params: Vec<String>, body: Vec<Node>, closure: Scope) -> Self {
        Self { params, body, closure }
    }
}
