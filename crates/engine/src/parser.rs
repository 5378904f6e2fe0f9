//! Recursive-descent parser (component B): tokens → [`Node`] AST.
//!
//! Every node records the source position of its leading token (Testable
//! Property 1). Parse errors carry the offending token's position and are
//! never silently swallowed (spec.md §4.2 "Error handling").

use std::rc::Rc;

use crate::{
    ast::{DeclareKind, ElseBranch, Node, NodeKind},
    error::EngineError,
    lexer::{Lexer, Token, TokenKind},
    pos::SourcePos,
};

pub struct Parser {
    tokens: Vec<Token>,
    index: usize,
}

/// Parses a complete script into top-level statements.
pub fn parse_program(file: impl Into<Rc<str>>, source: &str) -> Result<Vec<Node>, EngineError> {
    let tokens = Lexer::new(file, source).tokenize()?;
    Parser::new(tokens).parse_program()
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, index: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.index]
    }

    fn pos(&self) -> SourcePos {
        self.peek().pos.clone()
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.index].clone();
        if self.index + 1 < self.tokens.len() {
            self.index += 1;
        }
        tok
    }

    fn is_punct(&self, c: char) -> bool {
        matches!(&self.peek().kind, TokenKind::Punct(p) if *p == c)
    }

    fn is_ident(&self, name: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(s) if s == name)
    }

    fn expect_punct(&mut self, c: char) -> Result<(), EngineError> {
        if self.is_punct(c) {
            self.bump();
            Ok(())
        } else {
            Err(EngineError::parse(format!("expected '{c}', found {:?}", self.peek().kind), self.pos()))
        }
    }

    fn expect_ident(&mut self, name: &str) -> Result<(), EngineError> {
        if self.is_ident(name) {
            self.bump();
            Ok(())
        } else {
            Err(EngineError::parse(format!("expected '{name}', found {:?}", self.peek().kind), self.pos()))
        }
    }

    pub fn parse_program(&mut self) -> Result<Vec<Node>, EngineError> {
        let nodes = self.parse_block_until_eof()?;
        Ok(nodes)
    }

    fn parse_block_until_eof(&mut self) -> Result<Vec<Node>, EngineError> {
        let mut out = Vec::new();
        while !self.at_eof() {
            out.push(self.parse_expr()?);
        }
        Ok(out)
    }

    /// Parses statements until the next `}`, which is left unconsumed.
    fn parse_block(&mut self) -> Result<Vec<Node>, EngineError> {
        let mut out = Vec::new();
        while !self.is_punct('}') && !self.at_eof() {
            out.push(self.parse_expr()?);
        }
        Ok(out)
    }

    pub fn parse_expr(&mut self) -> Result<Node, EngineError> {
        let pos = self.pos();
        match self.peek().kind.clone() {
            TokenKind::Number(n) => {
                self.bump();
                Ok(Node::new(NodeKind::Number(n), pos))
            }
            TokenKind::Str(s) => {
                self.bump();
                Ok(Node::new(NodeKind::String(s), pos))
            }
            TokenKind::Punct('[') => self.parse_array(pos),
            TokenKind::Ident(name) => {
                self.bump();
                self.parse_ident_form(name, pos)
            }
            other => Err(EngineError::parse(format!("unexpected token {other:?}"), pos)),
        }
    }

    fn parse_array(&mut self, pos: SourcePos) -> Result<Node, EngineError> {
        self.expect_punct('[')?;
        let mut items = Vec::new();
        if !self.is_punct(']') {
            items.push(self.parse_expr()?);
            while self.is_punct(',') {
                self.bump();
                items.push(self.parse_expr()?);
            }
        }
        self.expect_punct(']')?;
        Ok(Node::new(NodeKind::Array(items), pos))
    }

    fn parse_ident_form(&mut self, name: String, pos: SourcePos) -> Result<Node, EngineError> {
        match name.as_str() {
            "if" => self.parse_if(pos),
            "while" => self.parse_while(pos),
            "switch" => self.parse_switch(pos),
            "func" => self.parse_func(pos),
            _ => {
                if let Some(kind) = DeclareKind::from_name(&name) {
                    self.parse_declare(kind, pos)
                } else {
                    self.parse_call_or_ident(name, pos)
                }
            }
        }
    }

    fn parse_if(&mut self, pos: SourcePos) -> Result<Node, EngineError> {
        self.expect_punct('(')?;
        let cond = self.parse_expr()?;
        self.expect_punct(')')?;
        self.expect_punct('{')?;
        let then_block = self.parse_block()?;
        self.expect_punct('}')?;

        let else_branch = if self.is_ident("else") {
            self.bump();
            if self.is_ident("if") {
                let inner_pos = self.pos();
                self.bump();
                Some(ElseBranch::ElseIf(Box::new(self.parse_if(inner_pos)?)))
            } else {
                self.expect_punct('{')?;
                let block = self.parse_block()?;
                self.expect_punct('}')?;
                Some(ElseBranch::Block(block))
            }
        } else {
            None
        };

        Ok(Node::new(NodeKind::If { cond: Box::new(cond), then_block, else_branch }, pos))
    }

    fn parse_while(&mut self, pos: SourcePos) -> Result<Node, EngineError> {
        self.expect_punct('(')?;
        let cond = self.parse_expr()?;
        self.expect_punct(')')?;
        self.expect_punct('{')?;
        let body = self.parse_block()?;
        self.expect_punct('}')?;
        Ok(Node::new(NodeKind::While { cond: Box::new(cond), body }, pos))
    }

    fn parse_switch(&mut self, pos: SourcePos) -> Result<Node, EngineError> {
        self.expect_punct('(')?;
        let subject = if self.is_punct(')') { None } else { Some(Box::new(self.parse_expr()?)) };
        self.expect_punct(')')?;
        self.expect_punct('{')?;

        let mut cases = Vec::new();
        let mut default = None;
        while !self.is_punct('}') {
            if self.is_ident("case") {
                self.bump();
                self.expect_punct('(')?;
                let value = self.parse_expr()?;
                self.expect_punct(')')?;
                self.expect_punct('{')?;
                let block = self.parse_block()?;
                self.expect_punct('}')?;
                cases.push((value, block));
            } else if self.is_ident("default") {
                self.bump();
                self.expect_punct('(')?;
                self.expect_punct(')')?;
                self.expect_punct('{')?;
                let block = self.parse_block()?;
                self.expect_punct('}')?;
                default = Some(block);
            } else {
                return Err(EngineError::parse(format!("expected 'case' or 'default', found {:?}", self.peek().kind), self.pos()));
            }
        }
        self.expect_punct('}')?;
        Ok(Node::new(NodeKind::Switch { subject, cases, default }, pos))
    }

    fn parse_func(&mut self, pos: SourcePos) -> Result<Node, EngineError> {
        self.expect_punct('(')?;
        let mut params = Vec::new();
        if !self.is_punct(')') {
            params.push(self.expect_param_ident()?);
            while self.is_punct(',') {
                self.bump();
                params.push(self.expect_param_ident()?);
            }
        }
        self.expect_punct(')')?;
        self.expect_punct('{')?;
        let body = self.parse_block()?;
        self.expect_punct('}')?;
        Ok(Node::new(NodeKind::Func { params, body }, pos))
    }

    fn expect_param_ident(&mut self) -> Result<String, EngineError> {
        match self.bump().kind {
            TokenKind::Ident(name) => Ok(name),
            other => Err(EngineError::parse(format!("expected parameter name, found {other:?}"), self.pos())),
        }
    }

    /// `declare`/`declareGlobal`/`setq`/`createTransform`: the first argument
    /// is a naked identifier, never evaluated as an expression (spec.md §4.3).
    fn parse_declare(&mut self, kind: DeclareKind, pos: SourcePos) -> Result<Node, EngineError> {
        self.expect_punct('(')?;
        let target = self.expect_param_ident()?;
        let mut rest = Vec::new();
        while self.is_punct(',') {
            self.bump();
            rest.push(self.parse_expr()?);
        }
        self.expect_punct(')')?;
        Ok(Node::new(NodeKind::Declare { kind, target, rest }, pos))
    }

    fn parse_call_or_ident(&mut self, name: String, pos: SourcePos) -> Result<Node, EngineError> {
        let mut saw_parens = false;
        let mut args = Vec::new();
        if self.is_punct('(') {
            saw_parens = true;
            self.bump();
            if !self.is_punct(')') {
                args.push(self.parse_expr()?);
                while self.is_punct(',') {
                    self.bump();
                    args.push(self.parse_expr()?);
                }
            }
            self.expect_punct(')')?;
        }

        let block = if self.is_punct('{') {
            self.bump();
            let body = self.parse_block()?;
            self.expect_punct('}')?;
            Some(body)
        } else {
            None
        };

        if !saw_parens && block.is_none() {
            return Ok(Node::new(NodeKind::Ident(name), pos));
        }
        Ok(Node::new(NodeKind::Call { name, args, block }, pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Vec<Node> {
        parse_program("test", src).unwrap()
    }

    #[test]
    fn bare_ident_has_no_call_node() {
        let nodes = parse("x");
        assert!(matches!(nodes[0].kind, NodeKind::Ident(ref n) if n == "x"));
    }

    #[test]
    fn zero_arg_call_is_distinct_from_bare_ident() {
        let nodes = parse("x()");
        assert!(matches!(nodes[0].kind, NodeKind::Call { ref name, .. } if name == "x"));
    }

    #[test]
    fn declare_first_arg_is_naked_identifier() {
        let nodes = parse("declare(x, 5)");
        match &nodes[0].kind {
            NodeKind::Declare { kind, target, rest } => {
                assert_eq!(*kind, DeclareKind::Declare);
                assert_eq!(target, "x");
                assert_eq!(rest.len(), 1);
            }
            other => panic!("expected Declare, got {other:?}"),
        }
    }

    #[test]
    fn if_else_if_chain() {
        let nodes = parse("if (1) { 2 } else if (3) { 4 } else { 5 }");
        match &nodes[0].kind {
            NodeKind::If { else_branch: Some(ElseBranch::ElseIf(inner)), .. } => {
                assert!(matches!(inner.kind, NodeKind::If { .. }));
            }
            other => panic!("expected nested if, got {other:?}"),
        }
    }

    #[test]
    fn switch_with_subject_and_default() {
        let nodes = parse(r#"switch(3){ case(1){ "a" } case(3){ "c" } default(){ "z" } }"#);
        match &nodes[0].kind {
            NodeKind::Switch { subject: Some(_), cases, default: Some(_) } => {
                assert_eq!(cases.len(), 2);
            }
            other => panic!("expected switch with subject, got {other:?}"),
        }
    }

    #[test]
    fn func_with_params_and_body() {
        let nodes = parse("func(a, b) { a }");
        match &nodes[0].kind {
            NodeKind::Func { params, body } => {
                assert_eq!(params, &vec!["a".to_string(), "b".to_string()]);
                assert_eq!(body.len(), 1);
            }
            other => panic!("expected func, got {other:?}"),
        }
    }

    #[test]
    fn array_literal() {
        let nodes = parse("[1, 2, 3]");
        assert!(matches!(&nodes[0].kind, NodeKind::Array(items) if items.len() == 3));
    }

    #[test]
    fn unterminated_call_is_parse_error() {
        let err = parse_program("test", "foo(1, 2").unwrap_err();
        assert!(matches!(err.kind, crate::error::ErrorKind::Parse));
    }
}
