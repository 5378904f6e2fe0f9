//! Tree-walking evaluator (component C).
//!
//! Carries a `Runtime`-equivalent bundle (global scope, builtin registry,
//! named host-object table, optional debugger) and walks the AST produced by
//! [`crate::parser`]. Control flow is modeled as typed [`Sentinel`]s
//! propagated through [`EvalResult`], never reused as ordinary errors
//! (spec.md §4.3, §9).

use std::{cell::RefCell, rc::Rc, sync::Arc};

use crate::{
    ast::{DeclareKind, ElseBranch, Node, NodeKind},
    builtins::{self, BuiltinTable},
    config::EngineConfig,
    debugger::{Debugger, StackFrame},
    error::{EngineError, ErrorKind, EvalResult, Flow, Sentinel},
    function::FunctionDef,
    log::{EngineLog, Level, NoopLog},
    object_table::ObjectTable,
    pos::SourcePos,
    scope::Scope,
    tree::arena::TreeArena,
    value::Value,
};

/// Everything a single evaluator needs to run scripts: global scope, the
/// built-in registry, the named host-object table, and optional debugger
/// hookup. One `Evaluator` belongs to exactly one session (spec.md §5:
/// "each evaluator is single-writer and must not be shared across
/// concurrent callers").
pub struct Evaluator {
    pub global: Scope,
    pub builtins: Rc<BuiltinTable>,
    pub objects: ObjectTable,
    pub debugger: Option<Arc<Debugger>>,
    pub config: Rc<EngineConfig>,
    pub log: Rc<dyn EngineLog>,
    /// The single forest every `Value::TreeNode` created by this session's
    /// built-ins belongs to, so tree-wide search (`treeFind`) can walk
    /// multiple root nodes from one evaluator without callers having to
    /// thread an arena handle through every script-facing call.
    pub trees: TreeArena,
    call_stack: RefCell<Vec<StackFrame>>,
}

impl Evaluator {
    pub fn new(config: Rc<EngineConfig>) -> Self {
        Self::with_log(config, Rc::new(NoopLog))
    }

    pub fn with_log(config: Rc<EngineConfig>, log: Rc<dyn EngineLog>) -> Self {
        Self {
            global: Scope::root(),
            builtins: Rc::new(builtins::build_table()),
            objects: ObjectTable::new(),
            debugger: None,
            config,
            log,
            trees: TreeArena::new(),
            call_stack: RefCell::new(Vec::new()),
        }
    }

    pub fn attach_debugger(&mut self, debugger: Arc<Debugger>) {
        self.debugger = Some(debugger);
    }

    pub fn call_depth(&self) -> usize {
        self.call_stack.borrow().len()
    }

    pub fn call_stack_snapshot(&self) -> Vec<StackFrame> {
        self.call_stack.borrow().clone()
    }

    /// Runs a parsed program's top-level statements in the global scope,
    /// returning the last statement's value.
    ///
    /// An escaping `Exit` sentinel is surfaced to the caller as `Ok` so the
    /// embedder (spec.md §6 "CLI / exit codes") can read the code; any other
    /// escaping sentinel or error is returned as `Err`.
    pub fn run(&self, program: &[Node]) -> EvalResult<Value> {
        let scope = self.global.clone();
        self.eval_block(&scope, program)
    }

    pub fn eval_block(&self, scope: &Scope, nodes: &[Node]) -> EvalResult<Value> {
        let mut last = Value::Null;
        for node in nodes {
            self.debug_checkpoint(node.pos.clone())?;
            last = self.eval_node(scope, node)?;
        }
        Ok(last)
    }

    /// Consults the debugger (if attached) before executing a statement,
    /// blocking cooperatively if it decides to pause. A force-stopped
    /// debugger surfaces as a `Cancelled` error (spec.md §7).
    fn debug_checkpoint(&self, pos: SourcePos) -> EvalResult<()> {
        let Some(debugger) = &self.debugger else { return Ok(()) };
        if !debugger.any_active() {
            return Ok(());
        }
        let stack = self.call_stack_snapshot();
        if debugger.force_stopped() {
            return Err(Flow::Error(EngineError::new(ErrorKind::Cancelled, "evaluator was force-stopped")));
        }
        debugger.checkpoint(&pos, self.call_depth(), &stack);
        if debugger.force_stopped() {
            return Err(Flow::Error(EngineError::new(ErrorKind::Cancelled, "evaluator was force-stopped")));
        }
        Ok(())
    }

    pub fn eval_node(&self, scope: &Scope, node: &Node) -> EvalResult<Value> {
        match &node.kind {
            NodeKind::Number(n) => Ok(Value::Number(*n)),
            NodeKind::String(s) => Ok(Value::string(s.clone())),
            NodeKind::Ident(name) => Ok(scope.resolve(name).map_err(|e| e.with_pos(node.pos.clone()))?.unwrap_scope_entry()),
            NodeKind::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_node(scope, item)?);
                }
                Ok(Value::array(values))
            }
            NodeKind::Declare { kind, target, rest } => self.eval_declare(scope, *kind, target, rest),
            NodeKind::If { cond, then_block, else_branch } => self.eval_if(scope, cond, then_block, else_branch),
            NodeKind::While { cond, body } => self.eval_while(scope, cond, body),
            NodeKind::Switch { subject, cases, default } => self.eval_switch(scope, subject, cases, default),
            NodeKind::Func { params, body } => {
                Ok(Value::Function(Rc::new(FunctionDef::new(params.clone(), body.clone(), scope.clone()))))
            }
            NodeKind::Call { name, args, block } => self.eval_call(scope, name, args, block.as_deref(), &node.pos),
        }
    }

    fn eval_declare(&self, scope: &Scope, kind: DeclareKind, target: &str, rest: &[Node]) -> EvalResult<Value> {
        if kind == DeclareKind::CreateTransform {
            let value = builtins::etl::create_transform(self, target, rest, scope)?;
            scope.declare_local(target, value.clone());
            return Ok(value);
        }

        let mut value = Value::Null;
        for expr in rest {
            value = self.eval_node(scope, expr)?;
        }
        match kind {
            DeclareKind::Declare => scope.declare_local(target, value.clone()),
            DeclareKind::DeclareGlobal => scope.declare_global(target, value.clone()),
            DeclareKind::Setq => scope.set(target, value.clone()),
            DeclareKind::CreateTransform => unreachable!("handled above"),
        }
        Ok(value)
    }

    fn eval_if(
        &self,
        scope: &Scope,
        cond: &Node,
        then_block: &[Node],
        else_branch: &Option<ElseBranch>,
    ) -> EvalResult<Value> {
        if self.eval_node(scope, cond)?.truthy() {
            return self.eval_block(scope, then_block);
        }
        match else_branch {
            Some(ElseBranch::ElseIf(inner)) => self.eval_node(scope, inner),
            Some(ElseBranch::Block(block)) => self.eval_block(scope, block),
            None => Ok(Value::Null),
        }
    }

    fn eval_while(&self, scope: &Scope, cond: &Node, body: &[Node]) -> EvalResult<Value> {
        loop {
            if !self.eval_node(scope, cond)?.truthy() {
                return Ok(Value::Null);
            }
            match self.eval_block(scope, body) {
                Ok(_) => {}
                Err(Flow::Sentinel(Sentinel::Break)) => return Ok(Value::Null),
                Err(Flow::Sentinel(Sentinel::Continue)) => continue,
                other => {
                    other?;
                }
            }
        }
    }

    fn eval_switch(
        &self,
        scope: &Scope,
        subject: &Option<Box<Node>>,
        cases: &[(Node, Vec<Node>)],
        default: &Option<Vec<Node>>,
    ) -> EvalResult<Value> {
        match subject {
            Some(subject_expr) => {
                let subject_val = self.eval_node(scope, subject_expr)?;
                for (case_expr, block) in cases {
                    let case_val = self.eval_node(scope, case_expr)?;
                    if self.values_equal(scope, &subject_val, &case_val)? {
                        return self.eval_block(scope, block);
                    }
                }
            }
            None => {
                for (cond_expr, block) in cases {
                    if self.eval_node(scope, cond_expr)?.truthy() {
                        return self.eval_block(scope, block);
                    }
                }
            }
        }
        match default {
            Some(block) => self.eval_block(scope, block),
            None => Ok(Value::Null),
        }
    }

    /// `switch(expr)` case comparison: the registered `equal` builtin if
    /// present, else variant-structural/pointer comparison (spec.md §4.3).
    fn values_equal(&self, scope: &Scope, a: &Value, b: &Value) -> EvalResult<bool> {
        if let Some(equal_fn) = self.builtins.get("equal") {
            let result = equal_fn(self, scope, vec![a.clone(), b.clone()], &SourcePos::synthetic())?;
            return Ok(result.truthy());
        }
        Ok(a.value_eq(b))
    }

    fn eval_call(
        &self,
        scope: &Scope,
        name: &str,
        args: &[Node],
        _block: Option<&[Node]>,
        pos: &SourcePos,
    ) -> EvalResult<Value> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_node(scope, arg)?);
        }

        if let Some(handler) = self.builtins.get(name) {
            return handler(self, scope, values, pos);
        }

        let candidate = scope.resolve(name).map_err(|e| e.with_pos(pos.clone()))?.unwrap_scope_entry();
        match candidate {
            Value::Function(func) => self.call_function(&func, values, pos),
            Value::Plan(plan) => self.call_plan(&plan, values, pos),
            other => Err(Flow::Error(EngineError::type_error(format!(
                "'{name}' is not callable (found {})",
                other.type_name()
            ))
            .with_pos(pos.clone()))),
        }
    }

    /// Function call semantics (spec.md §4.3): a fresh scope parented at the
    /// function's *captured* scope (lexical closure, Testable Property 2),
    /// positional binding, body evaluated as a block, `Return` caught here.
    pub fn call_function(&self, func: &Rc<FunctionDef>, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
        let call_scope = Scope::child_of(&func.closure);
        for (i, param) in func.params.iter().enumerate() {
            call_scope.declare_local(param, args.get(i).cloned().unwrap_or(Value::Null));
        }

        self.call_stack.borrow_mut().push(StackFrame::at(None, pos));
        let result = self.eval_block(&call_scope, &func.body);
        self.call_stack.borrow_mut().pop();

        match result {
            Ok(value) => Ok(value),
            Err(Flow::Sentinel(Sentinel::Return(value))) => Ok(value),
            other => other,
        }
    }

    fn call_plan(&self, plan: &Rc<crate::value::PlanDef>, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
        if let Some(guard) = &plan.guard {
            if !self.call_function(guard, args.clone(), pos)?.truthy() {
                return Ok(Value::Null);
            }
        }
        if let Some(trigger) = &plan.trigger {
            self.call_function(trigger, args.clone(), pos)?;
        }
        let mut last = Value::Null;
        for step in &plan.steps {
            last = self.call_function(step, args.clone(), pos)?;
        }
        if let Some(drop) = &plan.drop {
            self.call_function(drop, args.clone(), pos)?;
        }
        Ok(last)
    }

    pub fn log(&self, level: Level, target: &str, message: &str) {
        self.log.log(level, target, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn run(src: &str) -> Value {
        let program = parse_program("test", src).unwrap();
        let eval = Evaluator::new(Rc::new(EngineConfig::default()));
        match eval.run(&program) {
            Ok(v) => v,
            Err(e) => panic!("eval error: {e}"),
        }
    }

    #[test]
    fn closure_captures_defining_scope() {
        let v = run("declare(mk, func(x){ func(){ x } }); declare(c, mk(7)); c()");
        assert!(matches!(v, Value::Number(n) if n == 7.0));
    }

    #[test]
    fn while_loop_accumulates() {
        let v = run("declare(i,0); declare(s,0); while(less(i,5)){ setq(s, add(s,i)); setq(i, add(i,1)) }; s");
        assert!(matches!(v, Value::Number(n) if n == 10.0));
    }

    #[test]
    fn switch_with_subject_matches_first_case() {
        let v = run(r#"switch(3){ case(1){ "a" } case(3){ "c" } default(){ "z" } }"#);
        assert!(matches!(v, Value::String(ref s) if &**s == "c"));
    }

    #[test]
    fn polymorphic_length() {
        assert!(matches!(run(r#"length("hello")"#), Value::Number(n) if n == 5.0));
        assert!(matches!(run("length(array(1,2,3))"), Value::Number(n) if n == 3.0));
        assert!(matches!(run("length(null)"), Value::Number(n) if n == 0.0));
    }

    #[test]
    fn break_and_continue_are_caught_by_the_loop() {
        let v = run("declare(i,0); declare(s,0); while(less(i,10)){ setq(i, add(i,1)); if (equal(mod(i,2),0)) { continue() }; if (equal(i,7)) { break() }; setq(s, add(s,i)) }; s");
        // i: 1(odd,+1=1) 2(even,skip) 3(odd,+3=4) 4(skip) 5(odd,+5=9) 6(skip) 7 -> break
        assert!(matches!(v, Value::Number(n) if n == 9.0));
    }

    #[test]
    fn unknown_function_is_resolution_error() {
        let program = parse_program("test", "thisDoesNotExist()").unwrap();
        let eval = Evaluator::new(Rc::new(EngineConfig::default()));
        let err = eval.run(&program).unwrap_err();
        assert!(matches!(err, Flow::Error(e) if matches!(e.kind, ErrorKind::Resolution)));
    }
}
