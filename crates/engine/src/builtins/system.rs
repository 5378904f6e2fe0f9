//! Control-flow and host-interaction built-ins (component D).
//!
//! `break`/`continue`/`return`/`exit` are ordinary calls from the parser's
//! point of view but produce [`crate::error::Sentinel`]s rather than
//! values, caught by the loop/function/top-level constructs that own that
//! control-flow shape (spec.md §4.3, §9).

use crate::{
    builtins::BuiltinTable,
    error::{EvalResult, Flow, Sentinel},
    eval::Evaluator,
    log::Level,
    pos::SourcePos,
    scope::Scope,
    value::Value,
};

fn break_builtin(_eval: &Evaluator, _scope: &Scope, _args: Vec<Value>, _pos: &SourcePos) -> EvalResult<Value> {
    Err(Flow::Sentinel(Sentinel::Break))
}

fn continue_builtin(_eval: &Evaluator, _scope: &Scope, _args: Vec<Value>, _pos: &SourcePos) -> EvalResult<Value> {
    Err(Flow::Sentinel(Sentinel::Continue))
}

fn return_builtin(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, _pos: &SourcePos) -> EvalResult<Value> {
    Err(Flow::Sentinel(Sentinel::Return(args.into_iter().next().unwrap_or(Value::Null))))
}

fn exit_builtin(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, _pos: &SourcePos) -> EvalResult<Value> {
    let code = match args.into_iter().next() {
        Some(Value::Number(n)) => n as i32,
        _ => 0,
    };
    Err(Flow::Sentinel(Sentinel::Exit(code)))
}

fn print_builtin(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, _pos: &SourcePos) -> EvalResult<Value> {
    let rendered = args.iter().map(Value::to_string).collect::<Vec<_>>().join(" ");
    eval.log(Level::Info, "script", &rendered);
    Ok(Value::Null)
}

fn type_of(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, _pos: &SourcePos) -> EvalResult<Value> {
    Ok(Value::string(args.first().map(Value::type_name).unwrap_or("null")))
}

fn is_null(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, _pos: &SourcePos) -> EvalResult<Value> {
    Ok(Value::Bool(matches!(args.first(), None | Some(Value::Null))))
}

pub fn register(table: &mut BuiltinTable) {
    table.register("break", break_builtin);
    table.register("continue", continue_builtin);
    table.register("return", return_builtin);
    table.register("exit", exit_builtin);
    table.register("print", print_builtin);
    table.register("typeOf", type_of);
    table.register("isNull", is_null);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::EngineConfig, parser::parse_program};
    use std::rc::Rc;

    #[test]
    fn exit_escapes_as_ok_with_code_at_top_level() {
        let program = parse_program("test", "print(1); exit(7); print(2)").unwrap();
        let eval = Evaluator::new(Rc::new(EngineConfig::default()));
        let err = eval.run(&program).unwrap_err();
        assert!(matches!(err, Flow::Sentinel(Sentinel::Exit(7))));
    }

    #[test]
    fn break_outside_loop_is_uncaught_sentinel() {
        let program = parse_program("test", "break()").unwrap();
        let eval = Evaluator::new(Rc::new(EngineConfig::default()));
        let err = eval.run(&program).unwrap_err();
        assert!(matches!(err, Flow::Sentinel(Sentinel::Break)));
    }

    #[test]
    fn type_of_reports_variant_name() {
        let program = parse_program("test", r#"typeOf("x")"#).unwrap();
        let eval = Evaluator::new(Rc::new(EngineConfig::default()));
        assert!(matches!(eval.run(&program).unwrap(), Value::String(ref s) if &**s == "string"));
    }
}
