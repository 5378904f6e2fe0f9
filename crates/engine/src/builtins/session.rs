//! Session lifecycle hook registration (component D's "session" registry
//! group, backing component H, spec.md §4.8: "A `Run()` method launches a
//! per-session goroutine that fires `OnStart` and waits on a stop signal to
//! fire `OnExit`.").
//!
//! A session's bootstrap script (named by configuration, spec.md §4.8) is
//! the natural place to call `onStart`/`onExit`: it runs once, before any
//! caller script, inside the same evaluator the session's worker thread
//! owns for its whole lifetime (see [`crate::session`]). The hooks
//! themselves are stored as ordinary global bindings so firing one is just
//! an ordinary function call through [`crate::eval::Evaluator::call_function`].

use crate::{
    builtins::BuiltinTable,
    error::{EngineError, EvalResult, Flow},
    eval::Evaluator,
    pos::SourcePos,
    scope::Scope,
    value::Value,
};

pub(crate) const ON_START_HOOK: &str = "__on_start_hook__";
pub(crate) const ON_EXIT_HOOK: &str = "__on_exit_hook__";

fn as_function(args: &[Value], name: &str, pos: &SourcePos) -> EvalResult<std::rc::Rc<crate::function::FunctionDef>> {
    match args.first() {
        Some(Value::Function(f)) => Ok(f.clone()),
        other => Err(Flow::Error(
            EngineError::type_error(format!("{name}: expected a function, found {}", other.map(Value::type_name).unwrap_or("nothing"))).with_pos(pos.clone()),
        )),
    }
}

fn on_start(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let func = as_function(&args, "onStart", pos)?;
    eval.global.declare_local(ON_START_HOOK, Value::Function(func));
    Ok(Value::Null)
}

fn on_exit(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let func = as_function(&args, "onExit", pos)?;
    eval.global.declare_local(ON_EXIT_HOOK, Value::Function(func));
    Ok(Value::Null)
}

pub fn register(table: &mut BuiltinTable) {
    table.register("onStart", on_start);
    table.register("onExit", on_exit);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::EngineConfig, parser::parse_program, pos::SourcePos};
    use std::rc::Rc;

    #[test]
    fn on_start_registers_a_callable_global_hook() {
        let program = parse_program("test", "onStart(func(){ 42 })").unwrap();
        let eval = Evaluator::new(Rc::new(EngineConfig::default()));
        eval.run(&program).unwrap();

        let Some(Value::Function(hook)) = eval.global.get(ON_START_HOOK) else { panic!("hook not registered") };
        let result = eval.call_function(&hook, Vec::new(), &SourcePos::synthetic()).unwrap();
        assert!(matches!(result, Value::Number(n) if n == 42.0));
    }
}
