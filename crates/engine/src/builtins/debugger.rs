//! Script-facing wrappers around [`crate::debugger::Debugger`] (component F).
//!
//! These let a script (or, more realistically, a host-side admin script
//! running against a shared evaluator) drive the same debugger surface a
//! host would reach through the Rust API directly. Every builtin here is a
//! no-op-with-error when no debugger is attached to the evaluator, rather
//! than panicking -- a script shouldn't be able to crash the host by
//! probing for a debugger that isn't there.

use crate::{
    builtins::BuiltinTable,
    error::{EngineError, EvalResult, Flow},
    eval::Evaluator,
    pos::SourcePos,
    scope::Scope,
    value::Value,
};

fn require_debugger<'a>(eval: &'a Evaluator, pos: &SourcePos) -> EvalResult<&'a std::sync::Arc<crate::debugger::Debugger>> {
    eval.debugger
        .as_ref()
        .ok_or_else(|| Flow::Error(EngineError::validation("no debugger is attached to this evaluator").with_pos(pos.clone())))
}

fn as_string(args: &[Value], i: usize, name: &str, pos: &SourcePos) -> EvalResult<String> {
    match args.get(i) {
        Some(Value::String(s)) => Ok(s.to_string()),
        other => Err(Flow::Error(
            EngineError::type_error(format!("{name}: argument {} must be a string, found {}", i + 1, other.map(Value::type_name).unwrap_or("nothing")))
                .with_pos(pos.clone()),
        )),
    }
}

fn as_u32(args: &[Value], i: usize, name: &str, pos: &SourcePos) -> EvalResult<u32> {
    match args.get(i) {
        Some(Value::Number(n)) => Ok(*n as u32),
        other => Err(Flow::Error(
            EngineError::type_error(format!("{name}: argument {} must be a number, found {}", i + 1, other.map(Value::type_name).unwrap_or("nothing")))
                .with_pos(pos.clone()),
        )),
    }
}

fn set_breakpoint(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let debugger = require_debugger(eval, pos)?;
    let file = as_string(&args, 0, "setBreakpoint", pos)?;
    let line = as_u32(&args, 1, "setBreakpoint", pos)?;
    let condition = match args.get(2) {
        Some(Value::String(s)) => Some(s.to_string()),
        _ => None,
    };
    debugger.set_breakpoint(&file, line, condition);
    Ok(Value::Null)
}

fn remove_breakpoint(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let debugger = require_debugger(eval, pos)?;
    let file = as_string(&args, 0, "removeBreakpoint", pos)?;
    let line = as_u32(&args, 1, "removeBreakpoint", pos)?;
    debugger.remove_breakpoint(&file, line);
    Ok(Value::Null)
}

fn set_breakpoint_enabled(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let debugger = require_debugger(eval, pos)?;
    let file = as_string(&args, 0, "setBreakpointEnabled", pos)?;
    let line = as_u32(&args, 1, "setBreakpointEnabled", pos)?;
    let enabled = matches!(args.get(2), Some(v) if v.truthy());
    debugger.set_breakpoint_enabled(&file, line, enabled);
    Ok(Value::Null)
}

fn debug_continue(eval: &Evaluator, _scope: &Scope, _args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let debugger = require_debugger(eval, pos)?;
    debugger.continue_();
    Ok(Value::Null)
}

fn step_over(eval: &Evaluator, _scope: &Scope, _args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let debugger = require_debugger(eval, pos)?;
    debugger.step_over(eval.call_depth());
    Ok(Value::Null)
}

fn step_into(eval: &Evaluator, _scope: &Scope, _args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let debugger = require_debugger(eval, pos)?;
    debugger.step_into(eval.call_depth());
    Ok(Value::Null)
}

fn step_out(eval: &Evaluator, _scope: &Scope, _args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let debugger = require_debugger(eval, pos)?;
    debugger.step_out(eval.call_depth());
    Ok(Value::Null)
}

fn force_stop(eval: &Evaluator, _scope: &Scope, _args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let debugger = require_debugger(eval, pos)?;
    debugger.force_stop();
    Ok(Value::Null)
}

fn is_paused(eval: &Evaluator, _scope: &Scope, _args: Vec<Value>, _pos: &SourcePos) -> EvalResult<Value> {
    Ok(Value::Bool(eval.debugger.as_ref().is_some_and(|d| d.is_paused())))
}

fn is_debugger_active(eval: &Evaluator, _scope: &Scope, _args: Vec<Value>, _pos: &SourcePos) -> EvalResult<Value> {
    Ok(Value::Bool(eval.debugger.as_ref().is_some_and(|d| d.any_active())))
}

pub fn register(table: &mut BuiltinTable) {
    table.register("setBreakpoint", set_breakpoint);
    table.register("removeBreakpoint", remove_breakpoint);
    table.register("setBreakpointEnabled", set_breakpoint_enabled);
    table.register("debugContinue", debug_continue);
    table.register("stepOver", step_over);
    table.register("stepInto", step_into);
    table.register("stepOut", step_out);
    table.register("forceStop", force_stop);
    table.register("isPaused", is_paused);
    table.register("isDebuggerActive", is_debugger_active);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::EngineConfig, debugger::Debugger, parser::parse_program};
    use std::rc::Rc;

    #[test]
    fn builtins_error_without_an_attached_debugger() {
        let program = parse_program("test", "isPaused()").unwrap();
        let eval = Evaluator::new(Rc::new(EngineConfig::default()));
        let result = eval.run(&program).unwrap();
        assert!(matches!(result, Value::Bool(false)));

        let program = parse_program("test", r#"setBreakpoint("f.eng", 1)"#).unwrap();
        let eval = Evaluator::new(Rc::new(EngineConfig::default()));
        assert!(eval.run(&program).is_err());
    }

    #[test]
    fn set_breakpoint_registers_on_the_attached_debugger() {
        let program = parse_program("test", r#"setBreakpoint("f.eng", 3); isDebuggerActive()"#).unwrap();
        let mut eval = Evaluator::new(Rc::new(EngineConfig::default()));
        eval.attach_debugger(Debugger::new());
        let result = eval.run(&program).unwrap();
        assert!(matches!(result, Value::Bool(true)));
    }
}
