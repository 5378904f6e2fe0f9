//! Numeric built-ins (component D).

use crate::{
    builtins::BuiltinTable,
    error::{EngineError, EvalResult, Flow},
    eval::Evaluator,
    pos::SourcePos,
    scope::Scope,
    value::Value,
};

fn num(name: &str, v: &Value, pos: &SourcePos) -> EvalResult<f64> {
    match v {
        Value::Number(n) => Ok(*n),
        other => Err(Flow::Error(
            EngineError::type_error(format!("{name}: expected number, found {}", other.type_name())).with_pos(pos.clone()),
        )),
    }
}

fn add(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let mut total = 0.0;
    for a in &args {
        total += num("add", a, pos)?;
    }
    Ok(Value::Number(total))
}

fn sub(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    if args.is_empty() {
        return Err(Flow::Error(EngineError::validation("sub: expects at least 1 argument").with_pos(pos.clone())));
    }
    let mut total = num("sub", &args[0], pos)?;
    for a in &args[1..] {
        total -= num("sub", a, pos)?;
    }
    Ok(Value::Number(total))
}

fn mul(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let mut total = 1.0;
    for a in &args {
        total *= num("mul", a, pos)?;
    }
    Ok(Value::Number(total))
}

fn div(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    if args.len() != 2 {
        return Err(Flow::Error(EngineError::validation("div: expects exactly 2 arguments").with_pos(pos.clone())));
    }
    let a = num("div", &args[0], pos)?;
    let b = num("div", &args[1], pos)?;
    if b == 0.0 {
        return Err(Flow::Error(EngineError::validation("div: division by zero").with_pos(pos.clone())));
    }
    Ok(Value::Number(a / b))
}

fn modulo(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    if args.len() != 2 {
        return Err(Flow::Error(EngineError::validation("mod: expects exactly 2 arguments").with_pos(pos.clone())));
    }
    let a = num("mod", &args[0], pos)?;
    let b = num("mod", &args[1], pos)?;
    if b == 0.0 {
        return Err(Flow::Error(EngineError::validation("mod: division by zero").with_pos(pos.clone())));
    }
    Ok(Value::Number(a % b))
}

fn neg(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    if args.len() != 1 {
        return Err(Flow::Error(EngineError::validation("neg: expects exactly 1 argument").with_pos(pos.clone())));
    }
    Ok(Value::Number(-num("neg", &args[0], pos)?))
}

fn abs(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    Ok(Value::Number(num("abs", &args[0], pos)?.abs()))
}

fn round(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    Ok(Value::Number(num("round", &args[0], pos)?.round()))
}

fn floor(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    Ok(Value::Number(num("floor", &args[0], pos)?.floor()))
}

fn ceil(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    Ok(Value::Number(num("ceil", &args[0], pos)?.ceil()))
}

fn sqrt(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    Ok(Value::Number(num("sqrt", &args[0], pos)?.sqrt()))
}

fn pow(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    if args.len() != 2 {
        return Err(Flow::Error(EngineError::validation("pow: expects exactly 2 arguments").with_pos(pos.clone())));
    }
    Ok(Value::Number(num("pow", &args[0], pos)?.powf(num("pow", &args[1], pos)?)))
}

fn min(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let mut out: Option<f64> = None;
    for a in &args {
        let n = num("min", a, pos)?;
        out = Some(out.map_or(n, |cur| cur.min(n)));
    }
    out.map(Value::Number).ok_or_else(|| Flow::Error(EngineError::validation("min: expects at least 1 argument").with_pos(pos.clone())))
}

fn max(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let mut out: Option<f64> = None;
    for a in &args {
        let n = num("max", a, pos)?;
        out = Some(out.map_or(n, |cur| cur.max(n)));
    }
    out.map(Value::Number).ok_or_else(|| Flow::Error(EngineError::validation("max: expects at least 1 argument").with_pos(pos.clone())))
}

pub fn register(table: &mut BuiltinTable) {
    table.register("add", add);
    table.register("sub", sub);
    table.register("mul", mul);
    table.register("div", div);
    table.register("mod", modulo);
    table.register("neg", neg);
    table.register("abs", abs);
    table.register("round", round);
    table.register("floor", floor);
    table.register("ceil", ceil);
    table.register("sqrt", sqrt);
    table.register("pow", pow);
    table.register("min", min);
    table.register("max", max);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::EngineConfig, parser::parse_program};
    use std::rc::Rc;

    fn run(src: &str) -> Value {
        let program = parse_program("test", src).unwrap();
        let eval = Evaluator::new(Rc::new(EngineConfig::default()));
        eval.run(&program).unwrap()
    }

    #[test]
    fn add_sums_all_arguments() {
        assert!(matches!(run("add(1,2,3)"), Value::Number(n) if n == 6.0));
    }

    #[test]
    fn div_by_zero_is_validation_error() {
        let program = parse_program("test", "div(1,0)").unwrap();
        let eval = Evaluator::new(Rc::new(EngineConfig::default()));
        let err = eval.run(&program).unwrap_err();
        assert!(matches!(err, Flow::Error(e) if matches!(e.kind, crate::error::ErrorKind::Validation)));
    }

    #[test]
    fn mod_wraps_like_rust_rem() {
        assert!(matches!(run("mod(7,3)"), Value::Number(n) if n == 1.0));
    }
}
