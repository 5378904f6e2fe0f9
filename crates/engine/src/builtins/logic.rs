//! Boolean and comparison built-ins (component D).

use crate::{
    builtins::BuiltinTable,
    error::{EngineError, EvalResult, Flow},
    eval::Evaluator,
    pos::SourcePos,
    scope::Scope,
    value::Value,
};

fn equal(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    if args.len() != 2 {
        return Err(Flow::Error(EngineError::validation("equal: expects exactly 2 arguments").with_pos(pos.clone())));
    }
    Ok(Value::Bool(args[0].value_eq(&args[1])))
}

fn not_equal(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    if args.len() != 2 {
        return Err(Flow::Error(EngineError::validation("notEqual: expects exactly 2 arguments").with_pos(pos.clone())));
    }
    Ok(Value::Bool(!args[0].value_eq(&args[1])))
}

/// Orders numbers by value and strings lexicographically; any other pairing
/// is a type error (spec.md §4.1: comparisons are defined only within a
/// type).
fn order(name: &str, a: &Value, b: &Value, pos: &SourcePos) -> EvalResult<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            Ok(x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal))
        }
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        _ => Err(Flow::Error(EngineError::type_error(format!(
            "{name}: cannot compare {} with {}",
            a.type_name(),
            b.type_name()
        ))
        .with_pos(pos.clone()))),
    }
}

fn less(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    if args.len() != 2 {
        return Err(Flow::Error(EngineError::validation("less: expects exactly 2 arguments").with_pos(pos.clone())));
    }
    Ok(Value::Bool(order("less", &args[0], &args[1], pos)?.is_lt()))
}

fn greater(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    if args.len() != 2 {
        return Err(Flow::Error(EngineError::validation("greater: expects exactly 2 arguments").with_pos(pos.clone())));
    }
    Ok(Value::Bool(order("greater", &args[0], &args[1], pos)?.is_gt()))
}

fn less_or_equal(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    if args.len() != 2 {
        return Err(Flow::Error(EngineError::validation("lessOrEqual: expects exactly 2 arguments").with_pos(pos.clone())));
    }
    Ok(Value::Bool(order("lessOrEqual", &args[0], &args[1], pos)?.is_le()))
}

fn greater_or_equal(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    if args.len() != 2 {
        return Err(Flow::Error(EngineError::validation("greaterOrEqual: expects exactly 2 arguments").with_pos(pos.clone())));
    }
    Ok(Value::Bool(order("greaterOrEqual", &args[0], &args[1], pos)?.is_ge()))
}

fn and(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, _pos: &SourcePos) -> EvalResult<Value> {
    Ok(Value::Bool(args.iter().all(Value::truthy)))
}

fn or(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, _pos: &SourcePos) -> EvalResult<Value> {
    Ok(Value::Bool(args.iter().any(Value::truthy)))
}

fn not(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    if args.len() != 1 {
        return Err(Flow::Error(EngineError::validation("not: expects exactly 1 argument").with_pos(pos.clone())));
    }
    Ok(Value::Bool(!args[0].truthy()))
}

pub fn register(table: &mut BuiltinTable) {
    table.register("equal", equal);
    table.register("notEqual", not_equal);
    table.register("less", less);
    table.register("greater", greater);
    table.register("lessOrEqual", less_or_equal);
    table.register("greaterOrEqual", greater_or_equal);
    table.register("and", and);
    table.register("or", or);
    table.register("not", not);
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
    fn equal_is_structural_for_scalars() {
        assert!(matches!(run(r#"equal("a","a")"#), Value::Bool(true)));
        assert!(matches!(run("equal(1,2)"), Value::Bool(false)));
    }

    #[test]
    fn equal_is_pointer_identity_for_arrays() {
        assert!(matches!(run("declare(a, array(1,2)); equal(a, clone(a))"), Value::Bool(false)));
        assert!(matches!(run("declare(a, array(1,2)); declare(b, a); equal(a, b)"), Value::Bool(true)));
    }

    #[test]
    fn string_ordering_is_lexicographic() {
        assert!(matches!(run(r#"less("a","b")"#), Value::Bool(true)));
    }
}
