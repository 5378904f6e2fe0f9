//! String built-ins (component D).

use crate::{
    builtins::BuiltinTable,
    error::{EngineError, EvalResult, Flow},
    eval::Evaluator,
    pos::SourcePos,
    scope::Scope,
    value::Value,
};

fn as_str<'a>(name: &str, v: &'a Value, pos: &SourcePos) -> EvalResult<&'a str> {
    match v {
        Value::String(s) => Ok(s),
        other => Err(Flow::Error(
            EngineError::type_error(format!("{name}: expected string, found {}", other.type_name())).with_pos(pos.clone()),
        )),
    }
}

fn concat(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, _pos: &SourcePos) -> EvalResult<Value> {
    let mut out = String::new();
    for a in &args {
        out.push_str(&a.to_string());
    }
    Ok(Value::string(out))
}

fn to_upper(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    Ok(Value::string(as_str("toUpper", &args[0], pos)?.to_uppercase()))
}

fn to_lower(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    Ok(Value::string(as_str("toLower", &args[0], pos)?.to_lowercase()))
}

fn trim(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    Ok(Value::string(as_str("trim", &args[0], pos)?.trim().to_string()))
}

fn replace(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    if args.len() != 3 {
        return Err(Flow::Error(EngineError::validation("replace: expects exactly 3 arguments").with_pos(pos.clone())));
    }
    let subject = as_str("replace", &args[0], pos)?;
    let from = as_str("replace", &args[1], pos)?;
    let to = as_str("replace", &args[2], pos)?;
    Ok(Value::string(subject.replace(from, to)))
}

fn starts_with(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let subject = as_str("startsWith", &args[0], pos)?;
    let prefix = as_str("startsWith", &args[1], pos)?;
    Ok(Value::Bool(subject.starts_with(prefix)))
}

fn ends_with(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let subject = as_str("endsWith", &args[0], pos)?;
    let suffix = as_str("endsWith", &args[1], pos)?;
    Ok(Value::Bool(subject.ends_with(suffix)))
}

fn to_string_builtin(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    if args.len() != 1 {
        return Err(Flow::Error(EngineError::validation("toString: expects exactly 1 argument").with_pos(pos.clone())));
    }
    Ok(Value::string(args[0].to_string()))
}

fn to_number(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    match &args[0] {
        Value::Number(n) => Ok(Value::Number(*n)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Number)
            .map_err(|_| Flow::Error(EngineError::type_error(format!("toNumber: cannot parse '{s}' as a number")).with_pos(pos.clone()))),
        Value::Bool(b) => Ok(Value::Number(if *b { 1.0 } else { 0.0 })),
        other => Err(Flow::Error(
            EngineError::type_error(format!("toNumber: cannot convert {}", other.type_name())).with_pos(pos.clone()),
        )),
    }
}

pub fn register(table: &mut BuiltinTable) {
    table.register("concat", concat);
    table.register("toUpper", to_upper);
    table.register("toLower", to_lower);
    table.register("trim", trim);
    table.register("replace", replace);
    table.register("startsWith", starts_with);
    table.register("endsWith", ends_with);
    table.register("toString", to_string_builtin);
    table.register("toNumber", to_number);
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
    fn concat_stringifies_mixed_arguments() {
        assert!(matches!(run(r#"concat("x=", 5)"#), Value::String(ref s) if &**s == "x=5"));
    }

    #[test]
    fn to_number_parses_trimmed_strings() {
        assert!(matches!(run(r#"toNumber(" 42 ")"#), Value::Number(n) if n == 42.0));
    }
}
