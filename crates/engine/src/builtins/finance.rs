//! Time-value-of-money built-ins (component D, spec.md §4.4 "Numeric
//! built-ins include a set for finance").
//!
//! Formulas follow the standard annuity definitions: `pv` is the loan
//! principal (or present lump sum), `pmt` the fixed periodic payment, `fv`
//! the residual balance, `rate` the periodic interest rate. `rate` and
//! `irr` are the only two built-ins without a closed form and are solved by
//! Newton-Raphson with the tolerance and iteration cap spec.md §4.4 pins
//! down: 1e-7, 100 iterations. Currency-shaped outputs are rounded to 2
//! decimal places; rates and period counts are left at full precision.

use crate::{
    builtins::BuiltinTable,
    error::{EngineError, EvalResult, Flow},
    eval::Evaluator,
    pos::SourcePos,
    scope::Scope,
    value::Value,
};

const NEWTON_TOLERANCE: f64 = 1e-7;
const NEWTON_MAX_ITER: usize = 100;

fn cents(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

fn num(name: &str, args: &[Value], i: usize, pos: &SourcePos) -> EvalResult<f64> {
    match args.get(i) {
        Some(Value::Number(n)) => Ok(*n),
        other => Err(Flow::Error(
            EngineError::type_error(format!(
                "{name}: argument {} must be a number, found {}",
                i + 1,
                other.map(Value::type_name).unwrap_or("nothing")
            ))
            .with_pos(pos.clone()),
        )),
    }
}

fn opt_num(args: &[Value], i: usize, default: f64) -> f64 {
    match args.get(i) {
        Some(Value::Number(n)) => *n,
        _ => default,
    }
}

/// Fixed periodic payment amortizing `pv` to `fv` over `nper` periods at
/// periodic rate `rate`.
fn pmt_of(rate: f64, nper: f64, pv: f64, fv: f64) -> f64 {
    if rate == 0.0 {
        (pv - fv) / nper
    } else {
        let growth = (1.0 + rate).powf(nper);
        (pv - fv / growth) * rate / (1.0 - growth.recip())
    }
}

fn pv_of(rate: f64, nper: f64, pmt: f64, fv: f64) -> f64 {
    if rate == 0.0 {
        pmt * nper + fv
    } else {
        let growth = (1.0 + rate).powf(nper);
        pmt * (1.0 - growth.recip()) / rate + fv / growth
    }
}

fn fv_of(rate: f64, nper: f64, pmt: f64, pv: f64) -> f64 {
    if rate == 0.0 {
        pv - pmt * nper
    } else {
        let growth = (1.0 + rate).powf(nper);
        (pv - pmt * (1.0 - growth.recip()) / rate) * growth
    }
}

fn nper_of(rate: f64, pmt: f64, pv: f64, fv: f64) -> f64 {
    if rate == 0.0 {
        (pv - fv) / pmt
    } else {
        ((pmt - rate * fv) / (pmt - rate * pv)).ln() / (1.0 + rate).ln()
    }
}

/// Remaining principal after `periods_elapsed` payments of `pmt` against a
/// loan of `pv` at periodic `rate`.
fn loan_balance_of(rate: f64, pv: f64, pmt: f64, periods_elapsed: f64) -> f64 {
    if rate == 0.0 {
        pv - pmt * periods_elapsed
    } else {
        let growth = (1.0 + rate).powf(periods_elapsed);
        pv * growth - pmt * (growth - 1.0) / rate
    }
}

/// Newton-Raphson root find with the spec's fixed tolerance/iteration cap.
/// Returns the last iterate even if it didn't converge, the same way
/// spreadsheet `RATE`/`IRR` report "best effort" rather than erroring.
fn newton(mut x: f64, f: impl Fn(f64) -> f64, df: impl Fn(f64) -> f64) -> f64 {
    for _ in 0..NEWTON_MAX_ITER {
        let fx = f(x);
        if fx.abs() < NEWTON_TOLERANCE {
            break;
        }
        let dfx = df(x);
        if dfx == 0.0 {
            break;
        }
        x -= fx / dfx;
    }
    x
}

fn pmt_builtin(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let rate = num("pmt", &args, 0, pos)?;
    let nper = num("pmt", &args, 1, pos)?;
    let pv = num("pmt", &args, 2, pos)?;
    let fv = opt_num(&args, 3, 0.0);
    Ok(Value::Number(cents(pmt_of(rate, nper, pv, fv))))
}

fn pv_builtin(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let rate = num("pv", &args, 0, pos)?;
    let nper = num("pv", &args, 1, pos)?;
    let pmt = num("pv", &args, 2, pos)?;
    let fv = opt_num(&args, 3, 0.0);
    Ok(Value::Number(cents(pv_of(rate, nper, pmt, fv))))
}

fn fv_builtin(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let rate = num("fv", &args, 0, pos)?;
    let nper = num("fv", &args, 1, pos)?;
    let pmt = num("fv", &args, 2, pos)?;
    let pv = num("fv", &args, 3, pos)?;
    Ok(Value::Number(cents(fv_of(rate, nper, pmt, pv))))
}

fn nper_builtin(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let rate = num("nper", &args, 0, pos)?;
    let pmt = num("nper", &args, 1, pos)?;
    let pv = num("nper", &args, 2, pos)?;
    let fv = opt_num(&args, 3, 0.0);
    Ok(Value::Number(nper_of(rate, pmt, pv, fv)))
}

/// Solves for the periodic rate by Newton-Raphson on
/// `pv_of(rate, nper, pmt, fv) - pv == 0`.
fn rate_builtin(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let nper = num("rate", &args, 0, pos)?;
    let pmt = num("rate", &args, 1, pos)?;
    let pv = num("rate", &args, 2, pos)?;
    let fv = opt_num(&args, 3, 0.0);
    let guess = opt_num(&args, 4, 0.1);

    let f = |r: f64| pv_of(r, nper, pmt, fv) - pv;
    let step = 1e-6;
    let df = |r: f64| (f(r + step) - f(r - step)) / (2.0 * step);
    Ok(Value::Number(newton(guess, f, df)))
}

/// Solves for the rate that zeroes the net present value of a cash-flow
/// series (`cashflows[0]` is the period-0 outlay), by the same
/// Newton-Raphson contract as `rate`.
fn irr_builtin(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let Some(Value::Array(flows)) = args.first() else {
        return Err(Flow::Error(EngineError::type_error("irr: expected an array of cash flows").with_pos(pos.clone())));
    };
    let flows: Vec<f64> = flows
        .borrow()
        .iter()
        .map(|v| match v {
            Value::Number(n) => Ok(*n),
            other => Err(Flow::Error(EngineError::type_error(format!("irr: cash flows must be numbers, found {}", other.type_name())).with_pos(pos.clone()))),
        })
        .collect::<EvalResult<_>>()?;
    let guess = opt_num(&args, 1, 0.1);

    let npv_at = |r: f64| flows.iter().enumerate().map(|(i, cf)| cf / (1.0 + r).powi(i as i32)).sum::<f64>();
    let step = 1e-6;
    let d_npv = |r: f64| (npv_at(r + step) - npv_at(r - step)) / (2.0 * step);
    Ok(Value::Number(newton(guess, npv_at, d_npv)))
}

/// `npv(rate, cashflows)`: Excel convention -- `cashflows[0]` is discounted
/// one full period, not treated as a period-0 outlay.
fn npv_builtin(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let rate = num("npv", &args, 0, pos)?;
    let Some(Value::Array(flows)) = args.get(1) else {
        return Err(Flow::Error(EngineError::type_error("npv: expected an array of cash flows").with_pos(pos.clone())));
    };
    let mut total = 0.0;
    for (i, v) in flows.borrow().iter().enumerate() {
        let Value::Number(cf) = v else {
            return Err(Flow::Error(EngineError::type_error(format!("npv: cash flows must be numbers, found {}", v.type_name())).with_pos(pos.clone())));
        };
        total += cf / (1.0 + rate).powi(i as i32 + 1);
    }
    Ok(Value::Number(cents(total)))
}

/// `amortize(rate, nper, pv)` -> array of `{period, payment, principal,
/// interest, balance}` rows, one per period.
fn amortize_builtin(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let rate = num("amortize", &args, 0, pos)?;
    let nper = num("amortize", &args, 1, pos)?;
    let pv = num("amortize", &args, 2, pos)?;
    let payment = pmt_of(rate, nper, pv, 0.0);

    let mut balance = pv;
    let mut rows = Vec::new();
    let periods = nper.round().max(0.0) as u64;
    for period in 1..=periods {
        let interest = balance * rate;
        let mut principal = payment - interest;
        if period == periods {
            principal = balance;
        }
        balance -= principal;
        let mut row = std::collections::HashMap::new();
        row.insert("period".to_string(), Value::Number(period as f64));
        row.insert("payment".to_string(), Value::Number(cents(principal + interest)));
        row.insert("principal".to_string(), Value::Number(cents(principal)));
        row.insert("interest".to_string(), Value::Number(cents(interest)));
        row.insert("balance".to_string(), Value::Number(cents(balance.max(0.0))));
        rows.push(Value::map(row));
    }
    Ok(Value::array(rows))
}

/// `balloon(rate, termPeriods, amortNper, pv)`: payment computed as if the
/// loan amortized over `amortNper` periods, with the remaining balance
/// after `termPeriods` due as a lump sum.
fn balloon_builtin(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let rate = num("balloon", &args, 0, pos)?;
    let term = num("balloon", &args, 1, pos)?;
    let amort_nper = num("balloon", &args, 2, pos)?;
    let pv = num("balloon", &args, 3, pos)?;

    let payment = pmt_of(rate, amort_nper, pv, 0.0);
    let balloon_amount = loan_balance_of(rate, pv, payment, term);

    let mut result = std::collections::HashMap::new();
    result.insert("payment".to_string(), Value::Number(cents(payment)));
    result.insert("balloonAmount".to_string(), Value::Number(cents(balloon_amount.max(0.0))));
    Ok(Value::map(result))
}

/// Converts a nominal periodic rate compounded `periodsPerYear` times into
/// an effective annual rate: `(1 + nominal/m)^m - 1`.
fn apr_builtin(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let nominal = num("apr", &args, 0, pos)?;
    let periods_per_year = num("apr", &args, 1, pos)?;
    let effective = (1.0 + nominal / periods_per_year).powf(periods_per_year) - 1.0;
    Ok(Value::Number(effective))
}

fn loan_balance_builtin(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let rate = num("loanBalance", &args, 0, pos)?;
    let pv = num("loanBalance", &args, 1, pos)?;
    let pmt = num("loanBalance", &args, 2, pos)?;
    let periods_elapsed = num("loanBalance", &args, 3, pos)?;
    Ok(Value::Number(cents(loan_balance_of(rate, pv, pmt, periods_elapsed).max(0.0))))
}

/// `depreciation(cost, salvage, life, method?)` -> an array of one
/// per-period depreciation amount per period, `method` one of
/// `"straight_line"` (default) or `"declining_balance"` (double-declining).
fn depreciation_builtin(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let cost = num("depreciation", &args, 0, pos)?;
    let salvage = num("depreciation", &args, 1, pos)?;
    let life = num("depreciation", &args, 2, pos)?;
    let method = match args.get(3) {
        Some(Value::String(s)) => s.to_string(),
        _ => "straight_line".to_string(),
    };

    let periods = life.round().max(0.0) as u64;
    let mut rows = Vec::with_capacity(periods as usize);
    match method.as_str() {
        "declining_balance" => {
            let rate = 2.0 / life;
            let mut balance = cost;
            for _ in 1..=periods {
                let mut amount = balance * rate;
                if balance - amount < salvage {
                    amount = balance - salvage;
                }
                balance -= amount;
                rows.push(Value::Number(cents(amount.max(0.0))));
            }
        }
        _ => {
            let amount = cents((cost - salvage) / life);
            for _ in 1..=periods {
                rows.push(Value::Number(amount));
            }
        }
    }
    Ok(Value::array(rows))
}

/// `interestOnlySchedule(rate, pv, nper)` -> array of `{period, payment,
/// balance}` rows where every period but the last pays interest only and
/// the final period additionally repays the full principal.
fn interest_only_schedule_builtin(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let rate = num("interestOnlySchedule", &args, 0, pos)?;
    let pv = num("interestOnlySchedule", &args, 1, pos)?;
    let nper = num("interestOnlySchedule", &args, 2, pos)?;
    let periods = nper.round().max(0.0) as u64;
    let interest = pv * rate;

    let mut rows = Vec::with_capacity(periods as usize);
    for period in 1..=periods {
        let principal = if period == periods { pv } else { 0.0 };
        let mut row = std::collections::HashMap::new();
        row.insert("period".to_string(), Value::Number(period as f64));
        row.insert("payment".to_string(), Value::Number(cents(interest + principal)));
        row.insert("balance".to_string(), Value::Number(cents(if period == periods { 0.0 } else { pv })));
        rows.push(Value::map(row));
    }
    Ok(Value::array(rows))
}

pub fn register(table: &mut BuiltinTable) {
    table.register("pmt", pmt_builtin);
    table.register("pv", pv_builtin);
    table.register("fv", fv_builtin);
    table.register("nper", nper_builtin);
    table.register("rate", rate_builtin);
    table.register("irr", irr_builtin);
    table.register("npv", npv_builtin);
    table.register("amortize", amortize_builtin);
    table.register("balloon", balloon_builtin);
    table.register("apr", apr_builtin);
    table.register("loanBalance", loan_balance_builtin);
    table.register("depreciation", depreciation_builtin);
    table.register("interestOnlySchedule", interest_only_schedule_builtin);
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
    fn pmt_matches_known_loan_payment() {
        // $10,000 at 1%/period over 12 periods.
        let v = run("pmt(0.01, 12, 10000)");
        assert!(matches!(v, Value::Number(n) if (n - 888.49).abs() < 0.01));
    }

    #[test]
    fn pv_and_pmt_are_inverse_for_a_fixed_term() {
        let payment = pmt_of(0.01, 12, 10000.0, 0.0);
        let recovered_pv = pv_of(0.01, 12.0, payment, 0.0);
        assert!((recovered_pv - 10000.0).abs() < 0.01);
    }

    #[test]
    fn rate_recovers_the_rate_used_to_build_a_payment() {
        let known_rate = 0.015;
        let payment = pmt_of(known_rate, 24.0, 10000.0, 0.0);
        let program = parse_program("test", &format!("rate(24, {payment}, 10000)")).unwrap();
        let eval = Evaluator::new(Rc::new(EngineConfig::default()));
        let Value::Number(solved) = eval.run(&program).unwrap() else { panic!("expected number") };
        assert!((solved - known_rate).abs() < 1e-4);
    }

    #[test]
    fn amortize_schedule_zeros_the_balance_on_the_final_row() {
        let v = run("amortize(0.01, 6, 1000)");
        let Value::Array(rows) = v else { panic!("expected array") };
        let rows = rows.borrow();
        assert_eq!(rows.len(), 6);
        let Value::Map(last) = &rows[5] else { panic!("expected map") };
        assert!(matches!(last.borrow().get("balance"), Some(Value::Number(n)) if *n == 0.0));
    }

    #[test]
    fn straight_line_depreciation_is_constant_per_period() {
        let v = run(r#"depreciation(1000, 100, 3, "straight_line")"#);
        let Value::Array(rows) = v else { panic!("expected array") };
        let rows = rows.borrow();
        for row in rows.iter() {
            assert!(matches!(row, Value::Number(n) if (*n - 300.0).abs() < 0.01));
        }
    }
}
