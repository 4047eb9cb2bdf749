//! The Math namespace

use std::cell::Cell;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::builtins::RealmBuilder;
use crate::parser::ast::BinaryOp;
use crate::runtime::{JSValue, JsResult, NativeCall, NativeFn, PropertyFlags};
use crate::vm::Interpreter;

pub fn install(b: &mut RealmBuilder<'_>) {
    let math = b.namespace("Math");
    let constant = PropertyFlags::READ_ONLY | PropertyFlags::DONT_ENUM | PropertyFlags::DONT_DELETE;
    for (name, value) in [
        ("E", std::f64::consts::E),
        ("LN10", std::f64::consts::LN_10),
        ("LN2", std::f64::consts::LN_2),
        ("LOG10E", std::f64::consts::LOG10_E),
        ("LOG2E", std::f64::consts::LOG2_E),
        ("PI", std::f64::consts::PI),
        ("SQRT1_2", std::f64::consts::FRAC_1_SQRT_2),
        ("SQRT2", std::f64::consts::SQRT_2),
    ] {
        b.value(math, name, JSValue::Number(value), constant);
    }

    let unary: [(&str, NativeFn); 22] = [
        ("abs", math_abs),
        ("ceil", math_ceil),
        ("floor", math_floor),
        ("round", math_round),
        ("trunc", math_trunc),
        ("sign", math_sign),
        ("sqrt", math_sqrt),
        ("cbrt", math_cbrt),
        ("exp", math_exp),
        ("log", math_log),
        ("log2", math_log2),
        ("log10", math_log10),
        ("sin", math_sin),
        ("cos", math_cos),
        ("tan", math_tan),
        ("asin", math_asin),
        ("acos", math_acos),
        ("atan", math_atan),
        ("sinh", math_sinh),
        ("cosh", math_cosh),
        ("tanh", math_tanh),
        ("fround", math_fround),
    ];
    for (name, func) in unary {
        b.method(math, name, 1, func);
    }
    b.method(math, "atan2", 2, math_atan2);
    b.method(math, "pow", 2, math_pow);
    b.method(math, "min", 2, math_min);
    b.method(math, "max", 2, math_max);
    b.method(math, "hypot", 2, math_hypot);
    b.method(math, "random", 0, math_random);
}

fn number_arg(interp: &mut Interpreter<'_>, call: &NativeCall<'_>, i: usize) -> JsResult<f64> {
    interp.to_number(&call.arg(i))
}

macro_rules! unary_math {
    ($($name:ident => $f:expr;)*) => {
        $(
            fn $name(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
                let x = number_arg(interp, call, 0)?;
                let f: fn(f64) -> f64 = $f;
                Ok(JSValue::Number(f(x)))
            }
        )*
    };
}

unary_math! {
    math_abs => f64::abs;
    math_ceil => f64::ceil;
    math_floor => f64::floor;
    math_round => round;
    math_trunc => f64::trunc;
    math_sign => sign;
    math_sqrt => f64::sqrt;
    math_cbrt => f64::cbrt;
    math_exp => f64::exp;
    math_log => f64::ln;
    math_log2 => f64::log2;
    math_log10 => f64::log10;
    math_sin => f64::sin;
    math_cos => f64::cos;
    math_tan => f64::tan;
    math_asin => f64::asin;
    math_acos => f64::acos;
    math_atan => f64::atan;
    math_sinh => f64::sinh;
    math_cosh => f64::cosh;
    math_tanh => f64::tanh;
    math_fround => |x| x as f32 as f64;
}

/// Round half up, keeping the sign of zero
fn round(x: f64) -> f64 {
    if !x.is_finite() || x.trunc() == x {
        return x;
    }
    let r = (x + 0.5).floor();
    if r == 0.0 && x < 0.0 { -0.0 } else { r }
}

fn sign(x: f64) -> f64 {
    if x.is_nan() || x == 0.0 { x } else { x.signum() }
}

fn math_atan2(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let y = number_arg(interp, call, 0)?;
    let x = number_arg(interp, call, 1)?;
    Ok(JSValue::Number(y.atan2(x)))
}

fn math_pow(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let base = call.arg(0);
    let exponent = call.arg(1);
    interp.binary_op(BinaryOp::Exp, &base, &exponent)
}

/// Fold the arguments, propagating NaN
fn fold(
    interp: &mut Interpreter<'_>,
    call: &NativeCall<'_>,
    init: f64,
    pick: fn(f64, f64) -> f64,
) -> JsResult<JSValue> {
    let mut acc = init;
    let mut nan = false;
    for arg in call.args {
        let n = interp.to_number(arg)?;
        if n.is_nan() {
            nan = true;
        } else {
            acc = pick(acc, n);
        }
    }
    Ok(JSValue::Number(if nan { f64::NAN } else { acc }))
}

fn math_min(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    fold(interp, call, f64::INFINITY, |a, b| {
        if a == b && b == 0.0 && b.is_sign_negative() { b } else { a.min(b) }
    })
}

fn math_max(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    fold(interp, call, f64::NEG_INFINITY, |a, b| {
        if a == b && b == 0.0 && b.is_sign_positive() { b } else { a.max(b) }
    })
}

fn math_hypot(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let mut values = Vec::with_capacity(call.args.len());
    for arg in call.args {
        values.push(interp.to_number(arg)?);
    }
    if values.iter().any(|v| v.is_infinite()) {
        return Ok(JSValue::Number(f64::INFINITY));
    }
    Ok(JSValue::Number(values.iter().map(|v| v * v).sum::<f64>().sqrt()))
}

thread_local! {
    static RNG_STATE: Cell<u64> = Cell::new(seed());
}

fn seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64);
    (nanos ^ 0x9E37_79B9_7F4A_7C15) | 1
}

/// xorshift64* in [0, 1)
fn math_random(_: &mut Interpreter<'_>, _: &NativeCall<'_>) -> JsResult<JSValue> {
    let bits = RNG_STATE.with(|state| {
        let mut x = state.get();
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        state.set(x);
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    });
    Ok(JSValue::Number((bits >> 11) as f64 / (1u64 << 53) as f64))
}

#[cfg(test)]
mod tests {
    use super::round;
    use crate::builtins::test_support::eval_ok;

    #[test]
    fn test_round() {
        assert_eq!(round(2.5), 3.0);
        assert_eq!(round(-2.5), -2.0);
        assert!(round(-0.2).is_sign_negative());
        assert_eq!(eval_ok("Math.round(1.4) + Math.round(1.6)"), "3");
    }

    #[test]
    fn test_min_max() {
        assert_eq!(eval_ok("Math.max(1, 5, 3) + ':' + Math.min(4, -2)"), "5:-2");
        assert_eq!(eval_ok("Math.max() + ':' + Math.min()"), "-Infinity:Infinity");
        assert_eq!(eval_ok("Math.max(1, NaN)"), "NaN");
        assert_eq!(eval_ok("1 / Math.min(0, -0)"), "-Infinity");
    }

    #[test]
    fn test_functions() {
        assert_eq!(eval_ok("Math.abs(-3) + Math.floor(2.7) + Math.ceil(0.1) + Math.trunc(-1.9)"), "5");
        assert_eq!(eval_ok("Math.pow(2, 10) + ':' + Math.sqrt(16) + ':' + Math.hypot(3, 4)"), "1024:4:5");
        assert_eq!(eval_ok("Math.sign(-5) + ':' + Math.cbrt(27)"), "-1:3");
        assert_eq!(eval_ok("Math.PI > 3.14 && Math.PI < 3.15"), "true");
    }

    #[test]
    fn test_random() {
        assert_eq!(eval_ok("var ok = true; for (var i = 0; i < 100; i++) { var r = Math.random(); if (r < 0 || r >= 1) ok = false; } ok"), "true");
    }
}
