//! The numeric tower: `Integer`, `Bignum` on overflow, `Real` by contagion.
use std::{cmp::Ordering, sync::Arc};

use num::{BigInt, Integer, Signed, Zero};
use num_traits::ToPrimitive;

use crate::{raise_exn, value::Value, LispResult};

/// Two operands promoted to a common representation.
pub enum NumberPair {
    Int(i64, i64),
    Big(BigInt, BigInt),
    Real(f64, f64),
}

/// Builds a number from a bignum, demoting it when it fits in a machine word.
pub fn from_bigint(n: BigInt) -> Value {
    match n.to_i64() {
        Some(n) => Value::Integer(n),
        None => Value::Bignum(Arc::new(n)),
    }
}

fn to_real(value: &Value) -> f64 {
    match value {
        Value::Integer(n) => *n as f64,
        Value::Bignum(n) => n.to_f64().unwrap_or(f64::NAN),
        Value::Real(x) => *x,
        _ => f64::NAN,
    }
}

fn to_bigint(value: &Value) -> BigInt {
    match value {
        Value::Integer(n) => BigInt::from(*n),
        Value::Bignum(n) => (**n).clone(),
        _ => BigInt::zero(),
    }
}

macro_rules! impl_op {
    ($($op:ident),*) => {
        impl NumberPair {$(
            pub fn $op(self) -> Value {
                match self {
                    Self::Int(a, b) => match paste::paste! { a.[<checked_ $op>](b) } {
                        Some(n) => Value::Integer(n),
                        None => from_bigint(BigInt::from(a).$op(BigInt::from(b))),
                    },
                    Self::Big(a, b) => from_bigint(a.$op(b)),
                    Self::Real(a, b) => Value::Real(a.$op(b)),
                }
            })*
        }
    };
}

use std::ops::{Add, Mul, Sub};

impl_op! {
    add, sub, mul
}

impl NumberPair {
    /// `None` unless both operands are numbers.
    pub fn new(a: &Value, b: &Value) -> Option<NumberPair> {
        if !a.is_number() || !b.is_number() {
            return None;
        }
        Some(match (a, b) {
            (Value::Integer(x), Value::Integer(y)) => NumberPair::Int(*x, *y),
            (Value::Real(_), _) | (_, Value::Real(_)) => NumberPair::Real(to_real(a), to_real(b)),
            _ => NumberPair::Big(to_bigint(a), to_bigint(b)),
        })
    }

    /// Exact quotients stay integral, inexact ones become `Real`.
    pub fn div(self) -> LispResult<Value> {
        match self {
            Self::Int(_, 0) => raise_exn!(DivideByZero, "division by zero"),
            Self::Int(a, b) => match (a.checked_rem(b), a.checked_div(b)) {
                (Some(0), Some(q)) => Ok(Value::Integer(q)),
                (Some(_), _) => Ok(Value::Real(a as f64 / b as f64)),
                // i64::MIN / -1
                _ => Ok(from_bigint(BigInt::from(a) / BigInt::from(b))),
            },
            Self::Big(a, b) => {
                if b.is_zero() {
                    return raise_exn!(DivideByZero, "division by zero");
                }
                let (q, r) = a.div_rem(&b);
                if r.is_zero() {
                    Ok(from_bigint(q))
                } else {
                    Ok(Value::Real(
                        a.to_f64().unwrap_or(f64::NAN) / b.to_f64().unwrap_or(f64::NAN),
                    ))
                }
            }
            Self::Real(_, b) if b == 0.0 => raise_exn!(DivideByZero, "division by zero"),
            Self::Real(a, b) => Ok(Value::Real(a / b)),
        }
    }

    /// Modulus with the sign of the divisor.
    pub fn modulo(self) -> LispResult<Value> {
        match self {
            Self::Int(_, 0) => raise_exn!(DivideByZero, "division by zero"),
            Self::Int(a, b) => Ok(match a.checked_rem(b) {
                Some(_) => Value::Integer(a.mod_floor(&b)),
                None => Value::Integer(0),
            }),
            Self::Big(a, b) => {
                if b.is_zero() {
                    return raise_exn!(DivideByZero, "division by zero");
                }
                Ok(from_bigint(a.mod_floor(&b)))
            }
            Self::Real(_, b) if b == 0.0 => raise_exn!(DivideByZero, "division by zero"),
            Self::Real(a, b) => Ok(Value::Real(a - b * (a / b).floor())),
        }
    }

    pub fn compare(&self) -> Option<Ordering> {
        match self {
            Self::Int(a, b) => Some(a.cmp(b)),
            Self::Big(a, b) => Some(a.cmp(b)),
            Self::Real(a, b) => a.partial_cmp(b),
        }
    }
}

fn not_a_number<T>(who: &str, value: &Value) -> LispResult<T> {
    raise_exn!(TypeMismatch, @value.clone(), "{}: not a number: {}", who, value)
}

pub fn check_number(who: &str, value: &Value) -> LispResult<()> {
    if value.is_number() {
        Ok(())
    } else {
        not_a_number(who, value)
    }
}

fn pair(who: &str, a: &Value, b: &Value) -> LispResult<NumberPair> {
    match NumberPair::new(a, b) {
        Some(pair) => Ok(pair),
        None if a.is_number() => not_a_number(who, b),
        None => not_a_number(who, a),
    }
}

pub fn add(a: &Value, b: &Value) -> LispResult<Value> {
    Ok(pair("+", a, b)?.add())
}

pub fn sub(a: &Value, b: &Value) -> LispResult<Value> {
    Ok(pair("-", a, b)?.sub())
}

pub fn mul(a: &Value, b: &Value) -> LispResult<Value> {
    Ok(pair("*", a, b)?.mul())
}

pub fn div(a: &Value, b: &Value) -> LispResult<Value> {
    pair("/", a, b)?.div()
}

pub fn modulo(a: &Value, b: &Value) -> LispResult<Value> {
    pair("mod", a, b)?.modulo()
}

pub fn compare(who: &str, a: &Value, b: &Value) -> LispResult<Option<Ordering>> {
    Ok(pair(who, a, b)?.compare())
}

/// Numeric equality across representations. Non-numbers are never equal.
pub fn num_eq(a: &Value, b: &Value) -> bool {
    matches!(
        NumberPair::new(a, b).and_then(|pair| pair.compare()),
        Some(Ordering::Equal)
    )
}

pub fn negate(value: &Value) -> LispResult<Value> {
    match value {
        Value::Integer(n) => Ok(match n.checked_neg() {
            Some(n) => Value::Integer(n),
            None => from_bigint(-BigInt::from(*n)),
        }),
        Value::Bignum(n) => Ok(from_bigint(-(**n).clone())),
        Value::Real(x) => Ok(Value::Real(-x)),
        other => not_a_number("-", other),
    }
}

pub fn abs(value: &Value) -> LispResult<Value> {
    match value {
        Value::Integer(n) => Ok(match n.checked_abs() {
            Some(n) => Value::Integer(n),
            None => from_bigint(BigInt::from(*n).abs()),
        }),
        Value::Bignum(n) => Ok(from_bigint(n.abs())),
        Value::Real(x) => Ok(Value::Real(x.abs())),
        other => not_a_number("abs", other),
    }
}

/// Left-to-right fold, so promotion happens at the first operand that
/// forces it.
pub fn fold(
    args: &[Value],
    init: Value,
    op: fn(&Value, &Value) -> LispResult<Value>,
) -> LispResult<Value> {
    let mut acc = init;
    for arg in args {
        acc = op(&acc, arg)?;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_overflow_promotes_to_bignum() {
        let sum = add(&Value::Integer(i64::MAX), &Value::Integer(1)).unwrap();
        match sum {
            Value::Bignum(n) => assert_eq!(*n, BigInt::from(i64::MAX) + 1),
            _ => panic!("expected a bignum"),
        }
        let back = sub(&Value::Bignum(Arc::new(BigInt::from(i64::MAX) + 1)), &Value::Integer(1));
        assert!(matches!(back.unwrap(), Value::Integer(i64::MAX)));
    }

    #[test]
    fn reals_are_contagious() {
        let r = fold(
            &[Value::Integer(1), Value::Real(0.5), Value::Integer(2)],
            Value::Integer(0),
            add,
        )
        .unwrap();
        assert!(matches!(r, Value::Real(x) if (x - 3.5).abs() < 1e-12));

        let big = Value::Bignum(Arc::new(BigInt::from(i64::MAX) * 4));
        assert!(matches!(mul(&big, &Value::Real(0.5)).unwrap(), Value::Real(_)));
    }

    #[test]
    fn division_is_exact_when_possible() {
        assert!(matches!(div(&Value::Integer(6), &Value::Integer(3)).unwrap(), Value::Integer(2)));
        assert!(matches!(div(&Value::Integer(1), &Value::Integer(2)).unwrap(), Value::Real(x) if x == 0.5));
        assert!(matches!(
            div(&Value::Integer(i64::MIN), &Value::Integer(-1)).unwrap(),
            Value::Bignum(_)
        ));
        assert!(div(&Value::Integer(1), &Value::Integer(0)).is_err());
        assert!(div(&Value::Real(1.0), &Value::Real(0.0)).is_err());
    }

    #[test]
    fn modulo_follows_divisor_sign() {
        assert!(matches!(modulo(&Value::Integer(-7), &Value::Integer(3)).unwrap(), Value::Integer(2)));
        assert!(matches!(modulo(&Value::Integer(7), &Value::Integer(-3)).unwrap(), Value::Integer(-2)));
    }

    #[test]
    fn non_numbers_are_rejected() {
        let err = add(&Value::Integer(1), &Value::string("x")).unwrap_err();
        assert_eq!(err.kind, crate::error::Exception::TypeMismatch);
        assert!(!num_eq(&Value::Nil, &Value::Nil));
        assert!(num_eq(&Value::Integer(2), &Value::Real(2.0)));
    }
}
