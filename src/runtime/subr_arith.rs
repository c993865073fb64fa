use std::cmp::Ordering;

use crate::{
    compiler::primitives::Folding,
    number::{self, check_number},
    raise_exn,
    value::Value,
    vm::{Machine, Trampoline},
    LispResult,
};

use super::gsubr::define_primitive_with;

fn ret(value: Value) -> LispResult<Trampoline> {
    Ok(Trampoline::Return(value))
}

fn plus(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    ret(number::fold(args, Value::Integer(0), number::add)?)
}

fn times(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    ret(number::fold(args, Value::Integer(1), number::mul)?)
}

fn minus(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    match args {
        [only] => ret(number::negate(only)?),
        [first, rest @ ..] => ret(number::fold(rest, first.clone(), number::sub)?),
        [] => raise_exn!(ArgumentCount, "-: expected at least 1 argument"),
    }
}

fn divide(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    match args {
        [only] => ret(number::div(&Value::Integer(1), only)?),
        [first, rest @ ..] => {
            check_number("/", first)?;
            ret(number::fold(rest, first.clone(), number::div)?)
        }
        [] => raise_exn!(ArgumentCount, "/: expected at least 1 argument"),
    }
}

fn one_plus(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    ret(number::add(&args[0], &Value::Integer(1))?)
}

fn one_minus(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    ret(number::sub(&args[0], &Value::Integer(1))?)
}

fn modulo(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    ret(number::modulo(&args[0], &args[1])?)
}

fn abs(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    ret(number::abs(&args[0])?)
}

/// Every adjacent pair satisfies `test`. A single argument must still be a
/// number.
fn chain(who: &str, args: &[Value], test: fn(Ordering) -> bool) -> LispResult<Trampoline> {
    for arg in args {
        check_number(who, arg)?;
    }
    for pair in args.windows(2) {
        match number::compare(who, &pair[0], &pair[1])? {
            Some(ordering) if test(ordering) => {}
            _ => return ret(Value::Nil),
        }
    }
    ret(Value::True)
}

fn num_eq(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    chain("=", args, Ordering::is_eq)
}

fn lt(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    chain("<", args, Ordering::is_lt)
}

fn gt(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    chain(">", args, Ordering::is_gt)
}

fn le(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    chain("<=", args, Ordering::is_le)
}

fn ge(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    chain(">=", args, Ordering::is_ge)
}

/// True when no two arguments are numerically equal.
fn num_ne(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    for arg in args {
        check_number("/=", arg)?;
    }
    for (i, a) in args.iter().enumerate() {
        for b in &args[i + 1..] {
            if number::compare("/=", a, b)? == Some(Ordering::Equal) {
                return ret(Value::Nil);
            }
        }
    }
    ret(Value::True)
}

fn extremum(who: &str, args: &[Value], keep: Ordering) -> LispResult<Trampoline> {
    check_number(who, &args[0])?;
    let mut best = args[0].clone();
    for arg in &args[1..] {
        if number::compare(who, arg, &best)? == Some(keep) {
            best = arg.clone();
        }
    }
    ret(best)
}

fn max(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    extremum("max", args, Ordering::Greater)
}

fn min(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    extremum("min", args, Ordering::Less)
}

pub(crate) fn init() {
    define_primitive_with("+", 0, None, plus, Box::new(Folding));
    define_primitive_with("*", 0, None, times, Box::new(Folding));
    define_primitive_with("-", 1, None, minus, Box::new(Folding));
    define_primitive_with("/", 1, None, divide, Box::new(Folding));
    define_primitive_with("1+", 1, Some(1), one_plus, Box::new(Folding));
    define_primitive_with("1-", 1, Some(1), one_minus, Box::new(Folding));
    define_primitive_with("MOD", 2, Some(2), modulo, Box::new(Folding));
    define_primitive_with("ABS", 1, Some(1), abs, Box::new(Folding));
    define_primitive_with("=", 1, None, num_eq, Box::new(Folding));
    define_primitive_with("/=", 1, None, num_ne, Box::new(Folding));
    define_primitive_with("<", 1, None, lt, Box::new(Folding));
    define_primitive_with(">", 1, None, gt, Box::new(Folding));
    define_primitive_with("<=", 1, None, le, Box::new(Folding));
    define_primitive_with(">=", 1, None, ge, Box::new(Folding));
    define_primitive_with("MAX", 1, None, max, Box::new(Folding));
    define_primitive_with("MIN", 1, None, min, Box::new(Folding));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(native: super::super::gsubr::Native, args: &[Value]) -> LispResult<Value> {
        match native(&mut Machine::default(), args)? {
            Trampoline::Return(value) => Ok(value),
            Trampoline::Apply(..) => panic!("arithmetic never applies"),
        }
    }

    #[test]
    fn unary_minus_and_divide() {
        assert!(matches!(call(minus, &[Value::Integer(5)]).unwrap(), Value::Integer(-5)));
        assert!(matches!(call(divide, &[Value::Integer(4)]).unwrap(), Value::Real(x) if x == 0.25));
        assert!(matches!(
            call(divide, &[Value::Integer(12), Value::Integer(2), Value::Integer(3)]).unwrap(),
            Value::Integer(2)
        ));
    }

    #[test]
    fn comparisons_chain() {
        let args = [Value::Integer(1), Value::Real(2.0), Value::Integer(3)];
        assert!(call(lt, &args).unwrap().truthy());
        assert!(!call(gt, &args).unwrap().truthy());
        assert!(call(num_eq, &[Value::Integer(2), Value::Real(2.0)]).unwrap().truthy());
        assert!(!call(num_ne, &[Value::Integer(1), Value::Integer(2), Value::Integer(1)]).unwrap().truthy());
        assert!(call(lt, &[Value::string("a")]).is_err());
    }

    #[test]
    fn extrema_keep_the_first_of_equals() {
        let args = [Value::Integer(3), Value::Real(3.0), Value::Integer(1)];
        assert!(matches!(call(max, &args).unwrap(), Value::Integer(3)));
        assert!(matches!(call(min, &args).unwrap(), Value::Integer(1)));
    }

    #[test]
    fn division_by_zero() {
        let err = call(divide, &[Value::Integer(1), Value::Integer(0)]).unwrap_err();
        assert_eq!(err.kind, crate::error::Exception::DivideByZero);
    }
}
