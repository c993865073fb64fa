use crate::{
    compiler::primitives::{Inline, ListOpcode},
    list::{self, list_star},
    op::Opcode,
    raise_exn,
    symbol::{gensym, Symbol},
    value::{eq, eql, equal, Value},
    vm::{Machine, Trampoline},
    LispResult,
};

use super::gsubr::{define_primitive, define_primitive_with};

fn ret(value: Value) -> LispResult<Trampoline> {
    Ok(Trampoline::Return(value))
}

fn predicate(b: bool) -> LispResult<Trampoline> {
    ret(Value::from_bool(b))
}

fn car(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    ret(args[0].car()?)
}

fn cdr(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    ret(args[0].cdr()?)
}

fn cons(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    ret(Value::cons(args[0].clone(), args[1].clone()))
}

fn list_subr(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    ret(list::list(args))
}

fn list_star_subr(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    let (last, init) = match args.split_last() {
        Some(split) => split,
        None => return raise_exn!(ArgumentCount, "list*: expected at least 1 argument"),
    };
    ret(list_star(init, last.clone()))
}

fn append(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    ret(list::append(args)?)
}

fn nconc(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    ret(list::nconc(args)?)
}

fn rplaca(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    ret(list::rplaca(&args[0], args[1].clone())?)
}

fn rplacd(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    ret(list::rplacd(&args[0], args[1].clone())?)
}

fn reverse(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    ret(list::reverse(&args[0])?)
}

fn nreverse(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    ret(list::nreverse(&args[0])?)
}

fn length(m: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    let n = match &args[0] {
        Value::String(s) => s.chars().count(),
        other => list::length(other, m.options().max_list_length)?,
    };
    ret(Value::Integer(n as i64))
}

fn nth(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    ret(list::nth(args[0].expect_index("nth")?, &args[1])?)
}

fn nthcdr(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    ret(list::nthcdr(args[0].expect_index("nthcdr")?, &args[1])?)
}

fn eq_subr(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    predicate(eq(&args[0], &args[1]))
}

fn eql_subr(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    predicate(eql(&args[0], &args[1]))
}

fn equal_subr(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    predicate(equal(&args[0], &args[1]))
}

fn null(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    predicate(args[0].is_nil())
}

fn atom(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    predicate(args[0].is_atom())
}

fn consp(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    predicate(args[0].is_cons())
}

fn listp(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    predicate(args[0].is_list())
}

fn symbolp(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    predicate(args[0].is_symbol())
}

fn numberp(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    predicate(args[0].is_number())
}

fn integerp(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    predicate(matches!(args[0], Value::Integer(_) | Value::Bignum(_)))
}

fn stringp(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    predicate(matches!(args[0], Value::String(_)))
}

fn functionp(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    predicate(args[0].is_function())
}

fn funcall(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    Ok(Trampoline::Apply(args[0].clone(), list::list(&args[1..])))
}

/// `(apply f a b '(c d))` calls `f` with `a b c d`.
fn apply(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    let spread = &args[1..];
    let (last, middle) = match spread.split_last() {
        Some(split) => split,
        None => return raise_exn!(ArgumentCount, "apply: expected at least 2 arguments"),
    };
    if !last.is_list() {
        return raise_exn!(TypeMismatch, @last.clone(), "apply: last argument is not a list: {}", last);
    }
    Ok(Trampoline::Apply(args[0].clone(), list_star(middle, last.clone())))
}

fn symbol_value(m: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    let sym = args[0].expect_symbol("symbol-value")?;
    match m.bindings().read(&sym) {
        Some(value) => ret(value),
        None => raise_exn!(UnboundVariable, @sym.as_value(), "the variable {} is unbound", sym.name()),
    }
}

fn set(m: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    let sym = args[0].expect_symbol("set")?;
    m.bindings_mut().set(&sym, args[1].clone());
    ret(args[1].clone())
}

fn boundp(m: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    let sym = args[0].expect_symbol("boundp")?;
    predicate(m.bindings().read(&sym).is_some())
}

fn symbol_name(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    ret(Value::string(args[0].expect_symbol("symbol-name")?.name()))
}

fn symbol_function(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    let sym = args[0].expect_symbol("symbol-function")?;
    match sym.function() {
        Some(function) => ret(function),
        None => raise_exn!(UndefinedFunction, @sym.as_value(), "the function {} is undefined", sym.name()),
    }
}

fn fboundp(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    predicate(args[0].expect_symbol("fboundp")?.function().is_some())
}

fn gensym_subr(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    let prefix = match args.first() {
        None => "G".to_string(),
        Some(Value::String(s)) => s.to_string(),
        Some(other) => other.expect_symbol("gensym")?.name().to_string(),
    };
    ret(gensym(&prefix).as_value())
}

/// The property list cell holding `indicator`'s value.
fn plist_entry(sym: &Symbol, indicator: &Value) -> LispResult<Option<Value>> {
    let mut cursor = sym.plist();
    while cursor.is_cons() {
        if eq(&cursor.car()?, indicator) {
            return Ok(Some(cursor.cdr()?));
        }
        cursor = cursor.cddr()?;
    }
    Ok(None)
}

fn get(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    let sym = args[0].expect_symbol("get")?;
    match plist_entry(&sym, &args[1])? {
        Some(cell) => ret(cell.car()?),
        None => ret(Value::Nil),
    }
}

fn put(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    let sym = args[0].expect_symbol("put")?;
    let value = args[2].clone();
    match plist_entry(&sym, &args[1])? {
        Some(cell) => {
            list::rplaca(&cell, value.clone())?;
        }
        None => sym.set_plist(list_star(&[args[1].clone(), value.clone()], sym.plist())),
    }
    ret(value)
}

/// Expands `form` once if its head names a macro.
fn macroexpand_1(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    let form = &args[0];
    if let Value::Cons(cell) = form {
        if let Value::Symbol(head) = cell.car() {
            if let Some(Value::Macro(mac)) = head.function() {
                return Ok(Trampoline::Apply(Value::Function(mac), cell.cdr()));
            }
        }
    }
    ret(form.clone())
}

fn error(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    let message = match &args[0] {
        Value::String(s) => s.to_string(),
        other => other.to_string(),
    };
    let irritants = list::list(&args[1..]);
    if irritants.is_nil() {
        raise_exn!(User, @irritants, "{}", message)
    } else {
        raise_exn!(User, @irritants.clone(), "{} {}", message, irritants)
    }
}

fn print(_: &mut Machine, args: &[Value]) -> LispResult<Trampoline> {
    println!("{}", args[0]);
    ret(args[0].clone())
}

pub(crate) fn init() {
    define_primitive("CAR", 1, Some(1), car);
    define_primitive("CDR", 1, Some(1), cdr);
    define_primitive_with("CONS", 2, Some(2), cons, Box::new(Inline(Opcode::Cons)));
    define_primitive_with("LIST", 0, None, list_subr, Box::new(ListOpcode));
    define_primitive("LIST*", 1, None, list_star_subr);
    define_primitive("APPEND", 0, None, append);
    define_primitive("NCONC", 0, None, nconc);
    define_primitive("RPLACA", 2, Some(2), rplaca);
    define_primitive("RPLACD", 2, Some(2), rplacd);
    define_primitive("REVERSE", 1, Some(1), reverse);
    define_primitive("NREVERSE", 1, Some(1), nreverse);
    define_primitive("LENGTH", 1, Some(1), length);
    define_primitive("NTH", 2, Some(2), nth);
    define_primitive("NTHCDR", 2, Some(2), nthcdr);

    define_primitive("EQ", 2, Some(2), eq_subr);
    define_primitive("EQL", 2, Some(2), eql_subr);
    define_primitive("EQUAL", 2, Some(2), equal_subr);
    define_primitive("NULL", 1, Some(1), null);
    define_primitive("NOT", 1, Some(1), null);
    define_primitive("ATOM", 1, Some(1), atom);
    define_primitive("CONSP", 1, Some(1), consp);
    define_primitive("LISTP", 1, Some(1), listp);
    define_primitive("SYMBOLP", 1, Some(1), symbolp);
    define_primitive("NUMBERP", 1, Some(1), numberp);
    define_primitive("INTEGERP", 1, Some(1), integerp);
    define_primitive("STRINGP", 1, Some(1), stringp);
    define_primitive("FUNCTIONP", 1, Some(1), functionp);

    define_primitive("FUNCALL", 1, None, funcall);
    define_primitive("APPLY", 2, None, apply);

    define_primitive("SYMBOL-VALUE", 1, Some(1), symbol_value);
    define_primitive("SET", 2, Some(2), set);
    define_primitive("BOUNDP", 1, Some(1), boundp);
    define_primitive("SYMBOL-NAME", 1, Some(1), symbol_name);
    define_primitive("SYMBOL-FUNCTION", 1, Some(1), symbol_function);
    define_primitive("FBOUNDP", 1, Some(1), fboundp);
    define_primitive("GENSYM", 0, Some(1), gensym_subr);
    define_primitive("GET", 2, Some(2), get);
    define_primitive("PUT", 3, Some(3), put);
    define_primitive("MACROEXPAND-1", 1, Some(1), macroexpand_1);

    define_primitive("ERROR", 1, None, error);
    define_primitive("PRINT", 1, Some(1), print);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Exception, symbol::intern};

    fn call(native: super::super::gsubr::Native, args: &[Value]) -> LispResult<Value> {
        match native(&mut Machine::default(), args)? {
            Trampoline::Return(value) => Ok(value),
            Trampoline::Apply(f, args) => Ok(Value::cons(f, args)),
        }
    }

    #[test]
    fn apply_spreads_its_last_argument() {
        let f = intern("F").as_value();
        let spread = list::list(&[Value::Integer(2), Value::Integer(3)]);
        let applied = call(apply, &[f.clone(), Value::Integer(1), spread]).unwrap();
        assert_eq!(applied.to_string(), "(F 1 2 3)");
        assert!(call(apply, &[f, Value::Integer(1)]).is_err());
    }

    #[test]
    fn plist_get_and_put() {
        let sym = intern("SUBR-TEST-PLIST").as_value();
        let key = intern("COLOR").as_value();
        assert!(call(get, &[sym.clone(), key.clone()]).unwrap().is_nil());
        call(put, &[sym.clone(), key.clone(), Value::Integer(1)]).unwrap();
        call(put, &[sym.clone(), key.clone(), Value::Integer(2)]).unwrap();
        assert!(matches!(call(get, &[sym, key]).unwrap(), Value::Integer(2)));
    }

    #[test]
    fn length_respects_the_list_limit() {
        let mut m = Machine::default();
        m.options_mut().max_list_length = 2;
        let long = list::list(&[Value::Nil, Value::Nil, Value::Nil]);
        let err = match length(&mut m, &[long]) {
            Err(err) => err,
            Ok(_) => panic!("expected a limit error"),
        };
        assert_eq!(err.kind, Exception::LimitExceeded);
        assert!(matches!(call(length, &[Value::string("héllo")]).unwrap(), Value::Integer(5)));
    }

    #[test]
    fn error_carries_irritants() {
        let err = call(error, &[Value::string("bad thing"), Value::Integer(7)]).unwrap_err();
        assert_eq!(err.kind, Exception::User);
        assert_eq!(err.message, "bad thing (7)");
    }

    #[test]
    fn unbound_symbol_value() {
        let sym = intern("SUBR-TEST-UNBOUND").as_value();
        let err = call(symbol_value, &[sym.clone()]).unwrap_err();
        assert_eq!(err.kind, Exception::UnboundVariable);
        assert!(!call(boundp, &[sym]).unwrap().truthy());
    }
}
