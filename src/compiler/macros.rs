//! Backquote expansion.
//!
//! A backquoted template is rewritten into ordinary list-building code before
//! it is compiled: constant parts are quoted, `,x` is evaluated in place and
//! `,@x` is spliced with `APPEND`. Nested backquotes raise the unquote level.

use crate::{
    list::list,
    raise_exn,
    symbol::{APPEND, CONS, QUASIQUOTE, QUOTE, UNQUOTE, UNQUOTE_SPLICING},
    value::Value,
    LispResult,
};

/// Expands the template of `` `template ``.
pub fn quasiquote(template: &Value) -> LispResult<Value> {
    qq(template, 1)
}

fn qq(x: &Value, depth: usize) -> LispResult<Value> {
    let Value::Cons(cell) = x else {
        return Ok(quote(x.clone()));
    };
    let head = cell.car();

    if head.is(&UNQUOTE) {
        let arg = single(x)?;
        if depth == 1 {
            return Ok(arg);
        }
        return Ok(wrap_list(list(&[
            quote(UNQUOTE.as_value()),
            qq(&arg, depth - 1)?,
        ])));
    }
    if head.is(&UNQUOTE_SPLICING) && depth == 1 {
        return raise_exn!(MalformedForm, @x.clone(), ",@ not inside a list: {}", x);
    }
    if head.is(&QUASIQUOTE) {
        let arg = single(x)?;
        return Ok(wrap_list(list(&[
            quote(QUASIQUOTE.as_value()),
            qq(&arg, depth + 1)?,
        ])));
    }

    let rest = qq(&cell.cdr(), depth)?;
    if let Value::Cons(element) = &head {
        if element.car().is(&UNQUOTE_SPLICING) && depth == 1 {
            let spliced = single(&head)?;
            return Ok(if is_quoted_nil(&rest) {
                spliced
            } else {
                list(&[APPEND.as_value(), spliced, rest])
            });
        }
    }
    Ok(cons_form(qq(&head, depth)?, rest))
}

/// The only argument of `(op arg)`.
fn single(form: &Value) -> LispResult<Value> {
    match form.cdr()? {
        Value::Cons(args) if args.cdr().is_nil() => Ok(args.car()),
        _ => raise_exn!(MalformedForm, @form.clone(), "expected exactly one argument: {}", form),
    }
}

fn quote(value: Value) -> Value {
    list(&[QUOTE.as_value(), value])
}

/// `(LIST a b)` built from already expanded parts, folded into a quote when
/// both are constant.
fn wrap_list(parts: Value) -> Value {
    let first = parts.car().unwrap_or_default();
    let second = parts.cadr().unwrap_or_default();
    cons_form(first, cons_form(second, quote(Value::Nil)))
}

fn quoted(form: &Value) -> Option<Value> {
    match form {
        Value::Cons(cell) if cell.car().is(&QUOTE) => cell.cdr().car().ok(),
        _ => None,
    }
}

fn is_quoted_nil(form: &Value) -> bool {
    matches!(quoted(form), Some(Value::Nil))
}

fn cons_form(car: Value, cdr: Value) -> Value {
    match (quoted(&car), quoted(&cdr)) {
        (Some(a), Some(d)) => quote(Value::cons(a, d)),
        _ => list(&[CONS.as_value(), car, cdr]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Exception, reader::read_str};

    fn expand(src: &str) -> LispResult<String> {
        let form = read_str(src)?;
        Ok(quasiquote(&form.cadr()?)?.to_string())
    }

    #[test]
    fn constant_templates_are_quoted() {
        assert_eq!(expand("`(a b)").unwrap(), "(QUOTE (A B))");
        assert_eq!(expand("`a").unwrap(), "(QUOTE A)");
    }

    #[test]
    fn unquote_evaluates_in_place() {
        assert_eq!(expand("`(a ,b)").unwrap(), "(CONS (QUOTE A) (CONS B (QUOTE NIL)))");
        assert_eq!(expand("`,x").unwrap(), "X");
    }

    #[test]
    fn splicing_appends() {
        assert_eq!(expand("`(a ,@b c)").unwrap(), "(CONS (QUOTE A) (APPEND B (QUOTE (C))))");
        assert_eq!(expand("`(,@b)").unwrap(), "B");
    }

    #[test]
    fn splicing_outside_a_list_is_malformed() {
        assert_eq!(expand("`,@x").unwrap_err().kind, Exception::MalformedForm);
    }

    #[test]
    fn nested_backquote_keeps_inner_unquotes() {
        assert_eq!(
            expand("`(a `(b ,c))").unwrap(),
            "(QUOTE (A (QUASIQUOTE (B (UNQUOTE C)))))"
        );
    }
}
