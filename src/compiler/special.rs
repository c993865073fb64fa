//! Special forms.
//!
//! Each form is lowered either directly to instructions or by rewriting it
//! into simpler forms and compiling those.

use std::{collections::HashMap, sync::Arc};

use log::warn;
use once_cell::sync::Lazy;

use crate::{
    list::{list, list_star},
    op::Opcode,
    raise_exn,
    symbol::{self, gensym, intern, Symbol},
    value::{eq, Arity, Function, Value},
    LispResult,
};

use super::{
    emit, env::locate, env::Location, is_return, macros, op, proper_list, Compiler, Pending,
};

/// Compiles the arguments of a special form followed by `code`.
pub type SpecialForm = fn(&mut Compiler, &Value, &Value, Value) -> LispResult<Value>;

static SPECIAL_FORMS: Lazy<HashMap<Symbol, SpecialForm>> = Lazy::new(|| {
    let mut table: HashMap<Symbol, SpecialForm> = HashMap::new();

    macro_rules! define_special {
        ($name: literal, $rname: ident, $cc: ident, $args: ident, $frames: ident, $code: ident => $b: block) => {
            #[allow(unused_variables)]
            fn $rname($cc: &mut Compiler, $args: &Value, $frames: &Value, $code: Value) -> LispResult<Value> {
                $b
            }

            table.insert(intern($name), $rname as SpecialForm);
        };
    }

    define_special!("QUOTE", compile_quote, cc, args, frames, code => {
        let [datum] = arguments::<1>(&symbol::QUOTE, args)?;
        Ok(emit(&[op(Opcode::Ldc), datum], code))
    });

    define_special!("PROGN", progn, cc, args, frames, code => {
        cc.compile_progn(args, frames, code)
    });

    define_special!("IF", compile_if, cc, args, frames, code => {
        let parts = proper_list(args, &form(&symbol::IF, args))?;
        if parts.len() != 2 && parts.len() != 3 {
            return malformed(&symbol::IF, args, "expected (IF test then [else])");
        }
        let otherwise = parts.get(2).cloned().unwrap_or_default();
        if is_return(&code) {
            let then = cc.compile(&parts[1], frames, code.clone())?;
            let otherwise = cc.compile(&otherwise, frames, code)?;
            cc.compile(&parts[0], frames, Value::cons(op(Opcode::Test), Value::cons(then, otherwise)))
        } else {
            let join = list(&[op(Opcode::Join)]);
            let then = cc.compile(&parts[1], frames, join.clone())?;
            let otherwise = cc.compile(&otherwise, frames, join)?;
            cc.compile(&parts[0], frames, emit(&[op(Opcode::Sel), then, otherwise], code))
        }
    });

    define_special!("LET", compile_let, cc, args, frames, code => {
        let (names, values) = bindings(&symbol::LET, &args.car()?)?;
        let lambda = Value::cons(list(&names), args.cdr()?);
        cc.compile_call(&values, frames, code, |cc, code| cc.compile_lambda(&lambda, frames, code))
    });

    define_special!("LET*", let_star, cc, args, frames, code => {
        let clauses = proper_list(&args.car()?, &form(&symbol::LET_STAR, args))?;
        let body = args.cdr()?;
        let expansion = match clauses.split_first() {
            Some((first, rest)) if !rest.is_empty() => list(&[
                symbol::LET.as_value(),
                list(&[first.clone()]),
                list_star(&[symbol::LET_STAR.as_value(), list(rest)], body),
            ]),
            _ => list_star(&[symbol::LET.as_value(), list(&clauses)], body),
        };
        cc.compile(&expansion, frames, code)
    });

    define_special!("LETREC", letrec, cc, args, frames, code => {
        let (names, values) = bindings(&symbol::LETREC, &args.car()?)?;
        if names.iter().any(|name| matches!(name, Value::Symbol(sym) if sym.is_special())) {
            return malformed(&symbol::LETREC, args, "cannot bind a special variable");
        }
        let frames = Value::cons(list(&names), frames.clone());
        let body = cc.compile_progn(&args.cdr()?, &frames, list(&[op(Opcode::Rtn)]))?;
        let code = emit(
            &[
                op(Opcode::Lis),
                Value::Integer(values.len() as i64),
                op(Opcode::Ldf),
                Arity::fixed(values.len()).to_value(),
                body,
                op(Opcode::Rap),
            ],
            code,
        );
        let code = cc.compile_arguments(&values, &frames, code)?;
        Ok(Value::cons(op(Opcode::Dum), code))
    });

    define_special!("LABELS", labels, cc, args, frames, code => {
        let definitions = proper_list(&args.car()?, &form(&symbol::LABELS, args))?;
        let mut clauses = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let name = definition.car()?;
            if !name.is_symbol() {
                return malformed(&symbol::LABELS, args, "function name must be a symbol");
            }
            let lambda = Value::cons(symbol::LAMBDA.as_value(), definition.cdr()?);
            clauses.push(list(&[name, lambda]));
        }
        let expansion = list_star(&[symbol::LETREC.as_value(), list(&clauses)], args.cdr()?);
        cc.compile(&expansion, frames, code)
    });

    define_special!("LAMBDA", lambda, cc, args, frames, code => {
        if !args.is_cons() {
            return malformed(&symbol::LAMBDA, args, "missing lambda list");
        }
        cc.compile_lambda(args, frames, code)
    });

    define_special!("DEFUN", defun, cc, args, frames, code => {
        compile_definition(cc, Pending::Function, args, frames, code)
    });

    define_special!("DEFMACRO", defmacro, cc, args, frames, code => {
        compile_definition(cc, Pending::Macro, args, frames, code)
    });

    define_special!("AND", and, cc, args, frames, code => {
        let parts = proper_list(args, &form(&symbol::AND, args))?;
        let expansion = match parts.as_slice() {
            [] => Value::True,
            [only] => only.clone(),
            [first, rest @ ..] => list(&[
                symbol::IF.as_value(),
                first.clone(),
                list_star(&[symbol::AND.as_value()], list(rest)),
                Value::Nil,
            ]),
        };
        cc.compile(&expansion, frames, code)
    });

    define_special!("OR", or, cc, args, frames, code => {
        let parts = proper_list(args, &form(&symbol::OR, args))?;
        let expansion = match parts.as_slice() {
            [] => Value::Nil,
            [only] => only.clone(),
            [first, rest @ ..] => {
                let temp = gensym("OR").as_value();
                list(&[
                    symbol::LET.as_value(),
                    list(&[list(&[temp.clone(), first.clone()])]),
                    list(&[
                        symbol::IF.as_value(),
                        temp.clone(),
                        temp,
                        list_star(&[symbol::OR.as_value()], list(rest)),
                    ]),
                ])
            }
        };
        cc.compile(&expansion, frames, code)
    });

    define_special!("BLOCK", block, cc, args, frames, code => {
        let tag = block_tag(&symbol::BLOCK, args)?;
        let forms = args.cdr()?;
        // A block that ends where its function ends and is never returned
        // from needs no frame, and calls in its tail stay tail calls.
        if is_return(&code) {
            let body = cc.compile_progn(&forms, frames, code.clone())?;
            if !returns_to(&body, &tag, &code) {
                return Ok(body);
            }
        }
        let body = cc.compile_progn(&forms, frames, list(&[op(Opcode::Unblk)]))?;
        Ok(emit(&[op(Opcode::Blk), tag, body], code))
    });

    define_special!("RETURN-FROM", return_from, cc, args, frames, code => {
        let tag = block_tag(&symbol::RETURN_FROM, args)?;
        let value = match proper_list(&args.cdr()?, &form(&symbol::RETURN_FROM, args))?.as_slice() {
            [] => Value::Nil,
            [value] => value.clone(),
            _ => return malformed(&symbol::RETURN_FROM, args, "too many arguments"),
        };
        cc.compile(&value, frames, emit(&[op(Opcode::RtnFrom), tag], code))
    });

    define_special!("RETURN", compile_return, cc, args, frames, code => {
        let value = match proper_list(args, &form(&symbol::RETURN, args))?.as_slice() {
            [] => Value::Nil,
            [value] => value.clone(),
            _ => return malformed(&symbol::RETURN, args, "too many arguments"),
        };
        cc.compile(&value, frames, emit(&[op(Opcode::RtnFrom), Value::Nil], code))
    });

    define_special!("SETQ", setq, cc, args, frames, code => {
        let parts = proper_list(args, &form(&symbol::SETQ, args))?;
        if parts.len() % 2 != 0 {
            return malformed(&symbol::SETQ, args, "odd number of arguments");
        }
        if parts.is_empty() {
            return Ok(emit(&[op(Opcode::Nil)], code));
        }
        let last = parts.len() / 2 - 1;
        let mut code = code;
        for (index, pair) in parts.chunks(2).enumerate().rev() {
            if index != last {
                code = Value::cons(op(Opcode::Pop), code);
            }
            let sym = match &pair[0] {
                Value::Symbol(sym) if !sym.is_keyword() => sym.clone(),
                _ => return malformed(&symbol::SETQ, args, "variable name must be a symbol"),
            };
            code = match locate(&sym, frames) {
                Location::Local(i, j) => emit(&[op(Opcode::St), super::address(i, j)], code),
                Location::Rest(..) => {
                    return malformed(&symbol::SETQ, args, "cannot assign a &REST parameter")
                }
                Location::Special => emit(&[op(Opcode::Stg), sym.as_value()], code),
                Location::Global => {
                    if !sym.is_special() {
                        warn!(target: "secd::compiler", "assignment to undeclared variable {}", sym.name());
                    }
                    emit(&[op(Opcode::Stg), sym.as_value()], code)
                }
            };
            code = cc.compile(&pair[1], frames, code)?;
        }
        Ok(code)
    });

    define_special!("COND", cond, cc, args, frames, code => {
        let clauses = proper_list(args, &form(&symbol::COND, args))?;
        let mut expansion = Value::Nil;
        for clause in clauses.iter().rev() {
            let parts = proper_list(clause, &form(&symbol::COND, args))?;
            expansion = match parts.split_first() {
                None => return malformed(&symbol::COND, args, "empty clause"),
                Some((test, [])) if expansion.is_nil() => test.clone(),
                Some((test, [])) => list(&[symbol::OR.as_value(), test.clone(), expansion]),
                Some((test, body)) => list(&[
                    symbol::IF.as_value(),
                    test.clone(),
                    list_star(&[symbol::PROGN.as_value()], list(body)),
                    expansion,
                ]),
            };
        }
        cc.compile(&expansion, frames, code)
    });

    define_special!("WHEN", when, cc, args, frames, code => {
        if !args.is_cons() {
            return malformed(&symbol::WHEN, args, "missing test");
        }
        let body = Value::cons(symbol::PROGN.as_value(), args.cdr()?);
        cc.compile(&list(&[symbol::IF.as_value(), args.car()?, body]), frames, code)
    });

    define_special!("UNLESS", unless, cc, args, frames, code => {
        if !args.is_cons() {
            return malformed(&symbol::UNLESS, args, "missing test");
        }
        let body = Value::cons(symbol::PROGN.as_value(), args.cdr()?);
        cc.compile(&list(&[symbol::IF.as_value(), args.car()?, Value::Nil, body]), frames, code)
    });

    define_special!("FUNCTION", function, cc, args, frames, code => {
        let [name] = arguments::<1>(&symbol::FUNCTION, args)?;
        match &name {
            Value::Symbol(sym) => compile_function_ref(cc, sym, frames, code),
            Value::Cons(cell) if cell.car().is(&symbol::LAMBDA) => {
                cc.compile_lambda(&cell.cdr(), frames, code)
            }
            _ => malformed(&symbol::FUNCTION, args, "expected a symbol or a lambda expression"),
        }
    });

    define_special!("DEFVAR", defvar, cc, args, frames, code => {
        let parts = proper_list(args, &form(&symbol::DEFVAR, args))?;
        let name = variable_name(&symbol::DEFVAR, args, parts.first())?;
        name.proclaim_special();
        let quoted = quote(name.as_value());
        let expansion = match parts.get(1) {
            None => quoted,
            Some(value) => list(&[
                symbol::IF.as_value(),
                list(&[symbol::BOUNDP.as_value(), quoted.clone()]),
                quoted.clone(),
                list(&[
                    symbol::PROGN.as_value(),
                    list(&[symbol::SETQ.as_value(), name.as_value(), value.clone()]),
                    quoted,
                ]),
            ]),
        };
        cc.compile(&expansion, frames, code)
    });

    define_special!("DEFPARAMETER", defparameter, cc, args, frames, code => {
        let parts = proper_list(args, &form(&symbol::DEFPARAMETER, args))?;
        let name = variable_name(&symbol::DEFPARAMETER, args, parts.first())?;
        let Some(value) = parts.get(1) else {
            return malformed(&symbol::DEFPARAMETER, args, "missing value");
        };
        name.proclaim_special();
        let expansion = list(&[
            symbol::PROGN.as_value(),
            list(&[symbol::SETQ.as_value(), name.as_value(), value.clone()]),
            quote(name.as_value()),
        ]);
        cc.compile(&expansion, frames, code)
    });

    define_special!("QUASIQUOTE", quasiquote, cc, args, frames, code => {
        let [template] = arguments::<1>(&symbol::QUASIQUOTE, args)?;
        cc.compile(&macros::quasiquote(&template)?, frames, code)
    });

    define_special!("UNQUOTE", unquote, cc, args, frames, code => {
        malformed(&symbol::UNQUOTE, args, "comma outside of a backquote")
    });

    define_special!("UNQUOTE-SPLICING", unquote_splicing, cc, args, frames, code => {
        malformed(&symbol::UNQUOTE_SPLICING, args, "comma-at outside of a backquote")
    });

    define_special!("DECLARE", declare, cc, args, frames, code => {
        malformed(&symbol::DECLARE, args, "declaration in a position where it is not allowed")
    });

    table
});

pub fn lookup(sym: &Symbol) -> Option<SpecialForm> {
    SPECIAL_FORMS.get(sym).copied()
}

pub fn is_special_form(sym: &Symbol) -> bool {
    SPECIAL_FORMS.contains_key(sym)
}

fn form(name: &Symbol, args: &Value) -> Value {
    Value::cons(name.as_value(), args.clone())
}

fn quote(value: Value) -> Value {
    list(&[symbol::QUOTE.as_value(), value])
}

fn malformed<T>(name: &Symbol, args: &Value, why: &str) -> LispResult<T> {
    let form = form(name, args);
    raise_exn!(MalformedForm, @form.clone(), "{}: {} in {}", name.name(), why, form)
}

/// Exactly `N` arguments.
fn arguments<const N: usize>(name: &Symbol, args: &Value) -> LispResult<[Value; N]> {
    let parts = proper_list(args, &form(name, args))?;
    match <[Value; N]>::try_from(parts) {
        Ok(parts) => Ok(parts),
        Err(_) => malformed(name, args, &format!("expected {} argument(s)", N)),
    }
}

/// `((name value) name (name) ...)` into names and value forms.
fn bindings(name: &Symbol, clauses: &Value) -> LispResult<(Vec<Value>, Vec<Value>)> {
    let mut names = Vec::new();
    let mut values = Vec::new();
    for clause in proper_list(clauses, &form(name, clauses))? {
        let (var, value) = match &clause {
            Value::Symbol(_) => (clause.clone(), Value::Nil),
            Value::Cons(_) => match proper_list(&clause, &form(name, clauses))?.as_slice() {
                [var] => (var.clone(), Value::Nil),
                [var, value] => (var.clone(), value.clone()),
                _ => return malformed(name, clauses, "malformed binding"),
            },
            _ => return malformed(name, clauses, "malformed binding"),
        };
        match &var {
            Value::Symbol(sym) if !sym.is_keyword() => {}
            _ => return malformed(name, clauses, "variable name must be a symbol"),
        }
        names.push(var);
        values.push(value);
    }
    Ok((names, values))
}

fn block_tag(name: &Symbol, args: &Value) -> LispResult<Value> {
    match args.car()? {
        tag @ (Value::Nil | Value::Symbol(_)) if args.is_cons() => Ok(tag),
        _ => malformed(name, args, "block name must be a symbol"),
    }
}

fn variable_name(name: &Symbol, args: &Value, var: Option<&Value>) -> LispResult<Symbol> {
    match var {
        Some(Value::Symbol(sym)) if !sym.is_keyword() => Ok(sym.clone()),
        _ => malformed(name, args, "variable name must be a symbol"),
    }
}

/// Leading `(DECLARE ...)` forms of a body, and the rest of it.
pub fn split_declarations(body: &Value) -> LispResult<(Vec<Value>, Value)> {
    let mut declarations = Vec::new();
    let mut rest = body.clone();
    while let Value::Cons(cell) = &rest {
        let head = cell.car();
        if !matches!(head.car(), Ok(Value::Symbol(ref s)) if *s == *symbol::DECLARE) {
            break;
        }
        declarations.push(head);
        rest = cell.cdr();
    }
    Ok((declarations, rest))
}

/// Symbols named by `(DECLARE (SPECIAL ...))`. Other declarations are
/// ignored.
pub fn declared_specials(declarations: &[Value]) -> LispResult<Vec<Symbol>> {
    let mut specials = Vec::new();
    for declaration in declarations {
        for specifier in proper_list(&declaration.cdr()?, declaration)? {
            if !matches!(specifier.car(), Ok(head) if head.is(&symbol::SPECIAL)) {
                continue;
            }
            for var in proper_list(&specifier.cdr()?, declaration)? {
                match var {
                    Value::Symbol(sym) => specials.push(sym),
                    _ => return malformed(&symbol::DECLARE, &declaration.cdr()?, "SPECIAL names symbols"),
                }
            }
        }
    }
    Ok(specials)
}

/// Whether compiled `code`, nested closure bodies included, contains
/// `RTN_FROM tag`. The shared continuation `stop` is not searched.
fn returns_to(code: &Value, tag: &Value, stop: &Value) -> bool {
    let mut cursor = code.clone();
    while let Value::Cons(cell) = &cursor {
        if eq(&cursor, stop) {
            return false;
        }
        let insn = cell.car();
        if insn.is_opcode(Opcode::RtnFrom) {
            if matches!(cell.cdr().car(), Ok(target) if eq(&target, tag)) {
                return true;
            }
        } else if insn.is_cons() && returns_to(&insn, tag, stop) {
            return true;
        }
        cursor = cell.cdr();
    }
    false
}

/// `DEFUN` and `DEFMACRO`. The body is an implicit `BLOCK` named after the
/// definition.
fn compile_definition(
    cc: &mut Compiler,
    kind: Pending,
    args: &Value,
    frames: &Value,
    code: Value,
) -> LispResult<Value> {
    let definer = match kind {
        Pending::Function => &*symbol::DEFUN,
        Pending::Macro => &*symbol::DEFMACRO,
    };
    let name = match args.car()? {
        Value::Symbol(sym) if !sym.is_keyword() && !is_special_form(&sym) => sym,
        _ => return malformed(definer, args, "name must be a symbol that is not a special form"),
    };
    if !args.cdr()?.is_cons() {
        return malformed(definer, args, "missing lambda list");
    }
    let lambda_list = args.cadr()?;
    let (declarations, body) = split_declarations(&args.cddr()?)?;
    let block = list_star(&[symbol::BLOCK.as_value(), name.as_value()], body);
    let body = list_star(&declarations, list(&[block]));

    cc.declare_pending(&name, kind);
    let (arity, function_code) = cc.compile_lambda_body(&lambda_list, &body, frames)?;

    let install = match kind {
        Pending::Function => Opcode::Defun,
        Pending::Macro => {
            // Top-level macros are usable by the rest of the form being compiled.
            if frames.is_nil() {
                let expander = Function::new(arity, function_code.clone(), Value::Nil).named(name.clone());
                cc.install_macro(&name, Value::Macro(Arc::new(expander)));
                cc.forget_pending(&name);
            }
            Opcode::Defmacro
        }
    };
    Ok(emit(
        &[
            op(Opcode::Ldf),
            arity.to_value(),
            function_code,
            op(install),
            name.as_value(),
        ],
        code,
    ))
}

/// `#'name`: a lexical variable, a primitive, or the function slot at run time.
fn compile_function_ref(
    cc: &mut Compiler,
    sym: &Symbol,
    frames: &Value,
    code: Value,
) -> LispResult<Value> {
    if let Location::Local(..) | Location::Rest(..) = locate(sym, frames) {
        return cc.compile_variable(sym, frames, code);
    }
    if !cc.is_pending(sym) {
        match sym.function() {
            Some(prim @ Value::Primitive(_)) => return Ok(emit(&[op(Opcode::Ldc), prim], code)),
            Some(Value::Macro(_)) => {
                return raise_exn!(IllegalFunctionCall, @sym.as_value(), "{} names a macro, not a function", sym.name())
            }
            Some(_) => {}
            None if !cc.options().strict_functions => warn!(
                target: "secd::compiler",
                "undefined function {}, lookup deferred to run time",
                sym.name()
            ),
            None => {
                return raise_exn!(UndefinedFunction, @sym.as_value(), "undefined function {}", sym.name())
            }
        }
    }
    Ok(emit(&[op(Opcode::Ldfn), sym.as_value()], code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Exception, reader::read_str, runtime::gsubr};

    fn code(src: &str) -> LispResult<String> {
        gsubr::init();
        let form = read_str(src)?;
        Ok(Compiler::default().compile_toplevel(&form)?.to_string())
    }

    #[test]
    fn letrec_patches_a_dummy_frame() {
        assert_eq!(
            code("(letrec ((f (lambda () (f)))) (f))").unwrap(),
            "(DUM LDF (0) (LIS 0 LD (2 . 1) TAP RTN) LIS 1 LDF (1) (LIS 0 LD (1 . 1) TAP RTN) RAP STOP)"
        );
    }

    #[test]
    fn let_is_a_lambda_application() {
        assert_eq!(
            code("(let ((x 1)) x)").unwrap(),
            "(LDC 1 LIS 1 LDF (1) (LD (1 . 1) RTN) AP STOP)"
        );
    }

    #[test]
    fn special_parameters_are_bound_dynamically() {
        assert_eq!(
            code("(let ((special-test-x 1)) (declare (special special-test-x)) special-test-x)").unwrap(),
            "(LDC 1 LIS 1 LDF (1) (LD (1 . 1) SP_BIND SPECIAL-TEST-X LDG SPECIAL-TEST-X SP_UNBIND SPECIAL-TEST-X RTN) AP STOP)"
        );
    }

    #[test]
    fn defun_block_costs_nothing_unless_returned_from() {
        let plain = code("(defun special-test-plain (x) x)").unwrap();
        assert_eq!(
            plain,
            "(LDF (1) (LD (1 . 1) RTN) DEFUN SPECIAL-TEST-PLAIN STOP)"
        );
        let looping = code("(defun special-test-loop (n) (special-test-loop n))").unwrap();
        assert!(looping.contains("TAP"));
        let early = code("(defun special-test-early (x) (return-from special-test-early x))").unwrap();
        assert!(early.contains("BLK SPECIAL-TEST-EARLY"));
    }

    #[test]
    fn blocks_keep_a_frame_only_when_needed() {
        assert_eq!(code("(block b 1 2)").unwrap(), "(LDC 1 POP LDC 2 STOP)");
        assert_eq!(
            code("(block nil (return 1) 2)").unwrap(),
            "(BLK NIL (LDC 1 RTN_FROM NIL POP LDC 2 UNBLK) STOP)"
        );
        assert_eq!(code("(list (block b 1))").unwrap(), "(BLK B (LDC 1 UNBLK) LIS 1 STOP)");
    }

    #[test]
    fn setq_stores_locals_and_globals() {
        assert_eq!(
            code("(lambda (x) (setq x 2))").unwrap(),
            "(LDF (1) (LDC 2 ST (1 . 1) RTN) STOP)"
        );
        let err = code("(lambda (&rest r) (setq r 2))").unwrap_err();
        assert_eq!(err.kind, Exception::MalformedForm);
    }

    #[test]
    fn misplaced_forms_are_malformed() {
        assert_eq!(code("(declare (special x))").unwrap_err().kind, Exception::MalformedForm);
        assert_eq!(code("(unquote x)").unwrap_err().kind, Exception::MalformedForm);
        assert_eq!(code("(quote)").unwrap_err().kind, Exception::MalformedForm);
        assert_eq!(code("(let (1) 1)").unwrap_err().kind, Exception::MalformedForm);
        assert_eq!(code("(defun if () 1)").unwrap_err().kind, Exception::MalformedForm);
    }

    #[test]
    fn return_from_is_found_in_nested_code() {
        let tag = intern("SPECIAL-TEST-TARGET").as_value();
        let stop = list(&[op(Opcode::Rtn)]);
        let nested = read_str("(LDF (0) (LDC 1 RTN_FROM special-test-target RTN))").unwrap();
        assert!(!returns_to(&nested, &tag, &stop));

        let inner = list(&[op(Opcode::Ldc), Value::Integer(1), op(Opcode::RtnFrom), tag.clone(), op(Opcode::Rtn)]);
        let code = list(&[op(Opcode::Ldf), Arity::fixed(0).to_value(), inner, op(Opcode::Rtn)]);
        assert!(returns_to(&code, &tag, &stop));
        assert!(!returns_to(&code, &intern("SPECIAL-TEST-OTHER").as_value(), &stop));
    }
}
