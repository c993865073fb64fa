//! The value model.
//!
//! A [`Value`] is a closed variant type. Atoms are stored inline, everything
//! with identity (cons cells, symbols, strings, bignums, closures) is behind an
//! `Arc` so cloning a `Value` never copies structure: two clones of a cons
//! observe each other's `rplaca`/`rplacd`.
//!
//! Instruction lists are ordinary lists of values; [`Value::Opcode`] is the only
//! variant the machine treats as an instruction besides primitives.

use std::sync::{Arc, Weak};

use num::BigInt;
use parking_lot::Mutex;

use crate::list::ListIter;
use crate::number;
use crate::op::Opcode;
use crate::raise_exn;
use crate::runtime::gsubr::Primitive;
use crate::symbol::Symbol;
use crate::LispResult;

#[derive(Clone, Default)]
pub enum Value {
    /// The empty list and boolean false.
    #[default]
    Nil,
    True,
    Integer(i64),
    /// Only produced when a result does not fit in an `Integer`.
    Bignum(Arc<BigInt>),
    Real(f64),
    Character(char),
    String(Arc<str>),
    Symbol(Symbol),
    Cons(Cons),
    Function(Arc<Function>),
    /// A function applied to unevaluated arguments at compile time.
    Macro(Arc<Function>),
    Primitive(Arc<Primitive>),
    Opcode(Opcode),
}

/// A mutable pair. Cloning shares the cell.
#[derive(Clone)]
pub struct Cons(Arc<ConsCell>);

pub struct ConsCell {
    car: Mutex<Value>,
    cdr: Mutex<Value>,
}

impl Cons {
    pub fn new(car: Value, cdr: Value) -> Self {
        Cons(Arc::new(ConsCell {
            car: Mutex::new(car),
            cdr: Mutex::new(cdr),
        }))
    }

    #[inline]
    pub fn car(&self) -> Value {
        self.0.car.lock().clone()
    }

    #[inline]
    pub fn cdr(&self) -> Value {
        self.0.cdr.lock().clone()
    }

    /// Replaces the car. The old value is dropped after the lock is released.
    pub fn set_car(&self, value: Value) {
        let _old = std::mem::replace(&mut *self.0.car.lock(), value);
    }

    pub fn set_cdr(&self, value: Value) {
        let _old = std::mem::replace(&mut *self.0.cdr.lock(), value);
    }

    pub fn ptr_eq(&self, other: &Cons) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> Weak<ConsCell> {
        Arc::downgrade(&self.0)
    }
}

impl Drop for ConsCell {
    // Long cdr chains are released iteratively so dropping a list of any
    // length cannot exhaust the native stack.
    fn drop(&mut self) {
        let mut next = std::mem::take(self.cdr.get_mut());
        while let Value::Cons(Cons(cell)) = next {
            match Arc::try_unwrap(cell) {
                Ok(mut cell) => next = std::mem::take(cell.cdr.get_mut()),
                Err(_) => break,
            }
        }
    }
}

/// Number of arguments a closure accepts.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Arity {
    pub required: usize,
    /// Trailing `&REST` parameter.
    pub rest: bool,
}

impl Arity {
    pub fn fixed(required: usize) -> Self {
        Self {
            required,
            rest: false,
        }
    }

    pub fn accepts(&self, argc: usize) -> bool {
        argc == self.required || (self.rest && argc > self.required)
    }

    /// Encoding used as the first operand of `LDF`: `(required . rest-p)`.
    pub fn to_value(self) -> Value {
        Value::cons(
            Value::Integer(self.required as i64),
            Value::from_bool(self.rest),
        )
    }

    pub fn from_value(value: &Value) -> LispResult<Self> {
        if let Value::Cons(cell) = value {
            if let Value::Integer(required) = cell.car() {
                if required >= 0 {
                    return Ok(Self {
                        required: required as usize,
                        rest: cell.cdr().truthy(),
                    });
                }
            }
        }
        raise_exn!(InvalidInstruction, @value.clone(), "malformed arity operand: {}", value)
    }
}

/// The environment a closure was created in.
///
/// A closure stored into the very frame it closes over (the `LETREC`
/// pattern) holds that frame weakly, otherwise frame and closure would keep
/// each other alive forever. Loading such a closure out of the frame yields a
/// strong copy, so a closure that escapes keeps its frame.
#[derive(Clone)]
pub enum Env {
    Strong(Value),
    Weak(Weak<ConsCell>),
}

/// A closure: compiled code plus the environment it was created in.
///
/// Builtins are not closures, they are [`Value::Primitive`] values.
#[derive(Clone)]
pub struct Function {
    pub name: Option<Symbol>,
    pub arity: Arity,
    pub code: Value,
    env: Env,
}

impl Function {
    pub fn new(arity: Arity, code: Value, env: Value) -> Self {
        Self {
            name: None,
            arity,
            code,
            env: Env::Strong(env),
        }
    }

    pub fn named(&self, name: Symbol) -> Self {
        Self {
            name: Some(name),
            ..self.clone()
        }
    }

    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.name().to_owned(),
            None => "LAMBDA".to_owned(),
        }
    }

    pub fn env(&self) -> LispResult<Value> {
        match &self.env {
            Env::Strong(env) => Ok(env.clone()),
            Env::Weak(frame) => match frame.upgrade() {
                Some(cell) => Ok(Value::Cons(Cons(cell))),
                None => raise_exn!(
                    InvalidInstruction,
                    "{}: the frame this closure was defined in is gone",
                    self.display_name()
                ),
            },
        }
    }

    /// Whether the closure was created directly in `env`.
    pub fn closes_over(&self, env: &Value) -> bool {
        match (&self.env, env) {
            (Env::Strong(own), env) => eq(own, env),
            (Env::Weak(frame), Value::Cons(cell)) => std::ptr::eq(frame.as_ptr(), Arc::as_ptr(&cell.0)),
            _ => false,
        }
    }

    pub fn is_weak(&self) -> bool {
        matches!(self.env, Env::Weak(_))
    }

    /// `value` as it should be stored into `frame`: a closure over `frame`
    /// itself gets a weak environment.
    pub fn store_into(value: Value, frame: &Cons) -> Value {
        match &value {
            Value::Function(func) if !func.is_weak() && func.closes_over(&Value::Cons(frame.clone())) => {
                Value::Function(Arc::new(Function {
                    env: Env::Weak(frame.downgrade()),
                    ..(**func).clone()
                }))
            }
            _ => value,
        }
    }

    /// `value` as it should leave a frame: weak closures become strong copies.
    pub fn load_from(value: Value) -> LispResult<Value> {
        match &value {
            Value::Function(func) if func.is_weak() => Ok(Value::Function(Arc::new(Function {
                env: Env::Strong(func.env()?),
                ..(**func).clone()
            }))),
            _ => Ok(value),
        }
    }
}

impl Value {
    #[inline]
    pub fn cons(car: Value, cdr: Value) -> Value {
        Value::Cons(Cons::new(car, cdr))
    }

    #[inline]
    pub fn from_bool(b: bool) -> Value {
        if b {
            Value::True
        } else {
            Value::Nil
        }
    }

    pub fn string(s: &str) -> Value {
        Value::String(Arc::from(s))
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Everything except `Nil` is true.
    #[inline]
    pub fn truthy(&self) -> bool {
        !self.is_nil()
    }

    pub fn is_cons(&self) -> bool {
        matches!(self, Value::Cons(_))
    }

    pub fn is_atom(&self) -> bool {
        !self.is_cons()
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Value::Nil | Value::Cons(_))
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, Value::Symbol(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Bignum(_) | Value::Real(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Primitive(_))
    }

    pub fn as_cons(&self) -> Option<&Cons> {
        match self {
            Value::Cons(cell) => Some(cell),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Value::Symbol(sym) => Some(sym),
            _ => None,
        }
    }

    /// True for the given symbol.
    pub fn is(&self, sym: &Symbol) -> bool {
        matches!(self, Value::Symbol(s) if s == sym)
    }

    pub fn is_opcode(&self, op: Opcode) -> bool {
        matches!(self, Value::Opcode(o) if *o == op)
    }

    /// `car` of a list; `car(NIL)` is `NIL`.
    pub fn car(&self) -> LispResult<Value> {
        match self {
            Value::Nil => Ok(Value::Nil),
            Value::Cons(cell) => Ok(cell.car()),
            other => raise_exn!(TypeMismatch, @other.clone(), "not a cons: {}", other),
        }
    }

    /// `cdr` of a list; `cdr(NIL)` is `NIL`.
    pub fn cdr(&self) -> LispResult<Value> {
        match self {
            Value::Nil => Ok(Value::Nil),
            Value::Cons(cell) => Ok(cell.cdr()),
            other => raise_exn!(TypeMismatch, @other.clone(), "not a cons: {}", other),
        }
    }

    pub fn cadr(&self) -> LispResult<Value> {
        self.cdr()?.car()
    }

    pub fn cddr(&self) -> LispResult<Value> {
        self.cdr()?.cdr()
    }

    pub fn caddr(&self) -> LispResult<Value> {
        self.cddr()?.car()
    }

    pub fn cdddr(&self) -> LispResult<Value> {
        self.cddr()?.cdr()
    }

    /// Iterates the elements of a list, stopping at the first non-cons tail.
    pub fn iter(&self) -> ListIter {
        ListIter::new(self.clone())
    }

    pub fn expect_symbol(&self, who: &str) -> LispResult<Symbol> {
        match self {
            Value::Symbol(sym) => Ok(sym.clone()),
            other => raise_exn!(TypeMismatch, @other.clone(), "{}: not a symbol: {}", who, other),
        }
    }

    pub fn expect_cons(&self, who: &str) -> LispResult<Cons> {
        match self {
            Value::Cons(cell) => Ok(cell.clone()),
            other => raise_exn!(TypeMismatch, @other.clone(), "{}: not a cons: {}", who, other),
        }
    }

    pub fn expect_index(&self, who: &str) -> LispResult<usize> {
        match self {
            Value::Integer(n) if *n >= 0 => Ok(*n as usize),
            other => raise_exn!(
                TypeMismatch,
                @other.clone(),
                "{}: not a non-negative integer: {}",
                who,
                other
            ),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "NULL",
            Value::True => "BOOLEAN",
            Value::Integer(_) => "FIXNUM",
            Value::Bignum(_) => "BIGNUM",
            Value::Real(_) => "FLOAT",
            Value::Character(_) => "CHARACTER",
            Value::String(_) => "STRING",
            Value::Symbol(_) => "SYMBOL",
            Value::Cons(_) => "CONS",
            Value::Function(_) => "FUNCTION",
            Value::Macro(_) => "MACRO",
            Value::Primitive(_) => "PRIMITIVE",
            Value::Opcode(_) => "OPCODE",
        }
    }
}

/// Identity. Small atoms (`Integer`, `Character`, opcodes) compare by value,
/// everything allocated compares by reference.
pub fn eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Nil, Value::Nil) | (Value::True, Value::True) => true,
        (Value::Integer(x), Value::Integer(y)) => x == y,
        (Value::Real(x), Value::Real(y)) => x.to_bits() == y.to_bits(),
        (Value::Character(x), Value::Character(y)) => x == y,
        (Value::Bignum(x), Value::Bignum(y)) => Arc::ptr_eq(x, y),
        (Value::String(x), Value::String(y)) => Arc::ptr_eq(x, y),
        (Value::Symbol(x), Value::Symbol(y)) => x == y,
        (Value::Cons(x), Value::Cons(y)) => x.ptr_eq(y),
        (Value::Function(x), Value::Function(y)) | (Value::Macro(x), Value::Macro(y)) => {
            Arc::ptr_eq(x, y)
        }
        (Value::Primitive(x), Value::Primitive(y)) => Arc::ptr_eq(x, y),
        (Value::Opcode(x), Value::Opcode(y)) => x == y,
        _ => false,
    }
}

/// `eq`, extended to numbers by numeric value across `Integer`, `Bignum`
/// and `Real`.
pub fn eql(a: &Value, b: &Value) -> bool {
    if a.is_number() && b.is_number() {
        return number::num_eq(a, b);
    }
    eq(a, b)
}

/// Structural equality: conses recursively, strings by contents.
pub fn equal(a: &Value, b: &Value) -> bool {
    let mut a = a.clone();
    let mut b = b.clone();
    loop {
        match (&a, &b) {
            (Value::Cons(x), Value::Cons(y)) => {
                if x.ptr_eq(y) {
                    return true;
                }
                if !equal(&x.car(), &y.car()) {
                    return false;
                }
                let (next_a, next_b) = (x.cdr(), y.cdr());
                a = next_a;
                b = next_b;
            }
            (Value::String(x), Value::String(y)) => return x == y,
            _ => return eql(&a, &b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list;
    use crate::symbol::intern;

    #[test]
    fn nil_car_and_cdr_are_nil() {
        assert!(Value::Nil.car().unwrap().is_nil());
        assert!(Value::Nil.cdr().unwrap().is_nil());
        assert!(Value::Integer(1).car().is_err());
    }

    #[test]
    fn rplaca_is_visible_through_every_reference() {
        let cell = Value::cons(Value::Integer(1), Value::Nil);
        let alias = cell.clone();
        let holder = list::list(&[cell.clone()]);

        alias.as_cons().unwrap().set_car(Value::Integer(99));

        assert!(matches!(cell.car().unwrap(), Value::Integer(99)));
        assert!(matches!(holder.car().unwrap().car().unwrap(), Value::Integer(99)));
        assert!(eq(&cell, &alias));
    }

    #[test]
    fn eq_eql_equal() {
        let a = list::list(&[Value::Integer(1), Value::string("x")]);
        let b = list::list(&[Value::Integer(1), Value::string("x")]);
        assert!(!eq(&a, &b));
        assert!(equal(&a, &b));

        assert!(eql(&Value::Integer(1), &Value::Real(1.0)));
        assert!(!eq(&Value::Integer(1), &Value::Real(1.0)));
        assert!(!eql(&Value::string("x"), &Value::string("x")));

        let sym = Value::Symbol(intern("EQ-TEST-SYMBOL"));
        assert!(eq(&sym, &Value::Symbol(intern("EQ-TEST-SYMBOL"))));
    }

    #[test]
    fn arity_encoding() {
        let arity = Arity {
            required: 2,
            rest: true,
        };
        assert_eq!(Arity::from_value(&arity.to_value()).unwrap(), arity);
        assert!(arity.accepts(2));
        assert!(arity.accepts(5));
        assert!(!arity.accepts(1));
        assert!(!Arity::fixed(1).accepts(2));
    }

    #[test]
    fn dropping_a_long_list_does_not_recurse() {
        let mut list = Value::Nil;
        for i in 0..1_000_000 {
            list = Value::cons(Value::Integer(i), list);
        }
        drop(list);
    }
}
