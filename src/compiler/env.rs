//! Compile-time lexical environments.
//!
//! A frame is a list with one entry per runtime frame slot: a plain symbol
//! for a lexical variable, `(SPECIAL . sym)` for a slot whose variable is
//! dynamically bound (it is accessed through the binding stack instead), and
//! the `&REST` marker before the slot holding a rest list. Frames are listed
//! innermost first, matching the machine's **E** register.

use crate::{
    raise_exn,
    symbol::{Symbol, AMP_BODY, AMP_REST, SPECIAL},
    value::{Arity, Value},
    LispResult,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Location {
    /// Frame `i`, slot `j`, both 1-based.
    Local(usize, usize),
    /// The rest list of a variadic frame.
    Rest(usize, usize),
    /// A dynamically bound parameter.
    Special,
    /// Free. Resolved through the symbol's global slot.
    Global,
}

pub fn locate(symbol: &Symbol, frames: &Value) -> Location {
    for (i, frame) in frames.iter().enumerate() {
        let mut j = 0;
        let mut rest = false;
        for entry in frame.iter() {
            match &entry {
                Value::Symbol(s) if *s == *AMP_REST => {
                    rest = true;
                    continue;
                }
                Value::Symbol(s) if s == symbol => {
                    j += 1;
                    return if rest {
                        Location::Rest(i + 1, j)
                    } else {
                        Location::Local(i + 1, j)
                    };
                }
                Value::Cons(placeholder) if placeholder.cdr().is(symbol) => return Location::Special,
                _ => {}
            }
            j += 1;
        }
    }
    Location::Global
}

/// A parsed lambda list: `(a b &rest c)`, `(a &body b)` or `(a . b)`.
pub struct LambdaList {
    pub required: Vec<Symbol>,
    pub rest: Option<Symbol>,
}

impl LambdaList {
    pub fn parse(list: &Value) -> LispResult<Self> {
        let mut required = Vec::new();
        let mut rest = None;
        let mut cursor = list.clone();
        loop {
            match cursor {
                Value::Nil => break,
                Value::Symbol(sym) => {
                    rest = Some(sym);
                    break;
                }
                Value::Cons(cell) => {
                    let param = param_symbol(&cell.car(), list)?;
                    if param == *AMP_REST || param == *AMP_BODY {
                        let tail = cell.cdr();
                        let (Some(name), true) = (tail.car()?.as_symbol().cloned(), tail.cdr()?.is_nil()) else {
                            return raise_exn!(MalformedForm, @list.clone(), "malformed &REST in lambda list {}", list);
                        };
                        rest = Some(param_symbol(&name.as_value(), list)?);
                        break;
                    }
                    required.push(param);
                    cursor = cell.cdr();
                }
                _ => {
                    return raise_exn!(MalformedForm, @list.clone(), "malformed lambda list {}", list);
                }
            }
        }
        Ok(Self { required, rest })
    }

    pub fn arity(&self) -> Arity {
        Arity {
            required: self.required.len(),
            rest: self.rest.is_some(),
        }
    }

    /// Parameters with their 1-based slot and whether the slot is the rest list.
    pub fn slots(&self) -> impl Iterator<Item = (&Symbol, usize, bool)> {
        let rest_slot = self.required.len() + 1;
        self.required
            .iter()
            .enumerate()
            .map(|(j, sym)| (sym, j + 1, false))
            .chain(self.rest.iter().map(move |sym| (sym, rest_slot, true)))
    }

    /// The compile-time frame, with `is_special` parameters as placeholders.
    pub fn frame(&self, is_special: impl Fn(&Symbol) -> bool) -> Value {
        let entry = |sym: &Symbol| {
            if is_special(sym) {
                Value::cons(SPECIAL.as_value(), sym.as_value())
            } else {
                sym.as_value()
            }
        };
        let mut entries: Vec<Value> = self.required.iter().map(&entry).collect();
        if let Some(rest) = &self.rest {
            entries.push(AMP_REST.as_value());
            entries.push(entry(rest));
        }
        crate::list::list(&entries)
    }
}

fn param_symbol(value: &Value, list: &Value) -> LispResult<Symbol> {
    match value {
        Value::Symbol(sym) if !sym.is_keyword() => Ok(sym.clone()),
        other => raise_exn!(MalformedForm, @other.clone(), "invalid parameter {} in lambda list {}", other, list),
    }
}
