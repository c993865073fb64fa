//! Dynamic (special) variable bindings: the machine's **B** register.
//!
//! Every machine owns its own stacks, so independent machines never observe
//! each other's dynamic bindings. The global value slot of a symbol is shared.

use std::collections::HashMap;

use crate::{raise_exn, symbol::Symbol, value::Value, LispResult};

#[derive(Default)]
pub struct SpecialBindings {
    stacks: HashMap<Symbol, Vec<Value>>,
    /// Symbols in binding order, so non-local exits can unwind to a mark.
    log: Vec<Symbol>,
}

impl SpecialBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, symbol: &Symbol, value: Value) {
        self.stacks.entry(symbol.clone()).or_default().push(value);
        self.log.push(symbol.clone());
    }

    pub fn unbind(&mut self, symbol: &Symbol) -> LispResult<()> {
        match self.log.last() {
            Some(top) if top == symbol => {}
            _ => {
                return raise_exn!(
                    InvalidInstruction,
                    @symbol.as_value(),
                    "unbinding {} which is not the innermost dynamic binding",
                    symbol.name()
                )
            }
        }
        self.log.pop();
        self.pop_stack(symbol);
        Ok(())
    }

    fn pop_stack(&mut self, symbol: &Symbol) {
        if let Some(stack) = self.stacks.get_mut(symbol) {
            stack.pop();
            if stack.is_empty() {
                self.stacks.remove(symbol);
            }
        }
    }

    /// Number of active dynamic bindings of `symbol`. Zero means the global
    /// slot is in effect.
    pub fn depth(&self, symbol: &Symbol) -> usize {
        self.stacks.get(symbol).map_or(0, Vec::len)
    }

    /// Innermost dynamic binding, or the global value. `None` if unbound.
    pub fn read(&self, symbol: &Symbol) -> Option<Value> {
        match self.stacks.get(symbol).and_then(|stack| stack.last()) {
            Some(value) => Some(value.clone()),
            None => symbol.global_value(),
        }
    }

    pub fn set(&mut self, symbol: &Symbol, value: Value) {
        match self.stacks.get_mut(symbol).and_then(|stack| stack.last_mut()) {
            Some(slot) => *slot = value,
            None => symbol.set_global_value(value),
        }
    }

    pub fn mark(&self) -> usize {
        self.log.len()
    }

    /// Pops every binding made since `mark`, innermost first.
    pub fn unwind_to(&mut self, mark: usize) {
        while self.log.len() > mark {
            if let Some(symbol) = self.log.pop() {
                self.pop_stack(&symbol);
            }
        }
    }

    pub fn clear(&mut self) {
        self.stacks.clear();
        self.log.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::intern;

    #[test]
    fn nested_bindings_restore_exactly() {
        let x = intern("*BINDINGS-TEST-X*");
        x.set_global_value(Value::Integer(0));
        let mut b = SpecialBindings::new();

        b.bind(&x, Value::Integer(1));
        b.bind(&x, Value::Integer(2));
        assert_eq!(b.depth(&x), 2);
        assert!(matches!(b.read(&x), Some(Value::Integer(2))));

        b.set(&x, Value::Integer(20));
        b.unbind(&x).unwrap();
        assert!(matches!(b.read(&x), Some(Value::Integer(1))));
        b.unbind(&x).unwrap();
        assert_eq!(b.depth(&x), 0);
        assert!(matches!(b.read(&x), Some(Value::Integer(0))));

        b.set(&x, Value::Integer(5));
        assert!(matches!(x.global_value(), Some(Value::Integer(5))));
    }

    #[test]
    fn unwind_pops_everything_since_mark() {
        let x = intern("*BINDINGS-TEST-Y*");
        let z = intern("*BINDINGS-TEST-Z*");
        let mut b = SpecialBindings::new();
        b.bind(&x, Value::Integer(1));
        let mark = b.mark();
        b.bind(&z, Value::Integer(2));
        b.bind(&x, Value::Integer(3));
        b.unwind_to(mark);
        assert_eq!(b.depth(&x), 1);
        assert_eq!(b.depth(&z), 0);
    }

    #[test]
    fn unbinding_out_of_order_is_an_error() {
        let x = intern("*BINDINGS-TEST-P*");
        let y = intern("*BINDINGS-TEST-Q*");
        let mut b = SpecialBindings::new();
        b.bind(&x, Value::Nil);
        b.bind(&y, Value::Nil);
        assert!(b.unbind(&x).is_err());
    }
}
