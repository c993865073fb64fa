//! The SECD machine.
//!
//! Registers:
//!
//! - **S** operand stack
//! - **E** environment: a list of frames, each frame a list of values
//! - **C** control: the remaining instruction list
//! - **D** dump: saved call states and join points
//! - **B** dynamic bindings ([`SpecialBindings`])
//! - **X** active named blocks
//!
//! `E` and `C` are ordinary lists, so closures capture `E` by sharing it and
//! `RAP` can patch a placeholder frame in place. `S`, `D` and `X` are private
//! to the machine and never escape as values, they are plain vectors.
//!
//! [`Machine::execute`] resets every register before running and again when
//! it returns, successfully or not, so a machine can be reused after an
//! error.

use std::sync::Arc;

use log::trace;

use crate::{
    bindings::SpecialBindings,
    list,
    op::Opcode,
    raise_exn,
    runtime::gsubr::Primitive,
    symbol::Symbol,
    value::{eq, Arity, Function, Value},
    LispResult,
};

pub mod options;

use options::MachineOptions;

/// Result of a primitive.
pub enum Trampoline {
    /// Push the value onto **S**.
    Return(Value),
    /// Apply a function to an argument list in the caller's place. Lets
    /// `FUNCALL` and `APPLY` run closures without recursing on the native
    /// stack.
    Apply(Value, Value),
}

enum Dump {
    Call { s: Vec<Value>, e: Value, c: Value },
    Join(Value),
}

struct BlockFrame {
    tag: Value,
    s: Vec<Value>,
    e: Value,
    c: Value,
    dump: usize,
    bindings: usize,
}

#[derive(Clone, Copy, Default, Debug)]
pub struct MachineStats {
    /// Instructions executed by the last `execute`.
    pub steps: u64,
    /// High-water mark of the dump during the last `execute`.
    pub max_dump_depth: usize,
}

pub struct Machine {
    s: Vec<Value>,
    e: Value,
    c: Value,
    d: Vec<Dump>,
    b: SpecialBindings,
    x: Vec<BlockFrame>,
    options: MachineOptions,
    stats: MachineStats,
}

impl Machine {
    pub fn new(options: MachineOptions) -> Self {
        Self {
            s: Vec::new(),
            e: Value::Nil,
            c: Value::Nil,
            d: Vec::new(),
            b: SpecialBindings::new(),
            x: Vec::new(),
            options,
            stats: MachineStats::default(),
        }
    }

    pub fn options(&self) -> &MachineOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut MachineOptions {
        &mut self.options
    }

    pub fn stats(&self) -> MachineStats {
        self.stats
    }

    pub fn dump_depth(&self) -> usize {
        self.d.len()
    }

    pub fn bindings(&self) -> &SpecialBindings {
        &self.b
    }

    pub fn bindings_mut(&mut self) -> &mut SpecialBindings {
        &mut self.b
    }

    fn reset(&mut self) {
        self.s.clear();
        self.e = Value::Nil;
        self.c = Value::Nil;
        self.d.clear();
        self.b.clear();
        self.x.clear();
    }

    /// Runs `code` in environment `env` until `STOP`, a `RTN` with an empty
    /// dump, or the end of the code. The result is the top of **S**, `NIL`
    /// when the stack is empty.
    pub fn execute(&mut self, code: Value, env: Value) -> LispResult<Value> {
        self.reset();
        self.stats = MachineStats::default();
        self.c = code;
        self.e = env;
        let result = self.run();
        self.reset();
        result
    }

    fn run(&mut self) -> LispResult<Value> {
        while let Some(insn) = self.next_instruction()? {
            self.stats.steps += 1;
            match insn {
                Value::Opcode(op) => {
                    if self.options.trace {
                        trace!(target: "secd::vm", "{} s={} d={}", op.name(), self.s.len(), self.d.len());
                    }
                    if !self.step(op)? {
                        break;
                    }
                }
                Value::Primitive(prim) => {
                    if self.options.trace {
                        trace!(target: "secd::vm", "{} s={} d={}", prim.name.name(), self.s.len(), self.d.len());
                    }
                    self.call_primitive(&prim)?;
                }
                other => {
                    return raise_exn!(InvalidInstruction, @other.clone(), "not an instruction: {}", other)
                }
            }
        }
        Ok(self.s.pop().unwrap_or_default())
    }

    fn next_instruction(&mut self) -> LispResult<Option<Value>> {
        match &self.c {
            Value::Nil => Ok(None),
            Value::Cons(cell) => {
                let insn = cell.car();
                self.c = cell.cdr();
                Ok(Some(insn))
            }
            other => raise_exn!(InvalidInstruction, @other.clone(), "malformed code tail: {}", other),
        }
    }

    fn operand(&mut self, op: Opcode) -> LispResult<Value> {
        match &self.c {
            Value::Cons(cell) => {
                let operand = cell.car();
                self.c = cell.cdr();
                Ok(operand)
            }
            _ => raise_exn!(InvalidInstruction, "{}: missing operand", op.name()),
        }
    }

    fn symbol_operand(&mut self, op: Opcode) -> LispResult<Symbol> {
        match self.operand(op)? {
            Value::Symbol(sym) => Ok(sym),
            other => raise_exn!(InvalidInstruction, @other.clone(), "{}: operand is not a symbol: {}", op.name(), other),
        }
    }

    /// `(i . j)`, both 1-based.
    fn address_operand(&mut self, op: Opcode) -> LispResult<(usize, usize)> {
        let operand = self.operand(op)?;
        if let Value::Cons(cell) = &operand {
            if let (Value::Integer(i), Value::Integer(j)) = (cell.car(), cell.cdr()) {
                if i >= 1 && j >= 1 {
                    return Ok((i as usize, j as usize));
                }
            }
        }
        raise_exn!(InvalidInstruction, @operand.clone(), "{}: malformed address {}", op.name(), operand)
    }

    fn pop(&mut self) -> LispResult<Value> {
        match self.s.pop() {
            Some(value) => Ok(value),
            None => raise_exn!(InvalidInstruction, "operand stack underflow"),
        }
    }

    fn peek(&self) -> LispResult<Value> {
        match self.s.last() {
            Some(value) => Ok(value.clone()),
            None => raise_exn!(InvalidInstruction, "operand stack underflow"),
        }
    }

    fn push_dump(&mut self, dump: Dump) -> LispResult<()> {
        if self.d.len() >= self.options.max_dump_depth {
            return raise_exn!(
                LimitExceeded,
                "dump depth limit of {} exceeded (non-tail recursion too deep)",
                self.options.max_dump_depth
            );
        }
        self.d.push(dump);
        self.stats.max_dump_depth = self.stats.max_dump_depth.max(self.d.len());
        Ok(())
    }

    /// The `j`th cell of frame `i`.
    fn frame_cell(&self, i: usize, j: usize) -> LispResult<Value> {
        let frame = list::nth(i - 1, &self.e)?;
        list::nthcdr(j - 1, &frame)
    }

    fn step(&mut self, op: Opcode) -> LispResult<bool> {
        match op {
            Opcode::Nil => self.s.push(Value::Nil),
            Opcode::T => self.s.push(Value::True),
            Opcode::Ldc => {
                let value = self.operand(op)?;
                self.s.push(value);
            }
            Opcode::Ld => {
                let (i, j) = self.address_operand(op)?;
                let value = Function::load_from(self.frame_cell(i, j)?.car()?)?;
                self.s.push(value);
            }
            Opcode::Ldr => {
                let (i, j) = self.address_operand(op)?;
                let rest = self.frame_cell(i, j)?;
                self.s.push(rest);
            }
            Opcode::Ldg => {
                let sym = self.symbol_operand(op)?;
                match self.b.read(&sym) {
                    Some(value) => self.s.push(value),
                    None => {
                        return raise_exn!(UnboundVariable, @sym.as_value(), "the variable {} is unbound", sym.name())
                    }
                }
            }
            Opcode::Ldfn => {
                let sym = self.symbol_operand(op)?;
                match sym.function() {
                    Some(f @ (Value::Function(_) | Value::Primitive(_))) => self.s.push(f),
                    Some(Value::Macro(_)) => {
                        return raise_exn!(IllegalFunctionCall, @sym.as_value(), "{} is a macro, not a function", sym.name())
                    }
                    _ => {
                        return raise_exn!(UndefinedFunction, @sym.as_value(), "the function {} is undefined", sym.name())
                    }
                }
            }
            Opcode::Ldf => {
                let arity = Arity::from_value(&self.operand(op)?)?;
                let code = self.operand(op)?;
                let closure = Function::new(arity, code, self.e.clone());
                self.s.push(Value::Function(Arc::new(closure)));
            }
            Opcode::Cons => {
                let cdr = self.pop()?;
                let car = self.pop()?;
                self.s.push(Value::cons(car, cdr));
            }
            Opcode::Lis => {
                let n = self.operand(op)?.expect_index("LIS")?;
                if n > self.s.len() {
                    return raise_exn!(InvalidInstruction, "operand stack underflow");
                }
                let items = self.s.split_off(self.s.len() - n);
                self.s.push(list::list(&items));
            }
            Opcode::Ap | Opcode::Tap => {
                let f = self.pop()?;
                let args = self.pop()?;
                self.apply(f, args, op == Opcode::Tap)?;
            }
            Opcode::Dum => {
                self.e = Value::cons(Value::Nil, self.e.clone());
            }
            Opcode::Rap => {
                let f = self.pop()?;
                let args = self.pop()?;
                let Value::Function(func) = &f else {
                    return raise_exn!(InvalidInstruction, @f.clone(), "RAP: not a closure: {}", f);
                };
                // The closure was built under the placeholder frame pushed by DUM.
                let placeholder = self.e.expect_cons("RAP")?;
                if !func.closes_over(&self.e) {
                    return raise_exn!(InvalidInstruction, "RAP: closure was not built over the DUM frame");
                }
                self.check_arity(func, &args)?;
                let values: Vec<Value> = self
                    .arguments(&args)?
                    .into_iter()
                    .map(|value| Function::store_into(value, &placeholder))
                    .collect();
                let s = std::mem::take(&mut self.s);
                let c = std::mem::take(&mut self.c);
                self.push_dump(Dump::Call {
                    s,
                    e: placeholder.cdr(),
                    c,
                })?;
                placeholder.set_car(list::list(&values));
                self.e = func.env()?;
                self.c = func.code.clone();
            }
            Opcode::Rtn => {
                let value = self.pop()?;
                match self.d.pop() {
                    Some(Dump::Call { s, e, c }) => {
                        self.s = s;
                        self.s.push(value);
                        self.e = e;
                        self.c = c;
                    }
                    Some(Dump::Join(_)) => {
                        return raise_exn!(InvalidInstruction, "RTN: dump holds a join point")
                    }
                    None => {
                        self.s.push(value);
                        return Ok(false);
                    }
                }
            }
            Opcode::Sel => {
                let then = self.operand(op)?;
                let otherwise = self.operand(op)?;
                let test = self.pop()?;
                let rest = std::mem::take(&mut self.c);
                self.push_dump(Dump::Join(rest))?;
                self.c = if test.truthy() { then } else { otherwise };
            }
            Opcode::Join => match self.d.pop() {
                Some(Dump::Join(c)) => self.c = c,
                _ => return raise_exn!(InvalidInstruction, "JOIN: no join point on the dump"),
            },
            Opcode::Test => {
                let then = self.operand(op)?;
                if self.pop()?.truthy() {
                    self.c = then;
                }
            }
            Opcode::SpBind => {
                let sym = self.symbol_operand(op)?;
                let value = self.pop()?;
                self.b.bind(&sym, value);
            }
            Opcode::SpUnbind => {
                let sym = self.symbol_operand(op)?;
                self.b.unbind(&sym)?;
            }
            Opcode::Blk => {
                let tag = self.operand(op)?;
                let body = self.operand(op)?;
                self.x.push(BlockFrame {
                    tag,
                    s: self.s.clone(),
                    e: self.e.clone(),
                    c: std::mem::take(&mut self.c),
                    dump: self.d.len(),
                    bindings: self.b.mark(),
                });
                self.c = body;
            }
            Opcode::Unblk => match self.x.pop() {
                Some(frame) => self.c = frame.c,
                None => return raise_exn!(InvalidInstruction, "UNBLK: no active block"),
            },
            Opcode::RtnFrom => {
                let tag = self.operand(op)?;
                let value = self.pop()?;
                let Some(index) = self.x.iter().rposition(|frame| eq(&frame.tag, &tag)) else {
                    return raise_exn!(NoBlock, @tag.clone(), "return from unknown block {}", tag);
                };
                self.x.truncate(index + 1);
                let Some(frame) = self.x.pop() else {
                    return raise_exn!(NoBlock, @tag.clone(), "return from unknown block {}", tag);
                };
                self.d.truncate(frame.dump);
                self.b.unwind_to(frame.bindings);
                self.s = frame.s;
                self.s.push(value);
                self.e = frame.e;
                self.c = frame.c;
            }
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::St => {
                let (i, j) = self.address_operand(op)?;
                let value = self.peek()?;
                let frame = list::nthcdr(i - 1, &self.e)?.expect_cons("ST")?;
                list::rplaca(&self.frame_cell(i, j)?, Function::store_into(value, &frame))?;
            }
            Opcode::Stg => {
                let sym = self.symbol_operand(op)?;
                let value = self.peek()?;
                self.b.set(&sym, value);
            }
            Opcode::Defun | Opcode::Defmacro => {
                let sym = self.symbol_operand(op)?;
                let Value::Function(func) = self.pop()? else {
                    return raise_exn!(InvalidInstruction, "{}: expected a closure", op.name());
                };
                let named = Arc::new(func.named(sym.clone()));
                sym.set_function(if op == Opcode::Defun {
                    Value::Function(named)
                } else {
                    Value::Macro(named)
                });
                self.s.push(sym.as_value());
            }
            Opcode::Stop => return Ok(false),
        }
        Ok(true)
    }

    /// The elements of an argument list, bounded by `max_list_length`.
    fn arguments(&self, args: &Value) -> LispResult<Vec<Value>> {
        list::length(args, self.options.max_list_length)?;
        list::list_to_vec(args)
    }

    fn check_arity(&self, func: &Function, args: &Value) -> LispResult<()> {
        let argc = list::length(args, self.options.max_list_length)?;
        if !func.arity.accepts(argc) {
            return raise_exn!(
                ArgumentCount,
                "{}: expected {}{} arguments, got {}",
                func.display_name(),
                if func.arity.rest { "at least " } else { "" },
                func.arity.required,
                argc
            );
        }
        Ok(())
    }

    /// Applies `f` to the list `args`. A closure gets a new frame; `tail`
    /// reuses the caller's dump entry instead of pushing one.
    fn apply(&mut self, mut f: Value, mut args: Value, tail: bool) -> LispResult<()> {
        loop {
            match f {
                Value::Function(func) => {
                    self.check_arity(&func, &args)?;
                    if tail {
                        self.s.clear();
                    } else {
                        let s = std::mem::take(&mut self.s);
                        let e = std::mem::take(&mut self.e);
                        let c = std::mem::take(&mut self.c);
                        self.push_dump(Dump::Call { s, e, c })?;
                    }
                    self.e = Value::cons(args, func.env()?);
                    self.c = func.code.clone();
                    return Ok(());
                }
                Value::Primitive(prim) => {
                    let argv = self.arguments(&args)?;
                    prim.check_arity(argv.len())?;
                    match (prim.native)(self, &argv)? {
                        Trampoline::Return(value) => {
                            self.s.push(value);
                            return Ok(());
                        }
                        Trampoline::Apply(next, next_args) => {
                            f = next;
                            args = next_args;
                        }
                    }
                }
                Value::Symbol(sym) => match sym.function() {
                    Some(Value::Macro(_)) => {
                        return raise_exn!(IllegalFunctionCall, @sym.as_value(), "{} is a macro, not a function", sym.name())
                    }
                    Some(function) => f = function,
                    None => {
                        return raise_exn!(UndefinedFunction, @sym.as_value(), "the function {} is undefined", sym.name())
                    }
                },
                other => {
                    return raise_exn!(IllegalFunctionCall, @other.clone(), "not a function: {}", other)
                }
            }
        }
    }

    /// A primitive used directly as an instruction. Fixed-arity primitives
    /// take their arguments from **S**, the others take one argument list.
    fn call_primitive(&mut self, prim: &Arc<Primitive>) -> LispResult<()> {
        let result = if prim.is_fixed() {
            let n = prim.min_args;
            if n > self.s.len() {
                return raise_exn!(InvalidInstruction, "operand stack underflow");
            }
            let args = self.s.split_off(self.s.len() - n);
            (prim.native)(self, &args)?
        } else {
            let args = self.pop()?;
            let args = self.arguments(&args)?;
            prim.check_arity(args.len())?;
            (prim.native)(self, &args)?
        };
        match result {
            Trampoline::Return(value) => {
                self.s.push(value);
                Ok(())
            }
            Trampoline::Apply(f, args) => self.apply(f, args, false),
        }
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(MachineOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::Exception,
        list::list,
        symbol::intern,
        value::{equal, Arity},
    };

    fn op(op: Opcode) -> Value {
        Value::Opcode(op)
    }

    fn int(n: i64) -> Value {
        Value::Integer(n)
    }

    fn addr(i: i64, j: i64) -> Value {
        Value::cons(int(i), int(j))
    }

    #[test]
    fn ldc_and_stop() {
        let mut m = Machine::default();
        let code = list(&[op(Opcode::Ldc), int(7), op(Opcode::Stop)]);
        assert!(matches!(m.execute(code, Value::Nil).unwrap(), Value::Integer(7)));
        let empty = m.execute(Value::Nil, Value::Nil).unwrap();
        assert!(empty.is_nil());
    }

    #[test]
    fn local_loads_address_frames() {
        let mut m = Machine::default();
        let env = list(&[list(&[int(1), int(2), int(3)]), list(&[int(10)])]);
        let code = list(&[op(Opcode::Ld), addr(2, 1), op(Opcode::Stop)]);
        assert!(matches!(m.execute(code, env.clone()).unwrap(), Value::Integer(10)));
        let code = list(&[op(Opcode::Ldr), addr(1, 2), op(Opcode::Stop)]);
        let rest = m.execute(code, env).unwrap();
        assert!(equal(&rest, &list(&[int(2), int(3)])));
    }

    #[test]
    fn apply_and_return() {
        // ((lambda (x) x) 5)
        let body = list(&[op(Opcode::Ld), addr(1, 1), op(Opcode::Rtn)]);
        let code = list(&[
            op(Opcode::Ldc),
            int(5),
            op(Opcode::Lis),
            int(1),
            op(Opcode::Ldf),
            Arity::fixed(1).to_value(),
            body,
            op(Opcode::Ap),
            op(Opcode::Stop),
        ]);
        let mut m = Machine::default();
        assert!(matches!(m.execute(code, Value::Nil).unwrap(), Value::Integer(5)));
        assert_eq!(m.stats().max_dump_depth, 1);
        assert_eq!(m.dump_depth(), 0);
    }

    #[test]
    fn sel_and_join() {
        let then = list(&[op(Opcode::Ldc), int(1), op(Opcode::Join)]);
        let otherwise = list(&[op(Opcode::Ldc), int(2), op(Opcode::Join)]);
        let code = list(&[
            op(Opcode::Nil),
            op(Opcode::Sel),
            then,
            otherwise,
            op(Opcode::Stop),
        ]);
        let mut m = Machine::default();
        assert!(matches!(m.execute(code, Value::Nil).unwrap(), Value::Integer(2)));
    }

    #[test]
    fn block_exit_unwinds_special_bindings() {
        let x = intern("*VM-TEST-BLOCK-SPECIAL*");
        x.set_global_value(int(0));
        let tag = Value::Symbol(intern("VM-TEST-BLOCK"));
        // (block tag (let ((x 1)) (return-from tag (symbol-value x)))) in raw code
        let body = list(&[
            op(Opcode::Ldc),
            int(1),
            op(Opcode::SpBind),
            x.as_value(),
            op(Opcode::Ldg),
            x.as_value(),
            op(Opcode::RtnFrom),
            tag.clone(),
            op(Opcode::SpUnbind),
            x.as_value(),
            op(Opcode::Unblk),
        ]);
        let code = list(&[
            op(Opcode::Blk),
            tag,
            body,
            op(Opcode::Ldg),
            x.as_value(),
            op(Opcode::Cons),
            op(Opcode::Stop),
        ]);
        let mut m = Machine::default();
        let result = m.execute(code, Value::Nil).unwrap();
        assert!(equal(&result, &Value::cons(int(1), int(0))));
    }

    #[test]
    fn return_from_unknown_block() {
        let code = list(&[op(Opcode::Nil), op(Opcode::RtnFrom), Value::Nil]);
        let err = Machine::default().execute(code, Value::Nil).unwrap_err();
        assert_eq!(err.kind, Exception::NoBlock);
    }

    #[test]
    fn dump_limit_is_enforced() {
        // (letrec ((f (lambda () (+ 1 (f))))) (f)) without the +: plain non-tail self call
        let body = list(&[
            op(Opcode::Nil),
            op(Opcode::Ld),
            addr(2, 1),
            op(Opcode::Ap),
            op(Opcode::Rtn),
        ]);
        let code = list(&[
            op(Opcode::Dum),
            op(Opcode::Ldf),
            Arity::fixed(0).to_value(),
            body,
            op(Opcode::Lis),
            int(1),
            op(Opcode::Ldf),
            Arity::fixed(1).to_value(),
            list(&[op(Opcode::Nil), op(Opcode::Ld), addr(1, 1), op(Opcode::Ap), op(Opcode::Rtn)]),
            op(Opcode::Rap),
            op(Opcode::Stop),
        ]);
        let mut m = Machine::new(MachineOptions {
            max_dump_depth: 64,
            ..Default::default()
        });
        let err = m.execute(code, Value::Nil).unwrap_err();
        assert_eq!(err.kind, Exception::LimitExceeded);
        // registers were reset, the machine is usable again
        let ok = m
            .execute(list(&[op(Opcode::T), op(Opcode::Stop)]), Value::Nil)
            .unwrap();
        assert!(matches!(ok, Value::True));
    }

    #[test]
    fn garbage_in_code_is_rejected() {
        let code = list(&[int(42)]);
        let err = Machine::default().execute(code, Value::Nil).unwrap_err();
        assert_eq!(err.kind, Exception::InvalidInstruction);
    }
}
