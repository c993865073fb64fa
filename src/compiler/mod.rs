//! Expression to instruction-list compiler.
//!
//! Code is generated continuation first: every `compile_*` function takes the
//! instructions that must run after the expression's value is produced and
//! returns the instructions for the expression followed by them. Looking at the
//! head of the continuation is how tail positions are recognized: a call
//! followed by `RTN` becomes `TAP`, an `IF` followed by `RTN` or `STOP` becomes
//! `TEST`.
//!
//! Lexical variables are resolved to `(frame . slot)` addresses at compile
//! time (see [`env`]); free variables are globals read through the dynamic
//! binding stack.

use std::{collections::HashMap, sync::Arc};

use log::{debug, warn};

use crate::{
    list::list,
    op::Opcode,
    raise_exn,
    symbol::{Symbol, LAMBDA},
    value::{Arity, Function, Value},
    vm::{
        options::{CompilerOptions, MachineOptions},
        Machine,
    },
    LispResult,
};

pub mod env;
pub mod macros;
pub mod primitives;
pub mod special;

use env::{locate, LambdaList, Location};

/// A definition whose body is being compiled. References to the name are
/// compiled as calls even though the function slot is not filled yet.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Pending {
    Function,
    Macro,
}

pub struct Compiler {
    options: CompilerOptions,
    machine_options: MachineOptions,
    pending: HashMap<Symbol, Pending>,
    /// Function slots overwritten by macros installed while compiling the
    /// current top-level form, oldest first.
    installed: Vec<(Symbol, Option<Value>)>,
    expansion_depth: usize,
}

#[inline]
pub(crate) fn op(op: Opcode) -> Value {
    Value::Opcode(op)
}

/// `ops` followed by `code`.
pub(crate) fn emit(ops: &[Value], code: Value) -> Value {
    crate::list::list_star(ops, code)
}

pub(crate) fn address(i: usize, j: usize) -> Value {
    Value::cons(Value::Integer(i as i64), Value::Integer(j as i64))
}

/// Continuation starts with `RTN`: a call here is a tail call.
pub(crate) fn is_tail(code: &Value) -> bool {
    matches!(code.car(), Ok(head) if head.is_opcode(Opcode::Rtn))
}

/// Continuation leaves the current function or the whole program.
pub(crate) fn is_return(code: &Value) -> bool {
    matches!(code.car(), Ok(head) if head.is_opcode(Opcode::Rtn) || head.is_opcode(Opcode::Stop))
}

/// The elements of a form's argument list, which must be proper.
pub(crate) fn proper_list(args: &Value, form: &Value) -> LispResult<Vec<Value>> {
    let mut iter = args.iter();
    let items: Vec<Value> = iter.by_ref().collect();
    if !iter.tail().is_nil() {
        return raise_exn!(MalformedForm, @form.clone(), "improper argument list in {}", form);
    }
    Ok(items)
}

impl Compiler {
    pub fn new(options: CompilerOptions, machine_options: MachineOptions) -> Self {
        Self {
            options,
            machine_options,
            pending: HashMap::new(),
            installed: Vec::new(),
            expansion_depth: 0,
        }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut CompilerOptions {
        &mut self.options
    }

    pub fn machine_options(&self) -> &MachineOptions {
        &self.machine_options
    }

    /// Compiles a top-level form to code ending in `STOP`. Pending
    /// definitions never outlive the form, whether compilation succeeds or
    /// not, and a form that fails leaves no macro behind. Errors carry `form`.
    pub fn compile_toplevel(&mut self, form: &Value) -> LispResult<Value> {
        self.pending.clear();
        self.installed.clear();
        self.expansion_depth = 0;
        let result = self.compile(form, &Value::Nil, list(&[op(Opcode::Stop)]));
        self.pending.clear();
        let installed = std::mem::take(&mut self.installed);
        match result {
            Ok(code) => {
                debug!(target: "secd::compiler", "{} => {}", form, code);
                Ok(code)
            }
            Err(err) => {
                for (name, previous) in installed.into_iter().rev() {
                    name.replace_function(previous);
                }
                Err(err.in_form(form.clone()))
            }
        }
    }

    /// Compiles `expr` in the lexical `frames`, followed by `code`.
    pub fn compile(&mut self, expr: &Value, frames: &Value, code: Value) -> LispResult<Value> {
        match expr {
            Value::Nil => Ok(emit(&[op(Opcode::Nil)], code)),
            Value::True => Ok(emit(&[op(Opcode::T)], code)),
            Value::Symbol(sym) => self.compile_variable(sym, frames, code),
            Value::Cons(_) => self.compile_form(expr, frames, code),
            atom => Ok(emit(&[op(Opcode::Ldc), atom.clone()], code)),
        }
    }

    pub(crate) fn compile_variable(
        &mut self,
        sym: &Symbol,
        frames: &Value,
        code: Value,
    ) -> LispResult<Value> {
        if sym.is_keyword() {
            return Ok(emit(&[op(Opcode::Ldc), sym.as_value()], code));
        }
        Ok(match locate(sym, frames) {
            Location::Local(i, j) => emit(&[op(Opcode::Ld), address(i, j)], code),
            Location::Rest(i, j) => emit(&[op(Opcode::Ldr), address(i, j)], code),
            Location::Special => emit(&[op(Opcode::Ldg), sym.as_value()], code),
            Location::Global => {
                if !sym.is_special() {
                    warn!(
                        target: "secd::compiler",
                        "undeclared free variable {} assumed to be global",
                        sym.name()
                    );
                }
                emit(&[op(Opcode::Ldg), sym.as_value()], code)
            }
        })
    }

    fn compile_form(&mut self, form: &Value, frames: &Value, code: Value) -> LispResult<Value> {
        let head = form.car()?;
        let args = form.cdr()?;
        match &head {
            Value::Symbol(sym) => {
                if let Some(special) = special::lookup(sym) {
                    return special(self, &args, frames, code);
                }
                self.compile_application(sym, &args, form, frames, code)
            }
            Value::Cons(cell) if cell.car().is(&LAMBDA) => {
                let lambda = cell.cdr();
                let argv = proper_list(&args, form)?;
                self.compile_call(&argv, frames, code, |cc, code| {
                    cc.compile_lambda(&lambda, frames, code)
                })
            }
            _ => raise_exn!(IllegalFunctionCall, @head.clone(), "illegal function call {}", form),
        }
    }

    /// A call through a symbol. Lexical variables are resolved first, then
    /// macros and primitives (unless the name is being defined), then
    /// functions.
    fn compile_application(
        &mut self,
        sym: &Symbol,
        args: &Value,
        form: &Value,
        frames: &Value,
        code: Value,
    ) -> LispResult<Value> {
        match locate(sym, frames) {
            Location::Local(i, j) => {
                let argv = proper_list(args, form)?;
                return self.compile_call(&argv, frames, code, move |_, code| {
                    Ok(emit(&[op(Opcode::Ld), address(i, j)], code))
                });
            }
            Location::Rest(i, j) => {
                let argv = proper_list(args, form)?;
                return self.compile_call(&argv, frames, code, move |_, code| {
                    Ok(emit(&[op(Opcode::Ldr), address(i, j)], code))
                });
            }
            Location::Special | Location::Global => {}
        }

        let pending = self.pending.get(sym).copied();
        if pending.is_none() {
            match sym.function() {
                Some(Value::Macro(mac)) => return self.compile_macro_call(&mac, args, frames, code),
                Some(Value::Primitive(prim)) => {
                    let argv = proper_list(args, form)?;
                    prim.check_arity(argv.len())?;
                    return prim.hook.compile_args(self, &prim, &argv, frames, code);
                }
                _ => {}
            }
        }

        let argv = proper_list(args, form)?;
        match (pending, sym.function()) {
            (Some(Pending::Function), _) => {}
            (Some(Pending::Macro), _) => warn!(
                target: "secd::compiler",
                "macro {} is called as a function in its own definition",
                sym.name()
            ),
            (None, Some(Value::Function(func))) => {
                if !func.arity.accepts(argv.len()) {
                    return raise_exn!(
                        ArgumentCount,
                        @form.clone(),
                        "{}: expected {}{} arguments, got {}",
                        sym.name(),
                        if func.arity.rest { "at least " } else { "" },
                        func.arity.required,
                        argv.len()
                    );
                }
            }
            _ if !self.options.strict_functions => warn!(
                target: "secd::compiler",
                "undefined function {}, lookup deferred to run time",
                sym.name()
            ),
            _ => {
                return raise_exn!(UndefinedFunction, @sym.as_value(), "undefined function {}", sym.name())
            }
        }

        let name = sym.as_value();
        self.compile_call(&argv, frames, code, move |_, code| {
            Ok(emit(&[op(Opcode::Ldfn), name], code))
        })
    }

    /// Arguments left to right, `LIS n`, the function, then `AP` or `TAP`.
    pub(crate) fn compile_call(
        &mut self,
        args: &[Value],
        frames: &Value,
        code: Value,
        load: impl FnOnce(&mut Self, Value) -> LispResult<Value>,
    ) -> LispResult<Value> {
        let apply = if is_tail(&code) { Opcode::Tap } else { Opcode::Ap };
        let code = load(self, Value::cons(op(apply), code))?;
        let code = emit(&[op(Opcode::Lis), Value::Integer(args.len() as i64)], code);
        self.compile_arguments(args, frames, code)
    }

    /// Code pushing each of `args` in order. Built back to front.
    pub(crate) fn compile_arguments(
        &mut self,
        args: &[Value],
        frames: &Value,
        mut code: Value,
    ) -> LispResult<Value> {
        for arg in args.iter().rev() {
            code = self.compile(arg, frames, code)?;
        }
        Ok(code)
    }

    pub(crate) fn compile_progn(
        &mut self,
        body: &Value,
        frames: &Value,
        code: Value,
    ) -> LispResult<Value> {
        let forms = proper_list(body, body)?;
        let Some((last, init)) = forms.split_last() else {
            return Ok(emit(&[op(Opcode::Nil)], code));
        };
        let mut code = self.compile(last, frames, code)?;
        for form in init.iter().rev() {
            code = self.compile(form, frames, Value::cons(op(Opcode::Pop), code))?;
        }
        Ok(code)
    }

    /// `(lambda-list . body)` to `LDF arity code`.
    pub(crate) fn compile_lambda(
        &mut self,
        lambda: &Value,
        frames: &Value,
        code: Value,
    ) -> LispResult<Value> {
        let (arity, body) = self.compile_lambda_body(&lambda.car()?, &lambda.cdr()?, frames)?;
        Ok(emit(&[op(Opcode::Ldf), arity.to_value(), body], code))
    }

    /// The code of a closure. Special parameters are bound on entry and
    /// unbound before `RTN`.
    pub(crate) fn compile_lambda_body(
        &mut self,
        lambda_list: &Value,
        body: &Value,
        frames: &Value,
    ) -> LispResult<(Arity, Value)> {
        let params = LambdaList::parse(lambda_list)?;
        let (declarations, body) = special::split_declarations(body)?;
        let declared = special::declared_specials(&declarations)?;
        let is_special = |sym: &Symbol| sym.is_special() || declared.contains(sym);

        let frames = Value::cons(params.frame(&is_special), frames.clone());
        let specials: Vec<(Symbol, usize, bool)> = params
            .slots()
            .filter(|(sym, ..)| is_special(sym))
            .map(|(sym, j, rest)| (sym.clone(), j, rest))
            .collect();

        let mut tail = list(&[op(Opcode::Rtn)]);
        for (sym, ..) in &specials {
            tail = emit(&[op(Opcode::SpUnbind), sym.as_value()], tail);
        }
        let mut code = self.compile_progn(&body, &frames, tail)?;
        for (sym, j, rest) in specials.iter().rev() {
            let load = if *rest { Opcode::Ldr } else { Opcode::Ld };
            code = emit(
                &[op(load), address(1, *j), op(Opcode::SpBind), sym.as_value()],
                code,
            );
        }
        Ok((params.arity(), code))
    }

    fn compile_macro_call(
        &mut self,
        mac: &Arc<Function>,
        args: &Value,
        frames: &Value,
        code: Value,
    ) -> LispResult<Value> {
        let expansion = self.expand_macro(mac, args)?;
        self.expansion_depth += 1;
        let result = self.compile(&expansion, frames, code);
        self.expansion_depth -= 1;
        result
    }

    /// Runs the macro's closure on the unevaluated arguments.
    pub fn expand_macro(&mut self, mac: &Arc<Function>, args: &Value) -> LispResult<Value> {
        if self.expansion_depth >= self.options.max_expansion_depth {
            return raise_exn!(
                LimitExceeded,
                "macro expansion of {} nested deeper than {}",
                mac.display_name(),
                self.options.max_expansion_depth
            );
        }
        let code = list(&[
            op(Opcode::Ldc),
            args.clone(),
            op(Opcode::Ldc),
            Value::Function(mac.clone()),
            op(Opcode::Ap),
            op(Opcode::Stop),
        ]);
        Machine::new(self.machine_options.clone()).execute(code, Value::Nil)
    }

    pub(crate) fn declare_pending(&mut self, name: &Symbol, kind: Pending) {
        self.pending.insert(name.clone(), kind);
    }

    pub(crate) fn is_pending(&self, name: &Symbol) -> bool {
        self.pending.contains_key(name)
    }

    /// Makes a macro usable by the rest of the form being compiled.
    pub(crate) fn install_macro(&mut self, name: &Symbol, mac: Value) {
        let previous = name.replace_function(Some(mac));
        self.installed.push((name.clone(), previous));
    }

    pub(crate) fn forget_pending(&mut self, name: &Symbol) {
        self.pending.remove(name);
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompilerOptions::default(), MachineOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Exception, reader::read_str, runtime::gsubr};

    fn compile(src: &str) -> LispResult<Value> {
        gsubr::init();
        let form = read_str(src)?;
        Compiler::default().compile_toplevel(&form)
    }

    fn code(src: &str) -> String {
        compile(src).unwrap().to_string()
    }

    #[test]
    fn atoms() {
        assert_eq!(code("nil"), "(NIL STOP)");
        assert_eq!(code("t"), "(T STOP)");
        assert_eq!(code("42"), "(LDC 42 STOP)");
        assert_eq!(code("\"s\""), "(LDC \"s\" STOP)");
        assert_eq!(code(":key"), "(LDC :KEY STOP)");
    }

    #[test]
    fn lambda_addresses_and_tail_calls() {
        assert_eq!(
            code("(lambda (x y) (cons y x))"),
            "(LDF (2) (LD (1 . 2) LD (1 . 1) CONS RTN) STOP)"
        );
        assert_eq!(
            code("(lambda (f x) (f x))"),
            "(LDF (2) (LD (1 . 2) LIS 1 LD (1 . 1) TAP RTN) STOP)"
        );
        assert_eq!(
            code("(lambda (x &rest r) r)"),
            "(LDF (1 . T) (LDR (1 . 2) RTN) STOP)"
        );
    }

    #[test]
    fn if_uses_test_in_tail_position_only() {
        assert_eq!(code("(if t 1 2)"), "(T TEST (LDC 1 STOP) LDC 2 STOP)");
        assert_eq!(
            code("(car (if t '(1) '(2)))"),
            "(T SEL (LDC (1) JOIN) (LDC (2) JOIN) #<PRIMITIVE CAR> STOP)"
        );
    }

    #[test]
    fn literal_arithmetic_is_folded() {
        assert_eq!(code("(+ 1 2 3)"), "(LDC 6 STOP)");
        assert_eq!(code("(1+ 41)"), "(LDC 42 STOP)");
        assert_eq!(code("(/ 1 0)"), "(LDC 1 LDC 0 LIS 2 #<PRIMITIVE /> STOP)");
    }

    #[test]
    fn compile_time_errors() {
        let err = compile("(car 1 2)").unwrap_err();
        assert_eq!(err.kind, Exception::ArgumentCount);
        assert!(err.is_compile_time());

        let err = compile("(compiler-test-undefined-function 1)").unwrap_err();
        assert_eq!(err.kind, Exception::UndefinedFunction);

        let err = compile("(1 2)").unwrap_err();
        assert_eq!(err.kind, Exception::IllegalFunctionCall);

        let err = compile("(if)").unwrap_err();
        assert_eq!(err.kind, Exception::MalformedForm);
    }

    #[test]
    fn lenient_mode_defers_unknown_functions() {
        gsubr::init();
        let mut compiler = Compiler::default();
        compiler.options_mut().strict_functions = false;
        let form = read_str("(compiler-test-later 1)").unwrap();
        let code = compiler.compile_toplevel(&form).unwrap();
        assert_eq!(
            code.to_string(),
            "(LDC 1 LIS 1 LDFN COMPILER-TEST-LATER AP STOP)"
        );
    }

    #[test]
    fn failed_definition_leaves_no_pending_marker() {
        gsubr::init();
        let mut compiler = Compiler::default();
        let bad = read_str("(defun compiler-test-broken () (compiler-test-broken) (if))").unwrap();
        assert!(compiler.compile_toplevel(&bad).is_err());
        assert!(!compiler.is_pending(&crate::symbol::intern("COMPILER-TEST-BROKEN")));

        let call = read_str("(compiler-test-broken)").unwrap();
        let err = compiler.compile_toplevel(&call).unwrap_err();
        assert_eq!(err.kind, Exception::UndefinedFunction);
    }
}
