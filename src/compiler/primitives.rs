//! Argument compilation strategies for primitive calls.
//!
//! Every primitive carries an [`ArgsCompiler`] that emits the code for a call
//! to it. Arguments are always compiled left to right; the strategies differ
//! in how they hand the values over.

use std::sync::Arc;

use crate::{
    op::Opcode,
    runtime::gsubr::Primitive,
    value::Value,
    vm::{Machine, Trampoline},
    LispResult,
};

use super::Compiler;

pub trait ArgsCompiler: Send + Sync {
    /// Emits code evaluating `args` and calling `prim`, followed by `code`.
    /// Argument counts were validated by the caller.
    fn compile_args(
        &self,
        compiler: &mut Compiler,
        prim: &Arc<Primitive>,
        args: &[Value],
        frames: &Value,
        code: Value,
    ) -> LispResult<Value>;
}

/// Arguments left on **S**, consumed by a fixed-arity primitive.
pub struct StackArgs;

impl ArgsCompiler for StackArgs {
    fn compile_args(
        &self,
        compiler: &mut Compiler,
        prim: &Arc<Primitive>,
        args: &[Value],
        frames: &Value,
        code: Value,
    ) -> LispResult<Value> {
        let code = Value::cons(Value::Primitive(prim.clone()), code);
        compiler.compile_arguments(args, frames, code)
    }
}

/// Arguments collected into one list with `LIS n`.
pub struct ListArgs;

impl ArgsCompiler for ListArgs {
    fn compile_args(
        &self,
        compiler: &mut Compiler,
        prim: &Arc<Primitive>,
        args: &[Value],
        frames: &Value,
        code: Value,
    ) -> LispResult<Value> {
        let code = Value::cons(Value::Primitive(prim.clone()), code);
        let code = lis(args.len(), code);
        compiler.compile_arguments(args, frames, code)
    }
}

/// The primitive is a single machine instruction over its stacked arguments.
pub struct Inline(pub Opcode);

impl ArgsCompiler for Inline {
    fn compile_args(
        &self,
        compiler: &mut Compiler,
        _prim: &Arc<Primitive>,
        args: &[Value],
        frames: &Value,
        code: Value,
    ) -> LispResult<Value> {
        compiler.compile_arguments(args, frames, Value::cons(Value::Opcode(self.0), code))
    }
}

/// `LIST`: the `LIS n` instruction alone builds the result.
pub struct ListOpcode;

impl ArgsCompiler for ListOpcode {
    fn compile_args(
        &self,
        compiler: &mut Compiler,
        _prim: &Arc<Primitive>,
        args: &[Value],
        frames: &Value,
        code: Value,
    ) -> LispResult<Value> {
        compiler.compile_arguments(args, frames, lis(args.len(), code))
    }
}

/// Arithmetic over literal numbers is evaluated at compile time. Anything
/// else, including a call that would signal an error, is compiled with the
/// primitive's default convention so the error happens at run time.
pub struct Folding;

impl ArgsCompiler for Folding {
    fn compile_args(
        &self,
        compiler: &mut Compiler,
        prim: &Arc<Primitive>,
        args: &[Value],
        frames: &Value,
        code: Value,
    ) -> LispResult<Value> {
        if args.iter().all(Value::is_number) {
            let mut machine = Machine::new(compiler.machine_options().clone());
            if let Ok(Trampoline::Return(value)) = (prim.native)(&mut machine, args) {
                return Ok(Value::cons(
                    Value::Opcode(Opcode::Ldc),
                    Value::cons(value, code),
                ));
            }
        }
        if prim.is_fixed() {
            StackArgs.compile_args(compiler, prim, args, frames, code)
        } else {
            ListArgs.compile_args(compiler, prim, args, frames, code)
        }
    }
}

fn lis(n: usize, code: Value) -> Value {
    Value::cons(
        Value::Opcode(Opcode::Lis),
        Value::cons(Value::Integer(n as i64), code),
    )
}
