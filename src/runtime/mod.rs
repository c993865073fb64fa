//! The evaluator: a compiler and a machine sharing one set of options.

use log::info;

use crate::{
    compiler::Compiler,
    reader::Reader,
    value::Value,
    vm::{
        options::{CompilerOptions, MachineOptions, Options},
        Machine,
    },
    LispResult,
};

pub mod gsubr;
mod subr_arith;
mod subr_core;

pub struct Runtime {
    compiler: Compiler,
    machine: Machine,
    disassemble: bool,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_parts(CompilerOptions::default(), MachineOptions::default(), false)
    }

    pub fn with_options(options: &Options) -> Self {
        Self::with_parts(
            options.compiler.clone(),
            options.machine.clone(),
            options.disassemble,
        )
    }

    fn with_parts(compiler: CompilerOptions, machine: MachineOptions, disassemble: bool) -> Self {
        gsubr::init();
        Self {
            compiler: Compiler::new(compiler, machine.clone()),
            machine: Machine::new(machine),
            disassemble,
        }
    }

    pub fn compile(&mut self, form: &Value) -> LispResult<Value> {
        self.compiler.compile_toplevel(form)
    }

    /// Runs compiled code in the empty environment.
    pub fn execute(&mut self, code: Value) -> LispResult<Value> {
        self.machine.execute(code, Value::Nil)
    }

    pub fn eval(&mut self, form: &Value) -> LispResult<Value> {
        let code = self.compile(form)?;
        if self.disassemble {
            println!("{}", code);
        }
        self.execute(code)
    }

    /// Evaluates every form of `source` in order, returning the last value.
    /// Stops at the first error.
    pub fn eval_str(&mut self, source: &str) -> LispResult<Value> {
        let mut reader = Reader::new(source);
        let mut result = Value::Nil;
        while let Some(form) = reader.read()? {
            result = self.eval(&form)?;
        }
        Ok(result)
    }

    /// Loads a source file. Returns the number of forms evaluated.
    pub fn load(&mut self, path: &std::path::Path) -> LispResult<usize> {
        let source = std::fs::read_to_string(path)?;
        let mut reader = Reader::new(&source);
        let mut count = 0;
        while let Some(form) = reader.read()? {
            self.eval(&form)?;
            count += 1;
        }
        info!(target: "secd::runtime", "loaded {} forms from {}", count, path.display());
        Ok(count)
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }

    pub fn compiler_mut(&mut self) -> &mut Compiler {
        &mut self.compiler
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
