//! Primitive registration.
//!
//! A primitive is a native function with arity bounds and an argument
//! compilation hook. Registering one installs it in the function slot of its
//! symbol, where the compiler finds it by identity.

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::{
    compiler::primitives::{ArgsCompiler, ListArgs, StackArgs},
    raise_exn,
    symbol::{intern, Symbol},
    vm::{Machine, Trampoline},
    LispResult,
};

pub type Native = fn(&mut Machine, &[crate::value::Value]) -> LispResult<Trampoline>;

pub struct Primitive {
    pub name: Symbol,
    pub min_args: usize,
    /// `None` for variadic primitives.
    pub max_args: Option<usize>,
    pub native: Native,
    pub hook: Box<dyn ArgsCompiler>,
}

impl Primitive {
    /// Exactly `min_args` arguments, passed on the operand stack.
    pub fn is_fixed(&self) -> bool {
        self.max_args == Some(self.min_args)
    }

    pub fn accepts(&self, argc: usize) -> bool {
        argc >= self.min_args && self.max_args.map_or(true, |max| argc <= max)
    }

    pub fn check_arity(&self, argc: usize) -> LispResult<()> {
        if self.accepts(argc) {
            return Ok(());
        }
        match self.max_args {
            Some(max) if max == self.min_args => raise_exn!(
                ArgumentCount,
                "{}: expected {} arguments, got {}",
                self.name.name(),
                max,
                argc
            ),
            Some(max) => raise_exn!(
                ArgumentCount,
                "{}: expected {} to {} arguments, got {}",
                self.name.name(),
                self.min_args,
                max,
                argc
            ),
            None => raise_exn!(
                ArgumentCount,
                "{}: expected at least {} arguments, got {}",
                self.name.name(),
                self.min_args,
                argc
            ),
        }
    }
}

/// Registers a primitive with the default calling convention.
pub fn define_primitive(
    name: &str,
    min_args: usize,
    max_args: Option<usize>,
    native: Native,
) -> Arc<Primitive> {
    let hook: Box<dyn ArgsCompiler> = if max_args == Some(min_args) {
        Box::new(StackArgs)
    } else {
        Box::new(ListArgs)
    };
    define_primitive_with(name, min_args, max_args, native, hook)
}

pub fn define_primitive_with(
    name: &str,
    min_args: usize,
    max_args: Option<usize>,
    native: Native,
    hook: Box<dyn ArgsCompiler>,
) -> Arc<Primitive> {
    let symbol = intern(name);
    let prim = Arc::new(Primitive {
        name: symbol.clone(),
        min_args,
        max_args,
        native,
        hook,
    });
    symbol.set_function(crate::value::Value::Primitive(prim.clone()));
    prim
}

static INIT: Lazy<()> = Lazy::new(|| {
    super::subr_core::init();
    super::subr_arith::init();
});

/// Installs the builtin library. Idempotent.
pub fn init() {
    Lazy::force(&INIT);
}
