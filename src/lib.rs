//! A compiler and SECD virtual machine for a small dynamically-typed Lisp.
//!
//! Source text is read into [`value::Value`] trees, compiled by
//! [`compiler::Compiler`] into instruction lists (themselves values) and run by
//! [`vm::Machine`]. [`runtime::Runtime`] ties the two together.

use prelude::Value;

pub mod bindings;
pub mod compiler;
pub mod error;
pub mod list;
pub mod number;
pub mod op;
pub mod print;
pub mod reader;
pub mod repl;
pub mod runtime;
pub mod symbol;
pub mod utils;
pub mod value;
pub mod vm;

pub mod prelude {
    pub use super::LispResult;
    pub use crate::error::{Exception, LispError};
    pub use crate::op::Opcode;
    pub use crate::runtime::Runtime;
    pub use crate::symbol::{intern, Symbol};
    pub use crate::value::{eq, eql, equal, Arity, Function, Value};
    pub use crate::vm::{options::*, Machine};
}

pub type LispResult<T = Value> = Result<T, error::LispError>;
