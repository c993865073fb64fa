//! Error handling.
//!
//! Every failure the compiler or the machine can signal is a [`LispError`]: an
//! [`Exception`] kind, a rendered message and, when there is one, the value that
//! caused it. Errors raised while compiling a top-level form additionally carry
//! that form so the caller can report it.
//!
use std::fmt;

use crate::value::Value;

/// Returns `Err(LispError)` of the given kind with a formatted message.
///
/// `raise_exn!(TypeMismatch, @value, "car: not a cons: {}", value)` attaches
/// `value` as the irritant.
#[macro_export]
macro_rules! raise_exn {
    ($id:ident, @$irritant:expr, $msg:literal $(,)? $($arg:expr),*) => {
        Err($crate::error::LispError::with_irritant(
            $crate::error::Exception::$id,
            format!($msg, $($arg),*),
            $irritant,
        ))
    };

    ($id:ident, $msg:literal $(,)? $($arg:expr),*) => {
        Err($crate::error::LispError::new($crate::error::Exception::$id, format!($msg, $($arg),*)))
    };
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Exception {
    /// A special form with the wrong shape.
    MalformedForm,
    /// The head of an application is neither a symbol nor a lambda expression.
    IllegalFunctionCall,
    UndefinedFunction,
    ArgumentCount,
    TypeMismatch,
    DivideByZero,
    UnboundVariable,
    /// `RETURN-FROM` with no matching active block.
    NoBlock,
    /// A configurable policy limit (dump depth, list length, expansion depth).
    LimitExceeded,
    /// Code that is not a well-formed instruction list.
    InvalidInstruction,
    /// Signalled by the `ERROR` primitive.
    User,
    Read,
    /// The reader ran out of input in the middle of a form.
    Eof,
    Io,
}

impl Exception {
    pub fn name(self) -> &'static str {
        match self {
            Exception::MalformedForm => "malformed-form",
            Exception::IllegalFunctionCall => "illegal-function-call",
            Exception::UndefinedFunction => "undefined-function",
            Exception::ArgumentCount => "argument-count",
            Exception::TypeMismatch => "type-error",
            Exception::DivideByZero => "division-by-zero",
            Exception::UnboundVariable => "unbound-variable",
            Exception::NoBlock => "no-block",
            Exception::LimitExceeded => "limit-exceeded",
            Exception::InvalidInstruction => "invalid-instruction",
            Exception::User => "error",
            Exception::Read => "read-error",
            Exception::Eof => "end-of-file",
            Exception::Io => "io-error",
        }
    }
}

#[derive(Clone)]
pub struct LispError {
    pub kind: Exception,
    pub message: String,
    pub irritant: Option<Value>,
    /// The top-level form whose compilation failed, if any.
    pub form: Option<Value>,
}

impl LispError {
    pub fn new(kind: Exception, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            irritant: None,
            form: None,
        }
    }

    pub fn with_irritant(kind: Exception, message: impl Into<String>, irritant: Value) -> Self {
        Self {
            kind,
            message: message.into(),
            irritant: Some(irritant),
            form: None,
        }
    }

    /// Attaches the top-level form being compiled. The first form attached is kept.
    pub fn in_form(mut self, form: Value) -> Self {
        if self.form.is_none() {
            self.form = Some(form);
        }
        self
    }

    pub fn is_compile_time(&self) -> bool {
        self.form.is_some()
    }
}

impl fmt::Display for LispError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message)?;
        if let Some(form) = &self.form {
            write!(f, "\n  while compiling: {}", form)?;
        }
        Ok(())
    }
}

impl fmt::Debug for LispError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for LispError {}

impl From<std::io::Error> for LispError {
    fn from(err: std::io::Error) -> Self {
        LispError::new(Exception::Io, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fails() -> Result<(), LispError> {
        raise_exn!(DivideByZero, "{} / {}", 1, 0)
    }

    #[test]
    fn raise_formats_message() {
        let err = fails().unwrap_err();
        assert_eq!(err.kind, Exception::DivideByZero);
        assert_eq!(err.to_string(), "division-by-zero: 1 / 0");
        assert!(!err.is_compile_time());
    }

    #[test]
    fn first_attached_form_is_kept() {
        let err = LispError::new(Exception::MalformedForm, "bad")
            .in_form(Value::Integer(1))
            .in_form(Value::Integer(2));
        assert!(err.is_compile_time());
        assert!(matches!(err.form, Some(Value::Integer(1))));
    }
}
