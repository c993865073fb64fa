use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::value::Value;

/// An interned name with a global value slot, a function slot, a property
/// list and a `special` proclamation flag.
///
/// Equality and hashing are by identity.
#[derive(Clone)]
pub struct Symbol(Arc<SymbolData>);

pub struct SymbolData {
    name: Box<str>,
    value: Mutex<Option<Value>>,
    function: Mutex<Option<Value>>,
    plist: Mutex<Value>,
    special: AtomicBool,
    interned: bool,
}

impl Symbol {
    fn make(name: &str, interned: bool) -> Self {
        Symbol(Arc::new(SymbolData {
            name: name.into(),
            value: Mutex::new(None),
            function: Mutex::new(None),
            plist: Mutex::new(Value::Nil),
            special: AtomicBool::new(false),
            interned,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn is_interned(&self) -> bool {
        self.0.interned
    }

    pub fn is_keyword(&self) -> bool {
        self.0.name.starts_with(':')
    }

    /// Global value; `None` means unbound.
    pub fn global_value(&self) -> Option<Value> {
        self.0.value.lock().clone()
    }

    pub fn set_global_value(&self, value: Value) {
        let _old = self.0.value.lock().replace(value);
    }

    pub fn is_bound(&self) -> bool {
        self.0.value.lock().is_some()
    }

    pub fn function(&self) -> Option<Value> {
        self.0.function.lock().clone()
    }

    pub fn set_function(&self, function: Value) {
        let _old = self.0.function.lock().replace(function);
    }

    /// Installs `function`, or empties the slot, returning the previous contents.
    pub fn replace_function(&self, function: Option<Value>) -> Option<Value> {
        std::mem::replace(&mut *self.0.function.lock(), function)
    }

    pub fn plist(&self) -> Value {
        self.0.plist.lock().clone()
    }

    pub fn set_plist(&self, plist: Value) {
        let _old = std::mem::replace(&mut *self.0.plist.lock(), plist);
    }

    pub fn is_special(&self) -> bool {
        self.0.special.load(Ordering::Acquire)
    }

    /// Proclaims the symbol special: every binding of it is dynamic.
    pub fn proclaim_special(&self) {
        self.0.special.store(true, Ordering::Release);
    }

    pub fn as_value(&self) -> Value {
        Value::Symbol(self.clone())
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The name to symbol dictionary. Insertion order is kept so listings are
/// stable.
pub struct SymbolTable {
    symbols: Mutex<IndexMap<Box<str>, Symbol>>,
}

static OTABLE: Lazy<SymbolTable> = Lazy::new(|| SymbolTable {
    symbols: Mutex::new(IndexMap::new()),
});

pub fn intern(name: &str) -> Symbol {
    let mut symbols = OTABLE.symbols.lock();
    if let Some(symbol) = symbols.get(name) {
        return symbol.clone();
    }

    let symbol = Symbol::make(name, true);
    if symbol.is_keyword() {
        symbol.set_global_value(symbol.as_value());
    }
    symbols.insert(name.into(), symbol.clone());
    symbol
}

pub fn find_symbol(name: &str) -> Option<Symbol> {
    OTABLE.symbols.lock().get(name).cloned()
}

/// A fresh uninterned symbol.
pub fn gensym(prefix: &str) -> Symbol {
    static GENSYM_COUNT: AtomicUsize = AtomicUsize::new(0);

    Symbol::make(
        &format!("{}{}", prefix, GENSYM_COUNT.fetch_add(1, Ordering::SeqCst)),
        false,
    )
}

macro_rules! well_known {
    ($($id: ident $name: literal),* $(,)?) => {
        $(
            pub static $id: Lazy<Symbol> = Lazy::new(|| intern($name));
        )*
    };
}

well_known! {
    QUOTE "QUOTE",
    PROGN "PROGN",
    IF "IF",
    LET "LET",
    LET_STAR "LET*",
    LETREC "LETREC",
    LAMBDA "LAMBDA",
    DEFUN "DEFUN",
    DEFMACRO "DEFMACRO",
    AND "AND",
    OR "OR",
    BLOCK "BLOCK",
    RETURN_FROM "RETURN-FROM",
    RETURN "RETURN",
    SETQ "SETQ",
    COND "COND",
    WHEN "WHEN",
    UNLESS "UNLESS",
    LABELS "LABELS",
    FUNCTION "FUNCTION",
    DEFVAR "DEFVAR",
    DEFPARAMETER "DEFPARAMETER",
    DECLARE "DECLARE",
    SPECIAL "SPECIAL",
    AMP_REST "&REST",
    AMP_BODY "&BODY",
    QUASIQUOTE "QUASIQUOTE",
    UNQUOTE "UNQUOTE",
    UNQUOTE_SPLICING "UNQUOTE-SPLICING",
    APPEND "APPEND",
    CONS "CONS",
    BOUNDP "BOUNDP",
}
