//! Printed representation of values.
//!
//! Values are laid out with `pretty`. `Display` renders on one line; the REPL
//! renders at terminal width with colors. Printing is bounded in nesting
//! depth and list length so shared or circular structure made with `RPLACD`
//! still prints.

use std::fmt;

use pretty::{BoxAllocator, DocAllocator, DocBuilder};
use termcolor::{Color, ColorSpec, WriteColor};

use crate::value::Value;

const MAX_DEPTH: usize = 256;
const MAX_LENGTH: usize = 100_000;
/// Wide enough that nothing ever breaks.
const FLAT_WIDTH: usize = 1 << 24;

fn colored(color: Color) -> ColorSpec {
    ColorSpec::new().set_fg(Some(color)).clone()
}

fn character_name(c: char) -> String {
    match c {
        ' ' => "Space".to_owned(),
        '\n' => "Newline".to_owned(),
        '\t' => "Tab".to_owned(),
        '\r' => "Return".to_owned(),
        c => c.to_string(),
    }
}

/// Concatenates `docs` as a balanced tree. A left-nested chain as long as the
/// list would be dropped recursively, one stack frame per element.
fn concat<'a, D>(allocator: &'a D, mut docs: Vec<DocBuilder<'a, D, ColorSpec>>) -> DocBuilder<'a, D, ColorSpec>
where
    D: DocAllocator<'a, ColorSpec>,
    D::Doc: Clone,
{
    if docs.len() <= 1 {
        return docs.pop().unwrap_or_else(|| allocator.nil());
    }
    let right = docs.split_off(docs.len() / 2);
    concat(allocator, docs).append(concat(allocator, right))
}

pub fn to_doc<'a, D>(value: &Value, allocator: &'a D, depth: usize) -> DocBuilder<'a, D, ColorSpec>
where
    D: DocAllocator<'a, ColorSpec>,
    D::Doc: Clone,
{
    match value {
        Value::Nil => allocator.text("NIL"),
        Value::True => allocator.text("T"),
        Value::Integer(n) => allocator.text(n.to_string()).annotate(colored(Color::Cyan)),
        Value::Bignum(n) => allocator.text(n.to_string()).annotate(colored(Color::Cyan)),
        Value::Real(x) => allocator.text(format!("{:?}", x)).annotate(colored(Color::Cyan)),
        Value::Character(c) => allocator.text(format!("#\\{}", character_name(*c))),
        Value::String(s) => allocator.text(format!("{:?}", &**s)).annotate(colored(Color::Green)),
        Value::Symbol(sym) if !sym.is_interned() => allocator.text(format!("#:{}", sym.name())),
        Value::Symbol(sym) => allocator.text(sym.name().to_owned()),
        Value::Opcode(op) => allocator.text(op.name()).annotate(colored(Color::Magenta)),
        Value::Function(func) => allocator
            .text(format!("#<FUNCTION {}>", func.display_name()))
            .annotate(colored(Color::Yellow)),
        Value::Macro(func) => allocator
            .text(format!("#<MACRO {}>", func.display_name()))
            .annotate(colored(Color::Yellow)),
        Value::Primitive(prim) => allocator
            .text(format!("#<PRIMITIVE {}>", prim.name.name()))
            .annotate(colored(Color::Yellow)),
        Value::Cons(_) if depth >= MAX_DEPTH => allocator.text("(...)"),
        Value::Cons(_) => {
            let mut docs = Vec::new();
            let mut cursor = value.clone();
            loop {
                match cursor {
                    Value::Cons(cell) => {
                        if !docs.is_empty() {
                            docs.push(allocator.softline());
                        }
                        if docs.len() >= 2 * MAX_LENGTH {
                            docs.push(allocator.text("..."));
                            break;
                        }
                        docs.push(to_doc(&cell.car(), allocator, depth + 1));
                        cursor = cell.cdr();
                    }
                    Value::Nil => break,
                    tail => {
                        docs.push(allocator.softline());
                        docs.push(allocator.text("."));
                        docs.push(allocator.softline());
                        docs.push(to_doc(&tail, allocator, depth + 1));
                        break;
                    }
                }
            }
            concat(allocator, docs).nest(1).group().parens()
        }
    }
}

/// Renders `value` at `width` columns with colors.
pub fn pretty_print(value: &Value, width: usize, out: &mut dyn WriteColor) -> std::io::Result<()> {
    let allocator = BoxAllocator;
    let doc = to_doc(value, &allocator, 0).into_doc();
    let result = doc.render_colored(width, out);
    result
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let allocator = BoxAllocator;
        let doc = to_doc(self, &allocator, 0).into_doc();
        let result = doc.render_fmt(FLAT_WIDTH, f);
        result
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{list::list, op::Opcode, symbol::{gensym, intern}};

    #[test]
    fn atoms() {
        assert_eq!(Value::Real(2.0).to_string(), "2.0");
        assert_eq!(Value::Character('a').to_string(), "#\\a");
        assert_eq!(Value::Character(' ').to_string(), "#\\Space");
        assert_eq!(Value::string("a\"b").to_string(), "\"a\\\"b\"");
        assert_eq!(Value::Opcode(Opcode::SpBind).to_string(), "SP_BIND");
        assert!(gensym("G").as_value().to_string().starts_with("#:G"));
    }

    #[test]
    fn lists_print_on_one_line() {
        let items: Vec<Value> = (0..200).map(Value::Integer).collect();
        let printed = list(&items).to_string();
        assert!(!printed.contains('\n'));
        assert!(printed.starts_with("(0 1 2"));
        let dotted = Value::cons(intern("A").as_value(), Value::Integer(1));
        assert_eq!(dotted.to_string(), "(A . 1)");
    }

    #[test]
    fn long_lists_print_in_full() {
        let items: Vec<Value> = (0..100_000).map(Value::Integer).collect();
        let printed = list(&items).to_string();
        assert!(printed.starts_with("(0 1 2 "));
        assert!(printed.ends_with(" 99998 99999)"));

        let mut out = termcolor::Buffer::no_color();
        pretty_print(&list(&items), 80, &mut out).unwrap();
        assert!(String::from_utf8_lossy(out.as_slice()).ends_with("99999)"));
    }

    #[test]
    fn deep_nesting_is_cut_off() {
        let mut nested = Value::Nil;
        for _ in 0..1_000 {
            nested = list(&[nested]);
        }
        assert!(nested.to_string().contains("(...)"));
    }

    #[test]
    fn circular_lists_are_truncated() {
        let cell = list(&[Value::Integer(1)]);
        if let Value::Cons(c) = &cell {
            c.set_cdr(cell.clone());
        }
        assert!(cell.to_string().ends_with("...)"));
        if let Value::Cons(c) = &cell {
            c.set_cdr(Value::Nil);
        }
    }
}
