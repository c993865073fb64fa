//! S-expression reader.
//!
//! Tokens come from a `logos` lexer; atoms are classified afterwards into
//! integers, reals and upcased symbols. Running out of input inside a form is
//! an `Eof` error so the REPL can ask for more lines.

use std::{ops::Range, sync::Arc};

use logos::Logos;
use num::BigInt;

use crate::{
    list::list,
    number::from_bigint,
    raise_exn,
    symbol::{intern, FUNCTION, QUASIQUOTE, QUOTE, UNQUOTE, UNQUOTE_SPLICING},
    value::Value,
    LispResult,
};

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip(r";[^\n]*", allow_greedy = true))]
pub enum Token {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("'")]
    Quote,
    #[token("`")]
    Backquote,
    #[token(",@")]
    CommaAt,
    #[token(",")]
    Comma,
    #[token("#'")]
    FunctionQuote,

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    Str(String),

    #[regex(r"#\\[A-Za-z][A-Za-z0-9]*|#\\.", |lex| character(lex.slice()))]
    Char(char),

    #[regex(r#"[^ \t\r\n\f()'`,";#][^ \t\r\n\f()'`,";]*"#, |lex| lex.slice().to_string())]
    Atom(String),
}

fn unescape(slice: &str) -> Option<String> {
    let mut out = String::with_capacity(slice.len());
    let mut chars = slice[1..slice.len() - 1].chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        out.push(match chars.next()? {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            other => other,
        });
    }
    Some(out)
}

fn character(slice: &str) -> Option<char> {
    let name = &slice[2..];
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => match name.to_ascii_uppercase().as_str() {
            "SPACE" => Some(' '),
            "NEWLINE" | "LINEFEED" => Some('\n'),
            "TAB" => Some('\t'),
            "RETURN" => Some('\r'),
            _ => None,
        },
    }
}

/// Integer, then real, then symbol. `NIL` and `T` read as themselves.
fn atom(text: &str) -> Value {
    if let Ok(n) = text.parse::<i64>() {
        return Value::Integer(n);
    }
    let digits = text.strip_prefix(&['+', '-'][..]).unwrap_or(text);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = text.parse::<BigInt>() {
            return from_bigint(n);
        }
    }
    let numeric = text.bytes().any(|b| b.is_ascii_digit())
        && text.bytes().all(|b| b.is_ascii_digit() || b"+-.eE".contains(&b));
    if numeric {
        if let Ok(x) = text.parse::<f64>() {
            return Value::Real(x);
        }
    }
    match text.to_uppercase().as_str() {
        "NIL" => Value::Nil,
        "T" => Value::True,
        name => intern(name).as_value(),
    }
}

pub struct Reader<'a> {
    lexer: logos::Lexer<'a, Token>,
    source: &'a str,
}

impl<'a> Reader<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            lexer: Token::lexer(source),
            source,
        }
    }

    fn next_token(&mut self) -> LispResult<Option<(Token, Range<usize>)>> {
        match self.lexer.next() {
            None => Ok(None),
            Some(Ok(token)) => Ok(Some((token, self.lexer.span()))),
            Some(Err(())) => {
                let span = self.lexer.span();
                let snippet = &self.source[span.clone()];
                // An unterminated string runs to the end of the input.
                if snippet.starts_with('"') {
                    return raise_exn!(Eof, "unterminated string at offset {}", span.start);
                }
                raise_exn!(Read, @Value::string(snippet), "unreadable input {:?} at offset {}", snippet, span.start)
            }
        }
    }

    /// The next form, or `None` at the end of input.
    pub fn read(&mut self) -> LispResult<Option<Value>> {
        match self.next_token()? {
            None => Ok(None),
            Some((token, span)) => self.form(token, span).map(Some),
        }
    }

    pub fn read_all(&mut self) -> LispResult<Vec<Value>> {
        let mut forms = Vec::new();
        while let Some(form) = self.read()? {
            forms.push(form);
        }
        Ok(forms)
    }

    fn required(&mut self, after: &str) -> LispResult<Value> {
        match self.next_token()? {
            Some((token, span)) => self.form(token, span),
            None => raise_exn!(Eof, "end of input after {}", after),
        }
    }

    fn form(&mut self, token: Token, span: Range<usize>) -> LispResult<Value> {
        let wrap = |sym: Value, form: Value| list(&[sym, form]);
        Ok(match token {
            Token::LParen => self.list()?,
            Token::RParen => {
                return raise_exn!(Read, "unexpected ) at offset {}", span.start);
            }
            Token::Quote => wrap(QUOTE.as_value(), self.required("'")?),
            Token::Backquote => wrap(QUASIQUOTE.as_value(), self.required("`")?),
            Token::Comma => wrap(UNQUOTE.as_value(), self.required(",")?),
            Token::CommaAt => wrap(UNQUOTE_SPLICING.as_value(), self.required(",@")?),
            Token::FunctionQuote => wrap(FUNCTION.as_value(), self.required("#'")?),
            Token::Str(s) => Value::String(Arc::from(s)),
            Token::Char(c) => Value::Character(c),
            Token::Atom(text) if text == "." => {
                return raise_exn!(Read, "unexpected . at offset {}", span.start);
            }
            Token::Atom(text) => atom(&text),
        })
    }

    /// The rest of a list after its `(`.
    fn list(&mut self) -> LispResult<Value> {
        let mut items = Vec::new();
        loop {
            let Some((token, span)) = self.next_token()? else {
                return raise_exn!(Eof, "end of input inside a list");
            };
            match token {
                Token::RParen => return Ok(list(&items)),
                Token::Atom(text) if text == "." => {
                    if items.is_empty() {
                        return raise_exn!(Read, "nothing before . at offset {}", span.start);
                    }
                    let tail = self.required(".")?;
                    return match self.next_token()? {
                        Some((Token::RParen, _)) => Ok(crate::list::list_star(&items, tail)),
                        Some((_, span)) => {
                            raise_exn!(Read, "more than one form after . at offset {}", span.start)
                        }
                        None => raise_exn!(Eof, "end of input inside a list"),
                    };
                }
                token => items.push(self.form(token, span)?),
            }
        }
    }
}

/// The first form of `source`.
pub fn read_str(source: &str) -> LispResult<Value> {
    match Reader::new(source).read()? {
        Some(form) => Ok(form),
        None => raise_exn!(Eof, "no form in input"),
    }
}
