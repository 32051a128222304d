//! Unit expression parser.
//!
//! Tokenizes and parses UCUM unit codes (`mg/dL`, `kg.m/s2`, `10*-2`,
//! `{rbc}`, `/min`) into [`Term`] trees, resolving each symbol's prefix
//! against the loaded model as it goes.

use crate::ast::{Component, Op, Symbol, Term};
use crate::error::{Error, Result};
use crate::model::UcumModel;

pub fn parse(model: &UcumModel, expr: &str) -> Result<Term> {
    if expr.is_empty() {
        return Err(syntax(expr, 0, "empty unit expression"));
    }
    if !expr.is_ascii() {
        return Err(syntax(expr, 0, "unit expressions must be ASCII"));
    }
    if expr.chars().any(|c| c.is_whitespace()) {
        return Err(syntax(expr, 0, "unit expressions may not contain whitespace"));
    }
    let mut parser = Parser {
        model,
        expr,
        chars: expr.chars().collect(),
        pos: 0,
    };
    let term = parser.parse_term()?;
    if parser.pos < parser.chars.len() {
        return Err(syntax(expr, parser.pos, "unexpected character"));
    }
    Ok(term)
}

fn syntax(expr: &str, pos: usize, message: &str) -> Error {
    Error::Syntax {
        expr: expr.to_string(),
        pos,
        message: message.to_string(),
    }
}

struct Parser<'a> {
    model: &'a UcumModel,
    expr: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn error(&self, message: &str) -> Error {
        syntax(self.expr, self.pos, message)
    }

    fn parse_term(&mut self) -> Result<Term> {
        let mut term = Term::default();

        // A leading solidus divides unity: "/min".
        let mut op = if self.peek() == Some('/') {
            self.pos += 1;
            Op::Div
        } else {
            Op::Mul
        };

        loop {
            let component = self.parse_component()?;
            term.components.push((op, component));

            match self.peek() {
                Some('.') => {
                    self.pos += 1;
                    op = Op::Mul;
                }
                Some('/') => {
                    self.pos += 1;
                    op = Op::Div;
                }
                _ => break,
            }
        }
        Ok(term)
    }

    fn parse_component(&mut self) -> Result<Component> {
        match self.peek() {
            None => Err(self.error("expected a unit component")),
            Some('(') => {
                self.pos += 1;
                let inner = self.parse_term()?;
                if self.peek() != Some(')') {
                    return Err(self.error("expected ')'"));
                }
                self.pos += 1;
                let exponent = self.parse_exponent()?.unwrap_or(1);
                Ok(Component::Group(Box::new(inner), exponent))
            }
            Some('{') => Ok(Component::Annotation(self.parse_annotation()?)),
            Some(c) if c.is_ascii_digit() => self.parse_number_or_power_symbol(),
            Some(c) if is_symbol_start(c) => self.parse_symbol(),
            Some(_) => Err(self.error("unexpected character")),
        }
    }

    fn parse_annotation(&mut self) -> Result<String> {
        let start = self.pos;
        self.pos += 1; // '{'
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(syntax(self.expr, start, "unterminated annotation")),
                Some('}') => return Ok(text),
                Some(c) => text.push(c),
            }
        }
    }

    /// Digits open either an integer factor or the `10*` / `10^` power
    /// symbols.
    fn parse_number_or_power_symbol(&mut self) -> Result<Component> {
        let start = self.pos;
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if digits == "10" && matches!(self.peek(), Some('*') | Some('^')) {
            let marker = self.bump().unwrap();
            let symbol = format!("10{marker}");
            return self.finish_symbol(symbol, start);
        }
        let value: u64 = digits
            .parse()
            .map_err(|_| syntax(self.expr, start, "integer factor out of range"))?;
        let exponent = self.parse_exponent()?.unwrap_or(1);
        Ok(Component::Factor(value, exponent))
    }

    fn parse_symbol(&mut self) -> Result<Component> {
        let start = self.pos;
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c == '[' {
                text.push_str(&self.parse_bracketed()?);
            } else if is_symbol_char(c) {
                text.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if text.is_empty() {
            return Err(self.error("expected a unit symbol"));
        }
        self.finish_symbol(text, start)
    }

    fn parse_bracketed(&mut self) -> Result<String> {
        let start = self.pos;
        let mut text = String::from('[');
        self.pos += 1;
        loop {
            match self.bump() {
                None => return Err(syntax(self.expr, start, "unterminated '['")),
                Some(']') => {
                    text.push(']');
                    return Ok(text);
                }
                Some(c) => text.push(c),
            }
        }
    }

    fn finish_symbol(&mut self, text: String, start: usize) -> Result<Component> {
        let (prefix, unit) = self.resolve_symbol(&text, start)?;
        let exponent = self.parse_exponent()?.unwrap_or(1);
        let annotation = if self.peek() == Some('{') {
            Some(self.parse_annotation()?)
        } else {
            None
        };
        Ok(Component::Symbol(Symbol {
            prefix,
            unit,
            exponent,
            annotation,
        }))
    }

    fn resolve_symbol(&self, text: &str, _start: usize) -> Result<(Option<String>, String)> {
        if self.model.is_unit_code(text) {
            return Ok((None, text.to_string()));
        }

        // Longest prefix first so `da` wins over `d`.
        let mut prefixes: Vec<&str> = self.model.prefixes.iter().map(|p| p.code.as_str()).collect();
        prefixes.sort_by_key(|p| std::cmp::Reverse(p.len()));
        for prefix in prefixes {
            if let Some(rest) = text.strip_prefix(prefix) {
                if rest.is_empty() {
                    continue;
                }
                if self.model.base_unit(rest).is_some() {
                    return Ok((Some(prefix.to_string()), rest.to_string()));
                }
                if let Some(unit) = self.model.unit(rest) {
                    if !unit.metric {
                        return Err(Error::NotPrefixable(text.to_string()));
                    }
                    return Ok((Some(prefix.to_string()), rest.to_string()));
                }
            }
        }
        Err(Error::UnknownUnit(text.to_string()))
    }

    fn parse_exponent(&mut self) -> Result<Option<i32>> {
        let sign = match self.peek() {
            Some('+') => {
                if !self.digit_follows(1) {
                    return Ok(None);
                }
                self.pos += 1;
                1
            }
            Some('-') => {
                if !self.digit_follows(1) {
                    return Ok(None);
                }
                self.pos += 1;
                -1
            }
            Some(c) if c.is_ascii_digit() => 1,
            _ => return Ok(None),
        };
        let start = self.pos;
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if digits.is_empty() {
            return Err(syntax(self.expr, start, "expected exponent digits"));
        }
        let value: i32 = digits
            .parse()
            .map_err(|_| syntax(self.expr, start, "exponent out of range"))?;
        Ok(Some(sign * value))
    }

    fn digit_follows(&self, offset: usize) -> bool {
        self.chars
            .get(self.pos + offset)
            .is_some_and(|c| c.is_ascii_digit())
    }
}

fn is_symbol_start(c: char) -> bool {
    c.is_ascii_alphabetic() || matches!(c, '[' | '%' | '\'' | '*' | '_')
}

fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphabetic() || matches!(c, '%' | '\'' | '*' | '^' | '_')
}
