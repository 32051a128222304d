//! SNOMED CT Compositional Grammar: expression model, parser, and
//! renderer.
//!
//! ```text
//! expression     := status? concept ('+' concept)* refinementPart?
//! status         := '===' | '<<<'
//! concept        := sctid ('|' term '|')?
//! refinementPart := ':' (refinement | group) (',' (refinement | group))*
//! group          := '{' refinement (',' refinement)* '}'
//! refinement     := concept '=' value
//! value          := '(' expression ')' | concept ('+' concept)*
//! ```

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpressionStatus {
    Equivalent,
    SubsumedBy,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionConcept {
    pub code: String,
    pub description: Option<String>,
}

impl ExpressionConcept {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: None,
        }
    }

    pub fn id(&self) -> Result<u64> {
        self.code.parse().map_err(|_| Error::Syntax {
            expr: self.code.clone(),
            pos: 0,
            message: "concept identifiers are positive integers".to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refinement {
    pub name: ExpressionConcept,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RefinementGroup {
    pub refinements: Vec<Refinement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Expression {
    pub status: ExpressionStatus,
    pub concepts: Vec<ExpressionConcept>,
    pub refinements: Vec<Refinement>,
    pub groups: Vec<RefinementGroup>,
}

impl Expression {
    pub fn simple(code: impl Into<String>) -> Self {
        Self {
            concepts: vec![ExpressionConcept::new(code)],
            ..Default::default()
        }
    }

    /// True when the expression carries refinements (grouped or not).
    pub fn is_complex(&self) -> bool {
        !self.refinements.is_empty() || !self.groups.is_empty()
    }

    /// Structural equivalence: order-insensitive at every level.
    pub fn is_equivalent(&self, other: &Expression) -> bool {
        self.status == other.status
            && same_concept_multiset(&self.concepts, &other.concepts)
            && same_refinement_multiset(&self.refinements, &other.refinements)
            && same_group_multiset(&self.groups, &other.groups)
    }
}

fn same_concept_multiset(a: &[ExpressionConcept], b: &[ExpressionConcept]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut left: Vec<&str> = a.iter().map(|c| c.code.as_str()).collect();
    let mut right: Vec<&str> = b.iter().map(|c| c.code.as_str()).collect();
    left.sort_unstable();
    right.sort_unstable();
    left == right
}

fn same_refinement_multiset(a: &[Refinement], b: &[Refinement]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    'outer: for ra in a {
        for (i, rb) in b.iter().enumerate() {
            if !used[i] && ra.name.code == rb.name.code && ra.value.is_equivalent(&rb.value) {
                used[i] = true;
                continue 'outer;
            }
        }
        return false;
    }
    true
}

fn same_group_multiset(a: &[RefinementGroup], b: &[RefinementGroup]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    'outer: for ga in a {
        for (i, gb) in b.iter().enumerate() {
            if !used[i] && same_refinement_multiset(&ga.refinements, &gb.refinements) {
                used[i] = true;
                continue 'outer;
            }
        }
        return false;
    }
    true
}

/// How to render cosmetic `|term|` text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOption {
    /// Codes only.
    Minimal,
    /// Emit terms where the parsed expression carried them.
    AsIs,
}

impl Expression {
    pub fn render(&self, option: RenderOption) -> String {
        let mut out = String::new();
        match self.status {
            ExpressionStatus::Equivalent => out.push_str("==="),
            ExpressionStatus::SubsumedBy => out.push_str("<<<"),
            ExpressionStatus::Unknown => {}
        }
        for (i, concept) in self.concepts.iter().enumerate() {
            if i > 0 {
                out.push('+');
            }
            render_concept(&mut out, concept, option);
        }
        if self.is_complex() {
            out.push(':');
            let mut first = true;
            for refinement in &self.refinements {
                if !first {
                    out.push(',');
                }
                first = false;
                render_refinement(&mut out, refinement, option);
            }
            for group in &self.groups {
                if !first {
                    out.push(',');
                }
                first = false;
                out.push('{');
                for (i, refinement) in group.refinements.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    render_refinement(&mut out, refinement, option);
                }
                out.push('}');
            }
        }
        out
    }
}

fn render_concept(out: &mut String, concept: &ExpressionConcept, option: RenderOption) {
    out.push_str(&concept.code);
    if option == RenderOption::AsIs {
        if let Some(term) = &concept.description {
            out.push('|');
            out.push_str(term);
            out.push('|');
        }
    }
}

fn render_refinement(out: &mut String, refinement: &Refinement, option: RenderOption) {
    render_concept(out, &refinement.name, option);
    out.push('=');
    let value = &refinement.value;
    if value.is_complex() || value.status != ExpressionStatus::Unknown {
        out.push('(');
        out.push_str(&value.render(option));
        out.push(')');
    } else {
        for (i, concept) in value.concepts.iter().enumerate() {
            if i > 0 {
                out.push('+');
            }
            render_concept(out, concept, option);
        }
    }
}

pub fn parse_expression(text: &str) -> Result<Expression> {
    let mut parser = ExpressionParser {
        expr: text,
        chars: text.chars().collect(),
        pos: 0,
    };
    let expression = parser.parse_expression()?;
    parser.skip_whitespace();
    if parser.pos < parser.chars.len() {
        return Err(parser.error("unexpected character after expression"));
    }
    Ok(expression)
}

struct ExpressionParser<'a> {
    expr: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> ExpressionParser<'a> {
    fn error(&self, message: &str) -> Error {
        Error::Syntax {
            expr: self.expr.to_string(),
            pos: self.pos,
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{c}'")))
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        self.chars[self.pos..]
            .iter()
            .take(s.len())
            .collect::<String>()
            == s
    }

    fn parse_expression(&mut self) -> Result<Expression> {
        self.skip_whitespace();
        let status = if self.starts_with("===") {
            self.pos += 3;
            ExpressionStatus::Equivalent
        } else if self.starts_with("<<<") {
            self.pos += 3;
            ExpressionStatus::SubsumedBy
        } else {
            ExpressionStatus::Unknown
        };

        let mut concepts = vec![self.parse_concept()?];
        while self.eat('+') {
            concepts.push(self.parse_concept()?);
        }

        let mut refinements = Vec::new();
        let mut groups = Vec::new();
        if self.eat(':') {
            loop {
                if self.eat('{') {
                    groups.push(self.parse_group_body()?);
                } else {
                    refinements.push(self.parse_refinement()?);
                }
                if !self.eat(',') {
                    break;
                }
            }
        }

        Ok(Expression {
            status,
            concepts,
            refinements,
            groups,
        })
    }

    fn parse_group_body(&mut self) -> Result<RefinementGroup> {
        let mut group = RefinementGroup::default();
        group.refinements.push(self.parse_refinement()?);
        while self.eat(',') {
            group.refinements.push(self.parse_refinement()?);
        }
        self.expect('}')?;
        Ok(group)
    }

    fn parse_refinement(&mut self) -> Result<Refinement> {
        let name = self.parse_concept()?;
        self.expect('=')?;
        let value = self.parse_value()?;
        Ok(Refinement { name, value })
    }

    fn parse_value(&mut self) -> Result<Expression> {
        if self.eat('(') {
            let expression = self.parse_expression()?;
            self.expect(')')?;
            return Ok(expression);
        }
        let mut concepts = vec![self.parse_concept()?];
        while self.eat('+') {
            concepts.push(self.parse_concept()?);
        }
        Ok(Expression {
            status: ExpressionStatus::Unknown,
            concepts,
            refinements: Vec::new(),
            groups: Vec::new(),
        })
    }

    fn parse_concept(&mut self) -> Result<ExpressionConcept> {
        self.skip_whitespace();
        let start = self.pos;
        let mut code = String::new();
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            code.push(self.chars[self.pos]);
            self.pos += 1;
        }
        if code.is_empty() {
            return Err(self.error("expected a concept identifier"));
        }
        if code.starts_with('0') {
            self.pos = start;
            return Err(self.error("concept identifiers do not start with zero"));
        }

        let mut description = None;
        self.skip_whitespace();
        if self.peek() == Some('|') {
            self.pos += 1;
            let mut term = String::new();
            loop {
                match self.peek() {
                    None => return Err(self.error("unterminated term")),
                    Some('|') => {
                        self.pos += 1;
                        break;
                    }
                    Some(c) => {
                        term.push(c);
                        self.pos += 1;
                    }
                }
            }
            description = Some(term.trim().to_string());
        }

        Ok(ExpressionConcept { code, description })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_concept() {
        let e = parse_expression("73211009").unwrap();
        assert_eq!(e.concepts.len(), 1);
        assert_eq!(e.concepts[0].code, "73211009");
        assert!(!e.is_complex());
    }

    #[test]
    fn parses_term_text() {
        let e = parse_expression("73211009 |diabetes mellitus|").unwrap();
        assert_eq!(e.concepts[0].description.as_deref(), Some("diabetes mellitus"));
    }

    #[test]
    fn parses_refinement_group() {
        let e = parse_expression(
            "128045006|Cellulitis|:{363698007|finding site|=56459004|foot structure|}",
        )
        .unwrap();
        assert_eq!(e.concepts.len(), 1);
        assert!(e.refinements.is_empty());
        assert_eq!(e.groups.len(), 1);
        assert_eq!(e.groups[0].refinements.len(), 1);
        let refinement = &e.groups[0].refinements[0];
        assert_eq!(refinement.name.code, "363698007");
        assert_eq!(refinement.value.concepts[0].code, "56459004");
    }

    #[test]
    fn parses_status_markers() {
        assert_eq!(
            parse_expression("===73211009").unwrap().status,
            ExpressionStatus::Equivalent
        );
        assert_eq!(
            parse_expression("<<< 73211009").unwrap().status,
            ExpressionStatus::SubsumedBy
        );
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert!(parse_expression("").is_err());
        assert!(parse_expression("abc").is_err());
        assert!(parse_expression("123:{456=789").is_err());
        assert!(parse_expression("123:456=").is_err());
        assert!(parse_expression("123 junk").is_err());
    }

    #[test]
    fn render_roundtrips() {
        let text = "128045006|Cellulitis|:{363698007|finding site|=56459004|foot structure|}";
        let e = parse_expression(text).unwrap();

        let minimal = e.render(RenderOption::Minimal);
        assert_eq!(minimal, "128045006:{363698007=56459004}");
        assert!(parse_expression(&minimal).unwrap().is_equivalent(&e));

        let as_is = e.render(RenderOption::AsIs);
        assert!(as_is.contains("|Cellulitis|"));
        assert!(parse_expression(&as_is).unwrap().is_equivalent(&e));
    }

    #[test]
    fn equivalence_ignores_order() {
        let a = parse_expression("1290041000+73211009:{363698007=56459004},{246075003=387517004}")
            .unwrap();
        let b = parse_expression("73211009+1290041000:{246075003=387517004},{363698007=56459004}")
            .unwrap();
        assert!(a.is_equivalent(&b));
        assert!(b.is_equivalent(&a));
        assert!(a.is_equivalent(&a));

        let c = parse_expression("73211009:{363698007=56459004}").unwrap();
        assert!(!a.is_equivalent(&c));
    }
}
