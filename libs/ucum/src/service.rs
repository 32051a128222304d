//! The UCUM service surface: validation, analysis, canonical forms,
//! conversion, and search over a loaded essence model.

use crate::ast::{Component, Op, Term};
use crate::canonical::{Canonical, Registry};
use crate::decimal::Decimal;
use crate::error::{Error, Result};
use crate::model::UcumModel;
use crate::parser;

/// Significant digits carried through non-terminating conversions.
const CONVERSION_PRECISION: u32 = 24;

/// A value together with its unit code.
#[derive(Debug, Clone)]
pub struct Pair {
    pub value: Decimal,
    pub code: String,
}

impl Pair {
    pub fn new(value: Decimal, code: impl Into<String>) -> Self {
        Self {
            value,
            code: code.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConceptKind {
    Prefix,
    BaseUnit,
    Unit,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub kind: ConceptKind,
    pub code: String,
    pub description: String,
}

pub struct UcumService {
    model: UcumModel,
    registry: Registry,
}

impl UcumService {
    pub fn from_essence_xml(xml: &str) -> Result<Self> {
        let model = UcumModel::from_essence_xml(xml)?;
        let registry = Registry::build(&model)?;
        Ok(Self { model, registry })
    }

    pub fn model(&self) -> &UcumModel {
        &self.model
    }

    pub fn version(&self) -> &str {
        &self.model.version
    }

    /// `None` when the expression is a valid unit; otherwise the reason it
    /// is not.
    pub fn validate(&self, unit: &str) -> Option<String> {
        match parser::parse(&self.model, unit)
            .and_then(|term| self.registry.canonicalize(&self.model, &term))
        {
            Ok(_) => None,
            Err(e) => Some(e.to_string()),
        }
    }

    /// Validate that `unit` measures the named property (`"length"`,
    /// `"mass"`, …).
    pub fn validate_in_property(&self, unit: &str, property: &str) -> Option<String> {
        let canonical = match self.canonical(unit) {
            Ok(c) => c,
            Err(e) => return Some(e.to_string()),
        };
        let matches = self
            .model
            .base_units
            .iter()
            .filter(|b| b.property == property)
            .any(|b| {
                self.canonical(&b.code)
                    .map(|c| c.comparable_with(&canonical))
                    .unwrap_or(false)
            })
            || self
                .model
                .units
                .iter()
                .filter(|u| u.property == property)
                .any(|u| {
                    self.canonical(&u.code)
                        .map(|c| c.comparable_with(&canonical))
                        .unwrap_or(false)
                });
        if matches {
            None
        } else {
            Some(format!(
                "unit '{unit}' is not a valid unit for the property '{property}'"
            ))
        }
    }

    fn canonical(&self, unit: &str) -> Result<Canonical> {
        let term = parser::parse(&self.model, unit)?;
        self.registry.canonicalize(&self.model, &term)
    }

    /// The canonical base-unit expression for a unit (`km/h` → `m.s-1`).
    pub fn get_canonical_units(&self, unit: &str) -> Result<String> {
        let canonical = self.canonical(unit)?;
        Ok(self.registry.render(&self.model, &canonical))
    }

    /// Two units are comparable exactly when their canonical dimension
    /// vectors agree.
    pub fn is_comparable(&self, a: &str, b: &str) -> Result<bool> {
        let ca = self.canonical(a)?;
        let cb = self.canonical(b)?;
        Ok(ca.comparable_with(&cb))
    }

    /// Rewrite a value/unit pair in canonical base units, folding the
    /// unit's magnitude into the value.
    pub fn get_canonical_form(&self, pair: &Pair) -> Result<Pair> {
        let canonical = self.canonical(&pair.code)?;
        if canonical.special {
            return Err(Error::OffsetConversion);
        }
        let value = pair.value.to_rational() * &canonical.factor;
        Ok(Pair {
            value: Decimal::from_rational(&value, CONVERSION_PRECISION),
            code: self.registry.render(&self.model, &canonical),
        })
    }

    /// Convert a value between two comparable ratio-scale units.
    pub fn convert(&self, value: &Decimal, from: &str, to: &str) -> Result<Decimal> {
        let cf = self.canonical(from)?;
        let ct = self.canonical(to)?;
        if cf.special || ct.special {
            return Err(Error::OffsetConversion);
        }
        if !cf.comparable_with(&ct) {
            return Err(Error::NotComparable {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        let result = value.to_rational() * &cf.factor / &ct.factor;
        Ok(Decimal::from_rational(&result, CONVERSION_PRECISION))
    }

    /// Multiply two pairs; the result is in canonical form.
    pub fn multiply(&self, lhs: &Pair, rhs: &Pair) -> Result<Pair> {
        let combined = Pair {
            value: lhs.value.multiply(&rhs.value),
            code: format!("({}).({})", lhs.code, rhs.code),
        };
        self.get_canonical_form(&combined)
    }

    /// Divide `lhs` by `rhs`; the result is in canonical form.
    pub fn divide_by(&self, lhs: &Pair, rhs: &Pair) -> Result<Pair> {
        let combined = Pair {
            value: lhs.value.divide(&rhs.value)?,
            code: format!("({})/({})", lhs.code, rhs.code),
        };
        self.get_canonical_form(&combined)
    }

    /// A human-readable factored description of a unit expression
    /// (`kg.m/s2` → "kilogram · meter / (second · second)").
    pub fn analyse(&self, unit: &str) -> Result<String> {
        let term = parser::parse(&self.model, unit)?;
        let mut numerator = Vec::new();
        let mut denominator = Vec::new();
        self.collect_names(&term, 1, &mut numerator, &mut denominator)?;

        let mut out = if numerator.is_empty() {
            "1".to_string()
        } else {
            numerator.join(" · ")
        };
        match denominator.len() {
            0 => {}
            1 => {
                out.push_str(" / ");
                out.push_str(&denominator[0]);
            }
            _ => {
                out.push_str(" / (");
                out.push_str(&denominator.join(" · "));
                out.push(')');
            }
        }
        Ok(out)
    }

    fn collect_names(
        &self,
        term: &Term,
        sign: i32,
        numerator: &mut Vec<String>,
        denominator: &mut Vec<String>,
    ) -> Result<()> {
        for (op, component) in &term.components {
            let local = match op {
                Op::Mul => sign,
                Op::Div => -sign,
            };
            match component {
                Component::Annotation(_) => {}
                Component::Factor(value, exponent) => {
                    if *value != 1 {
                        let effective = if *exponent < 0 { -local } else { local };
                        let target = if effective > 0 {
                            &mut *numerator
                        } else {
                            &mut *denominator
                        };
                        for _ in 0..exponent.unsigned_abs().max(1) {
                            target.push(value.to_string());
                        }
                    }
                }
                Component::Group(inner, exponent) => {
                    for _ in 0..exponent.unsigned_abs().max(1) {
                        let inner_sign = if *exponent < 0 { -local } else { local };
                        self.collect_names(inner, inner_sign, numerator, denominator)?;
                    }
                }
                Component::Symbol(symbol) => {
                    let unit_name = self
                        .model
                        .unit_name(&symbol.unit)
                        .ok_or_else(|| Error::UnknownUnit(symbol.unit.clone()))?;
                    let name = match &symbol.prefix {
                        Some(p) => {
                            let prefix = self
                                .model
                                .prefix(p)
                                .ok_or_else(|| Error::UnknownUnit(p.clone()))?;
                            format!("{}{}", prefix.name, unit_name)
                        }
                        None => unit_name.to_string(),
                    };
                    let effective = if symbol.exponent < 0 { -local } else { local };
                    let target = if effective > 0 {
                        &mut *numerator
                    } else {
                        &mut *denominator
                    };
                    for _ in 0..symbol.exponent.unsigned_abs().max(1) {
                        target.push(name.clone());
                    }
                }
            }
        }
        Ok(())
    }

    /// Display text for a unit code; falls back to the code itself when the
    /// expression does not analyse.
    pub fn get_common_display(&self, unit: &str) -> String {
        self.analyse(unit).unwrap_or_else(|_| unit.to_string())
    }

    /// Search unit and prefix definitions by code or name.
    pub fn search(
        &self,
        kind: Option<ConceptKind>,
        text: &str,
        use_regex: bool,
    ) -> Result<Vec<SearchResult>> {
        let matcher: Box<dyn Fn(&str) -> bool> = if use_regex {
            let re = regex::Regex::new(text).map_err(|_| Error::InvalidRegex(text.to_string()))?;
            Box::new(move |s: &str| re.is_match(s))
        } else {
            let needle = text.to_lowercase();
            Box::new(move |s: &str| s.to_lowercase().contains(&needle))
        };

        let mut results = Vec::new();
        if kind.is_none() || kind == Some(ConceptKind::Prefix) {
            for p in &self.model.prefixes {
                if matcher(&p.code) || matcher(&p.name) {
                    results.push(SearchResult {
                        kind: ConceptKind::Prefix,
                        code: p.code.clone(),
                        description: p.name.clone(),
                    });
                }
            }
        }
        if kind.is_none() || kind == Some(ConceptKind::BaseUnit) {
            for b in &self.model.base_units {
                if matcher(&b.code) || matcher(&b.name) || matcher(&b.property) {
                    results.push(SearchResult {
                        kind: ConceptKind::BaseUnit,
                        code: b.code.clone(),
                        description: b.name.clone(),
                    });
                }
            }
        }
        if kind.is_none() || kind == Some(ConceptKind::Unit) {
            for u in &self.model.units {
                if matcher(&u.code)
                    || u.names.iter().any(|n| matcher(n))
                    || matcher(&u.property)
                {
                    results.push(SearchResult {
                        kind: ConceptKind::Unit,
                        code: u.code.clone(),
                        description: u.names.first().cloned().unwrap_or_default(),
                    });
                }
            }
        }
        Ok(results)
    }
}
