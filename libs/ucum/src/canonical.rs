//! Canonical forms: every unit expression reduces to a rational factor and
//! a vector of base-unit exponents. Defined units are expanded once at
//! registry build time, so canonicalising an input expression is linear in
//! its length.

use crate::ast::{Component, Op, Term};
use crate::error::{Error, Result};
use crate::model::UcumModel;
use crate::parser;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::One;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub struct Canonical {
    pub factor: BigRational,
    /// Base unit code (or arbitrary-unit marker) → exponent.
    pub dims: BTreeMap<String, i32>,
    /// True when the expression passed through a special (non-ratio) unit.
    pub special: bool,
}

impl Canonical {
    fn unity() -> Self {
        Self {
            factor: BigRational::one(),
            dims: BTreeMap::new(),
            special: false,
        }
    }

    fn mul_assign(&mut self, other: &Canonical, exponent: i32) {
        self.factor *= rat_pow(&other.factor, exponent);
        for (dim, exp) in &other.dims {
            let entry = self.dims.entry(dim.clone()).or_insert(0);
            *entry += exp * exponent;
            if *entry == 0 {
                self.dims.remove(dim);
            }
        }
        self.special |= other.special;
    }

    /// The dimension vectors alone decide comparability.
    pub fn comparable_with(&self, other: &Canonical) -> bool {
        self.dims == other.dims
    }
}

pub fn rat_pow(base: &BigRational, exponent: i32) -> BigRational {
    if exponent == 0 {
        return BigRational::one();
    }
    let n = base.numer().pow(exponent.unsigned_abs());
    let d = base.denom().pow(exponent.unsigned_abs());
    if exponent > 0 {
        BigRational::new(n, d)
    } else {
        BigRational::new(d, n)
    }
}

/// Pre-expanded canonical forms for every defined unit in the model.
#[derive(Debug, Default)]
pub struct Registry {
    canonicals: HashMap<String, Canonical>,
}

impl Registry {
    pub fn build(model: &UcumModel) -> Result<Self> {
        let mut registry = Registry::default();
        let mut in_progress = HashSet::new();
        for unit in &model.units {
            resolve_unit(model, &mut registry, &mut in_progress, &unit.code)?;
        }
        Ok(registry)
    }

    fn canonical_for_symbol(&self, model: &UcumModel, code: &str) -> Result<Canonical> {
        if model.base_unit(code).is_some() {
            let mut c = Canonical::unity();
            c.dims.insert(code.to_string(), 1);
            return Ok(c);
        }
        self.canonicals
            .get(code)
            .cloned()
            .ok_or_else(|| Error::UnknownUnit(code.to_string()))
    }

    /// Reduce a parsed term to its canonical form.
    pub fn canonicalize(&self, model: &UcumModel, term: &Term) -> Result<Canonical> {
        let mut result = Canonical::unity();
        for (op, component) in &term.components {
            let sign = match op {
                Op::Mul => 1,
                Op::Div => -1,
            };
            match component {
                Component::Annotation(_) => {}
                Component::Factor(value, exponent) => {
                    let base = BigRational::from_integer(BigInt::from(*value));
                    result.factor *= rat_pow(&base, exponent * sign);
                }
                Component::Group(inner, exponent) => {
                    let c = self.canonicalize(model, inner)?;
                    result.mul_assign(&c, exponent * sign);
                }
                Component::Symbol(symbol) => {
                    let mut c = self.canonical_for_symbol(model, &symbol.unit)?;
                    if let Some(prefix) = &symbol.prefix {
                        let p = model
                            .prefix(prefix)
                            .ok_or_else(|| Error::UnknownUnit(prefix.clone()))?;
                        c.factor *= p.value.to_rational();
                    }
                    result.mul_assign(&c, symbol.exponent * sign);
                }
            }
        }
        Ok(result)
    }

    /// Render the canonical base-unit expression (`m.s-1`), base units in
    /// model declaration order.
    pub fn render(&self, model: &UcumModel, canonical: &Canonical) -> String {
        let mut out = String::new();
        let mut remaining = canonical.dims.clone();
        for base in &model.base_units {
            if let Some(exp) = remaining.remove(&base.code) {
                push_dim(&mut out, &base.code, exp);
            }
        }
        // Arbitrary-unit markers are not base units but still carry dims.
        for (code, exp) in remaining {
            push_dim(&mut out, &code, exp);
        }
        if out.is_empty() {
            out.push('1');
        }
        out
    }
}

fn push_dim(out: &mut String, code: &str, exp: i32) {
    if exp == 0 {
        return;
    }
    if !out.is_empty() {
        out.push('.');
    }
    out.push_str(code);
    if exp != 1 {
        out.push_str(&exp.to_string());
    }
}

fn resolve_unit(
    model: &UcumModel,
    registry: &mut Registry,
    in_progress: &mut HashSet<String>,
    code: &str,
) -> Result<Canonical> {
    if let Some(c) = registry.canonicals.get(code) {
        return Ok(c.clone());
    }
    if !in_progress.insert(code.to_string()) {
        return Err(Error::NoCanonicalForm(code.to_string()));
    }

    let unit = model
        .unit(code)
        .ok_or_else(|| Error::UnknownUnit(code.to_string()))?;

    let canonical = if unit.arbitrary {
        // Arbitrary units are commensurable only with themselves; give each
        // its own marker dimension unless it aliases another arbitrary unit.
        if model.unit(&unit.value.unit).is_some_and(|u| u.arbitrary) {
            resolve_unit(model, registry, in_progress, &unit.value.unit.clone())?
        } else {
            let mut c = Canonical::unity();
            c.dims.insert(unit.code.clone(), 1);
            c
        }
    } else if let Some((_, scale, function_unit)) = unit.value.function.clone() {
        let term = parser::parse(model, &function_unit)?;
        let mut c = resolve_term(model, registry, in_progress, &term)?;
        c.factor *= scale.to_rational();
        c.special = true;
        c
    } else {
        let term = parser::parse(model, &unit.value.unit)?;
        let mut c = resolve_term(model, registry, in_progress, &term)?;
        if let Some(value) = &unit.value.value {
            c.factor *= value.to_rational();
        }
        c
    };

    in_progress.remove(code);
    registry
        .canonicals
        .insert(code.to_string(), canonical.clone());
    Ok(canonical)
}

/// Like `Registry::canonicalize`, but resolves through units that are not
/// yet cached (used only during registry construction).
fn resolve_term(
    model: &UcumModel,
    registry: &mut Registry,
    in_progress: &mut HashSet<String>,
    term: &Term,
) -> Result<Canonical> {
    let mut result = Canonical::unity();
    for (op, component) in &term.components {
        let sign = match op {
            Op::Mul => 1,
            Op::Div => -1,
        };
        match component {
            Component::Annotation(_) => {}
            Component::Factor(value, exponent) => {
                let base = BigRational::from_integer(BigInt::from(*value));
                result.factor *= rat_pow(&base, exponent * sign);
            }
            Component::Group(inner, exponent) => {
                let c = resolve_term(model, registry, in_progress, inner)?;
                result.mul_assign(&c, exponent * sign);
            }
            Component::Symbol(symbol) => {
                let mut c = if model.base_unit(&symbol.unit).is_some() {
                    let mut c = Canonical::unity();
                    c.dims.insert(symbol.unit.clone(), 1);
                    c
                } else {
                    resolve_unit(model, registry, in_progress, &symbol.unit.clone())?
                };
                if let Some(prefix) = &symbol.prefix {
                    let p = model
                        .prefix(prefix)
                        .ok_or_else(|| Error::UnknownUnit(prefix.clone()))?;
                    c.factor *= p.value.to_rational();
                }
                result.mul_assign(&c, symbol.exponent * sign);
            }
        }
    }
    Ok(result)
}
