#![forbid(unsafe_code)]

//! UCUM (Unified Code for Units of Measure) engine.
//!
//! Loads the UCUM essence model, parses unit expressions, and provides
//! canonical forms, conversion, compatibility testing, and analysis. All
//! numeric work runs on an exact, precision-tracked [`Decimal`].

mod ast;
mod canonical;
mod decimal;
mod error;
mod model;
mod parser;
mod service;

use once_cell::sync::Lazy;

pub use ast::{Component, Op, Symbol, Term};
pub use canonical::Canonical;
pub use decimal::Decimal;
pub use error::{Error, Result};
pub use model::{BaseUnit, DefinedUnit, Prefix, UcumModel};
pub use service::{ConceptKind, Pair, SearchResult, UcumService};

static UCUM_SERVICE: Lazy<UcumService> = Lazy::new(|| {
    UcumService::from_essence_xml(include_str!("ucum-essence.xml"))
        .expect("failed to load embedded ucum-essence.xml")
});

/// The process-wide service over the embedded essence file.
pub fn shared() -> &'static UcumService {
    &UCUM_SERVICE
}

/// Parse a unit expression against the embedded model.
pub fn parse(expr: &str) -> Result<Term> {
    parser::parse(shared().model(), expr)
}

/// Validate a unit expression against the embedded model.
pub fn validate(expr: &str) -> Option<String> {
    shared().validate(expr)
}
