//! SNOMED CT support: the packed binary cache format and the Compositional
//! Grammar expression engine.
//!
//! The cache is a read-only arena: [`CacheFile`] memory-maps the file and
//! exposes the tables as typed views borrowing the buffer. Expressions are
//! parsed, validated, compared, and rendered by the `expressions` and
//! `services` modules.

pub mod builder;
pub mod cache;
pub mod error;
pub mod expressions;
pub mod services;

pub use builder::CacheBuilder;
pub use cache::{
    CacheFile, ConceptRecord, DescriptionKind, DescriptionRecord, RelationshipRecord,
    CONCEPT_MODEL_ATTRIBUTE_ID, IS_A_ID, ROOT_CONCEPT_ID,
};
pub use error::{Error, Result};
pub use expressions::{
    parse_expression, Expression, ExpressionConcept, ExpressionStatus, Refinement,
    RefinementGroup, RenderOption,
};
pub use services::{ExpressionContext, ExpressionServices};
