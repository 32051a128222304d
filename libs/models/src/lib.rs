//! FHIR terminology resource models.
//!
//! Strongly-typed CodeSystem resources (R3/R4/R5 intake, JSON or XML) plus
//! the derived [`CodeSystemDocument`] view: flattened concepts, code map,
//! and parent/child/ancestor/descendant closures.

pub mod code_system;
pub mod document;
pub mod error;

pub use code_system::{
    CodeSystem, CodeSystemConcept, CodeSystemConceptProperty, CodeSystemContentMode,
    CodeSystemFilter, CodeSystemProperty, Coding, ConceptDesignation, PublicationStatus,
};
pub use document::{CodeSystemDocument, ConceptIndex};
pub use error::{Error, Result};
