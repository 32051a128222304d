//! Terminology service core: the uniform provider contract, one provider
//! per code system, and the factory registry that owns shared read-only
//! state.
//!
//! Callers obtain a [`CodeSystemProvider`] from a [`factory::FactoryRegistry`]
//! (binding an [`OperationContext`] and zero or more supplements), then
//! drive read-only operations: locate, display and designations, hierarchy
//! and subsumption, iteration, and prepared filter sets.

pub mod context;
pub mod error;
pub mod factory;
pub mod filter;
pub mod provider;
pub mod providers;
pub mod supplements;

pub use context::OperationContext;
pub use error::{Error, Result};
pub use factory::{FactoryRegistry, ProviderFactory};
pub use filter::{CodeFilter, FilterContext, KeyFilter, PreparedFilter};
pub use provider::{
    CodeSystemProvider, ConceptContext, ConceptIter, ConceptProperty, Designation, FilterOperator,
    LocateResult, LookupResult, PropertyDefinition, SubsumptionOutcome,
};
