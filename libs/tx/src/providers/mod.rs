//! One module per code system.

pub mod area;
pub mod bcp47;
pub mod country;
mod country_data;
pub mod cpt;
pub mod fhir;
pub mod hgvs;
pub mod loinc;
pub mod mime;
pub mod ndc;
pub mod omop;
pub mod snomed;
pub mod ucum;
pub mod unii;
pub mod uri;
