use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unable to read SNOMED cache: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown cache version {found}: expected {expected}")]
    UnknownCacheVersion { found: u8, expected: u8 },

    #[error("SNOMED cache is corrupt: {0}")]
    Corrupt(String),

    #[error("offset {offset} out of range for {table} table (length {len})")]
    OffsetOutOfRange {
        table: &'static str,
        offset: u32,
        len: usize,
    },

    #[error("Error processing expression \"{expr}\": {message} at character {pos}")]
    Syntax {
        expr: String,
        pos: usize,
        message: String,
    },

    #[error("Concept {0} not found in the loaded edition")]
    ConceptNotFound(u64),

    #[error("Concept {0} is inactive and may not be used in an expression")]
    InactiveConcept(u64),

    #[error("Concept {0} is not an attribute and may not be used as a refinement name")]
    NotAnAttribute(u64),
}
