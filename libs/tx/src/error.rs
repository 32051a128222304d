use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Structural and programmer errors. Not-found outcomes are returned as
/// values (`LocateResult`), never through this type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not supported")]
    NotSupported,

    #[error("The code system {system} does not have a filter {property} {op} {value}")]
    FilterNotSupported {
        system: String,
        property: String,
        op: String,
        value: String,
    },

    #[error("The code system {0} does not have parents")]
    NoParents(String),

    #[error("wrong concept context type passed to the {0} provider")]
    WrongContext(&'static str),

    #[error("wrong filter set type passed to the {0} provider")]
    WrongFilter(&'static str),

    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),

    #[error("invalid supplement: {0}")]
    InvalidSupplement(String),

    #[error("remote validation timed out after {0} seconds")]
    Timeout(u64),

    #[error("remote validation failed: {0}")]
    Remote(String),

    #[error(transparent)]
    Model(#[from] terminus_models::Error),

    #[error(transparent)]
    Snomed(#[from] terminus_snomed::Error),

    #[error(transparent)]
    Ucum(#[from] terminus_ucum::Error),

    #[error(transparent)]
    Langs(#[from] terminus_langs::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Internal(String),
}
