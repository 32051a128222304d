use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("resource is not a CodeSystem (found '{0}')")]
    WrongResourceType(String),

    #[error("invalid CodeSystem resource: {0}")]
    InvalidResource(String),

    #[error("duplicate concept code '{0}'")]
    DuplicateCode(String),

    #[error("concept '{code}' references unknown parent '{parent}'")]
    UnknownParent { code: String, parent: String },

    #[error("hierarchy cycle involving concept '{0}'")]
    HierarchyCycle(String),

    #[error(transparent)]
    Format(#[from] terminus_format::FormatError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
