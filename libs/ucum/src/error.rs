use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("'{0}' is not a valid decimal")]
    InvalidDecimal(String),

    #[error("Attempt to divide {0} by zero")]
    DivideByZero(String),

    #[error("Error processing {expr}: {message} at character {pos}")]
    Syntax {
        expr: String,
        pos: usize,
        message: String,
    },

    #[error("The unit '{0}' is unknown")]
    UnknownUnit(String),

    #[error("The unit '{0}' does not allow a metric prefix")]
    NotPrefixable(String),

    #[error("unable to find a canonical form for {0}")]
    NoCanonicalForm(String),

    #[error("units are not comparable: '{from}' and '{to}'")]
    NotComparable { from: String, to: String },

    #[error("temperature conversions with offset not supported by this path")]
    OffsetConversion,

    #[error("error loading ucum-essence: {0}")]
    Model(String),

    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),
}
