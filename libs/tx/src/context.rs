//! Per-operation context: the request's display language preferences.

use terminus_langs::Languages;

/// Immutable per-request state, shared by every provider the request
/// touches.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    pub langs: Languages,
}

impl OperationContext {
    pub fn new(langs: Languages) -> Self {
        Self { langs }
    }

    /// Build from an `Accept-Language` header value.
    pub fn from_accept_language(header: &str) -> terminus_langs::Result<Self> {
        Ok(Self {
            langs: Languages::from_accept_language(header)?,
        })
    }

    /// No language preference: English or nothing.
    pub fn english() -> Self {
        Self::default()
    }
}
