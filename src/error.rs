use crate::model::Kind;

/// Failure taxonomy for scraping and the entity graph.
///
/// `ShapeMismatch` is a programming-contract violation and additionally trips a
/// `debug_assert!` at the merge site. `UnresolvedReference` is recoverable: the
/// target may simply not have been scraped yet.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot merge {kind} under key '{expected}': candidate has key '{got}'")]
    ShapeMismatch {
        kind: Kind,
        expected: String,
        got: String,
    },

    #[error("unresolved {kind} reference '{key}'")]
    UnresolvedReference { kind: Kind, key: String },

    #[error("malformed {page} page, field '{field}': {reason}")]
    MalformedPage {
        page: &'static str,
        field: &'static str,
        reason: String,
    },

    #[error("request to module '{module}' failed with status {status}")]
    ExternalRequestFailure { module: String, status: u16 },

    #[error("module '{0}' requires an authenticated session")]
    AuthRequired(String),

    #[error("request to module '{module}' failed: {source}")]
    Transport {
        module: String,
        #[source]
        source: reqwest::Error,
    },
}

impl Error {
    pub fn malformed(page: &'static str, field: &'static str, reason: impl Into<String>) -> Self {
        Error::MalformedPage {
            page,
            field,
            reason: reason.into(),
        }
    }
}
