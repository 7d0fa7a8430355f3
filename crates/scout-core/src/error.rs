use scout_error::ErrorCode;

/// Errors raised by the domain model itself (as opposed to a storage or
/// network layer). Kept separate from [`scout_error::ScoutError`] so callers
/// can match on concrete variants; `.code()` maps each variant into the
/// shared taxonomy for logging and wire responses.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A URL failed to parse or canonicalize.
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Why parsing failed.
        reason: String,
    },
    /// A status transition violated the monotonic stage ordering invariant.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// The status being left.
        from: String,
        /// The status being entered.
        to: String,
    },
}

impl CoreError {
    /// The stable error code this variant maps to.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidUrl { .. } => ErrorCode::CoreInvalidUrl,
            Self::InvalidTransition { .. } => ErrorCode::CoreInvalidTransition,
        }
    }
}
