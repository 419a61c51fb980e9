use serde::{Deserialize, Serialize};

/// Closed classification of every failure that crosses a component
/// boundary.
///
/// Each component error type maps into exactly one kind via [`Classify`];
/// the HTTP boundary translates kinds to status codes once, so no error
/// type anywhere carries transport concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed request. Never retried.
    Validation,

    /// A referenced order, product, or payment does not exist. Never retried.
    NotFound,

    /// The request is well-formed but violates a business rule
    /// (insufficient stock, cancel-after-ship, refund of a non-completed
    /// payment). The caller must change intent, not retry.
    BusinessRule,

    /// A concurrent writer won the race. The loser re-reads before
    /// retrying; it must not blindly overwrite.
    Conflict,

    /// A downstream collaborator was unreachable or timed out. Retried
    /// with bounded backoff before being escalated to a terminal failure.
    DownstreamUnavailable,

    /// Unexpected internal fault. Compensated, then surfaced.
    Internal,
}

impl ErrorKind {
    /// True for kinds that a bounded-backoff retry may resolve.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::DownstreamUnavailable)
    }

    /// Stable machine-readable code surfaced to callers.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::BusinessRule => "BUSINESS_RULE",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::DownstreamUnavailable => "DOWNSTREAM_UNAVAILABLE",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Maps a component error into the closed [`ErrorKind`] taxonomy.
pub trait Classify {
    /// Returns the kind this error belongs to.
    fn kind(&self) -> ErrorKind;
}
