//! Authorization error types.
//!
//! Every failure reaching a caller is one of these variants wrapped in a
//! `rootcause::Report`. Remote faults are classified once, where the
//! engine response is translated, and are not re-wrapped afterwards.

use std::fmt;

/// Why an operation stopped before the engine answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller's cancellation token fired.
    Cancelled,
    /// The call's deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled by caller"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Authorization errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// Malformed identifier, detected locally. Nothing was sent.
    InvalidInput {
        /// Which input was rejected (e.g. "subject", "relation").
        field: &'static str,
        /// Error details.
        details: String,
    },
    /// The client could not be constructed.
    Configuration {
        /// Error details.
        details: String,
    },
    /// A revoke targeted a tuple that does not exist.
    TupleNotFound {
        /// The tuple in `subject relation object` form.
        tuple: String,
    },
    /// The engine evaluated the request and rejected it.
    RemoteFault {
        /// Engine-provided error code, if any.
        code: String,
        /// HTTP status returned by the engine (0 for non-HTTP engines).
        status: u16,
        /// Error details.
        details: String,
    },
    /// The engine could not be reached or its reply could not be read.
    TransportFault {
        /// Error details, including the source chain.
        details: String,
    },
    /// The operation was cancelled or ran out of time.
    Cancelled {
        /// What stopped it.
        reason: CancelReason,
    },
    /// A `require` check evaluated to "no relation".
    PermissionDenied {
        /// The subject that was checked.
        subject: String,
        /// The relation that was required.
        relation: String,
        /// The object that was checked.
        object: String,
    },
}

impl AuthzError {
    /// Creates an input validation error.
    pub(crate) fn invalid(field: &'static str, details: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            details: details.into(),
        }
    }

    /// Whether retrying the same call could succeed.
    ///
    /// Only a hint: the client never retries, and a retried `revoke` or
    /// `check` must still be judged against the consistency level in use.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransportFault { .. } => true,
            Self::RemoteFault { status, .. } => matches!(status, 429 | 500..=599),
            _ => false,
        }
    }
}

impl fmt::Display for AuthzError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput { field, details } => {
                write!(f, "invalid {field}: {details}")
            }
            Self::Configuration { details } => {
                write!(f, "authorization client configuration error: {details}")
            }
            Self::TupleNotFound { tuple } => {
                write!(f, "relationship tuple not found: {tuple}")
            }
            Self::RemoteFault {
                code,
                status,
                details,
            } => {
                if code.is_empty() {
                    write!(f, "authorization engine error (status {status}): {details}")
                } else {
                    write!(
                        f,
                        "authorization engine error '{code}' (status {status}): {details}"
                    )
                }
            }
            Self::TransportFault { details } => {
                write!(f, "failed to reach authorization engine: {details}")
            }
            Self::Cancelled { reason } => {
                write!(f, "authorization call stopped: {reason}")
            }
            Self::PermissionDenied {
                subject,
                relation,
                object,
            } => {
                write!(f, "{subject} does not have '{relation}' on {object}")
            }
        }
    }
}

impl std::error::Error for AuthzError {}

/// Renders an error followed by each of its sources, separated by `: `.
pub(crate) fn source_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut current = err.source();
    while let Some(source) = current {
        let next = source.to_string();
        if !text.ends_with(&next) {
            text.push_str(": ");
            text.push_str(&next);
        }
        current = source.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Outer(std::io::Error);

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "request failed")
        }
    }

    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn remote_fault_display_includes_code() {
        let err = AuthzError::RemoteFault {
            code: "relation_not_found".to_string(),
            status: 400,
            details: "relation 'doc#edit' not found".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("relation_not_found"));
        assert!(text.contains("400"));
    }

    #[test]
    fn retryable_classification() {
        let transport = AuthzError::TransportFault {
            details: "connection refused".to_string(),
        };
        let throttled = AuthzError::RemoteFault {
            code: String::new(),
            status: 429,
            details: "slow down".to_string(),
        };
        let invalid = AuthzError::RemoteFault {
            code: "validation_error".to_string(),
            status: 400,
            details: "bad".to_string(),
        };
        assert!(transport.is_retryable());
        assert!(throttled.is_retryable());
        assert!(!invalid.is_retryable());
        assert!(
            !AuthzError::Cancelled {
                reason: CancelReason::DeadlineExceeded
            }
            .is_retryable()
        );
    }

    #[test]
    fn source_chain_joins_causes() {
        let err = Outer(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert_eq!(source_chain(&err), "request failed: connection refused");
    }

    #[test]
    fn cancelled_display_names_reason() {
        let err = AuthzError::Cancelled {
            reason: CancelReason::DeadlineExceeded,
        };
        assert!(err.to_string().contains("deadline exceeded"));
    }
}
