use thiserror::Error;

/// Errors surfaced by shape inference, graph edits, passes, and evaluation.
///
/// Compile-time failures (`InvalidShape`, `Edge`, `Pass`) are never silently
/// recovered; they propagate to the caller of `compile`/`eval`. A matcher
/// that fails to match is not an error.
#[derive(Debug, Error)]
pub enum Error {
    /// Shape inference rejected its inputs.
    #[error("{op}: {reason}")]
    InvalidShape { op: String, reason: String },

    /// A graph edit would violate program invariants.
    #[error("graph edit failed: {0}")]
    Edge(String),

    /// The operator has no compute overload usable at this call site.
    #[error("{}", not_computable_message(.op, .needs_context))]
    NotComputable { op: String, needs_context: bool },

    /// A structural cast to the wrong concrete operator type.
    #[error("operator is not a {expected}")]
    BadCast { expected: &'static str },

    /// A pass failed; wraps the underlying error with the pass name.
    #[error("pass {pass} failed: {source}")]
    Pass {
        pass: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// A compute failed at execution time.
    #[error("{op}: {reason}")]
    Runtime { op: String, reason: String },
}

fn not_computable_message(op: &str, needs_context: &bool) -> String {
    if *needs_context {
        format!("{op} is not computable without a context")
    } else {
        format!("{op} is not computable")
    }
}

impl Error {
    pub(crate) fn invalid_shape(op: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidShape {
            op: op.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn edge(reason: impl Into<String>) -> Self {
        Error::Edge(reason.into())
    }

    pub(crate) fn runtime(op: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Runtime {
            op: op.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
