//! Error types for the decision procedure

use crate::jst::Jst;
use crate::theory::TheoryId;
use thiserror::Error;

/// Main error type for engine operations
///
/// Semantic outcomes (`Inconsistent`) travel as errors internally but are
/// converted to `Status` values at the top of `Context::add`; they never
/// escape the public API. `Unsolvable` is caught by the combination engine
/// and handled by the name-both-sides fallback. `InvalidArgument` is a
/// caller contract violation and aborts the whole call.
#[derive(Error, Debug, Clone)]
pub enum KanonError {
    #[error("context is inconsistent")]
    Inconsistent { jst: Jst },

    #[error("equation not solvable in theory {theory}")]
    Unsolvable { theory: TheoryId },

    #[error("partial evaluation: {message}")]
    Partial { message: String },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl KanonError {
    /// Create an inconsistency carrying the implicated input atoms
    pub fn inconsistent(jst: Jst) -> Self {
        Self::Inconsistent { jst }
    }

    pub fn unsolvable(theory: TheoryId) -> Self {
        Self::Unsolvable { theory }
    }

    /// Create a partial-evaluation error (randomized checker only)
    pub fn partial(message: impl Into<String>) -> Self {
        Self::Partial {
            message: message.into(),
        }
    }

    /// Create a contract-violation error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// The justification of an inconsistency, if this is one
    pub fn jst(&self) -> Option<&Jst> {
        match self {
            Self::Inconsistent { jst } => Some(jst),
            _ => None,
        }
    }
}

/// Result type alias for engine operations
pub type KanonResult<T> = Result<T, KanonError>;
