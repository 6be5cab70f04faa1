//! Error type shared by the projection engine.

use thiserror::Error;

use crate::manager::ProjectionId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Errors produced by projection documents, the master document and the manager.
pub enum ProjectionError {
    #[error("invalid range {offset}+{length} for a document of length {document_length}")]
    /// A range does not lie inside the addressed document.
    BadLocation {
        /// Range start (characters).
        offset: usize,
        /// Range length (characters).
        length: usize,
        /// Length of the addressed document (characters).
        document_length: usize,
    },

    #[error("master range {offset}+{length} is not fully projected")]
    /// A master range expected to be projected lies (partly) in a hidden gap.
    NotProjected {
        /// Master offset.
        offset: usize,
        /// Master length.
        length: usize,
    },

    #[error("master range {offset}+{length} overlaps an existing fragment")]
    /// A range that must not overlap existing fragments does.
    OverlapsFragment {
        /// Master offset.
        offset: usize,
        /// Master length.
        length: usize,
    },

    #[error("range addition did not settle within {limit} iterations")]
    /// The add-range loop hit its safety bound (listener feedback).
    SafetyLimitExceeded {
        /// The iteration bound that was exceeded.
        limit: usize,
    },

    #[error("a master document change is being delivered")]
    /// A structural change was requested while a master content change was in flight.
    ChangeInProgress,

    #[error("projection document has been disposed")]
    /// The projection document was disposed.
    Disposed,

    #[error("unknown projection {0:?}")]
    /// A manager lookup failed.
    ProjectionNotFound(ProjectionId),

    #[error("internal consistency violation: {0}")]
    /// Registry invariants were broken. The projection is unusable afterwards.
    Internal(String),
}

impl ProjectionError {
    /// Returns `true` for errors caused by the caller's arguments (including the safety bound).
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::BadLocation { .. }
                | Self::NotProjected { .. }
                | Self::OverlapsFragment { .. }
                | Self::SafetyLimitExceeded { .. }
        )
    }

    /// Returns `true` for consistency violations.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
