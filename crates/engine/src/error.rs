use waifu_core::error::CoreError;
use waifu_core::ports::{CatalogError, StoreError};

/// Failure of a game operation.
///
/// Only hard failures live here. Lost races, rate limits, refunds and
/// wrong-user clicks are ordinary results of the operation that produced
/// them.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Domain-level error (token parsing, validation, authorization).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The persistent store failed. Nothing was granted.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The character catalog or its cache failed. Nothing was granted.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl EngineError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        EngineError::Core(CoreError::NotFound {
            entity,
            id: id.to_string(),
        })
    }

    pub(crate) fn forbidden(msg: impl Into<String>) -> Self {
        EngineError::Core(CoreError::Forbidden(msg.into()))
    }

    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Store(_)
                | EngineError::Catalog(_)
                | EngineError::Core(CoreError::Unavailable(_))
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
