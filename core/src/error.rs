use std::path::PathBuf;

use thiserror::Error;

use crate::document::DocumentKind;
use crate::validate::ValidationError;

/// Failure of an export or import call.
///
/// `Decode` and `Reconciliation` deliberately keep their details out of the
/// display message; the underlying cause is still reachable via `source()`
/// for logging.
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("cannot access {}: {source}", .path.display())]
    Transport {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid file: not a valid {kind} document")]
    Decode {
        kind: DocumentKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("rejected: {0}")]
    Validation(#[from] ValidationError),

    #[error("import failed; no changes were made")]
    Reconciliation(#[source] anyhow::Error),

    #[error("failed to read local data: {0:#}")]
    Store(#[source] anyhow::Error),

    #[error("diet {0} not found")]
    DietNotFound(i64),
}

impl ExchangeError {
    pub(crate) fn transport(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExchangeError::Transport {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExchangeError>;
