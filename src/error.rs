//! Failure classes that drive pipeline control flow.
//!
//! Row-level problems never become errors here: they are counted into
//! [`crate::model::ImportRunStats`] and the chunk moves on. Guard stops are a
//! normal engine outcome, not a failure. What remains is the transport class
//! (no file this run, supplier ends with zero stats) and the storage class
//! (abort this supplier, let the orchestrator continue).

use thiserror::Error;

use crate::feed::fetch::FetchError;

#[derive(Debug, Error)]
pub enum ImportError {
    /// The fetch stage could not produce a usable file: missing
    /// configuration, connect/auth trouble, not-found or an empty transfer.
    #[error("feed transport: {0}")]
    Transport(#[from] FetchError),

    /// A bulk read or write against the catalog store failed. Nothing more
    /// is persisted for this supplier; already-committed chunks stand.
    #[error("catalog persistence: {0}")]
    Persistence(anyhow::Error),
}

impl ImportError {
    /// True when the failure is a configuration gap rather than something
    /// that broke mid-flight. Configuration gaps report as skipped suppliers.
    pub fn is_config_gap(&self) -> bool {
        matches!(
            self,
            ImportError::Transport(FetchError::MissingConfig(_))
                | ImportError::Transport(FetchError::Unsupported { .. })
        )
    }
}
