//! Fehlertypen fuer das Store-Crate

use thiserror::Error;

/// Store-Fehlertypen
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Beschaedigter Eintrag: {0}")]
    Beschaedigt(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
