//! Fehlertypen fuer den Auth-Service

use thiserror::Error;

/// Alle moeglichen Fehler im Auth-Handshake
///
/// `ProofFalsch` ist absichtlich die einzige Ablehnungs-Variante:
/// unbekannter Benutzer, falsches Passwort und ungueltige Proof-Laenge
/// sind fuer den Client nicht unterscheidbar.
#[derive(Debug, Error)]
pub enum AuthError {
    // --- Authentifizierung ---
    #[error("Proof stimmt nicht ueberein")]
    ProofFalsch,

    // --- Persistenz ---
    #[error("Store-Fehler: {0}")]
    Store(#[from] fluester_store::StoreError),

    // --- Krypto ---
    #[error("Krypto-Fehler: {0}")]
    Krypto(#[from] fluester_crypto::CryptoError),
}

impl AuthError {
    /// Eine Ablehnung beendet die Verbindung; Infrastrukturfehler
    /// werden als interner Fehler gemeldet, nie als Ablehnung
    pub fn ist_ablehnung(&self) -> bool {
        matches!(self, Self::ProofFalsch)
    }
}

/// Result-Alias fuer den Auth-Service
pub type AuthResult<T> = Result<T, AuthError>;
