//! Fehlertypen fuer den Session-Service

use fluester_auth::AuthError;
use fluester_core::types::TransferId;
use fluester_crypto::CryptoError;
use fluester_store::StoreError;
use thiserror::Error;

/// Fehlertyp fuer den Session-Service
///
/// Verbindungsfatale Fehler (IO, Krypto, Protokoll) beenden nur die
/// betroffene Verbindung, nie den Serverprozess. Transfer-Fehler
/// (`DateiZuGross`, `TransferUnbekannt`, `TransferZustand`) werden dem
/// Client als Fehler-Nachricht gemeldet und die Verbindung lebt weiter.
#[derive(Debug, Error)]
pub enum SessionError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Authentifizierungsfehler
    #[error("Authentifizierungsfehler: {0}")]
    Auth(#[from] AuthError),

    /// Kryptografiefehler (Versiegeln/Oeffnen fehlgeschlagen)
    #[error("Kryptografiefehler: {0}")]
    Krypto(#[from] CryptoError),

    /// Persistenzfehler (Credential- oder Key-Store)
    #[error("Speicherfehler: {0}")]
    Speicher(#[from] StoreError),

    /// Protokollfehler (ungueltiges Frame, falscher Zustand)
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    /// Verbindung wurde getrennt
    #[error("Verbindung getrennt")]
    VerbindungGetrennt,

    /// Server ist voll
    #[error("Server ist voll")]
    ServerVoll,

    /// Senden an Client fehlgeschlagen (Queue geschlossen)
    #[error("Senden fehlgeschlagen")]
    SendFehler,

    /// Timeout (Keepalive)
    #[error("Timeout")]
    Timeout,

    /// Angebotene Datei ueberschreitet das konfigurierte Maximum
    #[error("Datei zu gross: {groesse} Bytes (Maximum: {maximum} Bytes)")]
    DateiZuGross { groesse: u64, maximum: u64 },

    /// Transfer-ID ist unbekannt oder bereits abgelaufen
    #[error("Unbekannter Transfer: {0}")]
    TransferUnbekannt(TransferId),

    /// Operation passt nicht zum aktuellen Transfer-Zustand
    #[error("Ungueltiger Transfer-Zustand: {0}")]
    TransferZustand(String),

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl SessionError {
    /// Erstellt einen internen Fehler
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Erstellt einen Protokollfehler
    pub fn protokoll(msg: impl Into<String>) -> Self {
        Self::Protokoll(msg.into())
    }

    /// Beendet dieser Fehler die Verbindung?
    ///
    /// Transfer-Fehler werden als Fehler-Nachricht beantwortet und die
    /// Verbindung bleibt offen; alles andere ist verbindungsfatal.
    pub fn ist_verbindungsfatal(&self) -> bool {
        !matches!(
            self,
            Self::DateiZuGross { .. }
                | Self::TransferUnbekannt(_)
                | Self::TransferZustand(_)
        )
    }
}

/// Result-Typ fuer den Session-Service
pub type SessionResult<T> = Result<T, SessionError>;
