//! Fehlertypen fuer Fluester
//!
//! Zentraler Fehler-Enum der alle moeglichen Fehlerzustaende abdeckt.
//! Untermodule koennen eigene Fehler definieren und via `#[from]` konvertieren.
//!
//! Ausbreitungsregeln:
//! - TCP-seitige Fehler schliessen nur die betroffene Verbindung, nie den Prozess.
//! - UDP-seitige Fehler erzeugen niemals eine Antwort (kein Amplifikations-Orakel).
//! - Speicherfehler brechen eine laufende Authentifizierung ab, bevor ein
//!   `auth_ok` mit unpersistiertem Zustand bestaetigt wird.

use thiserror::Error;

/// Globaler Result-Alias fuer Fluester
pub type Result<T> = std::result::Result<T, FluesterError>;

/// Alle moeglichen Fehler im Fluester-System
#[derive(Debug, Error)]
pub enum FluesterError {
    // --- Verbindung & Netzwerk ---
    #[error("Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("Verbindung getrennt: {0}")]
    Getrennt(String),

    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),

    // --- Protokoll ---
    #[error("Protokollverletzung: {0}")]
    Protokollverletzung(String),

    // --- Authentifizierung ---
    #[error("Authentifizierung fehlgeschlagen: {0}")]
    Authentifizierung(String),

    // --- Kryptografie ---
    #[error("Kryptografiefehler: {0}")]
    Krypto(String),

    // --- Ressourcen-Limits ---
    #[error("Frame zu gross: {laenge} Bytes (Maximum: {maximum} Bytes)")]
    FrameZuGross { laenge: usize, maximum: usize },

    #[error("Datei zu gross: {groesse} Bytes (Maximum: {maximum} Bytes)")]
    DateiZuGross { groesse: u64, maximum: u64 },

    #[error("Datagramm zu gross: {laenge} Bytes (Maximum: {maximum} Bytes)")]
    DatagrammZuGross { laenge: usize, maximum: usize },

    #[error("Unvollstaendiger Transfer: {erhalten} von {erwartet} Bytes")]
    UnvollstaendigerTransfer { erhalten: u64, erwartet: u64 },

    #[error("Server voll: maximale Clientanzahl erreicht")]
    ServerVoll,

    // --- Benutzer ---
    #[error("Unbekannter Benutzer: {0}")]
    BenutzerUnbekannt(String),

    // --- Persistenz ---
    #[error("Speicherfehler: {0}")]
    Speicher(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl FluesterError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler die Verbindung beendet.
    ///
    /// Ressourcen-Limits (Datei/Datagramm zu gross) ueberleben am
    /// jeweiligen Pruefpunkt; alles andere ist verbindungsfatal.
    pub fn ist_verbindungsfatal(&self) -> bool {
        !matches!(
            self,
            Self::DateiZuGross { .. }
                | Self::DatagrammZuGross { .. }
                | Self::BenutzerUnbekannt(_)
        )
    }

    /// Gibt true zurueck wenn der Fehler wiederholbar sein koennte
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(
            self,
            Self::Zeitlimit(_) | Self::Verbindung(_) | Self::Getrennt(_)
        )
    }
}
