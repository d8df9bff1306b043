//! Gemeinsame Identifikationstypen fuer Fluester
//!
//! Benutzer werden im gesamten System ueber ihren Namen adressiert
//! (Stores, Roster, UDP-Datagramm-Tag). Das Newtype-Pattern haelt
//! Benutzernamen und Transfer-IDs zur Compilezeit auseinander.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximale Laenge eines Benutzernamens in Bytes (UTF-8)
pub const MAX_USERNAME_BYTES: usize = 64;

/// Eindeutiger Benutzername – der Schluessel fuer Credential-Store,
/// Key-Store, Roster und UDP-Adressierung
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    /// Erstellt einen validierten Benutzernamen.
    ///
    /// Leere Namen, Namen ueber [`MAX_USERNAME_BYTES`] und Namen mit
    /// Steuerzeichen werden abgelehnt – solche Werte wuerden spaeter
    /// das Datagramm-Tag oder die Store-Schluessel korrumpieren.
    pub fn neu(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(crate::FluesterError::Protokollverletzung(
                "Leerer Benutzername".into(),
            ));
        }
        if name.len() > MAX_USERNAME_BYTES {
            return Err(crate::FluesterError::Protokollverletzung(format!(
                "Benutzername zu lang: {} Bytes (Maximum: {} Bytes)",
                name.len(),
                MAX_USERNAME_BYTES
            )));
        }
        if name.chars().any(|c| c.is_control()) {
            return Err(crate::FluesterError::Protokollverletzung(
                "Benutzername enthaelt Steuerzeichen".into(),
            ));
        }
        Ok(Self(name))
    }

    /// Gibt den Namen als String-Slice zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Gibt die rohen UTF-8-Bytes zurueck (fuer das Datagramm-Tag)
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Eindeutige Transfer-ID fuer Dateiuebertragungen
///
/// Session-gebunden: eine TransferId ist nur innerhalb der Verbindung
/// gueltig, die das zugehoerige `file_offer` gesendet hat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(pub Uuid);

impl TransferId {
    /// Erstellt eine neue zufaellige TransferId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }

    /// Rohdarstellung fuer den binaeren Chunk-Frame-Header
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Rekonstruiert die ID aus dem Chunk-Frame-Header
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "transfer:{}", self.0)
    }
}
