//! Datagramm-Format fuer den UDP-Relay
//!
//! Jedes UDP-Paket nennt im Klartext-Prefix den Inhaber des Schluessels,
//! mit dem der Rest versiegelt ist: beim Client-zu-Relay-Paket ist das
//! der Absender, beim Relay-zu-Client-Paket der Empfaenger. Der Relay
//! braucht den Namen um den Schluessel nachzuschlagen – erst die
//! gelungene Entsiegelung authentifiziert das Paket.
//!
//! ## Paketformat
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       2   Benutzername-Laenge (big-endian u16)
//!  2       N   Benutzername (UTF-8)
//!  2+N    12   Nonce
//! 14+N     M   Ciphertext + Auth-Tag (AES-256-GCM)
//! ```
//!
//! Der versiegelte Inhalt ist das JSON einer [`RelayNachricht`].

use std::io;

use serde::{Deserialize, Serialize};

use fluester_core::types::{Username, MAX_USERNAME_BYTES};
use fluester_crypto::SealedBox;

use crate::control::{ChatMessage, SystemMessage};

/// Maximale Datagramm-Groesse die der Relay annimmt (48 KB)
pub const MAX_DATAGRAMM_BYTES: usize = 48 * 1024;

/// Groesse des Laengen-Prefix fuer den Benutzernamen
pub const NAME_LENGTH_FIELD_SIZE: usize = 2;

// ---------------------------------------------------------------------------
// Datagram
// ---------------------------------------------------------------------------

/// Ein UDP-Paket: Schluessel-Inhaber im Klartext, Inhalt versiegelt
#[derive(Debug, Clone)]
pub struct Datagram {
    /// Inhaber des Siegels – eingehend der behauptete Absender (erst
    /// die Entsiegelung beweist ihn), ausgehend der Empfaenger
    pub benutzer: Username,
    /// Versiegelte [`RelayNachricht`]
    pub sealed: SealedBox,
}

impl Datagram {
    /// Serialisiert das Datagramm in einen Byte-Vec
    pub fn encode(&self) -> Vec<u8> {
        let name = self.benutzer.as_bytes();
        let mut buf =
            Vec::with_capacity(NAME_LENGTH_FIELD_SIZE + name.len() + self.sealed.laenge());
        buf.extend_from_slice(&(name.len() as u16).to_be_bytes());
        buf.extend_from_slice(name);
        buf.extend_from_slice(&self.sealed.to_bytes());
        buf
    }

    /// Deserialisiert ein Datagramm aus einem Byte-Slice
    ///
    /// # Fehler
    /// - `InvalidData` bei zu kurzem Paket, leerem oder ueberlangem
    ///   Namen, ungueltigem UTF-8 oder zu kurzer Versiegelung
    pub fn decode(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < NAME_LENGTH_FIELD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Datagramm zu kurz fuer Laengen-Prefix",
            ));
        }

        let name_len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
        if name_len == 0 || name_len > MAX_USERNAME_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Ungueltige Namenslaenge: {} Bytes", name_len),
            ));
        }

        let name_ende = NAME_LENGTH_FIELD_SIZE + name_len;
        if buf.len() < name_ende {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Datagramm zu kurz fuer den Benutzernamen",
            ));
        }

        let name = std::str::from_utf8(&buf[NAME_LENGTH_FIELD_SIZE..name_ende])
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "Name ist kein UTF-8"))?;
        let benutzer = Username::neu(name)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        let sealed = SealedBox::from_bytes(&buf[name_ende..]).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Versiegelung zu kurz: {} Bytes", buf.len() - name_ende),
            )
        })?;

        Ok(Self { benutzer, sealed })
    }

    /// Gesamtgroesse des kodierten Datagramms in Bytes
    pub fn groesse(&self) -> usize {
        NAME_LENGTH_FIELD_SIZE + self.benutzer.as_bytes().len() + self.sealed.laenge()
    }
}

// ---------------------------------------------------------------------------
// RelayNachricht
// ---------------------------------------------------------------------------

/// Versiegelter Inhalt eines UDP-Datagramms
///
/// Gleiche Tagged-Enum-Konvention wie [`crate::ControlMessage`]; der
/// Relay versteht nur diese vier Formen.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayNachricht {
    /// Chat-Nachricht; Absender und Zeitstempel setzt der Relay
    Chat(ChatMessage),
    /// Server-Mitteilung an alle Relay-Teilnehmer
    System(SystemMessage),
    /// Keepalive – haelt den Endpunkt-Eintrag frisch
    Ping,
    /// Abmeldung – entfernt den Endpunkt-Eintrag sofort
    Bye,
}

impl RelayNachricht {
    /// Erstellt eine Chat-Nachricht ohne Absender (Client-Seite)
    pub fn chat(text: impl Into<String>) -> Self {
        Self::Chat(ChatMessage {
            text: text.into(),
            sender: None,
            ts: None,
        })
    }

    /// Serialisiert die Nachricht zu JSON-Bytes (fuer das Versiegeln)
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Deserialisiert eine Nachricht aus JSON-Bytes
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
