//! Control-Protokoll (TCP)
//!
//! Definiert alle Steuernachrichten die ueber die TCP-Verbindung
//! zwischen Client und Server ausgetauscht werden.
//!
//! ## Design
//! - Tagged Enum: jede Nachricht traegt ein `type`-Feld (snake_case)
//! - JSON-Serialisierung via serde (TCP, nicht zeitkritisch)
//! - Binaere Felder (Salt, Proof, Schluessel) reisen Base64-kodiert
//!
//! Vor der Authentifizierung laufen Nachrichten als Klartext-Frames
//! (der Proof ist abgeleitet, nie das Passwort); danach versiegelt der
//! Session-Schluessel jede Control-Nachricht.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fluester_core::types::{TransferId, Username};

// ---------------------------------------------------------------------------
// Base64-Serde fuer binaere Felder
// ---------------------------------------------------------------------------

mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Standardisierte Fehler-Codes fuer Error-Nachrichten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Allgemein
    InternalError,
    ProtocolViolation,
    ServerFull,
    Timeout,
    // Auth
    AuthFailed,
    // Krypto
    CryptoFailed,
    // Limits
    FrameTooLarge,
    FileTooLarge,
    // Transfer
    UnknownTransfer,
    // Persistenz
    StorageFailed,
}

/// Grund fuer einen Transfer-Abbruch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// Empfangene Bytes erreichen die angekuendigte Groesse nicht
    IncompleteTransfer,
    /// Verbindung wurde waehrend des Transfers getrennt
    Disconnected,
    /// Angebot ist abgelaufen bevor es angenommen wurde
    Expired,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IncompleteTransfer => write!(f, "incomplete_transfer"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

// ---------------------------------------------------------------------------
// Auth-Nachrichten (Drei-Schritt-Handshake)
// ---------------------------------------------------------------------------

/// Schritt 1: Client nennt seinen Benutzernamen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthBeginRequest {
    pub username: Username,
}

/// Antwort auf Schritt 1: Salt fuer die Proof-Ableitung
///
/// Bei unbekanntem Benutzer ist `pending_registration` true und der Salt
/// frisch erzeugt – ein Credential-Record entsteht erst mit dem Proof.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSaltResponse {
    #[serde(with = "b64")]
    pub salt: Vec<u8>,
    pub pending_registration: bool,
}

/// Schritt 2: Client sendet den abgeleiteten Proof (nie das Passwort)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthProofRequest {
    #[serde(with = "b64")]
    pub proof: Vec<u8>,
}

/// Schritt 3: Erfolgsantwort mit Session-Salt und UDP-Schluessel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthOkResponse {
    #[serde(with = "b64")]
    pub session_salt: Vec<u8>,
    #[serde(with = "b64")]
    pub udp_key: Vec<u8>,
    /// Port des UDP-Relays, damit der Client das Ziel kennt
    pub udp_port: u16,
}

// ---------------------------------------------------------------------------
// Chat / Roster
// ---------------------------------------------------------------------------

/// Chat-Nachricht; Absender und Zeitstempel setzt der Server beim Fan-out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sender: Option<Username>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ts: Option<DateTime<Utc>>,
}

/// Menschlich lesbare Server-Mitteilung (Beitritt, Verlassen, Hinweise)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMessage {
    pub text: String,
    pub ts: DateTime<Utc>,
}

/// Roster-Snapshot: alle derzeit authentifizierten Benutzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterMessage {
    pub users: Vec<Username>,
}

// ---------------------------------------------------------------------------
// Datei-Transfer
// ---------------------------------------------------------------------------

/// Angebot einer Dateiuebertragung; Chunks fliessen erst nach Annahme
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOfferMessage {
    pub id: TransferId,
    pub filename: String,
    pub size: u64,
}

/// Annahme eines Angebots durch den Empfaenger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAcceptMessage {
    pub id: TransferId,
}

/// Ablehnung eines Angebots durch den Empfaenger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRejectMessage {
    pub id: TransferId,
}

/// Abschlussmeldung des Senders nach dem letzten Chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCompleteMessage {
    pub id: TransferId,
}

/// Abbruchmeldung (beide Richtungen)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAbortMessage {
    pub id: TransferId,
    pub reason: AbortReason,
}

/// Fortschrittsmeldung waehrend eines laufenden Transfers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressMessage {
    pub id: TransferId,
    pub bytes: u64,
    pub size: u64,
}

// ---------------------------------------------------------------------------
// Fehler
// ---------------------------------------------------------------------------

/// Standardisierte Fehler-Nachricht vom Server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Haupt-Enum: ControlMessage
// ---------------------------------------------------------------------------

/// Alle Control-Nachrichten (typsicher via Tagged Enum)
///
/// Auf dem Draht: `{"type": "auth_begin", "username": "alice"}` – der
/// Tag liegt neben den Feldern der jeweiligen Struktur.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    // Auth-Handshake
    AuthBegin(AuthBeginRequest),
    AuthSalt(AuthSaltResponse),
    AuthProof(AuthProofRequest),
    AuthOk(AuthOkResponse),
    AuthRejected,

    // Chat / Roster
    Chat(ChatMessage),
    System(SystemMessage),
    Roster(RosterMessage),

    // Datei-Transfer
    FileOffer(FileOfferMessage),
    FileAccept(FileAcceptMessage),
    FileReject(FileRejectMessage),
    FileComplete(FileCompleteMessage),
    FileAbort(FileAbortMessage),
    Progress(ProgressMessage),

    // Fehler
    Error(ErrorResponse),

    // Keepalive
    Ping,
    Pong,
}

impl ControlMessage {
    /// Erstellt eine Chat-Nachricht ohne Absender (Client-Seite)
    pub fn chat(text: impl Into<String>) -> Self {
        Self::Chat(ChatMessage {
            text: text.into(),
            sender: None,
            ts: None,
        })
    }

    /// Erstellt eine System-Mitteilung mit aktuellem Zeitstempel
    pub fn system(text: impl Into<String>) -> Self {
        Self::System(SystemMessage {
            text: text.into(),
            ts: Utc::now(),
        })
    }

    /// Erstellt einen Roster-Snapshot (sortiert fuer stabile Anzeige)
    pub fn roster(mut users: Vec<Username>) -> Self {
        users.sort();
        Self::Roster(RosterMessage { users })
    }

    /// Erstellt eine Fehler-Nachricht
    pub fn fehler(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ErrorResponse {
            code,
            message: message.into(),
        })
    }

    /// Erstellt eine Abbruchmeldung
    pub fn abbruch(id: TransferId, reason: AbortReason) -> Self {
        Self::FileAbort(FileAbortMessage { id, reason })
    }

    /// Darf diese Nachricht von einem noch nicht authentifizierten
    /// Client kommen? Nur die Handshake-Schritte und Keepalive.
    pub fn vor_auth_erlaubt(&self) -> bool {
        matches!(
            self,
            Self::AuthBegin(_) | Self::AuthProof(_) | Self::Ping | Self::Pong
        )
    }

    /// Nachrichtentypen die nur der Server erzeugt – von einem Client
    /// empfangen sind sie eine Protokollverletzung.
    pub fn nur_vom_server(&self) -> bool {
        matches!(
            self,
            Self::AuthSalt(_)
                | Self::AuthOk(_)
                | Self::AuthRejected
                | Self::System(_)
                | Self::Roster(_)
                | Self::Progress(_)
                | Self::Error(_)
        )
    }

    /// Serialisiert die Nachricht als JSON-String
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Serialisiert die Nachricht zu JSON-Bytes (fuer das Versiegeln)
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Deserialisiert eine Nachricht aus JSON-Bytes
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn benutzer(name: &str) -> Username {
        Username::neu(name).unwrap()
    }

    #[test]
    fn auth_begin_wire_format() {
        let msg = ControlMessage::AuthBegin(AuthBeginRequest {
            username: benutzer("alice"),
        });
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"auth_begin\""));
        assert!(json.contains("\"username\":\"alice\""));
    }

    #[test]
    fn auth_salt_base64_roundtrip() {
        let msg = ControlMessage::AuthSalt(AuthSaltResponse {
            salt: vec![0xDE, 0xAD, 0xBE, 0xEF],
            pending_registration: true,
        });
        let json = msg.to_json().unwrap();
        assert!(json.contains("3q2+7w=="), "Salt muss Base64-kodiert sein");

        let decoded = ControlMessage::from_json(&json).unwrap();
        if let ControlMessage::AuthSalt(s) = decoded {
            assert_eq!(s.salt, vec![0xDE, 0xAD, 0xBE, 0xEF]);
            assert!(s.pending_registration);
        } else {
            panic!("Erwartet AuthSalt");
        }
    }

    #[test]
    fn auth_ok_traegt_beide_schluesselfelder() {
        let msg = ControlMessage::AuthOk(AuthOkResponse {
            session_salt: vec![1u8; 16],
            udp_key: vec![2u8; 32],
            udp_port: 20001,
        });
        let json = msg.to_json().unwrap();
        let decoded = ControlMessage::from_json(&json).unwrap();
        if let ControlMessage::AuthOk(ok) = decoded {
            assert_eq!(ok.session_salt.len(), 16);
            assert_eq!(ok.udp_key.len(), 32);
            assert_eq!(ok.udp_port, 20001);
        } else {
            panic!("Erwartet AuthOk");
        }
    }

    #[test]
    fn auth_rejected_ist_unit_variante() {
        let json = ControlMessage::AuthRejected.to_json().unwrap();
        assert_eq!(json, "{\"type\":\"auth_rejected\"}");
        assert!(matches!(
            ControlMessage::from_json(&json).unwrap(),
            ControlMessage::AuthRejected
        ));
    }

    #[test]
    fn chat_ohne_absender_laesst_felder_weg() {
        let json = ControlMessage::chat("Hallo").to_json().unwrap();
        assert!(!json.contains("sender"));
        assert!(!json.contains("ts"));
    }

    #[test]
    fn abort_reason_wire_format() {
        let msg = ControlMessage::abbruch(TransferId::new(), AbortReason::IncompleteTransfer);
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"reason\":\"incomplete_transfer\""));
    }

    #[test]
    fn error_code_screaming_snake_case() {
        let msg = ControlMessage::fehler(ErrorCode::FileTooLarge, "zu gross");
        let json = msg.to_json().unwrap();
        assert!(json.contains("FILE_TOO_LARGE"));
    }

    #[test]
    fn vor_auth_nur_handshake_und_keepalive() {
        assert!(ControlMessage::AuthBegin(AuthBeginRequest {
            username: benutzer("a")
        })
        .vor_auth_erlaubt());
        assert!(ControlMessage::Ping.vor_auth_erlaubt());
        assert!(!ControlMessage::chat("x").vor_auth_erlaubt());
        assert!(!ControlMessage::FileAccept(FileAcceptMessage {
            id: TransferId::new()
        })
        .vor_auth_erlaubt());
    }

    #[test]
    fn server_nachrichten_erkennung() {
        assert!(ControlMessage::AuthRejected.nur_vom_server());
        assert!(ControlMessage::system("hi").nur_vom_server());
        assert!(!ControlMessage::chat("hi").nur_vom_server());
        assert!(!ControlMessage::Ping.nur_vom_server());
    }

    #[test]
    fn roster_wird_sortiert() {
        let msg = ControlMessage::roster(vec![benutzer("zoe"), benutzer("alice")]);
        if let ControlMessage::Roster(r) = msg {
            assert_eq!(r.users[0].as_str(), "alice");
            assert_eq!(r.users[1].as_str(), "zoe");
        } else {
            panic!("Erwartet Roster");
        }
    }

    #[test]
    fn bytes_roundtrip() {
        let msg = ControlMessage::chat("Umlaute: aeoeue");
        let bytes = msg.to_bytes().unwrap();
        let decoded = ControlMessage::from_bytes(&bytes).unwrap();
        assert!(matches!(decoded, ControlMessage::Chat(_)));
    }
}
