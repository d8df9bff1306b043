//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen (`FLUESTER_CONFIG`,
//! Standard: `fluester.toml`). Alle Sektionen sind optional; ohne
//! Konfigurationsdatei laeuft der Server mit Standardwerten.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use fluester_protocol::datagram::MAX_DATAGRAMM_BYTES;
use fluester_protocol::wire::DEFAULT_MAX_FRAME_BYTES;
use fluester_session::SessionConfig;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct ServerConfig {
    /// Bind-Adressen und Client-Limit
    pub server: ServerEinstellungen,
    /// Session-Einstellungen (Keepalive, Timeouts)
    pub session: SessionEinstellungen,
    /// Datei-Transfer-Einstellungen
    pub transfer: TransferEinstellungen,
    /// Protokoll-Limits (Frame- und Datagramm-Groessen)
    pub limits: LimitEinstellungen,
    /// Persistenz-Einstellungen
    pub storage: StorageEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Bind-Adressen und Client-Limit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Bind-Adresse fuer den TCP-Session-Server
    pub tcp_bind: String,
    /// Port fuer den TCP-Session-Server
    pub tcp_port: u16,
    /// Bind-Adresse fuer den UDP-Relay
    pub udp_bind: String,
    /// Port fuer den UDP-Relay (wird im `auth_ok` mitgeteilt)
    pub udp_port: u16,
    /// Maximale gleichzeitig verbundene Clients
    pub max_clients: u32,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            tcp_bind: "0.0.0.0".into(),
            tcp_port: 5000,
            udp_bind: "0.0.0.0".into(),
            udp_port: 20001,
            max_clients: 64,
        }
    }
}

/// Session-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionEinstellungen {
    /// Keepalive-Ping-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
}

impl Default for SessionEinstellungen {
    fn default() -> Self {
        Self {
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
        }
    }
}

/// Datei-Transfer-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferEinstellungen {
    /// Maximale Dateigroesse in Bytes
    pub max_datei_bytes: u64,
    /// Lebensdauer eines unbeantworteten Angebots in Sekunden
    pub offer_ttl_sek: u64,
    /// Fortschrittsmeldung an den Empfaenger alle N Chunks
    pub progress_intervall_chunks: u64,
}

impl Default for TransferEinstellungen {
    fn default() -> Self {
        Self {
            max_datei_bytes: 50 * 1024 * 1024,
            offer_ttl_sek: 15 * 60,
            progress_intervall_chunks: 4,
        }
    }
}

/// Protokoll-Limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitEinstellungen {
    /// Maximale TCP-Frame-Groesse in Bytes
    pub max_frame_bytes: usize,
    /// Maximale UDP-Datagramm-Groesse in Bytes
    pub max_datagramm_bytes: usize,
}

impl Default for LimitEinstellungen {
    fn default() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            max_datagramm_bytes: MAX_DATAGRAMM_BYTES,
        }
    }
}

/// Persistenz-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageEinstellungen {
    /// Verzeichnis fuer die JSON-Dokumente (Credentials, UDP-Schluessel)
    pub daten_verzeichnis: String,
}

impl Default for StorageEinstellungen {
    fn default() -> Self {
        Self {
            daten_verzeichnis: "daten".into(),
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "text" oder "json"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Gibt die vollstaendige Bind-Adresse fuer TCP zurueck
    pub fn tcp_bind_adresse(&self) -> String {
        format!("{}:{}", self.server.tcp_bind, self.server.tcp_port)
    }

    /// Gibt die vollstaendige Bind-Adresse fuer UDP zurueck
    pub fn udp_bind_adresse(&self) -> String {
        format!("{}:{}", self.server.udp_bind, self.server.udp_port)
    }

    /// Pfad der Credential-Datei im Datenverzeichnis
    pub fn benutzer_pfad(&self) -> PathBuf {
        PathBuf::from(&self.storage.daten_verzeichnis).join("benutzer.json")
    }

    /// Pfad der UDP-Schluessel-Datei im Datenverzeichnis
    pub fn udp_schluessel_pfad(&self) -> PathBuf {
        PathBuf::from(&self.storage.daten_verzeichnis).join("udp_schluessel.json")
    }

    /// Baut die [`SessionConfig`] fuer den Session-Service zusammen
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            max_clients: self.server.max_clients,
            udp_port: self.server.udp_port,
            keepalive_sek: self.session.keepalive_sek,
            verbindungs_timeout_sek: self.session.verbindungs_timeout_sek,
            max_frame_bytes: self.limits.max_frame_bytes,
            max_datei_bytes: self.transfer.max_datei_bytes,
            offer_ttl_sek: self.transfer.offer_ttl_sek,
            progress_intervall_chunks: self.transfer.progress_intervall_chunks,
            ..SessionConfig::default()
        }
    }
}
