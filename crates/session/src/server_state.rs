//! Gemeinsamer Server-Zustand fuer den Session-Service
//!
//! Haelt alle geteilten Services und Zustands-Manager als Arc-Referenzen,
//! die sicher zwischen tokio-Tasks geteilt werden koennen.

use fluester_auth::AuthService;
use fluester_core::event::FluesterEvent;
use fluester_store::{CredentialStore, KeyStore};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

use crate::broadcast::Broadcaster;
use crate::transfer::TransferManager;

/// Kapazitaet des Ereignis-Kanals zur Praesentationsschicht
const EREIGNIS_KANAL_GROESSE: usize = 256;

/// Konfiguration fuer den Session-Service
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximale gleichzeitig verbundene Clients
    pub max_clients: u32,
    /// UDP-Port des Relays (wird im `auth_ok` mitgeteilt)
    pub udp_port: u16,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
    /// Maximale TCP-Frame-Groesse in Bytes (Codec-Limit)
    pub max_frame_bytes: usize,
    /// Maximale Dateigroesse fuer Transfers in Bytes
    pub max_datei_bytes: u64,
    /// Lebensdauer eines unbeantworteten Datei-Angebots in Sekunden
    pub offer_ttl_sek: u64,
    /// Fortschrittsmeldung an den Empfaenger alle N Chunks
    pub progress_intervall_chunks: u64,
    /// Intervall des Wartungs-Tasks (abgelaufene Angebote) in Sekunden
    pub wartungs_intervall_sek: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_clients: 64,
            udp_port: 20001,
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
            max_frame_bytes: fluester_protocol::wire::DEFAULT_MAX_FRAME_BYTES,
            max_datei_bytes: 50 * 1024 * 1024,
            offer_ttl_sek: 15 * 60,
            progress_intervall_chunks: 4,
            wartungs_intervall_sek: 60,
        }
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
///
/// Alle Services sind als Arc gehalten. Clone gibt eine Referenz auf
/// denselben inneren Zustand.
pub struct SessionState<C, K>
where
    C: CredentialStore + 'static,
    K: KeyStore + 'static,
{
    /// Server-Konfiguration
    pub config: Arc<SessionConfig>,
    /// Auth-Service (Handshake, Proof-Pruefung, Schluessel-Rotation)
    pub auth: Arc<AuthService<C, K>>,
    /// Broadcaster (Send-Queues aller verbundenen Clients, Roster)
    pub broadcaster: Broadcaster,
    /// Transfer-Manager (Datei-Angebote und laufende Streams)
    pub transfers: TransferManager,
    /// Ereignis-Kanal zur Praesentationsschicht
    pub ereignisse: broadcast::Sender<FluesterEvent>,
    /// Startzeitpunkt des Servers (fuer Uptime-Berechnung)
    pub start_time: Instant,
}

impl<C, K> SessionState<C, K>
where
    C: CredentialStore + 'static,
    K: KeyStore + 'static,
{
    /// Erstellt einen neuen SessionState
    pub fn neu(config: SessionConfig, auth: Arc<AuthService<C, K>>) -> Arc<Self> {
        let transfers = TransferManager::neu(
            config.max_datei_bytes,
            std::time::Duration::from_secs(config.offer_ttl_sek),
            config.progress_intervall_chunks,
        );
        let (ereignisse, _) = broadcast::channel(EREIGNIS_KANAL_GROESSE);

        Arc::new(Self {
            config: Arc::new(config),
            auth,
            broadcaster: Broadcaster::neu(),
            transfers,
            ereignisse,
            start_time: Instant::now(),
        })
    }

    /// Meldet ein Ereignis an die Praesentationsschicht
    ///
    /// Ohne aktive Abonnenten wird das Ereignis verworfen – der Kern
    /// blockiert nie auf der Praesentationsgrenze.
    pub fn ereignis_melden(&self, ereignis: FluesterEvent) {
        let _ = self.ereignisse.send(ereignis);
    }

    /// Abonniert den Ereignis-Kanal
    pub fn ereignisse_abonnieren(&self) -> broadcast::Receiver<FluesterEvent> {
        self.ereignisse.subscribe()
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
