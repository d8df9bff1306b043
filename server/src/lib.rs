//! fluester-server – Bibliotheks-Root
//!
//! Deklariert die Server-Module und stellt den oeffentlichen
//! Einstiegspunkt fuer Integrationstests bereit.
//!
//! Der Server laeuft vollstaendig single-threaded: die Store-Traits
//! verwenden async fn ohne Send-Bound, daher werden Session-Server und
//! UDP-Relay im selben Task per `join!` gepollt statt gespawnt.

pub mod config;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

use fluester_auth::AuthService;
use fluester_core::event::FluesterEvent;
use fluester_relay::{RelayConfig, UdpRelay};
use fluester_session::{SessionServer, SessionState};
use fluester_store::{JsonCredentialStore, JsonKeyStore};

use config::ServerConfig;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Server-Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Datenverzeichnis anlegen, JSON-Stores oeffnen
    /// 2. Auth-Service und Session-Zustand aufbauen
    /// 3. UDP-Relay binden
    /// 4. TCP-Session-Server, Relay und Ereignis-Log nebeneinander
    ///    pollen bis Ctrl-C eingeht
    pub async fn starten(self) -> Result<()> {
        std::fs::create_dir_all(&self.config.storage.daten_verzeichnis).with_context(|| {
            format!(
                "Datenverzeichnis '{}' nicht anlegbar",
                self.config.storage.daten_verzeichnis
            )
        })?;

        let credentials = Arc::new(
            JsonCredentialStore::oeffnen(self.config.benutzer_pfad())
                .await
                .context("Credential-Store nicht ladbar")?,
        );
        let schluessel = Arc::new(
            JsonKeyStore::oeffnen(self.config.udp_schluessel_pfad())
                .await
                .context("UDP-Schluessel-Store nicht ladbar")?,
        );

        let auth = Arc::new(AuthService::neu(credentials, Arc::clone(&schluessel)));
        let state = SessionState::neu(self.config.session_config(), auth);

        let tcp_addr: SocketAddr = self
            .config
            .tcp_bind_adresse()
            .parse()
            .with_context(|| format!("Ungueltige TCP-Adresse '{}'", self.config.tcp_bind_adresse()))?;
        let udp_addr: SocketAddr = self
            .config
            .udp_bind_adresse()
            .parse()
            .with_context(|| format!("Ungueltige UDP-Adresse '{}'", self.config.udp_bind_adresse()))?;

        let session_server = SessionServer::neu(Arc::clone(&state), tcp_addr);

        let mut relay_config = RelayConfig::neu(udp_addr);
        relay_config.max_datagramm_bytes = self.config.limits.max_datagramm_bytes;
        let relay = UdpRelay::binden(relay_config, schluessel)
            .await
            .context("UDP-Relay nicht bindbar")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ereignisse = state.ereignisse_abonnieren();

        tracing::info!(
            tcp = %tcp_addr,
            udp = %udp_addr,
            max_clients = self.config.server.max_clients,
            "Fluester-Server startet"
        );

        let signal = async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(fehler = %e, "Ctrl-C-Handler fehlgeschlagen");
            }
            tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
            let _ = shutdown_tx.send(true);
        };

        let (tcp_ergebnis, (), (), ()) = tokio::join!(
            session_server.starten(shutdown_rx.clone()),
            relay.starten(shutdown_rx.clone()),
            ereignis_schleife(ereignisse, shutdown_rx),
            signal,
        );
        tcp_ergebnis.context("TCP-Session-Server abgebrochen")?;

        tracing::info!(uptime_sek = state.uptime_sek(), "Fluester-Server beendet");
        Ok(())
    }
}

/// Konsumiert den Ereignis-Kanal des Kerns und schreibt ihn ins Log
async fn ereignis_schleife(
    mut ereignisse: broadcast::Receiver<FluesterEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            ergebnis = ereignisse.recv() => match ergebnis {
                Ok(ereignis) => ereignis_loggen(&ereignis),
                Err(broadcast::error::RecvError::Lagged(verpasst)) => {
                    tracing::warn!(verpasst, "Ereignis-Log hinkt hinterher");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            Ok(()) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

/// Schreibt ein Kern-Ereignis als strukturierte Log-Zeile
///
/// Chat-Inhalte landen nie im Log, nur ihre Laenge.
fn ereignis_loggen(ereignis: &FluesterEvent) {
    match ereignis {
        FluesterEvent::BenutzerVerbunden { benutzer } => {
            tracing::info!(benutzer = %benutzer, "Benutzer online");
        }
        FluesterEvent::BenutzerGetrennt { benutzer, grund } => {
            tracing::info!(benutzer = %benutzer, grund = %grund, "Benutzer offline");
        }
        FluesterEvent::Chat { von, text, ts: _ } => {
            tracing::debug!(von = %von, laenge = text.len(), "Chat vermittelt");
        }
        FluesterEvent::TransferFortschritt { id, bytes, groesse } => {
            tracing::debug!(id = %id, bytes, groesse, "Transfer-Fortschritt");
        }
        FluesterEvent::TransferAbgeschlossen { id } => {
            tracing::info!(id = %id, "Transfer abgeschlossen");
        }
        FluesterEvent::TransferAbgebrochen { id, grund } => {
            tracing::info!(id = %id, grund = %grund, "Transfer abgebrochen");
        }
    }
}
