//! TCP-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Der `SessionServer` bindet einen TCP-Socket und startet fuer jede
//! eingehende Verbindung einen eigenen tokio-Task mit einer
//! `ClientConnection`. Zusaetzlich laeuft ein Wartungs-Task, der
//! abgelaufene Datei-Angebote entfernt.
//!
//! ## Concurrency-Modell
//! Da die Store-Traits async fn ohne Send-Garantie verwenden
//! (async_fn_in_trait), laufen alle Verbindungs-Tasks in einer
//! `tokio::task::LocalSet` auf einem single-threaded Executor.
//! Dies ist korrekt fuer einen einzelnen Server-Prozess.

use fluester_core::event::FluesterEvent;
use fluester_protocol::control::{AbortReason, ControlMessage};
use fluester_store::{CredentialStore, KeyStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::LocalSet;

use crate::broadcast::Ausgehend;
use crate::connection::ClientConnection;
use crate::server_state::SessionState;

/// TCP-Session-Server
///
/// Bindet einen TCP-Socket und akzeptiert Verbindungen in einer Loop.
/// Jede Verbindung wird als lokaler Task in der `LocalSet` ausgefuehrt.
pub struct SessionServer<C, K>
where
    C: CredentialStore + 'static,
    K: KeyStore + 'static,
{
    state: Arc<SessionState<C, K>>,
    bind_addr: SocketAddr,
}

impl<C, K> SessionServer<C, K>
where
    C: CredentialStore + 'static,
    K: KeyStore + 'static,
{
    /// Erstellt einen neuen SessionServer
    pub fn neu(state: Arc<SessionState<C, K>>, bind_addr: SocketAddr) -> Self {
        Self { state, bind_addr }
    }

    /// Startet den TCP-Listener und akzeptiert Verbindungen
    ///
    /// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
    pub async fn starten(
        self,
        shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.starten_mit_listener(listener, shutdown_rx).await
    }

    /// Startet den Server auf einem bereits gebundenen Listener
    ///
    /// Nuetzlich wenn der Aufrufer den Port selbst waehlt (Port 0).
    /// Verwendet eine `LocalSet` fuer alle Verbindungs-Tasks.
    pub async fn starten_mit_listener(
        self,
        listener: TcpListener,
        shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let local = LocalSet::new();
        local
            .run_until(self.accept_loop(listener, shutdown_rx))
            .await
    }

    /// Interne Accept-Loop (laeuft innerhalb der LocalSet)
    async fn accept_loop(
        self,
        listener: TcpListener,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let lokale_addr = listener.local_addr()?;

        tracing::info!(
            adresse = %lokale_addr,
            "TCP Session-Server gestartet"
        );

        // Wartungs-Task fuer abgelaufene Datei-Angebote
        let wartung = tokio::task::spawn_local(wartungs_schleife(
            Arc::clone(&self.state),
            shutdown_rx.clone(),
        ));

        loop {
            tokio::select! {
                // Neue eingehende Verbindung
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            // Client-Limit pruefen
                            let online = self.state.broadcaster.online_anzahl() as u32;
                            if online >= self.state.config.max_clients {
                                tracing::warn!(
                                    peer = %peer_addr,
                                    max = self.state.config.max_clients,
                                    "Server voll – Verbindung abgelehnt"
                                );
                                drop(stream);
                                continue;
                            }

                            tracing::debug!(peer = %peer_addr, "Verbindung akzeptiert");

                            let verbindung = ClientConnection::neu(
                                Arc::clone(&self.state),
                                peer_addr,
                            );
                            let shutdown_rx_clone = shutdown_rx.clone();

                            // Lokaler Task – kein Send erforderlich
                            tokio::task::spawn_local(async move {
                                verbindung.verarbeiten(stream, shutdown_rx_clone).await;
                            });
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Session-Server: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        wartung.abort();
        tracing::info!("TCP Session-Server gestoppt");
        Ok(())
    }

    /// Gibt die Bind-Adresse zurueck
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }
}

/// Entfernt periodisch abgelaufene Datei-Angebote
///
/// Der Anbieter erhaelt ein `file_abort` mit Grund `expired`; fuer alle
/// anderen verhaelt sich die ID danach wie eine unbekannte.
async fn wartungs_schleife<C, K>(
    state: Arc<SessionState<C, K>>,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) where
    C: CredentialStore + 'static,
    K: KeyStore + 'static,
{
    let mut takt =
        tokio::time::interval(Duration::from_secs(state.config.wartungs_intervall_sek));

    loop {
        tokio::select! {
            _ = takt.tick() => {
                for (id, anbieter) in state.transfers.abgelaufene_entfernen() {
                    state.broadcaster.an_benutzer_senden(
                        &anbieter,
                        Ausgehend::Control(ControlMessage::abbruch(id, AbortReason::Expired)),
                    );
                    state.ereignis_melden(FluesterEvent::TransferAbgebrochen {
                        id,
                        grund: AbortReason::Expired.to_string(),
                    });
                }
            }

            Ok(()) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}
