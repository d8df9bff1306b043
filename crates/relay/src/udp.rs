//! UDP-Relay – Empfangs-Loop und schluesselbasierte Weiterleitung
//!
//! Bindet einen UDP-Socket, empfaengt Datagramme, entsiegelt sie mit dem
//! UDP-Schluessel des Absenders und verteilt sie neu versiegelt an alle
//! anderen aktiven Endpunkte.
//!
//! ## Architektur
//!
//! ```text
//! UDP Socket (recv_from)
//!     |
//!     v
//! Datagram::decode()            <- kaputte Pakete: stilles Verwerfen
//!     |
//!     v
//! EndpunktTabelle / KeyStore    <- Schluessel nachschlagen (Erstkontakt)
//!     |
//!     v
//! oeffnen()                     <- einmaliger Refresh nach Rotation
//!     |
//!     v
//! RelayNachricht                <- ping/bye/chat/system
//!     |
//!     +--> pro Empfaenger neu versiegeln --> send_to
//! ```
//!
//! ## Fehlerdisziplin
//! Der Relay antwortet nie auf fehlerhafte Pakete – auch nicht auf
//! unbekannte Benutzer (keine Verstaerkung von gespooftem Verkehr).
//! Kein Paket bringt die Loop zum Absturz; jede Schleifenrunde behandelt
//! genau ein Datagramm und blockiert nie auf einem anderen Teilnehmer.
//!
//! Der Relay liest den Key-Store nur; geschrieben wird er ausschliesslich
//! vom Auth-Service waehrend des TCP-Handshakes.

use chrono::Utc;
use fluester_core::types::Username;
use fluester_crypto::{SealedBox, SecretBytes};
use fluester_protocol::control::{ChatMessage, SystemMessage};
use fluester_protocol::datagram::{Datagram, RelayNachricht, MAX_DATAGRAMM_BYTES};
use fluester_store::KeyStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

use crate::endpoints::EndpunktTabelle;

// ---------------------------------------------------------------------------
// RelayConfig
// ---------------------------------------------------------------------------

/// Konfiguration fuer den UDP-Relay
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bind-Adresse (z. B. "0.0.0.0:20001")
    pub bind_addr: SocketAddr,
    /// Endpunkte ohne Verkehr laenger als dieses Fenster gelten als tot
    pub stale_fenster_sek: u64,
    /// Intervall des Aufraeum-Durchlaufs in Sekunden
    pub sweep_intervall_sek: u64,
    /// Maximale Datagramm-Groesse in Bytes (Empfangspuffer und Sendelimit)
    pub max_datagramm_bytes: usize,
}

impl RelayConfig {
    /// Erstellt eine Konfiguration mit Standard-Werten
    pub fn neu(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            stale_fenster_sek: 300,
            sweep_intervall_sek: 60,
            max_datagramm_bytes: MAX_DATAGRAMM_BYTES,
        }
    }
}

// ---------------------------------------------------------------------------
// UdpRelay
// ---------------------------------------------------------------------------

/// UDP-Relay-Server
///
/// Haelt den Socket, die Endpunkt-Tabelle und eine Referenz auf den
/// Key-Store. Die Empfangs-Loop laeuft bis zum Shutdown-Signal.
pub struct UdpRelay<K>
where
    K: KeyStore + 'static,
{
    config: RelayConfig,
    socket: Arc<UdpSocket>,
    key_store: Arc<K>,
    endpunkte: EndpunktTabelle,
}

impl<K> UdpRelay<K>
where
    K: KeyStore + 'static,
{
    /// Bindet den UDP-Socket und erstellt den Relay
    pub async fn binden(config: RelayConfig, key_store: Arc<K>) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(config.bind_addr).await?;
        tracing::info!(adresse = %config.bind_addr, "UDP-Relay gebunden");

        Ok(Self {
            config,
            socket: Arc::new(socket),
            key_store,
            endpunkte: EndpunktTabelle::neu(),
        })
    }

    /// Gibt die lokale Bind-Adresse zurueck
    pub fn lokale_adresse(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Anzahl aktiver Endpunkte
    pub fn endpunkt_anzahl(&self) -> usize {
        self.endpunkte.anzahl()
    }

    /// Startet die Empfangs-Loop (laeuft bis zum Shutdown-Signal)
    pub async fn starten(&self, mut shutdown_rx: tokio::sync::watch::Receiver<bool>) {
        // Empfangspuffer wird ueber alle Runden wiederverwendet; laengere
        // Datagramme werden vom Socket gekappt und scheitern am Siegel
        let mut buf = vec![0u8; self.config.max_datagramm_bytes];
        let mut aufraeum_takt =
            tokio::time::interval(Duration::from_secs(self.config.sweep_intervall_sek));
        let stale_fenster = Duration::from_secs(self.config.stale_fenster_sek);

        tracing::info!("UDP-Relay-Empfangs-Loop gestartet");

        loop {
            tokio::select! {
                // Eingehendes Datagramm
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((laenge, absender)) => {
                            self.datagramm_verarbeiten(&buf[..laenge], absender).await;
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "UDP-Empfangsfehler");
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                }

                // Periodisches Aufraeumen toter Endpunkte
                _ = aufraeum_takt.tick() => {
                    for benutzer in self.endpunkte.abgelaufene_entfernen(stale_fenster) {
                        tracing::info!(benutzer = %benutzer, "Inaktiver Relay-Endpunkt entfernt");
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("UDP-Relay: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!("UDP-Relay-Empfangs-Loop beendet");
    }

    // -----------------------------------------------------------------------
    // Internes Datagramm-Processing
    // -----------------------------------------------------------------------

    /// Verarbeitet ein eingehendes Datagramm
    ///
    /// Hot Path: jeder Fehlschlag ist ein stilles Verwerfen mit
    /// Debug-Log, nie eine Antwort an den Absender.
    async fn datagramm_verarbeiten(&self, daten: &[u8], absender: SocketAddr) {
        let datagramm = match Datagram::decode(daten) {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(absender = %absender, fehler = %e, "Ungueltiges Datagramm");
                return;
            }
        };
        let benutzer = datagramm.benutzer;

        // Erstkontakt: Schluessel aus dem Key-Store laden; sonst Adresse
        // und Liveness auffrischen
        let erster_kontakt = !self.endpunkte.ist_registriert(&benutzer);
        if erster_kontakt {
            let schluessel = match self.key_store.laden(&benutzer).await {
                Ok(Some(s)) => s,
                Ok(None) => {
                    // Nie ueber TCP authentifiziert: stilles Verwerfen,
                    // bewusst ohne Fehlerantwort
                    tracing::debug!(
                        benutzer = %benutzer,
                        absender = %absender,
                        "Unbekannter Benutzer – Datagramm verworfen"
                    );
                    return;
                }
                Err(e) => {
                    tracing::warn!(benutzer = %benutzer, fehler = %e, "Key-Store-Lookup fehlgeschlagen");
                    return;
                }
            };
            self.endpunkte.registrieren(benutzer.clone(), absender, schluessel);
        } else {
            self.endpunkte.kontakt_aktualisieren(&benutzer, absender);
        }

        let klartext = match self.entsiegeln(&benutzer, &datagramm.sealed).await {
            Some(k) => k,
            None => return,
        };
        let nachricht = match RelayNachricht::from_bytes(&klartext) {
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(benutzer = %benutzer, fehler = %e, "Unlesbare Relay-Nachricht");
                return;
            }
        };

        // Erst das gelungene Siegel beweist den Absender – die Begruessung
        // fuer frische Endpunkte kommt deshalb erst hier
        if erster_kontakt {
            tracing::info!(benutzer = %benutzer, absender = %absender, "Neuer Relay-Endpunkt");
            self.an_benutzer_senden(
                &benutzer,
                &RelayNachricht::System(SystemMessage {
                    text: "Verbindung zum UDP-Relay bestaetigt".into(),
                    ts: Utc::now(),
                }),
            )
            .await;
        }

        match nachricht {
            RelayNachricht::Ping => {
                // Liveness ist bereits aufgefrischt
                tracing::trace!(benutzer = %benutzer, "Relay-Keepalive");
            }
            RelayNachricht::Bye => {
                self.endpunkte.entfernen(&benutzer);
                tracing::info!(benutzer = %benutzer, "Relay-Endpunkt abgemeldet");
                self.an_alle_ausser(
                    &benutzer,
                    &RelayNachricht::System(SystemMessage {
                        text: format!("{benutzer} hat den UDP-Chat verlassen."),
                        ts: Utc::now(),
                    }),
                )
                .await;
            }
            RelayNachricht::Chat(chat) => {
                // Absender und Zeitstempel stempelt der Relay, nie der Client
                let gestempelt = RelayNachricht::Chat(ChatMessage {
                    text: chat.text,
                    sender: Some(benutzer.clone()),
                    ts: Some(Utc::now()),
                });
                let erreicht = self.an_alle_ausser(&benutzer, &gestempelt).await;
                tracing::debug!(benutzer = %benutzer, erreicht, "Relay-Chat verteilt");
            }
            RelayNachricht::System(system) => {
                let erreicht = self
                    .an_alle_ausser(&benutzer, &RelayNachricht::System(system))
                    .await;
                tracing::debug!(benutzer = %benutzer, erreicht, "Relay-Mitteilung verteilt");
            }
        }
    }

    /// Entsiegelt ein Datagramm mit dem gespeicherten Schluessel
    ///
    /// Schlaegt die Entsiegelung fehl, wird der Schluessel genau einmal
    /// aus dem Key-Store aufgefrischt (Rotation lief ueber TCP) und
    /// erneut versucht; scheitert auch das, ist das Paket verloren.
    async fn entsiegeln(&self, benutzer: &Username, sealed: &SealedBox) -> Option<Vec<u8>> {
        let schluessel = self.endpunkte.schluessel(benutzer)?;
        if let Ok(klartext) = fluester_crypto::oeffnen(schluessel.as_bytes(), sealed, b"") {
            return Some(klartext);
        }

        let frisch = match self.key_store.laden(benutzer).await {
            Ok(Some(s)) => s,
            Ok(None) => {
                tracing::debug!(benutzer = %benutzer, "Schluessel nicht mehr im Key-Store");
                return None;
            }
            Err(e) => {
                tracing::warn!(benutzer = %benutzer, fehler = %e, "Key-Store-Refresh fehlgeschlagen");
                return None;
            }
        };

        match fluester_crypto::oeffnen(&frisch, sealed, b"") {
            Ok(klartext) => {
                tracing::debug!(benutzer = %benutzer, "UDP-Schluessel nach Rotation aufgefrischt");
                self.endpunkte.schluessel_aktualisieren(benutzer, frisch);
                Some(klartext)
            }
            Err(e) => {
                tracing::debug!(
                    benutzer = %benutzer,
                    fehler = %e,
                    "Entsiegelung auch mit frischem Schluessel fehlgeschlagen"
                );
                None
            }
        }
    }

    /// Versiegelt eine Nachricht fuer einen Teilnehmer und sendet sie
    async fn an_benutzer_senden(&self, benutzer: &Username, nachricht: &RelayNachricht) -> bool {
        let (addr, schluessel) = match self.endpunkte.eintrag(benutzer) {
            Some(eintrag) => eintrag,
            None => return false,
        };
        let klartext = match nachricht.to_bytes() {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(fehler = %e, "Relay-Nachricht nicht serialisierbar");
                return false;
            }
        };
        self.versenden(benutzer, addr, &schluessel, &klartext).await
    }

    /// Re-versiegelt eine Nachricht pro Empfaenger und verteilt sie an
    /// alle aktiven Endpunkte ausser dem Absender
    async fn an_alle_ausser(&self, absender: &Username, nachricht: &RelayNachricht) -> usize {
        let klartext = match nachricht.to_bytes() {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(fehler = %e, "Relay-Nachricht nicht serialisierbar");
                return 0;
            }
        };

        let mut erreicht = 0;
        for (benutzer, addr, schluessel) in self.endpunkte.alle_ausser(absender) {
            if self.versenden(&benutzer, addr, &schluessel, &klartext).await {
                erreicht += 1;
            }
        }
        erreicht
    }

    /// Versiegelt `klartext` mit dem Schluessel des Empfaengers und
    /// sendet das Datagramm
    ///
    /// Im ausgehenden Datagramm nennt der Namens-Prefix den Empfaenger,
    /// also den Inhaber des Schluessels, der das Siegel oeffnet. Bei
    /// Sendefehlern fliegt der Endpunkt aus der Tabelle.
    async fn versenden(
        &self,
        empfaenger: &Username,
        addr: SocketAddr,
        schluessel: &SecretBytes,
        klartext: &[u8],
    ) -> bool {
        let versiegelt = match fluester_crypto::versiegeln(schluessel.as_bytes(), klartext, b"") {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(empfaenger = %empfaenger, fehler = %e, "Versiegeln fehlgeschlagen");
                return false;
            }
        };
        let paket = Datagram {
            benutzer: empfaenger.clone(),
            sealed: versiegelt,
        }
        .encode();
        if paket.len() > self.config.max_datagramm_bytes {
            tracing::warn!(
                empfaenger = %empfaenger,
                groesse = paket.len(),
                maximum = self.config.max_datagramm_bytes,
                "Datagramm zu gross – nicht gesendet"
            );
            return false;
        }

        match self.socket.send_to(&paket, addr).await {
            Ok(_) => {
                tracing::trace!(
                    empfaenger = %empfaenger,
                    ziel = %addr,
                    bytes = paket.len(),
                    "Datagramm gesendet"
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    empfaenger = %empfaenger,
                    ziel = %addr,
                    fehler = %e,
                    "UDP-Sendefehler – Endpunkt entfernt"
                );
                self.endpunkte.entfernen(empfaenger);
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
