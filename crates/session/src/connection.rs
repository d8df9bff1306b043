//! Client-Connection – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede TCP-Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Die State Machine verwaltet den Handshake und die
//! authentifizierte Phase.
//!
//! ## State Machine
//! ```text
//! Verbunden --auth_begin--> WarteAufProof --auth_proof--> Authentifiziert
//!     |                          |                             |
//!     +---- Trennung <---- auth_rejected              versiegelter Verkehr
//! ```
//!
//! ## Klartext und Siegel
//! Der Handshake laeuft im Klartext: der Client kann den Session-
//! Schluessel erst ableiten, wenn `auth_ok` den Session-Salt liefert.
//! Ab dann ist jede Klartext-Steuernachricht eine Protokollverletzung;
//! Steuernachrichten laufen versiegelt, Datei-Chunks als binaere
//! Chunk-Frames mit Transfer-ID und Offset als AAD.
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen Ping
//! - Client muss innerhalb von `verbindungs_timeout_sek` irgendetwas senden
//! - Bei Timeout wird die Verbindung getrennt

use futures_util::{SinkExt, StreamExt};
use fluester_auth::AuthBeginn;
use fluester_core::types::Username;
use fluester_crypto::types::SecretBytes;
use fluester_protocol::chunk::{self, ChunkFrame};
use fluester_protocol::control::{AuthOkResponse, AuthSaltResponse, ControlMessage};
use fluester_protocol::wire::{FrameCodec, TcpFrame};
use fluester_store::{CredentialStore, KeyStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use crate::broadcast::Ausgehend;
use crate::dispatcher::{fehlercode_fuer, MessageDispatcher};
use crate::error::{SessionError, SessionResult};
use crate::server_state::SessionState;

// ---------------------------------------------------------------------------
// Verbindungszustand
// ---------------------------------------------------------------------------

/// Zustand der TCP-Verbindung
enum Sitzung {
    /// Verbunden, noch kein `auth_begin`
    Verbunden,
    /// Salt gesendet, wartet auf den Proof
    WarteAufProof(AuthBeginn),
    /// Handshake abgeschlossen, Verkehr laeuft versiegelt
    Authentifiziert(AktiveSitzung),
}

/// Daten einer authentifizierten Verbindung
struct AktiveSitzung {
    benutzer: Username,
    session_key: SecretBytes,
    verbindungs_id: u64,
}

// ---------------------------------------------------------------------------
// ClientConnection
// ---------------------------------------------------------------------------

/// Verarbeitet eine einzelne TCP-Verbindung
///
/// Liest Frames via `FrameCodec`, fuehrt den Handshake, dispatcht
/// authentifizierte Nachrichten und versiegelt ausgehenden Verkehr mit
/// dem Session-Schluessel dieser Verbindung. Laeuft in einem eigenen
/// tokio-Task.
pub struct ClientConnection<C, K>
where
    C: CredentialStore + 'static,
    K: KeyStore + 'static,
{
    state: Arc<SessionState<C, K>>,
    peer_addr: SocketAddr,
}

impl<C, K> ClientConnection<C, K>
where
    C: CredentialStore + 'static,
    K: KeyStore + 'static,
{
    /// Erstellt eine neue ClientConnection
    pub fn neu(state: Arc<SessionState<C, K>>, peer_addr: SocketAddr) -> Self {
        Self { state, peer_addr }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Diese Methode laeuft bis die Verbindung getrennt wird oder ein
    /// Shutdown-Signal eingeht.
    pub async fn verarbeiten(
        self,
        stream: TcpStream,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let peer_addr = self.peer_addr;
        let keepalive_intervall = Duration::from_secs(self.state.config.keepalive_sek);
        let timeout_dauer = Duration::from_secs(self.state.config.verbindungs_timeout_sek);

        tracing::info!(peer = %peer_addr, "Neue Verbindung");

        let mut framed = Framed::new(
            stream,
            FrameCodec::mit_limit(self.state.config.max_frame_bytes),
        );
        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));

        let mut sitzung = Sitzung::Verbunden;
        // Empfangs-Queue aus dem Broadcaster, existiert erst nach dem Handshake
        let mut sende_rx: Option<mpsc::Receiver<Ausgehend>> = None;

        // Zeitpunkt des letzten empfangenen Frames
        let mut letzter_empfang = Instant::now();
        // Zeitpunkt des naechsten Ping
        let mut naechster_ping = Instant::now() + keepalive_intervall;

        let mut trennungs_grund = "Verbindung beendet";

        loop {
            let jetzt = Instant::now();

            // Timeout-Pruefung
            if jetzt.duration_since(letzter_empfang) > timeout_dauer {
                tracing::warn!(peer = %peer_addr, "Verbindungs-Timeout");
                trennungs_grund = "Timeout";
                break;
            }

            // Naechsten Ping-Zeitpunkt berechnen
            let ping_verzoegerung = if jetzt < naechster_ping {
                naechster_ping.duration_since(jetzt)
            } else {
                Duration::from_millis(1)
            };

            tokio::select! {
                // Eingehendes Frame vom Client
                frame = framed.next() => {
                    match frame {
                        Some(Ok(frame)) => {
                            letzter_empfang = Instant::now();
                            match self
                                .frame_behandeln(frame, &mut sitzung, &mut sende_rx, &mut framed, &dispatcher)
                                .await
                            {
                                Ok(true) => {}
                                Ok(false) => {
                                    trennungs_grund = "Authentifizierung abgelehnt";
                                    break;
                                }
                                Err(e) => {
                                    tracing::warn!(
                                        peer = %peer_addr,
                                        fehler = %e,
                                        "Verbindungsfataler Fehler"
                                    );
                                    let fehler = ControlMessage::fehler(
                                        fehlercode_fuer(&e),
                                        e.to_string(),
                                    );
                                    let _ = Self::senden(&mut framed, &sitzung, fehler).await;
                                    trennungs_grund = "Protokollfehler";
                                    break;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(peer = %peer_addr, fehler = %e, "Frame-Lesefehler");
                            trennungs_grund = "Frame-Fehler";
                            break;
                        }
                        None => {
                            tracing::info!(peer = %peer_addr, "Verbindung vom Client getrennt");
                            break;
                        }
                    }
                }

                // Ausgehende Nachricht aus dem Broadcaster
                ausgehend = empfangen(&mut sende_rx) => {
                    match ausgehend {
                        Some(nachricht) => {
                            if let Err(e) = Self::ausgehend_senden(&mut framed, &sitzung, nachricht).await {
                                tracing::warn!(
                                    peer = %peer_addr,
                                    fehler = %e,
                                    "Broadcast-Senden fehlgeschlagen"
                                );
                                trennungs_grund = "Sendefehler";
                                break;
                            }
                        }
                        None => {
                            // Queue-Gegenseite geschlossen: derselbe Benutzer hat
                            // sich erneut angemeldet und diese Verbindung ersetzt
                            tracing::info!(peer = %peer_addr, "Verbindung durch neue Anmeldung ersetzt");
                            trennungs_grund = "Ersetzt";
                            break;
                        }
                    }
                }

                // Keepalive-Ping
                _ = tokio::time::sleep(ping_verzoegerung) => {
                    if jetzt >= naechster_ping {
                        if let Err(e) = Self::senden(&mut framed, &sitzung, ControlMessage::Ping).await {
                            tracing::warn!(peer = %peer_addr, fehler = %e, "Ping-Senden fehlgeschlagen");
                            trennungs_grund = "Sendefehler";
                            break;
                        }
                        naechster_ping = Instant::now() + keepalive_intervall;
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(peer = %peer_addr, "Shutdown-Signal – Verbindung wird getrennt");
                        let abschied = ControlMessage::system("Server wird heruntergefahren");
                        let _ = Self::senden(&mut framed, &sitzung, abschied).await;
                        trennungs_grund = "Server-Stopp";
                        break;
                    }
                }
            }
        }

        // Cleanup beim Verbindungsende
        if let Sitzung::Authentifiziert(aktiv) = sitzung {
            dispatcher.benutzer_gegangen(&aktiv.benutzer, aktiv.verbindungs_id, trennungs_grund);
        }

        tracing::info!(peer = %peer_addr, grund = trennungs_grund, "Verbindungs-Task beendet");
    }

    /// Verarbeitet ein eingehendes Frame im aktuellen Zustand
    ///
    /// `Ok(true)` = weiter, `Ok(false)` = geordnet schliessen (Ablehnung),
    /// `Err` = verbindungsfataler Fehler.
    async fn frame_behandeln(
        &self,
        frame: TcpFrame,
        sitzung: &mut Sitzung,
        sende_rx: &mut Option<mpsc::Receiver<Ausgehend>>,
        framed: &mut Framed<TcpStream, FrameCodec>,
        dispatcher: &MessageDispatcher<C, K>,
    ) -> SessionResult<bool> {
        match frame {
            TcpFrame::Control(nachricht) => match sitzung {
                Sitzung::Verbunden => self.handshake_beginnen(nachricht, sitzung, framed).await,
                Sitzung::WarteAufProof(_) => {
                    self.handshake_abschliessen(nachricht, sitzung, sende_rx, framed, dispatcher)
                        .await
                }
                Sitzung::Authentifiziert(_) => Err(SessionError::protokoll(
                    "Klartext-Nachricht nach abgeschlossenem Handshake",
                )),
            },

            TcpFrame::Sealed(versiegelt) => {
                let aktiv = match sitzung {
                    Sitzung::Authentifiziert(aktiv) => aktiv,
                    _ => {
                        return Err(SessionError::protokoll(
                            "Versiegeltes Frame vor der Authentifizierung",
                        ))
                    }
                };

                let klartext =
                    fluester_crypto::oeffnen(aktiv.session_key.as_bytes(), &versiegelt, b"")?;
                let nachricht = ControlMessage::from_bytes(&klartext).map_err(|e| {
                    SessionError::protokoll(format!("Ungueltige Steuernachricht: {e}"))
                })?;

                match dispatcher.verarbeiten(&aktiv.benutzer, nachricht) {
                    Ok(Some(antwort)) => {
                        Self::versiegelt_senden(framed, &aktiv.session_key, antwort).await?;
                        Ok(true)
                    }
                    Ok(None) => Ok(true),
                    Err(e) if !e.ist_verbindungsfatal() => {
                        let fehler = ControlMessage::fehler(fehlercode_fuer(&e), e.to_string());
                        Self::versiegelt_senden(framed, &aktiv.session_key, fehler).await?;
                        Ok(true)
                    }
                    Err(e) => Err(e),
                }
            }

            TcpFrame::Chunk(chunk) => {
                let aktiv = match sitzung {
                    Sitzung::Authentifiziert(aktiv) => aktiv,
                    _ => {
                        return Err(SessionError::protokoll(
                            "Chunk-Frame vor der Authentifizierung",
                        ))
                    }
                };

                let aad = chunk::aad(&chunk.transfer_id, chunk.offset);
                let daten =
                    fluester_crypto::oeffnen(aktiv.session_key.as_bytes(), &chunk.sealed, &aad)?;

                match dispatcher.chunk_verarbeiten(
                    &aktiv.benutzer,
                    chunk.transfer_id,
                    chunk.offset,
                    daten,
                ) {
                    Ok(Some(antwort)) => {
                        Self::versiegelt_senden(framed, &aktiv.session_key, antwort).await?;
                        Ok(true)
                    }
                    Ok(None) => Ok(true),
                    Err(e) if !e.ist_verbindungsfatal() => {
                        let fehler = ControlMessage::fehler(fehlercode_fuer(&e), e.to_string());
                        Self::versiegelt_senden(framed, &aktiv.session_key, fehler).await?;
                        Ok(true)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Handshake Schritt 1: `auth_begin` beantworten
    async fn handshake_beginnen(
        &self,
        nachricht: ControlMessage,
        sitzung: &mut Sitzung,
        framed: &mut Framed<TcpStream, FrameCodec>,
    ) -> SessionResult<bool> {
        match nachricht {
            ControlMessage::AuthBegin(anfrage) => {
                let beginn = self.state.auth.beginnen(&anfrage.username).await?;

                let antwort = ControlMessage::AuthSalt(AuthSaltResponse {
                    salt: beginn.salt.clone(),
                    pending_registration: beginn.pending_registration,
                });
                framed.send(TcpFrame::Control(antwort)).await?;

                *sitzung = Sitzung::WarteAufProof(beginn);
                Ok(true)
            }
            ControlMessage::Ping => {
                framed.send(TcpFrame::Control(ControlMessage::Pong)).await?;
                Ok(true)
            }
            ControlMessage::Pong => Ok(true),
            andere => Err(SessionError::protokoll(format!(
                "Nachricht vor der Authentifizierung: {andere:?}"
            ))),
        }
    }

    /// Handshake Schritt 2: Proof pruefen, `auth_ok` oder `auth_rejected`
    ///
    /// `auth_ok` geht erst raus, nachdem der Auth-Service Credentials und
    /// UDP-Schluessel dauerhaft geschrieben hat – ein bestaetigter Login
    /// ist immer auch persistiert.
    async fn handshake_abschliessen(
        &self,
        nachricht: ControlMessage,
        sitzung: &mut Sitzung,
        sende_rx: &mut Option<mpsc::Receiver<Ausgehend>>,
        framed: &mut Framed<TcpStream, FrameCodec>,
        dispatcher: &MessageDispatcher<C, K>,
    ) -> SessionResult<bool> {
        let beginn = match sitzung {
            Sitzung::WarteAufProof(beginn) => beginn,
            _ => return Err(SessionError::intern("Handshake-Zustand verloren")),
        };

        match nachricht {
            ControlMessage::AuthProof(anfrage) => {
                match self.state.auth.abschliessen(beginn, &anfrage.proof).await {
                    Ok(erfolg) => {
                        // Letzte Klartext-Nachricht: ab hier kann der Client
                        // den Session-Schluessel selbst ableiten
                        let antwort = ControlMessage::AuthOk(AuthOkResponse {
                            session_salt: erfolg.session_salt.clone(),
                            udp_key: erfolg.udp_key.clone(),
                            udp_port: self.state.config.udp_port,
                        });
                        framed.send(TcpFrame::Control(antwort)).await?;

                        let (verbindungs_id, queue, _ersetzt) =
                            dispatcher.benutzer_beigetreten(&erfolg.benutzer);
                        *sende_rx = Some(queue);

                        tracing::info!(
                            peer = %self.peer_addr,
                            benutzer = %erfolg.benutzer,
                            neu_registriert = erfolg.neu_registriert,
                            "Verbindung authentifiziert"
                        );
                        *sitzung = Sitzung::Authentifiziert(AktiveSitzung {
                            benutzer: erfolg.benutzer,
                            session_key: erfolg.session_key,
                            verbindungs_id,
                        });
                        Ok(true)
                    }
                    Err(e) if e.ist_ablehnung() => {
                        tracing::warn!(
                            peer = %self.peer_addr,
                            benutzer = %beginn.benutzer,
                            "Authentifizierung abgelehnt"
                        );
                        framed
                            .send(TcpFrame::Control(ControlMessage::AuthRejected))
                            .await?;
                        Ok(false)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            ControlMessage::Ping => {
                framed.send(TcpFrame::Control(ControlMessage::Pong)).await?;
                Ok(true)
            }
            ControlMessage::Pong => Ok(true),
            andere => Err(SessionError::protokoll(format!(
                "Erwartet auth_proof, erhalten: {andere:?}"
            ))),
        }
    }

    /// Sendet eine Steuernachricht passend zum Zustand
    ///
    /// Vor dem Handshake im Klartext, danach versiegelt.
    async fn senden(
        framed: &mut Framed<TcpStream, FrameCodec>,
        sitzung: &Sitzung,
        nachricht: ControlMessage,
    ) -> SessionResult<()> {
        match sitzung {
            Sitzung::Authentifiziert(aktiv) => {
                Self::versiegelt_senden(framed, &aktiv.session_key, nachricht).await
            }
            _ => {
                framed.send(TcpFrame::Control(nachricht)).await?;
                Ok(())
            }
        }
    }

    /// Versiegelt eine Steuernachricht und sendet sie
    async fn versiegelt_senden(
        framed: &mut Framed<TcpStream, FrameCodec>,
        session_key: &SecretBytes,
        nachricht: ControlMessage,
    ) -> SessionResult<()> {
        let klartext = nachricht
            .to_bytes()
            .map_err(|e| SessionError::intern(format!("Serialisierung fehlgeschlagen: {e}")))?;
        let versiegelt = fluester_crypto::versiegeln(session_key.as_bytes(), &klartext, b"")?;
        framed.send(TcpFrame::Sealed(versiegelt)).await?;
        Ok(())
    }

    /// Sendet eine Nachricht aus der Broadcaster-Queue
    ///
    /// Die Queue existiert erst nach dem Handshake, daher ist die
    /// Verbindung hier immer authentifiziert.
    async fn ausgehend_senden(
        framed: &mut Framed<TcpStream, FrameCodec>,
        sitzung: &Sitzung,
        nachricht: Ausgehend,
    ) -> SessionResult<()> {
        let aktiv = match sitzung {
            Sitzung::Authentifiziert(aktiv) => aktiv,
            _ => return Err(SessionError::intern("Broadcast vor der Authentifizierung")),
        };

        match nachricht {
            Ausgehend::Control(msg) => {
                Self::versiegelt_senden(framed, &aktiv.session_key, msg).await
            }
            Ausgehend::Chunk {
                transfer_id,
                offset,
                daten,
            } => {
                let aad = chunk::aad(&transfer_id, offset);
                let sealed =
                    fluester_crypto::versiegeln(aktiv.session_key.as_bytes(), &daten, &aad)?;
                framed
                    .send(TcpFrame::Chunk(ChunkFrame {
                        transfer_id,
                        offset,
                        sealed,
                    }))
                    .await?;
                Ok(())
            }
        }
    }
}

/// Wartet auf die Broadcaster-Queue; schlaeft solange es keine gibt
async fn empfangen(sende_rx: &mut Option<mpsc::Receiver<Ausgehend>>) -> Option<Ausgehend> {
    match sende_rx.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
