//! Message-Dispatcher – Verarbeitet Nachrichten authentifizierter Clients
//!
//! Der Dispatcher empfaengt entsiegelte ControlMessages und Chunk-Daten
//! von einer ClientConnection, fuehrt die Operation auf dem geteilten
//! Zustand aus und verteilt die Folgen ueber den Broadcaster.
//!
//! ## Fehlerdisziplin
//! `Ok(Some(antwort))` geht versiegelt an den Absender zurueck.
//! Nicht-fatale Fehler (zu grosse Datei, unbekannter Transfer) werden
//! vom Aufrufer in eine Fehler-Nachricht uebersetzt; fatale Fehler
//! (Protokollverletzung, Krypto) beenden die Verbindung des Absenders.
//!
//! Der Handshake selbst laeuft nicht hier: Auth-Nachrichten nach
//! abgeschlossenem Handshake sind eine Protokollverletzung.

use chrono::Utc;
use fluester_core::event::FluesterEvent;
use fluester_core::types::{TransferId, Username};
use fluester_protocol::control::{
    AbortReason, ChatMessage, ControlMessage, ErrorCode, FileAcceptMessage, FileCompleteMessage,
    FileOfferMessage, FileRejectMessage, ProgressMessage,
};
use fluester_store::{CredentialStore, KeyStore};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::broadcast::Ausgehend;
use crate::error::{SessionError, SessionResult};
use crate::server_state::SessionState;
use crate::transfer::TransferZustand;

/// Uebersetzt einen nicht-fatalen Fehler in den Fehlercode der Antwort
pub fn fehlercode_fuer(fehler: &SessionError) -> ErrorCode {
    match fehler {
        SessionError::DateiZuGross { .. } => ErrorCode::FileTooLarge,
        SessionError::TransferUnbekannt(_) | SessionError::TransferZustand(_) => {
            ErrorCode::UnknownTransfer
        }
        SessionError::Protokoll(_) => ErrorCode::ProtocolViolation,
        SessionError::Krypto(_) => ErrorCode::CryptoFailed,
        SessionError::Auth(_) => ErrorCode::AuthFailed,
        SessionError::Speicher(_) => ErrorCode::StorageFailed,
        SessionError::ServerVoll => ErrorCode::ServerFull,
        SessionError::Timeout => ErrorCode::Timeout,
        _ => ErrorCode::InternalError,
    }
}

/// Zentraler Message-Dispatcher
///
/// Routet eingehende Nachrichten authentifizierter Clients auf den
/// geteilten Server-Zustand und verteilt Broadcasts.
pub struct MessageDispatcher<C, K>
where
    C: CredentialStore + 'static,
    K: KeyStore + 'static,
{
    state: Arc<SessionState<C, K>>,
}

impl<C, K> MessageDispatcher<C, K>
where
    C: CredentialStore + 'static,
    K: KeyStore + 'static,
{
    /// Erstellt einen neuen Dispatcher
    pub fn neu(state: Arc<SessionState<C, K>>) -> Self {
        Self { state }
    }

    /// Verarbeitet eine entsiegelte Steuernachricht
    ///
    /// Gibt `Some(antwort)` zurueck wenn der Absender eine direkte
    /// Antwort erhalten soll; Broadcasts laufen ueber den Broadcaster.
    pub fn verarbeiten(
        &self,
        von: &Username,
        nachricht: ControlMessage,
    ) -> SessionResult<Option<ControlMessage>> {
        match nachricht {
            ControlMessage::Chat(chat) => {
                self.chat_verteilen(von, chat.text);
                Ok(None)
            }
            ControlMessage::FileOffer(angebot) => self.angebot_verarbeiten(von, angebot),
            ControlMessage::FileAccept(FileAcceptMessage { id }) => {
                self.annahme_verarbeiten(von, id)
            }
            ControlMessage::FileReject(FileRejectMessage { id }) => {
                self.ablehnung_verarbeiten(von, id)
            }
            ControlMessage::FileComplete(FileCompleteMessage { id }) => {
                self.abschluss_verarbeiten(von, id)
            }
            ControlMessage::FileAbort(abbruch) => {
                self.abbruch_verarbeiten(von, abbruch.id, abbruch.reason)
            }
            ControlMessage::Ping => Ok(Some(ControlMessage::Pong)),
            ControlMessage::Pong => Ok(None),
            ControlMessage::AuthBegin(_) | ControlMessage::AuthProof(_) => Err(
                SessionError::protokoll("Auth-Nachricht nach abgeschlossenem Handshake"),
            ),
            andere => Err(SessionError::protokoll(format!(
                "Unerwartete Nachricht vom Client: {andere:?}"
            ))),
        }
    }

    /// Verarbeitet einen entsiegelten Datei-Chunk
    ///
    /// Verbucht den Chunk, leitet ihn an den Empfaenger weiter und
    /// meldet Fortschritt im konfigurierten Takt.
    pub fn chunk_verarbeiten(
        &self,
        von: &Username,
        transfer_id: TransferId,
        offset: u64,
        daten: Vec<u8>,
    ) -> SessionResult<Option<ControlMessage>> {
        let quittung = self
            .state
            .transfers
            .chunk_verbuchen(transfer_id, von, offset, daten.len())?;

        let zugestellt = self.state.broadcaster.an_benutzer_senden(
            &quittung.empfaenger,
            Ausgehend::Chunk {
                transfer_id,
                offset,
                daten,
            },
        );
        if !zugestellt {
            // Empfaenger weg oder Queue dauerhaft voll: lieber sauber
            // abbrechen als den Transfer still zu verstuemmeln
            tracing::warn!(
                %transfer_id,
                empfaenger = %quittung.empfaenger,
                "Chunk nicht zustellbar – Transfer wird abgebrochen"
            );
            let _ = self.state.transfers.abbrechen(transfer_id, von);
            self.state.ereignis_melden(FluesterEvent::TransferAbgebrochen {
                id: transfer_id,
                grund: AbortReason::Disconnected.to_string(),
            });
            return Ok(Some(ControlMessage::abbruch(
                transfer_id,
                AbortReason::Disconnected,
            )));
        }

        if let Some((bytes, groesse)) = quittung.fortschritt {
            self.state.broadcaster.an_benutzer_senden(
                &quittung.empfaenger,
                Ausgehend::Control(ControlMessage::Progress(ProgressMessage {
                    id: transfer_id,
                    bytes,
                    size: groesse,
                })),
            );
            self.state.ereignis_melden(FluesterEvent::TransferFortschritt {
                id: transfer_id,
                bytes,
                groesse,
            });
        }
        Ok(None)
    }

    /// Registriert einen frisch authentifizierten Benutzer
    ///
    /// Verteilt Beitritts-Mitteilung und Roster. Bei einer Ersetzung
    /// (Benutzer war schon verbunden) entfallen die Mitteilungen, aber
    /// die Transfers der alten Sitzung werden abgeraeumt – Transfers
    /// sind sitzungsgebunden.
    pub fn benutzer_beigetreten(
        &self,
        benutzer: &Username,
    ) -> (u64, mpsc::Receiver<Ausgehend>, bool) {
        let (verbindungs_id, queue, ersetzt) =
            self.state.broadcaster.registrieren(benutzer.clone());

        if ersetzt {
            tracing::info!(benutzer = %benutzer, "Bestehende Verbindung ersetzt");
            self.transfer_abbrueche_verteilen(benutzer, AbortReason::Disconnected);
        } else {
            self.state.broadcaster.an_alle_senden(ControlMessage::system(format!(
                "{benutzer} ist dem Chat beigetreten."
            )));
            self.state.ereignis_melden(FluesterEvent::BenutzerVerbunden {
                benutzer: benutzer.clone(),
            });
        }
        self.roster_verteilen();

        (verbindungs_id, queue, ersetzt)
    }

    /// Raeumt die Ressourcen einer beendeten Verbindung ab
    ///
    /// Entfernt nur, wenn die Verbindungs-ID noch aktuell ist – eine
    /// ersetzte Verbindung hat nichts mehr abzuraeumen, ihr Nachfolger
    /// besitzt den Benutzerzustand.
    pub fn benutzer_gegangen(&self, benutzer: &Username, verbindungs_id: u64, grund: &str) {
        if !self.state.broadcaster.entfernen(benutzer, verbindungs_id) {
            tracing::debug!(benutzer = %benutzer, "Verbindung war bereits ersetzt");
            return;
        }

        self.transfer_abbrueche_verteilen(benutzer, AbortReason::Disconnected);

        self.state.broadcaster.an_alle_senden(ControlMessage::system(format!(
            "{benutzer} hat den Chat verlassen."
        )));
        self.roster_verteilen();
        self.state.ereignis_melden(FluesterEvent::BenutzerGetrennt {
            benutzer: benutzer.clone(),
            grund: grund.to_string(),
        });
        tracing::debug!(benutzer = %benutzer, grund, "Client-Ressourcen bereinigt");
    }

    // -----------------------------------------------------------------------
    // Chat und Roster
    // -----------------------------------------------------------------------

    fn chat_verteilen(&self, von: &Username, text: String) {
        // Absender und Zeitstempel setzt der Server, nie der Client
        let ts = Utc::now();
        let nachricht = ControlMessage::Chat(ChatMessage {
            text: text.clone(),
            sender: Some(von.clone()),
            ts: Some(ts),
        });
        let erreicht = self.state.broadcaster.an_alle_senden(nachricht);
        tracing::debug!(von = %von, erreicht, "Chat verteilt");

        self.state.ereignis_melden(FluesterEvent::Chat {
            von: von.clone(),
            text,
            ts,
        });
    }

    fn roster_verteilen(&self) {
        let roster = ControlMessage::roster(self.state.broadcaster.roster());
        self.state.broadcaster.an_alle_senden(roster);
    }

    // -----------------------------------------------------------------------
    // Datei-Transfers
    // -----------------------------------------------------------------------

    fn angebot_verarbeiten(
        &self,
        von: &Username,
        angebot: FileOfferMessage,
    ) -> SessionResult<Option<ControlMessage>> {
        self.state.transfers.anbieten(
            angebot.id,
            von.clone(),
            angebot.filename.clone(),
            angebot.size,
        )?;

        let erreicht = self
            .state
            .broadcaster
            .an_alle_ausser_senden(von, ControlMessage::FileOffer(angebot.clone()));
        tracing::info!(
            von = %von,
            id = %angebot.id,
            dateiname = %angebot.filename,
            groesse = angebot.size,
            erreicht,
            "Datei-Angebot verteilt"
        );
        Ok(None)
    }

    fn annahme_verarbeiten(
        &self,
        von: &Username,
        id: TransferId,
    ) -> SessionResult<Option<ControlMessage>> {
        let anbieter = self.state.transfers.annehmen(id, von)?;
        self.state.broadcaster.an_benutzer_senden(
            &anbieter,
            Ausgehend::Control(ControlMessage::FileAccept(FileAcceptMessage { id })),
        );
        tracing::info!(%id, von = %von, anbieter = %anbieter, "Angebot angenommen");
        Ok(None)
    }

    fn ablehnung_verarbeiten(
        &self,
        von: &Username,
        id: TransferId,
    ) -> SessionResult<Option<ControlMessage>> {
        let anbieter = self.state.transfers.ablehnen(id, von)?;
        self.state.broadcaster.an_benutzer_senden(
            &anbieter,
            Ausgehend::Control(ControlMessage::FileReject(FileRejectMessage { id })),
        );
        tracing::info!(%id, von = %von, "Angebot abgelehnt");
        Ok(None)
    }

    fn abschluss_verarbeiten(
        &self,
        von: &Username,
        id: TransferId,
    ) -> SessionResult<Option<ControlMessage>> {
        let quittung = self.state.transfers.abschliessen(id, von)?;

        if quittung.ist_vollstaendig() {
            self.state.broadcaster.an_benutzer_senden(
                &quittung.empfaenger,
                Ausgehend::Control(ControlMessage::FileComplete(FileCompleteMessage { id })),
            );
            self.state
                .ereignis_melden(FluesterEvent::TransferAbgeschlossen { id });
            tracing::info!(%id, bytes = quittung.erhalten, "Transfer vollstaendig");
            return Ok(None);
        }

        // Byte-Summe widerspricht der Ankuendigung: beide Seiten erfahren
        // vom Abbruch, der Transfer ist damit beendet
        tracing::warn!(
            %id,
            erhalten = quittung.erhalten,
            erwartet = quittung.erwartet,
            "Transfer unvollstaendig abgeschlossen"
        );
        let abbruch = ControlMessage::abbruch(id, AbortReason::IncompleteTransfer);
        self.state
            .broadcaster
            .an_benutzer_senden(&quittung.empfaenger, Ausgehend::Control(abbruch.clone()));
        self.state.ereignis_melden(FluesterEvent::TransferAbgebrochen {
            id,
            grund: AbortReason::IncompleteTransfer.to_string(),
        });
        Ok(Some(abbruch))
    }

    fn abbruch_verarbeiten(
        &self,
        von: &Username,
        id: TransferId,
        grund: AbortReason,
    ) -> SessionResult<Option<ControlMessage>> {
        let quittung = self.state.transfers.abbrechen(id, von)?;
        let weiterleitung = ControlMessage::abbruch(id, grund);

        if quittung.zustand == TransferZustand::Angeboten {
            // Zurueckgezogenes Angebot: alle Angeschriebenen informieren
            self.state
                .broadcaster
                .an_alle_ausser_senden(von, weiterleitung);
        } else {
            let gegenseite = if &quittung.anbieter == von {
                quittung.empfaenger
            } else {
                Some(quittung.anbieter)
            };
            if let Some(ziel) = gegenseite {
                self.state
                    .broadcaster
                    .an_benutzer_senden(&ziel, Ausgehend::Control(weiterleitung));
            }
        }

        self.state.ereignis_melden(FluesterEvent::TransferAbgebrochen {
            id,
            grund: grund.to_string(),
        });
        tracing::info!(%id, von = %von, grund = %grund, "Transfer abgebrochen");
        Ok(None)
    }

    fn transfer_abbrueche_verteilen(&self, benutzer: &Username, grund: AbortReason) {
        for (id, quittung) in self.state.transfers.verbindungs_abbruch(benutzer) {
            let abbruch = ControlMessage::abbruch(id, grund);

            if quittung.zustand == TransferZustand::Angeboten {
                self.state
                    .broadcaster
                    .an_alle_ausser_senden(benutzer, abbruch);
            } else {
                let gegenseite = if &quittung.anbieter == benutzer {
                    quittung.empfaenger
                } else {
                    Some(quittung.anbieter)
                };
                if let Some(ziel) = gegenseite {
                    self.state
                        .broadcaster
                        .an_benutzer_senden(&ziel, Ausgehend::Control(abbruch));
                }
            }
            self.state.ereignis_melden(FluesterEvent::TransferAbgebrochen {
                id,
                grund: grund.to_string(),
            });
        }
    }
}
