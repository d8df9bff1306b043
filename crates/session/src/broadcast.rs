//! Broadcaster – Send-Queues aller verbundenen Clients
//!
//! Der Broadcaster verwaltet pro authentifiziertem Benutzer eine
//! Send-Queue und stellt Methoden bereit, um Nachrichten gezielt oder
//! an alle zu senden. Seine Schluesselmenge IST das Roster: ein
//! Benutzer steht genau dann im Roster, wenn er eine Queue hat.
//!
//! ## Klartext in der Queue
//! Session-Schluessel sind verbindungslokal. Die Queues transportieren
//! deshalb Klartext-Nachrichten; jede Verbindung versiegelt beim
//! Schreiben auf den Socket mit ihrem eigenen Schluessel. Ein Broadcast
//! an N Clients versiegelt damit N-mal – einmal pro Empfaenger.
//!
//! ## Verbindungs-Ersetzung
//! Meldet sich ein bereits verbundener Benutzer erneut an, ersetzt die
//! neue Queue die alte. Die alte Verbindung bemerkt das am geschlossenen
//! Empfangsende und beendet sich; ihre Aufraeumarbeit entfernt die neue
//! Queue nicht, weil `entfernen` die Verbindungs-ID prueft.

use dashmap::DashMap;
use fluester_core::types::{TransferId, Username};
use fluester_protocol::control::ControlMessage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Groesse der Send-Queue pro Client
const SEND_QUEUE_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// Ausgehende Nachrichten
// ---------------------------------------------------------------------------

/// Eine Nachricht auf dem Weg zu einer Verbindung
///
/// Beide Varianten sind Klartext; die empfangende Verbindung versiegelt
/// mit ihrem Session-Schluessel (Control als versiegeltes Frame, Chunk
/// als binaeres Chunk-Frame mit Transfer-ID und Offset als AAD).
#[derive(Clone)]
pub enum Ausgehend {
    /// Steuernachricht (Chat, Roster, Progress, ...)
    Control(ControlMessage),
    /// Datei-Chunk eines laufenden Transfers
    Chunk {
        transfer_id: TransferId,
        offset: u64,
        daten: Vec<u8>,
    },
}

impl std::fmt::Debug for Ausgehend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Control(msg) => write!(f, "Ausgehend::Control({:?})", msg),
            Self::Chunk {
                transfer_id,
                offset,
                daten,
            } => write!(
                f,
                "Ausgehend::Chunk({}, offset={}, {} Bytes)",
                transfer_id,
                offset,
                daten.len()
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue eines verbundenen Clients
#[derive(Clone, Debug)]
pub struct ClientSender {
    /// Eindeutige ID der Verbindung, die diese Queue liest
    pub verbindungs_id: u64,
    pub tx: mpsc::Sender<Ausgehend>,
}

impl ClientSender {
    /// Sendet eine Nachricht nicht-blockierend an den Client
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, benutzer: &Username, nachricht: Ausgehend) -> bool {
        match self.tx.try_send(nachricht) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(benutzer = %benutzer, "Send-Queue voll – Nachricht verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(benutzer = %benutzer, "Send-Queue geschlossen (Client getrennt)");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Broadcaster
// ---------------------------------------------------------------------------

/// Zentraler Broadcaster fuer alle verbundenen Clients
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<BroadcasterInner>,
}

struct BroadcasterInner {
    /// Client-Sender, indiziert nach Benutzername
    clients: DashMap<Username, ClientSender>,
    /// Laufende Nummer fuer Verbindungs-IDs
    naechste_verbindungs_id: AtomicU64,
}

impl Broadcaster {
    /// Erstellt einen neuen Broadcaster
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(BroadcasterInner {
                clients: DashMap::new(),
                naechste_verbindungs_id: AtomicU64::new(1),
            }),
        }
    }

    /// Registriert einen Client und gibt seine Empfangs-Queue zurueck
    ///
    /// Die Verbindung liest aus dieser Queue und sendet via TCP. War der
    /// Benutzer bereits registriert, ersetzt die neue Queue die alte
    /// (`ersetzt` ist dann true); die alte Verbindung sieht daraufhin
    /// ihr Empfangsende geschlossen.
    pub fn registrieren(&self, benutzer: Username) -> (u64, mpsc::Receiver<Ausgehend>, bool) {
        let verbindungs_id = self
            .inner
            .naechste_verbindungs_id
            .fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SEND_QUEUE_GROESSE);
        let sender = ClientSender { verbindungs_id, tx };

        let alt = self.inner.clients.insert(benutzer.clone(), sender);
        let ersetzt = alt.is_some();
        tracing::debug!(
            benutzer = %benutzer,
            verbindungs_id,
            ersetzt,
            "Client im Broadcaster registriert"
        );
        (verbindungs_id, rx, ersetzt)
    }

    /// Entfernt einen Client aus dem Broadcaster
    ///
    /// Entfernt nur, wenn die Verbindungs-ID noch stimmt – eine ersetzte
    /// Verbindung darf die Queue ihres Nachfolgers nicht abraeumen.
    /// Gibt `true` zurueck wenn tatsaechlich entfernt wurde.
    pub fn entfernen(&self, benutzer: &Username, verbindungs_id: u64) -> bool {
        let entfernt = self
            .inner
            .clients
            .remove_if(benutzer, |_, sender| {
                sender.verbindungs_id == verbindungs_id
            })
            .is_some();
        if entfernt {
            tracing::debug!(benutzer = %benutzer, verbindungs_id, "Client aus Broadcaster entfernt");
        }
        entfernt
    }

    /// Sendet eine Nachricht an einen einzelnen Client
    ///
    /// Gibt `true` zurueck wenn der Client gefunden und die Nachricht
    /// eingereiht wurde.
    pub fn an_benutzer_senden(&self, benutzer: &Username, nachricht: Ausgehend) -> bool {
        match self.inner.clients.get(benutzer) {
            Some(sender) => sender.senden(benutzer, nachricht),
            None => {
                tracing::debug!(benutzer = %benutzer, "Senden an unbekannten Client");
                false
            }
        }
    }

    /// Sendet eine Steuernachricht an alle verbundenen Clients
    ///
    /// Gibt die Anzahl der erfolgreichen Sendungen zurueck.
    pub fn an_alle_senden(&self, nachricht: ControlMessage) -> usize {
        let mut gesendet = 0;
        self.inner.clients.iter().for_each(|entry| {
            if entry
                .value()
                .senden(entry.key(), Ausgehend::Control(nachricht.clone()))
            {
                gesendet += 1;
            }
        });
        gesendet
    }

    /// Sendet eine Steuernachricht an alle verbundenen Clients ausser einem
    ///
    /// Nuetzlich fuer Datei-Angebote, die der Anbieter nicht zurueckgespiegelt
    /// bekommen soll.
    pub fn an_alle_ausser_senden(
        &self,
        ausgeschlossen: &Username,
        nachricht: ControlMessage,
    ) -> usize {
        let mut gesendet = 0;
        self.inner.clients.iter().for_each(|entry| {
            if entry.key() == ausgeschlossen {
                return;
            }
            if entry
                .value()
                .senden(entry.key(), Ausgehend::Control(nachricht.clone()))
            {
                gesendet += 1;
            }
        });
        gesendet
    }

    /// Prueft ob ein Benutzer registriert ist
    pub fn ist_online(&self, benutzer: &Username) -> bool {
        self.inner.clients.contains_key(benutzer)
    }

    /// Gibt die Anzahl der registrierten Clients zurueck
    pub fn online_anzahl(&self) -> usize {
        self.inner.clients.len()
    }

    /// Gibt das aktuelle Roster zurueck (unsortiert)
    pub fn roster(&self) -> Vec<Username> {
        self.inner
            .clients
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
