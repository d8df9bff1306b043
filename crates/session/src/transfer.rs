//! Transfer-Manager – Zustand aller Datei-Uebertragungen
//!
//! Jede Uebertragung laeuft durch eine kleine Zustandsmaschine:
//!
//! ```text
//! Angeboten --annehmen--> Angenommen --chunk--> Laufend --abschliessen--> (vollstaendig)
//!     |                       |                    |
//!     +--ablehnen/TTL---------+----abbrechen------+--> (abgebrochen)
//! ```
//!
//! Abgeschlossene und abgebrochene Transfers werden aus der Tabelle
//! entfernt; die Tabelle haelt nur lebende Eintraege. Offene Angebote
//! verfallen nach einer TTL und verhalten sich danach wie unbekannte IDs.
//!
//! ## Chunk-Disziplin
//! TCP liefert in Reihenfolge, deshalb braucht der Empfaenger keinen
//! Umordnungspuffer. Der Manager erzwingt das serverseitig: jeder Chunk
//! muss exakt am laufenden Offset ansetzen, und die Summe darf die
//! angekuendigte Groesse nie ueberschreiten. Verstoesse sind
//! Protokollverletzungen und beenden die Verbindung des Senders.

use dashmap::DashMap;
use fluester_core::types::{TransferId, Username};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{SessionError, SessionResult};

// ---------------------------------------------------------------------------
// Zustaende und Quittungen
// ---------------------------------------------------------------------------

/// Lebende Zustaende einer Uebertragung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferZustand {
    /// Angebot verteilt, noch nicht angenommen
    Angeboten,
    /// Angenommen, noch kein Chunk eingetroffen
    Angenommen,
    /// Chunks fliessen
    Laufend,
}

/// Ergebnis eines verbuchten Chunks
#[derive(Debug, Clone)]
pub struct ChunkQuittung {
    /// Empfaenger, an den der Chunk weitergeleitet wird
    pub empfaenger: Username,
    /// `Some((bytes, groesse))` wenn eine Fortschrittsmeldung faellig ist
    pub fortschritt: Option<(u64, u64)>,
}

/// Ergebnis eines `file_complete`
#[derive(Debug, Clone)]
pub struct AbschlussQuittung {
    pub empfaenger: Username,
    /// Tatsaechlich verbuchte Bytes
    pub erhalten: u64,
    /// Angekuendigte Dateigroesse
    pub erwartet: u64,
}

impl AbschlussQuittung {
    /// Stimmen verbuchte und angekuendigte Bytes ueberein?
    pub fn ist_vollstaendig(&self) -> bool {
        self.erhalten == self.erwartet
    }
}

/// Ergebnis eines Abbruchs – wer war beteiligt, in welchem Zustand
#[derive(Debug, Clone)]
pub struct AbbruchQuittung {
    pub anbieter: Username,
    pub empfaenger: Option<Username>,
    /// Zustand unmittelbar vor dem Entfernen
    pub zustand: TransferZustand,
}

// ---------------------------------------------------------------------------
// TransferManager
// ---------------------------------------------------------------------------

struct Transfer {
    anbieter: Username,
    empfaenger: Option<Username>,
    dateiname: String,
    groesse: u64,
    bytes: u64,
    chunks: u64,
    zustand: TransferZustand,
    erstellt: Instant,
}

/// Verwaltet alle lebenden Datei-Uebertragungen
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct TransferManager {
    inner: Arc<TransferInner>,
}

struct TransferInner {
    eintraege: DashMap<TransferId, Transfer>,
    max_datei_bytes: u64,
    offer_ttl: Duration,
    progress_intervall_chunks: u64,
}

impl TransferManager {
    /// Erstellt einen neuen TransferManager
    pub fn neu(max_datei_bytes: u64, offer_ttl: Duration, progress_intervall_chunks: u64) -> Self {
        Self {
            inner: Arc::new(TransferInner {
                eintraege: DashMap::new(),
                max_datei_bytes,
                offer_ttl,
                progress_intervall_chunks: progress_intervall_chunks.max(1),
            }),
        }
    }

    /// Registriert ein neues Datei-Angebot
    ///
    /// Die Groesse wird vor dem ersten Byte geprueft – ein zu grosses
    /// Angebot wird abgelehnt, ohne dass je ein Chunk fliessen darf.
    pub fn anbieten(
        &self,
        id: TransferId,
        anbieter: Username,
        dateiname: String,
        groesse: u64,
    ) -> SessionResult<()> {
        if groesse > self.inner.max_datei_bytes {
            return Err(SessionError::DateiZuGross {
                groesse,
                maximum: self.inner.max_datei_bytes,
            });
        }
        if self.inner.eintraege.contains_key(&id) {
            return Err(SessionError::TransferZustand(format!(
                "Transfer-ID bereits vergeben: {id}"
            )));
        }

        self.inner.eintraege.insert(
            id,
            Transfer {
                anbieter: anbieter.clone(),
                empfaenger: None,
                dateiname: dateiname.clone(),
                groesse,
                bytes: 0,
                chunks: 0,
                zustand: TransferZustand::Angeboten,
                erstellt: Instant::now(),
            },
        );
        tracing::debug!(
            %id,
            anbieter = %anbieter,
            dateiname = %dateiname,
            groesse,
            "Datei-Angebot registriert"
        );
        Ok(())
    }

    /// Nimmt ein offenes Angebot an und bindet den Empfaenger
    ///
    /// Gibt den Anbieter zurueck, damit der Aufrufer ihn benachrichtigen
    /// kann. Das erste `file_accept` gewinnt; weitere werden mit einem
    /// Zustandsfehler beantwortet.
    pub fn annehmen(&self, id: TransferId, empfaenger: &Username) -> SessionResult<Username> {
        let mut eintrag = match self.inner.eintraege.get_mut(&id) {
            Some(e) => e,
            None => return Err(SessionError::TransferUnbekannt(id)),
        };

        if eintrag.erstellt.elapsed() > self.inner.offer_ttl {
            drop(eintrag);
            self.inner.eintraege.remove(&id);
            return Err(SessionError::TransferUnbekannt(id));
        }
        if eintrag.zustand != TransferZustand::Angeboten {
            return Err(SessionError::TransferZustand(
                "Transfer bereits angenommen".into(),
            ));
        }
        if &eintrag.anbieter == empfaenger {
            return Err(SessionError::TransferZustand(
                "Anbieter kann das eigene Angebot nicht annehmen".into(),
            ));
        }

        eintrag.empfaenger = Some(empfaenger.clone());
        eintrag.zustand = TransferZustand::Angenommen;
        tracing::debug!(%id, empfaenger = %empfaenger, "Angebot angenommen");
        Ok(eintrag.anbieter.clone())
    }

    /// Lehnt ein offenes Angebot ab und entfernt es
    ///
    /// Gibt den Anbieter zurueck, damit er das `file_reject` erhaelt.
    pub fn ablehnen(&self, id: TransferId, von: &Username) -> SessionResult<Username> {
        {
            let eintrag = match self.inner.eintraege.get(&id) {
                Some(e) => e,
                None => return Err(SessionError::TransferUnbekannt(id)),
            };
            if eintrag.zustand != TransferZustand::Angeboten {
                return Err(SessionError::TransferZustand(
                    "Nur offene Angebote koennen abgelehnt werden".into(),
                ));
            }
            if &eintrag.anbieter == von {
                return Err(SessionError::TransferZustand(
                    "Anbieter zieht Angebote per file_abort zurueck".into(),
                ));
            }
        }

        match self.inner.eintraege.remove(&id) {
            Some((_, transfer)) => {
                tracing::debug!(%id, von = %von, "Angebot abgelehnt");
                Ok(transfer.anbieter)
            }
            None => Err(SessionError::TransferUnbekannt(id)),
        }
    }

    /// Verbucht einen eingetroffenen Chunk
    ///
    /// Prueft Absender, Zustand, laufenden Offset und Groessenbudget.
    /// Verstoesse liefern [`SessionError::Protokoll`] und sind fuer die
    /// Verbindung des Senders fatal.
    pub fn chunk_verbuchen(
        &self,
        id: TransferId,
        von: &Username,
        offset: u64,
        laenge: usize,
    ) -> SessionResult<ChunkQuittung> {
        let mut eintrag = match self.inner.eintraege.get_mut(&id) {
            Some(e) => e,
            None => return Err(SessionError::TransferUnbekannt(id)),
        };

        if &eintrag.anbieter != von {
            return Err(SessionError::protokoll(format!(
                "Chunk fuer {id} von fremder Verbindung"
            )));
        }
        if eintrag.zustand == TransferZustand::Angeboten {
            return Err(SessionError::protokoll(format!(
                "Chunk fuer {id} vor Annahme des Angebots"
            )));
        }
        if offset != eintrag.bytes {
            return Err(SessionError::protokoll(format!(
                "Chunk-Offset {} passt nicht zum erwarteten Offset {}",
                offset, eintrag.bytes
            )));
        }
        if laenge == 0 {
            return Err(SessionError::protokoll(format!("Leerer Chunk fuer {id}")));
        }
        let neue_summe = eintrag.bytes + laenge as u64;
        if neue_summe > eintrag.groesse {
            return Err(SessionError::protokoll(format!(
                "Chunk ueberschreitet die angekuendigte Groesse: {} > {} Bytes",
                neue_summe, eintrag.groesse
            )));
        }

        eintrag.bytes = neue_summe;
        eintrag.chunks += 1;
        eintrag.zustand = TransferZustand::Laufend;

        let empfaenger = match eintrag.empfaenger.clone() {
            Some(e) => e,
            None => {
                return Err(SessionError::intern(format!(
                    "Transfer {id} angenommen aber ohne Empfaenger"
                )))
            }
        };
        let fortschritt = (eintrag.chunks % self.inner.progress_intervall_chunks == 0)
            .then_some((eintrag.bytes, eintrag.groesse));

        Ok(ChunkQuittung {
            empfaenger,
            fortschritt,
        })
    }

    /// Schliesst eine Uebertragung ab und entfernt sie
    ///
    /// Der Aufrufer prueft `ist_vollstaendig()`: bei Gleichstand ist der
    /// Transfer abgeschlossen, sonst wird er als unvollstaendig
    /// abgebrochen. Entfernt wird der Eintrag in beiden Faellen.
    pub fn abschliessen(&self, id: TransferId, von: &Username) -> SessionResult<AbschlussQuittung> {
        {
            let eintrag = match self.inner.eintraege.get(&id) {
                Some(e) => e,
                None => return Err(SessionError::TransferUnbekannt(id)),
            };
            if &eintrag.anbieter != von {
                return Err(SessionError::protokoll(format!(
                    "Abschluss fuer {id} von fremder Verbindung"
                )));
            }
            if eintrag.zustand == TransferZustand::Angeboten {
                return Err(SessionError::protokoll(format!(
                    "Abschluss fuer {id} vor Annahme des Angebots"
                )));
            }
        }

        let (_, transfer) = match self.inner.eintraege.remove(&id) {
            Some(paar) => paar,
            None => return Err(SessionError::TransferUnbekannt(id)),
        };
        let empfaenger = match transfer.empfaenger {
            Some(e) => e,
            None => {
                return Err(SessionError::intern(format!(
                    "Transfer {id} angenommen aber ohne Empfaenger"
                )))
            }
        };

        tracing::debug!(
            %id,
            erhalten = transfer.bytes,
            erwartet = transfer.groesse,
            "Transfer abgeschlossen"
        );
        Ok(AbschlussQuittung {
            empfaenger,
            erhalten: transfer.bytes,
            erwartet: transfer.groesse,
        })
    }

    /// Bricht eine Uebertragung auf Wunsch eines Beteiligten ab
    ///
    /// Nur Anbieter und gebundener Empfaenger duerfen abbrechen; andere
    /// Clients erhalten einen Zustandsfehler, ohne dass der Transfer
    /// beruehrt wird.
    pub fn abbrechen(&self, id: TransferId, von: &Username) -> SessionResult<AbbruchQuittung> {
        {
            let eintrag = match self.inner.eintraege.get(&id) {
                Some(e) => e,
                None => return Err(SessionError::TransferUnbekannt(id)),
            };
            let beteiligt =
                &eintrag.anbieter == von || eintrag.empfaenger.as_ref() == Some(von);
            if !beteiligt {
                return Err(SessionError::TransferZustand(
                    "Nicht am Transfer beteiligt".into(),
                ));
            }
        }

        match self.inner.eintraege.remove(&id) {
            Some((_, transfer)) => {
                tracing::debug!(%id, von = %von, "Transfer abgebrochen");
                Ok(AbbruchQuittung {
                    anbieter: transfer.anbieter,
                    empfaenger: transfer.empfaenger,
                    zustand: transfer.zustand,
                })
            }
            None => Err(SessionError::TransferUnbekannt(id)),
        }
    }

    /// Entfernt alle Uebertragungen eines getrennten Benutzers
    ///
    /// Gibt die Quittungen der entfernten Transfers zurueck, damit die
    /// jeweilige Gegenseite ein `file_abort` erhalten kann.
    pub fn verbindungs_abbruch(&self, benutzer: &Username) -> Vec<(TransferId, AbbruchQuittung)> {
        let betroffen: Vec<TransferId> = self
            .inner
            .eintraege
            .iter()
            .filter(|eintrag| {
                &eintrag.anbieter == benutzer || eintrag.empfaenger.as_ref() == Some(benutzer)
            })
            .map(|eintrag| *eintrag.key())
            .collect();

        let mut quittungen = Vec::with_capacity(betroffen.len());
        for id in betroffen {
            if let Some((_, transfer)) = self.inner.eintraege.remove(&id) {
                quittungen.push((
                    id,
                    AbbruchQuittung {
                        anbieter: transfer.anbieter,
                        empfaenger: transfer.empfaenger,
                        zustand: transfer.zustand,
                    },
                ));
            }
        }
        quittungen
    }

    /// Entfernt abgelaufene offene Angebote
    ///
    /// Angenommene Uebertragungen verfallen nicht; sie leben bis zum
    /// Abschluss, Abbruch oder Verbindungsende. Gibt `(id, anbieter)`
    /// der entfernten Angebote zurueck.
    pub fn abgelaufene_entfernen(&self) -> Vec<(TransferId, Username)> {
        let abgelaufen: Vec<TransferId> = self
            .inner
            .eintraege
            .iter()
            .filter(|eintrag| {
                eintrag.zustand == TransferZustand::Angeboten
                    && eintrag.erstellt.elapsed() > self.inner.offer_ttl
            })
            .map(|eintrag| *eintrag.key())
            .collect();

        let mut entfernt = Vec::with_capacity(abgelaufen.len());
        for id in abgelaufen {
            if let Some((_, transfer)) = self.inner.eintraege.remove(&id) {
                tracing::debug!(%id, anbieter = %transfer.anbieter, "Angebot abgelaufen");
                entfernt.push((id, transfer.anbieter));
            }
        }
        entfernt
    }

    /// Gibt die Anzahl lebender Uebertragungen zurueck
    pub fn anzahl(&self) -> usize {
        self.inner.eintraege.len()
    }

    /// Gibt den Zustand einer Uebertragung zurueck (None wenn entfernt)
    pub fn zustand(&self, id: &TransferId) -> Option<TransferZustand> {
        self.inner.eintraege.get(id).map(|eintrag| eintrag.zustand)
    }

    /// Gibt den Dateinamen einer lebenden Uebertragung zurueck
    pub fn dateiname(&self, id: &TransferId) -> Option<String> {
        self.inner
            .eintraege
            .get(id)
            .map(|eintrag| eintrag.dateiname.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
