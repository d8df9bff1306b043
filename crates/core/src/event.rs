//! Ereignisse an der Praesentationsgrenze
//!
//! Der Kern meldet Sitzungsgeschehen (Chat, Roster, Transfer-Fortschritt,
//! Trennungen) als Ereignisse ueber einen tokio-Broadcast-Kanal. Die
//! Praesentationsschicht konsumiert diese Ereignisse; zurueck in den Kern
//! fliessen nur Benutzerabsichten (Chat senden, Datei anbieten, ...).

use crate::types::{TransferId, Username};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alle Ereignisse die der Kern nach aussen meldet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FluesterEvent {
    // --- Benutzer-Ereignisse ---
    /// Ein Benutzer hat sich authentifiziert und steht im Roster
    BenutzerVerbunden { benutzer: Username },
    /// Ein Benutzer hat die Verbindung verloren oder beendet
    BenutzerGetrennt { benutzer: Username, grund: String },

    // --- Chat ---
    /// Chat-Nachricht wurde an die Sitzungen verteilt
    Chat {
        von: Username,
        text: String,
        ts: DateTime<Utc>,
    },

    // --- Transfer ---
    /// Fortschritt einer laufenden Dateiuebertragung
    TransferFortschritt {
        id: TransferId,
        bytes: u64,
        groesse: u64,
    },
    /// Uebertragung vollstaendig angekommen
    TransferAbgeschlossen { id: TransferId },
    /// Uebertragung abgebrochen (Groessen-Mismatch, Trennung, Ablauf)
    TransferAbgebrochen { id: TransferId, grund: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ist_serde_kompatibel() {
        let event = FluesterEvent::BenutzerVerbunden {
            benutzer: Username::neu("alice").unwrap(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let _: FluesterEvent = serde_json::from_str(&json).unwrap();
    }

    #[test]
    fn fortschritt_traegt_beide_groessen() {
        let event = FluesterEvent::TransferFortschritt {
            id: TransferId::new(),
            bytes: 262_144,
            groesse: 10 * 1024 * 1024,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("262144"));
    }
}
