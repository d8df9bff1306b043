//! Endpunkt-Tabelle – In-Memory Zustand aller aktiven Relay-Teilnehmer
//!
//! Der Relay kennt pro Benutzer genau einen Eintrag: die zuletzt gesehene
//! Absenderadresse, eine Kopie des UDP-Schluessels aus dem Key-Store und
//! den Zeitpunkt des letzten Pakets. Diese Tabelle ist der einzige
//! Zustand des Relays und wird nie persistiert – die dauerhafte Wahrheit
//! ueber Schluessel liegt im Key-Store, den der TCP-Server schreibt.
//!
//! Thread-safe durch DashMap (lock-freie Reads im Hot Path).

use dashmap::DashMap;
use fluester_core::types::Username;
use fluester_crypto::SecretBytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// RelayEndpunkt
// ---------------------------------------------------------------------------

/// Eintrag eines aktiven Relay-Teilnehmers
#[derive(Debug, Clone)]
pub struct RelayEndpunkt {
    /// Zuletzt gesehene Absenderadresse
    pub addr: SocketAddr,
    /// UDP-Schluessel (Kopie aus dem Key-Store)
    pub schluessel: SecretBytes,
    /// Zeitpunkt des letzten empfangenen Pakets
    pub letzter_kontakt: Instant,
}

impl RelayEndpunkt {
    fn neu(addr: SocketAddr, schluessel: SecretBytes) -> Self {
        Self {
            addr,
            schluessel,
            letzter_kontakt: Instant::now(),
        }
    }

    /// Prueft ob der Endpunkt als tot gilt (kein Paket seit `fenster`)
    pub fn ist_abgelaufen(&self, fenster: Duration) -> bool {
        self.letzter_kontakt.elapsed() > fenster
    }
}

// ---------------------------------------------------------------------------
// EndpunktTabelle
// ---------------------------------------------------------------------------

/// Tabelle aller aktiven Relay-Endpunkte
///
/// Clone teilt den inneren Zustand (Arc).
#[derive(Clone)]
pub struct EndpunktTabelle {
    eintraege: Arc<DashMap<Username, RelayEndpunkt>>,
}

impl EndpunktTabelle {
    /// Erstellt eine leere Tabelle
    pub fn neu() -> Self {
        Self {
            eintraege: Arc::new(DashMap::new()),
        }
    }

    /// Registriert einen Endpunkt mit frischem Zeitstempel
    pub fn registrieren(&self, benutzer: Username, addr: SocketAddr, schluessel: Vec<u8>) {
        tracing::info!(benutzer = %benutzer, endpunkt = %addr, "Relay-Endpunkt registriert");
        self.eintraege
            .insert(benutzer, RelayEndpunkt::neu(addr, SecretBytes::new(schluessel)));
    }

    /// Frischt Adresse und Liveness eines bestehenden Endpunkts auf
    ///
    /// Clients hinter NAT wechseln gelegentlich den Quellport; die
    /// Tabelle folgt immer der zuletzt gesehenen Adresse.
    pub fn kontakt_aktualisieren(&self, benutzer: &Username, addr: SocketAddr) -> bool {
        match self.eintraege.get_mut(benutzer) {
            Some(mut eintrag) => {
                if eintrag.addr != addr {
                    tracing::debug!(
                        benutzer = %benutzer,
                        alt = %eintrag.addr,
                        neu = %addr,
                        "Relay-Endpunkt-Adresse gewechselt"
                    );
                    eintrag.addr = addr;
                }
                eintrag.letzter_kontakt = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Ersetzt den gespeicherten Schluessel (nach einer Rotation ueber TCP)
    pub fn schluessel_aktualisieren(&self, benutzer: &Username, schluessel: Vec<u8>) -> bool {
        match self.eintraege.get_mut(benutzer) {
            Some(mut eintrag) => {
                eintrag.schluessel = SecretBytes::new(schluessel);
                true
            }
            None => false,
        }
    }

    /// Gibt den gespeicherten Schluessel zurueck
    pub fn schluessel(&self, benutzer: &Username) -> Option<SecretBytes> {
        self.eintraege.get(benutzer).map(|e| e.schluessel.clone())
    }

    /// Gibt Adresse und Schluessel eines Endpunkts zurueck
    pub fn eintrag(&self, benutzer: &Username) -> Option<(SocketAddr, SecretBytes)> {
        self.eintraege
            .get(benutzer)
            .map(|e| (e.addr, e.schluessel.clone()))
    }

    /// Entfernt einen Endpunkt
    pub fn entfernen(&self, benutzer: &Username) -> bool {
        self.eintraege.remove(benutzer).is_some()
    }

    /// Prueft ob ein Benutzer einen aktiven Endpunkt hat
    pub fn ist_registriert(&self, benutzer: &Username) -> bool {
        self.eintraege.contains_key(benutzer)
    }

    /// Snapshot aller Endpunkte ausser dem Absender
    ///
    /// Gibt Kopien zurueck, damit der Aufrufer ohne gehaltene Map-Locks
    /// versiegeln und senden kann.
    pub fn alle_ausser(&self, ausser: &Username) -> Vec<(Username, SocketAddr, SecretBytes)> {
        self.eintraege
            .iter()
            .filter(|e| e.key() != ausser)
            .map(|e| (e.key().clone(), e.addr, e.schluessel.clone()))
            .collect()
    }

    /// Entfernt alle Endpunkte ohne Verkehr innerhalb des Fensters
    ///
    /// Gibt die entfernten Benutzer zurueck.
    pub fn abgelaufene_entfernen(&self, fenster: Duration) -> Vec<Username> {
        let abgelaufen: Vec<Username> = self
            .eintraege
            .iter()
            .filter(|e| e.ist_abgelaufen(fenster))
            .map(|e| e.key().clone())
            .collect();

        for benutzer in &abgelaufen {
            self.eintraege.remove(benutzer);
        }
        abgelaufen
    }

    /// Anzahl aktiver Endpunkte
    pub fn anzahl(&self) -> usize {
        self.eintraege.len()
    }
}

impl Default for EndpunktTabelle {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn endpunkt(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    fn benutzer(name: &str) -> Username {
        Username::neu(name).unwrap()
    }

    #[test]
    fn registrieren_und_abfragen() {
        let tabelle = EndpunktTabelle::neu();
        tabelle.registrieren(benutzer("alice"), endpunkt(30000), vec![1u8; 32]);

        assert!(tabelle.ist_registriert(&benutzer("alice")));
        assert_eq!(tabelle.anzahl(), 1);

        let (addr, schluessel) = tabelle.eintrag(&benutzer("alice")).unwrap();
        assert_eq!(addr, endpunkt(30000));
        assert_eq!(schluessel.as_bytes(), &[1u8; 32]);
    }

    #[test]
    fn kontakt_aktualisieren_folgt_der_adresse() {
        let tabelle = EndpunktTabelle::neu();
        tabelle.registrieren(benutzer("alice"), endpunkt(30001), vec![1u8; 32]);

        assert!(tabelle.kontakt_aktualisieren(&benutzer("alice"), endpunkt(30002)));
        let (addr, _) = tabelle.eintrag(&benutzer("alice")).unwrap();
        assert_eq!(addr, endpunkt(30002), "NAT-Rebinding muss Adresse ersetzen");

        assert!(!tabelle.kontakt_aktualisieren(&benutzer("niemand"), endpunkt(30003)));
    }

    #[test]
    fn schluessel_aktualisieren_ersetzt_kopie() {
        let tabelle = EndpunktTabelle::neu();
        tabelle.registrieren(benutzer("alice"), endpunkt(30004), vec![1u8; 32]);

        assert!(tabelle.schluessel_aktualisieren(&benutzer("alice"), vec![2u8; 32]));
        let schluessel = tabelle.schluessel(&benutzer("alice")).unwrap();
        assert_eq!(schluessel.as_bytes(), &[2u8; 32]);
    }

    #[test]
    fn entfernen_loescht_eintrag() {
        let tabelle = EndpunktTabelle::neu();
        tabelle.registrieren(benutzer("alice"), endpunkt(30005), vec![1u8; 32]);

        assert!(tabelle.entfernen(&benutzer("alice")));
        assert!(!tabelle.ist_registriert(&benutzer("alice")));
        assert!(!tabelle.entfernen(&benutzer("alice")));
    }

    #[test]
    fn alle_ausser_filtert_den_absender() {
        let tabelle = EndpunktTabelle::neu();
        tabelle.registrieren(benutzer("alice"), endpunkt(30006), vec![1u8; 32]);
        tabelle.registrieren(benutzer("bob"), endpunkt(30007), vec![2u8; 32]);
        tabelle.registrieren(benutzer("carol"), endpunkt(30008), vec![3u8; 32]);

        let andere = tabelle.alle_ausser(&benutzer("alice"));
        assert_eq!(andere.len(), 2);
        assert!(andere.iter().all(|(b, _, _)| b != &benutzer("alice")));
    }

    #[test]
    fn abgelaufene_werden_entfernt() {
        let tabelle = EndpunktTabelle::neu();
        tabelle.registrieren(benutzer("alice"), endpunkt(30009), vec![1u8; 32]);
        tabelle.registrieren(benutzer("bob"), endpunkt(30010), vec![2u8; 32]);

        std::thread::sleep(Duration::from_millis(50));
        tabelle.kontakt_aktualisieren(&benutzer("bob"), endpunkt(30010));

        let entfernt = tabelle.abgelaufene_entfernen(Duration::from_millis(25));
        assert_eq!(entfernt, vec![benutzer("alice")]);
        assert!(tabelle.ist_registriert(&benutzer("bob")));
    }

    #[test]
    fn clone_teilt_die_tabelle() {
        let tabelle1 = EndpunktTabelle::neu();
        let tabelle2 = tabelle1.clone();

        tabelle1.registrieren(benutzer("alice"), endpunkt(30011), vec![1u8; 32]);
        assert!(tabelle2.ist_registriert(&benutzer("alice")));
    }
}
