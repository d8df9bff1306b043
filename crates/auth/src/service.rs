//! Auth-Service fuer Fluester
//!
//! Implementiert die Server-Seite des Drei-Schritt-Handshakes:
//!
//! ```text
//! Client                          Server
//!   | -- auth_begin(username) ----> |  beginnen()
//!   | <- auth_salt(salt, pending) - |
//!   | -- auth_proof(proof) -------> |  abschliessen()
//!   | <- auth_ok | auth_rejected -- |
//! ```
//!
//! Das Passwort verlaesst den Client nie; uebertragen wird nur der
//! abgeleitete Proof. Fuer unbekannte Benutzer entsteht der
//! Credential-Eintrag erst beim Proof – ein abgebrochenes `auth_begin`
//! hinterlaesst keinen halben Zustand.
//!
//! Reihenfolge der Persistenz in `abschliessen`: erst Credentials
//! (nur bei Registrierung), dann UDP-Schluessel, erst danach darf die
//! Verbindungsschicht `auth_ok` senden.

use std::sync::Arc;

use fluester_core::types::Username;
use fluester_crypto::{
    gleich_konstant, session_schluessel_ableiten, zufalls_salt, zufalls_schluessel, SecretBytes,
    SCHLUESSEL_LAENGE,
};
use fluester_store::{CredentialRecord, CredentialStore, KeyStore};

use crate::error::{AuthError, AuthResult};

// ---------------------------------------------------------------------------
// Zwischenstand und Ergebnis
// ---------------------------------------------------------------------------

/// Zwischenstand nach `auth_begin`
///
/// Lebt im Verbindungszustand bis der Proof eintrifft. Bei einer
/// ausstehenden Registrierung traegt `salt` den frisch erzeugten Wert,
/// der noch nirgends persistiert ist.
#[derive(Debug, Clone)]
pub struct AuthBeginn {
    pub benutzer: Username,
    pub salt: Vec<u8>,
    pub pending_registration: bool,
}

/// Ergebnis einer erfolgreichen Authentifizierung
///
/// Wenn dieses Struct existiert, sind Credentials (bei Registrierung)
/// und UDP-Schluessel bereits dauerhaft gespeichert.
pub struct AuthErfolg {
    pub benutzer: Username,
    /// Frischer Salt fuer die Session-Schluessel-Ableitung des Clients
    pub session_salt: Vec<u8>,
    /// Session-Schluessel fuer TCP (identisch auf beiden Seiten ableitbar)
    pub session_key: SecretBytes,
    /// Rotierter UDP-Schluessel (bereits im Key-Store)
    pub udp_key: Vec<u8>,
    /// True wenn dieser Handshake den Benutzer registriert hat
    pub neu_registriert: bool,
}

impl std::fmt::Debug for AuthErfolg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthErfolg")
            .field("benutzer", &self.benutzer)
            .field("session_key", &"[REDACTED]")
            .field("udp_key", &"[REDACTED]")
            .field("neu_registriert", &self.neu_registriert)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// AuthService
// ---------------------------------------------------------------------------

/// Auth-Service – zentraler Einstiegspunkt fuer den Handshake
pub struct AuthService<C: CredentialStore, K: KeyStore> {
    credentials: Arc<C>,
    schluessel: Arc<K>,
}

impl<C: CredentialStore, K: KeyStore> AuthService<C, K> {
    /// Erstellt einen neuen AuthService
    pub fn neu(credentials: Arc<C>, schluessel: Arc<K>) -> Self {
        Self {
            credentials,
            schluessel,
        }
    }

    /// Schritt 1: Benutzername entgegennehmen, Salt bestimmen
    ///
    /// Bekannte Benutzer erhalten ihren gespeicherten Salt, unbekannte
    /// einen frischen. Es wird noch nichts geschrieben.
    pub async fn beginnen(&self, benutzer: &Username) -> AuthResult<AuthBeginn> {
        match self.credentials.laden(benutzer).await? {
            Some(record) => Ok(AuthBeginn {
                benutzer: benutzer.clone(),
                salt: record.salt,
                pending_registration: false,
            }),
            None => Ok(AuthBeginn {
                benutzer: benutzer.clone(),
                salt: zufalls_salt().to_vec(),
                pending_registration: true,
            }),
        }
    }

    /// Schritt 2: Proof verifizieren bzw. Registrierung abschliessen
    ///
    /// Bei Erfolg sind Credentials und rotierter UDP-Schluessel
    /// persistiert bevor die Funktion zurueckkehrt. Ein falscher Proof
    /// ergibt `AuthError::ProofFalsch` – die Verbindungsschicht sendet
    /// dann `auth_rejected` und trennt.
    pub async fn abschliessen(&self, beginn: &AuthBeginn, proof: &[u8]) -> AuthResult<AuthErfolg> {
        // Proofs haben exakt Schluessellaenge; alles andere wird
        // abgelehnt bevor es als Verifier gespeichert werden koennte
        if proof.len() != SCHLUESSEL_LAENGE {
            tracing::warn!(
                benutzer = %beginn.benutzer,
                laenge = proof.len(),
                "Proof mit falscher Laenge abgelehnt"
            );
            return Err(AuthError::ProofFalsch);
        }

        let mut neu_registriert = false;

        if beginn.pending_registration {
            let angelegt = self
                .credentials
                .anlegen(
                    &beginn.benutzer,
                    CredentialRecord {
                        salt: beginn.salt.clone(),
                        proof: proof.to_vec(),
                    },
                )
                .await?;

            if angelegt {
                neu_registriert = true;
            } else {
                // Registrierungsrennen verloren: gegen den gewonnenen
                // Eintrag verifizieren (dessen Salt weicht ab, der
                // Proof passt also praktisch nie)
                self.gegen_store_verifizieren(&beginn.benutzer, proof)
                    .await?;
            }
        } else {
            self.gegen_store_verifizieren(&beginn.benutzer, proof)
                .await?;
        }

        // Session-Schluessel aus dem Proof ableiten; der Client leitet
        // denselben Wert lokal ab, er reist nie ueber das Netz
        let session_salt = zufalls_salt().to_vec();
        let session_key = session_schluessel_ableiten(proof, &session_salt)?;

        // UDP-Schluessel rotieren; `setzen` kehrt erst nach fsync zurueck
        let udp_key = zufalls_schluessel();
        self.schluessel
            .setzen(&beginn.benutzer, udp_key.as_bytes())
            .await?;

        tracing::info!(
            benutzer = %beginn.benutzer,
            neu_registriert,
            "Benutzer authentifiziert"
        );

        Ok(AuthErfolg {
            benutzer: beginn.benutzer.clone(),
            session_salt,
            session_key,
            udp_key: udp_key.as_bytes().to_vec(),
            neu_registriert,
        })
    }

    /// Vergleicht den Proof in konstanter Zeit mit dem gespeicherten
    async fn gegen_store_verifizieren(
        &self,
        benutzer: &Username,
        proof: &[u8],
    ) -> AuthResult<()> {
        let record = self
            .credentials
            .laden(benutzer)
            .await?
            .ok_or(AuthError::ProofFalsch)?;

        if !gleich_konstant(proof, &record.proof) {
            tracing::warn!(benutzer = %benutzer, "Fehlgeschlagener Auth-Versuch");
            return Err(AuthError::ProofFalsch);
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use fluester_crypto::proof_ableiten;
    use fluester_store::{InMemoryCredentialStore, InMemoryKeyStore};

    fn benutzer(name: &str) -> Username {
        Username::neu(name).expect("Gueltiger Testname")
    }

    fn test_service() -> AuthService<InMemoryCredentialStore, InMemoryKeyStore> {
        AuthService::neu(
            Arc::new(InMemoryCredentialStore::neu()),
            Arc::new(InMemoryKeyStore::neu()),
        )
    }

    fn test_proof(seed: u8) -> Vec<u8> {
        vec![seed; SCHLUESSEL_LAENGE]
    }

    #[tokio::test]
    async fn unbekannter_benutzer_bekommt_frischen_salt() {
        let service = test_service();
        let beginn = service.beginnen(&benutzer("alice")).await.unwrap();

        assert!(beginn.pending_registration);
        assert_eq!(beginn.salt.len(), 16);
    }

    #[tokio::test]
    async fn registrierung_und_erneute_anmeldung() {
        let service = test_service();
        let alice = benutzer("alice");

        // Registrierung
        let beginn = service.beginnen(&alice).await.unwrap();
        assert!(beginn.pending_registration);
        let erfolg = service
            .abschliessen(&beginn, &test_proof(7))
            .await
            .expect("Registrierung fehlgeschlagen");
        assert!(erfolg.neu_registriert);

        // Erneute Anmeldung: bekannter Benutzer, gespeicherter Salt
        let zweiter = service.beginnen(&alice).await.unwrap();
        assert!(!zweiter.pending_registration);
        assert_eq!(zweiter.salt, beginn.salt);

        let erfolg = service
            .abschliessen(&zweiter, &test_proof(7))
            .await
            .expect("Anmeldung fehlgeschlagen");
        assert!(!erfolg.neu_registriert);
    }

    #[tokio::test]
    async fn falscher_proof_abgelehnt() {
        let service = test_service();
        let alice = benutzer("alice");

        let beginn = service.beginnen(&alice).await.unwrap();
        service.abschliessen(&beginn, &test_proof(1)).await.unwrap();

        let beginn = service.beginnen(&alice).await.unwrap();
        let ergebnis = service.abschliessen(&beginn, &test_proof(2)).await;
        assert!(matches!(ergebnis, Err(AuthError::ProofFalsch)));
    }

    #[tokio::test]
    async fn proof_mit_falscher_laenge_abgelehnt() {
        let service = test_service();
        let beginn = service.beginnen(&benutzer("alice")).await.unwrap();

        let ergebnis = service.abschliessen(&beginn, &[1u8; 16]).await;
        assert!(matches!(ergebnis, Err(AuthError::ProofFalsch)));

        // Und es wurde nichts registriert
        let zweiter = service.beginnen(&benutzer("alice")).await.unwrap();
        assert!(zweiter.pending_registration);
    }

    #[tokio::test]
    async fn abgebrochenes_begin_hinterlaesst_nichts() {
        let service = test_service();

        // auth_begin ohne Proof – kein Eintrag darf entstehen
        let _ = service.beginnen(&benutzer("geist")).await.unwrap();

        let beginn = service.beginnen(&benutzer("geist")).await.unwrap();
        assert!(beginn.pending_registration);
    }

    #[tokio::test]
    async fn udp_schluessel_rotiert_je_auth() {
        let service = test_service();
        let alice = benutzer("alice");

        let beginn = service.beginnen(&alice).await.unwrap();
        let erster = service.abschliessen(&beginn, &test_proof(3)).await.unwrap();

        let beginn = service.beginnen(&alice).await.unwrap();
        let zweiter = service.abschliessen(&beginn, &test_proof(3)).await.unwrap();

        assert_eq!(erster.udp_key.len(), 32);
        assert_ne!(erster.udp_key, zweiter.udp_key, "Schluessel muss rotieren");
    }

    #[tokio::test]
    async fn session_schluessel_unterscheiden_sich_je_verbindung() {
        let service = test_service();
        let alice = benutzer("alice");

        let beginn = service.beginnen(&alice).await.unwrap();
        let erster = service.abschliessen(&beginn, &test_proof(3)).await.unwrap();

        let beginn = service.beginnen(&alice).await.unwrap();
        let zweiter = service.abschliessen(&beginn, &test_proof(3)).await.unwrap();

        assert_ne!(erster.session_salt, zweiter.session_salt);
        assert_ne!(
            erster.session_key.as_bytes(),
            zweiter.session_key.as_bytes()
        );
    }

    #[tokio::test]
    async fn registrierungsrennen_erster_gewinnt() {
        let service = test_service();
        let alice = benutzer("alice");

        // Zwei Verbindungen beginnen gleichzeitig, beide pending
        let beginn_a = service.beginnen(&alice).await.unwrap();
        let beginn_b = service.beginnen(&alice).await.unwrap();
        assert_ne!(beginn_a.salt, beginn_b.salt, "Jedes Begin eigener Salt");

        // A gewinnt das Rennen
        let erfolg = service
            .abschliessen(&beginn_a, &test_proof(1))
            .await
            .unwrap();
        assert!(erfolg.neu_registriert);

        // B verliert: sein Proof passt nicht zum gewonnenen Eintrag
        let ergebnis = service.abschliessen(&beginn_b, &test_proof(2)).await;
        assert!(matches!(ergebnis, Err(AuthError::ProofFalsch)));
    }

    #[tokio::test]
    async fn kompletter_lebenszyklus_mit_echter_ableitung() {
        let service = test_service();
        let alice = benutzer("alice");

        // Registrierung: Client leitet den Proof aus dem Passwort ab
        let beginn = service.beginnen(&alice).await.unwrap();
        let proof = proof_ableiten("p@ss", &beginn.salt).expect("Ableitung fehlgeschlagen");
        let erfolg = service
            .abschliessen(&beginn, proof.as_bytes())
            .await
            .unwrap();
        assert!(erfolg.neu_registriert);

        // Reconnect: gleicher Salt, gleiches Passwort, gleicher Proof
        let beginn = service.beginnen(&alice).await.unwrap();
        let proof = proof_ableiten("p@ss", &beginn.salt).unwrap();
        let erfolg = service
            .abschliessen(&beginn, proof.as_bytes())
            .await
            .unwrap();
        assert!(!erfolg.neu_registriert);

        // Beide Seiten koennen denselben Session-Schluessel ableiten
        let client_seite =
            session_schluessel_ableiten(proof.as_bytes(), &erfolg.session_salt).unwrap();
        assert_eq!(client_seite.as_bytes(), erfolg.session_key.as_bytes());

        // Falsches Passwort ergibt falschen Proof
        let beginn = service.beginnen(&alice).await.unwrap();
        let falscher = proof_ableiten("nicht-p@ss", &beginn.salt).unwrap();
        let ergebnis = service.abschliessen(&beginn, falscher.as_bytes()).await;
        assert!(matches!(ergebnis, Err(AuthError::ProofFalsch)));
    }
}
