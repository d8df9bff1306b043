//! Credential-Store: Salt und Proof je Benutzer
//!
//! Das `CredentialStore`-Trait abstrahiert den konkreten Speicher;
//! `JsonCredentialStore` persistiert in einer JSON-Datei, der
//! In-Memory-Store dient Tests und Beispielen.
//!
//! Registrierung ist first-write-wins: `anlegen` legt einen Eintrag nur
//! an wenn der Benutzer noch nicht existiert. Verlierer eines Rennens
//! muessen neu laden und gegen den gewonnenen Eintrag verifizieren.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use fluester_core::types::Username;

use crate::atomic::{json_atomar_schreiben, json_laden_oder_default};
use crate::error::StoreResult;

// ---------------------------------------------------------------------------
// Base64-Serde fuer binaere Felder
// ---------------------------------------------------------------------------

mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// CredentialRecord
// ---------------------------------------------------------------------------

/// Persistierter Credential-Eintrag eines Benutzers
///
/// `proof` ist der abgeleitete Verifier, nie das Passwort. Der Server
/// kennt das Passwort zu keinem Zeitpunkt.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(with = "b64")]
    pub salt: Vec<u8>,
    #[serde(with = "b64")]
    pub proof: Vec<u8>,
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("salt_len", &self.salt.len())
            .field("proof", &"[REDACTED]")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// CredentialStore-Trait
// ---------------------------------------------------------------------------

/// Abstrakter Speicher fuer Credential-Eintraege
#[allow(async_fn_in_trait)]
pub trait CredentialStore: Send + Sync {
    /// Eintrag eines Benutzers laden
    async fn laden(&self, benutzer: &Username) -> StoreResult<Option<CredentialRecord>>;

    /// Eintrag anlegen falls der Benutzer noch nicht existiert
    ///
    /// Gibt `false` zurueck wenn bereits ein Eintrag vorhanden ist;
    /// der bestehende Eintrag bleibt dann unveraendert.
    async fn anlegen(&self, benutzer: &Username, record: CredentialRecord) -> StoreResult<bool>;
}

// ---------------------------------------------------------------------------
// JsonCredentialStore
// ---------------------------------------------------------------------------

/// JSON-Datei-basierter Credential-Store
///
/// Haelt alle Eintraege im Speicher und schreibt bei jeder Aenderung
/// die komplette Datei atomar neu. `anlegen` kehrt erst nach
/// erfolgreichem fsync zurueck.
#[derive(Debug)]
pub struct JsonCredentialStore {
    pfad: PathBuf,
    eintraege: RwLock<BTreeMap<Username, CredentialRecord>>,
}

impl JsonCredentialStore {
    /// Oeffnet den Store; eine fehlende Datei ergibt einen leeren Store
    pub async fn oeffnen(pfad: impl Into<PathBuf>) -> StoreResult<Self> {
        let pfad = pfad.into();
        let eintraege: BTreeMap<Username, CredentialRecord> =
            json_laden_oder_default(&pfad).await?;
        tracing::info!(
            pfad = %pfad.display(),
            benutzer = eintraege.len(),
            "Credential-Store geoeffnet"
        );
        Ok(Self {
            pfad,
            eintraege: RwLock::new(eintraege),
        })
    }

    /// Anzahl der registrierten Benutzer
    pub async fn anzahl(&self) -> usize {
        self.eintraege.read().await.len()
    }
}

impl CredentialStore for JsonCredentialStore {
    async fn laden(&self, benutzer: &Username) -> StoreResult<Option<CredentialRecord>> {
        Ok(self.eintraege.read().await.get(benutzer).cloned())
    }

    async fn anlegen(&self, benutzer: &Username, record: CredentialRecord) -> StoreResult<bool> {
        // Write-Lock ueber Einfuegen UND Persistieren, damit parallele
        // Registrierungen die Datei nicht ueberkreuzt schreiben
        let mut eintraege = self.eintraege.write().await;
        if eintraege.contains_key(benutzer) {
            return Ok(false);
        }
        eintraege.insert(benutzer.clone(), record);
        json_atomar_schreiben(&self.pfad, &*eintraege).await?;
        tracing::info!(benutzer = %benutzer, "Benutzer registriert");
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// InMemoryCredentialStore
// ---------------------------------------------------------------------------

/// Fluechtiger Credential-Store fuer Tests und Beispiele
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    eintraege: RwLock<BTreeMap<Username, CredentialRecord>>,
}

impl InMemoryCredentialStore {
    pub fn neu() -> Self {
        Self::default()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    async fn laden(&self, benutzer: &Username) -> StoreResult<Option<CredentialRecord>> {
        Ok(self.eintraege.read().await.get(benutzer).cloned())
    }

    async fn anlegen(&self, benutzer: &Username, record: CredentialRecord) -> StoreResult<bool> {
        let mut eintraege = self.eintraege.write().await;
        if eintraege.contains_key(benutzer) {
            return Ok(false);
        }
        eintraege.insert(benutzer.clone(), record);
        Ok(true)
    }
}
