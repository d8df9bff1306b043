//! Key-Store: persistenter UDP-Schluessel je Benutzer
//!
//! Der UDP-Schluessel wird bei jeder erfolgreichen Authentifizierung
//! rotiert; `setzen` ueberschreibt deshalb immer. Der Relay liest den
//! jeweils aktuellen Schluessel beim ersten Kontakt eines Endpunkts.
//!
//! Dateiformat: flaches JSON-Objekt `{ "benutzer": "<base64>" }`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::sync::RwLock;

use fluester_core::types::Username;

use crate::atomic::{json_atomar_schreiben, json_laden_oder_default};
use crate::error::{StoreError, StoreResult};

// ---------------------------------------------------------------------------
// KeyStore-Trait
// ---------------------------------------------------------------------------

/// Abstrakter Speicher fuer UDP-Schluessel
#[allow(async_fn_in_trait)]
pub trait KeyStore: Send + Sync {
    /// Aktuellen Schluessel eines Benutzers laden
    async fn laden(&self, benutzer: &Username) -> StoreResult<Option<Vec<u8>>>;

    /// Schluessel setzen bzw. rotieren (ueberschreibt immer)
    async fn setzen(&self, benutzer: &Username, schluessel: &[u8]) -> StoreResult<()>;
}

// ---------------------------------------------------------------------------
// JsonKeyStore
// ---------------------------------------------------------------------------

/// JSON-Datei-basierter Key-Store
///
/// `setzen` kehrt erst nach erfolgreichem fsync zurueck – der Client
/// darf den neuen Schluessel erst sehen wenn er die naechste
/// Server-Instanz ueberlebt.
#[derive(Debug)]
pub struct JsonKeyStore {
    pfad: PathBuf,
    eintraege: RwLock<BTreeMap<Username, String>>,
}

impl JsonKeyStore {
    /// Oeffnet den Store; eine fehlende Datei ergibt einen leeren Store
    pub async fn oeffnen(pfad: impl Into<PathBuf>) -> StoreResult<Self> {
        let pfad = pfad.into();
        let eintraege: BTreeMap<Username, String> = json_laden_oder_default(&pfad).await?;
        tracing::info!(
            pfad = %pfad.display(),
            schluessel = eintraege.len(),
            "Key-Store geoeffnet"
        );
        Ok(Self {
            pfad,
            eintraege: RwLock::new(eintraege),
        })
    }
}

impl KeyStore for JsonKeyStore {
    async fn laden(&self, benutzer: &Username) -> StoreResult<Option<Vec<u8>>> {
        match self.eintraege.read().await.get(benutzer) {
            Some(kodiert) => {
                let bytes = STANDARD.decode(kodiert).map_err(|e| {
                    StoreError::Beschaedigt(format!(
                        "UDP-Schluessel von '{}' ist kein Base64: {}",
                        benutzer, e
                    ))
                })?;
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }

    async fn setzen(&self, benutzer: &Username, schluessel: &[u8]) -> StoreResult<()> {
        let mut eintraege = self.eintraege.write().await;
        eintraege.insert(benutzer.clone(), STANDARD.encode(schluessel));
        json_atomar_schreiben(&self.pfad, &*eintraege).await?;
        tracing::debug!(benutzer = %benutzer, "UDP-Schluessel rotiert");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// InMemoryKeyStore
// ---------------------------------------------------------------------------

/// Fluechtiger Key-Store fuer Tests und Beispiele
#[derive(Debug, Default)]
pub struct InMemoryKeyStore {
    eintraege: RwLock<BTreeMap<Username, Vec<u8>>>,
}

impl InMemoryKeyStore {
    pub fn neu() -> Self {
        Self::default()
    }
}

impl KeyStore for InMemoryKeyStore {
    async fn laden(&self, benutzer: &Username) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.eintraege.read().await.get(benutzer).cloned())
    }

    async fn setzen(&self, benutzer: &Username, schluessel: &[u8]) -> StoreResult<()> {
        self.eintraege
            .write()
            .await
            .insert(benutzer.clone(), schluessel.to_vec());
        Ok(())
    }
}
