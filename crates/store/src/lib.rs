//! fluester-store – dauerhafte JSON-Stores
//!
//! Zwei kleine Dokument-Stores tragen den persistenten Zustand des
//! Servers:
//!
//! - `credentials` – Salt + Proof je Benutzer (Registrierung und Login)
//! - `keys`        – aktueller UDP-Schluessel je Benutzer (rotiert je Auth)
//!
//! Beide schreiben atomar (Tmp-Datei + fsync + rename) und kehren erst
//! nach erfolgreicher Persistierung zurueck. Das ist die Grundlage der
//! Zusicherung, dass ein Client `auth_ok` nur sieht wenn Registrierung
//! und Schluessel einen Server-Neustart ueberleben.
//!
//! # Beispiel
//!
//! ```no_run
//! use fluester_store::{JsonCredentialStore, JsonKeyStore, StoreResult};
//!
//! #[tokio::main]
//! async fn main() -> StoreResult<()> {
//!     let credentials = JsonCredentialStore::oeffnen("data/credentials.json").await?;
//!     let schluessel = JsonKeyStore::oeffnen("data/udp_keys.json").await?;
//!     Ok(())
//! }
//! ```

pub mod atomic;
pub mod credentials;
pub mod error;
pub mod keys;

#[cfg(test)]
mod tests;

// Bequeme Re-Exporte
pub use credentials::{CredentialRecord, CredentialStore, InMemoryCredentialStore, JsonCredentialStore};
pub use error::{StoreError, StoreResult};
pub use keys::{InMemoryKeyStore, JsonKeyStore, KeyStore};
