//! # fluester-crypto
//!
//! Schluesselableitung und authentifizierte Verschluesselung fuer Fluester.
//!
//! ## Module
//! - `kdf` - PBKDF2-HMAC-SHA256 Ableitung (Proof, Session-Schluessel) und Zufall
//! - `seal` - AES-256-GCM Versiegeln/Oeffnen opaker Byte-Payloads
//! - `types` - Gemeinsame Typen (SecretBytes, Nonce, SealedBox)
//! - `error` - Fehlertypen
//!
//! ## Schluessel-Lebenszyklus
//! ```text
//! Passwort --derive(200k, salt)--> Proof (Client-seitig, wird uebertragen)
//! Proof    --derive(100k, session_salt)--> Session-Schluessel (TCP, pro Verbindung)
//! Zufall(32)                          --> UDP-Schluessel (pro Authentifizierung)
//! ```

pub mod error;
pub mod kdf;
pub mod seal;
pub mod types;

// Bequeme Re-Exports
pub use error::{CryptoError, CryptoResult};
pub use kdf::{
    ableiten, proof_ableiten, session_schluessel_ableiten, zufalls_bytes, zufalls_salt,
    zufalls_schluessel, PROOF_RUNDEN, SALT_LAENGE, SCHLUESSEL_LAENGE, SESSION_RUNDEN,
};
pub use seal::{gleich_konstant, oeffnen, versiegeln};
pub use types::{Nonce, SealedBox, SecretBytes, NONCE_LAENGE, TAG_LAENGE};
