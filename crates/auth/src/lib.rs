//! fluester-auth – Drei-Schritt-Auth-Handshake
//!
//! Dieses Crate implementiert:
//! - AuthService (Handshake beginnen, Proof verifizieren, Registrierung)
//! - Konstantzeit-Proof-Vergleich und Schluessel-Erzeugung je Session
//!
//! Der Service ist generisch ueber die Store-Traits aus
//! `fluester-store` und damit ohne Dateisystem testbar.

pub mod error;
pub mod service;

// Bequeme Re-Exporte
pub use error::{AuthError, AuthResult};
pub use service::{AuthBeginn, AuthErfolg, AuthService};
