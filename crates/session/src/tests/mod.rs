//! Tests fuer den Session-Service
//!
//! - `dispatcher_tests` – Nachrichten-Verarbeitung auf dem geteilten
//!   Zustand, ohne TCP
//! - `handshake_tests` – kompletter Handshake, Chat und Datei-Transfer
//!   ueber echte TCP-Verbindungen

mod handshake_tests;
