//! fluester-relay – UDP-Relay fuer versiegelte Kurznachrichten
//!
//! Implementiert den verbindungslosen Nebenkanal: Datagramme werden mit dem
//! pro Benutzer hinterlegten UDP-Schluessel entsiegelt und pro Empfaenger
//! neu versiegelt weiterverteilt. Schluessel entstehen ausschliesslich im
//! TCP-Handshake; der Relay liest sie nur.
//!
//! ## Module
//! - [`udp`] – UDP-Socket, Empfangs-Loop und Weiterleitung
//! - [`endpoints`] – Endpunkt-Tabelle (Adresse, Schluessel, Liveness)

pub mod endpoints;
pub mod udp;

pub use endpoints::{EndpunktTabelle, RelayEndpunkt};
pub use udp::{RelayConfig, UdpRelay};
