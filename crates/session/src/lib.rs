//! fluester-session – TCP Control Layer
//!
//! Dieser Crate implementiert den Session-Service fuer Fluester. Er
//! verwaltet TCP-Verbindungen, den Auth-Handshake, das Chat-Relay und
//! das gechunkte Datei-Streaming.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (SessionServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |  State Machine: Verbunden -> WarteAufProof -> Authentifiziert
//!     |  Handshake im Klartext, danach versiegelter Verkehr
//!     |
//!     v
//! MessageDispatcher
//!     |
//!     +-- Chat           (an alle verteilen, Absender stempelt der Server)
//!     +-- Datei-Angebote (anbieten, annehmen, ablehnen)
//!     +-- Chunk-Relay    (Offset-Disziplin, Fortschritt, Groessen-Check)
//!
//! Broadcaster      – Send-Queues aller Clients, Roster
//! TransferManager  – Zustand aller Datei-Uebertragungen
//! ```

pub mod broadcast;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod server_state;
pub mod tcp;
pub mod transfer;

#[cfg(test)]
mod tests;

// Bequeme Re-Exporte
pub use broadcast::{Ausgehend, Broadcaster, ClientSender};
pub use connection::ClientConnection;
pub use dispatcher::MessageDispatcher;
pub use error::{SessionError, SessionResult};
pub use server_state::{SessionConfig, SessionState};
pub use tcp::SessionServer;
pub use transfer::{TransferManager, TransferZustand};
