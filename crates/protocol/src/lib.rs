//! fluester-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert alle Nachrichtentypen und Rahmenformate die
//! zwischen Client und Server ausgetauscht werden:
//!
//! - `control` – JSON-Steuernachrichten (Auth-Handshake, Chat, Roster, Transfer)
//! - `wire`    – TCP-Framing: `[Laenge u32 BE][Typ-Tag u8][Payload]`
//! - `chunk`   – binaerer Datei-Chunk-Frame (Transfer-ID + Offset + versiegelte Bytes)
//! - `datagram` – in sich geschlossenes UDP-Datagramm (Benutzer-Tag + Nonce + Ciphertext)

pub mod chunk;
pub mod control;
pub mod datagram;
pub mod wire;

pub use chunk::ChunkFrame;
pub use control::{AbortReason, ControlMessage, ErrorCode};
pub use datagram::{Datagram, RelayNachricht};
pub use wire::{FrameCodec, TcpFrame, DEFAULT_MAX_FRAME_BYTES};
