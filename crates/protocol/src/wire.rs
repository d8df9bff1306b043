//! Wire-Format fuer TCP-Verbindungen
//!
//! Frame-basiertes Protokoll: Length(u32 big-endian) + Tag(u8) + Body.
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+--------+------+----...----+
//! | Laenge (u32 BE) | 4 Bytes        | Tag  | Body       |
//! +--------+--------+--------+--------+------+----...----+
//! ```
//!
//! Die Laenge zaehlt Tag und Body (ohne die 4 Laengen-Bytes). Der Tag
//! unterscheidet die drei Frame-Arten:
//!
//! | Tag  | Art           | Body                                     |
//! |------|---------------|------------------------------------------|
//! | 0x01 | Control       | JSON einer `ControlMessage` (Klartext)   |
//! | 0x02 | SealedControl | `SealedBox`-Bytes (versiegeltes JSON)    |
//! | 0x03 | Chunk         | binaerer `ChunkFrame`                    |
//!
//! Klartext-Control ist nur fuer den Auth-Handshake zulaessig; nach
//! `auth_ok` laufen Control-Nachrichten ausschliesslich versiegelt.

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use fluester_crypto::SealedBox;

use crate::chunk::ChunkFrame;
use crate::control::ControlMessage;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Frame-Groesse (256 KB)
///
/// Muss einen 64-KB-Chunk samt Header, Nonce und Auth-Tag aufnehmen;
/// der Rest ist Luft fuer grosse Roster- oder Fehler-Nachrichten.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Frame-Tag: Klartext-Control (nur Handshake)
pub const TAG_CONTROL: u8 = 0x01;

/// Frame-Tag: versiegelte Control-Nachricht
pub const TAG_SEALED: u8 = 0x02;

/// Frame-Tag: binaerer Datei-Chunk
pub const TAG_CHUNK: u8 = 0x03;

// ---------------------------------------------------------------------------
// TcpFrame
// ---------------------------------------------------------------------------

/// Ein dekodierter TCP-Frame
///
/// Der Codec liefert die Frame-Art bereits aufgeloest; die Schicht
/// darueber entscheidet nur noch ob die Art im aktuellen Zustand
/// zulaessig ist (z. B. Klartext-Control nach Auth = Verletzung).
#[derive(Debug, Clone)]
pub enum TcpFrame {
    /// Klartext-Control-Nachricht (Auth-Handshake)
    Control(ControlMessage),
    /// Versiegelte Control-Nachricht (nach Auth)
    Sealed(SealedBox),
    /// Binaerer Datei-Chunk (nach Auth, versiegelt im Frame selbst)
    Chunk(ChunkFrame),
}

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer frame-basierte TCP-Verbindungen
///
/// Implementiert `Encoder<TcpFrame>` und `Decoder` fuer nahtlose
/// Integration mit `tokio_util::codec::Framed`.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Maximale erlaubte Frame-Groesse in Bytes (Tag + Body)
    max_frame_bytes: usize,
}

impl FrameCodec {
    /// Erstellt einen neuen `FrameCodec` mit Standard-Limits
    pub fn neu() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    /// Erstellt einen `FrameCodec` mit benutzerdefiniertem Frame-Limit
    pub fn mit_limit(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }

    /// Gibt die konfigurierte maximale Frame-Groesse zurueck
    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Decoder-Implementierung
// ---------------------------------------------------------------------------

impl Decoder for FrameCodec {
    type Item = TcpFrame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Warte auf mindestens 4 Bytes fuer das Laengen-Feld
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        // Laenge lesen (big-endian u32) ohne den Buffer zu veraendern
        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;

        // Ein Frame traegt mindestens das Tag-Byte
        if length == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Leerer Frame (Laenge 0)",
            ));
        }

        // Maximale Frame-Groesse pruefen
        if length > self.max_frame_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Frame zu gross: {} Bytes (Maximum: {} Bytes)",
                    length, self.max_frame_bytes
                ),
            ));
        }

        // Pruefen ob der vollstaendige Frame bereits im Buffer ist
        let total_size = LENGTH_FIELD_SIZE + length;
        if src.len() < total_size {
            // Speicher vorbelegen um Reallocations zu vermeiden
            src.reserve(total_size - src.len());
            return Ok(None);
        }

        // Laengen-Feld verbrauchen, Tag und Body extrahieren
        src.advance(LENGTH_FIELD_SIZE);
        let tag = src[0];
        src.advance(1);
        let body = src.split_to(length - 1);

        let frame = match tag {
            TAG_CONTROL => {
                let message = ControlMessage::from_bytes(&body).map_err(|e| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("JSON-Deserialisierung fehlgeschlagen: {}", e),
                    )
                })?;
                TcpFrame::Control(message)
            }
            TAG_SEALED => {
                let sealed = SealedBox::from_bytes(&body).ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Versiegelter Frame zu kurz: {} Bytes", body.len()),
                    )
                })?;
                TcpFrame::Sealed(sealed)
            }
            TAG_CHUNK => TcpFrame::Chunk(ChunkFrame::decode(&body)?),
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Unbekannter Frame-Tag: 0x{:02x}", other),
                ));
            }
        };

        Ok(Some(frame))
    }
}

// ---------------------------------------------------------------------------
// Encoder-Implementierung
// ---------------------------------------------------------------------------

impl Encoder<TcpFrame> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: TcpFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (tag, body) = match item {
            TcpFrame::Control(message) => {
                let json = message.to_bytes().map_err(|e| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("JSON-Serialisierung fehlgeschlagen: {}", e),
                    )
                })?;
                (TAG_CONTROL, json)
            }
            TcpFrame::Sealed(sealed) => (TAG_SEALED, sealed.to_bytes()),
            TcpFrame::Chunk(chunk) => (TAG_CHUNK, chunk.encode()),
        };

        // Groesse pruefen (Tag + Body)
        let length = 1 + body.len();
        if length > self.max_frame_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Nachricht zu gross: {} Bytes (Maximum: {} Bytes)",
                    length, self.max_frame_bytes
                ),
            ));
        }

        // Laengen-Feld + Tag + Body schreiben
        dst.reserve(LENGTH_FIELD_SIZE + length);
        dst.put_u32(length as u32);
        dst.put_u8(tag);
        dst.put_slice(&body);

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
