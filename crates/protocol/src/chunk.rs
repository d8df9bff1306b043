//! Chunk-Frames fuer Dateiuebertragungen (TCP)
//!
//! Dateien reisen in versiegelten Chunks fester Groesse ueber die
//! bestehende TCP-Verbindung. Der Chunk-Body eines Frames (Tag 0x03):
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0      16   Transfer-ID (UUID-Bytes)
//! 16       8   Byte-Offset in der Datei (big-endian)
//! 24      12   Nonce
//! 36+      N   Ciphertext + Auth-Tag (AES-256-GCM)
//! ```
//!
//! Transfer-ID und Offset sind als Associated Data an die Versiegelung
//! gebunden: ein Chunk laesst sich weder einem anderen Transfer
//! unterschieben noch an eine andere Position verschieben.

use std::io;

use fluester_core::types::TransferId;
use fluester_crypto::SealedBox;

/// Standard-Chunk-Groesse fuer Dateiuebertragungen (64 KB Klartext)
pub const CHUNK_GROESSE: usize = 64 * 1024;

/// Groesse des Chunk-Headers (Transfer-ID + Offset)
pub const HEADER_GROESSE: usize = 24;

// ---------------------------------------------------------------------------
// ChunkFrame
// ---------------------------------------------------------------------------

/// Ein versiegelter Datei-Chunk
///
/// Direkte Byte-Serialisierung, kein serde (Durchsatz-kritisch).
#[derive(Debug, Clone)]
pub struct ChunkFrame {
    /// Zugehoeriger Transfer
    pub transfer_id: TransferId,
    /// Byte-Offset des Klartexts in der Datei
    pub offset: u64,
    /// Versiegelter Chunk-Inhalt
    pub sealed: SealedBox,
}

/// Associated Data fuer die Chunk-Versiegelung: ID + Offset
///
/// Sender und Empfaenger muessen exakt dieselben Bytes verwenden,
/// sonst schlaegt die Entsiegelung fehl.
pub fn aad(transfer_id: &TransferId, offset: u64) -> [u8; HEADER_GROESSE] {
    let mut buf = [0u8; HEADER_GROESSE];
    buf[..16].copy_from_slice(transfer_id.as_bytes());
    buf[16..24].copy_from_slice(&offset.to_be_bytes());
    buf
}

impl ChunkFrame {
    /// Serialisiert den Chunk in einen Byte-Vec (Header + SealedBox)
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_GROESSE + self.sealed.laenge());
        buf.extend_from_slice(self.transfer_id.as_bytes());
        buf.extend_from_slice(&self.offset.to_be_bytes());
        buf.extend_from_slice(&self.sealed.to_bytes());
        buf
    }

    /// Deserialisiert einen Chunk aus einem Byte-Slice
    ///
    /// # Fehler
    /// - `InvalidData` wenn das Slice kuerzer als Header + minimale
    ///   SealedBox (Nonce + Auth-Tag) ist
    pub fn decode(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < HEADER_GROESSE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Chunk-Header zu kurz: {} Bytes (erwartet {})",
                    buf.len(),
                    HEADER_GROESSE
                ),
            ));
        }

        let mut id_bytes = [0u8; 16];
        id_bytes.copy_from_slice(&buf[..16]);
        let transfer_id = TransferId::from_bytes(id_bytes);

        let offset = u64::from_be_bytes([
            buf[16], buf[17], buf[18], buf[19], buf[20], buf[21], buf[22], buf[23],
        ]);

        let sealed = SealedBox::from_bytes(&buf[HEADER_GROESSE..]).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Chunk-Versiegelung zu kurz: {} Bytes",
                    buf.len() - HEADER_GROESSE
                ),
            )
        })?;

        Ok(Self {
            transfer_id,
            offset,
            sealed,
        })
    }

    /// Gesamtgroesse des kodierten Chunks in Bytes
    pub fn groesse(&self) -> usize {
        HEADER_GROESSE + self.sealed.laenge()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use fluester_crypto::Nonce;

    fn test_chunk(offset: u64) -> ChunkFrame {
        ChunkFrame {
            transfer_id: TransferId::new(),
            offset,
            sealed: SealedBox {
                nonce: Nonce::aus_bytes([3u8; 12]),
                ciphertext: vec![0xCD; 32],
            },
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let chunk = test_chunk(131072);
        let encoded = chunk.encode();
        assert_eq!(encoded.len(), chunk.groesse());

        let decoded = ChunkFrame::decode(&encoded).expect("Decode muss erfolgreich sein");
        assert_eq!(decoded.transfer_id, chunk.transfer_id);
        assert_eq!(decoded.offset, 131072);
        assert_eq!(decoded.sealed.ciphertext, chunk.sealed.ciphertext);
    }

    #[test]
    fn offset_big_endian_byte_reihenfolge() {
        let chunk = test_chunk(0x0102030405060708);
        let bytes = chunk.encode();
        // Offset bei Byte 16-23
        assert_eq!(bytes[16], 0x01);
        assert_eq!(bytes[23], 0x08);
    }

    #[test]
    fn decode_zu_kurz() {
        let bytes = [0u8; 10];
        assert!(ChunkFrame::decode(&bytes).is_err());
    }

    #[test]
    fn decode_versiegelung_zu_kurz() {
        // Header vollstaendig, aber nur 4 Bytes SealedBox
        let mut bytes = test_chunk(0).encode();
        bytes.truncate(HEADER_GROESSE + 4);
        assert!(ChunkFrame::decode(&bytes).is_err());
    }

    #[test]
    fn aad_bindet_id_und_offset() {
        let id_a = TransferId::new();
        let id_b = TransferId::new();

        assert_ne!(aad(&id_a, 0), aad(&id_b, 0));
        assert_ne!(aad(&id_a, 0), aad(&id_a, 65536));
        assert_eq!(aad(&id_a, 65536), aad(&id_a, 65536));
    }

    #[test]
    fn aad_enthaelt_offset_big_endian() {
        let id = TransferId::new();
        let header = aad(&id, 0xAABB);
        assert_eq!(&header[..16], id.as_bytes());
        assert_eq!(header[22], 0xAA);
        assert_eq!(header[23], 0xBB);
    }
}
