//! Gemeinsame Typen fuer das Kryptografie-Subsystem

use rand::rngs::OsRng;
use rand::RngCore;

/// Laenge einer AEAD-Nonce in Bytes (AES-256-GCM)
pub const NONCE_LAENGE: usize = 12;

/// Laenge des Auth-Tags in Bytes (am Ciphertext angehaengt)
pub const TAG_LAENGE: usize = 16;

/// Eine kryptografische Nonce (Number used once)
///
/// Wird pro Versiegelung frisch zufaellig erzeugt. Nonce-Wiederverwendung
/// unter demselben Schluessel bricht GCM – deshalb gibt es keinen
/// Konstruktor aus Zaehlern oder Zeitstempeln.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce {
    pub bytes: [u8; NONCE_LAENGE],
}

impl Nonce {
    /// Erzeugt eine frische Zufalls-Nonce aus dem OS-Zufallsgenerator
    pub fn zufaellig() -> Self {
        let mut bytes = [0u8; NONCE_LAENGE];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Rekonstruiert eine Nonce aus empfangenen Bytes
    pub fn aus_bytes(bytes: [u8; NONCE_LAENGE]) -> Self {
        Self { bytes }
    }

    /// Parst eine Nonce aus einem Slice beliebiger Herkunft
    pub fn aus_slice(slice: &[u8]) -> crate::CryptoResult<Self> {
        let bytes: [u8; NONCE_LAENGE] =
            slice
                .try_into()
                .map_err(|_| crate::CryptoError::UngueltigeNonce {
                    erwartet: NONCE_LAENGE,
                    erhalten: slice.len(),
                })?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_LAENGE] {
        &self.bytes
    }
}

/// Sicherer Schluessel-Container (wird beim Drop genullt)
#[derive(Clone)]
pub struct SecretBytes(pub Vec<u8>);

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED] {} bytes)", self.0.len())
    }
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn aus_slice(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Versiegelter Payload: Nonce + Ciphertext inkl. Auth-Tag
///
/// Das Ergebnis von [`crate::versiegeln`], die Eingabe von
/// [`crate::oeffnen`]. Auf dem Draht laeuft die Serialisierung
/// `[nonce(12)] [ciphertext + tag(16)]` – sowohl im TCP-Chunk-Frame
/// als auch im UDP-Datagramm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    /// 12 Bytes Nonce
    pub nonce: Nonce,
    /// Verschluesselter Inhalt inkl. 16 Bytes Auth-Tag (angehaengt)
    pub ciphertext: Vec<u8>,
}

impl SealedBox {
    /// Serialisiert zu Bytes: [nonce(12)] + [ciphertext + tag]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LAENGE + self.ciphertext.len());
        out.extend_from_slice(&self.nonce.bytes);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Deserialisiert aus Bytes; None wenn kuerzer als Nonce + Tag
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < NONCE_LAENGE + TAG_LAENGE {
            return None;
        }
        let mut nonce_bytes = [0u8; NONCE_LAENGE];
        nonce_bytes.copy_from_slice(&bytes[0..NONCE_LAENGE]);
        Some(Self {
            nonce: Nonce::aus_bytes(nonce_bytes),
            ciphertext: bytes[NONCE_LAENGE..].to_vec(),
        })
    }

    /// Gesamtlaenge der Draht-Darstellung
    pub fn laenge(&self) -> usize {
        NONCE_LAENGE + self.ciphertext.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_zufaellig_ist_eindeutig() {
        let a = Nonce::zufaellig();
        let b = Nonce::zufaellig();
        assert_ne!(a, b, "Zwei frische Nonces duerfen nicht kollidieren");
    }

    #[test]
    fn nonce_aus_slice_prueft_laenge() {
        assert!(Nonce::aus_slice(&[0u8; 12]).is_ok());
        assert!(Nonce::aus_slice(&[0u8; 11]).is_err());
        assert!(Nonce::aus_slice(&[0u8; 13]).is_err());
    }

    #[test]
    fn secret_bytes_debug_redacted() {
        let s = SecretBytes::new(vec![1, 2, 3]);
        let debug = format!("{:?}", s);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains('1'));
    }

    #[test]
    fn sealed_box_byte_roundtrip() {
        let sealed = SealedBox {
            nonce: Nonce::zufaellig(),
            ciphertext: vec![0xAB; 32],
        };
        let bytes = sealed.to_bytes();
        let wieder = SealedBox::from_bytes(&bytes).unwrap();
        assert_eq!(sealed, wieder);
    }

    #[test]
    fn sealed_box_lehnt_zu_kurze_daten_ab() {
        assert!(SealedBox::from_bytes(&[0u8; NONCE_LAENGE + TAG_LAENGE - 1]).is_none());
    }
}
