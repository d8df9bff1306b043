//! Versiegeln und Oeffnen opaker Byte-Payloads
//!
//! AES-256-GCM mit frischer Zufalls-Nonce pro Aufruf. Das Oeffnen
//! verifiziert den Auth-Tag in Konstantzeit (AEAD-Implementierung) und
//! schlaegt geschlossen fehl: manipulierte, verkuerzte oder mit falschem
//! Schluessel versiegelte Daten liefern nie partiellen Klartext.
//!
//! ## Format
//! ```text
//! [nonce(12)] [ciphertext + auth_tag(16)]
//! ```

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce as AesNonce,
};
use subtle::ConstantTimeEq;

use crate::error::{CryptoError, CryptoResult};
use crate::kdf::SCHLUESSEL_LAENGE;
use crate::types::{Nonce, SealedBox};

/// Versiegelt einen Klartext mit dem angegebenen Schluessel.
///
/// Die Nonce wird pro Aufruf frisch zufaellig erzeugt und darf unter
/// demselben Schluessel nie wiederverwendet werden. Optionale AAD wird
/// mit authentifiziert, aber nicht uebertragen – Sender und Empfaenger
/// muessen sie identisch rekonstruieren.
pub fn versiegeln(key_bytes: &[u8], plaintext: &[u8], aad: &[u8]) -> CryptoResult<SealedBox> {
    let cipher = cipher_aus(key_bytes)?;
    let nonce = Nonce::zufaellig();

    let ciphertext = cipher
        .encrypt(
            AesNonce::from_slice(nonce.as_bytes()),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?;

    Ok(SealedBox { nonce, ciphertext })
}

/// Oeffnet einen versiegelten Payload.
///
/// Ein ungueltiger Auth-Tag, ein falscher Schluessel oder abweichende
/// AAD liefern [`CryptoError::Entschluesselung`] – die Faelle sind vom
/// Fehler aus absichtlich nicht unterscheidbar.
pub fn oeffnen(key_bytes: &[u8], sealed: &SealedBox, aad: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = cipher_aus(key_bytes)?;

    cipher
        .decrypt(
            AesNonce::from_slice(sealed.nonce.as_bytes()),
            Payload {
                msg: &sealed.ciphertext,
                aad,
            },
        )
        .map_err(|e| CryptoError::Entschluesselung(e.to_string()))
}

/// Konstantzeit-Gleichheit fuer Proof- und Hash-Vergleiche.
///
/// Die Laenge ist kein Geheimnis; bei Laengen-Mismatch wird sofort
/// false geliefert, der Byte-Vergleich selbst laeuft in Konstantzeit.
pub fn gleich_konstant(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

fn cipher_aus(key_bytes: &[u8]) -> CryptoResult<Aes256Gcm> {
    if key_bytes.len() != SCHLUESSEL_LAENGE {
        return Err(CryptoError::UngueltigeSchluesselLaenge {
            erwartet: SCHLUESSEL_LAENGE,
            erhalten: key_bytes.len(),
        });
    }
    Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::zufalls_schluessel;

    #[test]
    fn roundtrip() {
        let key = zufalls_schluessel();
        let plaintext = b"Hallo verschluesselte Welt 1234567890";

        let sealed = versiegeln(key.as_bytes(), plaintext, b"").unwrap();
        let geoeffnet = oeffnen(key.as_bytes(), &sealed, b"").unwrap();

        assert_eq!(geoeffnet, plaintext);
    }

    #[test]
    fn roundtrip_mit_aad() {
        let key = zufalls_schluessel();
        let sealed = versiegeln(key.as_bytes(), b"Daten", b"kontext").unwrap();

        assert_eq!(oeffnen(key.as_bytes(), &sealed, b"kontext").unwrap(), b"Daten");
        assert!(oeffnen(key.as_bytes(), &sealed, b"anders").is_err());
    }

    #[test]
    fn falscher_schluessel_schlaegt_fehl() {
        let key1 = zufalls_schluessel();
        let key2 = zufalls_schluessel();

        let sealed = versiegeln(key1.as_bytes(), b"Geheime Daten", b"").unwrap();
        assert!(oeffnen(key2.as_bytes(), &sealed, b"").is_err());
    }

    #[test]
    fn manipulierter_ciphertext_schlaegt_fehl() {
        let key = zufalls_schluessel();
        let mut sealed = versiegeln(key.as_bytes(), b"Original", b"").unwrap();

        if let Some(byte) = sealed.ciphertext.first_mut() {
            *byte ^= 0xFF;
        }
        assert!(oeffnen(key.as_bytes(), &sealed, b"").is_err());
    }

    #[test]
    fn manipulierter_tag_schlaegt_fehl() {
        let key = zufalls_schluessel();
        let mut sealed = versiegeln(key.as_bytes(), b"Original", b"").unwrap();

        // Der Tag liegt am Ende des Ciphertexts
        if let Some(byte) = sealed.ciphertext.last_mut() {
            *byte ^= 0x01;
        }
        assert!(oeffnen(key.as_bytes(), &sealed, b"").is_err());
    }

    #[test]
    fn manipulierte_nonce_schlaegt_fehl() {
        let key = zufalls_schluessel();
        let mut sealed = versiegeln(key.as_bytes(), b"Original", b"").unwrap();

        sealed.nonce.bytes[0] ^= 0x01;
        assert!(oeffnen(key.as_bytes(), &sealed, b"").is_err());
    }

    #[test]
    fn leerer_klartext_roundtrip() {
        let key = zufalls_schluessel();
        let sealed = versiegeln(key.as_bytes(), b"", b"").unwrap();
        assert_eq!(oeffnen(key.as_bytes(), &sealed, b"").unwrap(), b"");
    }

    #[test]
    fn kurzer_schluessel_wird_abgelehnt() {
        let result = versiegeln(&[0u8; 16], b"Daten", b"");
        assert!(matches!(
            result,
            Err(CryptoError::UngueltigeSchluesselLaenge { erwartet: 32, .. })
        ));
    }

    #[test]
    fn konstantzeit_vergleich() {
        assert!(gleich_konstant(b"abc", b"abc"));
        assert!(!gleich_konstant(b"abc", b"abd"));
        assert!(!gleich_konstant(b"abc", b"abcd"));
        assert!(gleich_konstant(b"", b""));
    }
}
