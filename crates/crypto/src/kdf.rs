//! Schluesselableitung und Zufallserzeugung
//!
//! PBKDF2-HMAC-SHA256 mit zwei festen Runden-Profilen:
//!
//! | Profil            | Runden  | Eingabe               | Ergebnis              |
//! |-------------------|---------|-----------------------|-----------------------|
//! | Proof             | 200 000 | Passwort + Benutzersalt | Proof (32 Bytes)    |
//! | Session-Schluessel | 100 000 | Proof + Session-Salt  | Session-Key (32 Bytes) |
//!
//! Der Proof wird clientseitig abgeleitet und serverseitig als Hash
//! gespeichert; der Server sieht nie ein Klartext-Passwort. Der
//! Session-Schluessel wird pro Verbindung aus dem Proof plus frischem
//! Salt neu abgeleitet – eine kompromittierte Sitzung gibt weder das
//! gespeicherte Credential noch andere Sitzungen preis.

use hmac::Hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::error::{CryptoError, CryptoResult};
use crate::types::SecretBytes;

/// Laenge abgeleiteter Schluessel in Bytes
pub const SCHLUESSEL_LAENGE: usize = 32;

/// Laenge von Salts in Bytes (Benutzersalt und Session-Salt)
pub const SALT_LAENGE: usize = 16;

/// PBKDF2-Runden fuer die Proof-Ableitung aus dem Passwort
pub const PROOF_RUNDEN: u32 = 200_000;

/// PBKDF2-Runden fuer die Session-Schluessel-Ableitung aus dem Proof
pub const SESSION_RUNDEN: u32 = 100_000;

/// Deterministische, gesalzene, iterierte Schluesselableitung.
///
/// Gleiche Eingaben liefern immer denselben Schluessel (Grundlage der
/// Login-Pruefung). Leeres Material und leere Salts werden abgelehnt,
/// statt stillschweigend einen schwachen Schluessel zu liefern.
pub fn ableiten(
    material: &[u8],
    salt: &[u8],
    runden: u32,
    laenge: usize,
) -> CryptoResult<SecretBytes> {
    if material.is_empty() {
        return Err(CryptoError::KeyDerivation(
            "Leeres Schluesselmaterial".into(),
        ));
    }
    if salt.is_empty() {
        return Err(CryptoError::KeyDerivation("Leerer Salt".into()));
    }
    if laenge == 0 {
        return Err(CryptoError::KeyDerivation(
            "Ableitungslaenge 0 angefordert".into(),
        ));
    }

    let mut out = vec![0u8; laenge];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(material, salt, runden, &mut out)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(SecretBytes::new(out))
}

/// Leitet den Proof aus Passwort und Benutzersalt ab (Client-Seite).
pub fn proof_ableiten(passwort: &str, salt: &[u8]) -> CryptoResult<SecretBytes> {
    ableiten(passwort.as_bytes(), salt, PROOF_RUNDEN, SCHLUESSEL_LAENGE)
}

/// Leitet den verbindungsgebundenen Session-Schluessel aus Proof und
/// frischem Session-Salt ab (beide Seiten).
pub fn session_schluessel_ableiten(proof: &[u8], session_salt: &[u8]) -> CryptoResult<SecretBytes> {
    ableiten(proof, session_salt, SESSION_RUNDEN, SCHLUESSEL_LAENGE)
}

/// Kryptografisch sichere Zufalls-Bytes
pub fn zufalls_bytes(n: usize) -> Vec<u8> {
    let mut out = vec![0u8; n];
    OsRng.fill_bytes(&mut out);
    out
}

/// Frischer Zufalls-Salt fuer Registrierung und Session-Ableitung
pub fn zufalls_salt() -> [u8; SALT_LAENGE] {
    let mut salt = [0u8; SALT_LAENGE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Frischer symmetrischer Zufallsschluessel (UDP-Schluessel)
///
/// Unabhaengiger Zufall, nicht aus dem Passwort ableitbar – eine
/// Kompromittierung des UDP-Verkehrs gefaehrdet die TCP-Credential-Kette
/// nicht.
pub fn zufalls_schluessel() -> SecretBytes {
    SecretBytes::new(zufalls_bytes(SCHLUESSEL_LAENGE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ableitung_ist_deterministisch() {
        let salt = [7u8; SALT_LAENGE];
        let a = proof_ableiten("p@ss", &salt).unwrap();
        let b = proof_ableiten("p@ss", &salt).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_eq!(a.len(), SCHLUESSEL_LAENGE);
    }

    #[test]
    fn verschiedene_salts_verschiedene_schluessel() {
        let a = proof_ableiten("p@ss", &[1u8; SALT_LAENGE]).unwrap();
        let b = proof_ableiten("p@ss", &[2u8; SALT_LAENGE]).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn verschiedene_passwoerter_verschiedene_proofs() {
        let salt = [3u8; SALT_LAENGE];
        let a = proof_ableiten("p@ss", &salt).unwrap();
        let b = proof_ableiten("wrong", &salt).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn leeres_passwort_wird_abgelehnt() {
        let salt = [4u8; SALT_LAENGE];
        assert!(proof_ableiten("", &salt).is_err());
    }

    #[test]
    fn leerer_salt_wird_abgelehnt() {
        assert!(ableiten(b"material", &[], PROOF_RUNDEN, SCHLUESSEL_LAENGE).is_err());
    }

    #[test]
    fn session_ableitung_haengt_vom_salt_ab() {
        let proof = proof_ableiten("p@ss", &[5u8; SALT_LAENGE]).unwrap();
        let k1 = session_schluessel_ableiten(proof.as_bytes(), &[1u8; SALT_LAENGE]).unwrap();
        let k2 = session_schluessel_ableiten(proof.as_bytes(), &[2u8; SALT_LAENGE]).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn zufalls_schluessel_sind_eindeutig() {
        let a = zufalls_schluessel();
        let b = zufalls_schluessel();
        assert_eq!(a.len(), SCHLUESSEL_LAENGE);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn zufalls_salt_hat_feste_laenge() {
        let salt = zufalls_salt();
        assert_eq!(salt.len(), SALT_LAENGE);
    }
}
