//! Unit-Tests fuer den Credential-Store

use fluester_core::types::Username;

use crate::credentials::{
    CredentialRecord, CredentialStore, InMemoryCredentialStore, JsonCredentialStore,
};

fn benutzer(name: &str) -> Username {
    Username::neu(name).expect("Gueltiger Testname")
}

fn test_record(seed: u8) -> CredentialRecord {
    CredentialRecord {
        salt: vec![seed; 16],
        proof: vec![seed.wrapping_add(1); 32],
    }
}

async fn temp_store() -> (JsonCredentialStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("Temp-Verzeichnis konnte nicht erstellt werden");
    let store = JsonCredentialStore::oeffnen(dir.path().join("credentials.json"))
        .await
        .expect("Store oeffnen fehlgeschlagen");
    (store, dir)
}

#[tokio::test]
async fn test_anlegen_und_laden() {
    let (store, _dir) = temp_store().await;
    let alice = benutzer("alice");

    let angelegt = store
        .anlegen(&alice, test_record(7))
        .await
        .expect("Anlegen fehlgeschlagen");
    assert!(angelegt);

    let geladen = store
        .laden(&alice)
        .await
        .expect("Laden fehlgeschlagen")
        .expect("Eintrag erwartet");
    assert_eq!(geladen.salt, vec![7u8; 16]);
    assert_eq!(geladen.proof, vec![8u8; 32]);
}

#[tokio::test]
async fn test_unbekannter_benutzer_ist_none() {
    let (store, _dir) = temp_store().await;
    let geladen = store.laden(&benutzer("niemand")).await.unwrap();
    assert!(geladen.is_none());
}

#[tokio::test]
async fn test_first_write_wins() {
    let (store, _dir) = temp_store().await;
    let alice = benutzer("alice");

    assert!(store.anlegen(&alice, test_record(1)).await.unwrap());
    // Zweiter Versuch verliert, der erste Eintrag bleibt stehen
    assert!(!store.anlegen(&alice, test_record(9)).await.unwrap());

    let geladen = store.laden(&alice).await.unwrap().unwrap();
    assert_eq!(geladen.salt, vec![1u8; 16]);
}

#[tokio::test]
async fn test_eintraege_ueberleben_neustart() {
    let dir = tempfile::tempdir().unwrap();
    let pfad = dir.path().join("credentials.json");

    {
        let store = JsonCredentialStore::oeffnen(&pfad).await.unwrap();
        store.anlegen(&benutzer("alice"), test_record(3)).await.unwrap();
        store.anlegen(&benutzer("bob"), test_record(4)).await.unwrap();
        assert_eq!(store.anzahl().await, 2);
    }

    // Neue Instanz auf derselben Datei
    let store = JsonCredentialStore::oeffnen(&pfad).await.unwrap();
    assert_eq!(store.anzahl().await, 2);
    let alice = store.laden(&benutzer("alice")).await.unwrap().unwrap();
    assert_eq!(alice.salt, vec![3u8; 16]);
}

#[tokio::test]
async fn test_datei_enthaelt_base64() {
    let dir = tempfile::tempdir().unwrap();
    let pfad = dir.path().join("credentials.json");

    let store = JsonCredentialStore::oeffnen(&pfad).await.unwrap();
    store
        .anlegen(
            &benutzer("alice"),
            CredentialRecord {
                salt: vec![0xDE, 0xAD, 0xBE, 0xEF],
                proof: vec![1, 2, 3],
            },
        )
        .await
        .unwrap();

    let inhalt = tokio::fs::read_to_string(&pfad).await.unwrap();
    assert!(inhalt.contains("alice"));
    assert!(inhalt.contains("3q2+7w=="), "Salt muss Base64-kodiert sein");
}

#[tokio::test]
async fn test_debug_verraet_proof_nicht() {
    let record = test_record(5);
    let debug = format!("{:?}", record);
    assert!(debug.contains("[REDACTED]"));
    assert!(!debug.contains("6, 6, 6"));
}

#[tokio::test]
async fn test_in_memory_gleiche_semantik() {
    let store = InMemoryCredentialStore::neu();
    let alice = benutzer("alice");

    assert!(store.anlegen(&alice, test_record(1)).await.unwrap());
    assert!(!store.anlegen(&alice, test_record(2)).await.unwrap());
    assert_eq!(
        store.laden(&alice).await.unwrap().unwrap().salt,
        vec![1u8; 16]
    );
    assert!(store.laden(&benutzer("bob")).await.unwrap().is_none());
}
