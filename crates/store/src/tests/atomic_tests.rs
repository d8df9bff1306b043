//! Unit-Tests fuer das atomare JSON-Schreiben

use std::collections::BTreeMap;

use crate::atomic::{json_atomar_schreiben, json_laden_oder_default};

fn temp_pfad(name: &str) -> (std::path::PathBuf, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("Temp-Verzeichnis konnte nicht erstellt werden");
    (dir.path().join(name), dir)
}

#[tokio::test]
async fn test_schreiben_und_laden() {
    let (pfad, _dir) = temp_pfad("doc.json");

    let mut wert = BTreeMap::new();
    wert.insert("alice".to_string(), 1u32);
    wert.insert("bob".to_string(), 2u32);

    json_atomar_schreiben(&pfad, &wert)
        .await
        .expect("Schreiben fehlgeschlagen");

    let gelesen: BTreeMap<String, u32> = json_laden_oder_default(&pfad)
        .await
        .expect("Laden fehlgeschlagen");
    assert_eq!(gelesen, wert);
}

#[tokio::test]
async fn test_fehlende_datei_ergibt_default() {
    let (pfad, _dir) = temp_pfad("gibt_es_nicht.json");

    let gelesen: BTreeMap<String, u32> = json_laden_oder_default(&pfad)
        .await
        .expect("Default erwartet, kein Fehler");
    assert!(gelesen.is_empty());
}

#[tokio::test]
async fn test_keine_tmp_datei_nach_schreiben() {
    let (pfad, dir) = temp_pfad("doc.json");

    let wert: BTreeMap<String, u32> = BTreeMap::new();
    json_atomar_schreiben(&pfad, &wert).await.unwrap();

    assert!(pfad.exists());
    assert!(!dir.path().join("doc.json.tmp").exists());
}

#[tokio::test]
async fn test_ueberschreiben_ersetzt_inhalt() {
    let (pfad, _dir) = temp_pfad("doc.json");

    let mut erster = BTreeMap::new();
    erster.insert("a".to_string(), 1u32);
    json_atomar_schreiben(&pfad, &erster).await.unwrap();

    let mut zweiter = BTreeMap::new();
    zweiter.insert("b".to_string(), 2u32);
    json_atomar_schreiben(&pfad, &zweiter).await.unwrap();

    let gelesen: BTreeMap<String, u32> = json_laden_oder_default(&pfad).await.unwrap();
    assert_eq!(gelesen, zweiter);
}

#[tokio::test]
async fn test_kaputtes_json_ist_fehler() {
    let (pfad, _dir) = temp_pfad("kaputt.json");
    tokio::fs::write(&pfad, b"{nicht json").await.unwrap();

    let result: crate::error::StoreResult<BTreeMap<String, u32>> =
        json_laden_oder_default(&pfad).await;
    assert!(result.is_err());
}
