//! Atomares Schreiben von JSON-Dokumenten
//!
//! Schreibreihenfolge: Tmp-Datei schreiben, fsync, rename auf den
//! Zielpfad. Ein Absturz hinterlaesst entweder die alte oder die neue
//! Datei, nie eine halb geschriebene.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::error::StoreResult;

/// Tmp-Pfad neben der Zieldatei (`credentials.json` -> `credentials.json.tmp`)
fn tmp_pfad(pfad: &Path) -> PathBuf {
    let mut os = pfad.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

/// Schreibt einen Wert als JSON atomar und dauerhaft auf die Platte
///
/// Die Funktion kehrt erst zurueck wenn die Daten per fsync auf dem
/// Datentraeger angekommen sind und das rename vollzogen ist.
pub async fn json_atomar_schreiben<T: Serialize>(pfad: &Path, wert: &T) -> StoreResult<()> {
    // Elternverzeichnis anlegen falls noetig
    if let Some(parent) = pfad.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let tmp = tmp_pfad(pfad);
    let bytes = serde_json::to_vec_pretty(wert)?;

    let mut datei = tokio::fs::File::create(&tmp).await?;
    datei.write_all(&bytes).await?;
    datei.sync_all().await?;
    drop(datei);

    tokio::fs::rename(&tmp, pfad).await?;
    tracing::debug!(pfad = %pfad.display(), bytes = bytes.len(), "JSON-Dokument geschrieben");
    Ok(())
}

/// Laedt ein JSON-Dokument; eine fehlende Datei ergibt den Default
pub async fn json_laden_oder_default<T: DeserializeOwned + Default>(
    pfad: &Path,
) -> StoreResult<T> {
    match tokio::fs::read(pfad).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}
