//! Structured Logging Setup via tracing-subscriber
//!
//! Die Konfigurationsdatei liefert Level und Format; zwei
//! Umgebungsvariablen uebersteuern sie fuer den Einzelfall:
//! - `FL_LOG_LEVEL`: Filter-Direktive (trace/debug/info/warn/error,
//!   auch target-spezifisch wie `fluester_session=debug`)
//! - `FL_LOG_FORMAT`: `text` oder `json`

use tracing_subscriber::{fmt, EnvFilter};

/// Initialisiert das globale Logging-System
///
/// `level` und `format` kommen aus der Konfiguration und werden von
/// `FL_LOG_LEVEL` / `FL_LOG_FORMAT` uebersteuert. Unbrauchbare Werte
/// fallen auf `info` / `text` zurueck. Darf nur einmal pro Prozess
/// aufgerufen werden.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env("FL_LOG_LEVEL")
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = std::env::var("FL_LOG_FORMAT").unwrap_or_else(|_| format.to_string());

    match format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_current_span(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Prueft ob ein Log-Level-String ein bekanntes Level ist
///
/// Der EnvFilter akzeptiert auch Target-Direktiven; diese Pruefung
/// erkennt Tippfehler bei den einfachen Level-Namen.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Prueft ob ein Log-Format-String unterstuetzt wird
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
