//! Fluester Server – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Server.

use anyhow::Result;
use fluester_observability::{log_format_gueltig, log_level_gueltig, logging_initialisieren};
use fluester_server::{config::ServerConfig, Server};

// Single-threaded Runtime: die Store-Traits sind async fn ohne
// Send-Bound, alle Subsysteme laufen auf diesem einen Thread
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config_pfad =
        std::env::var("FLUESTER_CONFIG").unwrap_or_else(|_| "fluester.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = ServerConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    if !log_level_gueltig(&config.logging.level) {
        tracing::warn!(
            level = %config.logging.level,
            "Unbekanntes Log-Level in der Konfiguration (erwartet trace/debug/info/warn/error)"
        );
    }
    if !log_format_gueltig(&config.logging.format) {
        tracing::warn!(
            format = %config.logging.format,
            "Unbekanntes Log-Format in der Konfiguration, verwende 'text'"
        );
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Fluester Server wird initialisiert"
    );

    let server = Server::neu(config);
    server.starten().await
}
