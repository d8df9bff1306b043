//! # fluester-observability
//!
//! Observability-Crate fuer Fluester: Structured Logging via
//! tracing-subscriber (Text oder JSON), konfiguriert aus der
//! Server-Konfiguration mit Umgebungs-Override.

pub mod logging;

pub use logging::{log_format_gueltig, log_level_gueltig, logging_initialisieren};
