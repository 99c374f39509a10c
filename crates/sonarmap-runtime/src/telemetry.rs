//! Logging and trace export setup for the map service.
//!
//! Call [`init_tracing`] once at process startup, before the Tokio runtime is
//! built, and hold the returned guard until exit.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `SONARMAP_LOG_FORMAT=json` | Emit newline-delimited JSON logs instead of the compact format. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP collector base URL (e.g. `http://localhost:4318`). When set, spans are exported over OTLP/HTTP. |
//!
//! # Example
//!
//! ```rust,no_run
//! let _guard = sonarmap_runtime::telemetry::init_tracing("sonarmap");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Env-var selecting the log line format.
pub const LOG_FORMAT_ENV: &str = "SONARMAP_LOG_FORMAT";

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Log line format for the console layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// Read the format from [`LOG_FORMAT_ENV`]; anything but `json` is compact.
    pub fn from_env() -> Self {
        Self::parse(std::env::var(LOG_FORMAT_ENV).ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Install the global `tracing` subscriber, with an OTLP span exporter when
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
///
/// The returned [`TracerProviderGuard`] **must** be held for the lifetime of
/// the process; dropping it flushes pending spans.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let provider = build_provider(service_name);
    build_subscriber(env_filter, LogFormat::from_env(), provider.as_ref()).init();
    TracerProviderGuard(provider)
}

/// Compose the filter, the optional OTel layer and one console layer.
fn build_subscriber(
    env_filter: EnvFilter,
    format: LogFormat,
    provider: Option<&SdkTracerProvider>,
) -> impl tracing::Subscriber + Send + Sync + 'static {
    let otel_layer =
        provider.map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("sonarmap")));
    let (json, compact) = match format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
        LogFormat::Compact => (None, Some(tracing_subscriber::fmt::layer().compact())),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer)
        .with(json)
        .with(compact)
}

// ─────────────────────────────────────────────────────────────────────────────
// RAII guard
// ─────────────────────────────────────────────────────────────────────────────

/// Shuts down the OTel [`SdkTracerProvider`] on drop, flushing pending spans.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    /// Whether spans are being exported to a collector.
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[sonarmap] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ─────────────────────────────────────────────────────────────────────────────

/// `None` when the endpoint env-var is absent or the exporter fails to build;
/// the caller then logs to the console only.
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[sonarmap] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            // No Tokio runtime exists yet when this runs, so the batch
            // exporter cannot be used.
            .with_simple_exporter(exporter)
            .build(),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_provider_returns_none_without_endpoint() {
        // SAFETY: no other test in this crate reads this env-var.
        unsafe { std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT") };
        assert!(build_provider("test-service").is_none());
    }

    #[test]
    fn tracer_provider_guard_drop_with_none_is_safe() {
        let guard = TracerProviderGuard(None);
        assert!(!guard.is_exporting());
        drop(guard);
    }

    #[test]
    fn subscriber_honours_filter_in_both_formats() {
        for format in [LogFormat::Compact, LogFormat::Json] {
            let subscriber = build_subscriber(EnvFilter::new("warn"), format, None);
            tracing::subscriber::with_default(subscriber, || {
                assert!(tracing::enabled!(tracing::Level::WARN), "{format:?}");
                assert!(!tracing::enabled!(tracing::Level::INFO), "{format:?}");
            });
        }
    }

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::parse(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some(" JSON ")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some("pretty")), LogFormat::Compact);
        assert_eq!(LogFormat::parse(None), LogFormat::Compact);
    }
}
