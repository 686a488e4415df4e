// Tracing initialization with configurable and reloadable log level.
use std::sync::OnceLock;

use opentelemetry_otlp::WithExportConfig;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

use crate::config::{LoggingConfig, OtelConfig};

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> =
    OnceLock::new();

/// Initializes the subscriber from the logging section. `RUST_LOG` wins
/// over the configured level when set.
pub fn init_tracing(logging: &LoggingConfig, otel: &OtelConfig) {
    let base_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(&logging.level));

    let (reload_layer, handle) = reload::Layer::new(base_filter);
    let _ = LOG_RELOAD_HANDLE.set(handle);

    let otel_layer = otel_layer(otel);

    let registry = tracing_subscriber::registry()
        .with(reload_layer)
        .with(otel_layer);
    let _ = if logging.format == "json" {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
}

fn otel_layer<S>(otel: &OtelConfig) -> Option<tracing_opentelemetry::OpenTelemetryLayer<S, opentelemetry_sdk::trace::SdkTracer>>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    if !otel.enabled {
        return None;
    }
    let endpoint = otel.endpoint.as_deref().unwrap_or_default();
    if endpoint.is_empty() {
        tracing::warn!("OTEL enabled but endpoint is empty; ignoring");
        return None;
    }

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("failed to build OTLP exporter: {e}");
            return None;
        }
    };

    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();
    use opentelemetry::trace::TracerProvider as _;
    let tracer = provider.tracer("storgate-proxy");
    // The global handle keeps the batch exporter alive for the process.
    opentelemetry::global::set_tracer_provider(provider);
    Some(tracing_opentelemetry::layer().with_tracer(tracer))
}

/// Apply a new logging level at runtime if reload handle is configured.
pub fn apply_logging_level(level: &str) {
    if let Some(handle) = LOG_RELOAD_HANDLE.get() {
        let _ = handle.modify(|f| {
            *f = EnvFilter::new(level);
        });
    }
}
