//! Logging and optional OpenTelemetry export

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// `json` for production, anything else prints pretty output
pub const LOG_FORMAT_VAR: &str = "FATURA_LOG_FORMAT";

/// Used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "fatura=info,tower_http=info";

pub const OTLP_ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Install the global subscriber
///
/// # Environment Variables
///
/// - `RUST_LOG`: filter directives (default: `fatura=info,tower_http=info`)
/// - `FATURA_LOG_FORMAT`: `json` or `pretty`
/// - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (e.g., http://localhost:4317)
/// - `OTEL_SERVICE_NAME`: service name (default: fatura-server)
pub fn init_tracing() -> Result<()> {
    let log_format = std::env::var(LOG_FORMAT_VAR).unwrap_or_else(|_| "pretty".to_string());
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))?;

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match log_format.as_str() {
        "json" => fmt::layer().json().boxed(),
        _ => fmt::layer().pretty().boxed(),
    };
    let subscriber = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter);

    #[cfg(feature = "telemetry")]
    {
        let otel_layer = otlp_tracer()?
            .map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));
        subscriber.with(otel_layer).try_init()?;
    }

    #[cfg(not(feature = "telemetry"))]
    {
        subscriber.try_init()?;
        if std::env::var(OTLP_ENDPOINT_VAR).is_ok() {
            tracing::warn!("OpenTelemetry endpoint set but feature 'telemetry' not enabled");
        }
    }

    Ok(())
}

#[cfg(feature = "telemetry")]
fn otlp_tracer() -> Result<Option<opentelemetry_sdk::trace::Tracer>> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{runtime, trace::TracerProvider, Resource};

    let Ok(endpoint) = std::env::var(OTLP_ENDPOINT_VAR) else {
        return Ok(None);
    };
    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "fatura-server".to_string());

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoint)
        .build()?;
    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            service_name.clone(),
        )]))
        .build();

    let tracer = provider.tracer(service_name);
    opentelemetry::global::set_tracer_provider(provider);
    Ok(Some(tracer))
}
