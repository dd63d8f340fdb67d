use std::sync::Mutex;
use std::time::Instant;

use anyhow::Context;
use once_cell::sync::Lazy;
use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_otlp::{Protocol, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    Resource,
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::{
    SCHEMA_URL,
    attribute::{SERVICE_NAME, SERVICE_VERSION},
    resource::DEPLOYMENT_ENVIRONMENT_NAME,
};
use rocket::{
    Data, Request, Response,
    fairing::{Fairing, Info, Kind},
};
use tonic::metadata::MetadataMap;
use tracing::field::Empty;
use tracing::info_span;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const HONEYCOMB_ENDPOINT: &str = "https://api.honeycomb.io:443";

static TELEMETRY_GUARD: Lazy<Mutex<Option<OtelGuard>>> = Lazy::new(|| Mutex::new(None));

pub struct TelemetryFairing;

#[rocket::async_trait]
impl Fairing for TelemetryFairing {
    fn info(&self) -> Info {
        Info {
            name: "OpenTelemetry",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        let method = request.method().to_string();
        let uri = request.uri().to_string();

        let start_time = Instant::now();

        let span = info_span!(
            "http_request",
            otel.name = format!("{} {}", method, uri),
            http.method = method,
            http.uri = uri,
            http.route = request.route().map(|r| r.uri.to_string()),
            http.status_code = Empty,
            http.duration_ms = Empty,
        );

        request.local_cache(|| (span, start_time));
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let (span, start_time) = request.local_cache(|| {
            let span = info_span!("http_request");
            (span, Instant::now())
        });

        let duration = start_time.elapsed();

        span.record("http.status_code", response.status().code);
        span.record("http.duration_ms", duration.as_millis() as i64);

        let _entered = span.enter();
        tracing::info!(
            "Completed request in {}ms with status {}",
            duration.as_millis(),
            response.status().code
        );
    }
}

fn resource() -> Resource {
    let environment = dotenvy::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string());

    Resource::builder()
        .with_schema_url(
            [
                KeyValue::new(SERVICE_NAME, env!("CARGO_PKG_NAME")),
                KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, environment),
            ],
            SCHEMA_URL,
        )
        .build()
}

fn init_tracer_provider(honeycomb_api_key: &str) -> anyhow::Result<SdkTracerProvider> {
    let mut metadata = MetadataMap::new();
    metadata.insert(
        "x-honeycomb-team",
        honeycomb_api_key
            .parse()
            .context("HONEYCOMB_API_KEY is not a valid header value")?,
    );

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(HONEYCOMB_ENDPOINT)
        .with_tls_config(tonic::transport::ClientTlsConfig::new().with_native_roots())
        .with_protocol(Protocol::Grpc)
        .with_metadata(metadata)
        .build()
        .context("Failed to build OTLP span exporter")?;

    Ok(SdkTracerProvider::builder()
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource())
        .with_batch_exporter(exporter)
        .build())
}

pub struct OtelGuard {
    tracer_provider: SdkTracerProvider,
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Err(err) = self.tracer_provider.shutdown() {
            eprintln!("Failed to shut down tracer provider: {:?}", err);
        }
    }
}

/// Installs the global subscriber: an env-filtered fmt layer, plus span export
/// to Honeycomb when `HONEYCOMB_API_KEY` is set.
pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer());

    let Ok(api_key) = dotenvy::var("HONEYCOMB_API_KEY") else {
        registry.init();
        tracing::debug!("HONEYCOMB_API_KEY not set, spans stay local");
        return;
    };

    match init_tracer_provider(&api_key) {
        Ok(tracer_provider) => {
            let tracer = tracer_provider.tracer(env!("CARGO_PKG_NAME"));
            registry.with(OpenTelemetryLayer::new(tracer)).init();

            if let Ok(mut guard) = TELEMETRY_GUARD.lock() {
                *guard = Some(OtelGuard { tracer_provider });
            }
            tracing::info!("Exporting spans to Honeycomb");
        }
        Err(e) => {
            registry.init();
            tracing::warn!(error = %e, "Span export disabled");
        }
    }
}

pub fn shutdown_telemetry() {
    tracing::info!("Shutting down telemetry");

    // Dropping the guard flushes and shuts down the tracer provider.
    let guard = TELEMETRY_GUARD.lock().ok().and_then(|mut g| g.take());
    drop(guard);
}
