//! Log and metric setup for programs that embed the Quay ingestion clients.
//!
//! The clients record their counters on the meters returned by [`meter`] and
//! emit `tracing` events keyed by operation id. Nothing is exported until the
//! embedding program calls [`init_observability`] once at startup.
//!
//! The environment controls the setup, see [`ObservabilityOptions::from_env`].

use std::borrow::Cow;
use std::time::Duration;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{InstrumentationScope, global};
use opentelemetry_otlp::{ExporterBuildError, MetricExporter, SpanExporter};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{MeterProviderBuilder, PeriodicReader};
use opentelemetry_sdk::trace::SdkTracerProvider;
use snafu::{ResultExt, Snafu};
use tracing::Subscriber;
use tracing_opentelemetry::MetricsLayer;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::{prelude::*, registry::LookupSpan};

pub use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

pub use crate::metrics::MetricsExporter;

mod metrics;

const OTEL_SDK_DISABLED: &str = "OTEL_SDK_DISABLED";
const RUST_LOG_FORMAT: &str = "RUST_LOG_FORMAT";
const DEFAULT_DIRECTIVE: &str = "info";
const METRICS_EXPORT_INTERVAL: Duration = Duration::from_secs(10);

pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

#[derive(Debug, Snafu)]
pub enum ObservabilityError {
    #[snafu(display("Failed to build the otlp exporter"))]
    Exporter { source: ExporterBuildError },
    #[snafu(display("A global tracing subscriber is already installed"))]
    Subscriber { source: TryInitError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Single line, colored output for terminals.
    #[default]
    Compact,
    /// One json object per event.
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityOptions {
    pub log_format: LogFormat,
    /// Filter used when `RUST_LOG` is not set.
    pub default_directive: String,
    /// Push spans and metrics to the otlp collector.
    pub otlp_export: bool,
}

impl Default for ObservabilityOptions {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Compact,
            default_directive: DEFAULT_DIRECTIVE.to_string(),
            otlp_export: false,
        }
    }
}

impl ObservabilityOptions {
    /// Read the options from the process environment.
    ///
    /// `RUST_LOG_FORMAT=json` selects json logs. Otlp export stays off unless
    /// `OTEL_SDK_DISABLED` is exactly `false`, so a program that never heard of
    /// a collector does not try to reach one.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let log_format = match lookup(RUST_LOG_FORMAT).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        };
        let otlp_export = lookup(OTEL_SDK_DISABLED).as_deref() == Some("false");

        Self {
            log_format,
            otlp_export,
            ..Self::default()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.default_directive))
    }
}

/// A meter on the global provider.
///
/// Instruments created before [`init_observability`] record into a no-op
/// provider and are lost.
pub fn meter(name: &'static str) -> Meter {
    global::meter(name)
}

/// Install the global subscriber and meter provider, configured from the environment.
pub fn init_observability(
    package_name: impl Into<Cow<'static, str>>,
    package_version: impl Into<Cow<'static, str>>,
    metrics_exporter: MetricsExporter,
) -> Result<(), ObservabilityError> {
    init_observability_with_options(
        package_name,
        package_version,
        metrics_exporter,
        ObservabilityOptions::from_env(),
    )
}

/// Install the global subscriber and meter provider.
///
/// Fails with [`ObservabilityError::Subscriber`] when called a second time.
pub fn init_observability_with_options(
    package_name: impl Into<Cow<'static, str>>,
    package_version: impl Into<Cow<'static, str>>,
    metrics_exporter: MetricsExporter,
    options: ObservabilityOptions,
) -> Result<(), ObservabilityError> {
    let layers = vec![
        log_layer(&options),
        otel_layer(package_name, package_version, metrics_exporter, &options)?,
    ];

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .context(SubscriberSnafu)
}

fn log_layer<S>(options: &ObservabilityOptions) -> BoxedLayer<S>
where
    S: Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    match options.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .json()
            .with_filter(options.env_filter())
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(true)
            .compact()
            .with_filter(options.env_filter())
            .boxed(),
    }
}

fn otel_layer<S>(
    package_name: impl Into<Cow<'static, str>>,
    package_version: impl Into<Cow<'static, str>>,
    metrics_exporter: MetricsExporter,
    options: &ObservabilityOptions,
) -> Result<BoxedLayer<S>, ObservabilityError>
where
    S: Subscriber + Send + Sync,
    for<'a> S: LookupSpan<'a>,
{
    let package_name = package_name.into();

    let resource = Resource::builder()
        .with_service_name(package_name.to_string())
        .build();
    let scope = InstrumentationScope::builder(package_name)
        .with_version(package_version.into())
        .build();

    let mut tracer_provider = SdkTracerProvider::builder().with_resource(resource.clone());
    let mut meter_provider = MeterProviderBuilder::default()
        .with_resource(resource)
        .with_reader(metrics_exporter);

    if options.otlp_export {
        let spans = SpanExporter::builder()
            .with_tonic()
            .build()
            .context(ExporterSnafu)?;
        tracer_provider = tracer_provider.with_batch_exporter(spans);

        let metrics = MetricExporter::builder()
            .with_tonic()
            .build()
            .context(ExporterSnafu)?;
        meter_provider = meter_provider.with_reader(
            PeriodicReader::builder(metrics)
                .with_interval(METRICS_EXPORT_INTERVAL)
                .build(),
        );
    }

    let tracer = tracer_provider.build().tracer_with_scope(scope);
    let meter_provider = meter_provider.build();
    global::set_meter_provider(meter_provider.clone());

    Ok(options
        .env_filter()
        .and_then(MetricsLayer::new(meter_provider))
        .and_then(tracing_opentelemetry::layer().with_tracer(tracer))
        .boxed())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn options_from(vars: &[(&str, &str)]) -> ObservabilityOptions {
        let vars: HashMap<_, _> = vars.iter().copied().collect();
        ObservabilityOptions::from_lookup(|name| vars.get(name).map(|value| value.to_string()))
    }

    #[test]
    fn test_export_is_off_unless_explicitly_enabled() {
        assert!(!options_from(&[]).otlp_export);
        assert!(!options_from(&[(OTEL_SDK_DISABLED, "true")]).otlp_export);
        assert!(!options_from(&[(OTEL_SDK_DISABLED, "no")]).otlp_export);
        assert!(options_from(&[(OTEL_SDK_DISABLED, "false")]).otlp_export);
    }

    #[test]
    fn test_log_format_from_env() {
        assert_eq!(options_from(&[]).log_format, LogFormat::Compact);
        assert_eq!(
            options_from(&[(RUST_LOG_FORMAT, "json")]).log_format,
            LogFormat::Json
        );
        assert_eq!(
            options_from(&[(RUST_LOG_FORMAT, "pretty")]).log_format,
            LogFormat::Compact
        );
    }

    #[test]
    fn test_init_installs_subscriber_once() {
        let options = ObservabilityOptions::default();
        init_observability_with_options("quay-test", "0.0.0", MetricsExporter::default(), options)
            .expect("first initialization");

        let err = init_observability("quay-test", "0.0.0", MetricsExporter::default())
            .unwrap_err();
        assert!(matches!(err, ObservabilityError::Subscriber { .. }));

        let counter = meter("quay-test").u64_counter("test.count").build();
        counter.add(1, &[KeyValue::new("path", "queued")]);
    }
}
