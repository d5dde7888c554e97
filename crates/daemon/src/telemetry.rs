//! Optional OpenTelemetry trace export.
//!
//! Activated only when the `telemetry` feature is compiled in AND
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set; otherwise the daemon logs through
//! the fmt subscriber alone.

use anyhow::Result;

/// Wire the OTLP pipeline into the tracing registry, if configured.
pub fn init_telemetry() -> Result<()> {
    let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") else {
        tracing::debug!("OTLP endpoint not set, telemetry disabled");
        return Ok(());
    };

    #[cfg(not(feature = "telemetry"))]
    {
        let _ = endpoint;
        tracing::warn!(
            "OTEL_EXPORTER_OTLP_ENDPOINT is set but this binary was built \
             without the 'telemetry' feature"
        );
        Ok(())
    }

    #[cfg(feature = "telemetry")]
    {
        use opentelemetry::trace::TracerProvider;
        use opentelemetry_otlp::WithExportConfig;
        use tracing_subscriber::layer::SubscriberExt;

        let service_name =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "armada-master".to_string());
        tracing::info!(endpoint = %endpoint, service_name = %service_name, "enabling OTLP export");

        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(&endpoint),
            )
            .install_batch(opentelemetry_sdk::runtime::Tokio)?
            .tracer(service_name);

        tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(tracing_opentelemetry::layer().with_tracer(tracer)),
        )?;
        Ok(())
    }
}
