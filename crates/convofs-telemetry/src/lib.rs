//! OpenTelemetry integration for convofs.
//!
//! Provides the OTel tracing layer and a sampler with differentiated rates
//! by span category.
//!
//! # Activation
//!
//! OTel export activates when standard OTel environment variables are set:
//!
//! ```bash
//! # Minimal: enables OTLP export to localhost:4317
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 convofs mount ~/convo
//!
//! # Full control
//! OTEL_SERVICE_NAME=convofs \
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://jaeger:4317 \
//! OTEL_TRACES_EXPORTER=otlp \
//! convofs mount ~/convo
//! ```
//!
//! Set `OTEL_SDK_DISABLED=true` to explicitly disable even when the endpoint is set.

#[cfg(feature = "telemetry")]
mod otel;

#[cfg(feature = "telemetry")]
pub use otel::{otel_layer, OtelGuard};

/// Errors setting up the exporter.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The OTLP exporter could not be built.
    #[error("failed to build OTLP exporter: {0}")]
    Exporter(String),
}

/// Check whether OTel export should be enabled.
///
/// Returns `true` when standard OTel env vars indicate export is desired:
/// - `OTEL_SDK_DISABLED` is NOT set to `"true"`
/// - AND at least one of:
///   - `OTEL_EXPORTER_OTLP_ENDPOINT` is set
///   - `OTEL_TRACES_EXPORTER` is set (and not `"none"`)
pub fn otel_enabled() -> bool {
    otel_enabled_with(|key| std::env::var(key).ok())
}

fn otel_enabled_with(var: impl Fn(&str) -> Option<String>) -> bool {
    // Explicit disable takes priority
    if var("OTEL_SDK_DISABLED")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
    {
        return false;
    }

    if var("OTEL_EXPORTER_OTLP_ENDPOINT").is_some() {
        return true;
    }

    if let Some(exporter) = var("OTEL_TRACES_EXPORTER") {
        return !exporter.eq_ignore_ascii_case("none");
    }

    false
}

/// Sampling rate for a span name.
///
/// | Prefix       | Rate |
/// |--------------|------|
/// | `backend.*`  | 100% |
/// | `mount.*`    | 100% |
/// | `fs.*`       | 10%  |
/// | other        | 10%  |
pub fn sample_rate(span_name: &str) -> f64 {
    if span_name.starts_with("backend") || span_name.starts_with("mount") {
        1.0
    } else {
        0.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_otel_enabled_rules() {
        assert!(!otel_enabled_with(env(&[])));
        assert!(otel_enabled_with(env(&[("OTEL_EXPORTER_OTLP_ENDPOINT", "http://x:4317")])));
        assert!(otel_enabled_with(env(&[("OTEL_TRACES_EXPORTER", "otlp")])));
        assert!(!otel_enabled_with(env(&[("OTEL_TRACES_EXPORTER", "NONE")])));
        assert!(!otel_enabled_with(env(&[
            ("OTEL_SDK_DISABLED", "true"),
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://x:4317"),
        ])));
    }

    #[test]
    fn test_sample_rates() {
        assert_eq!(sample_rate("backend.list_messages"), 1.0);
        assert_eq!(sample_rate("mount.activate"), 1.0);
        assert_eq!(sample_rate("fs.read"), 0.1);
        assert_eq!(sample_rate("something"), 0.1);
    }
}
