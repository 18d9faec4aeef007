//! Structured tracing for pipeline runs.

use crate::core::{StageMark, StageOutcome};
use crate::errors::CnaflowError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. With `json` set,
/// every line is a JSON object.
pub fn init_tracing(json: bool) -> Result<(), CnaflowError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| CnaflowError::Internal(format!("failed to install tracing subscriber: {e}")))
}

/// Attributes describing one stage action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpanAttributes {
    /// Stage name.
    pub stage_name: String,
    /// Cache key of the stage output.
    pub key: String,
    /// Resolver mark.
    pub mark: StageMark,
    /// What the executor did.
    pub outcome: Option<StageOutcome>,
    /// Duration in milliseconds.
    pub duration_ms: Option<f64>,
    /// Error message if failed.
    pub error: Option<String>,
}

impl StageSpanAttributes {
    /// Creates attributes for a stage about to be handled.
    #[must_use]
    pub fn new(stage_name: impl Into<String>, key: impl Into<String>, mark: StageMark) -> Self {
        Self {
            stage_name: stage_name.into(),
            key: key.into(),
            mark,
            outcome: None,
            duration_ms: None,
            error: None,
        }
    }

    /// Sets the outcome.
    #[must_use]
    pub fn with_outcome(mut self, outcome: StageOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Sets the error.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Flattens the attributes into dotted field names.
    #[must_use]
    pub fn to_fields(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        attrs.insert("stage.name".to_string(), self.stage_name.clone());
        attrs.insert("stage.key".to_string(), self.key.clone());
        attrs.insert("stage.mark".to_string(), self.mark.to_string());
        if let Some(outcome) = self.outcome {
            attrs.insert("stage.outcome".to_string(), outcome.to_string());
        }
        if let Some(v) = self.duration_ms {
            attrs.insert("stage.duration_ms".to_string(), v.to_string());
        }
        if let Some(ref v) = self.error {
            attrs.insert("stage.error".to_string(), v.clone());
        }
        attrs
    }

    /// Logs the attributes as one structured event.
    pub fn record(&self) {
        let outcome = self.outcome.map(|o| o.to_string()).unwrap_or_default();
        match &self.error {
            Some(error) => tracing::error!(
                stage = %self.stage_name,
                key = %self.key,
                mark = %self.mark,
                duration_ms = self.duration_ms.unwrap_or_default(),
                error = %error,
                "Stage failed"
            ),
            None => tracing::info!(
                stage = %self.stage_name,
                key = %self.key,
                mark = %self.mark,
                outcome = %outcome,
                duration_ms = self.duration_ms.unwrap_or_default(),
                "Stage finished"
            ),
        }
    }
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span and returns the duration.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_span_attributes() {
        let attrs = StageSpanAttributes::new("smooth", "run1-qc-smooth.w3", StageMark::MustRun)
            .with_outcome(StageOutcome::Computed)
            .with_duration_ms(123.45);

        let fields = attrs.to_fields();
        assert_eq!(fields.get("stage.name"), Some(&"smooth".to_string()));
        assert_eq!(fields.get("stage.mark"), Some(&"must-run".to_string()));
        assert_eq!(fields.get("stage.outcome"), Some(&"computed".to_string()));
        assert_eq!(fields.get("stage.duration_ms"), Some(&"123.45".to_string()));
        assert!(!fields.contains_key("stage.error"));
        attrs.record();
    }

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start("load");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert_eq!(timer.name(), "load");
        assert!(timer.finish() >= 10.0);
    }
}
