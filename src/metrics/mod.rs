//! Metrics collection for observability

use crate::context::OptimizationStage;
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_with_registry, Counter, CounterVec, Encoder, Histogram, Opts, Registry,
    TextEncoder,
};

/// Context engine metrics registered on a caller-owned registry
#[derive(Clone)]
pub struct ContextMetrics {
    registry: Registry,

    pub context_requests: Counter,
    pub summarization_stages: CounterVec,
    pub context_tokens: Histogram,

    pub degraded_extractions: Counter,
    pub specifications_saved: Counter,
    pub specifications_deduplicated: Counter,
}

impl ContextMetrics {
    pub fn new(registry: Registry) -> Result<Self, prometheus::Error> {
        let context_requests = register_counter_with_registry!(
            Opts::new("context_requests_total", "Total conversation context requests"),
            registry
        )?;

        let summarization_stages = register_counter_vec_with_registry!(
            Opts::new(
                "context_summarization_stage_total",
                "Context optimizations by the stage that produced the result"
            ),
            &["stage"],
            registry
        )?;

        let context_tokens = register_histogram_with_registry!(
            "context_tokens",
            "Estimated tokens of returned contexts",
            vec![250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0],
            registry
        )?;

        let degraded_extractions = register_counter_with_registry!(
            Opts::new(
                "specification_extractions_degraded_total",
                "Extractions that fell back to an empty specification"
            ),
            registry
        )?;

        let specifications_saved = register_counter_with_registry!(
            Opts::new("specifications_saved_total", "Specifications persisted"),
            registry
        )?;

        let specifications_deduplicated = register_counter_with_registry!(
            Opts::new(
                "specifications_deduplicated_total",
                "Complete specifications skipped because an equivalent one was on file"
            ),
            registry
        )?;

        Ok(Self {
            registry,
            context_requests,
            summarization_stages,
            context_tokens,
            degraded_extractions,
            specifications_saved,
            specifications_deduplicated,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a served context and how it was produced
    pub fn record_context(&self, stage: OptimizationStage, tokens: usize) {
        self.context_requests.inc();
        self.summarization_stages
            .with_label_values(&[stage.as_str()])
            .inc();
        self.context_tokens.observe(tokens as f64);
    }

    pub fn record_degraded_extraction(&self) {
        self.degraded_extractions.inc();
    }

    pub fn record_specification(&self, duplicate: bool) {
        if duplicate {
            self.specifications_deduplicated.inc();
        } else {
            self.specifications_saved.inc();
        }
    }

    /// Export this registry in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
