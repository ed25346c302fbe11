//! Daemon metrics.
//!
//! The registry is owned by AppState and handed to whoever needs it;
//! there is no process-wide metrics singleton, so the workflow engine
//! stays testable in isolation.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters for the remediation workflow, registered on one registry.
pub struct Telemetry {
    registry: Registry,
    pub previews_total: IntCounter,
    pub applies_total: IntCounterVec,
    pub postchecks_total: IntCounterVec,
    pub feedback_total: IntCounter,
    pub evidence_packs_total: IntCounter,
    pub evidence_cache_hits_total: IntCounter,
}

impl Telemetry {
    pub fn new() -> Self {
        let registry = Registry::new();

        let previews_total = IntCounter::new(
            "remedy_previews_total",
            "Fix previews generated",
        )
        .expect("counter opts are static");
        let applies_total = IntCounterVec::new(
            Opts::new("remedy_applies_total", "Fix applies by terminal status"),
            &["status"],
        )
        .expect("counter opts are static");
        let postchecks_total = IntCounterVec::new(
            Opts::new("remedy_postchecks_total", "Post-checks by verdict"),
            &["verdict"],
        )
        .expect("counter opts are static");
        let feedback_total = IntCounter::new(
            "remedy_feedback_total",
            "Feedback entries recorded",
        )
        .expect("counter opts are static");
        let evidence_packs_total = IntCounter::new(
            "remedy_evidence_packs_total",
            "Evidence packs generated (cache misses)",
        )
        .expect("counter opts are static");
        let evidence_cache_hits_total = IntCounter::new(
            "remedy_evidence_cache_hits_total",
            "Evidence pack cache hits",
        )
        .expect("counter opts are static");

        for collector in [
            Box::new(previews_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(applies_total.clone()),
            Box::new(postchecks_total.clone()),
            Box::new(feedback_total.clone()),
            Box::new(evidence_packs_total.clone()),
            Box::new(evidence_cache_hits_total.clone()),
        ] {
            registry
                .register(collector)
                .expect("collectors registered once");
        }

        Self {
            registry,
            previews_total,
            applies_total,
            postchecks_total,
            feedback_total,
            evidence_packs_total,
            evidence_cache_hits_total,
        }
    }

    /// Render the registry in Prometheus text format.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if encoder
            .encode(&self.registry.gather(), &mut buf)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_render() {
        let telemetry = Telemetry::new();
        telemetry.previews_total.inc();
        telemetry.applies_total.with_label_values(&["applied"]).inc();
        let text = telemetry.render();
        assert!(text.contains("remedy_previews_total 1"));
        assert!(text.contains("remedy_applies_total"));
    }
}
