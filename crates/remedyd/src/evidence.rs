//! Evidence aggregator.
//!
//! Gathers facts about an incident from the cluster's independent
//! sources into one frozen EvidencePack. Sources run concurrently, each
//! under its own timeout; a failed or slow source contributes an empty
//! category and lowers pack confidence instead of failing the request.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use lru::LruCache;
use remedy_common::{
    ChangeEvent, ClusterGateway, ConfidenceConfig, EvidenceConfig, EvidenceItem, EvidencePack,
    EvidenceSource, FailurePattern, GatewayError, Incident, Severity,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Keywords that make an evidence item relevant to a failure pattern.
/// Scoring is table-driven so new patterns only add rows.
const PATTERN_KEYWORDS: &[(FailurePattern, &[&str])] = &[
    (
        FailurePattern::RestartStorm,
        &["restart", "back-off", "backoff", "killed", "started"],
    ),
    (
        FailurePattern::Crashloop,
        &["crashloopbackoff", "back-off", "crash", "exit code", "restart"],
    ),
    (
        FailurePattern::OomPressure,
        &["oom", "oomkilled", "memory", "out of memory"],
    ),
    (
        FailurePattern::LivenessFailure,
        &["liveness", "probe failed", "unhealthy"],
    ),
    (
        FailurePattern::PendingPod,
        &["pending", "unschedulable", "failedscheduling", "insufficient"],
    ),
    (
        FailurePattern::ImagePullFailure,
        &["errimagepull", "imagepullbackoff", "pull", "manifest"],
    ),
    (
        FailurePattern::NoReadyEndpoints,
        &["endpoint", "not ready", "readiness"],
    ),
];

/// Relevance of one item to the incident's pattern, in [0,1].
fn score_relevance(pattern: FailurePattern, content: &str, severity: Option<Severity>) -> f64 {
    let mut score: f64 = 0.5;

    let lowered = content.to_lowercase();
    let keywords = PATTERN_KEYWORDS
        .iter()
        .find(|(p, _)| *p == pattern)
        .map(|(_, kw)| *kw)
        .unwrap_or(&[]);
    if keywords.iter().any(|kw| lowered.contains(kw)) {
        score += 0.3;
    }

    if matches!(severity, Some(Severity::Critical) | Some(Severity::High)) {
        score += 0.2;
    }

    score.clamp(0.0, 1.0)
}

/// Pack confidence from category coverage and mean item relevance.
/// Monotonic in both inputs, zero only when every category is empty.
fn pack_confidence(pack: &EvidencePack, weights: &ConfidenceConfig) -> f64 {
    let items = pack.item_count();
    if items == 0 {
        return 0.0;
    }
    let coverage = pack.populated_categories() as f64 / EvidenceSource::ALL.len() as f64;
    let mean_relevance =
        pack.all_items().map(|item| item.relevance).sum::<f64>() / items as f64;

    (weights.coverage_weight * coverage + weights.relevance_weight * mean_relevance).clamp(0.0, 1.0)
}

struct CachedPack {
    pack: EvidencePack,
    expires_at: Instant,
}

/// Gathers and caches evidence packs.
pub struct EvidenceAggregator {
    gateway: Arc<dyn ClusterGateway>,
    config: EvidenceConfig,
    weights: ConfidenceConfig,
    cache: Mutex<LruCache<(String, u32), CachedPack>>,
}

impl EvidenceAggregator {
    pub fn new(
        gateway: Arc<dyn ClusterGateway>,
        config: EvidenceConfig,
        weights: ConfidenceConfig,
    ) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            gateway,
            config,
            weights,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Gather an evidence pack, serving from cache when a pack for the
    /// same (incident, window) is still fresh. Cached packs never mix
    /// lookback windows because the window is part of the key.
    pub async fn gather(&self, incident: &Incident, lookback_minutes: Option<u32>) -> EvidencePack {
        let window = lookback_minutes.unwrap_or(self.config.default_lookback_minutes);
        let key = (incident.id.clone(), window);

        {
            let mut cache = self.cache.lock().await;
            if let Some(cached) = cache.get(&key) {
                if cached.expires_at > Instant::now() {
                    debug!("[EVIDENCE] Cache hit for {} ({}m)", incident.id, window);
                    return cached.pack.clone();
                }
                cache.pop(&key);
            }
        }

        let pack = self.gather_fresh(incident, window).await;

        let mut cache = self.cache.lock().await;
        cache.put(
            key,
            CachedPack {
                pack: pack.clone(),
                expires_at: Instant::now() + Duration::from_secs(self.config.cache_ttl_secs),
            },
        );
        pack
    }

    /// Query every source concurrently and assemble the frozen pack.
    async fn gather_fresh(&self, incident: &Incident, window: u32) -> EvidencePack {
        let target = &incident.resource;
        let pattern = incident.pattern;
        let timeout = Duration::from_secs(self.config.source_timeout_secs);

        let (events, logs, status, metrics, changes, probes) = tokio::join!(
            guarded(
                EvidenceSource::Event,
                timeout,
                self.gateway.list_events(target, window)
            ),
            guarded(
                EvidenceSource::Log,
                timeout,
                self.gateway.tail_logs(target, self.config.log_tail_lines)
            ),
            guarded(
                EvidenceSource::Status,
                timeout,
                self.gateway.fetch_resource(target)
            ),
            guarded(
                EvidenceSource::Metric,
                timeout,
                self.gateway.read_metrics(target)
            ),
            guarded(
                EvidenceSource::Change,
                timeout,
                self.gateway.change_history(target, window)
            ),
            guarded(
                EvidenceSource::Probe,
                timeout,
                self.gateway.probe_status(target)
            ),
        );

        let mut pack = EvidencePack::empty(&incident.id, window);
        let now = Utc::now();

        if let Some(events) = events {
            pack.events = events
                .iter()
                .enumerate()
                .map(|(i, event)| EvidenceItem {
                    id: format!("event-{}", i),
                    source: EvidenceSource::Event,
                    kind: event.reason.clone(),
                    timestamp: ChangeEvent::normalize_timestamp(&event.timestamp, now),
                    content: event.message.clone(),
                    summary: format!("{} (x{})", event.reason, event.count),
                    severity: Some(event.severity),
                    relevance: score_relevance(
                        pattern,
                        &format!("{} {}", event.reason, event.message),
                        Some(event.severity),
                    ),
                })
                .collect();
        }

        if let Some(logs) = logs {
            pack.logs = logs
                .iter()
                .enumerate()
                .map(|(i, line)| EvidenceItem {
                    id: format!("log-{}", i),
                    source: EvidenceSource::Log,
                    kind: "tail".to_string(),
                    timestamp: now,
                    content: line.clone(),
                    summary: truncate(line, 120),
                    severity: None,
                    relevance: score_relevance(pattern, line, None),
                })
                .collect();
        }

        if let Some(snapshot) = status {
            let mut facts = vec![
                (
                    "restart_count",
                    snapshot.restart_count.to_string(),
                    format!("{} restarts observed", snapshot.restart_count),
                ),
                (
                    "ready",
                    snapshot.ready.to_string(),
                    if snapshot.ready {
                        "resource is ready".to_string()
                    } else {
                        "resource is not ready".to_string()
                    },
                ),
                ("phase", snapshot.phase.clone(), format!("phase {}", snapshot.phase)),
            ];
            if let Some(replicas) = snapshot.replicas {
                facts.push((
                    "replicas",
                    replicas.to_string(),
                    format!("{} replicas configured", replicas),
                ));
            }
            pack.status_facts = facts
                .into_iter()
                .enumerate()
                .map(|(i, (kind, content, summary))| EvidenceItem {
                    id: format!("status-{}", i),
                    source: EvidenceSource::Status,
                    kind: kind.to_string(),
                    timestamp: now,
                    content,
                    summary: summary.clone(),
                    severity: None,
                    relevance: score_relevance(pattern, &summary, None),
                })
                .collect();
        }

        if let Some(metrics) = metrics {
            pack.metrics_facts = metrics
                .iter()
                .enumerate()
                .map(|(i, sample)| EvidenceItem {
                    id: format!("metric-{}", i),
                    source: EvidenceSource::Metric,
                    kind: sample.name.clone(),
                    timestamp: now,
                    content: format!("{} {}", sample.value, sample.unit),
                    summary: format!("{} = {} {}", sample.name, sample.value, sample.unit),
                    severity: None,
                    relevance: score_relevance(pattern, &sample.name, None),
                })
                .collect();
        }

        if let Some(changes) = changes {
            pack.change_history = changes
                .iter()
                .enumerate()
                .map(|(i, change)| EvidenceItem {
                    id: format!("change-{}", i),
                    source: EvidenceSource::Change,
                    kind: change.change_type.clone(),
                    timestamp: ChangeEvent::normalize_timestamp(&change.timestamp, now),
                    content: change.message.clone(),
                    summary: format!("{}: {}", change.change_type, change.reason),
                    severity: Some(change.severity),
                    relevance: score_relevance(pattern, &change.message, Some(change.severity)),
                })
                .collect();
        }

        if let Some(probes) = probes {
            pack.probe_results = probes
                .iter()
                .enumerate()
                .map(|(i, probe)| EvidenceItem {
                    id: format!("probe-{}", i),
                    source: EvidenceSource::Probe,
                    kind: probe.probe.clone(),
                    timestamp: now,
                    content: probe.detail.clone(),
                    summary: format!(
                        "{} probe {}",
                        probe.probe,
                        if probe.healthy { "healthy" } else { "failing" }
                    ),
                    severity: if probe.healthy {
                        None
                    } else {
                        Some(Severity::High)
                    },
                    relevance: score_relevance(
                        pattern,
                        &format!("{} {}", probe.probe, probe.detail),
                        None,
                    ),
                })
                .collect();
        }

        pack.confidence = pack_confidence(&pack, &self.weights);
        pack.generated_at = now;
        pack
    }

    /// Normalized change events for `GET /incidents/{id}/changes`,
    /// newest first.
    pub async fn change_events(
        &self,
        incident: &Incident,
        lookback_minutes: Option<u32>,
    ) -> Vec<ChangeEvent> {
        let window = lookback_minutes.unwrap_or(self.config.default_lookback_minutes);
        let now = Utc::now();
        let records = match self
            .gateway
            .change_history(&incident.resource, window)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!("[EVIDENCE] change history unavailable for {}: {}", incident.id, e);
                return vec![];
            }
        };

        let mut changes: Vec<ChangeEvent> = records
            .into_iter()
            .map(|record| ChangeEvent {
                change_type: record.change_type,
                timestamp: ChangeEvent::normalize_timestamp(&record.timestamp, now),
                namespace: record.resource.namespace.clone(),
                resource_kind: record.resource.kind.clone(),
                resource_name: record.resource.name.clone(),
                severity: record.severity,
                reason: record.reason,
                message: record.message,
            })
            .collect();
        changes.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        changes
    }
}

/// Run one source under its timeout. Failure or timeout yields None and
/// a warning; the pack just misses that category.
async fn guarded<T, F>(source: EvidenceSource, timeout: Duration, future: F) -> Option<T>
where
    F: std::future::Future<Output = Result<T, GatewayError>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!("[EVIDENCE] {:?} source failed: {}", source, e);
            None
        }
        Err(_) => {
            warn!("[EVIDENCE] {:?} source timed out after {:?}", source, timeout);
            None
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}
