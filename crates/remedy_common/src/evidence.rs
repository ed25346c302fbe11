//! Evidence model - facts gathered about an incident.
//!
//! An EvidencePack is a frozen snapshot: it is produced once per
//! (incident, lookback window) request and regenerated on demand, never
//! updated in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::incident::{ResourceRef, Severity};

/// Origin of a piece of evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceSource {
    Event,
    Log,
    Status,
    Metric,
    Change,
    Probe,
}

impl EvidenceSource {
    /// All evidence categories, in the order they appear in a pack.
    pub const ALL: [EvidenceSource; 6] = [
        EvidenceSource::Event,
        EvidenceSource::Log,
        EvidenceSource::Status,
        EvidenceSource::Metric,
        EvidenceSource::Change,
        EvidenceSource::Probe,
    ];
}

/// A single piece of evidence produced by an upstream collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceItem {
    pub id: String,
    pub source: EvidenceSource,
    /// Free-form subtype, e.g. "BackOff" for events or "restart_count"
    /// for status facts.
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// Relevance to the incident in [0,1], assigned by the aggregator.
    pub relevance: f64,
}

/// Frozen bundle of evidence for one incident snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidencePack {
    pub incident_id: String,
    /// Lookback window the whole pack was gathered for, in minutes.
    /// Items from two different windows never share a pack.
    pub lookback_minutes: u32,
    pub events: Vec<EvidenceItem>,
    pub logs: Vec<EvidenceItem>,
    pub status_facts: Vec<EvidenceItem>,
    pub metrics_facts: Vec<EvidenceItem>,
    pub change_history: Vec<EvidenceItem>,
    pub probe_results: Vec<EvidenceItem>,
    /// Completeness/reliability of this pack in [0,1].
    pub confidence: f64,
    pub generated_at: DateTime<Utc>,
}

impl EvidencePack {
    pub fn empty(incident_id: &str, lookback_minutes: u32) -> Self {
        Self {
            incident_id: incident_id.to_string(),
            lookback_minutes,
            events: vec![],
            logs: vec![],
            status_facts: vec![],
            metrics_facts: vec![],
            change_history: vec![],
            probe_results: vec![],
            confidence: 0.0,
            generated_at: Utc::now(),
        }
    }

    pub fn category(&self, source: EvidenceSource) -> &[EvidenceItem] {
        match source {
            EvidenceSource::Event => &self.events,
            EvidenceSource::Log => &self.logs,
            EvidenceSource::Status => &self.status_facts,
            EvidenceSource::Metric => &self.metrics_facts,
            EvidenceSource::Change => &self.change_history,
            EvidenceSource::Probe => &self.probe_results,
        }
    }

    pub fn category_mut(&mut self, source: EvidenceSource) -> &mut Vec<EvidenceItem> {
        match source {
            EvidenceSource::Event => &mut self.events,
            EvidenceSource::Log => &mut self.logs,
            EvidenceSource::Status => &mut self.status_facts,
            EvidenceSource::Metric => &mut self.metrics_facts,
            EvidenceSource::Change => &mut self.change_history,
            EvidenceSource::Probe => &mut self.probe_results,
        }
    }

    /// Number of categories that returned at least one item.
    pub fn populated_categories(&self) -> usize {
        EvidenceSource::ALL
            .iter()
            .filter(|s| !self.category(**s).is_empty())
            .count()
    }

    pub fn all_items(&self) -> impl Iterator<Item = &EvidenceItem> {
        EvidenceSource::ALL
            .into_iter()
            .flat_map(|s| self.category(s).iter())
    }

    pub fn item_count(&self) -> usize {
        self.all_items().count()
    }

    /// Look up an item by (source, id); used to resolve FixPlan
    /// evidence refs, which are weak references into the pack.
    pub fn find(&self, source: EvidenceSource, id: &str) -> Option<&EvidenceItem> {
        self.category(source).iter().find(|item| item.id == id)
    }
}

/// One normalized change to a watched resource, as exposed by
/// `GET /incidents/{id}/changes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub change_type: String,
    pub timestamp: DateTime<Utc>,
    pub namespace: String,
    pub resource_kind: String,
    pub resource_name: String,
    pub severity: Severity,
    pub reason: String,
    pub message: String,
}

impl ChangeEvent {
    /// Parse an ISO-8601 timestamp, falling back to `aggregated_at` when
    /// the input is malformed. Invalid timestamps never survive to the
    /// wire.
    pub fn normalize_timestamp(raw: &str, aggregated_at: DateTime<Utc>) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(aggregated_at)
    }

    pub fn resource(&self) -> ResourceRef {
        ResourceRef::new(&self.namespace, &self.resource_kind, &self.resource_name)
    }
}
