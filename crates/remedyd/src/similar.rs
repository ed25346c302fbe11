//! Similar-incident search over the archive.
//!
//! Read-only ranking used by the API and, as an optional signal, by the
//! planner's confidence blend.

use remedy_common::{FailurePattern, Incident};
use serde::{Deserialize, Serialize};

use crate::store::ArchivedIncident;

/// Minimum score for an archived incident to count as similar at all.
const SIMILARITY_FLOOR: f64 = 0.3;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarIncident {
    pub incident_id: String,
    pub similarity: f64,
    pub pattern: FailurePattern,
    pub was_resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub successful_fix: Option<String>,
}

/// Score one archived incident against the live one. Pattern identity
/// dominates; target proximity refines.
fn similarity(incident: &Incident, archived: &ArchivedIncident) -> f64 {
    let mut score = 0.0;
    if archived.pattern == incident.pattern {
        score += 0.6;
    }
    if archived.resource.namespace == incident.resource.namespace {
        score += 0.15;
    }
    if archived.resource.kind == incident.resource.kind {
        score += 0.15;
    }
    if archived.resource.name == incident.resource.name {
        score += 0.1;
    }
    score
}

/// Ranked similar incidents, best first.
pub fn find_similar(
    incident: &Incident,
    archive: &[ArchivedIncident],
    limit: usize,
) -> Vec<SimilarIncident> {
    let mut scored: Vec<SimilarIncident> = archive
        .iter()
        .filter(|archived| archived.incident_id != incident.id)
        .map(|archived| SimilarIncident {
            incident_id: archived.incident_id.clone(),
            similarity: similarity(incident, archived),
            pattern: archived.pattern,
            was_resolved: archived.was_resolved,
            resolution: archived.resolution.clone(),
            successful_fix: archived.successful_fix.clone(),
        })
        .filter(|s| s.similarity >= SIMILARITY_FLOOR)
        .collect();

    scored.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then(a.incident_id.cmp(&b.incident_id))
    });
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use remedy_common::{IncidentStatus, ResourceRef, Severity};

    fn incident() -> Incident {
        Incident {
            id: "inc-live".to_string(),
            pattern: FailurePattern::Crashloop,
            severity: Severity::High,
            status: IncidentStatus::Open,
            resource: ResourceRef::new("prod", "Pod", "api-1"),
            title: "crashloop".to_string(),
            confidence: 0.8,
            diagnosis: None,
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            resolved_at: None,
            resolution: None,
        }
    }

    fn archived(id: &str, pattern: FailurePattern, namespace: &str) -> ArchivedIncident {
        ArchivedIncident {
            incident_id: id.to_string(),
            pattern,
            resource: ResourceRef::new(namespace, "Pod", "other"),
            was_resolved: true,
            resolution: Some("restarted".to_string()),
            successful_fix: Some(format!("fix-{}-restart-pod", id)),
            archived_at: Utc::now(),
        }
    }

    #[test]
    fn test_same_pattern_ranks_above_different() {
        let archive = vec![
            archived("inc-a", FailurePattern::OomPressure, "prod"),
            archived("inc-b", FailurePattern::Crashloop, "prod"),
        ];
        let similar = find_similar(&incident(), &archive, 10);
        assert_eq!(similar[0].incident_id, "inc-b");
    }

    #[test]
    fn test_floor_filters_unrelated() {
        let archive = vec![archived("inc-a", FailurePattern::OomPressure, "staging")];
        let similar = find_similar(&incident(), &archive, 10);
        // Different pattern, namespace, and name: only kind matches.
        assert!(similar.is_empty());
    }

    #[test]
    fn test_excludes_self_and_respects_limit() {
        let mut archive: Vec<ArchivedIncident> = (0..5)
            .map(|i| archived(&format!("inc-{}", i), FailurePattern::Crashloop, "prod"))
            .collect();
        archive.push(archived("inc-live", FailurePattern::Crashloop, "prod"));

        let similar = find_similar(&incident(), &archive, 3);
        assert_eq!(similar.len(), 3);
        assert!(similar.iter().all(|s| s.incident_id != "inc-live"));
    }
}
