//! In-memory incident store.
//!
//! Incidents are registered by the external detector through the API
//! boundary and only ever move forward in status here. Resolved
//! incidents are archived for the similar-incident search; nothing is
//! deleted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use remedy_common::{FailurePattern, Incident, ResourceRef};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

/// A resolved incident kept for history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedIncident {
    pub incident_id: String,
    pub pattern: FailurePattern,
    pub resource: ResourceRef,
    pub was_resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    /// Fix that resolved it, when feedback told us one did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub successful_fix: Option<String>,
    pub archived_at: DateTime<Utc>,
}

/// Live incidents plus the archive ring.
pub struct IncidentStore {
    incidents: RwLock<HashMap<String, Incident>>,
    archive: RwLock<Vec<ArchivedIncident>>,
    archive_capacity: usize,
}

impl IncidentStore {
    pub fn new() -> Self {
        Self {
            incidents: RwLock::new(HashMap::new()),
            archive: RwLock::new(Vec::new()),
            archive_capacity: 512,
        }
    }

    /// Register or refresh an incident from the detector.
    pub async fn upsert(&self, incident: Incident) {
        let mut incidents = self.incidents.write().await;
        info!("[STORE] Registered incident {} ({})", incident.id, incident.pattern);
        incidents.insert(incident.id.clone(), incident);
    }

    pub async fn get(&self, id: &str) -> Option<Incident> {
        self.incidents.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<Incident> {
        let mut all: Vec<Incident> = self.incidents.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        all
    }

    /// Mark an incident resolved and push it into the archive. The live
    /// entry stays (archived, not deleted) so later reads still find it.
    pub async fn resolve(&self, id: &str, resolution: &str, successful_fix: Option<String>) -> bool {
        let mut incidents = self.incidents.write().await;
        let Some(incident) = incidents.get_mut(id) else {
            return false;
        };
        if incident.is_active() {
            incident.resolve(resolution);
        }
        let entry = ArchivedIncident {
            incident_id: incident.id.clone(),
            pattern: incident.pattern,
            resource: incident.resource.clone(),
            was_resolved: true,
            resolution: Some(resolution.to_string()),
            successful_fix,
            archived_at: Utc::now(),
        };
        drop(incidents);

        let mut archive = self.archive.write().await;
        archive.push(entry);
        if archive.len() > self.archive_capacity {
            let overflow = archive.len() - self.archive_capacity;
            archive.drain(..overflow);
        }
        true
    }

    pub async fn archived(&self) -> Vec<ArchivedIncident> {
        self.archive.read().await.clone()
    }

    /// Whether the incident is still active; used by the post-check
    /// scheduler to no-op on manually resolved incidents.
    pub async fn is_active(&self, id: &str) -> bool {
        self.incidents
            .read()
            .await
            .get(id)
            .map(|incident| incident.is_active())
            .unwrap_or(false)
    }
}

impl Default for IncidentStore {
    fn default() -> Self {
        Self::new()
    }
}
