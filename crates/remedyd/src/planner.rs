//! Fix planner.
//!
//! Turns matched runbooks plus an evidence pack into ranked FixPlans.
//! The whole pipeline is pure: identical (runbooks, pack, similar) input
//! yields an identical plan, which is what makes the ranking testable.

use chrono::Utc;
use remedy_common::{
    fix_id, ConfidenceConfig, DowngradeCondition, EvidencePack, EvidenceRef, FailurePattern,
    FixPlan, Incident, RecommendedAction, RemediationPlan, RiskDowngradeRule, RiskLevel, Runbook,
};

use crate::similar::SimilarIncident;

/// Evidence refs cited per source are capped so plans stay readable.
const MAX_REFS_PER_SOURCE: usize = 3;

pub struct FixPlanner {
    weights: ConfidenceConfig,
    downgrades: Vec<RiskDowngradeRule>,
}

impl FixPlanner {
    pub fn new(weights: ConfidenceConfig, downgrades: Vec<RiskDowngradeRule>) -> Self {
        Self { weights, downgrades }
    }

    /// Build the remediation plan for one incident snapshot.
    pub fn plan(
        &self,
        incident: &Incident,
        runbooks: &[Runbook],
        pack: &EvidencePack,
        similar: &[SimilarIncident],
    ) -> RemediationPlan {
        let mut fix_plans: Vec<FixPlan> = runbooks
            .iter()
            .map(|runbook| self.plan_one(incident, runbook, pack, similar))
            .collect();

        // Best first: highest confidence, then safest, then stable id.
        fix_plans.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(a.risk.cmp(&b.risk))
                .then(a.id.cmp(&b.id))
        });

        let recommended_fix_id = fix_plans.first().map(|plan| plan.id.clone());

        RemediationPlan {
            incident_id: incident.id.clone(),
            recommended_action: recommended_action(incident.pattern),
            fix_plans,
            recommended_fix_id,
            generated_at: Utc::now(),
        }
    }

    fn plan_one(
        &self,
        incident: &Incident,
        runbook: &Runbook,
        pack: &EvidencePack,
        similar: &[SimilarIncident],
    ) -> FixPlan {
        let evidence_refs = cited_refs(runbook, pack);
        let cited_relevance = mean_relevance(&evidence_refs, pack);
        let similar_bonus = similar_bonus(runbook, similar, self.weights.similar_bonus_max);

        let confidence = (self.weights.runbook_weight * runbook.success_rate
            + self.weights.pack_weight * pack.confidence
            + self.weights.cited_weight * cited_relevance
            + similar_bonus)
            .clamp(0.0, 1.0);

        let risk = self.effective_risk(runbook, pack);

        FixPlan {
            id: fix_id(&incident.id, &runbook.id),
            runbook_id: runbook.id.clone(),
            title: runbook.name.clone(),
            description: runbook.description.clone(),
            kind: runbook.kind,
            risk,
            confidence,
            why_this_fix: why_this_fix(incident, runbook, pack, &evidence_refs, similar_bonus),
            evidence_refs,
        }
    }

    /// Apply the table-driven downgrade heuristic. The table wins over
    /// the runbook's declared risk only when its condition holds.
    fn effective_risk(&self, runbook: &Runbook, pack: &EvidencePack) -> RiskLevel {
        for rule in &self.downgrades {
            if rule.kind == runbook.kind
                && condition_holds(rule.condition, pack)
                && rule.downgrade_to < runbook.risk
            {
                return rule.downgrade_to;
            }
        }
        runbook.risk
    }
}

/// Whether a downgrade condition is observable in the evidence.
fn condition_holds(condition: DowngradeCondition, pack: &EvidencePack) -> bool {
    match condition {
        DowngradeCondition::SoleReplica => pack
            .status_facts
            .iter()
            .find(|item| item.kind == "replicas")
            .and_then(|item| item.content.parse::<u32>().ok())
            .map(|replicas| replicas <= 1)
            .unwrap_or(false),
    }
}

/// Pick the strongest evidence items from the sources this runbook cites.
fn cited_refs(runbook: &Runbook, pack: &EvidencePack) -> Vec<EvidenceRef> {
    let mut refs = vec![];
    for source in &runbook.cited_evidence {
        let mut items: Vec<_> = pack.category(*source).iter().collect();
        items.sort_by(|a, b| b.relevance.total_cmp(&a.relevance).then(a.id.cmp(&b.id)));
        refs.extend(items.into_iter().take(MAX_REFS_PER_SOURCE).map(|item| EvidenceRef {
            kind: *source,
            ref_id: item.id.clone(),
        }));
    }
    refs
}

fn mean_relevance(refs: &[EvidenceRef], pack: &EvidencePack) -> f64 {
    let relevances: Vec<f64> = refs
        .iter()
        .filter_map(|r| pack.find(r.kind, &r.ref_id))
        .map(|item| item.relevance)
        .collect();
    if relevances.is_empty() {
        return 0.0;
    }
    relevances.iter().sum::<f64>() / relevances.len() as f64
}

/// Bonus when a similar incident was resolved by this very runbook.
fn similar_bonus(runbook: &Runbook, similar: &[SimilarIncident], max_bonus: f64) -> f64 {
    similar
        .iter()
        .filter(|s| {
            s.was_resolved
                && s.successful_fix
                    .as_deref()
                    .map(|fix| fix.ends_with(&runbook.id))
                    .unwrap_or(false)
        })
        .map(|s| s.similarity * max_bonus)
        .fold(0.0, f64::max)
}

fn why_this_fix(
    incident: &Incident,
    runbook: &Runbook,
    pack: &EvidencePack,
    refs: &[EvidenceRef],
    similar_bonus: f64,
) -> String {
    let mut lines = vec![
        format!("Pattern matches: {}", incident.pattern),
        format!("Runbook success rate: {:.0}%", runbook.success_rate * 100.0),
        format!(
            "Evidence: {} items across {} categories (pack confidence {:.0}%)",
            pack.item_count(),
            pack.populated_categories(),
            pack.confidence * 100.0
        ),
    ];
    if !refs.is_empty() {
        lines.push(format!("Cites {} supporting evidence items", refs.len()));
    }
    if similar_bonus > 0.0 {
        lines.push("A similar incident was resolved by this fix".to_string());
    }
    lines.join("\n")
}

/// Pattern-specific read-only investigation steps, offered even when no
/// runbook matches.
fn recommended_action(pattern: FailurePattern) -> RecommendedAction {
    let steps: Vec<&str> = match pattern {
        FailurePattern::RestartStorm | FailurePattern::Crashloop => vec![
            "Fetch last restart logs",
            "Describe the pod to see restart reasons",
            "Check recent events for restart triggers",
            "Review resource usage metrics",
        ],
        FailurePattern::OomPressure => vec![
            "Check memory usage metrics",
            "Review container memory limits",
            "Examine OOM kill events",
        ],
        FailurePattern::LivenessFailure => vec![
            "Inspect liveness probe configuration",
            "Check probe failure events",
            "Review application startup time",
        ],
        FailurePattern::PendingPod => vec![
            "Check pod scheduling events",
            "Review node resources and taints",
            "Check for resource quotas",
        ],
        FailurePattern::ImagePullFailure => vec![
            "Validate the image reference",
            "Check image pull secrets",
            "Verify registry authentication",
        ],
        FailurePattern::NoReadyEndpoints => vec![
            "Check endpoint readiness",
            "Review service selectors",
            "Inspect pod readiness probes",
        ],
        FailurePattern::Unknown => vec![
            "View incident logs",
            "Check Kubernetes events",
            "Review resource metrics",
        ],
    };

    RecommendedAction {
        title: format!("Investigate {}", pattern),
        description: "Review the evidence below before applying any fix".to_string(),
        steps: steps.into_iter().map(String::from).collect(),
    }
}
