//! Configuration for remedyd.
//!
//! Loads settings from /etc/remedy/config.toml (path overridable via
//! REMEDY_CONFIG) or falls back to defaults. Every tunable the workflow
//! components consult lives here so the engine stays testable with an
//! explicit config value instead of process-wide state.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::runbook::{FixKind, RiskLevel};

/// Default config file path.
pub const CONFIG_PATH: &str = "/etc/remedy/config.toml";

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_listen_addr() -> String {
    // Localhost only; remote access goes through the operator's tunnel.
    "127.0.0.1:7710".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// Evidence aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceConfig {
    /// Default lookback window in minutes when the caller does not pass one.
    #[serde(default = "default_lookback_minutes")]
    pub default_lookback_minutes: u32,

    /// Per-source timeout in seconds; a slow source contributes nothing
    /// once this elapses.
    #[serde(default = "default_source_timeout")]
    pub source_timeout_secs: u64,

    /// How long a generated pack stays valid per (incident, window).
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Maximum cached packs.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Log lines requested from the log source.
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: usize,
}

fn default_lookback_minutes() -> u32 {
    60
}

fn default_source_timeout() -> u64 {
    5
}

fn default_cache_ttl() -> u64 {
    30
}

fn default_cache_capacity() -> usize {
    128
}

fn default_log_tail_lines() -> usize {
    100
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            default_lookback_minutes: default_lookback_minutes(),
            source_timeout_secs: default_source_timeout(),
            cache_ttl_secs: default_cache_ttl(),
            cache_capacity: default_cache_capacity(),
            log_tail_lines: default_log_tail_lines(),
        }
    }
}

/// Preview engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Ceiling for resolution + dry-run; a timeout surfaces as
    /// PreviewTimeout, distinct from a dry-run rejection.
    #[serde(default = "default_preview_timeout")]
    pub timeout_secs: u64,
}

fn default_preview_timeout() -> u64 {
    15
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_preview_timeout(),
        }
    }
}

/// Post-check scheduling: settle delay per fix kind before re-checking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostCheckConfig {
    #[serde(default = "default_settle_secs")]
    pub settle_secs: HashMap<FixKind, u64>,

    /// Fallback when a fix kind has no entry in the table.
    #[serde(default = "default_settle_fallback")]
    pub settle_fallback_secs: u64,
}

fn default_settle_secs() -> HashMap<FixKind, u64> {
    // Fixes that recreate pods need the longest settle time.
    HashMap::from([
        (FixKind::Restart, 120),
        (FixKind::Delete, 120),
        (FixKind::Rollback, 90),
        (FixKind::Patch, 60),
        (FixKind::Scale, 45),
    ])
}

fn default_settle_fallback() -> u64 {
    60
}

impl PostCheckConfig {
    pub fn settle_delay_secs(&self, kind: FixKind) -> u64 {
        self.settle_secs
            .get(&kind)
            .copied()
            .unwrap_or(self.settle_fallback_secs)
    }
}

impl Default for PostCheckConfig {
    fn default() -> Self {
        Self {
            settle_secs: default_settle_secs(),
            settle_fallback_secs: default_settle_fallback(),
        }
    }
}

/// Weights of the confidence formulas. All blends are monotonic in each
/// input; the weights only shift emphasis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    /// Pack confidence: weight of populated-category coverage.
    #[serde(default = "default_coverage_weight")]
    pub coverage_weight: f64,

    /// Pack confidence: weight of mean item relevance.
    #[serde(default = "default_relevance_weight")]
    pub relevance_weight: f64,

    /// Fix confidence: weight of the runbook's success rate.
    #[serde(default = "default_runbook_weight")]
    pub runbook_weight: f64,

    /// Fix confidence: weight of the pack's overall confidence.
    #[serde(default = "default_pack_weight")]
    pub pack_weight: f64,

    /// Fix confidence: weight of the cited evidence's mean relevance.
    #[serde(default = "default_cited_weight")]
    pub cited_weight: f64,

    /// Maximum bonus from a similar resolved incident using the same
    /// runbook.
    #[serde(default = "default_similar_bonus_max")]
    pub similar_bonus_max: f64,
}

fn default_coverage_weight() -> f64 {
    0.6
}

fn default_relevance_weight() -> f64 {
    0.4
}

fn default_runbook_weight() -> f64 {
    0.5
}

fn default_pack_weight() -> f64 {
    0.35
}

fn default_cited_weight() -> f64 {
    0.15
}

fn default_similar_bonus_max() -> f64 {
    0.05
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            coverage_weight: default_coverage_weight(),
            relevance_weight: default_relevance_weight(),
            runbook_weight: default_runbook_weight(),
            pack_weight: default_pack_weight(),
            cited_weight: default_cited_weight(),
            similar_bonus_max: default_similar_bonus_max(),
        }
    }
}

/// Condition under which a planned fix's risk may be downgraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DowngradeCondition {
    /// The target is the only replica; restarting it cannot widen the
    /// blast radius beyond the incident itself.
    SoleReplica,
}

/// One entry of the risk-downgrade heuristic table. The table is data,
/// not code, so deployments can override it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskDowngradeRule {
    pub kind: FixKind,
    pub condition: DowngradeCondition,
    pub downgrade_to: RiskLevel,
}

fn default_risk_downgrades() -> Vec<RiskDowngradeRule> {
    vec![RiskDowngradeRule {
        kind: FixKind::Restart,
        condition: DowngradeCondition::SoleReplica,
        downgrade_to: RiskLevel::Low,
    }]
}

/// Feedback recorder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    /// Optional JSONL journal for the append-only audit trail.
    #[serde(default)]
    pub journal_path: Option<PathBuf>,

    /// EWMA smoothing factor for runbook success rates. Higher values
    /// weigh recent outcomes more.
    #[serde(default = "default_ewma_alpha")]
    pub ewma_alpha: f64,
}

fn default_ewma_alpha() -> f64 {
    0.2
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            journal_path: None,
            ewma_alpha: default_ewma_alpha(),
        }
    }
}

/// Cluster gateway selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// "kubectl" (default) or "memory" for a clusterless dev daemon.
    #[serde(default = "default_cluster_mode")]
    pub mode: String,

    #[serde(default = "default_kubectl_bin")]
    pub kubectl_bin: String,
}

fn default_cluster_mode() -> String {
    "kubectl".to_string()
}

fn default_kubectl_bin() -> String {
    "kubectl".to_string()
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            mode: default_cluster_mode(),
            kubectl_bin: default_kubectl_bin(),
        }
    }
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemedyConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub evidence: EvidenceConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub postcheck: PostCheckConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default = "default_risk_downgrades")]
    pub risk_downgrades: Vec<RiskDowngradeRule>,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
}

impl Default for RemedyConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            evidence: EvidenceConfig::default(),
            preview: PreviewConfig::default(),
            postcheck: PostCheckConfig::default(),
            confidence: ConfidenceConfig::default(),
            risk_downgrades: default_risk_downgrades(),
            feedback: FeedbackConfig::default(),
            cluster: ClusterConfig::default(),
        }
    }
}

impl RemedyConfig {
    /// Load from the configured path, falling back to defaults when the
    /// file is missing or malformed.
    pub fn load() -> Self {
        let path = std::env::var("REMEDY_CONFIG").unwrap_or_else(|_| CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<RemedyConfig>(&contents) {
                Ok(config) => {
                    info!("[CONFIG] Loaded {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("[CONFIG] Failed to parse {}: {}. Using defaults.", path.display(), e);
                    RemedyConfig::default()
                }
            },
            Err(_) => {
                info!("[CONFIG] No config at {}, using defaults", path.display());
                RemedyConfig::default()
            }
        }
    }
}
