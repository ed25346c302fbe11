//! Terminal rendering for remedyctl.

use owo_colors::OwoColorize;
use remedy_common::{
    EvidencePack, EvidenceSource, FixPreview, Incident, RemediationPlan, RiskLevel, Severity,
};

pub fn risk_colored(risk: RiskLevel) -> String {
    match risk {
        RiskLevel::Low => risk.to_string().green().to_string(),
        RiskLevel::Medium => risk.to_string().yellow().to_string(),
        RiskLevel::High => risk.to_string().red().to_string(),
        RiskLevel::Critical => risk.to_string().red().bold().to_string(),
    }
}

fn severity_colored(severity: Severity) -> String {
    match severity {
        Severity::Critical => "critical".red().bold().to_string(),
        Severity::High => "high".red().to_string(),
        Severity::Medium => "medium".yellow().to_string(),
        Severity::Low => "low".green().to_string(),
        Severity::Info => "info".dimmed().to_string(),
    }
}

pub fn percent(value: f64) -> String {
    format!("{:.0}%", value * 100.0)
}

fn age(since: chrono::DateTime<chrono::Utc>) -> String {
    let minutes = (chrono::Utc::now() - since).num_minutes().max(0);
    if minutes < 60 {
        format!("{}m", minutes)
    } else if minutes < 60 * 24 {
        format!("{}h", minutes / 60)
    } else {
        format!("{}d", minutes / (60 * 24))
    }
}

pub fn print_incidents(incidents: &[Incident]) {
    if incidents.is_empty() {
        println!("No incidents.");
        return;
    }
    for incident in incidents {
        println!(
            "{}  {}  {}  {}  {}  {}",
            incident.id.bold(),
            incident.pattern,
            severity_colored(incident.severity),
            incident.resource,
            format!("{:?}", incident.status).to_lowercase().dimmed(),
            age(incident.first_seen).dimmed(),
        );
    }
}

pub fn print_evidence(pack: &EvidencePack) {
    println!(
        "Evidence for {} (window {}m, confidence {})",
        pack.incident_id.bold(),
        pack.lookback_minutes,
        percent(pack.confidence)
    );
    for source in EvidenceSource::ALL {
        let items = pack.category(source);
        if items.is_empty() {
            continue;
        }
        println!("\n{:?} ({})", source, items.len());
        for item in items.iter().take(5) {
            println!("  [{}] {}", percent(item.relevance).dimmed(), item.summary);
        }
    }
}

pub fn print_plan(plan: &RemediationPlan) {
    println!("{}", plan.recommended_action.title.bold());
    for step in &plan.recommended_action.steps {
        println!("  - {}", step);
    }

    if plan.fix_plans.is_empty() {
        println!("\nNo fixes available for this incident.");
        return;
    }

    println!();
    for (i, fix) in plan.fix_plans.iter().enumerate() {
        let marker = if Some(&fix.id) == plan.recommended_fix_id.as_ref() {
            "*".green().to_string()
        } else {
            " ".to_string()
        };
        println!(
            "{} {}. {}  risk={}  confidence={}",
            marker,
            i + 1,
            fix.title.bold(),
            risk_colored(fix.risk),
            percent(fix.confidence)
        );
        println!("     {}", fix.id.dimmed());
    }
}

pub fn print_preview(preview: &FixPreview) {
    println!(
        "{}  risk={}  confidence={}",
        preview.title.bold(),
        risk_colored(preview.risk),
        percent(preview.confidence)
    );
    println!("\n{}", preview.why_this_fix.dimmed());

    println!("\nCommands:");
    for command in &preview.commands {
        println!("  $ {}", command);
    }

    println!("\n{}", preview.diff);

    if preview.dry_run_ok() {
        println!("{} {}", "dry-run ok:".green(), preview.dry_run_output);
    } else {
        println!("{} {}", "dry-run rejected:".red().bold(), preview.dry_run_error);
        println!("This fix cannot be applied until the rejection is addressed.");
    }

    if !preview.rollback.commands.is_empty() {
        println!("\nRollback: {}", preview.rollback.description);
        for command in &preview.rollback.commands {
            println!("  $ {}", command);
        }
    }
}
