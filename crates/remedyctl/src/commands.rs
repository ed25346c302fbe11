//! Command implementations gluing the client to the display layer.

use anyhow::{anyhow, bail, Result};
use owo_colors::OwoColorize;
use remedy_common::{ApplyRequest, FeedbackRequest, FeedbackType};

use crate::cli::Command;
use crate::client::RemedyClient;
use crate::display;

pub async fn run(client: RemedyClient, command: Command) -> Result<()> {
    match command {
        Command::Incidents => {
            let incidents = client.incidents().await?;
            display::print_incidents(&incidents);
        }
        Command::Evidence { incident, lookback } => {
            let pack = client.evidence(&incident, lookback).await?;
            display::print_evidence(&pack);
        }
        Command::Fixes { incident } => {
            let plan = client.fixes(&incident).await?;
            display::print_plan(&plan);
        }
        Command::Preview { incident, fix } => {
            let preview = client.preview(&incident, &fix).await?;
            display::print_preview(&preview);
        }
        Command::Apply {
            incident,
            fix,
            yes,
            ack_risk,
        } => {
            if !yes {
                bail!("refusing to apply without --yes; preview the fix first");
            }
            let request = ApplyRequest {
                fix_id: fix,
                confirmed: true,
                ack_elevated_risk: ack_risk,
                resource_info: None,
            };
            let response = client.apply(&incident, &request).await?;
            let status = response["status"].as_str().unwrap_or("unknown");
            let execution = response["executionId"].as_str().unwrap_or("-");
            if status == "applied" {
                println!("{} execution {}", "applied".green().bold(), execution);
                println!("{}", response["message"].as_str().unwrap_or(""));
                println!("A post-check will run automatically after the fix settles.");
            } else {
                println!("{} {}", "failed:".red().bold(), response["message"].as_str().unwrap_or(""));
            }
        }
        Command::PostCheck {
            incident,
            execution,
        } => {
            let report = client.post_check(&incident, &execution).await?;
            let verdict = report["verdict"].as_str().unwrap_or("unknown");
            match verdict {
                "improved" => println!("{}", "improved".green().bold()),
                "not_improved" => println!("{}", "not improved".red().bold()),
                _ => println!("{}", "inconclusive (could not verify)".yellow()),
            }
            if let Some(checks) = report["checks"].as_array() {
                for check in checks {
                    let ok = check["ok"].as_bool().unwrap_or(false);
                    let mark = if ok { "ok".green().to_string() } else { "!!".red().to_string() };
                    println!(
                        "  [{}] {}: {}",
                        mark,
                        check["name"].as_str().unwrap_or(""),
                        check["message"].as_str().unwrap_or("")
                    );
                }
            }
        }
        Command::Feedback {
            incident,
            feedback_type,
            fix,
            note,
        } => {
            let feedback_type = parse_feedback_type(&feedback_type)?;
            let request = FeedbackRequest {
                feedback_type,
                content: note,
                fix_id: fix,
            };
            let response = client.feedback(&incident, &request).await?;
            println!("{}", response.message);
            if let Some(summary) = response.summary {
                println!(
                    "{} success rate now {} over {} executions",
                    summary.runbook_id,
                    display::percent(summary.success_rate),
                    summary.execution_count
                );
            }
        }
    }
    Ok(())
}

/// Parse the feedback vocabulary, with the server-side enum as the
/// single source of truth for what is valid.
fn parse_feedback_type(raw: &str) -> Result<FeedbackType> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| anyhow!("unknown feedback type '{}'", raw))
}
