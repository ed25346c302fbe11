//! Command-line interface definitions.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "remedyctl", version, about = "Operator CLI for the remedy daemon")]
pub struct Cli {
    /// Daemon address, e.g. http://127.0.0.1:7710 (falls back to
    /// REMEDY_ADDR, then the default)
    #[arg(long, global = true)]
    pub addr: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List known incidents
    Incidents,

    /// Show the evidence pack for an incident
    Evidence {
        incident: String,
        /// Lookback window in minutes
        #[arg(long)]
        lookback: Option<u32>,
    },

    /// Show the remediation plan (ranked fixes) for an incident
    Fixes { incident: String },

    /// Preview a fix: diff, commands, and dry-run verdict
    Preview {
        incident: String,
        /// Fix id (fix-<incident>-<runbook>) or bare runbook id
        fix: String,
    },

    /// Apply a previously previewed fix
    Apply {
        incident: String,
        /// The exact fix id that was previewed
        fix: String,
        /// Confirm the mutation
        #[arg(long)]
        yes: bool,
        /// Additionally acknowledge elevated risk (required for
        /// high-risk fixes)
        #[arg(long)]
        ack_risk: bool,
    },

    /// Re-check an incident after an apply
    PostCheck {
        incident: String,
        execution: String,
    },

    /// Record operator feedback
    Feedback {
        incident: String,
        /// One of: resolved, root_cause_confirmed, fix_worked,
        /// fix_failed, dismiss, escalate, note, worked, not_worked
        #[arg(value_name = "TYPE")]
        feedback_type: String,
        /// Fix the feedback refers to
        #[arg(long)]
        fix: Option<String>,
        /// Free-text note
        #[arg(long)]
        note: Option<String>,
    },
}
