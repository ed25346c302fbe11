//! Remedy CLI - operator front-end for the remediation daemon.

use anyhow::Result;
use clap::Parser;

use remedyctl::cli::Cli;
use remedyctl::client::RemedyClient;
use remedyctl::commands;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = RemedyClient::new(cli.addr.clone());
    commands::run(client, cli.command).await
}
