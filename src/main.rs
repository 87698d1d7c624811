// serialmon - Interactive serial monitor
use anyhow::Context;
use clap::Parser;
use serialmon::cli::{execute_command, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let command = format!("{:?}", args.command);

    execute_command(args)
        .await
        .with_context(|| format!("serialmon command failed: {}", command))
}
