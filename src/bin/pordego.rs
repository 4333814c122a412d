use anyhow::Result;
use pordego::cli::start;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse arguments, initialize telemetry, and build the action
    let action = start()?;

    // Handle the action
    action.execute().await?;

    Ok(())
}
