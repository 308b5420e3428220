use anyhow::Result;
use assessbot::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
