use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    pg_gauges::cli::start().await
}
