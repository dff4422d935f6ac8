use asyncapi_pub::cli::{run_cli, Cli};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    asyncapi_pub::logging::init_logging()?;
    run_cli(Cli::parse()).await
}
