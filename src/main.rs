//! resource-funnel binary: parse flags, start, and map failures to exit codes.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use resource_funnel::config::Cli;
use resource_funnel::FunnelError;

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout carries only the readiness announcement
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let error = run(Cli::parse()).await;
    tracing::error!("{}", error);
    std::process::exit(error.exit_code());
}

async fn run(cli: Cli) -> FunnelError {
    let builder = match cli.into_builder() {
        Ok(builder) => builder,
        Err(e) => return e,
    };

    match builder.start().await {
        Ok(server) => server.run().await,
        Err(e) => e,
    }
}
