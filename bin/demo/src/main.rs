//! Runs the authorization walkthrough against a live OpenFGA store.

mod config;
mod scenario;

use rootcause::prelude::Report;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tuplegate_authz::{AuthzClient, AuthzError, CallContext};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tuplegate_authz=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            tracing::error!(error = %report, "walkthrough failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Report<AuthzError>> {
    let config = config::DemoConfig::from_env().map_err(|e| AuthzError::Configuration {
        details: format!("failed to load configuration: {e}"),
    })?;
    tracing::info!("Loaded configuration");

    let context = config.authz.into_context()?;
    tracing::info!(
        endpoint = %context.endpoint(),
        store_id = %context.store_id(),
        consistency = %context.consistency(),
        "Connecting to authorization engine"
    );
    let client = AuthzClient::connect(context).await?;

    let report = scenario::run(&client, &CallContext::new()).await?;
    tracing::info!(?report, "walkthrough finished");
    Ok(())
}
