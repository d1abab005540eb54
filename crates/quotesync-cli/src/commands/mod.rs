mod fetch;
mod reconcile;
mod run;
mod validate;

use std::sync::Arc;
use std::time::Duration;

use quotesync_core::{ControllerConfig, PolygonPriceSource, ReqwestHttpClient};

use crate::cli::{Cli, Command, ProviderArgs};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<(), CliError> {
    match &cli.command {
        Command::Run(args) => run::run(args).await,
        Command::Reconcile(args) => reconcile::run(args, cli.format, cli.pretty).await,
        Command::Validate(args) => validate::run(args, cli.format, cli.pretty),
        Command::Fetch(args) => fetch::run(args, cli.format, cli.pretty).await,
    }
}

/// Environment configuration with command-line overrides applied on top.
fn controller_config(
    provider: &ProviderArgs,
    workers: Option<usize>,
) -> Result<ControllerConfig, CliError> {
    let mut config = ControllerConfig::from_env()?;
    if let Some(url) = &provider.api_url {
        config = config.with_api_base_url(url.clone())?;
    }
    if let Some(timeout_ms) = provider.timeout_ms {
        config = config.with_request_timeout(Duration::from_millis(timeout_ms.max(1)));
    }
    if let Some(workers) = workers {
        config = config.with_workers(workers);
    }
    Ok(config)
}

fn price_source(config: &ControllerConfig) -> PolygonPriceSource {
    PolygonPriceSource::new(
        Arc::new(ReqwestHttpClient::default()),
        config.api_base_url.clone(),
    )
    .with_timeout(config.request_timeout)
}
