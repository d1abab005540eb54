use std::sync::Arc;

use quotesync_core::{
    CancelHandle, Controller, CredentialResolver, InMemoryCredentialStore, InMemoryObjectStore,
    Reconciler,
};

use super::{controller_config, price_source};
use crate::cli::RunArgs;
use crate::error::CliError;
use crate::manifest::Manifest;

pub async fn run(args: &RunArgs) -> Result<(), CliError> {
    let manifest = Manifest::load(&args.manifest)?;
    for warning in manifest.unresolved_references() {
        tracing::warn!("{warning}");
    }

    let config = controller_config(&args.provider, args.workers)?;
    let objects = InMemoryObjectStore::new();
    let credentials = InMemoryCredentialStore::new();
    let keys = manifest.populate(&objects, &credentials).await?;
    tracing::info!(
        quotes = keys.len(),
        api_url = %config.api_base_url,
        "manifest loaded"
    );

    let reconciler = Reconciler::new(
        Arc::new(objects),
        CredentialResolver::new(Arc::new(credentials)),
        Arc::new(price_source(&config)),
    )
    .with_config(config.reconciler_config());

    let controller = Controller::new(reconciler)
        .with_workers(config.workers)
        .with_backoff(config.error_backoff);

    let shutdown = CancelHandle::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("interrupt received; shutting down"),
            Err(error) => tracing::error!(error = %error, "cannot listen for interrupt; shutting down"),
        }
        on_signal.cancel();
    });

    controller.run(shutdown).await?;
    Ok(())
}
