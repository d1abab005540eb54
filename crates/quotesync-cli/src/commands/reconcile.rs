use std::sync::Arc;

use quotesync_core::{
    CredentialResolver, InMemoryCredentialStore, InMemoryObjectStore, ObjectStore,
    ReconcileContext, Reconciler,
};

use super::{controller_config, price_source};
use crate::cli::{OutputFormat, ReconcileArgs};
use crate::error::CliError;
use crate::manifest::Manifest;
use crate::output::{self, QuoteRow};

/// Reconciles each manifest quote once, prints every object, and fails if any
/// reconciliation failed.
pub async fn run(args: &ReconcileArgs, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    let manifest = Manifest::load(&args.manifest)?;
    let config = controller_config(&args.provider, None)?;

    let objects = InMemoryObjectStore::new();
    let credentials = InMemoryCredentialStore::new();
    let keys = manifest.populate(&objects, &credentials).await?;

    let reconciler = Reconciler::new(
        Arc::new(objects.clone()),
        CredentialResolver::new(Arc::new(credentials)),
        Arc::new(price_source(&config)),
    )
    .with_config(config.reconciler_config());

    let mut rows = Vec::with_capacity(keys.len());
    let mut failed = 0;
    for key in &keys {
        let result = reconciler
            .reconcile(key, &ReconcileContext::detached(key))
            .await;
        let object = objects
            .get(key)
            .await
            .map_err(|error| CliError::Manifest {
                path: args.manifest.clone(),
                message: error.to_string(),
            })?;

        let row = QuoteRow::from_object(&object);
        rows.push(match result {
            Ok(_) => row,
            Err(error) => {
                failed += 1;
                row.with_error(error.to_string())
            }
        });
    }

    output::render_rows(&rows, format, pretty)?;

    if failed > 0 {
        return Err(CliError::ReconcileFailed {
            failed,
            total: keys.len(),
        });
    }
    Ok(())
}
