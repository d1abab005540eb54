//! Per-reconciliation context: cancellation plus the diagnostic span.

use std::future::Future;

use thiserror::Error;
use tokio::sync::watch;
use tracing::Span;

use crate::ObjectKey;

/// Returned by [`ReconcileContext::run`] when cancellation wins the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("reconciliation cancelled")]
pub struct Cancelled;

/// Cancels every context created from it.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Context for reconciling `key`, tied to this handle.
    pub fn context_for(&self, key: &ObjectKey) -> ReconcileContext {
        ReconcileContext {
            cancel_rx: self.tx.subscribe(),
            span: reconcile_span(key),
        }
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        wait_for_cancel(self.tx.subscribe()).await;
    }
}

/// Carried through one reconciliation.
#[derive(Debug, Clone)]
pub struct ReconcileContext {
    cancel_rx: watch::Receiver<bool>,
    span: Span,
}

impl ReconcileContext {
    /// Context that is never cancelled. Used for one-shot reconciliations.
    pub fn detached(key: &ObjectKey) -> Self {
        let (tx, cancel_rx) = watch::channel(false);
        drop(tx);
        Self {
            cancel_rx,
            span: reconcile_span(key),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Drives `future`, dropping it if cancellation arrives first.
    pub async fn run<F>(&self, future: F) -> Result<F::Output, Cancelled>
    where
        F: Future,
    {
        if self.is_cancelled() {
            return Err(Cancelled);
        }

        tokio::select! {
            biased;
            _ = wait_for_cancel(self.cancel_rx.clone()) => Err(Cancelled),
            output = future => Ok(output),
        }
    }
}

fn reconcile_span(key: &ObjectKey) -> Span {
    tracing::info_span!("reconcile", namespace = %key.namespace, name = %key.name)
}

async fn wait_for_cancel(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        // A dropped sender can never cancel.
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
