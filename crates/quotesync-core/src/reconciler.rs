//! One evaluation-and-possibly-act cycle for a single quote object.
//!
//! The reconciler loads the object, checks whether it is due, resolves the
//! credential, fetches the price and writes the status back. It never sleeps
//! or retries; it reports what happened and how soon to come back through
//! [`Reconciled::action`] or, for failures, [`Reconciler::error_policy`].

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::Instrument;

use crate::clock::{Clock, SystemClock};
use crate::context::{Cancelled, ReconcileContext};
use crate::credentials::{CredentialError, CredentialResolver};
use crate::price_source::{FetchError, FetchErrorKind, PriceSource};
use crate::store::{ObjectStore, StoreError, StoreErrorKind};
use crate::{format_price, Event, ObjectKey, StockQuoteStatus, UtcDateTime, ValidationError};

/// Event reason recorded on every successful price update.
pub const PRICE_UPDATED_REASON: &str = "PriceUpdated";

/// Scheduling signal returned by a successful reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    requeue_after: Option<Duration>,
}

impl Action {
    /// Run again after `after`; zero means immediately.
    pub const fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
        }
    }

    /// Do not schedule; wait for the object to change.
    pub const fn await_change() -> Self {
        Self {
            requeue_after: None,
        }
    }

    pub const fn requeue_after(&self) -> Option<Duration> {
        self.requeue_after
    }
}

/// What a successful reconciliation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The object no longer exists.
    Deleted,
    /// Next update lies in the future; nothing was touched.
    NotDue { remaining: Duration },
    /// A fresh price was fetched and persisted.
    Updated {
        price: String,
        next_update_time: UtcDateTime,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub outcome: Outcome,
    pub action: Action,
}

impl Reconciled {
    fn deleted() -> Self {
        Self {
            outcome: Outcome::Deleted,
            action: Action::await_change(),
        }
    }
}

/// Reconcile failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileErrorKind {
    CredentialNotFound,
    CredentialMissingField,
    CredentialUnavailable,
    RateLimited,
    ProviderError,
    DecodeError,
    NoData,
    InvalidPrice,
    Transport,
    InvalidSchedule,
    StatusWriteConflict,
    StatusWriteError,
    ObjectRead,
    Cancelled,
}

impl ReconcileErrorKind {
    /// Event reason attached to the object.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CredentialNotFound => "CredentialNotFound",
            Self::CredentialMissingField => "CredentialMissingField",
            Self::CredentialUnavailable => "CredentialUnavailable",
            Self::RateLimited => "RateLimited",
            Self::ProviderError => "ProviderError",
            Self::DecodeError => "DecodeError",
            Self::NoData => "NoData",
            Self::InvalidPrice => "InvalidPrice",
            Self::Transport => "FetchFailed",
            Self::InvalidSchedule => "InvalidSchedule",
            Self::StatusWriteConflict => "StatusWriteConflict",
            Self::StatusWriteError => "StatusWriteError",
            Self::ObjectRead => "ObjectReadFailed",
            Self::Cancelled => "Cancelled",
        }
    }

    pub const fn is_credential(self) -> bool {
        matches!(
            self,
            Self::CredentialNotFound | Self::CredentialMissingField | Self::CredentialUnavailable
        )
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconcileError {
    #[error("credential {name} not found in namespace {namespace}")]
    CredentialNotFound { namespace: String, name: String },

    #[error("credential {name} in namespace {namespace} has no field {field}")]
    CredentialMissingField {
        namespace: String,
        name: String,
        field: String,
    },

    #[error("credential store unavailable: {0}")]
    CredentialUnavailable(String),

    #[error("failed to fetch price: {0}")]
    Fetch(#[from] FetchError),

    #[error("fetched price cannot be formatted: {0}")]
    PriceFormat(#[source] ValidationError),

    #[error("next update time cannot be computed: {0}")]
    Schedule(#[source] ValidationError),

    #[error("object changed since it was read (read version {expected}, stored version {actual})")]
    StatusWriteConflict { expected: u64, actual: u64 },

    #[error("failed to persist status: {0}")]
    StatusWrite(#[source] StoreError),

    #[error("failed to load object: {0}")]
    ObjectRead(#[source] StoreError),

    #[error("reconciliation cancelled")]
    Cancelled,
}

impl ReconcileError {
    pub const fn kind(&self) -> ReconcileErrorKind {
        match self {
            Self::CredentialNotFound { .. } => ReconcileErrorKind::CredentialNotFound,
            Self::CredentialMissingField { .. } => ReconcileErrorKind::CredentialMissingField,
            Self::CredentialUnavailable(_) => ReconcileErrorKind::CredentialUnavailable,
            Self::Fetch(error) => match error.kind() {
                FetchErrorKind::RateLimited => ReconcileErrorKind::RateLimited,
                FetchErrorKind::Provider => ReconcileErrorKind::ProviderError,
                FetchErrorKind::Decode => ReconcileErrorKind::DecodeError,
                FetchErrorKind::NoData => ReconcileErrorKind::NoData,
                FetchErrorKind::InvalidPrice => ReconcileErrorKind::InvalidPrice,
                FetchErrorKind::Transport => ReconcileErrorKind::Transport,
            },
            Self::PriceFormat(_) => ReconcileErrorKind::InvalidPrice,
            Self::Schedule(_) => ReconcileErrorKind::InvalidSchedule,
            Self::StatusWriteConflict { .. } => ReconcileErrorKind::StatusWriteConflict,
            Self::StatusWrite(_) => ReconcileErrorKind::StatusWriteError,
            Self::ObjectRead(_) => ReconcileErrorKind::ObjectRead,
            Self::Cancelled => ReconcileErrorKind::Cancelled,
        }
    }
}

impl From<CredentialError> for ReconcileError {
    fn from(value: CredentialError) -> Self {
        match value {
            CredentialError::NotFound { namespace, name } => {
                Self::CredentialNotFound { namespace, name }
            }
            CredentialError::MissingField {
                namespace,
                name,
                field,
            } => Self::CredentialMissingField {
                namespace,
                name,
                field,
            },
            CredentialError::Store(message) => Self::CredentialUnavailable(message),
        }
    }
}

impl From<Cancelled> for ReconcileError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// How the controller should retry after a failed reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Fixed delay.
    After(Duration),
    /// Re-run as soon as possible.
    Immediate,
    /// Use the controller's per-key failure backoff.
    Backoff,
    /// Do not retry.
    Abandon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Delay before retrying after a credential failure.
    pub credential_retry: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            credential_retry: Duration::from_secs(5 * 60),
        }
    }
}

/// Drives stored quote objects towards a fresh price.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn ObjectStore>,
    credentials: CredentialResolver,
    price_source: Arc<dyn PriceSource>,
    clock: Arc<dyn Clock>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        credentials: CredentialResolver,
        price_source: Arc<dyn PriceSource>,
    ) -> Self {
        Self {
            store,
            credentials,
            price_source,
            clock: Arc::new(SystemClock),
            config: ReconcilerConfig::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Runs one reconciliation of `key`.
    ///
    /// Errors are recorded on the object as warning events before they are
    /// returned; a missing object is a success with [`Outcome::Deleted`].
    pub async fn reconcile(
        &self,
        key: &ObjectKey,
        context: &ReconcileContext,
    ) -> Result<Reconciled, ReconcileError> {
        let span = context.span().clone();
        async {
            let result = match context.run(self.reconcile_object(key)).await {
                Ok(result) => result,
                Err(cancelled) => Err(cancelled.into()),
            };
            self.report(key, &result).await;
            result
        }
        .instrument(span)
        .await
    }

    /// Retry decision for a failed reconciliation.
    pub fn error_policy(&self, error: &ReconcileError) -> RetryDecision {
        let kind = error.kind();
        if kind.is_credential() {
            return RetryDecision::After(self.config.credential_retry);
        }

        match kind {
            ReconcileErrorKind::StatusWriteConflict => RetryDecision::Immediate,
            ReconcileErrorKind::Cancelled => RetryDecision::Abandon,
            _ => RetryDecision::Backoff,
        }
    }

    async fn reconcile_object(&self, key: &ObjectKey) -> Result<Reconciled, ReconcileError> {
        let object = match self.store.get(key).await {
            Ok(object) => object,
            Err(error) if error.kind() == StoreErrorKind::NotFound => {
                tracing::debug!("object not found; nothing to do");
                return Ok(Reconciled::deleted());
            }
            Err(error) => return Err(ReconcileError::ObjectRead(error)),
        };

        let now = self.clock.now();
        if let Some(remaining) = object
            .status
            .next_update_time
            .and_then(|next| now.duration_until(next))
        {
            tracing::debug!(remaining_ms = remaining.as_millis() as u64, "not due yet");
            return Ok(Reconciled {
                outcome: Outcome::NotDue { remaining },
                action: Action::requeue(remaining),
            });
        }

        let spec = &object.spec;
        let api_key = self.credentials.resolve(&spec.secret_ref).await?;
        let close = self
            .price_source
            .latest_close(&spec.ticker, &api_key)
            .await?;
        let price = format_price(close).map_err(ReconcileError::PriceFormat)?;

        let interval = spec.interval_minutes.as_duration();
        let fetched_at = self.clock.now();
        let next_update_time = fetched_at
            .checked_add(interval)
            .map_err(ReconcileError::Schedule)?;

        let status = StockQuoteStatus {
            price: Some(price.clone()),
            last_updated: Some(fetched_at),
            next_update_time: Some(next_update_time),
        };

        match self
            .store
            .update_status(key, object.metadata.resource_version, status)
            .await
        {
            Ok(_) => {}
            Err(StoreError::NotFound { .. }) => {
                tracing::debug!("object deleted while fetching; dropping price");
                return Ok(Reconciled::deleted());
            }
            Err(StoreError::Conflict {
                expected, actual, ..
            }) => return Err(ReconcileError::StatusWriteConflict { expected, actual }),
            Err(other) => return Err(ReconcileError::StatusWrite(other)),
        }

        tracing::info!(
            ticker = %spec.ticker,
            source = self.price_source.name(),
            price = %price,
            next_update_time = %next_update_time,
            "price updated"
        );

        Ok(Reconciled {
            outcome: Outcome::Updated {
                price,
                next_update_time,
            },
            action: Action::requeue(interval),
        })
    }

    async fn report(&self, key: &ObjectKey, result: &Result<Reconciled, ReconcileError>) {
        let at = self.clock.now();
        let event = match result {
            Ok(Reconciled {
                outcome: Outcome::Updated { price, .. },
                ..
            }) => Event::normal(PRICE_UPDATED_REASON, format!("price updated to {price}"), at),
            Ok(_) => return,
            Err(error) => {
                tracing::warn!(kind = error.kind().as_str(), error = %error, "reconcile failed");
                Event::warning(error.kind().as_str(), error.to_string(), at)
            }
        };

        if let Err(error) = self.store.record_event(key, event).await {
            tracing::warn!(error = %error, "failed to record event");
        }
    }
}
