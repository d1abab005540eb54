//! # quotesync core
//!
//! Control loop that keeps stored stock-quote objects populated with the
//! latest close price from Polygon.io.
//!
//! ## Overview
//!
//! Each object declares a ticker, a refresh interval and a reference to the
//! credential holding the API key. A reconciliation loads the object, skips it
//! if its next update lies in the future, otherwise resolves the credential,
//! fetches the previous close and writes `price`, `lastUpdated` and
//! `nextUpdateTime` back in a single conditional status update.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Polygon previous-close price source |
//! | [`backoff`] | Fixed and exponential failure backoff |
//! | [`clock`] | Wall-clock sources (system, tokio-driven, manual) |
//! | [`config`] | Controller configuration from defaults and environment |
//! | [`context`] | Per-reconciliation cancellation and tracing span |
//! | [`controller`] | Work queue, timers and per-key single flight |
//! | [`credentials`] | Credential store trait and resolver |
//! | [`domain`] | Quote objects, tickers, intervals, timestamps, events |
//! | [`error`] | Validation errors |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`observability`] | Process-wide tracing subscriber |
//! | [`price_source`] | Price source trait and fetch errors |
//! | [`reconciler`] | The reconcile cycle and its retry policy |
//! | [`store`] | Object store trait and in-memory implementation |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     watch / timers
//! │   Controller    │◀──────────────────────┐
//! └────────┬────────┘                       │
//!          │ per-key single flight          │
//!          ▼                                │
//! ┌─────────────────┐     ┌───────────────┐ │
//! │   Reconciler    │────▶│  ObjectStore  │─┘
//! └────────┬────────┘     └───────────────┘
//!          │
//!          ├──────────────▶ CredentialResolver ──▶ CredentialStore
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  PriceSource    │────▶│ HTTP Client      │
//! │  (Polygon)      │     │ (reqwest)        │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Failures come back as [`ReconcileError`]; the controller asks
//! [`Reconciler::error_policy`] how to retry:
//!
//! ```rust
//! use quotesync_core::{ReconcileError, ReconcileErrorKind};
//!
//! fn describe(error: &ReconcileError) -> &'static str {
//!     match error.kind() {
//!         ReconcileErrorKind::RateLimited => "provider asked us to slow down",
//!         ReconcileErrorKind::CredentialNotFound => "secret missing",
//!         ReconcileErrorKind::Cancelled => "shutting down",
//!         _ => "see object events",
//!     }
//! }
//! ```
//!
//! ## Security
//!
//! - API keys travel only in the request URL; transport errors are stripped of
//!   the URL before they are surfaced or logged
//! - All HTTP requests use TLS via rustls

pub mod adapters;
pub mod backoff;
pub mod clock;
pub mod config;
pub mod context;
pub mod controller;
pub mod credentials;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod observability;
pub mod price_source;
pub mod reconciler;
pub mod store;

// Adapter implementations
pub use adapters::{PolygonPriceSource, DEFAULT_POLYGON_BASE_URL};

// Backoff
pub use backoff::Backoff;

// Clocks
pub use clock::{Clock, ManualClock, SystemClock, TokioClock};

// Configuration
pub use config::{ConfigError, ControllerConfig};

// Cancellation
pub use context::{CancelHandle, Cancelled, ReconcileContext};

// Scheduler
pub use controller::{Controller, ControllerError};

// Credentials
pub use credentials::{
    CredentialError, CredentialErrorKind, CredentialResolver, CredentialStore,
    InMemoryCredentialStore, SecretData, SecretKey,
};

// Domain models
pub use domain::{
    format_price, CredentialRef, Event, EventType, IntervalMinutes, ObjectKey, ObjectMeta,
    StockQuote, StockQuoteSpec, StockQuoteStatus, Ticker, UtcDateTime, DEFAULT_CREDENTIAL_FIELD,
    PRICE_FRACTION_DIGITS,
};

// Error types
pub use error::ValidationError;

// HTTP client types
pub use http_client::{
    HttpClient, HttpError, HttpErrorKind, HttpRequest, HttpResponse, ReqwestHttpClient,
};

// Logging
pub use observability::init_tracing;

// Price sources
pub use price_source::{FetchError, FetchErrorKind, PriceSource};

// Reconciliation
pub use reconciler::{
    Action, Outcome, ReconcileError, ReconcileErrorKind, Reconciled, Reconciler,
    ReconcilerConfig, RetryDecision, PRICE_UPDATED_REASON,
};

// Object store
pub use store::{InMemoryObjectStore, ObjectStore, StoreError, StoreErrorKind, WatchEvent};
