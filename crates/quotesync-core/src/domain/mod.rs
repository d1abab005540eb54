//! # Domain Models
//!
//! Canonical domain types for quotesync objects.
//!
//! ## Overview
//!
//! A [`StockQuote`] pairs a user-declared [`StockQuoteSpec`] (what to watch and
//! how often) with a controller-owned [`StockQuoteStatus`] (the last published
//! price and when it may next be refreshed). All user-facing values validate at
//! construction and again on deserialization, so an invalid manifest never
//! reaches the reconciler.
//!
//! ## Models
//!
//! | Type | Description |
//! |------|-------------|
//! | [`StockQuote`] | Stored object: metadata, spec, status |
//! | [`StockQuoteSpec`] | Ticker, refresh interval, credential reference |
//! | [`StockQuoteStatus`] | Price, last update, next permitted update |
//! | [`CredentialRef`] | Store entry and field holding the provider key |
//! | [`ObjectKey`] | Namespaced object identity |
//! | [`Ticker`] | Validated exchange ticker |
//! | [`IntervalMinutes`] | Refresh interval, 1..=1440 minutes |
//! | [`UtcDateTime`] | UTC timestamp |
//! | [`Event`] | Operator-visible record attached to an object |

mod event;
mod interval;
mod price;
mod quote;
mod ticker;
mod timestamp;

pub use event::{Event, EventType};
pub use interval::IntervalMinutes;
pub use price::{format_price, PRICE_FRACTION_DIGITS};
pub use quote::{
    CredentialRef, ObjectKey, ObjectMeta, StockQuote, StockQuoteSpec, StockQuoteStatus,
    DEFAULT_CREDENTIAL_FIELD,
};
pub use ticker::Ticker;
pub use timestamp::UtcDateTime;
