use thiserror::Error;

/// Validation errors raised while building domain values from user input.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("ticker cannot be empty")]
    EmptyTicker,
    #[error("ticker length {len} exceeds max {max}")]
    TickerTooLong { len: usize, max: usize },
    #[error("ticker contains invalid character '{ch}' at index {index}")]
    TickerInvalidChar { ch: char, index: usize },

    #[error("interval must be between {min} and {max} minutes, got {value}")]
    IntervalOutOfRange { value: u32, min: u32, max: u32 },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("timestamp arithmetic overflowed")]
    TimestampOverflow,

    #[error("price must be finite, got {value}")]
    NonFinitePrice { value: f64 },
    #[error("price {value} cannot be represented as a decimal")]
    UnrepresentablePrice { value: f64 },

    #[error("object name cannot be empty")]
    EmptyName,
    #[error("object namespace cannot be empty")]
    EmptyNamespace,
    #[error("credential reference '{field}' cannot be empty")]
    EmptyCredentialRef { field: &'static str },
}
