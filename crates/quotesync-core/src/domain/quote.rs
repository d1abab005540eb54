use std::fmt::{Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::{IntervalMinutes, Ticker, UtcDateTime, ValidationError};

/// Secret field read when a reference does not name one.
pub const DEFAULT_CREDENTIAL_FIELD: &str = "api-key";

/// Namespaced identity of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.namespace.trim().is_empty() {
            return Err(ValidationError::EmptyNamespace);
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        Ok(())
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Reference to a field inside a stored credential entry.
///
/// The field name is settled here, at deserialization or construction time;
/// an omitted or empty `key` becomes [`DEFAULT_CREDENTIAL_FIELD`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialRef {
    pub name: String,
    pub namespace: String,
    #[serde(
        default = "default_credential_field",
        deserialize_with = "deserialize_credential_field"
    )]
    pub key: String,
}

impl CredentialRef {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            key: default_credential_field(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.key = if key.is_empty() {
            default_credential_field()
        } else {
            key
        };
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyCredentialRef { field: "name" });
        }
        if self.namespace.trim().is_empty() {
            return Err(ValidationError::EmptyCredentialRef { field: "namespace" });
        }
        Ok(())
    }
}

fn default_credential_field() -> String {
    String::from(DEFAULT_CREDENTIAL_FIELD)
}

fn deserialize_credential_field<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .filter(|key| !key.is_empty())
        .unwrap_or_else(default_credential_field))
}

/// Desired state declared by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockQuoteSpec {
    pub ticker: Ticker,
    #[serde(rename = "timeInterval", alias = "intervalMinutes")]
    pub interval_minutes: IntervalMinutes,
    #[serde(rename = "secretRef", alias = "credentialRef")]
    pub secret_ref: CredentialRef,
}

impl StockQuoteSpec {
    pub fn new(ticker: Ticker, interval_minutes: IntervalMinutes, secret_ref: CredentialRef) -> Self {
        Self {
            ticker,
            interval_minutes,
            secret_ref,
        }
    }
}

/// Observed state, written only by a successful reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockQuoteStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<UtcDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_update_time: Option<UtcDateTime>,
}

/// Bookkeeping attached to every stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    pub uid: Uuid,
    /// Bumped on every write; status updates are conditional on it.
    pub resource_version: u64,
    /// Bumped only when the spec changes.
    pub generation: u64,
}

impl ObjectMeta {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }
}

/// The stored desired/observed pair for one ticker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockQuote {
    pub metadata: ObjectMeta,
    pub spec: StockQuoteSpec,
    #[serde(default)]
    pub status: StockQuoteStatus,
}

impl StockQuote {
    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }
}
