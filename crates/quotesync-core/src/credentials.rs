//! Credential lookup.
//!
//! A [`CredentialStore`] maps a `namespace/name` entry to a set of named byte
//! fields. [`CredentialResolver`] pulls one field out as a string. The field
//! name is already settled on the [`CredentialRef`], so the resolver never
//! applies a default of its own.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;

use crate::CredentialRef;

/// Field name to raw value.
pub type SecretData = BTreeMap<String, Vec<u8>>;

/// Identity of a credential store entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SecretKey {
    pub namespace: String,
    pub name: String,
}

impl SecretKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl From<&CredentialRef> for SecretKey {
    fn from(value: &CredentialRef) -> Self {
        Self::new(value.namespace.clone(), value.name.clone())
    }
}

/// Credential failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialErrorKind {
    NotFound,
    MissingField,
    Store,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("credential {name} not found in namespace {namespace}")]
    NotFound { namespace: String, name: String },

    #[error("credential {name} in namespace {namespace} does not contain key {field}")]
    MissingField {
        namespace: String,
        name: String,
        field: String,
    },

    #[error("credential store error: {0}")]
    Store(String),
}

impl CredentialError {
    pub const fn kind(&self) -> CredentialErrorKind {
        match self {
            Self::NotFound { .. } => CredentialErrorKind::NotFound,
            Self::MissingField { .. } => CredentialErrorKind::MissingField,
            Self::Store(_) => CredentialErrorKind::Store,
        }
    }
}

/// External secret storage.
pub trait CredentialStore: Send + Sync {
    fn get<'a>(
        &'a self,
        key: &'a SecretKey,
    ) -> Pin<Box<dyn Future<Output = Result<SecretData, CredentialError>> + Send + 'a>>;
}

/// Process-local credential store used by the CLI and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentialStore {
    entries: Arc<RwLock<HashMap<SecretKey, SecretData>>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key: SecretKey, data: SecretData) {
        self.entries.write().await.insert(key, data);
    }

    /// Convenience for string-valued entries.
    pub async fn insert_strings<I, K, V>(&self, key: SecretKey, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let data = fields
            .into_iter()
            .map(|(field, value)| (field.into(), value.into().into_bytes()))
            .collect();
        self.insert(key, data).await;
    }

    pub async fn remove(&self, key: &SecretKey) -> Option<SecretData> {
        self.entries.write().await.remove(key)
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn get<'a>(
        &'a self,
        key: &'a SecretKey,
    ) -> Pin<Box<dyn Future<Output = Result<SecretData, CredentialError>> + Send + 'a>> {
        Box::pin(async move {
            self.entries
                .read()
                .await
                .get(key)
                .cloned()
                .ok_or_else(|| CredentialError::NotFound {
                    namespace: key.namespace.clone(),
                    name: key.name.clone(),
                })
        })
    }
}

/// Resolves a [`CredentialRef`] to the string value of its field.
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn CredentialStore>,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, reference: &CredentialRef) -> Result<String, CredentialError> {
        let key = SecretKey::from(reference);
        let data = self.store.get(&key).await?;

        let value = data
            .get(&reference.key)
            .ok_or_else(|| CredentialError::MissingField {
                namespace: key.namespace.clone(),
                name: key.name.clone(),
                field: reference.key.clone(),
            })?;

        Ok(String::from_utf8_lossy(value).into_owned())
    }
}
