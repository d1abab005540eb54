//! JSON manifest of quote objects and the credentials they reference.
//!
//! ```json
//! {
//!   "quotes": [
//!     {
//!       "name": "apple",
//!       "namespace": "default",
//!       "spec": {
//!         "ticker": "AAPL",
//!         "timeInterval": 5,
//!         "secretRef": { "name": "polygon", "namespace": "default" }
//!       }
//!     }
//!   ],
//!   "secrets": [
//!     { "name": "polygon", "namespace": "default", "data": { "api-key": "..." } }
//!   ]
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use quotesync_core::{InMemoryCredentialStore, InMemoryObjectStore, ObjectKey, SecretKey, StockQuoteSpec};

use crate::error::CliError;

const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub quotes: Vec<QuoteEntry>,
    #[serde(default)]
    pub secrets: Vec<SecretEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuoteEntry {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub spec: StockQuoteSpec,
}

impl QuoteEntry {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretEntry {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

fn default_namespace() -> String {
    String::from(DEFAULT_NAMESPACE)
}

impl Manifest {
    /// Reads, parses and validates the manifest at `path`.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let raw = std::fs::read_to_string(path)?;
        let manifest: Self = serde_json::from_str(&raw).map_err(|error| CliError::Manifest {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;

        manifest.validate().map_err(|message| CliError::Manifest {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for quote in &self.quotes {
            let key = quote.key();
            key.validate().map_err(|error| format!("quote '{key}': {error}"))?;
            quote
                .spec
                .secret_ref
                .validate()
                .map_err(|error| format!("quote '{key}': {error}"))?;
            if !seen.insert(key.clone()) {
                return Err(format!("duplicate quote '{key}'"));
            }
        }

        let mut secrets = HashSet::new();
        for secret in &self.secrets {
            let key = ObjectKey::new(secret.namespace.clone(), secret.name.clone());
            key.validate().map_err(|error| format!("secret '{key}': {error}"))?;
            if !secrets.insert(key.clone()) {
                return Err(format!("duplicate secret '{key}'"));
            }
        }

        Ok(())
    }

    /// Quote references that no secret in the manifest satisfies.
    pub fn unresolved_references(&self) -> Vec<String> {
        self.quotes
            .iter()
            .filter_map(|quote| {
                let reference = &quote.spec.secret_ref;
                let entry = self.secrets.iter().find(|secret| {
                    secret.namespace == reference.namespace && secret.name == reference.name
                });
                match entry {
                    None => Some(format!(
                        "quote '{}' references missing secret '{}/{}'",
                        quote.key(),
                        reference.namespace,
                        reference.name
                    )),
                    Some(secret) if !secret.data.contains_key(&reference.key) => Some(format!(
                        "quote '{}' references missing field '{}' of secret '{}/{}'",
                        quote.key(),
                        reference.key,
                        reference.namespace,
                        reference.name
                    )),
                    Some(_) => None,
                }
            })
            .collect()
    }

    /// Loads every secret and quote into fresh in-memory stores.
    pub async fn populate(
        &self,
        objects: &InMemoryObjectStore,
        credentials: &InMemoryCredentialStore,
    ) -> Result<Vec<ObjectKey>, CliError> {
        for secret in &self.secrets {
            credentials
                .insert_strings(
                    SecretKey::new(secret.namespace.clone(), secret.name.clone()),
                    secret.data.clone(),
                )
                .await;
        }

        let mut keys = Vec::with_capacity(self.quotes.len());
        for quote in &self.quotes {
            let key = quote.key();
            objects.apply(key.clone(), quote.spec.clone()).await?;
            keys.push(key);
        }
        Ok(keys)
    }
}
