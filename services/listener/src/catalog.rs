//! Product lookup contract and the in-memory catalog
//!
//! The processor only needs "identifier in, optional record out". The storage
//! behind it is replaceable; [`InMemoryCatalog`] serves tests and deployments
//! that ship the catalog as a JSON export.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use types::{normalize_identifier, ProductRecord};

/// Errors from a product catalog
#[derive(Debug, Error)]
pub enum LookupError {
    /// Backing store cannot answer right now
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid catalog data: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Finds the product record for an identifier token
#[async_trait]
pub trait ProductLookup: Send + Sync {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<ProductRecord>, LookupError>;
}

/// Records keyed by normalized product number
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    records: RwLock<HashMap<String, ProductRecord>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = ProductRecord>) -> Self {
        let catalog = Self::new();
        for record in records {
            if let Some(previous) = catalog.insert(record) {
                warn!(
                    produktnummer = %previous.produktnummer,
                    "Duplicate product number in catalog, keeping the later record"
                );
            }
        }
        catalog
    }

    /// Parse a JSON array of records
    pub fn from_json_str(json: &str) -> Result<Self, LookupError> {
        let records: Vec<ProductRecord> = serde_json::from_str(json)?;
        Ok(Self::from_records(records))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, LookupError> {
        let json = std::fs::read_to_string(path).map_err(|source| LookupError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_json_str(&json)?;
        info!(path = %path.display(), records = catalog.len(), "Product catalog loaded");
        Ok(catalog)
    }

    /// Add or replace a record; returns the replaced one
    pub fn insert(&self, record: ProductRecord) -> Option<ProductRecord> {
        self.records.write().insert(record.key(), record)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ProductLookup for InMemoryCatalog {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<ProductRecord>, LookupError> {
        let key = normalize_identifier(identifier);
        Ok(self.records.read().get(&key).cloned())
    }
}
