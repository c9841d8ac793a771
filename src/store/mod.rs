//! Adapters that pull one whole collection out of a document store.

use std::{path::PathBuf, time::Duration};

use mongodb::{
    Client,
    bson::{Bson, Document, doc},
    error::ErrorKind,
    options::ClientOptions,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::{error::StoreError, record::RawRecord};

/// Where the dataset lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreTarget {
    pub uri: String,
    pub database: String,
    pub collection: String,
}

impl StoreTarget {
    fn validate(&self) -> Result<(), StoreError> {
        if self.uri.trim().is_empty() {
            return Err(StoreError::InvalidTarget("connection string is empty".to_string()));
        }
        if self.database.trim().is_empty() {
            return Err(StoreError::InvalidTarget("database name is empty".to_string()));
        }
        if self.collection.trim().is_empty() {
            return Err(StoreError::InvalidTarget("collection name is empty".to_string()));
        }
        Ok(())
    }
}

/// Unfiltered fetch of one collection.
///
/// An empty collection is `Ok(vec![])`; only failures to reach or read the
/// store are errors.
pub trait DocumentStore: Send + Sync {
    fn fetch_all(
        &self,
        target: &StoreTarget,
    ) -> Result<Vec<RawRecord>, StoreError>;
}

impl<F> DocumentStore for F
where
    F: Fn(&StoreTarget) -> Result<Vec<RawRecord>, StoreError> + Send + Sync,
{
    fn fetch_all(
        &self,
        target: &StoreTarget,
    ) -> Result<Vec<RawRecord>, StoreError> {
        self(target)
    }
}

/// MongoDB-backed store driving the async driver on a private runtime.
pub struct MongoStore {
    runtime: tokio::runtime::Runtime,
    timeout: Duration,
}

impl MongoStore {
    pub fn new(timeout: Duration) -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|error| StoreError::RuntimeInit(error.to_string()))?;
        Ok(Self { runtime, timeout })
    }
}

impl DocumentStore for MongoStore {
    fn fetch_all(
        &self,
        target: &StoreTarget,
    ) -> Result<Vec<RawRecord>, StoreError> {
        target.validate()?;
        info!(
            database = %target.database,
            collection = %target.collection,
            "fetching collection"
        );

        let timeout = self.timeout;
        let records = self
            .runtime
            .block_on(async {
                tokio::time::timeout(timeout, fetch_collection(target, timeout)).await
            })
            .map_err(|_| StoreError::Timeout {
                stage: "fetch",
                timeout_ms: millis(timeout),
            })??;

        info!(records = records.len(), "fetched collection");
        Ok(records)
    }
}

async fn fetch_collection(
    target: &StoreTarget,
    timeout: Duration,
) -> Result<Vec<RawRecord>, StoreError> {
    let mut options = ClientOptions::parse(target.uri.as_str())
        .await
        .map_err(|error| StoreError::ConnectionString(error.to_string()))?;
    options.connect_timeout = Some(timeout);
    options.server_selection_timeout = Some(timeout);
    options.app_name = Some("farescope".to_string());

    let client =
        Client::with_options(options).map_err(|error| driver_error(target, timeout, error))?;
    let collection = client
        .database(&target.database)
        .collection::<Document>(&target.collection);

    let mut cursor = collection
        .find(doc! {})
        .await
        .map_err(|error| driver_error(target, timeout, error))?;

    let mut records = Vec::new();
    while cursor
        .advance()
        .await
        .map_err(|error| driver_error(target, timeout, error))?
    {
        let document = cursor
            .deserialize_current()
            .map_err(|error| driver_error(target, timeout, error))?;
        if let Some(record) = RawRecord::from_json(Bson::Document(document).into_relaxed_extjson())
        {
            records.push(record);
        }
    }

    Ok(records)
}

fn driver_error(
    target: &StoreTarget,
    timeout: Duration,
    error: mongodb::error::Error,
) -> StoreError {
    if matches!(*error.kind, ErrorKind::ServerSelection { .. }) {
        debug!(%error, "server selection failed");
        return StoreError::Timeout {
            stage: "server selection",
            timeout_ms: millis(timeout),
        };
    }

    StoreError::FetchFailed {
        collection: target.collection.clone(),
        reason: error.to_string(),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Store reading a collection export from disk.
///
/// Accepts a JSON array of documents or one document per line. The target's
/// names are informational only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn unreadable(
        &self,
        reason: impl Into<String>,
    ) -> StoreError {
        StoreError::Unreadable {
            path: self.path.display().to_string(),
            reason: reason.into(),
        }
    }
}

impl DocumentStore for JsonFileStore {
    fn fetch_all(
        &self,
        target: &StoreTarget,
    ) -> Result<Vec<RawRecord>, StoreError> {
        info!(
            path = %self.path.display(),
            collection = %target.collection,
            "reading collection export"
        );
        let content = std::fs::read_to_string(&self.path)
            .map_err(|error| self.unreadable(error.to_string()))?;

        let values = if content.trim_start().starts_with('[') {
            serde_json::from_str::<Vec<Value>>(&content)
                .map_err(|error| self.unreadable(error.to_string()))?
        } else {
            content
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(index, line)| {
                    serde_json::from_str::<Value>(line)
                        .map_err(|error| self.unreadable(format!("line {}: {error}", index + 1)))
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        let records = values
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                RawRecord::from_json(value)
                    .ok_or_else(|| self.unreadable(format!("document {index} is not an object")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(records = records.len(), "read collection export");
        Ok(records)
    }
}
