//! # Position Sink
//!
//! Keyed document store for raw position snapshots. Each vehicle owns one
//! document that is overwritten on every position update.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::trace;

use crate::error::{BridgeError, Result};
use crate::telemetry::PositionSnapshot;

/// Default document name inside a vehicle collection
pub const DEFAULT_DOCUMENT: &str = "position";

/// Vehicle-scoped document address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SinkKey {
    pub collection: String,
    pub document: String,
}

impl SinkKey {
    pub fn new(collection: impl Into<String>, document: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            document: document.into(),
        }
    }
}

impl std::fmt::Display for SinkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.document)
    }
}

/// Keyed write sink for position snapshots
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PositionSink: Send + Sync {
    /// Overwrite the document at `key` with `snapshot`
    async fn write(&self, key: &SinkKey, snapshot: &PositionSnapshot) -> Result<()>;
}

/// Document store on the local filesystem
///
/// Documents live at `<root>/<collection>/<document>.json` and are replaced
/// atomically, so a reader never sees a partially written snapshot.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    root: PathBuf,
}

impl JsonFileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// File path of a document
    pub fn document_path(&self, key: &SinkKey) -> PathBuf {
        self.root
            .join(&key.collection)
            .join(format!("{}.json", key.document))
    }

    fn validate_key(key: &SinkKey) -> Result<()> {
        for part in [&key.collection, &key.document] {
            if part.is_empty() || part.contains(|c: char| c == '/' || c == '\\') || part == ".." {
                return Err(BridgeError::Sink(format!("Invalid document key: {}", key)));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PositionSink for JsonFileSink {
    async fn write(&self, key: &SinkKey, snapshot: &PositionSnapshot) -> Result<()> {
        Self::validate_key(key)?;

        let path = self.document_path(key);
        let dir = self.root.join(&key.collection);
        tokio::fs::create_dir_all(&dir).await?;

        let body = serde_json::to_vec(snapshot)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        trace!("Wrote {} ({} bytes)", key, body.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snapshot(lat: f64, timestamp: i64) -> PositionSnapshot {
        PositionSnapshot {
            lat,
            lon: 29.0,
            alt: 100.0,
            relative_alt: 10.0,
            vx: 1.0,
            vy: 0.0,
            vz: 0.0,
            hdg: 90.0,
            ground_speed: 1.0,
            timestamp,
        }
    }

    #[test]
    fn test_key_display() {
        let key = SinkKey::new("vehicle-1", DEFAULT_DOCUMENT);
        assert_eq!(key.to_string(), "vehicle-1/position");
    }

    #[tokio::test]
    async fn test_write_creates_document() {
        let dir = TempDir::new().unwrap();
        let sink = JsonFileSink::new(dir.path());
        let key = SinkKey::new("vehicle-1", "position");

        tokio_test::assert_ok!(sink.write(&key, &snapshot(41.0, 1)).await);

        let body = std::fs::read_to_string(sink.document_path(&key)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["lat"], 41.0);
        assert_eq!(value["timestamp"], 1);
        for field in ["lat", "lon", "alt", "relative_alt", "vx", "vy", "vz", "hdg", "ground_speed", "timestamp"] {
            assert!(value.get(field).is_some(), "missing field {}", field);
        }
    }

    #[tokio::test]
    async fn test_write_overwrites_document() {
        let dir = TempDir::new().unwrap();
        let sink = JsonFileSink::new(dir.path());
        let key = SinkKey::new("vehicle-2", "position");

        sink.write(&key, &snapshot(41.0, 1)).await.unwrap();
        sink.write(&key, &snapshot(42.0, 2)).await.unwrap();

        let body = std::fs::read_to_string(sink.document_path(&key)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["lat"], 42.0);
        assert_eq!(value["timestamp"], 2);

        let entries = std::fs::read_dir(dir.path().join("vehicle-2")).unwrap().count();
        assert_eq!(entries, 1, "no temp files left behind");
    }

    #[tokio::test]
    async fn test_vehicle_keys_are_disjoint() {
        let dir = TempDir::new().unwrap();
        let sink = JsonFileSink::new(dir.path());
        let one = SinkKey::new("vehicle-1", "position");
        let two = SinkKey::new("vehicle-2", "position");

        sink.write(&one, &snapshot(1.0, 1)).await.unwrap();
        sink.write(&two, &snapshot(2.0, 2)).await.unwrap();

        assert_ne!(sink.document_path(&one), sink.document_path(&two));
        assert!(sink.document_path(&one).exists());
        assert!(sink.document_path(&two).exists());
    }

    #[tokio::test]
    async fn test_rejects_path_escaping_key() {
        let dir = TempDir::new().unwrap();
        let sink = JsonFileSink::new(dir.path());

        let result = sink.write(&SinkKey::new("..", "position"), &snapshot(0.0, 0)).await;
        assert!(matches!(result, Err(BridgeError::Sink(_))));

        let result = sink.write(&SinkKey::new("vehicle-1", "a/b"), &snapshot(0.0, 0)).await;
        assert!(matches!(result, Err(BridgeError::Sink(_))));
    }
}
