//! Versioned schema and ambient parameter state
//!
//! Readers take an `Arc` of the current snapshot and work on it without
//! holding the lock. Writers build a complete replacement and publish it in
//! one step, so a reader sees either the old schema and parameters in full
//! or the new ones in full.

use crate::schema::{ScalarParameter, Schema};
use std::sync::Arc;
use tokio::sync::RwLock;

/// One published version of the schema state
#[derive(Debug, Clone)]
pub struct SchemaSnapshot {
    version: u64,
    schema: Arc<Schema>,
    parameters: Arc<[ScalarParameter]>,
}

impl Default for SchemaSnapshot {
    fn default() -> Self {
        Self {
            version: 0,
            schema: Arc::new(Schema::default()),
            parameters: Vec::new().into(),
        }
    }
}

impl SchemaSnapshot {
    /// Monotonic version, `0` before anything was published
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The schema of this version
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Ambient parameters of this version
    #[must_use]
    pub fn parameters(&self) -> &[ScalarParameter] {
        &self.parameters
    }
}

/// Owner of the current [`SchemaSnapshot`]
#[derive(Debug, Default)]
pub struct SchemaStore {
    current: RwLock<Arc<SchemaSnapshot>>,
}

impl SchemaStore {
    /// Create a store holding the empty version `0`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot
    pub async fn snapshot(&self) -> Arc<SchemaSnapshot> {
        Arc::clone(&*self.current.read().await)
    }

    /// Replace the schema, keeping the ambient parameters
    pub async fn replace_schema(&self, schema: Schema) -> u64 {
        self.publish(|current| (Arc::new(schema), Arc::clone(&current.parameters)))
            .await
    }

    /// Replace the ambient parameters, keeping the schema
    pub async fn replace_parameters(&self, parameters: Vec<ScalarParameter>) -> u64 {
        self.publish(|current| (Arc::clone(&current.schema), parameters.into()))
            .await
    }

    /// Replace schema and ambient parameters together
    pub async fn replace_all(&self, schema: Schema, parameters: Vec<ScalarParameter>) -> u64 {
        self.publish(|_| (Arc::new(schema), parameters.into())).await
    }

    async fn publish<F>(&self, build: F) -> u64
    where
        F: FnOnce(&SchemaSnapshot) -> (Arc<Schema>, Arc<[ScalarParameter]>),
    {
        let mut current = self.current.write().await;
        let (schema, parameters) = build(&current);
        let version = current.version + 1;
        *current = Arc::new(SchemaSnapshot {
            version,
            schema,
            parameters,
        });
        log::debug!(
            "Published schema version {version}: {} cluster, {} databases, {} ambient parameters",
            current.schema.cluster_type(),
            current.schema.databases().len(),
            current.parameters.len()
        );
        version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Cluster, Database, EngineSchema};

    fn engine(db: &str) -> Schema {
        let cluster = Cluster {
            connection_string: "cluster".to_string(),
            databases: vec![Database::new(db)],
        };
        Schema::Engine(EngineSchema::new(cluster, Some(db)))
    }

    #[tokio::test]
    async fn test_versions_increase_per_publish() {
        let store = SchemaStore::new();
        assert_eq!(store.snapshot().await.version(), 0);
        assert_eq!(store.replace_schema(engine("A")).await, 1);
        assert_eq!(
            store
                .replace_parameters(vec![ScalarParameter::typed("p", "string")])
                .await,
            2
        );

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.version(), 2);
        assert_eq!(snapshot.schema().database_in_context().unwrap().name, "A");
        assert_eq!(snapshot.parameters()[0].name, "p");
    }

    #[tokio::test]
    async fn test_held_snapshot_is_not_affected_by_replacement() {
        let store = SchemaStore::new();
        store
            .replace_all(engine("Old"), vec![ScalarParameter::new("x")])
            .await;
        let held = store.snapshot().await;

        store.replace_all(engine("New"), Vec::new()).await;

        assert_eq!(held.schema().database_in_context().unwrap().name, "Old");
        assert_eq!(held.parameters().len(), 1);
        let latest = store.snapshot().await;
        assert_eq!(latest.schema().database_in_context().unwrap().name, "New");
        assert!(latest.parameters().is_empty());
    }
}
