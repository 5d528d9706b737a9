//! Graph sink for imported knowledge units.
//!
//! The migration pipeline treats the knowledge graph as an opaque collaborator
//! that accepts nodes and edges. [`GraphSink`] is that boundary; [`GraphStore`]
//! is the embedded libSQL implementation, and [`MemorySink`] backs tests.

mod migrations;

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database, params};

use akuforge_shared::{AkuForgeError, Result};

// ---------------------------------------------------------------------------
// Sink trait
// ---------------------------------------------------------------------------

/// An edge as read back from the sink: `(kind, source_id, target_id)`.
pub type EdgeRow = (String, String, String);

/// The graph store boundary: add nodes, add edges, and the minimal read-backs
/// the validate step needs. Connection details and query language are the
/// implementation's business.
#[async_trait]
pub trait GraphSink: Send + Sync {
    /// Insert or replace a node.
    async fn add_node(&self, id: &str, kind: &str, attrs: &serde_json::Value) -> Result<()>;

    /// Insert an edge between two node ids.
    async fn add_edge(&self, kind: &str, source_id: &str, target_id: &str) -> Result<()>;

    async fn node_exists(&self, id: &str) -> Result<bool>;

    async fn list_edges(&self) -> Result<Vec<EdgeRow>>;

    async fn node_count(&self) -> Result<u64>;
}

// ---------------------------------------------------------------------------
// libSQL-backed store
// ---------------------------------------------------------------------------

/// Embedded libSQL graph store.
pub struct GraphStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl GraphStore {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AkuForgeError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| AkuForgeError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| AkuForgeError::Storage(e.to_string()))?;

        let store = Self { db, conn };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    AkuForgeError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }
}

#[async_trait]
impl GraphSink for GraphStore {
    async fn add_node(&self, id: &str, kind: &str, attrs: &serde_json::Value) -> Result<()> {
        let attrs_json = serde_json::to_string(attrs)
            .map_err(|e| AkuForgeError::Storage(format!("attrs serialization: {e}")))?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO nodes (id, kind, attrs_json, imported_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                   kind = excluded.kind,
                   attrs_json = excluded.attrs_json,
                   imported_at = excluded.imported_at",
                params![id, kind, attrs_json.as_str(), now.as_str()],
            )
            .await
            .map_err(|e| AkuForgeError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn add_edge(&self, kind: &str, source_id: &str, target_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO edges (kind, source_id, target_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![kind, source_id, target_id, now.as_str()],
            )
            .await
            .map_err(|e| AkuForgeError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn node_exists(&self, id: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query("SELECT 1 FROM nodes WHERE id = ?1 LIMIT 1", params![id])
            .await
            .map_err(|e| AkuForgeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(row) => Ok(row.is_some()),
            Err(e) => Err(AkuForgeError::Storage(e.to_string())),
        }
    }

    async fn list_edges(&self) -> Result<Vec<EdgeRow>> {
        let mut rows = self
            .conn
            .query(
                "SELECT kind, source_id, target_id FROM edges ORDER BY id",
                params![],
            )
            .await
            .map_err(|e| AkuForgeError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push((
                row.get::<String>(0)
                    .map_err(|e| AkuForgeError::Storage(e.to_string()))?,
                row.get::<String>(1)
                    .map_err(|e| AkuForgeError::Storage(e.to_string()))?,
                row.get::<String>(2)
                    .map_err(|e| AkuForgeError::Storage(e.to_string()))?,
            ));
        }
        Ok(results)
    }

    async fn node_count(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM nodes", params![])
            .await
            .map_err(|e| AkuForgeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map(|n| n.max(0) as u64)
                .map_err(|e| AkuForgeError::Storage(e.to_string())),
            Ok(None) => Ok(0),
            Err(e) => Err(AkuForgeError::Storage(e.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory sink (tests, dry runs)
// ---------------------------------------------------------------------------

/// In-memory [`GraphSink`] used by tests and headless dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    nodes: Mutex<Vec<(String, String, serde_json::Value)>>,
    edges: Mutex<Vec<EdgeRow>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of inserted nodes as `(id, kind)` pairs.
    pub fn node_ids(&self) -> Vec<String> {
        self.nodes
            .lock()
            .expect("nodes lock")
            .iter()
            .map(|(id, _, _)| id.clone())
            .collect()
    }
}

#[async_trait]
impl GraphSink for MemorySink {
    async fn add_node(&self, id: &str, kind: &str, attrs: &serde_json::Value) -> Result<()> {
        let mut nodes = self.nodes.lock().expect("nodes lock");
        nodes.retain(|(existing, _, _)| existing != id);
        nodes.push((id.to_string(), kind.to_string(), attrs.clone()));
        Ok(())
    }

    async fn add_edge(&self, kind: &str, source_id: &str, target_id: &str) -> Result<()> {
        self.edges.lock().expect("edges lock").push((
            kind.to_string(),
            source_id.to_string(),
            target_id.to_string(),
        ));
        Ok(())
    }

    async fn node_exists(&self, id: &str) -> Result<bool> {
        Ok(self
            .nodes
            .lock()
            .expect("nodes lock")
            .iter()
            .any(|(existing, _, _)| existing == id))
    }

    async fn list_edges(&self) -> Result<Vec<EdgeRow>> {
        Ok(self.edges.lock().expect("edges lock").clone())
    }

    async fn node_count(&self) -> Result<u64> {
        Ok(self.nodes.lock().expect("nodes lock").len() as u64)
    }
}
