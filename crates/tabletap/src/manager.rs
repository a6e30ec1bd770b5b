//! Registration lifecycle management
//!
//! The [`RegistrationManager`] is the only component that mutates
//! registrations. It enforces one registration per table and provisions the
//! three backing objects that share a registration's identifier: the
//! change-capture trigger, the staging variable the trigger writes into,
//! and the event queue it forwards to.
//!
//! ## Mutation ordering
//!
//! `create` provisions the staging variable, then the event queue, then the
//! trigger, each as an independent statement. When a later step fails, a
//! compensating cleanup drops whatever was already provisioned and the
//! error still reports the namespace and identifier, so leftovers from a
//! failed cleanup can be removed by hand.
//!
//! Mutations are serialized per manager instance. A second process
//! operating on the same namespace is not protected against: the
//! existence-check-then-create pattern is racy across processes.

use crate::catalog::{AdminChannel, Catalog, DdlExecutor, QueueOptions};
use crate::error::{Result, TapError};
use crate::ident::IdAllocator;
use crate::table::TableRef;
use crate::template::{self, CREATE_TRIGGER};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

/// One active change-capture binding: a monitored table and the generated
/// identifier shared by its trigger, staging variable, and event queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Library holding the trigger, event queue, and staging variable
    pub namespace: String,
    /// Unique generated identifier within the namespace
    pub id: String,
    /// The monitored table
    pub table: TableRef,
}

impl fmt::Display for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) -> [{}/{}]", self.table, self.namespace, self.id)
    }
}

/// Orchestrates create/get/list/delete over the catalog, DDL, and
/// administrative seams.
pub struct RegistrationManager {
    namespace: String,
    catalog: Arc<dyn Catalog>,
    ddl: Arc<dyn DdlExecutor>,
    admin: Arc<dyn AdminChannel>,
    allocator: IdAllocator,
    /// Serializes create/delete within this process.
    mutate: Mutex<()>,
    /// Namespace bootstrap runs once per manager lifetime.
    bootstrap: OnceCell<()>,
}

impl RegistrationManager {
    pub fn new(
        namespace: impl Into<String>,
        catalog: Arc<dyn Catalog>,
        ddl: Arc<dyn DdlExecutor>,
        admin: Arc<dyn AdminChannel>,
    ) -> Self {
        let namespace = namespace.into().trim().to_uppercase();
        Self {
            allocator: IdAllocator::new(Arc::clone(&catalog), namespace.clone()),
            namespace,
            catalog,
            ddl,
            admin,
            mutate: Mutex::new(()),
            bootstrap: OnceCell::new(),
        }
    }

    /// The namespace this manager administers.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Resolve operator-supplied schema/table names into a full table
    /// identity, matching either alias form of each part.
    pub async fn resolve(&self, schema: &str, table: &str) -> Result<Option<TableRef>> {
        self.catalog.resolve_table(schema, table).await
    }

    /// Start monitoring a table.
    pub async fn create(&self, table: &TableRef) -> Result<Registration> {
        self.ensure_namespace().await?;
        let _guard = self.mutate.lock().await;

        if let Some(existing) = self.catalog.find(&self.namespace, table).await? {
            return Err(TapError::AlreadyMonitored {
                table: table.to_string(),
                id: existing.id,
            });
        }

        // Defensive double-check: the resolver already validated existence,
        // but an empty column set means the catalog is inconsistent.
        let columns = self.catalog.column_names(table).await?;
        if columns.is_empty() {
            return Err(TapError::TableLookupFailed(table.to_string()));
        }

        let id = self.allocator.allocate().await?;
        let trigger_sql = self.render_trigger(&id, table, &columns)?;
        debug!(registration = %id, "rendered trigger definition:\n{trigger_sql}");

        // External mutations start here. The variable comes first, then the
        // queue, then the trigger; a failure past the first step triggers
        // compensating cleanup.
        self.ddl.execute(&create_variable_stmt(&self.namespace, &id)).await?;

        if let Err(source) = self.provision_queue_and_trigger(&id, &trigger_sql).await {
            warn!(
                namespace = %self.namespace,
                registration = %id,
                "provisioning failed, dropping partial objects"
            );
            self.cleanup_partial(&id).await;
            return Err(TapError::PartialProvisioning {
                namespace: self.namespace.clone(),
                id,
                source: Box::new(source),
            });
        }

        self.attach_labels(&id, table).await;

        let registration = Registration {
            namespace: self.namespace.clone(),
            id,
            table: table.clone(),
        };
        info!("table monitoring started: {registration}");
        Ok(registration)
    }

    /// The registration covering `table`, if any.
    pub async fn get(&self, table: &TableRef) -> Result<Option<Registration>> {
        self.ensure_namespace().await?;
        self.catalog.find(&self.namespace, table).await
    }

    /// All registrations, sorted by table schema then table name.
    pub async fn list(&self) -> Result<Vec<Registration>> {
        self.ensure_namespace().await?;
        self.catalog.list(&self.namespace).await
    }

    /// Stop monitoring a table.
    ///
    /// Removes the trigger, the staging variable, and the event queue, in
    /// that order. Returns `Ok(None)` when the table has no registration;
    /// that is a no-op, not an error. A failing step surfaces which removal
    /// failed; earlier steps are not undone.
    pub async fn delete(&self, table: &TableRef) -> Result<Option<Registration>> {
        self.ensure_namespace().await?;
        let _guard = self.mutate.lock().await;

        let Some(registration) = self.catalog.find(&self.namespace, table).await? else {
            warn!("no registration exists for table {table}");
            return Ok(None);
        };

        let deletion = |step: &'static str, source: TapError| TapError::DeletionFailure {
            namespace: registration.namespace.clone(),
            id: registration.id.clone(),
            step,
            source: Box::new(source),
        };

        self.ddl
            .execute(&drop_trigger_stmt(&self.namespace, &registration.id))
            .await
            .map_err(|e| deletion("trigger", e))?;
        self.ddl
            .execute(&drop_variable_stmt(&self.namespace, &registration.id))
            .await
            .map_err(|e| deletion("variable", e))?;
        self.admin
            .delete_queue(&self.namespace, &registration.id)
            .await
            .map_err(|e| deletion("queue", e))?;

        info!("table no longer monitored: {registration}");
        Ok(Some(registration))
    }

    /// Create the namespace if absent. Idempotent within this manager's
    /// lifetime; the attached label is cosmetic and failures are swallowed.
    async fn ensure_namespace(&self) -> Result<()> {
        self.bootstrap
            .get_or_try_init(|| async {
                if self.catalog.namespace_exists(&self.namespace).await? {
                    debug!("namespace {} already exists", self.namespace);
                    return Ok(());
                }
                self.admin.create_namespace(&self.namespace).await?;
                let label_stmt = format!(
                    "COMMENT ON SCHEMA {} IS 'tabletap change-capture registrations'",
                    self.namespace
                );
                if let Err(e) = self.ddl.execute(&label_stmt).await {
                    warn!("could not label namespace {}: {e}", self.namespace);
                }
                info!("created namespace {}", self.namespace);
                Ok(())
            })
            .await
            .map(|_| ())
    }

    async fn provision_queue_and_trigger(&self, id: &str, trigger_sql: &str) -> Result<()> {
        // A stale same-named queue can only be left behind by a partial
        // prior run; delete it best-effort before creating.
        self.admin.delete_queue_unchecked(&self.namespace, id).await;
        self.admin
            .create_queue(&self.namespace, id, &QueueOptions::default())
            .await?;
        self.ddl.execute(trigger_sql).await
    }

    /// Drop whatever `create` had provisioned before failing. Best effort:
    /// a cleanup failure is logged and the original error still surfaces.
    async fn cleanup_partial(&self, id: &str) {
        if let Err(e) = self
            .ddl
            .execute(&drop_variable_stmt(&self.namespace, id))
            .await
        {
            warn!("cleanup could not drop variable {}.{id}: {e}", self.namespace);
        }
        self.admin.delete_queue_unchecked(&self.namespace, id).await;
    }

    /// Attach the table's descriptive label to the staging variable and the
    /// trigger. Cosmetic; failures are logged and swallowed.
    async fn attach_labels(&self, id: &str, table: &TableRef) {
        let label = table.label_text();
        if label.is_empty() {
            return;
        }
        for kind in ["VARIABLE", "TRIGGER"] {
            let stmt = format!(
                "LABEL ON {kind} {}.{id} IS '{}'",
                self.namespace,
                label.replace('\'', "''")
            );
            if let Err(e) = self.ddl.execute(&stmt).await {
                warn!("could not label {kind} {}.{id}: {e}", self.namespace);
            }
        }
    }

    fn render_trigger(&self, id: &str, table: &TableRef, columns: &[String]) -> Result<String> {
        let column_data = column_projection(columns);
        let mut values = HashMap::new();
        values.insert("LIBRARY".to_string(), self.namespace.clone());
        values.insert("TRIGGER_NAME".to_string(), id.to_string());
        values.insert("SOURCE_SCHEMA".to_string(), table.schema.clone());
        values.insert("SOURCE_TABLE".to_string(), table.name.clone());
        values.insert("DATA_QUEUE_NAME".to_string(), id.to_string());
        values.insert(
            "COLUMN_DATA_ON_DELETE".to_string(),
            // The delete-time projection reads the old-row alias instead.
            column_data.replace(" n.", " o."),
        );
        values.insert("COLUMN_DATA".to_string(), column_data);
        template::render(CREATE_TRIGGER, &values)
    }
}

fn create_variable_stmt(namespace: &str, id: &str) -> String {
    format!("CREATE OR REPLACE VARIABLE {namespace}.{id} CLOB(64000) CCSID 1208")
}

fn drop_variable_stmt(namespace: &str, id: &str) -> String {
    format!("DROP VARIABLE {namespace}.{id}")
}

fn drop_trigger_stmt(namespace: &str, id: &str) -> String {
    format!("DROP TRIGGER {namespace}.{id}")
}

/// JSON key/value projection over the new-row alias, one column per line,
/// in ordinal position order.
fn column_projection(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| format!("            KEY '{c}' VALUE n.{c}"))
        .collect::<Vec<_>>()
        .join(",\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;

    fn manager(backend: &MemoryBackend) -> RegistrationManager {
        RegistrationManager::new(
            "TABLETAP",
            backend.catalog(),
            backend.ddl(),
            backend.admin(),
        )
    }

    fn orders_backend() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.install_table("SALES", "SALES", "ORDERS", "ORDERS1", &["ID", "TOTAL"]);
        backend
    }

    #[test]
    fn test_column_projection_aliases() {
        let columns = vec!["ID".to_string(), "NAME".to_string()];
        let insert = column_projection(&columns);
        assert!(insert.contains("KEY 'ID' VALUE n.ID"));
        assert!(insert.contains("KEY 'NAME' VALUE n.NAME"));

        let delete = insert.replace(" n.", " o.");
        assert!(delete.contains("KEY 'ID' VALUE o.ID"));
        assert!(!delete.contains("n.ID"));
    }

    #[tokio::test]
    async fn test_create_then_get_round_trip() {
        let backend = orders_backend();
        let manager = manager(&backend);
        let table = manager.resolve("SALES", "ORDERS").await.unwrap().unwrap();

        let created = manager.create(&table).await.unwrap();
        assert_eq!(created.namespace, "TABLETAP");
        assert_eq!(created.table, table);

        let fetched = manager.get(&table).await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.table, table);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_rejected() {
        let backend = orders_backend();
        let manager = manager(&backend);
        let table = manager.resolve("SALES", "ORDERS").await.unwrap().unwrap();

        let first = manager.create(&table).await.unwrap();
        let err = manager.create(&table).await.unwrap_err();
        match err {
            TapError::AlreadyMonitored { id, .. } => assert_eq!(id, first.id),
            other => panic!("expected AlreadyMonitored, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_create_provisions_variable_queue_and_trigger() {
        let backend = orders_backend();
        let manager = manager(&backend);
        let table = manager.resolve("SALES", "ORDERS").await.unwrap().unwrap();

        let created = manager.create(&table).await.unwrap();
        assert!(backend.has_variable("TABLETAP", &created.id));
        assert!(backend.has_queue("TABLETAP", &created.id));

        let ddl = backend.ddl_log();
        assert!(ddl.iter().any(|s| s.contains("CREATE OR REPLACE TRIGGER")));
        // Labels attached to both the variable and the trigger.
        assert_eq!(ddl.iter().filter(|s| s.starts_with("LABEL ON")).count(), 2);
    }

    #[tokio::test]
    async fn test_create_on_empty_column_set_fails() {
        let backend = MemoryBackend::new();
        backend.install_table("SALES", "SALES", "EMPTY", "EMPTY", &[]);
        let manager = manager(&backend);
        let table = manager.resolve("SALES", "EMPTY").await.unwrap().unwrap();

        let err = manager.create(&table).await.unwrap_err();
        assert!(matches!(err, TapError::TableLookupFailed(_)));
        assert!(
            backend.ddl_log().iter().all(|s| !s.contains("CREATE OR REPLACE")),
            "no provisioning statement expected"
        );
    }

    #[tokio::test]
    async fn test_partial_provisioning_is_compensated() {
        let backend = orders_backend();
        backend.fail_trigger_creation(true);
        let manager = manager(&backend);
        let table = manager.resolve("SALES", "ORDERS").await.unwrap().unwrap();

        let err = manager.create(&table).await.unwrap_err();
        let TapError::PartialProvisioning { namespace, id, .. } = err else {
            panic!("expected PartialProvisioning, got {err}");
        };
        assert_eq!(namespace, "TABLETAP");
        // Compensating cleanup removed the staging variable and the queue.
        assert!(!backend.has_variable("TABLETAP", &id));
        assert!(!backend.has_queue("TABLETAP", &id));
        assert!(manager.get(&table).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_all_three_objects() {
        let backend = orders_backend();
        let manager = manager(&backend);
        let table = manager.resolve("SALES", "ORDERS").await.unwrap().unwrap();

        let created = manager.create(&table).await.unwrap();
        let deleted = manager.delete(&table).await.unwrap().unwrap();
        assert_eq!(deleted.id, created.id);

        assert!(manager.get(&table).await.unwrap().is_none());
        assert!(!backend.has_variable("TABLETAP", &created.id));
        assert!(!backend.has_queue("TABLETAP", &created.id));
    }

    #[tokio::test]
    async fn test_delete_of_absent_registration_is_a_noop() {
        let backend = orders_backend();
        let manager = manager(&backend);
        let table = manager.resolve("SALES", "ORDERS").await.unwrap().unwrap();

        assert!(manager.delete(&table).await.unwrap().is_none());
        // No drop operation was issued.
        assert!(backend
            .admin_ops()
            .iter()
            .all(|op| !op.starts_with("delete_queue")));
        assert!(backend.ddl_log().iter().all(|s| !s.starts_with("DROP")));
    }

    #[tokio::test]
    async fn test_namespace_bootstrap_is_idempotent() {
        let backend = orders_backend();
        let manager = manager(&backend);
        manager.list().await.unwrap();
        manager.list().await.unwrap();
        let creates = backend
            .admin_ops()
            .iter()
            .filter(|op| op.starts_with("create_namespace"))
            .count();
        assert_eq!(creates, 1);
    }

    #[tokio::test]
    async fn test_list_is_sorted_by_schema_then_name() {
        let backend = MemoryBackend::new();
        backend.install_table("ZOO", "ZOO", "ANIMALS", "ANIMALS", &["ID"]);
        backend.install_table("ACCTS", "ACCTS", "LEDGER", "LEDGER", &["ID"]);
        backend.install_table("ACCTS", "ACCTS", "AUDIT", "AUDIT", &["ID"]);
        let manager = manager(&backend);

        for (schema, name) in [("ZOO", "ANIMALS"), ("ACCTS", "LEDGER"), ("ACCTS", "AUDIT")] {
            let table = manager.resolve(schema, name).await.unwrap().unwrap();
            manager.create(&table).await.unwrap();
        }

        let listed = manager.list().await.unwrap();
        let keys: Vec<_> = listed
            .iter()
            .map(|r| (r.table.schema.clone(), r.table.name.clone()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("ACCTS".to_string(), "AUDIT".to_string()),
                ("ACCTS".to_string(), "LEDGER".to_string()),
                ("ZOO".to_string(), "ANIMALS".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_resolve_matches_either_alias() {
        let backend = MemoryBackend::new();
        backend.install_table("\"MySchema\"", "MYSCHE1", "\"MyTable\"", "MYTAB1", &["ID"]);
        let manager = manager(&backend);

        let canonical = manager
            .resolve("\"MySchema\"", "\"MyTable\"")
            .await
            .unwrap()
            .unwrap();
        let system = manager.resolve("MYSCHE1", "MYTAB1").await.unwrap().unwrap();
        assert_eq!(canonical, system);
    }
}
