//! External collaborator traits for catalog access and administration
//!
//! The registration manager never talks to a database directly; it goes
//! through three seams:
//!
//! - [`Catalog`] — read-only queries against the table/trigger catalog.
//!   Never cached: triggers can be created or removed out-of-band, so every
//!   call must reflect current catalog state.
//! - [`DdlExecutor`] — executes generated statements (create/drop trigger,
//!   create/drop variable, label statements), each as an independent unit.
//!   No multi-statement transactions span the trigger/variable/queue.
//! - [`AdminChannel`] — namespace and queue lifecycle commands, issued
//!   serially; implementations synchronize internally.

use crate::error::Result;
use crate::manager::Registration;
use crate::table::TableRef;
use async_trait::async_trait;

/// Options applied when provisioning a registration's event queue.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Maximum message length in bytes
    pub max_len: u32,
    /// Record the sending job's identity on each entry
    pub sender_id: bool,
    /// Automatically reclaim queue storage
    pub auto_reclaim: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_len: 64_512,
            sender_id: true,
            auto_reclaim: true,
        }
    }
}

/// Read-only queries against the trigger/column catalog, scoped to one
/// namespace (library).
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Resolve a (schema, table) name pair into a full table identity.
    ///
    /// Each part matches on either its canonical form or its system-short
    /// alias. `None` signals "not found" and is not an error; the caller
    /// aborts early with a user-facing message.
    async fn resolve_table(&self, schema: &str, table: &str) -> Result<Option<TableRef>>;

    /// Column names of a table in ordinal position order.
    ///
    /// Queried from the column catalog rather than from a `SELECT *`
    /// projection so that implicitly hidden columns are included.
    async fn column_names(&self, table: &TableRef) -> Result<Vec<String>>;

    /// All registrations in the namespace, sorted by table schema then
    /// table name for deterministic output.
    async fn list(&self, namespace: &str) -> Result<Vec<Registration>>;

    /// The registration covering `table`, if any. Exact match on canonical
    /// table identity.
    async fn find(&self, namespace: &str, table: &TableRef) -> Result<Option<Registration>>;

    /// Whether a registration with this exact identifier exists in the
    /// namespace.
    async fn id_exists(&self, namespace: &str, id: &str) -> Result<bool>;

    /// Whether the namespace (library) itself exists.
    async fn namespace_exists(&self, namespace: &str) -> Result<bool>;
}

/// Executes generated DDL statements, each as an independent unit.
#[async_trait]
pub trait DdlExecutor: Send + Sync {
    async fn execute(&self, statement: &str) -> Result<()>;
}

/// Namespace and event-queue lifecycle commands.
///
/// `delete_queue_unchecked` is the one "execute and ignore failure" entry
/// point; it exists solely for best-effort cleanup-before-create.
#[async_trait]
pub trait AdminChannel: Send + Sync {
    /// Create the namespace (library). Callers check existence first;
    /// see the cross-process caveat on [`RegistrationManager`].
    ///
    /// [`RegistrationManager`]: crate::manager::RegistrationManager
    async fn create_namespace(&self, namespace: &str) -> Result<()>;

    /// Create the event queue backing a registration.
    async fn create_queue(&self, namespace: &str, id: &str, options: &QueueOptions) -> Result<()>;

    /// Delete a registration's event queue. Failure is an error.
    async fn delete_queue(&self, namespace: &str, id: &str) -> Result<()>;

    /// Delete a queue, swallowing any failure. Log-and-continue policy:
    /// implementations log the failure at debug level and return normally.
    async fn delete_queue_unchecked(&self, namespace: &str, id: &str);
}
