//! In-process backend
//!
//! Implements every external collaborator trait against in-memory state:
//! a table/column catalog, a trigger registry mutated by interpreting the
//! generated DDL, per-registration FIFO queues, and a capturing message
//! bus. Drives the unit and integration tests and the CLI's standalone
//! mode; deployments against a real catalog supply their own trait
//! implementations.

use crate::bus::BusPublisher;
use crate::catalog::{AdminChannel, Catalog, DdlExecutor, QueueOptions};
use crate::error::{Result, TapError};
use crate::manager::Registration;
use crate::queue::{QueueConsumer, QueueOpener};
use crate::table::TableRef;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};
use tokio::sync::mpsc;
use tracing::debug;

static TRIGGER_DDL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)CREATE OR REPLACE TRIGGER (\S+)\.(\S+).*? ON (\S+)\.(\S+)")
        .expect("trigger ddl pattern is invalid - this is a bug")
});

static VARIABLE_DDL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:CREATE OR REPLACE|DROP) VARIABLE (\S+)\.(\S+)")
        .expect("variable ddl pattern is invalid - this is a bug")
});

static DROP_TRIGGER_DDL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"DROP TRIGGER (\S+)\.(\S+)")
        .expect("drop trigger pattern is invalid - this is a bug")
});

#[derive(Clone)]
struct TableEntry {
    table: TableRef,
    columns: Vec<String>,
}

/// A catalog row binding a trigger to its monitored table, keyed by the
/// table's canonical identity the way the trigger catalog stores it.
#[derive(Clone)]
struct TriggerRow {
    namespace: String,
    id: String,
    schema: String,
    name: String,
}

#[derive(Default)]
struct State {
    tables: Vec<TableEntry>,
    triggers: Vec<TriggerRow>,
    variables: HashSet<(String, String)>,
    namespaces: HashSet<String>,
    senders: HashMap<(String, String), mpsc::UnboundedSender<Bytes>>,
    receivers: HashMap<(String, String), mpsc::UnboundedReceiver<Bytes>>,
    ddl_log: Vec<String>,
    admin_ops: Vec<String>,
    published: Vec<(String, String)>,
    fail_trigger: bool,
}

impl State {
    fn registration_for(&self, row: &TriggerRow) -> Registration {
        // Reconstruct the full table identity from the table catalog; a
        // table dropped out-of-band leaves only its canonical names.
        let table = self
            .tables
            .iter()
            .find(|e| e.table.schema == row.schema && e.table.name == row.name)
            .map(|e| e.table.clone())
            .unwrap_or_else(|| {
                TableRef::new(
                    row.schema.clone(),
                    row.schema.clone(),
                    row.name.clone(),
                    row.name.clone(),
                )
            });
        Registration {
            namespace: row.namespace.clone(),
            id: row.id.clone(),
            table,
        }
    }
}

/// Shared in-memory backend. Cloning is cheap; all clones observe the same
/// state.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn catalog(&self) -> Arc<dyn Catalog> {
        Arc::new(MemoryCatalog(self.clone()))
    }

    pub fn ddl(&self) -> Arc<dyn DdlExecutor> {
        Arc::new(MemoryDdl(self.clone()))
    }

    pub fn admin(&self) -> Arc<dyn AdminChannel> {
        Arc::new(MemoryAdmin(self.clone()))
    }

    pub fn opener(&self) -> Arc<dyn QueueOpener> {
        Arc::new(MemoryOpener(self.clone()))
    }

    pub fn bus(&self) -> Arc<dyn BusPublisher> {
        Arc::new(MemoryBus(self.clone()))
    }

    /// Seed a table into the catalog.
    pub fn install_table(
        &self,
        schema: &str,
        system_schema: &str,
        name: &str,
        system_name: &str,
        columns: &[&str],
    ) {
        self.state.lock().tables.push(TableEntry {
            table: TableRef::new(schema, system_schema, name, system_name),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
    }

    /// Seed a trigger catalog row directly, bypassing DDL.
    pub fn install_registration(
        &self,
        namespace: &str,
        id: &str,
        schema: &str,
        _system_schema: &str,
        name: &str,
        _system_name: &str,
    ) {
        self.state.lock().triggers.push(TriggerRow {
            namespace: namespace.to_string(),
            id: id.to_string(),
            schema: schema.to_string(),
            name: name.to_string(),
        });
    }

    /// Make the next trigger-creation statement fail, simulating a
    /// rejected `CREATE TRIGGER`.
    pub fn fail_trigger_creation(&self, fail: bool) {
        self.state.lock().fail_trigger = fail;
    }

    /// Simulate the database trigger firing: enqueue a payload on the
    /// registration's event queue.
    pub fn push_event(&self, namespace: &str, id: &str, payload: Bytes) {
        let key = (namespace.to_string(), id.to_string());
        let state = self.state.lock();
        if let Some(sender) = state.senders.get(&key) {
            let _ = sender.send(payload);
        }
    }

    /// Drop a queue's sender so an open consumer observes end-of-queue.
    pub fn close_queue(&self, namespace: &str, id: &str) {
        let key = (namespace.to_string(), id.to_string());
        self.state.lock().senders.remove(&key);
    }

    pub fn has_variable(&self, namespace: &str, id: &str) -> bool {
        self.state
            .lock()
            .variables
            .contains(&(namespace.to_string(), id.to_string()))
    }

    pub fn has_queue(&self, namespace: &str, id: &str) -> bool {
        self.state
            .lock()
            .senders
            .contains_key(&(namespace.to_string(), id.to_string()))
    }

    /// Every DDL statement executed, in order.
    pub fn ddl_log(&self) -> Vec<String> {
        self.state.lock().ddl_log.clone()
    }

    /// Every administrative operation issued, in order.
    pub fn admin_ops(&self) -> Vec<String> {
        self.state.lock().admin_ops.clone()
    }

    /// Every (topic, payload) pair published to the bus, in order.
    pub fn published(&self) -> Vec<(String, String)> {
        self.state.lock().published.clone()
    }
}

struct MemoryCatalog(MemoryBackend);

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn resolve_table(&self, schema: &str, table: &str) -> Result<Option<TableRef>> {
        let state = self.0.state.lock();
        Ok(state
            .tables
            .iter()
            .find(|e| e.table.matches(schema, table))
            .map(|e| e.table.clone()))
    }

    async fn column_names(&self, table: &TableRef) -> Result<Vec<String>> {
        let state = self.0.state.lock();
        Ok(state
            .tables
            .iter()
            .find(|e| e.table.schema == table.schema && e.table.name == table.name)
            .map(|e| e.columns.clone())
            .unwrap_or_default())
    }

    async fn list(&self, namespace: &str) -> Result<Vec<Registration>> {
        let state = self.0.state.lock();
        let mut registrations: Vec<Registration> = state
            .triggers
            .iter()
            .filter(|row| row.namespace == namespace)
            .map(|row| state.registration_for(row))
            .collect();
        registrations.sort_by(|a, b| {
            (a.table.schema.as_str(), a.table.name.as_str())
                .cmp(&(b.table.schema.as_str(), b.table.name.as_str()))
        });
        Ok(registrations)
    }

    async fn find(&self, namespace: &str, table: &TableRef) -> Result<Option<Registration>> {
        let state = self.0.state.lock();
        Ok(state
            .triggers
            .iter()
            .find(|row| {
                row.namespace == namespace && row.schema == table.schema && row.name == table.name
            })
            .map(|row| state.registration_for(row)))
    }

    async fn id_exists(&self, namespace: &str, id: &str) -> Result<bool> {
        let state = self.0.state.lock();
        Ok(state
            .triggers
            .iter()
            .any(|row| row.namespace == namespace && row.id == id))
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        Ok(self.0.state.lock().namespaces.contains(namespace))
    }
}

struct MemoryDdl(MemoryBackend);

#[async_trait]
impl DdlExecutor for MemoryDdl {
    async fn execute(&self, statement: &str) -> Result<()> {
        let mut state = self.0.state.lock();
        state.ddl_log.push(statement.to_string());

        if statement.contains("CREATE OR REPLACE TRIGGER") {
            if state.fail_trigger {
                return Err(TapError::ddl("CREATE TRIGGER rejected"));
            }
            let captures = TRIGGER_DDL
                .captures(statement)
                .ok_or_else(|| TapError::ddl("unparseable trigger statement"))?;
            state.triggers.push(TriggerRow {
                namespace: captures[1].to_string(),
                id: captures[2].to_string(),
                schema: captures[3].to_string(),
                name: captures[4].to_string(),
            });
        } else if let Some(captures) = DROP_TRIGGER_DDL.captures(statement) {
            let (namespace, id) = (captures[1].to_string(), captures[2].to_string());
            let before = state.triggers.len();
            state
                .triggers
                .retain(|row| !(row.namespace == namespace && row.id == id));
            if state.triggers.len() == before {
                return Err(TapError::ddl(format!("trigger {namespace}.{id} not found")));
            }
        } else if let Some(captures) = VARIABLE_DDL.captures(statement) {
            let key = (captures[1].to_string(), captures[2].to_string());
            if statement.starts_with("DROP") {
                if !state.variables.remove(&key) {
                    return Err(TapError::ddl(format!(
                        "variable {}.{} not found",
                        key.0, key.1
                    )));
                }
            } else {
                state.variables.insert(key);
            }
        }
        // LABEL ON / COMMENT ON statements are recorded only.
        Ok(())
    }
}

struct MemoryAdmin(MemoryBackend);

#[async_trait]
impl AdminChannel for MemoryAdmin {
    async fn create_namespace(&self, namespace: &str) -> Result<()> {
        let mut state = self.0.state.lock();
        state.admin_ops.push(format!("create_namespace {namespace}"));
        state.namespaces.insert(namespace.to_string());
        Ok(())
    }

    async fn create_queue(&self, namespace: &str, id: &str, options: &QueueOptions) -> Result<()> {
        let mut state = self.0.state.lock();
        state.admin_ops.push(format!(
            "create_queue {namespace}/{id} maxlen={}",
            options.max_len
        ));
        let key = (namespace.to_string(), id.to_string());
        if state.senders.contains_key(&key) {
            return Err(TapError::admin(format!(
                "queue {namespace}/{id} already exists"
            )));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.senders.insert(key.clone(), tx);
        state.receivers.insert(key, rx);
        Ok(())
    }

    async fn delete_queue(&self, namespace: &str, id: &str) -> Result<()> {
        let mut state = self.0.state.lock();
        state.admin_ops.push(format!("delete_queue {namespace}/{id}"));
        let key = (namespace.to_string(), id.to_string());
        state.receivers.remove(&key);
        if state.senders.remove(&key).is_none() {
            return Err(TapError::admin(format!("queue {namespace}/{id} not found")));
        }
        Ok(())
    }

    async fn delete_queue_unchecked(&self, namespace: &str, id: &str) {
        let mut state = self.0.state.lock();
        state
            .admin_ops
            .push(format!("delete_queue_unchecked {namespace}/{id}"));
        let key = (namespace.to_string(), id.to_string());
        state.receivers.remove(&key);
        if state.senders.remove(&key).is_none() {
            debug!("queue {namespace}/{id} did not exist, nothing deleted");
        }
    }
}

struct MemoryOpener(MemoryBackend);

#[async_trait]
impl QueueOpener for MemoryOpener {
    async fn open(&self, registration: &Registration) -> Result<Box<dyn QueueConsumer>> {
        let key = (registration.namespace.clone(), registration.id.clone());
        let receiver = self
            .0
            .state
            .lock()
            .receivers
            .remove(&key)
            .ok_or_else(|| {
                TapError::queue(format!(
                    "no queue for {}/{}",
                    registration.namespace, registration.id
                ))
            })?;
        Ok(Box::new(MemoryConsumer(receiver)))
    }
}

struct MemoryConsumer(mpsc::UnboundedReceiver<Bytes>);

#[async_trait]
impl QueueConsumer for MemoryConsumer {
    async fn recv(&mut self) -> Result<Option<Bytes>> {
        Ok(self.0.recv().await)
    }
}

struct MemoryBus(MemoryBackend);

#[async_trait]
impl BusPublisher for MemoryBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<()> {
        self.0
            .state
            .lock()
            .published
            .push((topic.to_string(), payload));
        Ok(())
    }
}
