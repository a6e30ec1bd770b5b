//! Error types for registration and routing operations
//!
//! Multi-step mutations (create, delete) report how far they progressed so
//! that orphaned objects can be cleaned up manually or by script.

use thiserror::Error;

/// Errors raised by the registration manager and the routing daemon.
#[derive(Error, Debug)]
pub enum TapError {
    /// `create` was called for a table that already has a registration.
    /// User-correctable; never retried.
    #[error("table {table} is already monitored by registration {id}")]
    AlreadyMonitored { table: String, id: String },

    /// The resolved table yielded no columns (absent or inconsistent
    /// catalog state).
    #[error("table lookup failed for {0}: no columns resolved")]
    TableLookupFailed(String),

    /// `create` failed after the staging variable and/or event queue were
    /// provisioned. Compensating cleanup is attempted; the identifier is
    /// reported so leftovers can be removed by hand if cleanup also failed.
    #[error("provisioning failed for {namespace}.{id}: {source}")]
    PartialProvisioning {
        namespace: String,
        id: String,
        #[source]
        source: Box<TapError>,
    },

    /// One of delete's three removal steps failed. Earlier steps are not
    /// undone.
    #[error("deletion of {namespace}.{id} failed at {step}: {source}")]
    DeletionFailure {
        namespace: String,
        id: String,
        step: &'static str,
        #[source]
        source: Box<TapError>,
    },

    /// Required configuration is absent.
    #[error("configuration missing: {0}")]
    ConfigMissing(&'static str),

    /// Catalog query error.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// DDL statement execution error.
    #[error("ddl error: {0}")]
    Ddl(String),

    /// Administrative command error.
    #[error("admin command error: {0}")]
    Admin(String),

    /// Named template could not be located.
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    /// Event queue consumption error.
    #[error("queue error: {0}")]
    Queue(String),

    /// Message-bus publish error.
    #[error("bus error: {0}")]
    Bus(String),

    /// Configuration file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TapError {
    /// Create a new catalog error
    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog(msg.into())
    }

    /// Create a new DDL error
    pub fn ddl(msg: impl Into<String>) -> Self {
        Self::Ddl(msg.into())
    }

    /// Create a new administrative command error
    pub fn admin(msg: impl Into<String>) -> Self {
        Self::Admin(msg.into())
    }

    /// Create a new queue error
    pub fn queue(msg: impl Into<String>) -> Self {
        Self::Queue(msg.into())
    }

    /// Create a new bus error
    pub fn bus(msg: impl Into<String>) -> Self {
        Self::Bus(msg.into())
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for errors the caller can fix by changing the request rather
    /// than by inspecting external state.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Self::AlreadyMonitored { .. } | Self::TableLookupFailed(_) | Self::ConfigMissing(_)
        )
    }
}

/// Result type for registration and routing operations
pub type Result<T> = std::result::Result<T, TapError>;
