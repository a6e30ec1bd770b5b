//! # tabletap - table change-capture registration and event routing
//!
//! `tabletap` lets an operator mark database tables for change monitoring.
//! Every insert/update/delete on a monitored table is captured by a
//! generated trigger into a per-table FIFO event queue, and a long-running
//! daemon forwards each queued event to a message-bus topic named after the
//! registration.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐    ┌──────────────────────┐    ┌─────────────────┐
//! │ operator │───▶│ RegistrationManager  │───▶│ catalog state   │
//! │  (CLI)   │    │ create/get/list/drop │    │ trigger + queue │
//! └──────────┘    └──────────────────────┘    │ + staging var   │
//!                                             └────────┬────────┘
//!                                                      │ row changes
//!                                                      ▼
//!                 ┌──────────────────────┐    ┌─────────────────┐
//!                 │     RouteDaemon      │◀───│  event queues   │
//!                 │ one route per reg    │    │  (FIFO, binary) │
//!                 └──────────┬───────────┘    └─────────────────┘
//!                            ▼
//!                     message-bus topics
//! ```
//!
//! External collaborators (catalog queries, DDL execution, administrative
//! commands, queue consumption, bus publishing) are trait seams; the
//! [`memory`] module provides an in-process implementation used by tests
//! and by the CLI's standalone mode.

pub mod bus;
pub mod catalog;
pub mod config;
pub mod daemon;
pub mod error;
pub mod ident;
pub mod manager;
pub mod memory;
pub mod queue;
pub mod table;
pub mod template;

pub use bus::BusPublisher;
pub use catalog::{AdminChannel, Catalog, DdlExecutor, QueueOptions};
pub use config::TapConfig;
pub use daemon::{DaemonState, RouteDaemon};
pub use error::{Result, TapError};
pub use ident::IdAllocator;
pub use manager::{Registration, RegistrationManager};
pub use memory::MemoryBackend;
pub use queue::{QueueConsumer, QueueOpener};
pub use table::TableRef;
