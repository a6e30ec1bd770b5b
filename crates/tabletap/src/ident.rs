//! Registration identifier allocation
//!
//! Every registration is backed by a trigger, a staging variable, and an
//! event queue that all share one generated name. The name must be unique
//! within the namespace and distinguishable from user-created objects.

use crate::catalog::Catalog;
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Constant prefix marking generated objects as tabletap-owned.
pub const ID_PREFIX: &str = "TT";

/// Total identifier length, prefix included.
pub const ID_LEN: usize = 10;

/// Allocates collision-free registration identifiers for one namespace.
///
/// Generation is retried until the catalog reports the candidate unused.
/// The entropy space is large enough that convergence is expected on the
/// first attempt; there is no retry limit.
///
/// The internal lock serializes allocation within one process only. Two
/// separate processes can still race between the existence check and the
/// creation of the backing objects; see the crate design notes.
pub struct IdAllocator {
    catalog: Arc<dyn Catalog>,
    namespace: String,
    lock: Mutex<()>,
}

impl IdAllocator {
    pub fn new(catalog: Arc<dyn Catalog>, namespace: impl Into<String>) -> Self {
        Self {
            catalog,
            namespace: namespace.into(),
            lock: Mutex::new(()),
        }
    }

    /// Allocate an identifier not currently present in the namespace.
    ///
    /// The existence check and the return are covered by one lock, so two
    /// in-process callers cannot be handed the same candidate.
    pub async fn allocate(&self) -> Result<String> {
        let _guard = self.lock.lock().await;
        loop {
            let candidate = generate_candidate();
            if !self.catalog.id_exists(&self.namespace, &candidate).await? {
                return Ok(candidate);
            }
        }
    }
}

/// One random fixed-length candidate: prefix + uppercase alphanumeric
/// suffix drawn from a v4 UUID with non-alphanumerics stripped.
fn generate_candidate() -> String {
    let suffix_len = ID_LEN - ID_PREFIX.len();
    let entropy: String = Uuid::new_v4()
        .simple()
        .to_string()
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(suffix_len)
        .collect();
    format!("{ID_PREFIX}{entropy}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use std::collections::HashSet;

    #[test]
    fn test_candidate_shape() {
        for _ in 0..100 {
            let id = generate_candidate();
            assert_eq!(id.len(), ID_LEN);
            assert!(id.starts_with(ID_PREFIX));
            assert!(id.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn test_allocated_ids_are_unique() {
        let backend = MemoryBackend::new();
        let allocator = IdAllocator::new(backend.catalog(), "TABLETAP");

        let mut seen = HashSet::new();
        for _ in 0..100 {
            let id = allocator.allocate().await.unwrap();
            assert!(seen.insert(id.clone()), "duplicate id issued: {id}");
            // Record the issued id so the next allocation must avoid it.
            backend.install_registration("TABLETAP", &id, "S", "S", &format!("T{id}"), "T");
        }
    }

    #[tokio::test]
    async fn test_allocated_id_is_unused_in_catalog() {
        let backend = MemoryBackend::new();
        let allocator = IdAllocator::new(backend.catalog(), "TABLETAP");
        let id = allocator.allocate().await.unwrap();
        assert!(!backend.catalog().id_exists("TABLETAP", &id).await.unwrap());
    }
}
