use crate::error::{AppError, Result};
use crate::models::TicketKey;
use crate::store::TicketStore;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Numbering domain for ticket keys: per-project-per-tenant. Project keys
/// are globally unique in the data model, but scoping the counter to the
/// tenant keeps numbering correct even if that ever changes; global key
/// uniqueness is enforced separately inside the critical section.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyScope {
    pub tenant_id: Uuid,
    pub project_key: String,
}

impl KeyScope {
    pub fn new(tenant_id: Uuid, project_key: impl Into<String>) -> Self {
        Self {
            tenant_id,
            project_key: project_key.into(),
        }
    }
}

/// Allocates sequential, human-readable ticket keys. The read-max,
/// add-one, check-unique sequence runs under a per-scope async mutex, and
/// every issued key is recorded in a reservation ledger, so two concurrent
/// callers for the same scope can never observe the same next number,
/// even before either ticket is persisted. Issued keys are never reused,
/// including when the caller later rolls back ticket creation.
pub struct KeyAllocator {
    store: Arc<dyn TicketStore>,

    /// Per-scope critical sections
    locks: DashMap<KeyScope, Arc<Mutex<()>>>,

    /// Highest sequence issued per scope (persisted or not)
    last_issued: DashMap<KeyScope, u64>,

    /// Rendered keys issued by this allocator, for cross-scope collisions
    issued_keys: DashSet<String>,

    /// Bounded retries when a collision is still detected
    max_attempts: u32,

    /// Zero-padding width for the sequence
    pad_width: usize,
}

impl KeyAllocator {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
            last_issued: DashMap::new(),
            issued_keys: DashSet::new(),
            max_attempts: 3,
            pad_width: 4,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_pad_width(mut self, pad_width: usize) -> Self {
        self.pad_width = pad_width;
        self
    }

    /// Produce the next key for the scope: highest known sequence plus
    /// one, or 1 when the scope has no tickets yet.
    pub async fn allocate(&self, scope: &KeyScope) -> Result<TicketKey> {
        let lock = self
            .locks
            .entry(scope.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let persisted_max = self
            .store
            .max_key_sequence(&scope.tenant_id, &scope.project_key)
            .await?
            .unwrap_or(0);
        let issued_max = self.last_issued.get(scope).map_or(0, |entry| *entry);

        let mut next = persisted_max.max(issued_max) + 1;

        for attempt in 1..=self.max_attempts {
            let candidate = TicketKey::new(scope.project_key.clone(), next, self.pad_width);
            let rendered = candidate.to_string();

            let taken =
                self.issued_keys.contains(&rendered) || self.store.key_exists(&candidate).await?;

            if !taken {
                self.issued_keys.insert(rendered);
                self.last_issued.insert(scope.clone(), next);

                tracing::debug!(
                    tenant_id = %scope.tenant_id,
                    key = %candidate,
                    attempt = attempt,
                    "Allocated ticket key"
                );
                return Ok(candidate);
            }

            // Same prefix under another tenant, or an out-of-band insert:
            // skip forward and try again
            tracing::warn!(
                tenant_id = %scope.tenant_id,
                key = %candidate,
                attempt = attempt,
                "Ticket key collision, advancing sequence"
            );
            next += 1;
        }

        Err(AppError::AllocationConflict(format!(
            "Could not allocate a key for {} after {} attempts",
            scope.project_key, self.max_attempts
        )))
    }
}
