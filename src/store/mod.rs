pub mod memory;

pub use memory::InMemoryStore;

use crate::error::Result;
use crate::models::{SlaPolicy, SlaTarget, Ticket, TicketKey};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Trait for ticket storage operations
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Save a new ticket. Fails if the ticket's key is already taken.
    async fn save_ticket(&self, ticket: &Ticket) -> Result<()>;

    /// Get a ticket by ID
    async fn get_ticket(&self, id: &Uuid) -> Result<Option<Ticket>>;

    /// Update an existing ticket
    async fn update_ticket(&self, ticket: &Ticket) -> Result<()>;

    /// Highest key sequence already persisted for a numbering scope
    async fn max_key_sequence(&self, tenant_id: &Uuid, project_key: &str) -> Result<Option<u64>>;

    /// Whether a ticket key is already taken (globally)
    async fn key_exists(&self, key: &TicketKey) -> Result<bool>;
}

/// Trait for SLA policy storage operations
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Save or replace a policy
    async fn save_policy(&self, policy: &SlaPolicy) -> Result<()>;

    /// Active policies for a tenant, in stable position order
    async fn active_policies(&self, tenant_id: &Uuid) -> Result<Vec<SlaPolicy>>;
}

/// Trait for SLA target storage operations
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Save a freshly created target
    async fn save_target(&self, target: &SlaTarget) -> Result<()>;

    /// Get the target for a ticket
    async fn get_target(&self, ticket_id: &Uuid) -> Result<Option<SlaTarget>>;

    /// Update a target guarded by its version. Returns the stored copy
    /// with the bumped version; a stale version yields
    /// `ConcurrencyConflict` and the caller retries with fresh data.
    async fn update_target(&self, target: &SlaTarget) -> Result<SlaTarget>;

    /// Targets with at least one unmet due instant in the past
    async fn due_unmet(&self, now: DateTime<Utc>) -> Result<Vec<SlaTarget>>;

    /// Targets with at least one unmet due instant before `now + horizon`
    /// (includes already-breached targets)
    async fn due_within(&self, now: DateTime<Utc>, horizon: Duration) -> Result<Vec<SlaTarget>>;
}

/// User-existence check, owned by the surrounding system
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_exists(&self, user_id: &Uuid) -> Result<bool>;
}
