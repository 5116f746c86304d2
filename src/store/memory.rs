use crate::error::{AppError, Result};
use crate::models::{SlaPolicy, SlaTarget, Ticket, TicketKey};
use crate::store::{PolicyStore, TargetStore, TicketStore, UserDirectory};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// In-memory store (for the MVP binary and testing). Relational backends
/// live outside this crate behind the same traits.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tickets: Arc<DashMap<Uuid, Ticket>>,
    /// Global key uniqueness index: rendered key -> ticket id
    key_index: Arc<DashMap<String, Uuid>>,
    policies: Arc<DashMap<Uuid, SlaPolicy>>,
    targets: Arc<DashMap<Uuid, SlaTarget>>,
    users: Arc<DashMap<Uuid, ()>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user for directory lookups
    pub fn add_user(&self, user_id: Uuid) {
        self.users.insert(user_id, ());
    }
}

#[async_trait]
impl TicketStore for InMemoryStore {
    async fn save_ticket(&self, ticket: &Ticket) -> Result<()> {
        let rendered = ticket.key.to_string();
        // entry() keeps the uniqueness check and the reservation atomic
        match self.key_index.entry(rendered.clone()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                if *existing.get() != ticket.id {
                    return Err(AppError::AllocationConflict(format!(
                        "Ticket key {} already taken",
                        rendered
                    )));
                }
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(ticket.id);
            }
        }

        self.tickets.insert(ticket.id, ticket.clone());
        tracing::debug!(ticket_id = %ticket.id, key = %rendered, "Ticket saved");
        Ok(())
    }

    async fn get_ticket(&self, id: &Uuid) -> Result<Option<Ticket>> {
        Ok(self.tickets.get(id).map(|entry| entry.clone()))
    }

    async fn update_ticket(&self, ticket: &Ticket) -> Result<()> {
        if self.tickets.contains_key(&ticket.id) {
            self.tickets.insert(ticket.id, ticket.clone());
            tracing::debug!(ticket_id = %ticket.id, "Ticket updated");
            Ok(())
        } else {
            Err(AppError::NotFound(format!("Ticket {} not found", ticket.id)))
        }
    }

    async fn max_key_sequence(&self, tenant_id: &Uuid, project_key: &str) -> Result<Option<u64>> {
        let max = self
            .tickets
            .iter()
            .filter(|entry| {
                let ticket = entry.value();
                ticket.tenant_id == *tenant_id && ticket.key.prefix() == project_key
            })
            .map(|entry| entry.value().key.sequence())
            .max();

        Ok(max)
    }

    async fn key_exists(&self, key: &TicketKey) -> Result<bool> {
        Ok(self.key_index.contains_key(&key.to_string()))
    }
}

#[async_trait]
impl PolicyStore for InMemoryStore {
    async fn save_policy(&self, policy: &SlaPolicy) -> Result<()> {
        self.policies.insert(policy.id, policy.clone());
        tracing::debug!(policy_id = %policy.id, policy_name = %policy.name, "Policy saved");
        Ok(())
    }

    async fn active_policies(&self, tenant_id: &Uuid) -> Result<Vec<SlaPolicy>> {
        let mut policies: Vec<SlaPolicy> = self
            .policies
            .iter()
            .filter(|entry| {
                let policy = entry.value();
                policy.tenant_id == *tenant_id && policy.active
            })
            .map(|entry| entry.value().clone())
            .collect();

        policies.sort_by_key(|p| p.position);
        Ok(policies)
    }
}

#[async_trait]
impl TargetStore for InMemoryStore {
    async fn save_target(&self, target: &SlaTarget) -> Result<()> {
        self.targets.insert(target.ticket_id, target.clone());
        tracing::debug!(ticket_id = %target.ticket_id, "SLA target saved");
        Ok(())
    }

    async fn get_target(&self, ticket_id: &Uuid) -> Result<Option<SlaTarget>> {
        Ok(self.targets.get(ticket_id).map(|entry| entry.clone()))
    }

    async fn update_target(&self, target: &SlaTarget) -> Result<SlaTarget> {
        let mut entry = self.targets.get_mut(&target.ticket_id).ok_or_else(|| {
            AppError::NotFound(format!("SLA target for ticket {} not found", target.ticket_id))
        })?;

        if entry.version != target.version {
            return Err(AppError::ConcurrencyConflict(format!(
                "SLA target for ticket {} changed (expected version {}, found {})",
                target.ticket_id, target.version, entry.version
            )));
        }

        let mut updated = target.clone();
        updated.version += 1;
        *entry = updated.clone();

        tracing::debug!(
            ticket_id = %target.ticket_id,
            version = updated.version,
            "SLA target updated"
        );

        Ok(updated)
    }

    async fn due_unmet(&self, now: DateTime<Utc>) -> Result<Vec<SlaTarget>> {
        let targets = self
            .targets
            .iter()
            .filter(|entry| {
                let t = entry.value();
                let first_response_over = !t.first_response_met
                    && t.first_response_due_at.is_some_and(|due| due <= now);
                let resolve_over = !t.resolve_met && t.resolve_due_at.is_some_and(|due| due <= now);
                first_response_over || resolve_over
            })
            .map(|entry| entry.value().clone())
            .collect();

        Ok(targets)
    }

    async fn due_within(&self, now: DateTime<Utc>, horizon: Duration) -> Result<Vec<SlaTarget>> {
        let limit = now + horizon;
        let targets = self
            .targets
            .iter()
            .filter(|entry| {
                let t = entry.value();
                let first_response_near = !t.first_response_met
                    && t.first_response_due_at.is_some_and(|due| due <= limit);
                let resolve_near =
                    !t.resolve_met && t.resolve_due_at.is_some_and(|due| due <= limit);
                first_response_near || resolve_near
            })
            .map(|entry| entry.value().clone())
            .collect();

        Ok(targets)
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn user_exists(&self, user_id: &Uuid) -> Result<bool> {
        Ok(self.users.contains_key(user_id))
    }
}
