use crate::business_time::BusinessCalendar;
use crate::clock::Clock;
use crate::error::{AppError, Result};
use crate::models::{SlaTarget, Ticket, TicketStatus};
use crate::sla::matcher::match_policy;
use crate::store::{PolicyStore, TargetStore};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Owns the per-ticket SLA record lifecycle: creation, first-response and
/// resolve satisfaction, pause/resume bookkeeping.
///
/// Mutations are serialized per ticket through a lock table, and every
/// write goes through the store's version guard with a bounded retry, so
/// redundant or concurrent invocations can never double-extend a pause or
/// reset a met flag.
pub struct SlaTracker {
    targets: Arc<dyn TargetStore>,
    policies: Arc<dyn PolicyStore>,
    calendar: BusinessCalendar,
    clock: Arc<dyn Clock>,

    /// Per-ticket critical sections
    ticket_locks: DashMap<Uuid, Arc<Mutex<()>>>,

    /// Retries on optimistic-lock conflicts
    conflict_retries: u32,
}

impl SlaTracker {
    pub fn new(
        targets: Arc<dyn TargetStore>,
        policies: Arc<dyn PolicyStore>,
        calendar: BusinessCalendar,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            targets,
            policies,
            calendar,
            clock,
            ticket_locks: DashMap::new(),
            conflict_retries: 3,
        }
    }

    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries.max(1);
        self
    }

    /// Create the SLA target for a freshly created ticket. Returns `None`
    /// when the tenant has no active policies; a ticket without an SLA
    /// is a supported state.
    pub async fn create_for_ticket(&self, ticket: &Ticket) -> Result<Option<SlaTarget>> {
        let active = self.policies.active_policies(&ticket.tenant_id).await?;

        let Some(policy) = match_policy(ticket, &active) else {
            tracing::debug!(
                ticket_id = %ticket.id,
                tenant_id = %ticket.tenant_id,
                "No active SLA policies, ticket carries no SLA target"
            );
            return Ok(None);
        };

        // Deadlines are anchored at the creation instant; the priority
        // decides the calendar (P1 is always-on)
        let anchor = ticket.created_at;
        let first_response_due_at = Some(self.calendar.add_minutes_for(
            anchor,
            policy.first_response_minutes,
            ticket.priority,
        ));
        let resolve_due_at = Some(self.calendar.add_minutes_for(
            anchor,
            policy.resolve_minutes,
            ticket.priority,
        ));

        let target = SlaTarget::new(
            ticket.id,
            policy.id,
            first_response_due_at,
            resolve_due_at,
            policy.pause_on_waiting_customer,
            self.clock.now(),
        );

        self.targets.save_target(&target).await?;

        tracing::info!(
            ticket_id = %ticket.id,
            policy_id = %policy.id,
            policy_name = %policy.name,
            first_response_due_at = ?target.first_response_due_at,
            resolve_due_at = ?target.resolve_due_at,
            "SLA target created"
        );

        Ok(Some(target))
    }

    /// The first public agent comment satisfies the first-response
    /// milestone. Idempotent: re-running when already met is a no-op.
    pub async fn record_first_response(&self, ticket_id: &Uuid) -> Result<()> {
        let now = self.clock.now();
        let changed = self
            .mutate(ticket_id, |target| target.mark_first_response(now))
            .await?;

        if changed {
            tracing::info!(ticket_id = %ticket_id, "First-response SLA met");
        }
        Ok(())
    }

    /// Ticket reached Resolved/Closed. Idempotent.
    pub async fn record_resolution(&self, ticket_id: &Uuid) -> Result<()> {
        let now = self.clock.now();
        let changed = self
            .mutate(ticket_id, |target| target.mark_resolved(now))
            .await?;

        if changed {
            tracing::info!(ticket_id = %ticket_id, "Resolve SLA met");
        }
        Ok(())
    }

    /// Ticket entered customer-waiting. No-op unless the policy pauses
    /// on waiting and the target is not already paused.
    pub async fn pause(&self, ticket_id: &Uuid) -> Result<()> {
        let now = self.clock.now();
        let changed = self.mutate(ticket_id, |target| target.pause(now)).await?;

        if changed {
            tracing::info!(ticket_id = %ticket_id, paused_at = %now, "SLA clock paused");
        }
        Ok(())
    }

    /// Ticket left customer-waiting: extend every unmet due instant by
    /// the pause duration and clear the pause.
    pub async fn resume(&self, ticket_id: &Uuid) -> Result<()> {
        let now = self.clock.now();
        let changed = self
            .mutate(ticket_id, |target| target.resume(now).is_some())
            .await?;

        if changed {
            tracing::info!(ticket_id = %ticket_id, resumed_at = %now, "SLA clock resumed");
        }
        Ok(())
    }

    /// Dispatch the SLA side effects of a status transition
    pub async fn on_status_change(
        &self,
        ticket_id: &Uuid,
        old_status: TicketStatus,
        new_status: TicketStatus,
    ) -> Result<()> {
        if old_status == new_status {
            return Ok(());
        }

        if new_status.is_waiting_customer() {
            self.pause(ticket_id).await?;
        } else if old_status.is_waiting_customer() {
            self.resume(ticket_id).await?;
        }

        if new_status.is_resolution() {
            self.record_resolution(ticket_id).await?;
        }

        Ok(())
    }

    /// Load-apply-store under the per-ticket lock, retrying on stale
    /// versions. A ticket without a target (no SLA) is a silent no-op.
    /// Returns whether the mutation changed anything.
    async fn mutate<F>(&self, ticket_id: &Uuid, apply: F) -> Result<bool>
    where
        F: Fn(&mut SlaTarget) -> bool,
    {
        let lock = self
            .ticket_locks
            .entry(*ticket_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let mut attempt = 0;
        loop {
            attempt += 1;

            let Some(mut target) = self.targets.get_target(ticket_id).await? else {
                tracing::debug!(ticket_id = %ticket_id, "Ticket has no SLA target, skipping");
                return Ok(false);
            };

            if !apply(&mut target) {
                return Ok(false);
            }

            match self.targets.update_target(&target).await {
                Ok(_) => return Ok(true),
                Err(e @ AppError::ConcurrencyConflict(_)) if attempt < self.conflict_retries => {
                    tracing::warn!(
                        ticket_id = %ticket_id,
                        attempt = attempt,
                        error = %e,
                        "SLA target version conflict, retrying with fresh data"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}
