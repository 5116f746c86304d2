use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-ticket SLA record: the computed deadlines and their satisfaction
/// state. Created once at ticket creation, mutated on relevant updates,
/// never deleted while the ticket exists.
///
/// Invariants:
/// - a met flag, once true, is never reset;
/// - while `paused_at` is set, both due instants already include every
///   prior pause extension; extensions are applied at resume time only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaTarget {
    /// One-to-one with the ticket
    pub ticket_id: Uuid,

    /// Policy this target was computed from
    pub policy_id: Uuid,

    pub first_response_due_at: Option<DateTime<Utc>>,
    pub resolve_due_at: Option<DateTime<Utc>>,

    pub first_response_met: bool,
    pub resolve_met: bool,

    /// Present while the SLA clock is paused (customer-waiting)
    pub paused_at: Option<DateTime<Utc>>,

    /// Snapshot of the policy's pause flag at creation time
    pub pause_on_waiting_customer: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Optimistic-concurrency guard, bumped by the store on every update
    pub version: u64,
}

impl SlaTarget {
    pub fn new(
        ticket_id: Uuid,
        policy_id: Uuid,
        first_response_due_at: Option<DateTime<Utc>>,
        resolve_due_at: Option<DateTime<Utc>>,
        pause_on_waiting_customer: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            ticket_id,
            policy_id,
            first_response_due_at,
            resolve_due_at,
            first_response_met: false,
            resolve_met: false,
            paused_at: None,
            pause_on_waiting_customer,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Terminal for scanning purposes; the record itself persists
    pub fn is_settled(&self) -> bool {
        self.resolve_met
    }

    /// Mark the first-response milestone as satisfied. Idempotent;
    /// returns whether anything changed.
    pub fn mark_first_response(&mut self, now: DateTime<Utc>) -> bool {
        if self.first_response_met {
            return false;
        }
        self.first_response_met = true;
        self.updated_at = now;
        true
    }

    /// Mark the resolve milestone as satisfied. Idempotent.
    pub fn mark_resolved(&mut self, now: DateTime<Utc>) -> bool {
        if self.resolve_met {
            return false;
        }
        self.resolve_met = true;
        self.updated_at = now;
        true
    }

    /// Record a pause. No-op when already paused or when the policy does
    /// not pause on customer-waiting; returns whether anything changed.
    pub fn pause(&mut self, now: DateTime<Utc>) -> bool {
        if !self.pause_on_waiting_customer || self.paused_at.is_some() {
            return false;
        }
        self.paused_at = Some(now);
        self.updated_at = now;
        true
    }

    /// Resume from a pause, extending every unmet due instant by the pause
    /// duration. Returns the applied extension, or `None` when not paused.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Option<Duration> {
        let paused_at = self.paused_at.take()?;
        let elapsed = (now - paused_at).max(Duration::zero());

        if !self.first_response_met {
            if let Some(due) = self.first_response_due_at {
                self.first_response_due_at = Some(due + elapsed);
            }
        }
        if !self.resolve_met {
            if let Some(due) = self.resolve_due_at {
                self.resolve_due_at = Some(due + elapsed);
            }
        }

        self.updated_at = now;
        Some(elapsed)
    }
}
