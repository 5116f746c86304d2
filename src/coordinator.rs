use crate::clock::Clock;
use crate::error::{AppError, Result};
use crate::events::{CommentWriter, EventSink};
use crate::keys::{KeyAllocator, KeyScope};
use crate::models::{EventKind, Priority, Severity, Ticket, TicketEvent, TicketStatus};
use crate::sla::SlaTracker;
use crate::store::{TicketStore, UserDirectory};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;
use validator::Validate;

/// Request to create a ticket. The key is allocated by the coordinator,
/// never supplied by the caller.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub tenant_id: Uuid,
    pub project_id: Uuid,
    pub project_key: String,
    pub subject: String,
    pub priority: Priority,
    pub severity: Severity,
    pub reporter_id: Uuid,
}

/// Partial update to a ticket. Absent fields are left untouched;
/// `assignee` distinguishes "leave alone" (None) from "set or clear"
/// (Some(Option<Uuid>)).
#[derive(Debug, Clone, Default)]
pub struct TicketChange {
    pub status: Option<TicketStatus>,
    pub assignee: Option<Option<Uuid>>,
    pub priority: Option<Priority>,
    pub severity: Option<Severity>,
}

impl TicketChange {
    pub fn status(mut self, status: TicketStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn assign(mut self, assignee_id: Uuid) -> Self {
        self.assignee = Some(Some(assignee_id));
        self
    }

    pub fn unassign(mut self) -> Self {
        self.assignee = Some(None);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.assignee.is_none()
            && self.priority.is_none()
            && self.severity.is_none()
    }
}

/// Front door for ticket mutations. Validates references before any
/// write (an update is applied whole or not at all), persists the
/// ticket, then runs side effects in a fixed order: audit comments,
/// SLA bookkeeping, events. State is durable before the matching event
/// is enqueued.
///
/// Updates to the same ticket are serialized through a per-ticket lock
/// held across the whole load-apply-persist sequence, so concurrent
/// updates never clobber each other's fields.
pub struct TicketCoordinator {
    tickets: Arc<dyn TicketStore>,
    users: Arc<dyn UserDirectory>,
    allocator: Arc<KeyAllocator>,
    tracker: Arc<SlaTracker>,
    comments: Arc<dyn CommentWriter>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,

    /// Per-ticket critical sections for read-modify-write updates
    ticket_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl TicketCoordinator {
    pub fn new(
        tickets: Arc<dyn TicketStore>,
        users: Arc<dyn UserDirectory>,
        allocator: Arc<KeyAllocator>,
        tracker: Arc<SlaTracker>,
        comments: Arc<dyn CommentWriter>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tickets,
            users,
            allocator,
            tracker,
            comments,
            events,
            clock,
            ticket_locks: DashMap::new(),
        }
    }

    /// Create a ticket: allocate its key, persist it, attach an SLA
    /// target when an active policy applies, then announce it.
    pub async fn create_ticket(&self, request: NewTicket) -> Result<Ticket> {
        let now = self.clock.now();
        let scope = KeyScope::new(request.tenant_id, request.project_key.clone());
        let key = self.allocator.allocate(&scope).await?;

        let ticket = Ticket::new(
            request.tenant_id,
            request.project_id,
            request.project_key,
            key,
            request.subject,
            request.priority,
            request.severity,
            request.reporter_id,
            now,
        );
        ticket.validate()?;

        self.tickets.save_ticket(&ticket).await?;
        self.tracker.create_for_ticket(&ticket).await?;

        self.events
            .enqueue(TicketEvent::new(ticket.id, EventKind::Created, now))
            .await?;

        tracing::info!(
            ticket_id = %ticket.id,
            key = %ticket.key,
            priority = %ticket.priority,
            "Ticket created"
        );

        Ok(ticket)
    }

    /// Apply a partial update. Reference checks run before any write, so
    /// a bad assignee rejects the whole update, including an otherwise
    /// valid status change in the same request. The per-ticket lock is
    /// held from load to persist; a concurrent update on the same ticket
    /// waits and then observes the fresh state.
    pub async fn apply_update(&self, ticket_id: &Uuid, change: TicketChange) -> Result<Ticket> {
        let lock = self
            .ticket_locks
            .entry(*ticket_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let mut ticket = self
            .tickets
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Ticket {} not found", ticket_id)))?;

        if let Some(Some(assignee_id)) = change.assignee {
            if !self.users.user_exists(&assignee_id).await? {
                return Err(AppError::InvalidReference(format!(
                    "Assignee {} does not exist",
                    assignee_id
                )));
            }
        }

        let old_status = ticket.status;
        let old_assignee = ticket.assignee_id;
        let old_priority = ticket.priority;
        let old_severity = ticket.severity;

        if let Some(status) = change.status {
            ticket.status = status;
        }
        if let Some(assignee) = change.assignee {
            ticket.assignee_id = assignee;
        }
        if let Some(priority) = change.priority {
            ticket.priority = priority;
        }
        if let Some(severity) = change.severity {
            ticket.severity = severity;
        }

        let status_changed = ticket.status != old_status;
        let assignee_changed = ticket.assignee_id != old_assignee;
        let priority_changed = ticket.priority != old_priority;
        let severity_changed = ticket.severity != old_severity;

        // Setting a field to its current value is not a change
        if !status_changed && !assignee_changed && !priority_changed && !severity_changed {
            return Ok(ticket);
        }

        let now = self.clock.now();
        ticket.updated_at = now;
        self.tickets.update_ticket(&ticket).await?;

        if assignee_changed {
            let body = match ticket.assignee_id {
                Some(assignee_id) => format!("assigned to {}", assignee_id),
                None => "unassigned".to_string(),
            };
            self.comments
                .add_comment(ticket.id, None, body, true, now)
                .await?;

            if let Some(assignee_id) = ticket.assignee_id {
                self.events
                    .enqueue(
                        TicketEvent::new(ticket.id, EventKind::Assigned, now)
                            .with_assignee(Some(assignee_id)),
                    )
                    .await?;
            }
        }

        if status_changed {
            self.comments
                .add_comment(
                    ticket.id,
                    None,
                    format!("status changed from {} to {}", old_status, ticket.status),
                    true,
                    now,
                )
                .await?;

            self.tracker
                .on_status_change(&ticket.id, old_status, ticket.status)
                .await?;
        }

        self.events
            .enqueue(
                TicketEvent::new(ticket.id, EventKind::Updated, now)
                    .with_assignee(ticket.assignee_id),
            )
            .await?;

        tracing::info!(
            ticket_id = %ticket.id,
            status = %ticket.status,
            status_changed = status_changed,
            assignee_changed = assignee_changed,
            "Ticket updated"
        );

        Ok(ticket)
    }

    /// Record a comment on a ticket. The first public comment from
    /// someone other than the reporter satisfies the first-response
    /// milestone.
    pub async fn add_comment(
        &self,
        ticket_id: &Uuid,
        author_id: Uuid,
        body: String,
        is_internal: bool,
    ) -> Result<()> {
        let ticket = self
            .tickets
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Ticket {} not found", ticket_id)))?;

        let now = self.clock.now();
        self.comments
            .add_comment(ticket.id, Some(author_id), body, is_internal, now)
            .await?;

        if !is_internal && author_id != ticket.reporter_id {
            self.tracker.record_first_response(&ticket.id).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::business_time::BusinessCalendar;
    use crate::clock::ManualClock;
    use crate::events::{ChannelEventSink, InMemoryCommentLog};
    use crate::models::{MatchRule, SlaPolicy, TicketKey};
    use crate::store::{InMemoryStore, PolicyStore, TargetStore};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use tokio::sync::mpsc;

    struct Fixture {
        coordinator: TicketCoordinator,
        store: Arc<InMemoryStore>,
        comments: Arc<InMemoryCommentLog>,
        events: mpsc::Receiver<TicketEvent>,
        clock: Arc<ManualClock>,
        tenant_id: Uuid,
    }

    async fn fixture(now: DateTime<Utc>) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(now));
        let comments = Arc::new(InMemoryCommentLog::new());
        let (sink, events) = ChannelEventSink::new(64);
        let sink = Arc::new(sink);

        let tenant_id = Uuid::new_v4();
        let policy = SlaPolicy::new(
            tenant_id,
            "Default",
            MatchRule::PriorityIn {
                priorities: vec![Priority::P1, Priority::P2, Priority::P3, Priority::P4],
            },
            30,
            240,
            0,
            now,
        );
        store.save_policy(&policy).await.unwrap();

        let tracker = Arc::new(SlaTracker::new(
            store.clone(),
            store.clone(),
            BusinessCalendar::default(),
            clock.clone(),
        ));
        let allocator = Arc::new(KeyAllocator::new(store.clone()));

        let coordinator = TicketCoordinator::new(
            store.clone(),
            store.clone(),
            allocator,
            tracker,
            comments.clone(),
            sink,
            clock.clone(),
        );

        Fixture {
            coordinator,
            store,
            comments,
            events,
            clock,
            tenant_id,
        }
    }

    fn new_ticket(tenant_id: Uuid, priority: Priority) -> NewTicket {
        NewTicket {
            tenant_id,
            project_id: Uuid::new_v4(),
            project_key: "HELP".to_string(),
            subject: "Printer on fire".to_string(),
            priority,
            severity: Severity::High,
            reporter_id: Uuid::new_v4(),
        }
    }

    // Monday inside business hours
    fn monday_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_create_allocates_key_target_and_event() {
        let mut fx = fixture(monday_noon()).await;

        let ticket = fx
            .coordinator
            .create_ticket(new_ticket(fx.tenant_id, Priority::P2))
            .await
            .unwrap();

        assert_eq!(ticket.key.to_string(), "HELP-0001");
        assert_eq!(ticket.status, TicketStatus::New);

        let target = fx.store.get_target(&ticket.id).await.unwrap().unwrap();
        assert!(target.first_response_due_at.is_some());
        assert!(target.resolve_due_at.is_some());

        let event = fx.events.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::Created);
        assert_eq!(event.ticket_id, ticket.id);

        let second = fx
            .coordinator
            .create_ticket(new_ticket(fx.tenant_id, Priority::P3))
            .await
            .unwrap();
        assert_eq!(second.key.to_string(), "HELP-0002");
    }

    #[tokio::test]
    async fn test_update_unknown_ticket_is_not_found() {
        let fx = fixture(monday_noon()).await;

        let err = fx
            .coordinator
            .apply_update(&Uuid::new_v4(), TicketChange::default().status(TicketStatus::Triaged))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_unknown_assignee_rejects_whole_update() {
        let mut fx = fixture(monday_noon()).await;
        let ticket = fx
            .coordinator
            .create_ticket(new_ticket(fx.tenant_id, Priority::P3))
            .await
            .unwrap();
        fx.events.recv().await.unwrap();

        let change = TicketChange::default()
            .status(TicketStatus::InProgress)
            .assign(Uuid::new_v4());
        let err = fx.coordinator.apply_update(&ticket.id, change).await.unwrap_err();
        assert_eq!(err.error_code(), "INVALID_REFERENCE");

        // Nothing was written: the valid status change in the same
        // request is rejected along with the bad assignee
        let stored = fx.store.get_ticket(&ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::New);
        assert!(stored.assignee_id.is_none());
        assert_eq!(stored.updated_at, ticket.updated_at);
        assert!(fx.events.try_recv().is_err());
        assert!(fx.comments.comments_for(&ticket.id).is_empty());
    }

    #[tokio::test]
    async fn test_assignment_writes_comment_and_events() {
        let mut fx = fixture(monday_noon()).await;
        let ticket = fx
            .coordinator
            .create_ticket(new_ticket(fx.tenant_id, Priority::P3))
            .await
            .unwrap();
        fx.events.recv().await.unwrap();

        let agent_id = Uuid::new_v4();
        fx.store.add_user(agent_id);

        let updated = fx
            .coordinator
            .apply_update(&ticket.id, TicketChange::default().assign(agent_id))
            .await
            .unwrap();
        assert_eq!(updated.assignee_id, Some(agent_id));

        let comments = fx.comments.comments_for(&ticket.id);
        assert_eq!(comments.len(), 1);
        assert!(comments[0].author_id.is_none());
        assert_eq!(comments[0].body, format!("assigned to {}", agent_id));

        let assigned = fx.events.recv().await.unwrap();
        assert_eq!(assigned.kind, EventKind::Assigned);
        assert_eq!(assigned.assignee_id, Some(agent_id));
        let updated_event = fx.events.recv().await.unwrap();
        assert_eq!(updated_event.kind, EventKind::Updated);
    }

    #[tokio::test]
    async fn test_unassignment_comments_without_assigned_event() {
        let mut fx = fixture(monday_noon()).await;
        let ticket = fx
            .coordinator
            .create_ticket(new_ticket(fx.tenant_id, Priority::P3))
            .await
            .unwrap();
        fx.events.recv().await.unwrap();

        let agent_id = Uuid::new_v4();
        fx.store.add_user(agent_id);
        fx.coordinator
            .apply_update(&ticket.id, TicketChange::default().assign(agent_id))
            .await
            .unwrap();
        fx.events.recv().await.unwrap();
        fx.events.recv().await.unwrap();

        let updated = fx
            .coordinator
            .apply_update(&ticket.id, TicketChange::default().unassign())
            .await
            .unwrap();
        assert!(updated.assignee_id.is_none());

        let comments = fx.comments.comments_for(&ticket.id);
        assert_eq!(comments.last().unwrap().body, "unassigned");

        // Clearing the assignee raises only the generic updated event
        let event = fx.events.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::Updated);
        assert!(fx.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_status_change_comments_and_drives_sla() {
        let mut fx = fixture(monday_noon()).await;
        let ticket = fx
            .coordinator
            .create_ticket(new_ticket(fx.tenant_id, Priority::P3))
            .await
            .unwrap();
        fx.events.recv().await.unwrap();

        fx.coordinator
            .apply_update(
                &ticket.id,
                TicketChange::default().status(TicketStatus::WaitingCustomer),
            )
            .await
            .unwrap();

        let comments = fx.comments.comments_for(&ticket.id);
        assert_eq!(
            comments.last().unwrap().body,
            "status changed from New to WaitingCustomer"
        );

        let target = fx.store.get_target(&ticket.id).await.unwrap().unwrap();
        assert!(target.is_paused());
    }

    #[tokio::test]
    async fn test_resolution_satisfies_resolve_milestone() {
        let mut fx = fixture(monday_noon()).await;
        let ticket = fx
            .coordinator
            .create_ticket(new_ticket(fx.tenant_id, Priority::P2))
            .await
            .unwrap();
        fx.events.recv().await.unwrap();

        fx.clock.advance(chrono::Duration::minutes(90));
        fx.coordinator
            .apply_update(&ticket.id, TicketChange::default().status(TicketStatus::Resolved))
            .await
            .unwrap();

        let target = fx.store.get_target(&ticket.id).await.unwrap().unwrap();
        assert!(target.resolve_met);
        assert_eq!(target.updated_at, fx.clock.now());
    }

    #[tokio::test]
    async fn test_empty_change_writes_nothing() {
        let mut fx = fixture(monday_noon()).await;
        let ticket = fx
            .coordinator
            .create_ticket(new_ticket(fx.tenant_id, Priority::P4))
            .await
            .unwrap();
        fx.events.recv().await.unwrap();

        let unchanged = fx
            .coordinator
            .apply_update(&ticket.id, TicketChange::default())
            .await
            .unwrap();
        assert_eq!(unchanged.updated_at, ticket.updated_at);
        assert!(fx.events.try_recv().is_err());
    }

    /// TicketStore wrapper that yields on every read and write, so two
    /// unsynchronized read-modify-write updaters would interleave and
    /// the later write would discard the earlier one's fields.
    struct YieldingStore {
        inner: Arc<InMemoryStore>,
    }

    #[async_trait]
    impl crate::store::TicketStore for YieldingStore {
        async fn save_ticket(&self, ticket: &crate::models::Ticket) -> crate::error::Result<()> {
            self.inner.save_ticket(ticket).await
        }

        async fn get_ticket(
            &self,
            id: &Uuid,
        ) -> crate::error::Result<Option<crate::models::Ticket>> {
            tokio::task::yield_now().await;
            self.inner.get_ticket(id).await
        }

        async fn update_ticket(&self, ticket: &crate::models::Ticket) -> crate::error::Result<()> {
            tokio::task::yield_now().await;
            self.inner.update_ticket(ticket).await
        }

        async fn max_key_sequence(
            &self,
            tenant_id: &Uuid,
            project_key: &str,
        ) -> crate::error::Result<Option<u64>> {
            self.inner.max_key_sequence(tenant_id, project_key).await
        }

        async fn key_exists(&self, key: &TicketKey) -> crate::error::Result<bool> {
            self.inner.key_exists(key).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_updates_to_same_ticket_keep_both_changes() {
        let now = monday_noon();
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(now));
        let comments = Arc::new(InMemoryCommentLog::new());
        let (sink, _events) = ChannelEventSink::new(64);

        let tenant_id = Uuid::new_v4();
        let policy = SlaPolicy::new(
            tenant_id,
            "Default",
            MatchRule::PriorityIn {
                priorities: vec![Priority::P1, Priority::P2, Priority::P3, Priority::P4],
            },
            30,
            240,
            0,
            now,
        );
        store.save_policy(&policy).await.unwrap();

        let tracker = Arc::new(SlaTracker::new(
            store.clone(),
            store.clone(),
            BusinessCalendar::default(),
            clock.clone(),
        ));
        let coordinator = TicketCoordinator::new(
            Arc::new(YieldingStore {
                inner: store.clone(),
            }),
            store.clone(),
            Arc::new(KeyAllocator::new(store.clone())),
            tracker,
            comments,
            Arc::new(sink),
            clock,
        );

        let ticket = coordinator
            .create_ticket(new_ticket(tenant_id, Priority::P3))
            .await
            .unwrap();

        // One updater changes the status, the other the severity; both
        // field changes must survive regardless of ordering
        let (status_result, severity_result) = tokio::join!(
            coordinator.apply_update(
                &ticket.id,
                TicketChange::default().status(TicketStatus::Triaged)
            ),
            coordinator.apply_update(
                &ticket.id,
                TicketChange::default().severity(Severity::Critical)
            ),
        );
        status_result.unwrap();
        severity_result.unwrap();

        let stored = store.get_ticket(&ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::Triaged);
        assert_eq!(stored.severity, Severity::Critical);
    }

    #[tokio::test]
    async fn test_setting_current_values_is_not_a_change() {
        let mut fx = fixture(monday_noon()).await;
        let ticket = fx
            .coordinator
            .create_ticket(new_ticket(fx.tenant_id, Priority::P3))
            .await
            .unwrap();
        fx.events.recv().await.unwrap();

        fx.clock.advance(chrono::Duration::minutes(5));
        let unchanged = fx
            .coordinator
            .apply_update(
                &ticket.id,
                TicketChange::default()
                    .priority(Priority::P3)
                    .severity(Severity::High),
            )
            .await
            .unwrap();

        // Same values: nothing persisted, no event, no timestamp bump
        assert_eq!(unchanged.updated_at, ticket.updated_at);
        let stored = fx.store.get_ticket(&ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.updated_at, ticket.updated_at);
        assert!(fx.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_public_agent_comment_meets_first_response() {
        let mut fx = fixture(monday_noon()).await;
        let ticket = fx
            .coordinator
            .create_ticket(new_ticket(fx.tenant_id, Priority::P2))
            .await
            .unwrap();
        fx.events.recv().await.unwrap();

        // Internal note does not count
        let agent_id = Uuid::new_v4();
        fx.coordinator
            .add_comment(&ticket.id, agent_id, "looking".to_string(), true)
            .await
            .unwrap();
        let target = fx.store.get_target(&ticket.id).await.unwrap().unwrap();
        assert!(!target.first_response_met);

        // Reporter's own public comment does not count either
        fx.coordinator
            .add_comment(&ticket.id, ticket.reporter_id, "any news?".to_string(), false)
            .await
            .unwrap();
        let target = fx.store.get_target(&ticket.id).await.unwrap().unwrap();
        assert!(!target.first_response_met);

        fx.coordinator
            .add_comment(&ticket.id, agent_id, "on it".to_string(), false)
            .await
            .unwrap();
        let target = fx.store.get_target(&ticket.id).await.unwrap().unwrap();
        assert!(target.first_response_met);
    }
}
