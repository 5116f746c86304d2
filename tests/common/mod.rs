//! Shared fixture for integration tests: an engine wired against the
//! in-memory store with a manually driven clock.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use ticket_sla_engine::business_time::BusinessCalendar;
use ticket_sla_engine::clock::ManualClock;
use ticket_sla_engine::coordinator::{NewTicket, TicketCoordinator};
use ticket_sla_engine::events::{ChannelEventSink, InMemoryCommentLog};
use ticket_sla_engine::keys::KeyAllocator;
use ticket_sla_engine::models::{MatchRule, Priority, Severity, SlaPolicy, TicketEvent};
use ticket_sla_engine::sla::{BreachScanner, SlaTracker};
use ticket_sla_engine::store::{InMemoryStore, PolicyStore};
use tokio::sync::mpsc;
use uuid::Uuid;

pub struct Harness {
    pub coordinator: TicketCoordinator,
    pub scanner: BreachScanner,
    pub store: Arc<InMemoryStore>,
    pub comments: Arc<InMemoryCommentLog>,
    pub clock: Arc<ManualClock>,
    pub events: mpsc::Receiver<TicketEvent>,
    pub tenant_id: Uuid,
}

impl Harness {
    pub fn new_ticket(&self, priority: Priority) -> NewTicket {
        NewTicket {
            tenant_id: self.tenant_id,
            project_id: Uuid::new_v4(),
            project_key: "HELP".to_string(),
            subject: "VPN down".to_string(),
            priority,
            severity: Severity::High,
            reporter_id: Uuid::new_v4(),
        }
    }

    /// Discard everything currently queued on the event channel
    pub fn drain_events(&mut self) -> Vec<TicketEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}

/// Monday 2024-06-03 12:00 UTC, inside the default business window
pub fn monday_noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
}

/// Saturday 2024-06-01 12:00 UTC, outside business days
pub fn saturday_noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Engine with two active policies: a tight P1 policy first, then a
/// catch-all (30 min first response, 240 min resolve, pauses on
/// customer-waiting).
pub async fn harness(start: DateTime<Utc>) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(start));
    let comments = Arc::new(InMemoryCommentLog::new());
    let (sink, events) = ChannelEventSink::new(256);
    let sink = Arc::new(sink);

    let tenant_id = Uuid::new_v4();
    let p1 = SlaPolicy::new(
        tenant_id,
        "Critical",
        MatchRule::PriorityIn {
            priorities: vec![Priority::P1],
        },
        15,
        120,
        0,
        start,
    );
    let catch_all = SlaPolicy::new(
        tenant_id,
        "Standard",
        MatchRule::PriorityIn {
            priorities: vec![Priority::P2, Priority::P3, Priority::P4],
        },
        30,
        240,
        1,
        start,
    );
    store.save_policy(&p1).await.unwrap();
    store.save_policy(&catch_all).await.unwrap();

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
        sink.clone(),
        clock.clone(),
    );

    let scanner = BreachScanner::new(store.clone(), store.clone(), sink, clock.clone());

    Harness {
        coordinator,
        scanner,
        store,
        comments,
        clock,
        events,
        tenant_id,
    }
}
