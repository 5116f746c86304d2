//! Breach scanning against tickets driven through the coordinator.

mod common;

use chrono::Duration;
use common::{harness, monday_noon};
use ticket_sla_engine::coordinator::TicketChange;
use ticket_sla_engine::models::{BreachKind, EventKind, Priority, TicketStatus};
use ticket_sla_engine::store::TargetStore;

#[tokio::test]
async fn test_scan_reports_breach_after_deadline_passes() {
    let mut fx = harness(monday_noon()).await;
    let ticket = fx
        .coordinator
        .create_ticket(fx.new_ticket(Priority::P2))
        .await
        .unwrap();
    fx.drain_events();

    // Nothing due yet
    let outcome = fx.scanner.scan_once().await.unwrap();
    assert_eq!(outcome.breaches, 0);

    // First response was due at 12:30; at 13:00 it is breached and the
    // 16:00 resolve deadline sits outside the one-hour warning horizon
    fx.clock.set(monday_noon() + Duration::hours(1));
    let outcome = fx.scanner.scan_once().await.unwrap();
    assert_eq!(outcome.breaches, 1);

    let events = fx.drain_events();
    let breach = events
        .iter()
        .find(|e| e.kind == EventKind::SlaBreach)
        .unwrap();
    assert_eq!(breach.ticket_id, ticket.id);
    assert_eq!(breach.breach_kind, Some(BreachKind::FirstResponse));
}

#[tokio::test]
async fn test_scan_warns_inside_horizon_with_stable_fingerprint() {
    let mut fx = harness(monday_noon()).await;
    let ticket = fx
        .coordinator
        .create_ticket(fx.new_ticket(Priority::P2))
        .await
        .unwrap();
    fx.drain_events();

    // 12:05: first response due 12:30 is inside the one-hour horizon,
    // not yet breached
    fx.clock.advance(Duration::minutes(5));
    let outcome = fx.scanner.scan_once().await.unwrap();
    assert_eq!(outcome.breaches, 0);
    assert_eq!(outcome.warnings, 1);

    let first = fx
        .drain_events()
        .into_iter()
        .find(|e| e.kind == EventKind::SlaWarning)
        .unwrap();
    assert_eq!(first.ticket_id, ticket.id);

    // A later scan of the same unmet milestone carries the same
    // fingerprint, so downstream consumers collapse the repeats
    fx.clock.advance(Duration::minutes(5));
    fx.scanner.scan_once().await.unwrap();
    let second = fx
        .drain_events()
        .into_iter()
        .find(|e| e.kind == EventKind::SlaWarning)
        .unwrap();
    assert_eq!(first.fingerprint(), second.fingerprint());
}

#[tokio::test]
async fn test_met_milestones_stop_being_reported() {
    let mut fx = harness(monday_noon()).await;
    let ticket = fx
        .coordinator
        .create_ticket(fx.new_ticket(Priority::P2))
        .await
        .unwrap();
    fx.drain_events();

    // Resolve the ticket before any deadline, then jump past both
    fx.coordinator
        .apply_update(&ticket.id, TicketChange::default().status(TicketStatus::Resolved))
        .await
        .unwrap();
    fx.drain_events();

    // The resolve milestone is met, but the first response never
    // happened: only that milestone keeps firing
    fx.clock.set(monday_noon() + Duration::hours(5));
    let outcome = fx.scanner.scan_once().await.unwrap();
    assert_eq!(outcome.breaches, 1);

    let events = fx.drain_events();
    for event in events {
        assert_eq!(event.breach_kind, Some(BreachKind::FirstResponse));
    }
}

#[tokio::test]
async fn test_paused_ticket_does_not_breach_during_pause() {
    let mut fx = harness(monday_noon()).await;
    let ticket = fx
        .coordinator
        .create_ticket(fx.new_ticket(Priority::P2))
        .await
        .unwrap();

    // Pause immediately, wait out what would have been the whole first
    // response window, then resume: the extension keeps the deadline
    // ahead of the clock
    fx.coordinator
        .apply_update(
            &ticket.id,
            TicketChange::default().status(TicketStatus::WaitingCustomer),
        )
        .await
        .unwrap();
    fx.clock.advance(Duration::hours(2));
    fx.coordinator
        .apply_update(
            &ticket.id,
            TicketChange::default().status(TicketStatus::InProgress),
        )
        .await
        .unwrap();
    fx.drain_events();

    let outcome = fx.scanner.scan_once().await.unwrap();
    assert_eq!(outcome.breaches, 0);

    let target = fx.store.get_target(&ticket.id).await.unwrap().unwrap();
    assert_eq!(
        target.first_response_due_at.unwrap(),
        monday_noon() + Duration::minutes(150)
    );
}
