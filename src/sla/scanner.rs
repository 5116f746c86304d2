use crate::clock::Clock;
use crate::error::Result;
use crate::events::EventSink;
use crate::models::{BreachKind, EventKind, SlaTarget, TicketEvent};
use crate::store::{TargetStore, TicketStore};
use chrono::Duration;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::sleep;
use uuid::Uuid;

/// Periodic, stateless breach scan. Each run classifies open SLA targets
/// as breached or soon-to-breach and emits one event per (target,
/// milestone) for downstream notification. The scan is read-only: it is
/// the status coordinator, not the scanner, that flips met flags.
///
/// The soon-to-breach set includes already-breached targets; consumers
/// that want one signal dedup on the event fingerprint.
pub struct BreachScanner {
    targets: Arc<dyn TargetStore>,
    tickets: Arc<dyn TicketStore>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,

    /// Seconds between scans
    scan_interval_secs: u64,

    /// Lead time before a due instant counts as soon-to-breach
    warning_horizon: Duration,
}

/// Per-run classification counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub breaches: usize,
    pub warnings: usize,
    pub failures: usize,
}

impl BreachScanner {
    pub fn new(
        targets: Arc<dyn TargetStore>,
        tickets: Arc<dyn TicketStore>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            targets,
            tickets,
            events,
            clock,
            scan_interval_secs: 300, // 5 minutes by default
            warning_horizon: Duration::hours(1),
        }
    }

    pub fn with_scan_interval(mut self, interval_secs: u64) -> Self {
        self.scan_interval_secs = interval_secs;
        self
    }

    pub fn with_warning_horizon(mut self, horizon: Duration) -> Self {
        self.warning_horizon = horizon;
        self
    }

    /// Run the scan loop until shutdown is signalled. A run either
    /// completes fully or is abandoned cleanly before the next tick.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            scan_interval_secs = self.scan_interval_secs,
            warning_horizon_mins = self.warning_horizon.num_minutes(),
            "Starting SLA breach scanner"
        );

        loop {
            match self.scan_once().await {
                Ok(outcome) => {
                    tracing::debug!(
                        breaches = outcome.breaches,
                        warnings = outcome.warnings,
                        failures = outcome.failures,
                        "Breach scan completed"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "Breach scan failed");
                }
            }

            tokio::select! {
                _ = sleep(std::time::Duration::from_secs(self.scan_interval_secs)) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("SLA breach scanner shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// One read-only pass over all open SLA targets. A failure on one
    /// target is logged and never aborts the rest of the run.
    pub async fn scan_once(&self) -> Result<ScanOutcome> {
        let now = self.clock.now();
        let mut outcome = ScanOutcome::default();

        let breached = self.targets.due_unmet(now).await?;
        for target in &breached {
            for (kind, due_at) in overdue_milestones(target, now) {
                match self.emit(target, EventKind::SlaBreach, kind, due_at).await {
                    Ok(()) => outcome.breaches += 1,
                    Err(e) => {
                        outcome.failures += 1;
                        tracing::error!(
                            ticket_id = %target.ticket_id,
                            breach_kind = %kind,
                            error = %e,
                            "Failed to emit breach event"
                        );
                    }
                }
            }
        }

        let at_risk = self.targets.due_within(now, self.warning_horizon).await?;
        for target in &at_risk {
            let limit = now + self.warning_horizon;
            for (kind, due_at) in overdue_milestones(target, limit) {
                match self.emit(target, EventKind::SlaWarning, kind, due_at).await {
                    Ok(()) => outcome.warnings += 1,
                    Err(e) => {
                        outcome.failures += 1;
                        tracing::error!(
                            ticket_id = %target.ticket_id,
                            breach_kind = %kind,
                            error = %e,
                            "Failed to emit warning event"
                        );
                    }
                }
            }
        }

        if outcome.breaches > 0 {
            tracing::warn!(
                breaches = outcome.breaches,
                warnings = outcome.warnings,
                "SLA breaches detected"
            );
        }

        Ok(outcome)
    }

    async fn emit(
        &self,
        target: &SlaTarget,
        event_kind: EventKind,
        breach_kind: BreachKind,
        due_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        let assignee_id = self.assignee_of(&target.ticket_id).await;

        let event = TicketEvent::new(target.ticket_id, event_kind, self.clock.now())
            .with_breach(breach_kind, due_at)
            .with_assignee(assignee_id);

        self.events.enqueue(event).await
    }

    async fn assignee_of(&self, ticket_id: &Uuid) -> Option<Uuid> {
        match self.tickets.get_ticket(ticket_id).await {
            Ok(Some(ticket)) => ticket.assignee_id,
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(
                    ticket_id = %ticket_id,
                    error = %e,
                    "Could not load ticket for event routing"
                );
                None
            }
        }
    }
}

/// Milestones of a target whose due instant is at or before `limit` and
/// whose met flag is still false
fn overdue_milestones(
    target: &SlaTarget,
    limit: chrono::DateTime<chrono::Utc>,
) -> Vec<(BreachKind, chrono::DateTime<chrono::Utc>)> {
    let mut milestones = Vec::new();

    if !target.first_response_met {
        if let Some(due) = target.first_response_due_at {
            if due <= limit {
                milestones.push((BreachKind::FirstResponse, due));
            }
        }
    }
    if !target.resolve_met {
        if let Some(due) = target.resolve_due_at {
            if due <= limit {
                milestones.push((BreachKind::Resolve, due));
            }
        }
    }

    milestones
}
