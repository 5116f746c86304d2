use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Event emitted to the downstream notification sink. The engine's own
/// state is durable before any event is enqueued; delivery is
/// at-least-once and consumers dedup via [`TicketEvent::fingerprint`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketEvent {
    pub ticket_id: Uuid,
    pub kind: EventKind,

    /// Which SLA milestone the event refers to, for breach/warning kinds
    pub breach_kind: Option<BreachKind>,

    /// Assignee at emission time, when relevant for routing
    pub assignee_id: Option<Uuid>,

    pub emitted_at: DateTime<Utc>,

    pub payload: serde_json::Value,
}

impl TicketEvent {
    pub fn new(ticket_id: Uuid, kind: EventKind, emitted_at: DateTime<Utc>) -> Self {
        Self {
            ticket_id,
            kind,
            breach_kind: None,
            assignee_id: None,
            emitted_at,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_breach(mut self, breach_kind: BreachKind, due_at: DateTime<Utc>) -> Self {
        self.breach_kind = Some(breach_kind);
        self.payload = serde_json::json!({ "due_at": due_at });
        self
    }

    pub fn with_assignee(mut self, assignee_id: Option<Uuid>) -> Self {
        self.assignee_id = assignee_id;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Deduplication key for downstream consumers: stable across repeated
    /// scans of the same (ticket, milestone, due instant).
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.ticket_id.as_bytes());
        hasher.update(self.kind.to_string().as_bytes());
        if let Some(ref breach_kind) = self.breach_kind {
            hasher.update(breach_kind.to_string().as_bytes());
        }
        if let Some(due_at) = self.payload.get("due_at").and_then(|v| v.as_str()) {
            hasher.update(due_at.as_bytes());
        }

        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    Created,
    Updated,
    Assigned,
    SlaBreach,
    SlaWarning,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BreachKind {
    FirstResponse,
    Resolve,
}
