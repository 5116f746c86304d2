use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ticket::{Priority, Severity, Ticket};
use crate::error::{AppError, Result};

/// Service-level-agreement policy. The matching rule is stored as a raw
/// document and parsed lazily, so a malformed rule on one policy never
/// prevents other policies from matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaPolicy {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,

    /// Serialized matching rule (see [`MatchRule`])
    pub rule: serde_json::Value,

    /// First-response target in minutes
    pub first_response_minutes: i64,

    /// Resolve target in minutes
    pub resolve_minutes: i64,

    /// Whether the SLA clock pauses while the ticket waits on the customer
    pub pause_on_waiting_customer: bool,

    pub active: bool,

    /// Stable ordering for matching: lowest position wins first
    pub position: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SlaPolicy {
    pub fn new(
        tenant_id: Uuid,
        name: impl Into<String>,
        rule: MatchRule,
        first_response_minutes: i64,
        resolve_minutes: i64,
        position: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.into(),
            rule: serde_json::to_value(&rule).expect("rule serialization is infallible"),
            first_response_minutes,
            resolve_minutes,
            pause_on_waiting_customer: true,
            active: true,
            position,
            created_at: now,
            updated_at: now,
        }
    }

    /// Parse the stored rule document
    pub fn parsed_rule(&self) -> Result<MatchRule> {
        serde_json::from_value(self.rule.clone()).map_err(|e| AppError::MalformedPolicy {
            policy_id: self.id.to_string(),
            message: e.to_string(),
        })
    }
}

/// Extensible ticket-matching rule. New variants can be added without
/// breaking rules already stored on existing policies; unknown documents
/// fail the parse and the policy is skipped during matching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchRule {
    /// Applies when the ticket priority is in the given set
    PriorityIn { priorities: Vec<Priority> },

    /// Applies when the ticket severity is in the given set
    SeverityIn { severities: Vec<Severity> },

    /// Applies when any sub-rule applies
    Any { rules: Vec<MatchRule> },

    /// Applies when every sub-rule applies
    All { rules: Vec<MatchRule> },
}

impl MatchRule {
    /// Evaluate the rule against a ticket's attributes
    pub fn matches(&self, ticket: &Ticket) -> bool {
        match self {
            MatchRule::PriorityIn { priorities } => priorities.contains(&ticket.priority),
            MatchRule::SeverityIn { severities } => severities.contains(&ticket.severity),
            MatchRule::Any { rules } => rules.iter().any(|r| r.matches(ticket)),
            MatchRule::All { rules } => rules.iter().all(|r| r.matches(ticket)),
        }
    }
}
