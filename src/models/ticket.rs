use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum::{Display, EnumString};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;

/// Human-readable ticket identifier of the form `<PROJECT>-<sequence>`,
/// with a zero-padded, strictly increasing sequence per numbering scope.
/// Immutable once assigned; globally unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TicketKey {
    prefix: String,
    sequence: u64,
    pad_width: usize,
}

impl TicketKey {
    pub fn new(prefix: impl Into<String>, sequence: u64, pad_width: usize) -> Self {
        Self {
            prefix: prefix.into(),
            sequence,
            pad_width,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for TicketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:0width$}",
            self.prefix,
            self.sequence,
            width = self.pad_width
        )
    }
}

impl FromStr for TicketKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, digits) = s
            .rsplit_once('-')
            .ok_or_else(|| AppError::Validation(format!("Malformed ticket key: {}", s)))?;

        if prefix.is_empty() || digits.is_empty() {
            return Err(AppError::Validation(format!("Malformed ticket key: {}", s)));
        }

        let sequence: u64 = digits
            .parse()
            .map_err(|_| AppError::Validation(format!("Malformed ticket key: {}", s)))?;

        Ok(Self {
            prefix: prefix.to_string(),
            sequence,
            pad_width: digits.len(),
        })
    }
}

impl TryFrom<String> for TicketKey {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TicketKey> for String {
    fn from(key: TicketKey) -> Self {
        key.to_string()
    }
}

/// Priority, P1 (highest urgency) to P4 (lowest).
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, EnumString, Display,
)]
pub enum Priority {
    P1,
    P2,
    P3,
    P4,
}

impl Priority {
    /// P1 deadlines accrue around the clock; every other priority is
    /// constrained to business hours. Deliberate business rule.
    pub fn is_always_on(&self) -> bool {
        matches!(self, Priority::P1)
    }
}

/// Impact severity, orthogonal to priority
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

/// Ticket workflow status. Transitions are unrestricted at the data-model
/// level; specific transitions carry side effects applied by the coordinator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
pub enum TicketStatus {
    New,
    Triaged,
    InProgress,
    WaitingCustomer,
    Resolved,
    Closed,
    Cancelled,
}

impl TicketStatus {
    /// Statuses that satisfy the resolve milestone
    pub fn is_resolution(&self) -> bool {
        matches!(self, TicketStatus::Resolved | TicketStatus::Closed)
    }

    pub fn is_waiting_customer(&self) -> bool {
        matches!(self, TicketStatus::WaitingCustomer)
    }

    pub fn is_open(&self) -> bool {
        !matches!(
            self,
            TicketStatus::Resolved | TicketStatus::Closed | TicketStatus::Cancelled
        )
    }
}

/// A support ticket (the subset of fields the lifecycle engine owns)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Ticket {
    /// Unique identifier
    pub id: Uuid,

    /// Owning tenant
    pub tenant_id: Uuid,

    /// Owning project
    pub project_id: Uuid,

    /// Project key used as the numbering prefix
    #[validate(length(min = 1, max = 16))]
    pub project_key: String,

    /// Human-readable key, allocated once at creation
    pub key: TicketKey,

    /// Short summary
    #[validate(length(min = 1, max = 500))]
    pub subject: String,

    pub priority: Priority,

    pub status: TicketStatus,

    pub severity: Severity,

    /// Reporting user
    pub reporter_id: Uuid,

    /// Assigned agent, if any
    pub assignee_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Create a new ticket with an already-allocated key
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: Uuid,
        project_id: Uuid,
        project_key: String,
        key: TicketKey,
        subject: String,
        priority: Priority,
        severity: Severity,
        reporter_id: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            project_id,
            project_key,
            key,
            subject,
            priority,
            status: TicketStatus::New,
            severity,
            reporter_id,
            assignee_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}
