//! Ticket lifecycle and SLA engine.
//!
//! Allocates human-readable ticket keys, computes first-response and
//! resolve deadlines on a business-hours calendar, tracks their
//! satisfaction through the ticket workflow, and periodically scans for
//! breached and soon-to-breach deadlines.

pub mod business_time;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod keys;
pub mod models;
pub mod sla;
pub mod store;

pub use business_time::{BusinessCalendar, CalendarKind};
pub use clock::{Clock, SystemClock};
pub use coordinator::{NewTicket, TicketChange, TicketCoordinator};
pub use error::{AppError, Result};
pub use keys::{KeyAllocator, KeyScope};
pub use sla::{BreachScanner, SlaTracker};
