pub mod event;
pub mod policy;
pub mod target;
pub mod ticket;

pub use event::{BreachKind, EventKind, TicketEvent};
pub use policy::{MatchRule, SlaPolicy};
pub use target::SlaTarget;
pub use ticket::{Priority, Severity, Ticket, TicketKey, TicketStatus};
