//! Govern Approval: human decisions for runs halted in REVIEW
//!
//! The orchestrator never waits for a human. A REVIEW run is queued here and
//! its decision later becomes a new, superseding run record.

pub mod channel;
pub mod file;
pub mod ticket;

pub use channel::{ApprovalChannel, MemoryApprovalQueue};
pub use file::FileApprovalQueue;
pub use ticket::{ApprovalDecision, ApprovalError, ApprovalTicket, Resolution, TicketStatus};
