//! Rework / Escalation
//!
//! After each review the controller decides whether the draft moves on,
//! goes back for another pass, or the session escalates to a human.

pub mod controller;
pub mod reason;

pub use controller::{ReworkController, ReworkDecision, ReworkPolicy};
pub use reason::{Escalation, EscalationReason};
