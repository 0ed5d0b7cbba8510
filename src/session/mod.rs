//! Diagnostic sessions.
//!
//! - [`machine`]: the stage state machine driving one session
//! - [`progress`]: stage budgets and progress derivation
//! - [`service`]: persistence, ownership checks and per-session exclusion

pub mod machine;
pub mod progress;
pub mod service;

pub use machine::{Association, SessionMachine, TurnOutcome};
pub use service::{
    ConfirmationView, CreateSessionRequest, CreatedSession, SessionService, SessionSummary,
    SessionView, TurnView,
};
