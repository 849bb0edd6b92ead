//! Editorial Board Voting
//!
//! Decides, once per topic and before any content is generated, whether the
//! topic proceeds. [`Board`] gathers one scored opinion per persona;
//! [`VotingAggregator`] turns them into a [`BoardDecision`].
//!
//! # Decision rule
//!
//! ```text
//! any veto ───────────────────────────────→ reject (composite 0)
//! composite = Σ(score × weight) / Σ(weight)
//! composite ≥ threshold ──────────────────→ accept
//! |composite − threshold| ≤ ε  and
//!   ≥ 2 scores below floor ───────────────→ reject (floor violation)
//! ```

pub mod aggregator;
pub mod board;

pub use aggregator::{
    BoardDecision, Decision, PersonaSpec, Vote, VotingAggregator, VotingConfig,
    FLOOR_VIOLATION_REASON,
};
pub use board::{Board, BoardError, BoardOutcome};
