//! Quality Gates
//!
//! Turns a reviewer's free-form response into five tagged verdicts and a
//! pass-through / rework / escalate decision:
//!
//! ```text
//! review text ─→ GateMarkerParser (per line) ─→ GateEvaluator ─→ GateResult
//!                                                   │
//!                         first marker wins ────────┤
//!                         missing → Ambiguous ──────┘
//! ```

pub mod evaluator;
pub mod parser;

pub use evaluator::{
    decision_for, DuplicateMarker, GateConfig, GateDecision, GateEvaluator, GateOutcome,
    GateResult, DEFAULT_GATES, GATE_COUNT,
};
pub use parser::{GateMarkerParser, GateParsingAmbiguity, GateVerdict, MarkerLine};
