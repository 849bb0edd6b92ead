//! Regression: repeated gate markers must never change the outcome count.
//!
//! Reviewers restate verdicts ("sourcing: FAIL" in a summary and again in a
//! checklist). Each repeat has to be ignored, not appended as a sixth result.

use coordination::{GateConfig, GateDecision, GateEvaluator, GateVerdict};

const GATES: [&str; 5] = [
    "structure",
    "sourcing",
    "voice",
    "data-integrity",
    "export-readiness",
];

fn evaluator() -> GateEvaluator {
    GateEvaluator::new(&GateConfig::default()).unwrap()
}

fn review_with_repeats(gate: &str, verdict: &str, repeats: usize) -> String {
    let mut lines: Vec<String> = GATES
        .iter()
        .filter(|g| **g != gate)
        .map(|g| format!("{g}: PASS"))
        .collect();
    for i in 0..repeats {
        lines.push(format!("{gate}: {verdict} - mention {i}"));
    }
    lines.join("\n")
}

#[test]
fn test_repeat_counts_always_yield_five_outcomes() {
    let evaluator = evaluator();
    for gate in GATES {
        for repeats in [0, 1, 2, 5] {
            let result = evaluator.evaluate(&review_with_repeats(gate, "FAIL", repeats));
            assert_eq!(result.outcomes.len(), 5, "{gate} × {repeats}");

            let outcome = result.outcome(gate).unwrap();
            let expected = if repeats == 0 {
                GateVerdict::Ambiguous
            } else {
                GateVerdict::Fail
            };
            assert_eq!(outcome.verdict, expected, "{gate} × {repeats}");
            assert_eq!(result.pass_count, 4);
            assert_eq!(result.decision, GateDecision::Rework);

            let duplicates = result.duplicates.iter().find(|d| d.gate == gate);
            match repeats {
                0 | 1 => assert!(duplicates.is_none()),
                n => {
                    let dup = duplicates.unwrap();
                    assert_eq!(dup.occurrences, n);
                    assert_eq!(dup.ignored_lines.len(), n - 1);
                }
            }
        }
    }
}

#[test]
fn test_first_marker_wins_over_later_contradiction() {
    let review = "\
structure: PASS
sourcing: PASS
voice: PASS
data-integrity: PASS
export-readiness: PASS

Checklist:
- sourcing: FAIL
- voice: FAIL";
    let result = evaluator().evaluate(review);
    assert_eq!(result.outcomes.len(), 5);
    assert_eq!(result.pass_count, 5);
    assert_eq!(result.decision, GateDecision::PassThrough);
    assert_eq!(result.duplicates.len(), 2);
}

#[test]
fn test_every_gate_repeated_five_times() {
    let mut review = String::new();
    for round in 0..5 {
        for gate in GATES {
            review.push_str(&format!("{gate}: PASS (round {round})\n"));
        }
    }
    let result = evaluator().evaluate(&review);
    assert_eq!(result.outcomes.len(), 5);
    assert_eq!(result.pass_count, 5);
    assert_eq!(result.duplicates.len(), 5);
    assert!(result.duplicates.iter().all(|d| d.occurrences == 5));
}

#[test]
fn test_unrelated_text_is_not_a_marker() {
    let review = "\
The sourcing of this piece is thin and I would not pass it yet.
structure: PASS
voice: PASS";
    let result = evaluator().evaluate(review);
    assert_eq!(result.outcomes.len(), 5);
    assert_eq!(result.outcome("sourcing").unwrap().verdict, GateVerdict::Ambiguous);
    assert_eq!(result.pass_count, 2);
    assert_eq!(result.decision, GateDecision::Escalate);
}
