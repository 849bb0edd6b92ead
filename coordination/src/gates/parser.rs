//! Gate marker parser — reviewer prose to tagged verdicts.
//!
//! # Grammar
//!
//! One gate per line:
//!
//! ```text
//! [decoration] <gate-name> [decoration] <separator> [decoration] <verdict> [rationale]
//!
//! decoration := list bullets (- * + >), heading marks (#), ordinals ("1." "1)"),
//!               emphasis (** __ `), brackets ([ ])
//! gate-name  := a configured name, case-insensitive; '-', '_' and ' ' are
//!               interchangeable and runs of them collapse
//! separator  := one or more of : = | - – —   (required)
//! verdict    := PASS | PASSED | ✅                      → Pass
//!               FAIL | FAILED | ❌                      → Fail
//!               AMBIGUOUS | UNCLEAR | PARTIAL | ⚠️      → Ambiguous (declared)
//!               any other token, or nothing            → Ambiguous
//! rationale  := rest of the line, leading separators trimmed
//! ```
//!
//! Markdown table rows (`| structure | PASS | ... |`) are read as
//! `structure: PASS ...`. A line offering both outcomes (`PASS/FAIL`,
//! `pass or fail`, or both words in capitals) is Ambiguous.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Tagged result for a single gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateVerdict {
    Pass,
    Fail,
    /// Counts as a failure, but is kept distinct for diagnostics.
    Ambiguous,
}

impl GateVerdict {
    pub fn is_pass(self) -> bool {
        matches!(self, Self::Pass)
    }
}

impl std::fmt::Display for GateVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
            Self::Ambiguous => write!(f, "AMBIGUOUS"),
        }
    }
}

/// Why a gate ended up Ambiguous. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GateParsingAmbiguity {
    /// The review never mentioned the gate.
    Missing,
    /// The marker had a separator but no verdict token.
    NoVerdict,
    /// The verdict token was not one of the recognized words.
    UnrecognizedToken { token: String },
    /// The line offered both a pass and a fail verdict.
    Contradictory,
    /// The reviewer explicitly said AMBIGUOUS / UNCLEAR / PARTIAL.
    Declared,
}

impl std::fmt::Display for GateParsingAmbiguity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "gate not mentioned in review"),
            Self::NoVerdict => write!(f, "no verdict given"),
            Self::UnrecognizedToken { token } => write!(f, "unrecognized verdict {token:?}"),
            Self::Contradictory => write!(f, "both pass and fail given"),
            Self::Declared => write!(f, "reviewer declared it ambiguous"),
        }
    }
}

/// One recognized marker line.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerLine {
    /// Index into the parser's configured gate names.
    pub gate_index: usize,
    pub verdict: GateVerdict,
    pub ambiguity: Option<GateParsingAmbiguity>,
    pub rationale: String,
}

const SEPARATORS: &[char] = &[':', '=', '|', '-', '–', '—'];
const DECORATION: &[char] = &['*', '_', '`', '[', ']', '(', ')', '>', '#', '+'];

/// `PASS/FAIL`, `pass or fail` and friends, at the verdict position.
static ALTERNATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(pass(ed)?|fail(ed)?)\s*(/|\bor\b|\|)\s*(pass(ed)?|fail(ed)?)\b")
        .expect("ALTERNATIVE_RE regex should compile")
});
static UPPER_PASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bPASS(ED)?\b|✅").expect("UPPER_PASS_RE regex should compile"));
static UPPER_FAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bFAIL(ED)?\b|❌").expect("UPPER_FAIL_RE regex should compile"));

/// Recognizes gate marker lines for a fixed set of gate names.
#[derive(Debug, Clone)]
pub struct GateMarkerParser {
    /// Lowercased names with '-', '_' and ' ' runs collapsed to one space.
    normalized: Vec<String>,
}

impl GateMarkerParser {
    pub fn new<S: AsRef<str>>(gate_names: &[S]) -> Self {
        Self {
            normalized: gate_names
                .iter()
                .map(|n| normalize_name(n.as_ref()))
                .collect(),
        }
    }

    /// Parse one line of review text; `None` when it is not a gate marker.
    pub fn parse_line(&self, line: &str) -> Option<MarkerLine> {
        let line = flatten_table_row(line);
        let body = strip_leading_decoration(&line);

        let (gate_index, consumed) = self.match_gate(body)?;
        let after_name = body[consumed..].trim_start_matches(|c: char| c.is_whitespace() || DECORATION.contains(&c));

        let after_sep = after_name.trim_start_matches(|c: char| c.is_whitespace() || SEPARATORS.contains(&c));
        if after_sep.len() == after_name.len() {
            return None;
        }
        let rest = after_sep.trim_start_matches(|c: char| c.is_whitespace() || DECORATION.contains(&c));

        Some(classify(gate_index, rest))
    }

    /// Longest configured name at the start of `text`, with a word boundary after it.
    fn match_gate(&self, text: &str) -> Option<(usize, usize)> {
        self.normalized
            .iter()
            .enumerate()
            .filter_map(|(idx, name)| match_normalized(text, name).map(|len| (idx, len)))
            .max_by_key(|&(_, len)| len)
    }
}

fn classify(gate_index: usize, rest: &str) -> MarkerLine {
    let (token, after_token) = split_verdict_token(rest);
    let rationale = clean_rationale(after_token);

    let contradictory = ALTERNATIVE_RE.is_match(rest)
        || (UPPER_PASS_RE.is_match(rest) && UPPER_FAIL_RE.is_match(rest));

    let (verdict, ambiguity) = if contradictory {
        (GateVerdict::Ambiguous, Some(GateParsingAmbiguity::Contradictory))
    } else if token.is_empty() {
        (GateVerdict::Ambiguous, Some(GateParsingAmbiguity::NoVerdict))
    } else {
        match verdict_for_token(token) {
            Some(GateVerdict::Ambiguous) => {
                (GateVerdict::Ambiguous, Some(GateParsingAmbiguity::Declared))
            }
            Some(v) => (v, None),
            None => (
                GateVerdict::Ambiguous,
                Some(GateParsingAmbiguity::UnrecognizedToken {
                    token: token.to_string(),
                }),
            ),
        }
    };

    MarkerLine {
        gate_index,
        verdict,
        ambiguity,
        rationale,
    }
}

fn verdict_for_token(token: &str) -> Option<GateVerdict> {
    match token.to_ascii_uppercase().as_str() {
        "PASS" | "PASSED" | "✅" => Some(GateVerdict::Pass),
        "FAIL" | "FAILED" | "❌" => Some(GateVerdict::Fail),
        "AMBIGUOUS" | "UNCLEAR" | "PARTIAL" | "⚠" | "⚠️" => Some(GateVerdict::Ambiguous),
        _ => None,
    }
}

/// Split off the verdict token: a leading emoji, or a run of word characters.
fn split_verdict_token(rest: &str) -> (&str, &str) {
    for emoji in ["✅", "❌", "⚠️", "⚠"] {
        if let Some(after) = rest.strip_prefix(emoji) {
            return (&rest[..emoji.len()], after);
        }
    }
    let end = rest
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    (&rest[..end], &rest[end..])
}

fn clean_rationale(text: &str) -> String {
    text.trim_start_matches(|c: char| {
        c.is_whitespace() || SEPARATORS.contains(&c) || DECORATION.contains(&c) || c == '.' || c == ','
    })
    .trim_end_matches(|c: char| c.is_whitespace() || c == '|' || DECORATION.contains(&c))
    .to_string()
}

fn normalize_name(name: &str) -> String {
    let mut out = String::new();
    let mut pending_space = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | ' ') {
            pending_space = true;
        } else {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Byte length of `text`'s prefix matching a normalized name, if any.
fn match_normalized(text: &str, name: &str) -> Option<usize> {
    if name.is_empty() {
        return None;
    }
    let mut chars = text.char_indices().peekable();
    for expected in name.chars() {
        if expected == ' ' {
            let mut saw_joiner = false;
            while let Some(&(_, c)) = chars.peek() {
                if matches!(c, '-' | '_' | ' ') {
                    saw_joiner = true;
                    chars.next();
                } else {
                    break;
                }
            }
            if !saw_joiner {
                return None;
            }
        } else {
            let (_, c) = chars.next()?;
            if !c.to_lowercase().eq(expected.to_lowercase()) {
                return None;
            }
        }
    }

    let consumed = chars.peek().map(|&(i, _)| i).unwrap_or(text.len());
    let mut tail = text[consumed..].chars();
    match tail.next() {
        Some(c) if c.is_alphanumeric() => None,
        Some('-') | Some('_') if tail.next().is_some_and(|c| c.is_alphanumeric()) => None,
        _ => Some(consumed),
    }
}

fn strip_leading_decoration(line: &str) -> &str {
    let mut s = line;
    loop {
        let trimmed = s.trim_start_matches(|c: char| {
            c.is_whitespace() || matches!(c, '-' | '*' | '+' | '>' | '#' | '`' | '[' | '_' | '|')
        });
        let trimmed = strip_ordinal(trimmed);
        if trimmed.len() == s.len() {
            return trimmed;
        }
        s = trimmed;
    }
}

fn strip_ordinal(s: &str) -> &str {
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return s;
    }
    match s.as_bytes().get(digits) {
        Some(b'.') | Some(b')') => &s[digits + 1..],
        _ => s,
    }
}

/// `| structure | PASS | ok |` → `structure: PASS ok`.
fn flatten_table_row(line: &str) -> String {
    let trimmed = line.trim();
    if !trimmed.starts_with('|') {
        return line.to_string();
    }
    let cells: Vec<&str> = trimmed
        .trim_matches('|')
        .split('|')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();
    match cells.split_first() {
        Some((name, rest)) if !rest.is_empty() => format!("{}: {}", name, rest.join(" ")),
        _ => line.to_string(),
    }
}
