//! Stage prompt templates and revision feedback.
//!
//! Templates are plain strings with `{name}` placeholders. Unknown
//! placeholders are left as-is so a template can mention braces freely.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::gates::{GateResult, GateVerdict};

/// Per-stage prompt templates.
///
/// | Stage      | Placeholders                                               |
/// |------------|------------------------------------------------------------|
/// | research   | `title` `category` `notes`                                 |
/// | draft      | `title` `category` `notes` `research`                      |
/// | revision   | `title` `category` `research` `draft` `feedback`           |
/// | review     | `title` `draft` `gates`                                    |
/// | graphics   | `title` `draft`                                            |
/// | board_vote | `persona` `brief` `title` `category` `notes` `min_score` `max_score` |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagePrompts {
    pub research: String,
    pub draft: String,
    pub revision: String,
    pub review: String,
    pub graphics: String,
    pub board_vote: String,
}

impl Default for StagePrompts {
    fn default() -> Self {
        Self {
            research: "\
You are a newsroom researcher. Gather the facts, figures and named sources a
reporter needs for an article titled \"{title}\" ({category}).

Editor notes: {notes}

Return concise research notes with every figure attributed to a source."
                .to_string(),
            draft: "\
You are a staff writer. Write an article titled \"{title}\" ({category}) using
only the research below. Attribute every figure.

Editor notes: {notes}

## Research
{research}"
                .to_string(),
            revision: "\
You are a staff writer revising your article \"{title}\" ({category}). Address
every point in the review feedback and return the full revised article.

## Review feedback
{feedback}

## Previous draft
{draft}

## Research
{research}"
                .to_string(),
            review: "\
You are the copy desk. Review the draft below against each quality gate and
answer with one line per gate in the form `<gate>: PASS|FAIL - <reason>`.

Gates: {gates}

## Draft: {title}
{draft}"
                .to_string(),
            graphics: "\
You are the graphics desk. If a chart would help the article \"{title}\",
describe it as a JSON chart specification. If no chart applies, answer
exactly NOT_APPLICABLE.

{draft}"
                .to_string(),
            board_vote: "\
You sit on the editorial board as {persona}. {brief}

Should we commission an article titled \"{title}\" ({category})?
Notes: {notes}

Answer with a JSON object: {\"score\": <{min_score}-{max_score}>, \"veto\": <true|false>, \"rationale\": \"...\"}"
                .to_string(),
        }
    }
}

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("PLACEHOLDER_RE regex should compile"));

/// Substitute `{key}` placeholders in one pass over the template; values
/// are inserted verbatim, never re-expanded.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| {
            let key = &caps[1];
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Feedback block for the writer: every gate that did not pass, with the
/// reviewer's reason.
pub fn format_revision_feedback(result: &GateResult) -> String {
    let mut out = format!(
        "Quality review: {}/{} gates passed.\n\n",
        result.pass_count,
        result.outcomes.len()
    );

    let failed: Vec<_> = result
        .outcomes
        .iter()
        .filter(|o| o.verdict == GateVerdict::Fail)
        .collect();
    if !failed.is_empty() {
        out.push_str(&format!("### Failed gates ({}):\n", failed.len()));
        for (i, o) in failed.iter().enumerate() {
            let why = if o.rationale.is_empty() {
                "no reason given"
            } else {
                o.rationale.as_str()
            };
            out.push_str(&format!("{}. {}: {}\n", i + 1, o.gate, why));
        }
        out.push('\n');
    }

    let unclear: Vec<_> = result
        .outcomes
        .iter()
        .filter(|o| o.verdict == GateVerdict::Ambiguous)
        .collect();
    if !unclear.is_empty() {
        out.push_str(&format!("### Unclear gates ({}):\n", unclear.len()));
        for (i, o) in unclear.iter().enumerate() {
            let why = match (&o.ambiguity, o.rationale.is_empty()) {
                (_, false) => o.rationale.clone(),
                (Some(a), true) => a.to_string(),
                (None, true) => "no reason given".to_string(),
            };
            out.push_str(&format!("{}. {}: {}\n", i + 1, o.gate, why));
        }
        out.push('\n');
    }

    out.push_str("Fix every gate listed above; keep what already passed.\n");
    out
}
