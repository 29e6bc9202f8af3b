//! Line classification.
//!
//! | Kind      | Syntax                          | Example            |
//! |-----------|---------------------------------|--------------------|
//! | `Macro`   | `^[ \t]*#\|<command>`           | `#\| ls *.txt`     |
//! | `Task`    | `^[ \t]*[-#] [<c>] <text>`      | `- [x] buy milk`   |
//! | `Heading` | `^# `                           | `# # Title`        |
//! | `Plain`   | anything else                   | `see [a](b)`       |
//!
//! Matchers run in the table's order and the first match wins, so a line
//! that is both a directive and a task is a directive. Links are not a kind:
//! they are substituted into whatever text the line resolves to.

use regex::Regex;
use std::sync::LazyLock;

/// Directive sigil, after optional leading whitespace.
const MACRO_SIGIL: &str = "#|";

/// Heading prefix. The whole leading run of `#` and spaces is stripped.
const HEADING_PREFIX: &str = "# ";

/// `- [ ] text`, `# [x] text`, with optional indentation.
static TASK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([ \t]*)[-#] \[([^\]]?)\](?:[ \t]+(.*))?$").unwrap());

/// Checkbox state of a task line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Checked,
    Unchecked,
}

/// Classified line, borrowing from the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// Shell command to run; the sigil is stripped.
    Macro(&'a str),
    Task {
        indent: &'a str,
        state: TaskState,
        text: &'a str,
    },
    Heading(&'a str),
    Plain(&'a str),
}

/// Classify one line. A trailing `\n` or `\r\n` is ignored.
pub fn classify(line: &str) -> LineKind<'_> {
    let line = strip_terminator(line);

    if let Some(command) = match_macro(line) {
        LineKind::Macro(command)
    } else if let Some(task) = match_task(line) {
        task
    } else if let Some(text) = match_heading(line) {
        LineKind::Heading(text)
    } else {
        LineKind::Plain(line)
    }
}

/// Remove one trailing line terminator.
pub fn strip_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

fn match_macro(line: &str) -> Option<&str> {
    line.trim_start_matches([' ', '\t']).strip_prefix(MACRO_SIGIL)
}

fn match_task(line: &str) -> Option<LineKind<'_>> {
    let caps = TASK_RE.captures(line)?;
    let indent = caps.get(1).map_or("", |m| m.as_str());
    let mark = caps.get(2).map_or("", |m| m.as_str());
    let text = caps.get(3).map_or("", |m| m.as_str());

    let state = if mark.trim().is_empty() {
        TaskState::Unchecked
    } else {
        TaskState::Checked
    };

    Some(LineKind::Task {
        indent,
        state,
        text,
    })
}

fn match_heading(line: &str) -> Option<&str> {
    line.starts_with(HEADING_PREFIX)
        .then(|| line.trim_start_matches(['#', ' ']))
}
