//! HTML emission for classified lines.

use super::line::TaskState;
use regex::Regex;
use std::{
    borrow::Cow,
    fmt::Write,
    sync::LazyLock,
};

/// `[display](target)`; the target may not contain whitespace or `)`.
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]]+)\]\(([^()\s]+)\)").unwrap());

/// Escape the characters that would otherwise be read as markup.
pub fn escape(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Rewrite every `[display](target)` into an anchor.
pub fn links(text: &str) -> Cow<'_, str> {
    LINK_RE.replace_all(text, r#"<a href="$2">$1</a>"#)
}

/// Inline text pass shared by every line kind: optional escaping, then links.
pub fn inline(text: &str, escape_html: bool) -> String {
    let text = if escape_html {
        escape(text)
    } else {
        Cow::Borrowed(text)
    };
    links(&text).into_owned()
}

/// `<span class="heading">…</span>`
pub fn heading(out: &mut String, text: &str) {
    let _ = write!(out, r#"<span class="heading">{text}</span>"#);
}

/// Checkbox control followed by the task text.
///
/// `data-line` carries the source line so an editor can toggle it.
pub fn task(out: &mut String, line_no: usize, indent: &str, state: TaskState, text: &str) {
    let checked = match state {
        TaskState::Checked => " checked",
        TaskState::Unchecked => "",
    };
    let _ = write!(
        out,
        r#"{indent}<input type="checkbox" class="task" data-line="{line_no}"{checked}> {text}"#
    );
}

/// Open the addressable block for `line_no`.
pub fn open_line(out: &mut String, line_no: usize, class: Option<&str>) {
    match class {
        Some(class) => {
            let _ = write!(out, r#"<div class="line {class}" id="{line_no}">"#);
        }
        None => {
            let _ = write!(out, r#"<div class="line" id="{line_no}">"#);
        }
    }
}

pub fn close_line(out: &mut String) {
    out.push_str("</div>");
}
