//! `[render]` section configuration.
//!
//! Controls which files become pages, how page paths are derived, and the
//! shell used to run `#|` directives.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// `[render]` section in linewiki.toml - page rendering settings.
///
/// # Example
/// ```toml
/// [render]
/// extensions = ["txt", "md", "org"]
/// strip_extension = true   # /notes/todo.txt is served at /notes/todo
/// escape_html = true
/// shell = ["bash", "-c"]
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct RenderConfig {
    /// File extensions rendered as pages (without the leading dot).
    /// Everything else is served as raw bytes.
    #[serde(default = "defaults::render::extensions")]
    #[educe(Default = defaults::render::extensions())]
    pub extensions: Vec<String>,

    /// Drop the file extension from page paths.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub strip_extension: bool,

    /// Escape `<`, `>`, `&` and `"` in page text before rendering.
    /// Disable to let notes carry inline HTML.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub escape_html: bool,

    /// Shell program and leading arguments; the directive text is appended
    /// as the final argument.
    #[serde(default = "defaults::render::shell")]
    #[educe(Default = defaults::render::shell())]
    pub shell: Vec<String>,
}

impl RenderConfig {
    /// Normalize extensions to lowercase without a leading dot.
    pub fn normalize(&mut self) {
        for ext in &mut self.extensions {
            *ext = ext.trim_start_matches('.').to_ascii_lowercase();
        }
    }

    /// Check whether a file is rendered as a page.
    pub fn is_eligible(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}
