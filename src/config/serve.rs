//! `[serve]` section configuration.
//!
//! Contains wiki server settings.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// When the store is rebuilt after an edit made through the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebuildMode {
    /// Rebuild before answering the edit request.
    Sync,
    /// Answer first, rebuild in a background thread (default).
    #[default]
    Async,
}

/// `[serve]` section in linewiki.toml - server settings.
///
/// # Example
/// ```toml
/// [serve]
/// interface = "0.0.0.0"  # Listen on all interfaces
/// port = 3000
/// watch = true           # Rebuild when files change on disk
/// rebuild = "sync"       # Rebuild before acknowledging an edit
/// editable = false       # Reject PUT/POST edits
/// layout = "templates/layout.html"
/// static_dir = "static"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ServeConfig {
    /// Network interface to bind.
    /// - `127.0.0.1` (default): localhost only
    /// - `0.0.0.0`: all interfaces (LAN accessible)
    #[serde(default = "defaults::serve::interface")]
    #[educe(Default = defaults::serve::interface())]
    pub interface: String,

    /// HTTP port number (default: 8080).
    #[serde(default = "defaults::serve::port")]
    #[educe(Default = defaults::serve::port())]
    pub port: u16,

    /// Watch the wiki root and rebuild when pages change on disk.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub watch: bool,

    /// Rebuild strategy after an edit through the server.
    #[serde(default = "defaults::serve::rebuild")]
    #[educe(Default = defaults::serve::rebuild())]
    pub rebuild: RebuildMode,

    /// Accept `PUT`/`POST` requests that overwrite pages.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub editable: bool,

    /// Page layout file, relative to the root. Placeholders: `{title}`,
    /// `{path}`, `{page}`. The built-in layout is used when unset.
    #[serde(default)]
    pub layout: Option<PathBuf>,

    /// Directory served under `/static/`, relative to the root.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::super::WikiConfig;
    use super::RebuildMode;
    use std::path::PathBuf;

    #[test]
    fn test_serve_config() {
        let config = r#"
            [serve]
            interface = "0.0.0.0"
            port = 3000
            watch = false
            rebuild = "sync"
            editable = false
            layout = "templates/layout.html"
        "#;
        let config: WikiConfig = toml::from_str(config).unwrap();

        assert_eq!(config.serve.interface, "0.0.0.0");
        assert_eq!(config.serve.port, 3000);
        assert!(!config.serve.watch);
        assert_eq!(config.serve.rebuild, RebuildMode::Sync);
        assert!(!config.serve.editable);
        assert_eq!(config.serve.layout, Some(PathBuf::from("templates/layout.html")));
        assert_eq!(config.serve.static_dir, None);
    }

    #[test]
    fn test_serve_config_defaults() {
        let config: WikiConfig = toml::from_str("").unwrap();

        assert_eq!(config.serve.interface, "127.0.0.1");
        assert_eq!(config.serve.port, 8080);
        assert!(config.serve.watch);
        assert_eq!(config.serve.rebuild, RebuildMode::Async);
        assert!(config.serve.editable);
        assert_eq!(config.serve.layout, None);
    }

    #[test]
    fn test_invalid_rebuild_mode() {
        let result: Result<WikiConfig, _> = toml::from_str(
            r#"
            [serve]
            rebuild = "eventually"
        "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_field_rejection() {
        let config = r#"
            [serve]
            unknown_field = "should_fail"
        "#;
        let result: Result<WikiConfig, _> = toml::from_str(config);

        assert!(result.is_err());
    }
}
