//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Why `linewiki.toml` (plus CLI overrides) cannot be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid linewiki.toml")]
    Toml(#[from] toml::de::Error),

    /// The wiki root or `[serve.static_dir]` is missing.
    #[error("{field} `{}` is not a directory", path.display())]
    NotADirectory { field: &'static str, path: PathBuf },

    /// `[serve.layout]` is missing.
    #[error("{field} `{}` is not a file", path.display())]
    NotAFile { field: &'static str, path: PathBuf },

    /// A list that needs at least one element (`[render.extensions]`,
    /// `[render.shell]`).
    #[error("{0} must have at least one element")]
    Empty(&'static str),
}
