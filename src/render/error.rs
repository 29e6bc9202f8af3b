//! Rendering error types.

use std::process::ExitStatus;
use thiserror::Error;

/// A `#|` directive could not produce output.
#[derive(Debug, Error)]
pub enum MacroError {
    #[error("failed to start `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed with {status}")]
    Exit { command: String, status: ExitStatus },
}

/// Rendering a page failed. Partial output is discarded.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("IO error while reading page")]
    Io(#[from] std::io::Error),

    #[error("macro on line {line} failed")]
    Macro {
        line: usize,
        #[source]
        source: MacroError,
    },
}
