//! Wiki HTTP server.
//!
//! Built on `tiny_http`:
//!
//! - Rendered pages looked up in the [`Store`] and wrapped in a layout
//! - Page sources (`?raw`) for the in-browser editor
//! - Raw file serving for everything that is not a page
//! - Directory listings
//! - `PUT`/`POST` edits that overwrite a page and trigger a rebuild
//! - File watching and rebuild on external edits (via `watch` module)
//! - Graceful shutdown on Ctrl+C
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │   Main Thread   │     │  Watcher Thread  │     │ Rebuild Threads  │
//! │  (HTTP Server)  │     │  (File Monitor)  │     │ (async edits)    │
//! └────────┬────────┘     └────────┬─────────┘     └────────┬─────────┘
//!          │ get()                 │ rebuild()              │ rebuild()
//!          ▼                       ▼                        ▼
//!    ┌─────────────────────────────────────────────────────────────┐
//!    │                      Store (ArcSwap)                        │
//!    └─────────────────────────────────────────────────────────────┘
//! ```

use crate::{
    config::WikiConfig,
    log,
    render::escape,
    site::{Rebuilder, safe_relative},
    store::Page,
    watch::watch_for_changes_blocking,
};
use anyhow::{Context, Result};
use std::{
    fs,
    io::Read,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

// ============================================================================
// Constants - HTML Templates
// ============================================================================

/// Default page layout (embedded at compile time)
const LAYOUT_TEMPLATE: &str = include_str!("embed/layout.html");

/// Directory listing HTML template (embedded at compile time)
const DIRECTORY_TEMPLATE: &str = include_str!("embed/directory.html");

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

// ============================================================================
// Server Entry Point
// ============================================================================

/// Serve the wiki until Ctrl+C.
///
/// The store must already hold the first generation; this function only
/// binds, spawns the watcher (if enabled) and answers requests.
pub fn serve_wiki(config: &WikiConfig, rebuilder: Arc<Rebuilder>) -> Result<()> {
    let interface: std::net::IpAddr = config
        .serve
        .interface
        .parse()
        .with_context(|| format!("Invalid interface `{}`", config.serve.interface))?;

    let (server, addr) = try_bind_port(interface, config.serve.port, MAX_PORT_RETRIES)?;
    let server = Arc::new(server);

    // Set up Ctrl+C handler for graceful shutdown
    let server_for_signal = Arc::clone(&server);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        server_for_signal.unblock();
    })
    .context("Failed to set Ctrl+C handler")?;

    log!("serve"; "http://{}", addr);
    if rebuilder.store().is_empty() {
        log!("serve"; "no pages under {}", config.root.display());
    }

    if config.serve.watch {
        let rebuilder = Arc::clone(&rebuilder);
        std::thread::spawn(move || {
            if let Err(err) = watch_for_changes_blocking(&rebuilder) {
                log!("watch"; "{err:#}");
            }
        });
    }

    for request in server.incoming_requests() {
        if let Err(e) = handle_request(request, config, &rebuilder) {
            log!("serve"; "request error: {e:#}");
        }
    }

    Ok(())
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(
    interface: std::net::IpAddr,
    base_port: u16,
    max_retries: u16,
) -> Result<(Server, SocketAddr)> {
    let mut last_err = None;
    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(anyhow::anyhow!(
        "Failed to bind after {} attempts (ports {}-{}): {}",
        max_retries,
        base_port,
        base_port.saturating_add(max_retries.saturating_sub(1)),
        last_err.map(|e| e.to_string()).unwrap_or_default()
    ))
}

// ============================================================================
// Routing
// ============================================================================

/// What a request resolves to.
#[derive(Debug, PartialEq)]
enum Route {
    /// Rendered page from the store
    Page { key: String, page: Page },
    /// Page source as plain text
    Source(PathBuf),
    /// File served as-is
    File(PathBuf),
    /// Directory listing
    Listing { dir: PathBuf, request_path: String },
    /// Overwrite a page source
    Edit(PathBuf),
    Forbidden,
    NotFound,
    MethodNotAllowed,
}

/// Resolve a request method and URL against the wiki.
///
/// Resolution order for reads:
/// 1. `/static/...` → file under `[serve.static_dir]`
/// 2. `?raw` on a page → page source
/// 3. Store hit → rendered page
/// 4. File under root → raw file
/// 5. Directory under root → listing
/// 6. Nothing found → 404
fn resolve(method: &Method, url: &str, config: &WikiConfig, rebuilder: &Rebuilder) -> Route {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    let path = urlencoding::decode(path)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_else(|_| path.to_owned());
    let path = path.as_str();

    let Some(rel) = safe_relative(path) else {
        return Route::NotFound;
    };
    let site = rebuilder.site();

    match method {
        Method::Get | Method::Head => {}
        Method::Put | Method::Post => {
            if !config.serve.editable {
                return Route::Forbidden;
            }
            return site.source_for(path).map_or(Route::Forbidden, Route::Edit);
        }
        _ => return Route::MethodNotAllowed,
    }

    if let Some(static_dir) = &config.serve.static_dir
        && let Ok(rest) = rel.strip_prefix("static")
    {
        let file = static_dir.join(rest);
        return if file.is_file() {
            Route::File(file)
        } else {
            Route::NotFound
        };
    }

    if query.split('&').any(|p| p == "raw" || p.starts_with("raw=")) {
        return match site.source_for(path) {
            Some(source) if source.is_file() => Route::Source(source),
            _ => Route::NotFound,
        };
    }

    let key = page_key(&rel);
    if let Some(page) = rebuilder.store().get(&key) {
        return Route::Page { key, page };
    }

    let local_path = site.root().join(&rel);
    if local_path.is_file() {
        Route::File(local_path)
    } else if local_path.is_dir() {
        Route::Listing {
            dir: local_path,
            request_path: rel.to_string_lossy().replace('\\', "/"),
        }
    } else {
        Route::NotFound
    }
}

/// Store key for a request path relative to root.
fn page_key(rel: &Path) -> String {
    let mut key = String::new();
    for part in rel.components() {
        key.push('/');
        key.push_str(&part.as_os_str().to_string_lossy());
    }
    if key.is_empty() {
        key.push('/');
    }
    key
}

// ============================================================================
// Request Handling
// ============================================================================

/// Handle a single HTTP request.
fn handle_request(request: Request, config: &WikiConfig, rebuilder: &Arc<Rebuilder>) -> Result<()> {
    let route = resolve(request.method(), request.url(), config, rebuilder);

    match route {
        Route::Page { key, page } => {
            let layout = load_layout(config)?;
            serve_html(request, render_layout(&layout, &config.base.title, &key, &page.html))
        }
        Route::Source(path) => serve_file_as(request, &path, "text/plain; charset=utf-8"),
        Route::File(path) => serve_file(request, &path),
        Route::Listing { dir, request_path } => {
            let listing = generate_directory_listing(&dir, &request_path, config, rebuilder)?;
            serve_html(request, listing)
        }
        Route::Edit(path) => handle_edit(request, &path, config, rebuilder),
        Route::Forbidden => serve_status(request, 403, "403 Forbidden"),
        Route::NotFound => serve_status(request, 404, "404 Not Found"),
        Route::MethodNotAllowed => serve_status(request, 405, "405 Method Not Allowed"),
    }
}

/// Overwrite a page with the request body, then rebuild.
fn handle_edit(
    mut request: Request,
    path: &Path,
    config: &WikiConfig,
    rebuilder: &Arc<Rebuilder>,
) -> Result<()> {
    let mut body = Vec::new();
    if let Err(e) = request.as_reader().read_to_end(&mut body) {
        serve_status(request, 400, "400 Bad Request")?;
        return Err(e).context("Failed to read request body");
    }

    match apply_edit(path, &body, config, rebuilder) {
        204 => request.respond(Response::empty(204))?,
        _ => serve_status(request, 500, "500 Internal Server Error")?,
    }
    Ok(())
}

/// Write `body` to the page at `path` and rebuild per `[serve.rebuild]`.
///
/// Returns the response status: 204 once written, 500 if the write failed.
/// In `sync` mode the store already holds the edit when this returns.
fn apply_edit(path: &Path, body: &[u8], config: &WikiConfig, rebuilder: &Arc<Rebuilder>) -> u16 {
    if let Err(e) = write_page(path, body) {
        log!("error"; "{:#}", e);
        return 500;
    }

    let rel = path.strip_prefix(&config.root).unwrap_or(path);
    log!("edit"; "{}", rel.display());
    rebuilder.rebuild_with(config.serve.rebuild);
    204
}

/// Write a page source, creating parent directories.
fn write_page(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

/// Read the configured layout, or fall back to the built-in one.
///
/// Read on every request so layout edits show up without a restart.
fn load_layout(config: &WikiConfig) -> Result<String> {
    match &config.serve.layout {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read layout {}", path.display())),
        None => Ok(LAYOUT_TEMPLATE.to_owned()),
    }
}

/// Substitute page placeholders. `{page}` goes last so page text that
/// happens to contain `{title}` is left alone.
fn render_layout(layout: &str, title: &str, key: &str, page: &str) -> String {
    layout
        .replace("{title}", &escape(title))
        .replace("{path}", &escape(key))
        .replace("{page}", page)
}

// ============================================================================
// Response Helpers
// ============================================================================

fn content_type(value: &str) -> Header {
    Header::from_bytes("Content-Type", value).expect("content types are ASCII")
}

/// Serve a file with appropriate content type.
fn serve_file(request: Request, path: &Path) -> Result<()> {
    serve_file_as(request, path, guess_content_type(path))
}

fn serve_file_as(request: Request, path: &Path, mime: &str) -> Result<()> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) => {
            serve_status(request, 404, "404 Not Found")?;
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    let response = Response::from_data(content).with_header(content_type(mime));
    request.respond(response)?;
    Ok(())
}

/// Serve HTML content.
fn serve_html(request: Request, content: String) -> Result<()> {
    let response =
        Response::from_string(content).with_header(content_type("text/html; charset=utf-8"));
    request.respond(response)?;
    Ok(())
}

/// Serve a plain-text status response.
fn serve_status(request: Request, code: u16, message: &str) -> Result<()> {
    let response = Response::from_string(message)
        .with_status_code(StatusCode(code))
        .with_header(content_type("text/plain; charset=utf-8"));
    request.respond(response)?;
    Ok(())
}

// ============================================================================
// Content Type Detection
// ============================================================================

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
fn guess_content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        // Web content
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",

        // Images
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",

        // Documents
        Some("pdf") => "application/pdf",
        Some("txt" | "csv" | "log") => "text/plain; charset=utf-8",
        Some("md") => "text/markdown; charset=utf-8",

        // Default binary
        _ => "application/octet-stream",
    }
}

// ============================================================================
// Directory Listing
// ============================================================================

/// Generate HTML directory listing for browsing.
///
/// - Hidden entries (starting with '.') are skipped
/// - Pages link to their page path, other files to the raw file
/// - Directories first, then files, each sorted by name
fn generate_directory_listing(
    dir_path: &Path,
    request_path: &str,
    config: &WikiConfig,
    rebuilder: &Rebuilder,
) -> Result<String> {
    let site = rebuilder.site();
    let mut entries: Vec<(bool, String, String)> = fs::read_dir(dir_path)
        .with_context(|| format!("Failed to list {}", dir_path.display()))?
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                return None;
            }
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            let path = entry.path();
            let href = if !is_dir && site.is_eligible(&path) {
                site.page_key(&path)?
            } else if request_path.is_empty() {
                format!("/{name}")
            } else {
                format!("/{request_path}/{name}")
            };
            Some((is_dir, name, href))
        })
        .collect();
    entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let entries: Vec<String> = entries
        .into_iter()
        .map(|(is_dir, name, href)| {
            let icon = if is_dir { "📁" } else { "📄" };
            let name = escape(&name);
            let href = escape(&href);
            format!(r#"<li><span class="icon">{icon}</span><a href="{href}">{name}</a></li>"#)
        })
        .collect();

    // Generate parent link if not at root
    let parent_link = if request_path.is_empty() {
        String::new()
    } else {
        let parent_path = Path::new(request_path)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!(
            r#"<li class="parent"><span class="icon">📂</span><a href="/{parent_path}">..</a></li>"#
        )
    };

    Ok(DIRECTORY_TEMPLATE
        .replace("{title}", &escape(&config.base.title))
        .replace("{path}", &escape(request_path))
        .replace("{parent_link}", &parent_link)
        .replace("{entries}", &entries.join("\n    ")))
}
