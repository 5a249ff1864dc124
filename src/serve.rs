//! Workshop HTTP server.
//!
//! A thin JSON layer over [`Workshop`] plus static file serving for apps
//! previewed in the browser, built on `tiny_http`:
//!
//! ```text
//! GET  /api/apps                     catalog in navigation order
//! GET  /api/apps/{name}[/next|/prev] one app / its step neighbor
//! POST /api/apps/{name}/start|stop   dev server control
//! GET  /api/exercises[/{n}]          grouped exercises
//! GET  /api/workshop                 title + workshop instructions
//! POST /api/playground?app=&reset=   sync the playground
//! GET  /app/{name}/{file}            static app files
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │   Main Thread   │     │  Watcher Thread  │
//! │  (HTTP Server)  │     │  (File Monitor)  │
//! └────────┬────────┘     └────────┬─────────┘
//!          │                       │
//!    block_on(route)         record_event
//!          ▼                       ▼
//!      Workshop  ◄──────  StalenessTracker
//! ```

use crate::{
    config::{Config, WorkshopMeta},
    log,
    watch::watch_for_changes_blocking,
    workshop::{NotFound, Workshop},
};
use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use serde_json::json;
use std::{
    fs,
    net::SocketAddr,
    path::{Component, Path, PathBuf},
    sync::Arc,
};
use tiny_http::{Header, Method, Request, Response, Server};
use tokio::runtime::Handle;

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

// ============================================================================
// Server Entry Point
// ============================================================================

/// Start the workshop server, blocking until Ctrl+C.
///
/// Must be called outside the runtime: each request is driven with
/// `handle.block_on`.
pub fn serve_workshop(config: &Config, workshop: Arc<Workshop>, handle: &Handle) -> Result<()> {
    let interface: std::net::IpAddr = config
        .serve
        .interface
        .parse()
        .with_context(|| format!("Invalid interface `{}`", config.serve.interface))?;

    let (server, addr) = try_bind_port(interface, config.serve.port, MAX_PORT_RETRIES)?;
    let server = Arc::new(server);

    let server_for_signal = Arc::clone(&server);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        server_for_signal.unblock();
    })
    .context("Failed to set Ctrl+C handler")?;

    let apps = handle.block_on(workshop.get_apps())?;
    log!("serve"; "{} apps in {}", apps.len(), workshop.paths().root.display());
    log!("serve"; "http://{}", addr);

    if config.serve.watch {
        let watched = Arc::clone(&workshop);
        std::thread::spawn(move || {
            if let Err(err) = watch_for_changes_blocking(watched) {
                log!("watch"; "{err}");
            }
        });
    }

    for request in server.incoming_requests() {
        let reply = handle.block_on(route(&workshop, request.method(), request.url()));
        if let Err(e) = respond(request, reply) {
            log!("serve"; "request error: {e}");
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
    let mut last_error = None;
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
            Err(e) => last_error = Some(e),
        }
    }
    Err(anyhow!(
        "Failed to bind after {} attempts (ports {}-{}): {}",
        max_retries,
        base_port,
        base_port.saturating_add(max_retries.saturating_sub(1)),
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

// ============================================================================
// Routing
// ============================================================================

/// What to send back for one request.
#[derive(Debug, PartialEq, Eq)]
enum Reply {
    Json(String),
    File(PathBuf),
    NotFound(String),
    BadRequest(String),
    Failed(String),
}

impl Reply {
    fn json(value: &impl Serialize) -> Result<Self> {
        Ok(Self::Json(serde_json::to_string(value)?))
    }
}

/// Resolve a request. Lookup misses become 404, anything else that fails
/// becomes 500 with the error chain as body.
async fn route(workshop: &Arc<Workshop>, method: &Method, url: &str) -> Reply {
    match dispatch(workshop, method, url).await {
        Ok(reply) => reply,
        Err(err) if err.downcast_ref::<NotFound>().is_some() => Reply::NotFound(err.to_string()),
        Err(err) => {
            log!("error"; "{method} {url}: {err:#}");
            Reply::Failed(format!("{err:#}"))
        }
    }
}

async fn dispatch(workshop: &Arc<Workshop>, method: &Method, url: &str) -> Result<Reply> {
    let (raw_path, query) = url.split_once('?').unwrap_or((url, ""));
    let path = decode(raw_path);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method, segments.as_slice()) {
        (Method::Get, ["api", "apps"]) => Reply::json(&workshop.get_apps().await?),
        (Method::Get, ["api", "apps", name]) => Reply::json(&find_app(workshop, name).await?),
        (Method::Get, ["api", "apps", name, direction @ ("next" | "prev")]) => {
            let app = find_app(workshop, name).await?;
            let neighbor = if *direction == "next" {
                workshop.get_next_exercise_app(&app).await?
            } else {
                workshop.get_prev_exercise_app(&app).await?
            };
            Reply::json(&neighbor)
        }
        (Method::Post, ["api", "apps", name, "start"]) => {
            let app = find_app(workshop, name).await?;
            workshop.processes().start(&app).await?;
            workshop.processes().wait_until_healthy(&app).await?;
            Reply::json(&json!({ "status": "running", "port": app.port() }))
        }
        (Method::Post, ["api", "apps", name, "stop"]) => {
            let app = find_app(workshop, name).await?;
            workshop.processes().stop(&app.name).await?;
            Reply::json(&json!({ "status": "stopped" }))
        }
        (Method::Get, ["api", "exercises"]) => Reply::json(&workshop.get_exercises().await?),
        (Method::Get, ["api", "exercises", number]) => {
            let Ok(number) = number.parse::<u32>() else {
                return Ok(Reply::BadRequest(format!("`{number}` is not an exercise number")));
            };
            let exercise = workshop
                .get_exercise(number)
                .await?
                .ok_or(NotFound::Exercise(number))?;
            Reply::json(&exercise)
        }
        (Method::Get, ["api", "workshop"]) => {
            let meta = WorkshopMeta::load(&workshop.paths().root)?;
            Reply::json(&json!({
                "title": workshop.get_workshop_title()?,
                "subtitle": meta.subtitle,
                "githubRoot": meta.github_root,
                "instructions": workshop.get_workshop_instructions().await,
                "finished": workshop.get_workshop_finished().await,
            }))
        }
        (Method::Post, ["api", "playground"]) => {
            let Some(app) = query_param(query, "app") else {
                return Ok(Reply::BadRequest("missing `app` parameter".into()));
            };
            let reset = query_param(query, "reset").is_some_and(|value| value == "true");
            Reply::json(&workshop.set_playground_by_name(&app, reset).await?)
        }
        (Method::Get, ["app", name, rest @ ..]) => {
            let app = find_app(workshop, name).await?;
            // Browser tests live next to the app's sources.
            let rest = match rest {
                ["test", files @ ..] => files,
                _ => rest,
            };
            Ok(resolve_static(&app.full_path, rest)
                .map_or_else(|| Reply::NotFound(format!("no such file in `{name}`")), Reply::File))
        }
        _ => Ok(Reply::NotFound(format!("no route for {method} {path}"))),
    }
}

async fn find_app(workshop: &Arc<Workshop>, name: &str) -> Result<crate::workshop::App> {
    Ok(workshop
        .get_app_by_name(name)
        .await?
        .ok_or_else(|| NotFound::App(name.to_owned()))?)
}

/// Percent-decoded value of `key` in a raw query string.
fn query_param(query: &str, key: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find_map(|(k, v)| (k == key).then(|| decode(v)))
}

/// Percent-decode, keeping the raw text when it isn't valid UTF-8.
fn decode(raw: &str) -> String {
    urlencoding::decode(raw).map_or_else(|_| raw.to_owned(), std::borrow::Cow::into_owned)
}

/// A file under `dir`, with `index.html` for directories. Refuses anything
/// that would leave `dir`.
fn resolve_static(dir: &Path, segments: &[&str]) -> Option<PathBuf> {
    let relative: PathBuf = segments.iter().collect();
    if !relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        return None;
    }

    let path = dir.join(relative);
    if path.is_file() {
        return Some(path);
    }
    let index = path.join("index.html");
    index.is_file().then_some(index)
}

// ============================================================================
// Response Helpers
// ============================================================================

fn content_type(value: &str) -> Result<Header> {
    Header::from_bytes("Content-Type", value).map_err(|()| anyhow!("invalid header `{value}`"))
}

fn respond(request: Request, reply: Reply) -> Result<()> {
    match reply {
        Reply::Json(body) => {
            let response = Response::from_string(body)
                .with_header(content_type("application/json; charset=utf-8")?);
            request.respond(response)?;
        }
        Reply::File(path) => {
            let content =
                fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            let response =
                Response::from_data(content).with_header(content_type(guess_content_type(&path))?);
            request.respond(response)?;
        }
        Reply::NotFound(message) => respond_text(request, 404, message)?,
        Reply::BadRequest(message) => respond_text(request, 400, message)?,
        Reply::Failed(message) => respond_text(request, 500, message)?,
    }
    Ok(())
}

fn respond_text(request: Request, status: u16, message: String) -> Result<()> {
    let response = Response::from_string(message)
        .with_status_code(status)
        .with_header(content_type("text/plain; charset=utf-8")?);
    request.respond(response)?;
    Ok(())
}

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs" | "cjs") => "application/javascript; charset=utf-8",
        Some("ts" | "tsx" | "jsx") => "text/plain; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("txt") => "text/plain; charset=utf-8",
        Some("md" | "mdx") => "text/markdown; charset=utf-8",
        _ => "application/octet-stream",
    }
}
