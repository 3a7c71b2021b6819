mod auth;
mod backup;
mod branch;
mod browser_dump;
mod config;
mod db;
mod directory;
mod guard;
mod ipc;
mod model;
mod repo;
mod settings;
mod store;
mod sync;

use config::{DaemonConfig, LogFormat};
use std::io::{self, BufRead, Write};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Logs go to stderr; stdout carries only protocol lines.
fn init_tracing(config: &DaemonConfig) {
    let filter = EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| EnvFilter::new("kindergartend=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false);
    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn main() {
    let config = match DaemonConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("kindergartend: {e:#}");
            std::process::exit(2);
        }
    };
    init_tracing(&config);
    info!(version = env!("CARGO_PKG_VERSION"), "kindergartend starting");

    let workspace = config.workspace.clone();
    let mut state = ipc::AppState::new(config);
    if let Some(path) = workspace {
        if let Err(e) = ipc::open_workspace(&mut state, &path) {
            error!(workspace = %path.to_string_lossy(), error = %format!("{e:#}"), "failed to open configured workspace");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                warn!(error = %e, "undecodable request line");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let method = req.method.clone();
        let resp = ipc::handle_request(&mut state, req);
        if resp.get("ok").and_then(|v| v.as_bool()) == Some(false) {
            let code = resp["error"]["code"].as_str().unwrap_or("unknown");
            warn!(method = %method, code, "request failed");
        }
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    info!("kindergartend exiting");
}
