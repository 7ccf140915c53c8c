//! Browser process lifecycle.
//!
//! Launches a dedicated Firefox instance per session with a throwaway
//! profile and the WebDriver BiDi remote agent enabled, then scans the
//! child's output for the endpoint announcement:
//!
//! ```text
//! WebDriver BiDi listening on ws://127.0.0.1:9222
//! ```
//!
//! The rest of the proxy needs only the resulting [`LaunchHandle`]: a
//! WebSocket URL to attach to and a close handle for teardown.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Environment variable overriding the browser binary path.
const BROWSER_ENV: &str = "VIBIUM_BROWSER";

/// Candidate browser binaries probed in order.
const BROWSER_CANDIDATES: &[&str] = &[
    "/usr/bin/firefox",
    "/usr/local/bin/firefox",
    "/snap/bin/firefox",
    "/Applications/Firefox.app/Contents/MacOS/firefox",
];

/// Announcement prefix printed by the browser once the BiDi agent is up.
const BIDI_ANNOUNCEMENT: &str = "WebDriver BiDi listening on ";

/// Maximum time to wait for the BiDi endpoint announcement.
const ANNOUNCEMENT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// LaunchOptions
// ============================================================================

/// Configuration for browser launches.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Explicit browser binary; falls back to `VIBIUM_BROWSER`, then the
    /// platform candidate list.
    pub binary: Option<PathBuf>,
    /// Run the browser headless.
    pub headless: bool,
}

// ============================================================================
// LaunchHandle
// ============================================================================

/// A launched (or externally attached) browser.
///
/// Holds the BiDi WebSocket URL and, for launched browsers, the child
/// process and its profile directory. Dropping the handle kills the child
/// and deletes the profile.
pub struct LaunchHandle {
    /// BiDi session endpoint URL.
    ws_url: String,
    /// Child process; `None` for externally attached browsers.
    child: Mutex<Option<Child>>,
    /// Throwaway profile, deleted on drop.
    _profile: Option<TempDir>,
}

impl LaunchHandle {
    /// Wraps an already-running browser exposing a BiDi endpoint.
    ///
    /// The returned handle owns no process; [`LaunchHandle::close`] is a
    /// no-op beyond bookkeeping.
    #[must_use]
    pub fn attach(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            child: Mutex::new(None),
            _profile: None,
        }
    }

    /// The BiDi WebSocket URL to connect to.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Terminates the browser process.
    ///
    /// Idempotent; errors from an already-dead child are ignored.
    pub fn close(&self) {
        let child = self.child.lock().take();
        if let Some(mut child) = child {
            if let Err(e) = child.start_kill() {
                trace!(error = %e, "browser process already gone");
            } else {
                debug!("browser process terminated");
            }
        }
    }
}

impl Drop for LaunchHandle {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Launch
// ============================================================================

/// Launches a browser and waits for its BiDi endpoint.
///
/// # Errors
///
/// Returns [`Error::Launch`] if no binary can be found, the process fails
/// to spawn, or no endpoint announcement arrives within 30 seconds.
pub async fn launch(options: &LaunchOptions) -> Result<LaunchHandle> {
    let binary = resolve_binary(options)?;
    let profile = TempDir::with_prefix("vibium-profile-")
        .map_err(|e| Error::launch(format!("profile dir: {e}")))?;

    let mut cmd = Command::new(&binary);
    cmd.arg("--remote-debugging-port")
        .arg("0")
        .arg("--profile")
        .arg(profile.path())
        .arg("--no-remote")
        .arg("--new-instance");

    if options.headless {
        cmd.arg("--headless");
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::launch(format!("spawn {}: {e}", binary.display())))?;
    let pid = child.id();
    debug!(pid, binary = %binary.display(), "browser process spawned");

    // Both stdio pipes feed one line channel; Firefox has moved the
    // announcement between them across releases.
    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(scan_lines(stdout, line_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(scan_lines(stderr, line_tx));
    }

    let ws_url = timeout(ANNOUNCEMENT_TIMEOUT, async {
        while let Some(line) = line_rx.recv().await {
            if let Some(url) = parse_announcement(&line) {
                return Some(url);
            }
        }
        None
    })
    .await;

    let ws_url = match ws_url {
        Ok(Some(url)) => url,
        Ok(None) => {
            let _ = child.start_kill();
            return Err(Error::launch("browser exited before announcing a BiDi endpoint"));
        }
        Err(_) => {
            let _ = child.start_kill();
            return Err(Error::launch(format!(
                "no BiDi endpoint announced within {}s",
                ANNOUNCEMENT_TIMEOUT.as_secs()
            )));
        }
    };

    info!(pid, url = %ws_url, "browser launched");

    Ok(LaunchHandle {
        ws_url,
        child: Mutex::new(Some(child)),
        _profile: Some(profile),
    })
}

/// Resolves the browser binary from options, environment, or candidates.
fn resolve_binary(options: &LaunchOptions) -> Result<PathBuf> {
    if let Some(path) = &options.binary {
        return Ok(path.clone());
    }

    if let Ok(path) = std::env::var(BROWSER_ENV) {
        return Ok(PathBuf::from(path));
    }

    BROWSER_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or_else(|| {
            Error::launch(format!(
                "no browser binary found; set {BROWSER_ENV} or pass --browser"
            ))
        })
}

/// Extracts the BiDi WebSocket URL from an announcement line.
///
/// The announced URL is the remote agent root; the session endpoint lives
/// at `/session` unless the browser already included a path.
fn parse_announcement(line: &str) -> Option<String> {
    let rest = line.split(BIDI_ANNOUNCEMENT).nth(1)?;
    let url = rest.trim();
    if url.is_empty() {
        return None;
    }

    let base = url.trim_end_matches('/');
    // ws://host:port -> ws://host:port/session
    let has_path = base
        .strip_prefix("ws://")
        .or_else(|| base.strip_prefix("wss://"))
        .is_some_and(|rest| rest.contains('/'));
    if has_path {
        Some(base.to_string())
    } else {
        Some(format!("{base}/session"))
    }
}

/// Forwards child output lines into the channel, then drains to the log.
///
/// Draining keeps the pipe from filling and stalling the browser after the
/// announcement has been consumed.
async fn scan_lines<R: AsyncRead + Unpin + Send + 'static>(
    reader: R,
    tx: mpsc::UnboundedSender<String>,
) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                trace!(target: "vibium::browser", "{line}");
                if tx.send(line).is_err() {
                    // Receiver gone; keep draining.
                    break;
                }
            }
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "error reading browser output");
                return;
            }
        }
    }

    while let Ok(Some(line)) = lines.next_line().await {
        trace!(target: "vibium::browser", "{line}");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_announcement() {
        let url = parse_announcement("WebDriver BiDi listening on ws://127.0.0.1:9222");
        assert_eq!(url.as_deref(), Some("ws://127.0.0.1:9222/session"));
    }

    #[test]
    fn test_parse_announcement_with_path() {
        let url =
            parse_announcement("WebDriver BiDi listening on ws://127.0.0.1:9222/session");
        assert_eq!(url.as_deref(), Some("ws://127.0.0.1:9222/session"));
    }

    #[test]
    fn test_parse_announcement_with_log_prefix() {
        let url = parse_announcement(
            "1700000000000\tRemoteAgent\tINFO\tWebDriver BiDi listening on ws://127.0.0.1:45551",
        );
        assert_eq!(url.as_deref(), Some("ws://127.0.0.1:45551/session"));
    }

    #[test]
    fn test_parse_announcement_ignores_other_lines() {
        assert_eq!(parse_announcement("console.warn: something"), None);
        assert_eq!(parse_announcement(""), None);
    }

    #[test]
    fn test_attach_handle_has_no_child() {
        let handle = LaunchHandle::attach("ws://127.0.0.1:1/session");
        assert_eq!(handle.ws_url(), "ws://127.0.0.1:1/session");
        handle.close();
        handle.close();
    }

    #[test]
    fn test_resolve_binary_prefers_explicit() {
        let options = LaunchOptions {
            binary: Some(PathBuf::from("/opt/custom/firefox")),
            headless: true,
        };
        let binary = resolve_binary(&options).expect("resolve");
        assert_eq!(binary, PathBuf::from("/opt/custom/firefox"));
    }
}
