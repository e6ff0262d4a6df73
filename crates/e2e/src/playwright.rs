//! Playwright browser automation
//!
//! A single `node` process runs `driver.js` for the whole lifetime of a
//! session, so pages keep their state between steps and values read from
//! the page can feed later steps. Commands and replies are JSON lines.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::spec::{CaptureSource, LoadState, Locator, WaitState};

const DRIVER_SCRIPT: &str = include_str!("driver.js");

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Delay between browser operations, for watching a headed run
    pub slow_mo_ms: u64,

    /// Default timeout of element actions
    pub action_timeout_ms: u64,

    /// Default timeout of navigations
    pub navigation_timeout_ms: u64,

    /// Upper bound for a single driver round trip
    pub command_timeout_secs: u64,

    /// Node executable
    pub node: PathBuf,

    /// Directory that contains `@playwright/test` (or `playwright`)
    pub node_modules: PathBuf,

    /// Directory for screenshots
    pub screenshot_dir: PathBuf,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            slow_mo_ms: 0,
            action_timeout_ms: 15_000,
            navigation_timeout_ms: 30_000,
            command_timeout_secs: 120,
            node: PathBuf::from("node"),
            node_modules: PathBuf::from("node_modules"),
            screenshot_dir: PathBuf::from("test-results/screenshots"),
        }
    }
}

/// Result of executing a test step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub screenshot_path: Option<PathBuf>,
}

/// One condition checked by the driver's `expect` command
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Expectation {
    Visible(bool),
    Enabled(bool),
    Text(String),
    TextContains(String),
    Empty(bool),
    Value(String),
    Attribute {
        name: String,
        value: Option<String>,
        contains: Option<String>,
    },
    Count(usize),
}

/// Commands understood by `driver.js`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DriverCommand {
    Launch {
        browser: Browser,
        headless: bool,
        slow_mo: u64,
    },
    OpenContext {
        name: String,
        base_url: String,
        storage_state: Option<PathBuf>,
        viewport_width: u32,
        viewport_height: u32,
        action_timeout: u64,
        navigation_timeout: u64,
    },
    Goto {
        url: String,
        wait_until: LoadState,
    },
    Click {
        locator: Locator,
        timeout: Option<u64>,
    },
    Fill {
        locator: Locator,
        value: String,
        native: bool,
    },
    Type {
        locator: Option<Locator>,
        text: String,
        delay: u64,
    },
    Press {
        locator: Option<Locator>,
        key: String,
    },
    Check {
        locator: Locator,
    },
    Uncheck {
        locator: Locator,
    },
    Select {
        locator: Locator,
        value: String,
    },
    WaitFor {
        locator: Locator,
        state: WaitState,
        timeout: u64,
    },
    WaitForUrl {
        pattern: String,
        negate: bool,
        timeout: u64,
    },
    WaitForLoadState {
        state: LoadState,
    },
    Expect {
        locator: Locator,
        expectation: Expectation,
        timeout: u64,
    },
    ExpectUrl {
        pattern: String,
        negate: bool,
        timeout: u64,
    },
    Read {
        locator: Locator,
        source: CaptureSource,
        attribute: Option<String>,
        timeout: u64,
    },
    Url,
    IsVisible {
        locator: Locator,
        timeout: u64,
    },
    AcceptNextDialog,
    ClearCookies,
    SaveStorageState {
        path: PathBuf,
    },
    Evaluate {
        script: String,
        arg: Option<serde_json::Value>,
    },
    Screenshot {
        path: PathBuf,
        full_page: bool,
    },
    Close,
}

impl DriverCommand {
    /// Operation name, safe to log (payloads may hold credentials)
    pub fn op(&self) -> &'static str {
        match self {
            DriverCommand::Launch { .. } => "launch",
            DriverCommand::OpenContext { .. } => "open_context",
            DriverCommand::Goto { .. } => "goto",
            DriverCommand::Click { .. } => "click",
            DriverCommand::Fill { .. } => "fill",
            DriverCommand::Type { .. } => "type",
            DriverCommand::Press { .. } => "press",
            DriverCommand::Check { .. } => "check",
            DriverCommand::Uncheck { .. } => "uncheck",
            DriverCommand::Select { .. } => "select",
            DriverCommand::WaitFor { .. } => "wait_for",
            DriverCommand::WaitForUrl { .. } => "wait_for_url",
            DriverCommand::WaitForLoadState { .. } => "wait_for_load_state",
            DriverCommand::Expect { .. } => "expect",
            DriverCommand::ExpectUrl { .. } => "expect_url",
            DriverCommand::Read { .. } => "read",
            DriverCommand::Url => "url",
            DriverCommand::IsVisible { .. } => "is_visible",
            DriverCommand::AcceptNextDialog => "accept_next_dialog",
            DriverCommand::ClearCookies => "clear_cookies",
            DriverCommand::SaveStorageState { .. } => "save_storage_state",
            DriverCommand::Evaluate { .. } => "evaluate",
            DriverCommand::Screenshot { .. } => "screenshot",
            DriverCommand::Close => "close",
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    id: u64,
    #[serde(flatten)]
    command: &'a DriverCommand,
}

#[derive(Debug, Deserialize)]
struct Reply {
    id: Option<u64>,
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

/// Line-oriented transport to the driver.
///
/// Split out of [`PlaywrightHandle`] so the request/reply matching can be
/// exercised against any pair of async streams.
struct Channel<W, R> {
    writer: W,
    lines: Lines<BufReader<R>>,
    next_id: u64,
}

impl<W, R> Channel<W, R>
where
    W: tokio::io::AsyncWrite + Unpin,
    R: tokio::io::AsyncRead + Unpin,
{
    fn new(writer: W, reader: R) -> Self {
        Self { writer, lines: BufReader::new(reader).lines(), next_id: 1 }
    }

    async fn request(&mut self, command: &DriverCommand) -> E2eResult<serde_json::Value> {
        let id = self.next_id;
        self.next_id += 1;

        let mut line = serde_json::to_string(&Envelope { id, command })?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;

        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Err(E2eError::DriverExited(format!(
                    "stdout closed while waiting for '{}'",
                    command.op()
                )));
            };

            let reply: Reply = match serde_json::from_str(&line) {
                Ok(reply) => reply,
                Err(_) => {
                    debug!(target: "driver", "{}", line);
                    continue;
                }
            };

            match reply.id {
                Some(reply_id) if reply_id == id => {}
                Some(stale) if stale < id => continue,
                _ => {
                    return Err(E2eError::Playwright(
                        reply.error.unwrap_or_else(|| "reply out of order".to_string()),
                    ))
                }
            }

            return if reply.ok {
                Ok(reply.value)
            } else {
                Err(E2eError::Playwright(
                    reply.error.unwrap_or_else(|| format!("'{}' failed", command.op())),
                ))
            };
        }
    }
}

/// Playwright browser handle
pub struct PlaywrightHandle {
    child: Child,
    channel: Channel<ChildStdin, ChildStdout>,
    command_timeout: Duration,
    config: PlaywrightConfig,
    _script_dir: tempfile::TempDir,
}

impl PlaywrightHandle {
    /// Start the driver and launch the configured browser
    pub async fn launch(config: &PlaywrightConfig) -> E2eResult<Self> {
        let node_path = absolute(&config.node_modules)?;
        Self::check_playwright_installed(&config.node, &node_path).await?;

        std::fs::create_dir_all(&config.screenshot_dir)?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("driver.js");
        std::fs::write(&script_path, DRIVER_SCRIPT)?;

        debug!("Starting Playwright driver: {}", script_path.display());

        let mut child = Command::new(&config.node)
            .arg(&script_path)
            .env("NODE_PATH", &node_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| E2eError::Playwright(format!("failed to spawn {}: {}", config.node.display(), e)))?;

        let stdin = child.stdin.take().ok_or_else(|| E2eError::DriverExited("no stdin".to_string()))?;
        let stdout = child.stdout.take().ok_or_else(|| E2eError::DriverExited("no stdout".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "driver", "{}", line);
                }
            });
        }

        let mut handle = Self {
            child,
            channel: Channel::new(stdin, stdout),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
            config: config.clone(),
            _script_dir: script_dir,
        };

        let version = handle
            .send(DriverCommand::Launch {
                browser: config.browser,
                headless: config.headless,
                slow_mo: config.slow_mo_ms,
            })
            .await?;
        info!(
            "Launched {} {}",
            config.browser.as_str(),
            version.as_str().unwrap_or_default()
        );

        Ok(handle)
    }

    /// Check if Playwright can be resolved by node
    async fn check_playwright_installed(node: &Path, node_path: &Path) -> E2eResult<()> {
        let status = Command::new(node)
            .args([
                "-e",
                "try { require.resolve('@playwright/test') } catch (e) { require.resolve('playwright') }",
            ])
            .env("NODE_PATH", node_path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    pub fn config(&self) -> &PlaywrightConfig {
        &self.config
    }

    /// Send one command and wait for its reply
    pub async fn send(&mut self, command: DriverCommand) -> E2eResult<serde_json::Value> {
        debug!("driver <- {}", command.op());
        match tokio::time::timeout(self.command_timeout, self.channel.request(&command)).await {
            Ok(result) => result,
            Err(_) => Err(E2eError::Timeout(format!(
                "driver reply to '{}' after {}s",
                command.op(),
                self.command_timeout.as_secs()
            ))),
        }
    }

    /// Open a browser context (or switch back to one opened earlier)
    pub async fn open_context(
        &mut self,
        name: &str,
        base_url: &str,
        storage_state: Option<&Path>,
    ) -> E2eResult<()> {
        let command = DriverCommand::OpenContext {
            name: name.to_string(),
            base_url: base_url.to_string(),
            storage_state: storage_state.map(Path::to_path_buf),
            viewport_width: self.config.viewport_width,
            viewport_height: self.config.viewport_height,
            action_timeout: self.config.action_timeout_ms,
            navigation_timeout: self.config.navigation_timeout_ms,
        };
        self.send(command).await?;
        Ok(())
    }

    /// Screenshot of the current page into the screenshot directory
    pub async fn screenshot(&mut self, name: &str, full_page: bool) -> E2eResult<PathBuf> {
        let path = self.config.screenshot_dir.join(format!("{}.png", sanitize(name)));
        self.send(DriverCommand::Screenshot { path: path.clone(), full_page }).await?;
        Ok(path)
    }

    /// Close the browser and stop the driver
    pub async fn close(mut self) -> E2eResult<()> {
        if let Err(e) = self.send(DriverCommand::Close).await {
            warn!("Driver did not close cleanly: {}", e);
        }

        if tokio::time::timeout(Duration::from_secs(5), self.child.wait()).await.is_ok() {
            return Ok(());
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
                if tokio::time::timeout(Duration::from_secs(2), self.child.wait()).await.is_ok() {
                    return Ok(());
                }
            }
        }

        self.child.kill().await?;
        Ok(())
    }
}

fn absolute(path: &Path) -> E2eResult<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// File-name-safe version of a test or step name
pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    cleaned.trim_matches('_').chars().take(100).collect()
}

/// A fake `playwright` package for running the real driver without a browser
#[cfg(test)]
pub(crate) mod stub {
    use std::path::Path;

    use super::PlaywrightConfig;

    /// Every locator is one enabled element
    const PACKAGE: &str = r#"
function locator() {
  const loc = {
    first: () => loc,
    nth: () => loc,
    filter: () => loc,
    locator: () => loc,
    getByRole: () => loc,
    getByLabel: () => loc,
    getByPlaceholder: () => loc,
    getByText: () => loc,
    isEnabled: async () => true,
  };
  return loc;
}
const page = { ...locator(), on() {}, url: () => 'http://localhost:8000/' };
const context = {
  setDefaultTimeout() {},
  setDefaultNavigationTimeout() {},
  newPage: async () => page,
  close: async () => {},
};
const browser = { version: () => 'stub', newContext: async () => context, close: async () => {} };
module.exports = { chromium: { launch: async () => browser } };
"#;

    /// Install the package under `dir/node_modules` and point a config at it
    pub(crate) fn config(dir: &Path) -> PlaywrightConfig {
        let package = dir.join("node_modules").join("playwright");
        std::fs::create_dir_all(&package).unwrap();
        std::fs::write(package.join("index.js"), PACKAGE).unwrap();

        PlaywrightConfig {
            node_modules: dir.join("node_modules"),
            screenshot_dir: dir.join("screenshots"),
            command_timeout_secs: 10,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{duplex, AsyncReadExt};

    #[test]
    fn test_command_wire_format() {
        let command = DriverCommand::Click { locator: Locator::role("button", "Verify"), timeout: None };
        let value = serde_json::to_value(Envelope { id: 7, command: &command }).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 7,
                "op": "click",
                "locator": { "role": "button", "name": "Verify" },
                "timeout": null
            })
        );
    }

    #[test]
    fn test_expectation_wire_format() {
        let command = DriverCommand::Expect {
            locator: Locator::css("#amount"),
            expectation: Expectation::Enabled(true),
            timeout: 5000,
        };
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value["expectation"], json!({ "kind": "enabled", "value": true }));
        assert_eq!(value["locator"], json!("#amount"));
    }

    #[test]
    fn test_load_state_names() {
        let command = DriverCommand::WaitForLoadState { state: LoadState::NetworkIdle };
        assert_eq!(serde_json::to_value(&command).unwrap()["state"], json!("networkidle"));
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("user otp: login/lockout"), "user_otp__login_lockout");
    }

    #[tokio::test]
    async fn test_channel_matches_replies_by_id() {
        let (client, mut driver) = duplex(4096);
        let (read_half, write_half) = tokio::io::split(client);
        let mut channel = Channel::new(write_half, read_half);

        let fake_driver = tokio::spawn(async move {
            let mut buf = vec![0u8; 1024];
            let n = driver.read(&mut buf).await.unwrap();
            let request: serde_json::Value = serde_json::from_slice(&buf[..n]).unwrap();
            assert_eq!(request["op"], "url");
            let id = request["id"].as_u64().unwrap();
            let replies = format!(
                "some console noise\n{}\n{}\n",
                json!({ "id": 0, "ok": true, "value": "stale" }),
                json!({ "id": id, "ok": true, "value": "http://localhost:8000/dashboard" })
            );
            driver.write_all(replies.as_bytes()).await.unwrap();
            driver
        });

        let value = channel.request(&DriverCommand::Url).await.unwrap();
        assert_eq!(value, json!("http://localhost:8000/dashboard"));
        drop(fake_driver.await.unwrap());
    }

    #[tokio::test]
    async fn test_channel_surfaces_driver_errors() {
        let (client, mut driver) = duplex(4096);
        let (read_half, write_half) = tokio::io::split(client);
        let mut channel = Channel::new(write_half, read_half);

        tokio::spawn(async move {
            let mut buf = vec![0u8; 1024];
            let _ = driver.read(&mut buf).await.unwrap();
            let reply = json!({ "id": 1, "ok": false, "error": "Timeout 5000ms exceeded" });
            driver.write_all(format!("{}\n", reply).as_bytes()).await.unwrap();
            driver
        });

        let err = channel.request(&DriverCommand::ClearCookies).await.unwrap_err();
        assert!(matches!(err, E2eError::Playwright(msg) if msg.contains("Timeout")));
    }

    #[tokio::test]
    async fn test_channel_reports_exited_driver() {
        let (client, driver) = duplex(4096);
        let (read_half, write_half) = tokio::io::split(client);
        let mut channel = Channel::new(write_half, read_half);
        drop(driver);

        let err = channel.request(&DriverCommand::Url).await.unwrap_err();
        assert!(matches!(err, E2eError::DriverExited(_) | E2eError::Io(_)));
    }

    async fn stub_driver(dir: &Path) -> Option<PlaywrightHandle> {
        let config = stub::config(dir);
        match PlaywrightHandle::launch(&config).await {
            Ok(handle) => Some(handle),
            Err(E2eError::PlaywrightNotFound) => {
                eprintln!("node not available, skipping driver test");
                None
            }
            Err(e) => panic!("driver failed to start: {}", e),
        }
    }

    #[tokio::test]
    async fn test_driver_enabled_expectation_checks_the_value() {
        let dir = tempfile::tempdir().unwrap();
        let Some(mut handle) = stub_driver(dir.path()).await else {
            return;
        };
        handle.open_context("main", "http://localhost:8000/", None).await.unwrap();

        let expect_enabled = |value: bool| DriverCommand::Expect {
            locator: Locator::role("button", "/Confirm/i"),
            expectation: Expectation::Enabled(value),
            timeout: 300,
        };

        handle.send(expect_enabled(true)).await.unwrap();

        let err = handle.send(expect_enabled(false)).await.unwrap_err();
        assert!(matches!(&err, E2eError::Playwright(msg) if msg.contains("expected enabled=false")), "{}", err);

        handle.close().await.unwrap();
    }
}
