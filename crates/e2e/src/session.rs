//! Step execution against one browser
//!
//! A [`Session`] owns the Playwright driver for a single test attempt and
//! the variables that attempt captures. Browser work goes to the driver;
//! interpolation, captures, variable checks, TOTP codes and database
//! fixtures are handled here.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use custody_otp::{SharedSecret, TotpGenerator};
use tracing::{debug, info, warn};

use crate::config::{DeploymentConfig, E2eConfig};
use crate::error::{E2eError, E2eResult};
use crate::fixtures::Fixtures;
use crate::playwright::{sanitize, DriverCommand, Expectation, PlaywrightHandle, StepResult};
use crate::spec::{App, Locator, TestStep};
use crate::vars::Vars;

/// Name of the context a session starts in
pub const MAIN_CONTEXT: &str = "main";

/// Codes this close to the end of their window are not typed; the session
/// waits for the next window so the server sees a fresh code.
const MIN_CODE_LIFETIME_SECS: u64 = 3;

const DEFAULT_ASSERT_TIMEOUT_MS: u64 = 5_000;

pub struct Session {
    browser: PlaywrightHandle,
    deployment: DeploymentConfig,
    fixtures: Fixtures,
    vars: Vars,
    test_name: String,
}

impl Session {
    /// Launch a browser and open the main context on `app`
    pub async fn start(
        config: &E2eConfig,
        fixtures: Fixtures,
        test_name: &str,
        app: App,
        storage_state: Option<&Path>,
    ) -> E2eResult<Self> {
        let mut browser = PlaywrightHandle::launch(&config.playwright).await?;
        let base_url = config.deployment.base_url(app).to_string();

        let storage_state = storage_state.filter(|p| {
            let exists = p.exists();
            if !exists {
                warn!("Storage state {} not found, starting logged out", p.display());
            }
            exists
        });
        browser.open_context(MAIN_CONTEXT, &base_url, storage_state).await?;

        Ok(Self {
            browser,
            deployment: config.deployment.clone(),
            fixtures,
            vars: Vars::seeded(config),
            test_name: test_name.to_string(),
        })
    }

    pub fn vars(&self) -> &Vars {
        &self.vars
    }

    pub fn vars_mut(&mut self) -> &mut Vars {
        &mut self.vars
    }

    /// Run steps in order, stopping at the first failure.
    ///
    /// A failing step gets a screenshot; its result is the last one returned.
    pub async fn run_steps(&mut self, steps: &[TestStep]) -> Vec<StepResult> {
        let mut results = Vec::with_capacity(steps.len());

        for (i, step) in steps.iter().enumerate() {
            let step_name = step.name();
            let start = Instant::now();
            debug!("Executing step: {}", step_name);

            match self.execute_step(step).await {
                Ok(()) => results.push(StepResult {
                    success: true,
                    step_name,
                    duration_ms: start.elapsed().as_millis() as u64,
                    error: None,
                    screenshot_path: None,
                }),
                Err(e) => {
                    let screenshot_path = self.failure_screenshot(i).await;
                    results.push(StepResult {
                        success: false,
                        step_name,
                        duration_ms: start.elapsed().as_millis() as u64,
                        error: Some(e.to_string()),
                        screenshot_path,
                    });
                    break;
                }
            }
        }

        results
    }

    async fn failure_screenshot(&mut self, step_index: usize) -> Option<PathBuf> {
        let name = format!("{}-step{}-failure", sanitize(&self.test_name), step_index + 1);
        match self.browser.screenshot(&name, true).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Could not capture failure screenshot: {}", e);
                None
            }
        }
    }

    async fn execute_steps(&mut self, steps: &[TestStep]) -> E2eResult<()> {
        for step in steps {
            debug!("Executing nested step: {}", step.name());
            Box::pin(self.execute_step(step)).await?;
        }
        Ok(())
    }

    /// Execute a single test step
    pub async fn execute_step(&mut self, step: &TestStep) -> E2eResult<()> {
        match step {
            TestStep::Navigate { url, wait_until } => {
                let url = self.text(url)?;
                self.send(DriverCommand::Goto { url, wait_until: wait_until.unwrap_or_default() })
                    .await
            }
            TestStep::Click { locator, timeout_ms } => {
                let locator = self.locator(locator)?;
                self.send(DriverCommand::Click { locator, timeout: *timeout_ms }).await
            }
            TestStep::Fill { locator, value, native } => {
                let locator = self.locator(locator)?;
                let value = self.text(value)?;
                self.send(DriverCommand::Fill { locator, value, native: *native }).await
            }
            TestStep::Type { locator, text, delay_ms } => {
                let locator = locator.as_ref().map(|l| self.locator(l)).transpose()?;
                let text = self.text(text)?;
                self.send(DriverCommand::Type { locator, text, delay: delay_ms.unwrap_or(0) }).await
            }
            TestStep::Press { locator, key } => {
                let locator = locator.as_ref().map(|l| self.locator(l)).transpose()?;
                self.send(DriverCommand::Press { locator, key: key.clone() }).await
            }
            TestStep::Check { locator } => {
                let locator = self.locator(locator)?;
                self.send(DriverCommand::Check { locator }).await
            }
            TestStep::Uncheck { locator } => {
                let locator = self.locator(locator)?;
                self.send(DriverCommand::Uncheck { locator }).await
            }
            TestStep::Select { locator, value } => {
                let locator = self.locator(locator)?;
                let value = self.text(value)?;
                self.send(DriverCommand::Select { locator, value }).await
            }
            TestStep::Wait { locator, timeout_ms, state } => {
                let locator = self.locator(locator)?;
                self.send(DriverCommand::WaitFor { locator, state: *state, timeout: *timeout_ms })
                    .await
            }
            TestStep::WaitForUrl { pattern, negate, timeout_ms } => {
                let pattern = self.text(pattern)?;
                self.send(DriverCommand::WaitForUrl { pattern, negate: *negate, timeout: *timeout_ms })
                    .await
            }
            TestStep::WaitForLoadState { state } => {
                self.send(DriverCommand::WaitForLoadState { state: *state }).await
            }
            TestStep::Sleep { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(())
            }
            TestStep::Assert {
                locator,
                visible,
                enabled,
                text,
                text_contains,
                empty,
                value,
                attribute,
                count,
                timeout_ms,
            } => {
                let locator = self.locator(locator)?;
                let timeout = timeout_ms.unwrap_or(DEFAULT_ASSERT_TIMEOUT_MS);

                let mut expectations = Vec::new();
                if let Some(v) = visible {
                    expectations.push(Expectation::Visible(*v));
                }
                if let Some(v) = enabled {
                    expectations.push(Expectation::Enabled(*v));
                }
                if let Some(t) = text {
                    expectations.push(Expectation::Text(self.text(t)?));
                }
                if let Some(t) = text_contains {
                    expectations.push(Expectation::TextContains(self.text(t)?));
                }
                if let Some(v) = empty {
                    expectations.push(Expectation::Empty(*v));
                }
                if let Some(v) = value {
                    expectations.push(Expectation::Value(self.text(v)?));
                }
                if let Some(attr) = attribute {
                    expectations.push(Expectation::Attribute {
                        name: attr.name.clone(),
                        value: attr.value.as_deref().map(|v| self.text(v)).transpose()?,
                        contains: attr.contains.as_deref().map(|v| self.text(v)).transpose()?,
                    });
                }
                if let Some(n) = count {
                    expectations.push(Expectation::Count(*n));
                }
                if expectations.is_empty() {
                    expectations.push(Expectation::Visible(true));
                }

                for expectation in expectations {
                    self.browser
                        .send(DriverCommand::Expect { locator: locator.clone(), expectation, timeout })
                        .await
                        .map_err(|e| E2eError::AssertionFailed(format!("{}: {}", locator.describe(), e)))?;
                }
                Ok(())
            }
            TestStep::AssertUrl { pattern, negate, timeout_ms } => {
                let pattern = self.text(pattern)?;
                self.browser
                    .send(DriverCommand::ExpectUrl {
                        pattern,
                        negate: *negate,
                        timeout: timeout_ms.unwrap_or(DEFAULT_ASSERT_TIMEOUT_MS),
                    })
                    .await
                    .map(|_| ())
                    .map_err(|e| E2eError::AssertionFailed(e.to_string()))
            }
            TestStep::Capture { locator, var, source, attribute, pattern, timeout_ms } => {
                let locator = self.locator(locator)?;
                let raw = self
                    .browser
                    .send(DriverCommand::Read {
                        locator: locator.clone(),
                        source: *source,
                        attribute: attribute.clone(),
                        timeout: timeout_ms.unwrap_or(DEFAULT_ASSERT_TIMEOUT_MS),
                    })
                    .await?;
                let raw = raw.as_str().ok_or_else(|| {
                    E2eError::AssertionFailed(format!("{} has no {:?} to capture", locator.describe(), source))
                })?;
                let value = self.extract(raw, pattern.as_deref())?;
                self.store(var, value);
                Ok(())
            }
            TestStep::CaptureUrl { var, pattern } => {
                let url = self.browser.send(DriverCommand::Url).await?;
                let url = url.as_str().unwrap_or_default().to_string();
                let value = self.extract(&url, pattern.as_deref())?;
                self.store(var, value);
                Ok(())
            }
            TestStep::AssertVar { var, matches, equals, not_equals, min_len } => {
                let actual = self.vars.require(var)?.to_string();
                check_var(
                    var,
                    &actual,
                    matches.as_deref().map(|p| self.text(p)).transpose()?.as_deref(),
                    equals.as_deref().map(|v| self.text(v)).transpose()?.as_deref(),
                    not_equals.as_deref().map(|v| self.text(v)).transpose()?.as_deref(),
                    *min_len,
                )
            }
            TestStep::FillTotp { locator, secret, native } => {
                let locator = self.locator(locator)?;
                let value = self.totp(secret).await?;
                self.send(DriverCommand::Fill { locator, value, native: *native }).await
            }
            TestStep::TypeTotp { secret, delay_ms } => {
                let text = self.totp(secret).await?;
                self.send(DriverCommand::Type { locator: None, text, delay: delay_ms.unwrap_or(50) })
                    .await
            }
            TestStep::AcceptNextDialog => self.send(DriverCommand::AcceptNextDialog).await,
            TestStep::ClearCookies => self.send(DriverCommand::ClearCookies).await,
            TestStep::SaveStorageState { path } => {
                let path = PathBuf::from(self.text(path)?);
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                self.send(DriverCommand::SaveStorageState { path: path.clone() }).await?;
                info!("Saved session state to {}", path.display());
                Ok(())
            }
            TestStep::SwitchContext { name, app, storage_state } => {
                let base_url = self.deployment.base_url(app.unwrap_or_default()).to_string();
                let storage_state = storage_state.as_deref().map(|p| self.text(p)).transpose()?;
                self.browser
                    .open_context(name, &base_url, storage_state.as_deref().map(Path::new))
                    .await
            }
            TestStep::IfVisible { locator, timeout_ms, steps, else_steps } => {
                let locator = self.locator(locator)?;
                let visible = self
                    .browser
                    .send(DriverCommand::IsVisible { locator: locator.clone(), timeout: *timeout_ms })
                    .await?
                    .as_bool()
                    .unwrap_or(false);
                debug!("{} visible: {}", locator.describe(), visible);
                if visible {
                    self.execute_steps(steps).await
                } else {
                    self.execute_steps(else_steps).await
                }
            }
            TestStep::Evaluate { script, arg, var } => {
                let arg = arg.as_ref().map(|a| self.json(a)).transpose()?;
                let result = self
                    .browser
                    .send(DriverCommand::Evaluate { script: script.clone(), arg })
                    .await?;
                if let Some(var) = var {
                    let value = match result {
                        serde_json::Value::String(s) => s,
                        serde_json::Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    self.store(var, value);
                }
                Ok(())
            }
            TestStep::Screenshot { name, full_page } => {
                let name = self.text(name)?;
                let path = self.browser.screenshot(&name, *full_page).await?;
                info!("Screenshot saved to {}", path.display());
                Ok(())
            }
            TestStep::VerifyEmail { email } => {
                let email = self.text(email)?;
                self.fixtures.verify_user_email(&email).await?;
                info!("Verified email of {}", email);
                Ok(())
            }
            TestStep::FundAccount { address, eth } => {
                let address = self.text(address)?;
                let eth = self.text(eth)?;
                self.fixtures.fund_account_with_test_eth(&address, &eth).await?;
                info!("Funded {} with {} test ETH", address, eth);
                Ok(())
            }
            TestStep::CaptureVerificationToken { email, var } => {
                let email = self.text(email)?;
                let token = self.fixtures.verification_token(&email).await?;
                self.store(var, token);
                Ok(())
            }
            TestStep::AssertEmailVerified { email, expected } => {
                let email = self.text(email)?;
                let verified = self.fixtures.is_email_verified(&email).await?;
                if verified != *expected {
                    return Err(E2eError::AssertionFailed(format!(
                        "email_verified of {} is {}, expected {}",
                        email, verified, expected
                    )));
                }
                Ok(())
            }
            TestStep::Log { message } => {
                info!("[TEST LOG] {}", self.text(message)?);
                Ok(())
            }
        }
    }

    /// Close the browser and stop the driver
    pub async fn close(self) -> E2eResult<()> {
        self.browser.close().await
    }

    async fn send(&mut self, command: DriverCommand) -> E2eResult<()> {
        self.browser.send(command).await.map(|_| ())
    }

    fn text(&self, input: &str) -> E2eResult<String> {
        self.vars.interpolate(input)
    }

    fn locator(&self, locator: &Locator) -> E2eResult<Locator> {
        locator.try_map_text(&|s: &str| self.vars.interpolate(s))
    }

    fn json(&self, value: &serde_json::Value) -> E2eResult<serde_json::Value> {
        use serde_json::Value;
        Ok(match value {
            Value::String(s) => Value::String(self.text(s)?),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.json(v)).collect::<E2eResult<_>>()?)
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), self.json(v)?)))
                    .collect::<E2eResult<_>>()?,
            ),
            other => other.clone(),
        })
    }

    fn extract(&self, raw: &str, pattern: Option<&str>) -> E2eResult<String> {
        let raw = raw.trim();
        match pattern {
            None => Ok(raw.to_string()),
            Some(pattern) => extract(raw, &self.text(pattern)?),
        }
    }

    fn store(&mut self, var: &str, value: String) {
        if Vars::is_secret(var) {
            info!("Captured {} ({} chars)", var, value.len());
        } else {
            info!("Captured {} = {}", var, value);
        }
        self.vars.set(var, value);
    }

    /// Current code for `secret`, waiting out the tail of a window
    async fn totp(&self, secret: &str) -> E2eResult<String> {
        let secret = SharedSecret::parse(&self.text(secret)?)?;
        let generator = TotpGenerator::new(&secret);

        let now = custody_otp::now_unix();
        let remaining = generator.seconds_remaining_at(now);
        if remaining < MIN_CODE_LIFETIME_SECS {
            debug!("TOTP window closes in {}s, waiting for the next one", remaining);
            tokio::time::sleep(Duration::from_secs(remaining)).await;
            return Ok(generator.generate_now());
        }
        Ok(generator.generate_at(now))
    }
}

/// Apply a capture pattern: group 1 when present, else the whole match
fn extract(raw: &str, pattern: &str) -> E2eResult<String> {
    let re = regex::Regex::new(pattern)?;
    let captures = re
        .captures(raw)
        .ok_or_else(|| E2eError::AssertionFailed(format!("'{}' does not match /{}/", raw, pattern)))?;
    let m = captures.get(1).or_else(|| captures.get(0));
    Ok(m.map(|m| m.as_str().to_string()).unwrap_or_default())
}

fn check_var(
    name: &str,
    actual: &str,
    matches: Option<&str>,
    equals: Option<&str>,
    not_equals: Option<&str>,
    min_len: Option<usize>,
) -> E2eResult<()> {
    let shown = if Vars::is_secret(name) { "<redacted>" } else { actual };

    if let Some(pattern) = matches {
        if !regex::Regex::new(pattern)?.is_match(actual) {
            return Err(E2eError::AssertionFailed(format!(
                "${{{}}} = '{}' does not match /{}/",
                name, shown, pattern
            )));
        }
    }
    if let Some(expected) = equals {
        if actual != expected {
            return Err(E2eError::AssertionFailed(format!("${{{}}} = '{}' differs", name, shown)));
        }
    }
    if let Some(other) = not_equals {
        if actual == other {
            return Err(E2eError::AssertionFailed(format!("${{{}}} did not change", name)));
        }
    }
    if let Some(min) = min_len {
        if actual.len() < min {
            return Err(E2eError::AssertionFailed(format!(
                "${{{}}} has {} chars, expected at least {}",
                name,
                actual.len(),
                min
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("http://localhost:8000/accounts/7f3c/receive", "/accounts/([^/?#]+)", "7f3c" ; "group one")]
    #[test_case("Balance: 1.5 ETH", r"\d+\.\d+", "1.5" ; "whole match")]
    #[test_case("  JBSWY3DPEHPK3PXP ", "^[A-Z2-7]+$", "JBSWY3DPEHPK3PXP" ; "anchored")]
    fn test_extract(raw: &str, pattern: &str, expected: &str) {
        assert_eq!(extract(raw.trim(), pattern).unwrap(), expected);
    }

    #[test]
    fn test_extract_without_match_fails() {
        assert!(matches!(
            extract("http://localhost:8000/login", "/accounts/([^/]+)"),
            Err(E2eError::AssertionFailed(_))
        ));
    }

    #[test]
    fn test_check_var_base32_secret() {
        assert!(check_var("otp_secret", "JBSWY3DPEHPK3PXP", Some("^[A-Z2-7]+=*$"), None, None, Some(16)).is_ok());
        let err = check_var("otp_secret", "jbsw-1", Some("^[A-Z2-7]+=*$"), None, None, None).unwrap_err();
        assert!(!err.to_string().contains("jbsw-1"));
    }

    #[test]
    fn test_check_var_changed_after_reset() {
        let err = check_var("new_secret", "AAAA", None, None, Some("AAAA"), None).unwrap_err();
        assert!(err.to_string().contains("did not change"));
        assert!(check_var("new_secret", "BBBB", None, None, Some("AAAA"), None).is_ok());
    }

    #[test]
    fn test_check_var_equals_and_length() {
        assert!(check_var("address", "0xabc", None, Some("0xabc"), None, Some(5)).is_ok());
        assert!(check_var("address", "0xabc", None, Some("0xabd"), None, None).is_err());
        assert!(check_var("address", "0xabc", None, None, None, Some(42)).is_err());
    }
}
