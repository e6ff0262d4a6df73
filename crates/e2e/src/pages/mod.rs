//! Page objects
//!
//! Each page knows its locators and turns user intentions ("log in", "set
//! up 2FA") into [`TestStep`]s. Pages never talk to the browser themselves;
//! the steps they return are run by a [`crate::session::Session`].
//!
//! Values that are only known at run time are passed as `${var}` references
//! and resolved when the step executes.

pub mod admin;
pub mod user;

use crate::spec::{LoadState, Locator, TestStep, WaitState};

pub use admin::{AdminLoginPage, AdminSigningQueuePage, BaseAdminPage};
pub use user::{
    AccountsPage, BaseUserPage, RegisterPage, SendPage, SettingsSecurityPage, TagColor, TagsPage,
    TransactionSpeed, TransactionsPage, UserLoginPage,
};

pub(crate) fn goto(url: impl Into<String>) -> TestStep {
    TestStep::Navigate { url: url.into(), wait_until: None }
}

pub(crate) fn click(locator: Locator) -> TestStep {
    TestStep::Click { locator, timeout_ms: None }
}

pub(crate) fn fill(locator: Locator, value: impl Into<String>) -> TestStep {
    TestStep::Fill { locator, value: value.into(), native: false }
}

pub(crate) fn check(locator: Locator) -> TestStep {
    TestStep::Check { locator }
}

pub(crate) fn wait_visible(locator: Locator, timeout_ms: u64) -> TestStep {
    TestStep::Wait { locator, timeout_ms, state: WaitState::Visible }
}

pub(crate) fn load_state(state: LoadState) -> TestStep {
    TestStep::WaitForLoadState { state }
}

pub(crate) fn sleep(ms: u64) -> TestStep {
    TestStep::Sleep { ms }
}

pub(crate) fn wait_for_url(pattern: impl Into<String>, timeout_ms: u64) -> TestStep {
    TestStep::WaitForUrl { pattern: pattern.into(), negate: false, timeout_ms }
}

pub(crate) fn wait_away_from(pattern: impl Into<String>, timeout_ms: u64) -> TestStep {
    TestStep::WaitForUrl { pattern: pattern.into(), negate: true, timeout_ms }
}

pub(crate) fn expect_visible(locator: Locator, timeout_ms: u64) -> TestStep {
    TestStep::Assert {
        locator,
        visible: Some(true),
        enabled: None,
        text: None,
        text_contains: None,
        empty: None,
        value: None,
        attribute: None,
        count: None,
        timeout_ms: Some(timeout_ms),
    }
}

pub(crate) fn expect_hidden(locator: Locator, timeout_ms: u64) -> TestStep {
    TestStep::Wait { locator, timeout_ms, state: WaitState::Hidden }
}

pub(crate) fn expect_enabled(locator: Locator, enabled: bool, timeout_ms: u64) -> TestStep {
    TestStep::Assert {
        locator,
        visible: None,
        enabled: Some(enabled),
        text: None,
        text_contains: None,
        empty: None,
        value: None,
        attribute: None,
        count: None,
        timeout_ms: Some(timeout_ms),
    }
}

pub(crate) fn expect_not_empty(locator: Locator, timeout_ms: u64) -> TestStep {
    TestStep::Assert {
        locator,
        visible: None,
        enabled: None,
        text: None,
        text_contains: None,
        empty: Some(false),
        value: None,
        attribute: None,
        count: None,
        timeout_ms: Some(timeout_ms),
    }
}

pub(crate) fn expect_url(pattern: impl Into<String>, timeout_ms: u64) -> TestStep {
    TestStep::AssertUrl { pattern: pattern.into(), negate: false, timeout_ms: Some(timeout_ms) }
}

pub(crate) fn expect_url_not(pattern: impl Into<String>, timeout_ms: u64) -> TestStep {
    TestStep::AssertUrl { pattern: pattern.into(), negate: true, timeout_ms: Some(timeout_ms) }
}

/// Escape text so it can sit inside a `/.../` locator pattern
pub fn regex_escape(text: &str) -> String {
    regex::escape(text).replace('/', "\\/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expect_visible_sets_timeout() {
        match expect_visible(Locator::css("#amount"), 10_000) {
            TestStep::Assert { visible, timeout_ms, enabled, .. } => {
                assert_eq!(visible, Some(true));
                assert_eq!(timeout_ms, Some(10_000));
                assert_eq!(enabled, None);
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_regex_escape() {
        assert_eq!(regex_escape("0.001"), r"0\.001");
        assert_eq!(regex_escape("a/b"), r"a\/b");
    }
}
