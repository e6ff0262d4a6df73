//! Admin console pages

use super::{
    click, expect_enabled, expect_visible, fill, goto, load_state, regex_escape, sleep,
    wait_away_from, wait_visible,
};
use crate::spec::{LoadState, Locator, TestStep};

pub struct AdminLoginPage;

impl AdminLoginPage {
    pub fn email_input() -> Locator {
        Locator::label("/Email/i")
    }

    pub fn password_input() -> Locator {
        Locator::label("/Password/i")
    }

    pub fn sign_in_button() -> Locator {
        Locator::role("button", "/Sign In/i")
    }

    /// Six single-digit boxes shown after the password when 2FA is on
    pub fn otp_container() -> Locator {
        Locator::css("[x-ref=\"otpContainer\"]")
    }

    pub fn navigate() -> Vec<TestStep> {
        vec![goto("login")]
    }

    /// Log in and wait until the console leaves the login page.
    ///
    /// With `otp_secret` set, the code is typed into the OTP boxes when the
    /// console asks for one.
    pub fn login(email: &str, password: &str, otp_secret: Option<&str>) -> Vec<TestStep> {
        let mut steps = vec![
            wait_visible(Self::email_input(), 5_000),
            fill(Self::email_input(), email),
            fill(Self::password_input(), password),
            expect_enabled(Self::sign_in_button(), true, 5_000),
            click(Self::sign_in_button()),
        ];

        if let Some(secret) = otp_secret {
            let first_box = Locator::css("input").first().within(Self::otp_container());
            steps.push(load_state(LoadState::DomContentLoaded));
            steps.push(TestStep::IfVisible {
                locator: Self::otp_container(),
                timeout_ms: 2_000,
                steps: vec![
                    wait_visible(first_box.clone(), 5_000),
                    click(first_box),
                    TestStep::TypeTotp { secret: secret.to_string(), delay_ms: None },
                    sleep(300),
                    click(Locator::role("button", "/Verify/i")),
                ],
                else_steps: Vec::new(),
            });
        }

        steps.push(wait_away_from("/login", 15_000));
        steps
    }
}

/// Sidebar shared by all console pages
pub struct BaseAdminPage;

impl BaseAdminPage {
    /// Menu entries and the heading each one opens
    pub const SECTIONS: &'static [(&'static str, &'static str)] = &[
        ("Dashboard", "/Dashboard/i"),
        ("Users", "/Users/i"),
        ("Wallets", "/Wallets/i"),
        ("Transactions", "/Transactions/i"),
        ("Signing Queue", "/Signing Queue/i"),
        ("Networks", "/Networks/i"),
        ("Assets", "/Assets/i"),
        ("Audit Logs", "/Audit Logs/i"),
    ];

    pub fn logout_button() -> Locator {
        Locator::role("button", "Logout")
    }

    /// Open a section from the sidebar and check its heading
    pub fn open_section(name: &str, heading: &str) -> Vec<TestStep> {
        let link = Locator::css("aside a, nav a").has_text(name).first();
        vec![
            expect_visible(link.clone(), 5_000),
            click(link),
            expect_visible(Locator::role("heading", heading).first(), 10_000),
            super::expect_url_not("login", 1_000),
        ]
    }
}

pub struct AdminSigningQueuePage;

impl AdminSigningQueuePage {
    fn needs_export_badges() -> Locator {
        Locator::css(".badge-warning").has_text("/Needs Export/i")
    }

    pub fn navigate() -> Vec<TestStep> {
        vec![goto("signing?tab=signing_required"), load_state(LoadState::NetworkIdle)]
    }

    /// A transaction waiting for export, optionally to `to_address` with `amount`
    pub fn expect_transaction_in_queue(to_address: &str, amount: Option<&str>) -> Vec<TestStep> {
        let mut steps = vec![expect_visible(Self::needs_export_badges().first(), 15_000)];

        if !to_address.is_empty() {
            steps.push(TestStep::IfVisible {
                locator: Locator::css("#expand-all-btn"),
                timeout_ms: 1_000,
                steps: vec![click(Locator::css("#expand-all-btn")), sleep(500)],
                else_steps: Vec::new(),
            });
            steps.push(expect_visible(Locator::text(to_address).first(), 5_000));
        }

        if let Some(amount) = amount {
            let pattern = format!("/{}/", regex_escape(amount));
            steps.push(expect_visible(Locator::text(pattern).first(), 5_000));
        }

        steps
    }

    /// At least `min_count` transactions wait for export
    pub fn expect_queue_not_empty(min_count: usize) -> Vec<TestStep> {
        let index = min_count.max(1) as i32 - 1;
        vec![expect_visible(Self::needs_export_badges().nth(index), 15_000)]
    }
}
