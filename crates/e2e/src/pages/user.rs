//! User app pages

use serde::{Deserialize, Serialize};

use super::{
    check, click, expect_enabled, expect_hidden, expect_not_empty, expect_url, expect_visible,
    fill, goto, load_state, regex_escape, sleep, wait_for_url, wait_visible,
};
use crate::spec::{CaptureSource, LoadState, Locator, TestStep};

/// Regex matching the account page a wizard redirects to
const ACCOUNT_URL: &str = r"/\/accounts\/[^/]+$/";

fn capture(locator: Locator, var: &str, source: CaptureSource, timeout_ms: u64) -> TestStep {
    TestStep::Capture {
        locator,
        var: var.to_string(),
        source,
        attribute: None,
        pattern: None,
        timeout_ms: Some(timeout_ms),
    }
}

fn continue_button() -> Locator {
    Locator::role("button", "/Continue/i")
}

pub struct BaseUserPage;

impl BaseUserPage {
    /// Menu entries and the heading each one opens
    pub const MENU_ITEMS: &'static [(&'static str, &'static str)] = &[
        ("Dashboard", "/Dashboard/i"),
        ("My Wallets", "/My Wallets/i"),
        ("Send", "/Send Transaction/i"),
        ("Receive", "/Receive/i"),
        ("Transactions", "/Transactions/i"),
        ("Profile", "/Profile/i"),
    ];

    /// Click a sidebar entry by its exact label
    pub fn click_menu_item(name: &str) -> Vec<TestStep> {
        vec![
            click(Locator::text(name).exact().within(Locator::css("aside, nav"))),
            load_state(LoadState::NetworkIdle),
        ]
    }
}

pub struct UserLoginPage;

impl UserLoginPage {
    pub fn email_input() -> Locator {
        Locator::placeholder("/username or email/i")
    }

    pub fn password_input() -> Locator {
        Locator::placeholder("/password/i")
    }

    pub fn sign_in_button() -> Locator {
        Locator::role("button", "/Sign In/i")
    }

    pub fn navigate() -> Vec<TestStep> {
        vec![goto("login")]
    }

    pub fn login(email: &str, password: &str) -> Vec<TestStep> {
        vec![
            fill(Self::email_input(), email),
            fill(Self::password_input(), password),
            click(Self::sign_in_button()),
        ]
    }
}

pub struct RegisterPage;

impl RegisterPage {
    fn input(name: &str) -> Locator {
        Locator::css(format!("input[name=\"{}\"]", name))
    }

    pub fn username_input() -> Locator {
        Self::input("username")
    }

    pub fn email_input() -> Locator {
        Self::input("email")
    }

    pub fn password_input() -> Locator {
        Self::input("password")
    }

    pub fn confirm_password_input() -> Locator {
        Self::input("confirm_password")
    }

    pub fn terms_checkbox() -> Locator {
        Self::input("terms")
    }

    pub fn create_account_button() -> Locator {
        Locator::role("button", "/Create Account/i")
    }

    pub fn navigate() -> Vec<TestStep> {
        vec![goto("register")]
    }

    /// Fill and submit the form; success lands on `/verify-email-sent`
    pub fn register(username: &str, email: &str, password: &str) -> Vec<TestStep> {
        vec![
            fill(Self::username_input(), username),
            fill(Self::email_input(), email),
            fill(Self::password_input(), password),
            fill(Self::confirm_password_input(), password),
            check(Self::terms_checkbox()),
            click(Self::create_account_button()),
        ]
    }

    pub fn expect_on_verify_email_sent() -> Vec<TestStep> {
        vec![expect_url("/verify-email-sent/", 10_000)]
    }

    /// Click "Resend" unless its countdown keeps it disabled
    pub fn click_resend_if_enabled() -> Vec<TestStep> {
        let resend = Locator::css("button:not([disabled]), a").has_text("/Resend/i").first();
        vec![TestStep::IfVisible {
            locator: resend.clone(),
            timeout_ms: 2_000,
            steps: vec![click(resend)],
            else_steps: Vec::new(),
        }]
    }
}

/// Security tab of the settings page, home of the authenticator setup
pub struct SettingsSecurityPage;

impl SettingsSecurityPage {
    pub fn secret_code() -> Locator {
        Locator::css("code[x-text=\"secret\"]")
    }

    pub fn otp_input() -> Locator {
        Locator::placeholder("000000")
    }

    pub fn enable_button() -> Locator {
        Locator::role("button", "/Enable Two-Factor Auth/i")
    }

    pub fn navigate() -> Vec<TestStep> {
        vec![goto("settings"), click(Locator::css(".tab-btn").has_text("Security"))]
    }

    /// Expand the collapsed "Two-Factor Authentication" card
    pub fn open_two_factor_section() -> Vec<TestStep> {
        vec![click(Locator::css("h3").has_text("Two-Factor Authentication"))]
    }

    /// Open the setup modal and read the new secret into `secret_var`
    pub fn start_setup(secret_var: &str) -> Vec<TestStep> {
        let mut steps = Self::open_two_factor_section();
        steps.push(click(Locator::role("button", "/Set Up Authenticator/i")));
        steps.extend(Self::capture_secret(secret_var));
        steps
    }

    pub fn capture_secret(secret_var: &str) -> Vec<TestStep> {
        vec![
            wait_visible(Self::secret_code(), 10_000),
            expect_not_empty(Self::secret_code(), 10_000),
            capture(Self::secret_code(), secret_var, CaptureSource::Text, 10_000),
        ]
    }

    /// From the QR step to the code entry step
    pub fn confirm_backup_codes() -> Vec<TestStep> {
        vec![
            click(continue_button()),
            click(Locator::role("button", "/I've Saved My Codes/i")),
        ]
    }

    /// Type a fresh code for `secret` and submit it.
    ///
    /// The input is bound with Alpine `x-model`, so the value goes through
    /// the native setter.
    pub fn enter_code(secret: &str) -> Vec<TestStep> {
        vec![
            click(Self::otp_input()),
            TestStep::FillTotp {
                locator: Locator::css("input[placeholder=\"000000\"]"),
                secret: secret.to_string(),
                native: true,
            },
            expect_enabled(Self::enable_button(), true, 5_000),
            click(Self::enable_button()),
        ]
    }

    pub fn expect_enabled_and_close() -> Vec<TestStep> {
        vec![
            expect_visible(Locator::text("/Two-Factor Auth Enabled/i"), 15_000),
            click(Locator::role("button", "Continue").exact()),
            load_state(LoadState::NetworkIdle),
        ]
    }

    /// Full authenticator setup; the secret ends up in `secret_var`
    pub fn setup_2fa(secret_var: &str) -> Vec<TestStep> {
        let mut steps = Self::start_setup(secret_var);
        steps.extend(Self::confirm_backup_codes());
        steps.extend(Self::enter_code(&format!("${{{}}}", secret_var)));
        steps.extend(Self::expect_enabled_and_close());
        steps
    }

    /// Regenerate the secret after the confirm dialog; the new one goes to `secret_var`
    pub fn reset_authenticator(secret_var: &str) -> Vec<TestStep> {
        let mut steps = vec![
            TestStep::AcceptNextDialog,
            click(Locator::role("button", "/Reset Authenticator/i")),
        ];
        steps.extend(Self::capture_secret(secret_var));
        steps
    }

    /// The modal rejected the code and 2FA stayed off
    pub fn expect_code_rejected() -> Vec<TestStep> {
        vec![
            expect_visible(Locator::text("/invalid|incorrect|expired|error/i").first(), 10_000),
            expect_hidden(Locator::text("/Two-Factor Auth Enabled/i"), 2_000),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagColor {
    Red,
    Orange,
    Yellow,
    Green,
    #[default]
    Blue,
    Purple,
    Pink,
    Gray,
}

impl TagColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagColor::Red => "red",
            TagColor::Orange => "orange",
            TagColor::Yellow => "yellow",
            TagColor::Green => "green",
            TagColor::Blue => "blue",
            TagColor::Purple => "purple",
            TagColor::Pink => "pink",
            TagColor::Gray => "gray",
        }
    }
}

pub struct TagsPage;

impl TagsPage {
    pub fn navigate() -> Vec<TestStep> {
        vec![goto("tags"), load_state(LoadState::NetworkIdle)]
    }

    pub fn create_tag(name: &str, color: TagColor) -> Vec<TestStep> {
        vec![
            click(Locator::role("button", "/Create Tag|Create Your First Tag/i").first()),
            fill(Locator::css("input[x-ref=\"tagNameInput\"]"), name),
            click(Locator::css(format!("button.color-{}", color.as_str())).first()),
            click(Locator::role("button", "/^Create Tag$/i").within(Locator::css("form"))),
            // the name also sits in each row's hidden edit form
            expect_visible(Locator::text(name).first(), 5_000),
        ]
    }
}

pub struct AccountsPage;

impl AccountsPage {
    pub fn navigate() -> Vec<TestStep> {
        vec![goto("accounts"), load_state(LoadState::NetworkIdle)]
    }

    /// Walk the add-account wizard and read the deposit address into `address_var`.
    ///
    /// The new account's id is kept in `<address_var>_account_id`.
    pub fn create_account(name: &str, tag: Option<&str>, address_var: &str) -> Vec<TestStep> {
        let network = Locator::css("label:has(input[name=\"network_id\"])").first();

        let mut steps = vec![
            goto("accounts/add"),
            load_state(LoadState::DomContentLoaded),
            // asset
            click(Locator::css(".asset-card").first()),
            click(continue_button()),
            // network, loaded after the asset is picked
            load_state(LoadState::NetworkIdle),
            sleep(400),
            wait_visible(network.clone(), 15_000),
            click(network),
            click(continue_button()),
            sleep(400),
            // name, checked for uniqueness as it is typed
            fill(Locator::css("#account_name"), name),
            sleep(500),
            click(continue_button()),
            sleep(400),
        ];

        if let Some(tag) = tag {
            let button = Locator::css("button").has_text(tag).first();
            steps.push(wait_visible(button.clone(), 10_000));
            steps.push(click(button));
        }

        steps.extend([
            click(continue_button()),
            sleep(400),
            click(Locator::role("button", "/Create Account/i")),
            wait_for_url(ACCOUNT_URL, 20_000),
        ]);
        steps.extend(Self::read_address(address_var));
        steps
    }

    /// Open an existing account from the list and read its address
    pub fn get_account_address(name: &str, address_var: &str) -> Vec<TestStep> {
        let mut steps = Self::navigate();
        steps.push(click(Locator::text(name).first()));
        steps.push(wait_for_url(ACCOUNT_URL, 10_000));
        steps.extend(Self::read_address(address_var));
        steps
    }

    /// From an account page, go to its receive page and read the address
    fn read_address(address_var: &str) -> Vec<TestStep> {
        let id_var = format!("{}_account_id", address_var);
        let trigger = Locator::css("button[x-ref=\"assetTrigger\"]");
        // account items of the hidden first step are also dropdown items
        let asset_item = Locator::css("div.dropdown-item:visible").first();
        let address = Locator::css("input.address-input");

        vec![
            TestStep::CaptureUrl {
                var: id_var.clone(),
                pattern: Some(r"/accounts/([^/?#]+)".to_string()),
            },
            goto(format!("receive?account_id=${{{}}}", id_var)),
            load_state(LoadState::DomContentLoaded),
            wait_visible(trigger.clone(), 15_000),
            click(trigger),
            wait_visible(asset_item.clone(), 10_000),
            click(asset_item),
            wait_visible(address.clone(), 10_000),
            expect_not_empty(address.clone(), 10_000),
            capture(address, address_var, CaptureSource::Value, 10_000),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionSpeed {
    Low,
    #[default]
    Medium,
    Fast,
}

impl TransactionSpeed {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionSpeed::Low => "low",
            TransactionSpeed::Medium => "medium",
            TransactionSpeed::Fast => "fast",
        }
    }
}

pub struct SendPage;

impl SendPage {
    pub fn navigate() -> Vec<TestStep> {
        vec![goto("send"), load_state(LoadState::NetworkIdle)]
    }

    /// Create a transfer from the account named `from_account`.
    ///
    /// The submit button stays disabled without balance, so fund the
    /// account first.
    pub fn send(
        from_account: &str,
        to_address: &str,
        amount: &str,
        speed: TransactionSpeed,
    ) -> Vec<TestStep> {
        let asset_box = Locator::css("[x-data*=\"selectedAssetId\"]");
        let unselected_asset = Locator::css("button")
            .has_text(r"/select\s+an?\s+asset/i")
            .first()
            .within(asset_box.clone());
        let first_asset = Locator::css("button").nth(1).within(asset_box);
        let submit = Locator::role("button", "/Create Transaction/i");

        vec![
            click(Locator::css("button").has_text("/Select an account|Select account/i")),
            click(Locator::text(from_account).first().within(Locator::css("[x-data*=\"accounts\"]"))),
            // form is swapped in by HTMX
            wait_visible(Locator::css("#form-container"), 5_000),
            load_state(LoadState::NetworkIdle),
            fill(Locator::css("#to_address_input"), to_address),
            TestStep::IfVisible {
                locator: unselected_asset.clone(),
                timeout_ms: 1_000,
                steps: vec![
                    click(unselected_asset),
                    wait_visible(first_asset.clone(), 10_000),
                    click(first_asset),
                ],
                else_steps: Vec::new(),
            },
            fill(Locator::css("#amount"), amount),
            click(Locator::css("button").has_text(format!("/{}/i", speed.as_str())).first()),
            expect_enabled(submit.clone(), true, 10_000),
            click(submit),
            load_state(LoadState::NetworkIdle),
        ]
    }
}

pub struct TransactionsPage;

impl TransactionsPage {
    fn rows() -> Locator {
        Locator::css("tr, [class*=\"transaction-row\"]")
    }

    pub fn navigate() -> Vec<TestStep> {
        vec![goto("transactions"), load_state(LoadState::NetworkIdle)]
    }

    pub fn expect_transaction_with_amount(amount: &str) -> Vec<TestStep> {
        vec![expect_visible(
            Locator::text(amount).first().within(Locator::css("table, [class*=\"transaction\"]")),
            10_000,
        )]
    }

    /// Status of the first transaction, or the first one showing `amount`
    pub fn expect_transaction_status(status: &str, amount: Option<&str>) -> Vec<TestStep> {
        let row = match amount {
            Some(amount) => Self::rows().has_text(amount).first(),
            None => Self::rows().first(),
        };
        let pattern = format!("/{}/i", regex_escape(status));
        vec![expect_visible(Locator::text(pattern).first().within(row), 10_000)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_2fa_uses_captured_secret() {
        let steps = SettingsSecurityPage::setup_2fa("otp_secret");
        assert!(steps.iter().any(|s| matches!(
            s,
            TestStep::Capture { var, source: CaptureSource::Text, .. } if var == "otp_secret"
        )));
        assert!(steps.iter().any(|s| matches!(
            s,
            TestStep::FillTotp { secret, native: true, .. } if secret == "${otp_secret}"
        )));
        for step in &steps {
            step.validate().unwrap();
        }
    }

    #[test]
    fn test_create_account_reads_address_from_receive_page() {
        let steps = AccountsPage::create_account("Main ETH", Some("green-tag"), "sender_address");
        assert!(steps.iter().any(|s| matches!(
            s,
            TestStep::Navigate { url, .. } if url == "receive?account_id=${sender_address_account_id}"
        )));
        assert!(matches!(
            steps.last(),
            Some(TestStep::Capture { var, source: CaptureSource::Value, .. }) if var == "sender_address"
        ));
        for step in &steps {
            step.validate().unwrap();
        }
    }

    #[test]
    fn test_create_account_without_tag_skips_tag_step() {
        let with_tag = AccountsPage::create_account("a", Some("t"), "addr").len();
        let without = AccountsPage::create_account("a", None, "addr").len();
        assert_eq!(with_tag, without + 2);
    }

    #[test]
    fn test_tag_color_button() {
        let steps = TagsPage::create_tag("green-tag", TagColor::Green);
        assert_eq!(steps[2].name(), "click:button.color-green >> nth=0");
    }

    #[test]
    fn test_send_picks_speed_button() {
        let steps = SendPage::send("Main", "${receiver_address}", "0.001", TransactionSpeed::Fast);
        assert!(steps.iter().any(|s| s.name() == "click:button >> has_text=/fast/i >> nth=0"));
    }

    #[test]
    fn test_transaction_status_scoped_to_row() {
        let steps = TransactionsPage::expect_transaction_status("pending", Some("0.001"));
        assert_eq!(
            steps[0].name(),
            "assert:tr, [class*=\"transaction-row\"] >> has_text=0.001 >> nth=0 >> text=/pending/i >> nth=0"
        );
    }
}
