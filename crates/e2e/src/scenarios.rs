//! Built-in scenarios
//!
//! Flows that are easier to compose from page objects than to write as YAML:
//! saving logged-in sessions, the navigation smoke checks, the 2FA life cycle
//! and the end-to-end happy path. Every user flow registers its own user
//! (`${username}`, `${user_email}`), so scenarios never share server state.
//! The smoke checks reuse the sessions saved by the setup projects.

use crate::config::E2eConfig;
use crate::pages::{
    click, expect_enabled, expect_hidden, expect_url, expect_url_not, expect_visible, fill, goto,
    load_state, sleep, wait_for_url, wait_visible, AccountsPage, AdminLoginPage,
    AdminSigningQueuePage, BaseAdminPage, BaseUserPage, RegisterPage, SendPage, SettingsSecurityPage, TagColor, TagsPage,
    TransactionSpeed, TransactionsPage, UserLoginPage,
};
use crate::session::MAIN_CONTEXT;
use crate::spec::{App, AttributeAssertion, LoadState, Locator, TestSpec, TestStep};

const SEND_AMOUNT: &str = "0.001";
const ETH_ADDRESS: &str = "^0x[a-fA-F0-9]{40}$";
const BASE32_SECRET: &str = "^[A-Z2-7]+=*$";
const INVALID_CODE: &str = r"/Invalid authentication code\. Please try again/i";
const LOCKED: &str = r"/Too many failed attempts\. Your account is locked for 30 minutes/i";

/// All built-in scenarios
pub fn all(config: &E2eConfig) -> Vec<TestSpec> {
    let mut specs = setup(config);
    specs.extend(admin_smoke());
    specs.extend(user_smoke());
    specs.extend(otp_setup());
    specs.extend(otp_login());
    specs.extend(otp_reset());
    specs.extend(security_settings());
    specs.extend(register());
    specs.push(happy_path(config));
    specs
}

fn step(steps: impl IntoIterator<Item = Vec<TestStep>>) -> Vec<TestStep> {
    steps.into_iter().flatten().collect()
}

fn user_spec(name: &str, suite: &str, steps: Vec<TestStep>) -> TestSpec {
    TestSpec::new(name, format!("user/{}", suite), steps).on(App::User).fresh()
}

fn assert_var_matches(var: &str, pattern: &str, min_len: Option<usize>) -> TestStep {
    TestStep::AssertVar {
        var: var.to_string(),
        matches: Some(pattern.to_string()),
        equals: None,
        not_equals: None,
        min_len,
    }
}

fn assert_var_changed(var: &str, previous: &str) -> TestStep {
    TestStep::AssertVar {
        var: var.to_string(),
        matches: None,
        equals: None,
        not_equals: Some(format!("${{{}}}", previous)),
        min_len: None,
    }
}

fn expect_attribute(locator: Locator, name: &str, value: &str) -> TestStep {
    TestStep::Assert {
        locator,
        visible: None,
        enabled: None,
        text: None,
        text_contains: None,
        empty: None,
        value: None,
        attribute: Some(AttributeAssertion {
            name: name.to_string(),
            value: Some(value.to_string()),
            contains: None,
        }),
        count: None,
        timeout_ms: Some(5_000),
    }
}

fn otp_login_input() -> Locator {
    Locator::css("input[name=\"code\"]")
}

fn verify_button() -> Locator {
    Locator::role("button", "/Verify/i")
}

fn two_factor_heading() -> Locator {
    Locator::css("h3").has_text("Two-Factor Authentication")
}

/// Register the run's generated user and land on `/verify-email-sent`
fn register_user() -> Vec<TestStep> {
    step([
        RegisterPage::navigate(),
        RegisterPage::register("${username}", "${user_email}", "${user_password}"),
        vec![wait_for_url("/verify-email-sent/", 10_000)],
    ])
}

/// Register, verify the email through the database and log in
fn register_and_login() -> Vec<TestStep> {
    step([
        register_user(),
        vec![TestStep::VerifyEmail { email: "${user_email}".to_string() }],
        UserLoginPage::navigate(),
        UserLoginPage::login("${user_email}", "${user_password}"),
        vec![expect_url_not("/login/", 10_000)],
    ])
}

/// A logged-in user with the authenticator set up; secret in `${otp_secret}`
fn user_with_2fa() -> Vec<TestStep> {
    step([
        register_and_login(),
        SettingsSecurityPage::navigate(),
        SettingsSecurityPage::setup_2fa("otp_secret"),
    ])
}

/// From a fresh login to the OTP form
fn login_until_otp_form() -> Vec<TestStep> {
    step([
        vec![TestStep::ClearCookies],
        UserLoginPage::navigate(),
        UserLoginPage::login("${user_email}", "${user_password}"),
        vec![expect_visible(otp_login_input(), 8_000)],
    ])
}

/// Expand the 2FA card of the security tab after the settings page reloads
fn reopen_two_factor_section() -> Vec<TestStep> {
    step([
        SettingsSecurityPage::navigate(),
        SettingsSecurityPage::open_two_factor_section(),
        vec![sleep(400)],
    ])
}

fn submit_wrong_code(code: &str) -> Vec<TestStep> {
    vec![fill(otp_login_input(), code), click(verify_button())]
}

fn setup(config: &E2eConfig) -> Vec<TestSpec> {
    let admin_otp = config.credentials.admin_otp_secret.as_ref().map(|_| "${admin_otp_secret}");
    let admin_auth = config.auth_file(App::Admin).display().to_string();
    let user_auth = config.auth_file(App::User).display().to_string();

    let admin = TestSpec::new(
        "authenticate admin",
        "setup/admin.setup",
        step([
            AdminLoginPage::navigate(),
            AdminLoginPage::login("${admin_email}", "${admin_password}", admin_otp),
            vec![
                goto(""),
                expect_visible(Locator::role("link", "/Dashboard/i"), 10_000),
                TestStep::SaveStorageState { path: admin_auth },
            ],
        ]),
    )
    .describe("Log in to the admin console and save the session")
    .on(App::Admin)
    .fresh()
    .tagged(&["setup"]);

    let user = TestSpec::new(
        "authenticate user",
        "setup/user.setup",
        vec![
            goto("login"),
            fill(Locator::role("textbox", "/Email/i"), "${existing_user_email}"),
            fill(Locator::role("textbox", "/Password/i"), "${existing_user_password}"),
            click(Locator::role("button", "/Sign In|Login/i")),
            expect_visible(Locator::text("/Dashboard|Wallet|Withdraw/i").first(), 15_000),
            TestStep::SaveStorageState { path: user_auth },
        ],
    )
    .describe("Log in as the seeded user and save the session")
    .on(App::User)
    .fresh()
    .tagged(&["setup"]);

    vec![admin, user]
}

/// One check per sidebar section, plus the logout button
fn admin_smoke() -> Vec<TestSpec> {
    let smoke = |name: String, steps: Vec<TestStep>| {
        TestSpec::new(name, "admin/smoke", steps).on(App::Admin).tagged(&["smoke", "navigation"])
    };

    let mut specs: Vec<TestSpec> = BaseAdminPage::SECTIONS
        .iter()
        .map(|(section, heading)| {
            smoke(
                format!("admin smoke: {} opens", section),
                step([vec![goto("")], BaseAdminPage::open_section(section, heading)]),
            )
        })
        .collect();
    specs.push(smoke(
        "admin smoke: logout button is visible".to_string(),
        vec![goto(""), expect_visible(BaseAdminPage::logout_button(), 10_000)],
    ));
    specs
}

/// One check per menu item, each starting from the dashboard
fn user_smoke() -> Vec<TestSpec> {
    BaseUserPage::MENU_ITEMS
        .iter()
        .map(|(item, heading)| {
            TestSpec::new(
                format!("user smoke: {} opens", item),
                "user/smoke",
                step([
                    vec![goto("dashboard")],
                    BaseUserPage::click_menu_item(item),
                    vec![expect_visible(Locator::role("heading", *heading).first(), 10_000)],
                ]),
            )
            .on(App::User)
            .tagged(&["smoke", "navigation"])
        })
        .collect()
}

fn otp_setup() -> Vec<TestSpec> {
    let open_setup_modal = step([
        register_and_login(),
        SettingsSecurityPage::navigate(),
        SettingsSecurityPage::start_setup("otp_secret"),
    ]);

    vec![
        user_spec(
            "otp setup: email verification redirects to settings",
            "otp_setup",
            step([
                register_user(),
                vec![
                    TestStep::CaptureVerificationToken {
                        email: "${user_email}".to_string(),
                        var: "verification_token".to_string(),
                    },
                    goto("verify-email?token=${verification_token}"),
                    load_state(LoadState::DomContentLoaded),
                    fill(Locator::css("input[name=\"identifier\"]"), "${user_email}"),
                    fill(Locator::css("input[name=\"password\"]"), "${user_password}"),
                    click(Locator::role("button", "/Sign In/i")),
                    expect_url("/settings/", 10_000),
                    expect_visible(two_factor_heading(), 8_000),
                    click(two_factor_heading()),
                    expect_visible(Locator::role("button", "/Set Up Authenticator/i"), 5_000),
                ],
            ]),
        )
        .tagged(&["otp"]),
        user_spec(
            "otp setup: pages stay locked until 2fa is set up",
            "otp_setup",
            step([
                register_and_login(),
                vec![
                    goto("accounts"),
                    sleep(1_000),
                    expect_visible(Locator::text("Secure Your Account"), 5_000),
                    expect_visible(
                        Locator::text(
                            "/Two-factor authentication adds an extra layer of security/i",
                        ),
                        5_000,
                    ),
                    expect_visible(Locator::role("link", "/Set Up Authenticator/i"), 5_000),
                    expect_visible(
                        Locator::text("/Required to access your accounts and transactions/i"),
                        5_000,
                    ),
                ],
            ]),
        )
        .tagged(&["otp"]),
        user_spec(
            "otp setup: qr code is shown",
            "otp_setup",
            step([
                open_setup_modal.clone(),
                vec![expect_visible(
                    Locator::css(
                        "img[src*=\"data:image\"], img[alt*=\"QR\"], img[alt*=\"qr\"], canvas, svg",
                    )
                    .first(),
                    8_000,
                )],
            ]),
        )
        .tagged(&["otp"]),
        user_spec(
            "otp setup: secret is shown as base32 text",
            "otp_setup",
            step([
                open_setup_modal.clone(),
                vec![assert_var_matches("otp_secret", BASE32_SECRET, Some(16))],
            ]),
        )
        .tagged(&["otp"]),
        user_spec(
            "otp setup: instructions are present",
            "otp_setup",
            step([
                open_setup_modal.clone(),
                vec![
                    expect_visible(Locator::text("/Download Google Authenticator/i"), 5_000),
                    expect_visible(Locator::text("/scan the QR code/i"), 5_000),
                    expect_visible(Locator::text("/enter the 6.?digit code/i").first(), 5_000),
                ],
            ]),
        )
        .tagged(&["otp"]),
        user_spec(
            "otp setup: confirmation input takes six digits",
            "otp_setup",
            step([
                open_setup_modal,
                SettingsSecurityPage::confirm_backup_codes(),
                vec![
                    expect_visible(SettingsSecurityPage::otp_input(), 8_000),
                    expect_attribute(SettingsSecurityPage::otp_input(), "maxlength", "6"),
                    expect_enabled(SettingsSecurityPage::enable_button(), false, 5_000),
                ],
            ]),
        )
        .tagged(&["otp"]),
    ]
}

fn otp_login() -> Vec<TestSpec> {
    let at_otp_form = step([user_with_2fa(), login_until_otp_form()]);

    vec![
        user_spec(
            "otp login: code form opens after the password",
            "otp_login",
            step([
                user_with_2fa(),
                vec![TestStep::ClearCookies],
                UserLoginPage::navigate(),
                UserLoginPage::login("${user_email}", "${user_password}"),
                vec![
                    expect_visible(Locator::text("/Two-Factor Authentication/i").first(), 8_000),
                    expect_visible(
                        Locator::text("/Enter the 6-digit code from your authenticator app/i"),
                        5_000,
                    ),
                    expect_url("/login/", 5_000),
                ],
            ]),
        )
        .tagged(&["otp"]),
        user_spec(
            "otp login: code input is configured",
            "otp_login",
            step([
                at_otp_form.clone(),
                vec![
                    expect_attribute(otp_login_input(), "maxlength", "6"),
                    expect_visible(verify_button(), 5_000),
                ],
            ]),
        )
        .tagged(&["otp"]),
        user_spec(
            "otp login: invalid code is rejected",
            "otp_login",
            step([
                at_otp_form.clone(),
                submit_wrong_code("000000"),
                vec![expect_visible(Locator::text(INVALID_CODE), 8_000), expect_url("/login/", 5_000)],
            ]),
        )
        .tagged(&["otp"]),
        user_spec(
            "otp login: a valid code logs in",
            "otp_login",
            step([
                at_otp_form.clone(),
                vec![
                    TestStep::FillTotp {
                        locator: otp_login_input(),
                        secret: "${otp_secret}".to_string(),
                        native: false,
                    },
                    click(verify_button()),
                    expect_url_not("/login/", 10_000),
                ],
            ]),
        )
        .tagged(&["otp"]),
        user_spec(
            "otp login: lost access gives restricted access",
            "otp_login",
            step([
                at_otp_form,
                vec![
                    expect_visible(Locator::role("button", "/Lost access to authenticator/i"), 5_000),
                    click(Locator::role("button", "/Lost access to authenticator/i")),
                    expect_url_not("/login/", 10_000),
                    expect_url("/settings/", 10_000),
                    expect_visible(two_factor_heading(), 5_000),
                    goto("accounts"),
                    sleep(1_000),
                    expect_url_not("/accounts/", 5_000),
                ],
            ]),
        )
        .tagged(&["otp"]),
        user_spec(
            "otp login: five failed codes lock the account",
            "otp_login",
            step([
                user_with_2fa(),
                login_until_otp_form(),
                (0..4)
                    .flat_map(|_| {
                        let mut attempt = submit_wrong_code("000000");
                        attempt.push(expect_visible(Locator::text(INVALID_CODE), 5_000));
                        attempt
                    })
                    .collect::<Vec<_>>(),
                submit_wrong_code("000000"),
                vec![expect_visible(Locator::text(LOCKED), 8_000), expect_url("/login/", 5_000)],
                submit_wrong_code("111111"),
                vec![expect_visible(Locator::text(LOCKED), 5_000)],
            ]),
        )
        .tagged(&["otp", "slow"]),
    ]
}

fn otp_reset() -> Vec<TestSpec> {
    vec![
        user_spec(
            "otp reset: old code is invalid after reset",
            "otp_reset",
            step([
                user_with_2fa(),
                reopen_two_factor_section(),
                SettingsSecurityPage::reset_authenticator("new_otp_secret"),
                vec![assert_var_changed("new_otp_secret", "otp_secret")],
                SettingsSecurityPage::confirm_backup_codes(),
                SettingsSecurityPage::enter_code("${otp_secret}"),
                SettingsSecurityPage::expect_code_rejected(),
            ]),
        )
        .tagged(&["otp"]),
        user_spec(
            "otp reset: new code is accepted after reset",
            "otp_reset",
            step([
                user_with_2fa(),
                reopen_two_factor_section(),
                SettingsSecurityPage::reset_authenticator("new_otp_secret"),
                SettingsSecurityPage::confirm_backup_codes(),
                SettingsSecurityPage::enter_code("${new_otp_secret}"),
                SettingsSecurityPage::expect_enabled_and_close(),
            ]),
        )
        .tagged(&["otp"]),
        user_spec(
            "otp reset: second reset invalidates the first secret",
            "otp_reset",
            step([
                user_with_2fa(),
                reopen_two_factor_section(),
                SettingsSecurityPage::reset_authenticator("first_reset_secret"),
                reopen_two_factor_section(),
                vec![
                    TestStep::AcceptNextDialog,
                    click(Locator::role("button", "/Set Up Authenticator/i")),
                ],
                SettingsSecurityPage::capture_secret("second_reset_secret"),
                vec![assert_var_changed("second_reset_secret", "first_reset_secret")],
                SettingsSecurityPage::confirm_backup_codes(),
                SettingsSecurityPage::enter_code("${first_reset_secret}"),
                SettingsSecurityPage::expect_code_rejected(),
            ]),
        )
        .tagged(&["otp"]),
    ]
}

/// Backup codes shown in the setup modal, comma separated
fn read_backup_codes(var: &str) -> TestStep {
    TestStep::Evaluate {
        script: "() => Array.from(document.querySelectorAll('code[x-text=\"code\"]'))\
                 .map((c) => c.textContent.trim()).filter(Boolean).join(',')"
            .to_string(),
        arg: None,
        var: Some(var.to_string()),
    }
}

fn security_settings() -> Vec<TestSpec> {
    let backup_input = Locator::css("input[name=\"backup_code\"], input[maxlength=\"8\"]").first();

    vec![
        user_spec(
            "security settings: two-factor section is visible",
            "security_settings",
            step([
                register_and_login(),
                SettingsSecurityPage::navigate(),
                vec![expect_visible(two_factor_heading(), 5_000)],
            ]),
        ),
        user_spec(
            "security settings: reset button shows when 2fa is on",
            "security_settings",
            step([
                user_with_2fa(),
                reopen_two_factor_section(),
                vec![expect_visible(Locator::role("button", "/Reset Authenticator/i"), 5_000)],
            ]),
        ),
        user_spec(
            "security settings: reset requires a new confirmation",
            "security_settings",
            step([
                user_with_2fa(),
                reopen_two_factor_section(),
                SettingsSecurityPage::reset_authenticator("new_otp_secret"),
                vec![
                    click(Locator::role("button", "/Continue/i")),
                    expect_visible(Locator::role("button", "/I've Saved My Codes/i"), 5_000),
                    click(Locator::role("button", "/I've Saved My Codes/i")),
                    expect_visible(SettingsSecurityPage::otp_input(), 8_000),
                    expect_visible(SettingsSecurityPage::enable_button(), 5_000),
                ],
            ]),
        ),
        user_spec(
            "security settings: reset revokes old backup codes",
            "security_settings",
            step([
                register_and_login(),
                SettingsSecurityPage::navigate(),
                SettingsSecurityPage::start_setup("otp_secret"),
                vec![
                    click(Locator::role("button", "/Continue/i")),
                    sleep(500),
                    read_backup_codes("old_backup_codes"),
                    assert_var_matches("old_backup_codes", ".+", None),
                    click(Locator::role("button", "/I've Saved My Codes/i")),
                ],
                SettingsSecurityPage::enter_code("${otp_secret}"),
                SettingsSecurityPage::expect_enabled_and_close(),
                reopen_two_factor_section(),
                SettingsSecurityPage::reset_authenticator("new_otp_secret"),
                vec![
                    click(Locator::role("button", "/Continue/i")),
                    sleep(500),
                    read_backup_codes("new_backup_codes"),
                    TestStep::Evaluate {
                        script: "([old, fresh]) => old.split(',').filter((c) => fresh.split(',').includes(c)).length"
                            .to_string(),
                        arg: Some(serde_json::json!(["${old_backup_codes}", "${new_backup_codes}"])),
                        var: Some("reused_backup_codes".to_string()),
                    },
                    TestStep::AssertVar {
                        var: "reused_backup_codes".to_string(),
                        matches: None,
                        equals: Some("0".to_string()),
                        not_equals: None,
                        min_len: None,
                    },
                    click(Locator::role("button", "/I've Saved My Codes/i")),
                ],
                SettingsSecurityPage::enter_code("${new_otp_secret}"),
                SettingsSecurityPage::expect_enabled_and_close(),
                login_until_otp_form(),
                vec![
                    expect_visible(Locator::role("button", "/Use a backup code instead/i"), 5_000),
                    click(Locator::role("button", "/Use a backup code instead/i")),
                    wait_visible(backup_input.clone(), 5_000),
                    TestStep::Evaluate {
                        script: "(codes) => codes.split(',')[0]".to_string(),
                        arg: Some(serde_json::json!("${old_backup_codes}")),
                        var: Some("revoked_backup_code".to_string()),
                    },
                    fill(backup_input, "${revoked_backup_code}"),
                    click(verify_button()),
                    sleep(2_000),
                    expect_url("/login/", 5_000),
                    expect_visible(
                        Locator::text("/invalid|not found|revoked|expired|incorrect/i").first(),
                        5_000,
                    ),
                ],
            ]),
        )
        .tagged(&["slow"]),
    ]
}

fn register() -> Vec<TestSpec> {
    vec![
        user_spec(
            "register: redirects to verify-email-sent",
            "register",
            step([register_user(), RegisterPage::expect_on_verify_email_sent()]),
        ),
        user_spec(
            "register: resend keeps the user on verify-email-sent",
            "register",
            step([
                register_user(),
                RegisterPage::expect_on_verify_email_sent(),
                RegisterPage::click_resend_if_enabled(),
                vec![load_state(LoadState::DomContentLoaded)],
                RegisterPage::expect_on_verify_email_sent(),
                vec![TestStep::AssertEmailVerified { email: "${user_email}".to_string(), expected: false }],
            ]),
        ),
        user_spec(
            "register: verification link verifies the email",
            "register",
            step([
                register_user(),
                vec![
                    TestStep::AssertEmailVerified { email: "${user_email}".to_string(), expected: false },
                    TestStep::CaptureVerificationToken {
                        email: "${user_email}".to_string(),
                        var: "verification_token".to_string(),
                    },
                    goto("verify-email?token=${verification_token}"),
                    load_state(LoadState::DomContentLoaded),
                    TestStep::AssertEmailVerified { email: "${user_email}".to_string(), expected: true },
                ],
            ]),
        ),
    ]
}

fn happy_path(config: &E2eConfig) -> TestSpec {
    let admin_otp = config.credentials.admin_otp_secret.as_ref().map(|_| "${admin_otp_secret}");

    let steps = step([
        // registration and email verification
        register_and_login(),
        // 2FA
        SettingsSecurityPage::navigate(),
        SettingsSecurityPage::setup_2fa("otp_secret"),
        vec![assert_var_matches("otp_secret", BASE32_SECRET, Some(16))],
        login_until_otp_form(),
        vec![
            TestStep::FillTotp {
                locator: otp_login_input(),
                secret: "${otp_secret}".to_string(),
                native: false,
            },
            click(verify_button()),
            expect_url_not("/login/", 10_000),
        ],
        // tags and accounts
        TagsPage::navigate(),
        TagsPage::create_tag("${savings_tag}", TagColor::Green),
        AccountsPage::create_account("${main_account}", Some("${savings_tag}"), "main_address"),
        TagsPage::navigate(),
        TagsPage::create_tag("${trading_tag}", TagColor::Blue),
        AccountsPage::create_account("${trading_account}", Some("${trading_tag}"), "trading_address"),
        // the account list must lead to the same address
        AccountsPage::get_account_address("${trading_account}", "listed_trading_address"),
        vec![
            assert_var_matches("trading_address", ETH_ADDRESS, None),
            TestStep::AssertVar {
                var: "listed_trading_address".to_string(),
                matches: None,
                equals: Some("${trading_address}".to_string()),
                not_equals: None,
                min_len: None,
            },
            assert_var_matches("main_address", ETH_ADDRESS, None),
            TestStep::FundAccount { address: "${main_address}".to_string(), eth: "1".to_string() },
        ],
        // transfer
        SendPage::navigate(),
        SendPage::send("${main_account}", "${trading_address}", SEND_AMOUNT, TransactionSpeed::Medium),
        vec![expect_url_not("/send$/", 10_000)],
        // the admin sees it waiting for signatures
        vec![TestStep::SwitchContext { name: "admin".to_string(), app: Some(App::Admin), storage_state: None }],
        AdminLoginPage::navigate(),
        AdminLoginPage::login("${admin_email}", "${admin_password}", admin_otp),
        AdminSigningQueuePage::navigate(),
        AdminSigningQueuePage::expect_transaction_in_queue("${trading_address}", Some(SEND_AMOUNT)),
        // back to the user for the status
        vec![TestStep::SwitchContext {
            name: MAIN_CONTEXT.to_string(),
            app: Some(App::User),
            storage_state: None,
        }],
        TransactionsPage::navigate(),
        TransactionsPage::expect_transaction_with_amount(SEND_AMOUNT),
        TransactionsPage::expect_transaction_status("pending", Some(SEND_AMOUNT)),
        vec![expect_hidden(Locator::text("/Something went wrong/i"), 1_000)],
    ]);

    let mut spec = user_spec("happy path: full user flow", "happy_path", steps)
        .describe(
            "Register, enable 2FA, create tagged accounts, send ETH and follow it through \
             the admin signing queue",
        )
        .tagged(&["happy-path", "slow"])
        .with_retries(0);
    spec.vars.insert("savings_tag".to_string(), "Savings-${run_id}".to_string());
    spec.vars.insert("trading_tag".to_string(), "Trading-${run_id}".to_string());
    spec.vars.insert("main_account".to_string(), "Main Wallet ${run_id}".to_string());
    spec.vars.insert("trading_account".to_string(), "Trading Wallet ${run_id}".to_string());
    spec
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn flatten(steps: &[TestStep]) -> Vec<&TestStep> {
        steps
            .iter()
            .flat_map(|s| match s {
                TestStep::IfVisible { steps, else_steps, .. } => {
                    let mut all = vec![s];
                    all.extend(flatten(steps));
                    all.extend(flatten(else_steps));
                    all
                }
                _ => vec![s],
            })
            .collect()
    }

    #[test]
    fn test_all_scenarios_validate() {
        for spec in all(&E2eConfig::default()) {
            spec.validate().unwrap_or_else(|e| panic!("{}: {}", spec.name, e));
        }
    }

    #[test]
    fn test_names_are_unique() {
        let specs = all(&E2eConfig::default());
        let names: HashSet<_> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names.len(), specs.len());
    }

    #[test]
    fn test_setup_saves_sessions_to_auth_dir() {
        let config = E2eConfig::default();
        let specs = setup(&config);
        let paths: Vec<_> = specs
            .iter()
            .flat_map(|s| s.steps.iter())
            .filter_map(|s| match s {
                TestStep::SaveStorageState { path } => Some(path.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(paths, vec![".auth/admin.json".to_string(), ".auth/user.json".to_string()]);
    }

    #[test]
    fn test_admin_otp_only_with_configured_secret() {
        let mut config = E2eConfig::default();
        let has_otp = |config: &E2eConfig| {
            let spec = happy_path(config);
            flatten(&spec.steps).iter().any(|s| matches!(s, TestStep::TypeTotp { .. }))
        };
        assert!(!has_otp(&config));
        config.credentials.admin_otp_secret = Some("JBSWY3DPEHPK3PXP".to_string());
        assert!(has_otp(&config));
    }

    #[test]
    fn test_happy_path_funds_before_sending() {
        let spec = happy_path(&E2eConfig::default());
        let position = |pred: &dyn Fn(&TestStep) -> bool| spec.steps.iter().position(|s| pred(s));
        let fund = position(&|s| matches!(s, TestStep::FundAccount { .. })).unwrap();
        let submit = position(&|s| s.name().contains("Create Transaction")).unwrap();
        let admin = position(&|s| matches!(s, TestStep::SwitchContext { name, .. } if name == "admin"))
            .unwrap();
        assert!(fund < submit);
        assert!(submit < admin);
        assert_eq!(spec.retries, Some(0));
        assert_eq!(spec.suite, "user/happy_path");
    }

    #[test]
    fn test_lockout_tries_six_codes() {
        let specs = otp_login();
        let lockout = specs.iter().find(|s| s.name.contains("lock")).unwrap();
        let attempts = lockout.steps.iter().filter(|s| s.name() == "click:role=button[/Verify/i]").count();
        assert_eq!(attempts, 6);
    }

    #[test]
    fn test_scenarios_start_logged_out_except_smoke() {
        for spec in all(&E2eConfig::default()) {
            let smoke = spec.suite.ends_with("/smoke");
            assert_eq!(spec.fresh_session, !smoke, "{}", spec.name);
        }
    }

    #[test]
    fn test_admin_smoke_checks_each_section() {
        let specs = admin_smoke();
        assert_eq!(specs.len(), BaseAdminPage::SECTIONS.len() + 1);
        for (section, heading) in BaseAdminPage::SECTIONS {
            let spec = specs.iter().find(|s| s.name == format!("admin smoke: {} opens", section)).unwrap();
            assert_eq!(spec.app, Some(App::Admin));
            assert!(matches!(spec.steps.first(), Some(TestStep::Navigate { url, .. }) if url.is_empty()));
            let heading_check = format!("assert:role=heading[{}] >> nth=0", heading);
            assert!(spec.steps.iter().any(|s| s.name() == heading_check), "{}", spec.name);
        }
        assert!(specs
            .iter()
            .any(|s| s.steps.iter().any(|st| st.name() == "assert:role=button[Logout]")));
    }

    #[test]
    fn test_user_smoke_starts_each_item_from_dashboard() {
        let specs = user_smoke();
        assert_eq!(specs.len(), BaseUserPage::MENU_ITEMS.len());
        for spec in &specs {
            assert_eq!(spec.suite, "user/smoke");
            assert!(!spec.fresh_session);
            assert!(matches!(spec.steps.first(), Some(TestStep::Navigate { url, .. }) if url == "dashboard"));
            assert!(matches!(spec.steps.get(2), Some(TestStep::WaitForLoadState { state: LoadState::NetworkIdle })));
        }
    }

    #[test]
    fn test_resend_clicks_only_when_enabled() {
        let specs = register();
        let resend = specs.iter().find(|s| s.name.contains("resend")).unwrap();
        let branch = resend.steps.iter().find_map(|s| match s {
            TestStep::IfVisible { steps, else_steps, .. } => Some((steps, else_steps)),
            _ => None,
        });
        let (steps, else_steps) = branch.expect("resend branch");
        assert!(matches!(steps.as_slice(), [TestStep::Click { .. }]));
        assert!(else_steps.is_empty());
        assert!(matches!(
            resend.steps.last(),
            Some(TestStep::AssertEmailVerified { expected: false, .. })
        ));
    }

    #[test]
    fn test_happy_path_reads_address_back_from_account_list() {
        let spec = happy_path(&E2eConfig::default());
        let listed = spec
            .steps
            .iter()
            .position(|s| matches!(s, TestStep::Capture { var, .. } if var == "listed_trading_address"))
            .unwrap();
        let compared = spec
            .steps
            .iter()
            .position(|s| {
                matches!(
                    s,
                    TestStep::AssertVar { var, equals: Some(expected), .. }
                        if var == "listed_trading_address" && expected == "${trading_address}"
                )
            })
            .unwrap();
        assert!(listed < compared);
    }
}
