//! Declarative test specifications
//!
//! Specs are written in YAML under the specs directory, or built in Rust by
//! the scenarios in [`crate::scenarios`]. Both end up as a [`TestSpec`]: a
//! named list of [`TestStep`]s run against one browser session.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};

/// Which application of the deployment a spec or context talks to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum App {
    Admin,
    #[default]
    User,
}

impl App {
    pub fn as_str(&self) -> &'static str {
        match self {
            App::Admin => "admin",
            App::User => "user",
        }
    }
}

/// A complete test specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    /// Unique name for this test
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering tests
    #[serde(default)]
    pub tags: Vec<String>,

    /// Path relative to the specs directory (e.g. `admin/login_validation.yaml`);
    /// projects select specs by matching on it
    #[serde(default)]
    pub suite: String,

    /// App to open the first browser context on; defaults to the project's app
    #[serde(default)]
    pub app: Option<App>,

    /// Start without the project's saved login
    #[serde(default)]
    pub fresh_session: bool,

    /// Overrides the project's retry count
    #[serde(default)]
    pub retries: Option<u32>,

    /// Extra variables available as `${name}`
    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    /// Steps to execute in order
    pub steps: Vec<TestStep>,
}

/// How to find an element.
///
/// In YAML a plain string is a CSS selector; a map builds a Playwright
/// locator (`role`/`name`, `label`, `placeholder`, `text` or `css`) with
/// optional `has_text`, `nth` and `within`. Text values written as
/// `/pattern/flags` are regular expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Locator {
    Css(String),
    Query(Box<LocatorQuery>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocatorQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Accessible name, only with `role`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub exact: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_text: Option<String>,
    /// Index among matches; negative counts from the end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nth: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within: Option<Locator>,
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self::query(LocatorQuery {
            role: Some(role.into()),
            name: Some(name.into()),
            ..Default::default()
        })
    }

    pub fn label(label: impl Into<String>) -> Self {
        Self::query(LocatorQuery { label: Some(label.into()), ..Default::default() })
    }

    pub fn placeholder(placeholder: impl Into<String>) -> Self {
        Self::query(LocatorQuery { placeholder: Some(placeholder.into()), ..Default::default() })
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::query(LocatorQuery { text: Some(text.into()), ..Default::default() })
    }

    fn query(query: LocatorQuery) -> Self {
        Locator::Query(Box::new(query))
    }

    fn into_query(self) -> LocatorQuery {
        match self {
            Locator::Css(css) => LocatorQuery { css: Some(css), ..Default::default() },
            Locator::Query(q) => *q,
        }
    }

    fn map_query(self, f: impl FnOnce(&mut LocatorQuery)) -> Self {
        let mut q = self.into_query();
        f(&mut q);
        Self::query(q)
    }

    pub fn has_text(self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.map_query(|q| q.has_text = Some(text))
    }

    pub fn exact(self) -> Self {
        self.map_query(|q| q.exact = true)
    }

    pub fn nth(self, index: i32) -> Self {
        self.map_query(|q| q.nth = Some(index))
    }

    pub fn first(self) -> Self {
        self.nth(0)
    }

    pub fn last(self) -> Self {
        self.nth(-1)
    }

    /// Search inside the elements matched by `parent`
    pub fn within(self, parent: Locator) -> Self {
        self.map_query(|q| q.within = Some(parent))
    }

    /// Short human-readable form used in step names and logs
    pub fn describe(&self) -> String {
        match self {
            Locator::Css(css) => css.clone(),
            Locator::Query(q) => {
                let mut s = if let Some(role) = &q.role {
                    match &q.name {
                        Some(name) => format!("role={}[{}]", role, name),
                        None => format!("role={}", role),
                    }
                } else if let Some(label) = &q.label {
                    format!("label={}", label)
                } else if let Some(placeholder) = &q.placeholder {
                    format!("placeholder={}", placeholder)
                } else if let Some(text) = &q.text {
                    format!("text={}", text)
                } else {
                    q.css.clone().unwrap_or_default()
                };
                if let Some(has_text) = &q.has_text {
                    s.push_str(&format!(" >> has_text={}", has_text));
                }
                if let Some(nth) = q.nth {
                    s.push_str(&format!(" >> nth={}", nth));
                }
                if let Some(parent) = &q.within {
                    s = format!("{} >> {}", parent.describe(), s);
                }
                s
            }
        }
    }

    /// Apply `f` to every text field (used for `${var}` interpolation)
    pub fn try_map_text(&self, f: &dyn Fn(&str) -> E2eResult<String>) -> E2eResult<Locator> {
        let opt = |v: &Option<String>| -> E2eResult<Option<String>> {
            v.as_deref().map(f).transpose()
        };
        Ok(match self {
            Locator::Css(css) => Locator::Css(f(css)?),
            Locator::Query(q) => Locator::query(LocatorQuery {
                css: opt(&q.css)?,
                role: q.role.clone(),
                name: opt(&q.name)?,
                label: opt(&q.label)?,
                placeholder: opt(&q.placeholder)?,
                text: opt(&q.text)?,
                exact: q.exact,
                has_text: opt(&q.has_text)?,
                nth: q.nth,
                within: q.within.as_ref().map(|p| p.try_map_text(f)).transpose()?,
            }),
        })
    }

    fn validate(&self) -> E2eResult<()> {
        let Locator::Query(q) = self else {
            return Ok(());
        };

        let kinds = [&q.css, &q.role, &q.label, &q.placeholder, &q.text]
            .iter()
            .filter(|v| v.is_some())
            .count();
        if kinds != 1 {
            return Err(E2eError::SpecParse(format!(
                "locator needs exactly one of css, role, label, placeholder or text: {}",
                self.describe()
            )));
        }
        if q.name.is_some() && q.role.is_none() {
            return Err(E2eError::SpecParse("locator 'name' requires 'role'".to_string()));
        }
        if let Some(parent) = &q.within {
            parent.validate()?;
        }
        Ok(())
    }
}

impl From<&str> for Locator {
    fn from(selector: &str) -> Self {
        Locator::css(selector)
    }
}

/// A single step in a test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Navigate to a URL (relative to the context's base URL)
    Navigate {
        url: String,
        #[serde(default)]
        wait_until: Option<LoadState>,
    },

    /// Click an element
    Click {
        locator: Locator,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Fill an input field.
    ///
    /// `native` sets the value through the DOM setter and dispatches an
    /// `input` event, for reactive inputs that ignore Playwright's fill.
    Fill {
        locator: Locator,
        value: String,
        #[serde(default)]
        native: bool,
    },

    /// Type text with keyboard simulation; into the focused element when no locator is given
    Type {
        #[serde(default)]
        locator: Option<Locator>,
        text: String,
        #[serde(default)]
        delay_ms: Option<u64>,
    },

    /// Press a key
    Press {
        #[serde(default)]
        locator: Option<Locator>,
        key: String,
    },

    /// Check a checkbox
    Check { locator: Locator },

    /// Uncheck a checkbox
    Uncheck { locator: Locator },

    /// Select an option from a dropdown
    Select { locator: Locator, value: String },

    /// Wait for an element to reach a state
    Wait {
        locator: Locator,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
        #[serde(default)]
        state: WaitState,
    },

    /// Wait until the page URL matches (or stops matching) a pattern
    WaitForUrl {
        pattern: String,
        #[serde(default)]
        negate: bool,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
    },

    /// Wait for a page load state
    WaitForLoadState {
        #[serde(default)]
        state: LoadState,
    },

    /// Wait for a fixed amount of time (use sparingly)
    Sleep { ms: u64 },

    /// Assert something about an element
    Assert {
        locator: Locator,
        #[serde(default)]
        visible: Option<bool>,
        #[serde(default)]
        enabled: Option<bool>,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        text_contains: Option<String>,
        #[serde(default)]
        empty: Option<bool>,
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        attribute: Option<AttributeAssertion>,
        #[serde(default)]
        count: Option<usize>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Assert the current URL
    AssertUrl {
        pattern: String,
        #[serde(default)]
        negate: bool,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Read an element's text, input value or attribute into a variable
    Capture {
        locator: Locator,
        var: String,
        #[serde(default)]
        source: CaptureSource,
        #[serde(default)]
        attribute: Option<String>,
        /// Regex applied to the raw value; keeps group 1 if present, else the whole match
        #[serde(default)]
        pattern: Option<String>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Read the current URL into a variable
    CaptureUrl {
        var: String,
        #[serde(default)]
        pattern: Option<String>,
    },

    /// Check a captured variable
    AssertVar {
        var: String,
        #[serde(default)]
        matches: Option<String>,
        #[serde(default)]
        equals: Option<String>,
        #[serde(default)]
        not_equals: Option<String>,
        #[serde(default)]
        min_len: Option<usize>,
    },

    /// Fill the current TOTP code for a Base32 secret
    FillTotp {
        locator: Locator,
        secret: String,
        #[serde(default)]
        native: bool,
    },

    /// Type the current TOTP code into the focused element
    TypeTotp {
        secret: String,
        #[serde(default)]
        delay_ms: Option<u64>,
    },

    /// Accept the next `confirm()`/`alert()` dialog
    AcceptNextDialog,

    /// Drop all cookies of the current context
    ClearCookies,

    /// Save cookies and local storage of the current context
    SaveStorageState { path: String },

    /// Open (or return to) a named browser context
    SwitchContext {
        name: String,
        #[serde(default)]
        app: Option<App>,
        #[serde(default)]
        storage_state: Option<String>,
    },

    /// Run nested steps only when an element becomes visible in time
    IfVisible {
        locator: Locator,
        #[serde(default = "default_if_visible_timeout")]
        timeout_ms: u64,
        steps: Vec<TestStep>,
        #[serde(default)]
        else_steps: Vec<TestStep>,
    },

    /// Execute JavaScript in the page; `arg` is passed to the function
    Evaluate {
        script: String,
        #[serde(default)]
        arg: Option<serde_json::Value>,
        #[serde(default)]
        var: Option<String>,
    },

    /// Take a screenshot
    Screenshot {
        name: String,
        #[serde(default)]
        full_page: bool,
    },

    /// Mark a user's email as verified in the database
    VerifyEmail { email: String },

    /// Give an account a test ETH balance in the database
    FundAccount {
        address: String,
        #[serde(default = "default_fund_amount")]
        eth: String,
    },

    /// Read a user's email verification token from the database
    CaptureVerificationToken { email: String, var: String },

    /// Assert a user's email verification flag in the database
    AssertEmailVerified {
        email: String,
        #[serde(default = "default_true")]
        expected: bool,
    },

    /// Log a message (for debugging)
    Log { message: String },
}

fn default_wait_timeout() -> u64 {
    5000 // 5 seconds default
}

fn default_if_visible_timeout() -> u64 {
    2000
}

fn default_fund_amount() -> String {
    "1".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadState {
    #[serde(rename = "load")]
    Load,
    #[default]
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    #[serde(rename = "networkidle")]
    NetworkIdle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
    #[default]
    Text,
    Value,
    /// Reads the attribute named by the step's `attribute` field
    Attribute,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeAssertion {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub contains: Option<String>,
}

impl TestStep {
    /// Short name for logs and results
    pub fn name(&self) -> String {
        match self {
            TestStep::Navigate { url, .. } => format!("navigate:{}", url),
            TestStep::Click { locator, .. } => format!("click:{}", locator.describe()),
            TestStep::Fill { locator, .. } => format!("fill:{}", locator.describe()),
            TestStep::Type { locator, .. } => format!(
                "type:{}",
                locator.as_ref().map(|l| l.describe()).unwrap_or_else(|| "keyboard".to_string())
            ),
            TestStep::Press { key, .. } => format!("press:{}", key),
            TestStep::Check { locator } => format!("check:{}", locator.describe()),
            TestStep::Uncheck { locator } => format!("uncheck:{}", locator.describe()),
            TestStep::Select { locator, .. } => format!("select:{}", locator.describe()),
            TestStep::Wait { locator, state, .. } => {
                format!("wait:{}:{}", locator.describe(), state.as_str())
            }
            TestStep::WaitForUrl { pattern, negate, .. } => {
                format!("wait_for_url:{}{}", if *negate { "!" } else { "" }, pattern)
            }
            TestStep::WaitForLoadState { state } => format!("wait_for_load_state:{:?}", state),
            TestStep::Sleep { ms } => format!("sleep:{}ms", ms),
            TestStep::Assert { locator, .. } => format!("assert:{}", locator.describe()),
            TestStep::AssertUrl { pattern, negate, .. } => {
                format!("assert_url:{}{}", if *negate { "!" } else { "" }, pattern)
            }
            TestStep::Capture { var, .. } => format!("capture:{}", var),
            TestStep::CaptureUrl { var, .. } => format!("capture_url:{}", var),
            TestStep::AssertVar { var, .. } => format!("assert_var:{}", var),
            TestStep::FillTotp { locator, .. } => format!("fill_totp:{}", locator.describe()),
            TestStep::TypeTotp { .. } => "type_totp".to_string(),
            TestStep::AcceptNextDialog => "accept_next_dialog".to_string(),
            TestStep::ClearCookies => "clear_cookies".to_string(),
            TestStep::SaveStorageState { path } => format!("save_storage_state:{}", path),
            TestStep::SwitchContext { name, .. } => format!("switch_context:{}", name),
            TestStep::IfVisible { locator, .. } => format!("if_visible:{}", locator.describe()),
            TestStep::Evaluate { .. } => "evaluate".to_string(),
            TestStep::Screenshot { name, .. } => format!("screenshot:{}", name),
            TestStep::VerifyEmail { email } => format!("verify_email:{}", email),
            TestStep::FundAccount { address, .. } => format!("fund_account:{}", address),
            TestStep::CaptureVerificationToken { var, .. } => {
                format!("capture_verification_token:{}", var)
            }
            TestStep::AssertEmailVerified { email, .. } => {
                format!("assert_email_verified:{}", email)
            }
            TestStep::Log { message } => {
                format!("log:{}", message.chars().take(30).collect::<String>())
            }
        }
    }

    pub(crate) fn validate(&self) -> E2eResult<()> {
        match self {
            TestStep::Click { locator, .. }
            | TestStep::Fill { locator, .. }
            | TestStep::Check { locator }
            | TestStep::Uncheck { locator }
            | TestStep::Select { locator, .. }
            | TestStep::Wait { locator, .. }
            | TestStep::Assert { locator, .. }
            | TestStep::FillTotp { locator, .. } => locator.validate(),
            TestStep::Type { locator: Some(locator), .. }
            | TestStep::Press { locator: Some(locator), .. } => locator.validate(),
            TestStep::Capture { locator, source, attribute, pattern, .. } => {
                locator.validate()?;
                if *source == CaptureSource::Attribute && attribute.is_none() {
                    return Err(E2eError::SpecParse(
                        "capture from attribute needs 'attribute'".to_string(),
                    ));
                }
                validate_regex(pattern.as_deref())
            }
            TestStep::CaptureUrl { pattern, .. } => validate_regex(pattern.as_deref()),
            TestStep::AssertVar { matches, .. } => validate_regex(matches.as_deref()),
            TestStep::IfVisible { locator, steps, else_steps, .. } => {
                locator.validate()?;
                steps.iter().chain(else_steps).try_for_each(TestStep::validate)
            }
            _ => Ok(()),
        }
    }
}

/// Patterns that contain `${...}` are only known after interpolation.
fn validate_regex(pattern: Option<&str>) -> E2eResult<()> {
    match pattern {
        Some(p) if !p.contains("${") => {
            regex::Regex::new(p)?;
            Ok(())
        }
        _ => Ok(()),
    }
}

impl TestSpec {
    /// Build a spec in code
    pub fn new(name: impl Into<String>, suite: impl Into<String>, steps: Vec<TestStep>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            suite: suite.into(),
            app: None,
            fresh_session: false,
            retries: None,
            vars: BTreeMap::new(),
            steps,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn tagged(mut self, tags: &[&str]) -> Self {
        self.tags.extend(tags.iter().map(|t| t.to_string()));
        self
    }

    pub fn on(mut self, app: App) -> Self {
        self.app = Some(app);
        self
    }

    pub fn fresh(mut self) -> Self {
        self.fresh_session = true;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Parse a test spec from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let spec: Self = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse a test spec from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all test specs from a directory, setting `suite` to each file's relative path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut specs = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            let mut spec = Self::from_file(entry.path())?;
            if spec.suite.is_empty() {
                let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
                spec.suite = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
            }
            specs.push(spec);
        }

        Ok(specs)
    }

    /// Filter specs by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::SpecParse("spec name is empty".to_string()));
        }
        if self.steps.is_empty() {
            return Err(E2eError::SpecParse(format!("spec '{}' has no steps", self.name)));
        }
        self.steps.iter().try_for_each(TestStep::validate)
    }
}
