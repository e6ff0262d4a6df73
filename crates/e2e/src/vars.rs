//! Run variables and `${name}` interpolation

use std::collections::BTreeMap;

use crate::config::E2eConfig;
use crate::error::{E2eError, E2eResult};

/// Names whose values must never reach logs
const SECRET_NAMES: &[&str] = &["admin_password", "user_password", "existing_user_password"];

#[derive(Clone, Default)]
pub struct Vars {
    values: BTreeMap<String, String>,
}

impl std::fmt::Debug for Vars {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables every test starts with.
    ///
    /// `run_id` is unique per test attempt; the generated user (`username`,
    /// `user_email`, `user_password`) is derived from it so registrations
    /// never collide across runs. The configured accounts are available as
    /// `admin_*` and `existing_user_*`.
    pub fn seeded(config: &E2eConfig) -> Self {
        let run_id = uuid::Uuid::new_v4().simple().to_string()[..12].to_string();
        let username = format!("e2e_{}", run_id);

        let mut vars = Self::new();
        vars.set("user_email", format!("{}@example.com", username));
        vars.set("username", username);
        vars.set("run_id", run_id);
        vars.set("timestamp", chrono::Utc::now().timestamp_millis().to_string());
        vars.set("user_password", &config.credentials.new_user_password);
        vars.set("admin_email", &config.credentials.admin_email);
        vars.set("admin_password", &config.credentials.admin_password);
        vars.set("existing_user_email", &config.credentials.user_email);
        vars.set("existing_user_password", &config.credentials.user_password);
        if let Some(secret) = &config.credentials.admin_otp_secret {
            vars.set("admin_otp_secret", secret);
        }
        vars
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn require(&self, name: &str) -> E2eResult<&str> {
        self.get(name).ok_or_else(|| E2eError::UnknownVariable(name.to_string()))
    }

    pub fn extend(&mut self, other: &BTreeMap<String, String>) -> E2eResult<()> {
        for (name, value) in other {
            let value = self.interpolate(value)?;
            self.values.insert(name.clone(), value);
        }
        Ok(())
    }

    /// Replace every `${name}` in `input`; `$$` is a literal `$`
    pub fn interpolate(&self, input: &str) -> E2eResult<String> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];

            if tail.starts_with("$$") {
                out.push('$');
                rest = &tail[2..];
            } else if let Some(body) = tail.strip_prefix("${") {
                let end = body.find('}').ok_or_else(|| {
                    E2eError::SpecParse(format!("unterminated variable in '{}'", input))
                })?;
                out.push_str(self.require(&body[..end])?);
                rest = &body[end + 1..];
            } else {
                out.push('$');
                rest = &tail[1..];
            }
        }

        out.push_str(rest);
        Ok(out)
    }

    /// `true` when logging `name` could leak a credential
    pub fn is_secret(name: &str) -> bool {
        SECRET_NAMES.contains(&name)
            || ["secret", "token", "backup"].iter().any(|marker| name.contains(marker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn vars() -> Vars {
        let mut vars = Vars::new();
        vars.set("username", "e2e_abc");
        vars.set("account_id", "42");
        vars
    }

    #[test_case("${username}@example.com", "e2e_abc@example.com" ; "prefix")]
    #[test_case("accounts/${account_id}/receive", "accounts/42/receive" ; "middle")]
    #[test_case("no variables", "no variables" ; "plain")]
    #[test_case("^0x[a-fA-F0-9]{40}$", "^0x[a-fA-F0-9]{40}$" ; "regex anchors")]
    #[test_case("cost: $$5", "cost: $5" ; "escaped dollar")]
    #[test_case("${username}${account_id}", "e2e_abc42" ; "adjacent")]
    fn test_interpolate(input: &str, expected: &str) {
        assert_eq!(vars().interpolate(input).unwrap(), expected);
    }

    #[test]
    fn test_unknown_variable() {
        let err = vars().interpolate("${missing}").unwrap_err();
        assert!(matches!(err, E2eError::UnknownVariable(name) if name == "missing"));
    }

    #[test]
    fn test_unterminated_variable() {
        assert!(matches!(vars().interpolate("${username"), Err(E2eError::SpecParse(_))));
    }

    #[test]
    fn test_seeded_usernames_are_unique() {
        let config = E2eConfig::default();
        let a = Vars::seeded(&config);
        let b = Vars::seeded(&config);
        assert_ne!(a.get("username"), b.get("username"));
        assert!(a.require("user_email").unwrap().ends_with("@example.com"));
        assert_eq!(a.get("user_password"), Some("TestPass123!"));
        assert!(a.get("admin_otp_secret").is_none());
    }

    #[test]
    fn test_extend_interpolates_values() {
        let mut vars = vars();
        let mut extra = BTreeMap::new();
        extra.insert("greeting".to_string(), "hi ${username}".to_string());
        vars.extend(&extra).unwrap();
        assert_eq!(vars.get("greeting"), Some("hi e2e_abc"));
    }

    #[test]
    fn test_debug_shows_names_only() {
        let mut vars = Vars::new();
        vars.set("otp_secret", "JBSWY3DPEHPK3PXP");
        let debug = format!("{:?}", vars);
        assert!(debug.contains("otp_secret"));
        assert!(!debug.contains("JBSWY3DPEHPK3PXP"));
    }

    #[test_case("otp_secret", true)]
    #[test_case("admin_password", true)]
    #[test_case("verification_token", true)]
    #[test_case("old_backup_codes", true)]
    #[test_case("account_id", false)]
    fn test_is_secret(name: &str, expected: bool) {
        assert_eq!(Vars::is_secret(name), expected);
    }
}
