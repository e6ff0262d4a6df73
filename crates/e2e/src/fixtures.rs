//! Database fixtures
//!
//! Some states cannot be reached through the UI in a test environment
//! (email delivery, on-chain funds). These helpers write them straight into
//! the deployment's PostgreSQL, which runs in a Docker container.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::error::{E2eError, E2eResult};

/// Runs one SQL statement and returns its unaligned, tuples-only output
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> E2eResult<String>;
}

/// `docker exec <container> psql -U <user> -d <db>`
pub struct DockerPsql {
    container: String,
    user: String,
    database: String,
}

impl DockerPsql {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            container: config.container.clone(),
            user: config.user.clone(),
            database: config.name.clone(),
        }
    }
}

#[async_trait]
impl SqlExecutor for DockerPsql {
    async fn execute(&self, sql: &str) -> E2eResult<String> {
        debug!("psql in {}: {}", self.container, sql);

        let output = Command::new("docker")
            .args(["exec", &self.container, "psql", "-U", &self.user, "-d", &self.database])
            .args(["-v", "ON_ERROR_STOP=1", "-t", "-A", "-c", sql])
            .output()
            .await
            .map_err(|e| E2eError::Fixture(format!("failed to run docker: {}", e)))?;

        if !output.status.success() {
            return Err(E2eError::Fixture(format!(
                "psql exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Quote a string as a SQL literal
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[derive(Clone)]
pub struct Fixtures {
    executor: Arc<dyn SqlExecutor>,
    eth_asset_id: String,
}

impl Fixtures {
    pub fn new(executor: Arc<dyn SqlExecutor>, eth_asset_id: &str) -> Self {
        Self { executor, eth_asset_id: eth_asset_id.to_string() }
    }

    pub fn docker(config: &DatabaseConfig) -> Self {
        Self::new(Arc::new(DockerPsql::new(config)), &config.eth_asset_id)
    }

    /// Mark a user's email as verified, standing in for the emailed link
    pub async fn verify_user_email(&self, email: &str) -> E2eResult<()> {
        let sql = format!(
            "UPDATE users SET email_verified = true, email_verified_at = NOW() WHERE email = {};",
            sql_literal(email)
        );
        self.executor.execute(&sql).await?;
        Ok(())
    }

    /// Put `eth` test ETH into the cached on-chain balance of the account
    /// holding `address` (matched case-insensitively)
    pub async fn fund_account_with_test_eth(&self, address: &str, eth: &str) -> E2eResult<()> {
        let amount = eth.trim();
        let valid = !amount.is_empty()
            && amount.parse::<f64>().map(|v| v.is_finite() && v >= 0.0).unwrap_or(false)
            && amount.chars().all(|c| c.is_ascii_digit() || c == '.');
        if !valid {
            return Err(E2eError::Fixture(format!("invalid ETH amount '{}'", eth)));
        }

        let sql = format!(
            "INSERT INTO onchain_balances (account_id, asset_id, balance, block_number) \
             SELECT a.id, {asset}, {amount}, 1 \
             FROM accounts a \
             WHERE LOWER(a.address) = LOWER({address}) \
             ON CONFLICT (account_id, asset_id) DO UPDATE SET balance = {amount};",
            asset = sql_literal(&self.eth_asset_id),
            amount = amount,
            address = sql_literal(address),
        );
        self.executor.execute(&sql).await?;
        Ok(())
    }

    /// Latest email verification token of a user
    pub async fn verification_token(&self, email: &str) -> E2eResult<String> {
        let sql = format!(
            "SELECT email_verification_token FROM users WHERE email = {} LIMIT 1;",
            sql_literal(email)
        );
        let token = self.executor.execute(&sql).await?;
        if token.is_empty() {
            return Err(E2eError::Fixture(format!("no verification token for {}", email)));
        }
        Ok(token)
    }

    pub async fn is_email_verified(&self, email: &str) -> E2eResult<bool> {
        let sql = format!(
            "SELECT email_verified FROM users WHERE email = {} LIMIT 1;",
            sql_literal(email)
        );
        match self.executor.execute(&sql).await?.as_str() {
            "t" => Ok(true),
            "f" => Ok(false),
            "" => Err(E2eError::Fixture(format!("no user with email {}", email))),
            other => Err(E2eError::Fixture(format!("unexpected psql output '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        statements: Mutex<Vec<String>>,
        reply: String,
    }

    #[async_trait]
    impl SqlExecutor for Recorder {
        async fn execute(&self, sql: &str) -> E2eResult<String> {
            self.statements.lock().unwrap().push(sql.to_string());
            Ok(self.reply.clone())
        }
    }

    fn recorded(reply: &str) -> (Fixtures, Arc<Recorder>) {
        let recorder = Arc::new(Recorder { reply: reply.to_string(), ..Default::default() });
        let fixtures = Fixtures::new(recorder.clone(), "2745a97c-2201-52f5-b41e-dfb933bea3b5");
        (fixtures, recorder)
    }

    fn fixtures(reply: &str) -> Fixtures {
        recorded(reply).0
    }

    fn statements(recorder: &Recorder) -> Vec<String> {
        recorder.statements.lock().unwrap().clone()
    }

    #[test]
    fn test_sql_literal_doubles_quotes() {
        assert_eq!(sql_literal("o'brien@example.com"), "'o''brien@example.com'");
        assert_eq!(sql_literal("'; DROP TABLE users; --"), "'''; DROP TABLE users; --'");
    }

    #[tokio::test]
    async fn test_verify_user_email_sql() {
        let (f, recorder) = recorded("");
        f.verify_user_email("e2e_1@example.com").await.unwrap();
        assert_eq!(
            statements(&recorder),
            vec![
                "UPDATE users SET email_verified = true, email_verified_at = NOW() \
                 WHERE email = 'e2e_1@example.com';"
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_fund_account_upserts_eth_balance() {
        let (f, recorder) = recorded("");
        f.fund_account_with_test_eth("0xAbC'1", "1.5").await.unwrap();
        let sql = &statements(&recorder)[0];
        assert!(sql.starts_with("INSERT INTO onchain_balances"));
        assert!(sql.contains("SELECT a.id, '2745a97c-2201-52f5-b41e-dfb933bea3b5', 1.5, 1"));
        assert!(sql.contains("LOWER(a.address) = LOWER('0xAbC''1')"));
        assert!(sql.ends_with("ON CONFLICT (account_id, asset_id) DO UPDATE SET balance = 1.5;"));
    }

    #[tokio::test]
    async fn test_fund_account_rejects_non_numeric_amount() {
        let (f, recorder) = recorded("");
        for amount in ["", "1; DROP TABLE accounts", "-1", "NaN", "1e3"] {
            assert!(
                matches!(f.fund_account_with_test_eth("0x1", amount).await, Err(E2eError::Fixture(_))),
                "amount {:?}",
                amount
            );
        }
        assert!(statements(&recorder).is_empty());
    }

    #[tokio::test]
    async fn test_is_email_verified_parses_psql_booleans() {
        assert!(fixtures("t").is_email_verified("a@b.c").await.unwrap());
        assert!(!fixtures("f").is_email_verified("a@b.c").await.unwrap());
        assert!(fixtures("").is_email_verified("a@b.c").await.is_err());
    }

    #[tokio::test]
    async fn test_verification_token() {
        assert_eq!(fixtures("tok123").verification_token("a@b.c").await.unwrap(), "tok123");
        assert!(fixtures("").verification_token("a@b.c").await.is_err());
    }
}
