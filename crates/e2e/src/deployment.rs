//! Readiness of the deployment under test

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::DeploymentConfig;
use crate::error::{E2eError, E2eResult};
use crate::spec::App;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The admin console and the user app, both already running
pub struct Deployment {
    config: DeploymentConfig,
    client: reqwest::Client,
}

impl Deployment {
    pub fn new(config: DeploymentConfig) -> E2eResult<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(5)).build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    /// Wait until both apps answer with a success status
    pub async fn wait_ready(&self) -> E2eResult<()> {
        if self.config.skip_readiness_check {
            debug!("Readiness check disabled");
            return Ok(());
        }

        let deadline = Instant::now() + self.config.startup_timeout();
        for app in [App::Admin, App::User] {
            let url = self.config.base_url(app);
            self.wait_for(url, deadline).await?;
            info!("{} app is up at {}", app.as_str(), url);
        }
        Ok(())
    }

    async fn wait_for(&self, url: &str, deadline: Instant) -> E2eResult<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    warn!("{} returned {}", url, resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for {}...", url);
                    }
                    // refused connections are expected while containers start
                    if !e.is_connect() {
                        warn!("Readiness check error: {}", e);
                    }
                }
            }

            if Instant::now() + POLL_INTERVAL > deadline {
                return Err(E2eError::DeploymentUnreachable { url: url.to_string(), attempts });
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { return };
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!("{}\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok", status_line);
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{}/", addr)
    }

    fn config(admin_url: String, user_url: String, timeout_secs: u64) -> DeploymentConfig {
        DeploymentConfig {
            admin_url,
            user_url,
            startup_timeout_secs: timeout_secs,
            skip_readiness_check: false,
        }
    }

    #[tokio::test]
    async fn test_ready_when_both_apps_answer() {
        let url = serve("HTTP/1.1 200 OK").await;
        let deployment = Deployment::new(config(url.clone(), url, 5)).unwrap();
        deployment.wait_ready().await.unwrap();
    }

    #[tokio::test]
    async fn test_server_errors_time_out() {
        let admin = serve("HTTP/1.1 200 OK").await;
        let user = serve("HTTP/1.1 503 Service Unavailable").await;
        let deployment = Deployment::new(config(admin, user.clone(), 1)).unwrap();
        match deployment.wait_ready().await {
            Err(E2eError::DeploymentUnreachable { url, attempts }) => {
                assert_eq!(url, user);
                assert!(attempts >= 1);
            }
            other => panic!("expected DeploymentUnreachable, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_skip_readiness_check() {
        let mut config = config("http://127.0.0.1:9/".into(), "http://127.0.0.1:9/".into(), 0);
        config.skip_readiness_check = true;
        Deployment::new(config).unwrap().wait_ready().await.unwrap();
    }
}
