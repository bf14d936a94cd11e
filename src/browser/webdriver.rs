//! Minimal W3C WebDriver client, enough to drive chromedriver through
//! navigate / find / click.
//! Spec: <https://www.w3.org/TR/webdriver2/>

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{Browser, BrowserSession};
use crate::config::BrowserConfig;

/// Key under which WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Deserialize)]
struct WdResponse<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct NewSession {
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct WdError {
    error: String,
    #[serde(default)]
    message: String,
}

/// Turn a non-success WebDriver response into an error carrying its message.
async fn error_from(response: reqwest::Response, what: &str) -> anyhow::Error {
    let status = response.status();
    match response.json::<WdResponse<WdError>>().await {
        Ok(body) => anyhow::anyhow!(
            "WebDriver {} failed ({}): {} {}",
            what,
            status,
            body.value.error,
            body.value.message
        ),
        Err(_) => anyhow::anyhow!("WebDriver {} failed ({})", what, status),
    }
}

/// Starts Chrome sessions through a running chromedriver.
pub struct WebDriverBrowser {
    client: reqwest::Client,
    base_url: String,
    headless: bool,
}

impl WebDriverBrowser {
    pub fn new(config: &BrowserConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build WebDriver HTTP client")?;

        Ok(Self {
            client,
            base_url: config.webdriver_url.trim_end_matches('/').to_string(),
            headless: config.headless,
        })
    }

    fn capabilities(&self) -> Value {
        let mut args = vec!["--no-sandbox", "--disable-dev-shm-usage"];
        if self.headless {
            args.insert(0, "--headless");
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn open_session(&self) -> Result<Box<dyn BrowserSession>> {
        let response = self
            .client
            .post(format!("{}/session", self.base_url))
            .json(&self.capabilities())
            .send()
            .await
            .context("Failed to reach WebDriver")?;

        if !response.status().is_success() {
            return Err(error_from(response, "new session").await);
        }

        let session: WdResponse<NewSession> = response
            .json()
            .await
            .context("Failed to parse WebDriver new session response")?;

        debug!("Opened WebDriver session {}", session.value.session_id);

        Ok(Box::new(WebDriverSession::new(
            self.client.clone(),
            format!("{}/session/{}", self.base_url, session.value.session_id),
        )))
    }
}

/// A live chromedriver session. Dropping it without `close` still deletes
/// the session in the background.
pub struct WebDriverSession {
    client: reqwest::Client,
    session_url: String,
    closed: bool,
}

impl WebDriverSession {
    fn new(client: reqwest::Client, session_url: String) -> Self {
        Self {
            client,
            session_url,
            closed: false,
        }
    }

    /// Look up the first element matching `selector`, `None` if absent.
    async fn find_element(&self, selector: &str) -> Result<Option<String>> {
        let response = self
            .client
            .post(format!("{}/element", self.session_url))
            .json(&json!({ "using": "css selector", "value": selector }))
            .send()
            .await
            .context("Failed to send find element request")?;

        let status = response.status();
        if status.is_success() {
            let body: WdResponse<Value> = response
                .json()
                .await
                .context("Failed to parse find element response")?;
            let id = body.value[ELEMENT_KEY]
                .as_str()
                .context("WebDriver element reference missing")?;
            return Ok(Some(id.to_string()));
        }

        if status == StatusCode::NOT_FOUND {
            let body: WdResponse<WdError> = response
                .json()
                .await
                .context("Failed to parse find element error")?;
            if body.value.error == "no such element" {
                return Ok(None);
            }
            anyhow::bail!(
                "WebDriver find element failed: {} {}",
                body.value.error,
                body.value.message
            );
        }

        Err(error_from(response, "find element").await)
    }

    async fn poll_until(&self, selector: &str, deadline: tokio::time::Instant) -> Result<bool> {
        loop {
            if self.find_element(selector).await?.is_some() {
                return Ok(true);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/url", self.session_url))
            .json(&json!({ "url": url }))
            .send()
            .await
            .context("Failed to send navigate request")?;

        if !response.status().is_success() {
            return Err(error_from(response, "navigate").await);
        }
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;

        // A lookup still in flight at the deadline counts as absent.
        match tokio::time::timeout_at(deadline, self.poll_until(selector, deadline)).await {
            Ok(found) => found,
            Err(_) => {
                warn!("WebDriver did not answer for '{}' within {:?}", selector, timeout);
                Ok(false)
            }
        }
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        let element = self
            .find_element(selector)
            .await?
            .with_context(|| format!("Element '{}' vanished before click", selector))?;

        let response = self
            .client
            .post(format!("{}/element/{}/click", self.session_url, element))
            .json(&json!({}))
            .send()
            .await
            .context("Failed to send click request")?;

        if !response.status().is_success() {
            return Err(error_from(response, "click").await);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let response = self
            .client
            .delete(&self.session_url)
            .send()
            .await
            .context("Failed to send delete session request")?;

        if !response.status().is_success() {
            return Err(error_from(response, "delete session").await);
        }
        debug!("Closed WebDriver session {}", self.session_url);
        Ok(())
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("Leaking WebDriver session {}: no runtime", self.session_url);
            return;
        };

        let client = self.client.clone();
        let session_url = std::mem::take(&mut self.session_url);
        handle.spawn(async move {
            match client.delete(&session_url).send().await {
                Ok(_) => debug!("Deleted dropped WebDriver session {}", session_url),
                Err(e) => warn!("Failed to delete WebDriver session {}: {}", session_url, e),
            }
        });
    }
}
