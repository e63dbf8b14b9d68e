//! W3C WebDriver implementation of the automation surface
//!
//! Speaks the WebDriver wire protocol (JSON over HTTP) against a local
//! driver endpoint such as chromedriver. Only the handful of commands the
//! pipeline needs are implemented: session lifecycle, navigation, element
//! lookup, keystrokes, clicks.
//!
//! Element waits are implemented by polling the element-lookup command at a
//! fixed interval; navigation waits poll the current URL until it moves away
//! from the page recorded at the last navigate/click.

use crate::automation::{AutomationSurface, SurfaceProvider};
use crate::config::AutomationConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// W3C element identifier key in find-element responses
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Interval between element-lookup attempts while waiting
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Opens WebDriver sessions against a configured driver endpoint
pub struct WebDriverProvider {
    config: AutomationConfig,
    /// Browser download directory, wired into the session capabilities
    download_dir: PathBuf,
    client: reqwest::Client,
}

impl WebDriverProvider {
    /// Create a provider for the given automation settings
    ///
    /// `download_dir` is passed to the browser so export downloads land where
    /// the download waiter polls.
    pub fn new(config: AutomationConfig, download_dir: PathBuf) -> Self {
        Self {
            config,
            download_dir,
            client: reqwest::Client::new(),
        }
    }

    fn session_capabilities(&self) -> Value {
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": [
                            format!("--user-agent={}", self.config.user_agent),
                        ],
                        "prefs": {
                            "download.default_directory": self.download_dir.to_string_lossy(),
                            "download.prompt_for_download": false,
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl SurfaceProvider for WebDriverProvider {
    async fn open_surface(&self) -> Result<Box<dyn AutomationSurface>> {
        let endpoint = format!("{}/session", self.config.webdriver_url);
        let response = self
            .client
            .post(&endpoint)
            .json(&self.session_capabilities())
            .send()
            .await?;

        let body: Value = response.json().await?;
        let session_id = body["value"]["sessionId"]
            .as_str()
            .ok_or_else(|| command_error("create session", &body))?
            .to_string();

        info!(session_id, "webdriver session opened");

        Ok(Box::new(WebDriverSurface {
            client: self.client.clone(),
            session_url: format!("{}/session/{}", self.config.webdriver_url, session_id),
            last_page_url: Mutex::new(String::new()),
        }))
    }
}

/// One live WebDriver session
pub struct WebDriverSurface {
    client: reqwest::Client,
    /// `{driver}/session/{id}`
    session_url: String,
    /// URL current at the last navigate/click, for navigation detection
    last_page_url: Mutex<String>,
}

impl WebDriverSurface {
    /// Issue a session-scoped command and return the parsed `value` field
    async fn command(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.session_url, path);
        let is_post = method == reqwest::Method::POST;
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        } else if is_post {
            // WebDriver rejects POST commands without a JSON body
            request = request.json(&json!({}));
        }

        let response = request.send().await?;
        let status = response.status();
        let parsed: Value = response.json().await?;

        if !status.is_success() {
            return Err(command_error(path, &parsed));
        }
        Ok(parsed["value"].clone())
    }

    /// Find a single element by CSS selector, returning its element id
    async fn find_element(&self, selector: &str) -> Result<String> {
        let value = self
            .command(
                reqwest::Method::POST,
                "/element",
                Some(json!({"using": "css selector", "value": selector})),
            )
            .await?;

        value[ELEMENT_KEY]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Automation(format!("no element id for selector {selector}")))
    }

    async fn current_url(&self) -> Result<String> {
        let value = self.command(reqwest::Method::GET, "/url", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Automation("driver returned no current url".into()))
    }

    /// Record the current URL as the navigation baseline
    async fn snapshot_page_url(&self) {
        match self.current_url().await {
            Ok(url) => *self.last_page_url.lock().await = url,
            // A failed snapshot only degrades navigation detection
            Err(e) => debug!(error = %e, "could not snapshot current url"),
        }
    }
}

#[async_trait]
impl AutomationSurface for WebDriverSurface {
    async fn navigate(&self, url: &str) -> Result<()> {
        debug!(url, "navigate");
        self.command(reqwest::Method::POST, "/url", Some(json!({"url": url})))
            .await?;
        *self.last_page_url.lock().await = url.to_string();
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        debug!(selector, "fill");
        let element = self.find_element(selector).await?;

        self.command(
            reqwest::Method::POST,
            &format!("/element/{element}/clear"),
            None,
        )
        .await?;
        self.command(
            reqwest::Method::POST,
            &format!("/element/{element}/value"),
            Some(json!({"text": value})),
        )
        .await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        debug!(selector, "click");
        // Clicks can trigger navigation; record where we were first
        self.snapshot_page_url().await;

        let element = self.find_element(selector).await?;
        self.command(
            reqwest::Method::POST,
            &format!("/element/{element}/click"),
            None,
        )
        .await?;
        Ok(())
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.find_element(selector).await {
                Ok(_) => return Ok(()),
                Err(_) if Instant::now() < deadline => {
                    tokio::time::sleep(WAIT_POLL_INTERVAL).await;
                }
                Err(_) => {
                    return Err(Error::Automation(format!(
                        "element {selector} did not appear within {timeout:?}"
                    )));
                }
            }
        }
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> Result<()> {
        let baseline = self.last_page_url.lock().await.clone();
        let deadline = Instant::now() + timeout;

        loop {
            let current = self.current_url().await?;
            if current != baseline {
                debug!(from = baseline, to = current, "navigation observed");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::Automation(format!(
                    "no navigation away from {baseline} within {timeout:?}"
                )));
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let url = self.session_url.clone();
        let response = self.client.delete(&url).send().await?;
        if !response.status().is_success() {
            warn!(status = %response.status(), "webdriver session delete returned non-success");
        }
        info!("webdriver session closed");
        Ok(())
    }
}

/// Build an automation error from a driver error payload
fn command_error(context: &str, body: &Value) -> Error {
    let detail = body["value"]["message"]
        .as_str()
        .or_else(|| body["value"]["error"].as_str())
        .unwrap_or("unrecognized driver response");
    Error::Automation(format!("{context}: {detail}"))
}
