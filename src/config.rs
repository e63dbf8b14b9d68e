//! Configuration types for export-sync

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Credentials for the target web application
///
/// Supplied once per run by the embedding application; never persisted by the
/// core. Missing values are a precondition failure (see [`Config::validate`]),
/// not an error to recover from.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Login identity (email address)
    pub identity: String,

    /// Login secret (password)
    pub secret: String,
}

// Manual Debug keeps the secret out of logs and panic messages.
impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// UI automation surface configuration (driver endpoint, target application)
///
/// Groups settings for the WebDriver-backed automation surface.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// WebDriver endpoint (default: "http://localhost:9515")
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Base URL of the target web application
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the login page relative to `base_url`
    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// User agent presented by the browsing context
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum wait for an element to appear (default: 30 seconds)
    #[serde(default = "default_element_wait", with = "duration_serde")]
    pub element_wait: Duration,

    /// Maximum wait for the post-login navigation to complete (default: 60 seconds)
    #[serde(default = "default_navigation_wait", with = "duration_serde")]
    pub navigation_wait: Duration,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            base_url: default_base_url(),
            login_path: default_login_path(),
            user_agent: default_user_agent(),
            element_wait: default_element_wait(),
            navigation_wait: default_navigation_wait(),
        }
    }
}

impl AutomationConfig {
    /// Absolute URL of the login page
    pub fn login_url(&self) -> String {
        format!("{}{}", self.base_url, self.login_path)
    }
}

/// CSS selectors for the login flow
///
/// Defaults match the target application's current login markup; all are
/// overridable because the markup is outside our control.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginSelectors {
    /// Email entry field
    #[serde(default = "default_email_field")]
    pub email_field: String,

    /// "Next" button after email entry
    #[serde(default = "default_next_button")]
    pub next_button: String,

    /// Identity-verification confirmation button
    #[serde(default = "default_verify_button")]
    pub verify_button: String,

    /// Password entry field
    #[serde(default = "default_password_field")]
    pub password_field: String,

    /// Submit button (shared by the password and code steps)
    #[serde(default = "default_submit_button")]
    pub submit_button: String,

    /// One-time-code entry field
    #[serde(default = "default_code_field")]
    pub code_field: String,
}

impl Default for LoginSelectors {
    fn default() -> Self {
        Self {
            email_field: default_email_field(),
            next_button: default_next_button(),
            verify_button: default_verify_button(),
            password_field: default_password_field(),
            submit_button: default_submit_button(),
            code_field: default_code_field(),
        }
    }
}

/// Mailbox connection parameters for one-time-code retrieval
#[derive(Clone, Serialize, Deserialize)]
pub struct MailboxConfig {
    /// IMAP host (default: "imap.gmail.com")
    #[serde(default = "default_imap_host")]
    pub host: String,

    /// IMAP port (default: 993, implicit TLS)
    #[serde(default = "default_imap_port")]
    pub port: u16,

    /// Mailbox account user
    pub username: String,

    /// Mailbox account password
    pub password: String,
}

impl std::fmt::Debug for MailboxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            host: default_imap_host(),
            port: default_imap_port(),
            username: String::new(),
            password: String::new(),
        }
    }
}

/// One-time-code retrieval configuration
///
/// The pattern list is ordered: the primary pattern is tried first, fallbacks
/// after. Patterns are configurable because the email template they were
/// tuned against belongs to one specific deployment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OtpConfig {
    /// Sender address the verification message must come from
    #[serde(default = "default_otp_sender")]
    pub sender: Option<String>,

    /// Optional subject substring filter
    #[serde(default)]
    pub subject: Option<String>,

    /// Ordered extraction patterns; each must capture the code in group 1
    #[serde(default = "default_otp_patterns")]
    pub patterns: Vec<String>,

    /// Wait before the first mailbox attempt, to allow delivery latency (default: 5 seconds)
    #[serde(default = "default_delivery_grace", with = "duration_serde")]
    pub delivery_grace: Duration,

    /// Retry policy for mailbox attempts (delivery latency is the dominant variable)
    #[serde(default = "default_otp_retry")]
    pub retry: RetryConfig,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            sender: default_otp_sender(),
            subject: None,
            patterns: default_otp_patterns(),
            delivery_grace: default_delivery_grace(),
            retry: default_otp_retry(),
        }
    }
}

/// CSS selectors for the export trigger flow
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportSelectors {
    /// Container that signals the file listing has rendered
    #[serde(default = "default_listing_container")]
    pub listing_container: String,

    /// Select-all control for the file listing
    #[serde(default = "default_select_all")]
    pub select_all: String,

    /// Actions-menu opener
    #[serde(default = "default_actions_menu")]
    pub actions_menu: String,

    /// Download menu item
    #[serde(default = "default_download_item")]
    pub download_item: String,
}

impl Default for ExportSelectors {
    fn default() -> Self {
        Self {
            listing_container: default_listing_container(),
            select_all: default_select_all(),
            actions_menu: default_actions_menu(),
            download_item: default_download_item(),
        }
    }
}

/// Export trigger and download waiter configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Identifier of the resource whose files are exported
    #[serde(default)]
    pub resource_id: String,

    /// Path of the resource's file listing relative to `base_url`;
    /// `{resource_id}` is substituted
    #[serde(default = "default_listing_path")]
    pub listing_path: String,

    /// Directory the browser downloads into (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Working directory for archive extraction (default: "./work")
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Download directory poll interval (default: 1 second)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Maximum wait for a completed download to appear (default: 300 seconds)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub download_timeout: Duration,

    /// Filename suffixes that mark a download as still in progress
    #[serde(default = "default_in_progress_suffixes")]
    pub in_progress_suffixes: Vec<String>,

    /// Selectors for the export UI actions
    #[serde(default)]
    pub selectors: ExportSelectors,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            resource_id: String::new(),
            listing_path: default_listing_path(),
            download_dir: default_download_dir(),
            work_dir: default_work_dir(),
            poll_interval: default_poll_interval(),
            download_timeout: default_download_timeout(),
            in_progress_suffixes: default_in_progress_suffixes(),
            selectors: ExportSelectors::default(),
        }
    }
}

impl ExportConfig {
    /// Absolute URL of the resource's file listing
    pub fn listing_url(&self, base_url: &str) -> String {
        let path = self.listing_path.replace("{resource_id}", &self.resource_id);
        format!("{base_url}{path}")
    }
}

/// Object-storage configuration (OAuth client, endpoints, mirror behavior)
#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// OAuth client id
    #[serde(default)]
    pub client_id: String,

    /// OAuth client secret
    #[serde(default)]
    pub client_secret: String,

    /// OAuth refresh token used to mint access tokens
    #[serde(default)]
    pub refresh_token: String,

    /// Parent folder handle the export root is created under (None = storage root)
    #[serde(default)]
    pub root_parent: Option<String>,

    /// Name for the export root folder (None = "export-<UTC timestamp>")
    #[serde(default)]
    pub root_name: Option<String>,

    /// Metadata API base (default: Google Drive v3)
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Upload API base (default: Google Drive v3 upload endpoint)
    #[serde(default = "default_upload_base")]
    pub upload_base: String,

    /// OAuth token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Concurrent file uploads within one directory (default: 4)
    #[serde(default = "default_max_concurrent_uploads")]
    pub max_concurrent_uploads: usize,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("root_parent", &self.root_parent)
            .field("root_name", &self.root_name)
            .field("api_base", &self.api_base)
            .field("upload_base", &self.upload_base)
            .field("token_url", &self.token_url)
            .field("max_concurrent_uploads", &self.max_concurrent_uploads)
            .finish()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            root_parent: None,
            root_name: None,
            api_base: default_api_base(),
            upload_base: default_upload_base(),
            token_url: default_token_url(),
            max_concurrent_uploads: default_max_concurrent_uploads(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for the export pipeline
///
/// Fields are organized into logical sub-configs:
/// - [`credentials`](CredentialsConfig) - target application login
/// - [`automation`](AutomationConfig) - driver endpoint, target URLs, waits
/// - [`login_selectors`](LoginSelectors) - login flow markup
/// - [`mailbox`](MailboxConfig) / [`otp`](OtpConfig) - one-time-code retrieval
/// - [`export`](ExportConfig) - export trigger, download directory polling
/// - [`storage`](StorageConfig) - object-storage client and mirror behavior
///
/// The core performs no parsing of configuration sources; the embedding
/// application deserializes this from wherever it keeps settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Target application credentials
    #[serde(default = "empty_credentials")]
    pub credentials: CredentialsConfig,

    /// Automation surface settings
    #[serde(default)]
    pub automation: AutomationConfig,

    /// Login flow selectors
    #[serde(default)]
    pub login_selectors: LoginSelectors,

    /// Mailbox connection parameters
    #[serde(default)]
    pub mailbox: MailboxConfig,

    /// One-time-code retrieval settings
    #[serde(default)]
    pub otp: OtpConfig,

    /// Export and download settings
    #[serde(default)]
    pub export: ExportConfig,

    /// Object-storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Minimum spacing between outbound navigation actions (default: 3 seconds)
    #[serde(default = "default_rate_limit_interval", with = "duration_serde")]
    pub rate_limit_interval: Duration,

    /// Overall run timeout; a run exceeding it is cancelled, cleanup still runs
    /// (None = no bound)
    #[serde(default, with = "opt_duration_serde")]
    pub run_timeout: Option<Duration>,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        empty_credentials()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials: CredentialsConfig::default(),
            automation: AutomationConfig::default(),
            login_selectors: LoginSelectors::default(),
            mailbox: MailboxConfig::default(),
            otp: OtpConfig::default(),
            export: ExportConfig::default(),
            storage: StorageConfig::default(),
            rate_limit_interval: default_rate_limit_interval(),
            run_timeout: None,
        }
    }
}

impl Config {
    /// Check run preconditions
    ///
    /// Missing credentials or resource id are configuration errors, fatal
    /// with no retry. Called by the orchestrator before opening any session.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.automation.webdriver_url).map_err(|e| {
            Error::config_key(
                format!("invalid webdriver endpoint: {e}"),
                "automation.webdriver_url",
            )
        })?;
        url::Url::parse(&self.automation.base_url).map_err(|e| {
            Error::config_key(
                format!("invalid application base URL: {e}"),
                "automation.base_url",
            )
        })?;
        if self.credentials.identity.is_empty() {
            return Err(Error::config_key(
                "login identity is not configured",
                "credentials.identity",
            ));
        }
        if self.credentials.secret.is_empty() {
            return Err(Error::config_key(
                "login secret is not configured",
                "credentials.secret",
            ));
        }
        if self.export.resource_id.is_empty() {
            return Err(Error::config_key(
                "export resource id is not configured",
                "export.resource_id",
            ));
        }
        if self.mailbox.username.is_empty() || self.mailbox.password.is_empty() {
            return Err(Error::config_key(
                "mailbox account is not configured",
                "mailbox.username",
            ));
        }
        if self.otp.patterns.is_empty() {
            return Err(Error::config_key(
                "at least one code extraction pattern is required",
                "otp.patterns",
            ));
        }
        Ok(())
    }
}

fn empty_credentials() -> CredentialsConfig {
    CredentialsConfig {
        identity: String::new(),
        secret: String::new(),
    }
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_base_url() -> String {
    "https://app.buildingconnected.com".to_string()
}

fn default_login_path() -> String {
    "/login?retUrl=%2F".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/138.0.0.0 Safari/537.36"
        .to_string()
}

fn default_element_wait() -> Duration {
    Duration::from_secs(30)
}

fn default_navigation_wait() -> Duration {
    Duration::from_secs(60)
}

fn default_email_field() -> String {
    "#emailField".to_string()
}

fn default_next_button() -> String {
    "button[aria-label=\"NEXT\"]".to_string()
}

fn default_verify_button() -> String {
    "#verify_user_btn".to_string()
}

fn default_password_field() -> String {
    "#password".to_string()
}

fn default_submit_button() -> String {
    "#btnSubmit".to_string()
}

fn default_code_field() -> String {
    "#VerificationCode".to_string()
}

fn default_imap_host() -> String {
    "imap.gmail.com".to_string()
}

fn default_imap_port() -> u16 {
    993
}

fn default_otp_sender() -> Option<String> {
    Some("noreply@signin.autodesk.com".to_string())
}

fn default_otp_patterns() -> Vec<String> {
    vec![
        r"(?i)code:\s*(\d{6})\s*(?:\r?\n|$)".to_string(),
        r"(?i)one-time passcode \(OTP\)[:\s]*(\d{6})".to_string(),
    ]
}

fn default_delivery_grace() -> Duration {
    Duration::from_secs(5)
}

fn default_otp_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 5,
        initial_delay: Duration::from_secs(5),
        max_delay: Duration::from_secs(30),
        backoff_multiplier: 2.0,
        jitter: true,
    }
}

fn default_listing_container() -> String {
    "[data-id=\"file-table\"]".to_string()
}

fn default_select_all() -> String {
    "[data-id=\"select-all-checkbox\"]".to_string()
}

fn default_actions_menu() -> String {
    "[data-id=\"file-actions-menu\"]".to_string()
}

fn default_download_item() -> String {
    "[data-id=\"download-menu-item\"]".to_string()
}

fn default_listing_path() -> String {
    "/companies/{resource_id}/files".to_string()
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./work")
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_in_progress_suffixes() -> Vec<String> {
    vec![
        ".crdownload".to_string(),
        ".part".to_string(),
        ".download".to_string(),
        ".tmp".to_string(),
    ]
}

fn default_api_base() -> String {
    "https://www.googleapis.com/drive/v3".to_string()
}

fn default_upload_base() -> String {
    "https://www.googleapis.com/upload/drive/v3".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_max_concurrent_uploads() -> usize {
    4
}

fn default_rate_limit_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod opt_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
