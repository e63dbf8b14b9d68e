//! Multi-factor login sequencing
//!
//! The login flow is a fixed linear state machine, not a generalized graph:
//! each transition is one UI action batch with its own wait bound and failure
//! kind, which keeps every step independently testable. One authentication
//! attempt per run; there is no automatic replay of the sequence.

use crate::automation::AutomationSurface;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::mailbox::OtpRetriever;
use crate::rate_limiter::RateLimiter;
use crate::retry::run_with_retry;
use crate::types::Event;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Login state machine states
///
/// Strictly linear: every state has at most one successor, and the terminal
/// `Authenticated` state is reached only after the post-submit navigation is
/// observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// No UI action taken yet
    NotStarted,
    /// Email filled and submitted
    EmailEntered,
    /// Identity-verification prompt confirmed
    IdentityVerifyPrompted,
    /// Password filled and submitted
    PasswordEntered,
    /// Code entry control has rendered
    OtpPrompted,
    /// One-time code filled and submitted
    OtpSubmitted,
    /// Post-submit navigation observed
    Authenticated,
}

impl AuthState {
    /// The successor state, or None for the terminal state
    pub fn next(self) -> Option<AuthState> {
        match self {
            AuthState::NotStarted => Some(AuthState::EmailEntered),
            AuthState::EmailEntered => Some(AuthState::IdentityVerifyPrompted),
            AuthState::IdentityVerifyPrompted => Some(AuthState::PasswordEntered),
            AuthState::PasswordEntered => Some(AuthState::OtpPrompted),
            AuthState::OtpPrompted => Some(AuthState::OtpSubmitted),
            AuthState::OtpSubmitted => Some(AuthState::Authenticated),
            AuthState::Authenticated => None,
        }
    }
}

impl std::fmt::Display for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AuthState::NotStarted => "not_started",
            AuthState::EmailEntered => "email_entered",
            AuthState::IdentityVerifyPrompted => "identity_verify_prompted",
            AuthState::PasswordEntered => "password_entered",
            AuthState::OtpPrompted => "otp_prompted",
            AuthState::OtpSubmitted => "otp_submitted",
            AuthState::Authenticated => "authenticated",
        };
        write!(f, "{name}")
    }
}

/// Drives the login state machine over the automation surface
pub struct Authenticator<'a> {
    surface: &'a dyn AutomationSurface,
    retriever: &'a OtpRetriever,
    rate_limiter: &'a RateLimiter,
    config: &'a Config,
    event_tx: broadcast::Sender<Event>,
}

impl<'a> Authenticator<'a> {
    /// Create an authenticator over the given collaborators
    pub fn new(
        surface: &'a dyn AutomationSurface,
        retriever: &'a OtpRetriever,
        rate_limiter: &'a RateLimiter,
        config: &'a Config,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            surface,
            retriever,
            rate_limiter,
            config,
            event_tx,
        }
    }

    /// Run the full login sequence to the terminal state
    pub async fn login(&self) -> Result<()> {
        let mut state = AuthState::NotStarted;

        while state != AuthState::Authenticated {
            state = self.advance(state).await?;
            debug!(state = %state, "login state reached");
            self.event_tx.send(Event::AuthStateReached { state }).ok();
        }

        info!("login successful");
        Ok(())
    }

    /// Execute the single transition out of `state`
    ///
    /// Returns the state that was reached. A UI element not appearing within
    /// its wait bound aborts with an error naming the step that failed; code
    /// retrieval failures propagate unchanged (they have their own taxonomy).
    pub async fn advance(&self, state: AuthState) -> Result<AuthState> {
        let Some(target) = state.next() else {
            return Ok(state);
        };

        let step = match state {
            AuthState::NotStarted => self.enter_email().await,
            AuthState::EmailEntered => self.confirm_identity().await,
            AuthState::IdentityVerifyPrompted => self.enter_password().await,
            AuthState::PasswordEntered => self.await_code_prompt().await,
            AuthState::OtpPrompted => self.submit_code().await,
            AuthState::OtpSubmitted => self.await_authenticated().await,
            AuthState::Authenticated => Ok(()),
        };

        match step {
            Ok(()) => Ok(target),
            // Mailbox failures carry their own sub-cause taxonomy
            Err(e @ Error::CodeRetrieval(_)) => Err(e),
            Err(e) => Err(Error::AuthenticationStep {
                state: target,
                reason: e.to_string(),
            }),
        }
    }

    /// NotStarted → EmailEntered: open the login page, fill the email, advance
    async fn enter_email(&self) -> Result<()> {
        let selectors = &self.config.login_selectors;
        let wait = self.config.automation.element_wait;

        // The only navigation in the sequence; gate it on the rate limiter
        self.rate_limiter.acquire().await;
        self.surface
            .navigate(&self.config.automation.login_url())
            .await?;

        self.surface.wait_for(&selectors.email_field, wait).await?;
        self.surface
            .fill(&selectors.email_field, &self.config.credentials.identity)
            .await?;
        self.surface.click(&selectors.next_button).await
    }

    /// EmailEntered → IdentityVerifyPrompted: confirm the verification prompt
    async fn confirm_identity(&self) -> Result<()> {
        let selectors = &self.config.login_selectors;
        let wait = self.config.automation.element_wait;

        self.surface.wait_for(&selectors.verify_button, wait).await?;
        self.surface.click(&selectors.verify_button).await
    }

    /// IdentityVerifyPrompted → PasswordEntered: fill the password, submit
    async fn enter_password(&self) -> Result<()> {
        let selectors = &self.config.login_selectors;
        let wait = self.config.automation.element_wait;

        self.surface.wait_for(&selectors.password_field, wait).await?;
        self.surface
            .fill(&selectors.password_field, &self.config.credentials.secret)
            .await?;
        self.surface.click(&selectors.submit_button).await
    }

    /// PasswordEntered → OtpPrompted: the code entry control must render
    async fn await_code_prompt(&self) -> Result<()> {
        self.surface
            .wait_for(
                &self.config.login_selectors.code_field,
                self.config.automation.element_wait,
            )
            .await
    }

    /// OtpPrompted → OtpSubmitted: retrieve the code and submit it
    ///
    /// The retriever never retries internally; delivery latency is handled
    /// here with a grace period before the first attempt and backoff between
    /// attempts.
    async fn submit_code(&self) -> Result<()> {
        tokio::time::sleep(self.config.otp.delivery_grace).await;

        let code =
            run_with_retry(&self.config.otp.retry, || self.retriever.fetch_code()).await?;
        self.event_tx.send(Event::CodeRetrieved).ok();

        let selectors = &self.config.login_selectors;
        self.surface.fill(&selectors.code_field, &code).await?;
        self.surface.click(&selectors.submit_button).await
    }

    /// OtpSubmitted → Authenticated: observe the post-submit navigation
    async fn await_authenticated(&self) -> Result<()> {
        self.surface
            .wait_for_navigation(self.config.automation.navigation_wait)
            .await
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CredentialsConfig, OtpConfig, RetryConfig};
    use crate::error::CodeRetrievalError;
    use crate::mailbox::{Mailbox, MailboxSession, SearchCriteria};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Automation surface that records actions and can be told which
    /// selectors never appear.
    struct ScriptedSurface {
        actions: Mutex<Vec<String>>,
        missing: HashSet<String>,
        navigation_completes: bool,
    }

    impl ScriptedSurface {
        fn happy() -> Self {
            Self {
                actions: Mutex::new(Vec::new()),
                missing: HashSet::new(),
                navigation_completes: true,
            }
        }

        fn record(&self, action: String) {
            self.actions.lock().unwrap().push(action);
        }

        fn actions(&self) -> Vec<String> {
            self.actions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AutomationSurface for ScriptedSurface {
        async fn navigate(&self, url: &str) -> Result<()> {
            self.record(format!("navigate {url}"));
            Ok(())
        }

        async fn fill(&self, selector: &str, value: &str) -> Result<()> {
            self.record(format!("fill {selector}={value}"));
            Ok(())
        }

        async fn click(&self, selector: &str) -> Result<()> {
            self.record(format!("click {selector}"));
            Ok(())
        }

        async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
            if self.missing.contains(selector) {
                return Err(Error::Automation(format!(
                    "element {selector} did not appear within {timeout:?}"
                )));
            }
            self.record(format!("wait_for {selector}"));
            Ok(())
        }

        async fn wait_for_navigation(&self, timeout: Duration) -> Result<()> {
            if !self.navigation_completes {
                return Err(Error::Automation(format!(
                    "no navigation within {timeout:?}"
                )));
            }
            self.record("wait_for_navigation".to_string());
            Ok(())
        }

        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    /// Mailbox that always yields one message with the given body
    struct StaticMailbox {
        body: String,
    }

    struct StaticSession {
        body: String,
    }

    impl Mailbox for StaticMailbox {
        fn connect(&self) -> Result<Box<dyn MailboxSession>> {
            Ok(Box::new(StaticSession {
                body: self.body.clone(),
            }))
        }
    }

    impl MailboxSession for StaticSession {
        fn select_inbox(&mut self) -> Result<()> {
            Ok(())
        }

        fn search_unseen(&mut self, _criteria: &SearchCriteria) -> Result<Vec<u32>> {
            Ok(vec![1])
        }

        fn fetch_body(&mut self, _seq: u32) -> Result<String> {
            Ok(self.body.clone())
        }
    }

    fn test_config() -> Config {
        Config {
            credentials: CredentialsConfig {
                identity: "user@example.com".into(),
                secret: "hunter2".into(),
            },
            otp: OtpConfig {
                delivery_grace: Duration::ZERO,
                retry: RetryConfig {
                    max_attempts: 1,
                    initial_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(10),
                    backoff_multiplier: 2.0,
                    jitter: false,
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn retriever_with_body(body: &str, config: &Config) -> OtpRetriever {
        OtpRetriever::new(
            Arc::new(StaticMailbox { body: body.into() }),
            &config.otp,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn login_walks_every_state_in_order() {
        let config = test_config();
        let surface = ScriptedSurface::happy();
        let retriever = retriever_with_body("Code: 482913\n", &config);
        let limiter = RateLimiter::new(Duration::ZERO);
        let (event_tx, mut events) = broadcast::channel(64);

        let auth = Authenticator::new(&surface, &retriever, &limiter, &config, event_tx);
        auth.login().await.unwrap();

        let actions = surface.actions();
        assert_eq!(
            actions,
            vec![
                "navigate https://app.buildingconnected.com/login?retUrl=%2F",
                "wait_for #emailField",
                "fill #emailField=user@example.com",
                "click button[aria-label=\"NEXT\"]",
                "wait_for #verify_user_btn",
                "click #verify_user_btn",
                "wait_for #password",
                "fill #password=hunter2",
                "click #btnSubmit",
                "wait_for #VerificationCode",
                "fill #VerificationCode=482913",
                "click #btnSubmit",
                "wait_for_navigation",
            ]
        );

        // States are announced in machine order, terminal state last
        let mut reached = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let Event::AuthStateReached { state } = event {
                reached.push(state);
            }
        }
        assert_eq!(*reached.last().unwrap(), AuthState::Authenticated);
        assert_eq!(reached.len(), 6);
    }

    #[tokio::test]
    async fn missing_verify_button_fails_at_that_state() {
        let config = test_config();
        let mut surface = ScriptedSurface::happy();
        surface.missing.insert("#verify_user_btn".to_string());
        let retriever = retriever_with_body("Code: 482913\n", &config);
        let limiter = RateLimiter::new(Duration::ZERO);
        let (event_tx, _) = broadcast::channel(64);

        let auth = Authenticator::new(&surface, &retriever, &limiter, &config, event_tx);
        let err = auth.login().await.unwrap_err();

        match err {
            Error::AuthenticationStep { state, .. } => {
                assert_eq!(state, AuthState::IdentityVerifyPrompted);
            }
            other => panic!("expected AuthenticationStep, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_navigation_fails_at_authenticated() {
        let config = test_config();
        let mut surface = ScriptedSurface::happy();
        surface.navigation_completes = false;
        let retriever = retriever_with_body("Code: 482913\n", &config);
        let limiter = RateLimiter::new(Duration::ZERO);
        let (event_tx, _) = broadcast::channel(64);

        let auth = Authenticator::new(&surface, &retriever, &limiter, &config, event_tx);
        let err = auth.login().await.unwrap_err();

        match err {
            Error::AuthenticationStep { state, .. } => {
                assert_eq!(state, AuthState::Authenticated);
            }
            other => panic!("expected AuthenticationStep, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn code_retrieval_failures_propagate_unchanged() {
        let config = test_config();
        let surface = ScriptedSurface::happy();
        // Body matches no pattern: permanent, not retried, surfaced as-is
        let retriever = retriever_with_body("click the link to continue", &config);
        let limiter = RateLimiter::new(Duration::ZERO);
        let (event_tx, _) = broadcast::channel(64);

        let auth = Authenticator::new(&surface, &retriever, &limiter, &config, event_tx);
        let err = auth.login().await.unwrap_err();

        assert!(matches!(
            err,
            Error::CodeRetrieval(CodeRetrievalError::PatternMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn advance_performs_exactly_one_transition() {
        let config = test_config();
        let surface = ScriptedSurface::happy();
        let retriever = retriever_with_body("Code: 482913\n", &config);
        let limiter = RateLimiter::new(Duration::ZERO);
        let (event_tx, _) = broadcast::channel(64);

        let auth = Authenticator::new(&surface, &retriever, &limiter, &config, event_tx);

        let state = auth.advance(AuthState::NotStarted).await.unwrap();
        assert_eq!(state, AuthState::EmailEntered);
        // No verify click yet: only the email step's actions are recorded
        assert!(
            surface
                .actions()
                .iter()
                .all(|a| !a.contains("#verify_user_btn"))
        );
    }

    #[test]
    fn state_chain_terminates_at_authenticated() {
        let mut state = AuthState::NotStarted;
        let mut hops = 0;
        while let Some(next) = state.next() {
            state = next;
            hops += 1;
        }
        assert_eq!(state, AuthState::Authenticated);
        assert_eq!(hops, 6);
    }
}
