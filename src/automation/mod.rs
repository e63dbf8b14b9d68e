//! UI automation surface
//!
//! The core depends on a small capability interface for driving a remote UI
//! (navigate, fill, click, wait-for-element), not on a specific automation
//! engine. The production implementation speaks the W3C WebDriver wire
//! protocol ([`webdriver::WebDriverProvider`]); tests substitute scripted
//! surfaces.

pub mod webdriver;

pub use webdriver::{WebDriverProvider, WebDriverSurface};

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Capability interface for driving a remote UI
///
/// One implementation instance corresponds to one browsing context. The
/// orchestrator owns the lifecycle exclusively: a surface is opened at run
/// start and closed unconditionally at run end, success or not.
#[async_trait]
pub trait AutomationSurface: Send + Sync {
    /// Navigate the browsing context to a URL
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Type a value into the element matching `selector`, replacing existing content
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Click the element matching `selector`
    async fn click(&self, selector: &str) -> Result<()>;

    /// Wait until an element matching `selector` is present
    ///
    /// Returns an error if the element does not appear within `timeout`.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Wait until the browsing context has navigated away from the page that
    /// was current at the last `navigate`/`click`
    ///
    /// Returns an error if no navigation is observed within `timeout`.
    async fn wait_for_navigation(&self, timeout: Duration) -> Result<()>;

    /// Destroy the browsing context
    ///
    /// Consumes the surface; a closed surface cannot be reused.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Factory for automation surfaces
///
/// The pipeline acquires one surface per run through this seam, which keeps
/// the automation engine pluggable (and scriptable in tests).
#[async_trait]
pub trait SurfaceProvider: Send + Sync {
    /// Open a fresh browsing context
    async fn open_surface(&self) -> Result<Box<dyn AutomationSurface>>;
}
