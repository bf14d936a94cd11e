pub mod webdriver;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// Something that can start isolated automation sessions.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn BrowserSession>>;
}

/// One live automation session. Callers must `close` it on every exit path;
/// closing twice is harmless.
#[async_trait]
pub trait BrowserSession: Send {
    async fn goto(&mut self, url: &str) -> Result<()>;

    /// Wait up to `timeout` for an element matching the CSS `selector`.
    /// Returns `false` if it never shows up.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<bool>;

    async fn click(&mut self, selector: &str) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}
