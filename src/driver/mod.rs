//! Page driver abstraction over browser automation.
//!
//! The login and booking routines only consume the capabilities below, so
//! they can run against the live WebDriver client or a scripted fake.

pub mod webdriver;

#[cfg(test)]
pub mod fake;

use std::time::Duration;

use thiserror::Error;

pub use webdriver::WebDriverClient;

pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Debug, Error)]
pub enum DriverError {
    /// Selector matched nothing (recoverable, the page may not be ready).
    #[error("no such element: {selector}")]
    NoSuchElement { selector: String },
    /// A bounded wait ran out (recoverable).
    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },
    /// The remote end rejected a command (fatal).
    #[error("webdriver session error: {0}")]
    Session(String),
    /// Transport failure talking to the WebDriver endpoint (fatal).
    #[error("webdriver transport error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Opaque reference to an element on the current page.
///
/// Handles are snapshots; navigation or refresh invalidates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle(pub String);

/// Browser capabilities the routines consume.
pub trait PageDriver {
    fn navigate(&mut self, url: &str) -> DriverResult<()>;
    fn refresh(&mut self) -> DriverResult<()>;

    /// First element matching a CSS selector, or `NoSuchElement`.
    fn find_element(&mut self, selector: &str) -> DriverResult<ElementHandle>;
    /// All elements matching a CSS selector (possibly empty).
    fn find_elements(&mut self, selector: &str) -> DriverResult<Vec<ElementHandle>>;
    /// All elements matching a CSS selector under `parent`.
    fn find_from(
        &mut self,
        parent: &ElementHandle,
        selector: &str,
    ) -> DriverResult<Vec<ElementHandle>>;

    fn click(&mut self, element: &ElementHandle) -> DriverResult<()>;
    fn clear(&mut self, element: &ElementHandle) -> DriverResult<()>;
    fn send_keys(&mut self, element: &ElementHandle, text: &str) -> DriverResult<()>;
    fn text(&mut self, element: &ElementHandle) -> DriverResult<String>;
    fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> DriverResult<Option<String>>;

    fn get_cookie(&mut self, name: &str) -> DriverResult<Option<String>>;

    /// Polls until `selector` matches, or times out.
    fn wait_visible(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> DriverResult<ElementHandle>;

    /// Waits until the page transitions away from the last stable document.
    ///
    /// Call after an action that triggers navigation. Times out if the
    /// document never goes stale.
    fn wait_stable(&mut self, timeout: Duration) -> DriverResult<()>;

    /// Tears the session down. Safe to call more than once.
    fn close(&mut self);
}

impl DriverError {
    /// Whether a retry might see a different outcome.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DriverError::NoSuchElement { .. } | DriverError::Timeout { .. }
        )
    }
}
