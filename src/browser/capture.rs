use crate::{browser::{config::LaunchOptions, session::BrowserSession},
            dom::DomSnapshot,
            error::{HealError, Result}};
use std::time::Duration;

/// Pause after the readiness selector appears so client-side rendering can settle
pub const RENDER_GRACE_DELAY: Duration = Duration::from_secs(2);

/// How a page is captured
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Browser launch configuration
    pub launch: LaunchOptions,

    /// Element whose presence marks the page as rendered
    pub readiness_selector: String,

    /// Upper bound on waiting for `readiness_selector`
    pub readiness_timeout: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            launch: LaunchOptions::default(),
            readiness_selector: "body".to_string(),
            readiness_timeout: Duration::from_secs(15),
        }
    }
}

impl CaptureOptions {
    /// Builder method: set readiness selector
    pub fn readiness_selector(mut self, selector: impl Into<String>) -> Self {
        self.readiness_selector = selector.into();
        self
    }

    /// Builder method: set readiness timeout
    pub fn readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }
}

/// Captures fully rendered page HTML with a fresh browser session per page
#[derive(Debug, Clone, Default)]
pub struct DomCapture {
    options: CaptureOptions,
}

impl DomCapture {
    pub fn new(options: CaptureOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    /// Capture `url` into a snapshot.
    ///
    /// Navigation and readiness failures are reported inside the snapshot with
    /// `success == false`. Only a browser that cannot be launched is an `Err`.
    /// The session lives for this call only and is dropped on every path.
    pub fn fetch(&self, url: &str) -> Result<DomSnapshot> {
        log::info!("Fetching DOM from: {}", url);
        let session = BrowserSession::launch(self.options.launch.clone())?;

        match self.read_page(&session, url) {
            Ok((title, html)) => Ok(DomSnapshot::captured(url, title, html)),
            Err(e @ HealError::LaunchFailed(_)) => Err(e),
            Err(e) => {
                let message = format!("Error fetching DOM from {}: {}", url, e);
                log::error!("{}", message);
                Ok(DomSnapshot::failed(url, message))
            }
        }
    }

    fn read_page(&self, session: &BrowserSession, url: &str) -> Result<(String, String)> {
        session.navigate(url)?;
        session.wait_for_element(&self.options.readiness_selector, self.options.readiness_timeout)?;

        std::thread::sleep(RENDER_GRACE_DELAY);

        let html = session.content()?;
        let title = session.title()?;
        Ok((title, html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_options_defaults() {
        let options = CaptureOptions::default();
        assert_eq!(options.readiness_selector, "body");
        assert_eq!(options.readiness_timeout, Duration::from_secs(15));
        assert!(options.launch.headless);
    }

    #[test]
    fn test_capture_options_builder() {
        let options = CaptureOptions::default().readiness_selector("#root").readiness_timeout(Duration::from_secs(30));
        let capture = DomCapture::new(options);
        assert_eq!(capture.options().readiness_selector, "#root");
        assert_eq!(capture.options().readiness_timeout, Duration::from_secs(30));
    }

    #[test]
    #[ignore] // Requires Chrome to be installed
    fn test_fetch_data_url() {
        let capture = DomCapture::default();
        let snapshot = capture
            .fetch("data:text/html,<html><head><title>Movies</title></head><body><h1>Films</h1></body></html>")
            .expect("Failed to launch browser");

        assert!(snapshot.success);
        assert_eq!(snapshot.title, "Movies");
        assert!(snapshot.html.contains("Films"));
    }

    #[test]
    #[ignore]
    fn test_fetch_readiness_timeout_is_reported() {
        let capture = DomCapture::new(
            CaptureOptions::default().readiness_selector("#never-rendered").readiness_timeout(Duration::from_secs(1)),
        );
        let snapshot = capture.fetch("about:blank").expect("Failed to launch browser");

        assert!(!snapshot.success);
        assert!(snapshot.error.unwrap().contains("#never-rendered"));
    }
}
