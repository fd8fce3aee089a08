use crate::{browser::config::LaunchOptions,
            error::{HealError, Result}};
use headless_chrome::{Browser, Tab};
use std::{ffi::OsStr, sync::Arc, time::Duration};

/// Browser session that owns a Chrome/Chromium instance and one working tab.
///
/// Dropping the session drops the owned [`Browser`], whose own `Drop` kills the
/// Chrome process, so a session scoped to a block is released on every exit path.
pub struct BrowserSession {
    /// The underlying headless_chrome Browser instance
    browser: Browser,

    /// Tab all navigation happens in
    tab: Arc<Tab>,
}

impl BrowserSession {
    /// Launch a new browser instance with the given options
    pub fn launch(options: LaunchOptions) -> Result<Self> {
        let mut launch_opts = headless_chrome::LaunchOptions::default();

        launch_opts.ignore_default_args.push(OsStr::new("--enable-automation"));
        launch_opts.args.push(OsStr::new("--disable-dev-shm-usage"));
        launch_opts.args.push(OsStr::new("--disable-gpu"));

        // A capture can sit behind a slow dev server; the default 30s idle timeout closes the session too soon
        launch_opts.idle_browser_timeout = Duration::from_secs(10 * 60);

        launch_opts.headless = options.headless;
        launch_opts.window_size = Some((options.window_width, options.window_height));
        launch_opts.sandbox = options.sandbox;

        if let Some(path) = options.chrome_path {
            launch_opts.path = Some(path);
        }

        let browser = Browser::new(launch_opts).map_err(|e| HealError::LaunchFailed(e.to_string()))?;

        let tab = browser.new_tab().map_err(|e| HealError::LaunchFailed(format!("Failed to create tab: {}", e)))?;

        log::debug!("Browser session launched");
        Ok(Self { browser, tab })
    }

    /// Get the working tab
    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }

    /// Get the underlying Browser instance
    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Navigate the working tab to a URL and wait for the load to finish
    pub fn navigate(&self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .map_err(|e| HealError::NavigationFailed(format!("Failed to navigate to {}: {}", url, e)))?;

        self.tab
            .wait_until_navigated()
            .map_err(|e| HealError::NavigationFailed(format!("Navigation timeout for {}: {}", url, e)))?;

        Ok(())
    }

    /// Block until `css_selector` is present in the page, bounded by `timeout`
    pub fn wait_for_element(&self, css_selector: &str, timeout: Duration) -> Result<()> {
        self.tab.wait_for_element_with_custom_timeout(css_selector, timeout).map_err(|e| {
            HealError::NavigationFailed(format!(
                "Element '{}' did not appear within {}s: {}",
                css_selector,
                timeout.as_secs(),
                e
            ))
        })?;
        Ok(())
    }

    /// Serialized HTML of the current document
    pub fn content(&self) -> Result<String> {
        self.tab.get_content().map_err(|e| HealError::ContentFailed(e.to_string()))
    }

    /// Title of the current document
    pub fn title(&self) -> Result<String> {
        self.tab.get_title().map_err(|e| HealError::ContentFailed(e.to_string()))
    }
}
