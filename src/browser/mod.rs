//! Browser session management and DOM capture
//!
//! - [`LaunchOptions`]: how Chrome is started
//! - [`BrowserSession`]: a single headless Chrome instance with one working tab
//! - [`DomCapture`]: fetches a fully rendered page into a [`DomSnapshot`](crate::dom::DomSnapshot)

pub mod capture;
pub mod config;
pub mod session;

pub use capture::{CaptureOptions, DomCapture};
pub use config::LaunchOptions;
pub use session::BrowserSession;
