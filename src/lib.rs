//! # selector-heal
//!
//! Heals broken UI-test CSS selectors between two versions of a web application.
//!
//! ## Pipeline
//!
//! - **DOM Capture**: render each version in headless Chrome and snapshot its HTML
//! - **Similarity Matching**: rank elements of the new DOM by text similarity to the element the old selector found
//! - **Selector Mapping**: propose a replacement selector with an LLM, or deterministically when no credential is set
//! - **Patching**: rewrite only the selector literals inside the page object's `Locators` class
//! - **Orchestration**: validate by re-running the UI test suite, with one self-correction retry
//!
//! ## Library Usage
//!
//! ### Mapping Selectors Offline
//!
//! ```rust,no_run
//! use indexmap::IndexMap;
//! use selector_heal::{DomSnapshot, SelectorAgent};
//!
//! # fn main() -> selector_heal::Result<()> {
//! let old = DomSnapshot::load("dom_snapshots/v1_dom.json")?;
//! let new = DomSnapshot::load("dom_snapshots/v2_dom.json")?;
//!
//! let selectors = IndexMap::from([("SORT_NAME".to_string(), "#sort-name".to_string())]);
//! let agent = SelectorAgent::rule_based();
//!
//! for (name, result) in agent.map_all(&selectors, &old.html, &new.html, None) {
//!     println!("{}: {} ({:.2})", name, result.new_selector, result.confidence);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Patching a Page Object
//!
//! ```rust,no_run
//! use selector_heal::{LocatorTable, SelectorAgent, SelectorPatcher};
//! use std::path::Path;
//!
//! # fn main() -> selector_heal::Result<()> {
//! # let (old_html, new_html) = (String::new(), String::new());
//! let source = Path::new("page_selectors/page_v1.py");
//! let selectors = LocatorTable::from_file(source)?.selectors();
//!
//! let results = SelectorAgent::rule_based().map_all(&selectors, &old_html, &new_html, None);
//! let outcome = SelectorPatcher::new().apply(source, &results, 0.5, true)?;
//! println!("{} selector(s) updated", outcome.applied_count);
//! # Ok(())
//! # }
//! ```
//!
//! ### Running the Full Pipeline
//!
//! ```rust,no_run
//! use selector_heal::{HealConfig, HealingOrchestrator};
//!
//! # fn main() -> selector_heal::Result<()> {
//! let config = HealConfig::new().workdir("ui").llm(std::env::var("OPENAI_API_KEY").ok(), "gpt-4-turbo");
//! let report = HealingOrchestrator::from_config(config)?.run();
//! println!("{:?} after {:.1}s", report.status, report.elapsed_secs);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`browser`]: Browser session management and DOM capture
//! - [`dom`]: Snapshots, element context, similarity scoring and candidate ranking
//! - [`mapping`]: Mapping strategies, the selector agent and mapping reports
//! - [`patcher`]: Syntax-tree location and rewriting of selector literals
//! - [`heal`]: Servers, test harness, failure-log analysis and the orchestrator
//! - [`error`]: Error types and result aliases

pub mod browser;
pub mod dom;
pub mod error;
pub mod heal;
pub mod mapping;
pub mod patcher;

pub use browser::{BrowserSession, CaptureOptions, DomCapture, LaunchOptions};
pub use dom::{Candidate, DomSnapshot, ElementContext, SimilarityMatcher, similarity};
pub use error::{HealError, Result};
pub use heal::{HealConfig, HealReport, HealStage, HealStatus, HealingOrchestrator, ServerManager, TestHarness};
pub use mapping::{FailureContext, MappingReport, SelectorAgent, SelectorMappingStrategy, SelectorMatch};
pub use patcher::{LocatorTable, PatchOutcome, SelectorPatcher};
