//! Healing orchestration
//!
//! [`HealingOrchestrator`] sequences server startup, the baseline and
//! regression runs, DOM capture, mapping, patching and validation, with one
//! self-correction retry driven by the failure log. Servers, the test suite and
//! page capture sit behind [`ServerControl`], [`SuiteRunner`] and
//! [`PageCapture`].

pub mod config;
pub mod failure;
pub mod harness;
pub mod orchestrator;
pub mod servers;

pub use config::{module_name, HealConfig, DEFAULT_CONFIDENCE_THRESHOLD};
pub use failure::{failed_selector, parse_failure_log};
pub use harness::{HarnessInvocation, RunOutcome, TestHarness, SUITE_TIMEOUT};
pub use orchestrator::{
    HealReport, HealStage, HealStatus, HealedSelector, HealingOrchestrator, PageCapture, ServerControl, SuiteRunner,
};
pub use servers::{ServerManager, ServerSpec, POLL_INTERVAL, READINESS_TIMEOUT};
