use crate::{browser::DomCapture,
            dom::DomSnapshot,
            error::{HealError, Result},
            heal::{config::HealConfig,
                   failure::parse_failure_log,
                   harness::{HarnessInvocation, RunOutcome, TestHarness},
                   servers::ServerManager},
            mapping::{MappingReport, SelectorAgent, SelectorMatch},
            patcher::{LocatorTable, SelectorPatcher}};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{fs,
          path::{Path, PathBuf},
          time::Instant};

/// Brings the application servers up and down
pub trait ServerControl {
    fn start_all(&mut self) -> Result<()>;

    /// Must be safe to call more than once
    fn stop_all(&mut self);
}

/// Runs the UI test suite once
pub trait SuiteRunner {
    fn run(&mut self, invocation: &HarnessInvocation) -> Result<RunOutcome>;
}

/// Captures a rendered page
pub trait PageCapture {
    fn capture(&self, url: &str) -> Result<DomSnapshot>;
}

impl ServerControl for ServerManager {
    fn start_all(&mut self) -> Result<()> {
        ServerManager::start_all(self)
    }

    fn stop_all(&mut self) {
        ServerManager::stop_all(self)
    }
}

impl SuiteRunner for TestHarness {
    fn run(&mut self, invocation: &HarnessInvocation) -> Result<RunOutcome> {
        TestHarness::run(self, invocation)
    }
}

impl PageCapture for DomCapture {
    fn capture(&self, url: &str) -> Result<DomSnapshot> {
        self.fetch(url)
    }
}

/// Pipeline position; a report carries the last stage reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealStage {
    Start,
    ServersUp,
    BaselinePass,
    RegressionDetected,
    DomsCaptured,
    FirstHealApplied,
    Validate1,
    ExtractFailingSelector,
    SecondHealApplied,
    Validate2,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealStatus {
    Success,
    Failure,
}

/// A selector written into the healed page object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealedSelector {
    pub name: String,
    pub new_selector: String,
    pub confidence: f64,
}

/// Final summary of one healing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealReport {
    pub status: HealStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub stage: HealStage,

    /// Literals replaced over both heal attempts
    pub updates_applied: usize,

    /// Healed page object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<PathBuf>,

    pub healed: Vec<HealedSelector>,
    pub elapsed_secs: f64,
}

impl HealReport {
    pub fn is_success(&self) -> bool {
        self.status == HealStatus::Success
    }

    /// Mean confidence of the healed selectors, 0 when none
    pub fn mean_confidence(&self) -> f64 {
        if self.healed.is_empty() {
            return 0.0;
        }
        self.healed.iter().map(|h| h.confidence).sum::<f64>() / self.healed.len() as f64
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Mutable run state threaded through the stages
#[derive(Debug)]
struct Progress {
    stage: HealStage,
    updates_applied: usize,
    output_file: Option<PathBuf>,
    healed: IndexMap<String, HealedSelector>,
}

impl Progress {
    fn reach(&mut self, stage: HealStage) {
        log::debug!("Stage reached: {:?}", stage);
        self.stage = stage;
    }

    fn record(&mut self, table: &LocatorTable, results: &IndexMap<String, SelectorMatch>, threshold: f64) {
        for (name, result) in results {
            if result.is_applicable(threshold) && table.find(name).is_some() {
                self.healed.insert(
                    name.clone(),
                    HealedSelector {
                        name: name.clone(),
                        new_selector: result.new_selector.clone(),
                        confidence: result.confidence,
                    },
                );
            }
        }
    }
}

/// Runs the full healing pipeline with one self-correction retry
pub struct HealingOrchestrator<S, R, C> {
    config: HealConfig,
    servers: S,
    runner: R,
    capture: C,
    agent: SelectorAgent,
    patcher: SelectorPatcher,
}

impl HealingOrchestrator<ServerManager, TestHarness, DomCapture> {
    /// Production wiring: dev servers, `python -m <test_module>`, headless Chrome
    pub fn from_config(config: HealConfig) -> Result<Self> {
        let servers = ServerManager::new(config.servers.clone())?.workdir(&config.workdir);
        let runner = TestHarness::python_module(&config.python, &config.test_module)
            .workdir(&config.workdir)
            .timeout(config.suite_timeout);
        let capture = DomCapture::new(config.capture.clone());
        let agent = SelectorAgent::from_api_key(config.api_key.as_deref(), &config.model);

        Ok(Self::new(config, servers, runner, capture, agent))
    }
}

impl<S: ServerControl, R: SuiteRunner, C: PageCapture> HealingOrchestrator<S, R, C> {
    pub fn new(config: HealConfig, servers: S, runner: R, capture: C, agent: SelectorAgent) -> Self {
        Self { config, servers, runner, capture, agent, patcher: SelectorPatcher::new() }
    }

    pub fn config(&self) -> &HealConfig {
        &self.config
    }

    pub fn servers(&self) -> &S {
        &self.servers
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run every stage. Servers are stopped on every exit path and the report is
    /// written to `<reports_dir>/heal_report.json`.
    pub fn run(&mut self) -> HealReport {
        let started = Instant::now();
        let mut progress =
            Progress { stage: HealStage::Start, updates_applied: 0, output_file: None, healed: IndexMap::new() };

        let result = self.pipeline(&mut progress);

        log::info!("Stopping servers...");
        self.servers.stop_all();

        let (status, reason) = match result {
            Ok(()) => (HealStatus::Success, None),
            Err(e) => {
                log::error!("Healing failed at {:?}: {}", progress.stage, e);
                (HealStatus::Failure, Some(e.to_string()))
            }
        };

        let report = HealReport {
            status,
            reason,
            stage: progress.stage,
            updates_applied: progress.updates_applied,
            output_file: progress.output_file,
            healed: progress.healed.into_values().collect(),
            elapsed_secs: started.elapsed().as_secs_f64(),
        };

        log::info!(
            "Healing {}: {} selector(s) healed, mean confidence {:.2}, {:.1}s elapsed",
            if report.is_success() { "succeeded" } else { "failed" },
            report.healed.len(),
            report.mean_confidence(),
            report.elapsed_secs
        );

        let report_path = self.config.resolve(&self.config.reports_dir).join("heal_report.json");
        match report.save(&report_path) {
            Ok(()) => log::info!("Heal report saved to: {}", report_path.display()),
            Err(e) => log::warn!("Could not save heal report: {}", e),
        }

        report
    }

    fn pipeline(&mut self, progress: &mut Progress) -> Result<()> {
        let threshold = self.config.confidence_threshold;
        let source_path = self.config.resolve(&self.config.selectors_path);
        let v1_module = self.config.selector_module(&source_path);
        let v1_url = self.config.v1_url.clone();
        let v2_url = self.config.v2_url.clone();

        log::info!("Step 1: starting servers");
        self.servers.start_all()?;
        progress.reach(HealStage::ServersUp);

        log::info!("Step 2: baseline tests on v1");
        let baseline = self.validate(&v1_url, &v1_module)?;
        if !baseline.passed {
            return Err(HealError::Stage("Baseline tests on v1 failed.".to_string()));
        }
        progress.reach(HealStage::BaselinePass);

        log::info!("Step 3: failure detection on v2");
        let regression = self.validate(&v2_url, &v1_module)?;
        if regression.passed {
            return Err(HealError::Stage("Tests on v2 passed unexpectedly. Nothing to heal.".to_string()));
        }
        progress.reach(HealStage::RegressionDetected);

        log::info!("Step 4: capturing DOMs");
        let dom_v1 = self.snapshot(&v1_url, "v1")?;
        let dom_v2 = self.snapshot(&v2_url, "v2")?;
        if !(dom_v1.success && dom_v2.success) {
            let cause = dom_v1.error.or(dom_v2.error).unwrap_or_default();
            return Err(HealError::Stage(format!("Failed to fetch one or both DOMs: {}", cause)));
        }
        progress.reach(HealStage::DomsCaptured);

        log::info!("Step 5: initial healing attempt");
        let original = LocatorTable::from_file(&source_path)?;
        let selectors = original.selectors();
        if selectors.is_empty() {
            return Err(HealError::Stage(format!("No locators found in {}", source_path.display())));
        }

        let results = self.agent.map_all(&selectors, &dom_v1.html, &dom_v2.html, None);
        self.save_mapping_report(&results, 1);

        let outcome = self.patcher.apply(&source_path, &results, threshold, true)?;
        let output_path = match outcome.output_path {
            Some(path) if outcome.applied_count > 0 => path,
            _ => {
                return Err(HealError::Stage(
                    "Mapping quality too low. No high-confidence selectors were found.".to_string(),
                ));
            }
        };
        progress.updates_applied += outcome.applied_count;
        progress.output_file = Some(output_path.clone());
        progress.record(&original, &results, threshold);
        progress.reach(HealStage::FirstHealApplied);

        log::info!("Step 6: validating first healing attempt");
        let v2_module = self.config.selector_module(&output_path);
        let first = self.validate(&v2_url, &v2_module)?;
        progress.reach(HealStage::Validate1);
        if first.passed {
            progress.reach(HealStage::Done);
            return Ok(());
        }

        log::info!("Step 7: self-correction");
        let patched = LocatorTable::from_file(&output_path)?.selectors();
        progress.reach(HealStage::ExtractFailingSelector);
        let Some(failure) = parse_failure_log(&first.log, &[&patched, &selectors]) else {
            progress.reach(HealStage::Done);
            return Err(HealError::Stage(
                "Validation failed and the failing selector could not be determined from the test log.".to_string(),
            ));
        };

        let old_selector = selectors.get(&failure.selector_name).cloned().ok_or_else(|| {
            HealError::Stage(format!("Selector '{}' is not declared in the original page object", failure.selector_name))
        })?;
        let scope = IndexMap::from([(failure.selector_name.clone(), old_selector)]);
        let retry = self.agent.map_all(&scope, &dom_v1.html, &dom_v2.html, Some(&failure));
        self.save_mapping_report(&retry, 2);

        let second = self.patcher.apply(&output_path, &retry, threshold, false)?;
        if second.applied_count == 0 {
            log::warn!("Focused re-heal of '{}' produced no applicable update", failure.selector_name);
        }
        progress.updates_applied += second.applied_count;
        progress.record(&original, &retry, threshold);
        progress.reach(HealStage::SecondHealApplied);

        log::info!("Step 8: validating second healing attempt");
        let last = self.validate(&v2_url, &v2_module)?;
        progress.reach(HealStage::Validate2);
        progress.reach(HealStage::Done);

        if last.passed {
            Ok(())
        } else {
            Err(HealError::Stage("Tests still fail after the self-correction attempt.".to_string()))
        }
    }

    fn validate(&mut self, url: &str, module: &str) -> Result<RunOutcome> {
        self.runner.run(&HarnessInvocation::new(url, module))
    }

    fn snapshot(&self, url: &str, label: &str) -> Result<DomSnapshot> {
        let snapshot = self.capture.capture(url)?;
        let path = self.config.resolve(&self.config.dom_dir).join(format!("{}_dom.json", label));
        snapshot.save(&path)?;
        Ok(snapshot)
    }

    fn save_mapping_report(&self, results: &IndexMap<String, SelectorMatch>, attempt: usize) {
        let path = self.config.resolve(&self.config.reports_dir).join(format!("mapping_report_{}.json", attempt));
        if let Err(e) = MappingReport::from_results(results).save(&path) {
            log::warn!("Could not save mapping report: {}", e);
        }
    }
}

impl<S, R, C> std::fmt::Debug for HealingOrchestrator<S, R, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealingOrchestrator").field("config", &self.config).field("agent", &self.agent).finish()
    }
}
