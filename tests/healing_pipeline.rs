use indexmap::IndexMap;
use selector_heal::{
    heal::{parse_failure_log, HarnessInvocation, PageCapture, RunOutcome, ServerControl, SuiteRunner},
    DomSnapshot, FailureContext, HealConfig, HealError, HealStage, HealStatus, HealingOrchestrator, LocatorTable,
    MappingReport, Result, SelectorAgent, SelectorPatcher,
};
use std::{collections::{HashMap, VecDeque},
          fs,
          path::Path};

const V1_URL: &str = "http://localhost:3000";
const V2_URL: &str = "http://localhost:3001";

const PAGE_V1: &str = r##"from selenium.webdriver.common.by import By


class Locators:
    MOVIE_TITLE = (By.CSS_SELECTOR, "[data-testid='movie-title']")
    SORT_NAME = (By.CSS_SELECTOR, "#sort-name")
    SUBMIT_BUTTON = (By.CSS_SELECTOR, "#old-button")
"##;

const DOM_V1: &str = r#"<html><body>
    <h1 data-testid="movie-title">Inception</h1>
    <button id="sort-name">Sort by Name</button>
    <button id="old-button">Add to Watchlist</button>
</body></html>"#;

const DOM_V2: &str = r#"<html><body>
    <h1 data-testid="film-title">Inception</h1>
    <button id="sort-by-name">Sort by Name</button>
    <button data-testid="watchlist-add">Add to Watchlist</button>
</body></html>"#;

#[derive(Default)]
struct FakeServers {
    fail: bool,
    starts: usize,
    stops: usize,
}

impl ServerControl for FakeServers {
    fn start_all(&mut self) -> Result<()> {
        self.starts += 1;
        if self.fail {
            return Err(HealError::ServerStartFailed { name: "react_v2".to_string(), reason: "port busy".to_string() });
        }
        Ok(())
    }

    fn stop_all(&mut self) {
        self.stops += 1;
    }
}

struct ScriptedRunner {
    outcomes: VecDeque<RunOutcome>,
    calls: Vec<HarnessInvocation>,
}

impl ScriptedRunner {
    fn new(outcomes: Vec<RunOutcome>) -> Self {
        Self { outcomes: outcomes.into(), calls: Vec::new() }
    }
}

impl SuiteRunner for ScriptedRunner {
    fn run(&mut self, invocation: &HarnessInvocation) -> Result<RunOutcome> {
        self.calls.push(invocation.clone());
        self.outcomes.pop_front().ok_or_else(|| HealError::Harness("no scripted run left".to_string()))
    }
}

struct StaticPages(HashMap<String, String>);

impl StaticPages {
    fn new(v1: &str, v2: Option<&str>) -> Self {
        let mut pages = HashMap::from([(V1_URL.to_string(), v1.to_string())]);
        if let Some(v2) = v2 {
            pages.insert(V2_URL.to_string(), v2.to_string());
        }
        Self(pages)
    }
}

impl PageCapture for StaticPages {
    fn capture(&self, url: &str) -> Result<DomSnapshot> {
        Ok(match self.0.get(url) {
            Some(html) => DomSnapshot::captured(url, "Movies", html.clone()),
            None => DomSnapshot::failed(url, format!("Error fetching DOM from {}: net::ERR_CONNECTION_REFUSED", url)),
        })
    }
}

fn passed() -> RunOutcome {
    RunOutcome { passed: true, exit_code: Some(0), log: "OK\n".to_string(), timed_out: false }
}

fn failed(log: &str) -> RunOutcome {
    RunOutcome { passed: false, exit_code: Some(1), log: log.to_string(), timed_out: false }
}

fn locate_failure(selector: &str) -> String {
    format!(
        "selenium.common.exceptions.NoSuchElementException: Message: no such element: Unable to locate element: \
         {{\"method\":\"css selector\",\"selector\":\"{}\"}}",
        selector
    )
}

fn workspace() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("page_selectors")).unwrap();
    fs::write(dir.path().join("page_selectors/page_v1.py"), PAGE_V1).unwrap();
    dir
}

fn orchestrator(
    workdir: &Path,
    servers: FakeServers,
    runs: Vec<RunOutcome>,
    pages: StaticPages,
) -> HealingOrchestrator<FakeServers, ScriptedRunner, StaticPages> {
    let config = HealConfig::new().workdir(workdir).urls(V1_URL, V2_URL);
    HealingOrchestrator::new(config, servers, ScriptedRunner::new(runs), pages, SelectorAgent::rule_based())
}

fn targets(calls: &[HarnessInvocation]) -> Vec<(&str, &str)> {
    calls.iter().map(|c| (c.target_url.as_str(), c.selector_module.as_str())).collect()
}

#[test]
fn test_heals_on_first_attempt() {
    let dir = workspace();
    let mut heal = orchestrator(
        dir.path(),
        FakeServers::default(),
        vec![passed(), failed(&locate_failure("#sort-name")), passed()],
        StaticPages::new(DOM_V1, Some(DOM_V2)),
    );

    let report = heal.run();

    assert_eq!(report.status, HealStatus::Success, "{:?}", report.reason);
    assert_eq!(report.stage, HealStage::Done);
    assert_eq!(report.updates_applied, 3);
    assert_eq!(report.healed.len(), 3);

    let output = dir.path().join("page_selectors/page_v2.py");
    assert_eq!(report.output_file.as_deref(), Some(output.as_path()));

    let healed = LocatorTable::from_file(&output).unwrap().selectors();
    assert_eq!(healed["MOVIE_TITLE"], "[data-testid='film-title']");
    assert_eq!(healed["SORT_NAME"], "#sort-by-name");
    assert_eq!(healed["SUBMIT_BUTTON"], "[data-testid='watchlist-add']");
    assert_eq!(fs::read_to_string(dir.path().join("page_selectors/page_v1.py")).unwrap(), PAGE_V1);

    assert_eq!(
        targets(&heal.runner().calls),
        vec![
            (V1_URL, "page_selectors.page_v1"),
            (V2_URL, "page_selectors.page_v1"),
            (V2_URL, "page_selectors.page_v2"),
        ]
    );
    assert_eq!(heal.servers().starts, 1);
    assert!(heal.servers().stops >= 1);

    assert!(dir.path().join("dom_snapshots/v1_dom.json").exists());
    assert!(dir.path().join("dom_snapshots/v2_dom.json").exists());
    let mapping: MappingReport =
        serde_json::from_str(&fs::read_to_string(dir.path().join("reports/mapping_report_1.json")).unwrap()).unwrap();
    assert_eq!(mapping.summary.total_selectors, 3);
    assert!(dir.path().join("reports/heal_report.json").exists());
}

#[test]
fn test_self_correction_retries_once() {
    let dir = workspace();
    let mut heal = orchestrator(
        dir.path(),
        FakeServers::default(),
        vec![passed(), failed("AssertionError"), failed(&locate_failure("#sort-by-name")), passed()],
        StaticPages::new(DOM_V1, Some(DOM_V2)),
    );

    let report = heal.run();

    assert!(report.is_success(), "{:?}", report.reason);
    assert_eq!(report.stage, HealStage::Done);
    assert_eq!(report.updates_applied, 4);
    assert_eq!(heal.runner().calls.len(), 4);
    assert_eq!(targets(&heal.runner().calls)[3], (V2_URL, "page_selectors.page_v2"));

    let retry: MappingReport =
        serde_json::from_str(&fs::read_to_string(dir.path().join("reports/mapping_report_2.json")).unwrap()).unwrap();
    assert_eq!(retry.summary.total_selectors, 1);
    assert_eq!(retry.details[0].name, "SORT_NAME");
}

#[test]
fn test_second_validation_failure_is_terminal() {
    let dir = workspace();
    let mut heal = orchestrator(
        dir.path(),
        FakeServers::default(),
        vec![
            passed(),
            failed("AssertionError"),
            failed(&locate_failure("#sort-by-name")),
            failed(&locate_failure("#sort-by-name")),
        ],
        StaticPages::new(DOM_V1, Some(DOM_V2)),
    );

    let report = heal.run();

    assert_eq!(report.status, HealStatus::Failure);
    assert_eq!(report.stage, HealStage::Done);
    assert_eq!(heal.runner().calls.len(), 4);
    assert!(heal.servers().stops >= 1);
}

#[test]
fn test_unattributable_failure_skips_retry() {
    let dir = workspace();
    let mut heal = orchestrator(
        dir.path(),
        FakeServers::default(),
        vec![passed(), failed("AssertionError"), failed("AssertionError: 3 != 4")],
        StaticPages::new(DOM_V1, Some(DOM_V2)),
    );

    let report = heal.run();

    assert_eq!(report.status, HealStatus::Failure);
    assert_eq!(report.stage, HealStage::Done);
    assert!(report.reason.unwrap().contains("could not be determined"));
    assert_eq!(heal.runner().calls.len(), 3);
    assert!(!dir.path().join("reports/mapping_report_2.json").exists());
}

#[test]
fn test_baseline_failure_aborts() {
    let dir = workspace();
    let mut heal = orchestrator(
        dir.path(),
        FakeServers::default(),
        vec![failed("ImportError")],
        StaticPages::new(DOM_V1, Some(DOM_V2)),
    );

    let report = heal.run();

    assert_eq!(report.status, HealStatus::Failure);
    assert_eq!(report.stage, HealStage::ServersUp);
    assert_eq!(report.reason.as_deref(), Some("Baseline tests on v1 failed."));
    assert_eq!(heal.runner().calls.len(), 1);
    assert!(heal.servers().stops >= 1);
}

#[test]
fn test_unexpected_pass_on_v2_aborts() {
    let dir = workspace();
    let mut heal = orchestrator(
        dir.path(),
        FakeServers::default(),
        vec![passed(), passed()],
        StaticPages::new(DOM_V1, Some(DOM_V2)),
    );

    let report = heal.run();

    assert_eq!(report.status, HealStatus::Failure);
    assert_eq!(report.stage, HealStage::BaselinePass);
    assert!(report.reason.unwrap().contains("passed unexpectedly"));
}

#[test]
fn test_capture_failure_aborts() {
    let dir = workspace();
    let mut heal = orchestrator(
        dir.path(),
        FakeServers::default(),
        vec![passed(), failed("")],
        StaticPages::new(DOM_V1, None),
    );

    let report = heal.run();

    assert_eq!(report.status, HealStatus::Failure);
    assert_eq!(report.stage, HealStage::RegressionDetected);
    assert!(report.reason.unwrap().contains("ERR_CONNECTION_REFUSED"));
}

#[test]
fn test_server_failure_still_cleans_up() {
    let dir = workspace();
    let mut heal = orchestrator(
        dir.path(),
        FakeServers { fail: true, ..FakeServers::default() },
        Vec::new(),
        StaticPages::new(DOM_V1, Some(DOM_V2)),
    );

    let report = heal.run();

    assert_eq!(report.status, HealStatus::Failure);
    assert_eq!(report.stage, HealStage::Start);
    assert!(heal.runner().calls.is_empty());
    assert_eq!(heal.servers().stops, 1);
    assert!(dir.path().join("reports/heal_report.json").exists());
}

#[test]
fn test_scenario_a_test_id_survives_tag_change() {
    let old = r#"<html><body><div data-testid="x">Login</div></body></html>"#;
    let new = r#"<html><body><button data-testid="x">Login</button></body></html>"#;

    let result = SelectorAgent::rule_based().map("[data-testid='x']", old, new, None);

    assert_eq!(result.new_selector, "[data-testid='x']");
    assert!((result.confidence - 0.9).abs() < 1e-9);
}

#[test]
fn test_scenario_b_no_similar_text_aborts_as_low_quality() {
    let dir = workspace();
    let mut heal = orchestrator(
        dir.path(),
        FakeServers::default(),
        vec![passed(), failed("")],
        StaticPages::new(DOM_V1, Some("<html><body><p>zzzz</p></body></html>")),
    );

    let report = heal.run();

    assert_eq!(report.status, HealStatus::Failure);
    assert_eq!(report.stage, HealStage::DomsCaptured);
    assert!(report.reason.unwrap().contains("Mapping quality too low"));
    assert_eq!(report.updates_applied, 0);
    assert!(!dir.path().join("page_selectors/page_v2.py").exists());
}

#[test]
fn test_scenario_c_failure_log_names_selector() {
    let selectors = LocatorTable::parse(PAGE_V1).unwrap().selectors();
    let log = r##"Unable to locate element: {"method": "css selector", "selector": "#old-button"}"##;

    let failure = parse_failure_log(log, &[&selectors]);

    assert_eq!(
        failure,
        Some(FailureContext {
            selector_name: "SUBMIT_BUTTON".to_string(),
            error_message: "Test failed with NoSuchElementException for selector: #old-button".to_string(),
        })
    );
}

#[test]
fn test_scenario_d_threshold_above_every_match() {
    let dir = workspace();
    let source = dir.path().join("page_selectors/page_v1.py");
    let old = r#"<html><body><button id="sort-name">Sort by Name</button></body></html>"#;
    let new = r#"<html><body><button id="sort-by-name">Sort by Name</button></body></html>"#;

    let selectors = IndexMap::from([("SORT_NAME".to_string(), "#sort-name".to_string())]);
    let results = SelectorAgent::rule_based().map_all(&selectors, old, new, None);
    assert!((results["SORT_NAME"].confidence - 0.8).abs() < 1e-9);

    let outcome = SelectorPatcher::new().apply(&source, &results, 0.9, true).unwrap();

    assert_eq!(outcome.applied_count, 0);
    assert!(outcome.output_path.is_none());
    assert_eq!(fs::read_to_string(&source).unwrap(), PAGE_V1);
    assert!(!dir.path().join("page_selectors/page_v2.py").exists());
}

#[test]
#[ignore] // Requires Chrome to be installed
fn test_capture_and_map_live_pages() {
    use selector_heal::{CaptureOptions, DomCapture};

    let capture = DomCapture::new(CaptureOptions::default());
    let old = capture
        .fetch("data:text/html,<html><body><button id='sort-name'>Sort by Name</button></body></html>")
        .expect("Failed to launch browser");
    let new = capture
        .fetch("data:text/html,<html><body><button id='sort-by-name'>Sort by Name</button></body></html>")
        .expect("Failed to launch browser");

    assert!(old.success && new.success);
    let result = SelectorAgent::rule_based().map("#sort-name", &old.html, &new.html, None);
    assert_eq!(result.new_selector, "#sort-by-name");
}
