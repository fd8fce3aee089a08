use crate::{browser::CaptureOptions,
            heal::{harness::SUITE_TIMEOUT, servers::ServerSpec},
            mapping::openai::DEFAULT_MODEL};
use std::{path::{Component, Path, PathBuf},
          time::Duration};

/// Default minimum confidence for a mapping to be written
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Everything one healing run needs. Relative paths resolve against `workdir`.
#[derive(Debug, Clone)]
pub struct HealConfig {
    /// Directory the servers, test suite and page objects live in
    pub workdir: PathBuf,

    /// URL of the known-good version
    pub v1_url: String,

    /// URL of the changed version
    pub v2_url: String,

    /// Dev servers to bring up before testing
    pub servers: Vec<ServerSpec>,

    /// Page object of the known-good version
    pub selectors_path: PathBuf,

    /// Python interpreter for the suite
    pub python: String,

    /// Module run with `python -m`
    pub test_module: String,

    /// Upper bound on one suite run
    pub suite_timeout: Duration,

    /// Where DOM snapshots are written
    pub dom_dir: PathBuf,

    /// Where mapping and heal reports are written
    pub reports_dir: PathBuf,

    /// Inclusive confidence cut-off for patching
    pub confidence_threshold: f64,

    /// LLM credential; `None` selects the rule-based strategy
    pub api_key: Option<String>,

    /// Chat model name
    pub model: String,

    /// Page capture settings
    pub capture: CaptureOptions,
}

impl Default for HealConfig {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("."),
            v1_url: "http://localhost:3000".to_string(),
            v2_url: "http://localhost:3001".to_string(),
            servers: vec![ServerSpec::npm("react_v1", "react_v1", 3000), ServerSpec::npm("react_v2", "react_v2", 3001)],
            selectors_path: PathBuf::from("page_selectors/page_v1.py"),
            python: "python".to_string(),
            test_module: "test.movie_app_tests".to_string(),
            suite_timeout: SUITE_TIMEOUT,
            dom_dir: PathBuf::from("dom_snapshots"),
            reports_dir: PathBuf::from("reports"),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            capture: CaptureOptions::default(),
        }
    }
}

impl HealConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set working directory
    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = dir.into();
        self
    }

    /// Builder method: set both application URLs
    pub fn urls(mut self, v1: impl Into<String>, v2: impl Into<String>) -> Self {
        self.v1_url = v1.into();
        self.v2_url = v2.into();
        self
    }

    /// Builder method: replace the dev servers
    pub fn servers(mut self, servers: Vec<ServerSpec>) -> Self {
        self.servers = servers;
        self
    }

    /// Builder method: set the known-good page object
    pub fn selectors_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.selectors_path = path.into();
        self
    }

    /// Builder method: set the test module
    pub fn test_module(mut self, module: impl Into<String>) -> Self {
        self.test_module = module.into();
        self
    }

    /// Builder method: set the Python interpreter
    pub fn python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    /// Builder method: set confidence threshold
    pub fn confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Builder method: set LLM credential and model
    pub fn llm(mut self, api_key: Option<String>, model: impl Into<String>) -> Self {
        self.api_key = api_key;
        self.model = model.into();
        self
    }

    /// Builder method: set capture settings
    pub fn capture(mut self, capture: CaptureOptions) -> Self {
        self.capture = capture;
        self
    }

    /// Resolve `path` against `workdir`
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() { path.to_path_buf() } else { self.workdir.join(path) }
    }

    /// Importable module name of a page object inside `workdir`
    pub fn selector_module(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.workdir).unwrap_or(path);
        module_name(relative)
    }
}

/// `page_selectors/page_v1.py` -> `page_selectors.page_v1`
pub fn module_name(path: &Path) -> String {
    path.with_extension("")
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(".")
}
