//! selector-heal CLI
//!
//! `run` drives the full healing pipeline against two running (or startable)
//! versions of an application. `map` works offline on two saved DOM snapshots.

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use selector_heal::{CaptureOptions, DomSnapshot, HealConfig, HealingOrchestrator, LaunchOptions, LocatorTable,
                    MappingReport, SelectorAgent, SelectorPatcher,
                    heal::DEFAULT_CONFIDENCE_THRESHOLD,
                    mapping::openai::DEFAULT_MODEL};
use std::{path::PathBuf, process::ExitCode};

#[derive(Parser)]
#[command(name = "selector-heal")]
#[command(version)]
#[command(about = "Heal broken UI test selectors between two versions of a web app", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline: servers, baseline, capture, heal, validate
    Run(RunArgs),

    /// Map selectors between two saved DOM snapshots
    Map(MapArgs),
}

#[derive(Args)]
struct LlmArgs {
    /// OpenAI API key; without one the rule-based strategy is used
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Chat model
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,
}

#[derive(Args)]
struct RunArgs {
    /// Directory holding the apps, page objects and test suite
    #[arg(long, short = 'C', default_value = ".")]
    workdir: PathBuf,

    /// URL of the known-good version
    #[arg(long, default_value = "http://localhost:3000")]
    v1_url: String,

    /// URL of the changed version
    #[arg(long, default_value = "http://localhost:3001")]
    v2_url: String,

    /// Page object of the known-good version
    #[arg(long, default_value = "page_selectors/page_v1.py")]
    selectors: PathBuf,

    /// Test module run with `python -m`
    #[arg(long, default_value = "test.movie_app_tests")]
    test_module: String,

    /// Python interpreter
    #[arg(long, default_value = "python")]
    python: String,

    /// Minimum confidence for a selector to be written
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD)]
    threshold: f64,

    /// Do not start dev servers; both versions must already be running
    #[arg(long)]
    no_servers: bool,

    /// Launch browser in headed mode (default: headless)
    #[arg(long, short = 'H')]
    headed: bool,

    /// Path to custom browser executable
    #[arg(long, value_name = "PATH")]
    executable_path: Option<PathBuf>,

    #[command(flatten)]
    llm: LlmArgs,
}

#[derive(Args)]
struct MapArgs {
    /// Snapshot of the known-good version
    #[arg(long, value_name = "JSON")]
    old: PathBuf,

    /// Snapshot of the changed version
    #[arg(long, value_name = "JSON")]
    new: PathBuf,

    /// Page object declaring the selectors
    #[arg(long, value_name = "PY")]
    selectors: PathBuf,

    /// Where to write the mapping report
    #[arg(long, default_value = "reports/mapping_report.json")]
    report: PathBuf,

    /// Also write the healed page object next to the original
    #[arg(long)]
    patch: bool,

    /// Minimum confidence for a selector to be written
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD)]
    threshold: f64,

    #[command(flatten)]
    llm: LlmArgs,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run(args) => run(args),
        Command::Map(args) => map(args),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: RunArgs) -> anyhow::Result<bool> {
    let mut launch = LaunchOptions::new().headless(!args.headed);
    if let Some(path) = args.executable_path {
        launch = launch.chrome_path(path);
    }

    let mut config = HealConfig::new()
        .workdir(args.workdir)
        .urls(args.v1_url, args.v2_url)
        .selectors_path(args.selectors)
        .test_module(args.test_module)
        .python(args.python)
        .confidence_threshold(args.threshold)
        .llm(args.llm.api_key, args.llm.model)
        .capture(CaptureOptions { launch, ..CaptureOptions::default() });
    if args.no_servers {
        config = config.servers(Vec::new());
    }

    let report = HealingOrchestrator::from_config(config).context("Failed to set up healing run")?.run();

    if report.is_success() {
        log::info!("HEALING COMPLETE: SUCCESS");
    } else {
        log::error!("HEALING COMPLETE: FAILURE ({})", report.reason.as_deref().unwrap_or("unknown"));
    }
    Ok(report.is_success())
}

fn map(args: MapArgs) -> anyhow::Result<bool> {
    let old = DomSnapshot::load(&args.old).with_context(|| format!("Failed to load {}", args.old.display()))?;
    let new = DomSnapshot::load(&args.new).with_context(|| format!("Failed to load {}", args.new.display()))?;
    if !(old.success && new.success) {
        bail!("Both snapshots must be successful captures");
    }

    let selectors = LocatorTable::from_file(&args.selectors)
        .with_context(|| format!("Failed to read locators from {}", args.selectors.display()))?
        .selectors();
    if selectors.is_empty() {
        bail!("No locators found in {}", args.selectors.display());
    }

    let agent = SelectorAgent::from_api_key(args.llm.api_key.as_deref(), &args.llm.model);
    let results = agent.map_all(&selectors, &old.html, &new.html, None);

    let report = MappingReport::from_results(&results);
    report.save(&args.report)?;

    for (name, result) in &results {
        println!("{:<24} {:<48} {:.2}", name, result.new_selector, result.confidence);
    }
    println!(
        "{}/{} selectors mapped confidently ({:.0}%)",
        report.summary.successful_mappings,
        report.summary.total_selectors,
        report.summary.success_rate * 100.0
    );

    if args.patch {
        let outcome = SelectorPatcher::new().apply(&args.selectors, &results, args.threshold, true)?;
        match outcome.output_path {
            Some(path) => println!("{} update(s) written to {}", outcome.applied_count, path.display()),
            None => println!("No selector met the confidence threshold; nothing written"),
        }
    }

    Ok(true)
}
