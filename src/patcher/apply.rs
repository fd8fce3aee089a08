use crate::{error::{HealError, Result},
            mapping::SelectorMatch,
            patcher::{literal::python_string_literal, locators::LocatorTable}};
use indexmap::IndexMap;
use std::{fs,
          ops::Range,
          path::{Path, PathBuf}};

/// Result of one patch attempt
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchOutcome {
    /// File written, `None` when nothing was written
    pub output_path: Option<PathBuf>,

    /// Number of literals replaced
    pub applied_count: usize,

    /// Backup taken before any mutation
    pub backup_path: Option<PathBuf>,
}

/// Rewrites selector literals in a page-object file
#[derive(Debug, Clone)]
pub struct SelectorPatcher {
    class_name: String,
    backups: bool,
}

impl Default for SelectorPatcher {
    fn default() -> Self {
        Self { class_name: super::LOCATOR_CLASS.to_string(), backups: true }
    }
}

impl SelectorPatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Class holding the locators (default `Locators`)
    pub fn class_name(mut self, name: impl Into<String>) -> Self {
        self.class_name = name.into();
        self
    }

    /// Enable or disable the timestamped backup copy
    pub fn backups(mut self, enabled: bool) -> Self {
        self.backups = enabled;
        self
    }

    /// Replace the selector literal of every applicable match.
    ///
    /// Only matches with `confidence >= threshold` and a non-empty selector are
    /// considered. With none, nothing is written, not even a backup. The result
    /// goes to `source_path` itself or, with `emit_new_artifact`, to
    /// [`versioned_path`]. A source that fails to parse is left untouched and
    /// reported as zero applied.
    pub fn apply(
        &self,
        source_path: &Path,
        matches: &IndexMap<String, SelectorMatch>,
        threshold: f64,
        emit_new_artifact: bool,
    ) -> Result<PatchOutcome> {
        let updates: Vec<(&str, &str)> = matches
            .iter()
            .filter(|(_, m)| m.is_applicable(threshold))
            .map(|(name, m)| (name.as_str(), m.new_selector.as_str()))
            .collect();

        if updates.is_empty() {
            log::info!("No selectors met the confidence threshold ({:.2}). Nothing to update.", threshold);
            return Ok(PatchOutcome::default());
        }

        let backup_path = if self.backups { Some(create_backup(source_path)?) } else { None };

        let mut content = fs::read_to_string(source_path)?;
        let table = match LocatorTable::parse_named(&content, &self.class_name, &source_path.display().to_string()) {
            Ok(table) => table,
            Err(e @ HealError::SourceParse { .. }) => {
                log::error!("{}. No selectors were updated.", e);
                return Ok(PatchOutcome { output_path: None, applied_count: 0, backup_path });
            }
            Err(e) => return Err(e),
        };

        let mut edits: Vec<(Range<usize>, String)> = Vec::with_capacity(updates.len());
        for (name, new_selector) in updates {
            match table.find(name) {
                Some(assignment) => {
                    log::info!(
                        "  Updating {} (line {}): '{}' -> '{}'",
                        name,
                        assignment.line,
                        assignment.selector,
                        new_selector
                    );
                    edits.push((assignment.value_range.clone(), python_string_literal(new_selector)));
                }
                None => log::debug!("  No unique assignment for '{}', skipping", name),
            }
        }

        edits.sort_by(|a, b| b.0.start.cmp(&a.0.start));
        for (range, literal) in &edits {
            content.replace_range(range.clone(), literal);
        }

        let output_path = if emit_new_artifact { versioned_path(source_path) } else { source_path.to_path_buf() };
        fs::write(&output_path, content)?;
        log::info!("Applied {} update(s) to {}", edits.len(), output_path.display());

        Ok(PatchOutcome { output_path: Some(output_path), applied_count: edits.len(), backup_path })
    }
}

/// `<dir>/backups/<file>.<YYYYmmdd_HHMMSS>.bak`
fn create_backup(source_path: &Path) -> Result<PathBuf> {
    let dir = source_path.parent().unwrap_or_else(|| Path::new(".")).join("backups");
    fs::create_dir_all(&dir)?;

    let file_name = source_path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let backup = dir.join(format!("{}.{}.bak", file_name, stamp));

    fs::copy(source_path, &backup)?;
    log::info!("Backup created at {}", backup.display());
    Ok(backup)
}

/// Path of the next version of a page object: `page_v1.py` -> `page_v2.py`,
/// `page.py` -> `page_v2.py`
pub fn versioned_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().replace("_v1", "")).unwrap_or_default();
    let file_name = match path.extension() {
        Some(ext) => format!("{}_v2.{}", stem, ext.to_string_lossy()),
        None => format!("{}_v2", stem),
    };
    path.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"from selenium.webdriver.common.by import By


class Locators:
    MOVIE_CARD = (By.CSS_SELECTOR, "[data-testid='movie-card']")
    SORT_NAME = (By.ID, "sort-name")
    SORT_YEAR = (By.ID, "sort-year")


def helper():
    return "sort-name"
"#;

    fn write_page(dir: &Path) -> PathBuf {
        let path = dir.join("page_v1.py");
        fs::write(&path, PAGE).unwrap();
        path
    }

    fn matches(entries: &[(&str, &str, f64)]) -> IndexMap<String, SelectorMatch> {
        entries
            .iter()
            .map(|(name, selector, confidence)| {
                (name.to_string(), SelectorMatch::new("", *selector, *confidence, "test"))
            })
            .collect()
    }

    #[test]
    fn test_versioned_path() {
        assert_eq!(versioned_path(Path::new("sel/page_v1.py")), PathBuf::from("sel/page_v2.py"));
        assert_eq!(versioned_path(Path::new("sel/page.py")), PathBuf::from("sel/page_v2.py"));
        assert_eq!(versioned_path(Path::new("v1_dir/page_v1.py")), PathBuf::from("v1_dir/page_v2.py"));
    }

    #[test]
    fn test_apply_to_new_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_page(dir.path());

        let outcome = SelectorPatcher::new()
            .apply(&source, &matches(&[("SORT_NAME", "#sort-by-name", 0.8)]), 0.5, true)
            .unwrap();

        assert_eq!(outcome.applied_count, 1);
        let output = outcome.output_path.unwrap();
        assert_eq!(output, dir.path().join("page_v2.py"));
        assert!(outcome.backup_path.unwrap().starts_with(dir.path().join("backups")));

        // source untouched, artifact differs only in the one literal
        assert_eq!(fs::read_to_string(&source).unwrap(), PAGE);
        let patched = fs::read_to_string(&output).unwrap();
        assert_eq!(patched, PAGE.replace(r#"(By.ID, "sort-name")"#, "(By.ID, '''#sort-by-name''')"));
        assert!(patched.contains("return \"sort-name\""));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_page(dir.path());

        let outcome = SelectorPatcher::new()
            .apply(
                &source,
                &matches(&[("SORT_NAME", "#at-threshold", 0.5), ("SORT_YEAR", "#below", 0.49)]),
                0.5,
                false,
            )
            .unwrap();

        assert_eq!(outcome.applied_count, 1);
        let table = LocatorTable::from_file(&source).unwrap();
        assert_eq!(table.find("SORT_NAME").unwrap().selector, "#at-threshold");
        assert_eq!(table.find("SORT_YEAR").unwrap().selector, "sort-year");
    }

    #[test]
    fn test_nothing_applicable_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_page(dir.path());

        let outcome = SelectorPatcher::new()
            .apply(&source, &matches(&[("SORT_NAME", "#x", 0.8), ("SORT_YEAR", "", 1.0)]), 0.9, true)
            .unwrap();

        assert_eq!(outcome, PatchOutcome::default());
        assert_eq!(fs::read_to_string(&source).unwrap(), PAGE);
        assert!(!dir.path().join("page_v2.py").exists());
        assert!(!dir.path().join("backups").exists());
    }

    #[test]
    fn test_unknown_names_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_page(dir.path());

        let outcome = SelectorPatcher::new()
            .backups(false)
            .apply(&source, &matches(&[("NOT_DECLARED", "#x", 1.0)]), 0.5, false)
            .unwrap();

        assert_eq!(outcome.applied_count, 0);
        assert!(outcome.backup_path.is_none());
        assert_eq!(fs::read_to_string(&source).unwrap(), PAGE);
    }

    #[test]
    fn test_multiple_edits_and_idempotency() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_page(dir.path());
        let updates = matches(&[
            ("MOVIE_CARD", "[data-testid='film-entry']", 0.9),
            ("SORT_YEAR", "a[title=\"it's\"]'", 0.9),
        ]);
        let patcher = SelectorPatcher::new().backups(false);

        patcher.apply(&source, &updates, 0.5, false).unwrap();
        let once = fs::read_to_string(&source).unwrap();
        patcher.apply(&source, &updates, 0.5, false).unwrap();
        let twice = fs::read_to_string(&source).unwrap();

        assert_eq!(once, twice);
        let table = LocatorTable::parse(&twice).unwrap();
        assert_eq!(table.find("MOVIE_CARD").unwrap().selector, "[data-testid='film-entry']");
        assert_eq!(table.find("SORT_YEAR").unwrap().selector, "a[title=\"it's\"]'");
        assert_eq!(table.find("SORT_NAME").unwrap().selector, "sort-name");
    }

    #[test]
    fn test_parse_failure_leaves_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("broken.py");
        let broken = "class Locators:\n    A = (By.ID, 'x'\n";
        fs::write(&source, broken).unwrap();

        let outcome = SelectorPatcher::new().apply(&source, &matches(&[("A", "#y", 1.0)]), 0.5, false).unwrap();

        assert_eq!(outcome.applied_count, 0);
        assert!(outcome.output_path.is_none());
        assert!(outcome.backup_path.is_some());
        assert_eq!(fs::read_to_string(&source).unwrap(), broken);
    }
}
