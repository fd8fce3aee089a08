use crate::mapping::FailureContext;
use indexmap::IndexMap;
use regex::Regex;
use std::sync::LazyLock;

static LOCATE_FAILURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Unable to locate element: .*"selector":\s*"([^"]*)""#).expect("valid failure pattern")
});

/// Literal selector of the first "unable to locate element" failure in `log`
pub fn failed_selector(log: &str) -> Option<&str> {
    LOCATE_FAILURE.captures(log).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Trace a test log back to the declared name of the selector that failed.
///
/// `tables` are searched in order; the first table declaring the failing
/// literal wins. Only the first failure in the log is considered.
pub fn parse_failure_log(log: &str, tables: &[&IndexMap<String, String>]) -> Option<FailureContext> {
    let selector = failed_selector(log)?;

    let name = tables
        .iter()
        .find_map(|table| table.iter().find(|(_, value)| value.as_str() == selector).map(|(name, _)| name))?;

    log::info!("Failure analysis determined selector '{}' is the likely cause.", name);
    Some(FailureContext {
        selector_name: name.clone(),
        error_message: format!("Test failed with NoSuchElementException for selector: {}", selector),
    })
}
