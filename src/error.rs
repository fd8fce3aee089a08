use thiserror::Error;

/// Errors raised while healing selectors
#[derive(Debug, Error)]
pub enum HealError {
    /// Chrome could not be launched
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    /// Navigating a tab failed
    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    /// Reading page content out of a tab failed
    #[error("Failed to read page content: {0}")]
    ContentFailed(String),

    /// A dev server did not come up in time
    #[error("Server '{name}' failed to start: {reason}")]
    ServerStartFailed { name: String, reason: String },

    /// The test harness child process could not be spawned or awaited
    #[error("Test harness error: {0}")]
    Harness(String),

    /// The page-object source has syntax errors or could not be parsed
    #[error("Failed to parse {path}: {reason}")]
    SourceParse { path: String, reason: String },

    /// A CSS selector could not be parsed
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// The language model call failed or returned something unusable
    #[error("LLM request failed: {0}")]
    Llm(String),

    /// A pipeline stage guard was not met
    #[error("{0}")]
    Stage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type alias for healing operations
pub type Result<T> = std::result::Result<T, HealError>;
