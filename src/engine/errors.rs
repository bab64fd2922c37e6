// Error types for the extraction engine

use std::fmt;

#[derive(Debug, Clone)]
pub enum EngineError {
    /// Network timeout while the provider was not responding
    NetworkTimeout,

    /// Provider throttled the request (429, too many requests)
    RateLimited,

    /// yt-dlp binary not found on this host
    ToolNotFound(String),

    /// Reference the provider refuses to handle
    InvalidUrl(String),

    /// Failed to parse yt-dlp JSON output
    ParseError(String),

    /// Subprocess could not be spawned or waited on
    ExecutionError(String),

    /// Provider-side failure, raw stderr preserved for classification
    Provider(String),
}

impl EngineError {
    /// Raw message suitable for skip-reason classification.
    pub fn message(&self) -> String {
        match self {
            Self::Provider(s) | Self::ParseError(s) | Self::ExecutionError(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkTimeout => write!(f, "Network timeout: provider is not responding"),
            Self::RateLimited => write!(f, "Rate limited by the provider, please wait"),
            Self::ToolNotFound(tool) => write!(f, "Tool not found: {}", tool),
            Self::InvalidUrl(url) => write!(f, "Invalid URL: {}", url),
            Self::ParseError(msg) => write!(f, "Parse error: {}", msg),
            Self::ExecutionError(msg) => write!(f, "Execution error: {}", msg),
            Self::Provider(msg) => write!(f, "Provider error: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

// Smart detection of error types from raw yt-dlp stderr
impl From<String> for EngineError {
    fn from(s: String) -> Self {
        let lower = s.to_lowercase();

        if lower.contains("429")
            || lower.contains("rate limit")
            || lower.contains("too many requests")
        {
            return Self::RateLimited;
        }

        if lower.contains("timeout") || lower.contains("timed out") {
            return Self::NetworkTimeout;
        }

        if lower.contains("no such file")
            || lower.contains("command not found")
            || lower.contains("not found in path")
        {
            return Self::ToolNotFound(s);
        }

        if lower.contains("unsupported url") || lower.contains("is not a valid url") {
            return Self::InvalidUrl(s);
        }

        Self::Provider(s)
    }
}
