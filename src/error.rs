/*!
 * Error handling for HCPCS rate analysis
 *
 * Provides detailed error types with context and suggestions. Missing inputs
 * are mostly handled as empty data by the pipeline itself; the variants here
 * cover the failures that do reach a caller.
 */

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use serde::{Serialize, Deserialize};

/// Library result type
pub type Result<T> = std::result::Result<T, RatesError>;

/// Error types with context and suggestions
#[derive(Error, Debug)]
pub enum RatesError {
    /// File I/O errors with context
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
        context: ErrorContext,
    },

    /// CSV parsing errors with location information
    #[error("CSV parsing error at line {line:?}: {message}")]
    CsvParse {
        message: String,
        line: Option<usize>,
        context: ErrorContext,
    },

    /// File not found with suggestions
    #[error("File not found: {path}")]
    FileNotFound {
        path: PathBuf,
        suggestion: String,
    },

    /// A directory exists but could not be listed
    #[error("Cannot read directory {path}: {message}")]
    DirectoryRead {
        path: PathBuf,
        message: String,
    },

    /// Requested code or group is not present in the computed results
    #[error("{kind} '{key}' not found")]
    NotFound {
        kind: LookupKind,
        key: String,
    },

    /// Invalid user supplied input (calculator parameters, CLI arguments)
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        field: Option<String>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        suggestion: Option<String>,
    },

    /// Export errors
    #[error("Export error: {message}")]
    Export {
        message: String,
        format: ExportFormat,
    },
}

/// Error context providing additional information
#[derive(Debug, Default, Clone)]
pub struct ErrorContext {
    pub file_path: Option<PathBuf>,
    pub line_number: Option<usize>,
}

/// What kind of key a failed lookup was for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookupKind {
    Code,
    Group,
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupKind::Code => write!(f, "Code"),
            LookupKind::Group => write!(f, "Group"),
        }
    }
}

/// Output format for reports and exports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Html,
    Text,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => write!(f, "JSON"),
            ExportFormat::Html => write!(f, "HTML"),
            ExportFormat::Text => write!(f, "Text"),
        }
    }
}

impl RatesError {
    /// Create a file not found error with helpful suggestion
    pub fn file_not_found_with_suggestion(path: PathBuf) -> Self {
        let name = path.to_string_lossy();
        let suggestion = if name.contains("national_payment_amount") {
            format!(
                "Check if the fee schedule exists at '{}'. Fee schedule files follow the pattern \
                '<year>-all-<codes>-national_payment_amount.csv' inside the code group directory.",
                path.display()
            )
        } else {
            format!(
                "Check if the file exists at '{}'. Make sure the path is correct and you have read permissions.",
                path.display()
            )
        };

        Self::FileNotFound { path, suggestion }
    }

    /// Create a lookup failure for a procedure code
    pub fn code_not_found(code: &str) -> Self {
        Self::NotFound {
            kind: LookupKind::Code,
            key: code.to_string(),
        }
    }

    /// Create a lookup failure for a code group
    pub fn group_not_found(group: &str) -> Self {
        Self::NotFound {
            kind: LookupKind::Group,
            key: group.to_string(),
        }
    }

    /// Create an invalid input error for a named field
    pub fn invalid_input(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }

    /// Whether this error is a "not found" signal rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            Self::FileNotFound { suggestion, .. } => {
                format!("{}\n\nSuggestion: {}", self, suggestion)
            }
            Self::Configuration { suggestion: Some(sug), .. } => {
                format!("{}\n\nSuggestion: {}", self, sug)
            }
            Self::InvalidInput { field: Some(field), .. } => {
                format!("{}\n\nCheck the value supplied for '{}'", self, field)
            }
            _ => self.to_string(),
        }
    }
}

// Convenience conversions
impl From<std::io::Error> for RatesError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
            context: ErrorContext::default(),
        }
    }
}

impl From<csv::Error> for RatesError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|pos| pos.line() as usize);

        Self::CsvParse {
            message: err.to_string(),
            line,
            context: ErrorContext::default(),
        }
    }
}

impl From<serde_json::Error> for RatesError {
    fn from(err: serde_json::Error) -> Self {
        RatesError::Export {
            message: err.to_string(),
            format: ExportFormat::Json,
        }
    }
}
