use std::path::PathBuf;
use thiserror::Error;

/// File location attached to parse and resolve failures
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub file_path: Option<PathBuf>,
    pub specifier: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    pub fn with_specifier(mut self, specifier: impl Into<String>) -> Self {
        self.specifier = Some(specifier.into());
        self
    }
}

#[derive(Error, Debug)]
pub enum EmberError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {message}")]
    Parse {
        message: String,
        context: Option<ErrorContext>,
    },

    #[error("Resolve error: {message}")]
    Resolve {
        message: String,
        context: Option<ErrorContext>,
    },

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("HMR channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to import {url}: {message}")]
    Import { url: String, message: String },
}

impl EmberError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            context: None,
        }
    }

    pub fn parse_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Parse {
            message: message.into(),
            context: Some(context),
        }
    }

    pub fn resolve_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Resolve {
            message: message.into(),
            context: Some(context),
        }
    }

    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn import(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Import {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Format error with its file context, for terminal and overlay display
    pub fn format_detailed(&self) -> String {
        match self {
            EmberError::Parse { message, context } => {
                Self::format_with_context("Parse Error", message, context)
            }
            EmberError::Resolve { message, context } => {
                Self::format_with_context("Resolve Error", message, context)
            }
            _ => self.to_string(),
        }
    }

    fn format_with_context(
        error_type: &str,
        message: &str,
        context: &Option<ErrorContext>,
    ) -> String {
        let mut output = format!("❌ {}: {}", error_type, message);

        if let Some(ctx) = context {
            if let Some(ref file_path) = ctx.file_path {
                output.push_str(&format!("\n📁 File: {}", file_path.display()));
            }
            if let Some(ref specifier) = ctx.specifier {
                output.push_str(&format!("\n🔗 Import: {}", specifier));
            }
        }

        output
    }
}

pub type Result<T> = std::result::Result<T, EmberError>;

impl From<notify::Error> for EmberError {
    fn from(err: notify::Error) -> Self {
        EmberError::Watch(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for EmberError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        EmberError::Channel(err.to_string())
    }
}
