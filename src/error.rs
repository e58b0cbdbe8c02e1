use thiserror::Error;

#[derive(Error, Debug)]
pub enum TypewrightError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Data corruption: {message}")]
    DataCorruption { message: String },
    #[error("Parse error at {position}: {message}")]
    Parse { message: String, position: usize },
    #[error("{0}")]
    Invalid(String),
    #[error("Cannot delete type '{type_name}':\n{}", .usages.join("\n"))]
    UsageConflict { type_name: String, usages: Vec<String> },
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, TypewrightError>;

impl TypewrightError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::DataCorruption { message: message.into() }
    }
    /// True for failures a user can fix by changing their input.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Invalid(_) | Self::UsageConflict { .. } | Self::Parse { .. })
    }
}

// Helper conversions
impl From<std::io::Error> for TypewrightError {
    fn from(e: std::io::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<serde_json::Error> for TypewrightError {
    fn from(e: serde_json::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<config::ConfigError> for TypewrightError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
