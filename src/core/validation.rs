use crate::core::error::ConfigError;

/// Represents an issue found while assembling a chain.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    /// A hard error: the chain cannot be built.
    Error(ConfigError),
    /// A warning: the chain works but is probably not what was meant.
    Warning(String),
}

/// The result of validating an operation's interceptor bindings.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: ConfigError) {
        self.issues.push(ValidationIssue::Error(error));
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.issues.push(ValidationIssue::Warning(msg.into()));
    }

    pub fn is_safe(&self) -> bool {
        !self.issues.iter().any(|i| matches!(i, ValidationIssue::Error(_)))
    }

    pub fn has_warnings(&self) -> bool {
        self.issues.iter().any(|i| matches!(i, ValidationIssue::Warning(_)))
    }

    pub fn errors(&self) -> impl Iterator<Item = &ConfigError> {
        self.issues.iter().filter_map(|i| match i {
            ValidationIssue::Error(e) => Some(e),
            ValidationIssue::Warning(_) => None,
        })
    }

    /// Writes every issue to the log, prefixed with the operation name.
    pub fn log_summary(&self, operation: &str) {
        for issue in &self.issues {
            match issue {
                ValidationIssue::Error(e) => log::error!("{}: {}", operation, e),
                ValidationIssue::Warning(msg) => log::warn!("{}: {}", operation, msg),
            }
        }
    }

    /// Fails with the first error, if any.
    pub fn into_result(self) -> Result<(), ConfigError> {
        match self.issues.into_iter().find_map(|i| match i {
            ValidationIssue::Error(e) => Some(e),
            ValidationIssue::Warning(_) => None,
        }) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
