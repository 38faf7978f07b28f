use std::fmt;

/// Outcome of a connection health check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    valid: bool,
    failure_reason: Option<String>,
}

impl ValidationResult {
    pub fn success() -> Self {
        Self {
            valid: true,
            failure_reason: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            failure_reason: Some(reason.into()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure_reason {
            None => f.write_str("valid"),
            Some(reason) => write!(f, "invalid: {reason}"),
        }
    }
}
