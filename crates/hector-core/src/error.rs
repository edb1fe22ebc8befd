/// Fatal startup errors. Any of these stops the mission before the first tick.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid goals {input:?}: {reason}")]
    InvalidGoals { input: String, reason: String },

    #[error("Parameter {name} must be positive and finite, got {value}")]
    NotPositive { name: &'static str, value: f64 },

    #[error("Parameter {name} must be finite, got {value}")]
    NotFinite { name: &'static str, value: f64 },

    #[error("Parameter {name} must be non-negative and finite, got {value}")]
    Negative { name: &'static str, value: f64 },
}

impl ConfigError {
    pub(crate) fn invalid_goals(input: &str, reason: impl Into<String>) -> Self {
        Self::InvalidGoals {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}
