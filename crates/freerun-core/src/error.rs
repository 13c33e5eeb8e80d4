use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The requested estimator id is not registered.
    UnknownAlgorithm {
        id: String,
        valid: Vec<&'static str>,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::UnknownAlgorithm { id, valid } => {
                write!(f, "unknown algorithm '{id}' (valid: {})", valid.join(", "))
            }
        }
    }
}

impl std::error::Error for EngineError {}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_algorithm_lists_valid_ids() {
        let err = EngineError::UnknownAlgorithm {
            id: "nope".to_string(),
            valid: vec!["regression-v1", "kalman-v1"],
        };
        let msg = err.to_string();
        assert!(msg.contains("'nope'"));
        assert!(msg.contains("regression-v1"));
        assert!(msg.contains("kalman-v1"));
    }
}
