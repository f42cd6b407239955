use thiserror::Error;

/// Top-level error type for the querydesk workspace.
///
/// Subsystem crates define their own error types; this one covers
/// configuration, schema loading and process setup in the binary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuerydeskError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Logging error: {0}")]
    Logging(String),
}

impl From<toml::de::Error> for QuerydeskError {
    fn from(err: toml::de::Error) -> Self {
        QuerydeskError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for QuerydeskError {
    fn from(err: toml::ser::Error) -> Self {
        QuerydeskError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for QuerydeskError {
    fn from(err: serde_json::Error) -> Self {
        QuerydeskError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for querydesk operations.
pub type Result<T> = std::result::Result<T, QuerydeskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(QuerydeskError, &str)> = vec![
            (
                QuerydeskError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                QuerydeskError::Schema("no measures".to_string()),
                "Schema error: no measures",
            ),
            (
                QuerydeskError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
            (
                QuerydeskError::Logging("already set".to_string()),
                "Logging error: already set",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let err: QuerydeskError = io_err.into();
        match &err {
            QuerydeskError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            _ => panic!("Expected Io variant"),
        }
        assert!(err.to_string().starts_with("I/O error:"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let err: QuerydeskError = err.unwrap_err().into();
        assert!(matches!(err, QuerydeskError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let err: QuerydeskError = err.unwrap_err().into();
        assert!(matches!(err, QuerydeskError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let parsed: serde_json::Value = serde_json::from_str("{\"a\": 1}")?;
            Ok(parsed["a"].to_string())
        }

        assert_eq!(inner().unwrap(), "1");
    }
}
