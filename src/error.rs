use thiserror::Error;

/// Errors surfaced at the public boundary of the codec
#[derive(Error, Debug)]
pub enum CodecError {
    /// Text that looks like JSON but does not parse
    #[error("invalid JSON at line {line}, column {column}: {message}")]
    Json {
        message: String,
        line: usize,
        column: usize,
    },

    /// No importer recognised the input
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The protocol has no share-link form
    #[error("{0} outbounds have no share-link form")]
    UnsupportedLink(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Options file could not be parsed or failed validation
    #[error("options error: {0}")]
    Options(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::Json {
            message: e.to_string(),
            line: e.line(),
            column: e.column(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_error_carries_position() {
        let err: CodecError = serde_json::from_str::<serde_json::Value>("{\n  \"a\": }")
            .unwrap_err()
            .into();
        if let CodecError::Json { line, column, .. } = err {
            assert_eq!(line, 2);
            assert!(column > 0);
        } else {
            panic!("Expected Json error");
        }
    }

    #[test]
    fn test_unsupported_link_display() {
        let err = CodecError::UnsupportedLink("freedom".into());
        assert_eq!(err.to_string(), "freedom outbounds have no share-link form");
    }
}
