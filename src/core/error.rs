use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PointError {
    #[error("empty input: nothing to decode")]
    EmptyInput,

    #[error("invalid protobuf data: {0}")]
    Protobuf(String),

    #[error("invalid line protocol at line {line}: {reason}")]
    LineProtocol { line: usize, reason: String },

    #[error("invalid JSON point: {0}")]
    Json(#[from] serde_json::Error),

    #[error("point has no fields")]
    EmptyFields,

    #[error("point too large: encoded size {size} bytes exceeds buffer of {max} bytes")]
    PointTooLarge { size: usize, max: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("callback failed: {0}")]
    Callback(String),
}

/// Result type alias for point operations
pub type Result<T> = std::result::Result<T, PointError>;

impl PointError {
    /// Creates a new protobuf decode error
    pub fn protobuf<S: Into<String>>(msg: S) -> Self {
        Self::Protobuf(msg.into())
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new callback error
    pub fn callback<S: Into<String>>(msg: S) -> Self {
        Self::Callback(msg.into())
    }

    /// Creates the simplified line-protocol error returned to callers
    pub fn line_protocol<S: Into<String>>(line: usize, reason: S) -> Self {
        Self::LineProtocol {
            line,
            reason: reason.into(),
        }
    }

    /// Returns true if this error only concerns a single point and the
    /// rest of a batch can still be processed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::PointTooLarge { .. } | Self::EmptyFields)
    }

    /// Returns the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::EmptyInput | Self::Protobuf(_) | Self::LineProtocol { .. } | Self::Json(_) => {
                "decode"
            },
            Self::EmptyFields => "validation",
            Self::PointTooLarge { .. } => "encode",
            Self::Config(_) => "config",
            Self::Callback(_) => "callback",
        }
    }
}

/// Full diagnostic for a line-protocol parse failure.
///
/// The decoder keeps the last one of these around; callers that only
/// need to reject the payload never see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineProtoError {
    /// 1-based line number in the payload
    pub line: usize,
    /// 1-based byte column within the line
    pub column: usize,
    /// The offending line, truncated to a readable length
    pub snippet: String,
    /// What the parser expected
    pub reason: String,
}

impl LineProtoError {
    const MAX_SNIPPET: usize = 64;

    pub(crate) fn new(line: usize, column: usize, text: &str, reason: impl Into<String>) -> Self {
        let mut end = text.len().min(Self::MAX_SNIPPET);
        while !text.is_char_boundary(end) {
            end -= 1;
        }

        Self {
            line,
            column,
            snippet: text[..end].to_string(),
            reason: reason.into(),
        }
    }

    /// The short error handed back through `Result`
    pub fn simplified(&self) -> PointError {
        PointError::line_protocol(self.line, self.reason.clone())
    }
}

impl fmt::Display for LineProtoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {} column {}: {} (near {:?})",
            self.line, self.column, self.reason, self.snippet
        )
    }
}

impl std::error::Error for LineProtoError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = PointError::protobuf("truncated varint");
        assert_eq!(err.to_string(), "invalid protobuf data: truncated varint");
        assert_eq!(err.category(), "decode");
    }

    #[test]
    fn test_error_recoverability() {
        assert!(PointError::PointTooLarge { size: 10, max: 5 }.is_recoverable());
        assert!(!PointError::EmptyInput.is_recoverable());
        assert!(!PointError::config("bad").is_recoverable());
    }

    #[test]
    fn test_line_proto_error_simplified() {
        let detail = LineProtoError::new(3, 7, "abc,t1=x f1=", "missing field value");
        let err = detail.simplified();
        assert_eq!(err.to_string(), "invalid line protocol at line 3: missing field value");
        assert!(detail.to_string().contains("column 7"));
    }

    #[test]
    fn test_snippet_respects_char_boundary() {
        let text = "é".repeat(40);
        let detail = LineProtoError::new(1, 1, &text, "x");
        assert!(detail.snippet.len() <= 64);
        assert!(detail.snippet.chars().all(|c| c == 'é'));
    }
}
