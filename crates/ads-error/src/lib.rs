use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

/// Unified error type for the campaign RAG workspace
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum AdsError {
    // === data / request errors ===
    #[error("malformed campaign data from {source_name}: {reason}")]
    DataShape { source_name: String, reason: String },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    // === backend errors ===
    #[error("backend unavailable ({backend}): {reason}")]
    BackendUnavailable { backend: String, reason: String },

    #[error("query processing failed during {stage}: {message}")]
    QueryProcessing { stage: String, message: String },

    #[error("LLM service error ({provider}): {message}")]
    LlmService {
        provider: String,
        message: String,
        #[serde(skip)]
        retry_after: Option<std::time::Duration>,
    },

    #[error("embedding service error ({provider}): {message}")]
    EmbeddingService {
        provider: String,
        message: String,
        #[serde(skip)]
        retry_after: Option<std::time::Duration>,
    },

    #[error("vector store error: {operation} failed: {message}")]
    VectorStore { operation: String, message: String },

    // === system errors ===
    #[error("configuration error: {key} - {reason}")]
    Configuration { key: String, reason: String },

    #[error("serialization error ({format}): {message}")]
    Serialization { format: String, message: String },

    #[error("network error during {operation}: {message}")]
    Network { operation: String, message: String },

    #[error("timeout: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("io error during {operation}: {message}")]
    Io { operation: String, message: String },

    #[error("internal error: {message}")]
    Internal {
        message: String,
        details: Option<String>,
    },
}

/// Error severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Low,      // expected, caller-side problems
    Medium,   // degraded but recoverable
    High,     // a component stopped working
    Critical, // misconfiguration or broken invariants
}

/// Structured context attached to a logged error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetadata {
    pub error_id: String,
    pub severity: ErrorSeverity,
    pub component: String,
    pub operation: Option<String>,
    pub query_id: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub context: std::collections::HashMap<String, String>,
}

impl AdsError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AdsError::InvalidRequest { .. } => ErrorSeverity::Low,
            AdsError::DataShape { .. }
            | AdsError::BackendUnavailable { .. }
            | AdsError::QueryProcessing { .. } => ErrorSeverity::Medium,
            AdsError::LlmService { .. }
            | AdsError::EmbeddingService { .. }
            | AdsError::Network { .. }
            | AdsError::Timeout { .. } => ErrorSeverity::Medium,
            AdsError::VectorStore { .. }
            | AdsError::Serialization { .. }
            | AdsError::Io { .. } => ErrorSeverity::High,
            AdsError::Configuration { .. } | AdsError::Internal { .. } => ErrorSeverity::Critical,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            AdsError::Network { .. } | AdsError::Timeout { .. } => true,
            AdsError::LlmService { retry_after, .. }
            | AdsError::EmbeddingService { retry_after, .. } => retry_after.is_some(),
            _ => false,
        }
    }

    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            AdsError::LlmService { retry_after, .. }
            | AdsError::EmbeddingService { retry_after, .. } => *retry_after,
            AdsError::Network { .. } => Some(std::time::Duration::from_millis(500)),
            AdsError::Timeout { .. } => Some(std::time::Duration::from_millis(1000)),
            _ => None,
        }
    }

    /// Emit a tracing event whose level follows the severity
    pub fn log(&self, metadata: &ErrorMetadata) {
        match metadata.severity {
            ErrorSeverity::Low => {
                warn!(
                    error_id = %metadata.error_id,
                    component = %metadata.component,
                    operation = ?metadata.operation,
                    query_id = ?metadata.query_id,
                    error = %self,
                    "request error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_id = %metadata.error_id,
                    component = %metadata.component,
                    operation = ?metadata.operation,
                    query_id = ?metadata.query_id,
                    error = %self,
                    context = ?metadata.context,
                    retryable = self.is_retryable(),
                    retry_after_ms = ?self.retry_after().map(|d| d.as_millis()),
                    "recoverable error"
                );
            }
            ErrorSeverity::High | ErrorSeverity::Critical => {
                error!(
                    error_id = %metadata.error_id,
                    component = %metadata.component,
                    operation = ?metadata.operation,
                    query_id = ?metadata.query_id,
                    error = %self,
                    context = ?metadata.context,
                    severity = ?metadata.severity,
                    retryable = self.is_retryable(),
                    retry_after_ms = ?self.retry_after().map(|d| d.as_millis()),
                    "serious error"
                );
            }
        }
    }

    /// Short message suitable for end users
    pub fn user_message(&self) -> String {
        match self {
            AdsError::DataShape { .. } => {
                "Campaign data could not be read; continuing with an empty dataset".to_string()
            }
            AdsError::InvalidRequest { .. } => {
                "The request was invalid, please check it".to_string()
            }
            AdsError::BackendUnavailable { .. } => {
                "External AI services are unavailable; using offline analysis".to_string()
            }
            AdsError::Timeout { .. } => "The request timed out, please retry".to_string(),
            AdsError::Network { .. } => "Network problem, please retry".to_string(),
            AdsError::QueryProcessing { .. }
            | AdsError::LlmService { .. }
            | AdsError::EmbeddingService { .. } => {
                "The question could not be answered right now".to_string()
            }
            _ => "Internal error, please contact the maintainer".to_string(),
        }
    }

    pub fn data_shape(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        AdsError::DataShape {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub fn backend_unavailable(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        AdsError::BackendUnavailable {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    pub fn query_processing(stage: impl Into<String>, message: impl Into<String>) -> Self {
        AdsError::QueryProcessing {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Builder for `ErrorMetadata`
pub struct ErrorMetadataBuilder {
    metadata: ErrorMetadata,
}

impl ErrorMetadataBuilder {
    pub fn new(component: &str) -> Self {
        Self {
            metadata: ErrorMetadata {
                error_id: uuid::Uuid::new_v4().to_string(),
                severity: ErrorSeverity::Medium,
                component: component.to_string(),
                operation: None,
                query_id: None,
                timestamp: chrono::Utc::now(),
                context: std::collections::HashMap::new(),
            },
        }
    }

    pub fn operation(mut self, operation: &str) -> Self {
        self.metadata.operation = Some(operation.to_string());
        self
    }

    pub fn query_id(mut self, query_id: &str) -> Self {
        self.metadata.query_id = Some(query_id.to_string());
        self
    }

    pub fn context(mut self, key: &str, value: &str) -> Self {
        self.metadata
            .context
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(mut self, error: &AdsError) -> ErrorMetadata {
        self.metadata.severity = error.severity();
        self.metadata
    }
}

pub type Result<T> = std::result::Result<T, AdsError>;

// === conversions ===

impl From<serde_json::Error> for AdsError {
    fn from(err: serde_json::Error) -> Self {
        AdsError::Serialization {
            format: "json".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for AdsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdsError::Timeout {
                operation: "http_request".to_string(),
                timeout_ms: 0,
            }
        } else if err.is_connect() {
            AdsError::Network {
                operation: "connect".to_string(),
                message: err.to_string(),
            }
        } else {
            AdsError::Network {
                operation: "http_request".to_string(),
                message: err.to_string(),
            }
        }
    }
}

impl From<std::io::Error> for AdsError {
    fn from(err: std::io::Error) -> Self {
        AdsError::Io {
            operation: "io".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<sled::Error> for AdsError {
    fn from(err: sled::Error) -> Self {
        AdsError::VectorStore {
            operation: "sled".to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_follows_taxonomy() {
        assert_eq!(
            AdsError::data_shape("campaigns.json", "missing field").severity(),
            ErrorSeverity::Medium
        );
        assert_eq!(
            AdsError::Configuration {
                key: "pipeline.top_k".into(),
                reason: "must be >= 1".into()
            }
            .severity(),
            ErrorSeverity::Critical
        );
        assert_eq!(
            AdsError::InvalidRequest { reason: "empty".into() }.severity(),
            ErrorSeverity::Low
        );
    }

    #[test]
    fn retryable_errors() {
        let timeout = AdsError::Timeout {
            operation: "chat".into(),
            timeout_ms: 1000,
        };
        assert!(timeout.is_retryable());
        assert_eq!(timeout.retry_after(), Some(std::time::Duration::from_millis(1000)));

        let llm = AdsError::LlmService {
            provider: "openai_compat".into(),
            message: "status=500".into(),
            retry_after: None,
        };
        assert!(!llm.is_retryable());
        assert!(!AdsError::backend_unavailable("chat", "no key").is_retryable());
    }

    #[test]
    fn metadata_builder_takes_error_severity() {
        let err = AdsError::VectorStore {
            operation: "insert".into(),
            message: "disk full".into(),
        };
        let meta = ErrorMetadataBuilder::new("vector_index")
            .operation("build")
            .context("entries", "12")
            .build(&err);
        assert_eq!(meta.severity, ErrorSeverity::High);
        assert_eq!(meta.operation.as_deref(), Some("build"));
        assert_eq!(meta.context.get("entries").map(String::as_str), Some("12"));
        assert!(!meta.error_id.is_empty());
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: AdsError = io.into();
        assert!(matches!(err, AdsError::Io { .. }));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn http_error_converts() {
        let http = reqwest::Client::new().get("not a url").build().unwrap_err();
        let err: AdsError = http.into();
        assert!(matches!(
            err,
            AdsError::Network { ref operation, .. } if operation == "http_request"
        ));
        assert!(err.is_retryable());
        assert_eq!(err.user_message(), "Network problem, please retry");
    }
}
