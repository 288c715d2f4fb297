//! Comprehensive error handling for the BookShare payments backend
//!
//! This module provides a unified error system with proper HTTP status mapping,
//! user-friendly messages, and structured error codes for client handling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "BOOK_NOT_FOUND")]
    BookNotFound,
    #[serde(rename = "SESSION_NOT_FOUND")]
    SessionNotFound,
    #[serde(rename = "PAYMENT_NOT_APPROVED")]
    PaymentNotApproved,
    #[serde(rename = "RECEIPT_NOT_FOUND")]
    ReceiptNotFound,

    // Infrastructure errors (5xx)
    #[serde(rename = "STORAGE_ERROR")]
    StorageError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors (502, 429, 504)
    #[serde(rename = "PAYMENT_PROVIDER_ERROR")]
    PaymentProviderError,
    #[serde(rename = "RATE_LIMIT_ERROR")]
    RateLimitError,
    #[serde(rename = "EXTERNAL_SERVICE_TIMEOUT")]
    ExternalServiceTimeout,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Domain-specific business logic errors
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Book id does not exist in the catalog
    BookNotFound { book_id: String },
    /// Session token does not exist in the session store
    SessionNotFound { session_token: String },
    /// Receipt requested for a payment that never reached the approved state
    PaymentNotApproved { payment_id: String },
    /// No receipt was ever generated for the given payment id
    ReceiptNotFound { payment_id: String },
}

/// Infrastructure-level errors (storage, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    /// Receipt storage failure (directory creation, write, read)
    Storage { message: String },
    /// Missing or invalid configuration
    Configuration { message: String },
}

/// External service errors (payment processor)
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// Payment processor (Mercado Pago) error
    PaymentProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },
    /// Rate limit exceeded
    RateLimit {
        service: String,
        retry_after: Option<u64>,
    },
    /// External service timeout
    Timeout { service: String, timeout_secs: u64 },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Price is missing, non-numeric, zero or negative
    InvalidPrice { value: String, reason: String },
    /// Required field missing
    MissingField { field: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::BookNotFound { .. } => 404,
                DomainError::SessionNotFound { .. } => 404,
                DomainError::PaymentNotApproved { .. } => 404,
                DomainError::ReceiptNotFound { .. } => 404,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Storage { .. } => 500,
                InfrastructureError::Configuration { .. } => 500,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { .. } => 502, // Bad Gateway
                ExternalError::RateLimit { .. } => 429,       // Too Many Requests
                ExternalError::Timeout { .. } => 504,         // Gateway Timeout
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidPrice { .. } => 400,
                ValidationError::MissingField { .. } => 400,
            },
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::BookNotFound { .. } => ErrorCode::BookNotFound,
                DomainError::SessionNotFound { .. } => ErrorCode::SessionNotFound,
                DomainError::PaymentNotApproved { .. } => ErrorCode::PaymentNotApproved,
                DomainError::ReceiptNotFound { .. } => ErrorCode::ReceiptNotFound,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Storage { .. } => ErrorCode::StorageError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { .. } => ErrorCode::PaymentProviderError,
                ExternalError::RateLimit { .. } => ErrorCode::RateLimitError,
                ExternalError::Timeout { .. } => ErrorCode::ExternalServiceTimeout,
            },
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::BookNotFound { book_id } => {
                    format!("Book '{}' not found", book_id)
                }
                DomainError::SessionNotFound { session_token } => {
                    format!("Payment session '{}' not found", session_token)
                }
                DomainError::PaymentNotApproved { payment_id } => {
                    format!("Payment '{}' has not been approved", payment_id)
                }
                DomainError::ReceiptNotFound { payment_id } => {
                    format!("No receipt exists for payment '{}'", payment_id)
                }
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider {
                    provider,
                    is_retryable,
                    ..
                } => {
                    if *is_retryable {
                        format!(
                            "Payment provider ({}) is temporarily unavailable. Please try again",
                            provider
                        )
                    } else {
                        "Payment processing failed. Please contact support".to_string()
                    }
                }
                ExternalError::RateLimit {
                    service,
                    retry_after,
                } => {
                    if let Some(secs) = retry_after {
                        format!(
                            "Rate limit exceeded for {}. Please try again in {} seconds",
                            service, secs
                        )
                    } else {
                        format!("Rate limit exceeded for {}. Please try again later", service)
                    }
                }
                ExternalError::Timeout {
                    service,
                    timeout_secs,
                } => {
                    format!(
                        "{} request timed out after {} seconds. Please try again",
                        service, timeout_secs
                    )
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidPrice { value, reason } => {
                    format!("Invalid price '{}': {}", value, reason)
                }
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Storage { .. } => true,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { is_retryable, .. } => *is_retryable,
                ExternalError::RateLimit { .. } => true,
                ExternalError::Timeout { .. } => true,
            },
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::new(AppErrorKind::Infrastructure(
            InfrastructureError::Configuration {
                message: err.to_string(),
            },
        ))
    }
}

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_not_found_error() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::BookNotFound {
            book_id: "42".to_string(),
        }));

        assert_eq!(error.status_code(), 404);
        assert_eq!(error.error_code(), ErrorCode::BookNotFound);
        assert!(error.user_message().contains("42"));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_rate_limit_error() {
        let error = AppError::new(AppErrorKind::External(ExternalError::RateLimit {
            service: "Mercado Pago".to_string(),
            retry_after: Some(60),
        }));

        assert_eq!(error.status_code(), 429);
        assert_eq!(error.error_code(), ErrorCode::RateLimitError);
        assert!(error.is_retryable());
    }

    #[test]
    fn test_invalid_price_error() {
        let error = AppError::new(AppErrorKind::Validation(ValidationError::InvalidPrice {
            value: "-10".to_string(),
            reason: "price must be greater than zero".to_string(),
        }));

        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), ErrorCode::ValidationError);
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_receipt_not_found_maps_to_404() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::ReceiptNotFound {
            payment_id: "12345".to_string(),
        }));

        assert_eq!(error.status_code(), 404);
        assert_eq!(error.error_code(), ErrorCode::ReceiptNotFound);
    }
}
