use crate::payments::error::PaymentError;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Money {
    pub amount: String,
    pub currency: String,
}

impl Money {
    pub fn brl(amount: impl Into<String>) -> Self {
        Self {
            amount: amount.into(),
            currency: "BRL".to_string(),
        }
    }

    pub fn validate_positive(&self, field: &str) -> Result<(), PaymentError> {
        let parsed =
            BigDecimal::from_str(self.amount.trim()).map_err(|_| PaymentError::ValidationError {
                message: format!("invalid decimal amount: {}", self.amount),
                field: Some(field.to_string()),
            })?;
        if parsed <= BigDecimal::from(0) {
            return Err(PaymentError::ValidationError {
                message: "amount must be greater than zero".to_string(),
                field: Some(field.to_string()),
            });
        }
        if self.currency.trim().is_empty() {
            return Err(PaymentError::ValidationError {
                message: "currency is required".to_string(),
                field: Some("currency".to_string()),
            });
        }
        Ok(())
    }
}

/// Payment status as reported by the processor, normalized. The raw status
/// string is always carried alongside because the status endpoint echoes it
/// verbatim.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    InProcess,
    Approved,
    Rejected,
    Cancelled,
    Expired,
    Unknown,
}

impl PaymentStatus {
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "pending" => PaymentStatus::Pending,
            "in_process" | "in_mediation" | "authorized" => PaymentStatus::InProcess,
            "approved" => PaymentStatus::Approved,
            "rejected" => PaymentStatus::Rejected,
            "cancelled" => PaymentStatus::Cancelled,
            "expired" => PaymentStatus::Expired,
            _ => PaymentStatus::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Approved
                | PaymentStatus::Rejected
                | PaymentStatus::Cancelled
                | PaymentStatus::Expired
        )
    }
}

/// Request to create a PIX charge at the processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub amount: Money,
    pub description: String,
    pub payer_email: String,
    /// Generated once per logical purchase intent; retries of the same intent
    /// must reuse it so the processor can deduplicate.
    pub idempotency_key: String,
}

/// Result of a successful charge creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeResponse {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub raw_status: String,
    pub qr_code: String,
    pub qr_code_base64: String,
    pub ticket_url: Option<String>,
}

/// Result of a status query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub raw_status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_money_validates() {
        assert!(Money::brl("150.00").validate_positive("price").is_ok());
    }

    #[test]
    fn zero_and_negative_money_rejected() {
        assert!(Money::brl("0").validate_positive("price").is_err());
        assert!(Money::brl("0.00").validate_positive("price").is_err());
        assert!(Money::brl("-5").validate_positive("price").is_err());
    }

    #[test]
    fn non_numeric_money_rejected() {
        assert!(Money::brl("abc").validate_positive("price").is_err());
        assert!(Money::brl("").validate_positive("price").is_err());
    }

    #[test]
    fn missing_currency_rejected() {
        let money = Money {
            amount: "10".to_string(),
            currency: " ".to_string(),
        };
        assert!(money.validate_positive("price").is_err());
    }

    #[test]
    fn provider_status_mapping() {
        assert_eq!(
            PaymentStatus::from_provider("approved"),
            PaymentStatus::Approved
        );
        assert_eq!(
            PaymentStatus::from_provider("pending"),
            PaymentStatus::Pending
        );
        assert_eq!(
            PaymentStatus::from_provider("in_process"),
            PaymentStatus::InProcess
        );
        assert_eq!(
            PaymentStatus::from_provider("cancelled"),
            PaymentStatus::Cancelled
        );
        assert_eq!(
            PaymentStatus::from_provider("charged_back"),
            PaymentStatus::Unknown
        );
    }

    #[test]
    fn terminal_statuses() {
        assert!(PaymentStatus::Approved.is_terminal());
        assert!(PaymentStatus::Rejected.is_terminal());
        assert!(PaymentStatus::Expired.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(!PaymentStatus::InProcess.is_terminal());
    }
}
