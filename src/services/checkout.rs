//! Checkout service
//!
//! Orchestrates a purchase attempt: derives the price from the stored book
//! record (client-sent prices are never trusted for a monetary transaction),
//! generates one idempotency key per intent, creates the PIX charge and
//! records the resulting server-side session.

use crate::catalog::{BookCatalog, CatalogError};
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::gateway::PixGateway;
use crate::payments::types::{ChargeRequest, Money, PaymentStatus};
use crate::services::session::{PaymentSession, SessionPhase, SessionStore, Transition};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Payer contact forwarded to the processor when the client supplies none.
    pub payer_email: String,
    pub currency: String,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            payer_email: "teste@cliente.com".to_string(),
            currency: "BRL".to_string(),
        }
    }
}

impl CheckoutConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(email) = std::env::var("PAYMENT_PAYER_EMAIL") {
            if !email.trim().is_empty() {
                cfg.payer_email = email;
            }
        }
        cfg
    }
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("book {book_id} not found")]
    BookNotFound { book_id: String },

    #[error("invalid or missing price: {reason}")]
    InvalidPrice { reason: String },

    #[error("catalog lookup failed: {0}")]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Gateway(#[from] PaymentError),
}

/// Result of a status refresh against the processor.
#[derive(Debug, Clone)]
pub struct StatusRefresh {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub raw_status: String,
    /// Present when the observation moved a stored session to a new phase.
    pub transition: Option<Transition>,
}

pub struct CheckoutService {
    gateway: Arc<dyn PixGateway>,
    catalog: Arc<dyn BookCatalog>,
    store: Arc<SessionStore>,
    config: CheckoutConfig,
}

impl CheckoutService {
    pub fn new(
        gateway: Arc<dyn PixGateway>,
        catalog: Arc<dyn BookCatalog>,
        store: Arc<SessionStore>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            gateway,
            catalog,
            store,
            config,
        }
    }

    /// Creates a payment session for a book. The gateway is contacted only
    /// after the stored price validates as a positive decimal.
    pub async fn create_session(
        &self,
        book_id: &str,
        buyer: Option<String>,
    ) -> Result<PaymentSession, CheckoutError> {
        let book = self
            .catalog
            .find_by_id(book_id)
            .await?
            .ok_or_else(|| CheckoutError::BookNotFound {
                book_id: book_id.to_string(),
            })?;

        let price = validate_price(book.price.as_deref(), &self.config.currency)?;

        // One key per logical purchase intent. HTTP-level retries inside the
        // gateway reuse it; a brand-new intent gets a brand-new key.
        let idempotency_key = Uuid::new_v4().to_string();
        let buyer = buyer
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| self.config.payer_email.clone());

        let mut session = PaymentSession {
            session_token: Uuid::new_v4(),
            book_id: book.id.clone(),
            title: book.title.clone(),
            price: price.amount.clone(),
            currency: price.currency.clone(),
            buyer: buyer.clone(),
            idempotency_key: idempotency_key.clone(),
            provider_payment_id: String::new(),
            phase: SessionPhase::Created,
            provider_status: String::new(),
            qr_code: String::new(),
            qr_code_base64: String::new(),
            ticket_url: None,
            attempts: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let charge = self
            .gateway
            .create_charge(ChargeRequest {
                amount: price,
                description: book.title.clone(),
                payer_email: buyer,
                idempotency_key,
            })
            .await?;

        session.provider_payment_id = charge.payment_id.clone();
        session.provider_status = charge.raw_status;
        session.qr_code = charge.qr_code;
        session.qr_code_base64 = charge.qr_code_base64;
        session.ticket_url = charge.ticket_url;
        session.phase = SessionPhase::Pending;
        session.updated_at = Utc::now();

        info!(
            session_token = %session.session_token,
            payment_id = %session.provider_payment_id,
            book_id = %session.book_id,
            price = %session.price,
            "payment session created"
        );

        self.store.insert(session.clone()).await;
        Ok(session)
    }

    /// Queries the processor for a payment's status and applies the resulting
    /// phase change to the stored session, when one exists for this id.
    pub async fn refresh_status(&self, payment_id: &str) -> PaymentResult<StatusRefresh> {
        let status = self.gateway.charge_status(payment_id).await?;
        let transition = self
            .store
            .apply_status(payment_id, status.status, &status.raw_status)
            .await;

        if let Some(t) = &transition {
            info!(
                session_token = %t.session_token,
                payment_id = %payment_id,
                from = %t.from,
                to = %t.to,
                "payment session transitioned"
            );
        } else if self.store.find_by_payment_id(payment_id).await.is_none() {
            warn!(payment_id = %payment_id, "status queried for a payment with no stored session");
        }

        Ok(StatusRefresh {
            payment_id: status.payment_id,
            status: status.status,
            raw_status: status.raw_status,
            transition,
        })
    }

    pub async fn session(&self, token: &Uuid) -> Option<PaymentSession> {
        self.store.get(token).await
    }

    pub async fn session_for_payment(&self, payment_id: &str) -> Option<PaymentSession> {
        self.store.find_by_payment_id(payment_id).await
    }
}

/// Validates the stored price before any money moves. Missing, non-numeric,
/// zero and negative values are all rejected with the same client error.
fn validate_price(raw: Option<&str>, currency: &str) -> Result<Money, CheckoutError> {
    let value = raw.unwrap_or("").trim();
    if value.is_empty() {
        return Err(CheckoutError::InvalidPrice {
            reason: "price is missing".to_string(),
        });
    }

    let money = Money {
        amount: value.to_string(),
        currency: currency.to_string(),
    };
    money
        .validate_positive("price")
        .map_err(|e| CheckoutError::InvalidPrice {
            reason: e.to_string(),
        })?;
    Ok(money)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_price_is_invalid() {
        assert!(matches!(
            validate_price(None, "BRL"),
            Err(CheckoutError::InvalidPrice { .. })
        ));
        assert!(matches!(
            validate_price(Some("  "), "BRL"),
            Err(CheckoutError::InvalidPrice { .. })
        ));
    }

    #[test]
    fn non_numeric_price_is_invalid() {
        assert!(matches!(
            validate_price(Some("grátis"), "BRL"),
            Err(CheckoutError::InvalidPrice { .. })
        ));
    }

    #[test]
    fn zero_and_negative_prices_are_invalid() {
        assert!(validate_price(Some("0"), "BRL").is_err());
        assert!(validate_price(Some("0.00"), "BRL").is_err());
        assert!(validate_price(Some("-12.50"), "BRL").is_err());
    }

    #[test]
    fn positive_price_is_accepted() {
        let money = validate_price(Some("150.00"), "BRL").expect("price should validate");
        assert_eq!(money.amount, "150.00");
        assert_eq!(money.currency, "BRL");
    }
}
