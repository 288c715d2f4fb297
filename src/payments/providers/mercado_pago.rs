use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::gateway::PixGateway;
use crate::payments::types::{ChargeRequest, ChargeResponse, PaymentStatus, StatusResponse};
use crate::payments::utils::PaymentHttpClient;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct MercadoPagoConfig {
    pub access_token: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for MercadoPagoConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            base_url: "https://api.mercadopago.com".to_string(),
            timeout_secs: 15,
            max_retries: 2,
        }
    }
}

impl MercadoPagoConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let access_token =
            std::env::var("MP_ACCESS_TOKEN").map_err(|_| PaymentError::ValidationError {
                message: "MP_ACCESS_TOKEN environment variable is required".to_string(),
                field: Some("MP_ACCESS_TOKEN".to_string()),
            })?;

        Ok(Self {
            base_url: std::env::var("MP_BASE_URL")
                .unwrap_or_else(|_| "https://api.mercadopago.com".to_string()),
            timeout_secs: std::env::var("MP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(15),
            max_retries: std::env::var("MP_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(2),
            access_token,
        })
    }
}

/// Mercado Pago PIX client. The only component holding processor credentials.
pub struct MercadoPagoGateway {
    config: MercadoPagoConfig,
    http: PaymentHttpClient,
}

impl MercadoPagoGateway {
    pub fn new(config: MercadoPagoConfig) -> PaymentResult<Self> {
        let http =
            PaymentHttpClient::new(Duration::from_secs(config.timeout_secs), config.max_retries)?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(MercadoPagoConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }
}

#[async_trait]
impl PixGateway for MercadoPagoGateway {
    async fn create_charge(&self, request: ChargeRequest) -> PaymentResult<ChargeResponse> {
        request.amount.validate_positive("amount")?;
        let transaction_amount: f64 = request.amount.amount.trim().parse().map_err(|_| {
            PaymentError::ValidationError {
                message: format!("invalid decimal amount: {}", request.amount.amount),
                field: Some("amount".to_string()),
            }
        })?;

        let payload = serde_json::json!({
            "transaction_amount": transaction_amount,
            "description": request.description,
            "payment_method_id": "pix",
            "payer": { "email": request.payer_email },
        });

        let payment: MpPayment = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/v1/payments"),
                Some(&self.config.access_token),
                Some(&payload),
                &[
                    ("Content-Type", "application/json"),
                    ("X-Idempotency-Key", request.idempotency_key.as_str()),
                ],
            )
            .await?;

        let transaction_data = payment
            .point_of_interaction
            .and_then(|poi| poi.transaction_data)
            .ok_or_else(|| PaymentError::ProviderError {
                provider: "mercado_pago".to_string(),
                message: "payment response is missing PIX transaction data".to_string(),
                status: None,
                details: None,
                retryable: false,
            })?;

        let qr_code = transaction_data.qr_code.unwrap_or_default();
        if qr_code.is_empty() {
            return Err(PaymentError::ProviderError {
                provider: "mercado_pago".to_string(),
                message: "payment response is missing the PIX QR payload".to_string(),
                status: None,
                details: None,
                retryable: false,
            });
        }

        info!(payment_id = payment.id, status = %payment.status, "mercado pago PIX charge created");

        Ok(ChargeResponse {
            payment_id: payment.id.to_string(),
            status: PaymentStatus::from_provider(&payment.status),
            raw_status: payment.status,
            qr_code,
            qr_code_base64: transaction_data.qr_code_base64.unwrap_or_default(),
            ticket_url: transaction_data.ticket_url,
        })
    }

    async fn charge_status(&self, payment_id: &str) -> PaymentResult<StatusResponse> {
        let payment: MpPayment = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/v1/payments/{}", payment_id)),
                Some(&self.config.access_token),
                None,
                &[],
            )
            .await?;

        Ok(StatusResponse {
            payment_id: payment.id.to_string(),
            status: PaymentStatus::from_provider(&payment.status),
            raw_status: payment.status,
        })
    }

    fn name(&self) -> &'static str {
        "mercado_pago"
    }
}

#[derive(Debug, Deserialize)]
struct MpPayment {
    id: u64,
    status: String,
    #[serde(default)]
    point_of_interaction: Option<MpPointOfInteraction>,
}

#[derive(Debug, Deserialize)]
struct MpPointOfInteraction {
    #[serde(default)]
    transaction_data: Option<MpTransactionData>,
}

#[derive(Debug, Deserialize)]
struct MpTransactionData {
    #[serde(default)]
    qr_code: Option<String>,
    #[serde(default)]
    qr_code_base64: Option<String>,
    #[serde(default)]
    ticket_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_url_and_path() {
        let gateway = MercadoPagoGateway::new(MercadoPagoConfig {
            access_token: "TEST-token".to_string(),
            ..MercadoPagoConfig::default()
        })
        .expect("gateway init should succeed");

        assert_eq!(
            gateway.endpoint("/v1/payments/42"),
            "https://api.mercadopago.com/v1/payments/42"
        );
    }

    #[test]
    fn payment_envelope_deserializes_with_qr_data() {
        let payload = serde_json::json!({
            "id": 1234567890,
            "status": "pending",
            "point_of_interaction": {
                "transaction_data": {
                    "qr_code": "00020126580014br.gov.bcb.pix",
                    "qr_code_base64": "aVZCT1J3MEtHZ29BQUFBTlNVaEVVZ0FB",
                    "ticket_url": "https://www.mercadopago.com.br/payments/1234567890/ticket"
                }
            }
        });

        let payment: MpPayment =
            serde_json::from_value(payload).expect("deserialization should succeed");
        assert_eq!(payment.id, 1234567890);
        assert_eq!(payment.status, "pending");
        let data = payment
            .point_of_interaction
            .and_then(|poi| poi.transaction_data)
            .expect("transaction data should be present");
        assert_eq!(data.qr_code.as_deref(), Some("00020126580014br.gov.bcb.pix"));
    }

    #[test]
    fn status_envelope_deserializes_without_qr_data() {
        let payload = serde_json::json!({
            "id": 1234567890,
            "status": "approved"
        });

        let payment: MpPayment =
            serde_json::from_value(payload).expect("deserialization should succeed");
        assert_eq!(payment.status, "approved");
        assert!(payment.point_of_interaction.is_none());
    }
}
