use crate::payments::error::PaymentResult;
use crate::payments::types::{ChargeRequest, ChargeResponse, StatusResponse};
use async_trait::async_trait;

/// Seam between the checkout flow and the external PIX processor.
///
/// The only implementation in production is Mercado Pago; tests substitute a
/// mock to observe call counts and drive status sequences.
#[async_trait]
pub trait PixGateway: Send + Sync {
    /// Issues a charge-creation call. The caller validates the amount before
    /// invoking; the implementation forwards the idempotency key so that
    /// retries of the same intent are deduplicated by the processor.
    async fn create_charge(&self, request: ChargeRequest) -> PaymentResult<ChargeResponse>;

    /// Queries the processor for the current status of a payment.
    async fn charge_status(&self, payment_id: &str) -> PaymentResult<StatusResponse>;

    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::{Money, PaymentStatus};

    struct MockGateway;

    #[async_trait]
    impl PixGateway for MockGateway {
        async fn create_charge(&self, request: ChargeRequest) -> PaymentResult<ChargeResponse> {
            request.amount.validate_positive("amount")?;
            Ok(ChargeResponse {
                payment_id: "mp_1".to_string(),
                status: PaymentStatus::Pending,
                raw_status: "pending".to_string(),
                qr_code: "00020126pix-payload".to_string(),
                qr_code_base64: "aGVsbG8=".to_string(),
                ticket_url: None,
            })
        }

        async fn charge_status(&self, payment_id: &str) -> PaymentResult<StatusResponse> {
            Ok(StatusResponse {
                payment_id: payment_id.to_string(),
                status: PaymentStatus::Approved,
                raw_status: "approved".to_string(),
            })
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }

    #[tokio::test]
    async fn trait_can_be_implemented_by_mock_gateway() {
        let gateway: Box<dyn PixGateway> = Box::new(MockGateway);
        let response = gateway
            .create_charge(ChargeRequest {
                amount: Money::brl("150.00"),
                description: "Dom Casmurro".to_string(),
                payer_email: "teste@cliente.com".to_string(),
                idempotency_key: "key-1".to_string(),
            })
            .await
            .expect("charge creation should succeed");
        assert_eq!(response.status, PaymentStatus::Pending);
        assert!(!response.qr_code.is_empty());

        let status = gateway
            .charge_status(&response.payment_id)
            .await
            .expect("status query should succeed");
        assert_eq!(status.status, PaymentStatus::Approved);
    }

    #[tokio::test]
    async fn mock_gateway_rejects_non_positive_amount() {
        let gateway = MockGateway;
        let result = gateway
            .create_charge(ChargeRequest {
                amount: Money::brl("0"),
                description: "Dom Casmurro".to_string(),
                payer_email: "teste@cliente.com".to_string(),
                idempotency_key: "key-2".to_string(),
            })
            .await;
        assert!(result.is_err());
    }
}
