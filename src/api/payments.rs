//! Payment endpoints
//!
//! The wire shapes on these routes are the contract the frontend already
//! speaks: `{error}` / `{error, details}` bodies with pt-BR messages, raw
//! processor status strings, and a PDF download for the receipt.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{AppError, AppErrorKind, DomainError};
use crate::middleware::error::{get_request_id_from_headers, json_error_response};
use crate::services::checkout::{CheckoutError, CheckoutService};
use crate::services::receipt::{ReceiptData, ReceiptService};
use crate::services::session::{PaymentSession, SessionPhase};

#[derive(Clone)]
pub struct PaymentsState {
    pub checkout: Arc<CheckoutService>,
    pub receipts: Arc<ReceiptService>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePixRequest {
    #[serde(rename = "bookId")]
    pub book_id: String,
    /// Accepted for wire compatibility; the stored book record is
    /// authoritative for both.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<JsonValue>,
    #[serde(default)]
    pub buyer: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatePixResponse {
    #[serde(rename = "mpPaymentId")]
    pub mp_payment_id: String,
    pub qr_code: String,
    pub qr_code_base64: String,
    pub comprovante_pdf_url: String,
    pub session_token: Uuid,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub status: String,
}

/// Session snapshot returned to reloaded clients.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_token: Uuid,
    #[serde(rename = "mpPaymentId")]
    pub mp_payment_id: String,
    #[serde(rename = "bookId")]
    pub book_id: String,
    pub title: String,
    pub price: String,
    pub buyer: String,
    pub phase: SessionPhase,
    pub status: String,
    pub qr_code: String,
    pub qr_code_base64: String,
    pub ticket_url: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<PaymentSession> for SessionView {
    fn from(session: PaymentSession) -> Self {
        Self {
            session_token: session.session_token,
            mp_payment_id: session.provider_payment_id,
            book_id: session.book_id,
            title: session.title,
            price: session.price,
            buyer: session.buyer,
            phase: session.phase,
            status: session.provider_status,
            qr_code: session.qr_code,
            qr_code_base64: session.qr_code_base64,
            ticket_url: session.ticket_url,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

/// POST /payments/pix
pub async fn create_pix_payment(
    State(state): State<PaymentsState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePixRequest>,
) -> Response {
    info!(book_id = %payload.book_id, "PIX payment requested");

    match state
        .checkout
        .create_session(&payload.book_id, payload.buyer)
        .await
    {
        Ok(session) => {
            let body = CreatePixResponse {
                comprovante_pdf_url: format!(
                    "/payments/comprovante/{}",
                    session.provider_payment_id
                ),
                mp_payment_id: session.provider_payment_id,
                qr_code: session.qr_code,
                qr_code_base64: session.qr_code_base64,
                session_token: session.session_token,
                status: session.provider_status,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(CheckoutError::InvalidPrice { reason }) => {
            info!(book_id = %payload.book_id, reason = %reason, "PIX payment refused");
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": "'price' inválido ou nulo." })),
            )
                .into_response()
        }
        Err(CheckoutError::BookNotFound { book_id }) => {
            info!(book_id = %book_id, "PIX payment for unknown book");
            (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": "Livro não encontrado" })),
            )
                .into_response()
        }
        Err(CheckoutError::Catalog(e)) => {
            error!(book_id = %payload.book_id, error = %e, "catalog lookup failed");
            json_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.to_string(),
                get_request_id_from_headers(&headers),
            )
            .into_response()
        }
        Err(CheckoutError::Gateway(e)) => {
            error!(book_id = %payload.book_id, error = %e, "PIX charge creation failed");
            let status = StatusCode::from_u16(e.http_status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (
                status,
                Json(serde_json::json!({
                    "error": "Erro na criação do pagamento PIX",
                    "details": e.details(),
                })),
            )
                .into_response()
        }
    }
}

/// GET /payments/status/{payment_id}
pub async fn payment_status(
    State(state): State<PaymentsState>,
    Path(payment_id): Path<String>,
) -> Response {
    match state.checkout.refresh_status(&payment_id).await {
        Ok(refresh) => (
            StatusCode::OK,
            Json(PaymentStatusResponse {
                status: refresh.raw_status,
            }),
        )
            .into_response(),
        Err(e) => {
            error!(payment_id = %payment_id, error = %e, "status query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Erro ao consultar status do pagamento",
                    "details": e.details(),
                })),
            )
                .into_response()
        }
    }
}

/// GET /payments/session/{session_token}
pub async fn get_session(
    State(state): State<PaymentsState>,
    Path(session_token): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<SessionView>, AppError> {
    match state.checkout.session(&session_token).await {
        Some(session) => Ok(Json(session.into())),
        None => {
            let mut err = AppError::new(AppErrorKind::Domain(DomainError::SessionNotFound {
                session_token: session_token.to_string(),
            }));
            if let Some(request_id) = get_request_id_from_headers(&headers) {
                err = err.with_request_id(request_id);
            }
            Err(err)
        }
    }
}

/// GET /payments/comprovante/{payment_id}
pub async fn download_receipt(
    State(state): State<PaymentsState>,
    Path(payment_id): Path<String>,
) -> Response {
    let session = match state.checkout.session_for_payment(&payment_id).await {
        Some(session) => session,
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": "Comprovante não encontrado" })),
            )
                .into_response()
        }
    };

    if session.phase != SessionPhase::Approved {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Comprovante não encontrado" })),
        )
            .into_response();
    }

    // The watcher generates on the approval transition; this covers the
    // window where approval was observed but the write did not happen yet.
    let receipt = ReceiptData {
        payment_id: session.provider_payment_id.clone(),
        title: session.title.clone(),
        price: session.price.clone(),
        buyer: session.buyer.clone(),
        issued_at: chrono::Utc::now(),
    };
    if let Err(e) = state.receipts.generate_if_missing(&receipt) {
        error!(payment_id = %payment_id, error = %e, "receipt generation failed");
        return AppError::from(e).into_response();
    }

    match state.receipts.load(&payment_id) {
        Ok(bytes) => {
            let headers = [
                (header::CONTENT_TYPE, "application/pdf".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"comprovante_{}.pdf\"", payment_id),
                ),
            ];
            (StatusCode::OK, headers, bytes).into_response()
        }
        Err(e) => AppError::from(e).into_response(),
    }
}
