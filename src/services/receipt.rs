//! Receipt generation and storage
//!
//! One PDF per approved payment, named `comprovante_{payment_id}.pdf` under
//! the configured directory. Generation happens once, on the first approved
//! observation; downloads always serve the bytes already on disk so repeated
//! downloads are byte-identical.

use crate::config::ReceiptConfig;
use chrono::{DateTime, Utc};
use printpdf::{BuiltinFont, Mm, PdfDocument};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ReceiptError {
    #[error("no receipt exists for payment {payment_id}")]
    NotFound { payment_id: String },

    #[error("payment id {payment_id} cannot be used as a file name")]
    InvalidPaymentId { payment_id: String },

    #[error("failed to render receipt: {0}")]
    Render(String),

    #[error("receipt storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ReceiptError> for crate::error::AppError {
    fn from(err: ReceiptError) -> Self {
        use crate::error::{AppError, AppErrorKind, DomainError, InfrastructureError};

        match err {
            ReceiptError::NotFound { payment_id } => {
                AppError::new(AppErrorKind::Domain(DomainError::ReceiptNotFound {
                    payment_id,
                }))
            }
            other => AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Storage {
                message: other.to_string(),
            })),
        }
    }
}

/// Everything printed on a receipt.
#[derive(Debug, Clone)]
pub struct ReceiptData {
    pub payment_id: String,
    pub title: String,
    pub price: String,
    pub buyer: String,
    pub issued_at: DateTime<Utc>,
}

pub struct ReceiptService {
    dir: PathBuf,
}

impl ReceiptService {
    pub fn new(config: ReceiptConfig) -> Self {
        Self { dir: config.dir }
    }

    /// Deterministic path for a payment's receipt. Distinct payment ids map
    /// to distinct files, so no locking is needed around writes.
    pub fn receipt_path(&self, payment_id: &str) -> Result<PathBuf, ReceiptError> {
        let safe = payment_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if payment_id.is_empty() || !safe {
            return Err(ReceiptError::InvalidPaymentId {
                payment_id: payment_id.to_string(),
            });
        }
        Ok(self.dir.join(format!("comprovante_{}.pdf", payment_id)))
    }

    pub fn exists(&self, payment_id: &str) -> bool {
        self.receipt_path(payment_id)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }

    /// Renders and writes the receipt, overwriting any previous file for the
    /// same payment id.
    pub fn generate(&self, receipt: &ReceiptData) -> Result<PathBuf, ReceiptError> {
        let path = self.receipt_path(&receipt.payment_id)?;
        fs::create_dir_all(&self.dir)?;

        let (doc, page, layer) = PdfDocument::new(
            "Comprovante de Compra - BookShare",
            Mm(210.0),
            Mm(297.0),
            "comprovante",
        );
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ReceiptError::Render(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ReceiptError::Render(e.to_string()))?;

        let layer = doc.get_page(page).get_layer(layer);
        layer.use_text(
            "COMPROVANTE DE COMPRA - BOOKSHARE",
            22.0,
            Mm(25.0),
            Mm(270.0),
            &bold,
        );
        layer.use_text(
            format!("ID do Pagamento: {}", receipt.payment_id),
            14.0,
            Mm(25.0),
            Mm(248.0),
            &regular,
        );
        layer.use_text(
            format!("Livro: {}", receipt.title),
            14.0,
            Mm(25.0),
            Mm(240.0),
            &regular,
        );
        layer.use_text(
            format!("Valor: {}", format_price(&receipt.price)),
            14.0,
            Mm(25.0),
            Mm(232.0),
            &regular,
        );
        layer.use_text(
            format!("Comprador: {}", receipt.buyer),
            14.0,
            Mm(25.0),
            Mm(224.0),
            &regular,
        );
        layer.use_text(
            format!("Data: {}", receipt.issued_at.format("%d/%m/%Y %H:%M")),
            14.0,
            Mm(25.0),
            Mm(216.0),
            &regular,
        );
        layer.use_text(
            "Obrigado por usar o BookShare!",
            14.0,
            Mm(25.0),
            Mm(196.0),
            &regular,
        );

        let file = File::create(&path)?;
        doc.save(&mut BufWriter::new(file))
            .map_err(|e| ReceiptError::Render(e.to_string()))?;

        info!(
            payment_id = %receipt.payment_id,
            path = %path.display(),
            "receipt generated"
        );
        Ok(path)
    }

    /// Generates the receipt only when no file exists yet. The first approved
    /// observation wins; later callers get the existing file untouched.
    pub fn generate_if_missing(&self, receipt: &ReceiptData) -> Result<PathBuf, ReceiptError> {
        let path = self.receipt_path(&receipt.payment_id)?;
        if path.is_file() {
            return Ok(path);
        }
        self.generate(receipt)
    }

    /// Returns the exact bytes previously written for this payment id.
    pub fn load(&self, payment_id: &str) -> Result<Vec<u8>, ReceiptError> {
        let path = self.receipt_path(payment_id)?;
        if !path.is_file() {
            return Err(ReceiptError::NotFound {
                payment_id: payment_id.to_string(),
            });
        }
        Ok(fs::read(path)?)
    }
}

/// Formats the stored decimal string the way the receipt shows money.
fn format_price(raw: &str) -> String {
    match raw.trim().parse::<f64>() {
        Ok(value) => format!("R$ {:.2}", value),
        Err(_) => format!("R$ {}", raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> (ReceiptService, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let service = ReceiptService::new(ReceiptConfig {
            dir: dir.path().join("comprovantes"),
        });
        (service, dir)
    }

    fn sample_receipt(payment_id: &str) -> ReceiptData {
        ReceiptData {
            payment_id: payment_id.to_string(),
            title: "Dom Casmurro".to_string(),
            price: "150.00".to_string(),
            buyer: "teste@cliente.com".to_string(),
            issued_at: Utc::now(),
        }
    }

    #[test]
    fn path_is_deterministic_per_payment_id() {
        let (service, _guard) = service();
        let a = service.receipt_path("12345").unwrap();
        let b = service.receipt_path("12345").unwrap();
        assert_eq!(a, b);
        assert!(a.ends_with("comprovante_12345.pdf"));
    }

    #[test]
    fn path_traversal_ids_are_rejected() {
        let (service, _guard) = service();
        assert!(service.receipt_path("../etc/passwd").is_err());
        assert!(service.receipt_path("a/b").is_err());
        assert!(service.receipt_path("").is_err());
    }

    #[test]
    fn generate_creates_directory_and_file() {
        let (service, _guard) = service();
        let path = service.generate(&sample_receipt("111")).unwrap();
        assert!(path.is_file());
        assert!(service.exists("111"));

        let bytes = service.load("111").unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn generate_if_missing_keeps_first_file() {
        let (service, _guard) = service();
        service.generate_if_missing(&sample_receipt("222")).unwrap();
        let first = service.load("222").unwrap();

        // A second approved observation with a different timestamp must not
        // change the stored bytes.
        let mut later = sample_receipt("222");
        later.issued_at = Utc::now() + chrono::Duration::hours(1);
        service.generate_if_missing(&later).unwrap();
        let second = service.load("222").unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn load_unknown_payment_is_not_found() {
        let (service, _guard) = service();
        assert!(matches!(
            service.load("999"),
            Err(ReceiptError::NotFound { .. })
        ));
    }

    #[test]
    fn price_formatting() {
        assert_eq!(format_price("150"), "R$ 150.00");
        assert_eq!(format_price("89.9"), "R$ 89.90");
        assert_eq!(format_price("not-a-number"), "R$ not-a-number");
    }
}
