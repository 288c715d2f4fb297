//! Services module for business logic and integrations

pub mod checkout;
pub mod receipt;
pub mod session;

pub use checkout::{CheckoutConfig, CheckoutError, CheckoutService, StatusRefresh};
pub use receipt::{ReceiptData, ReceiptError, ReceiptService};
pub use session::{PaymentSession, SessionPhase, SessionStore, Transition};
