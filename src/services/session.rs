//! Server-side payment sessions
//!
//! Each purchase intent gets a session record keyed by a server-issued token,
//! so a page reload does not orphan a pending payment. The store is an
//! in-process map; sessions are ephemeral by design and die with the process.

use crate::payments::types::PaymentStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Lifecycle of a purchase attempt.
///
/// `Created` exists only between intent validation and the gateway call;
/// every session in the store is `Pending` or terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Created,
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl SessionPhase {
    pub fn valid_transitions(&self) -> &'static [SessionPhase] {
        match self {
            SessionPhase::Created => &[SessionPhase::Pending],
            SessionPhase::Pending => &[
                SessionPhase::Approved,
                SessionPhase::Rejected,
                SessionPhase::Expired,
            ],
            // Terminal phases absorb
            SessionPhase::Approved | SessionPhase::Rejected | SessionPhase::Expired => &[],
        }
    }

    pub fn can_transition_to(&self, target: SessionPhase) -> bool {
        self.valid_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionPhase::Approved | SessionPhase::Rejected | SessionPhase::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Created => "created",
            SessionPhase::Pending => "pending",
            SessionPhase::Approved => "approved",
            SessionPhase::Rejected => "rejected",
            SessionPhase::Expired => "expired",
        }
    }

    /// Target phase for a processor status observation.
    pub fn target_for(status: PaymentStatus) -> SessionPhase {
        match status {
            PaymentStatus::Approved => SessionPhase::Approved,
            PaymentStatus::Rejected | PaymentStatus::Cancelled => SessionPhase::Rejected,
            PaymentStatus::Expired => SessionPhase::Expired,
            PaymentStatus::Pending | PaymentStatus::InProcess | PaymentStatus::Unknown => {
                SessionPhase::Pending
            }
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentSession {
    pub session_token: Uuid,
    pub book_id: String,
    pub title: String,
    pub price: String,
    pub currency: String,
    pub buyer: String,
    /// One key per logical purchase intent; never exposed to clients.
    #[serde(skip_serializing)]
    pub idempotency_key: String,
    pub provider_payment_id: String,
    pub phase: SessionPhase,
    /// The processor's raw status string, echoed by the status endpoint.
    pub provider_status: String,
    pub qr_code: String,
    pub qr_code_base64: String,
    pub ticket_url: Option<String>,
    /// Status queries issued for this session by the watcher.
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A phase change applied to a stored session.
#[derive(Debug, Clone)]
pub struct Transition {
    pub session_token: Uuid,
    pub from: SessionPhase,
    pub to: SessionPhase,
    pub session: PaymentSession,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, PaymentSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: PaymentSession) {
        self.sessions
            .write()
            .await
            .insert(session.session_token, session);
    }

    pub async fn get(&self, token: &Uuid) -> Option<PaymentSession> {
        self.sessions.read().await.get(token).cloned()
    }

    pub async fn find_by_payment_id(&self, payment_id: &str) -> Option<PaymentSession> {
        self.sessions
            .read()
            .await
            .values()
            .find(|s| s.provider_payment_id == payment_id)
            .cloned()
    }

    /// Sessions still awaiting a terminal observation.
    pub async fn pending(&self) -> Vec<PaymentSession> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.phase == SessionPhase::Pending)
            .cloned()
            .collect()
    }

    /// Records a processor status observation against the session holding
    /// `payment_id`. Returns the transition when the observation moved the
    /// session to a new phase; terminal phases absorb silently.
    pub async fn apply_status(
        &self,
        payment_id: &str,
        status: PaymentStatus,
        raw_status: &str,
    ) -> Option<Transition> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .values_mut()
            .find(|s| s.provider_payment_id == payment_id)?;

        session.provider_status = raw_status.to_string();
        session.updated_at = Utc::now();

        let target = SessionPhase::target_for(status);
        if session.phase == target || !session.phase.can_transition_to(target) {
            return None;
        }

        let from = session.phase;
        session.phase = target;
        Some(Transition {
            session_token: session.session_token,
            from,
            to: target,
            session: session.clone(),
        })
    }

    /// Increments the poll attempt counter, returning the new value.
    pub async fn record_attempt(&self, token: &Uuid) -> u32 {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(token) {
            Some(session) => {
                session.attempts += 1;
                session.updated_at = Utc::now();
                session.attempts
            }
            None => 0,
        }
    }

    /// Moves a pending session to the expired terminal phase. Returns `false`
    /// when the session is unknown or already terminal.
    pub async fn expire(&self, token: &Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(token) {
            Some(session) if session.phase.can_transition_to(SessionPhase::Expired) => {
                session.phase = SessionPhase::Expired;
                session.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_session(payment_id: &str) -> PaymentSession {
        let now = Utc::now();
        PaymentSession {
            session_token: Uuid::new_v4(),
            book_id: "1".to_string(),
            title: "Dom Casmurro".to_string(),
            price: "150.00".to_string(),
            currency: "BRL".to_string(),
            buyer: "teste@cliente.com".to_string(),
            idempotency_key: Uuid::new_v4().to_string(),
            provider_payment_id: payment_id.to_string(),
            phase: SessionPhase::Pending,
            provider_status: "pending".to_string(),
            qr_code: "00020126pix".to_string(),
            qr_code_base64: "aGVsbG8=".to_string(),
            ticket_url: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn created_only_moves_to_pending() {
        assert!(SessionPhase::Created.can_transition_to(SessionPhase::Pending));
        assert!(!SessionPhase::Created.can_transition_to(SessionPhase::Approved));
    }

    #[test]
    fn pending_moves_to_all_terminals() {
        for target in [
            SessionPhase::Approved,
            SessionPhase::Rejected,
            SessionPhase::Expired,
        ] {
            assert!(SessionPhase::Pending.can_transition_to(target));
        }
        assert!(!SessionPhase::Pending.can_transition_to(SessionPhase::Created));
    }

    #[test]
    fn terminal_phases_have_no_transitions() {
        for phase in [
            SessionPhase::Approved,
            SessionPhase::Rejected,
            SessionPhase::Expired,
        ] {
            assert!(phase.is_terminal());
            assert!(phase.valid_transitions().is_empty());
        }
    }

    #[test]
    fn status_targets_map_to_phases() {
        assert_eq!(
            SessionPhase::target_for(PaymentStatus::Approved),
            SessionPhase::Approved
        );
        assert_eq!(
            SessionPhase::target_for(PaymentStatus::Cancelled),
            SessionPhase::Rejected
        );
        assert_eq!(
            SessionPhase::target_for(PaymentStatus::InProcess),
            SessionPhase::Pending
        );
    }

    #[tokio::test]
    async fn apply_status_transitions_pending_to_approved() {
        let store = SessionStore::new();
        store.insert(pending_session("mp_1")).await;

        let transition = store
            .apply_status("mp_1", PaymentStatus::Approved, "approved")
            .await
            .expect("transition should occur");
        assert_eq!(transition.from, SessionPhase::Pending);
        assert_eq!(transition.to, SessionPhase::Approved);

        let stored = store.find_by_payment_id("mp_1").await.unwrap();
        assert_eq!(stored.phase, SessionPhase::Approved);
        assert_eq!(stored.provider_status, "approved");
    }

    #[tokio::test]
    async fn apply_status_is_absorbed_by_terminal_phases() {
        let store = SessionStore::new();
        store.insert(pending_session("mp_1")).await;

        store
            .apply_status("mp_1", PaymentStatus::Rejected, "rejected")
            .await
            .expect("first transition should occur");

        // A late approved observation must not resurrect a rejected session.
        let late = store
            .apply_status("mp_1", PaymentStatus::Approved, "approved")
            .await;
        assert!(late.is_none());
        let stored = store.find_by_payment_id("mp_1").await.unwrap();
        assert_eq!(stored.phase, SessionPhase::Rejected);
    }

    #[tokio::test]
    async fn pending_observation_does_not_transition() {
        let store = SessionStore::new();
        store.insert(pending_session("mp_1")).await;

        let transition = store
            .apply_status("mp_1", PaymentStatus::Pending, "pending")
            .await;
        assert!(transition.is_none());
    }

    #[tokio::test]
    async fn expire_only_affects_pending_sessions() {
        let store = SessionStore::new();
        let session = pending_session("mp_1");
        let token = session.session_token;
        store.insert(session).await;

        assert!(store.expire(&token).await);
        assert!(!store.expire(&token).await); // already terminal

        let stored = store.get(&token).await.unwrap();
        assert_eq!(stored.phase, SessionPhase::Expired);
    }

    #[tokio::test]
    async fn pending_listing_excludes_terminal_sessions() {
        let store = SessionStore::new();
        store.insert(pending_session("mp_1")).await;
        store.insert(pending_session("mp_2")).await;
        store
            .apply_status("mp_2", PaymentStatus::Approved, "approved")
            .await;

        let pending = store.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].provider_payment_id, "mp_1");
    }

    #[tokio::test]
    async fn attempt_counter_increments() {
        let store = SessionStore::new();
        let session = pending_session("mp_1");
        let token = session.session_token;
        store.insert(session).await;

        assert_eq!(store.record_attempt(&token).await, 1);
        assert_eq!(store.record_attempt(&token).await, 2);
        assert_eq!(store.record_attempt(&Uuid::new_v4()).await, 0);
    }
}
