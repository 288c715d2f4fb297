//! Health check module
//! Provides health status for the application and its dependencies

use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::error;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
    Warning,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up() -> Self {
        Self {
            status: ComponentState::Up,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            details,
        }
    }

    pub fn warning(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Warning,
            details,
        }
    }
}

/// Health checker for the application
#[derive(Clone)]
pub struct HealthChecker {
    receipt_dir: PathBuf,
    gateway_configured: bool,
}

impl HealthChecker {
    pub fn new(receipt_dir: PathBuf, gateway_configured: bool) -> Self {
        Self {
            receipt_dir,
            gateway_configured,
        }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();

        // Receipt storage must exist and be writable
        match check_receipt_storage(&self.receipt_dir) {
            Ok(()) => {
                health_status
                    .checks
                    .insert("receipt_storage".to_string(), ComponentHealth::up());
            }
            Err(e) => {
                error!(dir = %self.receipt_dir.display(), error = %e, "receipt storage check failed");
                health_status
                    .checks
                    .insert("receipt_storage".to_string(), ComponentHealth::down(Some(e)));
                health_status.status = HealthState::Unhealthy;
            }
        }

        // Gateway credentials are required to create charges but the service
        // can still serve existing receipts without them
        if self.gateway_configured {
            health_status
                .checks
                .insert("payment_gateway".to_string(), ComponentHealth::up());
        } else {
            health_status.checks.insert(
                "payment_gateway".to_string(),
                ComponentHealth::warning(Some("MP_ACCESS_TOKEN is not configured".to_string())),
            );
            if health_status.status == HealthState::Healthy {
                health_status.status = HealthState::Degraded;
            }
        }

        health_status
    }
}

fn check_receipt_storage(dir: &PathBuf) -> Result<(), String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("cannot create receipt dir: {}", e))?;
    let metadata =
        std::fs::metadata(dir).map_err(|e| format!("cannot stat receipt dir: {}", e))?;
    if metadata.permissions().readonly() {
        return Err("receipt dir is read-only".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn healthy_when_storage_writable_and_gateway_configured() {
        let dir = tempfile::tempdir().unwrap();
        let checker = HealthChecker::new(dir.path().join("comprovantes"), true);

        let status = checker.check_health().await;
        assert!(status.is_healthy());
        assert_eq!(
            status.checks.get("receipt_storage").unwrap().status,
            ComponentState::Up
        );
    }

    #[tokio::test]
    async fn degraded_without_gateway_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let checker = HealthChecker::new(dir.path().join("comprovantes"), false);

        let status = checker.check_health().await;
        assert_eq!(status.status, HealthState::Degraded);
        assert_eq!(
            status.checks.get("payment_gateway").unwrap().status,
            ComponentState::Warning
        );
    }
}
