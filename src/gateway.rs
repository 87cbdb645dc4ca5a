//! Payment gateway boundary: creates payment intents and hands back the
//! client secret used by the paying client to confirm the charge.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_CURRENCY: &str = "usd";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("charge rejected: {0}")]
    Rejected(String),

    #[error("gateway unreachable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ChargeGateway: Send + Sync {
    async fn create_payment_intent(
        &self,
        amount_minor_units: i64,
        currency: &str,
    ) -> Result<String, GatewayError>;
}

/// In-process gateway that issues intent secrets without contacting a processor.
#[derive(Debug, Default, Clone)]
pub struct LocalChargeGateway;

#[async_trait]
impl ChargeGateway for LocalChargeGateway {
    async fn create_payment_intent(
        &self,
        amount_minor_units: i64,
        currency: &str,
    ) -> Result<String, GatewayError> {
        if amount_minor_units <= 0 {
            return Err(GatewayError::Rejected(format!(
                "amount must be positive, got {amount_minor_units}"
            )));
        }
        if currency != DEFAULT_CURRENCY {
            return Err(GatewayError::Rejected(format!("unsupported currency {currency}")));
        }

        Ok(format!(
            "pi_{}_secret_{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        ))
    }
}
