//! Wire types for the gateway boundary.

use chrono::{DateTime, Utc};
use common::{AggregateId, Money, UserId};
use serde::{Deserialize, Serialize};

/// Outcome reported by the gateway for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
    /// The charge went through.
    Approved,

    /// The gateway responded and refused the charge.
    Declined,

    /// The charge is queued on the gateway side.
    Processing,

    /// The gateway reported an internal error.
    Error,
}

/// A charge request sent to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRequest {
    /// The payment this charge belongs to.
    pub payment_id: AggregateId,

    /// The paying user.
    pub user_id: UserId,

    /// Amount to charge.
    pub amount: Money,
}

/// The gateway's response to a charge request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    /// Gateway-assigned transaction ID.
    pub transaction_id: String,

    /// Outcome of the charge.
    pub status: GatewayStatus,

    /// Charged amount.
    pub amount: Money,

    /// When the gateway processed the request.
    pub processed_at: DateTime<Utc>,

    /// Authorization code, present on approval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<String>,

    /// Machine-readable error code, present on decline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    /// Human-readable error message, present on decline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl GatewayResponse {
    /// Returns true if the charge was approved.
    pub fn is_approved(&self) -> bool {
        self.status == GatewayStatus::Approved
    }
}

/// A refund request for a previously approved transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    /// The gateway transaction to refund.
    pub transaction_id: String,

    /// Amount to refund.
    pub amount: Money,

    /// Operator-facing reason, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The gateway's response to a refund request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundResponse {
    /// Gateway-assigned refund ID.
    pub refund_id: String,

    /// The refunded transaction.
    pub transaction_id: String,

    /// Refunded amount.
    pub amount: Money,

    /// When the refund was processed.
    pub processed_at: DateTime<Utc>,
}

/// Gateway health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayHealth {
    /// Whether the gateway considers itself healthy.
    pub healthy: bool,

    /// Current simulated response latency.
    pub latency_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&GatewayStatus::Approved).unwrap(),
            "\"approved\""
        );
        assert_eq!(
            serde_json::to_string(&GatewayStatus::Declined).unwrap(),
            "\"declined\""
        );
    }

    #[test]
    fn declined_response_carries_error_fields() {
        let response = GatewayResponse {
            transaction_id: "txn-1".to_string(),
            status: GatewayStatus::Declined,
            amount: Money::from_cents(1000),
            processed_at: Utc::now(),
            authorization_code: None,
            error_code: Some("CARD_DECLINED".to_string()),
            error_message: Some("Card declined".to_string()),
        };

        assert!(!response.is_approved());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error_code"], "CARD_DECLINED");
        assert!(json.get("authorization_code").is_none());
    }
}
