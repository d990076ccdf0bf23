use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{non_negative, positive};
use crate::models::{InvoiceStatus, NewInvoiceItem, NewProposalItem, ProposalStatus};

// ==================== Invoices ====================

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct InvoiceItemRequest {
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    #[validate(custom(function = "positive"))]
    #[schema(value_type = String, example = "2")]
    pub quantity: Decimal,
    #[validate(custom(function = "non_negative"))]
    #[schema(value_type = String, example = "150.00")]
    pub unit_price: Decimal,
}

impl From<InvoiceItemRequest> for NewInvoiceItem {
    fn from(item: InvoiceItemRequest) -> Self {
        Self {
            description: item.description,
            quantity: item.quantity,
            unit_price: item.unit_price,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateInvoiceRequest {
    /// Required for global users; tenant-bound users may omit it.
    pub tenant_id: Option<Uuid>,

    #[validate(length(min = 1, max = 200))]
    pub client_name: String,

    #[validate(email(message = "Invalid email format"))]
    pub client_email: Option<String>,

    /// Defaults to today (UTC). Its year selects the numbering sequence.
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,

    #[validate(length(max = 2000))]
    pub notes: Option<String>,

    #[validate(length(min = 1, max = 200, message = "1 to 200 line items required"), nested)]
    pub items: Vec<InvoiceItemRequest>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct InvoiceListQuery {
    pub tenant_id: Option<Uuid>,
    pub status: Option<InvoiceStatus>,
    #[serde(default)]
    pub include_deleted: bool,
}

// ==================== Proposals ====================

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ProposalItemRequest {
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    #[validate(custom(function = "positive"))]
    #[schema(value_type = String, example = "12.5")]
    pub hours: Decimal,
    #[validate(custom(function = "non_negative"))]
    #[schema(value_type = String, example = "95.00")]
    pub rate: Decimal,
}

impl From<ProposalItemRequest> for NewProposalItem {
    fn from(item: ProposalItemRequest) -> Self {
        Self {
            description: item.description,
            hours: item.hours,
            rate: item.rate,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProposalRequest {
    pub tenant_id: Option<Uuid>,

    #[validate(length(min = 1, max = 200))]
    pub title: String,

    #[validate(email(message = "Invalid email format"))]
    pub client_email: Option<String>,

    pub valid_until: Option<DateTime<Utc>>,

    #[validate(length(max = 2000))]
    pub notes: Option<String>,

    #[serde(default)]
    #[validate(length(max = 200), nested)]
    pub items: Vec<ProposalItemRequest>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProposalRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,

    #[validate(email(message = "Invalid email format"))]
    pub client_email: Option<String>,

    /// `approved` and `rejected` additionally need `proposals.approve`.
    pub status: Option<ProposalStatus>,

    pub valid_until: Option<DateTime<Utc>>,

    #[validate(length(max = 2000))]
    pub notes: Option<String>,

    /// Replaces every existing line item when present.
    #[validate(length(max = 200), nested)]
    pub items: Option<Vec<ProposalItemRequest>>,

    /// Stored with an approval decision.
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProposalListQuery {
    pub tenant_id: Option<Uuid>,
    pub status: Option<ProposalStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_items_are_validated() {
        let body = r#"{
            "client_name": "Client",
            "items": [{"description": "Design", "quantity": "0", "unit_price": "10"}]
        }"#;
        let req: CreateInvoiceRequest = serde_json::from_str(body).unwrap();
        assert!(req.validate().is_err());

        let body = r#"{"client_name": "Client", "items": []}"#;
        let req: CreateInvoiceRequest = serde_json::from_str(body).unwrap();
        assert!(req.validate().is_err());

        let body = r#"{
            "client_name": "Client",
            "items": [{"description": "Design", "quantity": "2", "unit_price": "150.00"}]
        }"#;
        let req: CreateInvoiceRequest = serde_json::from_str(body).unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn proposal_patch_accepts_partial_bodies() {
        let req: UpdateProposalRequest =
            serde_json::from_str(r#"{"status": "pending_approval"}"#).unwrap();
        assert_eq!(req.status, Some(ProposalStatus::PendingApproval));
        assert!(req.items.is_none());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn proposal_items_are_validated_when_replaced() {
        let req: UpdateProposalRequest = serde_json::from_str(
            r#"{"items": [{"description": "Build", "hours": "-1", "rate": "95"}]}"#,
        )
        .unwrap();
        assert!(req.validate().is_err());

        let req: CreateProposalRequest = serde_json::from_str(
            r#"{"title": "Site", "items": [{"description": "Build", "hours": "12.5", "rate": "95.00"}]}"#,
        )
        .unwrap();
        assert!(req.validate().is_ok());
    }
}
