//! Sales proposals and their priced line items.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::soft_delete::impl_soft_delete;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Draft,
    PendingApproval,
    Sent,
    Approved,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Draft => "draft",
            ProposalStatus::PendingApproval => "pending_approval",
            ProposalStatus::Sent => "sent",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Rejected => "rejected",
        }
    }

    /// Approval decisions are recorded separately and need extra permission.
    pub fn is_decision(&self) -> bool {
        matches!(self, ProposalStatus::Approved | ProposalStatus::Rejected)
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Proposal {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub title: String,
    pub client_email: Option<String>,
    pub status: String,
    pub valid_until: Option<DateTime<Utc>>,
    #[schema(value_type = String)]
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub deleted_by: Option<Uuid>,
    #[serde(skip)]
    pub delete_reason: Option<String>,
}

impl_soft_delete!(Proposal, "proposals", "proposal", "tenant_id");

impl Proposal {
    pub fn new(
        tenant_id: Uuid,
        title: String,
        client_email: Option<String>,
        valid_until: Option<DateTime<Utc>>,
        notes: Option<String>,
        created_by: Option<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            title,
            client_email,
            status: ProposalStatus::Draft.as_str().to_string(),
            valid_until,
            total_amount: Decimal::ZERO,
            notes,
            created_by,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            deleted_by: None,
            delete_reason: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct ProposalItem {
    pub id: Uuid,
    pub proposal_id: Uuid,
    pub position: i32,
    pub description: String,
    #[schema(value_type = String)]
    pub hours: Decimal,
    #[schema(value_type = String)]
    pub rate: Decimal,
    #[schema(value_type = String)]
    pub amount: Decimal,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewProposalItem {
    pub description: String,
    #[schema(value_type = String)]
    pub hours: Decimal,
    #[schema(value_type = String)]
    pub rate: Decimal,
}

impl NewProposalItem {
    pub fn amount(&self) -> Decimal {
        (self.hours * self.rate).round_dp(2)
    }
}

pub fn proposal_total(items: &[NewProposalItem]) -> Decimal {
    items.iter().map(NewProposalItem::amount).sum()
}

/// Field changes applied to a proposal in one transaction.
#[derive(Debug, Clone, Default)]
pub struct ProposalChanges {
    pub title: Option<String>,
    pub client_email: Option<String>,
    pub status: Option<ProposalStatus>,
    pub valid_until: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    /// When present, the full replacement set of line items.
    pub items: Option<Vec<NewProposalItem>>,
    pub decision_comment: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProposalWithItems {
    #[serde(flatten)]
    pub proposal: Proposal,
    pub items: Vec<ProposalItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(hours: &str, rate: &str) -> NewProposalItem {
        NewProposalItem {
            description: "work".into(),
            hours: hours.parse().unwrap(),
            rate: rate.parse().unwrap(),
        }
    }

    #[test]
    fn total_is_sum_of_hours_times_rate() {
        let items = vec![item("10", "120"), item("2.5", "80")];
        assert_eq!(proposal_total(&items), "1400".parse::<Decimal>().unwrap());
        assert_eq!(proposal_total(&[]), Decimal::ZERO);
    }

    #[test]
    fn decision_statuses() {
        assert!(ProposalStatus::Approved.is_decision());
        assert!(ProposalStatus::Rejected.is_decision());
        assert!(!ProposalStatus::Sent.is_decision());
        assert_eq!(ProposalStatus::PendingApproval.as_str(), "pending_approval");
    }
}
