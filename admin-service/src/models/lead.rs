use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::soft_delete::impl_soft_delete;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Won,
    Lost,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Won => "won",
            LeadStatus::Lost => "lost",
        }
    }
}

/// Inbound sales enquiry.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Lead {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub message: Option<String>,
    pub budget: Option<String>,
    pub source: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub deleted_by: Option<Uuid>,
    #[serde(skip)]
    pub delete_reason: Option<String>,
}

impl_soft_delete!(Lead, "leads", "lead", "tenant_id");

impl Lead {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: Option<Uuid>,
        name: String,
        email: String,
        company: Option<String>,
        message: Option<String>,
        budget: Option<String>,
        source: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            name,
            email: email.trim().to_lowercase(),
            company,
            message,
            budget,
            source,
            status: LeadStatus::New.as_str().to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            deleted_by: None,
            delete_reason: None,
        }
    }
}
