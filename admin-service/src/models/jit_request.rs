//! Just-in-time elevated access requests.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

pub const MIN_DURATION_MINUTES: i32 = 5;
pub const MAX_DURATION_MINUTES: i32 = 480;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JitStatus {
    Pending,
    Approved,
    Denied,
}

impl JitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JitStatus::Pending => "pending",
            JitStatus::Approved => "approved",
            JitStatus::Denied => "denied",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct JitAccessRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role_id: Option<Uuid>,
    pub reason: String,
    pub duration_minutes: i32,
    pub status: String,
    pub approved_by: Option<Uuid>,
    pub decided_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl JitAccessRequest {
    pub fn new(user_id: Uuid, role_id: Option<Uuid>, reason: String, duration_minutes: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            role_id,
            reason,
            duration_minutes,
            status: JitStatus::Pending.as_str().to_string(),
            approved_by: None,
            decided_at: None,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == JitStatus::Pending.as_str()
    }

    /// Approved and not yet expired at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == JitStatus::Approved.as_str()
            && self.expires_at.map(|e| e > now).unwrap_or(false)
    }

    pub fn expiry_from(&self, approved_at: DateTime<Utc>) -> DateTime<Utc> {
        approved_at + Duration::minutes(self.duration_minutes as i64)
    }
}
