use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::models::{JitStatus, Permission};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateRoleRequest {
    #[validate(length(min = 2, max = 64, message = "Name must be 2 to 64 characters"))]
    #[schema(example = "billing-manager")]
    pub name: String,

    #[validate(length(max = 500))]
    pub description: Option<String>,

    #[validate(length(min = 1, message = "At least one permission is required"))]
    #[schema(value_type = Vec<String>, example = json!(["invoices.read", "invoices.write"]))]
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateRoleAssignmentRequest {
    pub user_id: Uuid,
    pub role_id: Uuid,
    #[validate(length(min = 1, max = 32))]
    pub scope_type: Option<String>,
    pub scope_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RoleAssignmentQuery {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateJitRequest {
    /// Role granted while the request is active. A request without a role
    /// grants nothing.
    pub role_id: Option<Uuid>,

    #[validate(length(min = 10, max = 1000, message = "Reason must be 10 to 1000 characters"))]
    pub reason: String,

    #[validate(range(min = 5, max = 480, message = "Duration must be between 5 and 480 minutes"))]
    pub duration_minutes: i32,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct JitListQuery {
    pub user_id: Option<Uuid>,
    pub status: Option<JitStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::jit_request::{MAX_DURATION_MINUTES, MIN_DURATION_MINUTES};

    #[test]
    fn jit_bounds() {
        let mut req = CreateJitRequest {
            role_id: None,
            reason: "Investigating incident 4411".into(),
            duration_minutes: MIN_DURATION_MINUTES,
        };
        assert!(req.validate().is_ok());
        req.duration_minutes = MAX_DURATION_MINUTES + 1;
        assert!(req.validate().is_err());
        req.duration_minutes = 60;
        req.reason = "too short".into();
        assert!(req.validate().is_err());
    }

    #[test]
    fn unknown_permission_is_rejected_at_parse() {
        let body = r#"{"name":"x-role","permissions":["users.read","root.everything"]}"#;
        assert!(serde_json::from_str::<CreateRoleRequest>(body).is_err());
    }
}
