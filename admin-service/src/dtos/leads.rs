use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::models::LeadStatus;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateLeadRequest {
    pub tenant_id: Option<Uuid>,

    #[validate(length(min = 1, max = 200))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(max = 200))]
    pub company: Option<String>,

    #[validate(length(max = 5000))]
    pub message: Option<String>,

    #[validate(length(max = 100))]
    pub budget: Option<String>,

    #[validate(length(max = 100))]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateLeadRequest {
    pub status: Option<LeadStatus>,

    #[validate(length(max = 200))]
    pub company: Option<String>,

    #[validate(length(max = 5000))]
    pub message: Option<String>,

    #[validate(length(max = 100))]
    pub budget: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LeadListQuery {
    pub tenant_id: Option<Uuid>,
    pub status: Option<LeadStatus>,
    #[serde(default)]
    pub include_deleted: bool,
}
