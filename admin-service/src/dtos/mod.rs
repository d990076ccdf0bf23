pub mod access;
pub mod auth;
pub mod billing;
pub mod leads;
pub mod tenants;
pub mod users;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "Forbidden")]
    pub error: String,
}

/// Optional reason stored with a soft delete.
#[derive(Debug, Default, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeleteQuery {
    #[validate(length(max = 500, message = "Reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

/// Distinguishes an absent field from an explicit `null`.
pub(crate) fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub(crate) fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        return Err(ValidationError::new("non_negative").with_message("Must not be negative".into()));
    }
    Ok(())
}

pub(crate) fn positive(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(ValidationError::new("positive").with_message("Must be greater than zero".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        tenant_id: Option<Option<Uuid>>,
    }

    #[test]
    fn double_option_separates_null_from_absent() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.tenant_id, None);
        let null: Patch = serde_json::from_str(r#"{"tenant_id":null}"#).unwrap();
        assert_eq!(null.tenant_id, Some(None));
        let id = Uuid::new_v4();
        let set: Patch = serde_json::from_str(&format!(r#"{{"tenant_id":"{}"}}"#, id)).unwrap();
        assert_eq!(set.tenant_id, Some(Some(id)));
    }

    #[test]
    fn decimal_checks() {
        assert!(positive(&Decimal::ONE).is_ok());
        assert!(positive(&Decimal::ZERO).is_err());
        assert!(non_negative(&Decimal::ZERO).is_ok());
        assert!(non_negative(&Decimal::NEGATIVE_ONE).is_err());
    }
}
