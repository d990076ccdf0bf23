use serde::Deserialize;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

/// Lowercase letters, digits and inner hyphens.
fn valid_slug(slug: &str) -> Result<(), ValidationError> {
    let ok = slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !slug.starts_with('-')
        && !slug.ends_with('-');
    if ok {
        Ok(())
    } else {
        Err(ValidationError::new("slug")
            .with_message("Slug may only contain lowercase letters, digits and hyphens".into()))
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateTenantRequest {
    #[validate(
        length(min = 2, max = 32, message = "Slug must be 2 to 32 characters"),
        custom(function = "valid_slug")
    )]
    #[schema(example = "acme")]
    pub slug: String,

    #[validate(length(min = 1, max = 200))]
    #[schema(example = "Acme Corporation")]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub contact_email: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateTenantRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,

    #[validate(email(message = "Invalid email format"))]
    pub contact_email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_rules() {
        assert!(valid_slug("acme-2").is_ok());
        assert!(valid_slug("Acme").is_err());
        assert!(valid_slug("-acme").is_err());
        assert!(valid_slug("ac me").is_err());
    }
}
