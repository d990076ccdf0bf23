pub mod audit;
pub mod auth;
pub mod cron;
pub mod health;
pub mod invoices;
pub mod jit;
pub mod leads;
pub mod proposals;
pub mod roles;
pub mod sessions;
pub mod tenants;
pub mod users;

use axum_extra::extract::cookie::{Cookie, SameSite};
use service_core::error::AppError;
use uuid::Uuid;

use crate::config::AdminConfig;
use crate::models::{AdminUser, Permission, PermissionSet};
use crate::services::csrf::{CSRF_COOKIE, CSRF_TTL_SECONDS};
use crate::services::tenant_scope::{self, TenantFilter};
use crate::utils::pagination::{PageParams, PageQuery};

/// Row filter for list endpoints, honouring an explicit `tenant_id` query.
pub(crate) fn list_scope(admin: &AdminUser, requested: Option<Uuid>) -> Result<TenantFilter, AppError> {
    Ok(tenant_scope::resolve(admin.tenant_id, requested)?)
}

/// Row filter for by-id access. Rows of other tenants look absent (404).
pub(crate) fn row_scope(admin: &AdminUser) -> TenantFilter {
    admin
        .tenant_id
        .map(TenantFilter::Tenant)
        .unwrap_or(TenantFilter::Unscoped)
}

/// Tenant that a newly created tenant-owned row belongs to.
pub(crate) fn owning_tenant(admin: &AdminUser, requested: Option<Uuid>) -> Result<Uuid, AppError> {
    list_scope(admin, requested)?
        .tenant_id()
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("tenant_id is required")))
}

/// An admin may only hand out permissions they hold themselves.
pub(crate) fn ensure_can_grant(admin: &AdminUser, granted: &PermissionSet) -> Result<(), AppError> {
    let granted: Vec<Permission> = granted.iter().copied().collect();
    match admin.missing(&granted) {
        None => Ok(()),
        Some(missing) => {
            tracing::warn!(user_id = %admin.id, permission = %missing, "Privilege escalation attempt blocked");
            Err(AppError::Forbidden(anyhow::anyhow!(
                "Cannot grant permission {} you do not hold",
                missing
            )))
        }
    }
}

pub(crate) fn page_params(query: PageQuery) -> Result<PageParams, AppError> {
    PageParams::try_from(query)
}

pub(crate) fn not_found(what: &str) -> AppError {
    AppError::NotFound(anyhow::anyhow!("{} not found", what))
}

pub(crate) fn session_cookie(config: &AdminConfig, token: String) -> Cookie<'static> {
    Cookie::build((config.session.cookie_name.clone(), token))
        .http_only(true)
        .secure(config.security.secure_cookies)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(time::Duration::days(config.session.lifetime_days))
        .build()
}

pub(crate) fn expired_session_cookie(config: &AdminConfig) -> Cookie<'static> {
    Cookie::build((config.session.cookie_name.clone(), String::new()))
        .http_only(true)
        .secure(config.security.secure_cookies)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(time::Duration::ZERO)
        .build()
}

pub(crate) fn csrf_cookie(config: &AdminConfig, token: String) -> Cookie<'static> {
    Cookie::build((CSRF_COOKIE, token))
        .http_only(true)
        .secure(config.security.secure_cookies)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(time::Duration::seconds(CSRF_TTL_SECONDS))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin(tenant_id: Option<Uuid>) -> AdminUser {
        AdminUser {
            id: Uuid::new_v4(),
            email: "ops@example.com".into(),
            name: None,
            roles: vec![],
            permissions: PermissionSet::new(),
            tenant_id,
            session_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn owning_tenant_requires_a_tenant_for_global_users() {
        let tenant = Uuid::new_v4();
        assert!(matches!(
            owning_tenant(&admin(None), None),
            Err(AppError::BadRequest(_))
        ));
        assert_eq!(owning_tenant(&admin(None), Some(tenant)).unwrap(), tenant);
        assert_eq!(owning_tenant(&admin(Some(tenant)), None).unwrap(), tenant);
        assert!(matches!(
            owning_tenant(&admin(Some(tenant)), Some(Uuid::new_v4())),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn grants_are_limited_to_held_permissions() {
        let mut holder = admin(None);
        holder.permissions = [Permission::RolesWrite, Permission::UsersRead].into_iter().collect();
        let subset: PermissionSet = [Permission::UsersRead].into_iter().collect();
        let wider: PermissionSet = [Permission::UsersRead, Permission::AuditExport].into_iter().collect();
        assert!(ensure_can_grant(&holder, &subset).is_ok());
        assert!(matches!(ensure_can_grant(&holder, &wider), Err(AppError::Forbidden(_))));

        holder.permissions = [Permission::Wildcard].into_iter().collect();
        assert!(ensure_can_grant(&holder, &wider).is_ok());
    }

    #[test]
    fn row_scope_follows_user_tenant() {
        let tenant = Uuid::new_v4();
        assert_eq!(row_scope(&admin(None)), TenantFilter::Unscoped);
        assert_eq!(row_scope(&admin(Some(tenant))), TenantFilter::Tenant(tenant));
    }
}
