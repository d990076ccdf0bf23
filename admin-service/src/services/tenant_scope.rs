//! Which tenant's rows a caller may see.

use service_core::error::AppError;
use sqlx::{Postgres, QueryBuilder};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantFilter {
    Unscoped,
    Tenant(Uuid),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TenantScopeError {
    #[error("user bound to tenant {own} requested tenant {requested}")]
    Forbidden { own: Uuid, requested: Uuid },
}

impl From<TenantScopeError> for AppError {
    fn from(err: TenantScopeError) -> Self {
        tracing::warn!(error = %err, "Cross-tenant access denied");
        AppError::Forbidden(anyhow::anyhow!(err))
    }
}

/// Global users (no tenant) may look at any tenant or all of them.
/// Tenant-bound users only ever see their own tenant.
pub fn resolve(
    user_tenant: Option<Uuid>,
    requested: Option<Uuid>,
) -> Result<TenantFilter, TenantScopeError> {
    match (user_tenant, requested) {
        (None, None) => Ok(TenantFilter::Unscoped),
        (None, Some(requested)) => Ok(TenantFilter::Tenant(requested)),
        (Some(own), None) => Ok(TenantFilter::Tenant(own)),
        (Some(own), Some(requested)) if own == requested => Ok(TenantFilter::Tenant(own)),
        (Some(own), Some(requested)) => Err(TenantScopeError::Forbidden { own, requested }),
    }
}

impl TenantFilter {
    pub fn tenant_id(&self) -> Option<Uuid> {
        match self {
            TenantFilter::Unscoped => None,
            TenantFilter::Tenant(id) => Some(*id),
        }
    }

    /// Whether a row owned by `row_tenant` is visible under this filter.
    pub fn permits(&self, row_tenant: Option<Uuid>) -> bool {
        match self {
            TenantFilter::Unscoped => true,
            TenantFilter::Tenant(id) => row_tenant == Some(*id),
        }
    }

    /// Appends ` AND <column> = $n` when scoped. The builder must already
    /// hold a WHERE clause.
    pub fn push_condition(&self, qb: &mut QueryBuilder<'_, Postgres>, column: &str) {
        if let TenantFilter::Tenant(id) = self {
            qb.push(" AND ").push(column).push(" = ").push_bind(*id);
        }
    }
}
