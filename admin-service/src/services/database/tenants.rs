use sqlx::{Postgres, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

use super::Database;
use crate::models::Tenant;
use crate::services::error::ServiceResult;
use crate::services::tenant_scope::TenantFilter;
use crate::utils::pagination::PageParams;

#[derive(Debug, Default)]
pub struct TenantChanges {
    pub name: Option<String>,
    pub contact_email: Option<String>,
}

impl Database {
    #[instrument(skip(self))]
    pub async fn list_tenants(&self, scope: TenantFilter, page: &PageParams) -> ServiceResult<Vec<Tenant>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM tenants WHERE deleted_at IS NULL");
        scope.push_condition(&mut qb, "id");
        page.push_keyset(&mut qb, "tenants");
        Ok(qb.build_query_as::<Tenant>().fetch_all(&self.pool).await?)
    }

    pub async fn find_tenant_by_slug(&self, slug: &str) -> ServiceResult<Option<Tenant>> {
        Ok(sqlx::query_as::<_, Tenant>(
            "SELECT * FROM tenants WHERE slug = LOWER($1) AND deleted_at IS NULL",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?)
    }

    #[instrument(skip(self, tenant), fields(tenant_id = %tenant.id, slug = %tenant.slug))]
    pub async fn insert_tenant(&self, tenant: &Tenant) -> ServiceResult<Tenant> {
        Ok(sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants (id, slug, name, contact_email, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(tenant.id)
        .bind(&tenant.slug)
        .bind(&tenant.name)
        .bind(&tenant.contact_email)
        .bind(tenant.created_at)
        .bind(tenant.updated_at)
        .fetch_one(&self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    pub async fn update_tenant(
        &self,
        id: Uuid,
        scope: TenantFilter,
        changes: TenantChanges,
    ) -> ServiceResult<Option<Tenant>> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE tenants SET updated_at = NOW()");
        if let Some(name) = changes.name {
            qb.push(", name = ").push_bind(name);
        }
        if let Some(email) = changes.contact_email {
            qb.push(", contact_email = ").push_bind(email);
        }
        qb.push(" WHERE deleted_at IS NULL AND id = ").push_bind(id);
        scope.push_condition(&mut qb, "id");
        qb.push(" RETURNING *");
        Ok(qb.build_query_as::<Tenant>().fetch_optional(&self.pool).await?)
    }
}
