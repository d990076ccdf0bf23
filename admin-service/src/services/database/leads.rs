use sqlx::{Postgres, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

use super::Database;
use crate::models::{Lead, LeadStatus};
use crate::services::error::ServiceResult;
use crate::services::tenant_scope::TenantFilter;
use crate::utils::pagination::PageParams;

#[derive(Debug, Default)]
pub struct LeadChanges {
    pub status: Option<LeadStatus>,
    pub company: Option<String>,
    pub message: Option<String>,
    pub budget: Option<String>,
}

impl Database {
    #[instrument(skip(self))]
    pub async fn list_leads(
        &self,
        scope: TenantFilter,
        status: Option<LeadStatus>,
        include_deleted: bool,
        page: &PageParams,
    ) -> ServiceResult<Vec<Lead>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM leads WHERE TRUE");
        if !include_deleted {
            qb.push(" AND deleted_at IS NULL");
        }
        if let Some(status) = status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        scope.push_condition(&mut qb, "tenant_id");
        page.push_keyset(&mut qb, "leads");
        Ok(qb.build_query_as::<Lead>().fetch_all(&self.pool).await?)
    }

    #[instrument(skip(self, lead), fields(lead_id = %lead.id))]
    pub async fn insert_lead(&self, lead: &Lead) -> ServiceResult<Lead> {
        Ok(sqlx::query_as::<_, Lead>(
            r#"
            INSERT INTO leads (id, tenant_id, name, email, company, message, budget, source, status,
                               created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(lead.id)
        .bind(lead.tenant_id)
        .bind(&lead.name)
        .bind(&lead.email)
        .bind(&lead.company)
        .bind(&lead.message)
        .bind(&lead.budget)
        .bind(&lead.source)
        .bind(&lead.status)
        .bind(lead.created_at)
        .bind(lead.updated_at)
        .fetch_one(&self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    pub async fn update_lead(
        &self,
        id: Uuid,
        scope: TenantFilter,
        changes: LeadChanges,
    ) -> ServiceResult<Option<Lead>> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE leads SET updated_at = NOW()");
        if let Some(status) = changes.status {
            qb.push(", status = ").push_bind(status.as_str());
        }
        if let Some(company) = changes.company {
            qb.push(", company = ").push_bind(company);
        }
        if let Some(message) = changes.message {
            qb.push(", message = ").push_bind(message);
        }
        if let Some(budget) = changes.budget {
            qb.push(", budget = ").push_bind(budget);
        }
        qb.push(" WHERE deleted_at IS NULL AND id = ").push_bind(id);
        scope.push_condition(&mut qb, "tenant_id");
        qb.push(" RETURNING *");
        Ok(qb.build_query_as::<Lead>().fetch_optional(&self.pool).await?)
    }
}
