//! PostgreSQL access for the admin service.
//!
//! One `impl Database` block per resource. Queries are runtime-checked
//! (`sqlx::query_as::<_, T>`) so the crate builds without a live database.

mod audit;
mod invoices;
mod jit;
mod leads;
mod proposals;
mod roles;
mod sessions;
mod soft_delete;
mod tenants;
mod users;

pub use audit::AuditFilter;
pub use leads::LeadChanges;
pub use tenants::TenantChanges;
pub use users::UserChanges;

use sqlx::postgres::PgPool;
use tracing::instrument;

use crate::services::error::ServiceResult;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self))]
    pub async fn health_check(&self) -> ServiceResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(|e| {
            tracing::error!("Database health check failed: {}", e);
            e
        })?;
        Ok(())
    }
}
