use sqlx::{postgres::PgRow, Executor, FromRow, Postgres, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

use super::Database;
use crate::models::SoftDelete;
use crate::services::error::ServiceResult;
use crate::services::tenant_scope::TenantFilter;

/// Marks a live row deleted. `None` when it is missing, already deleted,
/// or outside `scope`.
pub(crate) async fn mark_deleted<'e, T, E>(
    executor: E,
    id: Uuid,
    scope: TenantFilter,
    deleted_by: Option<Uuid>,
    reason: Option<String>,
) -> ServiceResult<Option<T>>
where
    T: SoftDelete + for<'r> FromRow<'r, PgRow> + Send + Unpin,
    E: Executor<'e, Database = Postgres>,
{
    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "UPDATE {} SET deleted_at = NOW(), updated_at = NOW(), deleted_by = ",
        T::TABLE
    ));
    qb.push_bind(deleted_by)
        .push(", delete_reason = ")
        .push_bind(reason)
        .push(" WHERE deleted_at IS NULL AND id = ")
        .push_bind(id);
    scope.push_condition(&mut qb, T::TENANT_COLUMN);
    qb.push(" RETURNING *");

    Ok(qb.build_query_as::<T>().fetch_optional(executor).await?)
}

impl Database {
    #[instrument(skip(self, reason), fields(resource = T::RESOURCE))]
    pub async fn soft_delete<T>(
        &self,
        id: Uuid,
        scope: TenantFilter,
        deleted_by: Option<Uuid>,
        reason: Option<String>,
    ) -> ServiceResult<Option<T>>
    where
        T: SoftDelete + for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        mark_deleted::<T, _>(&self.pool, id, scope, deleted_by, reason).await
    }

    /// Clears the delete marker. `None` when the row is missing, live, or
    /// outside `scope`.
    #[instrument(skip(self), fields(resource = T::RESOURCE))]
    pub async fn restore<T>(&self, id: Uuid, scope: TenantFilter) -> ServiceResult<Option<T>>
    where
        T: SoftDelete + for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "UPDATE {} SET deleted_at = NULL, deleted_by = NULL, delete_reason = NULL, \
             updated_at = NOW() WHERE deleted_at IS NOT NULL AND id = ",
            T::TABLE
        ));
        qb.push_bind(id);
        scope.push_condition(&mut qb, T::TENANT_COLUMN);
        qb.push(" RETURNING *");

        Ok(qb.build_query_as::<T>().fetch_optional(&self.pool).await?)
    }

    /// Fetches a live row by id within `scope`.
    pub async fn find_live<T>(&self, id: Uuid, scope: TenantFilter) -> ServiceResult<Option<T>>
    where
        T: SoftDelete + for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT * FROM {} WHERE deleted_at IS NULL AND id = ",
            T::TABLE
        ));
        qb.push_bind(id);
        scope.push_condition(&mut qb, T::TENANT_COLUMN);

        Ok(qb.build_query_as::<T>().fetch_optional(&self.pool).await?)
    }
}
