use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

use super::Database;
use crate::models::proposal::proposal_total;
use crate::models::{
    NewProposalItem, Proposal, ProposalChanges, ProposalItem, ProposalStatus, ProposalWithItems,
};
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::tenant_scope::TenantFilter;
use crate::utils::pagination::PageParams;

async fn insert_items(
    conn: &mut PgConnection,
    proposal_id: Uuid,
    items: &[NewProposalItem],
) -> ServiceResult<Vec<ProposalItem>> {
    let mut inserted = Vec::with_capacity(items.len());
    for (position, item) in items.iter().enumerate() {
        let row = sqlx::query_as::<_, ProposalItem>(
            r#"
            INSERT INTO proposal_items (id, proposal_id, position, description, hours, rate, amount)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(proposal_id)
        .bind(position as i32)
        .bind(&item.description)
        .bind(item.hours)
        .bind(item.rate)
        .bind(item.amount())
        .fetch_one(&mut *conn)
        .await?;
        inserted.push(row);
    }
    Ok(inserted)
}

impl Database {
    #[instrument(skip(self))]
    pub async fn list_proposals(
        &self,
        scope: TenantFilter,
        status: Option<ProposalStatus>,
        page: &PageParams,
    ) -> ServiceResult<Vec<Proposal>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM proposals WHERE deleted_at IS NULL");
        if let Some(status) = status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        scope.push_condition(&mut qb, "tenant_id");
        page.push_keyset(&mut qb, "proposals");
        Ok(qb.build_query_as::<Proposal>().fetch_all(&self.pool).await?)
    }

    pub async fn proposal_items(&self, proposal_id: Uuid) -> ServiceResult<Vec<ProposalItem>> {
        Ok(sqlx::query_as::<_, ProposalItem>(
            "SELECT * FROM proposal_items WHERE proposal_id = $1 ORDER BY position",
        )
        .bind(proposal_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_proposal(&self, id: Uuid, scope: TenantFilter) -> ServiceResult<Option<ProposalWithItems>> {
        let Some(proposal) = self.find_live::<Proposal>(id, scope).await? else {
            return Ok(None);
        };
        let items = self.proposal_items(proposal.id).await?;
        Ok(Some(ProposalWithItems { proposal, items }))
    }

    #[instrument(skip(self, proposal, items), fields(proposal_id = %proposal.id, items = items.len()))]
    pub async fn create_proposal(
        &self,
        proposal: &Proposal,
        items: &[NewProposalItem],
    ) -> ServiceResult<ProposalWithItems> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Proposal>(
            r#"
            INSERT INTO proposals (id, tenant_id, title, client_email, status, valid_until,
                                   total_amount, notes, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(proposal.id)
        .bind(proposal.tenant_id)
        .bind(&proposal.title)
        .bind(&proposal.client_email)
        .bind(&proposal.status)
        .bind(proposal.valid_until)
        .bind(proposal_total(items))
        .bind(&proposal.notes)
        .bind(proposal.created_by)
        .bind(proposal.created_at)
        .bind(proposal.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        let items = insert_items(&mut tx, created.id, items).await?;
        tx.commit().await?;
        Ok(ProposalWithItems {
            proposal: created,
            items,
        })
    }

    /// Applies field changes and, when `items` is given, swaps out the whole
    /// item list and recomputes the total. An approve or reject status also
    /// records an approval row. Everything commits or nothing does.
    #[instrument(skip(self, changes))]
    pub async fn update_proposal(
        &self,
        id: Uuid,
        scope: TenantFilter,
        changes: ProposalChanges,
        actor: Uuid,
    ) -> ServiceResult<ProposalWithItems> {
        let mut tx = self.pool.begin().await?;

        let mut lock = QueryBuilder::<Postgres>::new(
            "SELECT * FROM proposals WHERE deleted_at IS NULL AND id = ",
        );
        lock.push_bind(id);
        scope.push_condition(&mut lock, "tenant_id");
        lock.push(" FOR UPDATE");
        lock.build_query_as::<Proposal>()
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(ServiceError::NotFound("Proposal"))?;

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE proposals SET updated_at = NOW()");
        if let Some(title) = changes.title {
            qb.push(", title = ").push_bind(title);
        }
        if let Some(client_email) = changes.client_email {
            qb.push(", client_email = ").push_bind(client_email);
        }
        if let Some(status) = changes.status {
            qb.push(", status = ").push_bind(status.as_str());
        }
        if let Some(valid_until) = changes.valid_until {
            qb.push(", valid_until = ").push_bind(valid_until);
        }
        if let Some(notes) = changes.notes {
            qb.push(", notes = ").push_bind(notes);
        }
        if let Some(items) = &changes.items {
            qb.push(", total_amount = ").push_bind(proposal_total(items));
        }
        qb.push(" WHERE id = ").push_bind(id).push(" RETURNING *");
        let proposal = qb.build_query_as::<Proposal>().fetch_one(&mut *tx).await?;

        let items = match &changes.items {
            Some(items) => {
                sqlx::query("DELETE FROM proposal_items WHERE proposal_id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                insert_items(&mut tx, id, items).await?
            }
            None => {
                sqlx::query_as::<_, ProposalItem>(
                    "SELECT * FROM proposal_items WHERE proposal_id = $1 ORDER BY position",
                )
                .bind(id)
                .fetch_all(&mut *tx)
                .await?
            }
        };

        if let Some(status) = changes.status.filter(ProposalStatus::is_decision) {
            sqlx::query(
                r#"
                INSERT INTO proposal_approvals (id, proposal_id, decision, approver_id, comment)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(id)
            .bind(status.as_str())
            .bind(actor)
            .bind(&changes.decision_comment)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(ProposalWithItems { proposal, items })
    }
}
