use chrono::Datelike;
use sqlx::{Postgres, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

use super::Database;
use crate::models::invoice::format_invoice_number;
use crate::models::{Invoice, InvoiceItem, InvoiceStatus, InvoiceWithItems, NewInvoice};
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::tenant_scope::TenantFilter;
use crate::utils::pagination::PageParams;

impl Database {
    #[instrument(skip(self))]
    pub async fn list_invoices(
        &self,
        scope: TenantFilter,
        status: Option<InvoiceStatus>,
        include_deleted: bool,
        page: &PageParams,
    ) -> ServiceResult<Vec<Invoice>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM invoices WHERE TRUE");
        if !include_deleted {
            qb.push(" AND deleted_at IS NULL");
        }
        if let Some(status) = status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        scope.push_condition(&mut qb, "tenant_id");
        page.push_keyset(&mut qb, "invoices");
        Ok(qb.build_query_as::<Invoice>().fetch_all(&self.pool).await?)
    }

    pub async fn invoice_items(&self, invoice_id: Uuid) -> ServiceResult<Vec<InvoiceItem>> {
        Ok(sqlx::query_as::<_, InvoiceItem>(
            "SELECT * FROM invoice_items WHERE invoice_id = $1 ORDER BY position",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_invoice(&self, id: Uuid, scope: TenantFilter) -> ServiceResult<Option<InvoiceWithItems>> {
        let Some(invoice) = self.find_live::<Invoice>(id, scope).await? else {
            return Ok(None);
        };
        let items = self.invoice_items(invoice.id).await?;
        Ok(Some(InvoiceWithItems { invoice, items }))
    }

    /// Allocates the next `INV-{SLUG}-{YEAR}-{SEQ}` number for the tenant and
    /// issue year and inserts the invoice with its items, all in one
    /// transaction. The upsert on `invoice_sequences` takes a row lock, so
    /// concurrent creates for the same tenant and year queue behind each
    /// other and never share a sequence value.
    #[instrument(skip(self, new), fields(tenant_id = %new.tenant_id, items = new.items.len()))]
    pub async fn create_invoice(&self, new: &NewInvoice) -> ServiceResult<InvoiceWithItems> {
        let mut tx = self.pool.begin().await?;

        let slug = sqlx::query_scalar::<_, String>(
            "SELECT slug FROM tenants WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(new.tenant_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ServiceError::NotFound("Tenant"))?;

        let year = new.issue_date.year();
        let seq = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO invoice_sequences (tenant_id, year, last_seq)
            VALUES ($1, $2, 1)
            ON CONFLICT (tenant_id, year)
            DO UPDATE SET last_seq = invoice_sequences.last_seq + 1
            RETURNING last_seq
            "#,
        )
        .bind(new.tenant_id)
        .bind(year)
        .fetch_one(&mut *tx)
        .await?;

        let number = format_invoice_number(&slug, year, seq);
        let subtotal = new.subtotal();

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices (id, tenant_id, number, client_name, client_email, status,
                                  issue_date, due_date, subtotal, total, notes, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.tenant_id)
        .bind(&number)
        .bind(&new.client_name)
        .bind(&new.client_email)
        .bind(InvoiceStatus::Draft.as_str())
        .bind(new.issue_date)
        .bind(new.due_date)
        .bind(subtotal)
        .bind(subtotal)
        .bind(&new.notes)
        .bind(new.created_by)
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(new.items.len());
        for (position, item) in new.items.iter().enumerate() {
            let inserted = sqlx::query_as::<_, InvoiceItem>(
                r#"
                INSERT INTO invoice_items (id, invoice_id, position, description, quantity, unit_price, amount)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(invoice.id)
            .bind(position as i32)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.amount())
            .fetch_one(&mut *tx)
            .await?;
            items.push(inserted);
        }

        tx.commit().await?;

        tracing::info!(invoice_id = %invoice.id, number = %invoice.number, "Invoice created");
        Ok(InvoiceWithItems { invoice, items })
    }
}
