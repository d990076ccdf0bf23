//! Invoice model with per-tenant yearly numbering.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::soft_delete::impl_soft_delete;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Void => "void",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Invoice {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub number: String,
    pub client_name: String,
    pub client_email: Option<String>,
    pub status: String,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    #[schema(value_type = String)]
    pub subtotal: Decimal,
    #[schema(value_type = String)]
    pub total: Decimal,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub deleted_by: Option<Uuid>,
    #[serde(skip)]
    pub delete_reason: Option<String>,
}

impl_soft_delete!(Invoice, "invoices", "invoice", "tenant_id");

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct InvoiceItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub position: i32,
    pub description: String,
    #[schema(value_type = String)]
    pub quantity: Decimal,
    #[schema(value_type = String)]
    pub unit_price: Decimal,
    #[schema(value_type = String)]
    pub amount: Decimal,
}

/// Line item as submitted, before it is numbered and priced.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewInvoiceItem {
    pub description: String,
    #[schema(value_type = String)]
    pub quantity: Decimal,
    #[schema(value_type = String)]
    pub unit_price: Decimal,
}

impl NewInvoiceItem {
    pub fn amount(&self) -> Decimal {
        (self.quantity * self.unit_price).round_dp(2)
    }
}

/// Invoice fields that do not depend on the allocated number.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub tenant_id: Uuid,
    pub client_name: String,
    pub client_email: Option<String>,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub items: Vec<NewInvoiceItem>,
    pub created_by: Option<Uuid>,
}

impl NewInvoice {
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(NewInvoiceItem::amount).sum()
    }
}

/// `INV-{SLUG}-{YEAR}-{SEQ}` with the sequence zero-padded to four digits.
pub fn format_invoice_number(tenant_slug: &str, year: i32, seq: i32) -> String {
    format!("INV-{}-{}-{:04}", tenant_slug.to_uppercase(), year, seq)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvoiceWithItems {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn invoice_number_format() {
        assert_eq!(format_invoice_number("acme", 2024, 7), "INV-ACME-2024-0007");
        assert_eq!(format_invoice_number("acme", 2024, 12345), "INV-ACME-2024-12345");
    }

    #[test]
    fn subtotal_sums_rounded_lines() {
        let invoice = NewInvoice {
            tenant_id: Uuid::new_v4(),
            client_name: "Client".into(),
            client_email: None,
            issue_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            due_date: None,
            notes: None,
            items: vec![
                NewInvoiceItem {
                    description: "Design".into(),
                    quantity: dec("2"),
                    unit_price: dec("150.00"),
                },
                NewInvoiceItem {
                    description: "Hosting".into(),
                    quantity: dec("1.5"),
                    unit_price: dec("33.33"),
                },
            ],
            created_by: None,
        };
        assert_eq!(invoice.subtotal(), dec("350.00"));
    }
}
