//! Soft-delete marker shared by tenants, users, invoices, proposals and leads.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Entities that are hidden rather than removed.
///
/// Implementors name their table so the repository can issue the generic
/// `deleted_at`/`deleted_by`/`delete_reason` update.
pub trait SoftDelete {
    const TABLE: &'static str;
    const RESOURCE: &'static str;
    /// Column holding the owning tenant, used for scoped access.
    const TENANT_COLUMN: &'static str;

    fn id(&self) -> Uuid;
    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }
}

macro_rules! impl_soft_delete {
    ($ty:ty, $table:literal, $resource:literal, $tenant_column:literal) => {
        impl $crate::models::soft_delete::SoftDelete for $ty {
            const TABLE: &'static str = $table;
            const RESOURCE: &'static str = $resource;
            const TENANT_COLUMN: &'static str = $tenant_column;

            fn id(&self) -> uuid::Uuid {
                self.id
            }

            fn deleted_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
                self.deleted_at
            }
        }
    };
}

pub(crate) use impl_soft_delete;
