//! Fire-and-forget audit trail writes.

use crate::models::{AuditActor, AuditEntry};
use crate::services::database::Database;

#[derive(Clone)]
pub struct AuditWriter {
    db: Database,
}

impl AuditWriter {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Called after the audited change has committed. The insert runs on its
    /// own task; a failure is logged and never reaches the caller.
    pub fn record(&self, actor: &AuditActor, entry: AuditEntry) {
        let log = entry.into_log(actor);
        let db = self.db.clone();
        tokio::spawn(async move {
            match db.insert_audit_log(&log).await {
                Ok(()) => {
                    tracing::debug!(action = %log.action, resource = %log.resource, "Audit log written");
                }
                Err(e) => {
                    metrics::counter!("admin_audit_write_failures_total").increment(1);
                    tracing::error!(
                        error = %e,
                        action = %log.action,
                        resource = %log.resource,
                        resource_id = ?log.resource_id,
                        actor_id = ?log.actor_id,
                        "Failed to write audit log"
                    );
                }
            }
        });
    }
}
