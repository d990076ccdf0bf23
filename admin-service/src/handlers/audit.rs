use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::{SecondsFormat, Utc};
use service_core::error::AppError;

use super::page_params;
use crate::{
    dtos::ErrorResponse,
    middleware::{AuthAdmin, RequestMeta},
    models::{AdminUser, AuditEntry, AuditLog, Permission},
    services::database::AuditFilter,
    utils::{Page, PageQuery},
    AppState,
};

const CSV_HEADER: &str = "id,created_at,actor_id,actor_email,action,resource,resource_id,ip_address,user_agent,before,after";

/// Audit rows carry no tenant, so only global admins may read them.
fn require_global(admin: &AdminUser) -> Result<(), AppError> {
    if admin.tenant_id.is_some() {
        tracing::warn!(user_id = %admin.id, "Tenant-bound admin attempted to read the audit log");
        return Err(AppError::Forbidden(anyhow::anyhow!("Forbidden")));
    }
    Ok(())
}

/// Quotes a CSV field when needed and defuses spreadsheet formulas.
fn csv_field(value: &str) -> String {
    let value = if value.starts_with(['=', '+', '-', '@', '\t', '\r']) {
        format!("'{}", value)
    } else {
        value.to_string()
    };
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value
    }
}

fn csv_row(log: &AuditLog) -> String {
    let json = |v: &Option<serde_json::Value>| v.as_ref().map(|v| v.to_string()).unwrap_or_default();
    [
        log.id.to_string(),
        log.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        log.actor_id.map(|id| id.to_string()).unwrap_or_default(),
        log.actor_email.clone().unwrap_or_default(),
        log.action.clone(),
        log.resource.clone(),
        log.resource_id.clone().unwrap_or_default(),
        log.ip_address.clone().unwrap_or_default(),
        log.user_agent.clone().unwrap_or_default(),
        json(&log.before),
        json(&log.after),
    ]
    .iter()
    .map(|f| csv_field(f))
    .collect::<Vec<_>>()
    .join(",")
}

fn to_csv(logs: &[AuditLog]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + logs.len() * 256);
    out.push_str(CSV_HEADER);
    out.push_str("\r\n");
    for log in logs {
        out.push_str(&csv_row(log));
        out.push_str("\r\n");
    }
    out
}

#[utoipa::path(
    get,
    path = "/api/admin/audit",
    params(AuditFilter, PageQuery),
    responses(
        (status = 200, description = "Page of audit entries, newest first"),
        (status = 403, description = "Forbidden", body = ErrorResponse)
    ),
    tag = "Audit",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Query(filter): Query<AuditFilter>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<AuditLog>>, AppError> {
    let admin = admin.require(&[Permission::AuditRead])?;
    require_global(admin)?;
    let params = page_params(page)?;
    let rows = state.db.list_audit_logs(&filter, &params).await?;
    Ok(Json(Page::from_rows(rows, &params, |l| l.id)))
}

#[utoipa::path(
    get,
    path = "/api/admin/audit/export",
    params(AuditFilter),
    responses(
        (status = 200, description = "CSV attachment", content_type = "text/csv"),
        (status = 403, description = "Forbidden", body = ErrorResponse)
    ),
    tag = "Audit",
    security(("session_cookie" = []), ("bearer_auth" = []))
)]
pub async fn export_audit_logs(
    State(state): State<AppState>,
    admin: AuthAdmin,
    meta: RequestMeta,
    Query(filter): Query<AuditFilter>,
) -> Result<impl IntoResponse, AppError> {
    let admin = admin.require(&[Permission::AuditExport])?;
    require_global(admin)?;

    let logs = state.db.export_audit_logs(&filter).await?;
    tracing::info!(user_id = %admin.id, rows = logs.len(), "Audit log exported");
    state.audit.record(
        &meta.actor(admin),
        AuditEntry::new("audit.export", "audit_log").after(&serde_json::json!({
            "rows": logs.len(),
            "resource": filter.resource,
            "action": filter.action,
            "actor_id": filter.actor_id,
            "from": filter.from,
            "to": filter.to,
        })),
    );

    let filename = format!("audit-{}.csv", Utc::now().format("%Y%m%d-%H%M%S"));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        to_csv(&logs),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn fields_are_quoted_only_when_needed() {
        assert_eq!(csv_field("user.create"), "user.create");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn formulas_are_neutralised() {
        assert_eq!(csv_field("=HYPERLINK(\"x\")"), "\"'=HYPERLINK(\"\"x\"\")\"");
        assert_eq!(csv_field("@SUM(A1)"), "'@SUM(A1)");
    }

    #[test]
    fn export_has_header_and_one_line_per_row() {
        let log = AuditLog {
            id: Uuid::new_v4(),
            actor_id: None,
            actor_email: Some("ops@example.com".into()),
            action: "lead.update".into(),
            resource: "lead".into(),
            resource_id: Some("42".into()),
            before: Some(serde_json::json!({"status": "new"})),
            after: Some(serde_json::json!({"status": "won"})),
            ip_address: Some("203.0.113.9".into()),
            user_agent: None,
            created_at: Utc::now(),
        };
        let csv = to_csv(&[log.clone(), log]);
        let lines: Vec<&str> = csv.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].contains("\"{\"\"status\"\":\"\"new\"\"}\""));
    }
}
