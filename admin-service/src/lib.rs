pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{AdminConfig, SwaggerMode};
use crate::middleware::{
    access_gate_middleware, csrf_middleware, no_store_middleware, session_auth_middleware,
};
use crate::services::csrf::CSRF_HEADER;
use crate::services::{AccessPolicy, AuditWriter, AuthService, CsrfGuard, Database, SessionService};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::auth::login,
        handlers::auth::logout,
        handlers::auth::csrf_token,
        handlers::auth::me,
        handlers::auth::change_password,
        handlers::auth::generate_mfa,
        handlers::auth::enable_mfa,
        handlers::auth::disable_mfa,
        handlers::sessions::list_sessions,
        handlers::sessions::revoke_session,
        handlers::cron::session_cleanup,
        handlers::users::list_users,
        handlers::users::create_user,
        handlers::users::get_user,
        handlers::users::update_user,
        handlers::users::delete_user,
        handlers::users::restore_user,
        handlers::roles::list_roles,
        handlers::roles::create_role,
        handlers::roles::list_role_assignments,
        handlers::roles::create_role_assignment,
        handlers::roles::delete_role_assignment,
        handlers::jit::list_jit_requests,
        handlers::jit::create_jit_request,
        handlers::jit::approve_jit_request,
        handlers::jit::deny_jit_request,
        handlers::tenants::list_tenants,
        handlers::tenants::create_tenant,
        handlers::tenants::get_tenant,
        handlers::tenants::update_tenant,
        handlers::tenants::delete_tenant,
        handlers::invoices::list_invoices,
        handlers::invoices::create_invoice,
        handlers::invoices::get_invoice,
        handlers::invoices::delete_invoice,
        handlers::invoices::restore_invoice,
        handlers::proposals::list_proposals,
        handlers::proposals::create_proposal,
        handlers::proposals::get_proposal,
        handlers::proposals::update_proposal,
        handlers::proposals::delete_proposal,
        handlers::leads::list_leads,
        handlers::leads::create_lead,
        handlers::leads::get_lead,
        handlers::leads::update_lead,
        handlers::leads::delete_lead,
        handlers::leads::restore_lead,
        handlers::audit::list_audit_logs,
        handlers::audit::export_audit_logs,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::auth::LoginRequest,
            dtos::auth::LoginResponse,
            dtos::auth::CsrfTokenResponse,
            dtos::auth::ChangePasswordRequest,
            dtos::auth::ChangePasswordResponse,
            dtos::auth::MfaSetupResponse,
            dtos::auth::EnableMfaRequest,
            dtos::auth::EnableMfaResponse,
            dtos::auth::DisableMfaRequest,
            dtos::auth::SessionCleanupResponse,
            dtos::users::CreateUserRequest,
            dtos::users::UpdateUserRequest,
            dtos::access::CreateRoleRequest,
            dtos::access::CreateRoleAssignmentRequest,
            dtos::access::CreateJitRequest,
            dtos::tenants::CreateTenantRequest,
            dtos::tenants::UpdateTenantRequest,
            dtos::billing::InvoiceItemRequest,
            dtos::billing::CreateInvoiceRequest,
            dtos::billing::ProposalItemRequest,
            dtos::billing::CreateProposalRequest,
            dtos::billing::UpdateProposalRequest,
            dtos::leads::CreateLeadRequest,
            dtos::leads::UpdateLeadRequest,
            models::AdminUserResponse,
            models::UserResponse,
            models::RoleResponse,
            models::RoleAssignment,
            models::JitAccessRequest,
            models::JitStatus,
            models::Tenant,
            models::Lead,
            models::LeadStatus,
            models::Invoice,
            models::InvoiceItem,
            models::InvoiceWithItems,
            models::InvoiceStatus,
            models::Proposal,
            models::ProposalItem,
            models::ProposalWithItems,
            models::ProposalStatus,
            models::AuditLog,
            models::SessionResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Login, CSRF tokens, password and MFA"),
        (name = "Sessions", description = "Active sessions of the signed-in admin"),
        (name = "Users", description = "Admin user accounts"),
        (name = "Access control", description = "Roles, assignments and just-in-time access"),
        (name = "Tenants", description = "Client organisations"),
        (name = "Billing", description = "Invoices and proposals"),
        (name = "Leads", description = "Inbound enquiries"),
        (name = "Audit", description = "Append-only audit trail"),
        (name = "Operations", description = "Health and scheduled jobs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("opaque")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "session_cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("admin_session"))),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AdminConfig>,
    pub db: Database,
    pub access_policy: Arc<AccessPolicy>,
    pub csrf: Arc<CsrfGuard>,
    pub auth: AuthService,
    pub sessions: SessionService,
    pub audit: AuditWriter,
    pub metrics: Option<PrometheusHandle>,
    pub ip_rate_limiter: IpRateLimiter,
}

fn admin_api_routes(state: &AppState) -> Router<AppState> {
    use handlers::{audit, auth, invoices, jit, leads, proposals, roles, sessions, tenants, users};

    Router::new()
        .route("/api/admin/me", get(auth::me))
        .route("/api/admin/auth/change-password", post(auth::change_password))
        .route("/api/admin/auth/mfa/generate", post(auth::generate_mfa))
        .route("/api/admin/auth/mfa/enable", post(auth::enable_mfa))
        .route("/api/admin/auth/mfa/disable", post(auth::disable_mfa))
        .route("/api/admin/sessions", get(sessions::list_sessions))
        .route("/api/admin/sessions/:id", delete(sessions::revoke_session))
        .route("/api/admin/users", get(users::list_users).post(users::create_user))
        .route(
            "/api/admin/users/:id",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route("/api/admin/users/:id/restore", post(users::restore_user))
        .route("/api/admin/roles", get(roles::list_roles).post(roles::create_role))
        .route(
            "/api/admin/role-assignments",
            get(roles::list_role_assignments).post(roles::create_role_assignment),
        )
        .route(
            "/api/admin/role-assignments/:id",
            delete(roles::delete_role_assignment),
        )
        .route(
            "/api/admin/jit/requests",
            get(jit::list_jit_requests).post(jit::create_jit_request),
        )
        .route("/api/admin/jit/requests/:id/approve", post(jit::approve_jit_request))
        .route("/api/admin/jit/requests/:id/deny", post(jit::deny_jit_request))
        .route(
            "/api/admin/tenants",
            get(tenants::list_tenants).post(tenants::create_tenant),
        )
        .route(
            "/api/admin/tenants/:id",
            get(tenants::get_tenant)
                .patch(tenants::update_tenant)
                .delete(tenants::delete_tenant),
        )
        .route(
            "/api/admin/invoices",
            get(invoices::list_invoices).post(invoices::create_invoice),
        )
        .route(
            "/api/admin/invoices/:id",
            get(invoices::get_invoice).delete(invoices::delete_invoice),
        )
        .route("/api/admin/invoices/:id/restore", post(invoices::restore_invoice))
        .route(
            "/api/admin/proposals",
            get(proposals::list_proposals).post(proposals::create_proposal),
        )
        .route(
            "/api/admin/proposals/:id",
            get(proposals::get_proposal)
                .patch(proposals::update_proposal)
                .delete(proposals::delete_proposal),
        )
        .route("/api/admin/leads", get(leads::list_leads).post(leads::create_lead))
        .route(
            "/api/admin/leads/:id",
            get(leads::get_lead)
                .patch(leads::update_lead)
                .delete(leads::delete_lead),
        )
        .route("/api/admin/leads/:id/restore", post(leads::restore_lead))
        .route("/api/admin/audit", get(audit::list_audit_logs))
        .route("/api/admin/audit/export", get(audit::export_audit_logs))
        .layer(from_fn_with_state(state.clone(), session_auth_middleware))
        // Outermost: origin and CSRF are checked before the session is resolved
        .layer(from_fn_with_state(state.clone(), csrf_middleware))
}

fn cors_layer(config: &AdminConfig) -> CorsLayer {
    let origins = config
        .security
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::error!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(CSRF_HEADER),
        ])
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let admin_routes = admin_api_routes(&state)
        .route("/api/admin/csrf", get(handlers::auth::csrf_token))
        .layer(from_fn(no_store_middleware));

    let auth_routes = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .layer(from_fn(no_store_middleware));

    let mut app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::health::metrics))
        .route("/api/cron/session-cleanup", post(handlers::cron::session_cleanup));

    let swagger_enabled = !state.config.is_prod() || state.config.swagger.enabled == SwaggerMode::Public;
    if swagger_enabled {
        app = app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { axum::Json(ApiDoc::openapi()) }),
        );
    }

    let ip_limiter = state.ip_rate_limiter.clone();
    let app = app
        .merge(auth_routes)
        .merge(admin_routes)
        .with_state(state.clone())
        .layer(from_fn_with_state(state.clone(), access_gate_middleware))
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config));

    Ok(app)
}
