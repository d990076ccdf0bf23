mod common;

use admin_service::config::{AccessPolicyConfig, GeoConfig, IpAllowlistConfig};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::{body_json, offline_app, test_config};
use tower::util::ServiceExt;

fn ip_restricted() -> AccessPolicyConfig {
    AccessPolicyConfig {
        ip_allowlist: IpAllowlistConfig {
            enabled: true,
            allowed_ips: vec!["198.51.100.10".to_string()],
            allowed_cidrs: vec!["10.0.0.0/8".to_string()],
            trusted_proxy_hops: 0,
        },
        ..AccessPolicyConfig::default()
    }
}

fn get(uri: &str, ip: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(ip) = ip {
        builder = builder.header("x-forwarded-for", ip);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn api_request_from_unlisted_ip_gets_403_with_reason() {
    let mut config = test_config();
    config.access = ip_restricted();
    let app = offline_app(config).await;

    let response = app
        .oneshot(get("/api/admin/users", Some("203.0.113.5")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["reason"], "IP_BLOCKED");
}

#[tokio::test]
async fn page_request_from_unlisted_ip_is_redirected_to_error_page() {
    let mut config = test_config();
    config.access = ip_restricted();
    let app = offline_app(config).await;

    let response = app
        .oneshot(get("/admin/dashboard", Some("203.0.113.5")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/admin/error?error=IP_BLOCKED"
    );
}

#[tokio::test]
async fn listed_ip_and_cidr_member_pass_the_gate() {
    let mut config = test_config();
    config.access = ip_restricted();
    let app = offline_app(config).await;

    // Past the gate, the missing session is what stops the request
    for ip in ["198.51.100.10", "10.42.7.1"] {
        let response = app
            .clone()
            .oneshot(get("/api/admin/users", Some(ip)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "ip {}", ip);
    }
}

#[tokio::test]
async fn unknown_client_address_is_denied_when_allowlist_is_on() {
    let mut config = test_config();
    config.access = ip_restricted();
    let app = offline_app(config).await;

    let response = app.oneshot(get("/api/admin/users", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn trusted_proxy_hops_ignore_spoofed_forwarded_entries() {
    let mut config = test_config();
    config.access = ip_restricted();
    config.access.ip_allowlist.trusted_proxy_hops = 1;
    let app = offline_app(config).await;

    // The client prepended an allowlisted address; the proxy appended the real one
    let response = app
        .clone()
        .oneshot(get("/api/admin/users", Some("198.51.100.10, 203.0.113.5")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(get("/api/admin/users", Some("203.0.113.5, 198.51.100.10")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_and_error_pages_are_never_gated() {
    let mut config = test_config();
    config.access = ip_restricted();
    let app = offline_app(config).await;

    for path in ["/admin/login", "/admin/error"] {
        let response = app
            .clone()
            .oneshot(get(path, Some("203.0.113.5")))
            .await
            .unwrap();
        assert_ne!(response.status(), StatusCode::TEMPORARY_REDIRECT, "{}", path);
        assert_ne!(response.status(), StatusCode::FORBIDDEN, "{}", path);
    }
}

#[tokio::test]
async fn non_admin_routes_ignore_the_policy() {
    let mut config = test_config();
    config.access = ip_restricted();
    let app = offline_app(config).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/cron/session-cleanup")
                .header("x-forwarded-for", "203.0.113.5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Rejected by the cron secret check, not the gate
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn blocked_country_is_denied_and_unknown_country_allowed() {
    let mut config = test_config();
    config.access = AccessPolicyConfig {
        geo: GeoConfig {
            enabled: true,
            blocked_countries: vec!["KP".to_string()],
            ..GeoConfig::default()
        },
        ..AccessPolicyConfig::default()
    };
    let app = offline_app(config).await;

    let blocked = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/admin/users")
                .header("x-forwarded-for", "203.0.113.5")
                .header("cf-ipcountry", "KP")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(blocked.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(blocked).await["reason"], "GEO_BLOCKED");

    let unknown = app
        .oneshot(
            Request::builder()
                .uri("/api/admin/users")
                .header("x-forwarded-for", "203.0.113.5")
                .header("cf-ipcountry", "XX")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn disabled_policy_allows_everyone() {
    let app = offline_app(test_config()).await;

    let response = app
        .oneshot(get("/api/admin/users", Some("203.0.113.5")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
