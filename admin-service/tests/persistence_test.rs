//! Database-backed behaviour. Run with
//! `TEST_DATABASE_URL=postgres://... cargo test -- --ignored`.

mod common;

use admin_service::{
    models::{
        Lead, NewInvoice, NewInvoiceItem, Permission, PermissionSet, RevokeReason, Role,
        RoleAssignment, SessionInvalid, Tenant, User,
    },
    services::{
        auth::{LoginAttempt, LoginSuccess},
        mfa, MfaCipher, ServiceError, ServiceResult, TenantFilter,
    },
    utils::{hash_password, Password},
    AppState,
};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use chrono::{NaiveDate, Utc};
use common::{body_json, live_state, unique_slug};
use rust_decimal::Decimal;
use serial_test::serial;
use std::collections::HashSet;
use tower::util::ServiceExt;
use uuid::Uuid;

const PASSWORD: &str = "Quiet-Lantern-Orbit-42";

async fn seed_tenant(state: &AppState) -> Tenant {
    let slug = unique_slug("acme");
    state
        .db
        .insert_tenant(&Tenant::new(slug.clone(), format!("Tenant {}", slug), None))
        .await
        .unwrap()
}

async fn seed_user(state: &AppState, tenant_id: Option<Uuid>, permissions: &[Permission]) -> User {
    let hash = hash_password(&Password::new(PASSWORD.to_string())).unwrap();
    let email = format!("{}@example.com", Uuid::new_v4().simple());
    let user = state
        .db
        .insert_user(&User::new(email, None, Some(hash.as_str().to_string()), tenant_id))
        .await
        .unwrap();

    if !permissions.is_empty() {
        let mut set = PermissionSet::new();
        for p in permissions {
            set.insert(*p);
        }
        let role = state
            .db
            .insert_role(&Role::new(unique_slug("role"), None, &set))
            .await
            .unwrap();
        state
            .db
            .insert_role_assignment(&RoleAssignment::new(user.id, role.id, None, None, None))
            .await
            .unwrap();
    }
    user
}

/// Encrypts a fresh TOTP secret for `user` and returns it with the
/// plaintext backup codes.
async fn enroll_mfa(state: &AppState, user: &User) -> (String, Vec<String>) {
    let secret = mfa::generate_secret();
    let encrypted = MfaCipher::new("integration-test-mfa-key")
        .encrypt(&secret)
        .unwrap();
    let codes = mfa::generate_backup_codes();
    let hashes: Vec<String> = codes.iter().map(|c| mfa::hash_backup_code(c)).collect();
    state.db.set_mfa(user.id, Some(&encrypted), &hashes).await.unwrap();
    (secret, codes)
}

async fn login(
    state: &AppState,
    email: &str,
    password: &str,
    code: Option<&str>,
    ip: &str,
) -> ServiceResult<LoginSuccess> {
    state
        .auth
        .login(LoginAttempt {
            email: email.to_string(),
            password: Password::new(password.to_string()),
            mfa_code: code.map(str::to_string),
            ip_address: Some(ip.to_string()),
            user_agent: Some("integration-test".to_string()),
        })
        .await
}

/// A six-digit code outside the accepted TOTP steps for `secret`.
fn wrong_code(secret: &str) -> String {
    let now = Utc::now().timestamp();
    let current: Vec<String> = (-2..=2)
        .filter_map(|step| mfa::totp_at(secret, now + step * mfa::TOTP_STEP_SECONDS))
        .collect();
    (0..10u32)
        .map(|d| d.to_string().repeat(6))
        .find(|code| !current.contains(code))
        .unwrap()
}

fn invoice(tenant_id: Uuid) -> NewInvoice {
    NewInvoice {
        tenant_id,
        client_name: "Globex".to_string(),
        client_email: None,
        issue_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        due_date: None,
        notes: None,
        items: vec![NewInvoiceItem {
            description: "Retainer".to_string(),
            quantity: Decimal::new(2, 0),
            unit_price: Decimal::new(15000, 2),
        }],
        created_by: None,
    }
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
#[serial]
async fn concurrent_invoices_get_distinct_sequential_numbers() {
    let state = live_state().await;
    let tenant = seed_tenant(&state).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let db = state.db.clone();
        let new = invoice(tenant.id);
        handles.push(tokio::spawn(async move { db.create_invoice(&new).await }));
    }

    let mut numbers = HashSet::new();
    for handle in handles {
        let created = handle.await.unwrap().unwrap();
        assert_eq!(created.invoice.subtotal, Decimal::new(30000, 2));
        numbers.insert(created.invoice.number);
    }

    let prefix = format!("INV-{}-2024-", tenant.slug.to_uppercase());
    let expected: HashSet<String> = (1..=10).map(|n| format!("{}{:04}", prefix, n)).collect();
    assert_eq!(numbers, expected);
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
#[serial]
async fn password_change_revokes_every_session() {
    let state = live_state().await;
    let user = seed_user(&state, None, &[]).await;

    let first = state.sessions.create(user.id, None, None).await.unwrap();
    let second = state.sessions.create(user.id, None, None).await.unwrap();

    let revoked = state
        .auth
        .change_password(
            user.id,
            &Password::new(PASSWORD.to_string()),
            &Password::new("Different-Harbor-Comet-77".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(revoked, 2);

    for token in [first.token, second.token] {
        let err = state.sessions.validate(&token).await.unwrap_err();
        assert!(matches!(err, ServiceError::Session(SessionInvalid::Revoked)), "{:?}", err);
    }
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
#[serial]
async fn reusing_the_current_password_is_refused() {
    let state = live_state().await;
    let user = seed_user(&state, None, &[]).await;

    let err = state
        .auth
        .change_password(
            user.id,
            &Password::new(PASSWORD.to_string()),
            &Password::new(PASSWORD.to_string()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::WeakPassword(_)));
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
#[serial]
async fn oldest_session_is_evicted_past_the_limit() {
    let state = live_state().await;
    let user = seed_user(&state, None, &[]).await;
    let limit = state.config.session.max_concurrent;

    let mut tokens = Vec::new();
    for _ in 0..=limit {
        tokens.push(state.sessions.create(user.id, None, None).await.unwrap().token);
    }

    assert_eq!(state.sessions.list_active(user.id).await.unwrap().len() as i64, limit);
    assert!(state.sessions.validate(&tokens[0]).await.is_err());
    assert!(state.sessions.validate(tokens.last().unwrap()).await.is_ok());

    let newest = state.sessions.list_active(user.id).await.unwrap()[0].id;
    assert!(state.sessions.revoke(newest, user.id, RevokeReason::Manual).await.unwrap());
    assert!(!state.sessions.revoke(newest, user.id, RevokeReason::Manual).await.unwrap());
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
#[serial]
async fn soft_deleted_rows_are_hidden_until_restored() {
    let state = live_state().await;
    let tenant = seed_tenant(&state).await;
    let lead = state
        .db
        .insert_lead(&Lead::new(
            Some(tenant.id),
            "Ada".to_string(),
            "ada@example.com".to_string(),
            None,
            None,
            None,
            None,
        ))
        .await
        .unwrap();

    let deleted = state
        .db
        .soft_delete::<Lead>(lead.id, TenantFilter::Unscoped, None, Some("duplicate".to_string()))
        .await
        .unwrap();
    assert!(deleted.is_some());
    assert!(state
        .db
        .find_live::<Lead>(lead.id, TenantFilter::Unscoped)
        .await
        .unwrap()
        .is_none());

    let restored = state
        .db
        .restore::<Lead>(lead.id, TenantFilter::Tenant(tenant.id))
        .await
        .unwrap();
    assert!(restored.is_some());
    assert!(state
        .db
        .find_live::<Lead>(lead.id, TenantFilter::Tenant(tenant.id))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
#[serial]
async fn tenant_bound_admin_only_sees_own_tenant() {
    let state = live_state().await;
    let own = seed_tenant(&state).await;
    let other = seed_tenant(&state).await;
    let admin = seed_user(&state, Some(own.id), &[Permission::LeadsRead]).await;

    let new_lead = |tenant_id| {
        Lead::new(
            Some(tenant_id),
            "Grace".to_string(),
            "grace@example.com".to_string(),
            None,
            None,
            None,
            None,
        )
    };
    let own_lead = state.db.insert_lead(&new_lead(own.id)).await.unwrap();
    let other_lead = state.db.insert_lead(&new_lead(other.id)).await.unwrap();

    let session = state.sessions.create(admin.id, None, None).await.unwrap();
    let app = admin_service::build_router(state).await.unwrap();
    let get = |uri: String| {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", session.token))
            .body(Body::empty())
            .unwrap()
    };

    let response = app
        .clone()
        .oneshot(get(format!("/api/admin/leads/{}", own_lead.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Foreign rows look absent
    let response = app
        .clone()
        .oneshot(get(format!("/api/admin/leads/{}", other_lead.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Asking for another tenant explicitly is forbidden
    let response = app
        .clone()
        .oneshot(get(format!("/api/admin/leads?tenant_id={}", other.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(get("/api/admin/leads".to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;
    let ids: Vec<&str> = page["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&own_lead.id.to_string().as_str()));
    assert!(!ids.contains(&other_lead.id.to_string().as_str()));

    // Missing permission is a 403
    let response = app
        .oneshot(get("/api/admin/users".to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
#[serial]
async fn login_without_mfa_issues_a_session() {
    let state = live_state().await;
    let user = seed_user(&state, None, &[]).await;

    let err = login(&state, &user.email, "Wrong-Password-123", None, "10.1.0.1")
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ServiceError::InvalidCredentials), "{:?}", err);

    let err = login(&state, "nobody@example.com", PASSWORD, None, "10.1.0.2")
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ServiceError::InvalidCredentials), "{:?}", err);

    let success = login(&state, &user.email.to_uppercase(), PASSWORD, None, "10.1.0.3")
        .await
        .unwrap();
    assert_eq!(success.user.id, user.id);
    let session = state.sessions.validate(&success.session.token).await.unwrap();
    assert_eq!(session.user_id, user.id);
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
#[serial]
async fn enrolled_user_must_present_a_valid_totp() {
    let state = live_state().await;
    let user = seed_user(&state, None, &[]).await;
    let (secret, _) = enroll_mfa(&state, &user).await;

    let err = login(&state, &user.email, PASSWORD, None, "10.2.0.1")
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ServiceError::MfaRequired), "{:?}", err);

    let err = login(&state, &user.email, PASSWORD, Some(&wrong_code(&secret)), "10.2.0.2")
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ServiceError::InvalidMfaCode), "{:?}", err);

    let code = mfa::totp_at(&secret, Utc::now().timestamp()).unwrap();
    let success = login(&state, &user.email, PASSWORD, Some(&code), "10.2.0.3")
        .await
        .unwrap();
    assert!(state.sessions.validate(&success.session.token).await.is_ok());
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
#[serial]
async fn backup_code_works_exactly_once() {
    let state = live_state().await;
    let user = seed_user(&state, None, &[]).await;
    let (_, codes) = enroll_mfa(&state, &user).await;

    assert!(login(&state, &user.email, PASSWORD, Some(&codes[0]), "10.3.0.1")
        .await
        .is_ok());

    let err = login(&state, &user.email, PASSWORD, Some(&codes[0]), "10.3.0.2")
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ServiceError::InvalidMfaCode), "{:?}", err);

    let remaining = state.db.find_user_by_id(user.id).await.unwrap().unwrap();
    assert_eq!(remaining.mfa_backup_codes.len(), codes.len() - 1);

    // Other codes are still good
    assert!(login(&state, &user.email, PASSWORD, Some(&codes[1]), "10.3.0.3")
        .await
        .is_ok());
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
#[serial]
async fn fourth_failed_login_for_one_email_is_rate_limited() {
    let state = live_state().await;
    let user = seed_user(&state, None, &[]).await;

    for ip in ["10.4.0.1", "10.4.0.2", "10.4.0.3"] {
        let err = login(&state, &user.email, "Wrong-Password-123", None, ip)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ServiceError::InvalidCredentials), "{:?}", err);
    }

    // Even the right password is refused once the email bucket is full
    let err = login(&state, &user.email, PASSWORD, None, "10.4.0.4")
        .await
        .err()
        .unwrap();
    assert!(
        matches!(err, ServiceError::RateLimited { retry_after_secs } if retry_after_secs > 0),
        "{:?}",
        err
    );
}
