//! Staff administration: forced logout, soft delete, role changes.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::{
    body::Body,
    http::{Request, Response, StatusCode, header},
};

use miniapp_core::{AccountId, ExternalId, IdentityStore, Role};
use miniapp_integration_tests::{TestApp, body_json};

/// Seed an account with `role` and log it in.
async fn staff(app: &TestApp, external_id: i64, role: Role) -> String {
    app.store
        .create_account(ExternalId::new(external_id), role)
        .await
        .unwrap();
    app.login(external_id).await
}

async fn account_id(app: &TestApp, external_id: i64) -> AccountId {
    app.store
        .account_by_external_id(ExternalId::new(external_id))
        .await
        .unwrap()
        .unwrap()
        .id
}

async fn call(
    app: &TestApp,
    method: &str,
    path: &str,
    token: &str,
    body: Option<&str>,
) -> Response<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(path)
        .header(header::AUTHORIZATION, format!("Bearer {token}"));
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_owned())),
        None => builder.body(Body::empty()),
    };
    app.send(request.unwrap()).await
}

#[tokio::test]
async fn test_revoke_requires_manager_or_root() {
    let app = TestApp::new();
    let target_token = app.login(3001).await;
    let target = account_id(&app, 3001).await;
    let path = format!("/api/admin/accounts/{target}/revoke");

    let user = app.login(3002).await;
    let response = call(&app, "POST", &path, &user, None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "ROLE_INSUFFICIENT");

    let support = staff(&app, 3003, Role::PlatformSupport).await;
    let response = call(&app, "POST", &path, &support, None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Target still works until a manager steps in
    let response = app.get("/api/auth/me", Some(&target_token), &[]).await;
    assert_eq!(response.status(), StatusCode::OK);

    let manager = staff(&app, 3004, Role::PlatformManager).await;
    let response = call(&app, "POST", &path, &manager, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["data"]["accountId"],
        target.to_string()
    );

    let response = app.get("/api/auth/me", Some(&target_token), &[]).await;
    assert_eq!(body_json(response).await["error"], "CREDENTIAL_REVOKED");
}

#[tokio::test]
async fn test_manager_cannot_revoke_root_admin() {
    let app = TestApp::new();
    let root_token = staff(&app, 3005, Role::RootAdmin).await;
    let root = account_id(&app, 3005).await;
    let manager_token = staff(&app, 3006, Role::PlatformManager).await;
    let manager = account_id(&app, 3006).await;

    let response = call(
        &app,
        "POST",
        &format!("/api/admin/accounts/{root}/revoke"),
        &manager_token,
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "ROLE_INSUFFICIENT");

    let response = app.get("/api/auth/me", Some(&root_token), &[]).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Downward and peer revocation still work
    let peer_token = staff(&app, 3007, Role::PlatformManager).await;
    let response = call(
        &app,
        "POST",
        &format!("/api/admin/accounts/{manager}/revoke"),
        &peer_token,
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = call(
        &app,
        "POST",
        &format!("/api/admin/accounts/{root}/revoke"),
        &root_token,
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.get("/api/auth/me", Some(&root_token), &[]).await;
    assert_eq!(body_json(response).await["error"], "CREDENTIAL_REVOKED");
}

#[tokio::test]
async fn test_delete_revokes_and_blocks_login() {
    let app = TestApp::new();
    let target_token = app.login(3010).await;
    let target = account_id(&app, 3010).await;
    let root = staff(&app, 3011, Role::RootAdmin).await;

    let manager = staff(&app, 3012, Role::PlatformManager).await;
    let response = call(
        &app,
        "DELETE",
        &format!("/api/admin/accounts/{target}"),
        &manager,
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = call(
        &app,
        "DELETE",
        &format!("/api/admin/accounts/{target}"),
        &root,
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get("/api/auth/me", Some(&target_token), &[]).await;
    assert_eq!(body_json(response).await["error"], "CREDENTIAL_REVOKED");

    let response = app.login_request(&app.init_data(3010), &[]).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Already gone
    let response = call(
        &app,
        "DELETE",
        &format!("/api/admin/accounts/{target}"),
        &root,
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_role_change_takes_effect_on_next_login() {
    let app = TestApp::new();
    let old_token = app.login(3020).await;
    let target = account_id(&app, 3020).await;
    let root = staff(&app, 3021, Role::RootAdmin).await;
    let path = format!("/api/admin/accounts/{target}/role");

    let response = call(&app, "PUT", &path, &root, Some(r#"{"role":"platform-support"}"#)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["role"], "platform-support");

    let response = app.get("/api/auth/me", Some(&old_token), &[]).await;
    assert_eq!(body_json(response).await["error"], "CREDENTIAL_REVOKED");

    let new_token = app.login(3020).await;
    let response = app.get("/api/auth/me", Some(&new_token), &[]).await;
    let body = body_json(response).await;
    assert_eq!(body["data"]["principal"]["role"], "platform-support");
    assert_eq!(body["data"]["principal"]["isStaff"], true);

    let stored = app.store.account(target).await.unwrap().unwrap();
    assert_eq!(stored.role, Role::PlatformSupport);
}

#[tokio::test]
async fn test_role_change_rejects_bad_input() {
    let app = TestApp::new();
    app.login(3030).await;
    let target = account_id(&app, 3030).await;
    let root = staff(&app, 3031, Role::RootAdmin).await;
    let path = format!("/api/admin/accounts/{target}/role");

    for body in [r#"{"role":"superuser"}"#, r#"{"role":"Root Admin"}"#, "not json"] {
        let response = call(&app, "PUT", &path, &root, Some(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(body_json(response).await["error"], "INVALID_REQUEST");
    }

    let response = call(
        &app,
        "PUT",
        "/api/admin/accounts/not-an-id/role",
        &root,
        Some(r#"{"role":"end-user"}"#),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let missing = AccountId::generate();
    let response = call(
        &app,
        "PUT",
        &format!("/api/admin/accounts/{missing}/role"),
        &root,
        Some(r#"{"role":"end-user"}"#),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "NOT_FOUND");
}
