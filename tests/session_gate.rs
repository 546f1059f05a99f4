use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use portfolio::{
    app::build_app,
    auth::{JwtKeys, Role},
    config::JwtConfig,
    state::AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

fn app(dir: &std::path::Path) -> (Router, AppState) {
    let state = AppState::fake(dir);
    (build_app(state.clone()), state)
}

fn session_for(state: &AppState, role: Role) -> String {
    let token = JwtKeys::from_config(&state.config.jwt)
        .sign(Uuid::new_v4(), role)
        .unwrap();
    format!("auth-token={token}")
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut req = Request::get(uri);
    if let Some(c) = cookie {
        req = req.header(header::COOKIE, c);
    }
    req.body(Body::empty()).unwrap()
}

fn location(res: &axum::response::Response) -> &str {
    res.headers().get(header::LOCATION).unwrap().to_str().unwrap()
}

#[tokio::test]
async fn admin_page_is_served_to_admins() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = app(dir.path());
    let cookie = session_for(&state, Role::Admin);

    let res = app.oneshot(get("/admin/projects", Some(&cookie))).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.contains("data-user-role=\"ADMIN\""));
}

#[tokio::test]
async fn plain_users_are_sent_to_unauthorized() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = app(dir.path());
    let cookie = session_for(&state, Role::User);

    let res = app.oneshot(get("/admin", Some(&cookie))).await.unwrap();
    assert!(res.status().is_redirection());
    assert_eq!(location(&res), "/unauthorized");
}

#[tokio::test]
async fn missing_cookie_redirects_to_login_with_callback() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = app(dir.path());

    let res = app.oneshot(get("/admin/skills?page=2", None)).await.unwrap();
    assert!(res.status().is_redirection());
    assert_eq!(location(&res), "/login?callbackUrl=%2Fadmin%2Fskills%3Fpage%3D2");
    assert!(res.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn foreign_token_is_cleared_and_redirected() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = app(dir.path());
    let forged = JwtKeys::from_config(&JwtConfig {
        secret: "someone-else".into(),
        issuer: "test-issuer".into(),
        audience: "test-aud".into(),
        ttl_minutes: 5,
    })
    .sign(Uuid::new_v4(), Role::Admin)
    .unwrap();

    let res = app
        .oneshot(get("/admin", Some(&format!("auth-token={forged}"))))
        .await
        .unwrap();
    assert!(res.status().is_redirection());
    assert_eq!(location(&res), "/login?callbackUrl=%2Fadmin");
    let cleared = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cleared.starts_with("auth-token=;"));
    assert!(cleared.contains("Max-Age=0"));
}

#[tokio::test]
async fn public_pages_and_health_need_no_session() {
    let dir = tempfile::tempdir().unwrap();
    for uri in ["/", "/login", "/register", "/unauthorized", "/health"] {
        let (app, _) = app(dir.path());
        let res = app.oneshot(get(uri, None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK, "{uri}");
    }
}

#[tokio::test]
async fn api_routes_answer_401_instead_of_redirecting() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = app(dir.path());

    let res = app.oneshot(get("/api/admin/projects", None)).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], false);
}
