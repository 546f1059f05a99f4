use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use portfolio::{
    app::build_app,
    auth::{JwtKeys, Role},
    state::AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

const BOUNDARY: &str = "portfolio-test-boundary";

fn admin_cookie(state: &AppState) -> String {
    let token = JwtKeys::from_config(&state.config.jwt)
        .sign(Uuid::new_v4(), Role::Admin)
        .unwrap();
    format!("auth-token={token}")
}

fn multipart(filename: &str, content_type: &str, len: usize) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend(std::iter::repeat(b'x').take(len));
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(cookie: &str, body: Vec<u8>) -> Request<Body> {
    Request::post("/api/upload")
        .header(header::COOKIE, cookie)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

async fn json(res: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn entries(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn oversized_image_is_rejected_without_touching_disk() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::fake(dir.path());
    let cookie = admin_cookie(&state);

    let res = build_app(state)
        .oneshot(upload_request(&cookie, multipart("big.png", "image/png", 6 * 1024 * 1024)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(res).await["success"], false);
    assert_eq!(entries(dir.path()), 0);
}

#[tokio::test]
async fn disallowed_type_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::fake(dir.path());
    let cookie = admin_cookie(&state);

    let res = build_app(state)
        .oneshot(upload_request(&cookie, multipart("run.sh", "application/x-sh", 10)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(entries(dir.path()), 0);
}

#[tokio::test]
async fn pdf_upload_is_served_and_then_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::fake(dir.path());
    let cookie = admin_cookie(&state);
    let app = build_app(state);

    let res = app
        .clone()
        .oneshot(upload_request(&cookie, multipart("My CV (2024).pdf", "application/pdf", 2 * 1024 * 1024)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = json(res).await;
    assert_eq!(body["success"], true);
    let url = body["file"]["url"].as_str().unwrap().to_string();
    let name = body["file"]["name"].as_str().unwrap().to_string();
    assert!(url.starts_with("/uploads/"));
    assert!(name.starts_with("MyCV2024-") && name.ends_with(".pdf"));
    assert_eq!(body["file"]["size"], 2 * 1024 * 1024);
    assert_eq!(body["file"]["type"], "application/pdf");
    assert!(dir.path().join(&name).exists());

    let res = app
        .clone()
        .oneshot(Request::get(&url).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(
            Request::delete(format!("/api/upload?filename={name}"))
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(!dir.path().join(&name).exists());

    let res = app
        .oneshot(
            Request::delete(format!("/api/upload?filename={name}"))
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn traversal_names_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::fake(dir.path());
    let cookie = admin_cookie(&state);

    let res = build_app(state)
        .oneshot(
            Request::delete("/api/upload?filename=..%2Fsecret")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn uploads_require_an_admin() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::fake(dir.path());
    let token = JwtKeys::from_config(&state.config.jwt)
        .sign(Uuid::new_v4(), Role::User)
        .unwrap();

    let res = build_app(state)
        .oneshot(upload_request(&format!("auth-token={token}"), multipart("a.png", "image/png", 10)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(entries(dir.path()), 0);
}
