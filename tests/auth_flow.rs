//! End-to-end flows against a real Postgres. Run with
//! `DATABASE_URL=postgres://... cargo test -- --ignored`.
//!
//! Each test migrates its own schema so "first account" rules start from an
//! empty users table.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use portfolio::{app::build_app, state::AppState};
use sqlx::{postgres::PgPoolOptions, Executor, PgPool};
use tokio::task::JoinSet;
use tower::ServiceExt;
use uuid::Uuid;

struct LiveApp {
    app: Router,
    admin_db: PgPool,
    schema: String,
    _dir: tempfile::TempDir,
}

impl LiveApp {
    async fn fresh() -> Self {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for ignored tests");
        let schema = format!("portfolio_test_{}", Uuid::new_v4().simple());

        let admin_db = PgPool::connect(&url).await.unwrap();
        admin_db
            .execute(format!("CREATE SCHEMA {schema}").as_str())
            .await
            .unwrap();

        let search_path = format!("SET search_path TO {schema}, public");
        let db = PgPoolOptions::new()
            .max_connections(10)
            .after_connect(move |conn, _meta| {
                let sql = search_path.clone();
                Box::pin(async move {
                    conn.execute(sql.as_str()).await?;
                    Ok(())
                })
            })
            .connect(&url)
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&db).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let mut state = AppState::fake(dir.path());
        state.db = db;
        Self {
            app: build_app(state),
            admin_db,
            schema,
            _dir: dir,
        }
    }

    async fn send(&self, req: Request<Body>) -> Response {
        self.app.clone().oneshot(req).await.unwrap()
    }

    async fn drop_schema(self) {
        self.admin_db
            .execute(format!("DROP SCHEMA {} CASCADE", self.schema).as_str())
            .await
            .unwrap();
    }
}

fn post_json(uri: &str, body: serde_json::Value, cookie: Option<&str>) -> Request<Body> {
    let mut req = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(c) = cookie {
        req = req.header(header::COOKIE, c);
    }
    req.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, cookie: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

fn register(email: &str, name: &str) -> Request<Body> {
    post_json(
        "/api/auth/register",
        serde_json::json!({"email": email, "password": "correct-horse", "name": name}),
        None,
    )
}

fn login(email: &str, password: &str) -> Request<Body> {
    post_json(
        "/api/auth/login",
        serde_json::json!({"email": email, "password": password}),
        None,
    )
}

fn session_cookie(res: &Response) -> String {
    let raw = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    raw.split(';').next().unwrap().to_string()
}

async fn json(res: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
#[ignore]
async fn register_login_me_and_duplicate_email() {
    let live = LiveApp::fresh().await;
    let email = format!("flow-{}@example.com", Uuid::new_v4());

    let res = live.send(register(&email, "Flow")).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = live.send(register(&email, "Again")).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = live.send(login(&email, "wrong-password")).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = live.send(login("nobody@example.com", "correct-horse")).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(res).await["error"], "Invalid credentials");

    let res = live.send(login(&email.to_uppercase(), "correct-horse")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = session_cookie(&res);

    let res = live.send(get("/api/auth/me", &cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json(res).await["user"]["email"], email);

    live.drop_schema().await;
}

#[tokio::test]
#[ignore]
async fn logged_in_admin_reaches_admin_pages_and_user_does_not() {
    let live = LiveApp::fresh().await;

    let res = live.send(register("owner@example.com", "Owner")).await;
    assert_eq!(json(res).await["user"]["role"], "ADMIN");
    let res = live.send(register("visitor@example.com", "Visitor")).await;
    assert_eq!(json(res).await["user"]["role"], "USER");

    let res = live.send(login("owner@example.com", "correct-horse")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let admin_cookie = session_cookie(&res);

    let res = live.send(login("visitor@example.com", "correct-horse")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let user_cookie = session_cookie(&res);

    let res = live.send(get("/admin/projects", &admin_cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = live.send(get("/api/admin/projects", &admin_cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json(res).await["success"], true);

    let res = live.send(get("/admin/projects", &user_cookie)).await;
    assert!(res.status().is_redirection());
    assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/unauthorized");

    let res = live.send(get("/api/admin/projects", &user_cookie)).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    live.drop_schema().await;
}

#[tokio::test]
#[ignore]
async fn concurrent_first_registrations_yield_one_admin() {
    let live = LiveApp::fresh().await;

    let mut set = JoinSet::new();
    for i in 0..8 {
        let app = live.app.clone();
        set.spawn(async move {
            let res = app
                .oneshot(register(&format!("racer-{i}@example.com"), "Racer"))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK);
            json(res).await["user"]["role"].as_str().unwrap().to_string()
        });
    }

    let mut admins = 0;
    while let Some(role) = set.join_next().await {
        if role.unwrap() == "ADMIN" {
            admins += 1;
        }
    }
    assert_eq!(admins, 1);

    let stored: i64 = sqlx::query_scalar(&format!(
        "SELECT count(*) FROM {}.users WHERE role = 'ADMIN'",
        live.schema
    ))
    .fetch_one(&live.admin_db)
    .await
    .unwrap();
    assert_eq!(stored, 1);

    live.drop_schema().await;
}
