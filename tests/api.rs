use std::net::SocketAddr;

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Method, Request, StatusCode, header},
};
use book_catalog::{AppState, Config, Role, User, build_app, issue_token};
use serde_json::{Value, json};
use tower::ServiceExt;

fn test_config() -> Config {
    Config {
        database_url: None,
        jwt_secret: "api_test_secret".into(),
        server_port: 0,
        login_attempts_per_minute: 5,
    }
}

fn app() -> Router {
    build_app(AppState::in_memory(test_config()))
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

/// Log in as if the request arrived over a connection from `peer`.
async fn login_from(app: &Router, peer: [u8; 4], email: &str, password: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .extension(ConnectInfo(SocketAddr::from((peer, 40000))))
        .body(Body::from(json!({ "email": email, "password": password }).to_string()))
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn register_and_login(app: &Router, email: &str) -> String {
    let creds = json!({ "email": email, "password": "s3cretpass" });
    let (status, _) = call(app, Method::POST, "/api/auth/register", None, Some(creds.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = call(app, Method::POST, "/api/auth/login", None, Some(creds)).await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_owned()
}

#[tokio::test]
async fn health_and_root_respond() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".into()));

    let (status, body) = call(&app, Method::GET, "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn register_returns_created_user_and_rejects_duplicates() {
    let app = app();
    let creds = json!({ "email": "ana@example.com", "password": "s3cretpass" });
    let (status, body) = call(&app, Method::POST, "/api/auth/register", None, Some(creds.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["email"], "ana@example.com");
    assert!(body["id"].is_i64());
    assert!(body.get("password_hash").is_none());

    let (status, body) = call(&app, Method::POST, "/api/auth/register", None, Some(creds)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "email already registered");
}

#[tokio::test]
async fn login_failures_look_identical() {
    let app = app();
    register_and_login(&app, "ana@example.com").await;

    let wrong_pw = json!({ "email": "ana@example.com", "password": "wrongpass" });
    let unknown = json!({ "email": "nobody@example.com", "password": "s3cretpass" });
    let a = call(&app, Method::POST, "/api/auth/login", None, Some(wrong_pw)).await;
    let b = call(&app, Method::POST, "/api/auth/login", None, Some(unknown)).await;

    assert_eq!(a.0, StatusCode::UNAUTHORIZED);
    assert_eq!(a, b);
}

#[tokio::test]
async fn login_is_throttled_per_client_address() {
    let app = app();
    let attacker = [203, 0, 113, 9];
    for _ in 0..5 {
        let (status, _) = login_from(&app, attacker, "ana@example.com", "wrongpass").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, body) = login_from(&app, attacker, "ana@example.com", "wrongpass").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "too many requests");

    let (status, _) = login_from(&app, [198, 51, 100, 7], "ana@example.com", "wrongpass").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn failed_guesses_from_elsewhere_do_not_lock_out_the_owner() {
    let app = app();
    let creds = json!({ "email": "victim@example.com", "password": "s3cretpass" });
    let (status, _) = call(&app, Method::POST, "/api/auth/register", None, Some(creds)).await;
    assert_eq!(status, StatusCode::CREATED);

    for _ in 0..6 {
        login_from(&app, [203, 0, 113, 9], "victim@example.com", "attackerguess").await;
    }

    let (status, body) = login_from(&app, [198, 51, 100, 7], "victim@example.com", "s3cretpass").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());
}

#[tokio::test]
async fn mutations_require_a_valid_bearer_token() {
    let app = app();
    let book = json!({ "title": "Rayuela", "author": "Julio Cortázar", "year": 1963 });

    let (status, body) = call(&app, Method::POST, "/api/books", None, Some(book.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = call(&app, Method::POST, "/api/books", Some("garbage"), Some(book.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, Method::PUT, "/api/books/1", None, Some(json!({ "year": 1964 }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, Method::DELETE, "/api/books/1", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = register_and_login(&app, "ana@example.com").await;
    let (status, body) = call(&app, Method::POST, "/api/books", Some(&token), Some(book)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "available");
}

#[tokio::test]
async fn non_bearer_scheme_is_rejected() {
    let app = app();
    let token = register_and_login(&app, "ana@example.com").await;
    let req = Request::builder()
        .method(Method::DELETE)
        .uri("/api/books/1")
        .header(header::AUTHORIZATION, format!("Token {token}"))
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_for_unknown_subject_is_still_honored() {
    let app = app();
    let ghost = User {
        id: 9_999,
        email: "ghost@example.com".into(),
        password_hash: String::new(),
        role: Role::User,
    };
    let token = issue_token(&ghost, &test_config()).unwrap();
    let book = json!({ "title": "Ficciones", "author": "Jorge Luis Borges", "year": 1944 });
    let (status, _) = call(&app, Method::POST, "/api/books", Some(&token), Some(book)).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn book_lifecycle_over_http() {
    let app = app();
    let token = register_and_login(&app, "ana@example.com").await;

    let (status, created) = call(
        &app,
        Method::POST,
        "/api/books",
        Some(&token),
        Some(json!({ "title": "Pedro Páramo", "author": "Juan Rulfo", "year": 1955 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_i64().unwrap();

    let (status, fetched) = call(&app, Method::GET, &format!("/api/books/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);
    assert_eq!(
        fetched,
        json!({ "id": id, "title": "Pedro Páramo", "author": "Juan Rulfo", "year": 1955, "status": "available" })
    );

    let (status, updated) = call(
        &app,
        Method::PUT,
        &format!("/api/books/{id}"),
        Some(&token),
        Some(json!({ "status": "reservado", "id": 777 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "reserved");
    assert_eq!(updated["id"], id);
    assert_eq!(updated["title"], "Pedro Páramo");

    let (status, body) = call(&app, Method::DELETE, &format!("/api/books/{id}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, body) = call(&app, Method::DELETE, &format!("/api/books/{id}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not found");

    let (status, _) = call(&app, Method::GET, &format!("/api/books/{id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_with_missing_fields_is_bad_request() {
    let app = app();
    let token = register_and_login(&app, "ana@example.com").await;
    for body in [
        json!({ "author": "Anon", "year": 2000 }),
        json!({ "title": "", "author": "Anon", "year": 2000 }),
        json!({ "title": "Untitled", "author": "Anon", "year": 0 }),
        json!({ "title": "Untitled", "author": "Anon" }),
    ] {
        let (status, resp) = call(&app, Method::POST, "/api/books", Some(&token), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["error"], "title, author and year are required");
    }
}

#[tokio::test]
async fn update_unknown_id_is_not_found_and_blank_title_is_rejected() {
    let app = app();
    let token = register_and_login(&app, "ana@example.com").await;

    let (status, _) = call(&app, Method::PUT, "/api/books/404", Some(&token), Some(json!({ "year": 2001 }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, created) = call(
        &app,
        Method::POST,
        "/api/books",
        Some(&token),
        Some(json!({ "title": "Aleph", "author": "Jorge Luis Borges", "year": 1949 })),
    )
    .await;
    let id = created["id"].as_i64().unwrap();
    let (status, _) = call(&app, Method::PUT, &format!("/api/books/{id}"), Some(&token), Some(json!({ "title": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn listing_filters_sorts_and_paginates() {
    let app = app();
    let token = register_and_login(&app, "ana@example.com").await;
    for (title, author, year, status) in [
        ("Don Quijote de la Mancha", "Miguel de Cervantes", 1605, "available"),
        ("El Quijote apócrifo", "Avellaneda", 1614, "reserved"),
        ("Novelas ejemplares", "Miguel de Cervantes", 1613, "reserved"),
    ] {
        let body = json!({ "title": title, "author": author, "year": year, "status": status });
        let (s, _) = call(&app, Method::POST, "/api/books", Some(&token), Some(body)).await;
        assert_eq!(s, StatusCode::CREATED);
    }

    let (status, page) = call(&app, Method::GET, "/api/books?q=quijote&status=reserved", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["title"], "El Quijote apócrifo");

    let (_, page) = call(&app, Method::GET, "/api/books?sort=-year&limit=2", None, None).await;
    assert_eq!(page["page"], 1);
    assert_eq!(page["limit"], 2);
    assert_eq!(page["total"], 3);
    assert_eq!(page["pages"], 2);
    assert_eq!(page["items"][0]["year"], 1614);
    assert_eq!(page["items"][1]["year"], 1613);

    let (_, page) = call(&app, Method::GET, "/api/books?sort=-year&limit=2&page=2", None, None).await;
    assert_eq!(page["items"].as_array().unwrap().len(), 1);

    let (_, page) = call(&app, Method::GET, "/api/books?page=9", None, None).await;
    assert_eq!(page["items"], json!([]));
    assert_eq!(page["total"], 3);
    assert_eq!(page["pages"], 1);
}

#[tokio::test]
async fn listing_rejects_unknown_sort_field() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/api/books?sort=isbn", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid sort field: isbn");

    let (status, body) = call(&app, Method::GET, "/api/books?page=zero", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn malformed_bodies_use_the_error_envelope() {
    let app = app();
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].is_string());

    let (status, body) = call(&app, Method::GET, "/api/books/not-a-number", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn responses_carry_pipeline_headers() {
    let app = app();
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let res = app.oneshot(req).await.unwrap();
    let headers = res.headers();
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.contains_key(header::STRICT_TRANSPORT_SECURITY));
}

#[tokio::test]
async fn openapi_document_lists_book_routes() {
    let app = app();
    let (status, doc) = call(&app, Method::GET, "/api/docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["openapi"], "3.0.3");
    assert!(doc["paths"]["/api/books/{id}"]["delete"].is_object());
    assert!(doc["components"]["schemas"]["PaginatedBooks"].is_object());
}
