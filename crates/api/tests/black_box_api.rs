use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

use campus_auth::{JwtClaims, Role};
use campus_core::{AccountId, SessionId};
use campus_infra::config::AppConfig;

const ADMIN_EMAIL: &str = "admin@campus.test";
const PASSWORD: &str = "correct horse battery";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory stores, ephemeral port.
        let app = campus_api::app::build_app(&AppConfig::for_tests())
            .await
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn register(&self, email: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/register"))
            .json(&json!({ "name": "Test User", "email": email, "password": PASSWORD }))
            .send()
            .await
            .unwrap()
    }

    async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap()
    }

    /// Register (if needed) and log in; returns the bearer token.
    async fn token_for(&self, email: &str) -> String {
        let _ = self.register(email).await;
        let res = self.login(email, PASSWORD).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, token: &str, path: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn delete(&self, token: &str, path: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn top_up(&self, token: &str, amount: i64) -> Value {
        let (status, body) = self.post(token, "/payments", json!({ "amount": amount })).await;
        assert_eq!(status, StatusCode::CREATED);
        body
    }

    async fn enroll(&self, token: &str, section_id: &str) -> (StatusCode, Value) {
        self.post(
            token,
            "/enrollments",
            json!({
                "section_id": section_id,
                "first_name": "Maria",
                "last_name": "Gomez",
                "phone": "3001234567",
                "birth_date": "2001-04-09",
            }),
        )
        .await
    }

    /// Course + instructor + term + one section; returns (course_id, section_id).
    async fn seed_section(&self, admin: &str, code: &str, cost: i64, capacity: u32) -> (String, String) {
        let (status, course) = self
            .post(
                admin,
                "/courses",
                json!({
                    "name": "Linear Algebra",
                    "code": code,
                    "credits": 3,
                    "total_hours": 48,
                    "credit_cost": cost,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{course}");

        let (status, instructor) = self
            .post(
                admin,
                "/instructors",
                json!({
                    "first_name": "Ada",
                    "last_name": "Lovelace",
                    "email": format!("ada-{}@uni.edu", code.to_lowercase()),
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{instructor}");

        let (status, term) = self
            .post(
                admin,
                "/terms",
                json!({
                    "name": format!("2025-1-{code}"),
                    "starts_on": "2025-02-01",
                    "ends_on": "2025-06-15",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{term}");

        let (status, section) = self
            .post(
                admin,
                "/sections",
                json!({
                    "course_id": course["id"],
                    "instructor_id": instructor["id"],
                    "term_id": term["id"],
                    "number": 1,
                    "capacity": capacity,
                    "schedules": [
                        { "day": "monday", "starts_at": "08:00:00", "ends_at": "10:00:00", "room": "B-204" }
                    ],
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{section}");

        (
            course["id"].as_str().unwrap().to_string(),
            section["id"].as_str().unwrap().to_string(),
        )
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(jwt_secret: &str, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: AccountId::new(),
        sid: SessionId::new(),
        roles,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/me")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv
        .client
        .post(srv.url("/courses"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv.client.get(srv.url("/courses")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn signed_tokens_without_a_live_session_are_rejected() {
    let srv = TestServer::spawn().await;

    // Valid signature, but no session row behind `sid`.
    let token = mint_jwt(&AppConfig::for_tests().jwt_secret, vec![Role::ADMIN]);
    let (status, body) = srv.get(&token, "/me").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let forged = mint_jwt("some-other-secret", vec![Role::ADMIN]);
    let (status, _) = srv.get(&forged, "/me").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_login_logout_revokes_the_session() {
    let srv = TestServer::spawn().await;

    assert_eq!(srv.register("maria@uni.edu").await.status(), StatusCode::CREATED);
    assert_eq!(srv.register("MARIA@uni.edu").await.status(), StatusCode::CONFLICT);

    let short = srv
        .client
        .post(srv.url("/auth/register"))
        .json(&json!({ "name": "Short", "email": "short@uni.edu", "password": "abc" }))
        .send()
        .await
        .unwrap();
    assert_eq!(short.status(), StatusCode::BAD_REQUEST);

    assert_eq!(
        srv.login("maria@uni.edu", "wrong password").await.status(),
        StatusCode::UNAUTHORIZED
    );

    let token = srv.token_for("maria@uni.edu").await;
    let (status, me) = srv.get(&token, "/me").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["account"]["email"], "maria@uni.edu");
    assert_eq!(me["balance"], 0);
    assert!(me["roles"].as_array().unwrap().iter().any(|r| r == "student"));
    assert!(me["profile"].is_null());

    let res = srv
        .client
        .post(srv.url("/auth/logout"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let (status, _) = srv.get(&token, "/me").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn catalog_writes_are_admin_only_and_codes_are_unique() {
    let srv = TestServer::spawn().await;
    let student = srv.token_for("student@uni.edu").await;
    let admin = srv.token_for(ADMIN_EMAIL).await;

    let course = json!({
        "name": "Calculus I",
        "code": "mat-101",
        "credits": 4,
        "total_hours": 64,
        "credit_cost": 20000,
    });

    let (status, body) = srv.post(&student, "/courses", course.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, created) = srv.post(&admin, "/courses", course.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["code"], "MAT-101");

    let (status, body) = srv.post(&admin, "/courses", course).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let res = srv.client.get(srv.url("/courses")).send().await.unwrap();
    let listing: Value = res.json().await.unwrap();
    assert_eq!(listing["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn insufficient_credits_then_top_up_then_enroll() {
    let srv = TestServer::spawn().await;
    let admin = srv.token_for(ADMIN_EMAIL).await;
    let (_, section_id) = srv.seed_section(&admin, "MAT-201", 20_000, 30).await;

    let student = srv.token_for("maria@uni.edu").await;
    srv.top_up(&student, 15_000).await;

    let (status, body) = srv.enroll(&student, &section_id).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "insufficient_credits");
    assert_eq!(body["balance"], 15_000);
    assert_eq!(body["required"], 20_000);
    assert_eq!(body["top_up"], "/payments");

    let (_, me) = srv.get(&student, "/me").await;
    assert_eq!(me["balance"], 15_000);

    let topped = srv.top_up(&student, 5_000).await;
    assert_eq!(topped["balance"], 20_000);

    let (status, body) = srv.enroll(&student, &section_id).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["balance"], 0);
    assert_eq!(body["enrollment"]["status"], "active");
    assert_eq!(body["enrollment"]["credits_charged"], 20_000);

    let (status, body) = srv.enroll(&student, &section_id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "duplicate_enrollment");

    let (_, payments) = srv.get(&student, "/payments").await;
    assert_eq!(payments["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn full_section_rejects_with_capacity_exceeded() {
    let srv = TestServer::spawn().await;
    let admin = srv.token_for(ADMIN_EMAIL).await;
    let (course_id, section_id) = srv.seed_section(&admin, "FIS-100", 10_000, 1).await;

    let first = srv.token_for("first@uni.edu").await;
    let second = srv.token_for("second@uni.edu").await;
    srv.top_up(&first, 10_000).await;
    srv.top_up(&second, 10_000).await;

    let (status, _) = srv.enroll(&first, &section_id).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = srv.enroll(&second, &section_id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "capacity_exceeded");

    let (_, me) = srv.get(&second, "/me").await;
    assert_eq!(me["balance"], 10_000);

    let res = srv.client.get(srv.url(&format!("/courses/{course_id}"))).send().await.unwrap();
    let page: Value = res.json().await.unwrap();
    assert_eq!(page["sections"][0]["seats_taken"], 1);
    assert_eq!(page["sections"][0]["seats_remaining"], 0);
}

#[tokio::test]
async fn cancel_refunds_the_owner_and_only_the_owner() {
    let srv = TestServer::spawn().await;
    let admin = srv.token_for(ADMIN_EMAIL).await;
    let (_, section_id) = srv.seed_section(&admin, "QUI-300", 20_000, 10).await;

    let owner = srv.token_for("owner@uni.edu").await;
    let other = srv.token_for("other@uni.edu").await;
    srv.top_up(&owner, 25_000).await;

    let (status, enrolled) = srv.enroll(&owner, &section_id).await;
    assert_eq!(status, StatusCode::CREATED);
    let enrollment_id = enrolled["enrollment"]["id"].as_str().unwrap().to_string();

    let (status, dashboard) = srv.get(&owner, "/me/enrollments?status=active").await;
    assert_eq!(status, StatusCode::OK);
    let items = dashboard["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["course"]["code"], "QUI-300");
    assert_eq!(items[0]["instructor"]["name"], "Ada Lovelace");

    let (status, _) = srv.delete(&other, &format!("/enrollments/{enrollment_id}")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = srv.delete(&owner, &format!("/enrollments/{enrollment_id}")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["refunded"], 20_000);
    assert_eq!(body["balance"], 25_000);
    assert_eq!(body["enrollment"]["status"], "cancelled");

    let (status, body) = srv.delete(&owner, &format!("/enrollments/{enrollment_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (_, dashboard) = srv.get(&owner, "/me/enrollments?status=active").await;
    assert!(dashboard["items"].as_array().unwrap().is_empty());
    let (_, dashboard) = srv.get(&owner, "/me/enrollments?course=qui").await;
    assert_eq!(dashboard["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_section_is_a_configuration_error() {
    let srv = TestServer::spawn().await;
    let student = srv.token_for("lost@uni.edu").await;
    srv.top_up(&student, 50_000).await;

    let (status, body) = srv.enroll(&student, &uuid::Uuid::now_v7().to_string()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "configuration_error");

    let (status, body) = srv.enroll(&student, "not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");
}

#[tokio::test]
async fn avatar_upload_requires_a_profile_and_an_image() {
    let srv = TestServer::spawn().await;
    let admin = srv.token_for(ADMIN_EMAIL).await;
    let (_, section_id) = srv.seed_section(&admin, "ART-110", 5_000, 10).await;
    let student = srv.token_for("painter@uni.edu").await;

    let upload = |content_type: &'static str, bytes: Vec<u8>| {
        srv.client
            .put(srv.url("/me/avatar"))
            .bearer_auth(&student)
            .header("content-type", content_type)
            .body(bytes)
            .send()
    };

    let res = upload("image/png", vec![1, 2, 3]).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    srv.top_up(&student, 5_000).await;
    let (status, _) = srv.enroll(&student, &section_id).await;
    assert_eq!(status, StatusCode::CREATED);

    let res = upload("text/plain", vec![1, 2, 3]).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let res = upload("image/png", vec![1, 2, 3]).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let profile: Value = res.json().await.unwrap();
    assert!(profile["avatar_url"].as_str().unwrap().ends_with(".png"));
}
