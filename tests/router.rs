use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use sea_orm::DatabaseConnection;
use serde_json::Value;
use shopfront_api::{
    config::{AppConfig, PaymentConfig},
    error::AppResult,
    middleware::auth::{ROLE_ADMIN, ROLE_USER},
    payment::{GatewayOrder, PaymentGateway},
    routes::create_app,
    services::auth_service::issue_token,
    state::AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "router-test-secret";

struct NoGateway;

#[async_trait]
impl PaymentGateway for NoGateway {
    fn key_id(&self) -> &str {
        "rzp_test_none"
    }

    async fn create_order(&self, amount: i64, currency: &str, _: &str) -> AppResult<GatewayOrder> {
        Ok(GatewayOrder {
            key_id: self.key_id().to_string(),
            order_id: "order_none".into(),
            amount,
            currency: currency.to_string(),
        })
    }

    fn verify_signature(&self, _: &str, _: &str, _: &str) -> bool {
        false
    }
}

fn offline_state() -> AppState {
    offline_state_with_uploads(std::env::temp_dir().to_string_lossy().into_owned())
}

fn offline_state_with_uploads(upload_dir: String) -> AppState {
    let config = AppConfig {
        database_url: String::new(),
        host: "127.0.0.1".into(),
        port: 0,
        public_base_url: "http://localhost:8080".into(),
        asset_base_url: "http://localhost:8080/uploads".into(),
        upload_dir,
        jwt_secret: SECRET.into(),
        jwt_ttl_hours: 1,
        cors_origins: Vec::new(),
        payment: PaymentConfig {
            razorpay_key_id: "rzp_test_none".into(),
            razorpay_key_secret: "none".into(),
            razorpay_api_base: "http://localhost:9".into(),
            currency: "INR".into(),
            gst_rate: 5,
            cod_advance_amount: 20_000,
            upi_payee_vpa: None,
            upi_payee_name: "Shopfront".into(),
        },
    };

    AppState {
        orm: DatabaseConnection::Disconnected,
        config: Arc::new(config),
        gateway: Arc::new(NoGateway),
    }
}

async fn send(req: Request<Body>) -> (StatusCode, Value) {
    send_to(offline_state(), req).await
}

async fn send_to(state: AppState, req: Request<Body>) -> (StatusCode, Value) {
    let res = create_app(state).oneshot(req).await.expect("response");
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .expect("body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("request")
}

#[tokio::test]
async fn health_is_served_without_a_database() {
    let (status, body) = send(get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn cart_requires_a_bearer_token() {
    let (status, body) = send(get("/api/cart", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["data"]["error"], "Unauthorized Missing Authorization header");

    let req = Request::builder()
        .uri("/api/cart")
        .header(header::AUTHORIZATION, "Basic dXNlcjpwdw==")
        .body(Body::empty())
        .expect("request");
    let (status, _) = send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(get("/api/orders", Some("not-a-jwt"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_reject_customers() {
    let token = issue_token(Uuid::new_v4(), ROLE_USER, SECRET, 1).expect("token");
    let (status, body) = send(get("/api/admin/dashboard", Some(&token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn tokens_signed_with_another_secret_are_rejected() {
    let token = issue_token(Uuid::new_v4(), ROLE_ADMIN, "other-secret", 1).expect("token");
    let (status, _) = send(get("/api/admin/dashboard", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_routes_get_a_not_found_envelope() {
    let (status, body) = send(get("/api/nope", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Not Found");
    assert_eq!(body["data"]["path"], "/api/nope");
}

const BOUNDARY: &str = "shopfront-test-boundary";

fn product_form(fields: &[(&str, &str)], image: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; \
             filename=\"kurta.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(image);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

#[tokio::test]
async fn large_images_reach_the_product_form_and_rejected_forms_leave_no_files() {
    let upload_dir = std::env::temp_dir().join(format!("shopfront-uploads-{}", Uuid::new_v4()));
    let state = offline_state_with_uploads(upload_dir.to_string_lossy().into_owned());
    let token = issue_token(Uuid::new_v4(), ROLE_ADMIN, SECRET, 1).expect("token");

    // 3 MiB is over axum's default extractor limit but inside ours
    let image = vec![0xFF_u8; 3 * 1024 * 1024];
    let req = Request::builder()
        .method("POST")
        .uri("/api/admin/products")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(product_form(&[("price", "79900")], &image)))
        .expect("request");

    let (status, body) = send_to(state, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["data"]["error"], "Bad Request name is required");

    let leftover = std::fs::read_dir(&upload_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftover, 0, "rejected product left files behind");
    let _ = std::fs::remove_dir_all(&upload_dir);
}
