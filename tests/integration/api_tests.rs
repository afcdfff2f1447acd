//! API integration tests
//!
//! Run against a live server with an existing admin account:
//! `CARPORTAL_TEST_ADMIN_EMAIL=... CARPORTAL_TEST_ADMIN_PASSWORD=... cargo test -- --ignored`

use reqwest::{multipart, Client, StatusCode};
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:5000/api/v1";

fn admin_credentials() -> (String, String) {
    (
        std::env::var("CARPORTAL_TEST_ADMIN_EMAIL").unwrap_or_else(|_| "admin@carportal.local".to_string()),
        std::env::var("CARPORTAL_TEST_ADMIN_PASSWORD").unwrap_or_else(|_| "admin123".to_string()),
    )
}

/// Helper to get an admin token
async fn get_admin_token(client: &Client) -> String {
    let (email, password) = admin_credentials();
    let response = client
        .post(format!("{}/auth/admin/login", BASE_URL))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Failed to send login request");

    assert_eq!(response.status(), StatusCode::OK, "admin login failed");
    let body: Value = response.json().await.expect("Failed to parse login response");
    body["token"].as_str().expect("No token in response").to_string()
}

async fn create_car(client: &Client, token: &str, reg_no: &str, date_time: &str, status: &str) -> Value {
    let form = multipart::Form::new()
        .text("regNo", reg_no.to_string())
        .text("make", "Maruti")
        .text("model", "Swift")
        .text("personName", "Integration Test")
        .text("inOutStatus", status.to_string())
        .text("inOutDateTime", date_time.to_string())
        .part(
            "photos",
            multipart::Part::bytes(format!("photo of {}", reg_no).into_bytes()).file_name("front.jpg"),
        );

    let response = client
        .post(format!("{}/cars", BASE_URL))
        .bearer_auth(token)
        .multipart(form)
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::CREATED);
    response.json().await.expect("Failed to parse response")
}

async fn delete_car(client: &Client, token: &str, id: &str) {
    let response = client
        .delete(format!("{}/cars/{}", BASE_URL, id))
        .bearer_auth(token)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_readiness_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/ready", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
#[ignore]
async fn test_login_invalid_credentials() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "email": "nobody@carportal.local", "password": "wrong" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_admin_cannot_use_user_login() {
    let client = Client::new();
    let (email, password) = admin_credentials();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["message"], "Users only");
}

#[tokio::test]
#[ignore]
async fn test_unauthorized_access() {
    let client = Client::new();

    for path in ["/cars", "/cars/stats", "/users", "/auth/me"] {
        let response = client
            .get(format!("{}{}", BASE_URL, path))
            .send()
            .await
            .expect("Failed to send request");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", path);
    }
}

#[tokio::test]
#[ignore]
async fn test_register_validation() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/register", BASE_URL))
        .json(&json!({
            "firstName": "Asha",
            "lastName": "Rao",
            "email": "asha@example.com",
            "phone": "9000000000",
            "password": "secret1",
            "confirmPassword": "secret2",
            "employeeId": "EMP042"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
async fn test_verify_unknown_otp() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/verify-otp", BASE_URL))
        .json(&json!({ "userId": "00000000-0000-0000-0000-000000000000", "otp": "123456" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
async fn test_forgot_password_does_not_reveal_accounts() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/forgot-password", BASE_URL))
        .json(&json!({ "email": "nobody@carportal.local" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["message"].is_string());
}

#[tokio::test]
#[ignore]
async fn test_reset_password_with_bad_token() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/reset-password", BASE_URL))
        .json(&json!({ "token": "garbage", "newPassword": "secret1", "confirmPassword": "secret1" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["message"], "Reset link expired or invalid");
}

#[tokio::test]
#[ignore]
async fn test_car_crud() {
    let client = Client::new();
    let token = get_admin_token(&client).await;

    let car = create_car(&client, &token, "ITEST0001", "2025-11-20T10:00:00Z", "IN").await;
    let id = car["id"].as_str().expect("No id").to_string();
    assert_eq!(car["regNo"], "ITEST0001");
    assert_eq!(car["inOutStatus"], "IN");
    let photo = car["photos"][0].as_str().expect("No photo").to_string();
    assert!(photo.starts_with("/uploads/"));

    // Media is served
    let response = client
        .get(format!("http://localhost:5000{}", photo))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    // Update a text field only
    let form = multipart::Form::new().text("inOutStatus", "OUT");
    let response = client
        .put(format!("{}/cars/{}", BASE_URL, id))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let updated: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(updated["inOutStatus"], "OUT");
    assert_eq!(updated["photos"][0], photo.as_str());

    // Search finds it
    let response = client
        .get(format!("{}/cars?search=itest0001", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    let page: Value = response.json().await.expect("Failed to parse response");
    assert!(page["total"].as_i64().unwrap_or(0) >= 1);
    assert_eq!(page["page"], 1);

    delete_car(&client, &token, &id).await;

    let response = client
        .get(format!("{}/cars/{}", BASE_URL, id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore]
async fn test_create_car_requires_reg_no() {
    let client = Client::new();
    let token = get_admin_token(&client).await;

    let response = client
        .post(format!("{}/cars", BASE_URL))
        .bearer_auth(&token)
        .multipart(multipart::Form::new().text("make", "Maruti"))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
async fn test_stats_follow_client_offset() {
    let client = Client::new();
    let token = get_admin_token(&client).await;

    let car = create_car(&client, &token, "ITEST0002", "2025-11-20T23:30:00Z", "IN").await;
    let id = car["id"].as_str().expect("No id").to_string();

    let response = client
        .get(format!("{}/cars/stats", BASE_URL))
        .query(&[("tzOffset", "+05:30"), ("today", "2025-11-21"), ("debug", "1")])
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::OK);

    let stats: Value = response.json().await.expect("Failed to parse response");
    assert!(stats["today"].as_i64().unwrap_or(0) >= 1);
    assert_eq!(stats["debug"]["windowSource"], "client_local");
    assert_eq!(stats["debug"]["weekStart"], "2025-11-16");

    let days = stats["dailyCounts"].as_array().expect("dailyCounts");
    assert_eq!(days.len(), 7);
    assert_eq!(days[6]["date"], "2025-11-21");
    for i in 0..7 {
        assert_eq!(
            stats["dailyCounts"][i]["count"].as_i64(),
            Some(
                stats["dailyCountsIn"][i]["count"].as_i64().unwrap_or(0)
                    + stats["dailyCountsOut"][i]["count"].as_i64().unwrap_or(0)
            )
        );
    }
    assert!(stats["topReg"].as_array().map_or(0, |a| a.len()) <= 5);

    delete_car(&client, &token, &id).await;
}

#[tokio::test]
#[ignore]
async fn test_stats_with_bogus_offset() {
    let client = Client::new();
    let token = get_admin_token(&client).await;

    let response = client
        .get(format!("{}/cars/stats?tzOffset=bogus&today=2025-11-20&debug", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::OK);
    let stats: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(stats["debug"]["windowSource"], "server_local");
    assert_eq!(stats["dailyCounts"].as_array().map(Vec::len), Some(7));
}

#[tokio::test]
#[ignore]
async fn test_export_xlsx() {
    let client = Client::new();
    let token = get_admin_token(&client).await;

    let response = client
        .get(format!("{}/cars/export", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::OK);
    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    assert!(header("content-type").contains("spreadsheetml"));
    let disposition = header("content-disposition");
    assert!(disposition.contains("car_inventory_") && disposition.contains(".xlsx"));

    let body = response.bytes().await.expect("Failed to read body");
    assert!(body.starts_with(b"PK"));
}

#[tokio::test]
#[ignore]
async fn test_list_users() {
    let client = Client::new();
    let token = get_admin_token(&client).await;

    let response = client
        .get(format!("{}/users?page=1&per_page=10", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["items"].is_array());
    assert!(body["total"].is_number());
    assert!(body["items"][0].get("password").is_none());
}
