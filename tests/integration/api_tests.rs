//! Integration tests for the Maktaba API
//!
//! These run against a live server with a bootstrapped administrator:
//! MAKTABA_AUTH__BOOTSTRAP_ADMIN_EMAIL / MAKTABA_AUTH__BOOTSTRAP_ADMIN_PASSWORD.
//! Run with `cargo test -- --ignored`.

use reqwest::Client;
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:8080/api/v1";

fn admin_credentials() -> (String, String) {
    let email = std::env::var("MAKTABA_AUTH__BOOTSTRAP_ADMIN_EMAIL")
        .unwrap_or_else(|_| "admin@maktaba.local".to_string());
    let password = std::env::var("MAKTABA_AUTH__BOOTSTRAP_ADMIN_PASSWORD")
        .unwrap_or_else(|_| "change-me".to_string());
    (email, password)
}

/// Helper to get an admin token
async fn get_auth_token(client: &Client) -> String {
    let (email, password) = admin_credentials();
    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Failed to send login request");

    let body: Value = response.json().await.expect("Failed to parse login response");
    body["token"].as_str().expect("No token in response").to_string()
}

async fn create_test_book(client: &Client, token: &str, title: &str, copies: i32) -> String {
    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(token)
        .json(&json!({
            "title": title,
            "author": "Integration Test",
            "language": "ar",
            "total_copies": copies,
            "tags": ["test"]
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Failed to parse response");
    body["id"].as_str().expect("No book ID").to_string()
}

async fn delete_test_book(client: &Client, token: &str, id: &str) {
    let _ = client
        .delete(format!("{}/books/{}?force=true", BASE_URL, id))
        .bearer_auth(token)
        .send()
        .await;
}

#[tokio::test]
#[ignore]
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
async fn test_login() {
    let client = Client::new();
    let (email, password) = admin_credentials();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["token"].is_string());
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["user"]["role"], "admin");
}

#[tokio::test]
#[ignore]
async fn test_login_invalid_credentials() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "email": "nobody@maktaba.local", "password": "wrong" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_get_current_user() {
    let client = Client::new();
    let token = get_auth_token(&client).await;
    let (email, _) = admin_credentials();

    let response = client
        .get(format!("{}/auth/me", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["email"], email);
}

#[tokio::test]
#[ignore]
async fn test_unauthorized_access() {
    let client = Client::new();

    let response = client
        .get(format!("{}/books", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_list_books_with_url_query() {
    let client = Client::new();
    let token = get_auth_token(&client).await;
    let id = create_test_book(&client, &token, "Riyad as-Salihin (test)", 2).await;

    let response = client
        .get(format!(
            "{}/books?q=salihin&filter=language:eq:ar&sort=-created_at&per_page=5",
            BASE_URL
        ))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["items"].is_array());
    assert!(body["total"].as_i64().unwrap_or(0) >= 1);
    assert_eq!(body["per_page"], 5);
    assert!(body["query"].as_str().unwrap_or_default().contains("q=salihin"));
    assert!(body["items"]
        .as_array()
        .expect("items")
        .iter()
        .any(|b| b["id"] == id.as_str()));

    delete_test_book(&client, &token, &id).await;
}

#[tokio::test]
#[ignore]
async fn test_invalid_filter_is_rejected() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    for query in ["filter=password:eq:x", "filter=pages:gt:many", "sort=nope"] {
        let response = client
            .get(format!("{}/books?{}", BASE_URL, query))
            .bearer_auth(&token)
            .send()
            .await
            .expect("Failed to send request");

        assert_eq!(response.status(), 400, "query `{}` should be rejected", query);
        let body: Value = response.json().await.expect("Failed to parse response");
        assert_eq!(body["error"], "BadQuery");
    }
}

#[tokio::test]
#[ignore]
async fn test_search_books_with_json_body() {
    let client = Client::new();
    let token = get_auth_token(&client).await;
    let id = create_test_book(&client, &token, "Bulugh al-Maram (test)", 1).await;

    let response = client
        .post(format!("{}/books/search", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({
            "search": { "term": "Bulugh" },
            "filters": [
                { "field": "tags", "operator": "cs", "value": ["test"] },
                { "field": "available_copies", "operator": "gte", "value": 1 }
            ],
            "sort": [{ "field": "title", "direction": "asc" }],
            "pagination": { "page": 1, "per_page": 10 }
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["items"]
        .as_array()
        .expect("items")
        .iter()
        .any(|b| b["id"] == id.as_str()));

    delete_test_book(&client, &token, &id).await;
}

#[tokio::test]
#[ignore]
async fn test_borrow_renew_and_return() {
    let client = Client::new();
    let token = get_auth_token(&client).await;
    let book_id = create_test_book(&client, &token, "Al-Adab al-Mufrad (test)", 1).await;

    // Borrow the only copy
    let response = client
        .post(format!("{}/borrowings", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "book_id": book_id }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 201);
    let borrowing: Value = response.json().await.expect("Failed to parse response");
    let borrowing_id = borrowing["id"].as_str().expect("No borrowing ID").to_string();
    assert_eq!(borrowing["status"], "active");

    // No copy left
    let response = client
        .post(format!("{}/borrowings", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "book_id": book_id }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 422);

    let response = client
        .post(format!("{}/borrowings/{}/renew", BASE_URL, borrowing_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let renewed: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(renewed["renewal_count"], 1);

    let response = client
        .post(format!("{}/borrowings/{}/return", BASE_URL, borrowing_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let returned: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(returned["status"], "returned");
    assert_eq!(returned["fine_paid"], true);

    // Copy is back on the shelf
    let response = client
        .get(format!("{}/books/{}", BASE_URL, book_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    let book: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(book["available_copies"], 1);

    delete_test_book(&client, &token, &book_id).await;
}

#[tokio::test]
#[ignore]
async fn test_saved_search_preference() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .put(format!("{}/preferences/search.books", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({
            "value": {
                "search": "fiqh",
                "filters": [{ "field": "language", "operator": "eq", "value": "ar" }],
                "sort": [{ "field": "title", "direction": "asc" }]
            }
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let response = client
        .put(format!("{}/preferences/search.books", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({
            "value": { "filters": [{ "field": "secret", "operator": "eq", "value": 1 }] }
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 400);

    let response = client
        .delete(format!("{}/preferences/search.books", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 204);
}

#[tokio::test]
#[ignore]
async fn test_get_stats() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .get(format!("{}/stats", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["books"]["titles"].is_number());
    assert!(body["users"]["total"].is_number());
    assert!(body["borrowings"]["active"].is_number());
}

#[tokio::test]
#[ignore]
async fn test_get_settings() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .get(format!("{}/settings", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["library"]["name"].is_string());
    assert_eq!(body["policies"].as_array().map(|p| p.len()), Some(3));
}

#[tokio::test]
#[ignore]
async fn test_admin_cannot_deactivate_own_account() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let me: Value = client
        .get(format!("{}/auth/me", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");
    let id = me["id"].as_str().expect("No user ID");

    let response = client
        .put(format!("{}/users/{}", BASE_URL, id))
        .bearer_auth(&token)
        .json(&json!({ "is_active": false }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 422);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["error"], "RuleViolation");
}

#[tokio::test]
#[ignore]
async fn test_total_copies_cannot_drop_below_loans() {
    let client = Client::new();
    let token = get_auth_token(&client).await;
    let book_id = create_test_book(&client, &token, "Kitab at-Tawhid (test)", 2).await;

    let response = client
        .post(format!("{}/borrowings", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "book_id": book_id }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 201);

    let response = client
        .put(format!("{}/books/{}", BASE_URL, book_id))
        .bearer_auth(&token)
        .json(&json!({ "total_copies": 0 }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 422);

    let response = client
        .put(format!("{}/books/{}", BASE_URL, book_id))
        .bearer_auth(&token)
        .json(&json!({ "total_copies": 1 }))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let book: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(book["available_copies"], 0);

    delete_test_book(&client, &token, &book_id).await;
}
