use axum::http::StatusCode;
use axum::http::header::CONTENT_RANGE;
use serde_json::{Value, json};

mod common;
use common::{delete, get, post, put, setup_test_api, setup_test_app};
use sea_orm::ConnectionTrait;

fn alice() -> Value {
    json!({"username": "alice", "email": "alice@example.com", "is_active": true})
}

#[tokio::test]
async fn test_empty_list_is_an_empty_array() {
    let app = setup_test_app().await;

    let response = get(&app, "/api/users/").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!([]));
    assert_eq!(
        response.headers.get(CONTENT_RANGE).unwrap(),
        "users */0"
    );
}

#[tokio::test]
async fn test_user_lifecycle() {
    let app = setup_test_app().await;

    let created = post(&app, "/api/users/", alice()).await;
    assert_eq!(created.status, StatusCode::CREATED);
    let id = created.body["id"].as_i64().expect("id should be an integer");
    assert_eq!(created.body["username"], "alice");
    assert_eq!(created.body["is_active"], true);

    let duplicate = post(
        &app,
        "/api/users/",
        json!({"username": "alice", "email": "other@example.com"}),
    )
    .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
    let listed = get(&app, "/api/users/").await;
    assert_eq!(listed.body.as_array().unwrap().len(), 1);

    let updated = put(
        &app,
        &format!("/api/users/{id}"),
        json!({"email": "b@example.com"}),
    )
    .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["username"], "alice");
    assert_eq!(updated.body["email"], "b@example.com");

    let deleted = delete(&app, &format!("/api/users/{id}")).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert_eq!(deleted.body, Value::Null);

    let missing = get(&app, &format!("/api/users/{id}")).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_collection_path_without_trailing_slash() {
    let app = setup_test_app().await;

    assert_eq!(post(&app, "/api/users", alice()).await.status, StatusCode::CREATED);
    assert_eq!(get(&app, "/api/users").await.body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_defaults_apply_on_create() {
    let app = setup_test_app().await;

    let created = post(
        &app,
        "/api/users/",
        json!({"username": "bob", "email": "bob@example.com"}),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["is_active"], true);
}

#[tokio::test]
async fn test_missing_required_fields_are_all_reported() {
    let app = setup_test_app().await;

    let response = post(&app, "/api/users/", json!({"is_active": false})).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "Validation failed");
    let details = response.body["details"].as_array().unwrap();
    assert_eq!(details.len(), 2);
    assert!(details.iter().any(|d| d.as_str().unwrap().contains("username")));
    assert!(details.iter().any(|d| d.as_str().unwrap().contains("email")));
}

#[tokio::test]
async fn test_unknown_field_is_rejected() {
    let app = setup_test_app().await;

    let mut payload = alice();
    payload["nickname"] = json!("al");
    let response = post(&app, "/api/users/", payload).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["details"][0].as_str().unwrap().contains("nickname"));
    assert_eq!(get(&app, "/api/users/").await.body, json!([]));
}

#[tokio::test]
async fn test_wrong_types_and_lengths_are_rejected() {
    let app = setup_test_app().await;

    let response = post(
        &app,
        "/api/users/",
        json!({"username": 12, "email": "x@example.com", "is_active": "yes"}),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["details"].as_array().unwrap().len(), 2);

    let response = post(
        &app,
        "/api/users/",
        json!({"username": "a".repeat(81), "email": "x@example.com"}),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_body_is_a_client_error() {
    let app = setup_test_app().await;

    let response = common::send(
        &app,
        axum::http::Method::POST,
        "/api/users/",
        Some(json!(["not", "an", "object"])),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_read_only_key_is_ignored_on_create() {
    let app = setup_test_app().await;

    let mut payload = alice();
    payload["id"] = json!(999);
    let created = post(&app, "/api/users/", payload).await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_ne!(created.body["id"], 999);
}

#[tokio::test]
async fn test_empty_update_changes_nothing() {
    let app = setup_test_app().await;

    let created = post(&app, "/api/users/", alice()).await.body;
    let id = created["id"].as_i64().unwrap();

    let updated = put(&app, &format!("/api/users/{id}"), json!({})).await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body, created);
}

#[tokio::test]
async fn test_update_with_own_row_is_idempotent() {
    let app = setup_test_app().await;

    let created = post(&app, "/api/users/", alice()).await.body;
    let id = created["id"].as_i64().unwrap();

    let updated = put(&app, &format!("/api/users/{id}"), created.clone()).await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body, created);
    assert_eq!(get(&app, &format!("/api/users/{id}")).await.body, created);
}

#[tokio::test]
async fn test_primary_key_cannot_change() {
    let app = setup_test_app().await;

    let id = post(&app, "/api/users/", alice()).await.body["id"]
        .as_i64()
        .unwrap();

    let response = put(&app, &format!("/api/users/{id}"), json!({"id": id + 1})).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(get(&app, &format!("/api/users/{id}")).await.status.is_success());
}

#[tokio::test]
async fn test_update_unique_violation_rolls_back() {
    let app = setup_test_app().await;

    post(&app, "/api/users/", alice()).await;
    let bob = post(
        &app,
        "/api/users/",
        json!({"username": "bob", "email": "bob@example.com"}),
    )
    .await
    .body;
    let id = bob["id"].as_i64().unwrap();

    let response = put(
        &app,
        &format!("/api/users/{id}"),
        json!({"username": "alice", "email": "new@example.com"}),
    )
    .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(get(&app, &format!("/api/users/{id}")).await.body, bob);
}

#[tokio::test]
async fn test_update_missing_row_is_not_found() {
    let app = setup_test_app().await;

    let response = put(&app, "/api/users/42", json!({"email": "x@example.com"})).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_missing_row_is_not_found() {
    let app = setup_test_app().await;

    let response = delete(&app, "/api/users/42").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"], "User with ID '42' not found");
}

#[tokio::test]
async fn test_unparsable_key_is_not_found() {
    let app = setup_test_app().await;

    assert_eq!(get(&app, "/api/users/abc").await.status, StatusCode::NOT_FOUND);
    assert_eq!(delete(&app, "/api/users/1.5").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_nullable_field_can_be_set_and_cleared() {
    let app = setup_test_app().await;

    let user_id = post(&app, "/api/users/", alice()).await.body["id"].clone();
    let item = post(
        &app,
        "/api/items/",
        json!({"name": "lamp", "description": "bright", "user_id": user_id}),
    )
    .await;
    assert_eq!(item.status, StatusCode::CREATED);
    let id = item.body["id"].as_i64().unwrap();

    let renamed = put(&app, &format!("/api/items/{id}"), json!({"name": "desk lamp"})).await;
    assert_eq!(renamed.body["description"], "bright");

    let cleared = put(&app, &format!("/api/items/{id}"), json!({"description": null})).await;
    assert_eq!(cleared.status, StatusCode::OK);
    assert_eq!(cleared.body["description"], Value::Null);
    assert_eq!(cleared.body["name"], "desk lamp");

    let rejected = put(&app, &format!("/api/items/{id}"), json!({"name": null})).await;
    assert_eq!(rejected.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_with_dependents_conflicts() {
    let app = setup_test_app().await;

    let user_id = post(&app, "/api/users/", alice()).await.body["id"]
        .as_i64()
        .unwrap();
    let item_id = post(
        &app,
        "/api/items/",
        json!({"name": "lamp", "user_id": user_id}),
    )
    .await
    .body["id"]
        .as_i64()
        .unwrap();

    let blocked = delete(&app, &format!("/api/users/{user_id}")).await;
    assert_eq!(blocked.status, StatusCode::CONFLICT);
    assert!(get(&app, &format!("/api/users/{user_id}")).await.status.is_success());

    assert_eq!(
        delete(&app, &format!("/api/items/{item_id}")).await.status,
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        delete(&app, &format!("/api/users/{user_id}")).await.status,
        StatusCode::NO_CONTENT
    );
}

#[tokio::test]
async fn test_range_pagination() {
    let app = setup_test_app().await;

    for n in 0..5 {
        let created = post(
            &app,
            "/api/users/",
            json!({"username": format!("user{n}"), "email": format!("user{n}@example.com")}),
        )
        .await;
        assert_eq!(created.status, StatusCode::CREATED);
    }

    let page = get(&app, "/api/users/?range=%5B1%2C2%5D").await;
    assert_eq!(page.status, StatusCode::OK);
    let names: Vec<&str> = page
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["user1", "user2"]);
    assert_eq!(page.headers.get(CONTENT_RANGE).unwrap(), "users 1-2/5");

    let all = get(&app, "/api/users/").await;
    assert_eq!(all.body.as_array().unwrap().len(), 5);
    assert_eq!(all.headers.get(CONTENT_RANGE).unwrap(), "users 0-4/5");

    let past_end = get(&app, "/api/users/?range=%5B10%2C19%5D").await;
    assert_eq!(past_end.body, json!([]));
    assert_eq!(past_end.headers.get(CONTENT_RANGE).unwrap(), "users */5");

    let malformed = get(&app, "/api/users/?range=oops").await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_range_beyond_signed_64_bit_is_a_client_error() {
    let app = setup_test_app().await;
    post(&app, "/api/users/", alice()).await;

    for range in [
        "%5B9223372036854775808%2C9223372036854775808%5D",
        "%5B0%2C18446744073709551615%5D",
    ] {
        let response = get(&app, &format!("/api/users/?range={range}")).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{range}");
        assert_eq!(response.body["error"], "Validation failed");
    }

    let last = get(&app, "/api/users/?range=%5B9223372036854775807%2C9223372036854775807%5D").await;
    assert_eq!(last.status, StatusCode::OK);
    assert_eq!(last.body, json!([]));

    assert_eq!(get(&app, "/api/users/").await.body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_with_missing_reference_conflicts() {
    let app = setup_test_app().await;

    let response = post(
        &app,
        "/api/items/",
        json!({"name": "orphan", "user_id": 4242}),
    )
    .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(
        response.body,
        json!({"error": "The change violates a reference between records"})
    );

    let items = get(&app, "/api/items/").await;
    assert_eq!(items.body, json!([]));
    assert_eq!(items.headers.get(CONTENT_RANGE).unwrap(), "items */0");
}

#[tokio::test]
async fn test_storage_failure_is_sanitized_and_serving_continues() {
    let (api, db) = setup_test_api().await;
    let app = api.router();

    db.execute_unprepared("DROP TABLE item").await.unwrap();

    let failed = get(&app, "/api/items/").await;
    assert_eq!(failed.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(failed.body, json!({"error": "A database error occurred"}));

    let failed = post(&app, "/api/items/", json!({"name": "lamp", "user_id": 1})).await;
    assert_eq!(failed.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!failed.body.to_string().contains("item"));

    let created = post(&app, "/api/users/", alice()).await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(get(&app, "/api/users/").await.body.as_array().unwrap().len(), 1);
}
