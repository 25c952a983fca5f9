//! Definitions, object URLs and metadata over the HTTP surface.

mod helpers;

use helpers::{setup_test_app, ACHIEVEMENT_ID};
use serde_json::{json, Value};

#[tokio::test]
async fn test_list_definitions() {
    let app = setup_test_app();

    let response = app.client().get("/resources/definitions").await;
    assert_eq!(response.status_code(), 200);

    let data: Value = response.json();
    let names: Vec<&str> = data
        .as_array()
        .expect("definitions array")
        .iter()
        .filter_map(|d| d["name"].as_str())
        .collect();
    assert!(names.contains(&"achievement"));
    assert!(names.contains(&"game_build"));
}

#[tokio::test]
async fn test_get_definition() {
    let app = setup_test_app();

    let response = app.client().get("/resources/definitions/achievement").await;
    assert_eq!(response.status_code(), 200);
    let data: Value = response.json();
    assert_eq!(data["name"], "achievement");
    assert_eq!(data["parent"], "achievements");
    assert!(data["patterns"]["cdn"]["G"].is_string());

    let response = app.client().get("/resources/definitions/trophy").await;
    assert_eq!(response.status_code(), 404);
    let data: Value = response.json();
    assert_eq!(data["success"], false);
    assert_eq!(data["error"]["code"], "DEFINITION_NOT_FOUND");
}

#[tokio::test]
async fn test_list_providers() {
    let app = setup_test_app();

    let response = app.client().get("/resources/providers").await;
    assert_eq!(response.status_code(), 200);
    let data: Value = response.json();
    let providers: Vec<&str> = data
        .as_array()
        .expect("providers array")
        .iter()
        .filter_map(|p| p["name"].as_str())
        .collect();
    assert_eq!(providers, vec!["cdn", "r2"]);
}

#[tokio::test]
async fn test_upload_url_for_global_achievement() {
    let app = setup_test_app();

    let response = app
        .client()
        .post("/resources/r2/achievement/upload")
        .json(&json!({
            "scope": "G",
            "parameters": { "achievement_id": ACHIEVEMENT_ID }
        }))
        .await;
    assert_eq!(response.status_code(), 200);

    let data: Value = response.json();
    assert_eq!(
        data["resolvedPath"],
        format!(
            "aviron-game-assets/dev/shared/global/achievements/{}.png",
            ACHIEVEMENT_ID
        )
    );
    assert_eq!(data["method"], "PUT");
    assert!(data["expiresAt"].is_string());
    assert!(data.get("publicUrl").is_none() || data["publicUrl"].is_null());
}

#[tokio::test]
async fn test_upload_url_uses_app_name_from_scope_value() {
    let app = setup_test_app();

    let response = app
        .client()
        .post("/resources/r2/achievement/upload")
        .json(&json!({
            "scope": "A",
            "scopeValue": 7,
            "parameters": { "achievement_id": ACHIEVEMENT_ID, "format": "webp" }
        }))
        .await;
    assert_eq!(response.status_code(), 200);

    let data: Value = response.json();
    assert_eq!(
        data["resolvedPath"],
        format!(
            "aviron-game-assets/dev/apps/rowing/achievements/{}.webp",
            ACHIEVEMENT_ID
        )
    );
}

#[tokio::test]
async fn test_cdn_upload_returns_public_url() {
    let app = setup_test_app();

    let response = app
        .client()
        .post("/resources/cdn/achievement/upload")
        .json(&json!({
            "parameters": { "achievement_id": ACHIEVEMENT_ID }
        }))
        .await;
    assert_eq!(response.status_code(), 200);

    let data: Value = response.json();
    assert_eq!(
        data["resolvedPath"],
        format!("dev/achievements/global/{}.png", ACHIEVEMENT_ID)
    );
    let public_url = data["publicUrl"].as_str().expect("public url");
    assert!(public_url.starts_with("https://cdn.example.com/"));
}

#[tokio::test]
async fn test_upload_url_rejects_invalid_provider() {
    let app = setup_test_app();

    let response = app
        .client()
        .post("/resources/s3/achievement/upload")
        .json(&json!({ "parameters": { "achievement_id": ACHIEVEMENT_ID } }))
        .await;
    assert_eq!(response.status_code(), 400);
    let data: Value = response.json();
    assert_eq!(data["error"]["code"], "INVALID_PROVIDER");
}

#[tokio::test]
async fn test_upload_url_rejects_unsupported_scope() {
    let app = setup_test_app();

    let response = app
        .client()
        .post("/resources/r2/game_build/upload")
        .json(&json!({
            "scope": "G",
            "parameters": { "version": "1.2.0", "platform": "windows" }
        }))
        .await;
    assert_eq!(response.status_code(), 400);
    let data: Value = response.json();
    assert_eq!(data["error"]["code"], "SCOPE_NOT_SUPPORTED");
}

#[tokio::test]
async fn test_upload_url_reports_missing_parameter() {
    let app = setup_test_app();

    let response = app
        .client()
        .post("/resources/r2/achievement/upload")
        .json(&json!({ "scope": "G" }))
        .await;
    assert_eq!(response.status_code(), 400);
    let data: Value = response.json();
    assert_eq!(data["error"]["code"], "MISSING_PARAMETER");
    assert_eq!(data["error"]["details"]["parameter"], "achievement_id");
}

#[tokio::test]
async fn test_unknown_operation_is_rejected() {
    let app = setup_test_app();

    let response = app
        .client()
        .post("/resources/r2/achievement/rename")
        .await;
    assert_eq!(response.status_code(), 400);
    let data: Value = response.json();
    assert_eq!(data["error"]["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_download_url() {
    let app = setup_test_app();
    let path = format!("dev/achievements/global/{}.png", ACHIEVEMENT_ID);

    let response = app
        .client()
        .post(&format!("/resources/r2/{}/download", path))
        .json(&json!({
            "expiry": 300,
            "responseHeaders": { "contentDisposition": "attachment" }
        }))
        .await;
    assert_eq!(response.status_code(), 200);
    let data: Value = response.json();
    assert_eq!(data["method"], "GET");
    assert!(data["url"].as_str().expect("url").contains("expires=300"));

    // An empty body falls back to the default expiry
    let response = app
        .client()
        .post(&format!("/resources/r2/{}/download", path))
        .await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn test_download_overrides_need_provider_support() {
    let app = setup_test_app();

    let response = app
        .client()
        .post("/resources/cdn/dev/a.png/download")
        .json(&json!({ "responseHeaders": { "contentType": "image/png" } }))
        .await;
    assert_eq!(response.status_code(), 400);
    let data: Value = response.json();
    assert_eq!(data["error"]["code"], "UNSUPPORTED_OPERATION");
}

#[tokio::test]
async fn test_list_objects() {
    let app = setup_test_app();
    let prefix = "aviron-game-assets/dev/shared/global/achievements/";
    app.r2.insert_object(format!("{}a.png", prefix), 10).await;
    app.r2.insert_object(format!("{}b.png", prefix), 20).await;
    app.r2.insert_object("aviron-game-assets/dev/apps/rowing/achievements/c.png", 30).await;

    let response = app
        .client()
        .post("/resources/r2/achievements/list")
        .json(&json!({ "scope": "G" }))
        .await;
    assert_eq!(response.status_code(), 200);

    let data: Value = response.json();
    assert_eq!(data["prefix"], prefix);
    assert_eq!(data["objects"].as_array().expect("objects").len(), 2);
    assert_eq!(data["isTruncated"], false);
}

#[tokio::test]
async fn test_cdn_cannot_list() {
    let app = setup_test_app();

    let response = app
        .client()
        .post("/resources/cdn/achievements/list")
        .await;
    assert_eq!(response.status_code(), 400);
    let data: Value = response.json();
    assert_eq!(data["error"]["code"], "UNSUPPORTED_OPERATION");
}

#[tokio::test]
async fn test_get_and_update_metadata() {
    let app = setup_test_app();
    app.r2.insert_object("dev/builds/1.0.0/linux.zip", 2048).await;

    let response = app
        .client()
        .get("/resources/r2/dev/builds/1.0.0/linux.zip/metadata")
        .await;
    assert_eq!(response.status_code(), 200);
    let data: Value = response.json();
    assert_eq!(data["key"], "dev/builds/1.0.0/linux.zip");
    assert_eq!(data["size"], 2048);

    let response = app
        .client()
        .put("/resources/r2/dev/builds/1.0.0/linux.zip/metadata")
        .json(&json!({
            "contentType": "application/zip",
            "customMetadata": { "build": "nightly" }
        }))
        .await;
    assert_eq!(response.status_code(), 200);
    let data: Value = response.json();
    assert_eq!(data["contentType"], "application/zip");
    assert_eq!(data["customMetadata"]["build"], "nightly");
    assert_eq!(data["size"], 2048);
}

#[tokio::test]
async fn test_metadata_of_missing_object() {
    let app = setup_test_app();

    let response = app
        .client()
        .get("/resources/r2/dev/missing.png/metadata")
        .await;
    assert_eq!(response.status_code(), 404);
    let data: Value = response.json();
    assert_eq!(data["error"]["code"], "OBJECT_NOT_FOUND");
}

#[tokio::test]
async fn test_delete_object() {
    let app = setup_test_app();
    app.r2.insert_object("dev/old/icon.png", 1).await;

    let response = app.client().delete("/resources/r2/dev/old/icon.png").await;
    assert_eq!(response.status_code(), 200);
    let data: Value = response.json();
    assert_eq!(data["deleted"], true);
    assert_eq!(data["path"], "dev/old/icon.png");
    assert!(!app.r2.contains("dev/old/icon.png").await);

    let response = app.client().delete("/resources/r2/dev/old/icon.png").await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_cdn_cannot_delete() {
    let app = setup_test_app();

    let response = app.client().delete("/resources/cdn/dev/a.png").await;
    assert_eq!(response.status_code(), 400);
    let data: Value = response.json();
    assert_eq!(data["error"]["code"], "UNSUPPORTED_OPERATION");
}
