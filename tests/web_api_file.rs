//! Web API File Tests
//!
//! Integration tests for the upload and download endpoints.

mod common;

use std::sync::Arc;

use axum::http::{header, StatusCode};
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use serde_json::Value;

use common::{
    local_server, router_for, test_web_config, token_of, CollidingCatalog, FakeObjectStore,
};
use linkshare::db::Database;
use linkshare::file::{LocalStorage, SqliteCatalog, MAX_TOKEN_ATTEMPTS};
use linkshare::web::dto::LinkResponse;

const MB: u64 = 1024 * 1024;

fn file_form(data: &[u8], name: &str, mime: &str) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(data.to_vec()).file_name(name).mime_type(mime),
    )
}

async fn upload(server: &TestServer, form: MultipartForm) -> LinkResponse {
    let response = server.post("/upload").multipart(form).await;
    response.assert_status_ok();
    response.json::<LinkResponse>()
}

#[tokio::test]
async fn test_upload_then_download() {
    let h = local_server(MB).await;

    let link = upload(&h.server, file_form(b"hello, world", "hello.txt", "text/plain")).await;
    assert!(link.link.starts_with("/file/"));
    assert_eq!(token_of(&link.link).len(), 12);

    let response = h.server.get(&link.link).await;
    response.assert_status_ok();
    assert_eq!(response.as_bytes().as_ref(), b"hello, world");
    assert_eq!(response.header(header::CONTENT_TYPE), "text/plain");
    assert_eq!(response.header(header::CONTENT_LENGTH), "12");
    assert_eq!(
        response.header(header::CONTENT_DISPOSITION),
        "inline; filename=\"hello.txt\""
    );
    assert_eq!(response.header("X-Content-Type-Options"), "nosniff");
}

#[tokio::test]
async fn test_upload_response_shape() {
    let h = local_server(MB).await;

    let response = h
        .server
        .post("/upload")
        .multipart(file_form(b"x", "x.bin", "application/octet-stream"))
        .await;

    response.assert_status_ok();
    let json = response.json::<Value>();
    let object = json.as_object().unwrap();
    assert_eq!(object.len(), 1);
    assert!(object["link"].as_str().unwrap().starts_with("/file/"));
}

#[tokio::test]
async fn test_binary_round_trip() {
    let h = local_server(MB).await;
    let data: Vec<u8> = (0..=255u8).cycle().take(200_000).collect();

    let link = upload(&h.server, file_form(&data, "blob.bin", "application/octet-stream")).await;

    let response = h.server.get(&link.link).await;
    response.assert_status_ok();
    assert_eq!(response.as_bytes().as_ref(), data.as_slice());
}

#[tokio::test]
async fn test_record_metadata() {
    let h = local_server(MB).await;

    let link = upload(&h.server, file_form(b"%PDF-1.7", "report.pdf", "application/pdf")).await;
    let record = h.record(token_of(&link.link)).await;

    assert_eq!(record.original_name, "report.pdf");
    assert_eq!(record.mime_type, "application/pdf");
    assert_eq!(record.size_bytes, 8);
    assert!(record.storage_key.ends_with("-report.pdf"));
    assert!(h.storage.root().join(&record.storage_key).is_file());
}

#[tokio::test]
async fn test_oversize_upload_rejected() {
    let h = local_server(1024).await;
    let data = vec![b'a'; 4096];

    let response = h
        .server
        .post("/upload")
        .multipart(file_form(&data, "big.bin", "application/octet-stream"))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let json = response.json::<Value>();
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
    assert_eq!(h.blob_count(), 0);
    assert_eq!(h.record_count().await, 0);
}

#[tokio::test]
async fn test_upload_at_limit_accepted() {
    let h = local_server(1024).await;
    let data = vec![b'a'; 1024];

    upload(&h.server, file_form(&data, "exact.bin", "application/octet-stream")).await;

    assert_eq!(h.blob_count(), 1);
    assert_eq!(h.record_count().await, 1);
}

#[tokio::test]
async fn test_identical_uploads_get_distinct_tokens() {
    let h = local_server(MB).await;

    let first = upload(&h.server, file_form(b"same bytes", "same.txt", "text/plain")).await;
    let second = upload(&h.server, file_form(b"same bytes", "same.txt", "text/plain")).await;

    assert_ne!(first.link, second.link);
    assert_eq!(h.blob_count(), 2);

    for link in [&first.link, &second.link] {
        let response = h.server.get(link).await;
        response.assert_status_ok();
        assert_eq!(response.as_bytes().as_ref(), b"same bytes");
    }
}

#[tokio::test]
async fn test_unknown_token_not_found() {
    let h = local_server(MB).await;

    let response = h.server.get("/file/Zz00Zz00Zz00").await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_malformed_token_not_found() {
    let h = local_server(MB).await;

    let response = h.server.get("/file/not-a-token").await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deleted_blob_is_gone() {
    let h = local_server(MB).await;

    let link = upload(&h.server, file_form(b"short-lived", "gone.txt", "text/plain")).await;
    let record = h.record(token_of(&link.link)).await;
    std::fs::remove_file(h.storage.root().join(&record.storage_key)).unwrap();

    let response = h.server.get(&link.link).await;
    response.assert_status(StatusCode::GONE);
    assert_eq!(response.json::<Value>()["error"]["code"], "GONE");
}

#[tokio::test]
async fn test_traversal_name_stays_in_root() {
    let h = local_server(MB).await;

    let link = upload(&h.server, file_form(b"root:x:0:0", "../../etc/passwd", "text/plain")).await;
    let record = h.record(token_of(&link.link)).await;

    assert_eq!(record.original_name, "../../etc/passwd");
    assert!(!record.storage_key.contains('/'));
    assert!(h.storage.root().join(&record.storage_key).is_file());
    assert_eq!(h.blob_count(), 1);
    // Nothing escaped the uploads directory
    assert_eq!(std::fs::read_dir(h.dir.path()).unwrap().count(), 1);

    let response = h.server.get(&link.link).await;
    response.assert_status_ok();
    assert_eq!(response.as_bytes().as_ref(), b"root:x:0:0");
}

#[tokio::test]
async fn test_unicode_name_disposition() {
    let h = local_server(MB).await;

    let link = upload(&h.server, file_form(b"data", "日本語.txt", "text/plain")).await;

    let response = h.server.get(&link.link).await;
    response.assert_status_ok();
    let disposition = response.header(header::CONTENT_DISPOSITION);
    let disposition = disposition.to_str().unwrap();
    assert!(disposition.starts_with("inline; "));
    assert!(disposition.contains("filename*=UTF-8''"));
}

#[tokio::test]
async fn test_declared_octet_stream_is_kept() {
    let h = local_server(MB).await;

    let link = upload(
        &h.server,
        file_form(b"<script>alert(1)</script>", "page.html", "application/octet-stream"),
    )
    .await;
    let record = h.record(token_of(&link.link)).await;
    assert_eq!(record.mime_type, "application/octet-stream");

    let response = h.server.get(&link.link).await;
    response.assert_status_ok();
    assert_eq!(
        response.header(header::CONTENT_TYPE),
        "application/octet-stream"
    );
}

#[tokio::test]
async fn test_missing_name_defaults() {
    let h = local_server(MB).await;

    let form = MultipartForm::new().add_part("file", Part::bytes(b"anon".to_vec()));
    let link = upload(&h.server, form).await;
    let record = h.record(token_of(&link.link)).await;

    assert_eq!(record.original_name, "file");
    assert!(record.storage_key.ends_with("-file"));
}

#[tokio::test]
async fn test_no_file_part() {
    let h = local_server(MB).await;

    let form = MultipartForm::new().add_text("description", "no file here");
    let response = h.server.post("/upload").multipart(form).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(h.blob_count(), 0);
    assert_eq!(h.record_count().await, 0);
}

#[tokio::test]
async fn test_non_multipart_body() {
    let h = local_server(MB).await;

    let response = h
        .server
        .post("/upload")
        .json(&serde_json::json!({ "file": "nope" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_file_part_after_other_fields() {
    let h = local_server(MB).await;

    let form = MultipartForm::new()
        .add_text("note", "ignored")
        .add_part(
            "file",
            Part::bytes(b"payload".to_vec())
                .file_name("p.txt")
                .mime_type("text/plain"),
        );
    let link = upload(&h.server, form).await;

    let response = h.server.get(&link.link).await;
    assert_eq!(response.as_bytes().as_ref(), b"payload");
}

#[tokio::test]
async fn test_object_store_redirects_with_fresh_urls() {
    let db = Database::open_in_memory().await.unwrap();
    let store = Arc::new(FakeObjectStore::new());
    let router = router_for(
        store.clone(),
        Arc::new(SqliteCatalog::new(db.pool().clone())),
        MB,
        &test_web_config(),
    );
    let server = TestServer::new(router).unwrap();

    let link = upload(&server, file_form(b"in the bucket", "obj.txt", "text/plain")).await;

    let first = server.get(&link.link).await;
    first.assert_status(StatusCode::FOUND);
    let second = server.get(&link.link).await;
    second.assert_status(StatusCode::FOUND);

    let first_url = first.header(header::LOCATION).to_str().unwrap().to_string();
    let second_url = second.header(header::LOCATION).to_str().unwrap().to_string();

    assert_eq!(store.signed_count(), 2);
    assert_ne!(first_url, second_url);

    let key_of = |url: &str| url.split('?').next().unwrap().to_string();
    assert_eq!(key_of(&first_url), key_of(&second_url));
    assert!(first_url.contains("-obj.txt"));
    assert_eq!(first.header(header::CACHE_CONTROL), "no-store, max-age=0");
}

#[tokio::test]
async fn test_object_store_missing_object_is_gone() {
    let db = Database::open_in_memory().await.unwrap();
    let store = Arc::new(FakeObjectStore::new());
    let catalog = SqliteCatalog::new(db.pool().clone());
    let router = router_for(
        store.clone(),
        Arc::new(catalog.clone()),
        MB,
        &test_web_config(),
    );
    let server = TestServer::new(router).unwrap();

    let link = upload(&server, file_form(b"bytes", "obj.txt", "text/plain")).await;
    let record = {
        use linkshare::file::Catalog;
        catalog
            .find_by_token(token_of(&link.link))
            .await
            .unwrap()
            .unwrap()
    };
    assert!(store.object(&record.storage_key).is_some());
    store.remove(&record.storage_key);

    let response = server.get(&link.link).await;
    response.assert_status(StatusCode::GONE);
    assert_eq!(store.signed_count(), 0);
}

#[tokio::test]
async fn test_token_collision_retried() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = Database::open_in_memory().await.unwrap();
    let storage = LocalStorage::new(dir.path(), MB).await.unwrap();
    let catalog = Arc::new(CollidingCatalog::new(
        SqliteCatalog::new(db.pool().clone()),
        MAX_TOKEN_ATTEMPTS - 1,
    ));
    let router = router_for(Arc::new(storage), catalog.clone(), MB, &test_web_config());
    let server = TestServer::new(router).unwrap();

    let link = upload(&server, file_form(b"retry", "r.txt", "text/plain")).await;

    assert_eq!(catalog.attempts(), MAX_TOKEN_ATTEMPTS);
    server.get(&link.link).await.assert_status_ok();
}

#[tokio::test]
async fn test_token_collision_exhausted() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = Database::open_in_memory().await.unwrap();
    let storage = LocalStorage::new(dir.path(), MB).await.unwrap();
    let catalog = Arc::new(CollidingCatalog::new(
        SqliteCatalog::new(db.pool().clone()),
        usize::MAX,
    ));
    let router = router_for(Arc::new(storage), catalog.clone(), MB, &test_web_config());
    let server = TestServer::new(router).unwrap();

    let response = server
        .post("/upload")
        .multipart(file_form(b"unlucky", "u.txt", "text/plain"))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json::<Value>()["error"]["code"], "INTERNAL_ERROR");
    assert_eq!(catalog.attempts(), MAX_TOKEN_ATTEMPTS);
    // The blob is kept even though no record points at it.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn test_rate_limit_applies_to_file_routes() {
    let h_dir = tempfile::TempDir::new().unwrap();
    let db = Database::open_in_memory().await.unwrap();
    let storage = LocalStorage::new(h_dir.path(), MB).await.unwrap();
    let mut config = test_web_config();
    config.rate_limit_per_minute = 2;
    let router = router_for(
        Arc::new(storage),
        Arc::new(SqliteCatalog::new(db.pool().clone())),
        MB,
        &config,
    );
    let server = TestServer::new(router).unwrap();

    server.get("/file/Zz00Zz00Zz00").await.assert_status(StatusCode::NOT_FOUND);
    server.get("/file/Zz00Zz00Zz00").await.assert_status(StatusCode::NOT_FOUND);

    let response = server.get("/file/Zz00Zz00Zz00").await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.json::<Value>()["error"]["code"], "TOO_MANY_REQUESTS");

    // Health checks are not rate limited
    server.get("/health").await.assert_status_ok();
}

#[tokio::test]
async fn test_health_and_openapi() {
    let h = local_server(MB).await;

    let response = h.server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "OK");

    let response = h.server.get("/api-docs/openapi.json").await;
    response.assert_status_ok();
    let doc = response.json::<Value>();
    assert!(doc["paths"]["/upload"].is_object());
}

#[tokio::test]
async fn test_unknown_route_json_404() {
    let h = local_server(MB).await;

    let response = h.server.get("/nope").await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_static_upload_page() {
    let static_dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        static_dir.path().join("index.html"),
        "<html><body>upload</body></html>",
    )
    .unwrap();

    let dir = tempfile::TempDir::new().unwrap();
    let db = Database::open_in_memory().await.unwrap();
    let storage = LocalStorage::new(dir.path(), MB).await.unwrap();
    let mut config = test_web_config();
    config.serve_static = true;
    config.static_path = static_dir.path().display().to_string();
    let router = router_for(
        Arc::new(storage),
        Arc::new(SqliteCatalog::new(db.pool().clone())),
        MB,
        &config,
    );
    let server = TestServer::new(router).unwrap();

    let response = server.get("/").await;
    response.assert_status_ok();
    assert!(response.text().contains("upload"));

    server.get("/missing.js").await.assert_status(StatusCode::NOT_FOUND);
}
