use std::sync::Arc;

use poem::http::StatusCode;
use poem::test::TestClient;
use poem::test::{TestForm, TestFormField};
use poem::web::headers;
use poem::{EndpointExt, IntoEndpoint, Route};
use poem_openapi::OpenApiService;

use crate::config::RuntimeConfig;
use crate::routes::{ImageApi, UploadLimit};
use crate::test_utils::png;
use crate::ImageController;

const PATH_CONFIG: &str = include_str!("../tests/configs/path-mode.yaml");
const FLAT_CONFIG: &str = include_str!("../tests/configs/flat-mode.yaml");

async fn setup_environment(cfg: &str) -> anyhow::Result<TestClient<Route>> {
    let cfg = Arc::new(RuntimeConfig::from_yaml(cfg)?);
    let upload_limit = UploadLimit::from_config(&cfg);
    let storage = cfg.backend.connect().await?;
    let controller = Arc::new(ImageController::new(cfg, storage)?);

    let app = OpenApiService::new(
        ImageApi::new(controller),
        "Lust Images API",
        env!("CARGO_PKG_VERSION"),
    );

    let app = Route::new().nest("/v1", app.into_endpoint().with(upload_limit));
    Ok(TestClient::new(app))
}

async fn upload(app: &TestClient<Route>, data: Vec<u8>, filename: &str, mime_type: &str) -> poem::test::TestResponse {
    app.post("/v1/images")
        .typed_header(headers::ContentLength(data.len() as u64))
        .body(data)
        .content_type("application/octet-stream".to_string())
        .query("filename".to_string(), &filename.to_string())
        .query("mime_type".to_string(), &mime_type.to_string())
        .send()
        .await
}

async fn upload_id(app: &TestClient<Route>) -> String {
    let res = upload(app, png(120, 60), "landscape.png", "image/png").await;
    res.assert_status(StatusCode::OK);
    res.json().await.value().object().get("id").string().to_string()
}

#[tokio::test]
async fn test_upload_and_retrieve_urls() -> anyhow::Result<()> {
    let app = setup_environment(PATH_CONFIG).await?;

    let res = upload(&app, png(120, 60), "landscape.png", "image/png").await;
    res.assert_status(StatusCode::OK);

    let info = res.json().await;
    let info = info.value().object();
    let file_id = info.get("id").string();
    info.get("key").assert_string(&format!("uploads/{}/", file_id));
    info.get("mime_type").assert_string("image/png");
    info.get("urls").object().assert_len(6);

    let res = app.get(format!("/v1/images/{}", file_id)).send().await;
    res.assert_status(StatusCode::OK);
    res.json().await.value().object().get("urls").object().assert_len(6);

    let res = app.get(format!("/v1/images/{}/thumb", file_id)).send().await;
    res.assert_status(StatusCode::OK);

    let url = res.json().await.value().object().get("url").string().to_string();
    assert!(url.starts_with(&format!("memory://uploads/{0}/thumb/{0}.png", file_id)));

    Ok(())
}

#[tokio::test]
async fn test_rejects_unsupported_type() -> anyhow::Result<()> {
    let app = setup_environment(PATH_CONFIG).await?;

    let res = upload(&app, vec![0u8; 32], "archive.zip", "application/zip").await;
    res.assert_status(StatusCode::BAD_REQUEST);
    res.assert_text("unsupported image type: application/zip").await;

    Ok(())
}

#[tokio::test]
async fn test_rejects_oversized_upload() -> anyhow::Result<()> {
    let app = setup_environment(PATH_CONFIG).await?;

    let res = upload(&app, vec![0u8; 2 * 1024 * 1024], "huge.png", "image/png").await;
    res.assert_status(StatusCode::BAD_REQUEST);
    res.assert_text("file size exceeds limit (2097152 bytes > 1048576 bytes)").await;

    Ok(())
}

#[tokio::test]
async fn test_understated_length_is_cut_off() -> anyhow::Result<()> {
    let app = setup_environment(PATH_CONFIG).await?;

    let res = app
        .post("/v1/images")
        .typed_header(headers::ContentLength(16))
        .body(vec![0u8; 2 * 1024 * 1024])
        .content_type("application/octet-stream".to_string())
        .query("filename".to_string(), &"huge.png".to_string())
        .query("mime_type".to_string(), &"image/png".to_string())
        .send()
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    res.assert_text("file size exceeds limit (1048577 bytes > 1048576 bytes)").await;

    Ok(())
}

#[tokio::test]
async fn test_batch_upload_over_multipart() -> anyhow::Result<()> {
    let app = setup_environment(PATH_CONFIG).await?;

    let form = TestForm::new()
        .field(
            TestFormField::bytes(png(40, 30))
                .name("files")
                .filename("a.png")
                .content_type("image/png"),
        )
        .field(
            TestFormField::bytes(vec![0u8; 16])
                .name("files")
                .filename("b.zip")
                .content_type("application/zip"),
        );

    let res = app.post("/v1/images/batch").multipart(form).send().await;
    res.assert_status(StatusCode::OK);

    let report = res.json().await;
    let report = report.value().object();

    let succeeded = report.get("succeeded").array();
    succeeded.assert_len(1);
    succeeded.get(0).object().get("original_filename").assert_string("a.png");
    succeeded.get(0).object().get("urls").object().assert_len(6);

    let failed = report.get("failed").array();
    failed.assert_len(1);
    failed.get(0).object().get("id").assert_string("b.zip");
    failed.get(0).object().get("kind").assert_string("validation");

    let res = app.get("/v1/images").send().await;
    res.json().await.value().object().get("total").assert_i64(1);

    Ok(())
}

#[tokio::test]
async fn test_rejects_oversized_batch() -> anyhow::Result<()> {
    let app = setup_environment(PATH_CONFIG).await?;

    let res = app
        .post("/v1/images/batch")
        .typed_header(headers::ContentLength(64 * 1024 * 1024))
        .content_type("multipart/form-data; boundary=x".to_string())
        .send()
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    res.assert_text("file size exceeds limit (67108864 bytes > 5242880 bytes)").await;

    Ok(())
}

#[tokio::test]
async fn test_rejects_corrupt_image() -> anyhow::Result<()> {
    let app = setup_environment(PATH_CONFIG).await?;

    let res = upload(&app, vec![7u8; 256], "broken.png", "image/png").await;
    res.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    Ok(())
}

#[tokio::test]
async fn test_lookup_errors() -> anyhow::Result<()> {
    let app = setup_environment(PATH_CONFIG).await?;

    let res = app.get(format!("/v1/images/{}", uuid::Uuid::new_v4())).send().await;
    res.assert_status(StatusCode::NOT_FOUND);

    let res = app.get("/v1/images/not-an-id").send().await;
    res.assert_status(StatusCode::BAD_REQUEST);

    let file_id = upload_id(&app).await;
    let res = app.get(format!("/v1/images/{}/huge", file_id)).send().await;
    res.assert_status(StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_delete_image() -> anyhow::Result<()> {
    let app = setup_environment(PATH_CONFIG).await?;
    let file_id = upload_id(&app).await;

    let res = app.delete(format!("/v1/images/{}", file_id)).send().await;
    res.assert_status(StatusCode::OK);

    let res = app.get(format!("/v1/images/{}", file_id)).send().await;
    res.assert_status(StatusCode::NOT_FOUND);

    let res = app.delete(format!("/v1/images/{}", file_id)).send().await;
    res.assert_status(StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_list_images() -> anyhow::Result<()> {
    let app = setup_environment(PATH_CONFIG).await?;
    for _ in 0..3 {
        upload_id(&app).await;
    }

    let res = app.get("/v1/images").send().await;
    res.assert_status(StatusCode::OK);

    let page = res.json().await;
    let page = page.value().object();
    page.get("total").assert_i64(3);
    page.get("limit").assert_i64(2);
    page.get("total_pages").assert_i64(2);
    page.get("items").array().assert_len(2);

    let res = app
        .get("/v1/images")
        .query("page".to_string(), &2)
        .send()
        .await;
    res.assert_status(StatusCode::OK);
    res.json().await.value().object().get("items").array().assert_len(1);

    let res = app
        .get("/v1/images")
        .query("page".to_string(), &5)
        .send()
        .await;
    res.assert_status(StatusCode::OK);
    res.json().await.value().object().get("items").array().assert_is_empty();

    Ok(())
}

#[tokio::test]
async fn test_batch_delete_abort_policy() -> anyhow::Result<()> {
    let app = setup_environment(FLAT_CONFIG).await?;
    let first = upload_id(&app).await;
    let second = upload_id(&app).await;
    let missing = uuid::Uuid::new_v4().to_string();

    let res = app
        .post("/v1/images/delete")
        .body_json(&serde_json::json!({ "ids": [first, missing, second] }))
        .send()
        .await;
    res.assert_status(StatusCode::OK);

    let report = res.json().await;
    let report = report.value().object();
    report.get("succeeded").array().assert_len(1);

    let failed = report.get("failed").array();
    failed.assert_len(2);
    failed.get(0).object().get("kind").assert_string("not_found");
    failed.get(1).object().get("kind").assert_string("aborted");
    failed.get(1).object().get("id").assert_string(&second);

    let res = app.get(format!("/v1/images/{}", second)).send().await;
    res.assert_status(StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn test_batch_delete_rejects_bad_ids() -> anyhow::Result<()> {
    let app = setup_environment(FLAT_CONFIG).await?;

    let res = app
        .post("/v1/images/delete")
        .body_json(&serde_json::json!({ "ids": ["nope"] }))
        .send()
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_flat_mode_sizes() -> anyhow::Result<()> {
    let app = setup_environment(FLAT_CONFIG).await?;
    let file_id = upload_id(&app).await;

    let res = app.get(format!("/v1/images/{}", file_id)).send().await;
    res.assert_status(StatusCode::OK);

    let urls = res.json().await;
    let urls = urls.value().object().get("urls").object();
    urls.assert_len(3);
    assert!(urls
        .get("md")
        .string()
        .starts_with(&format!("memory://images/{}/md.webp", file_id)));

    let res = app.get(format!("/v1/images/{}/xl", file_id)).send().await;
    res.assert_status(StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_upload_svg() -> anyhow::Result<()> {
    let app = setup_environment(FLAT_CONFIG).await?;
    let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="300" height="150">
        <rect width="300" height="150" fill="navy"/>
    </svg>"#;

    let res = upload(&app, svg.to_vec(), "banner.svg", "image/svg+xml").await;
    res.assert_status(StatusCode::OK);

    let info = res.json().await;
    let info = info.value().object();
    info.get("mime_type").assert_string("image/svg+xml");

    let urls = info.get("urls").object();
    urls.assert_len(3);
    assert!(urls.get("thumb").string().contains("/thumb.webp"));
    assert!(urls.get("original").string().contains("/original.svg"));

    Ok(())
}
