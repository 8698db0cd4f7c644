// ABOUTME: Integration tests for the control plane HTTP client.
// ABOUTME: Checks request shapes, status classification and streamed upload failures.

mod support;

use bytes::Bytes;
use edgefn::api::{
    ApiClient, ApiConfig, ApiError, BulkUpdateFunctionBody, DeployParams, ESZIP_CONTENT_TYPE,
    FunctionStatus, FunctionsApi,
};
use edgefn::bundle::{BundleBody, BundleError, BundleRequest, Bundler, StreamingBundler};
use edgefn::fs::{FileSystem, OsFs};
use edgefn::retry::Retryable;
use edgefn::types::{FunctionSlug, ProjectRef};
use std::path::PathBuf;
use std::sync::Arc;
use support::{PROJECT_REF, function_json, init_tracing, project};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_bytes, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FUNCTIONS_PATH: &str = "/v1/projects/abcdefghijklmnopqrst/functions";

fn client(server: &MockServer) -> ApiClient {
    init_tracing();
    ApiClient::new(ApiConfig {
        base_url: server.uri().parse().unwrap(),
        access_token: "secret".to_string(),
        project_ref: ProjectRef::new(PROJECT_REF).unwrap(),
        timeout: None,
    })
    .unwrap()
}

fn params(slug: &str) -> DeployParams {
    DeployParams {
        slug: slug.to_string(),
        name: slug.to_string(),
        verify_jwt: Some(false),
        entrypoint_path: Some(format!("file:///project/functions/{slug}/index.ts")),
        import_map_path: None,
        ezbr_sha256: Some("abc123".to_string()),
        bundle_only: true,
    }
}

#[tokio::test]
async fn list_sends_bearer_token_and_decodes_records() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FUNCTIONS_PATH))
        .and(header("authorization", "Bearer secret"))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            function_json("hello", 3, Some("abc")),
            function_json("bye", 1, None),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let functions = client(&server)
        .list_functions(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(functions.len(), 2);
    assert_eq!(functions[0].slug, "hello");
    assert_eq!(functions[0].version, 3);
    assert_eq!(functions[0].status, FunctionStatus::Active);
    assert_eq!(functions[0].ezbr_sha256.as_deref(), Some("abc"));
    assert_eq!(functions[1].ezbr_sha256, None);
}

#[tokio::test]
async fn create_posts_eszip_bytes_with_query_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(FUNCTIONS_PATH))
        .and(header("content-type", ESZIP_CONTENT_TYPE))
        .and(query_param("slug", "hello"))
        .and(query_param("name", "hello"))
        .and(query_param("verify_jwt", "false"))
        .and(query_param("ezbr_sha256", "abc123"))
        .and(query_param("bundle_only", "true"))
        .and(body_bytes(b"EZBRpayload".to_vec()))
        .respond_with(ResponseTemplate::new(201).set_body_json(function_json("hello", 1, None)))
        .expect(1)
        .mount(&server)
        .await;

    let created = client(&server)
        .create_function(
            &params("hello"),
            &BundleBody::Eszip(Bytes::from_static(b"EZBRpayload")),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(created.version, 1);
}

#[tokio::test]
async fn update_patches_the_slug_path() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path(format!("{FUNCTIONS_PATH}/hello")))
        .and(query_param("slug", "hello"))
        .respond_with(ResponseTemplate::new(200).set_body_json(function_json("hello", 4, None)))
        .expect(1)
        .mount(&server)
        .await;

    let updated = client(&server)
        .update_function(
            &FunctionSlug::new("hello").unwrap(),
            &params("hello"),
            &BundleBody::Eszip(Bytes::from_static(b"EZBR")),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(updated.version, 4);
}

#[tokio::test]
async fn bulk_update_puts_json_records() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(FUNCTIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let record: BulkUpdateFunctionBody =
        serde_json::from_value(function_json("hello", 2, Some("abc"))).unwrap();
    client(&server)
        .bulk_update_functions(&[record], &CancellationToken::new())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body[0]["slug"], "hello");
    assert_eq!(body[0]["version"], 2);
    assert_eq!(body[0]["status"], "ACTIVE");
    assert_eq!(body[0]["ezbr_sha256"], "abc");
}

#[tokio::test]
async fn statuses_are_classified_for_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(query_param("slug", "dup"))
        .respond_with(
            ResponseTemplate::new(400).set_body_string(r#"{"message":"Duplicated function slug"}"#),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(query_param("slug", "bad"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(query_param("slug", "down"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let api = client(&server);
    let body = BundleBody::Eszip(Bytes::from_static(b"EZBR"));
    let cancel = CancellationToken::new();

    let dup = api.create_function(&params("dup"), &body, &cancel).await.unwrap_err();
    assert!(matches!(dup, ApiError::DuplicateSlug { .. }), "{dup}");
    assert!(!dup.is_transient());

    let bad = api.create_function(&params("bad"), &body, &cancel).await.unwrap_err();
    assert_eq!(bad.status(), Some(400));
    assert!(!bad.is_transient());

    let down = api.create_function(&params("down"), &body, &cancel).await.unwrap_err();
    assert_eq!(down.status(), Some(502));
    assert!(down.is_transient());
}

#[tokio::test]
async fn malformed_response_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client(&server)
        .list_functions(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Decode(_)), "{err}");
}

#[tokio::test]
async fn streamed_upload_sends_metadata_then_files() {
    let root = project(&[
        ("functions/hello/index.ts", "import './util.ts';\n"),
        ("functions/hello/util.ts", "export const x = 1;\n"),
    ]);
    let fs: Arc<dyn FileSystem> = Arc::new(OsFs::new(root.path()));
    let request = BundleRequest {
        slug: FunctionSlug::new("hello").unwrap(),
        entrypoint: PathBuf::from("functions/hello/index.ts"),
        import_map: None,
        static_files: Vec::new(),
        verify_jwt: true,
    };
    let cancel = CancellationToken::new();
    let bundle = StreamingBundler::new(fs).prepare(&request, &cancel).await.unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(FUNCTIONS_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(function_json("hello", 1, None)))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .create_function(&params("hello"), &bundle.body, &cancel)
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let content_type = requests[0]
        .headers
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("multipart/form-data; boundary="));

    let body = String::from_utf8_lossy(&requests[0].body).into_owned();
    let metadata = body.find(r#"name="metadata""#).unwrap();
    let index = body.find(r#"filename="functions/hello/index.ts""#).unwrap();
    let util = body.find(r#"filename="functions/hello/util.ts""#).unwrap();
    assert!(metadata < index && index < util);
    assert!(body.contains(bundle.sha256().unwrap()));
}

#[tokio::test]
async fn producer_failure_is_reported_over_transport_error() {
    let root = project(&[
        ("functions/hello/index.ts", "import './util.ts';\n"),
        ("functions/hello/util.ts", "export {};\n"),
    ]);
    let fs: Arc<dyn FileSystem> = Arc::new(OsFs::new(root.path()));
    let request = BundleRequest {
        slug: FunctionSlug::new("hello").unwrap(),
        entrypoint: PathBuf::from("functions/hello/index.ts"),
        import_map: None,
        static_files: Vec::new(),
        verify_jwt: true,
    };
    let cancel = CancellationToken::new();
    let bundle = StreamingBundler::new(fs).prepare(&request, &cancel).await.unwrap();

    // Break the tree between hashing and upload.
    let util = root.path().join("functions/hello/util.ts");
    std::fs::remove_file(&util).unwrap();
    std::fs::create_dir(&util).unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_body_json(function_json("hello", 1, None)))
        .mount(&server)
        .await;

    let err = client(&server)
        .create_function(&params("hello"), &bundle.body, &cancel)
        .await
        .unwrap_err();

    assert!(
        matches!(err, ApiError::Producer(BundleError::IsDirectory { .. })),
        "{err}"
    );
    assert!(!err.is_transient());
}

#[tokio::test]
async fn cancelled_request_is_not_sent() {
    let server = MockServer::start().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client(&server).list_functions(&cancel).await.unwrap_err();

    assert!(matches!(err, ApiError::Cancelled));
}
