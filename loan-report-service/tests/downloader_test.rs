//! Report downloader tests against a mocked report generator.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use common::{init_tracing, lazy_state, test_config, UNREACHABLE_DATABASE_URL};
use loan_report_service::build_router;
use loan_report_service::services::{Credentials, DownloadError, ReportDownloader};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tower::util::ServiceExt;
use wiremock::matchers::{body_json, header as header_matcher, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PDF_BYTES: &[u8] = b"%PDF-1.4 generated report";

fn report_path(report_id: i64) -> String {
    format!("/api/v1/report_generator/{}/generation", report_id)
}

fn downloader(server: &MockServer, dir: &TempDir) -> ReportDownloader {
    init_tracing();
    let config = test_config(UNREACHABLE_DATABASE_URL, &server.uri(), dir.path());
    ReportDownloader::new(config.report_generator)
}

fn credentials() -> Credentials {
    Credentials::new("qa@example.com", "secret")
}

async fn mount_login(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path("/users/sign_in"))
        .and(body_json(json!({ "email": "qa@example.com", "password": "secret" })))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

#[tokio::test]
async fn downloads_report_on_first_success() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_login(&server, 200).await;
    Mock::given(method("GET"))
        .and(path(report_path(42)))
        .and(query_param("type", "project_report"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PDF_BYTES))
        .expect(1)
        .mount(&server)
        .await;

    let path = downloader(&server, &dir)
        .download(42, &credentials())
        .await
        .unwrap();

    assert_eq!(path, dir.path().join("Report_42.pdf"));
    assert_eq!(std::fs::read(&path).unwrap(), PDF_BYTES);
}

#[tokio::test]
async fn retries_until_report_is_ready() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_login(&server, 200).await;
    Mock::given(method("GET"))
        .and(path(report_path(7)))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(report_path(7)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PDF_BYTES))
        .expect(1)
        .mount(&server)
        .await;

    let path = downloader(&server, &dir)
        .download(7, &credentials())
        .await
        .unwrap();

    assert!(path.ends_with("Report_7.pdf"));
}

#[tokio::test]
async fn gives_up_after_configured_attempts() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_login(&server, 200).await;
    Mock::given(method("GET"))
        .and(path(report_path(9)))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = downloader(&server, &dir)
        .download(9, &credentials())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DownloadError::Exhausted {
            report_id: 9,
            attempts: 3
        }
    ));
    assert!(!dir.path().join("Report_9.pdf").exists());
}

#[tokio::test]
async fn login_failure_is_not_retried() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_login(&server, 401).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = downloader(&server, &dir)
        .download(1, &credentials())
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::LoginFailed(_)));
}

/// A report generator that accepts any login and answers the first
/// `truncated` report requests with a body shorter than its Content-Length.
async fn spawn_truncating_generator(truncated: usize) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    let report_requests = Arc::new(AtomicUsize::new(0));

    let counter = report_requests.clone();
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let counter = counter.clone();
            tokio::spawn(async move { answer(stream, &counter, truncated).await });
        }
    });

    (address, report_requests)
}

async fn answer(stream: TcpStream, report_requests: &AtomicUsize, truncated: usize) {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await.unwrap();

    let mut content_length = 0;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap();
            }
        }
    }
    let mut body = vec![0; content_length];
    reader.read_exact(&mut body).await.unwrap();

    let mut stream = reader.into_inner();
    if request_line.starts_with("POST") {
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
    } else if report_requests.fetch_add(1, Ordering::SeqCst) < truncated {
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            PDF_BYTES.len() + 100
        );
        stream.write_all(head.as_bytes()).await.unwrap();
        stream.write_all(PDF_BYTES).await.unwrap();
    } else {
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            PDF_BYTES.len()
        );
        stream.write_all(head.as_bytes()).await.unwrap();
        stream.write_all(PDF_BYTES).await.unwrap();
    }
    let _ = stream.shutdown().await;
}

#[tokio::test]
async fn interrupted_body_is_retried() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let (address, report_requests) = spawn_truncating_generator(1).await;
    let config = test_config(UNREACHABLE_DATABASE_URL, &address, dir.path());

    let path = ReportDownloader::new(config.report_generator)
        .download(11, &credentials())
        .await
        .unwrap();

    assert_eq!(report_requests.load(Ordering::SeqCst), 2);
    assert_eq!(std::fs::read(&path).unwrap(), PDF_BYTES);
}

#[tokio::test]
async fn interrupted_body_on_every_attempt_exhausts_retries() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let (address, report_requests) = spawn_truncating_generator(usize::MAX).await;
    let config = test_config(UNREACHABLE_DATABASE_URL, &address, dir.path());

    let err = ReportDownloader::new(config.report_generator)
        .download(12, &credentials())
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Exhausted { attempts: 3, .. }));
    assert_eq!(report_requests.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn session_cookie_is_sent_with_report_request() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("POST"))
        .and(path("/users/sign_in"))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "session=abc; Path=/"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(report_path(5)))
        .and(header_matcher("cookie", "session=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PDF_BYTES))
        .expect(1)
        .mount(&server)
        .await;

    downloader(&server, &dir)
        .download(5, &credentials())
        .await
        .unwrap();
}

#[tokio::test]
async fn download_endpoint_returns_pdf_attachment() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("POST"))
        .and(path("/users/sign_in"))
        .and(body_json(json!({
            "email": "qa@example.com",
            "password": "configured-password"
        })))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(report_path(812)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PDF_BYTES))
        .mount(&server)
        .await;

    let app = build_router(lazy_state(test_config(
        UNREACHABLE_DATABASE_URL,
        &server.uri(),
        dir.path(),
    )));
    let request = Request::builder()
        .method("POST")
        .uri("/api/download-report")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "report_id": 812 }).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/pdf"
    );
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"Report_812.pdf\""
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], PDF_BYTES);
}

#[tokio::test]
async fn bulk_download_reports_partial_success() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_login(&server, 200).await;
    Mock::given(method("GET"))
        .and(path(report_path(1)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PDF_BYTES))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(report_path(2)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let app = build_router(lazy_state(test_config(
        UNREACHABLE_DATABASE_URL,
        &server.uri(),
        dir.path(),
    )));
    let request = Request::builder()
        .method("POST")
        .uri("/api/download-bulk-reports")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "report_ids": [1, 2], "email": "qa@example.com", "password": "secret" })
                .to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["data"]["downloaded"], json!(["Report_1.pdf"]));
    assert_eq!(body["data"]["failed"][0]["report_id"], 2);
}

#[tokio::test]
async fn bulk_download_with_no_successes_is_bad_gateway() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_login(&server, 401).await;

    let app = build_router(lazy_state(test_config(
        UNREACHABLE_DATABASE_URL,
        &server.uri(),
        dir.path(),
    )));
    let request = Request::builder()
        .method("POST")
        .uri("/api/download-bulk-reports")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "report_ids": [3], "email": "qa@example.com", "password": "secret" })
                .to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
