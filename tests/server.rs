//! HTTP integration tests for edgequake-ocr.
//!
//! Each test starts a real server on `127.0.0.1:0` with a scripted
//! [`VisionModel`] in place of a provider, so no API key or GPU is needed.
//! Tests that rasterise a PDF need libpdfium and are skipped when it cannot
//! be bound (set `PDFIUM_LIB_PATH` to run them).
//!
//! Run with:
//!   cargo test --test server -- --nocapture

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use edgequake_ocr::pipeline::render::bind_pdfium;
use edgequake_ocr::{
    router, Generation, OcrConfig, OcrConfigBuilder, OcrContext, OcrError, OcrMessage, ResponseMode,
    SamplingParams, UploadField, VisionModel,
};
use image::{DynamicImage, Rgb, RgbImage};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::oneshot;

// ── Test helpers ─────────────────────────────────────────────────────────────

const PAGE_JSON: &str = r#"{"primary_language":"en","is_rotation_valid":true,"rotation_correction":0,"is_table":false,"is_diagram":false,"natural_text":"Hello OCR"}"#;

/// Returns a fixed reply (or a fixed inference error) and records every
/// message it is asked about.
struct ScriptedModel {
    reply: String,
    failure: Option<String>,
    calls: AtomicUsize,
    seen: Mutex<Vec<(OcrMessage, SamplingParams)>>,
}

impl ScriptedModel {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            failure: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn failing(cause: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: String::new(),
            failure: Some(cause.to_string()),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last(&self) -> (OcrMessage, SamplingParams) {
        self.seen
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("model was never called")
    }
}

#[async_trait]
impl VisionModel for ScriptedModel {
    async fn generate(
        &self,
        message: &OcrMessage,
        params: &SamplingParams,
    ) -> Result<Generation, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push((message.clone(), *params));
        if let Some(cause) = &self.failure {
            return Err(OcrError::Inference(cause.clone()));
        }
        Ok(Generation {
            sequences: vec![self.reply.clone()],
            prompt_tokens: 100,
            completion_tokens: 20,
        })
    }
}

/// A running server plus the handles a test needs to inspect it.
struct TestServer {
    url: String,
    model: Arc<ScriptedModel>,
    upload_dir: TempDir,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start(
        model: Arc<ScriptedModel>,
        configure: impl FnOnce(OcrConfigBuilder) -> OcrConfigBuilder,
    ) -> Self {
        let upload_dir = tempfile::tempdir().unwrap();
        let config = configure(OcrConfig::builder().upload_dir(upload_dir.path()))
            .build()
            .unwrap();
        let ctx = Arc::new(OcrContext::new(config, model.clone()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, router(ctx))
                .with_graceful_shutdown(async {
                    rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            url: format!("http://{addr}"),
            model,
            upload_dir,
            shutdown: Some(tx),
        }
    }

    async fn upload(&self, field: &str, filename: &str, bytes: Vec<u8>) -> (StatusCode, Value) {
        let part = Part::bytes(bytes).file_name(filename.to_string());
        let form = Form::new().part(field.to_string(), part);
        self.post(form).await
    }

    async fn post(&self, form: Form) -> (StatusCode, Value) {
        let resp = reqwest::Client::new()
            .post(format!("{}/ocr", self.url))
            .multipart(form)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        let body = resp.json::<Value>().await.unwrap();
        (status, body)
    }

    fn assert_upload_dir_empty(&self) {
        assert_dir_empty(self.upload_dir.path());
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            tx.send(()).ok();
        }
    }
}

fn assert_dir_empty(dir: &Path) {
    let leftovers: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|e| e.path())
        .collect();
    assert!(leftovers.is_empty(), "transient files left behind: {leftovers:?}");
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([240, 240, 240])));
    let mut buf = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

/// The text between the anchor markers of a prompt.
fn anchor_of(prompt: &str) -> &str {
    let start = prompt.find("RAW_TEXT_START\n").expect("start marker") + "RAW_TEXT_START\n".len();
    let end = prompt.rfind("\nRAW_TEXT_END").expect("end marker");
    &prompt[start..end]
}

/// A one-page US Letter PDF with a single line of Helvetica text.
fn one_page_pdf(text: &str) -> Vec<u8> {
    let content = format!("BT /F1 24 Tf 72 720 Td ({text}) Tj ET");
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
         /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
            .to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        format!("<< /Length {} >>\nstream\n{content}\nendstream", content.len()),
    ];

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }
    let xref_at = pdf.len();
    pdf.extend_from_slice(
        format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes(),
    );
    for off in offsets {
        pdf.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    pdf
}

macro_rules! skip_unless_pdfium {
    () => {
        if let Err(e) = bind_pdfium() {
            println!("SKIP: pdfium not available: {e}");
            return;
        }
    };
}

// ── Health ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_ok() {
    let server = TestServer::start(ScriptedModel::new(PAGE_JSON), |b| b).await;
    let body: Value = reqwest::get(format!("{}/health", server.url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

// ── Image uploads ────────────────────────────────────────────────────────────

#[tokio::test]
async fn png_upload_returns_parsed_json() {
    let server = TestServer::start(ScriptedModel::new(PAGE_JSON), |b| b).await;

    let (status, body) = server.upload("file", "page.png", png_bytes(200, 100)).await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["natural_text"], "Hello OCR");
    assert_eq!(body["primary_language"], "en");

    assert_eq!(server.model.calls(), 1);
    let (message, params) = server.model.last();
    assert_eq!(anchor_of(message.prompt()), "Image uploaded for OCR processing.");
    assert_eq!(params.temperature, 0.8);
    assert!(params.do_sample);
    assert_eq!(params.num_return_sequences, 1);
    assert_eq!(params.max_new_tokens, Some(2048));

    server.assert_upload_dir_empty();
}

#[tokio::test]
async fn small_image_is_sent_unchanged() {
    let server = TestServer::start(ScriptedModel::new(PAGE_JSON), |b| b).await;
    let bytes = png_bytes(64, 48);

    let (status, _) = server.upload("file", "small.PNG", bytes.clone()).await;
    assert_eq!(status, StatusCode::OK);

    let (message, _) = server.model.last();
    let (b64, mime) = message.image.expect("image attached");
    assert_eq!(mime, "image/png");
    assert_eq!(STANDARD.decode(b64).unwrap(), bytes);
}

#[tokio::test]
async fn large_image_is_bounded() {
    let server =
        TestServer::start(ScriptedModel::new(PAGE_JSON), |b| b.target_longest_image_dim(256)).await;

    let (status, _) = server.upload("file", "big.png", png_bytes(1000, 500)).await;
    assert_eq!(status, StatusCode::OK);

    let (message, _) = server.model.last();
    let (b64, _) = message.image.expect("image attached");
    let sent = image::load_from_memory(&STANDARD.decode(b64).unwrap()).unwrap();
    assert_eq!(sent.width().max(sent.height()), 256);
}

#[tokio::test]
async fn jpeg_content_with_png_name_is_accepted() {
    let server = TestServer::start(ScriptedModel::new(PAGE_JSON), |b| b).await;
    let jpeg = jpeg_bytes();

    let (status, body) = server.upload("file", "photo.png", jpeg.clone()).await;
    assert_eq!(status, StatusCode::OK, "body: {body}");

    let (message, _) = server.model.last();
    let (b64, mime) = message.image.expect("image attached");
    assert_eq!(mime, "image/jpeg");
    assert_eq!(STANDARD.decode(b64).unwrap(), jpeg);
    server.assert_upload_dir_empty();
}

// ── Input errors ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn unsupported_extension_is_rejected_before_inference() {
    let server = TestServer::start(ScriptedModel::new(PAGE_JSON), |b| b).await;

    let (status, body) = server.upload("file", "notes.txt", b"hello".to_vec()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "input_error");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Only PDF and image files are supported"));

    assert_eq!(server.model.calls(), 0);
    server.assert_upload_dir_empty();
}

#[tokio::test]
async fn missing_file_field_is_rejected() {
    let server = TestServer::start(ScriptedModel::new(PAGE_JSON), |b| b).await;

    let form = Form::new().text("comment", "no file here");
    let (status, body) = server.post(form).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("'file'"));
    assert_eq!(server.model.calls(), 0);
}

#[tokio::test]
async fn wrong_field_name_counts_as_missing() {
    let server = TestServer::start(ScriptedModel::new(PAGE_JSON), |b| b).await;

    let (status, _) = server.upload("pdf", "page.png", png_bytes(10, 10)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(server.model.calls(), 0);
}

#[tokio::test]
async fn duplicate_file_field_is_rejected() {
    let server = TestServer::start(ScriptedModel::new(PAGE_JSON), |b| b).await;

    let form = Form::new()
        .part("file", Part::bytes(png_bytes(10, 10)).file_name("a.png"))
        .part("file", Part::bytes(png_bytes(10, 10)).file_name("b.png"));
    let (status, body) = server.post(form).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("2 times"));
    assert_eq!(server.model.calls(), 0);
    server.assert_upload_dir_empty();
}

#[tokio::test]
async fn non_multipart_body_is_rejected() {
    let server = TestServer::start(ScriptedModel::new(PAGE_JSON), |b| b).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/ocr", server.url))
        .header("content-type", "application/json")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "input_error");
}

#[tokio::test]
async fn oversized_upload_is_413() {
    let server =
        TestServer::start(ScriptedModel::new(PAGE_JSON), |b| b.max_upload_bytes(1024)).await;

    let (status, body) = server.upload("file", "huge.png", vec![0u8; 128 * 1024]).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE, "body: {body}");
    assert_eq!(body["error"], "input_error");
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("too large"), "{message}");
    assert!(!message.contains("Malformed"), "{message}");
    assert_eq!(server.model.calls(), 0);
    server.assert_upload_dir_empty();
}

// ── Model failures ───────────────────────────────────────────────────────────

#[tokio::test]
async fn inference_failure_is_500_with_cause() {
    let server = TestServer::start(ScriptedModel::failing("CUDA out of memory"), |b| b).await;

    let (status, body) = server.upload("file", "page.png", png_bytes(64, 64)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "processing_error");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("CUDA out of memory"));
    assert_eq!(server.model.calls(), 1);
    server.assert_upload_dir_empty();
}

// ── Response modes ───────────────────────────────────────────────────────────

#[tokio::test]
async fn strict_mode_rejects_non_json_output() {
    let server = TestServer::start(ScriptedModel::new("Sure, the page says hello."), |b| b).await;

    let (status, body) = server.upload("file", "page.jpg", jpeg_bytes()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "output_validation_error");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("OCR result is not a valid JSON"));
    server.assert_upload_dir_empty();
}

#[tokio::test]
async fn raw_mode_returns_text_list() {
    let server = TestServer::start(ScriptedModel::new("plain words, not json"), |b| {
        b.response_mode(ResponseMode::RawText)
            .upload_field(UploadField::Pdf)
            .max_new_tokens(None)
    })
    .await;

    let (status, body) = server.upload("pdf", "page.png", png_bytes(32, 32)).await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body, serde_json::json!({ "text": ["plain words, not json"] }));

    let (_, params) = server.model.last();
    assert_eq!(params.max_new_tokens, None);
    server.assert_upload_dir_empty();
}

fn jpeg_bytes() -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 30, Rgb([90, 90, 90])));
    let mut buf = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Jpeg)
        .unwrap();
    buf
}

// ── CORS ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cors_allows_only_configured_origin() {
    let server = TestServer::start(ScriptedModel::new(PAGE_JSON), |b| {
        b.allowed_origin("http://frontend.test")
    })
    .await;
    let client = reqwest::Client::new();

    let allowed = client
        .get(format!("{}/health", server.url))
        .header("origin", "http://frontend.test")
        .send()
        .await
        .unwrap();
    assert_eq!(
        allowed.headers()["access-control-allow-origin"],
        "http://frontend.test"
    );
    assert_eq!(allowed.headers()["access-control-allow-credentials"], "true");

    let other = client
        .get(format!("{}/health", server.url))
        .header("origin", "http://elsewhere.test")
        .send()
        .await
        .unwrap();
    assert!(other.headers().get("access-control-allow-origin").is_none());
}

// ── PDF uploads (need libpdfium) ─────────────────────────────────────────────

#[tokio::test]
async fn pdf_upload_renders_first_page_with_anchor_text() {
    skip_unless_pdfium!();
    let server = TestServer::start(ScriptedModel::new(PAGE_JSON), |b| b).await;

    let (status, body) = server
        .upload("file", "letter.pdf", one_page_pdf("Hello OCR"))
        .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");

    let (message, _) = server.model.last();
    let anchor = anchor_of(message.prompt());
    assert!(anchor.starts_with("Page dimensions: 612.0x792.0"), "anchor: {anchor}");
    assert!(anchor.contains("Hello"), "anchor: {anchor}");
    assert!(anchor.chars().count() <= 4000);

    let (b64, mime) = message.image.expect("image attached");
    assert_eq!(mime, "image/png");
    let page = image::load_from_memory(&STANDARD.decode(b64).unwrap()).unwrap();
    let longest = page.width().max(page.height());
    assert!((1000..=1024).contains(&longest), "longest side {longest}");

    server.assert_upload_dir_empty();
}

#[tokio::test]
async fn anchor_respects_small_budget() {
    skip_unless_pdfium!();
    let server =
        TestServer::start(ScriptedModel::new(PAGE_JSON), |b| b.anchor_text_length(40)).await;

    let (status, _) = server.upload("file", "letter.pdf", one_page_pdf("Hello OCR")).await;
    assert_eq!(status, StatusCode::OK);

    let (message, _) = server.model.last();
    assert!(anchor_of(message.prompt()).chars().count() <= 40);
}

#[tokio::test]
async fn corrupt_pdf_is_a_processing_error() {
    skip_unless_pdfium!();
    let server = TestServer::start(ScriptedModel::new(PAGE_JSON), |b| b).await;

    let (status, body) = server
        .upload("file", "broken.pdf", b"%PDF-1.4 garbage".to_vec())
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "processing_error");
    assert_eq!(server.model.calls(), 0);
    server.assert_upload_dir_empty();
}
