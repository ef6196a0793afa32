//! CLI binary for edgequake-ocr.
//!
//! A thin shim over the library crate that maps CLI flags to `OcrConfig`,
//! binds the model provider and serves HTTP until shut down.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_ocr::pipeline::render::check_pdfium;
use edgequake_ocr::{serve, AnchorEngine, OcrConfig, OcrContext, ResponseMode, UploadField};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve olmOCR from a local vLLM server (OpenAI-compatible)
  OPENAI_BASE_URL=http://localhost:8080/v1 ocr-server --provider openai

  # Raw-text responses, accept the upload under the field name "pdf"
  ocr-server --response-mode raw-text --upload-field pdf

  # Unbounded generation length
  ocr-server --max-new-tokens 0

  # Upload a document
  curl -F file=@scan.pdf http://localhost:8000/ocr

ENVIRONMENT VARIABLES:
  EDGEQUAKE_LLM_PROVIDER  Provider used when --provider is not given
  EDGEQUAKE_MODEL         Model ID (default allenai/olmOCR-7B-0225-preview)
  OPENAI_API_KEY          API key for the openai provider
  PDFIUM_LIB_PATH         Directory or file of an existing libpdfium
"#;

/// Serve OCR over HTTP using a Vision Language Model.
#[derive(Parser, Debug)]
#[command(
    name = "ocr-server",
    version,
    about = "Serve OCR over HTTP using a Vision Language Model",
    long_about = "Accept a PDF or image upload on POST /ocr, render the first page, build an \
olmOCR prompt with anchor text from the PDF text layer and return the model's JSON answer.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "OCR_BIND", default_value = "0.0.0.0:8000")]
    bind: SocketAddr,

    /// The one origin allowed to make credentialed cross-origin requests.
    #[arg(long, env = "ALLOWED_ORIGINS", default_value = edgequake_ocr::config::DEFAULT_ALLOWED_ORIGIN)]
    allowed_origin: String,

    /// Multipart field that carries the file.
    #[arg(long, env = "OCR_UPLOAD_FIELD", value_enum, default_value = "file")]
    upload_field: UploadFieldArg,

    /// Response shape: strict-json or raw-text.
    #[arg(long, env = "OCR_RESPONSE_MODE", value_enum, default_value = "strict-json")]
    response_mode: ResponseModeArg,

    /// Max tokens to generate per request (0 = unbounded).
    #[arg(long, env = "OCR_MAX_NEW_TOKENS", default_value_t = 2048)]
    max_new_tokens: usize,

    /// Longest side of the image sent to the model, in pixels.
    #[arg(long, env = "OCR_TARGET_DIM", default_value_t = 1024)]
    target_dim: u32,

    /// Anchor text budget in characters.
    #[arg(long, env = "OCR_ANCHOR_LENGTH", default_value_t = 4000)]
    anchor_length: usize,

    /// Anchor text engine: pdf-report or plain-text.
    #[arg(long, env = "OCR_ANCHOR_ENGINE", value_enum, default_value = "pdf-report")]
    anchor_engine: AnchorEngineArg,

    /// Directory for transient upload files (default: system temp dir).
    #[arg(long, env = "OCR_UPLOAD_DIR")]
    upload_dir: Option<PathBuf>,

    /// Maximum upload size in MiB.
    #[arg(long, env = "OCR_MAX_UPLOAD_MB", default_value_t = 50)]
    max_upload_mb: usize,

    /// Model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Model provider: openai, ollama, anthropic, gemini, …
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OCR_VERBOSE")]
    verbose: bool,

    /// Suppress all logs except errors.
    #[arg(short, long, env = "OCR_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum UploadFieldArg {
    File,
    Pdf,
}

impl From<UploadFieldArg> for UploadField {
    fn from(v: UploadFieldArg) -> Self {
        match v {
            UploadFieldArg::File => UploadField::File,
            UploadFieldArg::Pdf => UploadField::Pdf,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ResponseModeArg {
    StrictJson,
    RawText,
}

impl From<ResponseModeArg> for ResponseMode {
    fn from(v: ResponseModeArg) -> Self {
        match v {
            ResponseModeArg::StrictJson => ResponseMode::StrictJson,
            ResponseModeArg::RawText => ResponseMode::RawText,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum AnchorEngineArg {
    PdfReport,
    PlainText,
}

impl From<AnchorEngineArg> for AnchorEngine {
    fn from(v: AnchorEngineArg) -> Self {
        match v {
            AnchorEngineArg::PdfReport => AnchorEngine::PdfReport,
            AnchorEngineArg::PlainText => AnchorEngine::PlainText,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── PDFium must be loadable before we accept uploads ─────────────────
    check_pdfium().context("PDFium engine is not available")?;

    let config = build_config(&cli)?;
    let addr = config.bind_address;

    let ctx = OcrContext::from_config(config).context("Failed to initialise model provider")?;
    info!("Configuration: {:?}", ctx.config);

    serve(Arc::new(ctx), addr).await.context("Server failed")?;
    Ok(())
}

/// Map CLI args to `OcrConfig`.
fn build_config(cli: &Cli) -> Result<OcrConfig> {
    let max_new_tokens = match cli.max_new_tokens {
        0 => None,
        n => Some(n),
    };

    let mut builder = OcrConfig::builder()
        .bind_address(cli.bind)
        .allowed_origin(cli.allowed_origin.clone())
        .upload_field(cli.upload_field.clone().into())
        .response_mode(cli.response_mode.clone().into())
        .max_new_tokens(max_new_tokens)
        .target_longest_image_dim(cli.target_dim)
        .anchor_text_length(cli.anchor_length)
        .anchor_engine(cli.anchor_engine.clone().into())
        .max_upload_bytes(cli.max_upload_mb.saturating_mul(1024 * 1024));

    if let Some(ref dir) = cli.upload_dir {
        builder = builder.upload_dir(dir.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }

    builder.build().context("Invalid configuration")
}
