//! CLI binary for edgequake-img2json.
//!
//! A thin shim over the library crate: `analyze` runs the pipeline once and
//! prints the JSON result, `serve` starts the HTTP adapter.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_img2json::{
    analyze_request, server, AnalysisConfig, AnalysisProgressCallback, AnalysisRequest,
    FetchPolicy, FetchStrategy, ProgressCallback, ResponseSchema, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner that shows the current pipeline stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Analysing");
        bar.set_message("starting…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_stage(&self, stage: Stage) {
        match stage {
            Stage::Normalized => self.bar.set_message("downloading images…"),
            Stage::Fetched => self.bar.set_message("encoding…"),
            Stage::Assembled => self.bar.set_message("waiting for the model…"),
            Stage::Inferred => self.bar.set_message("parsing answer…"),
            Stage::Done | Stage::Failed(_) => self.bar.finish_and_clear(),
            Stage::Received | Stage::Extracted => {}
        }
    }

    fn on_image_fetched(&self, index: usize, total: usize, bytes: usize) {
        self.bar.println(format!(
            "  {} image {}/{}  {}",
            green("✓"),
            index + 1,
            total,
            dim(&format!("{:.1} KB", bytes as f64 / 1024.0)),
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse one photo (scheme-less URLs are repaired to https://)
  img2json analyze cdn.example.com/bags/123/front.jpg

  # Several photos of the same item in one model call
  img2json analyze https://cdn.example.com/a.jpg https://cdn.example.com/b.jpg

  # Compact condition report, downloads in parallel
  img2json analyze --schema condition --concurrency 4 URL1 URL2 URL3

  # Run the HTTP adapter
  img2json serve --bind 0.0.0.0:8080
  curl -X POST localhost:8080/api/analyze -d '{"imageUrl":"//cdn.example.com/x.jpg"}'

ENVIRONMENT VARIABLES:
  GEMINI_API           Gemini API key (GEMINI_API_KEY also accepted)
  IMG2JSON_MODEL       Model ID (default gemini-2.5-pro)
  IMG2JSON_BASE_URL    REST base URL (default https://generativelanguage.googleapis.com/v1beta)
  IMG2JSON_SCHEMA      listing | condition
  RUST_LOG             Log filter, overrides --verbose / --quiet
"#;

/// Describe photographed items as structured JSON using Gemini vision.
#[derive(Parser, Debug)]
#[command(
    name = "img2json",
    version,
    about = "Describe photographed second-hand items as structured JSON using Gemini vision",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "IMG2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "IMG2JSON_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse one or more image URLs and print the JSON result.
    Analyze(AnalyzeArgs),
    /// Serve the pipeline over HTTP (POST /api/analyze).
    Serve(ServeArgs),
}

/// Options shared by `analyze` and `serve`.
#[derive(Args, Debug)]
struct PipelineArgs {
    /// Gemini model ID (e.g. gemini-2.5-pro, gemini-2.5-flash).
    #[arg(long, env = "IMG2JSON_MODEL")]
    model: Option<String>,

    /// JSON shape to ask for.
    #[arg(long, env = "IMG2JSON_SCHEMA", value_enum, default_value = "listing")]
    schema: SchemaArg,

    /// Path to a text file containing a custom instruction prompt.
    #[arg(long, env = "IMG2JSON_INSTRUCTION")]
    instruction: Option<PathBuf>,

    /// Concurrent image downloads (1 = sequential).
    #[arg(short, long, env = "IMG2JSON_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Skip images that fail to download instead of aborting.
    #[arg(long, env = "IMG2JSON_BEST_EFFORT")]
    best_effort: bool,

    /// Sampling temperature (0.0–2.0). Omitted from the request if unset.
    #[arg(long, env = "IMG2JSON_TEMPERATURE")]
    temperature: Option<f32>,

    /// Request `application/json` output from the model.
    #[arg(long, env = "IMG2JSON_JSON_MODE")]
    json_mode: bool,

    /// Per-image download timeout in seconds.
    #[arg(long, env = "IMG2JSON_DOWNLOAD_TIMEOUT")]
    download_timeout: Option<u64>,

    /// Model call timeout in seconds.
    #[arg(long, env = "IMG2JSON_API_TIMEOUT")]
    api_timeout: Option<u64>,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Image URLs. One URL is sent as `imageUrl`, several as `imageUrls`.
    #[arg(required = true)]
    urls: Vec<String>,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Pretty-print the JSON result.
    #[arg(long)]
    pretty: bool,

    /// Print token and timing statistics to stderr.
    #[arg(long)]
    stats: bool,

    /// Disable the spinner.
    #[arg(long, env = "IMG2JSON_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "IMG2JSON_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum SchemaArg {
    Listing,
    Condition,
}

impl From<SchemaArg> for ResponseSchema {
    fn from(v: SchemaArg) -> Self {
        match v {
            SchemaArg::Listing => ResponseSchema::Listing,
            SchemaArg::Condition => ResponseSchema::Condition,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback `analyze` needs, so library INFO
    // logs are only shown for `serve` unless --verbose.
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        match cli.command {
            Command::Analyze(_) => "warn",
            Command::Serve(_) => "info",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Analyze(ref args) => run_analyze(args, cli.quiet).await,
        Command::Serve(ref args) => run_serve(args).await,
    }
}

async fn run_analyze(args: &AnalyzeArgs, quiet: bool) -> Result<()> {
    let show_progress = !quiet && !args.no_progress;
    let progress = show_progress.then(CliProgressCallback::new);

    let mut config = build_config(&args.pipeline).await?;
    if let Some(cb) = progress {
        config.progress_callback = Some(cb as ProgressCallback);
    }

    let request = request_from_urls(&args.urls);

    match analyze_request(&request, &config).await {
        Ok(output) => {
            let json = if args.pretty {
                serde_json::to_string_pretty(&output.result)
            } else {
                serde_json::to_string(&output.result)
            }
            .context("Failed to serialise result")?;

            let stdout = io::stdout();
            let mut handle = stdout.lock();
            writeln!(handle, "{json}").context("Failed to write to stdout")?;

            if let Some(warning) = output.result.warning() {
                if !quiet {
                    eprintln!("{} {}", yellow("⚠"), warning);
                }
            }
            if args.stats {
                let s = &output.stats;
                eprintln!(
                    "   {} image(s), {} bytes  /  {} tokens in  /  {} tokens out  /  {}ms total",
                    s.image_count,
                    s.fetched_bytes,
                    dim(&s.prompt_tokens.to_string()),
                    dim(&s.output_tokens.to_string()),
                    s.total_duration_ms,
                );
            }
            Ok(())
        }
        Err(e) => {
            let body = serde_json::to_string(&e.to_body()).unwrap_or_else(|_| e.to_string());
            eprintln!("{} {}", red("✘"), body);
            std::process::exit(if e.is_client_error() { 2 } else { 1 });
        }
    }
}

async fn run_serve(args: &ServeArgs) -> Result<()> {
    let config = build_config(&args.pipeline).await?;
    server::serve(args.bind, Arc::new(config))
        .await
        .with_context(|| format!("Server on {} failed", args.bind))
}

/// Map CLI args and environment to `AnalysisConfig`.
async fn build_config(args: &PipelineArgs) -> Result<AnalysisConfig> {
    let base = AnalysisConfig::from_env().context("Invalid configuration")?;

    let instruction = if let Some(ref path) = args.instruction {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read instruction from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = AnalysisConfig::builder()
        .api_key(base.api_key)
        .base_url(base.base_url)
        .model(args.model.clone().unwrap_or(base.model))
        .schema(args.schema.clone().into())
        .fetch_strategy(strategy_for(args.concurrency))
        .fetch_policy(if args.best_effort {
            FetchPolicy::BestEffort
        } else {
            FetchPolicy::FailFast
        })
        .json_response(args.json_mode);

    if let Some(t) = args.temperature {
        builder = builder.temperature(t);
    }
    if let Some(text) = instruction {
        builder = builder.instruction(text);
    }
    if let Some(secs) = args.download_timeout {
        builder = builder.download_timeout_secs(secs);
    }
    if let Some(secs) = args.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }

    builder.build().context("Invalid configuration")
}

fn strategy_for(concurrency: usize) -> FetchStrategy {
    if concurrency <= 1 {
        FetchStrategy::Sequential
    } else {
        FetchStrategy::Concurrent { limit: concurrency }
    }
}

/// One URL → `imageUrl`, several → `imageUrls`, exactly like an HTTP client would send.
fn request_from_urls(urls: &[String]) -> AnalysisRequest {
    match urls {
        [single] => AnalysisRequest {
            image_url: Some(Value::String(single.clone())),
            image_urls: None,
        },
        many => AnalysisRequest {
            image_url: None,
            image_urls: Some(Value::Array(
                many.iter().cloned().map(Value::String).collect(),
            )),
        },
    }
}
