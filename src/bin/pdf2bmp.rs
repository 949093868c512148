//! CLI binary for pdf2bmp.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `TransformConfig` and moves bytes between files/stdio and the engine.

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2bmp::convert::write_atomically;
use pdf2bmp::{
    convert_reader, ConversionProgressCallback, ConversionStats, ConversionStream,
    EngineInvocation, ProgressCallback, RasterEngine, ResolutionSpec, TransformConfig,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal spinner showing bytes sent to and received from the engine.
struct CliProgressCallback {
    bar: ProgressBar,
    input: AtomicU64,
    output: AtomicU64,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Starting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            input: AtomicU64::new(0),
            output: AtomicU64::new(0),
        })
    }

    fn refresh(&self) {
        self.bar.set_message(format!(
            "{} in  /  {} out",
            human_bytes(self.input.load(Ordering::Relaxed)),
            human_bytes(self.output.load(Ordering::Relaxed)),
        ));
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, _invocation: &EngineInvocation) {
        self.bar.set_prefix("Rasterising");
        self.refresh();
    }

    fn on_input_chunk(&self, len: usize) {
        self.input.fetch_add(len as u64, Ordering::Relaxed);
        self.refresh();
    }

    fn on_output_chunk(&self, len: usize) {
        self.output.fetch_add(len as u64, Ordering::Relaxed);
        self.refresh();
    }

    fn on_conversion_complete(&self, stats: &ConversionStats) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} bitmap  {}",
            green("✔"),
            bold(&human_bytes(stats.output_bytes)),
            dim(&format!("{}ms", stats.duration_ms)),
        );
    }

    fn on_conversion_error(&self, error: &str) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", red("✘"), red(error));
    }
}

fn human_bytes(n: u64) -> String {
    match n {
        n if n >= 1 << 20 => format!("{:.1} MiB", n as f64 / (1u64 << 20) as f64),
        n if n >= 1 << 10 => format!("{:.1} KiB", n as f64 / (1u64 << 10) as f64),
        n => format!("{n} B"),
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Rasterise to a file at the default 300 DPI, 1025x1500 page
  pdf2bmp label.pdf -o label.bmp

  # Read from stdin, write to stdout
  cat label.pdf | pdf2bmp - > label.bmp

  # 203 DPI thermal label, 4x6 inch page (400x600 hundredths)
  pdf2bmp --dpi 203 --width 400 --height 600 label.pdf -o label.bmp

  # Show the Ghostscript command line without running it
  pdf2bmp --print-args label.pdf

  # JSON statistics
  pdf2bmp --json label.pdf -o label.bmp

GEOMETRY:
  Page width/height are logical units; the pixel size passed to Ghostscript
  is floor(dpi * dimension / 254).  300 DPI over 1025x1500 → -g1211x1771.

ENVIRONMENT VARIABLES:
  GS_EXE            Path to the Ghostscript executable (required unless --gs)
  PDF2BMP_DPI       Default DPI
  RUST_LOG          Log filter (overrides -v / -q)
"#;

/// Rasterise PDF documents to monochrome BMP via Ghostscript.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2bmp",
    version,
    about = "Rasterise PDF documents to monochrome BMP via Ghostscript",
    long_about = "Pipe a PDF document through Ghostscript's bmpmono device and write the \
resulting 1-bit bitmap to a file or stdout. Ghostscript runs as a child process; its \
diagnostics are forwarded to stderr.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file path, or "-" to read from stdin.
    input: String,

    /// Write the bitmap to this file instead of stdout.
    #[arg(short, long, env = "PDF2BMP_OUTPUT")]
    output: Option<PathBuf>,

    /// Ghostscript executable.
    #[arg(long = "gs", env = "GS_EXE")]
    engine: Option<PathBuf>,

    /// Rendering DPI.
    #[arg(long, env = "PDF2BMP_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(1..))]
    dpi: u32,

    /// Logical page width.
    #[arg(long, default_value_t = 1025.0)]
    width: f64,

    /// Logical page height.
    #[arg(long, default_value_t = 1500.0)]
    height: f64,

    /// Bytes read from the input per chunk.
    #[arg(long, default_value_t = pdf2bmp::config::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Print the engine command line and exit.
    #[arg(long)]
    print_args: bool,

    /// Print conversion statistics as JSON (requires --output).
    #[arg(long, requires = "output")]
    json: bool,

    /// Discard Ghostscript's stderr instead of forwarding it.
    #[arg(long)]
    quiet_engine: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "PDF2BMP_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2BMP_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2BMP_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.print_args;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
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

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Print-args mode ──────────────────────────────────────────────────
    if cli.print_args {
        let engine = RasterEngine::from_config(&config).context("Cannot locate Ghostscript")?;
        let invocation = engine
            .invocation(&config.resolution)
            .context("Invalid resolution")?;
        println!("{} {}", engine.path().display(), invocation);
        return Ok(());
    }

    // ── Run conversion ───────────────────────────────────────────────────
    let stream = open_input(&cli, &config).await?;

    if let Some(ref output_path) = cli.output {
        let stats = write_atomically(stream, output_path)
            .await
            .context("Conversion failed")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&stats).context("Failed to serialise stats")?
            );
        } else if !cli.quiet && !show_progress {
            eprintln!(
                "{}  {} → {}  {}ms",
                green("✔"),
                human_bytes(stats.output_bytes),
                bold(&output_path.display().to_string()),
                stats.duration_ms,
            );
        }
    } else {
        write_stdout(stream).await?;
    }

    Ok(())
}

/// Map CLI args to `TransformConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<TransformConfig> {
    let resolution =
        ResolutionSpec::new(cli.dpi, cli.width, cli.height).context("Invalid page geometry")?;

    let mut builder = TransformConfig::builder()
        .resolution(resolution)
        .forward_stderr(!cli.quiet_engine)
        .chunk_size(cli.chunk_size);

    if let Some(ref engine) = cli.engine {
        builder = builder.engine_path(engine);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Start the conversion from a file or stdin.
async fn open_input(cli: &Cli, config: &TransformConfig) -> Result<ConversionStream> {
    if cli.input == "-" {
        return convert_reader(tokio::io::stdin(), config).context("Failed to start conversion");
    }

    let file = tokio::fs::File::open(&cli.input)
        .await
        .with_context(|| format!("Failed to open PDF '{}'", cli.input))?;
    convert_reader(file, config).context("Failed to start conversion")
}

/// Copy the bitmap to stdout as it arrives.
async fn write_stdout(mut stream: ConversionStream) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Conversion failed")?;
        stdout
            .write_all(&chunk)
            .await
            .context("Failed to write to stdout")?;
    }
    stdout.flush().await.context("Failed to flush stdout")?;
    Ok(())
}
