//! # pdf2bmp
//!
//! Stream PDF documents through Ghostscript and get monochrome bitmaps back.
//!
//! ## Why a subprocess?
//!
//! Ghostscript is the reference PDF interpreter and its `bmpmono` device
//! produces exactly the 1-bit BMP that fax gateways, label printers and
//! thermal-print pipelines want. Linking it is a licensing and build-system
//! headache; running the `gs` binary is not. This crate makes that binary
//! look like any other async byte transform: PDF chunks go in, BMP chunks
//! come out, and every process or pipe failure arrives through one error
//! channel.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Resolution  dpi + page size → pixel geometry (floor(dpi·dim/254))
//!  ├─ 2. Command     -sDEVICE=bmpmono -sOutputFile=%stdout -q -r… -g… -dPDFFitPage -
//!  ├─ 3. Session     gs child process, stdin ← chunks, stdout → pump task
//!  └─ 4. Transform   write / finish / output, first error latched
//!  │
//! BMP bytes
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2bmp::{RasterTransform, ResolutionSpec};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Engine path from GS_EXE
//!     let mut t = RasterTransform::new(None, ResolutionSpec::default())?;
//!     let mut output = t.output().expect("fresh transform");
//!
//!     t.write(std::fs::read("label.pdf")?).await?;
//!     t.finish().await?;
//!
//!     let mut bmp = Vec::new();
//!     while let Some(chunk) = output.next().await {
//!         bmp.extend_from_slice(&chunk);
//!     }
//!     std::fs::write("label.bmp", bmp)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2bmp` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod command;
pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod output;
pub mod progress;
pub mod resolution;
pub mod session;
pub mod stream;
pub mod transform;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use command::{build_invocation, EngineInvocation};
pub use config::{TransformConfig, TransformConfigBuilder, ENGINE_ENV_VAR};
pub use convert::{collect_bitmap, convert_bytes, convert_sync, convert_to_file};
pub use engine::RasterEngine;
pub use error::{ErrorKind, RasterError};
pub use output::{ConversionOutput, ConversionStats};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use resolution::ResolutionSpec;
pub use session::SessionState;
pub use stream::{convert_reader, convert_stream, ConversionStream};
pub use transform::{BitmapStream, OutputStream, RasterTransform};
