//! Eager (whole-document) conversion entry points.
//!
//! These helpers buffer the complete bitmap, or write it to a file, before
//! returning. Use [`crate::stream::convert_stream`] or
//! [`crate::transform::RasterTransform`] directly to process output as it
//! is produced.

use crate::config::TransformConfig;
use crate::error::RasterError;
use crate::output::{ConversionOutput, ConversionStats};
use crate::stream::{convert_reader, convert_stream, ConversionStream};
use futures::stream::{self, StreamExt};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Convert an in-memory PDF into an in-memory bitmap.
///
/// The document is handed to the engine in `config.chunk_size` pieces.
///
/// # Example
/// ```rust,no_run
/// use pdf2bmp::{convert_bytes, TransformConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let pdf = std::fs::read("invoice.pdf")?;
/// let config = TransformConfig::builder().engine_path("/usr/bin/gs").build()?;
/// let output = convert_bytes(&pdf, &config).await?;
/// std::fs::write("invoice.bmp", &output.bitmap)?;
/// # Ok(())
/// # }
/// ```
pub async fn convert_bytes(
    pdf: &[u8],
    config: &TransformConfig,
) -> Result<ConversionOutput, RasterError> {
    let chunks: Vec<io::Result<Vec<u8>>> = pdf
        .chunks(config.chunk_size.max(1))
        .map(|c| Ok(c.to_vec()))
        .collect();
    debug!("Converting {} bytes in {} chunks", pdf.len(), chunks.len());
    collect_bitmap(convert_stream(stream::iter(chunks), config)?).await
}

/// Drain a [`ConversionStream`] into a single buffer.
pub async fn collect_bitmap(mut stream: ConversionStream) -> Result<ConversionOutput, RasterError> {
    let mut bitmap = Vec::new();
    while let Some(chunk) = stream.next().await {
        bitmap.extend_from_slice(&chunk?);
    }
    Ok(ConversionOutput {
        bitmap,
        stats: stream.stats(),
    })
}

/// Convert a PDF file and write the bitmap to `output_path`.
///
/// Uses atomic write (temp file + rename) so a failed conversion never
/// leaves a truncated bitmap behind.
pub async fn convert_to_file(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &TransformConfig,
) -> Result<ConversionStats, RasterError> {
    let input_path = input_path.as_ref();
    let path = output_path.as_ref();
    info!("Converting {} → {}", input_path.display(), path.display());

    let file = tokio::fs::File::open(input_path)
        .await
        .map_err(|e| RasterError::InputOpenFailed {
            path: input_path.to_path_buf(),
            source: Arc::new(e),
        })?;
    let stream = convert_reader(file, config)?;
    write_atomically(stream, path).await
}

/// Write everything `stream` yields to `path` via a sibling temp file.
pub async fn write_atomically(
    mut stream: ConversionStream,
    path: &Path,
) -> Result<ConversionStats, RasterError> {
    let write_err = |e: io::Error| RasterError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: Arc::new(e),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("bmp.tmp");
    let mut out = tokio::fs::File::create(&tmp_path).await.map_err(write_err)?;

    let copied = async {
        while let Some(chunk) = stream.next().await {
            out.write_all(&chunk?).await.map_err(write_err)?;
        }
        out.flush().await.map_err(write_err)
    }
    .await;
    drop(out);

    if let Err(e) = copied {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(stream.stats())
}

/// Synchronous wrapper around [`convert_bytes`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(pdf: &[u8], config: &TransformConfig) -> Result<ConversionOutput, RasterError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| RasterError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert_bytes(pdf, config))
}
