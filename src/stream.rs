//! Streaming conversion API: emit bitmap chunks as the engine produces them.
//!
//! [`convert_stream`] wraps [`RasterTransform::pipe`] with byte counters and
//! the configured progress callback. The returned [`ConversionStream`]
//! yields `Ok(chunk)` items and, if the conversion fails, one final `Err`.

use crate::config::TransformConfig;
use crate::error::RasterError;
use crate::output::ConversionStats;
use crate::progress::ProgressCallback;
use crate::transform::{BitmapStream, RasterTransform};
use futures::stream::{self, Stream, StreamExt};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::info;

#[derive(Debug, Default)]
struct Counters {
    input_bytes: AtomicU64,
    input_chunks: AtomicU64,
    output_bytes: AtomicU64,
    output_chunks: AtomicU64,
}

impl Counters {
    fn record_input(&self, len: usize) {
        self.input_bytes.fetch_add(len as u64, Ordering::Relaxed);
        self.input_chunks.fetch_add(1, Ordering::Relaxed);
    }

    fn record_output(&self, len: usize) {
        self.output_bytes.fetch_add(len as u64, Ordering::Relaxed);
        self.output_chunks.fetch_add(1, Ordering::Relaxed);
    }
}

/// A bitmap stream that keeps conversion statistics.
pub struct ConversionStream {
    inner: BitmapStream,
    counters: Arc<Counters>,
    started: Instant,
    callback: Option<ProgressCallback>,
    /// Wall time, frozen when the stream ends.
    duration_ms: Option<u64>,
}

impl ConversionStream {
    /// Statistics gathered so far. Final once the stream has ended.
    pub fn stats(&self) -> ConversionStats {
        ConversionStats {
            input_bytes: self.counters.input_bytes.load(Ordering::Relaxed),
            input_chunks: self.counters.input_chunks.load(Ordering::Relaxed),
            output_bytes: self.counters.output_bytes.load(Ordering::Relaxed),
            output_chunks: self.counters.output_chunks.load(Ordering::Relaxed),
            duration_ms: self.duration_ms.unwrap_or_else(|| self.elapsed_ms()),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

impl Stream for ConversionStream {
    type Item = Result<Vec<u8>, RasterError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.duration_ms.is_some() {
            return Poll::Ready(None);
        }
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                self.counters.record_output(chunk.len());
                if let Some(cb) = &self.callback {
                    cb.on_output_chunk(chunk.len());
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                self.duration_ms = Some(self.elapsed_ms());
                if let Some(cb) = &self.callback {
                    cb.on_conversion_error(&e.to_string());
                }
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.duration_ms = Some(self.elapsed_ms());
                let stats = self.stats();
                info!(
                    "Conversion complete: {} bytes in, {} bytes out, {}ms",
                    stats.input_bytes, stats.output_bytes, stats.duration_ms
                );
                if let Some(cb) = &self.callback {
                    cb.on_conversion_complete(&stats);
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Convert a stream of PDF chunks, yielding bitmap chunks as they arrive.
///
/// # Returns
/// - `Ok(ConversionStream)` once the engine has been started
/// - `Err(RasterError)` for configuration errors (no engine path, bad
///   resolution). Spawn and runtime failures arrive through the stream.
pub fn convert_stream<S>(input: S, config: &TransformConfig) -> Result<ConversionStream, RasterError>
where
    S: Stream<Item = io::Result<Vec<u8>>> + Send + 'static,
{
    let transform = RasterTransform::from_config(config)?;
    let callback = config.progress_callback.clone();
    if let Some(cb) = &callback {
        cb.on_conversion_start(transform.invocation());
    }

    let counters = Arc::new(Counters::default());
    let metered = {
        let counters = Arc::clone(&counters);
        let callback = callback.clone();
        input.inspect(move |chunk| {
            if let Ok(c) = chunk {
                counters.record_input(c.len());
                if let Some(cb) = &callback {
                    cb.on_input_chunk(c.len());
                }
            }
        })
    };

    Ok(ConversionStream {
        inner: transform.pipe(metered),
        counters,
        started: Instant::now(),
        callback,
        duration_ms: None,
    })
}

/// Convert everything `reader` yields, reading `config.chunk_size` at a time.
pub fn convert_reader<R>(reader: R, config: &TransformConfig) -> Result<ConversionStream, RasterError>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    convert_stream(read_chunks(reader, config.chunk_size), config)
}

/// Turn an `AsyncRead` into a stream of owned chunks of at most `chunk_size`.
pub fn read_chunks<R>(reader: R, chunk_size: usize) -> impl Stream<Item = io::Result<Vec<u8>>> + Send
where
    R: AsyncRead + Send + Unpin,
{
    let chunk_size = chunk_size.max(1);
    stream::unfold(Some(reader), move |state| async move {
        let mut reader = state?;
        let mut buf = vec![0u8; chunk_size];
        match reader.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(buf), Some(reader)))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
}
