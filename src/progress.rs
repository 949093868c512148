//! Progress-callback trait for conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::TransformConfigBuilder::progress_callback`] to observe a
//! conversion driven by the [`crate::convert`] helpers: the engine command
//! line, every chunk sent in and read out, and the final outcome.
//!
//! # Example
//!
//! ```rust
//! use pdf2bmp::{ConversionProgressCallback, TransformConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct ByteCounter {
//!     out: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for ByteCounter {
//!     fn on_output_chunk(&self, len: usize) {
//!         self.out.fetch_add(len, Ordering::Relaxed);
//!     }
//! }
//!
//! let counter = Arc::new(ByteCounter { out: AtomicUsize::new(0) });
//!
//! let config = TransformConfig::builder()
//!     .engine_path("/usr/bin/gs")
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::command::EngineInvocation;
use crate::output::ConversionStats;
use std::sync::Arc;

/// Called by the conversion helpers as bytes flow through the engine.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Input and output events come from different tasks
/// and may interleave.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once, right after the engine process was started.
    fn on_conversion_start(&self, invocation: &EngineInvocation) {
        let _ = invocation;
    }

    /// Called for every chunk of PDF bytes taken from the input, just before
    /// it is written to the engine.
    fn on_input_chunk(&self, len: usize) {
        let _ = len;
    }

    /// Called for every chunk of bitmap bytes read from the engine.
    fn on_output_chunk(&self, len: usize) {
        let _ = len;
    }

    /// Called once when the engine finished and its output was drained.
    fn on_conversion_complete(&self, stats: &ConversionStats) {
        let _ = stats;
    }

    /// Called once when the conversion failed.
    fn on_conversion_error(&self, error: &str) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::TransformConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
