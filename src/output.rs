//! Conversion results and statistics.

use serde::Serialize;

/// Counters collected while a conversion runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversionStats {
    /// PDF bytes written into the engine.
    pub input_bytes: u64,
    /// Number of input chunks.
    pub input_chunks: u64,
    /// Bitmap bytes read back.
    pub output_bytes: u64,
    /// Number of output chunks.
    pub output_chunks: u64,
    /// Wall-clock time from spawn to completion.
    pub duration_ms: u64,
}

/// A fully buffered conversion result.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    /// The complete bitmap as produced by the engine.
    #[serde(skip)]
    pub bitmap: Vec<u8>,
    pub stats: ConversionStats,
}
