//! Configuration types for PDF-to-bitmap conversion.
//!
//! All transform behaviour is controlled through [`TransformConfig`], built
//! via its [`TransformConfigBuilder`]. The engine path is the only value
//! that has an environment fallback: when it is not set explicitly,
//! [`ENGINE_ENV_VAR`] is consulted at transform construction time.

use crate::error::RasterError;
use crate::progress::ProgressCallback;
use crate::resolution::ResolutionSpec;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable naming the Ghostscript executable.
pub const ENGINE_ENV_VAR: &str = "GS_EXE";

/// Default read size for the file and reader helpers (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Configuration for a PDF-to-bitmap transform.
///
/// # Example
/// ```rust
/// use pdf2bmp::{ResolutionSpec, TransformConfig};
///
/// let config = TransformConfig::builder()
///     .engine_path("/usr/bin/gs")
///     .resolution(ResolutionSpec::new(150, 850.0, 1100.0).unwrap())
///     .build()
///     .unwrap();
/// assert_eq!(config.resolution.geometry(), "501x649");
/// ```
#[derive(Clone)]
pub struct TransformConfig {
    /// Path to the Ghostscript binary. If None, read from `GS_EXE`.
    pub engine_path: Option<PathBuf>,

    /// Target DPI and logical page size. Default: 300 DPI, 1025 x 1500.
    pub resolution: ResolutionSpec,

    /// Forward the engine's stderr to this process's stderr. Default: true.
    ///
    /// When false the engine's diagnostics are discarded.
    pub forward_stderr: bool,

    /// Read size used when the helpers pull PDF bytes from a file or reader.
    /// Default: 64 KiB.
    pub chunk_size: usize,

    /// Optional progress observer used by the [`crate::convert`] helpers.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            engine_path: None,
            resolution: ResolutionSpec::default(),
            forward_stderr: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for TransformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformConfig")
            .field("engine_path", &self.engine_path)
            .field("resolution", &self.resolution)
            .field("forward_stderr", &self.forward_stderr)
            .field("chunk_size", &self.chunk_size)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl TransformConfig {
    /// Create a new builder for `TransformConfig`.
    pub fn builder() -> TransformConfigBuilder {
        TransformConfigBuilder {
            config: Self::default(),
        }
    }

    /// The engine path this config resolves to right now.
    pub fn resolve_engine_path(&self) -> Result<PathBuf, RasterError> {
        resolve_engine_path(self.engine_path.as_deref())
    }
}

/// Builder for [`TransformConfig`].
#[derive(Debug)]
pub struct TransformConfigBuilder {
    config: TransformConfig,
}

impl TransformConfigBuilder {
    pub fn engine_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.engine_path = Some(path.into());
        self
    }

    pub fn resolution(mut self, resolution: ResolutionSpec) -> Self {
        self.config.resolution = resolution;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.resolution.dpi = dpi;
        self
    }

    pub fn page_size(mut self, width: f64, height: f64) -> Self {
        self.config.resolution.width = width;
        self.config.resolution.height = height;
        self
    }

    pub fn forward_stderr(mut self, v: bool) -> Self {
        self.config.forward_stderr = v;
        self
    }

    pub fn chunk_size(mut self, n: usize) -> Self {
        self.config.chunk_size = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// The engine path is *not* resolved here; a missing path surfaces when a
    /// transform is created so that `GS_EXE` is read as late as possible.
    pub fn build(self) -> Result<TransformConfig, RasterError> {
        let c = &self.config;
        c.resolution.validate()?;
        if c.chunk_size == 0 {
            return Err(RasterError::InvalidConfig(
                "Chunk size must be ≥ 1".into(),
            ));
        }
        if let Some(p) = &c.engine_path {
            if p.as_os_str().is_empty() {
                return Err(RasterError::InvalidConfig(
                    "Engine path must not be empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

/// Resolve the engine executable: explicit path first, then `GS_EXE`.
///
/// Empty values count as absent.
pub fn resolve_engine_path(explicit: Option<&Path>) -> Result<PathBuf, RasterError> {
    if let Some(p) = explicit.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(p.to_path_buf());
    }

    match std::env::var_os(ENGINE_ENV_VAR) {
        Some(v) if !v.is_empty() => Ok(PathBuf::from(v)),
        _ => Err(RasterError::EngineNotConfigured {
            env_var: ENGINE_ENV_VAR,
        }),
    }
}
