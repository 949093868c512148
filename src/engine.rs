//! Reusable engine handle.
//!
//! [`RasterEngine`] resolves the Ghostscript path once and then mints any
//! number of independent [`RasterTransform`]s, each with its own process.
//! Useful when one service converts many documents at different sizes.

use crate::command::{build_invocation, EngineInvocation};
use crate::config::{resolve_engine_path, TransformConfig};
use crate::error::RasterError;
use crate::resolution::ResolutionSpec;
use crate::transform::RasterTransform;
use std::path::{Path, PathBuf};

/// A resolved engine executable.
#[derive(Debug, Clone)]
pub struct RasterEngine {
    path: PathBuf,
    forward_stderr: bool,
}

impl RasterEngine {
    /// Resolve the engine from `path`, or `GS_EXE` when `path` is `None`.
    pub fn new(path: Option<&Path>) -> Result<Self, RasterError> {
        Ok(Self {
            path: resolve_engine_path(path)?,
            forward_stderr: true,
        })
    }

    /// Resolve the engine from `GS_EXE` only.
    pub fn from_env() -> Result<Self, RasterError> {
        Self::new(None)
    }

    /// Resolve the engine the way `config` would.
    pub fn from_config(config: &TransformConfig) -> Result<Self, RasterError> {
        Ok(Self {
            path: config.resolve_engine_path()?,
            forward_stderr: config.forward_stderr,
        })
    }

    /// Discard (false) or forward (true) the engine's stderr.
    pub fn forward_stderr(mut self, v: bool) -> Self {
        self.forward_stderr = v;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The arguments a transform at `resolution` would start the engine with.
    pub fn invocation(&self, resolution: &ResolutionSpec) -> Result<EngineInvocation, RasterError> {
        build_invocation(resolution)
    }

    /// Start a new transform at `resolution`.
    pub fn transform(&self, resolution: ResolutionSpec) -> Result<RasterTransform, RasterError> {
        let invocation = build_invocation(&resolution)?;
        Ok(RasterTransform::start(
            self.path.clone(),
            invocation,
            self.forward_stderr,
        ))
    }
}
