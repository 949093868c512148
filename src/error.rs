//! Error types for the pdf2bmp library.
//!
//! A single error type, [`RasterError`], travels through the one error channel
//! a transform exposes. It is `Clone` because a conversion session latches the
//! first failure and hands the *same* value back to every later operation;
//! I/O errors are therefore held behind an `Arc`.
//!
//! [`RasterError::kind`] groups the variants into the coarse categories
//! callers usually branch on:
//!
//! * [`ErrorKind::Configuration`]: raised synchronously, before any process
//!   is spawned (missing engine path, unusable resolution).
//! * [`ErrorKind::Spawn`]: the engine binary could not be started.
//! * [`ErrorKind::Runtime`]: the engine died or a pipe failed mid-conversion.
//! * [`ErrorKind::Input`] / [`ErrorKind::Output`]: the caller's side of the
//!   I/O (reading the PDF, writing the bitmap).

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// All errors returned by the pdf2bmp library.
#[derive(Debug, Clone, Error)]
pub enum RasterError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// No engine path was supplied and the environment variable is unset.
    #[error(
        "Ghostscript executable not configured.\n\
Pass the path explicitly or set the {env_var} environment variable."
    )]
    EngineNotConfigured { env_var: &'static str },

    /// DPI or page dimensions would produce an unusable geometry.
    #[error("Invalid resolution: {0}")]
    InvalidResolution(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Process errors ────────────────────────────────────────────────────
    /// The engine process could not be started.
    #[error("Failed to start engine '{path}': {source}\nCheck the path exists and is executable.")]
    SpawnFailed {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    /// The engine exited with a non-zero status (or was killed by a signal).
    #[error("Engine exited abnormally ({})", describe_exit(.code))]
    EngineExited { code: Option<i32> },

    /// Writing a chunk into the engine's stdin failed.
    #[error("Failed to write to engine stdin: {source}")]
    StdinWrite {
        #[source]
        source: Arc<io::Error>,
    },

    /// Reading the engine's stdout failed.
    #[error("Failed to read engine stdout: {source}")]
    StdoutRead {
        #[source]
        source: Arc<io::Error>,
    },

    // ── Caller I/O errors ─────────────────────────────────────────────────
    /// A write or finish was attempted after input had already ended.
    #[error("Input already ended; the transform accepts no further data")]
    InputClosed,

    /// The caller-supplied input stream yielded an error.
    #[error("Failed to read PDF input: {source}")]
    InputRead {
        #[source]
        source: Arc<io::Error>,
    },

    /// The input PDF file could not be opened.
    #[error("Failed to open PDF '{path}': {source}")]
    InputOpenFailed {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    /// Could not create or write the output bitmap file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`RasterError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Spawn,
    Runtime,
    Input,
    Output,
    Internal,
}

impl RasterError {
    /// The category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RasterError::EngineNotConfigured { .. }
            | RasterError::InvalidResolution(_)
            | RasterError::InvalidConfig(_) => ErrorKind::Configuration,
            RasterError::SpawnFailed { .. } => ErrorKind::Spawn,
            RasterError::EngineExited { .. }
            | RasterError::StdinWrite { .. }
            | RasterError::StdoutRead { .. } => ErrorKind::Runtime,
            RasterError::InputClosed
            | RasterError::InputRead { .. }
            | RasterError::InputOpenFailed { .. } => ErrorKind::Input,
            RasterError::OutputWriteFailed { .. } => ErrorKind::Output,
            RasterError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn stdin_write(e: io::Error) -> Self {
        RasterError::StdinWrite { source: Arc::new(e) }
    }

    pub(crate) fn stdout_read(e: io::Error) -> Self {
        RasterError::StdoutRead { source: Arc::new(e) }
    }

    pub(crate) fn input_read(e: io::Error) -> Self {
        RasterError::InputRead { source: Arc::new(e) }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "terminated by signal".to_string(),
    }
}
